//! [`ObjectiveStateMachine`] – what a pursuit robot is doing, and where that
//! sends it.
//!
//! The machine is re-evaluated once per controller tick from two inputs,
//! whether pursuit is active and whether the robot can see the actor, plus
//! the robot's fixed aggression setting.  Each objective then maps to a
//! [`NavTarget`] for the navigator.
//!
//! | active | visible | aggressive | objective | destination | speed |
//! |---|---|---|---|---|---|
//! | no | – | – | Rest | current position | 0 |
//! | yes | yes | yes | Race | forecast | 1 |
//! | yes | yes | no | Follow | stand-off point | 1 |
//! | yes | no | – | Search | forecast | 1 |

use tracing::debug;
use warden_types::{Objective, Vec3};

/// Where the navigator should head, and at what fraction of top speed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NavTarget {
    pub destination: Vec3,
    /// Fraction of the configured maximum speed, in `[0, 1]`.
    pub speed_factor: f32,
}

/// The stand-off point `follow_distance` away from the actor, on the side
/// the robot currently occupies.
///
/// A robot standing exactly on the actor has no side; the actor's own
/// position is returned.
pub fn follow_point(actor: Vec3, robot: Vec3, follow_distance: f32) -> Vec3 {
    actor + (robot - actor).normalized() * follow_distance
}

/// Per-robot objective state.
#[derive(Debug, Clone)]
pub struct ObjectiveStateMachine {
    current: Objective,
    aggressive: bool,
    follow_distance: f32,
}

impl ObjectiveStateMachine {
    /// A machine starting at [`Objective::Rest`].
    pub fn new(aggressive: bool, follow_distance: f32) -> Self {
        Self {
            current: Objective::Rest,
            aggressive,
            follow_distance,
        }
    }

    pub fn current(&self) -> Objective {
        self.current
    }

    pub fn is_aggressive(&self) -> bool {
        self.aggressive
    }

    /// Run one evaluation and return the new objective.
    pub fn evaluate(&mut self, pursuit_active: bool, actor_visible: bool) -> Objective {
        let next = Objective::decide(pursuit_active, actor_visible, self.aggressive);
        if next != self.current {
            debug!(from = %self.current, to = %next, "objective changed");
            self.current = next;
        }
        next
    }

    /// Navigation target for the current objective.
    ///
    /// Race and Search both chase the forecast at full speed.
    pub fn target(&self, robot: Vec3, actor: Vec3, predicted: Vec3) -> NavTarget {
        match self.current {
            Objective::Rest => NavTarget {
                destination: robot,
                speed_factor: 0.0,
            },
            Objective::Follow => NavTarget {
                destination: follow_point(actor, robot, self.follow_distance),
                speed_factor: 1.0,
            },
            Objective::Race | Objective::Search => NavTarget {
                destination: predicted,
                speed_factor: 1.0,
            },
        }
    }
}
