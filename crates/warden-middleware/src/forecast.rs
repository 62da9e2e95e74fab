//! The shared trajectory forecast.
//!
//! [`ForecastBuffer`] is the only state shared between the channel's receive
//! task and the pursuit controllers.  Every access goes through one mutex,
//! and the trajectory is only ever replaced wholesale, so a reader sees
//! either the previous forecast or the new one, never a mix.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use warden_types::Vec3;

/// Handle shared by the channel and every controller that reads it.
pub type SharedForecast = Arc<ForecastBuffer>;

// ────────────────────────────────────────────────────────────────────────────
// Trajectory
// ────────────────────────────────────────────────────────────────────────────

/// Predicted actor positions over the forecast horizon, oldest first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Trajectory {
    samples: Vec<Vec3>,
}

impl Trajectory {
    /// Build a trajectory from ordered samples.
    pub fn new(samples: Vec<Vec3>) -> Self {
        Self { samples }
    }

    pub fn samples(&self) -> &[Vec3] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// The furthest-ahead sample: the position the controllers chase.
    pub fn last(&self) -> Option<Vec3> {
        self.samples.last().copied()
    }

    /// Consecutive sample pairs, for drawing the path.
    pub fn segments(&self) -> impl Iterator<Item = (Vec3, Vec3)> + '_ {
        self.samples.windows(2).map(|w| (w[0], w[1]))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// ForecastBuffer
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct ForecastState {
    trajectory: Trajectory,
    predicted: Vec3,
    updated_at: Option<Instant>,
    updates: u64,
}

/// Latest forecast plus its derived predicted position.
///
/// Until the first forecast arrives the predicted position is the origin.
#[derive(Debug, Default)]
pub struct ForecastBuffer {
    state: Mutex<ForecastState>,
}

impl ForecastBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty buffer behind a shareable handle.
    pub fn shared() -> SharedForecast {
        Arc::new(Self::new())
    }

    fn lock(&self) -> MutexGuard<'_, ForecastState> {
        // Writes replace the whole state in one assignment, so a poisoned
        // lock still guards a consistent value.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the current forecast.
    ///
    /// Empty trajectories are ignored and return `false`; the previous
    /// forecast stays in effect.
    pub fn replace(&self, trajectory: Trajectory) -> bool {
        let Some(predicted) = trajectory.last() else {
            return false;
        };
        let mut state = self.lock();
        let updates = state.updates + 1;
        *state = ForecastState {
            trajectory,
            predicted,
            updated_at: Some(Instant::now()),
            updates,
        };
        true
    }

    /// Last sample of the latest forecast.
    pub fn predicted_position(&self) -> Vec3 {
        self.lock().predicted
    }

    /// Copy of the whole latest trajectory.
    pub fn snapshot(&self) -> Trajectory {
        self.lock().trajectory.clone()
    }

    /// When the latest forecast was accepted, if any has been.
    pub fn updated_at(&self) -> Option<Instant> {
        self.lock().updated_at
    }

    /// Number of forecasts accepted so far.
    pub fn updates(&self) -> u64 {
        self.lock().updates
    }
}
