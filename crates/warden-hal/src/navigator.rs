//! The path-following seam.
//!
//! Path computation lives outside the core: the controller only hands the
//! navigator a destination and a speed, and reads back the agent's pose and
//! progress.

use warden_types::{Quaternion, Vec3};

/// How much of the requested path the navigator could compute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PathStatus {
    /// The path reaches the destination.
    #[default]
    Complete,
    /// The destination is unreachable; the path ends as close as possible.
    Partial,
    /// No path could be computed.
    Invalid,
}

/// An external path-following agent (a navigation-mesh agent in the host
/// engine).
///
/// Setting a destination is fire-and-forget: implementations must not
/// block while the path is computed.
pub trait Navigator: Send {
    /// Current world position of the agent.
    fn position(&self) -> Vec3;

    /// Current orientation of the agent.
    fn rotation(&self) -> Quaternion;

    /// Overwrite the agent's orientation.  Only meaningful while automatic
    /// rotation is disabled.
    fn set_rotation(&mut self, rotation: Quaternion);

    /// Current velocity of the agent.
    fn velocity(&self) -> Vec3;

    /// Destination most recently requested.
    fn destination(&self) -> Vec3;

    /// Request a new destination and recompute the path toward it.
    fn set_destination(&mut self, destination: Vec3);

    /// Configured top speed for the current path.
    fn speed(&self) -> f32;

    fn set_speed(&mut self, speed: f32);

    /// Distance from the destination at which the agent stops.
    fn stopping_distance(&self) -> f32;

    fn set_stopping_distance(&mut self, distance: f32);

    /// Enable or disable facing the direction of travel automatically.
    fn set_update_rotation(&mut self, enabled: bool);

    /// Whether automatic facing is currently enabled.
    fn update_rotation(&self) -> bool;

    /// Status of the current path.
    fn path_status(&self) -> PathStatus;
}
