//! Line-of-sight visibility oracle.
//!
//! Visibility is decided by a single occlusion cast from the viewer's eye to
//! a *probe point*: the target's eye position pulled back toward the viewer
//! by `probe_max` when the pair is farther apart than `probe_max`, and to
//! the midpoint otherwise.  Casting to the probe point instead of the target
//! itself keeps the target's own body from reporting a hit.
//!
//! The same construction serves every caller (robot → actor for pursuit,
//! actor → NPCs/doors for telemetry) so both consumers agree on what
//! "visible" means.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use warden_perception::{EyeOffsets, LineOfSightOracle, ObstacleField};
//! use warden_types::Vec3;
//!
//! let oracle = LineOfSightOracle::new(Arc::new(ObstacleField::default()), 5.0);
//! let offsets = EyeOffsets::new(0.0, 2.5);
//! assert!(oracle.is_visible(Vec3::ZERO, Vec3::new(20.0, 0.0, 0.0), offsets));
//! ```

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::trace;
use warden_types::Vec3;

use crate::occlusion::Occluder;

// ────────────────────────────────────────────────────────────────────────────
// Configuration
// ────────────────────────────────────────────────────────────────────────────

/// Eye heights and probe limit shared by every visibility query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisibilityConfig {
    /// Eye height of the tracked actor, whether it is viewing or viewed.
    #[serde(default = "default_eye_height")]
    pub actor_eye_height: f32,
    /// Eye height applied to NPCs and doors when the actor looks at them.
    #[serde(default = "default_eye_height")]
    pub object_eye_height: f32,
    /// Sensor height of a robot looking at the actor.
    #[serde(default)]
    pub robot_eye_height: f32,
    /// Upper bound on how far the probe point is pulled back from the
    /// target.
    #[serde(default = "default_probe_max")]
    pub probe_max: f32,
}

fn default_eye_height() -> f32 {
    2.5
}
fn default_probe_max() -> f32 {
    5.0
}

impl Default for VisibilityConfig {
    fn default() -> Self {
        Self {
            actor_eye_height: default_eye_height(),
            object_eye_height: default_eye_height(),
            robot_eye_height: 0.0,
            probe_max: default_probe_max(),
        }
    }
}

/// Vertical offsets added to the viewer and target positions before casting.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EyeOffsets {
    pub viewer: f32,
    pub target: f32,
}

impl EyeOffsets {
    pub fn new(viewer: f32, target: f32) -> Self {
        Self { viewer, target }
    }

    /// A robot looking for the actor.
    pub fn robot_to_actor(cfg: &VisibilityConfig) -> Self {
        Self::new(cfg.robot_eye_height, cfg.actor_eye_height)
    }

    /// The actor looking at an NPC or door.
    pub fn actor_to_object(cfg: &VisibilityConfig) -> Self {
        Self::new(cfg.actor_eye_height, cfg.object_eye_height)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Probe geometry
// ────────────────────────────────────────────────────────────────────────────

/// The segment actually cast for one visibility query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProbeRay {
    /// Viewer position after the eye offset.
    pub viewer: Vec3,
    /// Target position after the eye offset.
    pub target: Vec3,
    /// Cast end point, between `viewer` and `target`.
    pub probe: Vec3,
}

impl ProbeRay {
    /// Build the probe ray for one viewer/target pair.
    ///
    /// Coincident points yield `probe == target` (zero pull-back).
    pub fn new(viewer: Vec3, target: Vec3, offsets: EyeOffsets, probe_max: f32) -> Self {
        let viewer = viewer.raised(offsets.viewer);
        let target = target.raised(offsets.target);
        let dir = (target - viewer).normalized();
        let dist = viewer.distance(target);
        let pull_back = if dist > probe_max { probe_max } else { dist * 0.5 };
        Self {
            viewer,
            target,
            probe: target - dir * pull_back,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Oracle
// ────────────────────────────────────────────────────────────────────────────

/// Binary visibility oracle over a shared [`Occluder`].
///
/// Cheap to clone; clones share the occluder.
#[derive(Clone)]
pub struct LineOfSightOracle {
    occluder: Arc<dyn Occluder>,
    probe_max: f32,
}

impl LineOfSightOracle {
    /// Create an oracle casting against `occluder` with the given probe limit.
    pub fn new(occluder: Arc<dyn Occluder>, probe_max: f32) -> Self {
        Self {
            occluder,
            probe_max,
        }
    }

    /// Create an oracle using the probe limit from `cfg`.
    pub fn from_config(occluder: Arc<dyn Occluder>, cfg: &VisibilityConfig) -> Self {
        Self::new(occluder, cfg.probe_max)
    }

    pub fn probe_max(&self) -> f32 {
        self.probe_max
    }

    /// The ray [`is_visible`][Self::is_visible] would cast.
    pub fn probe_ray(&self, viewer: Vec3, target: Vec3, offsets: EyeOffsets) -> ProbeRay {
        ProbeRay::new(viewer, target, offsets, self.probe_max)
    }

    /// `true` when nothing obstructs the segment from the viewer's eye to
    /// the probe point in front of the target.
    pub fn is_visible(&self, viewer: Vec3, target: Vec3, offsets: EyeOffsets) -> bool {
        let ray = self.probe_ray(viewer, target, offsets);
        let blocked = self.occluder.linecast(ray.viewer, ray.probe);
        trace!(
            from = ?ray.viewer,
            to = ?ray.probe,
            blocked,
            "line-of-sight probe"
        );
        !blocked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::occlusion::{Aabb, ObstacleField};
    use proptest::prelude::*;

    fn coord() -> impl Strategy<Value = f32> {
        -100.0f32..100.0
    }

    fn point() -> impl Strategy<Value = Vec3> {
        (coord(), coord(), coord()).prop_map(|(x, y, z)| Vec3::new(x, y, z))
    }

    fn nearby() -> impl Strategy<Value = Vec3> {
        (-10.0f32..10.0, -10.0f32..10.0, -10.0f32..10.0).prop_map(|(x, y, z)| Vec3::new(x, y, z))
    }

    proptest! {
        #[test]
        fn close_targets_probe_the_midpoint(v in point(), d in nearby(), probe_max in 0.1f32..50.0) {
            let offsets = EyeOffsets::new(2.5, 2.5);
            let ray = ProbeRay::new(v, v + d, offsets, probe_max);
            let dist = ray.viewer.distance(ray.target);
            prop_assume!(dist <= probe_max);
            let mid = ray.viewer.lerp(ray.target, 0.5);
            prop_assert!(ray.probe.approx_eq(mid, 1e-3), "{:?} vs {:?}", ray.probe, mid);
        }

        #[test]
        fn far_targets_probe_exactly_probe_max_in_front(v in point(), t in point(), probe_max in 0.1f32..20.0) {
            let offsets = EyeOffsets::new(0.0, 2.5);
            let ray = ProbeRay::new(v, t, offsets, probe_max);
            let dist = ray.viewer.distance(ray.target);
            prop_assume!(dist > probe_max);
            prop_assert!((ray.probe.distance(ray.target) - probe_max).abs() < 1e-2);
            // Pulled back toward the viewer, not past the target.
            prop_assert!(ray.probe.distance(ray.viewer) < dist);
        }
    }

    #[test]
    fn eye_offsets_raise_both_ends() {
        let ray = ProbeRay::new(Vec3::ZERO, Vec3::new(20.0, 0.0, 0.0), EyeOffsets::new(1.0, 2.0), 5.0);
        assert_eq!(ray.viewer, Vec3::new(0.0, 1.0, 0.0));
        assert_eq!(ray.target, Vec3::new(20.0, 2.0, 0.0));
    }

    #[test]
    fn coincident_points_probe_the_target() {
        let p = Vec3::new(3.0, 0.0, 3.0);
        let ray = ProbeRay::new(p, p, EyeOffsets::new(2.5, 2.5), 5.0);
        assert_eq!(ray.probe, ray.target);

        let oracle = LineOfSightOracle::new(Arc::new(ObstacleField::default()), 5.0);
        assert!(oracle.is_visible(p, p, EyeOffsets::new(2.5, 2.5)));
    }

    #[test]
    fn wall_between_blocks_visibility() {
        let wall = Aabb::new(Vec3::new(9.0, -1.0, -5.0), Vec3::new(10.0, 20.0, 5.0));
        let oracle = LineOfSightOracle::new(Arc::new(ObstacleField::new(vec![wall])), 5.0);
        let offsets = EyeOffsets::new(0.0, 2.5);
        assert!(!oracle.is_visible(Vec3::ZERO, Vec3::new(30.0, 0.0, 0.0), offsets));
    }

    #[test]
    fn collider_around_target_does_not_hide_it() {
        // The target's own body: a 1-unit box around its eye position.
        let body = Aabb::new(Vec3::new(29.0, 0.0, -1.0), Vec3::new(31.0, 3.0, 1.0));
        let oracle = LineOfSightOracle::new(Arc::new(ObstacleField::new(vec![body])), 5.0);
        let offsets = EyeOffsets::new(0.0, 2.5);
        assert!(oracle.is_visible(Vec3::ZERO, Vec3::new(30.0, 0.0, 0.0), offsets));
    }

    #[test]
    fn robot_and_actor_offsets_from_config() {
        let cfg = VisibilityConfig::default();
        assert_eq!(EyeOffsets::robot_to_actor(&cfg), EyeOffsets::new(0.0, 2.5));
        assert_eq!(EyeOffsets::actor_to_object(&cfg), EyeOffsets::new(2.5, 2.5));
    }
}
