//! `warden-perception` – what the robots (and the actor) can see.
//!
//! # Modules
//!
//! - [`line_of_sight`] – [`LineOfSightOracle`][line_of_sight::LineOfSightOracle]:
//!   binary visibility between two world points using a probe point pulled
//!   back from the target, so the target's own collision volume never
//!   occludes it.
//! - [`occlusion`] – the [`Occluder`][occlusion::Occluder] seam the oracle
//!   casts against, plus [`ObstacleField`][occlusion::ObstacleField], an
//!   axis-aligned box scene used by headless runs and tests.

pub mod line_of_sight;
pub mod occlusion;

pub use line_of_sight::{EyeOffsets, LineOfSightOracle, ProbeRay, VisibilityConfig};
pub use occlusion::{Aabb, ObstacleField, Occluder};
