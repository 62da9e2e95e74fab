//! Occlusion queries.
//!
//! The visibility oracle never talks to a physics engine directly; it casts
//! against an [`Occluder`].  The host engine implements the trait over its
//! collision world, and [`ObstacleField`] provides a self-contained
//! implementation built from axis-aligned boxes.
//!
//! # Example
//!
//! ```rust
//! use warden_perception::occlusion::{Aabb, ObstacleField, Occluder};
//! use warden_types::Vec3;
//!
//! let wall = Aabb::new(Vec3::new(4.0, 0.0, -5.0), Vec3::new(5.0, 10.0, 5.0));
//! let field = ObstacleField::new(vec![wall]);
//!
//! assert!(field.linecast(Vec3::new(0.0, 1.0, 0.0), Vec3::new(10.0, 1.0, 0.0)));
//! assert!(!field.linecast(Vec3::new(0.0, 1.0, 0.0), Vec3::new(3.0, 1.0, 0.0)));
//! ```

use warden_types::Vec3;

/// A collision world that can answer "is the segment from `from` to `to`
/// obstructed?".
pub trait Occluder: Send + Sync {
    /// Return `true` when any collider intersects the segment.
    fn linecast(&self, from: Vec3, to: Vec3) -> bool;
}

// ────────────────────────────────────────────────────────────────────────────
// Aabb
// ────────────────────────────────────────────────────────────────────────────

/// An axis-aligned bounding box, defined by its minimum and maximum corners.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    /// Create a bounding box from its two opposite corners.
    ///
    /// The constructor normalises the corners so that `min ≤ max` per axis.
    pub fn new(a: Vec3, b: Vec3) -> Self {
        Self {
            min: Vec3::new(a.x.min(b.x), a.y.min(b.y), a.z.min(b.z)),
            max: Vec3::new(a.x.max(b.x), a.y.max(b.y), a.z.max(b.z)),
        }
    }

    /// True when the point lies inside or on the boundary of the box.
    pub fn contains_point(&self, p: Vec3) -> bool {
        p.x >= self.min.x
            && p.x <= self.max.x
            && p.y >= self.min.y
            && p.y <= self.max.y
            && p.z >= self.min.z
            && p.z <= self.max.z
    }

    /// Slab test: true when the segment `from → to` touches the box.
    pub fn intersects_segment(&self, from: Vec3, to: Vec3) -> bool {
        let d = to - from;
        let mut t_min = 0.0_f32;
        let mut t_max = 1.0_f32;

        for (origin, dir, lo, hi) in [
            (from.x, d.x, self.min.x, self.max.x),
            (from.y, d.y, self.min.y, self.max.y),
            (from.z, d.z, self.min.z, self.max.z),
        ] {
            if dir.abs() < f32::EPSILON {
                if origin < lo || origin > hi {
                    return false;
                }
                continue;
            }
            let inv = 1.0 / dir;
            let (mut t1, mut t2) = ((lo - origin) * inv, (hi - origin) * inv);
            if t1 > t2 {
                std::mem::swap(&mut t1, &mut t2);
            }
            t_min = t_min.max(t1);
            t_max = t_max.min(t2);
            if t_min > t_max {
                return false;
            }
        }
        true
    }
}

// ────────────────────────────────────────────────────────────────────────────
// ObstacleField
// ────────────────────────────────────────────────────────────────────────────

/// A static scene of box colliders.
///
/// Boxes that enclose the start of a cast do not block it, the same way an
/// engine linecast ignores the collider it starts in.
#[derive(Debug, Clone, Default)]
pub struct ObstacleField {
    boxes: Vec<Aabb>,
}

impl ObstacleField {
    /// Create a field from a list of boxes.
    pub fn new(boxes: Vec<Aabb>) -> Self {
        Self { boxes }
    }

    /// Add one more box collider.
    pub fn insert(&mut self, aabb: Aabb) {
        self.boxes.push(aabb);
    }

    /// Number of colliders in the field.
    pub fn len(&self) -> usize {
        self.boxes.len()
    }

    /// True when the field holds no colliders.
    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }
}

impl Occluder for ObstacleField {
    fn linecast(&self, from: Vec3, to: Vec3) -> bool {
        self.boxes
            .iter()
            .filter(|b| !b.contains_point(from))
            .any(|b| b.intersects_segment(from, to))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wall() -> Aabb {
        Aabb::new(Vec3::new(4.0, 0.0, -5.0), Vec3::new(5.0, 10.0, 5.0))
    }

    #[test]
    fn aabb_normalises_corners() {
        let b = Aabb::new(Vec3::new(1.0, 1.0, 1.0), Vec3::new(-1.0, -1.0, -1.0));
        assert_eq!(b.min, Vec3::new(-1.0, -1.0, -1.0));
        assert_eq!(b.max, Vec3::new(1.0, 1.0, 1.0));
    }

    #[test]
    fn segment_through_box_hits() {
        assert!(wall().intersects_segment(Vec3::new(0.0, 1.0, 0.0), Vec3::new(10.0, 1.0, 0.0)));
    }

    #[test]
    fn segment_stopping_short_misses() {
        assert!(!wall().intersects_segment(Vec3::new(0.0, 1.0, 0.0), Vec3::new(3.9, 1.0, 0.0)));
    }

    #[test]
    fn segment_passing_over_box_misses() {
        assert!(!wall().intersects_segment(Vec3::new(0.0, 11.0, 0.0), Vec3::new(10.0, 11.0, 0.0)));
    }

    #[test]
    fn axis_parallel_segment_outside_slab_misses() {
        // Runs along z at x = 0, never enters the x slab of the wall.
        assert!(!wall().intersects_segment(Vec3::new(0.0, 1.0, -10.0), Vec3::new(0.0, 1.0, 10.0)));
    }

    #[test]
    fn field_ignores_box_enclosing_origin() {
        let field = ObstacleField::new(vec![wall()]);
        assert!(!field.linecast(Vec3::new(4.5, 1.0, 0.0), Vec3::new(0.0, 1.0, 0.0)));
    }

    #[test]
    fn empty_field_never_blocks() {
        let field = ObstacleField::default();
        assert!(field.is_empty());
        assert!(!field.linecast(Vec3::ZERO, Vec3::new(100.0, 0.0, 0.0)));
    }
}
