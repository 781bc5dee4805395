use crate::util;
use nalgebra::{vector, Point3, Vector3};

#[rustfmt::skip]
fn spans_overlap(amin: f32, amax: f32, bmin: f32, bmax: f32) -> bool {
    util::is_between(bmin, amin, amax) || util::is_between(amin, bmin, bmax) ||
    util::is_between(bmax, amin, amax) || util::is_between(amax, bmin, bmax)
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Aabb {
    pub min: Point3<f32>,
    pub max: Point3<f32>,
}

impl Aabb {
    /// Box of the given dimensions, centered on the origin.
    pub fn with_dimensions(dims: Vector3<f32>) -> Self {
        let half_dims = dims / 2.0;
        Aabb {
            min: Point3::from(-half_dims),
            max: Point3::from(half_dims),
        }
    }

    #[rustfmt::skip]
    pub fn contains(&self, point: &Point3<f32>) -> bool {
        util::is_between(point.x, self.min.x, self.max.x) &&
        util::is_between(point.y, self.min.y, self.max.y) &&
        util::is_between(point.z, self.min.z, self.max.z)
    }

    #[rustfmt::skip]
    pub fn intersects(&self, other: &Aabb) -> bool {
        spans_overlap(self.min.x, self.max.x, other.min.x, other.max.x) &&
        spans_overlap(self.min.y, self.max.y, other.min.y, other.max.y) &&
        spans_overlap(self.min.z, self.max.z, other.min.z, other.max.z)
    }

    pub fn dimensions(&self) -> Vector3<f32> {
        vector![
            self.max.x - self.min.x,
            self.max.y - self.min.y,
            self.max.z - self.min.z
        ]
    }

    pub fn translated(&self, translation: Vector3<f32>) -> Aabb {
        Aabb {
            min: self.min + translation,
            max: self.max + translation,
        }
    }

    /// Manhattan distance from `point` to the closest point of the box.
    /// Zero when `point` is inside.
    pub fn manhattan_distance(&self, point: Point3<f32>) -> f32 {
        fn axis_distance(value: f32, min: f32, max: f32) -> f32 {
            if value < min {
                min - value
            } else if value > max {
                value - max
            } else {
                0.0
            }
        }

        axis_distance(point.x, self.min.x, self.max.x)
            + axis_distance(point.y, self.min.y, self.max.y)
            + axis_distance(point.z, self.min.z, self.max.z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::point;

    #[test]
    fn test_contains() {
        let aabb = Aabb::with_dimensions(vector![2.0, 4.0, 2.0]);
        assert!(aabb.contains(&point![0.0, 0.0, 0.0]));
        assert!(aabb.contains(&point![0.9, -1.9, 0.9]));
        assert!(!aabb.contains(&point![0.0, 2.1, 0.0]));
    }

    #[test]
    fn test_intersects() {
        let a = Aabb::with_dimensions(vector![2.0, 2.0, 2.0]);
        let b = a.translated(vector![1.5, 0.0, 0.0]);
        let c = a.translated(vector![3.0, 0.0, 0.0]);
        assert!(a.intersects(&b));
        assert!(b.intersects(&a));
        assert!(!a.intersects(&c));
    }

    #[test]
    fn test_manhattan_distance() {
        let aabb = Aabb {
            min: point![-1.0, -1.0, -1.0],
            max: point![1.0, 1.0, 1.0],
        };
        assert_eq!(aabb.manhattan_distance(point![0.0, 0.5, -0.5]), 0.0);
        assert_eq!(aabb.manhattan_distance(point![2.0, 0.0, 0.0]), 1.0);
        assert_eq!(aabb.manhattan_distance(point![2.0, -3.0, 0.5]), 3.0);
    }
}
