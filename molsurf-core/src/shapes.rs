//! Analytic shapes used for picking
//!
//! Shapes are expressed in the local space of the group that owns the atom and are
//! moved into world space with [`Sphere::transformed`] and friends at test time.

use crate::point::{Point3f, Vector3f};
use crate::transform::{max_scale_on_axis, transform_point};
use nalgebra::Matrix4;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sphere {
    pub center: Point3f,
    pub radius: f32,
}

impl Sphere {
    pub fn new(center: Point3f, radius: f32) -> Self {
        Self { center, radius }
    }

    pub fn transformed(&self, matrix: &Matrix4<f32>) -> Self {
        Self {
            center: transform_point(matrix, &self.center),
            radius: self.radius * max_scale_on_axis(matrix),
        }
    }
}

/// Finite cylinder between two cap centers
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Cylinder {
    pub c1: Point3f,
    pub c2: Point3f,
    pub radius: f32,
}

impl Cylinder {
    pub fn new(c1: Point3f, c2: Point3f, radius: f32) -> Self {
        Self { c1, c2, radius }
    }

    /// Unit axis from `c1` to `c2`, `None` for a zero-length cylinder
    pub fn direction(&self) -> Option<Vector3f> {
        (self.c2 - self.c1).try_normalize(f32::EPSILON)
    }

    pub fn length_sq(&self) -> f32 {
        (self.c2 - self.c1).norm_squared()
    }

    pub fn transformed(&self, matrix: &Matrix4<f32>) -> Self {
        Self {
            c1: transform_point(matrix, &self.c1),
            c2: transform_point(matrix, &self.c2),
            radius: self.radius * max_scale_on_axis(matrix),
        }
    }
}

/// Thin bond drawn as a line
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LineSegment {
    pub start: Point3f,
    pub end: Point3f,
}

impl LineSegment {
    pub fn new(start: Point3f, end: Point3f) -> Self {
        Self { start, end }
    }

    pub fn transformed(&self, matrix: &Matrix4<f32>) -> Self {
        Self {
            start: transform_point(matrix, &self.start),
            end: transform_point(matrix, &self.end),
        }
    }
}

/// All pickable primitives of one atom
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntersectionShape {
    pub spheres: Vec<Sphere>,
    pub cylinders: Vec<Cylinder>,
    pub lines: Vec<LineSegment>,
}

impl IntersectionShape {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sphere(mut self, sphere: Sphere) -> Self {
        self.spheres.push(sphere);
        self
    }

    pub fn with_cylinder(mut self, cylinder: Cylinder) -> Self {
        self.cylinders.push(cylinder);
        self
    }

    pub fn with_line(mut self, line: LineSegment) -> Self {
        self.lines.push(line);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.spheres.is_empty() && self.cylinders.is_empty() && self.lines.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_sphere_transform_scales_radius() {
        let m = Matrix4::new_translation(&Vector3f::new(1.0, 0.0, 0.0))
            * Matrix4::new_nonuniform_scaling(&Vector3f::new(2.0, 3.0, 1.0));
        let s = Sphere::new(Point3f::new(1.0, 1.0, 1.0), 0.5).transformed(&m);
        assert_relative_eq!(s.center, Point3f::new(3.0, 3.0, 1.0));
        assert_relative_eq!(s.radius, 1.5);
    }

    #[test]
    fn test_cylinder_direction() {
        let c = Cylinder::new(Point3f::origin(), Point3f::new(0.0, 0.0, 4.0), 1.0);
        assert_relative_eq!(c.direction().unwrap(), Vector3f::z());
        assert_relative_eq!(c.length_sq(), 16.0);

        let flat = Cylinder::new(Point3f::origin(), Point3f::origin(), 1.0);
        assert!(flat.direction().is_none());
    }
}
