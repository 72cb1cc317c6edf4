//! Ray casting against atom intersection shapes

use crate::ray::Ray;
use molsurf_core::{
    max_scale_on_axis, Atom, Cylinder, IntersectionShape, LineSegment, Point3f, Sphere, Vector3f,
};
use nalgebra::Matrix4;

/// Line pick tolerance in group units before scaling
pub const DEFAULT_LINE_PRECISION: f32 = 0.2;

/// One picked atom
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hit {
    /// Position of the atom in the slice that was tested
    pub index: usize,
    pub serial: usize,
    /// Distance from the ray origin
    pub distance: f32,
}

/// Casts a ray against the intersection shapes of atoms
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Raycaster {
    pub ray: Ray,
    pub line_precision: f32,
}

impl Raycaster {
    pub fn new(origin: Point3f, direction: Vector3f, near: f32, far: f32) -> Self {
        Self::from_ray(Ray::new(origin, direction).with_range(near, far))
    }

    pub fn from_ray(ray: Ray) -> Self {
        Self {
            ray,
            line_precision: DEFAULT_LINE_PRECISION,
        }
    }

    pub fn with_line_precision(mut self, line_precision: f32) -> Self {
        self.line_precision = line_precision;
        self
    }

    /// Every hit on the clickable atoms of a group, nearest first
    ///
    /// Shapes are given in the group's local space and moved to world space with
    /// `group_matrix`.
    pub fn intersect_atoms(&self, atoms: &[Atom], group_matrix: &Matrix4<f32>) -> Vec<Hit> {
        if self.ray.is_degenerate() {
            return Vec::new();
        }

        let tolerance = self.line_precision * max_scale_on_axis(group_matrix);
        let mut hits = Vec::new();

        for (index, atom) in atoms.iter().enumerate() {
            if !atom.clickable {
                continue;
            }
            let Some(shape) = atom.intersection_shape.as_ref() else {
                continue;
            };

            for distance in self.intersect_shape(shape, group_matrix, tolerance) {
                if self.ray.in_range(distance) {
                    hits.push(Hit {
                        index,
                        serial: atom.serial,
                        distance,
                    });
                }
            }
        }

        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        log::trace!("ray hit {} shapes over {} atoms", hits.len(), atoms.len());
        hits
    }

    /// Nearest hit on the clickable atoms of a group
    pub fn pick(&self, atoms: &[Atom], group_matrix: &Matrix4<f32>) -> Option<Hit> {
        self.intersect_atoms(atoms, group_matrix).into_iter().next()
    }

    /// Distances of all hits on one shape; spheres contribute their nearest hit only
    fn intersect_shape(&self, shape: &IntersectionShape, matrix: &Matrix4<f32>, tolerance: f32) -> Vec<f32> {
        let mut distances: Vec<f32> = shape
            .cylinders
            .iter()
            .filter_map(|c| self.intersect_cylinder(&c.transformed(matrix)))
            .collect();

        distances.extend(
            shape
                .lines
                .iter()
                .filter_map(|l| self.intersect_line(&l.transformed(matrix), tolerance)),
        );

        let nearest_sphere = shape
            .spheres
            .iter()
            .filter_map(|s| self.intersect_sphere(&s.transformed(matrix)))
            .min_by(|a, b| a.total_cmp(b));
        distances.extend(nearest_sphere);

        distances
    }

    /// Distance to the first crossing of the sphere's surface
    ///
    /// Spheres centered behind the origin are ignored; an origin inside the sphere
    /// reports the distance to the point nearest the center.
    pub fn intersect_sphere(&self, sphere: &Sphere) -> Option<f32> {
        let d = self.ray.direction()?;
        let to_center = sphere.center - self.ray.origin();

        let dc = to_center.dot(d);
        if dc < 0.0 {
            return None;
        }
        let perp_sq = to_center.norm_squared() - dc * dc;
        let radius_sq = sphere.radius * sphere.radius;
        if perp_sq > radius_sq {
            return None;
        }

        let disc = radius_sq - perp_sq;
        if disc <= 0.0 {
            Some(dc)
        } else {
            Some(dc - disc.sqrt())
        }
    }

    /// Distance to the side of a finite cylinder; caps are not tested
    pub fn intersect_cylinder(&self, cylinder: &Cylinder) -> Option<f32> {
        let axis = cylinder.direction()?;
        let approach = self.ray.closest_approach(&cylinder.c1, &axis)?;

        let radius_sq = cylinder.radius * cylinder.radius;
        if approach.distance_sq > radius_sq {
            return None;
        }

        let to_start = cylinder.c1 - self.ray.origin();
        let b = approach.epsilon - approach.beta * approach.delta;
        let c = to_start.norm_squared() - approach.delta * approach.delta - radius_sq;
        let disc = b * b - approach.denom * c;

        let t = if disc <= 0.0 {
            // tangent
            approach.t
        } else {
            (b - disc.sqrt()) / approach.denom
        };
        let s = approach.beta * t - approach.delta;

        if s < 0.0 || s * s > cylinder.length_sq() || t < 0.0 {
            return None;
        }
        Some(t)
    }

    /// Distance along the ray to the point nearest a segment within `tolerance`
    pub fn intersect_line(&self, line: &LineSegment, tolerance: f32) -> Option<f32> {
        let segment = line.end - line.start;
        let axis = segment.try_normalize(f32::EPSILON)?;
        let approach = self.ray.closest_approach(&line.start, &axis)?;

        if approach.distance_sq >= tolerance * tolerance {
            return None;
        }
        if approach.s < 0.0 || approach.s * approach.s > segment.norm_squared() {
            return None;
        }
        Some(approach.t)
    }
}
