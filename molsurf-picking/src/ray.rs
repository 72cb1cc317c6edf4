//! World space rays

use molsurf_core::{Point3f, Vector3f};

/// Half line with a unit direction and a distance window
///
/// A ray built from a zero direction has no direction and never hits anything.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    origin: Point3f,
    direction: Option<Vector3f>,
    pub near: f32,
    pub far: f32,
}

/// Closest approach between a ray and an infinite axis through `start` along `axis`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClosestApproach {
    /// Distance along the ray
    pub t: f32,
    /// Distance along the axis from its start
    pub s: f32,
    /// Squared distance between the two closest points
    pub distance_sq: f32,
    /// Cosine between the ray and the axis
    pub beta: f32,
    /// Projection of the axis start onto the axis, relative to the ray origin
    pub delta: f32,
    /// Projection of the axis start onto the ray, relative to the ray origin
    pub epsilon: f32,
    /// `1 - beta²`
    pub denom: f32,
}

impl Ray {
    pub fn new(origin: Point3f, direction: Vector3f) -> Self {
        Self {
            origin,
            direction: direction.try_normalize(f32::EPSILON),
            near: 0.0,
            far: f32::INFINITY,
        }
    }

    pub fn with_range(mut self, near: f32, far: f32) -> Self {
        self.near = near;
        self.far = far;
        self
    }

    /// Ray from `origin` through `target`
    pub fn through(origin: Point3f, target: &Point3f) -> Self {
        Self::new(origin, target - origin)
    }

    pub fn origin(&self) -> &Point3f {
        &self.origin
    }

    pub fn direction(&self) -> Option<&Vector3f> {
        self.direction.as_ref()
    }

    pub fn is_degenerate(&self) -> bool {
        self.direction.is_none()
    }

    /// Point at distance `t`
    pub fn at(&self, t: f32) -> Option<Point3f> {
        self.direction.map(|d| self.origin + d * t)
    }

    /// Whether a hit at distance `t` lies within the window
    pub fn in_range(&self, t: f32) -> bool {
        t >= self.near && t <= self.far
    }

    /// Closest approach to the axis through `start` with unit direction `axis`
    ///
    /// `None` when the ray is degenerate or parallel to the axis.
    pub fn closest_approach(&self, start: &Point3f, axis: &Vector3f) -> Option<ClosestApproach> {
        let d = self.direction?;
        let to_start = start - self.origin;

        let beta = d.dot(axis);
        let delta = axis.dot(&to_start);
        let epsilon = d.dot(&to_start);
        let denom = 1.0 - beta * beta;
        if denom <= f32::EPSILON {
            return None;
        }

        let t = (epsilon - beta * delta) / denom;
        let s = beta * t - delta;
        let on_ray = self.origin + d * t;
        let on_axis = start + axis * s;

        Some(ClosestApproach {
            t,
            s,
            distance_sq: (on_ray - on_axis).norm_squared(),
            beta,
            delta,
            epsilon,
            denom,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_direction_is_normalized() {
        let ray = Ray::new(Point3f::origin(), Vector3f::new(0.0, 3.0, 4.0));
        assert_relative_eq!(ray.direction().unwrap().norm(), 1.0);
        assert_relative_eq!(ray.at(5.0).unwrap(), Point3f::new(0.0, 3.0, 4.0), epsilon = 1e-5);
    }

    #[test]
    fn test_zero_direction_is_degenerate() {
        let ray = Ray::new(Point3f::origin(), Vector3f::zeros());
        assert!(ray.is_degenerate());
        assert!(ray.at(1.0).is_none());
        assert!(ray
            .closest_approach(&Point3f::new(1.0, 0.0, 0.0), &Vector3f::y())
            .is_none());
    }

    #[test]
    fn test_closest_approach_of_skew_lines() {
        // ray along x at z = 0, axis along y at x = 3, z = 2
        let ray = Ray::new(Point3f::origin(), Vector3f::x());
        let approach = ray
            .closest_approach(&Point3f::new(3.0, -1.0, 2.0), &Vector3f::y())
            .unwrap();
        assert_relative_eq!(approach.t, 3.0);
        assert_relative_eq!(approach.s, 1.0);
        assert_relative_eq!(approach.distance_sq, 4.0);
        assert_relative_eq!(approach.denom, 1.0);
    }

    #[test]
    fn test_parallel_axis_has_no_approach() {
        let ray = Ray::new(Point3f::origin(), Vector3f::x());
        assert!(ray
            .closest_approach(&Point3f::new(0.0, 1.0, 0.0), &Vector3f::x())
            .is_none());
    }

    #[test]
    fn test_range_window() {
        let ray = Ray::through(Point3f::origin(), &Point3f::new(0.0, 0.0, -1.0)).with_range(1.0, 10.0);
        assert!(!ray.in_range(0.5));
        assert!(ray.in_range(1.0));
        assert!(ray.in_range(10.0));
        assert!(!ray.in_range(10.5));
    }
}
