//! Camera and projection utilities

use molsurf_core::{Point3f, Vector3f};
use molsurf_picking::Ray;
use nalgebra::{Matrix4, Perspective3, Point2, Unit, UnitQuaternion};
use serde::{Deserialize, Serialize};

/// Default distance of the camera from the rotation center
pub const CAMERA_Z: f32 = 150.0;

/// A perspective camera looking at the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Camera {
    pub position: Point3f,
    pub target: Point3f,
    pub up: Vector3f,
    /// Vertical field of view in radians
    pub fov: f32,
    pub aspect_ratio: f32,
    pub near: f32,
    pub far: f32,
}

impl Camera {
    /// Create a new camera
    pub fn new(
        position: Point3f,
        target: Point3f,
        up: Vector3f,
        fov: f32,
        aspect_ratio: f32,
        near: f32,
        far: f32,
    ) -> Self {
        Self {
            position,
            target,
            up,
            fov,
            aspect_ratio,
            near,
            far,
        }
    }

    /// Get the view matrix
    pub fn view_matrix(&self) -> Matrix4<f32> {
        Matrix4::look_at_rh(&self.position, &self.target, &self.up)
    }

    /// Get the projection matrix
    pub fn projection_matrix(&self) -> Matrix4<f32> {
        let perspective = Perspective3::new(self.aspect_ratio, self.fov, self.near, self.far);
        perspective.into_inner()
    }

    /// Distance between the camera and its target
    pub fn distance(&self) -> f32 {
        (self.target - self.position).norm()
    }

    /// Move the camera and its target along the view direction
    pub fn move_forward(&mut self, distance: f32) {
        let Some(direction) = (self.target - self.position).try_normalize(f32::EPSILON) else {
            return;
        };
        self.position += direction * distance;
        self.target += direction * distance;
    }

    /// Rotate the camera around the target
    ///
    /// `horizontal` turns about the up vector, `vertical` about the camera's right
    /// axis, both in radians.
    pub fn orbit(&mut self, horizontal: f32, vertical: f32) {
        let offset = self.position - self.target;
        let Some(up) = Unit::try_new(self.up, f32::EPSILON) else {
            return;
        };

        let yaw = UnitQuaternion::from_axis_angle(&up, horizontal);
        let pitch = Unit::try_new(self.up.cross(&offset), f32::EPSILON)
            .map(|right| UnitQuaternion::from_axis_angle(&right, -vertical))
            .unwrap_or_else(UnitQuaternion::identity);

        self.position = self.target + yaw * pitch * offset;
    }

    /// Projector for the camera's current matrices
    pub fn projector(&self) -> Projector {
        Projector::new(self)
    }

    /// Ray from the camera through a point in normalized device coordinates
    pub fn pick_ray(&self, ndc: &Point2<f32>) -> Option<Ray> {
        let on_near = self.projector().unproject(&Point3f::new(ndc.x, ndc.y, -1.0))?;
        Some(Ray::through(self.position, &on_near))
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::new(
            Point3f::new(0.0, 0.0, CAMERA_Z),
            Point3f::origin(),
            Vector3f::new(0.0, 1.0, 0.0),
            20.0f32.to_radians(),
            16.0 / 9.0,
            1.0,
            800.0,
        )
    }
}

/// Maps between world space and normalized device coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Projector {
    view_projection: Matrix4<f32>,
    inverse: Option<Matrix4<f32>>,
}

impl Projector {
    pub fn new(camera: &Camera) -> Self {
        let view_projection = camera.projection_matrix() * camera.view_matrix();
        Self {
            view_projection,
            inverse: view_projection.try_inverse(),
        }
    }

    /// World point to normalized device coordinates
    pub fn project(&self, point: &Point3f) -> Option<Point3f> {
        Point3f::from_homogeneous(self.view_projection * point.to_homogeneous())
    }

    /// Normalized device coordinates back to a world point
    pub fn unproject(&self, ndc: &Point3f) -> Option<Point3f> {
        let inverse = self.inverse.as_ref()?;
        Point3f::from_homogeneous(inverse * ndc.to_homogeneous())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_project_unproject_roundtrip() {
        let camera = Camera::default();
        let projector = camera.projector();
        let p = Point3f::new(3.0, -2.0, 10.0);

        let ndc = projector.project(&p).unwrap();
        assert!(ndc.x.abs() <= 1.0 && ndc.y.abs() <= 1.0 && ndc.z.abs() <= 1.0);
        let back = projector.unproject(&ndc).unwrap();
        assert_relative_eq!(back, p, epsilon = 1e-2);
    }

    #[test]
    fn test_center_pick_ray_looks_at_target() {
        let camera = Camera::default();
        let ray = camera.pick_ray(&Point2::origin()).unwrap();
        assert_relative_eq!(*ray.origin(), camera.position);
        assert_relative_eq!(*ray.direction().unwrap(), -Vector3f::z(), epsilon = 1e-4);
    }

    #[test]
    fn test_orbit_keeps_distance() {
        let mut camera = Camera::default();
        camera.orbit(0.7, 0.3);
        assert_relative_eq!(camera.distance(), CAMERA_Z, epsilon = 1e-2);
        assert!(camera.position.x.abs() > 1.0);
        assert!(camera.position.y.abs() > 1.0);
    }

    #[test]
    fn test_move_forward_moves_target_too() {
        let mut camera = Camera::default();
        camera.move_forward(50.0);
        assert_relative_eq!(camera.position.z, 100.0, epsilon = 1e-4);
        assert_relative_eq!(camera.target.z, -50.0, epsilon = 1e-4);
    }
}
