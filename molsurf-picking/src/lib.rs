//! # molsurf Picking
//!
//! Ray casting against the analytic intersection shapes attached to atoms.
//!
//! A [`Ray`] is tested against the spheres, cylinders and line segments of every
//! clickable atom of a group, after moving the shapes into world space with the
//! group's matrix. Hits come back sorted nearest first.

pub mod ray;
pub mod raycaster;

// Re-export commonly used items
pub use ray::*;
pub use raycaster::*;
