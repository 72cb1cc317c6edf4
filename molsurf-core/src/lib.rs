//! Core data structures and traits for molsurf
//!
//! This crate provides the fundamental types shared by the surface pipeline, the
//! picker and the viewer: atoms, extents, meshes, the transform scene graph, the
//! handle table and the traits through which external collaborators are consumed.

pub mod point;
pub mod extent;
pub mod mesh;
pub mod material;
pub mod shapes;
pub mod traits;
pub mod transform;
pub mod scene;
pub mod handle;
pub mod error;

pub use point::*;
pub use extent::*;
pub use mesh::*;
pub use material::*;
pub use shapes::*;
pub use traits::*;
pub use transform::*;
pub use scene::*;
pub use handle::*;
pub use error::*;

/// Re-export commonly used types from nalgebra
pub use nalgebra::{Matrix3, Matrix4, Point2, Point3, Rotation3, UnitQuaternion, Vector3};
