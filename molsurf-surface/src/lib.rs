//! # molsurf Surface
//!
//! Molecular surface extraction for large structures.
//!
//! The bounding extent of a model is carved into padded work units under a volume
//! budget, each unit is voxelized and polygonized independently (inline or on a
//! thread pool), and the resulting fragments are merged into one growable mesh per
//! surface.

pub mod decompose;
pub mod voxel;
pub mod marching_cubes;
pub mod dispatch;
pub mod pipeline;

// Re-export commonly used items
pub use decompose::*;
pub use voxel::*;
pub use marching_cubes::*;
pub use dispatch::*;
pub use pipeline::*;
