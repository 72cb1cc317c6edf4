//! Viewer core for molecular structures
//!
//! This crate ties the scene graph, the surface pipeline and the picker together
//! behind a single [`Viewer`]:
//! - Camera and projector
//! - Surface building, restyling and removal
//! - Picking clickable atoms
//! - Zooming and rotating the model
//!
//! Rendering itself is left to a [`molsurf_core::RenderBackend`].

pub mod viewer;
pub mod camera;

pub use viewer::*;
pub use camera::*;
