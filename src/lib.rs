//! # molsurf
//!
//! Core of an interactive viewer for large 3D structural models.
//!
//! This is the umbrella crate that provides convenient access to all molsurf functionality.
//! You can use this crate to get everything in one place, or use individual crates for
//! more granular control over dependencies.
//!
//! ## Features
//!
//! - **Core**: Scene graph, atoms, extents, meshes and the collaborator traits
//! - **Surface**: Extent decomposition and parallel isosurface construction
//! - **Picking**: Analytic ray intersection against spheres, cylinders and lines
//! - **Viewer**: Camera, projector and the facade tying the pieces together
//!
//! ## Quick Start
//!
//! ```rust
//! use molsurf::prelude::*;
//!
//! let mut scene = SceneGraph::new();
//! let root = scene.create_scene();
//! let group = scene.create_node();
//! scene.add(root, group).unwrap();
//! scene.update_matrix_world(root, false);
//! ```
//!
//! ## Feature Flags
//!
//! - `default`: Enables core, surface and picking
//! - `surface`: Surface construction pipeline
//! - `picking`: Ray intersector
//! - `viewer`: Viewer facade (implies surface and picking)
//! - `all`: Enables all features

// Re-export core functionality
pub use molsurf_core::*;

#[cfg(feature = "surface")]
pub use molsurf_surface as surface;

#[cfg(feature = "picking")]
pub use molsurf_picking as picking;

#[cfg(feature = "viewer")]
pub use molsurf_viewer as viewer;

/// Convenient imports for common use cases
pub mod prelude {
    pub use molsurf_core::*;

    #[cfg(feature = "surface")]
    pub use molsurf_surface::*;

    #[cfg(feature = "picking")]
    pub use molsurf_picking::*;

    #[cfg(feature = "viewer")]
    pub use molsurf_viewer::*;
}
