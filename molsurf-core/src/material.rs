//! Surface style and material descriptors

use crate::point::Rgb;
use serde::{Deserialize, Serialize};

/// Gradient coloring driven by a numeric atom property
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyMap {
    /// Name of the property in `Atom::properties`
    pub prop: String,
    /// Fixed gradient range; computed from the shown atoms when absent
    #[serde(default)]
    pub range: Option<[f32; 2]>,
}

/// User supplied surface style
///
/// Unknown fields are ignored when deserializing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SurfaceStyle {
    pub opacity: Option<f32>,
    /// Explicit color for the whole surface
    pub color: Option<Rgb>,
    pub map: Option<PropertyMap>,
    pub wireframe: Option<bool>,
}

impl SurfaceStyle {
    pub fn with_opacity(mut self, opacity: f32) -> Self {
        self.opacity = Some(opacity);
        self
    }

    pub fn with_color(mut self, color: Rgb) -> Self {
        self.color = Some(color);
        self
    }

    pub fn with_map(mut self, prop: impl Into<String>, range: Option<[f32; 2]>) -> Self {
        self.map = Some(PropertyMap {
            prop: prop.into(),
            range,
        });
        self
    }
}

/// Which faces the renderer should draw
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Front,
    Double,
}

/// Lambert-style material handed to the render backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Material {
    pub opacity: f32,
    pub transparent: bool,
    pub vertex_colors: bool,
    pub wireframe: bool,
    pub side: Side,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            opacity: 1.0,
            transparent: false,
            vertex_colors: true,
            wireframe: false,
            side: Side::Double,
        }
    }
}

impl Material {
    /// Build a material from a style; colors are carried per vertex, not here
    pub fn from_style(style: &SurfaceStyle) -> Self {
        let mut material = Material::default();
        if let Some(opacity) = style.opacity {
            material.opacity = opacity.clamp(0.0, 1.0);
            material.transparent = material.opacity < 1.0;
        }
        if let Some(wireframe) = style.wireframe {
            material.wireframe = wireframe;
        }
        material
    }

    /// Fully transparent surfaces are committed but not shown
    pub fn is_hidden(&self) -> bool {
        self.transparent && self.opacity == 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_material_from_style() {
        let m = Material::from_style(&SurfaceStyle::default());
        assert_eq!(m, Material::default());

        let m = Material::from_style(&SurfaceStyle::default().with_opacity(0.5));
        assert!(m.transparent);
        assert_eq!(m.opacity, 0.5);
        assert!(!m.is_hidden());

        let m = Material::from_style(&SurfaceStyle::default().with_opacity(1.0));
        assert!(!m.transparent);

        let m = Material::from_style(&SurfaceStyle::default().with_opacity(0.0));
        assert!(m.is_hidden());
    }
}
