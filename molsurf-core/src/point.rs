//! Atom types and related functionality

use crate::extent::Extent;
use crate::shapes::IntersectionShape;
use bytemuck::{Pod, Zeroable};
use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A 3D point with floating point coordinates
pub type Point3f = Point3<f32>;

/// A 3D vector with floating point components
pub type Vector3f = Vector3<f32>;

/// Linear RGB color with components in `[0, 1]`
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, Pod, Zeroable)]
#[repr(C)]
pub struct Rgb {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Rgb {
    pub const WHITE: Rgb = Rgb::new(1.0, 1.0, 1.0);

    pub const fn new(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }

    /// Build a color from a `0xRRGGBB` value
    pub fn from_hex(hex: u32) -> Self {
        Self {
            r: ((hex >> 16) & 0xff) as f32 / 255.0,
            g: ((hex >> 8) & 0xff) as f32 / 255.0,
            b: (hex & 0xff) as f32 / 255.0,
        }
    }
}

/// A point primitive of the model (an atom)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Atom {
    /// Identity of the atom within its model
    pub serial: usize,
    pub position: Point3f,
    /// Element or category tag
    pub elem: String,
    #[serde(default)]
    pub clickable: bool,
    /// Analytic shapes used for picking; only consulted when `clickable`
    #[serde(default)]
    pub intersection_shape: Option<IntersectionShape>,
    /// Per-atom override color for surfaces
    #[serde(default)]
    pub surface_color: Option<Rgb>,
    /// Numeric properties available to gradient coloring
    #[serde(default)]
    pub properties: HashMap<String, f32>,
}

impl Atom {
    /// Create a non-clickable atom without properties
    pub fn new(serial: usize, position: Point3f, elem: impl Into<String>) -> Self {
        Self {
            serial,
            position,
            elem: elem.into(),
            clickable: false,
            intersection_shape: None,
            surface_color: None,
            properties: HashMap::new(),
        }
    }

    /// Attach a numeric property
    pub fn with_property(mut self, name: impl Into<String>, value: f32) -> Self {
        self.properties.insert(name.into(), value);
        self
    }

    /// Make the atom pickable through the given shape
    pub fn with_intersection_shape(mut self, shape: IntersectionShape) -> Self {
        self.clickable = true;
        self.intersection_shape = Some(shape);
        self
    }

    /// Reduce to the fields needed for surface geometry, renumbered to `index`
    pub fn reduced(&self, index: usize) -> ReducedAtom {
        ReducedAtom {
            position: self.position,
            serial: index,
            elem: self.elem.clone(),
        }
    }
}

/// Immutable snapshot of an atom handed to surface workers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReducedAtom {
    pub position: Point3f,
    /// Index of the atom in the snapshot it belongs to
    pub serial: usize,
    pub elem: String,
}

/// Simple predicate over atoms
///
/// Every populated field must match; an empty selection matches everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AtomSelection {
    pub serials: Option<Vec<usize>>,
    pub elements: Option<Vec<String>>,
    pub within: Option<Extent>,
    pub clickable: Option<bool>,
}

impl AtomSelection {
    /// Selection matching every atom
    pub fn all() -> Self {
        Self::default()
    }

    pub fn with_serials(mut self, serials: Vec<usize>) -> Self {
        self.serials = Some(serials);
        self
    }

    pub fn with_elements(mut self, elements: Vec<String>) -> Self {
        self.elements = Some(elements);
        self
    }

    pub fn within(mut self, extent: Extent) -> Self {
        self.within = Some(extent);
        self
    }

    pub fn with_clickable(mut self, clickable: bool) -> Self {
        self.clickable = Some(clickable);
        self
    }

    /// Check whether an atom satisfies the selection
    pub fn matches(&self, atom: &Atom) -> bool {
        if let Some(serials) = &self.serials {
            if !serials.contains(&atom.serial) {
                return false;
            }
        }
        if let Some(elements) = &self.elements {
            if !elements.iter().any(|e| e.eq_ignore_ascii_case(&atom.elem)) {
                return false;
            }
        }
        if let Some(extent) = &self.within {
            if !extent.contains(&atom.position) {
                return false;
            }
        }
        if let Some(clickable) = self.clickable {
            if atom.clickable != clickable {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rgb_from_hex() {
        let c = Rgb::from_hex(0xff8000);
        assert_eq!(c.r, 1.0);
        assert!((c.g - 128.0 / 255.0).abs() < 1e-6);
        assert_eq!(c.b, 0.0);
    }

    #[test]
    fn test_reduced_atom_keeps_geometry() {
        let atom = Atom::new(42, Point3f::new(1.0, 2.0, 3.0), "C").with_property("b", 7.0);
        let reduced = atom.reduced(3);
        assert_eq!(reduced.serial, 3);
        assert_eq!(reduced.position, atom.position);
        assert_eq!(reduced.elem, "C");
    }

    #[test]
    fn test_selection_matches() {
        let atoms = vec![
            Atom::new(0, Point3f::new(0.0, 0.0, 0.0), "C"),
            Atom::new(1, Point3f::new(5.0, 0.0, 0.0), "N"),
            Atom::new(2, Point3f::new(1.0, 1.0, 1.0), "O"),
        ];

        let by_elem = AtomSelection::all().with_elements(vec!["c".into(), "O".into()]);
        let picked: Vec<usize> = atoms.iter().filter(|a| by_elem.matches(a)).map(|a| a.serial).collect();
        assert_eq!(picked, vec![0, 2]);

        let near = AtomSelection::all().within(Extent::new(
            Point3f::new(-1.0, -1.0, -1.0),
            Point3f::new(1.0, 1.0, 1.0),
        ));
        let picked: Vec<usize> = atoms.iter().filter(|a| near.matches(a)).map(|a| a.serial).collect();
        assert_eq!(picked, vec![0, 2]);

        assert!(atoms.iter().all(|a| AtomSelection::all().matches(a)));
    }
}
