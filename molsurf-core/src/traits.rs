//! Traits through which external collaborators are consumed

use crate::material::Material;
use crate::mesh::SurfaceMesh;
use crate::point::{Atom, AtomSelection, Rgb};

/// Opaque id of a drawable owned by a render backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DrawableHandle(pub u64);

/// GPU side of the viewer
pub trait RenderBackend {
    /// Upload a mesh with its material and return a handle to the new drawable
    fn create_drawable(&mut self, mesh: &SurfaceMesh, material: &Material) -> DrawableHandle;

    /// Release the geometry and material of a drawable
    fn remove_drawable(&mut self, handle: DrawableHandle);

    /// Ask for a new frame at the backend's convenience
    fn request_redraw(&mut self);
}

/// Color schemes and gradients
pub trait ColorLookup {
    /// Gradient color of `value` within `range`
    fn color_for_value(&self, value: f32, range: [f32; 2]) -> Rgb;

    /// Default color of an element tag
    fn color_for_element(&self, elem: &str) -> Rgb;
}

/// Something that can hand out atoms matching a selection
pub trait AtomSource {
    type Selection;

    fn selected_atoms(&self, selection: &Self::Selection) -> Vec<Atom>;
}

impl AtomSource for [Atom] {
    type Selection = AtomSelection;

    fn selected_atoms(&self, selection: &AtomSelection) -> Vec<Atom> {
        self.iter().filter(|a| selection.matches(a)).cloned().collect()
    }
}

impl AtomSource for Vec<Atom> {
    type Selection = AtomSelection;

    fn selected_atoms(&self, selection: &AtomSelection) -> Vec<Atom> {
        self.as_slice().selected_atoms(selection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::point::Point3f;

    #[test]
    fn test_vec_atom_source() {
        let atoms = vec![
            Atom::new(1, Point3f::new(0.0, 0.0, 0.0), "C"),
            Atom::new(2, Point3f::new(1.0, 0.0, 0.0), "O"),
            Atom::new(3, Point3f::new(2.0, 0.0, 0.0), "C"),
        ];

        let carbons = atoms.selected_atoms(&AtomSelection::all().with_elements(vec!["c".into()]));
        assert_eq!(carbons.iter().map(|a| a.serial).collect::<Vec<_>>(), vec![1, 3]);
        assert_eq!(atoms.selected_atoms(&AtomSelection::all()).len(), 3);
    }
}
