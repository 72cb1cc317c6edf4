//! Mesh data structures and functionality

use crate::extent::Extent;
use crate::point::*;
use serde::{Deserialize, Serialize};

/// Partial surface produced from one work unit
///
/// Every vertex is tagged with the snapshot index of the atom it was generated for,
/// which the merge step uses for coloring.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeshFragment {
    pub vertices: Vec<Point3f>,
    pub atom_ids: Vec<usize>,
    pub faces: Vec<[u32; 3]>,
}

impl MeshFragment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty() || self.faces.is_empty()
    }

    /// Add a vertex owned by `atom` and return its index
    pub fn add_vertex(&mut self, vertex: Point3f, atom: usize) -> u32 {
        let index = self.vertices.len() as u32;
        self.vertices.push(vertex);
        self.atom_ids.push(atom);
        index
    }

    /// Keep only vertices whose atom passes `keep`, and the faces made entirely of them
    pub fn restrict<F>(&self, keep: F) -> MeshFragment
    where
        F: Fn(usize) -> bool,
    {
        let mut remap = vec![u32::MAX; self.vertices.len()];
        let mut out = MeshFragment::new();

        for (i, (&v, &atom)) in self.vertices.iter().zip(&self.atom_ids).enumerate() {
            if keep(atom) {
                remap[i] = out.add_vertex(v, atom);
            }
        }

        out.faces = self
            .faces
            .iter()
            .filter_map(|f| {
                let mapped = [
                    remap[f[0] as usize],
                    remap[f[1] as usize],
                    remap[f[2] as usize],
                ];
                (!mapped.contains(&u32::MAX)).then_some(mapped)
            })
            .collect();

        out
    }
}

/// Growable surface buffer that fragments are merged into
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SurfaceMesh {
    pub positions: Vec<Point3f>,
    pub colors: Vec<Rgb>,
    /// Sum of adjacent unit face normals; normalization is left to the renderer
    pub normals: Vec<Vector3f>,
    pub faces: Vec<[u32; 3]>,
    pub atom_ids: Vec<usize>,
}

impl SurfaceMesh {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty() || self.faces.is_empty()
    }

    /// Append a fragment, coloring each vertex from its source atom
    pub fn append_fragment<F>(&mut self, fragment: &MeshFragment, color_of: F)
    where
        F: Fn(usize) -> Rgb,
    {
        let offset = self.positions.len() as u32;

        self.positions.extend_from_slice(&fragment.vertices);
        self.atom_ids.extend_from_slice(&fragment.atom_ids);
        self.colors
            .extend(fragment.atom_ids.iter().map(|&atom| color_of(atom)));
        self.normals
            .resize(self.positions.len(), Vector3f::zeros());

        for face in &fragment.faces {
            let [a, b, c] = face.map(|i| i + offset);
            self.faces.push([a, b, c]);

            let va = self.positions[a as usize];
            let vb = self.positions[b as usize];
            let vc = self.positions[c as usize];

            let normal = (vc - vb).cross(&(va - vb));
            let Some(normal) = normal.try_normalize(f32::EPSILON) else {
                continue;
            };

            self.normals[a as usize] += normal;
            self.normals[b as usize] += normal;
            self.normals[c as usize] += normal;
        }
    }

    /// Unit length copy of the accumulated normals
    pub fn normalized_normals(&self) -> Vec<Vector3f> {
        self.normals
            .iter()
            .map(|n| n.try_normalize(f32::EPSILON).unwrap_or_else(Vector3f::z))
            .collect()
    }

    /// Bounds of all vertices
    pub fn bounding_box(&self) -> Option<Extent> {
        Extent::from_points(&self.positions)
    }

    /// Vertex colors as raw bytes for upload
    pub fn color_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.colors)
    }

    /// Triangle indices as raw bytes for upload
    pub fn index_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.faces)
    }

    pub fn clear(&mut self) {
        self.positions.clear();
        self.colors.clear();
        self.normals.clear();
        self.faces.clear();
        self.atom_ids.clear();
    }
}
