//! Voxelization of atoms into signed distance grids
//!
//! Each atom is splatted as a sphere into a regular grid covering the padded extent
//! of a work unit. Negative values are inside the surface. Every voxel remembers the
//! atom whose sphere surface is nearest, which later decides vertex colors.

use crate::decompose::WorkUnit;
use crate::marching_cubes::{MarchingCubes, MarchingCubesConfig};
use molsurf_core::{Error, Extent, MeshFragment, Point3f, ReducedAtom, Result};
use ndarray::{Array3, Zip};
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};

/// Owner of voxels no atom reached
pub const NO_OWNER: usize = usize::MAX;

/// Radius of the solvent probe rolled over the molecule (Å)
pub const PROBE_RADIUS: f32 = 1.4;

/// Radius used for elements missing from the table (Å)
pub const DEFAULT_VDW_RADIUS: f32 = 2.0;

/// Molecular surface variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SurfaceKind {
    /// Union of van der Waals spheres
    VanDerWaals,
    /// Probe-accessible surface with enclosed cavities filled
    SolventExcluded,
    /// Surface traced by the probe center
    SolventAccessible,
    /// Probe-accessible surface keeping enclosed cavities
    Molecular,
}

impl SurfaceKind {
    /// Whether atom spheres are inflated by the probe radius
    pub fn uses_probe(self) -> bool {
        !matches!(self, SurfaceKind::VanDerWaals)
    }

    fn erodes(self) -> bool {
        matches!(self, SurfaceKind::SolventExcluded | SurfaceKind::Molecular)
    }

    fn fills_cavities(self) -> bool {
        matches!(self, SurfaceKind::SolventExcluded)
    }
}

/// Van der Waals radius of an element tag, case insensitive
pub fn vdw_radius(elem: &str) -> f32 {
    match elem.to_ascii_uppercase().as_str() {
        "H" => 1.2,
        "LI" => 1.82,
        "NA" => 2.27,
        "K" => 2.75,
        "C" => 1.7,
        "N" => 1.55,
        "O" => 1.52,
        "F" => 1.47,
        "P" => 1.8,
        "S" => 1.8,
        "CL" => 1.75,
        "BR" => 1.85,
        "SE" => 1.9,
        "ZN" => 1.39,
        "CU" => 1.4,
        "NI" => 1.63,
        _ => DEFAULT_VDW_RADIUS,
    }
}

/// Configuration for per-unit surface computation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SurfaceConfig {
    pub probe_radius: f32,
    /// Voxels per Å for structures up to `medium_volume`
    pub scale: f32,
    pub medium_volume: f32,
    /// Voxels per Å above `medium_volume`
    pub medium_scale: f32,
    pub large_volume: f32,
    /// Voxels per Å above `large_volume`
    pub large_scale: f32,
    /// Upper bound on the voxel count of a single grid
    pub max_voxels: usize,
}

impl Default for SurfaceConfig {
    fn default() -> Self {
        Self {
            probe_radius: PROBE_RADIUS,
            scale: 2.0,
            medium_volume: 1_000_000.0,
            medium_scale: 1.0,
            large_volume: 8_000_000.0,
            large_scale: 0.5,
            max_voxels: 1 << 26,
        }
    }
}

impl SurfaceConfig {
    pub fn with_probe_radius(mut self, probe_radius: f32) -> Self {
        self.probe_radius = probe_radius;
        self
    }

    pub fn with_scale(mut self, scale: f32) -> Self {
        self.scale = scale;
        self
    }

    pub fn with_max_voxels(mut self, max_voxels: usize) -> Self {
        self.max_voxels = max_voxels;
        self
    }

    /// Grid resolution for a structure whose whole extent has `volume` Å³
    pub fn scale_for_volume(&self, volume: f32) -> f32 {
        if volume > self.large_volume {
            self.large_scale
        } else if volume > self.medium_volume {
            self.medium_scale
        } else {
            self.scale
        }
    }
}

/// Regular grid of signed distances with per-voxel owning atom
#[derive(Debug, Clone)]
pub struct VoxelGrid {
    /// World position of voxel (0, 0, 0)
    pub origin: Point3f,
    /// Distance between neighboring voxels (Å)
    pub spacing: f32,
    pub field: Array3<f32>,
    pub owner: Array3<usize>,
}

impl VoxelGrid {
    /// Empty grid covering `extent` with `scale` voxels per Å
    pub fn new(extent: &Extent, scale: f32, max_voxels: usize) -> Result<Self> {
        if scale.is_nan() || scale <= 0.0 {
            return Err(Error::InvalidData(format!("voxel scale must be positive, got {}", scale)));
        }

        let dims = extent.dimensions();
        let shape = [0, 1, 2].map(|axis| (dims[axis].max(0.0) * scale).ceil() as usize + 1);
        let total = shape.iter().try_fold(1usize, |acc, &n| acc.checked_mul(n));
        if !total.is_some_and(|t| t <= max_voxels) {
            return Err(Error::Algorithm(format!(
                "voxel grid {:?} exceeds the limit of {} voxels",
                shape, max_voxels
            )));
        }

        let shape = (shape[0], shape[1], shape[2]);
        Ok(Self {
            origin: extent.min,
            spacing: 1.0 / scale,
            field: Array3::from_elem(shape, f32::INFINITY),
            owner: Array3::from_elem(shape, NO_OWNER),
        })
    }

    /// Grid sampled from an analytic field, every voxel owned by atom 0
    pub fn from_fn<F>(origin: Point3f, spacing: f32, shape: [usize; 3], f: F) -> Self
    where
        F: Fn(&Point3f) -> f32,
    {
        let field = Array3::from_shape_fn((shape[0], shape[1], shape[2]), |(i, j, k)| {
            f(&Self::voxel_position(&origin, spacing, [i, j, k]))
        });
        Self {
            origin,
            spacing,
            owner: Array3::zeros(field.raw_dim()),
            field,
        }
    }

    fn voxel_position(origin: &Point3f, spacing: f32, index: [usize; 3]) -> Point3f {
        Point3f::new(
            origin.x + index[0] as f32 * spacing,
            origin.y + index[1] as f32 * spacing,
            origin.z + index[2] as f32 * spacing,
        )
    }

    pub fn shape(&self) -> [usize; 3] {
        let (x, y, z) = self.field.dim();
        [x, y, z]
    }

    pub fn voxel_count(&self) -> usize {
        self.field.len()
    }

    /// World position of a voxel
    pub fn position(&self, index: [usize; 3]) -> Point3f {
        Self::voxel_position(&self.origin, self.spacing, index)
    }

    pub fn value(&self, index: [usize; 3]) -> Option<f32> {
        self.field.get(index).copied()
    }

    /// Owning atom of a voxel, `None` when no atom reached it
    pub fn owner_of(&self, index: [usize; 3]) -> Option<usize> {
        self.owner.get(index).copied().filter(|&o| o != NO_OWNER)
    }

    /// Voxel index range along `axis` touched by `[lo, hi]`
    fn index_range(&self, axis: usize, lo: f32, hi: f32) -> std::ops::Range<usize> {
        let len = self.shape()[axis];
        let first = ((lo - self.origin[axis]) / self.spacing).floor();
        let last = ((hi - self.origin[axis]) / self.spacing).ceil();
        if last < 0.0 || len == 0 {
            return 0..0;
        }
        let first = first.max(0.0) as usize;
        let last = (last as usize).min(len - 1);
        first..last + 1
    }

    /// Write the signed distance to a sphere into every voxel it improves
    pub fn splat_sphere(&mut self, center: &Point3f, radius: f32, owner: usize) {
        let reach = radius + 2.0 * self.spacing;
        let xs = self.index_range(0, center.x - reach, center.x + reach);
        let ys = self.index_range(1, center.y - reach, center.y + reach);
        let zs = self.index_range(2, center.z - reach, center.z + reach);

        for i in xs {
            for j in ys.clone() {
                for k in zs.clone() {
                    let d = (self.position([i, j, k]) - center).norm() - radius;
                    let cell = &mut self.field[[i, j, k]];
                    if d < *cell {
                        *cell = d;
                        self.owner[[i, j, k]] = owner;
                    }
                }
            }
        }
    }

    /// Move the surface inward by `probe`
    ///
    /// Distances are measured from every inside voxel to the nearest outside voxel
    /// on the current boundary, propagated breadth first from the boundary.
    pub fn erode(&mut self, probe: f32) {
        let shape = self.shape();
        let cutoff = probe + 2.0 * self.spacing;
        let inside = self.field.mapv(|v| v <= 0.0);
        let mut dist = Array3::from_elem(self.field.raw_dim(), f32::INFINITY);
        let mut seed = Array3::from_elem(self.field.raw_dim(), [0usize; 3]);
        let mut queue = VecDeque::new();

        for ((i, j, k), &is_inside) in inside.indexed_iter() {
            let v = [i, j, k];
            if !is_inside && face_neighbors(shape, v).any(|n| inside[n]) {
                dist[v] = 0.0;
                seed[v] = v;
                queue.push_back(v);
            }
        }

        while let Some(v) = queue.pop_front() {
            let from = seed[v];
            let from_pos = self.position(from);
            for n in face_neighbors(shape, v) {
                if !inside[n] {
                    continue;
                }
                let d = (self.position(n) - from_pos).norm();
                if d <= cutoff && d < dist[n] {
                    dist[n] = d;
                    seed[n] = from;
                    queue.push_back(n);
                }
            }
        }

        Zip::from(&mut self.field).and(&dist).for_each(|f, &d| {
            *f = if *f <= 0.0 {
                probe - d.min(cutoff)
            } else {
                probe + *f
            };
        });
    }

    /// Turn outside regions that cannot reach the grid border into inside
    ///
    /// Returns the number of filled voxels.
    pub fn fill_cavities(&mut self) -> usize {
        let shape = self.shape();
        let mut reached = Array3::from_elem(self.field.raw_dim(), false);
        let mut queue = VecDeque::new();

        for ((i, j, k), &value) in self.field.indexed_iter() {
            let on_border = i == 0
                || j == 0
                || k == 0
                || i + 1 == shape[0]
                || j + 1 == shape[1]
                || k + 1 == shape[2];
            if on_border && value > 0.0 {
                reached[[i, j, k]] = true;
                queue.push_back([i, j, k]);
            }
        }

        while let Some(v) = queue.pop_front() {
            for n in face_neighbors(shape, v) {
                if !reached[n] && self.field[n] > 0.0 {
                    reached[n] = true;
                    queue.push_back(n);
                }
            }
        }

        let fill = -self.spacing;
        let mut filled = 0;
        Zip::from(&mut self.field).and(&reached).for_each(|f, &r| {
            if *f > 0.0 && !r {
                *f = fill;
                filled += 1;
            }
        });
        filled
    }
}

/// The up to six voxels sharing a face with `v`
fn face_neighbors(shape: [usize; 3], v: [usize; 3]) -> impl Iterator<Item = [usize; 3]> {
    const STEPS: [(usize, isize); 6] = [(0, -1), (0, 1), (1, -1), (1, 1), (2, -1), (2, 1)];
    STEPS.into_iter().filter_map(move |(axis, step)| {
        let c = v[axis].checked_add_signed(step)?;
        if c >= shape[axis] {
            return None;
        }
        let mut n = v;
        n[axis] = c;
        Some(n)
    })
}

/// Build the surface fragment of one work unit
///
/// `atoms` is the full reduced snapshot the unit's indices point into and `volume`
/// the volume of the whole surface extent, which selects the grid resolution.
/// Only vertices owned by the unit's shown atoms are kept.
pub fn compute_fragment(
    kind: SurfaceKind,
    unit: &WorkUnit,
    atoms: &[ReducedAtom],
    volume: f32,
    config: &SurfaceConfig,
) -> Result<MeshFragment> {
    let scale = config.scale_for_volume(volume);
    let mut grid = VoxelGrid::new(&unit.padded, scale, config.max_voxels)?;

    let probe = if kind.uses_probe() {
        config.probe_radius
    } else {
        0.0
    };
    for &index in &unit.atoms {
        let atom = atoms.get(index).ok_or_else(|| {
            Error::InvalidData(format!(
                "atom index {} outside of a snapshot of {} atoms",
                index,
                atoms.len()
            ))
        })?;
        grid.splat_sphere(&atom.position, vdw_radius(&atom.elem) + probe, index);
    }

    if kind.erodes() {
        grid.erode(config.probe_radius);
        if kind.fills_cavities() {
            let filled = grid.fill_cavities();
            if filled > 0 {
                log::trace!("filled {} cavity voxels", filled);
            }
        }
    }

    let fragment = MarchingCubes::new(MarchingCubesConfig::default()).extract(&grid);
    let toshow: HashSet<usize> = unit.toshow.iter().copied().collect();
    Ok(fragment.restrict(|atom| toshow.contains(&atom)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decompose::{carve_up_extent, DecompositionConfig};

    fn single_atom_unit(elem: &str) -> (WorkUnit, Vec<ReducedAtom>) {
        let center = Point3f::new(5.0, 5.0, 5.0);
        let atoms = vec![ReducedAtom {
            position: center,
            serial: 0,
            elem: elem.to_string(),
        }];
        let extent = Extent::new(Point3f::new(3.0, 3.0, 3.0), Point3f::new(7.0, 7.0, 7.0));
        let units = carve_up_extent(&extent, &[center], &[0], &DecompositionConfig::default()).unwrap();
        (units.into_iter().next().unwrap(), atoms)
    }

    fn radii(fragment: &MeshFragment) -> (f32, f32) {
        let center = Point3f::new(5.0, 5.0, 5.0);
        fragment
            .vertices
            .iter()
            .map(|v| (v - center).norm())
            .fold((f32::MAX, f32::MIN), |(lo, hi), r| (lo.min(r), hi.max(r)))
    }

    #[test]
    fn test_vdw_radius_table() {
        assert_eq!(vdw_radius("C"), 1.7);
        assert_eq!(vdw_radius("Cl"), 1.75);
        assert_eq!(vdw_radius("zn"), 1.39);
        assert_eq!(vdw_radius("Xx"), DEFAULT_VDW_RADIUS);
    }

    #[test]
    fn test_scale_tiers() {
        let config = SurfaceConfig::default();
        assert_eq!(config.scale_for_volume(1000.0), 2.0);
        assert_eq!(config.scale_for_volume(1_000_000.0), 2.0);
        assert_eq!(config.scale_for_volume(2_000_000.0), 1.0);
        assert_eq!(config.scale_for_volume(9_000_000.0), 0.5);
    }

    #[test]
    fn test_grid_limit() {
        let extent = Extent::new(Point3f::origin(), Point3f::new(100.0, 100.0, 100.0));
        let result = VoxelGrid::new(&extent, 2.0, 1000);
        assert!(matches!(result, Err(Error::Algorithm(_))));

        let grid = VoxelGrid::new(&extent, 0.1, 1000).unwrap();
        assert_eq!(grid.shape(), [11, 11, 11]);
        assert!(VoxelGrid::new(&extent, 0.0, 1000).is_err());
    }

    #[test]
    fn test_splat_keeps_nearest_owner() {
        let extent = Extent::new(Point3f::origin(), Point3f::new(10.0, 4.0, 4.0));
        let mut grid = VoxelGrid::new(&extent, 1.0, 1 << 20).unwrap();
        grid.splat_sphere(&Point3f::new(2.0, 2.0, 2.0), 1.5, 7);
        grid.splat_sphere(&Point3f::new(5.0, 2.0, 2.0), 1.5, 9);

        assert_eq!(grid.value([2, 2, 2]), Some(-1.5));
        assert_eq!(grid.owner_of([2, 2, 2]), Some(7));
        assert_eq!(grid.owner_of([4, 2, 2]), Some(9));
        assert_eq!(grid.owner_of([10, 2, 2]), None);
        assert_eq!(grid.value([10, 2, 2]), Some(f32::INFINITY));
    }

    #[test]
    fn test_vdw_and_sas_sphere_radii() {
        let (unit, atoms) = single_atom_unit("C");
        let config = SurfaceConfig::default();

        let vdw = compute_fragment(SurfaceKind::VanDerWaals, &unit, &atoms, 64.0, &config).unwrap();
        assert!(!vdw.is_empty());
        let (lo, hi) = radii(&vdw);
        assert!(lo > 1.7 - 0.1 && hi < 1.7 + 0.1, "vdw radii {} {}", lo, hi);
        assert!(vdw.atom_ids.iter().all(|&a| a == 0));

        let sas = compute_fragment(SurfaceKind::SolventAccessible, &unit, &atoms, 64.0, &config).unwrap();
        let (lo, hi) = radii(&sas);
        assert!(lo > 3.1 - 0.1 && hi < 3.1 + 0.1, "sas radii {} {}", lo, hi);
    }

    #[test]
    fn test_excluded_surface_of_single_atom_is_close_to_vdw() {
        let (unit, atoms) = single_atom_unit("C");
        let config = SurfaceConfig::default();

        for kind in [SurfaceKind::SolventExcluded, SurfaceKind::Molecular] {
            let fragment = compute_fragment(kind, &unit, &atoms, 64.0, &config).unwrap();
            assert!(!fragment.is_empty());
            let (lo, hi) = radii(&fragment);
            assert!(lo > 1.7 - 0.5 && hi < 1.7 + 0.8, "{:?} radii {} {}", kind, lo, hi);
        }
    }

    #[test]
    fn test_hidden_atoms_are_dropped() {
        let (mut unit, atoms) = single_atom_unit("O");
        unit.toshow.clear();
        let fragment =
            compute_fragment(SurfaceKind::VanDerWaals, &unit, &atoms, 64.0, &SurfaceConfig::default())
                .unwrap();
        assert!(fragment.is_empty());
    }

    #[test]
    fn test_bad_atom_index_is_an_error() {
        let (mut unit, atoms) = single_atom_unit("N");
        unit.atoms.push(3);
        let result =
            compute_fragment(SurfaceKind::VanDerWaals, &unit, &atoms, 64.0, &SurfaceConfig::default());
        assert!(matches!(result, Err(Error::InvalidData(_))));
    }

    #[test]
    fn test_fill_cavities() {
        // hollow shell: inside between radius 2 and 4, outside elsewhere
        let center = Point3f::new(5.0, 5.0, 5.0);
        let mut grid = VoxelGrid::from_fn(Point3f::origin(), 0.5, [21, 21, 21], |p| {
            let r = (p - center).norm();
            if (2.0..=4.0).contains(&r) {
                -0.5
            } else {
                0.5
            }
        });

        let filled = grid.fill_cavities();
        assert!(filled > 0);
        assert!(grid.value([10, 10, 10]).unwrap() < 0.0);
        assert!(grid.value([0, 0, 0]).unwrap() > 0.0);
        assert_eq!(grid.fill_cavities(), 0);
    }
}
