//! Extent decomposition
//!
//! Large structures are carved into sub-extents whose volume stays under a budget,
//! so that each piece can be voxelized with bounded memory and scheduled on its own.
//! Each leaf is padded so that atoms just outside of it still shape the surface
//! inside of it.

use molsurf_core::{Error, Extent, Point3f, Result};
use serde::{Deserialize, Serialize};

/// Configuration for extent decomposition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecompositionConfig {
    /// Leaves are split until their volume drops below this value (Å³)
    pub max_volume: f32,
    /// Padding added to every face of a leaf when collecting atoms (Å)
    pub padding: f32,
}

impl Default for DecompositionConfig {
    fn default() -> Self {
        Self {
            max_volume: 64000.0,
            padding: 6.0,
        }
    }
}

impl DecompositionConfig {
    pub fn with_max_volume(mut self, max_volume: f32) -> Self {
        self.max_volume = max_volume;
        self
    }

    pub fn with_padding(mut self, padding: f32) -> Self {
        self.padding = padding;
        self
    }
}

/// One independently computable piece of a surface
#[derive(Debug, Clone, PartialEq)]
pub struct WorkUnit {
    /// Leaf extent
    pub extent: Extent,
    /// Leaf extent grown by the padding
    pub padded: Extent,
    /// Snapshot indices of all atoms inside the padded extent
    pub atoms: Vec<usize>,
    /// Snapshot indices of shown atoms inside the leaf extent
    pub toshow: Vec<usize>,
}

fn is_finite(extent: &Extent) -> bool {
    extent.min.iter().chain(extent.max.iter()).all(|v| v.is_finite())
}

/// Recursively bisect `extent` until every leaf has a volume below `max_volume`
///
/// Leaves are returned in depth-first order, lower half first. An extent whose
/// midpoint cannot move in `f32` is kept as a leaf even when over budget.
pub fn split_extent(extent: &Extent, max_volume: f32) -> Result<Vec<Extent>> {
    if max_volume.is_nan() || max_volume <= 0.0 {
        return Err(Error::InvalidData(format!(
            "volume budget must be positive, got {}",
            max_volume
        )));
    }
    if !is_finite(extent) {
        return Err(Error::InvalidData(format!("extent is not finite: {:?}", extent)));
    }

    let mut leaves = Vec::new();
    let mut stack = vec![*extent];
    while let Some(current) = stack.pop() {
        if current.volume() < max_volume {
            leaves.push(current);
            continue;
        }
        let (lower, upper) = current.bisect();
        if lower == current || upper == current {
            log::warn!("extent {:?} is too thin to bisect, keeping it whole", current);
            leaves.push(current);
        } else {
            stack.push(upper);
            stack.push(lower);
        }
    }
    Ok(leaves)
}

/// Indices of the positions inside `extent`, bounds included
pub fn atoms_within<'a, I>(positions: I, extent: &Extent) -> Vec<usize>
where
    I: IntoIterator<Item = &'a Point3f>,
{
    positions
        .into_iter()
        .enumerate()
        .filter(|(_, p)| extent.contains(p))
        .map(|(i, _)| i)
        .collect()
}

/// Split `extent` under the budget and collect the atoms of every leaf
///
/// `all` is the full position snapshot; `to_show` holds indices into it.
pub fn carve_up_extent(
    extent: &Extent,
    all: &[Point3f],
    to_show: &[usize],
    config: &DecompositionConfig,
) -> Result<Vec<WorkUnit>> {
    let leaves = split_extent(extent, config.max_volume)?;

    let units = leaves
        .into_iter()
        .map(|leaf| {
            let padded = leaf.padded(config.padding);
            let atoms = atoms_within(all, &padded);
            let toshow = to_show
                .iter()
                .copied()
                .filter(|&i| all.get(i).is_some_and(|p| leaf.contains(p)))
                .collect();

            WorkUnit {
                extent: leaf,
                padded,
                atoms,
                toshow,
            }
        })
        .collect::<Vec<_>>();

    log::debug!(
        "carved extent {:?} into {} work units (budget {})",
        extent,
        units.len(),
        config.max_volume
    );
    Ok(units)
}

/// Order units so that those nearest to the focus atoms are computed first
///
/// The sort is stable and keyed on the squared distance from each unit's maximum
/// corner to the focus centroid. An empty focus leaves the order untouched.
pub fn sort_by_focus(units: &mut [WorkUnit], focus: &[Point3f]) {
    let Some(centroid) = Extent::centroid(focus) else {
        return;
    };
    units.sort_by(|a, b| {
        let da = (a.extent.max - centroid).norm_squared();
        let db = (b.extent.max - centroid).norm_squared();
        da.total_cmp(&db)
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn extent(max: [f32; 3]) -> Extent {
        Extent::new(Point3f::origin(), Point3f::new(max[0], max[1], max[2]))
    }

    #[test]
    fn test_split_under_budget_is_single_leaf() {
        let e = extent([10.0, 10.0, 10.0]);
        let leaves = split_extent(&e, 1001.0).unwrap();
        assert_eq!(leaves, vec![e]);
    }

    #[test]
    fn test_split_leaves_tile_input() {
        let e = Extent::new(Point3f::new(-3.0, 1.0, 2.0), Point3f::new(57.0, 31.0, 44.0));
        let budget = 5000.0;
        let leaves = split_extent(&e, budget).unwrap();

        assert!(leaves.len() > 1);
        assert!(leaves.iter().all(|l| l.volume() < budget));

        let total: f32 = leaves.iter().map(|l| l.volume()).sum();
        assert_relative_eq!(total, e.volume(), max_relative = 1e-4);

        for leaf in &leaves {
            assert!(e.contains(&leaf.min) && e.contains(&leaf.max));
        }
    }

    #[test]
    fn test_split_axis_ties_go_to_z() {
        // x and y tie: neither is strictly longest
        let leaves = split_extent(&extent([4.0, 4.0, 2.0]), 32.0).unwrap();
        assert_eq!(leaves.len(), 2);
        assert_relative_eq!(leaves[0].max.z, 1.0);
        assert_relative_eq!(leaves[0].max.x, 4.0);

        let leaves = split_extent(&extent([2.0, 4.0, 2.0]), 16.0).unwrap();
        assert_relative_eq!(leaves[0].max.y, 2.0);
    }

    #[test]
    fn test_split_degenerate_inputs() {
        let flat = extent([10.0, 10.0, 0.0]);
        assert_eq!(split_extent(&flat, 1.0).unwrap(), vec![flat]);

        assert!(matches!(split_extent(&flat, 0.0), Err(Error::InvalidData(_))));
        assert!(split_extent(&flat, -5.0).is_err());
        assert!(split_extent(&flat, f32::NAN).is_err());
    }

    #[test]
    fn test_split_stops_when_midpoint_cannot_move() {
        // 2^24 + 1 is not representable, so the midpoint rounds onto the min corner
        let e = Extent::new(Point3f::new(16777216.0, 0.0, 0.0), Point3f::new(16777218.0, 1.0, 1.0));
        let leaves = split_extent(&e, 1.0).unwrap();
        assert_eq!(leaves, vec![e]);
    }

    #[test]
    fn test_atoms_within_is_inclusive() {
        let e = extent([1.0, 1.0, 1.0]);
        let points = [
            Point3f::new(0.0, 0.0, 0.0),
            Point3f::new(1.0, 1.0, 1.0),
            Point3f::new(1.0001, 0.5, 0.5),
            Point3f::new(0.5, -0.0001, 0.5),
            Point3f::new(0.5, 0.5, 1.0),
        ];
        assert_eq!(atoms_within(&points, &e), vec![0, 1, 4]);
    }

    #[test]
    fn test_carve_up_pads_atoms_but_not_toshow() {
        let e = extent([20.0, 20.0, 20.0]);
        let all = vec![
            Point3f::new(5.0, 10.0, 10.0),
            Point3f::new(15.0, 10.0, 10.0),
        ];
        let config = DecompositionConfig::default().with_max_volume(5000.0);
        let units = carve_up_extent(&e, &all, &[0, 1], &config).unwrap();

        assert_eq!(units.len(), 2);
        assert_relative_eq!(units[0].extent.max.z, 10.0);
        assert_relative_eq!(units[0].padded.min.x, -6.0);
        // both atoms sit on the z = 10 cut, so both leaves see them
        for unit in &units {
            assert_eq!(unit.atoms, vec![0, 1]);
            assert_eq!(unit.toshow, vec![0, 1]);
        }
    }

    #[test]
    fn test_carve_up_only_shown_atoms_in_toshow() {
        let e = extent([10.0, 10.0, 10.0]);
        let all = vec![Point3f::new(1.0, 1.0, 1.0), Point3f::new(2.0, 2.0, 2.0)];
        let units = carve_up_extent(&e, &all, &[1, 7], &DecompositionConfig::default()).unwrap();
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].atoms, vec![0, 1]);
        assert_eq!(units[0].toshow, vec![1]);
    }

    #[test]
    fn test_sort_by_focus() {
        let e = extent([40.0, 10.0, 10.0]);
        let config = DecompositionConfig::default().with_max_volume(1001.0);
        let mut units = carve_up_extent(&e, &[], &[], &config).unwrap();
        assert_eq!(units.len(), 4);

        let focus = [Point3f::new(40.0, 10.0, 10.0)];
        sort_by_focus(&mut units, &focus);
        let maxes: Vec<f32> = units.iter().map(|u| u.extent.max.x).collect();
        assert_eq!(maxes, vec![40.0, 30.0, 20.0, 10.0]);

        let before = units.clone();
        sort_by_focus(&mut units, &[]);
        assert_eq!(units, before);
    }
}
