//! Surface construction pipeline
//!
//! [`SurfaceManager`] owns every surface of a viewer. Building a surface snapshots
//! the atoms, carves the extent into work units and hands them to a
//! [`WorkDispatcher`]. Fragments coming back are merged into the surface mesh, and
//! every render pass recommits surfaces that are still growing.

use crate::decompose::{carve_up_extent, sort_by_focus, DecompositionConfig};
use crate::dispatch::{create_dispatcher, DispatchConfig, SurfaceJob, WorkDispatcher, WorkerEvent};
use crate::voxel::{SurfaceConfig, SurfaceKind};
use itertools::{Itertools, MinMaxResult};
use molsurf_core::{
    Atom, ColorLookup, DrawableHandle, Extent, Handle, HandleTable, Material, NodeId, Point3f,
    ReducedAtom, RenderBackend, Result, Rgb, SceneGraph, Side, SurfaceMesh, SurfaceStyle,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Stable id of a surface
pub type SurfaceId = Handle<SurfaceObject>;

/// Drawable last committed for a surface and the scene node carrying it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommittedDrawable {
    pub handle: DrawableHandle,
    pub node: NodeId,
}

/// A surface under construction or complete
#[derive(Debug, Clone, Default)]
pub struct SurfaceObject {
    pub mesh: SurfaceMesh,
    pub material: Material,
    /// Every unit has delivered its fragment
    pub done: bool,
    /// The complete mesh has been committed
    pub finished: bool,
    /// Number of work units the surface was split into
    pub expected: usize,
    pub received: usize,
    pub failed: usize,
    /// Color of every snapshot atom
    colors: Vec<Rgb>,
    pub committed: Option<CommittedDrawable>,
}

/// Parameters of a surface build
#[derive(Debug, Clone)]
pub struct SurfaceRequest {
    pub kind: SurfaceKind,
    pub style: SurfaceStyle,
    /// Atoms whose surface is shown
    pub to_show: Vec<Atom>,
    /// Atoms shaping the surface; defaults to `to_show`
    pub all: Option<Vec<Atom>>,
    /// Atoms to build around first; defaults to `to_show`
    pub focus: Option<Vec<Atom>>,
    /// Extent to decompose; defaults to the bounds of `to_show`
    pub extent: Option<Extent>,
}

impl SurfaceRequest {
    pub fn new(kind: SurfaceKind, to_show: Vec<Atom>) -> Self {
        Self {
            kind,
            style: SurfaceStyle::default(),
            to_show,
            all: None,
            focus: None,
            extent: None,
        }
    }

    pub fn with_style(mut self, style: SurfaceStyle) -> Self {
        self.style = style;
        self
    }

    pub fn with_all(mut self, all: Vec<Atom>) -> Self {
        self.all = Some(all);
        self
    }

    pub fn with_focus(mut self, focus: Vec<Atom>) -> Self {
        self.focus = Some(focus);
        self
    }

    pub fn with_extent(mut self, extent: Extent) -> Self {
        self.extent = Some(extent);
        self
    }
}

/// Configuration of the whole pipeline
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub decomposition: DecompositionConfig,
    pub surface: SurfaceConfig,
    pub dispatch: DispatchConfig,
}

/// Minimum and maximum of an atom property
///
/// Atoms without the property are skipped. With no finite bound at all the range is
/// `[0, 0]`; a single missing bound copies the other one.
pub fn property_range<'a, I>(atoms: I, prop: &str) -> [f32; 2]
where
    I: IntoIterator<Item = &'a Atom>,
{
    let values = atoms
        .into_iter()
        .filter_map(|a| a.properties.get(prop).copied())
        .filter(|v| !v.is_nan());

    let (min, max) = match values.minmax_by(|a, b| a.total_cmp(b)) {
        MinMaxResult::NoElements => (f32::INFINITY, f32::NEG_INFINITY),
        MinMaxResult::OneElement(v) => (v, v),
        MinMaxResult::MinMax(lo, hi) => (lo, hi),
    };

    match (min.is_finite(), max.is_finite()) {
        (true, true) => [min, max],
        (false, true) => [max, max],
        (true, false) => [min, min],
        (false, false) => [0.0, 0.0],
    }
}

/// Color of every atom of `all` for a surface styled with `style`
///
/// An explicit style color wins, then the atom's own surface color, then the
/// gradient map, then the element color. The gradient range defaults to the range
/// of the property over the shown atoms.
pub fn surface_colors<C>(all: &[Atom], shown: &[usize], style: &SurfaceStyle, lookup: &C) -> Vec<Rgb>
where
    C: ColorLookup + ?Sized,
{
    let map = style.map.as_ref().map(|map| {
        let range = map
            .range
            .unwrap_or_else(|| property_range(shown.iter().filter_map(|&i| all.get(i)), &map.prop));
        (map.prop.as_str(), range)
    });

    all.iter()
        .map(|atom| {
            if let Some(color) = style.color {
                return color;
            }
            if let Some(color) = atom.surface_color {
                return color;
            }
            if let Some((prop, range)) = map {
                if let Some(&value) = atom.properties.get(prop) {
                    return lookup.color_for_value(value, range);
                }
            }
            lookup.color_for_element(&atom.elem)
        })
        .collect()
}

/// Owner of all surfaces and of the dispatcher computing them
pub struct SurfaceManager {
    surfaces: HandleTable<SurfaceObject>,
    dispatcher: Box<dyn WorkDispatcher>,
    config: PipelineConfig,
}

impl SurfaceManager {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        let dispatcher = create_dispatcher(&config.dispatch)?;
        Ok(Self::with_dispatcher(config, dispatcher))
    }

    /// Manager using a caller supplied dispatcher
    pub fn with_dispatcher(config: PipelineConfig, dispatcher: Box<dyn WorkDispatcher>) -> Self {
        Self {
            surfaces: HandleTable::new(),
            dispatcher,
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.surfaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.surfaces.is_empty()
    }

    pub fn ids(&self) -> Vec<SurfaceId> {
        self.surfaces.handles()
    }

    pub fn get(&self, id: SurfaceId) -> Option<&SurfaceObject> {
        self.surfaces.get(id)
    }

    /// Units still being computed across all surfaces
    pub fn pending(&self) -> usize {
        self.dispatcher.pending()
    }

    /// Start building a surface and return its id right away
    ///
    /// The surface fills in as [`SurfaceManager::poll`] merges fragments.
    pub fn build_surface<C>(&mut self, request: SurfaceRequest, lookup: &C) -> Result<SurfaceId>
    where
        C: ColorLookup + ?Sized,
    {
        let SurfaceRequest {
            kind,
            style,
            to_show,
            all,
            focus,
            extent,
        } = request;

        let mut all = all.unwrap_or_else(|| to_show.clone());
        let shown = Self::snapshot_indices(&mut all, &to_show);
        let positions: Vec<Point3f> = all.iter().map(|a| a.position).collect();

        let colors = surface_colors(&all, &shown, &style, lookup);
        let mut object = SurfaceObject {
            material: Material::from_style(&style),
            colors,
            ..Default::default()
        };

        let extent = extent.or_else(|| Extent::from_points(to_show.iter().map(|a| &a.position)));
        let Some(extent) = extent else {
            log::debug!("no atoms to show, {:?} surface is empty", kind);
            object.done = true;
            return Ok(self.surfaces.insert(object));
        };

        let mut units = carve_up_extent(&extent, &positions, &shown, &self.config.decomposition)?;
        let focus: Vec<Point3f> = focus
            .as_ref()
            .unwrap_or(&to_show)
            .iter()
            .map(|a| a.position)
            .collect();
        sort_by_focus(&mut units, &focus);

        object.expected = units.len();
        object.done = units.is_empty();
        let unit_count = units.len();
        let id = self.surfaces.insert(object);

        let atoms: Arc<[ReducedAtom]> = all.iter().enumerate().map(|(i, a)| a.reduced(i)).collect();
        let job = SurfaceJob {
            kind,
            atoms,
            volume: extent.volume(),
            config: self.config.surface.clone(),
            units,
        };
        if let Err(e) = self.dispatcher.submit(id, job) {
            self.surfaces.remove(id);
            return Err(e);
        }

        log::info!(
            "building {:?} surface {:?}: {} shown of {} atoms in {} units",
            kind,
            id,
            shown.len(),
            all.len(),
            unit_count
        );
        Ok(id)
    }

    /// Indices of the shown atoms in the snapshot, appending those missing from it
    fn snapshot_indices(all: &mut Vec<Atom>, to_show: &[Atom]) -> Vec<usize> {
        let mut by_serial: HashMap<usize, usize> = HashMap::with_capacity(all.len());
        for (i, atom) in all.iter().enumerate() {
            by_serial.entry(atom.serial).or_insert(i);
        }

        to_show
            .iter()
            .map(|atom| match by_serial.get(&atom.serial) {
                Some(&i) => i,
                None => {
                    all.push(atom.clone());
                    by_serial.insert(atom.serial, all.len() - 1);
                    all.len() - 1
                }
            })
            .collect()
    }

    /// Register an explicit mesh as a complete surface
    pub fn add_mesh(&mut self, mesh: SurfaceMesh, style: &SurfaceStyle) -> SurfaceId {
        self.surfaces.insert(SurfaceObject {
            mesh,
            material: Material::from_style(style),
            done: true,
            ..Default::default()
        })
    }

    /// Merge every fragment that has arrived; returns how many were merged
    pub fn poll<R>(&mut self, renderer: &mut R) -> usize
    where
        R: RenderBackend + ?Sized,
    {
        let events = self.dispatcher.poll();
        let mut merged = 0;
        for event in events {
            if self.deliver(event, renderer) {
                merged += 1;
            }
        }
        merged
    }

    /// Merge one worker result into its surface
    ///
    /// Results for removed surfaces are dropped. Returns whether a fragment was merged.
    pub fn deliver<R>(&mut self, event: WorkerEvent, renderer: &mut R) -> bool
    where
        R: RenderBackend + ?Sized,
    {
        match event {
            WorkerEvent::Fragment {
                surface,
                unit,
                fragment,
            } => {
                let Some(object) = self.surfaces.get_mut(surface) else {
                    log::debug!("discarding fragment {} of removed surface {:?}", unit, surface);
                    return false;
                };

                let colors = &object.colors;
                object.mesh.append_fragment(&fragment, |atom| {
                    colors.get(atom).copied().unwrap_or(Rgb::WHITE)
                });

                object.received += 1;
                if object.received >= object.expected {
                    object.done = true;
                }
                renderer.request_redraw();
                true
            }
            WorkerEvent::Failed {
                surface,
                unit,
                error,
            } => {
                log::warn!("surface {:?} unit {} failed: {}", surface, unit, error);
                if let Some(object) = self.surfaces.get_mut(surface) {
                    object.failed += 1;
                }
                false
            }
        }
    }

    /// Replace the material of a surface; the change shows on the next commit
    pub fn set_material_style(&mut self, id: SurfaceId, style: &SurfaceStyle) -> bool {
        let Some(object) = self.surfaces.get_mut(id) else {
            return false;
        };
        object.material = Material::from_style(style);
        object.material.side = Side::Front;
        object.finished = false;
        true
    }

    /// Hand surfaces that are still changing to the renderer
    ///
    /// Each unfinished surface has its previous drawable replaced by a new one built
    /// from the current mesh, attached to the scene under `parent`. A surface is
    /// finished by the first commit after it is done. Returns the number of commits.
    pub fn commit<R>(&mut self, scene: &mut SceneGraph, parent: NodeId, renderer: &mut R) -> Result<usize>
    where
        R: RenderBackend + ?Sized,
    {
        let mut committed = 0;
        for (id, object) in self.surfaces.iter_mut() {
            if object.finished {
                continue;
            }
            if object.done {
                object.finished = true;
            }

            if let Some(previous) = object.committed.take() {
                renderer.remove_drawable(previous.handle);
                scene.destroy(previous.node);
            }

            let handle = renderer.create_drawable(&object.mesh, &object.material);
            let node = scene.create_node();
            if let Some(n) = scene.node_mut(node) {
                n.name = format!("surface {:?}", id);
                n.visible = !object.material.is_hidden();
            }
            object.committed = Some(CommittedDrawable { handle, node });
            scene.add(parent, node)?;
            committed += 1;
        }
        Ok(committed)
    }

    /// Release a surface and its drawable; unknown ids are ignored
    pub fn remove_surface<R>(&mut self, id: SurfaceId, scene: &mut SceneGraph, renderer: &mut R) -> bool
    where
        R: RenderBackend + ?Sized,
    {
        let Some(object) = self.surfaces.remove(id) else {
            return false;
        };
        self.dispatcher.cancel(id);
        if let Some(drawable) = object.committed {
            renderer.remove_drawable(drawable.handle);
            scene.destroy(drawable.node);
        }
        log::debug!("removed surface {:?}", id);
        true
    }

    pub fn remove_all<R>(&mut self, scene: &mut SceneGraph, renderer: &mut R)
    where
        R: RenderBackend + ?Sized,
    {
        for id in self.surfaces.handles() {
            self.remove_surface(id, scene, renderer);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use molsurf_core::PropertyMap;

    struct Palette;

    impl ColorLookup for Palette {
        fn color_for_value(&self, value: f32, range: [f32; 2]) -> Rgb {
            let t = if range[1] > range[0] {
                (value - range[0]) / (range[1] - range[0])
            } else {
                0.5
            };
            Rgb::new(t, 0.0, 1.0 - t)
        }

        fn color_for_element(&self, elem: &str) -> Rgb {
            match elem {
                "O" => Rgb::new(1.0, 0.0, 0.0),
                _ => Rgb::new(0.5, 0.5, 0.5),
            }
        }
    }

    fn atom(serial: usize, elem: &str) -> Atom {
        Atom::new(serial, Point3f::new(serial as f32, 0.0, 0.0), elem)
    }

    #[test]
    fn test_property_range_fallbacks() {
        let atoms = vec![
            atom(0, "C").with_property("b", 3.0),
            atom(1, "C"),
            atom(2, "C").with_property("b", -1.0),
        ];
        assert_eq!(property_range(&atoms, "b"), [-1.0, 3.0]);
        assert_eq!(property_range(&atoms, "missing"), [0.0, 0.0]);
        assert_eq!(property_range(&atoms[..1], "b"), [3.0, 3.0]);

        let open = vec![
            atom(0, "C").with_property("b", 2.0),
            atom(1, "C").with_property("b", f32::INFINITY),
        ];
        assert_eq!(property_range(&open, "b"), [2.0, 2.0]);
    }

    #[test]
    fn test_color_precedence() {
        let mut custom = atom(1, "C");
        custom.surface_color = Some(Rgb::new(0.0, 1.0, 0.0));
        let all = vec![
            atom(0, "O"),
            custom,
            atom(2, "C").with_property("charge", 1.0),
            atom(3, "C").with_property("charge", -1.0),
        ];
        let shown = [0, 1, 2, 3];

        let colors = surface_colors(&all, &shown, &SurfaceStyle::default(), &Palette);
        assert_eq!(colors[0], Rgb::new(1.0, 0.0, 0.0));
        assert_eq!(colors[1], Rgb::new(0.0, 1.0, 0.0));
        assert_eq!(colors[2], Rgb::new(0.5, 0.5, 0.5));

        let mapped = SurfaceStyle::default().with_map("charge", None);
        let colors = surface_colors(&all, &shown, &mapped, &Palette);
        assert_eq!(colors[1], Rgb::new(0.0, 1.0, 0.0));
        assert_eq!(colors[2], Rgb::new(1.0, 0.0, 0.0));
        assert_eq!(colors[3], Rgb::new(0.0, 0.0, 1.0));

        let fixed = SurfaceStyle {
            map: Some(PropertyMap {
                prop: "charge".into(),
                range: Some([-3.0, 1.0]),
            }),
            ..Default::default()
        };
        let colors = surface_colors(&all, &shown, &fixed, &Palette);
        assert_eq!(colors[3], Rgb::new(0.5, 0.0, 0.5));

        let white = SurfaceStyle::default().with_color(Rgb::WHITE).with_map("charge", None);
        assert!(surface_colors(&all, &shown, &white, &Palette)
            .iter()
            .all(|c| *c == Rgb::WHITE));
    }

    #[test]
    fn test_snapshot_indices_append_missing_atoms() {
        let mut all = vec![atom(10, "C"), atom(11, "C")];
        let shown = vec![atom(11, "C"), atom(42, "N")];
        let indices = SurfaceManager::snapshot_indices(&mut all, &shown);
        assert_eq!(indices, vec![1, 2]);
        assert_eq!(all.len(), 3);
        assert_eq!(all[2].serial, 42);
    }

    #[test]
    fn test_empty_request_is_done_immediately() {
        let config = PipelineConfig {
            dispatch: DispatchConfig::inline(),
            ..Default::default()
        };
        let mut manager = SurfaceManager::new(config).unwrap();
        let id = manager
            .build_surface(SurfaceRequest::new(SurfaceKind::VanDerWaals, Vec::new()), &Palette)
            .unwrap();
        let surface = manager.get(id).unwrap();
        assert!(surface.done);
        assert!(surface.mesh.is_empty());
    }
}
