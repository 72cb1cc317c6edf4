//! Viewer facade
//!
//! The [`Viewer`] owns the scene graph, the camera, the surface manager and the
//! list of clickable atoms. The scene is laid out as `root -> rotation group ->
//! model group`; models, surfaces and pick shapes all live below the model group.

use crate::camera::Camera;
use molsurf_core::{
    Atom, AtomSource, ColorLookup, Error, Extent, NodeId, Point3f, RenderBackend, Result,
    SceneGraph, SurfaceMesh, SurfaceStyle, TransformNode, Vector3f,
};
use molsurf_picking::{Hit, Raycaster, DEFAULT_LINE_PRECISION};
use molsurf_surface::{PipelineConfig, SurfaceId, SurfaceKind, SurfaceManager, SurfaceObject, SurfaceRequest};
use nalgebra::{Point2, Unit, UnitQuaternion};
use serde::{Deserialize, Serialize};

/// Called with the picked atom and the hit that selected it
pub type PickCallback = Box<dyn FnMut(&Atom, &Hit)>;

/// Configuration for the viewer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    pub camera: Camera,
    pub pipeline: PipelineConfig,
    /// Line pick tolerance before group scaling
    pub line_precision: f32,
    /// Clip planes relative to the rotation center
    pub slab_near: f32,
    pub slab_far: f32,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            camera: Camera::default(),
            pipeline: PipelineConfig::default(),
            line_precision: DEFAULT_LINE_PRECISION,
            slab_near: -50.0,
            slab_far: 50.0,
        }
    }
}

impl ViewerConfig {
    pub fn with_pipeline(mut self, pipeline: PipelineConfig) -> Self {
        self.pipeline = pipeline;
        self
    }

    pub fn with_camera(mut self, camera: Camera) -> Self {
        self.camera = camera;
        self
    }
}

/// Interactive viewer core driving a render backend
pub struct Viewer<R: RenderBackend, C: ColorLookup> {
    scene: SceneGraph,
    root: NodeId,
    rotation_group: NodeId,
    model_group: NodeId,
    camera: Camera,
    renderer: R,
    colors: C,
    surfaces: SurfaceManager,
    clickables: Vec<Atom>,
    on_pick: Option<PickCallback>,
    config: ViewerConfig,
}

impl<R: RenderBackend, C: ColorLookup> Viewer<R, C> {
    pub fn new(renderer: R, colors: C, config: ViewerConfig) -> Result<Self> {
        let surfaces = SurfaceManager::new(config.pipeline.clone())?;

        let mut scene = SceneGraph::new();
        let root = scene.create_scene();
        let rotation_group = scene.create_node();
        let model_group = scene.create_node();
        if let Some(node) = scene.node_mut(rotation_group) {
            node.name = "rotation".into();
            node.use_quaternion = true;
        }
        if let Some(node) = scene.node_mut(model_group) {
            node.name = "model".into();
        }
        scene.add(root, rotation_group)?;
        scene.add(rotation_group, model_group)?;

        let mut viewer = Self {
            scene,
            root,
            rotation_group,
            model_group,
            camera: config.camera.clone(),
            renderer,
            colors,
            surfaces,
            clickables: Vec::new(),
            on_pick: None,
            config,
        };
        viewer.update_slab();
        Ok(viewer)
    }

    pub fn scene(&self) -> &SceneGraph {
        &self.scene
    }

    pub fn scene_mut(&mut self) -> &mut SceneGraph {
        &mut self.scene
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn rotation_group(&self) -> NodeId {
        self.rotation_group
    }

    pub fn model_group(&self) -> NodeId {
        self.model_group
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn camera_mut(&mut self) -> &mut Camera {
        &mut self.camera
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn renderer_mut(&mut self) -> &mut R {
        &mut self.renderer
    }

    pub fn surface(&self, id: SurfaceId) -> Option<&SurfaceObject> {
        self.surfaces.get(id)
    }

    pub fn surfaces(&self) -> &SurfaceManager {
        &self.surfaces
    }

    /// Attach a node below the model group
    pub fn add_node(&mut self, node: NodeId) -> Result<()> {
        self.scene.add(self.model_group, node)
    }

    /// Detach a node from wherever it hangs; false if it was not attached
    pub fn remove_node(&mut self, node: NodeId) -> bool {
        match self.scene.parent(node) {
            Some(parent) => self.scene.remove(parent, node),
            None => false,
        }
    }

    pub fn update_matrix_world(&mut self, force: bool) {
        self.scene.update_matrix_world(self.root, force);
    }

    /// Rotate the model about an axis through the rotation center
    pub fn rotate(&mut self, angle_degrees: f32, axis: &Vector3f) {
        let Some(axis) = Unit::try_new(*axis, f32::EPSILON) else {
            return;
        };
        let turn = UnitQuaternion::from_axis_angle(&axis, angle_degrees.to_radians());
        if let Some(node) = self.scene.node_mut(self.rotation_group) {
            node.quaternion = turn * node.quaternion;
        }
        self.renderer.request_redraw();
    }

    /// Move the rotation center towards (positive) or away from the camera
    pub fn zoom(&mut self, factor: f32) {
        if factor <= 0.0 {
            return;
        }
        let camera_z = self.camera.position.z;
        if let Some(node) = self.scene.node_mut(self.rotation_group) {
            let scale = (camera_z - node.position.z) * 0.85;
            node.position.z += scale * (1.0 - 1.0 / factor);
            // never cross the camera
            if node.position.z > camera_z {
                node.position.z = camera_z * 0.999;
            }
        }
        self.update_slab();
        self.renderer.request_redraw();
    }

    /// Center the model on `atoms` and move back until all of them fit the view
    ///
    /// Returns false and leaves the view unchanged when `atoms` is empty.
    pub fn zoom_to(&mut self, atoms: &[Atom]) -> bool {
        let positions: Vec<Point3f> = atoms.iter().map(|a| a.position).collect();
        let (Some(extent), Some(center)) = (Extent::from_points(&positions), Extent::centroid(&positions))
        else {
            return false;
        };

        let dims = extent.dimensions();
        let diagonal = dims.norm().max(5.0);
        self.config.slab_near = -diagonal / 1.9;
        self.config.slab_far = diagonal / 2.0;

        let max_sq = positions
            .iter()
            .map(|p| (p - center).norm_squared())
            .fold(25.0f32, f32::max);
        let span = max_sq.sqrt() * 2.0;
        let camera_z = self.camera.position.z;
        let fov = self.camera.fov;

        if let Some(node) = self.scene.node_mut(self.model_group) {
            node.position = -center.coords;
        }
        if let Some(node) = self.scene.node_mut(self.rotation_group) {
            node.position.z = -(span * 0.5 / (fov / 2.0).tan() - camera_z);
        }

        log::debug!("zoomed to {} atoms around {:?}", atoms.len(), center);
        self.update_slab();
        self.renderer.request_redraw();
        true
    }

    /// Place the clip planes around the rotation center
    fn update_slab(&mut self) {
        let group_z = self
            .scene
            .node(self.rotation_group)
            .map(|n| n.position.z)
            .unwrap_or(0.0);
        let center = (self.camera.position.z - group_z).max(1.0);
        self.camera.near = (center + self.config.slab_near).max(1.0);
        self.camera.far = (center + self.config.slab_far).max(self.camera.near + 1.0);
    }

    /// Replace the atoms that can be picked
    pub fn set_clickables(&mut self, atoms: Vec<Atom>) {
        self.clickables = atoms.into_iter().filter(|a| a.clickable).collect();
    }

    pub fn clickables(&self) -> &[Atom] {
        &self.clickables
    }

    /// Register the callback fired by [`Viewer::pick`]
    pub fn on_pick<F>(&mut self, callback: F)
    where
        F: FnMut(&Atom, &Hit) + 'static,
    {
        self.on_pick = Some(Box::new(callback));
    }

    /// Resolve a point in normalized device coordinates to the nearest clickable
    pub fn pick(&mut self, ndc: &Point2<f32>) -> Option<Hit> {
        if self.clickables.is_empty() {
            return None;
        }
        self.update_matrix_world(false);

        let ray = self.camera.pick_ray(ndc)?;
        let group_matrix = self.scene.world_matrix(self.model_group)?;
        let hit = Raycaster::from_ray(ray)
            .with_line_precision(self.config.line_precision)
            .pick(&self.clickables, &group_matrix)?;

        if let (Some(callback), Some(atom)) = (self.on_pick.as_mut(), self.clickables.get(hit.index)) {
            callback(atom, &hit);
        }
        Some(hit)
    }

    /// Start building a surface over `to_show`
    ///
    /// `all` defaults to `to_show` and `focus` to `to_show`.
    pub fn build_surface(
        &mut self,
        kind: SurfaceKind,
        style: SurfaceStyle,
        to_show: Vec<Atom>,
        all: Option<Vec<Atom>>,
        focus: Option<Vec<Atom>>,
    ) -> Result<SurfaceId> {
        let mut request = SurfaceRequest::new(kind, to_show).with_style(style);
        request.all = all;
        request.focus = focus;
        self.surfaces.build_surface(request, &self.colors)
    }

    /// Start building a surface over atoms selected from a source
    ///
    /// The surface is shaped by every atom matching `all` (or `to_show` when absent).
    pub fn build_surface_from<S>(
        &mut self,
        source: &S,
        kind: SurfaceKind,
        style: SurfaceStyle,
        to_show: &S::Selection,
        all: Option<&S::Selection>,
        focus: Option<&S::Selection>,
    ) -> Result<SurfaceId>
    where
        S: AtomSource + ?Sized,
    {
        let shown = source.selected_atoms(to_show);
        let all = all.map(|selection| source.selected_atoms(selection));
        let focus = focus.map(|selection| source.selected_atoms(selection));
        self.build_surface(kind, style, shown, all, focus)
    }

    /// Show an explicit mesh as a surface
    pub fn add_mesh(&mut self, mesh: SurfaceMesh, style: &SurfaceStyle) -> SurfaceId {
        let id = self.surfaces.add_mesh(mesh, style);
        self.renderer.request_redraw();
        id
    }

    pub fn set_surface_material_style(&mut self, id: SurfaceId, style: &SurfaceStyle) -> bool {
        let changed = self.surfaces.set_material_style(id, style);
        if changed {
            self.renderer.request_redraw();
        }
        changed
    }

    pub fn remove_surface(&mut self, id: SurfaceId) -> bool {
        let removed = self.surfaces.remove_surface(id, &mut self.scene, &mut self.renderer);
        if removed {
            self.renderer.request_redraw();
        }
        removed
    }

    pub fn remove_all_surfaces(&mut self) {
        self.surfaces.remove_all(&mut self.scene, &mut self.renderer);
        self.renderer.request_redraw();
    }

    /// Merge whatever the surface workers have delivered, then render
    ///
    /// Returns the number of fragments merged. Never blocks on workers.
    pub fn tick(&mut self) -> Result<usize> {
        let merged = self.surfaces.poll(&mut self.renderer);
        self.render()?;
        Ok(merged)
    }

    /// Refresh world matrices and commit surfaces that changed since the last frame
    pub fn render(&mut self) -> Result<usize> {
        self.update_slab();
        let committed = self
            .surfaces
            .commit(&mut self.scene, self.model_group, &mut self.renderer)?;
        self.update_matrix_world(false);
        Ok(committed)
    }

    /// Apply a closure to a node of the scene
    pub fn with_node<F>(&mut self, node: NodeId, f: F) -> Result<()>
    where
        F: FnOnce(&mut TransformNode),
    {
        let node = self
            .scene
            .node_mut(node)
            .ok_or_else(|| Error::NotFound(format!("node {:?}", node)))?;
        f(node);
        Ok(())
    }
}
