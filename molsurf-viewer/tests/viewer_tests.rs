//! Integration tests for molsurf-viewer

use approx::assert_relative_eq;
use molsurf_core::{
    transform_point, Atom, AtomSelection, ColorLookup, DrawableHandle, IntersectionShape, Material,
    Point3f, RenderBackend, Rgb, SurfaceMesh, SurfaceStyle, Sphere, Vector3f,
};
use molsurf_surface::{DispatchConfig, PipelineConfig, SurfaceKind};
use molsurf_viewer::*;
use nalgebra::Point2;
use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

#[derive(Default)]
struct MockRenderer {
    next: u64,
    live: HashSet<u64>,
    redraws: usize,
}

impl RenderBackend for MockRenderer {
    fn create_drawable(&mut self, _mesh: &SurfaceMesh, _material: &Material) -> DrawableHandle {
        self.next += 1;
        self.live.insert(self.next);
        DrawableHandle(self.next)
    }

    fn remove_drawable(&mut self, handle: DrawableHandle) {
        self.live.remove(&handle.0);
    }

    fn request_redraw(&mut self) {
        self.redraws += 1;
    }
}

struct Grey;

impl ColorLookup for Grey {
    fn color_for_value(&self, _value: f32, _range: [f32; 2]) -> Rgb {
        Rgb::new(0.5, 0.5, 0.5)
    }

    fn color_for_element(&self, _elem: &str) -> Rgb {
        Rgb::new(0.5, 0.5, 0.5)
    }
}

fn inline_viewer() -> Viewer<MockRenderer, Grey> {
    let pipeline = PipelineConfig {
        dispatch: DispatchConfig::inline(),
        ..Default::default()
    };
    Viewer::new(MockRenderer::default(), Grey, ViewerConfig::default().with_pipeline(pipeline)).unwrap()
}

fn clickable(serial: usize, position: Point3f, radius: f32) -> Atom {
    Atom::new(serial, position, "C")
        .with_intersection_shape(IntersectionShape::new().with_sphere(Sphere::new(position, radius)))
}

fn two_carbons() -> Vec<Atom> {
    vec![
        Atom::new(1, Point3f::new(8.5, 10.0, 10.0), "C"),
        Atom::new(2, Point3f::new(11.5, 10.0, 10.0), "C"),
    ]
}

#[test]
fn test_tick_builds_and_commits_surface() {
    let mut viewer = inline_viewer();
    let id = viewer
        .build_surface(SurfaceKind::VanDerWaals, SurfaceStyle::default(), two_carbons(), None, None)
        .unwrap();
    assert!(!viewer.surface(id).unwrap().done);

    assert_eq!(viewer.tick().unwrap(), 1);
    let surface = viewer.surface(id).unwrap();
    assert!(surface.done && surface.finished);
    assert!(!surface.mesh.is_empty());

    let committed = surface.committed.unwrap();
    assert_eq!(viewer.scene().parent(committed.node), Some(viewer.model_group()));
    assert_eq!(viewer.renderer().live.len(), 1);

    // nothing new arrives and nothing is recommitted
    assert_eq!(viewer.tick().unwrap(), 0);
    assert_eq!(viewer.render().unwrap(), 0);
    assert_eq!(viewer.renderer().live.len(), 1);
}

#[test]
fn test_remove_surface_releases_drawable() {
    let mut viewer = inline_viewer();
    let id = viewer
        .build_surface(SurfaceKind::SolventAccessible, SurfaceStyle::default(), two_carbons(), None, None)
        .unwrap();
    viewer.tick().unwrap();
    let node = viewer.surface(id).unwrap().committed.unwrap().node;

    assert!(viewer.remove_surface(id));
    assert!(!viewer.remove_surface(id));
    assert!(viewer.renderer().live.is_empty());
    assert!(!viewer.scene().contains(node));
    assert!(viewer.surface(id).is_none());
}

#[test]
fn test_remove_before_workers_finish() {
    let mut viewer = inline_viewer();
    let id = viewer
        .build_surface(SurfaceKind::VanDerWaals, SurfaceStyle::default(), two_carbons(), None, None)
        .unwrap();
    assert!(viewer.remove_surface(id));

    assert_eq!(viewer.tick().unwrap(), 0);
    assert!(viewer.renderer().live.is_empty());
    assert!(viewer.surfaces().is_empty());
}

#[test]
fn test_restyle_and_remove_all() {
    let mut viewer = inline_viewer();
    let built = viewer
        .build_surface(SurfaceKind::VanDerWaals, SurfaceStyle::default(), two_carbons(), None, None)
        .unwrap();
    let explicit = viewer.add_mesh(SurfaceMesh::new(), &SurfaceStyle::default());
    viewer.tick().unwrap();
    assert!(viewer.surface(explicit).unwrap().finished);

    assert!(viewer.set_surface_material_style(built, &SurfaceStyle::default().with_opacity(0.5)));
    assert_eq!(viewer.render().unwrap(), 1);
    assert!(viewer.surface(built).unwrap().material.transparent);

    viewer.remove_all_surfaces();
    assert!(viewer.surfaces().is_empty());
    assert!(viewer.renderer().live.is_empty());
    assert!(!viewer.set_surface_material_style(built, &SurfaceStyle::default()));
}

#[test]
fn test_build_surface_from_source() {
    let mut atoms = two_carbons();
    atoms.push(Atom::new(3, Point3f::new(10.0, 12.0, 10.0), "O"));

    let mut viewer = inline_viewer();
    let shown = AtomSelection::all().with_elements(vec!["C".into()]);
    let id = viewer
        .build_surface_from(
            &atoms,
            SurfaceKind::VanDerWaals,
            SurfaceStyle::default(),
            &shown,
            Some(&AtomSelection::all()),
            None,
        )
        .unwrap();
    viewer.tick().unwrap();

    let surface = viewer.surface(id).unwrap();
    assert!(surface.done);
    // the oxygen shapes the surface but owns none of its vertices
    assert!(!surface.mesh.atom_ids.is_empty());
    assert!(surface.mesh.atom_ids.iter().all(|&a| a < 2));
}

#[test]
fn test_pick_nearest_clickable_and_fire_callback() {
    let mut viewer = inline_viewer();
    let atom = clickable(42, Point3f::origin(), 1.0);
    assert!(viewer.zoom_to(&[atom.clone()]));
    viewer.set_clickables(vec![atom, Atom::new(7, Point3f::origin(), "N")]);
    assert_eq!(viewer.clickables().len(), 1);

    let picked = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&picked);
    viewer.on_pick(move |atom, _hit| sink.borrow_mut().push(atom.serial));

    let hit = viewer.pick(&Point2::origin()).unwrap();
    assert_eq!(hit.serial, 42);
    let expected = 5.0 / 10.0f32.to_radians().tan() - 1.0;
    assert_relative_eq!(hit.distance, expected, epsilon = 1e-2);
    assert_eq!(*picked.borrow(), vec![42]);

    assert!(viewer.pick(&Point2::new(0.9, 0.9)).is_none());
    assert_eq!(picked.borrow().len(), 1);
}

#[test]
fn test_pick_follows_model_translation() {
    let mut viewer = inline_viewer();
    let center = Point3f::new(20.0, -5.0, 3.0);
    let atom = clickable(1, center, 1.5);
    viewer.set_clickables(vec![atom.clone()]);

    // off screen until the model is centered on it
    assert!(viewer.pick(&Point2::origin()).is_none());
    viewer.zoom_to(&[atom]);
    assert_eq!(viewer.pick(&Point2::origin()).map(|h| h.serial), Some(1));
}

#[test]
fn test_zoom_to_empty_is_noop() {
    let mut viewer = inline_viewer();
    let before = viewer.camera().clone();
    assert!(!viewer.zoom_to(&[]));
    assert_eq!(*viewer.camera(), before);
}

#[test]
fn test_zoom_to_sets_clip_planes_around_model() {
    let mut viewer = inline_viewer();
    let atoms = vec![
        Atom::new(1, Point3f::new(-10.0, 0.0, 0.0), "C"),
        Atom::new(2, Point3f::new(10.0, 0.0, 0.0), "C"),
    ];
    viewer.zoom_to(&atoms);

    let rotation_z = viewer.scene().node(viewer.rotation_group()).unwrap().position.z;
    let center = viewer.camera().position.z - rotation_z;
    assert!(viewer.camera().near < center && center < viewer.camera().far);
    assert_relative_eq!(viewer.camera().near, center - 20.0 / 1.9, epsilon = 1e-3);
    assert_relative_eq!(viewer.camera().far, center + 10.0, epsilon = 1e-3);
}

#[test]
fn test_nodes_follow_model_group() {
    let mut viewer = inline_viewer();
    viewer.zoom_to(&[Atom::new(1, Point3f::new(2.0, 0.0, 0.0), "C")]);

    let node = viewer.scene_mut().create_node();
    viewer
        .with_node(node, |n| n.position = Vector3f::new(1.0, 0.0, 0.0))
        .unwrap();
    viewer.add_node(node).unwrap();
    viewer.update_matrix_world(false);

    let world = viewer.scene().world_matrix(node).unwrap();
    let origin = transform_point(&world, &Point3f::origin());
    assert_relative_eq!(origin.x, -1.0, epsilon = 1e-5);
    assert_relative_eq!(origin.y, 0.0, epsilon = 1e-5);

    assert!(viewer.remove_node(node));
    assert!(!viewer.remove_node(node));
    assert!(viewer.scene().contains(node));
}

#[test]
fn test_rotate_turns_model_group() {
    let mut viewer = inline_viewer();
    viewer.rotate(90.0, &Vector3f::z());
    viewer.update_matrix_world(false);

    let world = viewer.scene().world_matrix(viewer.model_group()).unwrap();
    let moved = transform_point(&world, &Point3f::new(1.0, 0.0, 0.0));
    assert_relative_eq!(moved, Point3f::new(0.0, 1.0, 0.0), epsilon = 1e-5);

    // a zero axis is ignored
    viewer.rotate(45.0, &Vector3f::zeros());
    viewer.update_matrix_world(false);
    let again = viewer.scene().world_matrix(viewer.model_group()).unwrap();
    assert_relative_eq!(again, world, epsilon = 1e-6);
}
