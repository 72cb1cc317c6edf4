//! Transform scene graph
//!
//! Nodes live in a [`SceneGraph`] arena and are addressed by [`NodeId`]. A node's
//! child list is the owning relation: each node appears in exactly one child list.
//! The parent link is a plain lookup id and is rewritten on reparenting.
//!
//! Nodes may be registered as scenes. A scene keeps a registry of every node
//! attached below it, with pending additions and removals the renderer drains to
//! keep its per-object resources in sync.

use crate::error::{Error, Result};
use crate::handle::{Handle, HandleTable};
use crate::point::{Point3f, Vector3f};
use crate::transform;
use nalgebra::{Matrix4, UnitQuaternion};
use std::collections::HashMap;

/// Id of a node in a [`SceneGraph`]
pub type NodeId = Handle<TransformNode>;

/// A node of the transform hierarchy
#[derive(Debug, Clone)]
pub struct TransformNode {
    pub name: String,
    pub position: Vector3f,
    /// XYZ Euler angles in radians, used when `use_quaternion` is false
    pub rotation: Vector3f,
    pub quaternion: UnitQuaternion<f32>,
    pub use_quaternion: bool,
    pub scale: Vector3f,
    pub up: Vector3f,
    /// Rebuild the local matrix from position/rotation/scale on every update
    pub matrix_auto_update: bool,
    pub matrix_world_needs_update: bool,
    /// Write `look_at` results back into the rotation fields
    pub rotation_auto_update: bool,
    pub visible: bool,
    matrix: Matrix4<f32>,
    matrix_world: Matrix4<f32>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl Default for TransformNode {
    fn default() -> Self {
        Self {
            name: String::new(),
            position: Vector3f::zeros(),
            rotation: Vector3f::zeros(),
            quaternion: UnitQuaternion::identity(),
            use_quaternion: false,
            scale: Vector3f::repeat(1.0),
            up: Vector3f::y(),
            matrix_auto_update: true,
            matrix_world_needs_update: true,
            rotation_auto_update: true,
            visible: true,
            matrix: Matrix4::identity(),
            matrix_world: Matrix4::identity(),
            parent: None,
            children: Vec::new(),
        }
    }
}

impl TransformNode {
    pub fn matrix(&self) -> &Matrix4<f32> {
        &self.matrix
    }

    pub fn matrix_world(&self) -> &Matrix4<f32> {
        &self.matrix_world
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Replace the local matrix; only sticks when `matrix_auto_update` is off
    pub fn set_matrix(&mut self, matrix: Matrix4<f32>) {
        self.matrix = matrix;
        self.matrix_world_needs_update = true;
    }

    /// Rebuild the local matrix, returning whether it changed
    fn update_matrix(&mut self) -> bool {
        let rotation = transform::rotation_of(self.use_quaternion, &self.rotation, &self.quaternion);
        let matrix = transform::compose_matrix(&self.position, &rotation, &self.scale);
        let changed = matrix != self.matrix;
        self.matrix = matrix;
        changed
    }

    /// Copy of the node's own attributes, without links
    fn detached_copy(&self) -> Self {
        Self {
            parent: None,
            children: Vec::new(),
            ..self.clone()
        }
    }
}

/// Objects registered below a scene node
#[derive(Debug, Clone, Default)]
pub struct SceneRegistry {
    objects: Vec<NodeId>,
    added: Vec<NodeId>,
    removed: Vec<NodeId>,
}

impl SceneRegistry {
    pub fn objects(&self) -> &[NodeId] {
        &self.objects
    }

    fn insert(&mut self, id: NodeId) {
        if !self.objects.contains(&id) {
            self.objects.push(id);
            self.added.push(id);
            self.removed.retain(|r| *r != id);
        }
    }

    fn remove(&mut self, id: NodeId) {
        if let Some(pos) = self.objects.iter().position(|o| *o == id) {
            self.objects.remove(pos);
            self.removed.push(id);
            self.added.retain(|a| *a != id);
        }
    }
}

/// Pending registry changes since the last drain
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SceneChanges {
    pub added: Vec<NodeId>,
    pub removed: Vec<NodeId>,
}

/// Arena of transform nodes
#[derive(Debug, Clone, Default)]
pub struct SceneGraph {
    nodes: HandleTable<TransformNode>,
    scenes: HashMap<NodeId, SceneRegistry>,
}

impl SceneGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Create a detached node with default attributes
    pub fn create_node(&mut self) -> NodeId {
        self.nodes.insert(TransformNode::default())
    }

    /// Create a node and register it as a scene root
    pub fn create_scene(&mut self) -> NodeId {
        let id = self.create_node();
        self.scenes.insert(id, SceneRegistry::default());
        id
    }

    pub fn is_scene(&self, id: NodeId) -> bool {
        self.scenes.contains_key(&id)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains(id)
    }

    pub fn node(&self, id: NodeId) -> Option<&TransformNode> {
        self.nodes.get(id)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut TransformNode> {
        self.nodes.get_mut(id)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(id).and_then(|n| n.parent)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.nodes.get(id).map(|n| n.children.as_slice()).unwrap_or(&[])
    }

    pub fn local_matrix(&self, id: NodeId) -> Option<Matrix4<f32>> {
        self.nodes.get(id).map(|n| n.matrix)
    }

    /// Cached world matrix; call `update_matrix_world` first for fresh values
    pub fn world_matrix(&self, id: NodeId) -> Option<Matrix4<f32>> {
        self.nodes.get(id).map(|n| n.matrix_world)
    }

    /// Topmost ancestor of a node (the node itself when detached)
    pub fn root_of(&self, id: NodeId) -> NodeId {
        let mut current = id;
        while let Some(parent) = self.parent(current) {
            current = parent;
        }
        current
    }

    /// Node and all its descendants, depth first
    pub fn subtree(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if let Some(node) = self.nodes.get(current) {
                out.push(current);
                stack.extend(node.children.iter().rev());
            }
        }
        out
    }

    /// Nodes currently registered below a scene
    pub fn scene_objects(&self, scene: NodeId) -> &[NodeId] {
        self.scenes.get(&scene).map(|r| r.objects()).unwrap_or(&[])
    }

    /// Drain pending registry additions and removals of a scene
    pub fn take_scene_changes(&mut self, scene: NodeId) -> SceneChanges {
        match self.scenes.get_mut(&scene) {
            Some(registry) => SceneChanges {
                added: std::mem::take(&mut registry.added),
                removed: std::mem::take(&mut registry.removed),
            },
            None => SceneChanges::default(),
        }
    }

    fn is_ancestor(&self, ancestor: NodeId, id: NodeId) -> bool {
        let mut current = self.parent(id);
        while let Some(p) = current {
            if p == ancestor {
                return true;
            }
            current = self.parent(p);
        }
        false
    }

    /// Attach `child` under `parent`, detaching it from its previous parent
    pub fn add(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        if parent == child {
            return Err(Error::SceneGraph(format!(
                "cannot add node {:?} to itself",
                child
            )));
        }
        if !self.contains(parent) {
            return Err(Error::NotFound(format!("parent node {:?}", parent)));
        }
        if !self.contains(child) {
            return Err(Error::NotFound(format!("child node {:?}", child)));
        }
        if self.is_ancestor(child, parent) {
            return Err(Error::SceneGraph(format!(
                "node {:?} is an ancestor of {:?}",
                child, parent
            )));
        }

        if let Some(old_parent) = self.parent(child) {
            log::trace!("reparenting {:?} from {:?} to {:?}", child, old_parent, parent);
            self.remove(old_parent, child);
        }

        if let Some(node) = self.nodes.get_mut(child) {
            node.parent = Some(parent);
            node.matrix_world_needs_update = true;
        }
        if let Some(node) = self.nodes.get_mut(parent) {
            node.children.push(child);
        }

        let root = self.root_of(parent);
        if self.scenes.contains_key(&root) {
            let subtree = self.subtree(child);
            if let Some(registry) = self.scenes.get_mut(&root) {
                for id in subtree {
                    registry.insert(id);
                }
            }
        }
        Ok(())
    }

    /// Detach `child` from `parent`; a no-op when it is not one of its children
    pub fn remove(&mut self, parent: NodeId, child: NodeId) -> bool {
        let Some(node) = self.nodes.get_mut(parent) else {
            return false;
        };
        let Some(index) = node.children.iter().position(|c| *c == child) else {
            return false;
        };
        node.children.remove(index);

        if let Some(node) = self.nodes.get_mut(child) {
            node.parent = None;
        }

        let root = self.root_of(parent);
        if self.scenes.contains_key(&root) {
            let subtree = self.subtree(child);
            if let Some(registry) = self.scenes.get_mut(&root) {
                for id in subtree {
                    registry.remove(id);
                }
            }
        }
        true
    }

    /// Detach a node and free it together with its whole subtree
    pub fn destroy(&mut self, id: NodeId) -> bool {
        if !self.contains(id) {
            return false;
        }
        if let Some(parent) = self.parent(id) {
            self.remove(parent, id);
        }
        for node in self.subtree(id) {
            self.nodes.remove(node);
            self.scenes.remove(&node);
        }
        true
    }

    /// Recompute world matrices of a node and everything below it
    ///
    /// Once a node recomputes, all its descendants are forced to recompute too.
    pub fn update_matrix_world(&mut self, id: NodeId, force: bool) {
        let parent_world = self.parent(id).and_then(|p| self.world_matrix(p));
        self.update_node(id, parent_world, force);
    }

    fn update_node(&mut self, id: NodeId, parent_world: Option<Matrix4<f32>>, force: bool) {
        let Some(node) = self.nodes.get_mut(id) else {
            return;
        };

        let changed = node.matrix_auto_update && node.update_matrix();
        if changed || node.matrix_world_needs_update || force {
            node.matrix_world = match parent_world {
                Some(parent) => parent * node.matrix,
                None => node.matrix,
            };
        }
        node.matrix_world_needs_update = false;
        let world = node.matrix_world;

        let mut i = 0;
        while let Some(child) = self.nodes.get(id).and_then(|n| n.children.get(i).copied()) {
            self.update_node(child, Some(world), true);
            i += 1;
        }
    }

    /// Rotate a node so its -Z axis faces `target`
    pub fn look_at(&mut self, id: NodeId, target: &Point3f) -> Result<()> {
        let node = self
            .nodes
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(format!("node {:?}", id)))?;

        let eye = Point3f::from(node.position);
        let rotation = transform::look_at_rotation(&eye, target, &node.up);
        node.matrix
            .fixed_view_mut::<3, 3>(0, 0)
            .copy_from(rotation.matrix());

        if node.rotation_auto_update {
            if node.use_quaternion {
                node.quaternion = UnitQuaternion::from_rotation_matrix(&rotation);
            } else {
                node.rotation = transform::euler_from_rotation(rotation.matrix());
            }
        }
        node.matrix_world_needs_update = true;
        Ok(())
    }

    /// Deep copy of a node and its descendants as a new detached subtree
    pub fn clone_subtree(&mut self, id: NodeId) -> Result<NodeId> {
        let copy = self
            .nodes
            .get(id)
            .map(TransformNode::detached_copy)
            .ok_or_else(|| Error::NotFound(format!("node {:?}", id)))?;

        let new_id = self.nodes.insert(copy);
        let children = self.children(id).to_vec();
        for child in children {
            let child_copy = self.clone_subtree(child)?;
            self.add(new_id, child_copy)?;
        }
        Ok(new_id)
    }
}
