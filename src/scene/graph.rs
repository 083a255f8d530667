use crate::common::{Pose, Vec3};
use crate::error::AppError;

use super::{NodeId, SceneNode, SceneRenderer};

struct Entry {
    node: SceneNode,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// In-memory scene graph. Node 0 is the root and sits at the world origin.
pub struct SceneGraph {
    entries: Vec<Entry>,
    camera: Option<Pose>,
    running: bool,
}

impl SceneGraph {
    pub fn new() -> Self {
        Self {
            entries: vec![Entry {
                node: SceneNode::new().with_name("root"),
                parent: None,
                children: Vec::new(),
            }],
            camera: None,
            running: false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        // The root is always present.
        false
    }

    /// The node as stored; its `children` list is empty, see [`Self::children`].
    pub fn node(&self, id: NodeId) -> Option<&SceneNode> {
        self.entries.get(id.0).map(|entry| &entry.node)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.entries.get(id.0).and_then(|entry| entry.parent)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.entries
            .get(id.0)
            .map(|entry| entry.children.as_slice())
            .unwrap_or(&[])
    }

    /// World-space position of the node's origin.
    pub fn world_position(&self, id: NodeId) -> Option<Vec3> {
        let entry = self.entries.get(id.0)?;
        let mut point = entry.node.position;
        let mut current = entry.parent;
        while let Some(parent) = current {
            let parent_entry = &self.entries[parent.0];
            point = parent_entry.node.to_parent(point);
            current = parent_entry.parent;
        }
        Some(point)
    }

    fn insert(&mut self, parent: NodeId, mut node: SceneNode) -> NodeId {
        let children = std::mem::take(&mut node.children);
        let id = NodeId(self.entries.len());
        self.entries.push(Entry {
            node,
            parent: Some(parent),
            children: Vec::new(),
        });
        self.entries[parent.0].children.push(id);
        for child in children {
            self.insert(id, child);
        }
        id
    }
}

impl Default for SceneGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl SceneRenderer for SceneGraph {
    fn start(&mut self) -> Result<(), AppError> {
        if !self.running {
            self.running = true;
            tracing::info!("Scene renderer started");
        }
        Ok(())
    }

    fn pause(&mut self) {
        if self.running {
            self.running = false;
            tracing::info!("Scene renderer paused");
        }
    }

    fn root(&self) -> NodeId {
        NodeId(0)
    }

    fn camera_pose(&self) -> Option<Pose> {
        self.camera
    }

    fn update_camera(&mut self, pose: Pose) {
        self.camera = Some(pose);
    }

    fn add_child(&mut self, parent: NodeId, node: SceneNode) -> Result<NodeId, AppError> {
        if parent.0 >= self.entries.len() {
            return Err(AppError::Scene(format!("parent node {} does not exist", parent)));
        }
        let id = self.insert(parent, node);
        tracing::debug!("Added node {} under {}", id, parent);
        Ok(id)
    }
}
