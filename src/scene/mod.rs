pub mod graph;
pub mod text;

use std::fmt;

use crate::common::{Pose, Vec3};
use crate::error::AppError;

pub use graph::SceneGraph;
pub use text::{label_node, BoundingBox, Font, TextAlignment, TextGeometry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    Text(TextGeometry),
}

/// A node description handed to the renderer. Children are inserted with it.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneNode {
    pub name: Option<String>,
    pub position: Vec3,
    pub scale: Vec3,
    pub pivot: Vec3,
    pub geometry: Option<Geometry>,
    pub children: Vec<SceneNode>,
}

impl SceneNode {
    pub fn new() -> Self {
        Self {
            name: None,
            position: Vec3::ZERO,
            scale: Vec3::ONE,
            pivot: Vec3::ZERO,
            geometry: None,
            children: Vec::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn at(mut self, position: Vec3) -> Self {
        self.position = position;
        self
    }

    pub fn with_scale(mut self, scale: Vec3) -> Self {
        self.scale = scale;
        self
    }

    pub fn with_pivot(mut self, pivot: Vec3) -> Self {
        self.pivot = pivot;
        self
    }

    pub fn with_geometry(mut self, geometry: Geometry) -> Self {
        self.geometry = Some(geometry);
        self
    }

    pub fn with_child(mut self, child: SceneNode) -> Self {
        self.children.push(child);
        self
    }

    /// Maps a point in this node's space into its parent's space.
    pub fn to_parent(&self, local: Vec3) -> Vec3 {
        (local - self.pivot).scale(self.scale) + self.position
    }

    pub fn text(&self) -> Option<&TextGeometry> {
        match &self.geometry {
            Some(Geometry::Text(text)) => Some(text),
            None => None,
        }
    }
}

impl Default for SceneNode {
    fn default() -> Self {
        Self::new()
    }
}

/// The 3D scene tied to the camera of the tracking session.
pub trait SceneRenderer: Send + 'static {
    fn start(&mut self) -> Result<(), AppError>;
    fn pause(&mut self);
    fn root(&self) -> NodeId;
    /// Current camera pose in world space, `None` before tracking starts.
    fn camera_pose(&self) -> Option<Pose>;
    /// Moves the camera to the pose reported by the latest tracked frame.
    fn update_camera(&mut self, pose: Pose);
    fn add_child(&mut self, parent: NodeId, node: SceneNode) -> Result<NodeId, AppError>;
}
