use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::common::{Pose, Vec3};
use crate::error::AppError;
use crate::intake::FrameSource;
use crate::pipeline::label::{LabelSnapshot, LabelState};
use crate::scene::{label_node, NodeId, SceneRenderer};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlacementState {
    Pending,
    Placed(NodeId),
}

/// What ended up in the scene.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayRecord {
    pub node: NodeId,
    pub label: String,
    /// Label revision the snapshot observed; 0 is the sentinel.
    pub revision: u64,
    pub camera: Pose,
    pub world_position: Vec3,
    pub placed_at: DateTime<Utc>,
}

/// One-shot placement of the floating label.
#[derive(Debug)]
pub struct OverlayPlacement {
    offset: Vec3,
    state: PlacementState,
}

impl OverlayPlacement {
    /// `offset` is relative to the camera at the moment of placement.
    pub fn new(offset: Vec3) -> Self {
        Self {
            offset,
            state: PlacementState::Pending,
        }
    }

    pub fn state(&self) -> PlacementState {
        self.state
    }

    /// Inserts the label node under the scene root. Only the first call
    /// succeeds.
    pub fn place<R>(
        &mut self,
        renderer: &mut R,
        snapshot: &LabelSnapshot,
    ) -> Result<OverlayRecord, AppError>
    where
        R: SceneRenderer + ?Sized,
    {
        if let PlacementState::Placed(node) = self.state {
            return Err(AppError::OverlayAlreadyPlaced(node));
        }

        let camera = renderer.camera_pose().unwrap_or_else(|| {
            warn!("No camera pose yet, placing the overlay relative to the world origin");
            Pose::IDENTITY
        });
        let world_position = camera.transform_point(self.offset);
        let root = renderer.root();
        let node = renderer.add_child(root, label_node(&snapshot.label).at(world_position))?;
        self.state = PlacementState::Placed(node);

        let record = OverlayRecord {
            node,
            label: snapshot.label.clone(),
            revision: snapshot.revision,
            camera,
            world_position,
            placed_at: Utc::now(),
        };
        info!(
            "Placed overlay '{}' as node {} at ({:.3}, {:.3}, {:.3})",
            record.label, node, world_position.x, world_position.y, world_position.z
        );
        Ok(record)
    }
}

/// Waits `delay`, then snapshots the label and places the overlay.
///
/// The camera is moved to the pose of the latest frame first; while the
/// frame source has nothing to offer the renderer keeps its last pose.
/// The snapshot is taken while holding the renderer lock, right before
/// insertion; labels published after that instant are not reflected.
pub async fn place_after<R: SceneRenderer>(
    delay: Duration,
    placement: Arc<StdMutex<OverlayPlacement>>,
    frames: Arc<dyn FrameSource>,
    renderer: Arc<Mutex<R>>,
    labels: LabelState,
) -> Result<OverlayRecord, AppError> {
    tokio::time::sleep(delay).await;

    let latest = frames.latest_frame().await;
    let mut renderer = renderer.lock().await;
    if let Some(frame) = latest {
        renderer.update_camera(frame.camera());
    }
    let snapshot = labels.snapshot();
    match snapshot.age(Utc::now()) {
        Some(age) => info!(
            "Overlay snapshot: '{}' (revision {}, {}ms old)",
            snapshot.label,
            snapshot.revision,
            age.num_milliseconds()
        ),
        None => warn!(
            "No classification completed before the overlay fired, using '{}'",
            snapshot.label
        ),
    }

    let mut placement = placement
        .lock()
        .map_err(|_| AppError::Session("overlay placement lock poisoned".to_string()))?;
    placement.place(&mut *renderer, &snapshot)
}
