use chrono::{DateTime, Utc};
use image::DynamicImage;
use std::sync::Arc;
use uuid::Uuid;

use crate::common::geometry::Pose;

/// A captured camera image together with the camera pose it was taken from.
#[derive(Debug, Clone)]
pub struct Frame {
    id: Uuid,
    image: Arc<DynamicImage>,
    camera: Pose,
    captured_at: DateTime<Utc>,
}

impl Frame {
    pub fn new(image: DynamicImage, camera: Pose, captured_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            image: Arc::new(image),
            camera,
            captured_at,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn image(&self) -> &Arc<DynamicImage> {
        &self.image
    }

    pub fn camera(&self) -> Pose {
        self.camera
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.image.width(), self.image.height())
    }
}
