use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::common::Frame;
use crate::error::AppError;

/// Supplies the most recent camera frame of a tracking session.
#[async_trait]
pub trait FrameSource: Send + Sync {
    fn start(&self) -> Result<(), AppError>;
    fn pause(&self);
    /// The latest available frame, `None` while tracking has not produced one.
    async fn latest_frame(&self) -> Option<Frame>;
}

type Slot = Arc<RwLock<Option<Frame>>>;

/// Single-slot frame source: producers overwrite the slot through a
/// [`FrameFeed`], the classification loop reads whatever is there.
pub struct LatestFrameSource {
    slot: Slot,
    running: AtomicBool,
}

/// Producer side of a [`LatestFrameSource`].
#[derive(Clone)]
pub struct FrameFeed {
    slot: Slot,
}

impl LatestFrameSource {
    pub fn new() -> Self {
        Self {
            slot: Arc::new(RwLock::new(None)),
            running: AtomicBool::new(false),
        }
    }

    pub fn feed(&self) -> FrameFeed {
        FrameFeed {
            slot: self.slot.clone(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

impl Default for LatestFrameSource {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameFeed {
    /// Replaces the current frame, returning the one it displaced.
    pub fn push(&self, frame: Frame) -> Option<Frame> {
        match self.slot.write() {
            Ok(mut slot) => slot.replace(frame),
            Err(poisoned) => poisoned.into_inner().replace(frame),
        }
    }

    pub fn clear(&self) {
        match self.slot.write() {
            Ok(mut slot) => *slot = None,
            Err(poisoned) => *poisoned.into_inner() = None,
        }
    }
}

#[async_trait]
impl FrameSource for LatestFrameSource {
    fn start(&self) -> Result<(), AppError> {
        if !self.running.swap(true, Ordering::AcqRel) {
            tracing::info!("Frame source started");
        }
        Ok(())
    }

    fn pause(&self) {
        if self.running.swap(false, Ordering::AcqRel) {
            tracing::info!("Frame source paused");
        }
    }

    async fn latest_frame(&self) -> Option<Frame> {
        if !self.is_running() {
            return None;
        }
        match self.slot.read() {
            Ok(slot) => slot.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}
