use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower::Service;
use tracing::{info, warn};

use crate::classifier::{
    classifier_service, Classification, ClassificationRequest, ClassifierService, CropAndScale,
};
use crate::config::Configuration;
use crate::error::{AppError, ClassifierError};
use crate::intake::FrameSource;
use crate::pipeline::{
    place_after, ClassificationLoop, LabelState, LoopSettings, LoopStats, OverlayPlacement,
    OverlayRecord, PlacementState,
};
use crate::scene::SceneRenderer;

type LoopHandle = JoinHandle<(ClassificationLoop, Result<LoopStats, AppError>)>;

enum LoopSlot {
    Idle(ClassificationLoop),
    Running {
        handle: LoopHandle,
        cancel: CancellationToken,
    },
    Terminated,
}

enum OverlaySlot {
    Unscheduled,
    Scheduled(JoinHandle<Result<OverlayRecord, AppError>>),
    Placed(OverlayRecord),
    Failed(String),
}

/// The screen controller: ties the frame source, the classifier and the
/// scene together and follows the screen's visibility.
pub struct Session<R: SceneRenderer> {
    configuration: Configuration,
    frames: Arc<dyn FrameSource>,
    renderer: Arc<Mutex<R>>,
    labels: LabelState,
    placement: Arc<StdMutex<OverlayPlacement>>,
    classification: LoopSlot,
    overlay: OverlaySlot,
    shutdown: CancellationToken,
    visible: bool,
}

impl<R: SceneRenderer> Session<R> {
    pub fn builder(configuration: Configuration) -> SessionBuilder<R> {
        SessionBuilder::new(configuration)
    }

    pub fn configuration(&self) -> &Configuration {
        &self.configuration
    }

    pub fn labels(&self) -> LabelState {
        self.labels.clone()
    }

    pub fn renderer(&self) -> Arc<Mutex<R>> {
        self.renderer.clone()
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn is_classifying(&self) -> bool {
        matches!(self.classification, LoopSlot::Running { .. })
    }

    pub fn placement_state(&self) -> PlacementState {
        match self.placement.lock() {
            Ok(placement) => placement.state(),
            Err(poisoned) => poisoned.into_inner().state(),
        }
    }

    /// The screen became visible: resume capture and rendering, restart the
    /// classification loop and, the first time only, arm the overlay timer.
    pub async fn appear(&mut self) -> Result<(), AppError> {
        if self.shutdown.is_cancelled() {
            return Err(AppError::Session("session has been shut down".to_string()));
        }
        if self.visible {
            return Ok(());
        }
        self.frames.start()?;
        self.renderer.lock().await.start()?;
        self.start_classification()?;
        self.schedule_overlay();
        self.visible = true;
        info!("Session appeared");
        Ok(())
    }

    /// The screen was hidden: pause capture and rendering and stop the loop.
    /// Returns the loop totals of the run that was stopped, if any.
    pub async fn disappear(&mut self) -> Result<Option<LoopStats>, AppError> {
        if !self.visible {
            return Ok(None);
        }
        self.visible = false;
        self.frames.pause();
        self.renderer.lock().await.pause();
        let stats = self.stop_classification().await?;
        info!("Session disappeared");
        Ok(stats)
    }

    /// Waits for the classification loop to end on its own, which only
    /// happens on a fatal classifier error.
    pub async fn wait(&mut self) -> Result<LoopStats, AppError> {
        let LoopSlot::Running { handle, .. } = &mut self.classification else {
            return Err(AppError::Session(
                "classification loop is not running".to_string(),
            ));
        };
        let joined = handle.await;
        self.settle(joined)
    }

    /// Waits for the overlay to be placed.
    pub async fn overlay(&mut self) -> Result<OverlayRecord, AppError> {
        let joined = match &mut self.overlay {
            OverlaySlot::Unscheduled => {
                return Err(AppError::Session("overlay has not been scheduled".to_string()))
            }
            OverlaySlot::Placed(record) => return Ok(record.clone()),
            OverlaySlot::Failed(reason) => return Err(AppError::Session(reason.clone())),
            OverlaySlot::Scheduled(handle) => handle.await,
        };

        let result = joined
            .map_err(|e| AppError::Session(format!("overlay task failed: {}", e)))
            .and_then(|placed| placed);
        self.overlay = match &result {
            Ok(record) => OverlaySlot::Placed(record.clone()),
            Err(e) => OverlaySlot::Failed(e.to_string()),
        };
        result
    }

    /// Cancels the loop and the pending overlay timer and pauses capture and
    /// rendering. The session cannot appear again afterwards.
    pub async fn shutdown(&mut self) {
        self.shutdown.cancel();
        self.frames.pause();
        self.renderer.lock().await.pause();
        self.visible = false;
        if let LoopSlot::Running { handle, .. } =
            std::mem::replace(&mut self.classification, LoopSlot::Terminated)
        {
            match handle.await {
                Ok((_, Ok(stats))) => info!("Classification loop shut down: {:?}", stats),
                Ok((_, Err(e))) => warn!("Classification loop had already failed: {}", e),
                Err(e) => warn!("Classification task failed: {}", e),
            }
        }
        info!("Session shut down");
    }

    fn start_classification(&mut self) -> Result<(), AppError> {
        match std::mem::replace(&mut self.classification, LoopSlot::Terminated) {
            LoopSlot::Idle(mut classification) => {
                let cancel = self.shutdown.child_token();
                let token = cancel.clone();
                let handle = tokio::spawn(async move {
                    let result = classification.run(token).await;
                    (classification, result)
                });
                self.classification = LoopSlot::Running { handle, cancel };
                Ok(())
            }
            running @ LoopSlot::Running { .. } => {
                self.classification = running;
                Ok(())
            }
            LoopSlot::Terminated => Err(AppError::Session(
                "classification loop terminated after a fatal error".to_string(),
            )),
        }
    }

    async fn stop_classification(&mut self) -> Result<Option<LoopStats>, AppError> {
        let LoopSlot::Running { handle, cancel } = &mut self.classification else {
            return Ok(None);
        };
        cancel.cancel();
        let joined = handle.await;
        self.settle(joined).map(Some)
    }

    fn settle(
        &mut self,
        joined: Result<(ClassificationLoop, Result<LoopStats, AppError>), tokio::task::JoinError>,
    ) -> Result<LoopStats, AppError> {
        match joined {
            Ok((classification, Ok(stats))) => {
                self.classification = LoopSlot::Idle(classification);
                Ok(stats)
            }
            Ok((_, Err(e))) => {
                self.classification = LoopSlot::Terminated;
                Err(e)
            }
            Err(e) => {
                self.classification = LoopSlot::Terminated;
                Err(AppError::Session(format!("classification task failed: {}", e)))
            }
        }
    }

    fn schedule_overlay(&mut self) {
        if !matches!(self.overlay, OverlaySlot::Unscheduled) {
            return;
        }
        let delay = self.configuration.overlay.delay();
        let placement = self.placement.clone();
        let frames = self.frames.clone();
        let renderer = self.renderer.clone();
        let labels = self.labels.clone();
        let shutdown = self.shutdown.clone();

        info!("Overlay scheduled in {}ms", delay.as_millis());
        self.overlay = OverlaySlot::Scheduled(tokio::spawn(async move {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    warn!("Session shut down before the overlay was placed");
                    Err(AppError::Session("session shut down before the overlay was placed".to_string()))
                }
                placed = place_after(delay, placement, frames, renderer, labels) => placed,
            }
        }));
    }
}

impl<R: SceneRenderer> Drop for Session<R> {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

// Defers the service stack until `build`, once the in-flight limit is final.
type ClassifierFactory = Box<dyn FnOnce(usize) -> ClassifierService + Send>;

pub struct SessionBuilder<R> {
    configuration: Configuration,
    frames: Option<Arc<dyn FrameSource>>,
    classifier: Option<ClassifierFactory>,
    renderer: Option<R>,
}

impl<R: SceneRenderer> SessionBuilder<R> {
    pub fn new(configuration: Configuration) -> Self {
        Self {
            configuration,
            frames: None,
            classifier: None,
            renderer: None,
        }
    }

    pub fn frame_source(mut self, frames: Arc<dyn FrameSource>) -> Self {
        self.frames = Some(frames);
        self
    }

    pub fn classifier<S>(mut self, classifier: S) -> Self
    where
        S: Service<ClassificationRequest, Response = Vec<Classification>, Error = ClassifierError>
            + Send
            + 'static,
        S::Future: Send + 'static,
    {
        self.classifier = Some(Box::new(move |max_in_flight| {
            classifier_service(classifier, max_in_flight)
        }));
        self
    }

    pub fn renderer(mut self, renderer: R) -> Self {
        self.renderer = Some(renderer);
        self
    }

    // Sets the overlay delay, this will override the default configuration.
    pub fn overlay_delay(mut self, delay: Duration) -> Self {
        self.configuration.overlay.delay_ms = delay.as_millis() as u64;
        self
    }

    // Sets the label shown before any classification completes, this will override the default configuration.
    pub fn sentinel(mut self, sentinel: impl Into<String>) -> Self {
        self.configuration.overlay.sentinel = sentinel.into();
        self
    }

    // Adjusts the in-flight classification limit, this will override the default configuration.
    pub fn max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.configuration.classification.max_in_flight = max_in_flight;
        self
    }

    // Sets the crop-and-scale mode, this will override the default configuration.
    pub fn crop_and_scale(mut self, mode: CropAndScale) -> Self {
        self.configuration.classification.crop_and_scale = mode;
        self
    }

    // Adjusts the idle backoff, this will override the default configuration.
    pub fn idle_backoff(mut self, backoff: Duration) -> Self {
        self.configuration.capture.idle_backoff_ms = backoff.as_millis() as u64;
        self
    }

    pub fn build(self) -> Result<Session<R>, AppError> {
        self.configuration.validate()?;
        let frames = self
            .frames
            .ok_or(AppError::Session("Frame source not set".to_string()))?;
        let make_classifier = self
            .classifier
            .ok_or(AppError::Session("Classifier not set".to_string()))?;
        let renderer = self
            .renderer
            .ok_or(AppError::Session("Renderer not set".to_string()))?;

        let configuration = self.configuration;
        let labels = LabelState::new(configuration.overlay.sentinel.clone());
        let classification = ClassificationLoop::new(
            frames.clone(),
            make_classifier(configuration.classification.max_in_flight),
            labels.clone(),
            LoopSettings {
                crop_and_scale: configuration.classification.crop_and_scale,
                idle_backoff: configuration.capture.idle_backoff(),
            },
        );
        let placement = OverlayPlacement::new(configuration.overlay.offset());

        Ok(Session {
            configuration,
            frames,
            renderer: Arc::new(Mutex::new(renderer)),
            labels,
            placement: Arc::new(StdMutex::new(placement)),
            classification: LoopSlot::Idle(classification),
            overlay: OverlaySlot::Unscheduled,
            shutdown: CancellationToken::new(),
            visible: false,
        })
    }
}
