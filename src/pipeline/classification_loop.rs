use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tower::{Service, ServiceExt};
use tracing::{debug, error, info, trace};
use uuid::Uuid;

use crate::classifier::{
    top_result, Classification, ClassificationRequest, ClassifierService, CropAndScale,
};
use crate::error::{AppError, ClassifierError};
use crate::intake::FrameSource;
use crate::pipeline::label::LabelState;

type Completion = (Uuid, Result<Vec<Classification>, ClassifierError>);

#[derive(Debug, Clone, Copy)]
pub struct LoopSettings {
    pub crop_and_scale: CropAndScale,
    /// Sleep between polls while the frame source has nothing to offer.
    pub idle_backoff: Duration,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            crop_and_scale: CropAndScale::CenterCrop,
            idle_backoff: Duration::from_millis(16),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub submitted: u64,
    pub completed: u64,
    pub empty_results: u64,
    pub frames_skipped: u64,
}

/// Pulls frames, classifies them and publishes the best guess.
///
/// Submissions do not wait for earlier ones to finish; the classifier's
/// readiness (a concurrency limit in practice) is the only backpressure.
/// Whichever classification completes last owns the label.
pub struct ClassificationLoop {
    frames: Arc<dyn FrameSource>,
    classifier: ClassifierService,
    labels: LabelState,
    settings: LoopSettings,
    stats: LoopStats,
}

impl ClassificationLoop {
    pub fn new(
        frames: Arc<dyn FrameSource>,
        classifier: ClassifierService,
        labels: LabelState,
        settings: LoopSettings,
    ) -> Self {
        Self {
            frames,
            classifier,
            labels,
            settings,
            stats: LoopStats::default(),
        }
    }

    pub fn stats(&self) -> LoopStats {
        self.stats
    }

    /// Runs until `cancel` fires (returns the running totals) or the
    /// classifier reports an error (fatal, returned as `Err`). In-flight
    /// classifications are abandoned either way.
    pub async fn run(&mut self, cancel: CancellationToken) -> Result<LoopStats, AppError> {
        info!("Classification loop starting");
        let mut in_flight: JoinSet<Completion> = JoinSet::new();
        let result = self.drive(&mut in_flight, &cancel).await;
        in_flight.abort_all();
        match &result {
            Ok(stats) => info!("Classification loop stopped: {:?}", stats),
            Err(e) => error!("Classification loop terminated: {}", e),
        }
        result
    }

    async fn drive(
        &mut self,
        in_flight: &mut JoinSet<Completion>,
        cancel: &CancellationToken,
    ) -> Result<LoopStats, AppError> {
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Ok(self.stats);
                }
                Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                    let (frame_id, result) = joined.map_err(|e| {
                        AppError::Session(format!("classification task failed: {}", e))
                    })?;
                    self.complete(frame_id, result)?;
                }
                ready = self.classifier.ready() => {
                    ready?;
                    self.submit(in_flight).await;
                }
            }
        }
    }

    async fn submit(&mut self, in_flight: &mut JoinSet<Completion>) {
        let Some(frame) = self.frames.latest_frame().await else {
            self.stats.frames_skipped += 1;
            trace!("No frame available, skipping iteration");
            tokio::time::sleep(self.settings.idle_backoff).await;
            return;
        };

        let request = ClassificationRequest::from_frame(&frame, self.settings.crop_and_scale);
        let frame_id = request.frame_id;
        let future = self.classifier.call(request);
        self.stats.submitted += 1;
        trace!("Submitted frame {} ({} in flight)", frame_id, in_flight.len() + 1);
        in_flight.spawn(async move { (frame_id, future.await) });
    }

    fn complete(
        &mut self,
        frame_id: Uuid,
        result: Result<Vec<Classification>, ClassifierError>,
    ) -> Result<(), AppError> {
        self.stats.completed += 1;
        let ranked = result?;
        match top_result(&ranked) {
            Some(top) => {
                let label = top.first_guess();
                let revision = self.labels.publish(label, frame_id);
                debug!(
                    "Label '{}' ({:.3}) from frame {}, revision {}",
                    label, top.confidence, frame_id, revision
                );
            }
            None => {
                self.stats.empty_results += 1;
                debug!("No classification results for frame {}", frame_id);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::classifier_service;
    use crate::common::{Frame, Pose};
    use crate::intake::LatestFrameSource;
    use chrono::Utc;
    use image::{DynamicImage, RgbImage};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tower::service_fn;

    fn running_source(with_frame: bool) -> Arc<LatestFrameSource> {
        let source = Arc::new(LatestFrameSource::new());
        source.start().expect("start");
        if with_frame {
            source.feed().push(Frame::new(
                DynamicImage::ImageRgb8(RgbImage::new(8, 8)),
                Pose::IDENTITY,
                Utc::now(),
            ));
        }
        source
    }

    fn looped(
        frames: Arc<LatestFrameSource>,
        classifier: ClassifierService,
        labels: &LabelState,
    ) -> ClassificationLoop {
        ClassificationLoop::new(frames, classifier, labels.clone(), LoopSettings::default())
    }

    #[tokio::test(start_paused = true)]
    async fn publishes_first_synonym_of_top_result() {
        let labels = LabelState::new("none");
        let classifier = classifier_service(
            service_fn(|_: ClassificationRequest| async {
                Ok::<_, ClassifierError>(vec![
                    Classification::new("sedan,4-door", 0.9),
                    Classification::new("coupe", 0.1),
                ])
            }),
            1,
        );
        let mut classification = looped(running_source(true), classifier, &labels);
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let mut updates = labels.subscribe();

        let run = tokio::spawn(async move { classification.run(token).await });
        updates.changed().await.expect("label update");
        assert_eq!(labels.label(), "sedan");

        cancel.cancel();
        let stats = run.await.expect("join").expect("clean stop");
        assert!(stats.completed >= 1);
        assert_eq!(stats.empty_results, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_frames_are_skipped() {
        let labels = LabelState::new("none");
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let classifier = classifier_service(
            service_fn(move |_: ClassificationRequest| {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, ClassifierError>(vec![Classification::new("sedan", 1.0)]) }
            }),
            1,
        );
        let mut classification = looped(running_source(false), classifier, &labels);
        let cancel = CancellationToken::new();
        let stopper = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            stopper.cancel();
        });

        let stats = classification.run(cancel).await.expect("clean stop");
        assert!(stats.frames_skipped > 0);
        assert_eq!(stats.submitted, 0);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(labels.snapshot().is_sentinel());
        assert_eq!(labels.label(), "none");
    }

    #[tokio::test(start_paused = true)]
    async fn empty_results_keep_the_previous_label() {
        let labels = LabelState::new("none");
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let classifier = classifier_service(
            service_fn(move |_: ClassificationRequest| {
                let call = counter.fetch_add(1, Ordering::SeqCst);
                async move {
                    if call == 0 {
                        Ok::<_, ClassifierError>(vec![Classification::new("pickup,truck", 0.8)])
                    } else {
                        tokio::time::sleep(Duration::from_millis(5)).await;
                        Ok(Vec::new())
                    }
                }
            }),
            1,
        );
        let mut classification = looped(running_source(true), classifier, &labels);
        let cancel = CancellationToken::new();
        let stopper = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            stopper.cancel();
        });

        let stats = classification.run(cancel).await.expect("clean stop");
        assert!(stats.empty_results > 0);
        assert_eq!(labels.label(), "pickup");
        assert_eq!(labels.snapshot().revision, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn classifier_error_is_fatal() {
        let labels = LabelState::new("none");
        let classifier = classifier_service(
            service_fn(|_: ClassificationRequest| async {
                Err::<Vec<Classification>, _>(ClassifierError::Inference("bad model".to_string()))
            }),
            1,
        );
        let mut classification = looped(running_source(true), classifier, &labels);

        let err = classification
            .run(CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::Classifier(ClassifierError::Inference(_))
        ));
        assert_eq!(labels.label(), "none");
    }

    #[tokio::test(start_paused = true)]
    async fn most_recently_completed_result_wins() {
        let labels = LabelState::new("none");
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        // First request is slow, second is fast, later ones never finish.
        let classifier = classifier_service(
            service_fn(move |_: ClassificationRequest| {
                let call = counter.fetch_add(1, Ordering::SeqCst);
                async move {
                    match call {
                        0 => {
                            tokio::time::sleep(Duration::from_millis(100)).await;
                            Ok::<_, ClassifierError>(vec![Classification::new("submitted first", 0.9)])
                        }
                        1 => {
                            tokio::time::sleep(Duration::from_millis(10)).await;
                            Ok(vec![Classification::new("submitted second", 0.9)])
                        }
                        _ => std::future::pending().await,
                    }
                }
            }),
            2,
        );
        let mut classification = looped(running_source(true), classifier, &labels);
        let cancel = CancellationToken::new();
        let stopper = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(150)).await;
            stopper.cancel();
        });

        let stats = classification.run(cancel).await.expect("clean stop");
        assert_eq!(stats.completed, 2);
        assert_eq!(labels.label(), "submitted first");
        assert_eq!(labels.snapshot().revision, 2);
    }
}
