use std::sync::Arc;
use std::task::{Context, Poll};

use futures::future::BoxFuture;
use tower::Service;

use super::artifact::ModelArtifact;
use super::engine::InferenceEngine;
use super::preprocess;
use super::{Classification, ClassificationRequest};
use crate::error::ClassifierError;

/// Classifier backed by a model artifact and an inference engine.
///
/// Preprocessing and inference run on the blocking pool, so the future
/// returned by `call` does not hold up the caller's executor.
pub struct ModelClassifier<E> {
    artifact: Arc<ModelArtifact>,
    engine: Arc<E>,
}

impl<E> Clone for ModelClassifier<E> {
    fn clone(&self) -> Self {
        Self {
            artifact: self.artifact.clone(),
            engine: self.engine.clone(),
        }
    }
}

impl<E: InferenceEngine> ModelClassifier<E> {
    pub fn new(artifact: ModelArtifact, engine: E) -> Self {
        Self {
            artifact: Arc::new(artifact),
            engine: Arc::new(engine),
        }
    }

    pub fn artifact(&self) -> &ModelArtifact {
        &self.artifact
    }

    fn classify(
        artifact: &ModelArtifact,
        engine: &E,
        request: &ClassificationRequest,
    ) -> Result<Vec<Classification>, ClassifierError> {
        let input = preprocess::prepare(&request.image, request.crop_and_scale, artifact.input)
            .ok_or(ClassifierError::EmptyInput(request.frame_id))?;

        let scores = engine.infer(&input)?;
        if scores.len() != artifact.class_count() {
            return Err(ClassifierError::ShapeMismatch {
                expected: artifact.class_count(),
                actual: scores.len(),
            });
        }

        let mut ranked: Vec<Classification> = artifact
            .classes
            .iter()
            .zip(scores)
            .map(|(class, confidence)| Classification::new(class.identifier.clone(), confidence))
            .collect();
        ranked.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        Ok(ranked)
    }
}

impl<E: InferenceEngine> Service<ClassificationRequest> for ModelClassifier<E> {
    type Response = Vec<Classification>;
    type Error = ClassifierError;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: ClassificationRequest) -> Self::Future {
        let artifact = self.artifact.clone();
        let engine = self.engine.clone();
        Box::pin(async move {
            tokio::task::spawn_blocking(move || Self::classify(&artifact, &engine, &request))
                .await
                .map_err(|e| ClassifierError::WorkerPanicked(e.to_string()))?
        })
    }
}
