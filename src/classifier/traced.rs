use std::task::{Context, Poll};
use std::time::Instant;

use futures::future::BoxFuture;
use tower::Service;
use tower_layer::Layer;
use tracing::{debug, Instrument};

use super::{top_result, Classification, ClassificationRequest};
use crate::error::ClassifierError;

/// A wrapper that instruments every classification with timing and outcome.
#[derive(Clone)]
pub struct TracedClassifier<S> {
    inner: S,
}

impl<S> TracedClassifier<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S> Service<ClassificationRequest> for TracedClassifier<S>
where
    S: Service<ClassificationRequest, Response = Vec<Classification>, Error = ClassifierError>,
    S::Future: Send + 'static,
{
    type Response = Vec<Classification>;
    type Error = ClassifierError;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: ClassificationRequest) -> Self::Future {
        let span = tracing::debug_span!("classify", frame = %request.frame_id);
        let start = Instant::now();
        let future = self.inner.call(request);

        Box::pin(
            async move {
                let result = future.await;
                let duration_us = start.elapsed().as_micros() as u64;
                match &result {
                    Ok(ranked) => match top_result(ranked) {
                        Some(top) => debug!(
                            "Classified in {}us: '{}' ({:.3})",
                            duration_us, top.identifier, top.confidence
                        ),
                        None => debug!("Classified in {}us: no results", duration_us),
                    },
                    Err(e) => tracing::error!("Classification failed after {}us: {}", duration_us, e),
                }
                result
            }
            .instrument(span),
        )
    }
}

/// Layer form of [`TracedClassifier`] for use with `tower::ServiceBuilder`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TraceClassifierLayer;

impl TraceClassifierLayer {
    pub fn new() -> Self {
        Self
    }
}

impl<S> Layer<S> for TraceClassifierLayer {
    type Service = TracedClassifier<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TracedClassifier::new(inner)
    }
}
