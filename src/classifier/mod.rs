pub mod artifact;
pub mod engine;
pub mod model;
pub mod preprocess;
pub mod traced;

use std::sync::Arc;

use image::RgbImage;
use serde::Deserialize;
use tower::util::BoxService;
use tower::{Service, ServiceBuilder};
use uuid::Uuid;

use crate::common::Frame;
use crate::error::ClassifierError;

pub use artifact::{ClassSpec, InputShape, ModelArtifact};
pub use engine::{InferenceEngine, PrototypeEngine};
pub use model::ModelClassifier;
pub use traced::{TraceClassifierLayer, TracedClassifier};

/// How an image whose aspect ratio differs from the model input is fitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CropAndScale {
    /// Crop the longer dimension around the center, then scale.
    #[default]
    CenterCrop,
    /// Scale to fit inside the input, letter-boxing the remainder.
    ScaleFit,
    /// Stretch to the input size, ignoring aspect ratio.
    ScaleFill,
}

/// One ranked result from the classifier.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    /// Category identifier, possibly several comma-separated synonyms.
    pub identifier: String,
    pub confidence: f32,
}

impl Classification {
    pub fn new(identifier: impl Into<String>, confidence: f32) -> Self {
        Self {
            identifier: identifier.into(),
            confidence,
        }
    }

    /// The first of the comma-separated names in the identifier.
    pub fn first_guess(&self) -> &str {
        first_guess(&self.identifier)
    }
}

pub fn first_guess(identifier: &str) -> &str {
    identifier.split(',').next().unwrap_or(identifier)
}

/// Highest-confidence result; the earliest one wins a tie.
pub fn top_result(results: &[Classification]) -> Option<&Classification> {
    results.iter().reduce(|best, candidate| {
        if candidate.confidence > best.confidence {
            candidate
        } else {
            best
        }
    })
}

/// A single in-flight classification.
#[derive(Debug, Clone)]
pub struct ClassificationRequest {
    pub frame_id: Uuid,
    pub image: Arc<RgbImage>,
    pub crop_and_scale: CropAndScale,
}

impl ClassificationRequest {
    /// Converts the frame to packed 8-bit RGB, the pixel format models consume.
    pub fn from_frame(frame: &Frame, crop_and_scale: CropAndScale) -> Self {
        Self {
            frame_id: frame.id(),
            image: Arc::new(frame.image().to_rgb8()),
            crop_and_scale,
        }
    }
}

/// The classifier as the classification loop sees it.
pub type ClassifierService = BoxService<ClassificationRequest, Vec<Classification>, ClassifierError>;

/// Wraps a classifier with tracing and an in-flight limit, then boxes it.
pub fn classifier_service<S>(inner: S, max_in_flight: usize) -> ClassifierService
where
    S: Service<ClassificationRequest, Response = Vec<Classification>, Error = ClassifierError>
        + Send
        + 'static,
    S::Future: Send + 'static,
{
    BoxService::new(
        ServiceBuilder::new()
            .concurrency_limit(max_in_flight.max(1))
            .layer(TraceClassifierLayer::new())
            .service(inner),
    )
}
