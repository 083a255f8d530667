use std::path::PathBuf;

use thiserror::Error;
use uuid::Uuid;

use crate::scene::NodeId;

// Main Application Error Type

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration Error: {0}")]
    Config(#[from] ::config::ConfigError),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Model Artifact Error: {0}")]
    ModelArtifact(#[from] ArtifactError),
    #[error("Classifier Error: {0}")]
    Classifier(#[from] ClassifierError),
    #[error("Capture Error: {0}")]
    Capture(String),
    #[error("Scene Error: {0}")]
    Scene(String),
    #[error("The overlay has already been placed as node {0}")]
    OverlayAlreadyPlaced(NodeId),
    #[error("Session Error: {0}")]
    Session(String),
}

// Model artifact loading, fatal at startup.
#[derive(Error, Debug)]
pub enum ArtifactError {
    #[error("Model artifact does not exist: {}", .0.display())]
    Missing(PathBuf),
    #[error("Failed to read model artifact {}: {}", .1.display(), .0)]
    Read(std::io::Error, PathBuf),
    #[error("Failed to parse model artifact: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid model artifact: {0}")]
    Invalid(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClassifierError {
    #[error("Input image for frame {0} is empty")]
    EmptyInput(Uuid),
    #[error("Inference failed: {0}")]
    Inference(String),
    #[error("Model produced {actual} scores, expected {expected}")]
    ShapeMismatch { expected: usize, actual: usize },
    #[error("Inference worker panicked: {0}")]
    WorkerPanicked(String),
}
