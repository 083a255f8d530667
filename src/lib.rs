pub mod classifier;
pub mod common;
pub mod config;
pub mod error;
pub mod intake;
pub mod pipeline;
pub mod scene;
pub mod session;

pub use error::{AppError, ArtifactError, ClassifierError};

pub use config::Configuration;
pub use session::{Session, SessionBuilder};
