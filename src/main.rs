use std::str::FromStr;
use std::sync::Arc;

use car_recognizer::classifier::{ModelArtifact, ModelClassifier, PrototypeEngine};
use car_recognizer::common::{Frame, Pose};
use car_recognizer::intake::LatestFrameSource;
use car_recognizer::pipeline::PlacementState;
use car_recognizer::scene::SceneGraph;
use car_recognizer::{AppError, Configuration, Session};
use chrono::Utc;
use tracing::{error, info, warn, Level};

fn init_logging(level: &str) {
    let level = Level::from_str(level).unwrap_or(Level::INFO);
    tracing_subscriber::fmt().with_max_level(level).init();
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let configuration = Configuration::load()?;
    init_logging(&configuration.logging.level);

    // A missing or corrupt model is fatal at startup.
    let artifact = ModelArtifact::load(&configuration.model.artifact_path)?;
    let engine = PrototypeEngine::from_artifact(&artifact)?;
    let classifier = ModelClassifier::new(artifact, engine);

    let frames = Arc::new(LatestFrameSource::new());
    match &configuration.capture.image_path {
        Some(path) => {
            let image = image::open(path).map_err(|e| {
                AppError::Capture(format!("failed to open {}: {}", path.display(), e))
            })?;
            frames
                .feed()
                .push(Frame::new(image, Pose::IDENTITY, Utc::now()));
            info!("Feeding still image {}", path.display());
        }
        None => warn!("No capture.image_path configured, the classifier will not see any frames"),
    }

    let mut session = Session::builder(configuration)
        .frame_source(frames)
        .classifier(classifier)
        .renderer(SceneGraph::new())
        .build()?;
    session.appear().await?;

    let outcome = tokio::select! {
        stopped = session.wait() => Some(stopped),
        _ = tokio::signal::ctrl_c() => None,
    };

    match outcome {
        Some(Err(e)) => {
            error!("Fatal error, terminating: {}", e);
            return Err(e);
        }
        Some(Ok(stats)) => warn!("Classification loop stopped unexpectedly: {:?}", stats),
        None => {
            info!("Interrupted, shutting down");
            if let Some(stats) = session.disappear().await? {
                info!("Classification totals: {:?}", stats);
            }
        }
    }

    match session.placement_state() {
        PlacementState::Placed(_) => match session.overlay().await {
            Ok(record) => info!("Overlay node {} shows '{}'", record.node, record.label),
            Err(e) => warn!("Overlay record unavailable: {}", e),
        },
        PlacementState::Pending => info!("Overlay was never placed"),
    }
    session.shutdown().await;
    Ok(())
}
