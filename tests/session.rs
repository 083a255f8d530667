use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use car_recognizer::classifier::{Classification, ClassificationRequest};
use car_recognizer::common::{Frame, Pose, Quat, Vec3};
use car_recognizer::intake::{FrameSource, LatestFrameSource};
use car_recognizer::pipeline::PlacementState;
use car_recognizer::scene::{Geometry, NodeId, SceneGraph, SceneRenderer};
use car_recognizer::{AppError, ClassifierError, Configuration, Session};
use chrono::Utc;
use image::{DynamicImage, RgbImage};
use tower::service_fn;

fn source_with_frame() -> Arc<LatestFrameSource> {
    let source = Arc::new(LatestFrameSource::new());
    source.feed().push(posed_frame(Pose::IDENTITY));
    source
}

fn overlay_text(graph: &SceneGraph, node: NodeId) -> String {
    let text_node = graph.children(node)[0];
    match graph.node(text_node).and_then(|n| n.geometry.clone()) {
        Some(Geometry::Text(text)) => text.string,
        None => panic!("overlay has no text geometry"),
    }
}

#[tokio::test(start_paused = true)]
async fn overlay_shows_sentinel_when_no_classification_completes() {
    let mut session = Session::builder(Configuration::default())
        .frame_source(source_with_frame())
        .classifier(service_fn(|_: ClassificationRequest| {
            std::future::pending::<Result<Vec<Classification>, ClassifierError>>()
        }))
        .renderer(SceneGraph::new())
        .build()
        .expect("session");

    let started = tokio::time::Instant::now();
    session.appear().await.expect("appear");
    let record = session.overlay().await.expect("overlay");

    assert!(started.elapsed() >= Duration::from_secs(5));
    assert_eq!(record.label, "none");
    assert_eq!(record.revision, 0);

    let renderer = session.renderer();
    let graph = renderer.lock().await;
    assert_eq!(overlay_text(&graph, record.node), "none");
}

#[tokio::test(start_paused = true)]
async fn overlay_is_placed_exactly_once_with_the_label_at_that_moment() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let mut session = Session::builder(Configuration::default())
        .frame_source(source_with_frame())
        .classifier(service_fn(move |_: ClassificationRequest| {
            let call = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                tokio::time::sleep(Duration::from_millis(40)).await;
                Ok::<_, ClassifierError>(vec![
                    Classification::new(format!("model-{},variant", call), 0.7),
                    Classification::new("minivan", 0.1),
                ])
            }
        }))
        .renderer(SceneGraph::new())
        .build()
        .expect("session");

    session.appear().await.expect("appear");
    let record = session.overlay().await.expect("overlay");
    assert!(record.revision > 0);
    assert!(record.label.starts_with("model-"));
    assert!(!record.label.contains(','));

    // The label keeps changing afterwards; the overlay does not.
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(session.labels().snapshot().revision > record.revision);
    assert_eq!(session.placement_state(), PlacementState::Placed(record.node));

    let renderer = session.renderer();
    let graph = renderer.lock().await;
    assert_eq!(graph.children(graph.root()), &[record.node]);
    assert_eq!(overlay_text(&graph, record.node), record.label);
}

fn posed_frame(camera: Pose) -> Frame {
    Frame::new(
        DynamicImage::ImageRgb8(RgbImage::new(16, 12)),
        camera,
        Utc::now(),
    )
}

#[tokio::test(start_paused = true)]
async fn overlay_sits_in_front_of_the_tracked_camera() {
    let frames = Arc::new(LatestFrameSource::new());
    let feed = frames.feed();
    feed.push(posed_frame(Pose::from_position(Vec3::new(-2.0, 0.0, 0.0))));

    let mut session = Session::builder(Configuration::default())
        .frame_source(frames)
        .classifier(service_fn(|_: ClassificationRequest| async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok::<_, ClassifierError>(vec![Classification::new("convertible", 0.5)])
        }))
        .renderer(SceneGraph::new())
        .build()
        .expect("session");
    session.appear().await.expect("appear");

    // The camera has moved by the time the overlay fires.
    tokio::time::sleep(Duration::from_secs(2)).await;
    let camera = Pose::new(
        Vec3::new(3.0, 1.5, 2.0),
        Quat::from_axis_angle(Vec3::new(0.0, 1.0, 0.0), std::f32::consts::FRAC_PI_4),
    );
    feed.push(posed_frame(camera));

    let record = session.overlay().await.expect("overlay");
    let expected = camera.transform_point(Vec3::new(0.0, 0.0, -0.2));
    assert_eq!(record.camera, camera);
    assert!(record.world_position.distance(expected) < 1e-5);
    assert_eq!(record.label, "convertible");

    // Later camera motion leaves the node where it was placed.
    feed.push(posed_frame(Pose::IDENTITY));
    tokio::time::sleep(Duration::from_secs(1)).await;
    let renderer = session.renderer();
    let mut graph = renderer.lock().await;
    graph.update_camera(Pose::IDENTITY);
    let placed = graph.world_position(record.node).expect("placed node");
    assert!(placed.distance(expected) < 1e-5);
}

#[tokio::test(start_paused = true)]
async fn classifier_failure_terminates_the_session() {
    let mut session = Session::builder(Configuration::default())
        .frame_source(source_with_frame())
        .classifier(service_fn(|_: ClassificationRequest| async {
            Err::<Vec<Classification>, _>(ClassifierError::Inference(
                "tensor allocation failed".to_string(),
            ))
        }))
        .renderer(SceneGraph::new())
        .build()
        .expect("session");

    session.appear().await.expect("appear");
    let err = session.wait().await.unwrap_err();
    assert!(matches!(
        err,
        AppError::Classifier(ClassifierError::Inference(_))
    ));
    assert!(!session.is_classifying());
    assert_eq!(session.labels().label(), "none");

    // A terminated loop is not restarted.
    session.disappear().await.expect("disappear");
    assert!(matches!(session.appear().await, Err(AppError::Session(_))));
}

#[tokio::test(start_paused = true)]
async fn hiding_stops_classification_and_showing_resumes_it() {
    let frames = source_with_frame();
    let mut session = Session::builder(Configuration::default())
        .frame_source(frames.clone())
        .classifier(service_fn(|_: ClassificationRequest| async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            Ok::<_, ClassifierError>(vec![Classification::new("hatchback", 0.6)])
        }))
        .renderer(SceneGraph::new())
        .build()
        .expect("session");

    session.appear().await.expect("appear");
    assert!(session.is_visible());
    assert!(session.is_classifying());
    assert!(session.renderer().lock().await.is_running());

    tokio::time::sleep(Duration::from_millis(200)).await;
    let stats = session
        .disappear()
        .await
        .expect("disappear")
        .expect("loop was running");
    assert!(stats.completed > 0);
    assert!(!session.is_visible());
    assert!(!session.is_classifying());
    assert!(!frames.is_running());
    assert!(frames.latest_frame().await.is_none());
    assert!(!session.renderer().lock().await.is_running());

    let revision = session.labels().snapshot().revision;
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(session.labels().snapshot().revision, revision);

    session.appear().await.expect("appear again");
    assert!(session.is_classifying());
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(session.labels().snapshot().revision > revision);
    assert_eq!(session.labels().label(), "hatchback");
}

#[tokio::test(start_paused = true)]
async fn overlay_still_fires_while_hidden() {
    let mut session = Session::builder(Configuration::default())
        .frame_source(source_with_frame())
        .classifier(service_fn(|_: ClassificationRequest| async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            Ok::<_, ClassifierError>(vec![Classification::new("roadster", 0.9)])
        }))
        .renderer(SceneGraph::new())
        .overlay_delay(Duration::from_secs(1))
        .build()
        .expect("session");

    session.appear().await.expect("appear");
    tokio::time::sleep(Duration::from_millis(100)).await;
    session.disappear().await.expect("disappear");

    let record = session.overlay().await.expect("overlay");
    assert_eq!(record.label, "roadster");
    assert_eq!(session.placement_state(), PlacementState::Placed(record.node));
}

#[tokio::test(start_paused = true)]
async fn shutdown_cancels_a_pending_overlay() {
    let mut session = Session::builder(Configuration::default())
        .frame_source(source_with_frame())
        .classifier(service_fn(|_: ClassificationRequest| async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            Ok::<_, ClassifierError>(vec![Classification::new("coupe", 0.9)])
        }))
        .renderer(SceneGraph::new())
        .build()
        .expect("session");

    session.appear().await.expect("appear");
    session.shutdown().await;
    assert!(matches!(session.overlay().await, Err(AppError::Session(_))));
    assert_eq!(session.placement_state(), PlacementState::Pending);

    let renderer = session.renderer();
    let graph = renderer.lock().await;
    assert!(graph.children(graph.root()).is_empty());
}
