//! End-to-end frame loop behaviour with mocked camera, backend and surface.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use mood_lens_core::{
    BoundingBox, ControllerConfig, DisplaySize, EmotionController, EmotionLabel, Expression,
    ExpressionScores, LensError, LifecycleEvent, LifecycleState, ModelGate, ModelUnit,
};
use mood_lens_test_support::{
    MockBackend, MockCamera, MockEventSink, RecordingSurface, SurfaceOp,
};

type Controller = EmotionController<MockCamera, MockBackend, RecordingSurface>;

fn config(max_frames: Option<u64>) -> ControllerConfig {
    ControllerConfig {
        max_frames,
        ..ControllerConfig::default()
    }
}

fn controller(
    config: ControllerConfig,
    camera: &MockCamera,
    backend: &MockBackend,
) -> (Controller, MockEventSink, RecordingSurface) {
    let events = MockEventSink::new();
    let surface = RecordingSurface::new();
    let controller = EmotionController::new(
        config,
        camera.clone(),
        Arc::new(backend.clone()),
        surface.clone(),
    )
    .with_events(Arc::new(events.clone()));
    (controller, events, surface)
}

fn scores(expression: Expression) -> Option<ExpressionScores> {
    Some(ExpressionScores::from_pairs(&[(expression, 0.8)]))
}

fn startup_order(events: &MockEventSink) -> Vec<&'static str> {
    events
        .events()
        .iter()
        .filter_map(|event| match event {
            LifecycleEvent::CameraReady { .. } => Some("camera"),
            LifecycleEvent::ModelsReady => Some("models"),
            LifecycleEvent::Started { .. } => Some("started"),
            _ => None,
        })
        .collect()
}

#[tokio::test(start_paused = true)]
async fn camera_first_then_models_reaches_running() {
    let camera = MockCamera::granted(320, 240);
    let backend = MockBackend::new().with_load_delay(Duration::from_millis(200));
    let (mut controller, events, _) = controller(config(Some(3)), &camera, &backend);

    let summary = controller.run().await.unwrap();

    assert_eq!(startup_order(&events), ["camera", "models", "started"]);
    assert_eq!(summary.frames_processed, 3);
    assert_eq!(summary.state, LifecycleState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn models_first_then_camera_reaches_running() {
    let camera = MockCamera::granted(320, 240).with_open_delay(Duration::from_millis(500));
    let backend = MockBackend::new();
    let (mut controller, events, _) = controller(config(Some(3)), &camera, &backend);

    let summary = controller.run().await.unwrap();

    assert_eq!(startup_order(&events), ["models", "camera", "started"]);
    assert_eq!(summary.frames_processed, 3);
}

#[tokio::test(start_paused = true)]
async fn at_most_one_inference_in_flight() {
    let camera = MockCamera::granted(320, 240);
    let backend = MockBackend::new().with_faces(3);
    let (mut controller, _, _) = controller(config(Some(20)), &camera, &backend);

    controller.run().await.unwrap();

    assert_eq!(backend.detect_calls(), 20);
    assert_eq!(backend.max_in_flight(), 1);
}

#[tokio::test(start_paused = true)]
async fn double_teardown_releases_camera_once() {
    let camera = MockCamera::granted(320, 240);
    let backend = MockBackend::new();
    let (mut controller, events, _) = controller(config(Some(2)), &camera, &backend);

    controller.run().await.unwrap();
    assert!(!controller.teardown());
    assert!(!controller.teardown());

    assert_eq!(camera.stop_count(), 1);
    assert_eq!(
        events.count(|e| matches!(e, LifecycleEvent::Stopped { .. })),
        1
    );
}

#[tokio::test(start_paused = true)]
async fn teardown_before_run_prevents_start() {
    let camera = MockCamera::granted(320, 240);
    let backend = MockBackend::new();
    let (mut controller, _, _) = controller(config(Some(2)), &camera, &backend);

    assert!(controller.teardown());
    let summary = controller.run().await.unwrap();

    assert_eq!(summary.frames_processed, 0);
    assert_eq!(camera.open_count(), 0);
    assert_eq!(backend.total_loads(), 0);
}

#[tokio::test(start_paused = true)]
async fn denied_camera_never_runs_inference() {
    let camera = MockCamera::denied();
    let backend = MockBackend::new();
    let (mut controller, events, _) = controller(config(Some(5)), &camera, &backend);

    let err = controller.run().await.unwrap_err();

    assert!(matches!(err, LensError::CameraUnavailable(_)));
    assert_eq!(backend.detect_calls(), 0);
    assert_eq!(controller.state(), LifecycleState::Idle);
    assert_eq!(
        events.count(|e| matches!(e, LifecycleEvent::StartupFailed { .. })),
        1
    );
}

#[tokio::test(start_paused = true)]
async fn camera_denied_after_models_loaded_stays_models_ready() {
    let camera = MockCamera::denied().with_open_delay(Duration::from_millis(300));
    let backend = MockBackend::new();
    let (mut controller, events, surface) = controller(config(Some(5)), &camera, &backend);

    let err = controller.run().await.unwrap_err();

    assert!(matches!(err, LensError::CameraUnavailable(_)));
    assert_eq!(controller.state(), LifecycleState::ModelsReady);
    assert_eq!(startup_order(&events), ["models"]);
    assert_eq!(backend.detect_calls(), 0);
    assert!(surface.ops().is_empty());
}

#[tokio::test(start_paused = true)]
async fn failed_model_load_releases_camera_and_never_runs() {
    let camera = MockCamera::granted(320, 240);
    let backend = MockBackend::new()
        .with_load_delay(Duration::from_millis(100))
        .failing_load(ModelUnit::Expression);
    let (mut controller, events, surface) = controller(config(Some(5)), &camera, &backend);

    let err = controller.run().await.unwrap_err();

    assert!(matches!(
        err,
        LensError::ModelLoad {
            unit: ModelUnit::Expression,
            ..
        }
    ));
    assert_eq!(controller.state(), LifecycleState::CameraReady);
    assert_eq!(camera.stop_count(), 1);
    assert_eq!(backend.detect_calls(), 0);
    assert!(surface.ops().is_empty());
    assert_eq!(startup_order(&events), ["camera"]);
}

#[tokio::test(start_paused = true)]
async fn cancellation_stops_the_loop() {
    let camera = MockCamera::granted(320, 240);
    let backend = MockBackend::new();
    let (mut controller, _, _) = controller(config(None), &camera, &backend);
    let handle = controller.handle();

    let cancel = async {
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(handle.cancel());
    };
    let (summary, ()) = tokio::join!(controller.run(), cancel);
    let summary = summary.unwrap();

    assert!(summary.frames_processed > 0);
    assert_eq!(summary.state, LifecycleState::Stopped);
    assert_eq!(camera.stop_count(), 1);

    let calls = backend.detect_calls();
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(backend.detect_calls(), calls);
}

#[tokio::test(start_paused = true)]
async fn results_of_inference_cancelled_midway_are_discarded() {
    let camera = MockCamera::granted(320, 240);
    let backend = MockBackend::new()
        .with_detect_delay(Duration::from_millis(100))
        .with_script(vec![scores(Expression::Happy), scores(Expression::Sad)]);
    let (mut controller, events, surface) = controller(config(None), &camera, &backend);
    let handle = controller.handle();
    let label = controller.subscribe();

    // The second pass runs from 100ms to 200ms.
    let cancel = async {
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(handle.cancel());
    };
    let (summary, ()) = tokio::join!(controller.run(), cancel);
    let summary = summary.unwrap();

    assert_eq!(backend.detect_calls(), 2);
    assert_eq!(summary.frames_processed, 1);
    assert_eq!(summary.last_label.as_str(), "happy");
    assert_eq!(label.borrow().as_str(), "happy");
    assert_eq!(events.labels(), [EmotionLabel::from("happy")]);
    assert_eq!(surface.presented(), 1);
    let detections = surface
        .ops()
        .iter()
        .filter(|op| matches!(op, SurfaceOp::Detection(_)))
        .count();
    assert_eq!(detections, 1);
}

#[tokio::test(start_paused = true)]
async fn cancellation_during_capture_skips_inference() {
    let camera = MockCamera::granted(320, 240).with_frame_delay(Duration::from_millis(100));
    let backend = MockBackend::new();
    let (mut controller, events, surface) = controller(config(None), &camera, &backend);
    let handle = controller.handle();

    let cancel = async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(handle.cancel());
    };
    let (summary, ()) = tokio::join!(controller.run(), cancel);
    let summary = summary.unwrap();

    assert_eq!(camera.frame_calls(), 1);
    assert_eq!(backend.detect_calls(), 0);
    assert_eq!(summary.frames_processed, 0);
    assert_eq!(summary.state, LifecycleState::Stopped);
    assert!(events.labels().is_empty());
    assert_eq!(surface.presented(), 0);
}

#[tokio::test(start_paused = true)]
async fn cancellation_during_startup_releases_camera() {
    let camera = MockCamera::granted(320, 240);
    let backend = MockBackend::new().with_load_delay(Duration::from_secs(10));
    let (mut controller, _, _) = controller(config(None), &camera, &backend);
    let handle = controller.handle();

    let cancel = async {
        tokio::time::sleep(Duration::from_secs(1)).await;
        handle.cancel();
    };
    let (summary, ()) = tokio::join!(controller.run(), cancel);

    assert_eq!(summary.unwrap().frames_processed, 0);
    assert_eq!(camera.stop_count(), 1);
    assert_eq!(backend.detect_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn label_is_retained_when_no_face_is_found() {
    let camera = MockCamera::granted(320, 240);
    let backend = MockBackend::new().with_script(vec![
        scores(Expression::Happy),
        scores(Expression::Happy),
        None,
        scores(Expression::Sad),
    ]);
    let (mut controller, events, _) = controller(config(Some(4)), &camera, &backend);
    let label = controller.subscribe();

    let summary = controller.run().await.unwrap();

    assert_eq!(events.labels(), [EmotionLabel::from("happy"), EmotionLabel::from("sad")]);
    assert_eq!(label.borrow().as_str(), "sad");
    assert_eq!(summary.last_label.as_str(), "sad");
}

#[tokio::test(start_paused = true)]
async fn reset_policy_clears_label_without_faces() {
    let camera = MockCamera::granted(320, 240);
    let backend = MockBackend::new().with_script(vec![scores(Expression::Angry), None]);
    let config = ControllerConfig {
        retain_label_on_empty: false,
        ..config(Some(3))
    };
    let (mut controller, events, _) = controller(config, &camera, &backend);

    let summary = controller.run().await.unwrap();

    assert_eq!(events.labels(), [EmotionLabel::from("angry"), EmotionLabel::empty()]);
    assert!(summary.last_label.is_empty());
}

#[tokio::test(start_paused = true)]
async fn tied_scores_are_joined() {
    let camera = MockCamera::granted(320, 240);
    let tie = ExpressionScores::from_pairs(&[(Expression::Happy, 0.5), (Expression::Surprised, 0.5)]);
    let backend = MockBackend::new().with_script(vec![Some(tie)]);
    let (mut controller, _, _) = controller(config(Some(1)), &camera, &backend);

    let summary = controller.run().await.unwrap();

    assert_eq!(summary.last_label.as_str(), "happy, surprised");
}

#[tokio::test(start_paused = true)]
async fn frame_errors_do_not_stop_the_loop() {
    let camera = MockCamera::granted(320, 240).with_failing_frame(1);
    let backend = MockBackend::new().failing_detection(2);
    let (mut controller, events, _) = controller(config(Some(4)), &camera, &backend);

    let summary = controller.run().await.unwrap();

    assert_eq!(summary.frames_processed, 4);
    assert_eq!(summary.frame_errors, 2);
    assert_eq!(
        events.count(|e| matches!(e, LifecycleEvent::FrameFailed { .. })),
        2
    );
}

#[tokio::test(start_paused = true)]
async fn frames_before_first_decode_are_skipped() {
    let camera = MockCamera::granted(320, 240).with_frames_ready_after(3);
    let backend = MockBackend::new();
    let (mut controller, events, _) = controller(config(Some(2)), &camera, &backend);

    let summary = controller.run().await.unwrap();

    assert_eq!(summary.frames_processed, 2);
    assert_eq!(summary.frame_errors, 0);
    assert_eq!(camera.frame_calls(), 5);
    assert_eq!(
        events.count(|e| matches!(e, LifecycleEvent::FrameFailed { .. })),
        0
    );
}

#[tokio::test(start_paused = true)]
async fn overlay_matches_display_size_and_draw_order() {
    let camera = MockCamera::granted(320, 240);
    let backend = MockBackend::new();
    let config = ControllerConfig {
        display_size: Some(DisplaySize::new(640, 480)),
        ..config(Some(1))
    };
    let (mut controller, _, surface) = controller(config, &camera, &backend);

    controller.run().await.unwrap();

    let ops = surface.ops();
    assert_eq!(ops[0], SurfaceOp::Resize(DisplaySize::new(640, 480)));
    assert_eq!(ops[1], SurfaceOp::Clear);
    // Mock face at (0, 60, 80, 120) in the 320x240 source, doubled.
    assert_eq!(
        ops[2],
        SurfaceOp::Detection(BoundingBox::new(0.0, 120.0, 160.0, 240.0, 0.9))
    );
    assert_eq!(ops[3], SurfaceOp::Landmarks(68));
    assert!(matches!(ops[4], SurfaceOp::Expressions { drawn: 1, .. }));
    assert_eq!(ops[5], SurfaceOp::Present(1));
    assert_eq!(surface.presented(), 1);
}

#[tokio::test(start_paused = true)]
async fn shared_gate_loads_models_once_across_controllers() {
    let backend = MockBackend::new();
    let gate = Arc::new(ModelGate::new());

    for _ in 0..2 {
        let camera = MockCamera::granted(160, 120);
        let (controller, _, _) = controller(config(Some(1)), &camera, &backend);
        let mut controller = controller.with_model_gate(Arc::clone(&gate));
        controller.run().await.unwrap();
    }

    assert_eq!(backend.total_loads(), 4);
    assert_eq!(backend.detect_calls(), 2);
}
