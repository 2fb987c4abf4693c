use posture_engine::config::ScoringConfig;
use posture_engine::core_modules::landmarks::{LandmarkFrame, LandmarkName, LandmarkPoint};
use posture_engine::core_modules::scorer::PostureScorer;
use posture_engine::core_modules::slouch_timer::SlouchPhase;
use posture_engine::{
    Alert, AngleTriple, Axis, Baseline, BaselineStore, EngineConfig, FrameReport, JsonFileStore,
    JsonLinesSource, MemoryStore, MonitorSession, PoseFrame, VecSource, run_calibration,
    run_monitor,
};
use std::io::Cursor;
use std::sync::atomic::AtomicBool;
use std::time::Instant;

fn point(x: f64, y: f64, visibility: f64) -> LandmarkPoint {
    LandmarkPoint {
        x,
        y,
        z: 0.0,
        visibility,
    }
}

/// Right side facing the camera; the ear sits `lean` ahead of the shoulder.
fn seated(lean: f64) -> LandmarkFrame {
    [
        (LandmarkName::RightHip, point(0.5, 0.8, 0.95)),
        (LandmarkName::RightShoulder, point(0.5, 0.5, 0.95)),
        (LandmarkName::RightEar, point(0.5 + lean, 0.3, 0.95)),
        (LandmarkName::LeftShoulder, point(0.52, 0.5, 0.2)),
        (LandmarkName::Nose, point(0.55, 0.28, 0.9)),
    ]
    .into_iter()
    .collect()
}

fn frame(timestamp_ms: u64, landmarks: Option<LandmarkFrame>) -> PoseFrame {
    PoseFrame {
        timestamp_ms,
        landmarks,
    }
}

#[test]
fn back_curve_deviation_zeroes_its_axis() {
    let scorer = PostureScorer::new(&ScoringConfig::default());
    let baseline = Baseline::from(AngleTriple::new(90.0, 85.0, 175.0));

    let result = scorer.evaluate(&AngleTriple::new(90.0, 85.0, 155.0), &baseline);
    assert_eq!(result.axis(Axis::TorsoRecline).unwrap().score, 100);
    assert_eq!(result.axis(Axis::NeckProtraction).unwrap().score, 100);
    assert_eq!(result.axis(Axis::BackCurve).unwrap().score, 0);
    assert_eq!(result.aggregate, Some(66));
    assert!(result.is_slouching());
}

#[test]
fn weighted_aggregate_favours_heavier_axes() {
    let mut config = ScoringConfig::default();
    config.neck_protraction.weight = 2.0;
    let scorer = PostureScorer::new(&config);
    let baseline = Baseline::from(AngleTriple::new(90.0, 85.0, 175.0));

    let result = scorer.evaluate(&AngleTriple::new(90.0, 85.0, 155.0), &baseline);
    assert_eq!(result.aggregate, Some(75));
}

#[test]
fn untracked_axis_is_left_out() {
    let scorer = PostureScorer::new(&ScoringConfig::default());
    let baseline: Baseline = [(Axis::TorsoRecline, 90.0), (Axis::BackCurve, 175.0)]
        .into_iter()
        .collect();

    let result = scorer.evaluate(&AngleTriple::new(90.0, 40.0, 155.0), &baseline);
    assert!(result.axis(Axis::NeckProtraction).is_none());
    assert_eq!(result.axes.len(), 2);
    assert_eq!(result.aggregate, Some(50));
}

#[test]
fn calibrate_to_disk_then_monitor_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("posture_baseline.json");
    let mut config = EngineConfig::default();
    config.calibration.window_capacity = 5;
    config.calibration.stable_frames_required = 10;
    let stop = AtomicBool::new(false);

    // An occluded frame first, then a steady upright pose.
    let mut recording = String::new();
    recording.push_str(&serde_json::to_string(&frame(0, None)).unwrap());
    recording.push('\n');
    for i in 1..40 {
        recording.push_str(&serde_json::to_string(&frame(i * 33, Some(seated(0.0)))).unwrap());
        recording.push('\n');
    }

    let mut store = JsonFileStore::new(&path);
    let mut source = JsonLinesSource::new(Cursor::new(recording));
    let baseline = run_calibration(&mut source, &config, &mut store, &stop, |_| {}).unwrap();
    assert!(path.is_file());
    assert_eq!(JsonFileStore::new(&path).load().unwrap(), baseline);
    // Calibration stops reading once the baseline is captured.
    assert_eq!(source.line_number(), 1 + 5 - 1 + 10);

    let mut session = MonitorSession::start(&config, JsonFileStore::new(&path)).unwrap();
    let report = session.process_frame(Some(&seated(0.0)), Instant::now());
    let FrameReport::Evaluated(posture) = report else {
        panic!("upright frame should be evaluated");
    };
    // The stored mean may differ from the live angle in the last bit.
    assert!(posture.score.aggregate.unwrap() >= 99);
    assert!(!posture.score.is_slouching());
    assert_eq!(posture.timer.alert, Alert::GoodPosture);
}

#[test]
fn held_slouch_walks_through_every_state_and_back() {
    let baseline = Baseline::from(AngleTriple::new(0.0, 0.0, 180.0));
    let mut session =
        MonitorSession::start(&EngineConfig::default(), MemoryStore::with_baseline(baseline)).unwrap();
    let stop = AtomicBool::new(false);

    // Slouch from 0 ms to 5 500 ms (just past T1), then sit up.
    let mut frames: Vec<PoseFrame> = (0..=11).map(|i| frame(i * 500, Some(seated(0.2)))).collect();
    frames.push(frame(6_000, Some(seated(0.0))));

    let mut phases = Vec::new();
    let mut alerts = Vec::new();
    let summary = run_monitor(
        &mut VecSource::new(frames),
        &mut session,
        Instant::now(),
        &stop,
        |_, report| {
            if let FrameReport::Evaluated(posture) = report {
                phases.push(posture.timer.state.phase());
                alerts.push(posture.timer.alert);
            }
        },
    )
    .unwrap();

    assert_eq!(summary.frames, 13);
    assert_eq!(summary.alerts, 1);
    assert_eq!(summary.escalations, 0);

    phases.dedup();
    assert_eq!(
        phases,
        vec![
            SlouchPhase::InitialDeviation,
            SlouchPhase::SustainedAlert,
            SlouchPhase::Ideal
        ]
    );
    // At exactly 5 000 ms the alert has not changed yet.
    assert_eq!(alerts[10], Alert::Adjusting);
    assert_eq!(alerts[11], Alert::BadPosture);
    assert_eq!(alerts[12], Alert::GoodPosture);
}

#[test]
fn malformed_lines_and_empty_frames_do_not_stop_monitoring() {
    let baseline = Baseline::from(AngleTriple::new(0.0, 0.0, 180.0));
    let mut session =
        MonitorSession::start(&EngineConfig::default(), MemoryStore::with_baseline(baseline)).unwrap();
    let stop = AtomicBool::new(false);

    let good = serde_json::to_string(&frame(0, Some(seated(0.0)))).unwrap();
    let recording = format!("{good}\nnot json\n{{\"timestamp_ms\": 40}}\n{good}\n");
    let summary = run_monitor(
        &mut JsonLinesSource::new(Cursor::new(recording)),
        &mut session,
        Instant::now(),
        &stop,
        |_, _| {},
    )
    .unwrap();

    assert_eq!(summary.frames, 3);
    assert_eq!(summary.malformed, 1);
    assert_eq!(summary.skipped, 1);
}
