mod support;

use support::env::ConfigHomeGuard;
use support::images::{background_frame, object_frame, write_png};

use oneshot::capture::StopHandle;
use oneshot::config::AppConfig;
use oneshot::inference::ConfidenceBand;
use oneshot::part::{FeaturePools, PartStore};
use oneshot::pipeline::{self, Collaborators, PipelineError};

fn small_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.training.num_samples = 10;
    config.training.epochs = 3;
    config.training.batch_size = 4;
    config.training.embed_size = 8;
    config.inference.tick_ms = 0;
    config.validated().expect("valid config")
}

#[test]
fn run_scores_every_readable_frame() {
    let temp = tempfile::tempdir().expect("tempdir");
    let _env = ConfigHomeGuard::set_config_home(temp.path().join("config"));
    let store = PartStore::open_default().expect("store");
    let config = small_config();
    let collaborators = Collaborators::from_config(&config);
    pipeline::add_part(&store, "Mug", &object_frame(64, [230, 40, 40]), &config, &collaborators).expect("add");

    let frames = temp.path().join("frames");
    write_png(&frames.join("a.png"), &object_frame(64, [230, 40, 40]));
    write_png(&frames.join("b.png"), &background_frame(64));
    std::fs::write(frames.join("c.png"), b"not an image").expect("write junk");
    write_png(&frames.join("d.png"), &object_frame(80, [220, 50, 40]));
    let out = temp.path().join("annotated");

    let summary = pipeline::run_part(
        &store,
        "Mug",
        &frames,
        Some(&out),
        &config,
        &collaborators,
        &StopHandle::new(),
    )
    .expect("run");

    assert_eq!(summary.frames, 3);
    assert_eq!(summary.missed, 1);
    assert_eq!(summary.matches + summary.possible_matches + summary.no_matches, 3);
    assert!(out.join("frame_00000.png").is_file());
    assert!(out.join("frame_00002.png").is_file());
    assert!(!out.join("frame_00003.png").exists());
}

#[test]
fn session_decisions_follow_configured_bands() {
    let temp = tempfile::tempdir().expect("tempdir");
    let _env = ConfigHomeGuard::set_config_home(temp.path().join("config"));
    let store = PartStore::open_default().expect("store");
    let mut config = small_config();
    let collaborators = Collaborators::from_config(&config);
    pipeline::add_part(&store, "Mug", &object_frame(64, [230, 40, 40]), &config, &collaborators).expect("add");

    config.inference.lower = 0.0;
    config.inference.upper = 0.0;
    let session = pipeline::open_session(&store, "Mug", &config, &collaborators).expect("session");
    let decision = session.decide(&background_frame(64)).expect("decide");
    assert_eq!(decision.band, ConfidenceBand::Match);

    config.inference.lower = 1.0;
    config.inference.upper = 1.0;
    let session = pipeline::open_session(&store, "Mug", &config, &collaborators).expect("session");
    let decision = session.decide(&background_frame(64)).expect("decide");
    assert!((0.0..=1.0).contains(&decision.probability));
    if decision.probability < 1.0 {
        assert_eq!(decision.band, ConfidenceBand::NoMatch);
    }
}

#[test]
fn stopped_handle_runs_no_frames() {
    let temp = tempfile::tempdir().expect("tempdir");
    let _env = ConfigHomeGuard::set_config_home(temp.path().join("config"));
    let store = PartStore::open_default().expect("store");
    let config = small_config();
    let collaborators = Collaborators::from_config(&config);
    pipeline::add_part(&store, "Mug", &object_frame(64, [230, 40, 40]), &config, &collaborators).expect("add");
    let frames = temp.path().join("frames");
    write_png(&frames.join("a.png"), &background_frame(32));

    let stop = StopHandle::new();
    stop.stop();
    stop.stop();
    let summary =
        pipeline::run_part(&store, "Mug", &frames, None, &config, &collaborators, &stop).expect("run");
    assert_eq!(summary.frames, 0);
}

#[test]
fn running_an_unknown_part_fails() {
    let temp = tempfile::tempdir().expect("tempdir");
    let _env = ConfigHomeGuard::set_config_home(temp.path().join("config"));
    let store = PartStore::open_default().expect("store");
    let config = small_config();
    let collaborators = Collaborators::from_config(&config);
    let err = pipeline::run_part(
        &store,
        "Ghost",
        temp.path(),
        None,
        &config,
        &collaborators,
        &StopHandle::new(),
    )
    .unwrap_err();
    assert!(matches!(err, PipelineError::Part(_)));
}

#[test]
fn showing_the_taught_snapshot_reproduces_the_anchor() {
    let temp = tempfile::tempdir().expect("tempdir");
    let _env = ConfigHomeGuard::set_config_home(temp.path().join("config"));
    let store = PartStore::open_default().expect("store");
    let config = small_config();
    assert!(config.capture.equalize);
    let collaborators = Collaborators::from_config(&config);
    let snapshot = object_frame(96, [230, 40, 40]);
    let paths = pipeline::add_part(&store, "Mug", &snapshot, &config, &collaborators)
        .expect("add")
        .paths;

    let pools = FeaturePools::load(&paths.features_dir()).expect("features");
    let session = pipeline::open_session(&store, "Mug", &config, &collaborators).expect("session");
    let live = session.embed(&snapshot).expect("embed live frame");
    let distance: f32 = live
        .as_slice()
        .iter()
        .zip(pools.anchor.as_slice())
        .map(|(a, b)| (a - b) * (a - b))
        .sum::<f32>()
        .sqrt();
    assert!(distance < 1e-5, "live snapshot is {distance} from the anchor");
}
