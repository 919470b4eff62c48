mod support;

use support::env::ConfigHomeGuard;
use support::images::{background_frame, object_frame};

use oneshot::config::AppConfig;
use oneshot::part::{PartError, PartStore, PoolClass, read_box};
use oneshot::pipeline::{self, Collaborators, PipelineError};
use tempfile::TempDir;

struct Harness {
    _env: ConfigHomeGuard,
    _temp: TempDir,
    store: PartStore,
    config: AppConfig,
    collaborators: Collaborators,
}

impl Harness {
    fn new() -> Self {
        let temp = tempfile::tempdir().expect("create tempdir");
        let env = ConfigHomeGuard::set_config_home(temp.path().join("config"));
        let store = PartStore::open_default().expect("open part store");
        assert!(store.root().starts_with(temp.path()));

        let mut config = AppConfig::default();
        config.training.num_samples = 12;
        config.training.epochs = 2;
        config.training.batch_size = 4;
        config.training.embed_size = 8;
        let config = config.validated().expect("valid config");
        let collaborators = Collaborators::from_config(&config);
        Self {
            _env: env,
            _temp: temp,
            store,
            config,
            collaborators,
        }
    }
}

#[test]
fn adding_a_part_writes_the_full_layout() {
    let h = Harness::new();
    let outcome = pipeline::add_part(&h.store, "Mug", &object_frame(96, [230, 40, 40]), &h.config, &h.collaborators)
        .expect("add part");

    let paths = outcome.paths;
    assert_eq!(paths.root, h.store.root().join("Mug"));
    assert!(paths.snapshot().is_file());
    assert!(read_box(&paths.box_file()).is_ok());
    assert!(paths.features_dir().join("manifest.json").is_file());
    assert!(paths.checkpoint().is_file());
    assert!(paths.metrics().is_file());
    assert!(paths.graphs().is_file());
    assert_eq!(outcome.report.history.len(), 2);
    assert_eq!(h.store.list().expect("list"), vec!["Mug".to_string()]);
    assert!(!h.store.has_backup("Mug"));
}

#[test]
fn extra_images_are_numbered_and_used_on_retrain() {
    let h = Harness::new();
    pipeline::add_part(&h.store, "Mug", &object_frame(64, [230, 40, 40]), &h.config, &h.collaborators)
        .expect("add part");

    let first = pipeline::add_extra(&h.store, "Mug", PoolClass::Negative, &background_frame(64), &h.config)
        .expect("first extra");
    let second = pipeline::add_extra(&h.store, "Mug", PoolClass::Negative, &background_frame(48), &h.config)
        .expect("second extra");
    assert!(first.ends_with("Negative/Extra_1.png"));
    assert!(second.ends_with("Negative/Extra_2.png"));

    let outcome = pipeline::retrain_part(&h.store, "Mug", &h.config, &h.collaborators).expect("retrain");
    assert_eq!(outcome.report.history.len(), 2);
    let pools = oneshot::part::FeaturePools::load(&outcome.paths.features_dir()).expect("features");
    assert_eq!(pools.positive.nrows(), 12);
    assert_eq!(pools.negative.nrows(), 12);
}

#[test]
fn extra_for_unknown_part_is_rejected() {
    let h = Harness::new();
    let err = pipeline::add_extra(&h.store, "Ghost", PoolClass::Positive, &background_frame(32), &h.config)
        .unwrap_err();
    assert!(matches!(err, PipelineError::Part(PartError::NotFound(_))));
}

#[test]
fn re_adding_keeps_a_restorable_backup() {
    let h = Harness::new();
    let v1 = pipeline::add_part(&h.store, "Mug", &object_frame(64, [230, 40, 40]), &h.config, &h.collaborators)
        .expect("add v1")
        .paths;
    pipeline::add_extra(&h.store, "Mug", PoolClass::Negative, &background_frame(64), &h.config).expect("extra");
    let v1_snapshot = std::fs::read(v1.snapshot()).expect("read v1 snapshot");

    let v2 = pipeline::add_part(&h.store, "Mug", &object_frame(64, [40, 40, 230]), &h.config, &h.collaborators)
        .expect("add v2")
        .paths;
    assert_eq!(v1.root, v2.root);
    assert!(h.store.has_backup("Mug"));
    assert_ne!(std::fs::read(v2.snapshot()).expect("read v2 snapshot"), v1_snapshot);
    assert!(v2.class_images(PoolClass::Negative).expect("negatives").is_empty());

    let restored = pipeline::restore_part(&h.store, "Mug").expect("restore");
    assert_eq!(std::fs::read(restored.snapshot()).expect("read restored"), v1_snapshot);
    assert_eq!(restored.class_images(PoolClass::Negative).expect("negatives").len(), 1);

    pipeline::restore_part(&h.store, "Mug").expect("restore again");
    assert_ne!(std::fs::read(restored.snapshot()).expect("read swapped"), v1_snapshot);
    assert_eq!(h.store.list().expect("list"), vec!["Mug".to_string()]);
}

#[test]
fn restore_without_backup_fails() {
    let h = Harness::new();
    let err = pipeline::restore_part(&h.store, "Mug").unwrap_err();
    assert!(matches!(err, PipelineError::Part(PartError::NoBackup(_))));
}

#[test]
fn invalid_part_name_leaves_store_untouched() {
    let h = Harness::new();
    let err = pipeline::add_part(&h.store, "", &object_frame(32, [1, 2, 3]), &h.config, &h.collaborators)
        .unwrap_err();
    assert!(matches!(err, PipelineError::Part(PartError::InvalidName { .. })));
    assert!(h.store.list().expect("list").is_empty());
}
