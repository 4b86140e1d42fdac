//! Configuration file loading

use declutter_vision::{DistillConfig, VisionError};
use std::io::Write;

#[test]
fn test_load_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
warmup_frame_count = 6
blend_sigma = 0.0
cache_refresh_interval = 25
distractor_concepts = ["spatula", "mug", "sponge"]
robot_concepts = ["robot arm"]
"#
    )
    .unwrap();

    let config = DistillConfig::load(file.path()).unwrap();
    assert_eq!(config.warmup_frame_count, 6);
    assert_eq!(config.blend_sigma, 0.0);
    assert_eq!(config.cache_refresh_interval, 25);
    assert_eq!(config.distractor_concepts, vec!["spatula", "mug", "sponge"]);
    assert_eq!(config.robot_concepts, vec!["robot arm"]);
    assert_eq!(config.safe_dilation_px, DistillConfig::default().safe_dilation_px);
}

#[test]
fn test_load_invalid_value_names_field() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "distractor_presence_threshold = 2.0").unwrap();
    match DistillConfig::load(file.path()) {
        Err(VisionError::Config { field, .. }) => assert_eq!(field, "distractor_presence_threshold"),
        other => panic!("Expected config error, got {:?}", other),
    }
}

#[test]
fn test_load_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let result = DistillConfig::load(&dir.path().join("missing.toml"));
    assert!(matches!(result, Err(VisionError::Io(_))));
}

#[test]
fn test_round_trip_through_toml() {
    let config = DistillConfig {
        disable_inpaint: true,
        distractor_concepts: vec!["fork".to_string()],
        ..DistillConfig::default()
    };
    let text = toml::to_string(&config).unwrap();
    assert_eq!(DistillConfig::from_toml_str(&text).unwrap(), config);
}
