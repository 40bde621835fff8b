use std::fs;

use vessel_stabilizer::{IntegrationKind, StabilizationEngine, StabilizerConfig};

#[test]
fn loads_partial_config_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stabilizer.json");
    fs::write(
        &path,
        r#"{
            "stabilization_ticks": 150,
            "grounding_ticks": 5,
            "display_message": false,
            "reattach_delay": 0.25,
            "reattach_delays": { "ground_anchor": 1.0 },
            "exclude_vessels": ["Base Alpha"]
        }"#,
    )
    .unwrap();

    let cfg = StabilizerConfig::from_path(&path).unwrap();
    assert_eq!(cfg.stabilization_ticks, 150);
    assert_eq!(cfg.grounding_ticks, 5);
    assert!(!cfg.display_message);
    assert_eq!(cfg.max_up_movement, StabilizerConfig::default().max_up_movement);
    assert_eq!(cfg.reattach_delay_for(IntegrationKind::GroundAnchor), 1.0);
    assert_eq!(cfg.reattach_delay_for(IntegrationKind::KasHarpoon), 0.25);
    assert!(cfg.is_excluded(" Base Alpha "));

    let engine = StabilizationEngine::new(cfg, 0.02, &[]).unwrap();
    assert_eq!(engine.timebase().ticks(1.0), 50);
}

#[test]
fn missing_file_is_a_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = StabilizerConfig::from_path(dir.path().join("absent.json")).unwrap_err();
    assert!(err.is_config());
}

#[test]
fn malformed_json_is_a_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.json");
    fs::write(&path, "{ \"stabilization_ticks\": ").unwrap();
    assert!(StabilizerConfig::from_path(&path).unwrap_err().is_config());
}

#[test]
fn out_of_range_values_are_validation_errors() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.json");
    fs::write(&path, r#"{ "stabilization_ticks": 10, "grounding_ticks": 20 }"#).unwrap();
    assert!(StabilizerConfig::from_path(&path).unwrap_err().is_validation());

    fs::write(&path, r#"{ "min_down_movement": 3.0, "max_down_movement": 1.0 }"#).unwrap();
    assert!(StabilizerConfig::from_path(&path).unwrap_err().is_validation());
}

#[test]
fn saved_config_round_trips_through_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("saved.json");
    let cfg = StabilizerConfig {
        stabilize_kerbals: true,
        exclude_vessels: vec!["Relay".into()],
        ..StabilizerConfig::default()
    };
    fs::write(&path, serde_json::to_string_pretty(&cfg).unwrap()).unwrap();
    assert_eq!(StabilizerConfig::from_path(&path).unwrap(), cfg);
}
