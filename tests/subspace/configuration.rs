//! Configuration files and the JSON build report.

use std::path::PathBuf;

use subspace_uq::subspace::{BuildStatistics, CvMetric, Normalization};
use subspace_uq::{SubspaceConfig, SubspaceError};

fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("subspace-uq-{}-{}", std::process::id(), name))
}

#[test]
fn test_partial_json_takes_defaults() {
    let config = SubspaceConfig::from_json_str(
        r#"{
            "initial_samples": 40,
            "normalization": "mean_gradient",
            "criteria": { "energy": true, "cross_validation": true },
            "cv_metric": "decrease"
        }"#,
    )
    .unwrap();

    assert_eq!(config.initial_samples, 40);
    assert_eq!(config.normalization, Normalization::MeanGradient);
    assert!(config.criteria.energy && config.criteria.cross_validation);
    assert!(!config.criteria.constantine);
    assert_eq!(config.cv_metric, CvMetric::Decrease);

    let defaults = SubspaceConfig::default();
    assert_eq!(config.num_replicates, defaults.num_replicates);
    assert_eq!(config.cv_folds, defaults.cv_folds);
    assert_eq!(config.seed, defaults.seed);
}

#[test]
fn test_config_file_round_trip() {
    let config = SubspaceConfig {
        initial_samples: 25,
        refinement_iterations: 2,
        refinement_samples: vec![10],
        user_rank: Some(2),
        ..Default::default()
    };
    let path = temp_path("config.json");
    std::fs::write(&path, serde_json::to_string(&config).unwrap()).unwrap();

    let loaded = SubspaceConfig::from_json_file(&path).unwrap();
    std::fs::remove_file(&path).unwrap();
    assert_eq!(loaded, config);
    assert_eq!(loaded.refinement_batch(1), Some(10));
}

#[test]
fn test_invalid_settings_are_rejected() {
    let cases = [
        r#"{ "initial_samples": 1 }"#,
        r#"{ "user_rank": 0 }"#,
        r#"{ "truncation_tolerance": 0.0 }"#,
        r#"{ "cv_folds": 1 }"#,
        r#"{ "refinement_iterations": 2, "refinement_samples": [5, 5, 5] }"#,
        r#"{ "truncation_threshold": 1.5 }"#,
    ];
    for json in cases {
        assert!(
            matches!(SubspaceConfig::from_json_str(json), Err(SubspaceError::Configuration(_))),
            "accepted {}",
            json
        );
    }

    assert!(matches!(
        SubspaceConfig::from_json_str(r#"{ "normalization": "sideways" }"#),
        Err(SubspaceError::Json(_))
    ));
    assert!(matches!(
        SubspaceConfig::from_json_file(temp_path("missing.json")),
        Err(SubspaceError::Io(_))
    ));
}

#[test]
fn test_statistics_report_is_written() {
    let mut statistics = BuildStatistics::new("active_subspace", 4, 2);
    statistics.rank = 2;
    statistics.total_samples = 80;
    statistics.singular_values = vec![9.0, 4.0, 1e-3, 1e-4];

    let path = temp_path("stats.json");
    statistics.write_json(&path).unwrap();
    let text = std::fs::read_to_string(&path).unwrap();
    std::fs::remove_file(&path).unwrap();

    let value: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(value["method"], "active_subspace");
    assert_eq!(value["rank"], 2);
    assert_eq!(value["singular_values"].as_array().unwrap().len(), 4);
    assert!(value["rank_selection"].is_null());

    let parsed: BuildStatistics = serde_json::from_str(&text).unwrap();
    assert_eq!(parsed, statistics);
    assert!(!parsed.numerically_downgraded());
}
