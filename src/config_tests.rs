use super::*;

#[test]
fn stub_round_trips_and_validates() {
    let stub = config_stub().expect("stub");
    let parsed: PatchgenConfig = serde_json::from_str(&stub).expect("parse stub");
    assert_eq!(parsed, default_config());
    validate_config(&parsed).expect("defaults are valid");
    assert!(!stub.contains("test_command"), "unset options are omitted");
}

#[test]
fn defaults_match_engine_defaults() {
    let config = default_config();
    assert_eq!(config.search_options(), SearchOptions::default());
    assert_eq!(config.generator_limits(), GeneratorLimits::default());
    assert_eq!(config.localizer(), LocalizerConfig::default());
}

#[test]
fn partial_file_fills_defaults() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join(CONFIG_FILE);
    fs::write(&path, r#"{ "schema_version": 1, "cost_ceiling": 10, "n_locs": 2 }"#)
        .expect("write");
    let config = load_config(&path).expect("load");
    assert_eq!(config.cost_ceiling, 10);
    assert_eq!(config.n_locs, 2);
    assert_eq!(config.max_elements, default_config().max_elements);
}

#[test]
fn unknown_fields_are_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join(CONFIG_FILE);
    fs::write(&path, r#"{ "schema_version": 1, "cost_cieling": 10 }"#).expect("write");
    let err = load_config(&path).expect_err("typo");
    assert!(matches!(err, Error::Configuration(_)));
}

#[test]
fn write_then_load() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("nested").join(CONFIG_FILE);
    let config = PatchgenConfig {
        candidate_quota: Some(3),
        test_command: Some("mvn -q test -Dtest={test}".to_string()),
        ..default_config()
    };
    write_config(&path, &config).expect("write");
    assert_eq!(load_config(&path).expect("load"), config);
}

#[test]
fn missing_file_falls_back_to_defaults() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = load_or_default(&dir.path().join(CONFIG_FILE)).expect("defaults");
    assert_eq!(config, default_config());
}

#[test]
fn invalid_values_are_configuration_errors() {
    let cases = [
        PatchgenConfig {
            schema_version: 2,
            ..default_config()
        },
        PatchgenConfig {
            cost_ceiling: 0,
            ..default_config()
        },
        PatchgenConfig {
            candidate_quota: Some(0),
            ..default_config()
        },
        PatchgenConfig {
            line_weight: f64::NAN,
            ..default_config()
        },
        PatchgenConfig {
            test_command: Some("run 'unterminated".to_string()),
            ..default_config()
        },
        PatchgenConfig {
            source_roots: vec!["../elsewhere".to_string()],
            ..default_config()
        },
    ];
    for config in cases {
        assert!(
            matches!(validate_config(&config), Err(Error::Configuration(_))),
            "{config:?} should be rejected"
        );
    }
}

#[test]
fn re_execution_requires_a_test_command() {
    let err = default_config().test_runner().expect_err("no command");
    assert!(err.to_string().contains("test_command"));
}

#[test]
fn build_timeout_is_separate_from_test_timeout() {
    let config = default_config();
    assert_eq!(config.build_timeout_seconds, DEFAULT_BUILD_TIMEOUT_SECONDS);
    assert!(config.build_timeout_seconds > config.test_timeout_seconds);

    let zero = PatchgenConfig {
        build_timeout_seconds: 0,
        ..default_config()
    };
    let err = validate_config(&zero).expect_err("zero build timeout");
    assert!(err.to_string().contains("build_timeout_seconds"), "{err}");
}

#[test]
fn handler_rewrite_without_codec_is_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = PatchgenConfig {
        rewrite_exception_handlers: true,
        ..default_config()
    };
    assert!(matches!(
        config.scratch_builder(dir.path()),
        Err(Error::Configuration(_))
    ));
    assert!(default_config().scratch_builder(dir.path()).is_ok());
}
