use sitestream_logger::{init, try_init, LogConfig, LogFormat, LogOutput};
use tracing::Level;

#[test]
fn unknown_level_falls_back_to_info() {
    let config = LogConfig {
        level: "chatty".to_string(),
        ..LogConfig::default()
    };
    assert_eq!(config.max_level(), Level::INFO);

    let config = LogConfig {
        level: "trace".to_string(),
        ..LogConfig::default()
    };
    assert_eq!(config.max_level(), Level::TRACE);
}

#[test]
fn file_output_requires_a_path() {
    let config = LogConfig {
        output: LogOutput::File,
        file_path: None,
        ..LogConfig::default()
    };
    let err = init(&config).unwrap_err();
    assert!(err.to_string().contains("file_path"));
}

#[test]
fn invalid_directives_are_rejected() {
    let config = LogConfig {
        directives: Some("sitestream_connector=notalevel".to_string()),
        ..LogConfig::default()
    };
    assert!(init(&config).is_err());
}

#[test]
fn json_file_output_receives_events() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("sitestream.log");
    let config = LogConfig {
        level: "debug".to_string(),
        format: LogFormat::Json,
        output: LogOutput::File,
        file_path: Some(path.to_string_lossy().into_owned()),
        directives: None,
    };

    assert!(try_init(&config)?);
    tracing::info!(subscriber = 42, "routed status");

    let written = std::fs::read_to_string(&path)?;
    assert!(written.contains("routed status"));
    assert!(written.contains("\"subscriber\":42"));

    // A second installation is reported, not treated as an error.
    assert!(!try_init(&config)?);
    Ok(())
}
