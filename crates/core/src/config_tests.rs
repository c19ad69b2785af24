// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::io::Write;

#[test]
fn empty_document_yields_defaults() {
    let config = PoolConfig::from_toml_str("").unwrap();
    assert_eq!(config, PoolConfig::default());
}

#[test]
fn durations_and_commands_parse() {
    let config = PoolConfig::from_toml_str(
        r#"
max_startup_concurrency = 15
worker_register_timeout = "1s"
idle_worker_killing_time_threshold = "1500ms"
max_pending_start_requests = 100

[worker_commands]
python = ["python3", "worker.py"]
"#,
    )
    .unwrap();

    assert_eq!(config.max_startup_concurrency, 15);
    assert_eq!(config.worker_register_timeout, Duration::from_secs(1));
    assert_eq!(
        config.idle_worker_killing_time_threshold,
        Duration::from_millis(1500)
    );
    assert_eq!(config.max_pending_start_requests, Some(100));
    assert_eq!(
        config.worker_commands.get(Language::Python),
        &["python3".to_string(), "worker.py".to_string()]
    );
    // Untouched languages keep their defaults
    assert_eq!(
        config.worker_commands.java,
        WorkerCommands::default().java
    );
}

#[test]
fn unknown_fields_are_rejected() {
    let err = PoolConfig::from_toml_str("max_startup = 3").unwrap_err();
    assert!(matches!(err, ConfigError::Parse(_)));
}

#[test]
fn zero_startup_concurrency_is_invalid() {
    let err = PoolConfig::from_toml_str("max_startup_concurrency = 0").unwrap_err();
    assert!(err.to_string().contains("max_startup_concurrency"));
}

#[test]
fn placeholder_only_command_is_invalid() {
    let err = PoolConfig::from_toml_str(&format!(
        "[worker_commands]\ncpp = [\"{}\"]",
        DYNAMIC_OPTION_PLACEHOLDER
    ))
    .unwrap_err();
    assert!(err.to_string().contains("cpp"));
}

#[test]
fn rendered_config_parses_back() {
    let mut config = PoolConfig::default();
    config.available_cpus = Some(3);
    let rendered = config.to_toml().unwrap();
    assert_eq!(PoolConfig::from_toml_str(&rendered).unwrap(), config);
}

#[test]
fn load_reports_missing_file_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.toml");
    let err = PoolConfig::load(&path).unwrap_err();
    assert!(err.to_string().contains("absent.toml"));
}

#[test]
fn load_reads_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "max_io_workers = 2").unwrap();
    let config = PoolConfig::load(file.path()).unwrap();
    assert_eq!(config.max_io_workers, 2);
}

#[test]
fn summary_uses_human_durations() {
    let summary = PoolConfig::default().summary();
    assert!(summary.contains("register_timeout=1m"), "{}", summary);
    assert!(summary.contains("sweep_every=200ms"), "{}", summary);
}

#[test]
fn only_java_processes_host_several_workers() {
    let config = PoolConfig::from_toml_str("num_workers_per_process_java = 3").unwrap();
    assert_eq!(config.workers_per_process(Language::Java), 3);
    assert_eq!(config.workers_per_process(Language::Python), 1);
    assert_eq!(config.workers_per_process(Language::Cpp), 1);

    let err = PoolConfig::from_toml_str("num_workers_per_process_java = 0").unwrap_err();
    assert!(matches!(err, ConfigError::Invalid(_)));
}
