// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used, clippy::expect_used)]

use assert_cmd::Command;
use corral_core::PoolConfig;

#[test]
fn print_config_emits_loadable_toml() {
    let output = Command::cargo_bin("corrald")
        .unwrap()
        .arg("--print-config")
        .output()
        .unwrap();

    assert!(output.status.success());
    let printed = String::from_utf8(output.stdout).unwrap();
    let config = PoolConfig::from_toml_str(&printed).unwrap();
    assert_eq!(config, PoolConfig::default());
}

#[test]
fn print_config_reflects_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pool.toml");
    std::fs::write(&path, "max_startup_concurrency = 9\nworker_register_timeout = \"5s\"\n")
        .unwrap();

    let output = Command::cargo_bin("corrald")
        .unwrap()
        .arg("--config")
        .arg(&path)
        .arg("--print-config")
        .output()
        .unwrap();

    assert!(output.status.success());
    let printed = String::from_utf8(output.stdout).unwrap();
    assert!(printed.contains("max_startup_concurrency = 9"), "{}", printed);
    assert!(printed.contains("worker_register_timeout = \"5s\""), "{}", printed);
}

#[test]
fn invalid_config_file_fails() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pool.toml");
    std::fs::write(&path, "max_startup_concurrency = 0\n").unwrap();

    let output = Command::cargo_bin("corrald")
        .unwrap()
        .arg("--config")
        .arg(&path)
        .arg("--print-config")
        .output()
        .unwrap();

    assert!(!output.status.success());
}
