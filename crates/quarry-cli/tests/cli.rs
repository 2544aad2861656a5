#![allow(missing_docs)]

use std::path::PathBuf;
use std::process::{Command, Output};

use quarry_core::archive::write_archive;
use quarry_schema::{Specification, Version};
use tempfile::TempDir;

/// Isolated quarry home with an archive directory.
struct TestContext {
    temp_dir: TempDir,
    home: PathBuf,
}

impl TestContext {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let home = temp_dir.path().join(".quarry");
        std::fs::create_dir_all(home.join("gems")).expect("failed to create archive dir");
        Self { temp_dir, home }
    }

    fn archives(&self) -> PathBuf {
        self.home.join("gems")
    }

    fn add(&self, name: &str, version: &str, platform: Option<&str>) {
        let spec = Specification::new(name, Version::parse(version).unwrap(), platform).unwrap();
        write_archive(&self.archives(), &spec, &[], true).unwrap();
    }

    fn quarry(&self, args: &[&str]) -> Output {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_quarry"));
        cmd.env("HOME", self.temp_dir.path())
            .env("QUARRY_HOME", &self.home)
            .env_remove("QUARRY_CONFIG")
            .env_remove("QUARRY_REMOTE")
            .env_remove("QUARRY_ARCHIVE_DIR")
            .env_remove("QUARRY_INDEX_DIR")
            .env_remove("QUARRY_JOBS")
            .env_remove("RUST_LOG")
            .args(args);
        cmd.output().expect("failed to run quarry")
    }
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn help_lists_subcommands() {
    let ctx = TestContext::new();
    let output = ctx.quarry(&["--help"]);
    assert!(output.status.success());
    let text = stdout(&output);
    assert!(text.contains("Usage:"));
    for command in ["index", "mirror", "lookup"] {
        assert!(text.contains(command), "missing {command}");
    }
}

#[test]
fn version_flag_succeeds() {
    let ctx = TestContext::new();
    assert!(ctx.quarry(&["--version"]).status.success());
}

#[test]
fn index_builds_into_the_home_directory() {
    let ctx = TestContext::new();
    ctx.add("rake", "13.0.6", None);
    ctx.add("rack", "3.1.0.rc1", None);

    let output = ctx.quarry(&["index"]);
    assert_eq!(output.status.code(), Some(0));

    let index = ctx.home.join("index");
    for file in ["latest.1.gz", "full.1.gz", "prerelease.1.gz", "catalog.1.rz"] {
        assert!(index.join(file).is_file(), "{file} not written");
    }
    assert!(index.join("quick/rake-13.0.6.gemspec.rz").is_file());
}

#[test]
fn index_reports_json_and_partial_status() {
    let ctx = TestContext::new();
    ctx.add("rake", "13.0.6", None);
    std::fs::write(ctx.archives().join("broken-1.0.gem"), b"not an archive").unwrap();

    let output = ctx.quarry(&["index", "--json"]);
    assert_eq!(output.status.code(), Some(2));

    let report: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(report["indexed"], 1);
    assert_eq!(report["failed"].as_array().unwrap().len(), 1);
}

#[test]
fn missing_archive_dir_aborts() {
    let ctx = TestContext::new();
    let output = ctx.quarry(&["index", "--archive-dir", "/nonexistent/quarry/gems"]);
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn mirror_rejects_non_http_remote() {
    let ctx = TestContext::new();
    let output = ctx.quarry(&["mirror", "ftp://example.com/gems"]);
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn lookup_prints_the_descriptor() {
    let ctx = TestContext::new();
    ctx.add("nokogiri", "1.15.4", Some("x86_64-linux"));
    ctx.add("nokogiri", "1.15.4", None);

    let output = ctx.quarry(&["lookup", "nokogiri", "--platform", "x86_64-linux", "--json"]);
    assert_eq!(output.status.code(), Some(0));
    let spec: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(spec["basename"], "nokogiri-1.15.4-x86_64-linux");

    let output = ctx.quarry(&["lookup", "nokogiri"]);
    assert_eq!(output.status.code(), Some(0));
    assert!(stdout(&output).contains("1.15.4"));
}

#[test]
fn lookup_of_unknown_package_fails() {
    let ctx = TestContext::new();
    let output = ctx.quarry(&["lookup", "rails"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("no archive found for rails"));
}
