#![allow(dead_code)]

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Isolated working directory with its own settings file and run store.
pub struct TestEnv {
    _tmp: TempDir,
    pub root: PathBuf,
    pub config: PathBuf,
    pub data_dir: PathBuf,
}

impl TestEnv {
    pub fn new() -> Self {
        Self::with_python(json!({ "interpreter": "python", "pip": "true", "conda": "true" }))
    }

    /// `python` settings section overrides, e.g. `sh` as the interpreter.
    pub fn with_python(python: Value) -> Self {
        let tmp = TempDir::new().expect("create temp dir");
        let root = tmp.path().to_path_buf();
        let data_dir = root.join("state");
        let config = root.join("gapwatch.json");

        let settings = json!({
            "python": python,
            "ci": {
                "manifest_path": root.join("ci_manifest.jsonld"),
                "simulated_task_secs": 0.0
            },
            "storage": { "data_dir": data_dir }
        });
        fs::write(&config, serde_json::to_string_pretty(&settings).unwrap())
            .expect("write settings");

        Self {
            _tmp: tmp,
            root,
            config,
            data_dir,
        }
    }

    pub fn cmd(&self) -> Command {
        let mut cmd = cargo_bin_cmd!("gapwatch");
        cmd.current_dir(&self.root)
            .env("GAPWATCH_CONFIG", &self.config)
            .env_remove("CONDA_DEFAULT_ENV")
            .env_remove("GITHUB_REPOSITORY")
            .env_remove("GITHUB_EVENT_NAME")
            .env_remove("GITHUB_EVENT_PATH")
            .env_remove("GITHUB_REF")
            .env_remove("RUST_LOG");
        cmd
    }

    pub fn run_json(&self, args: &[&str]) -> Value {
        let out = self
            .cmd()
            .arg("--json")
            .args(args)
            .assert()
            .success()
            .get_output()
            .stdout
            .clone();
        serde_json::from_slice(&out).expect("valid json output")
    }

    pub fn run_json_failing(&self, args: &[&str]) -> Value {
        let out = self
            .cmd()
            .arg("--json")
            .args(args)
            .assert()
            .code(1)
            .get_output()
            .stdout
            .clone();
        serde_json::from_slice(&out).expect("valid json output")
    }

    pub fn write_script(&self, name: &str, body: &str) -> PathBuf {
        let path = self.root.join(name);
        fs::write(&path, body).expect("write script");
        path
    }

    pub fn run_manifest(&self, run_id: &str) -> PathBuf {
        self.data_dir.join("runs").join(format!("{run_id}.jsonld"))
    }
}

pub fn read_json(path: &Path) -> Value {
    let raw = fs::read_to_string(path).expect("read json file");
    serde_json::from_str(&raw).expect("parse json file")
}

/// Status string of the named step in a `--json` report.
pub fn step_status<'a>(report: &'a Value, name: &str) -> Option<&'a str> {
    report["data"]["steps"]
        .as_array()?
        .iter()
        .find(|step| step["name"] == name)
        .and_then(|step| step["status"].as_str())
}
