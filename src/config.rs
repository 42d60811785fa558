//! Run configuration. Values come from an optional TOML file and are then
//! overridden by command-line flags.
//!
//! ```toml
//! results_dir = "/data/results"
//! execute_id = "hadoop_major"
//! workers = 4
//! record_error = true
//!
//! [path_remap]
//! from = "/Users/me/hadoop"
//! to = "/home/builder/hadoop"
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{HarvestError, Result};
use crate::label::DEFAULT_TAG;

/// Rewrites a host path prefix to the prefix the build sees (for example a
/// checkout mounted into a container).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathRemap {
    pub from: String,
    pub to: String,
}

impl PathRemap {
    pub fn apply(&self, path: &Path) -> PathBuf {
        let text = path.to_string_lossy();
        match text.strip_prefix(self.from.as_str()) {
            Some(rest) => PathBuf::from(format!("{}{}", self.to, rest)),
            None => path.to_path_buf(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Parent of every per-run results directory.
    pub results_dir: PathBuf,
    /// Name of this run; results land in `results_dir/execute_id`.
    pub execute_id: String,
    /// Number of build roots processed in parallel.
    pub workers: usize,
    /// Skip work already present in the ledger.
    pub resume: bool,
    /// Save the output of failed test commands under `build_error_log/`.
    pub record_error: bool,
    /// Instrumentation marker injected into labeled statements.
    pub tag: String,
    /// Command used to run one test; `-Dtest=<name>` is appended.
    pub test_command: Vec<String>,
    /// Command used to build a project once before collecting coverage.
    pub build_command: Vec<String>,
    /// Command used per test while collecting coverage.
    pub collect_command: Vec<String>,
    pub path_remap: Option<PathRemap>,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            results_dir: PathBuf::from("results"),
            execute_id: "default".to_string(),
            workers: 4,
            resume: true,
            record_error: false,
            tag: DEFAULT_TAG.to_string(),
            test_command: strings(&["mvn", "clean", "test"]),
            build_command: strings(&["mvn", "clean", "install", "-DskipTests"]),
            collect_command: strings(&["mvn", "test"]),
            path_remap: None,
            log_level: "info".to_string(),
        }
    }
}

fn strings(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|p| p.to_string()).collect()
}

impl Config {
    pub fn from_toml(input: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(input).map_err(|e| HarvestError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| HarvestError::SourceRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(HarvestError::Config("workers must be at least 1".to_string()));
        }
        for (name, command) in [
            ("test_command", &self.test_command),
            ("build_command", &self.build_command),
            ("collect_command", &self.collect_command),
        ] {
            if command.is_empty() {
                return Err(HarvestError::Config(format!("{} must not be empty", name)));
            }
        }
        if self.tag.is_empty() {
            return Err(HarvestError::Config("tag must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn layout(&self) -> Layout {
        Layout::new(self.results_dir.join(&self.execute_id))
    }
}

/// Directory layout of one execution run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    root: PathBuf,
}

impl Layout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn log_dir(&self) -> PathBuf {
        self.root.join("log")
    }

    /// Undo records, one per uuid.
    pub fn replace_dir(&self) -> PathBuf {
        self.root.join("replace_data")
    }

    pub fn build_error_dir(&self) -> PathBuf {
        self.root.join("build_error_log")
    }

    pub fn complete_logs_dir(&self) -> PathBuf {
        self.root.join("complete_logs")
    }

    pub fn output_logs_dir(&self) -> PathBuf {
        self.root.join("output_logs")
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.root.join("results.jsonl")
    }

    pub fn create_dirs(&self) -> Result<()> {
        for dir in [
            self.log_dir(),
            self.replace_dir(),
            self.build_error_dir(),
            self.complete_logs_dir(),
            self.output_logs_dir(),
        ] {
            std::fs::create_dir_all(&dir)?;
        }
        Ok(())
    }
}
