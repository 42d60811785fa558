//! Running the build tool.
//!
//! The [`TestRunner`] trait abstracts over how a test is executed so the
//! orchestrator can be driven without Maven in tests.

use std::path::Path;
use std::process::Command;
use std::time::{Duration, Instant};

use crate::error::{HarvestError, Result};

/// Marker Maven prints when a build fails even if the exit code is zero.
pub const BUILD_FAILURE: &str = "BUILD FAILURE";

/// Result of one build tool invocation.
#[derive(Debug, Clone)]
pub struct TestOutcome {
    pub success: bool,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
}

impl TestOutcome {
    /// Text saved to the build error log for a failed run.
    pub fn error_report(&self, command: &str, dir: &Path) -> String {
        format!(
            "command: {}\ndir: {}\nexit code: {}\n\n--- stdout ---\n{}\n--- stderr ---\n{}\n",
            command,
            dir.display(),
            self.exit_code
                .map_or_else(|| "signal".to_string(), |c| c.to_string()),
            self.stdout,
            self.stderr
        )
    }
}

pub trait TestRunner: Send + Sync {
    /// Run a single test class in `dir`.
    fn run_test(&self, test: &str, dir: &Path) -> Result<TestOutcome>;

    /// Build the project in `dir` without running tests.
    fn build(&self, dir: &Path) -> Result<TestOutcome>;

    /// Human-readable form of the test command, for logs.
    fn describe(&self, test: &str) -> String;
}

/// Runs tests through configurable Maven command lines.
#[derive(Debug, Clone)]
pub struct MavenRunner {
    test_command: Vec<String>,
    build_command: Vec<String>,
}

impl MavenRunner {
    pub fn new(test_command: Vec<String>, build_command: Vec<String>) -> Result<Self> {
        if test_command.is_empty() || build_command.is_empty() {
            return Err(HarvestError::Config("empty build command".to_string()));
        }
        Ok(Self {
            test_command,
            build_command,
        })
    }

    fn test_args(&self, test: &str) -> Vec<String> {
        let mut args = self.test_command.clone();
        args.push(format!("-Dtest={}", test));
        args
    }
}

impl TestRunner for MavenRunner {
    fn run_test(&self, test: &str, dir: &Path) -> Result<TestOutcome> {
        run(&self.test_args(test), dir)
    }

    fn build(&self, dir: &Path) -> Result<TestOutcome> {
        run(&self.build_command, dir)
    }

    fn describe(&self, test: &str) -> String {
        self.test_args(test).join(" ")
    }
}

fn run(args: &[String], dir: &Path) -> Result<TestOutcome> {
    let (program, rest) = args
        .split_first()
        .ok_or_else(|| HarvestError::Config("empty build command".to_string()))?;

    let started = Instant::now();
    let output = Command::new(program)
        .args(rest)
        .current_dir(dir)
        .output()
        .map_err(|e| HarvestError::Other(format!("failed to run {}: {}", program, e)))?;
    let elapsed = started.elapsed();

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
    let success = output.status.success() && !stdout.contains(BUILD_FAILURE);

    tracing::debug!(
        command = %args.join(" "),
        dir = %dir.display(),
        code = ?output.status.code(),
        secs = elapsed.as_secs_f64(),
        success,
        "build tool finished"
    );

    Ok(TestOutcome {
        success,
        exit_code: output.status.code(),
        stdout,
        stderr,
        elapsed,
    })
}
