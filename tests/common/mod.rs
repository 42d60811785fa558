#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use logharvest::catalog::FunctionIndex;
use logharvest::error::{HarvestError, Result};
use logharvest::extract::ExtractOptions;
use logharvest::label::DEFAULT_TAG;
use logharvest::runner::{TestOutcome, TestRunner};
use serde_json::json;
use tempfile::TempDir;

pub const WORKER_SOURCE: &str = include_str!("../fixtures/Worker.java");
pub const HELPER_SOURCE: &str = include_str!("../fixtures/Helper.java");
pub const SAMPLE_JACOCO: &[u8] = include_bytes!("../fixtures/sample_jacoco.xml");
pub const MALFORMED_JACOCO: &[u8] = include_bytes!("../fixtures/malformed_jacoco.xml");

pub const PROJECT: &str = "hadoop-common";
pub const WORKER_TEST: &str = "WorkerTest";

pub const INFO_STATEMENT: &str = "log.info(\"start\")";
pub const WARN_STATEMENT: &str =
    "log.warn(\"processed {} with size {}\",\n                upper,\n                size)";

/// A checkout, collected coverage data and a results root under one temp dir.
/// The caller must hold onto the `Workspace` to keep the directory alive.
pub struct Workspace {
    pub dir: TempDir,
    pub source_code_dir: PathBuf,
    pub data_dir: PathBuf,
    pub results_dir: PathBuf,
}

impl Workspace {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        let ws = Workspace {
            source_code_dir: root.join("code"),
            data_dir: root.join("data"),
            results_dir: root.join("results"),
            dir,
        };

        write(&ws.java_root().join("com/example/Worker.java"), WORKER_SOURCE.as_bytes());
        write(&ws.java_root().join("com/example/util/Helper.java"), HELPER_SOURCE.as_bytes());
        ws.add_report(WORKER_TEST, SAMPLE_JACOCO);
        ws
    }

    pub fn project_dir(&self) -> PathBuf {
        self.source_code_dir.join(PROJECT)
    }

    pub fn java_root(&self) -> PathBuf {
        self.project_dir().join("src/main/java")
    }

    pub fn worker_path(&self) -> PathBuf {
        self.java_root().join("com/example/Worker.java")
    }

    /// Store a coverage report for `test` the way `collect` lays it out.
    pub fn add_report(&self, test: &str, xml: &[u8]) {
        let test_dir = self.data_dir.join(PROJECT).join(test);
        write(&test_dir.join("jacoco/jacoco.xml"), xml);
        write(
            &test_dir.join(format!("surefire-reports/com.example.{}-output.txt", test)),
            b"collected\n",
        );
    }

    /// Catalog with `process` spanning `lines`, knowing `statements`.
    pub fn catalog(&self, lines: &str, statements: &[(&str, &[&str])]) -> FunctionIndex {
        let (start, end) = lines.split_once('-').unwrap();
        let (start, end): (usize, usize) = (start.parse().unwrap(), end.parse().unwrap());
        let source: Vec<&str> = WORKER_SOURCE.split('\n').collect();
        let content = source[start - 1..end].join("\n");

        let details: Vec<_> = statements
            .iter()
            .map(|(statement, vars)| json!({ "statement": statement, "vars": vars }))
            .collect();
        let catalog = json!([{
            "function_name": "process",
            "function_position": self.worker_path(),
            "function_lines": lines,
            "function_content": content,
            "function_without_logs": "",
            "log_detailsList": details,
        }]);
        FunctionIndex::from_json(&catalog.to_string()).unwrap()
    }

    pub fn full_catalog(&self) -> FunctionIndex {
        self.catalog(
            "10-20",
            &[(INFO_STATEMENT, &[]), (WARN_STATEMENT, &["upper", "size"])],
        )
    }

    pub fn extract_options(&self) -> ExtractOptions {
        ExtractOptions {
            data_dir: self.data_dir.clone(),
            source_code_dir: self.source_code_dir.clone(),
            tag: DEFAULT_TAG.to_string(),
            remap: None,
        }
    }
}

pub fn write(path: &Path, content: &[u8]) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

/// Coverage report marking `lines` of `com/example/Worker.java` as executed.
pub fn worker_report(lines: &[u32]) -> Vec<u8> {
    let mut xml = String::from(
        "<?xml version=\"1.0\"?>\n<report name=\"r\">\n  <package name=\"com/example\">\n    <sourcefile name=\"Worker.java\">\n",
    );
    for nr in lines {
        xml.push_str(&format!("      <line nr=\"{}\" mi=\"0\" ci=\"1\" mb=\"0\" cb=\"0\"/>\n", nr));
    }
    xml.push_str("    </sourcefile>\n  </package>\n</report>\n");
    xml.into_bytes()
}

/// Stands in for Maven. "Running" a test prints one log line for every
/// tagged statement currently in the build root's sources, so tagged output
/// only appears while a mutation is in place.
pub struct FakeRunner {
    pub tag: String,
    pub fail: bool,
    /// The test command cannot be started at all.
    pub unavailable: bool,
    /// Deleted during the test run.
    pub sabotage: Option<PathBuf>,
    /// Written to `target/site/jacoco/jacoco.xml` by every test run.
    pub jacoco: Option<Vec<u8>>,
    calls: Mutex<Vec<String>>,
}

impl FakeRunner {
    pub fn new() -> Self {
        Self {
            tag: DEFAULT_TAG.to_string(),
            fail: false,
            unavailable: false,
            sabotage: None,
            jacoco: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }

    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::new()
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn messages(&self, dir: &Path) -> Vec<String> {
        let mut files = Vec::new();
        java_files(dir, &mut files);
        files.sort();

        let marker = format!("(\"{}\" + \"", self.tag);
        let mut out = Vec::new();
        for file in files {
            for line in fs::read_to_string(&file).unwrap().lines() {
                if let Some(idx) = line.find(&marker) {
                    let rest = &line[idx + marker.len()..];
                    let message = &rest[..rest.find('"').unwrap()];
                    out.push(format!(
                        "[main] INFO com.example.Worker - {}{}",
                        self.tag, message
                    ));
                }
            }
        }
        out
    }
}

fn java_files(dir: &Path, out: &mut Vec<PathBuf>) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries {
        let path = entry.unwrap().path();
        if path.is_dir() {
            java_files(&path, out);
        } else if path.extension().is_some_and(|e| e == "java") {
            out.push(path);
        }
    }
}

impl TestRunner for FakeRunner {
    fn run_test(&self, test: &str, dir: &Path) -> Result<TestOutcome> {
        self.calls.lock().unwrap().push(test.to_string());
        if self.unavailable {
            return Err(HarvestError::Other("mvn: command not found".to_string()));
        }

        let mut output = vec!["[main] INFO com.example.Worker - warming up".to_string()];
        output.extend(self.messages(dir));
        output.push("[main] INFO com.example.Worker - done".to_string());
        write(
            &dir.join(format!("target/surefire-reports/com.example.{}-output.txt", test)),
            format!("{}\n", output.join("\n")).as_bytes(),
        );

        if let Some(xml) = &self.jacoco {
            write(&dir.join("target/site/jacoco/jacoco.xml"), xml);
        }
        if let Some(path) = &self.sabotage {
            fs::remove_file(path).unwrap();
        }

        Ok(TestOutcome {
            success: !self.fail,
            exit_code: Some(if self.fail { 1 } else { 0 }),
            stdout: if self.fail {
                "[INFO] BUILD FAILURE".to_string()
            } else {
                "[INFO] BUILD SUCCESS".to_string()
            },
            stderr: String::new(),
            elapsed: Duration::from_millis(5),
        })
    }

    fn build(&self, _dir: &Path) -> Result<TestOutcome> {
        Ok(TestOutcome {
            success: !self.fail,
            exit_code: Some(0),
            stdout: String::new(),
            stderr: String::new(),
            elapsed: Duration::from_millis(1),
        })
    }

    fn describe(&self, test: &str) -> String {
        format!("fake test -Dtest={}", test)
    }
}
