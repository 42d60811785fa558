//! Uniform in-memory representation of the dataset pipeline: catalog
//! functions, coverage observations, covered log statements and the work
//! items handed to the orchestrator. JSON field names follow the on-disk
//! artifacts so files written by earlier runs stay readable.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::HarvestError;

/// Inclusive, 1-indexed line range, written as `"start-end"` on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LineRange {
    pub start: u32,
    pub end: u32,
}

impl LineRange {
    pub fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    #[must_use]
    pub fn contains(&self, line: u32) -> bool {
        self.start <= line && line <= self.end
    }
}

impl FromStr for LineRange {
    type Err = HarvestError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (start, end) = s
            .split_once('-')
            .ok_or_else(|| HarvestError::Catalog(format!("Invalid line range: '{}'", s)))?;
        let parse = |v: &str| {
            v.trim()
                .parse::<u32>()
                .map_err(|_| HarvestError::Catalog(format!("Invalid line range: '{}'", s)))
        };
        let range = LineRange::new(parse(start)?, parse(end)?);
        if range.start == 0 || range.start > range.end {
            return Err(HarvestError::Catalog(format!(
                "Invalid line range: '{}'",
                s
            )));
        }
        Ok(range)
    }
}

impl TryFrom<String> for LineRange {
    type Error = HarvestError;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<LineRange> for String {
    fn from(range: LineRange) -> Self {
        range.to_string()
    }
}

impl fmt::Display for LineRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// Identity of a catalog function.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FunctionKey {
    pub name: String,
    pub file_path: PathBuf,
    pub lines: LineRange,
}

/// One statically known log call inside a function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogStatementDetail {
    /// Verbatim source without the trailing semicolon.
    pub statement: String,
    #[serde(default)]
    pub vars: Vec<String>,
}

/// A function from the static pre-pass catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionRecord {
    #[serde(rename = "function_name")]
    pub name: String,
    #[serde(rename = "function_position")]
    pub file_path: PathBuf,
    #[serde(rename = "function_lines")]
    pub lines: LineRange,
    #[serde(rename = "function_content", default)]
    pub content: String,
    #[serde(
        rename = "function_without_logs",
        alias = "function_content_without_logs",
        default
    )]
    pub content_without_logs: String,
    #[serde(rename = "log_detailsList", default)]
    pub log_details: Vec<LogStatementDetail>,
}

impl FunctionRecord {
    pub fn key(&self) -> FunctionKey {
        FunctionKey {
            name: self.name.clone(),
            file_path: self.file_path.clone(),
            lines: self.lines,
        }
    }
}

/// A single `<line>` observation from a coverage report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverageFact {
    /// `package/SourceFile.java` as reported by the coverage tool.
    pub file_path: String,
    pub line_number: u32,
    pub was_executed: bool,
}

/// An executed source line that looks like a log call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoveredLogLine {
    pub path: PathBuf,
    pub line_number: u32,
    /// Trimmed source text of the line.
    pub text: String,
}

/// A catalog log statement resolved from covered lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoveredLog {
    /// First source line of the statement.
    #[serde(default)]
    pub line_number: u32,
    #[serde(flatten)]
    pub detail: LogStatementDetail,
}

/// A function exercised by one test run, with the statements it covered.
#[derive(Debug, Clone, PartialEq)]
pub struct CoveredFunction {
    pub function: FunctionRecord,
    pub covered_log: Vec<CoveredLog>,
    pub unit_test: String,
    pub execute_dir: PathBuf,
}

/// The function fields carried along with a work item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionInfo {
    pub function_name: String,
    pub function_position: PathBuf,
    pub function_lines: LineRange,
    #[serde(default)]
    pub function_content: String,
    #[serde(default)]
    pub function_content_without_logs: String,
    #[serde(rename = "log_detailsList", default)]
    pub log_details: Vec<LogStatementDetail>,
}

impl FunctionInfo {
    pub fn key(&self) -> FunctionKey {
        FunctionKey {
            name: self.function_name.clone(),
            file_path: self.function_position.clone(),
            lines: self.function_lines,
        }
    }
}

impl From<&FunctionRecord> for FunctionInfo {
    fn from(record: &FunctionRecord) -> Self {
        Self {
            function_name: record.name.clone(),
            function_position: record.file_path.clone(),
            function_lines: record.lines,
            function_content: record.content.clone(),
            function_content_without_logs: record.content_without_logs.clone(),
            log_details: record.log_details.clone(),
        }
    }
}

/// One unit of orchestrator work, keyed by `uuid`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    pub uuid: String,
    pub function_info: FunctionInfo,
    pub covered_log: Vec<CoveredLog>,
    pub unit_test: String,
    pub execute_dir: PathBuf,
    #[serde(default)]
    pub function_content_without_covered_logs: String,
    #[serde(default)]
    pub function_with_labeled_data: Option<String>,
}

/// One row of the durable result ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub uuid: String,
    pub execute_success: bool,
    /// Wall-clock seconds spent in the test command.
    pub execute_time: f64,
    pub label_file_size: u64,
    pub complete_file_size: u64,
    #[serde(default)]
    pub file_location: String,
    #[serde(default)]
    pub recorded_at: Option<String>,
}

impl ExecutionResult {
    pub fn failed(uuid: &str, execute_time: f64) -> Self {
        Self {
            uuid: uuid.to_string(),
            execute_success: false,
            execute_time,
            label_file_size: 0,
            complete_file_size: 0,
            file_location: String::new(),
            recorded_at: Some(chrono::Utc::now().to_rfc3339()),
        }
    }
}

/// Drop/keep counters for one extraction run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExtractStats {
    pub reports: u64,
    pub report_failures: u64,
    pub covered_log_lines: u64,
    pub unreadable_sources: u64,
    pub matched_functions: u64,
    pub fragment_not_found: u64,
    pub unterminated_statements: u64,
    pub unmatched_statements: u64,
    pub bad_pattern_rejections: u64,
    pub emitted: u64,
    pub deduplicated: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_range_parse() {
        let range: LineRange = "10-20".parse().unwrap();
        assert_eq!(range, LineRange::new(10, 20));
        let range: LineRange = " 3 - 4 ".parse().unwrap();
        assert_eq!(range, LineRange::new(3, 4));
        assert_eq!(range.to_string(), "3-4");
    }

    #[test]
    fn test_line_range_rejects_garbage() {
        assert!("10".parse::<LineRange>().is_err());
        assert!("a-b".parse::<LineRange>().is_err());
        assert!("0-4".parse::<LineRange>().is_err());
        assert!("9-4".parse::<LineRange>().is_err());
    }

    #[test]
    fn test_line_range_contains_is_inclusive() {
        let range = LineRange::new(10, 20);
        assert!(range.contains(10));
        assert!(range.contains(20));
        assert!(!range.contains(9));
        assert!(!range.contains(21));
    }

    #[test]
    fn test_function_record_json_names() {
        let json = r#"{
            "function_name": "run",
            "function_position": "/src/A.java",
            "function_lines": "1-3",
            "function_content": "void run() {}",
            "function_without_logs": "void run() {}",
            "log_detailsList": [{"statement": "log.info(\"x\")", "vars": []}]
        }"#;
        let record: FunctionRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.name, "run");
        assert_eq!(record.lines, LineRange::new(1, 3));
        assert_eq!(record.log_details.len(), 1);

        let back = serde_json::to_value(&record).unwrap();
        assert_eq!(back["function_lines"], "1-3");
    }

    #[test]
    fn test_covered_log_flattens_detail() {
        let log = CoveredLog {
            line_number: 4,
            detail: LogStatementDetail {
                statement: "log.info(a)".to_string(),
                vars: vec!["a".to_string()],
            },
        };
        let value = serde_json::to_value(&log).unwrap();
        assert_eq!(value["statement"], "log.info(a)");
        assert_eq!(value["line_number"], 4);
    }
}
