//! Instrument covered statements so their runtime output can be picked out
//! of the test logs, and derive the log-free baseline of each function.

use std::sync::LazyLock;

use regex::Regex;

use crate::config::PathRemap;
use crate::model::{CoveredFunction, CoveredLog, FunctionInfo, WorkItem};

/// Marker prepended to the message of every instrumented statement.
pub const DEFAULT_TAG: &str = "[SUPER TAG]";

static LINE_COMMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)//.*$").unwrap());
static BLOCK_COMMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/\*[\s\S]*?\*/").unwrap());

/// How [`replace_log_statements`] treats each covered statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplaceMode {
    /// Delete the statement together with its `;\n`.
    Remove,
    /// Prefix the statement's first argument with the tag.
    Label,
}

/// `log.info("x" + y)` becomes `log.info("[SUPER TAG]" + "x" + y)`.
///
/// Statements with no argument list are returned unchanged.
pub fn label_statement(statement: &str, tag: &str) -> String {
    match statement.split_once('(') {
        Some((head, rest)) => format!("{}(\"{}\" + {}", head, tag, rest),
        None => statement.to_string(),
    }
}

pub fn replace_log_statements(
    source: &str,
    covered: &[CoveredLog],
    mode: ReplaceMode,
    tag: &str,
) -> String {
    let mut result = source.to_string();
    for log in covered {
        let statement = &log.detail.statement;
        result = match mode {
            ReplaceMode::Remove => result.replace(&format!("{};\n", statement), ""),
            ReplaceMode::Label => result.replace(statement, &label_statement(statement, tag)),
        };
    }
    result.replace("\n\n", "\n")
}

/// Strip `//` and `/* */` comments, then one leading newline.
///
/// This is textual: comment markers inside string literals are stripped too.
pub fn remove_java_comments(code: &str) -> String {
    let code = LINE_COMMENT_RE.replace_all(code, "");
    let code = BLOCK_COMMENT_RE.replace_all(&code, "");
    code.strip_prefix('\n').unwrap_or(&*code).to_string()
}

impl WorkItem {
    /// Turn a covered function into a work item with a fresh uuid.
    pub fn from_covered(function: CoveredFunction, tag: &str, remap: Option<&PathRemap>) -> Self {
        let content = &function.function.content;
        let without_covered = remove_java_comments(&replace_log_statements(
            content,
            &function.covered_log,
            ReplaceMode::Remove,
            tag,
        ));
        let labeled = replace_log_statements(content, &function.covered_log, ReplaceMode::Label, tag);

        let mut info = FunctionInfo::from(&function.function);
        let mut execute_dir = function.execute_dir;
        if let Some(remap) = remap {
            info.function_position = remap.apply(&info.function_position);
            execute_dir = remap.apply(&execute_dir);
        }

        WorkItem {
            uuid: uuid::Uuid::new_v4().to_string(),
            function_info: info,
            covered_log: function.covered_log,
            unit_test: function.unit_test,
            execute_dir,
            function_content_without_covered_logs: without_covered,
            function_with_labeled_data: Some(labeled),
        }
    }
}
