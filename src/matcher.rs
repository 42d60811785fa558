//! Map covered log lines to the catalog functions that contain them and
//! rebuild each statement's full source text.
//!
//! Resolution is first-match: the first catalog statement that
//! contains every reconstructed line wins, even if a later one would fit
//! better. Ambiguous functions are screened out afterwards by
//! [`crate::filter`].

use std::path::Path;

use crate::catalog::FunctionIndex;
use crate::model::{
    CoveredFunction, CoveredLog, CoveredLogLine, ExtractStats, FunctionRecord, LogStatementDetail,
};
use crate::scan::SourceCache;

/// Statement terminator.
const TERMINATOR: char = ';';

/// A catalog function together with the covered log lines inside it.
#[derive(Debug)]
pub struct FunctionMatch<'a> {
    pub function: &'a FunctionRecord,
    pub lines: Vec<&'a CoveredLogLine>,
}

/// Outcome of reconstructing one covered fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconstruction {
    /// The statement's source lines, from the fragment to the terminator.
    Complete(Vec<String>),
    /// No body line equals the fragment.
    NotFound,
    /// The body ended before a terminator was seen.
    Unterminated,
}

fn in_function(line: &CoveredLogLine, function: &FunctionRecord) -> bool {
    function.lines.contains(line.line_number)
        && line
            .path
            .to_string_lossy()
            .contains(function.file_path.to_string_lossy().as_ref())
}

/// Associate covered log lines with every function whose range and path
/// contain them. Functions without any line are dropped.
pub fn match_logs_to_functions<'a>(
    lines: &'a [CoveredLogLine],
    index: &'a FunctionIndex,
) -> Vec<FunctionMatch<'a>> {
    let mut matches: Vec<FunctionMatch<'a>> = index
        .functions()
        .iter()
        .map(|function| FunctionMatch {
            function,
            lines: Vec::new(),
        })
        .collect();

    for line in lines {
        for m in matches.iter_mut() {
            if in_function(line, m.function) {
                m.lines.push(line);
            }
        }
    }

    matches.retain(|m| !m.lines.is_empty());
    matches
}

/// Rebuild the full statement that starts at `fragment` inside `body`.
pub fn reconstruct_statement(body: &[String], fragment: &str) -> Reconstruction {
    let fragment = fragment.trim();
    let Some(start) = body.iter().position(|line| line.trim() == fragment) else {
        return Reconstruction::NotFound;
    };

    let mut statement = Vec::new();
    for line in &body[start..] {
        statement.push(line.clone());
        if line.trim().ends_with(TERMINATOR) {
            return Reconstruction::Complete(statement);
        }
    }
    Reconstruction::Unterminated
}

/// First catalog statement containing every reconstructed line.
pub fn resolve_statement<'a>(
    statement_lines: &[String],
    known: &'a [LogStatementDetail],
) -> Option<&'a LogStatementDetail> {
    known.iter().find(|detail| {
        let terminated = format!("{}{}", detail.statement, TERMINATOR);
        statement_lines
            .iter()
            .all(|line| terminated.contains(line.trim()))
    })
}

/// Reconstruct and resolve every covered fragment of one matched function.
///
/// Returns `None` when the function's source can't be read or when none of
/// its fragments resolve to a catalog statement.
pub fn resolve_function(
    m: &FunctionMatch<'_>,
    sources: &mut SourceCache,
    stats: &mut ExtractStats,
) -> Option<Vec<CoveredLog>> {
    let function = m.function;
    let body = match function_body(function, sources) {
        Ok(body) => body,
        Err(e) => {
            tracing::warn!(function = %function.name, error = %e, "cannot read function source");
            stats.unreadable_sources += 1;
            return None;
        }
    };

    let mut covered = Vec::new();
    for line in &m.lines {
        match reconstruct_statement(&body, &line.text) {
            Reconstruction::Complete(statement) => {
                match resolve_statement(&statement, &function.log_details) {
                    Some(detail) => covered.push(CoveredLog {
                        line_number: line.line_number,
                        detail: detail.clone(),
                    }),
                    None => {
                        tracing::debug!(function = %function.name, line = line.line_number, "no catalog statement matches");
                        stats.unmatched_statements += 1;
                    }
                }
            }
            Reconstruction::NotFound => {
                tracing::debug!(function = %function.name, line = line.line_number, "fragment not found in body");
                stats.fragment_not_found += 1;
            }
            Reconstruction::Unterminated => {
                tracing::debug!(function = %function.name, line = line.line_number, "statement has no terminator");
                stats.unterminated_statements += 1;
            }
        }
    }

    if covered.is_empty() {
        None
    } else {
        Some(covered)
    }
}

fn function_body(
    function: &FunctionRecord,
    sources: &mut SourceCache,
) -> crate::error::Result<Vec<String>> {
    let lines = sources.lines(&function.file_path)?;
    let start = (function.lines.start as usize).saturating_sub(1).min(lines.len());
    let end = (function.lines.end as usize).min(lines.len());
    Ok(lines[start..end].to_vec())
}

/// Full matching pass for one coverage report.
pub fn covered_functions(
    lines: &[CoveredLogLine],
    index: &FunctionIndex,
    unit_test: &str,
    execute_dir: &Path,
    sources: &mut SourceCache,
    stats: &mut ExtractStats,
) -> Vec<CoveredFunction> {
    let matches = match_logs_to_functions(lines, index);
    stats.matched_functions += matches.len() as u64;

    matches
        .iter()
        .filter_map(|m| {
            resolve_function(m, sources, stats).map(|covered_log| CoveredFunction {
                function: m.function.clone(),
                covered_log,
                unit_test: unit_test.to_string(),
                execute_dir: execute_dir.to_path_buf(),
            })
        })
        .collect()
}
