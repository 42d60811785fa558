//! Reject functions whose covered statements are ambiguous or degenerate.

use std::collections::HashSet;

use crate::model::{CoveredFunction, CoveredLog, ExtractStats};

/// Why a function's covered statements were rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BadPattern {
    DuplicateStatement,
    DuplicateVariable,
    RepeatedSymbol,
    EmptyStatement,
}

/// Minimum run length of one punctuation character that marks a statement
/// as degenerate.
const SYMBOL_RUN: usize = 3;

/// True when `text` holds `SYMBOL_RUN` or more consecutive copies of the same
/// character that is neither ASCII alphanumeric nor whitespace.
#[must_use]
pub fn has_repeated_symbol(text: &str) -> bool {
    let mut prev: Option<char> = None;
    let mut run = 0;
    for c in text.chars() {
        if c.is_ascii_alphanumeric() || c.is_whitespace() {
            prev = None;
            run = 0;
            continue;
        }
        if prev == Some(c) {
            run += 1;
        } else {
            prev = Some(c);
            run = 1;
        }
        if run >= SYMBOL_RUN {
            return true;
        }
    }
    false
}

/// First bad pattern exhibited by a covered-log set, if any.
pub fn bad_pattern(covered: &[CoveredLog]) -> Option<BadPattern> {
    let mut statements = HashSet::new();
    if !covered
        .iter()
        .all(|log| statements.insert(log.detail.statement.as_str()))
    {
        return Some(BadPattern::DuplicateStatement);
    }

    for log in covered {
        let vars: HashSet<&str> = log.detail.vars.iter().map(String::as_str).collect();
        if vars.len() != log.detail.vars.len() {
            return Some(BadPattern::DuplicateVariable);
        }
    }

    if covered
        .iter()
        .any(|log| has_repeated_symbol(&log.detail.statement))
    {
        return Some(BadPattern::RepeatedSymbol);
    }

    if covered
        .iter()
        .any(|log| log.detail.statement.trim().is_empty())
    {
        return Some(BadPattern::EmptyStatement);
    }

    None
}

/// Drop every function with a bad pattern, counting the rejections.
pub fn clean_bad_patterns(
    functions: Vec<CoveredFunction>,
    stats: &mut ExtractStats,
) -> Vec<CoveredFunction> {
    functions
        .into_iter()
        .filter(|f| match bad_pattern(&f.covered_log) {
            Some(pattern) => {
                tracing::debug!(function = %f.function.name, ?pattern, "rejecting bad pattern");
                stats.bad_pattern_rejections += 1;
                false
            }
            None => true,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::LogStatementDetail;

    fn log(statement: &str, vars: &[&str]) -> CoveredLog {
        CoveredLog {
            line_number: 1,
            detail: LogStatementDetail {
                statement: statement.to_string(),
                vars: vars.iter().map(|v| v.to_string()).collect(),
            },
        }
    }

    #[test]
    fn test_repeated_symbol() {
        assert!(has_repeated_symbol("log.info(\"===\")"));
        assert!(has_repeated_symbol("log.info(\"a\" + \"***b\")"));
        assert!(!has_repeated_symbol("log.info(\"==\" + x)"));
        assert!(!has_repeated_symbol("log.info(\"= = =\")"));
        assert!(!has_repeated_symbol("log.info(\"aaa\")"));
        assert!(!has_repeated_symbol("log.info(\"=-=\")"));
    }

    #[test]
    fn test_duplicate_statement_rejected() {
        let covered = vec![log("log.info(\"a\")", &[]), log("log.info(\"a\")", &[])];
        assert_eq!(bad_pattern(&covered), Some(BadPattern::DuplicateStatement));
    }

    #[test]
    fn test_duplicate_variable_rejected() {
        let covered = vec![log("log.info(\"{} {}\", a, a)", &["a", "a"])];
        assert_eq!(bad_pattern(&covered), Some(BadPattern::DuplicateVariable));
    }

    #[test]
    fn test_empty_statement_rejected() {
        let covered = vec![log("log.info(x)", &["x"]), log("   ", &[])];
        assert_eq!(bad_pattern(&covered), Some(BadPattern::EmptyStatement));
    }

    #[test]
    fn test_distinct_statements_pass() {
        let covered = vec![
            log("log.info(\"start\")", &[]),
            log("log.warn(\"took {} ms\", elapsed)", &["elapsed"]),
        ];
        assert_eq!(bad_pattern(&covered), None);
    }
}
