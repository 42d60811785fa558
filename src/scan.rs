//! Turn executed coverage lines into covered log lines by looking at the
//! source text behind each one.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use crate::error::{HarvestError, Result};
use crate::model::{CoverageFact, CoveredLogLine, ExtractStats};

/// Prefix that marks a line as a logger call (compared case-insensitively).
pub const LOG_PREFIX: &str = "log.";

#[must_use]
pub fn is_log_line(line: &str) -> bool {
    line.trim().to_lowercase().starts_with(LOG_PREFIX)
}

/// Reads each source file at most once. Failed reads are remembered too, so
/// a missing file costs one syscall per report rather than one per line.
#[derive(Debug, Default)]
pub struct SourceCache {
    files: HashMap<PathBuf, Option<Vec<String>>>,
}

impl SourceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lines of `path`, split the same way the coverage tool numbers them.
    pub fn lines(&mut self, path: &Path) -> Result<&[String]> {
        let entry = self
            .files
            .entry(path.to_path_buf())
            .or_insert_with(|| read_lines(path).ok());
        entry.as_deref().ok_or_else(|| HarvestError::SourceRead {
            path: path.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "unreadable source file"),
        })
    }
}

fn read_lines(path: &Path) -> std::io::Result<Vec<String>> {
    let content = std::fs::read_to_string(path)?;
    Ok(content.lines().map(str::to_string).collect())
}

/// Keep the executed facts whose source line is a log call.
///
/// `project_base_dir` is the source root the report's package paths are
/// relative to (usually `<module>/src/main/java`).
pub fn find_covered_logs(
    facts: &[CoverageFact],
    project_base_dir: &Path,
    sources: &mut SourceCache,
    stats: &mut ExtractStats,
) -> Vec<CoveredLogLine> {
    let mut covered = Vec::new();
    let mut unreadable: HashSet<PathBuf> = HashSet::new();

    for fact in facts.iter().filter(|f| f.was_executed) {
        let path = project_base_dir.join(&fact.file_path);
        let lines = match sources.lines(&path) {
            Ok(lines) => lines,
            Err(e) => {
                if unreadable.insert(path.clone()) {
                    tracing::debug!(path = %path.display(), error = %e, "skipping unreadable source");
                    stats.unreadable_sources += 1;
                }
                continue;
            }
        };
        let Some(text) = fact
            .line_number
            .checked_sub(1)
            .and_then(|idx| lines.get(idx as usize))
        else {
            tracing::debug!(path = %path.display(), line = fact.line_number, "line beyond end of file");
            continue;
        };
        if is_log_line(text) {
            covered.push(CoveredLogLine {
                path: path.clone(),
                line_number: fact.line_number,
                text: text.trim().to_string(),
            });
        }
    }

    stats.covered_log_lines += covered.len() as u64;
    covered
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_log_line() {
        assert!(is_log_line("    log.info(\"x\");"));
        assert!(is_log_line("LOG.debug(x);"));
        assert!(!is_log_line("logger.info(x);"));
        assert!(!is_log_line("// log.info(x);"));
        assert!(!is_log_line(""));
    }

    #[test]
    fn test_find_covered_logs_reads_each_line() {
        let dir = tempfile::tempdir().unwrap();
        let pkg = dir.path().join("p");
        std::fs::create_dir_all(&pkg).unwrap();
        std::fs::write(
            pkg.join("A.java"),
            "class A {\n  void f() {\n    LOG.info(\"hi\");\n    x++;\n  }\n}\n",
        )
        .unwrap();

        let fact = |line_number, was_executed| CoverageFact {
            file_path: "p/A.java".to_string(),
            line_number,
            was_executed,
        };
        let facts = vec![fact(3, true), fact(4, true), fact(3, false), fact(99, true)];
        let mut all = facts.clone();
        all.push(CoverageFact {
            file_path: "p/Missing.java".to_string(),
            line_number: 1,
            was_executed: true,
        });

        let mut sources = SourceCache::new();
        let mut stats = ExtractStats::default();
        let covered = find_covered_logs(&all, dir.path(), &mut sources, &mut stats);

        assert_eq!(covered.len(), 1);
        assert_eq!(covered[0].line_number, 3);
        assert_eq!(covered[0].text, "LOG.info(\"hi\");");
        assert_eq!(covered[0].path, pkg.join("A.java"));
        assert_eq!(stats.covered_log_lines, 1);
        assert_eq!(stats.unreadable_sources, 1);
    }

    #[test]
    fn test_unreadable_source_counted_once_per_file() {
        let dir = tempfile::tempdir().unwrap();
        let facts: Vec<CoverageFact> = [("p/Missing.java", 1), ("p/Missing.java", 2), ("q/Gone.java", 7)]
            .iter()
            .map(|(file_path, line_number)| CoverageFact {
                file_path: file_path.to_string(),
                line_number: *line_number,
                was_executed: true,
            })
            .collect();

        let mut sources = SourceCache::new();
        let mut stats = ExtractStats::default();
        let covered = find_covered_logs(&facts, dir.path(), &mut sources, &mut stats);

        assert!(covered.is_empty());
        assert_eq!(stats.unreadable_sources, 2);
        assert_eq!(stats.covered_log_lines, 0);
    }
}
