//! Collect the textual test output Surefire leaves behind and pick out the
//! instrumented lines.

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::Layout;
use crate::error::Result;

/// Directory Surefire writes per-test output into, relative to the build root.
pub const SUREFIRE_REPORTS: &str = "target/surefire-reports";
const OUTPUT_SUFFIX: &str = "output.txt";

/// Files produced for one harvested work item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Harvest {
    pub complete_file_size: u64,
    pub label_file_size: u64,
    /// Absolute path of the tag-filtered log.
    pub file_location: PathBuf,
}

pub fn surefire_dir(execute_dir: &Path) -> PathBuf {
    execute_dir.join(SUREFIRE_REPORTS)
}

/// Concatenate every `*output.txt` in `reports_dir`, in file name order.
pub fn read_test_output(reports_dir: &Path) -> Result<String> {
    let mut files: Vec<PathBuf> = fs::read_dir(reports_dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.is_file()
                && path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.ends_with(OUTPUT_SUFFIX))
        })
        .collect();
    files.sort();

    let mut content = String::new();
    for file in files {
        let bytes = fs::read(&file)?;
        content.push_str(&String::from_utf8_lossy(&bytes));
    }
    Ok(content)
}

pub fn tagged_lines<'a>(output: &'a str, tag: &str) -> Vec<&'a str> {
    output.split('\n').filter(|line| line.contains(tag)).collect()
}

/// Save the full and tag-filtered output of `uuid`'s test run.
///
/// Returns `None` when the build root has no Surefire reports directory.
pub fn harvest(execute_dir: &Path, uuid: &str, tag: &str, layout: &Layout) -> Result<Option<Harvest>> {
    let reports = surefire_dir(execute_dir);
    if !reports.is_dir() {
        tracing::error!(uuid, dir = %reports.display(), "surefire reports not found");
        return Ok(None);
    }

    let output = read_test_output(&reports)?;

    let complete_dir = layout.complete_logs_dir();
    let output_dir = layout.output_logs_dir();
    fs::create_dir_all(&complete_dir)?;
    fs::create_dir_all(&output_dir)?;

    let complete_path = complete_dir.join(format!("{}.txt", uuid));
    fs::write(&complete_path, &output)?;

    let label_path = output_dir.join(format!("{}.txt", uuid));
    let tagged = tagged_lines(&output, tag);
    fs::write(&label_path, tagged.join("\n"))?;
    tracing::info!(uuid, lines = tagged.len(), path = %label_path.display(), "saved tagged output");

    let file_location = fs::canonicalize(&label_path).unwrap_or(label_path.clone());
    Ok(Some(Harvest {
        complete_file_size: fs::metadata(&complete_path)?.len(),
        label_file_size: fs::metadata(&label_path)?.len(),
        file_location,
    }))
}
