//! Turn a directory of collected coverage data into work items.
//!
//! The data directory is laid out as
//! `<data_dir>/<project...>/<test>/jacoco/jacoco.xml` with the test's
//! Surefire output next to it in `<test>/surefire-reports/`.

use std::fs;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use crate::catalog::FunctionIndex;
use crate::config::PathRemap;
use crate::dedup::deduplicate_by_log_coverage;
use crate::error::{HarvestError, Result};
use crate::filter::clean_bad_patterns;
use crate::matcher::covered_functions;
use crate::model::{ExtractStats, WorkItem};
use crate::parsers::jacoco;
use crate::scan::{find_covered_logs, SourceCache};

const REPORT_FILE: &str = "jacoco.xml";
const SUREFIRE_DIR: &str = "surefire-reports";
const OUTPUT_SUFFIX: &str = "-output.txt";

#[derive(Debug, Clone)]
pub struct ExtractOptions {
    pub data_dir: PathBuf,
    /// Root the project checkouts live under, mirroring `data_dir`.
    pub source_code_dir: PathBuf,
    pub tag: String,
    pub remap: Option<PathRemap>,
}

/// One coverage report and the paths derived from its location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportLocation {
    pub xml_path: PathBuf,
    pub unit_test: String,
    pub execute_dir: PathBuf,
    pub project_base_dir: PathBuf,
}

/// Find every usable report under `data_dir`, in path order.
pub fn find_reports(data_dir: &Path, source_code_dir: &Path) -> Result<Vec<ReportLocation>> {
    let mut xml_files = Vec::new();
    walk(data_dir, &mut xml_files)?;
    xml_files.sort();

    let mut reports = Vec::new();
    for xml_path in xml_files {
        match locate(&xml_path, data_dir, source_code_dir) {
            Some(location) => reports.push(location),
            None => tracing::debug!(path = %xml_path.display(), "skipping report without test output"),
        }
    }
    Ok(reports)
}

fn walk(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            walk(&path, out)?;
        } else if path.file_name().and_then(|n| n.to_str()) == Some(REPORT_FILE)
            && path
                .parent()
                .and_then(|p| p.file_name())
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.contains("jacoco"))
        {
            out.push(path);
        }
    }
    Ok(())
}

fn has_test_output(surefire: &Path) -> bool {
    fs::read_dir(surefire).is_ok_and(|entries| {
        entries.filter_map(|e| e.ok()).any(|e| {
            e.file_name()
                .to_str()
                .is_some_and(|n| n.ends_with(OUTPUT_SUFFIX))
        })
    })
}

fn locate(xml_path: &Path, data_dir: &Path, source_code_dir: &Path) -> Option<ReportLocation> {
    let test_dir = xml_path.parent()?.parent()?;
    if !has_test_output(&test_dir.join(SUREFIRE_DIR)) {
        return None;
    }
    let unit_test = test_dir.file_name()?.to_str()?.to_string();
    let project = test_dir.parent()?.strip_prefix(data_dir).ok()?;
    let execute_dir = source_code_dir.join(project);
    let project_base_dir = execute_dir.join("src").join("main").join("java");
    Some(ReportLocation {
        xml_path: xml_path.to_path_buf(),
        unit_test,
        execute_dir,
        project_base_dir,
    })
}

/// Parse one report and build its work items. Sources are cached for the
/// duration of the report only.
pub fn process_report(
    location: &ReportLocation,
    index: &FunctionIndex,
    options: &ExtractOptions,
    stats: &mut ExtractStats,
) -> Result<Vec<WorkItem>> {
    let mut sources = SourceCache::new();
    let file = fs::File::open(&location.xml_path).map_err(|source| HarvestError::SourceRead {
        path: location.xml_path.clone(),
        source,
    })?;
    let mut facts = Vec::new();
    jacoco::parse_streaming(&mut BufReader::new(file), &mut |fact| {
        facts.push(fact);
        Ok(())
    })?;

    let lines = find_covered_logs(&facts, &location.project_base_dir, &mut sources, stats);
    let covered = covered_functions(
        &lines,
        index,
        &location.unit_test,
        &location.execute_dir,
        &mut sources,
        stats,
    );
    let cleaned = clean_bad_patterns(covered, stats);

    Ok(cleaned
        .into_iter()
        .map(|f| WorkItem::from_covered(f, &options.tag, options.remap.as_ref()))
        .collect())
}

/// Run every report under the data directory and deduplicate the result.
pub fn extract(index: &FunctionIndex, options: &ExtractOptions) -> Result<(Vec<WorkItem>, ExtractStats)> {
    let span = tracing::info_span!("extract", data = %options.data_dir.display());
    let _enter = span.enter();

    if index.is_empty() {
        tracing::warn!("function catalog is empty, no work items will be produced");
    }
    let reports = find_reports(&options.data_dir, &options.source_code_dir)?;
    tracing::info!(reports = reports.len(), functions = index.len(), "extracting covered log statements");

    let mut stats = ExtractStats::default();
    let mut items = Vec::new();

    for location in &reports {
        stats.reports += 1;
        match process_report(location, index, options, &mut stats) {
            Ok(found) => {
                tracing::debug!(report = %location.xml_path.display(), items = found.len(), "processed report");
                items.extend(found);
            }
            Err(e) => {
                tracing::warn!(report = %location.xml_path.display(), error = %e, "skipping report");
                stats.report_failures += 1;
            }
        }
    }

    stats.emitted = items.len() as u64;
    let items = deduplicate_by_log_coverage(items);
    stats.deduplicated = items.len() as u64;
    tracing::info!(?stats, "extraction finished");
    Ok((items, stats))
}

pub fn write_items(path: &Path, items: &[WorkItem]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = fs::File::create(path)?;
    serde_json::to_writer_pretty(std::io::BufWriter::new(file), items)?;
    Ok(())
}

pub fn load_items(path: &Path) -> Result<Vec<WorkItem>> {
    let content = fs::read_to_string(path).map_err(|source| HarvestError::SourceRead {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(serde_json::from_str(&content)?)
}
