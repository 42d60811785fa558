//! Coverage collection: run each test of each project once and keep the
//! JaCoCo report and Surefire output it produced.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use crossbeam_channel::{unbounded, Sender};
use serde::{Deserialize, Serialize};

use crate::error::{HarvestError, Result};
use crate::harvest::SUREFIRE_REPORTS;
use crate::ledger::{self, LedgerWriter};
use crate::runner::TestRunner;

const JACOCO_SITE: &str = "target/site/jacoco";
/// Test name recorded for a project-wide build.
pub const BUILD_ROW: &str = "all";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectEntry {
    /// Relative to the code root.
    pub project_dir: String,
    pub test_list: Vec<String>,
}

/// One row of `execution_result.jsonl`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectRow {
    pub project_dir: String,
    pub test_name: String,
    pub execution_time: f64,
    pub build_success: bool,
}

#[derive(Debug, Clone)]
pub struct CollectOptions {
    pub code_root: PathBuf,
    pub data_dir: PathBuf,
    pub ledger_path: PathBuf,
    pub workers: usize,
    pub resume: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CollectSummary {
    pub projects: usize,
    pub skipped_projects: usize,
    pub failed_builds: usize,
    pub tests_run: usize,
    pub tests_skipped: usize,
    pub reports_saved: usize,
}

impl CollectSummary {
    fn merge(&mut self, other: &CollectSummary) {
        self.skipped_projects += other.skipped_projects;
        self.failed_builds += other.failed_builds;
        self.tests_run += other.tests_run;
        self.tests_skipped += other.tests_skipped;
        self.reports_saved += other.reports_saved;
    }
}

pub fn load_projects(path: &Path) -> Result<Vec<ProjectEntry>> {
    let content = fs::read_to_string(path).map_err(|source| HarvestError::SourceRead {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(serde_json::from_str(&content)?)
}

/// What an earlier run already did.
#[derive(Debug, Default)]
struct Progress {
    done: HashSet<(String, String)>,
    failed_builds: HashSet<String>,
}

impl Progress {
    fn from_rows(rows: Vec<CollectRow>) -> Self {
        let mut progress = Progress::default();
        for row in rows {
            if row.test_name == BUILD_ROW && !row.build_success {
                progress.failed_builds.insert(row.project_dir.clone());
            }
            progress.done.insert((row.project_dir, row.test_name));
        }
        progress
    }
}

struct Shared<'a> {
    options: &'a CollectOptions,
    runner: &'a dyn TestRunner,
    progress: Progress,
    ledger: Sender<CollectRow>,
}

pub fn collect(
    projects: Vec<ProjectEntry>,
    runner: &dyn TestRunner,
    options: &CollectOptions,
) -> Result<CollectSummary> {
    let run_span = tracing::info_span!("collect", data = %options.data_dir.display());
    let _enter = run_span.enter();

    fs::create_dir_all(&options.data_dir)?;
    let progress = if options.resume {
        Progress::from_rows(ledger::load(&options.ledger_path)?)
    } else {
        Progress::default()
    };

    let mut summary = CollectSummary {
        projects: projects.len(),
        ..CollectSummary::default()
    };
    let lanes = options.workers.max(1).min(projects.len());
    tracing::info!(projects = projects.len(), lanes, "collecting coverage");

    let writer = LedgerWriter::<CollectRow>::spawn(&options.ledger_path)?;
    let shared = Shared {
        options,
        runner,
        progress,
        ledger: writer.sender(),
    };

    let (project_tx, project_rx) = unbounded();
    for project in projects {
        let _ = project_tx.send(project);
    }
    drop(project_tx);

    let lane_results: Vec<Result<CollectSummary>> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..lanes)
            .map(|lane| {
                let shared = &shared;
                let project_rx = project_rx.clone();
                let span = tracing::info_span!(parent: &run_span, "lane", lane);
                scope.spawn(move || -> Result<CollectSummary> {
                    let _enter = span.enter();
                    let mut lane_summary = CollectSummary::default();
                    for project in project_rx.iter() {
                        collect_project(shared, &project, &mut lane_summary)?;
                    }
                    Ok(lane_summary)
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| {
                h.join()
                    .unwrap_or_else(|_| Err(HarvestError::Other("worker thread panicked".to_string())))
            })
            .collect()
    });

    drop(shared);
    writer.finish()?;

    for result in lane_results {
        summary.merge(&result?);
    }
    tracing::info!(?summary, "collection finished");
    Ok(summary)
}

fn collect_project(
    shared: &Shared<'_>,
    project: &ProjectEntry,
    summary: &mut CollectSummary,
) -> Result<()> {
    let name = project.project_dir.as_str();
    if shared.progress.failed_builds.contains(name) {
        tracing::info!(project = name, "build failed in an earlier run, skipping");
        summary.skipped_projects += 1;
        return Ok(());
    }

    let dir = shared.options.code_root.join(name);
    if !dir.is_dir() {
        tracing::error!(project = name, dir = %dir.display(), "project directory does not exist");
        summary.skipped_projects += 1;
        return Ok(());
    }

    let pending: Vec<&String> = project
        .test_list
        .iter()
        .filter(|test| !shared.progress.done.contains(&(name.to_string(), test.to_string())))
        .collect();
    summary.tests_skipped += project.test_list.len() - pending.len();
    if pending.is_empty() {
        return Ok(());
    }

    tracing::info!(project = name, tests = pending.len(), "building project");
    let build = shared.runner.build(&dir)?;
    if !build.success {
        tracing::error!(project = name, code = ?build.exit_code, "project build failed");
        summary.failed_builds += 1;
        send(
            shared,
            CollectRow {
                project_dir: name.to_string(),
                test_name: BUILD_ROW.to_string(),
                execution_time: build.elapsed.as_secs_f64(),
                build_success: false,
            },
        )?;
        return Ok(());
    }

    for (idx, test) in pending.iter().enumerate() {
        clear_outputs(&dir)?;
        let outcome = shared.runner.run_test(test, &dir)?;
        summary.tests_run += 1;

        if save_outputs(&dir, &shared.options.data_dir.join(name).join(test.as_str()))? {
            summary.reports_saved += 1;
        } else {
            tracing::warn!(project = name, test = test.as_str(), "test produced no coverage report");
        }
        clear_outputs(&dir)?;

        tracing::info!(
            project = name,
            test = test.as_str(),
            secs = outcome.elapsed.as_secs_f64(),
            success = outcome.success,
            progress = %format!("{}/{}", idx + 1, pending.len()),
            "test finished"
        );
        send(
            shared,
            CollectRow {
                project_dir: name.to_string(),
                test_name: test.to_string(),
                execution_time: outcome.elapsed.as_secs_f64(),
                build_success: outcome.success,
            },
        )?;
    }
    Ok(())
}

fn send(shared: &Shared<'_>, row: CollectRow) -> Result<()> {
    shared
        .ledger
        .send(row)
        .map_err(|_| HarvestError::Ledger("ledger writer stopped".to_string()))
}

fn clear_outputs(dir: &Path) -> Result<()> {
    for sub in [JACOCO_SITE, SUREFIRE_REPORTS] {
        let path = dir.join(sub);
        if path.exists() {
            fs::remove_dir_all(&path)?;
        }
    }
    Ok(())
}

/// Copy the coverage report and Surefire files of the last run into
/// `save_dir`. Returns false when either output directory is missing.
fn save_outputs(dir: &Path, save_dir: &Path) -> Result<bool> {
    let site = dir.join(JACOCO_SITE);
    let surefire = dir.join(SUREFIRE_REPORTS);
    if !site.is_dir() || !surefire.is_dir() {
        return Ok(false);
    }

    let jacoco_dir = save_dir.join("jacoco");
    let reports_dir = save_dir.join("surefire-reports");
    fs::create_dir_all(&jacoco_dir)?;
    fs::create_dir_all(&reports_dir)?;

    let report = site.join("jacoco.xml");
    if report.is_file() {
        fs::copy(&report, jacoco_dir.join("jacoco.xml"))?;
    }
    for entry in fs::read_dir(&surefire)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            fs::copy(entry.path(), reports_dir.join(entry.file_name()))?;
        }
    }
    Ok(true)
}
