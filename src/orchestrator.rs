//! Drive the mutate, test, harvest, revert cycle over a list of work items.
//!
//! Items sharing a build root run sequentially on one lane; different build
//! roots run in parallel on up to `workers` threads. Results go to the
//! ledger writer thread. A failed reversal stops every lane after its
//! current item and fails the whole run.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use crossbeam_channel::{unbounded, Sender};
use serde::Serialize;

use crate::config::{Config, Layout};
use crate::error::{HarvestError, Result};
use crate::harvest;
use crate::ledger::{self, LedgerWriter};
use crate::model::{ExecutionResult, WorkItem};
use crate::mutation::MutationStore;
use crate::runner::TestRunner;

#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    pub workers: usize,
    pub resume: bool,
    pub record_error: bool,
    pub tag: String,
}

impl From<&Config> for ExecuteOptions {
    fn from(config: &Config) -> Self {
        Self {
            workers: config.workers,
            resume: config.resume,
            record_error: config.record_error,
            tag: config.tag.clone(),
        }
    }
}

/// Counters for one execution run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub total: usize,
    pub groups: usize,
    pub recovered: usize,
    pub already_done: usize,
    pub invalid: usize,
    pub mutation_failed: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Items that ran but produced no ledger row and will be retried.
    pub unrecorded: usize,
}

impl RunSummary {
    fn record(&mut self, outcome: ItemOutcome) {
        match outcome {
            ItemOutcome::AlreadyDone => self.already_done += 1,
            ItemOutcome::Invalid => self.invalid += 1,
            ItemOutcome::MutationFailed => self.mutation_failed += 1,
            ItemOutcome::Succeeded => self.succeeded += 1,
            ItemOutcome::Failed => self.failed += 1,
            ItemOutcome::Unrecorded => self.unrecorded += 1,
        }
    }

    fn merge(&mut self, other: &RunSummary) {
        self.already_done += other.already_done;
        self.invalid += other.invalid;
        self.mutation_failed += other.mutation_failed;
        self.succeeded += other.succeeded;
        self.failed += other.failed;
        self.unrecorded += other.unrecorded;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ItemOutcome {
    AlreadyDone,
    Invalid,
    MutationFailed,
    Succeeded,
    Failed,
    Unrecorded,
}

/// Everything a lane needs, shared by reference across all lanes.
struct Shared<'a> {
    layout: &'a Layout,
    store: MutationStore,
    runner: &'a dyn TestRunner,
    options: &'a ExecuteOptions,
    done: HashSet<String>,
    ledger: Sender<ExecutionResult>,
    abort: AtomicBool,
}

/// Split items by build root, keeping first-encounter order.
pub fn group_by_execute_dir(items: Vec<WorkItem>) -> Vec<(PathBuf, Vec<WorkItem>)> {
    let mut positions: HashMap<PathBuf, usize> = HashMap::new();
    let mut groups: Vec<(PathBuf, Vec<WorkItem>)> = Vec::new();
    for item in items {
        match positions.get(&item.execute_dir) {
            Some(&idx) => groups[idx].1.push(item),
            None => {
                positions.insert(item.execute_dir.clone(), groups.len());
                groups.push((item.execute_dir.clone(), vec![item]));
            }
        }
    }
    groups
}

fn has_labeled_body(item: &WorkItem) -> bool {
    item.function_with_labeled_data
        .as_deref()
        .is_some_and(|body| !body.is_empty())
}

pub fn execute(
    items: Vec<WorkItem>,
    layout: &Layout,
    runner: &dyn TestRunner,
    options: &ExecuteOptions,
) -> Result<RunSummary> {
    let run_span = tracing::info_span!("execute", run = %layout.root().display());
    let _enter = run_span.enter();

    layout.create_dirs()?;
    let store = MutationStore::new(layout.replace_dir());
    let recovered = store.recover_pending()?;
    if !recovered.is_empty() {
        tracing::warn!(count = recovered.len(), "reverted mutations left by an earlier run");
    }

    let done = if options.resume {
        ledger::completed_uuids(&layout.ledger_path())?
    } else {
        HashSet::new()
    };

    let mut summary = RunSummary {
        total: items.len(),
        recovered: recovered.len(),
        ..RunSummary::default()
    };
    let (runnable, unlabeled): (Vec<_>, Vec<_>) = items.into_iter().partition(has_labeled_body);
    for item in &unlabeled {
        tracing::error!(uuid = %item.uuid, "work item has no labeled body");
    }
    summary.invalid += unlabeled.len();

    let groups = group_by_execute_dir(runnable);
    summary.groups = groups.len();
    let lanes = options.workers.max(1).min(groups.len());
    let writer = LedgerWriter::<ExecutionResult>::spawn(&layout.ledger_path())?;
    tracing::info!(
        ledger = %writer.path().display(),
        items = summary.total,
        groups = groups.len(),
        lanes,
        resume = options.resume,
        completed = done.len(),
        "starting execution"
    );

    let shared = Shared {
        layout,
        store,
        runner,
        options,
        done,
        ledger: writer.sender(),
        abort: AtomicBool::new(false),
    };

    let (group_tx, group_rx) = unbounded();
    for group in groups {
        // The receiver is alive until the scope below ends.
        let _ = group_tx.send(group);
    }
    drop(group_tx);

    let lane_results: Vec<Result<RunSummary>> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..lanes)
            .map(|lane| {
                let shared = &shared;
                let group_rx = group_rx.clone();
                let span = tracing::info_span!(parent: &run_span, "lane", lane);
                scope.spawn(move || {
                    let _enter = span.enter();
                    let mut lane_summary = RunSummary::default();
                    for (dir, group) in group_rx.iter() {
                        if shared.abort.load(Ordering::SeqCst) {
                            break;
                        }
                        tracing::info!(dir = %dir.display(), items = group.len(), "processing build root");
                        for item in group {
                            if shared.abort.load(Ordering::SeqCst) {
                                break;
                            }
                            match process_item(shared, &item) {
                                Ok(outcome) => lane_summary.record(outcome),
                                Err(e) => {
                                    shared.abort.store(true, Ordering::SeqCst);
                                    tracing::error!(uuid = %item.uuid, error = %e, "halting run");
                                    return Err(e);
                                }
                            }
                        }
                    }
                    Ok(lane_summary)
                })
            })
            .collect();

        handles
            .into_iter()
            .map(|h| {
                h.join().unwrap_or_else(|_| {
                    shared.abort.store(true, Ordering::SeqCst);
                    Err(HarvestError::Other("worker thread panicked".to_string()))
                })
            })
            .collect()
    });

    drop(shared);
    let rows = writer.finish()?;

    let mut first_error = None;
    for result in lane_results {
        match result {
            Ok(lane) => summary.merge(&lane),
            Err(e) => {
                first_error.get_or_insert(e);
            }
        }
    }
    if let Some(e) = first_error {
        return Err(e);
    }

    tracing::info!(rows, ?summary, "execution finished");
    Ok(summary)
}

fn process_item(shared: &Shared<'_>, item: &WorkItem) -> Result<ItemOutcome> {
    let uuid = item.uuid.as_str();
    if shared.done.contains(uuid) {
        tracing::debug!(uuid, "already in ledger");
        return Ok(ItemOutcome::AlreadyDone);
    }

    let labeled = item.function_with_labeled_data.as_deref().unwrap_or_default();
    if item.unit_test.is_empty() || item.execute_dir.as_os_str().is_empty() || labeled.is_empty() {
        tracing::error!(uuid, "work item is missing its test, build root or labeled body");
        return Ok(ItemOutcome::Invalid);
    }

    let span = tracing::info_span!("item", uuid, test = %item.unit_test);
    let _enter = span.enter();

    let info = &item.function_info;
    let guard = match shared
        .store
        .replace(&info.function_position, info.function_lines, labeled, uuid)
    {
        Ok(guard) => guard,
        Err(e) => {
            tracing::error!(error = %e, file = %info.function_position.display(), "replace failed");
            if shared.store.has_record(uuid) {
                shared.store.reverse(uuid)?;
            }
            return Ok(ItemOutcome::MutationFailed);
        }
    };

    let outcome = run_and_record(shared, item);
    guard.finish()?;
    outcome
}

fn run_and_record(shared: &Shared<'_>, item: &WorkItem) -> Result<ItemOutcome> {
    let uuid = item.uuid.as_str();
    let dir = item.execute_dir.as_path();

    let outcome = match shared.runner.run_test(&item.unit_test, dir) {
        Ok(outcome) => outcome,
        Err(e) => {
            tracing::error!(error = %e, "could not run test command");
            return Ok(ItemOutcome::Unrecorded);
        }
    };
    let secs = outcome.elapsed.as_secs_f64();

    if !outcome.success {
        tracing::warn!(code = ?outcome.exit_code, secs, "test run failed");
        if shared.options.record_error {
            save_build_error(shared, item, &outcome.error_report(&shared.runner.describe(&item.unit_test), dir));
        }
        send(shared, ExecutionResult::failed(uuid, secs))?;
        return Ok(ItemOutcome::Failed);
    }
    tracing::info!(secs, "test run succeeded");

    match harvest::harvest(dir, uuid, &shared.options.tag, shared.layout) {
        Ok(Some(h)) => {
            send(
                shared,
                ExecutionResult {
                    uuid: uuid.to_string(),
                    execute_success: true,
                    execute_time: secs,
                    label_file_size: h.label_file_size,
                    complete_file_size: h.complete_file_size,
                    file_location: h.file_location.display().to_string(),
                    recorded_at: Some(chrono::Utc::now().to_rfc3339()),
                },
            )?;
            Ok(ItemOutcome::Succeeded)
        }
        Ok(None) => {
            send(shared, ExecutionResult::failed(uuid, secs))?;
            Ok(ItemOutcome::Failed)
        }
        Err(e) => {
            tracing::error!(error = %e, "could not save test output");
            Ok(ItemOutcome::Unrecorded)
        }
    }
}

fn send(shared: &Shared<'_>, row: ExecutionResult) -> Result<()> {
    shared
        .ledger
        .send(row)
        .map_err(|_| HarvestError::Ledger("ledger writer stopped".to_string()))
}

fn save_build_error(shared: &Shared<'_>, item: &WorkItem, report: &str) {
    let path = shared
        .layout
        .build_error_dir()
        .join(format!("{}.log", item.uuid));
    if let Err(e) = write_report(&path, report) {
        tracing::warn!(error = %e, path = %path.display(), "could not save build error log");
    }
}

fn write_report(path: &Path, report: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, report)
}
