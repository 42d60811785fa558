//! Command handler functions for the logharvest CLI.
//!
//! Each `cmd_*` function returns its output as a `String`, making them easy
//! to test without capturing stdout.

use std::fmt::Write;
use std::path::Path;

use anyhow::{Context, Result};

use crate::catalog::FunctionIndex;
use crate::collect::{self, CollectOptions};
use crate::config::{Config, Layout};
use crate::discover;
use crate::extract::{self, ExtractOptions};
use crate::mutation::{MutationStore, ReverseOutcome};
use crate::orchestrator::{self, ExecuteOptions};
use crate::runner::TestRunner;

pub fn cmd_collect(
    projects_file: &Path,
    options: &CollectOptions,
    runner: &dyn TestRunner,
) -> Result<String> {
    let projects = collect::load_projects(projects_file)
        .with_context(|| format!("Failed to load project list {}", projects_file.display()))?;
    let summary = collect::collect(projects, runner, options)?;

    let mut out = String::new();
    writeln!(out, "Projects:        {}", summary.projects).unwrap();
    writeln!(out, "Skipped:         {}", summary.skipped_projects).unwrap();
    writeln!(out, "Failed builds:   {}", summary.failed_builds).unwrap();
    writeln!(
        out,
        "Tests run:       {} ({} already done)",
        summary.tests_run, summary.tests_skipped
    )
    .unwrap();
    writeln!(out, "Reports saved:   {}", summary.reports_saved).unwrap();
    writeln!(out, "Ledger:          {}", options.ledger_path.display()).unwrap();
    Ok(out)
}

pub fn cmd_discover(code_root: &Path, output: &Path) -> Result<String> {
    let entries = discover::discover(code_root)
        .with_context(|| format!("Failed to scan {}", code_root.display()))?;
    discover::write_projects(output, &entries)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    let tests: usize = entries.iter().map(|e| e.test_list.len()).sum();
    let mut out = String::new();
    writeln!(out, "Modules:  {}", entries.len()).unwrap();
    writeln!(out, "Tests:    {}", tests).unwrap();
    writeln!(out, "Wrote {}", output.display()).unwrap();
    Ok(out)
}

pub fn cmd_extract(catalog: &Path, options: &ExtractOptions, output: &Path) -> Result<String> {
    let index = FunctionIndex::load(catalog)
        .with_context(|| format!("Failed to load function catalog {}", catalog.display()))?;
    let (items, stats) = extract::extract(&index, options)?;
    extract::write_items(output, &items)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    let mut out = String::new();
    writeln!(
        out,
        "Reports:            {} ({} failed)",
        stats.reports, stats.report_failures
    )
    .unwrap();
    writeln!(out, "Covered log lines:  {}", stats.covered_log_lines).unwrap();
    writeln!(out, "Matched functions:  {}", stats.matched_functions).unwrap();
    writeln!(
        out,
        "Dropped statements: {} not found, {} unterminated, {} unmatched",
        stats.fragment_not_found, stats.unterminated_statements, stats.unmatched_statements
    )
    .unwrap();
    writeln!(out, "Bad patterns:       {}", stats.bad_pattern_rejections).unwrap();
    writeln!(
        out,
        "Work items:         {} ({} before dedup)",
        stats.deduplicated, stats.emitted
    )
    .unwrap();
    writeln!(out, "Wrote {}", output.display()).unwrap();
    Ok(out)
}

pub fn cmd_execute(work_file: &Path, config: &Config, runner: &dyn TestRunner) -> Result<String> {
    let items = extract::load_items(work_file)
        .with_context(|| format!("Failed to load work items {}", work_file.display()))?;
    let layout = config.layout();
    let summary = orchestrator::execute(items, &layout, runner, &ExecuteOptions::from(config))?;

    let mut out = String::new();
    writeln!(
        out,
        "Work items:   {} in {} build roots",
        summary.total, summary.groups
    )
    .unwrap();
    if summary.recovered > 0 {
        writeln!(out, "Recovered:    {}", summary.recovered).unwrap();
    }
    writeln!(out, "Succeeded:    {}", summary.succeeded).unwrap();
    writeln!(out, "Failed:       {}", summary.failed).unwrap();
    writeln!(out, "Already done: {}", summary.already_done).unwrap();
    writeln!(
        out,
        "Skipped:      {} invalid, {} mutation errors, {} unrecorded",
        summary.invalid, summary.mutation_failed, summary.unrecorded
    )
    .unwrap();
    writeln!(out, "Ledger:       {}", layout.ledger_path().display()).unwrap();
    Ok(out)
}

pub fn cmd_reverse(layout: &Layout, uuid: &str) -> Result<String> {
    let store = MutationStore::new(layout.replace_dir());
    match store.reverse(uuid)? {
        ReverseOutcome::Reversed => Ok(format!("Reversed {}\n", uuid)),
        ReverseOutcome::AlreadyReversed => Ok(format!("{} was already reversed\n", uuid)),
    }
}

pub fn cmd_pending(layout: &Layout, recover: bool) -> Result<String> {
    let store = MutationStore::new(layout.replace_dir());
    if recover {
        let recovered = store.recover_pending()?;
        return Ok(format!("Recovered {} mutation(s)\n", recovered.len()));
    }

    let pending = store.pending()?;
    if pending.is_empty() {
        return Ok("No pending mutations.\n".to_string());
    }
    let mut out = String::new();
    for uuid in &pending {
        writeln!(out, "{}", uuid).unwrap();
    }
    writeln!(out, "({} pending)", pending.len()).unwrap();
    Ok(out)
}
