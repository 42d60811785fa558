//! Append-only NDJSON ledgers.
//!
//! Rows are written by a single writer thread fed through a channel, so
//! workers never share the file handle. Each row is flushed before the next
//! one is taken.

use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::thread::JoinHandle;

use crossbeam_channel::{unbounded, Sender};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{HarvestError, Result};
use crate::model::ExecutionResult;

/// Read every decodable row of `path`. A missing file is an empty ledger;
/// malformed lines are logged and skipped.
pub fn load<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let reader = BufReader::new(fs::File::open(path)?);
    let mut rows = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str(&line) {
            Ok(row) => rows.push(row),
            Err(e) => {
                tracing::warn!(path = %path.display(), line = idx + 1, error = %e, "skipping malformed ledger row")
            }
        }
    }
    Ok(rows)
}

/// Uuids already recorded in an execution ledger.
pub fn completed_uuids(path: &Path) -> Result<HashSet<String>> {
    Ok(load::<ExecutionResult>(path)?
        .into_iter()
        .map(|row| row.uuid)
        .collect())
}

/// Handle to the writer thread of one ledger file.
pub struct LedgerWriter<T> {
    tx: Sender<T>,
    handle: JoinHandle<Result<u64>>,
    path: PathBuf,
}

impl<T: Serialize + Send + 'static> LedgerWriter<T> {
    pub fn spawn(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let (tx, rx) = unbounded::<T>();

        let handle = std::thread::Builder::new()
            .name("ledger-writer".to_string())
            .spawn(move || -> Result<u64> {
                let mut out = BufWriter::new(file);
                let mut written = 0u64;
                for row in rx {
                    serde_json::to_writer(&mut out, &row)?;
                    out.write_all(b"\n")?;
                    out.flush()?;
                    written += 1;
                }
                Ok(written)
            })?;

        Ok(Self {
            tx,
            handle,
            path: path.to_path_buf(),
        })
    }

    pub fn sender(&self) -> Sender<T> {
        self.tx.clone()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Close the channel and wait for every queued row to be written.
    ///
    /// Senders handed out by [`sender`](Self::sender) must be dropped first.
    pub fn finish(self) -> Result<u64> {
        drop(self.tx);
        self.handle
            .join()
            .map_err(|_| HarvestError::Ledger("writer thread panicked".to_string()))?
    }
}
