//! Transactional source mutation.
//!
//! Every [`MutationStore::replace`] first writes an undo record
//! `{replace_dir}/{uuid}.json` and only then touches the source file. A
//! completed [`MutationStore::reverse`] renames the record to `{uuid}.bak`,
//! so a `.json` record on disk always means the file may still be mutated.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::error::{HarvestError, Result};
use crate::model::LineRange;

const RECORD_EXT: &str = "json";
const REVERSED_EXT: &str = "bak";
const MISSING_EXT: &str = "error_file_missing";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplaceObject {
    /// Original text of the replaced lines.
    pub target: String,
    pub replacement: String,
    pub lines: LineRange,
}

/// On-disk undo record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UndoRecord {
    pub file_path: PathBuf,
    pub replace_obj: ReplaceObject,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReverseOutcome {
    Reversed,
    AlreadyReversed,
}

/// Undo records for one run.
#[derive(Debug, Clone)]
pub struct MutationStore {
    replace_dir: PathBuf,
}

impl MutationStore {
    pub fn new(replace_dir: impl Into<PathBuf>) -> Self {
        Self {
            replace_dir: replace_dir.into(),
        }
    }

    pub fn replace_dir(&self) -> &Path {
        &self.replace_dir
    }

    fn record_path(&self, uuid: &str, ext: &str) -> PathBuf {
        self.replace_dir.join(format!("{}.{}", uuid, ext))
    }

    pub fn has_record(&self, uuid: &str) -> bool {
        self.record_path(uuid, RECORD_EXT).exists()
    }

    /// Replace lines `lines` of `file` with `replacement`.
    ///
    /// The returned guard reverts the change on [`MutationGuard::finish`] or
    /// when dropped.
    pub fn replace(
        &self,
        file: &Path,
        lines: LineRange,
        replacement: &str,
        uuid: &str,
    ) -> Result<MutationGuard<'_>> {
        let content = read_source(file)?;
        let span = line_span(&content, lines).ok_or_else(|| HarvestError::LineRange {
            path: file.to_path_buf(),
            range: lines.to_string(),
            lines: content.split('\n').count(),
        })?;

        let record = UndoRecord {
            file_path: file.to_path_buf(),
            replace_obj: ReplaceObject {
                target: content[span.0..span.1].to_string(),
                replacement: replacement.to_string(),
                lines,
            },
        };
        self.write_record(uuid, &record)?;

        let mut mutated = String::with_capacity(content.len() + replacement.len());
        mutated.push_str(&content[..span.0]);
        mutated.push_str(replacement);
        mutated.push_str(&content[span.1..]);
        write_atomic(file, &mutated)?;

        tracing::debug!(uuid, file = %file.display(), %lines, "replaced");
        Ok(MutationGuard {
            store: self,
            uuid: uuid.to_string(),
            finished: false,
        })
    }

    /// Restore the file mutated under `uuid`.
    pub fn reverse(&self, uuid: &str) -> Result<ReverseOutcome> {
        let record_path = self.record_path(uuid, RECORD_EXT);
        if !record_path.exists() {
            if self.record_path(uuid, REVERSED_EXT).exists() {
                return Ok(ReverseOutcome::AlreadyReversed);
            }
            return Err(HarvestError::reversal(uuid, "no undo record"));
        }

        let record: UndoRecord = fs::read_to_string(&record_path)
            .map_err(|e| HarvestError::reversal(uuid, e.to_string()))
            .and_then(|raw| {
                serde_json::from_str(&raw)
                    .map_err(|e| HarvestError::reversal(uuid, format!("bad undo record: {}", e)))
            })?;

        let file = &record.file_path;
        if !file.exists() {
            fs::rename(&record_path, self.record_path(uuid, MISSING_EXT))?;
            return Err(HarvestError::reversal(
                uuid,
                format!("target file {} is missing", file.display()),
            ));
        }

        let content = read_source(file)?;
        let obj = &record.replace_obj;
        let anchor = line_span(&content, obj.lines).map(|(start, _)| start);

        let state = anchor
            .and_then(|at| span_state(&content, at, obj))
            .or_else(|| {
                content
                    .find(&obj.replacement)
                    .and_then(|at| span_state(&content, at, obj))
            });

        match state {
            Some(SpanState::Mutated(at)) => {
                let mut original = String::with_capacity(content.len() + obj.target.len());
                original.push_str(&content[..at]);
                original.push_str(&obj.target);
                original.push_str(&content[at + obj.replacement.len()..]);
                write_atomic(file, &original)?;
            }
            // The source write never happened.
            Some(SpanState::Original) => {
                tracing::debug!(uuid, file = %file.display(), "source was never mutated");
            }
            None => {
                return Err(HarvestError::reversal(
                    uuid,
                    format!("replacement text not found in {}", file.display()),
                ));
            }
        }

        fs::rename(&record_path, self.record_path(uuid, REVERSED_EXT))?;
        tracing::debug!(uuid, file = %file.display(), "reversed");
        Ok(ReverseOutcome::Reversed)
    }

    /// Uuids whose undo record has not been reversed, sorted.
    pub fn pending(&self) -> Result<Vec<String>> {
        if !self.replace_dir.exists() {
            return Ok(Vec::new());
        }
        let mut uuids = Vec::new();
        for entry in fs::read_dir(&self.replace_dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXT) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                uuids.push(stem.to_string());
            }
        }
        uuids.sort();
        Ok(uuids)
    }

    /// Reverse every pending record. Returns the recovered uuids.
    pub fn recover_pending(&self) -> Result<Vec<String>> {
        let pending = self.pending()?;
        for uuid in &pending {
            tracing::warn!(uuid = %uuid, "recovering unreversed mutation");
            self.reverse(uuid)?;
        }
        Ok(pending)
    }

    fn write_record(&self, uuid: &str, record: &UndoRecord) -> Result<()> {
        fs::create_dir_all(&self.replace_dir)?;
        let path = self.record_path(uuid, RECORD_EXT);
        let mutation_err = |source| HarvestError::Mutation {
            path: path.clone(),
            source,
        };

        let mut tmp = NamedTempFile::new_in(&self.replace_dir).map_err(mutation_err)?;
        serde_json::to_writer_pretty(&mut tmp, record)?;
        tmp.flush().map_err(mutation_err)?;
        tmp.as_file().sync_all().map_err(mutation_err)?;
        tmp.persist(&path).map_err(|e| mutation_err(e.error))?;
        Ok(())
    }
}

/// Scoped mutation. Reverts on [`finish`](Self::finish) or on drop.
#[derive(Debug)]
pub struct MutationGuard<'a> {
    store: &'a MutationStore,
    uuid: String,
    finished: bool,
}

impl MutationGuard<'_> {
    pub fn finish(mut self) -> Result<ReverseOutcome> {
        self.finished = true;
        self.store.reverse(&self.uuid)
    }
}

impl Drop for MutationGuard<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        match self.store.reverse(&self.uuid) {
            Ok(outcome) => tracing::warn!(uuid = %self.uuid, ?outcome, "mutation reverted on drop"),
            Err(e) => tracing::error!(uuid = %self.uuid, error = %e, "mutation left in place"),
        }
    }
}

fn read_source(file: &Path) -> Result<String> {
    fs::read_to_string(file).map_err(|source| {
        if source.kind() == std::io::ErrorKind::NotFound {
            HarvestError::SourceNotFound(file.to_path_buf())
        } else {
            HarvestError::SourceRead {
                path: file.to_path_buf(),
                source,
            }
        }
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SpanState {
    /// The replacement starts at this offset.
    Mutated(usize),
    Original,
}

/// What the text at `at` holds. When both the target and the replacement
/// match there, one is a prefix of the other and the longer one decides.
fn span_state(content: &str, at: usize, obj: &ReplaceObject) -> Option<SpanState> {
    let rest = &content[at..];
    let has_target = rest.starts_with(&obj.target);
    let has_replacement = rest.starts_with(&obj.replacement);
    match (has_target, has_replacement) {
        (true, true) if obj.replacement.len() > obj.target.len() => Some(SpanState::Mutated(at)),
        (true, _) => Some(SpanState::Original),
        (false, true) => Some(SpanState::Mutated(at)),
        (false, false) => None,
    }
}

/// Byte span of lines `start..=end`, excluding the final newline. `end` is
/// clamped to the last line. `None` when `start` is past the end.
fn line_span(content: &str, lines: LineRange) -> Option<(usize, usize)> {
    let mut starts = vec![0];
    starts.extend(content.match_indices('\n').map(|(i, _)| i + 1));

    let first = lines.start.checked_sub(1)? as usize;
    let begin = *starts.get(first)?;
    let end = match starts.get(lines.end as usize) {
        Some(&next) => next - 1,
        None => content.len(),
    };
    Some((begin, end.max(begin)))
}

/// Write `content` to a sibling temp file and rename it over `path`,
/// keeping the original permissions.
fn write_atomic(path: &Path, content: &str) -> Result<()> {
    let mutation_err = |source| HarvestError::Mutation {
        path: path.to_path_buf(),
        source,
    };
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let permissions = fs::metadata(path).map_err(mutation_err)?.permissions();
    let mut tmp = NamedTempFile::new_in(parent).map_err(mutation_err)?;
    tmp.write_all(content.as_bytes()).map_err(mutation_err)?;
    tmp.as_file().sync_all().map_err(mutation_err)?;
    tmp.as_file()
        .set_permissions(permissions)
        .map_err(mutation_err)?;
    tmp.persist(path).map_err(|e| mutation_err(e.error))?;
    Ok(())
}
