//! In-memory catalog of functions produced by the static log-statement
//! pre-pass. Loaded once per run and read-only afterwards.

use std::collections::HashSet;
use std::path::Path;

use crate::error::{HarvestError, Result};
use crate::model::{FunctionKey, FunctionRecord};

/// Functions in catalog order, unique by [`FunctionKey`].
#[derive(Debug, Default)]
pub struct FunctionIndex {
    functions: Vec<FunctionRecord>,
}

impl FunctionIndex {
    /// Build an index, keeping the first record seen for each key.
    pub fn from_records(records: Vec<FunctionRecord>) -> Self {
        let mut seen: HashSet<FunctionKey> = HashSet::new();
        let functions = records
            .into_iter()
            .filter(|record| seen.insert(record.key()))
            .collect();
        Self { functions }
    }

    /// Parse the catalog JSON array.
    pub fn from_json(input: &str) -> Result<Self> {
        let records: Vec<FunctionRecord> = serde_json::from_str(input)
            .map_err(|e| HarvestError::Catalog(format!("Invalid function catalog: {}", e)))?;
        Ok(Self::from_records(records))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| HarvestError::SourceRead {
            path: path.to_path_buf(),
            source,
        })?;
        let index = Self::from_json(&content)?;
        tracing::info!(path = %path.display(), functions = index.len(), "loaded function catalog");
        Ok(index)
    }

    pub fn functions(&self) -> &[FunctionRecord] {
        &self.functions
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CATALOG: &str = r#"[
        {"function_name": "a", "function_position": "/p/A.java", "function_lines": "1-5",
         "function_content": "", "function_without_logs": "", "log_detailsList": []},
        {"function_name": "a", "function_position": "/p/A.java", "function_lines": "1-5",
         "function_content": "dup", "function_without_logs": "", "log_detailsList": []},
        {"function_name": "a", "function_position": "/p/A.java", "function_lines": "7-9",
         "function_content": "", "function_without_logs": "", "log_detailsList": []}
    ]"#;

    #[test]
    fn test_first_record_per_key_wins() {
        let index = FunctionIndex::from_json(CATALOG).unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(index.functions()[0].content, "");
        assert_eq!(index.functions()[1].lines.start, 7);
    }

    #[test]
    fn test_empty_catalog() {
        let index = FunctionIndex::from_json("[]").unwrap();
        assert!(index.is_empty());
        assert!(!FunctionIndex::from_json(CATALOG).unwrap().is_empty());
    }

    #[test]
    fn test_bad_line_range_is_catalog_error() {
        let bad = r#"[{"function_name": "a", "function_position": "/p/A.java", "function_lines": "five"}]"#;
        let err = FunctionIndex::from_json(bad).unwrap_err();
        assert!(matches!(err, HarvestError::Catalog(_)), "{err}");
    }
}
