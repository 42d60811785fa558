use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum HarvestError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("XML parse error at position {position}: {source}")]
    Xml {
        source: quick_xml::Error,
        position: usize,
    },

    #[error("Malformed coverage report at position {position}: {message}")]
    ReportParse { message: String, position: usize },

    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("Cannot read source file {path}: {source}")]
    SourceRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Source file not found: {0}")]
    SourceNotFound(PathBuf),

    #[error("Line range {range} is outside {path} ({lines} lines)")]
    LineRange {
        path: PathBuf,
        range: String,
        lines: usize,
    },

    #[error("Mutation of {path} failed: {source}")]
    Mutation {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Reversal inconsistency for {uuid}: {message}")]
    Reversal { uuid: String, message: String },

    #[error("Ledger error: {0}")]
    Ledger(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl HarvestError {
    pub fn reversal(uuid: &str, message: impl Into<String>) -> Self {
        HarvestError::Reversal {
            uuid: uuid.to_string(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, HarvestError>;
