use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, LaunchSettingsError>;

#[derive(Error, Debug)]
pub enum LaunchSettingsError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("launch settings are malformed (line {line}, column {column}): {message}")]
    MalformedDocument {
        line: usize,
        column: usize,
        message: String,
    },

    #[error("invalid '{section}' section: {message}")]
    SchemaError { section: String, message: String },

    #[error("launch settings file {} contains errors that need to be corrected{}", path.display(), detail_suffix(detail))]
    SettingsHaveErrors {
        path: PathBuf,
        detail: Option<String>,
    },

    #[error("no launch settings snapshot was published within {timeout_ms}ms")]
    SnapshotUnavailable { timeout_ms: u64 },

    #[error("{0}")]
    Other(String),
}

impl LaunchSettingsError {
    pub(crate) fn schema(section: impl Into<String>, message: impl ToString) -> Self {
        Self::SchemaError {
            section: section.into(),
            message: message.to_string(),
        }
    }
}

fn detail_suffix(detail: &Option<String>) -> String {
    detail.as_deref().map(|d| format!(": {d}")).unwrap_or_default()
}
