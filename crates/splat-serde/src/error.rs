use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("IO error while writing export: {0}")]
    Io(#[from] std::io::Error),

    #[error("Nothing to export: every splat is deleted or the scene is empty")]
    NothingToExport,

    #[error("Column '{name}' has {len} values, expected {expected}")]
    ColumnLength {
        name: String,
        len: usize,
        expected: usize,
    },

    #[error("Source is missing required column '{0}'")]
    MissingColumn(String),

    #[error("Failed to serialize viewer settings: {0}")]
    Json(#[from] serde_json::Error),
}
