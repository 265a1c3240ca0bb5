//! Error types for ntuple access and expression evaluation.

use thiserror::Error;

/// Errors raised while reading chunks or evaluating expressions over them.
#[derive(Error, Debug)]
pub enum NtupleError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Parquet decoding error
    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    /// Arrow conversion error
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// Malformed expression (tokenizer or parser failure)
    #[error("Expression error: {0}")]
    Expression(String),

    /// Expression or weight references a column the chunk does not carry
    #[error("missing column: '{0}'")]
    MissingColumn(String),

    /// Subscript past the end of a ragged row
    #[error("index {index} out of range for '{branch}' at entry {entry} (row length {len})")]
    Index {
        /// Subscripted branch.
        branch: String,
        /// Entry (row) within the chunk.
        entry: usize,
        /// Requested subscript.
        index: i64,
        /// Actual row length.
        len: usize,
    },

    /// Arrays whose shapes cannot be combined
    #[error("shape mismatch: {0}")]
    Shape(String),

    /// Column type the reader cannot convert to `f64`
    #[error("unsupported column type for '{name}': {data_type}")]
    UnsupportedType {
        /// Column name.
        name: String,
        /// Arrow data type, rendered.
        data_type: String,
    },

    /// Caller-supplied argument out of range
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl NtupleError {
    /// Whether this error is an out-of-range subscript on a ragged row.
    pub fn is_index_error(&self) -> bool {
        matches!(self, NtupleError::Index { .. })
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, NtupleError>;
