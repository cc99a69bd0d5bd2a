use thiserror::Error;

/// Errors surfaced by the client.
///
/// Network-facing variants (`Transport`, `Malformed`, `TooManyResults`) leave the
/// affected fetch retryable; the remaining variants are local contract violations
/// and are raised before any request is issued.
///
/// The type is `Clone` because one in-flight request may have several waiters and
/// each of them receives the same outcome.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Network or HTTP failure.
    #[error("transport error: {0}")]
    Transport(String),
    /// The document did not have the expected shape.
    #[error("malformed response: {0}")]
    Malformed(String),
    /// The service refused to answer inline; ask again with a narrower filter.
    #[error("too many results ({0}); try again with a narrower filter")]
    TooManyResults(String),
    #[error("unknown field '{field}' for table '{table}'")]
    UnknownField { table: String, field: String },
    #[error("unknown dataset '{0}'")]
    UnknownDataset(String),
    #[error("no table initialized for dataset '{0}'")]
    NoSuchTable(String),
    /// A variable dimension was given no value. Use `""` to request all values.
    #[error("no value given for dimension '{dimension}' of table '{table}' (use \"\" for all values)")]
    MissingDimension { table: String, dimension: String },
}

impl Error {
    pub(crate) fn unknown_field(table: &str, field: &str) -> Self {
        Error::UnknownField {
            table: table.to_string(),
            field: field.to_string(),
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Transport(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
