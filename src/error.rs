use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// No position fix is available for a device that has measurements.
    #[error("no position fixes for organization={organization} device={device}")]
    EmptyIndex {
        organization: String,
        device: String,
    },
    #[error("malformed timestamp {value:?}: {reason}")]
    MalformedTimestamp { value: String, reason: String },
    /// The target schema could not be resolved. Fatal for the whole batch.
    #[error("unknown column set for table {table:?}: {detail}")]
    UnknownColumn { table: String, detail: String },
    #[error("no measurements and no positions in batch")]
    EmptyInput,
    #[error("time index expects fixes for {expected} only, found {found}")]
    MixedPartition { expected: String, found: String },
    #[error("invalid query: {0}")]
    InvalidQuery(String),
}

impl Error {
    /// Per-record failures are recoverable by the merge policy; everything
    /// else aborts the batch.
    pub fn is_per_record(&self) -> bool {
        matches!(
            self,
            Error::EmptyIndex { .. } | Error::MalformedTimestamp { .. }
        )
    }

    pub(crate) fn malformed(value: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::MalformedTimestamp {
            value: value.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn unknown_column(table: impl Into<String>, detail: impl Into<String>) -> Self {
        Error::UnknownColumn {
            table: table.into(),
            detail: detail.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
