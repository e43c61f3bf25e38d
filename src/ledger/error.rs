use std::path::PathBuf;

use thiserror::Error;

/// Why a ledger call failed. Capture runs only log these.
#[derive(Error, Debug)]
pub enum LedgerError {
    /// Opening the file or configuring the connection.
    #[error("Cannot open capture ledger {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Capture ledger schema setup failed: {0}")]
    Schema(#[from] rusqlite::Error),

    #[error("Capture ledger has schema version {found}, this build supports up to {supported}")]
    NewerSchema { found: i32, supported: i32 },

    #[error("Capture ledger {op} failed: {source}")]
    Query {
        op: &'static str,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Capture ledger connection lock is poisoned")]
    Poisoned,

    #[error("Capture ledger open task did not finish: {0}")]
    OpenTask(#[from] tokio::task::JoinError),
}

impl LedgerError {
    /// Map a rusqlite error from the statement named `op`.
    pub(crate) fn query(op: &'static str) -> impl FnOnce(rusqlite::Error) -> Self {
        move |source| Self::Query { op, source }
    }
}
