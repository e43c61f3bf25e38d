//! Capture ledger: a local SQLite log of pipeline runs.
//!
//! Each run of the capture pipeline gets one row that records the furthest
//! step it reached. The ledger only observes; nothing is replayed from it. Its
//! main use is surfacing orphaned uploads (media stored remotely but never
//! registered against an event).

pub mod db;
pub mod error;
pub mod schema;
pub mod types;

pub use db::{CaptureLedger, SqliteLedger};
pub use error::LedgerError;
pub use types::{CaptureRecord, CaptureStatus, LedgerSummary};
