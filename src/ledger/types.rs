use std::path::PathBuf;

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Furthest step a capture run reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureStatus {
    /// The camera produced an artifact; upload not finished yet.
    Captured,
    /// Bytes are stored remotely; registration not finished yet.
    Uploaded,
    Registered,
    /// The shutter produced nothing.
    Cancelled,
    UploadFailed,
    /// Upload succeeded but no asset row was written. The media reference is
    /// orphaned.
    RegistrationFailed,
}

impl CaptureStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Captured => "captured",
            Self::Uploaded => "uploaded",
            Self::Registered => "registered",
            Self::Cancelled => "cancelled",
            Self::UploadFailed => "upload_failed",
            Self::RegistrationFailed => "registration_failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "captured" => Some(Self::Captured),
            "uploaded" => Some(Self::Uploaded),
            "registered" => Some(Self::Registered),
            "cancelled" => Some(Self::Cancelled),
            "upload_failed" => Some(Self::UploadFailed),
            "registration_failed" => Some(Self::RegistrationFailed),
            _ => None,
        }
    }
}

/// One pipeline run.
#[derive(Debug, Clone)]
pub struct CaptureRecord {
    pub run_id: Uuid,
    pub event_id: String,
    pub subject: Option<String>,
    pub local_path: Option<PathBuf>,
    pub media_reference: Option<String>,
    pub asset_id: Option<String>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub status: CaptureStatus,
}

/// Counts per status plus the time of the latest run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerSummary {
    pub total: u64,
    pub registered: u64,
    pub cancelled: u64,
    pub upload_failed: u64,
    pub registration_failed: u64,
    /// Runs that never reached a terminal status (process died mid-run).
    pub in_progress: u64,
    pub last_capture_at: Option<DateTime<Utc>>,
}
