use crate::modules::error::HarvestResult;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::path::PathBuf;

pub mod memory;

/// Minimal message record written as soon as the header phase completes, so a
/// message is never re-evaluated on a later run even if the rest of its
/// pipeline fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRecord {
    pub uid: u32,
    pub folder: String,
    pub sender: String,
    pub subject: String,
    pub date: Option<DateTime<Utc>>,
    pub vendor_id: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentRecord {
    pub uid: u32,
    pub original_filename: String,
    pub storage_path: PathBuf,
    pub size: u64,
}

/// Persistence collaborator. Implementations must tolerate concurrent calls
/// from many workers. "Already exists" on upsert is update-in-place, never an
/// error.
pub trait MessageStore: Send + Sync {
    fn upsert_message(&self, record: MessageRecord) -> HarvestResult<()>;

    /// Replaces the full attachment set for one message: delete whatever was
    /// recorded before, then insert `records`. Re-processing a message after
    /// a partial failure therefore converges on the latest run's set instead
    /// of accumulating a union.
    fn replace_attachments(&self, uid: u32, records: Vec<AttachmentRecord>) -> HarvestResult<()>;

    /// Skip-list of message uids already evaluated on earlier runs.
    fn ingested_uids(&self) -> HarvestResult<HashSet<u32>>;
}
