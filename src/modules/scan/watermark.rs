use crate::modules::error::code::ErrorCode;
use crate::modules::error::HarvestResult;
use crate::raise_error;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use tracing::debug;

/// Per-rule "last processed" markers: one file `v<rule-id>` holding an
/// RFC 3339 timestamp. A rule whose watermark has not advanced past its
/// vendor's last load is treated as unchanged and skipped by the scan.
/// Single-writer: one scan process per data root, no file locking.
#[derive(Debug, Clone)]
pub struct WatermarkStore {
    dir: PathBuf,
}

impl WatermarkStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn path(&self, rule_id: u64) -> PathBuf {
        self.dir.join(format!("v{rule_id}"))
    }

    /// An unreadable or unparsable watermark is treated as absent, never as
    /// an error.
    pub fn load(&self, rule_id: u64) -> Option<DateTime<Utc>> {
        let raw = std::fs::read_to_string(self.path(rule_id)).ok()?;
        match DateTime::parse_from_rfc3339(raw.trim()) {
            Ok(dt) => Some(dt.with_timezone(&Utc)),
            Err(e) => {
                debug!("Ignoring malformed watermark for rule {}: {}", rule_id, e);
                None
            }
        }
    }

    pub fn store(&self, rule_id: u64, timestamp: DateTime<Utc>) -> HarvestResult<()> {
        std::fs::write(self.path(rule_id), timestamp.to_rfc3339()).map_err(|e| {
            raise_error!(
                format!("Failed to write watermark for rule {}: {}", rule_id, e),
                ErrorCode::StoreWriteFailed
            )
        })
    }

    /// Reads the watermark, seeding a missing one with `default` the way the
    /// first-ever run does.
    pub fn load_or_init(
        &self,
        rule_id: u64,
        default: DateTime<Utc>,
    ) -> HarvestResult<DateTime<Utc>> {
        match self.load(rule_id) {
            Some(dt) => Ok(dt),
            None => {
                self.store(rule_id, default)?;
                Ok(default)
            }
        }
    }
}
