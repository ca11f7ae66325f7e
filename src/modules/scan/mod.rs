use crate::decode_mailbox_name;
use crate::modules::error::HarvestResult;
use crate::modules::imap::manager::SessionFactory;
use crate::modules::imap::pool::ConnectionPool;
use crate::modules::rules::RuleScope;
use crate::modules::scan::criteria::{build_search_criteria, ScanWindow};
use crate::modules::scan::download::AttachmentWriter;
use crate::modules::scan::folder::FolderScanner;
use crate::modules::scan::processor::{EmailProcessor, HarvestedMessage};
use crate::modules::scan::progress::{ProgressSummary, ProgressTracker};
use crate::modules::scan::watermark::WatermarkStore;
use crate::modules::store::MessageStore;
use crate::modules::utils::format_duration;
use chrono::{Duration as ChronoDuration, Local, Utc};
use futures::StreamExt;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};

pub mod criteria;
pub mod download;
pub mod folder;
pub mod processor;
pub mod progress;
pub mod watermark;

/// How far behind a vendor's last load a missing watermark is seeded, so a
/// first run re-examines a sensible slice of history instead of nothing.
const WATERMARK_SEED_DAYS: i64 = 10;

#[derive(Debug, Clone)]
pub struct ScanRequest {
    pub window: ScanWindow,
    pub unread_only: bool,
    /// Raw IMAP folder names never scanned.
    pub excluded_folders: Vec<String>,
    pub folder_workers: usize,
    pub message_workers: usize,
}

#[derive(Debug)]
pub struct ScanReport {
    pub folders_scanned: usize,
    pub folders_failed: usize,
    pub harvested: Vec<HarvestedMessage>,
    pub summary: ProgressSummary,
}

impl ScanReport {
    fn empty(summary: ProgressSummary) -> Self {
        Self {
            folders_scanned: 0,
            folders_failed: 0,
            harvested: Vec::new(),
            summary,
        }
    }
}

/// Top-level orchestrator for one scan: builds the effective rule scope and
/// search criteria, lists folders, fans folder scans out with bounded
/// concurrency and guarantees pool teardown on every exit path.
pub struct MailboxHarvester<F: SessionFactory> {
    pool: ConnectionPool<F>,
    scope: RuleScope,
    store: Arc<dyn MessageStore>,
    writer: AttachmentWriter,
    watermarks: WatermarkStore,
}

impl<F: SessionFactory> MailboxHarvester<F> {
    pub fn new(
        pool: ConnectionPool<F>,
        scope: RuleScope,
        store: Arc<dyn MessageStore>,
        writer: AttachmentWriter,
        watermarks: WatermarkStore,
    ) -> Self {
        Self {
            pool,
            scope,
            store,
            writer,
            watermarks,
        }
    }

    pub async fn run(&self, request: &ScanRequest) -> HarvestResult<ScanReport> {
        let result = self.run_inner(request).await;
        // Teardown happens whether the scan succeeded or died early; no
        // session outlives the run.
        self.pool.close_all().await;
        result
    }

    async fn run_inner(&self, request: &ScanRequest) -> HarvestResult<ScanReport> {
        let started_at = Utc::now();
        let scope = self.effective_scope();
        if scope.is_empty() {
            warn!("No active ingestion rules in scope; nothing to scan.");
            return Ok(ScanReport::empty(ProgressTracker::new().summary()));
        }
        info!("Scanning with {} active rules.", scope.rules().len());

        let skip_list = self.store.ingested_uids()?;
        let criteria =
            build_search_criteria(&request.window, request.unread_only, Local::now().date_naive());
        info!("Search criteria: {}", criteria);

        let candidates = self.list_candidate_folders(&request.excluded_folders).await?;
        if candidates.is_empty() {
            warn!("No folders eligible for scanning.");
            return Ok(ScanReport::empty(ProgressTracker::new().summary()));
        }
        info!("{} folders selected for scanning.", candidates.len());

        let progress = ProgressTracker::new();
        let processor =
            EmailProcessor::new(&self.pool, &scope, self.store.as_ref(), &self.writer, &progress);
        let scanner = FolderScanner::new(
            &self.pool,
            &processor,
            &criteria,
            &skip_list,
            request.message_workers.max(1),
        );

        // Pre-count pass so progress can report percentage and ETA.
        let mut per_folder: Vec<(String, Vec<u32>)> = Vec::new();
        let mut folders_failed = 0usize;
        for folder in &candidates {
            match scanner.get_email_uids(folder).await {
                Ok(uids) => {
                    info!(
                        "{}: {} candidate messages.",
                        decode_mailbox_name!(folder.clone()),
                        uids.len()
                    );
                    per_folder.push((folder.clone(), uids));
                }
                Err(e) => {
                    warn!(
                        "Failed to search folder {}: {:#?}",
                        decode_mailbox_name!(folder.clone()),
                        e
                    );
                    folders_failed += 1;
                }
            }
        }
        let total: usize = per_folder.iter().map(|(_, uids)| uids.len()).sum();
        progress.set_total(total);

        let folders_scanned = per_folder.len();
        let scanner_ref = &scanner;
        let folder_results: Vec<Vec<HarvestedMessage>> = futures::stream::iter(
            per_folder
                .into_iter()
                .map(|(folder, uids)| async move { scanner_ref.scan_folder(&folder, uids).await }),
        )
        .buffer_unordered(request.folder_workers.max(1))
        .collect()
        .await;
        let harvested: Vec<HarvestedMessage> =
            folder_results.into_iter().flatten().collect();

        // A failed folder leaves messages unevaluated and absent from the
        // skip-list; advancing watermarks would hide them from every later
        // run. Hold the line and let the next scan retry the whole window.
        if folders_failed == 0 {
            for rule in scope.rules() {
                if let Err(e) = self.watermarks.store(rule.id, started_at) {
                    warn!("Could not advance watermark for rule {}: {:#?}", rule.id, e);
                }
            }
        } else {
            warn!(
                "{} folders failed; watermarks left unchanged for this run.",
                folders_failed
            );
        }

        let summary = progress.summary();
        info!(
            "Scan complete: {}/{} messages processed, {} ok, {} failed, {} harvested, {:.1} msg/s, elapsed {}.",
            summary.processed,
            summary.total,
            summary.successful,
            summary.failed,
            harvested.len(),
            summary.items_per_second,
            format_duration(summary.elapsed_seconds as u64)
        );

        Ok(ScanReport {
            folders_scanned,
            folders_failed,
            harvested,
            summary,
        })
    }

    /// Drops rules whose vendor has not changed since the last run, judged by
    /// the per-rule watermark against the vendor's last load time.
    fn effective_scope(&self) -> RuleScope {
        self.scope.filtered(|rule| {
            let Some(last_load) = self
                .scope
                .vendor(rule.vendor_id)
                .and_then(|vendor| vendor.last_load)
            else {
                return true;
            };
            let seed = last_load - ChronoDuration::days(WATERMARK_SEED_DAYS);
            match self.watermarks.load_or_init(rule.id, seed) {
                Ok(watermark) if watermark >= last_load => {
                    info!(
                        "Rule {} unchanged since last load, skipping.",
                        rule.id
                    );
                    false
                }
                Ok(_) => true,
                Err(e) => {
                    warn!("Watermark check failed for rule {}: {:#?}", rule.id, e);
                    true
                }
            }
        })
    }

    async fn list_candidate_folders(&self, excluded: &[String]) -> HarvestResult<Vec<String>> {
        let mut slot = self.pool.get_connection().await?;
        let listed = slot.list_folders().await;
        self.pool.return_connection(slot).await;
        let excluded: HashSet<&str> = excluded.iter().map(String::as_str).collect();
        Ok(listed?
            .into_iter()
            .filter(|folder| !folder.no_select && !excluded.contains(folder.raw_name.as_str()))
            .map(|folder| folder.raw_name)
            .collect())
    }
}
