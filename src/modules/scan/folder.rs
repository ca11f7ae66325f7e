use crate::decode_mailbox_name;
use crate::modules::error::HarvestResult;
use crate::modules::imap::manager::SessionFactory;
use crate::modules::imap::pool::ConnectionPool;
use crate::modules::scan::processor::{EmailProcessor, HarvestedMessage};
use futures::StreamExt;
use std::collections::HashSet;
use tracing::info;

/// Scans one folder: lists candidate uids via server-side SEARCH, subtracts
/// the skip-list, then fans the remainder out to the per-message pipeline
/// with bounded concurrency.
pub struct FolderScanner<'a, F: SessionFactory> {
    pool: &'a ConnectionPool<F>,
    processor: &'a EmailProcessor<'a, F>,
    criteria: &'a str,
    skip_list: &'a HashSet<u32>,
    message_workers: usize,
}

impl<'a, F: SessionFactory> FolderScanner<'a, F> {
    pub fn new(
        pool: &'a ConnectionPool<F>,
        processor: &'a EmailProcessor<'a, F>,
        criteria: &'a str,
        skip_list: &'a HashSet<u32>,
        message_workers: usize,
    ) -> Self {
        Self {
            pool,
            processor,
            criteria,
            skip_list,
            message_workers,
        }
    }

    /// Read-only SEARCH with the orchestrator-supplied criteria, minus uids
    /// already ingested on earlier runs.
    pub async fn get_email_uids(&self, folder: &str) -> HarvestResult<Vec<u32>> {
        let mut slot = self.pool.get_connection().await?;
        let result = slot.search_uids(folder, self.criteria).await;
        self.pool.return_connection(slot).await;
        let mut uids: Vec<u32> = result?
            .into_iter()
            .filter(|uid| !self.skip_list.contains(uid))
            .collect();
        uids.sort_unstable();
        Ok(uids)
    }

    /// Results arrive in completion order; a failed message never aborts its
    /// siblings.
    pub async fn scan_folder(&self, folder: &str, uids: Vec<u32>) -> Vec<HarvestedMessage> {
        if uids.is_empty() {
            return Vec::new();
        }
        let harvested: Vec<HarvestedMessage> = futures::stream::iter(
            uids.into_iter()
                .map(|uid| self.processor.process(folder, uid)),
        )
        .buffer_unordered(self.message_workers)
        .filter_map(futures::future::ready)
        .collect()
        .await;
        info!(
            "Folder {} scan complete: {} messages harvested.",
            decode_mailbox_name!(folder.to_string()),
            harvested.len()
        );
        harvested
    }
}
