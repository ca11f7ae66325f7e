use crate::modules::error::code::ErrorCode;
use crate::modules::error::HarvestResult;
use crate::modules::imap::manager::SessionFactory;
use crate::modules::imap::pool::ConnectionPool;
use crate::modules::imap::slot::ConnectionSlot;
use crate::modules::mime::{parse_full, parse_header};
use crate::modules::rules::{is_spreadsheet_file, RuleScope};
use crate::modules::scan::download::AttachmentWriter;
use crate::modules::scan::progress::ProgressTracker;
use crate::modules::store::{AttachmentRecord, MessageRecord, MessageStore};
use crate::modules::utils::sanitize_filename;
use crate::raise_error;
use std::path::PathBuf;
use tracing::{debug, warn};

/// One successfully harvested message: the rule matched and at least one
/// approved attachment landed on disk.
#[derive(Debug, Clone)]
pub struct HarvestedMessage {
    pub uid: u32,
    pub folder: String,
    pub subject: String,
    pub downloaded: Vec<PathBuf>,
}

/// Per-message two-phase pipeline: cheap header fetch and rule filter first,
/// full-content fetch and attachment download only on a pass. Each call
/// checks a session out of the shared pool and returns it before reporting.
pub struct EmailProcessor<'a, F: SessionFactory> {
    pool: &'a ConnectionPool<F>,
    scope: &'a RuleScope,
    store: &'a dyn MessageStore,
    writer: &'a AttachmentWriter,
    progress: &'a ProgressTracker,
}

impl<'a, F: SessionFactory> EmailProcessor<'a, F> {
    pub fn new(
        pool: &'a ConnectionPool<F>,
        scope: &'a RuleScope,
        store: &'a dyn MessageStore,
        writer: &'a AttachmentWriter,
        progress: &'a ProgressTracker,
    ) -> Self {
        Self {
            pool,
            scope,
            store,
            writer,
            progress,
        }
    }

    /// Never propagates an error: every failure mode degrades to a counted
    /// failure so sibling messages and folders keep running.
    pub async fn process(&self, folder: &str, uid: u32) -> Option<HarvestedMessage> {
        let mut slot = match self.pool.get_connection().await {
            Ok(slot) => slot,
            Err(e) => {
                warn!("Could not obtain a session for message {}: {:#?}", uid, e);
                self.progress.increment_processed(false);
                return None;
            }
        };
        let result = self.run(&mut slot, folder, uid).await;
        self.pool.return_connection(slot).await;
        match result {
            Ok(Some(harvested)) => {
                self.progress.increment_processed(true);
                Some(harvested)
            }
            Ok(None) => {
                self.progress.increment_processed(false);
                None
            }
            Err(e) => {
                warn!(
                    "Failed to process message {} in folder {}: {:#?}",
                    uid, folder, e
                );
                self.progress.increment_processed(false);
                None
            }
        }
    }

    async fn run(
        &self,
        slot: &mut ConnectionSlot<F>,
        folder: &str,
        uid: u32,
    ) -> HarvestResult<Option<HarvestedMessage>> {
        // Phase 1: headers only.
        let header = slot.fetch_header(folder, uid).await?.ok_or_else(|| {
            raise_error!(
                format!("Message {uid} returned no header section"),
                ErrorCode::ImapUnexpectedResult
            )
        })?;
        let snapshot = parse_header(&header)?;
        let matched = self
            .scope
            .evaluate_header(&snapshot.sender_email, &snapshot.subject);

        // Record the message before anything expensive so it is never
        // re-evaluated on a later run, even if phase 2 fails.
        self.store.upsert_message(MessageRecord {
            uid,
            folder: folder.to_string(),
            sender: snapshot.sender_email.clone(),
            subject: snapshot.subject.clone(),
            date: snapshot.date,
            vendor_id: matched.map(|rule| rule.vendor_id),
        })?;

        let Some(rule) = matched else {
            return Ok(None);
        };
        debug!(
            "Message {} in {} matched rule {}, fetching full content.",
            uid, folder, rule.id
        );

        // Phase 2: full content.
        let full = slot.fetch_full(folder, uid).await?.ok_or_else(|| {
            raise_error!(
                format!("Message {uid} returned no body section"),
                ErrorCode::ImapUnexpectedResult
            )
        })?;
        let content = parse_full(&full)?;

        let mut downloaded = Vec::new();
        let mut records = Vec::new();
        for attachment in content
            .attachments
            .iter()
            .filter(|a| is_spreadsheet_file(&a.filename))
        {
            let clean = sanitize_filename(&attachment.filename);
            if !rule.attachment_approved(&clean) {
                continue;
            }
            match self
                .writer
                .write(rule.vendor_id, &attachment.filename, &attachment.data)
            {
                Ok(path) => {
                    records.push(AttachmentRecord {
                        uid,
                        original_filename: attachment.filename.clone(),
                        storage_path: path.clone(),
                        size: attachment.size() as u64,
                    });
                    downloaded.push(path);
                }
                Err(e) => {
                    warn!(
                        "Skipping attachment {} of message {}: {:#?}",
                        attachment.filename, uid, e
                    );
                }
            }
        }

        if downloaded.is_empty() {
            debug!("Message {} has no approved spreadsheet attachments.", uid);
            return Ok(None);
        }
        self.store.replace_attachments(uid, records)?;
        Ok(Some(HarvestedMessage {
            uid,
            folder: folder.to_string(),
            subject: snapshot.subject,
            downloaded,
        }))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::modules::imap::fake::{FakeFactory, FakeServer};
    use crate::modules::imap::retry::RetryPolicy;
    use crate::modules::rules::{IngestionRule, Vendor};
    use crate::modules::store::memory::MemoryStore;
    use std::time::Duration;

    pub(crate) fn header_bytes(from: &str, subject: &str) -> Vec<u8> {
        format!(
            "From: {from}\r\nSubject: {subject}\r\nDate: Mon, 3 Nov 2025 10:15:00 +0300\r\n\r\n"
        )
        .into_bytes()
    }

    pub(crate) fn full_bytes(from: &str, subject: &str, attachment: Option<&str>) -> Vec<u8> {
        let mut msg = format!(
            "From: {from}\r\nSubject: {subject}\r\nDate: Mon, 3 Nov 2025 10:15:00 +0300\r\n\
MIME-Version: 1.0\r\nContent-Type: multipart/mixed; boundary=\"sep\"\r\n\r\n\
--sep\r\nContent-Type: text/plain; charset=utf-8\r\n\r\nsee attached\r\n"
        );
        if let Some(filename) = attachment {
            msg.push_str(&format!(
                "--sep\r\nContent-Type: application/octet-stream; name=\"{filename}\"\r\n\
Content-Disposition: attachment; filename=\"{filename}\"\r\n\
Content-Transfer-Encoding: base64\r\n\r\nAAECAw==\r\n"
            ));
        }
        msg.push_str("--sep--\r\n");
        msg.into_bytes()
    }

    pub(crate) fn price_rule() -> IngestionRule {
        IngestionRule {
            id: 1,
            vendor_id: 7,
            senders: "vendor@x.com".to_string(),
            subject_contains: Some("price".to_string()),
            subject_excludes: None,
            filename_contains: None,
            filename_excludes: None,
            extensions: None,
            active: true,
        }
    }

    pub(crate) fn scope_with(rule: IngestionRule) -> RuleScope {
        let vendor = Vendor {
            id: rule.vendor_id,
            name: "Vendor X".to_string(),
            active: true,
            last_load: None,
        };
        RuleScope::new(vec![vendor], vec![rule])
    }

    struct Fixture {
        server: FakeServer,
        pool: ConnectionPool<FakeFactory>,
        scope: RuleScope,
        store: MemoryStore,
        writer: AttachmentWriter,
        progress: ProgressTracker,
        _dir: tempfile::TempDir,
    }

    impl Fixture {
        fn new(scope: RuleScope) -> Self {
            let server = FakeServer::new();
            server.add_folder("INBOX", false);
            let dir = tempfile::tempdir().unwrap();
            Self {
                pool: ConnectionPool::new(
                    FakeFactory::new(server.clone()),
                    2,
                    Duration::from_secs(300),
                    RetryPolicy::default(),
                ),
                server,
                scope,
                store: MemoryStore::new(),
                writer: AttachmentWriter::new(dir.path().to_path_buf()),
                progress: ProgressTracker::new(),
                _dir: dir,
            }
        }

        fn processor(&self) -> EmailProcessor<'_, FakeFactory> {
            EmailProcessor::new(
                &self.pool,
                &self.scope,
                &self.store,
                &self.writer,
                &self.progress,
            )
        }
    }

    #[tokio::test]
    async fn unmatched_sender_never_triggers_full_fetch() {
        let fixture = Fixture::new(scope_with(price_rule()));
        fixture.server.add_message(
            "INBOX",
            1,
            &header_bytes("stranger@y.com", "price list"),
            &full_bytes("stranger@y.com", "price list", Some("list.xlsx")),
        );

        let outcome = fixture.processor().process("INBOX", 1).await;

        assert!(outcome.is_none());
        assert_eq!(fixture.server.header_fetch_count(), 1);
        assert_eq!(fixture.server.full_fetch_count(), 0);
        // The message is still recorded so it joins the skip-list.
        assert!(fixture.store.message(1).is_some());
    }

    #[tokio::test]
    async fn price_list_scenario_ingests_only_the_matching_message() {
        let fixture = Fixture::new(scope_with(price_rule()));
        fixture.server.add_message(
            "INBOX",
            1,
            &header_bytes("vendor@x.com", "Price list November"),
            &full_bytes("vendor@x.com", "Price list November", Some("list.xlsx")),
        );
        fixture.server.add_message(
            "INBOX",
            2,
            &header_bytes("vendor@x.com", "Meeting notes"),
            &full_bytes("vendor@x.com", "Meeting notes", None),
        );

        let processor = fixture.processor();
        let first = processor.process("INBOX", 1).await;
        let second = processor.process("INBOX", 2).await;

        let harvested = first.expect("price-list message should be ingested");
        assert_eq!(harvested.downloaded.len(), 1);
        assert!(second.is_none());
        assert_eq!(fixture.store.attachment_count(), 1);
        assert_eq!(fixture.store.message_count(), 2);
    }

    #[tokio::test]
    async fn fully_filtered_attachments_write_nothing() {
        let mut rule = price_rule();
        rule.filename_excludes = Some("list".to_string());
        let fixture = Fixture::new(scope_with(rule));
        fixture.server.add_message(
            "INBOX",
            1,
            &header_bytes("vendor@x.com", "price update"),
            &full_bytes("vendor@x.com", "price update", Some("list.xlsx")),
        );

        let outcome = fixture.processor().process("INBOX", 1).await;

        assert!(outcome.is_none());
        assert_eq!(fixture.server.full_fetch_count(), 1);
        assert_eq!(fixture.store.attachment_count(), 0);
        let vendor_dir = fixture._dir.path().join("7");
        assert!(!vendor_dir.exists() || vendor_dir.read_dir().unwrap().next().is_none());
    }

    #[tokio::test]
    async fn non_spreadsheet_attachments_are_ignored() {
        let fixture = Fixture::new(scope_with(price_rule()));
        fixture.server.add_message(
            "INBOX",
            1,
            &header_bytes("vendor@x.com", "price update"),
            &full_bytes("vendor@x.com", "price update", Some("scan.pdf")),
        );

        let outcome = fixture.processor().process("INBOX", 1).await;

        assert!(outcome.is_none());
        assert_eq!(fixture.store.attachment_count(), 0);
    }

    #[tokio::test]
    async fn reprocessing_replaces_the_attachment_set() {
        let fixture = Fixture::new(scope_with(price_rule()));
        fixture.server.add_message(
            "INBOX",
            1,
            &header_bytes("vendor@x.com", "price list"),
            &full_bytes("vendor@x.com", "price list", Some("list.xlsx")),
        );

        let processor = fixture.processor();
        processor.process("INBOX", 1).await.unwrap();
        // Crash-and-retry: the same message goes through the pipeline again.
        let second = processor.process("INBOX", 1).await.unwrap();

        // Records reflect the second run only, never a union of both runs.
        let records = fixture.store.attachments_for(1);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].storage_path, second.downloaded[0]);
    }

    #[tokio::test]
    async fn transport_failure_recovers_with_one_reconnect_and_no_duplicates() {
        let fixture = Fixture::new(scope_with(price_rule()));
        fixture.server.add_message(
            "INBOX",
            1,
            &header_bytes("vendor@x.com", "price list"),
            &full_bytes("vendor@x.com", "price list", Some("list.xlsx")),
        );

        fixture.server.fail_next_commands(1);
        let outcome = fixture.processor().process("INBOX", 1).await;

        assert!(outcome.is_some());
        assert_eq!(fixture.server.connect_count(), 2);
        let vendor_dir = fixture._dir.path().join("7");
        assert_eq!(vendor_dir.read_dir().unwrap().count(), 1);
        assert_eq!(fixture.store.attachment_count(), 1);
    }

    #[tokio::test]
    async fn second_consecutive_failure_is_a_counted_failure() {
        let fixture = Fixture::new(scope_with(price_rule()));
        fixture.server.add_message(
            "INBOX",
            1,
            &header_bytes("vendor@x.com", "price list"),
            &full_bytes("vendor@x.com", "price list", Some("list.xlsx")),
        );

        fixture.server.fail_next_commands(2);
        let outcome = fixture.processor().process("INBOX", 1).await;

        assert!(outcome.is_none());
        assert_eq!(fixture.progress.summary().failed, 1);
        assert_eq!(fixture.store.attachment_count(), 0);
    }
}
