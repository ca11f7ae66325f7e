use crate::modules::error::HarvestResult;
use crate::modules::store::{AttachmentRecord, MessageRecord, MessageStore};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

/// In-process store, the default when no external database is wired in and
/// the backing for pipeline tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    messages: HashMap<u32, MessageRecord>,
    attachments: HashMap<u32, Vec<AttachmentRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn message_count(&self) -> usize {
        self.inner.lock().unwrap().messages.len()
    }

    pub fn message(&self, uid: u32) -> Option<MessageRecord> {
        self.inner.lock().unwrap().messages.get(&uid).cloned()
    }

    pub fn attachments_for(&self, uid: u32) -> Vec<AttachmentRecord> {
        self.inner
            .lock()
            .unwrap()
            .attachments
            .get(&uid)
            .cloned()
            .unwrap_or_default()
    }

    pub fn attachment_count(&self) -> usize {
        self.inner.lock().unwrap().attachments.values().map(Vec::len).sum()
    }
}

impl MessageStore for MemoryStore {
    fn upsert_message(&self, record: MessageRecord) -> HarvestResult<()> {
        self.inner.lock().unwrap().messages.insert(record.uid, record);
        Ok(())
    }

    fn replace_attachments(&self, uid: u32, records: Vec<AttachmentRecord>) -> HarvestResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.attachments.remove(&uid);
        if !records.is_empty() {
            inner.attachments.insert(uid, records);
        }
        Ok(())
    }

    fn ingested_uids(&self) -> HarvestResult<HashSet<u32>> {
        Ok(self.inner.lock().unwrap().messages.keys().copied().collect())
    }
}
