//! Scripted in-memory IMAP transport used by tests. Counts connects, logouts,
//! open sessions and per-section fetches, and can inject transport failures
//! to exercise the reconnect-and-replay path without a network.

use crate::modules::error::code::ErrorCode;
use crate::modules::error::HarvestResult;
use crate::modules::imap::manager::SessionFactory;
use crate::modules::imap::session::{MailSession, MailboxEntry};
use crate::raise_error;
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone)]
struct FakeMessage {
    header: Vec<u8>,
    full: Vec<u8>,
}

#[derive(Debug, Default)]
struct FakeState {
    folders: Vec<MailboxEntry>,
    messages: BTreeMap<String, BTreeMap<u32, FakeMessage>>,
    pending_command_faults: u32,
    pending_connect_faults: u32,
    broken_folders: Vec<String>,
    connects: usize,
    logouts: usize,
    open_sessions: usize,
    max_open_sessions: usize,
    header_fetches: usize,
    full_fetches: usize,
    search_queries: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct FakeServer {
    state: Arc<Mutex<FakeState>>,
}

impl FakeServer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_folder(&self, raw_name: &str, no_select: bool) {
        self.state.lock().unwrap().folders.push(MailboxEntry {
            raw_name: raw_name.to_string(),
            no_select,
        });
    }

    pub fn add_message(&self, folder: &str, uid: u32, header: &[u8], full: &[u8]) {
        self.state
            .lock()
            .unwrap()
            .messages
            .entry(folder.to_string())
            .or_default()
            .insert(
                uid,
                FakeMessage {
                    header: header.to_vec(),
                    full: full.to_vec(),
                },
            );
    }

    /// The next `count` session commands fail with a transport error.
    pub fn fail_next_commands(&self, count: u32) {
        self.state.lock().unwrap().pending_command_faults = count;
    }

    /// The next `count` connection attempts fail with a transport error.
    pub fn fail_next_connects(&self, count: u32) {
        self.state.lock().unwrap().pending_connect_faults = count;
    }

    /// EXAMINE on this folder returns a protocol error from now on.
    pub fn mark_folder_broken(&self, folder: &str) {
        self.state
            .lock()
            .unwrap()
            .broken_folders
            .push(folder.to_string());
    }

    /// Undoes `mark_folder_broken`.
    pub fn restore_folder(&self, folder: &str) {
        self.state
            .lock()
            .unwrap()
            .broken_folders
            .retain(|f| f != folder);
    }

    pub fn connect_count(&self) -> usize {
        self.state.lock().unwrap().connects
    }

    pub fn logout_count(&self) -> usize {
        self.state.lock().unwrap().logouts
    }

    pub fn open_sessions(&self) -> usize {
        self.state.lock().unwrap().open_sessions
    }

    pub fn max_open_sessions(&self) -> usize {
        self.state.lock().unwrap().max_open_sessions
    }

    pub fn header_fetch_count(&self) -> usize {
        self.state.lock().unwrap().header_fetches
    }

    pub fn full_fetch_count(&self) -> usize {
        self.state.lock().unwrap().full_fetches
    }

    pub fn search_queries(&self) -> Vec<String> {
        self.state.lock().unwrap().search_queries.clone()
    }

    fn take_command_fault(&self) -> HarvestResult<()> {
        let mut state = self.state.lock().unwrap();
        if state.pending_command_faults > 0 {
            state.pending_command_faults -= 1;
            return Err(raise_error!(
                "injected transport failure".into(),
                ErrorCode::NetworkError
            ));
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct FakeSession {
    server: FakeServer,
    selected: Option<String>,
}

impl Drop for FakeSession {
    fn drop(&mut self) {
        self.server.state.lock().unwrap().open_sessions -= 1;
    }
}

impl MailSession for FakeSession {
    async fn list_folders(&mut self) -> HarvestResult<Vec<MailboxEntry>> {
        self.server.take_command_fault()?;
        Ok(self.server.state.lock().unwrap().folders.clone())
    }

    async fn examine(&mut self, folder: &str) -> HarvestResult<()> {
        self.server.take_command_fault()?;
        let state = self.server.state.lock().unwrap();
        if state.broken_folders.iter().any(|f| f == folder) {
            return Err(raise_error!(
                format!("NO folder unavailable: {folder}"),
                ErrorCode::ImapCommandFailed
            ));
        }
        let known = state.folders.iter().any(|f| f.raw_name == folder)
            || state.messages.contains_key(folder);
        if !known {
            return Err(raise_error!(
                format!("NO no such folder: {folder}"),
                ErrorCode::ImapCommandFailed
            ));
        }
        drop(state);
        self.selected = Some(folder.to_string());
        Ok(())
    }

    async fn uid_search(&mut self, query: &str) -> HarvestResult<HashSet<u32>> {
        self.server.take_command_fault()?;
        let mut state = self.server.state.lock().unwrap();
        state.search_queries.push(query.to_string());
        let folder = self.selected.as_deref().ok_or_else(|| {
            raise_error!("no folder selected".into(), ErrorCode::ImapCommandFailed)
        })?;
        Ok(state
            .messages
            .get(folder)
            .map(|msgs| msgs.keys().copied().collect())
            .unwrap_or_default())
    }

    async fn uid_fetch_header(&mut self, uid: u32) -> HarvestResult<Option<Vec<u8>>> {
        self.server.take_command_fault()?;
        let mut state = self.server.state.lock().unwrap();
        state.header_fetches += 1;
        let folder = self.selected.as_deref().ok_or_else(|| {
            raise_error!("no folder selected".into(), ErrorCode::ImapCommandFailed)
        })?;
        Ok(state
            .messages
            .get(folder)
            .and_then(|msgs| msgs.get(&uid))
            .map(|m| m.header.clone()))
    }

    async fn uid_fetch_full(&mut self, uid: u32) -> HarvestResult<Option<Vec<u8>>> {
        self.server.take_command_fault()?;
        let mut state = self.server.state.lock().unwrap();
        state.full_fetches += 1;
        let folder = self.selected.as_deref().ok_or_else(|| {
            raise_error!("no folder selected".into(), ErrorCode::ImapCommandFailed)
        })?;
        Ok(state
            .messages
            .get(folder)
            .and_then(|msgs| msgs.get(&uid))
            .map(|m| m.full.clone()))
    }

    async fn logout(&mut self) -> HarvestResult<()> {
        self.server.state.lock().unwrap().logouts += 1;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct FakeFactory {
    server: FakeServer,
}

impl FakeFactory {
    pub fn new(server: FakeServer) -> Self {
        Self { server }
    }
}

impl SessionFactory for FakeFactory {
    type Session = FakeSession;

    async fn connect(&self) -> HarvestResult<FakeSession> {
        let mut state = self.server.state.lock().unwrap();
        if state.pending_connect_faults > 0 {
            state.pending_connect_faults -= 1;
            return Err(raise_error!(
                "injected connect failure".into(),
                ErrorCode::NetworkError
            ));
        }
        state.connects += 1;
        state.open_sessions += 1;
        state.max_open_sessions = state.max_open_sessions.max(state.open_sessions);
        drop(state);
        Ok(FakeSession {
            server: self.server.clone(),
            selected: None,
        })
    }
}
