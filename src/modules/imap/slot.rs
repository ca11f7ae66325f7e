use crate::modules::error::code::ErrorCode;
use crate::modules::error::HarvestResult;
use crate::modules::imap::manager::SessionFactory;
use crate::modules::imap::retry::RetryPolicy;
use crate::modules::imap::session::{MailSession, MailboxEntry};
use crate::raise_error;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::OwnedSemaphorePermit;
use tracing::warn;

/// One IMAP command together with everything needed to replay it on a fresh
/// session. Folder-scoped commands carry the folder name so the replay can
/// re-EXAMINE before re-issuing: a reconnected session starts with no folder
/// selected.
enum SessionCommand<'a> {
    ListFolders,
    SearchUids { folder: &'a str, query: &'a str },
    FetchHeader { folder: &'a str, uid: u32 },
    FetchFull { folder: &'a str, uid: u32 },
}

enum SessionReply {
    Folders(Vec<MailboxEntry>),
    Uids(HashSet<u32>),
    Bytes(Option<Vec<u8>>),
}

async fn dispatch<S: MailSession>(
    session: &mut S,
    command: &SessionCommand<'_>,
) -> HarvestResult<SessionReply> {
    match *command {
        SessionCommand::ListFolders => Ok(SessionReply::Folders(session.list_folders().await?)),
        SessionCommand::SearchUids { folder, query } => {
            session.examine(folder).await?;
            Ok(SessionReply::Uids(session.uid_search(query).await?))
        }
        SessionCommand::FetchHeader { folder, uid } => {
            session.examine(folder).await?;
            Ok(SessionReply::Bytes(session.uid_fetch_header(uid).await?))
        }
        SessionCommand::FetchFull { folder, uid } => {
            session.examine(folder).await?;
            Ok(SessionReply::Bytes(session.uid_fetch_full(uid).await?))
        }
    }
}

/// A checked-out pool entry: exclusive ownership of one live session plus the
/// capacity permit that was consumed to obtain it. All protocol traffic from
/// the scanning layers goes through the typed methods here, which gives every
/// command the same transparent reconnect-and-replay treatment.
pub struct ConnectionSlot<F: SessionFactory> {
    session: F::Session,
    factory: Arc<F>,
    retry: RetryPolicy,
    last_activity: Instant,
    broken: bool,
    _permit: OwnedSemaphorePermit,
}

impl<F: SessionFactory> ConnectionSlot<F> {
    pub(crate) fn new(
        session: F::Session,
        factory: Arc<F>,
        retry: RetryPolicy,
        permit: OwnedSemaphorePermit,
        last_activity: Instant,
    ) -> Self {
        Self {
            session,
            factory,
            retry,
            last_activity,
            broken: false,
            _permit: permit,
        }
    }

    async fn execute(&mut self, command: SessionCommand<'_>) -> HarvestResult<SessionReply> {
        let mut attempts_made = 0;
        loop {
            match dispatch(&mut self.session, &command).await {
                Ok(reply) => {
                    self.last_activity = Instant::now();
                    return Ok(reply);
                }
                Err(e) if self.retry.should_retry(&e, attempts_made) => {
                    attempts_made += 1;
                    warn!(
                        "Transport error on IMAP command, reconnecting (attempt {}): {:#?}",
                        attempts_made, e
                    );
                    match self.factory.connect().await {
                        Ok(fresh) => {
                            // Old session is dropped unclean; the server will
                            // reap it when the socket closes.
                            self.session = fresh;
                        }
                        Err(reconnect_err) => {
                            self.broken = true;
                            return Err(reconnect_err);
                        }
                    }
                }
                Err(e) => {
                    if e.is_transport() {
                        self.broken = true;
                    }
                    return Err(e);
                }
            }
        }
    }

    pub async fn list_folders(&mut self) -> HarvestResult<Vec<MailboxEntry>> {
        match self.execute(SessionCommand::ListFolders).await? {
            SessionReply::Folders(folders) => Ok(folders),
            _ => Err(raise_error!(
                "unexpected reply for LIST".into(),
                ErrorCode::ImapUnexpectedResult
            )),
        }
    }

    pub async fn search_uids(&mut self, folder: &str, query: &str) -> HarvestResult<HashSet<u32>> {
        match self
            .execute(SessionCommand::SearchUids { folder, query })
            .await?
        {
            SessionReply::Uids(uids) => Ok(uids),
            _ => Err(raise_error!(
                "unexpected reply for UID SEARCH".into(),
                ErrorCode::ImapUnexpectedResult
            )),
        }
    }

    pub async fn fetch_header(&mut self, folder: &str, uid: u32) -> HarvestResult<Option<Vec<u8>>> {
        match self
            .execute(SessionCommand::FetchHeader { folder, uid })
            .await?
        {
            SessionReply::Bytes(bytes) => Ok(bytes),
            _ => Err(raise_error!(
                "unexpected reply for header fetch".into(),
                ErrorCode::ImapUnexpectedResult
            )),
        }
    }

    pub async fn fetch_full(&mut self, folder: &str, uid: u32) -> HarvestResult<Option<Vec<u8>>> {
        match self
            .execute(SessionCommand::FetchFull { folder, uid })
            .await?
        {
            SessionReply::Bytes(bytes) => Ok(bytes),
            _ => Err(raise_error!(
                "unexpected reply for full fetch".into(),
                ErrorCode::ImapUnexpectedResult
            )),
        }
    }

    pub(crate) fn is_broken(&self) -> bool {
        self.broken
    }

    pub(crate) fn is_stale(&self, stale_after: Duration) -> bool {
        self.last_activity.elapsed() > stale_after
    }

    /// Polite teardown: LOGOUT then drop. Errors are swallowed because the
    /// slot is being discarded either way.
    pub(crate) async fn close(mut self) {
        let _ = self.session.logout().await;
    }

    pub(crate) fn into_idle(self) -> (F::Session, Instant, OwnedSemaphorePermit) {
        (self.session, self.last_activity, self._permit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::imap::fake::{FakeFactory, FakeServer};
    use tokio::sync::Semaphore;

    async fn checkout(server: &FakeServer) -> ConnectionSlot<FakeFactory> {
        let factory = Arc::new(FakeFactory::new(server.clone()));
        let permit = Arc::new(Semaphore::new(1)).acquire_owned().await.unwrap();
        let session = factory.connect().await.unwrap();
        ConnectionSlot::new(
            session,
            factory,
            RetryPolicy::default(),
            permit,
            Instant::now(),
        )
    }

    #[tokio::test]
    async fn replays_command_after_single_transport_failure() {
        let server = FakeServer::new();
        server.add_folder("INBOX", false);
        server.add_message("INBOX", 7, b"Subject: hello\r\n\r\n", b"full body");
        let mut slot = checkout(&server).await;

        server.fail_next_commands(1);
        let bytes = slot.fetch_header("INBOX", 7).await.unwrap();

        assert_eq!(bytes.unwrap(), b"Subject: hello\r\n\r\n");
        assert_eq!(server.connect_count(), 2);
        assert!(!slot.is_broken());
    }

    #[tokio::test]
    async fn replay_restores_folder_selection() {
        let server = FakeServer::new();
        server.add_folder("INBOX", false);
        server.add_message("INBOX", 1, b"h", b"f");
        let mut slot = checkout(&server).await;

        // Select INBOX through a successful command first, then force the
        // next fetch onto a fresh unselected session.
        slot.search_uids("INBOX", "ALL").await.unwrap();
        server.fail_next_commands(1);
        let bytes = slot.fetch_full("INBOX", 1).await.unwrap();

        assert_eq!(bytes.unwrap(), b"f");
    }

    #[tokio::test]
    async fn protocol_errors_surface_without_reconnect() {
        let server = FakeServer::new();
        server.add_folder("INBOX", false);
        let mut slot = checkout(&server).await;

        let err = slot.search_uids("NoSuchFolder", "ALL").await.unwrap_err();

        assert_eq!(err.code(), ErrorCode::ImapCommandFailed);
        assert_eq!(server.connect_count(), 1);
        assert!(!slot.is_broken());
    }

    #[tokio::test]
    async fn failed_reconnect_marks_slot_broken() {
        let server = FakeServer::new();
        server.add_folder("INBOX", false);
        let mut slot = checkout(&server).await;

        server.fail_next_commands(1);
        server.fail_next_connects(1);
        let err = slot.list_folders().await.unwrap_err();

        assert_eq!(err.code(), ErrorCode::NetworkError);
        assert!(slot.is_broken());
    }
}
