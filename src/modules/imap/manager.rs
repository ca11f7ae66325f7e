use crate::modules::error::HarvestResult;
use crate::modules::imap::client::Client;
use crate::modules::imap::session::{ImapMailSession, MailSession};
use std::future::Future;
use tracing::error;

#[derive(Debug, Clone)]
pub struct ImapCredentials {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
}

/// Knows how to produce a fresh authenticated session. The pool and the
/// reconnect path both go through this, so tests can substitute a scripted
/// in-memory transport.
pub trait SessionFactory: Send + Sync + 'static {
    type Session: MailSession;

    fn connect(&self) -> impl Future<Output = HarvestResult<Self::Session>> + Send;
}

#[derive(Debug, Clone)]
pub struct ImapSessionManager {
    credentials: ImapCredentials,
}

impl ImapSessionManager {
    pub fn new(credentials: ImapCredentials) -> Self {
        Self { credentials }
    }
}

impl SessionFactory for ImapSessionManager {
    type Session = ImapMailSession;

    async fn connect(&self) -> HarvestResult<ImapMailSession> {
        let client = Client::connection(&self.credentials.host, self.credentials.port)
            .await
            .inspect_err(|e| {
                error!(
                    "Failed to connect to {}:{}: {:#?}",
                    self.credentials.host, self.credentials.port, e
                )
            })?;
        let session = client
            .login(&self.credentials.username, &self.credentials.password)
            .await
            .inspect_err(|e| {
                error!("IMAP login failed for {}: {:#?}", self.credentials.username, e)
            })?;
        Ok(ImapMailSession::new(session))
    }
}
