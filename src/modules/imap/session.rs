use crate::modules::error::code::ErrorCode;
use crate::modules::error::{HarvestError, HarvestResult};
use crate::raise_error;
use async_imap::types::{Fetch, Name, NameAttribute};
use async_imap::Session;
use futures::TryStreamExt;
use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use tokio::io::{AsyncRead, AsyncWrite, BufWriter};
use tokio_io_timeout::TimeoutStream;

pub trait SessionStream: AsyncRead + AsyncWrite + Unpin + Send + Sync + std::fmt::Debug {}

impl SessionStream for Box<dyn SessionStream> {}

impl<T: SessionStream> SessionStream for tokio_rustls::client::TlsStream<T> {}

impl<T: SessionStream> SessionStream for BufWriter<T> {}

impl<T: AsyncRead + AsyncWrite + Send + Sync + std::fmt::Debug> SessionStream
    for Pin<Box<TimeoutStream<T>>>
{
}

/// One folder as reported by LIST. `raw_name` is the wire form (possibly
/// modified UTF-7) and is what SELECT/EXAMINE must be given; decode only for
/// display.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct MailboxEntry {
    pub raw_name: String,
    pub no_select: bool,
}

/// The protocol surface the harvesting engine needs from one authenticated
/// session. Sessions are not multiplexable; callers own a session exclusively
/// while issuing commands. Fetches use peek mode and folder selection uses
/// EXAMINE, so no operation here alters server-side read/unread state.
pub trait MailSession: Send {
    fn list_folders(&mut self) -> impl Future<Output = HarvestResult<Vec<MailboxEntry>>> + Send;

    /// Read-only folder selection.
    fn examine(&mut self, folder: &str) -> impl Future<Output = HarvestResult<()>> + Send;

    /// Server-side UID SEARCH within the currently selected folder.
    fn uid_search(&mut self, query: &str)
        -> impl Future<Output = HarvestResult<HashSet<u32>>> + Send;

    /// `BODY.PEEK[HEADER]` for one message.
    fn uid_fetch_header(
        &mut self,
        uid: u32,
    ) -> impl Future<Output = HarvestResult<Option<Vec<u8>>>> + Send;

    /// `BODY.PEEK[]` for one message.
    fn uid_fetch_full(
        &mut self,
        uid: u32,
    ) -> impl Future<Output = HarvestResult<Option<Vec<u8>>>> + Send;

    fn logout(&mut self) -> impl Future<Output = HarvestResult<()>> + Send;
}

const HEADER_PEEK_QUERY: &str = "(UID BODY.PEEK[HEADER])";

const FULL_PEEK_QUERY: &str = "(UID BODY.PEEK[])";

fn map_imap_error(e: async_imap::error::Error) -> HarvestError {
    let code = match &e {
        async_imap::error::Error::Io(_) | async_imap::error::Error::ConnectionLost => {
            ErrorCode::NetworkError
        }
        _ => ErrorCode::ImapCommandFailed,
    };
    raise_error!(format!("{:#?}", e), code)
}

/// A live session against a real IMAP server.
#[derive(Debug)]
pub struct ImapMailSession {
    inner: Session<Box<dyn SessionStream>>,
}

impl ImapMailSession {
    pub fn new(inner: Session<Box<dyn SessionStream>>) -> Self {
        Self { inner }
    }

    async fn uid_fetch_section(
        &mut self,
        uid: u32,
        query: &str,
    ) -> HarvestResult<Option<Fetch>> {
        let list = self
            .inner
            .uid_fetch(uid.to_string(), query)
            .await
            .map_err(map_imap_error)?;
        let fetches = list
            .try_collect::<Vec<Fetch>>()
            .await
            .map_err(map_imap_error)?;
        // Servers may interleave unrelated untagged FETCH responses; keep the
        // one carrying the requested UID.
        Ok(fetches.into_iter().find(|f| f.uid == Some(uid)))
    }
}

impl MailSession for ImapMailSession {
    async fn list_folders(&mut self) -> HarvestResult<Vec<MailboxEntry>> {
        let list = self
            .inner
            .list(Some(""), Some("*"))
            .await
            .map_err(map_imap_error)?;
        let names = list.try_collect::<Vec<Name>>().await.map_err(map_imap_error)?;
        Ok(names
            .iter()
            .map(|name| MailboxEntry {
                raw_name: name.name().to_string(),
                no_select: name
                    .attributes()
                    .iter()
                    .any(|attr| matches!(attr, NameAttribute::NoSelect)),
            })
            .collect())
    }

    async fn examine(&mut self, folder: &str) -> HarvestResult<()> {
        self.inner.examine(folder).await.map_err(map_imap_error)?;
        Ok(())
    }

    async fn uid_search(&mut self, query: &str) -> HarvestResult<HashSet<u32>> {
        self.inner.uid_search(query).await.map_err(map_imap_error)
    }

    async fn uid_fetch_header(&mut self, uid: u32) -> HarvestResult<Option<Vec<u8>>> {
        let fetch = self.uid_fetch_section(uid, HEADER_PEEK_QUERY).await?;
        Ok(fetch.and_then(|f| f.header().map(|h| h.to_vec())))
    }

    async fn uid_fetch_full(&mut self, uid: u32) -> HarvestResult<Option<Vec<u8>>> {
        let fetch = self.uid_fetch_section(uid, FULL_PEEK_QUERY).await?;
        Ok(fetch.and_then(|f| f.body().map(|b| b.to_vec())))
    }

    async fn logout(&mut self) -> HarvestResult<()> {
        self.inner.logout().await.map_err(map_imap_error)
    }
}
