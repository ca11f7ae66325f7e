use crate::modules::error::code::ErrorCode;
use crate::modules::error::HarvestResult;
use crate::modules::imap::manager::SessionFactory;
use crate::modules::imap::retry::RetryPolicy;
use crate::modules::imap::session::MailSession;
use crate::modules::imap::slot::ConnectionSlot;
use crate::raise_error;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{debug, info};

struct IdleSession<S> {
    session: S,
    last_activity: Instant,
}

/// Bounded pool of authenticated IMAP sessions. At most `max_connections`
/// slots exist at once; `get_connection` blocks (async) when all are checked
/// out. Idle sessions are reused most-recently-returned-first and retired when
/// they have sat unused past the staleness window.
pub struct ConnectionPool<F: SessionFactory> {
    factory: Arc<F>,
    semaphore: Arc<Semaphore>,
    idle: Mutex<VecDeque<IdleSession<F::Session>>>,
    stale_after: Duration,
    retry: RetryPolicy,
    max_connections: usize,
    closed: AtomicBool,
}

impl<F: SessionFactory> ConnectionPool<F> {
    pub fn new(
        factory: F,
        max_connections: usize,
        stale_after: Duration,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            factory: Arc::new(factory),
            semaphore: Arc::new(Semaphore::new(max_connections)),
            idle: Mutex::new(VecDeque::new()),
            stale_after,
            retry,
            max_connections,
            closed: AtomicBool::new(false),
        }
    }

    pub fn max_connections(&self) -> usize {
        self.max_connections
    }

    /// Checks out a session, waiting for capacity if every slot is in use.
    /// Prefers a healthy idle session; stale idles found on the way are logged
    /// out and dropped.
    pub async fn get_connection(&self) -> HarvestResult<ConnectionSlot<F>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(raise_error!(
                "connection pool is closed".into(),
                ErrorCode::ConnectionPoolClosed
            ));
        }
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| {
                raise_error!(
                    "connection pool is closed".into(),
                    ErrorCode::ConnectionPoolClosed
                )
            })?;

        loop {
            let candidate = self.idle.lock().unwrap().pop_front();
            let Some(idle) = candidate else {
                break;
            };
            if idle.last_activity.elapsed() <= self.stale_after {
                debug!("Reusing idle IMAP session.");
                return Ok(ConnectionSlot::new(
                    idle.session,
                    self.factory.clone(),
                    self.retry,
                    permit,
                    idle.last_activity,
                ));
            }
            debug!("Retiring stale idle IMAP session.");
            let mut stale = idle.session;
            let _ = stale.logout().await;
        }

        let session = self.factory.connect().await?;
        debug!("Created new IMAP session.");
        Ok(ConnectionSlot::new(
            session,
            self.factory.clone(),
            self.retry,
            permit,
            Instant::now(),
        ))
    }

    /// Returns a session to the pool. Broken sessions are discarded, stale or
    /// post-shutdown ones are logged out; only healthy sessions re-enter the
    /// idle queue. The capacity permit is released in every case.
    pub async fn return_connection(&self, slot: ConnectionSlot<F>) {
        if slot.is_broken() {
            debug!("Discarding broken IMAP session.");
            drop(slot);
            return;
        }
        if slot.is_stale(self.stale_after) {
            slot.close().await;
            return;
        }
        let (session, last_activity, permit) = slot.into_idle();
        // The closed flag is re-checked under the idle lock so a concurrent
        // close_all either sees this session in the queue or we log it out
        // ourselves; it can never park in idle past shutdown.
        let rejected = {
            let mut idle = self.idle.lock().unwrap();
            if self.closed.load(Ordering::Acquire) {
                Some(session)
            } else {
                idle.push_front(IdleSession {
                    session,
                    last_activity,
                });
                None
            }
        };
        drop(permit);
        if let Some(mut session) = rejected {
            let _ = session.logout().await;
        }
    }

    /// Shuts the pool down: wakes every waiter with an error, rejects further
    /// checkouts and logs out all idle sessions. Sessions still checked out
    /// are logged out when their holders return them.
    pub async fn close_all(&self) {
        self.closed.store(true, Ordering::Release);
        self.semaphore.close();
        let drained: Vec<IdleSession<F::Session>> =
            self.idle.lock().unwrap().drain(..).collect();
        let count = drained.len();
        for idle in drained {
            let mut session = idle.session;
            let _ = session.logout().await;
        }
        info!("Connection pool closed, {} idle sessions logged out.", count);
    }
}
