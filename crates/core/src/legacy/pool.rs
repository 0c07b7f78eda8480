//! Bounded pool of reusable legacy sessions for read-only queries.
//!
//! Unlike the executor, pooled sessions have no thread affinity; any caller
//! may borrow one. Calls that mutate the legacy global state (opening a
//! database, switching company) must use the executor instead.

use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use super::session::{LegacySession, SessionFactory};
use crate::constants::{LEGACY_POOL_MAX, LEGACY_POOL_RETRY_MS};
use crate::errors::{Error, Result};

struct PoolEntry {
    id: u64,
    session: Box<dyn LegacySession>,
    last_used: Instant,
}

struct PoolState {
    idle: Vec<PoolEntry>,
    total: usize,
    next_id: u64,
    closed: bool,
}

/// Bounded pool of legacy sessions.
pub struct SessionPool {
    factory: Arc<dyn SessionFactory>,
    max_size: usize,
    state: Mutex<PoolState>,
}

impl SessionPool {
    pub fn new(factory: Arc<dyn SessionFactory>) -> Arc<Self> {
        Self::with_max_size(factory, LEGACY_POOL_MAX)
    }

    pub fn with_max_size(factory: Arc<dyn SessionFactory>, max_size: usize) -> Arc<Self> {
        Arc::new(Self {
            factory,
            max_size: max_size.max(1),
            state: Mutex::new(PoolState {
                idle: Vec::new(),
                total: 0,
                next_id: 1,
                closed: false,
            }),
        })
    }

    /// Borrows a session with a live database for `company_path`.
    ///
    /// Prefers an idle live handle; reopens a handle that lost its database
    /// (dropping it for a replacement when the reopen fails); grows the pool
    /// below `max_size`; otherwise backs off once (100 ms) before failing
    /// with [`Error::PoolExhausted`].
    pub fn acquire(self: &Arc<Self>, company_path: &str) -> Result<SessionGuard> {
        for attempt in 0..2 {
            if attempt > 0 {
                thread::sleep(Duration::from_millis(LEGACY_POOL_RETRY_MS));
            }
            match self.try_acquire(company_path)? {
                Some(guard) => return Ok(guard),
                None => continue,
            }
        }
        warn!("legacy pool exhausted ({} sessions in use)", self.max_size);
        Err(Error::PoolExhausted)
    }

    fn try_acquire(self: &Arc<Self>, company_path: &str) -> Result<Option<SessionGuard>> {
        let mut grown = None;
        {
            let mut state = self.state.lock().unwrap();
            if state.closed {
                return Err(Error::LegacyShutdown);
            }

            while let Some(mut entry) = state.idle.pop() {
                if entry.session.is_open() {
                    debug!("pool handing out session {}", entry.id);
                    return Ok(Some(SessionGuard {
                        pool: self.clone(),
                        entry: Some(entry),
                        suspect: false,
                    }));
                }
                // Lost its database; reopen in place, replace on failure.
                match entry.session.open_database(company_path) {
                    Ok(()) => {
                        debug!("pool reopened session {}", entry.id);
                        return Ok(Some(SessionGuard {
                            pool: self.clone(),
                            entry: Some(entry),
                            suspect: false,
                        }));
                    }
                    Err(e) => {
                        warn!("dropping dead pool session {}: {}", entry.id, e);
                        state.total -= 1;
                    }
                }
            }

            if state.total < self.max_size {
                state.total += 1;
                grown = Some(state.next_id);
                state.next_id += 1;
            }
        }

        let Some(id) = grown else {
            return Ok(None);
        };

        // Create outside the lock; creation may talk to the legacy host.
        match self.create_session(id, company_path) {
            Ok(entry) => Ok(Some(SessionGuard {
                pool: self.clone(),
                entry: Some(entry),
                suspect: false,
            })),
            Err(e) => {
                self.state.lock().unwrap().total -= 1;
                Err(e)
            }
        }
    }

    fn create_session(&self, id: u64, company_path: &str) -> Result<PoolEntry> {
        let mut session = self.factory.create()?;
        session.open_database(company_path)?;
        debug!("pool created session {}", id);
        Ok(PoolEntry {
            id,
            session,
            last_used: Instant::now(),
        })
    }

    fn release(&self, mut entry: PoolEntry, suspect: bool) {
        let mut state = self.state.lock().unwrap();
        if state.closed || suspect {
            // Suspect handles reconnect on their next acquisition.
            entry.session.close();
            state.total -= 1;
            return;
        }
        entry.last_used = Instant::now();
        state.idle.push(entry);
    }

    /// Closes idle sessions unused for longer than `max_idle`.
    pub fn sweep_idle(&self, max_idle: Duration) {
        let mut state = self.state.lock().unwrap();
        let before = state.idle.len();
        let mut kept = Vec::with_capacity(before);
        for mut entry in state.idle.drain(..) {
            if entry.last_used.elapsed() > max_idle {
                entry.session.close();
            } else {
                kept.push(entry);
            }
        }
        let closed = before - kept.len();
        state.total -= closed;
        state.idle = kept;
        if closed > 0 {
            info!("pool closed {} idle sessions", closed);
        }
    }

    /// Shuts the pool down. Outstanding guards close their sessions on drop.
    pub fn close_all(&self) {
        let mut state = self.state.lock().unwrap();
        state.closed = true;
        let drained = state.idle.len();
        for mut entry in state.idle.drain(..) {
            entry.session.close();
        }
        state.total -= drained;
        info!("legacy pool closed");
    }

    #[cfg(test)]
    fn counts(&self) -> (usize, usize) {
        let state = self.state.lock().unwrap();
        (state.idle.len(), state.total)
    }
}

/// Exclusive borrow of one pooled session; returns it on drop, on every exit
/// path including panics.
pub struct SessionGuard {
    pool: Arc<SessionPool>,
    entry: Option<PoolEntry>,
    suspect: bool,
}

impl SessionGuard {
    pub fn id(&self) -> u64 {
        self.entry.as_ref().map(|e| e.id).unwrap_or(0)
    }

    /// Marks the handle suspect (e.g. after a timeout): instead of returning
    /// to the idle set, it is closed so the next acquisition reconnects.
    pub fn mark_suspect(&mut self) {
        self.suspect = true;
    }
}

impl std::fmt::Debug for SessionGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionGuard")
            .field("id", &self.id())
            .field("suspect", &self.suspect)
            .finish()
    }
}

impl Deref for SessionGuard {
    type Target = dyn LegacySession;

    fn deref(&self) -> &Self::Target {
        self.entry
            .as_ref()
            .expect("guard still holds its session")
            .session
            .as_ref()
    }
}

impl DerefMut for SessionGuard {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.entry
            .as_mut()
            .expect("guard still holds its session")
            .session
            .as_mut()
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if let Some(entry) = self.entry.take() {
            self.pool.release(entry, self.suspect);
        }
    }
}
