//! The dedicated-thread executor for thread-affine legacy calls.
//!
//! The legacy automation object must only ever be touched from the OS thread
//! that created it. One worker thread therefore owns the session for the
//! process lifetime; callers submit closures over a bounded queue and block
//! on a oneshot reply, in the same job-plus-reply shape as the SQLite write
//! actor.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use log::{error, info, warn};
use tokio::sync::{mpsc, oneshot};

use super::session::{LegacySession, SessionFactory};
use crate::constants::LEGACY_QUEUE_DEPTH;
use crate::errors::{Error, Result};

type Job = Box<dyn FnOnce(&mut dyn LegacySession) -> Result<Box<dyn Any + Send>> + Send + 'static>;

enum Request {
    Work {
        company_path: String,
        job: Job,
        reply: oneshot::Sender<Result<Box<dyn Any + Send>>>,
    },
    Shutdown {
        done: oneshot::Sender<()>,
    },
}

/// Handle for submitting work to the legacy thread.
#[derive(Clone)]
pub struct LegacyExecutor {
    tx: mpsc::Sender<Request>,
    /// Set after a timeout; the worker rebuilds its session before the next
    /// request.
    reset: Arc<AtomicBool>,
}

impl LegacyExecutor {
    /// Spawns the worker thread. The session is created lazily on the first
    /// request so a missing legacy host does not fail process startup.
    pub fn spawn(factory: Arc<dyn SessionFactory>) -> Self {
        let (tx, rx) = mpsc::channel::<Request>(LEGACY_QUEUE_DEPTH);
        let reset = Arc::new(AtomicBool::new(false));

        let worker_reset = reset.clone();
        thread::Builder::new()
            .name("legacy-com".to_string())
            .spawn(move || run_loop(factory, rx, worker_reset))
            .expect("failed to spawn the legacy executor thread");

        Self { tx, reset }
    }

    /// Runs `work` against the session on the legacy thread, switching the
    /// open database to `company_path` first when needed. Blocks the caller
    /// until the reply arrives.
    ///
    /// A call that fails with [`Error::LegacyUnavailable`] is retried once;
    /// the worker drops its session on that error, so the retry runs against
    /// a fresh handle.
    pub async fn execute<F, T>(&self, company_path: &str, work: F) -> Result<T>
    where
        F: Fn(&mut dyn LegacySession) -> Result<T> + Send + Sync + 'static,
        T: Send + 'static + Any,
    {
        let work = Arc::new(work);
        match self.execute_once(company_path, work.clone()).await {
            Err(Error::LegacyUnavailable(first)) => {
                warn!(
                    "legacy call failed ({}), retrying once on a fresh session",
                    first
                );
                self.execute_once(company_path, work).await
            }
            other => other,
        }
    }

    async fn execute_once<F, T>(&self, company_path: &str, work: Arc<F>) -> Result<T>
    where
        F: Fn(&mut dyn LegacySession) -> Result<T> + Send + Sync + 'static,
        T: Send + 'static + Any,
    {
        let (reply_tx, reply_rx) = oneshot::channel();

        let job: Job = Box::new(move |session| {
            (*work)(session).map(|v| Box::new(v) as Box<dyn Any + Send>)
        });

        self.tx
            .send(Request::Work {
                company_path: company_path.to_string(),
                job,
                reply: reply_tx,
            })
            .await
            .map_err(|_| Error::LegacyShutdown)?;

        reply_rx
            .await
            .map_err(|_| Error::LegacyUnavailable("executor dropped the reply".to_string()))?
            .map(|boxed| {
                *boxed
                    .downcast::<T>()
                    .unwrap_or_else(|_| panic!("legacy executor reply had the wrong type"))
            })
    }

    /// Like [`LegacyExecutor::execute`], bounded by an operation timeout.
    ///
    /// The in-flight call cannot be interrupted; on timeout the caller gets
    /// [`Error::LegacyUnavailable`] and the worker rebuilds its session
    /// before the next request, since the handle is suspect.
    pub async fn execute_with_timeout<F, T>(
        &self,
        company_path: &str,
        timeout: std::time::Duration,
        work: F,
    ) -> Result<T>
    where
        F: Fn(&mut dyn LegacySession) -> Result<T> + Send + Sync + 'static,
        T: Send + 'static + Any,
    {
        match tokio::time::timeout(timeout, self.execute(company_path, work)).await {
            Ok(result) => result,
            Err(_) => {
                warn!("legacy call timed out after {:?}", timeout);
                self.reset.store(true, Ordering::SeqCst);
                Err(Error::LegacyUnavailable(format!(
                    "legacy call timed out after {:?}",
                    timeout
                )))
            }
        }
    }

    /// Stops the worker: in-flight work completes, queued requests are
    /// drained with [`Error::LegacyShutdown`], the session is closed.
    pub async fn shutdown(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self
            .tx
            .send(Request::Shutdown { done: done_tx })
            .await
            .is_ok()
        {
            let _ = done_rx.await;
        }
    }
}

fn run_loop(
    factory: Arc<dyn SessionFactory>,
    mut rx: mpsc::Receiver<Request>,
    reset: Arc<AtomicBool>,
) {
    let mut session: Option<Box<dyn LegacySession>> = None;
    let mut current_company: Option<String> = None;

    while let Some(request) = rx.blocking_recv() {
        match request {
            Request::Work {
                company_path,
                job,
                reply,
            } => {
                if reset.swap(false, Ordering::SeqCst) {
                    if let Some(mut suspect) = session.take() {
                        suspect.close();
                    }
                    current_company = None;
                }
                let result = run_job(
                    factory.as_ref(),
                    &mut session,
                    &mut current_company,
                    &company_path,
                    job,
                );
                if matches!(result, Err(Error::LegacyUnavailable(_))) {
                    // The handle is suspect; rebuild it for the next request.
                    if let Some(mut dead) = session.take() {
                        dead.close();
                    }
                    current_company = None;
                }
                let _ = reply.send(result);
            }
            Request::Shutdown { done } => {
                rx.close();
                while let Ok(request) = rx.try_recv() {
                    if let Request::Work { reply, .. } = request {
                        let _ = reply.send(Err(Error::LegacyShutdown));
                    }
                }
                if let Some(mut live) = session.take() {
                    live.close();
                }
                info!("legacy executor stopped");
                let _ = done.send(());
                return;
            }
        }
    }
}

fn run_job(
    factory: &dyn SessionFactory,
    session: &mut Option<Box<dyn LegacySession>>,
    current_company: &mut Option<String>,
    company_path: &str,
    job: Job,
) -> Result<Box<dyn Any + Send>> {
    if session.as_ref().map(|s| !s.is_open()).unwrap_or(false) && current_company.is_some() {
        // Handle lost its database since the last call.
        if let Some(mut dead) = session.take() {
            dead.close();
        }
        *current_company = None;
    }

    if session.is_none() {
        *session = Some(
            factory
                .create()
                .map_err(|e| Error::LegacyUnavailable(e.to_string()))?,
        );
        *current_company = None;
    }
    let live = session.as_mut().expect("session initialized above");

    if current_company.as_deref() != Some(company_path) {
        if current_company.is_some() {
            live.close();
        }
        live.open_database(company_path)
            .map_err(|e| Error::LegacyUnavailable(e.to_string()))?;
        *current_company = Some(company_path.to_string());
    }

    match catch_unwind(AssertUnwindSafe(|| job(live.as_mut()))) {
        Ok(result) => result,
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            error!("legacy call panicked: {}", message);
            Err(Error::LegacyUnavailable(format!(
                "legacy call panicked: {}",
                message
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Session that records which thread and company it is driven on.
    struct ProbeSession {
        open: Option<String>,
        log: Arc<Mutex<Vec<String>>>,
        thread: Arc<Mutex<Option<thread::ThreadId>>>,
    }

    impl LegacySession for ProbeSession {
        fn open_database(&mut self, company_path: &str) -> Result<()> {
            let mut pinned = self.thread.lock().unwrap();
            let current = thread::current().id();
            if let Some(expected) = *pinned {
                assert_eq!(expected, current, "session touched from a second thread");
            } else {
                *pinned = Some(current);
            }
            self.log.lock().unwrap().push(format!("open:{}", company_path));
            self.open = Some(company_path.to_string());
            Ok(())
        }

        fn is_open(&self) -> bool {
            self.open.is_some()
        }

        fn current_database(&self) -> Option<String> {
            self.open.clone()
        }

        fn eval(&mut self, expression: &str) -> Result<String> {
            self.log.lock().unwrap().push(format!("eval:{}", expression));
            Ok(expression.to_uppercase())
        }

        fn close(&mut self) {
            self.log.lock().unwrap().push("close".to_string());
            self.open = None;
        }
    }

    struct ProbeFactory {
        log: Arc<Mutex<Vec<String>>>,
        thread: Arc<Mutex<Option<thread::ThreadId>>>,
        created: AtomicUsize,
    }

    impl SessionFactory for ProbeFactory {
        fn create(&self) -> Result<Box<dyn LegacySession>> {
            self.created.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(ProbeSession {
                open: None,
                log: self.log.clone(),
                thread: self.thread.clone(),
            }))
        }
    }

    fn probe() -> (Arc<ProbeFactory>, Arc<Mutex<Vec<String>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let factory = Arc::new(ProbeFactory {
            log: log.clone(),
            thread: Arc::new(Mutex::new(None)),
            created: AtomicUsize::new(0),
        });
        (factory, log)
    }

    #[tokio::test]
    async fn work_runs_on_one_pinned_thread_and_switches_companies() {
        let (factory, log) = probe();
        let executor = LegacyExecutor::spawn(factory);

        let a = executor
            .execute("acme", |s: &mut dyn LegacySession| s.eval("ping"))
            .await
            .unwrap();
        assert_eq!(a, "PING");

        executor
            .execute("acme", |s: &mut dyn LegacySession| s.eval("again"))
            .await
            .unwrap();
        executor
            .execute("basin", |s: &mut dyn LegacySession| s.eval("other"))
            .await
            .unwrap();

        let entries = log.lock().unwrap().clone();
        // Same company does not reopen; a different one closes and reopens.
        assert_eq!(
            entries,
            vec![
                "open:acme",
                "eval:ping",
                "eval:again",
                "close",
                "open:basin",
                "eval:other"
            ]
        );
    }

    #[tokio::test]
    async fn panics_in_work_are_contained_and_the_session_is_rebuilt() {
        let (factory, _log) = probe();
        let created = factory.created.load(Ordering::SeqCst);
        assert_eq!(created, 0);
        let executor = LegacyExecutor::spawn(factory.clone());

        let err = executor
            .execute("acme", |_s: &mut dyn LegacySession| -> Result<()> {
                panic!("boom")
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::LegacyUnavailable(_)));

        // Still serving afterwards.
        let pong = executor
            .execute("acme", |s: &mut dyn LegacySession| s.eval("pong"))
            .await
            .unwrap();
        assert_eq!(pong, "PONG");
        assert!(factory.created.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn shutdown_rejects_later_requests() {
        let (factory, _log) = probe();
        let executor = LegacyExecutor::spawn(factory);

        executor
            .execute("acme", |s: &mut dyn LegacySession| s.eval("ping"))
            .await
            .unwrap();
        executor.shutdown().await;

        let err = executor
            .execute("acme", |s: &mut dyn LegacySession| s.eval("late"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::LegacyShutdown | Error::LegacyUnavailable(_)
        ));
    }
}
