//! Bounded worker pool
//!
//! Jobs are spawned on the tokio runtime immediately but only run while
//! holding one of `capacity` semaphore permits, so at most `capacity` jobs
//! make progress at a time and the rest wait in FIFO order. Outcomes are
//! sent on an unbounded channel to whoever owns the pool.
//!
//! `terminate_all` cancels every queued and running job. A cancelled job
//! never sends an outcome.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rk_tunnel::TunnelError;
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Default number of concurrent workers
pub const DEFAULT_MAX_WORKERS: usize = 5;

/// Identifier of a submitted job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(u64);

impl JobId {
    /// Raw numeric id
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job-{}", self.0)
    }
}

/// Result of a finished job
#[derive(Debug)]
pub struct JobOutcome<T> {
    /// Job that produced the result
    pub id: JobId,
    /// The job's output or error
    pub result: Result<T, TunnelError>,
}

/// Decrements a counter when dropped
struct CountGuard(Arc<AtomicUsize>);

impl CountGuard {
    fn enter(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(counter))
    }
}

impl Drop for CountGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Runs jobs with bounded concurrency
pub struct WorkerPool<T> {
    capacity: usize,
    permits: Arc<Semaphore>,
    next_id: AtomicU64,
    cancel: Mutex<CancellationToken>,
    tracker: TaskTracker,
    queued: Arc<AtomicUsize>,
    running: Arc<AtomicUsize>,
    timeout: Option<Duration>,
    outcomes: mpsc::UnboundedSender<JobOutcome<T>>,
}

impl<T: Send + 'static> WorkerPool<T> {
    /// Create a pool running at most `capacity` jobs at once.
    ///
    /// A capacity of zero is treated as one.
    pub fn new(capacity: usize, outcomes: mpsc::UnboundedSender<JobOutcome<T>>) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            permits: Arc::new(Semaphore::new(capacity)),
            next_id: AtomicU64::new(1),
            cancel: Mutex::new(CancellationToken::new()),
            tracker: TaskTracker::new(),
            queued: Arc::new(AtomicUsize::new(0)),
            running: Arc::new(AtomicUsize::new(0)),
            timeout: None,
            outcomes,
        }
    }

    /// Fail jobs that run longer than `timeout` with [`TunnelError::TimedOut`]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Maximum number of concurrently running jobs
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Jobs waiting for a free slot
    pub fn queued(&self) -> usize {
        self.queued.load(Ordering::SeqCst)
    }

    /// Jobs currently running
    pub fn running(&self) -> usize {
        self.running.load(Ordering::SeqCst)
    }

    /// Allocate the id of a job that will be started with [`WorkerPool::start`].
    ///
    /// Lets the caller record bookkeeping for the job before it can
    /// possibly finish.
    pub fn reserve(&self) -> JobId {
        JobId(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    /// Start a job under a previously reserved id
    pub fn start<F>(&self, id: JobId, work: F)
    where
        F: Future<Output = Result<T, TunnelError>> + Send + 'static,
    {
        let cancel = self.current_token();
        let permits = Arc::clone(&self.permits);
        let queued = CountGuard::enter(&self.queued);
        let running_counter = Arc::clone(&self.running);
        let timeout = self.timeout;
        let outcomes = self.outcomes.clone();

        self.tracker.spawn(async move {
            let permit = tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!("{} cancelled while queued", id);
                    return;
                }
                permit = permits.acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => return,
                },
            };
            drop(queued);
            let running = CountGuard::enter(&running_counter);
            tracing::debug!("{} started", id);

            let result = tokio::select! {
                _ = cancel.cancelled() => None,
                result = run_with_timeout(work, timeout) => Some(result),
            };

            drop(running);
            drop(permit);

            match result {
                Some(result) if !cancel.is_cancelled() => {
                    if outcomes.send(JobOutcome { id, result }).is_err() {
                        tracing::debug!("{} finished but nobody is listening", id);
                    }
                }
                _ => tracing::debug!("{} cancelled while running", id),
            }
        });
    }

    /// Reserve an id and start the job in one step
    pub fn submit<F>(&self, work: F) -> JobId
    where
        F: Future<Output = Result<T, TunnelError>> + Send + 'static,
    {
        let id = self.reserve();
        self.start(id, work);
        id
    }

    /// Cancel every queued and running job.
    ///
    /// Jobs submitted afterwards run normally.
    pub fn terminate_all(&self) {
        let mut cancel = self.cancel.lock().unwrap_or_else(|e| e.into_inner());
        cancel.cancel();
        *cancel = CancellationToken::new();
        tracing::debug!("Terminated all workers");
    }

    /// Wait until every spawned job task has exited
    pub async fn wait_idle(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }

    fn current_token(&self) -> CancellationToken {
        self.cancel.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

async fn run_with_timeout<T, F>(work: F, timeout: Option<Duration>) -> Result<T, TunnelError>
where
    F: Future<Output = Result<T, TunnelError>>,
{
    match timeout {
        Some(limit) => tokio::time::timeout(limit, work)
            .await
            .unwrap_or(Err(TunnelError::TimedOut(limit))),
        None => work.await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    async fn settle<F: Fn() -> bool>(condition: F) {
        for _ in 0..200 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let pool = WorkerPool::<usize>::new(DEFAULT_MAX_WORKERS, tx);

        let gate = Arc::new(Semaphore::new(0));
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        for n in 0..8 {
            let gate = Arc::clone(&gate);
            let active = Arc::clone(&active);
            let peak = Arc::clone(&peak);
            pool.submit(async move {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                let _permit = gate.acquire().await.expect("gate closed");
                active.fetch_sub(1, Ordering::SeqCst);
                Ok(n)
            });
        }

        settle(|| pool.running() == 5 && pool.queued() == 3).await;
        assert_eq!(active.load(Ordering::SeqCst), 5);

        gate.add_permits(8);
        let mut seen = HashSet::new();
        for _ in 0..8 {
            let outcome = rx.recv().await.unwrap();
            seen.insert(outcome.result.unwrap());
        }

        assert_eq!(seen.len(), 8);
        assert!(peak.load(Ordering::SeqCst) <= 5);
        assert_eq!(pool.running(), 0);
        assert_eq!(pool.queued(), 0);
    }

    #[tokio::test]
    async fn test_error_is_delivered() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let pool = WorkerPool::<()>::new(1, tx);

        let id = pool.submit(async { Err(TunnelError::Forward("boom".into())) });
        let outcome = rx.recv().await.unwrap();

        assert_eq!(outcome.id, id);
        assert!(matches!(outcome.result, Err(TunnelError::Forward(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_frees_slot() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let pool = WorkerPool::<()>::new(1, tx).with_timeout(Duration::from_secs(60));

        let stuck = pool.submit(std::future::pending());
        let next = pool.submit(async { Ok(()) });

        let first = rx.recv().await.unwrap();
        assert_eq!(first.id, stuck);
        assert!(matches!(first.result, Err(TunnelError::TimedOut(_))));

        let second = rx.recv().await.unwrap();
        assert_eq!(second.id, next);
        assert!(second.result.is_ok());
    }

    #[tokio::test]
    async fn test_terminate_all_sends_nothing() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let pool = WorkerPool::<()>::new(2, tx);

        for _ in 0..4 {
            pool.submit(std::future::pending());
        }
        settle(|| pool.running() == 2 && pool.queued() == 2).await;

        pool.terminate_all();
        pool.wait_idle().await;

        assert_eq!(pool.running(), 0);
        assert_eq!(pool.queued(), 0);
        assert!(rx.try_recv().is_err());

        // The pool keeps working after a teardown
        let id = pool.submit(async { Ok(()) });
        assert_eq!(rx.recv().await.unwrap().id, id);
    }

    #[test]
    fn test_reserved_ids_are_unique() {
        let (tx, _rx) = mpsc::unbounded_channel::<JobOutcome<()>>();
        let pool = WorkerPool::new(0, tx);
        assert_eq!(pool.capacity(), 1);
        assert_ne!(pool.reserve(), pool.reserve());
    }
}
