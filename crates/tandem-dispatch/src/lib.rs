//! Cross-thread execution queue for Tandem.
//!
//! Network I/O runs on background tasks, but session and game state belong
//! to one thread: the one that runs the game's update loop. Background
//! tasks never touch that state. Instead they package the effect as a
//! closure and [`enqueue`](ExecutionQueue::enqueue) it; the owner calls
//! [`drain_and_run`](ExecutionQueue::drain_and_run) once per tick and the
//! closures run there, in FIFO order, with `&mut` access to the owner's
//! context.
//!
//! ```text
//! accept task ──┐
//!               ├──► ExecutionQueue<C> ──(drain once per tick)──► &mut C
//! receive task ─┘
//! ```
//!
//! # Context parameter
//!
//! Each job receives `&mut C`, where `C` is whatever the owner passes to
//! `drain_and_run`. That is how a job reaches the state it mutates without
//! a global. Use `C = ()` for plain "run this later" callbacks.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{trace, warn};

/// A deferred action. Runs at most once, on the draining thread.
pub type Job<C> = Box<dyn FnOnce(&mut C) + Send + 'static>;

struct Pending<C> {
    jobs: VecDeque<Job<C>>,
    closed: bool,
}

struct Inner<C> {
    pending: Mutex<Pending<C>>,
    /// Set for the duration of a drain; refuses re-entrant drains.
    draining: AtomicBool,
}

/// A thread-safe FIFO of deferred actions, drained by a single owner.
///
/// Cloning is cheap (an `Arc` bump); every clone feeds the same queue.
pub struct ExecutionQueue<C> {
    inner: Arc<Inner<C>>,
}

impl<C> Clone for ExecutionQueue<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C> Default for ExecutionQueue<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> fmt::Debug for ExecutionQueue<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pending = self.lock();
        f.debug_struct("ExecutionQueue")
            .field("len", &pending.jobs.len())
            .field("closed", &pending.closed)
            .finish()
    }
}

impl<C> ExecutionQueue<C> {
    /// Creates an empty, open queue.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                pending: Mutex::new(Pending {
                    jobs: VecDeque::new(),
                    closed: false,
                }),
                draining: AtomicBool::new(false),
            }),
        }
    }

    /// Appends an action to the tail of the queue.
    ///
    /// Callable from any thread. Holds the lock only for the push.
    /// Returns `false` (and drops `job` unrun) if the queue was closed.
    pub fn enqueue<F>(&self, job: F) -> bool
    where
        F: FnOnce(&mut C) + Send + 'static,
    {
        let mut pending = self.lock();
        if pending.closed {
            trace!("execution queue closed, dropping job");
            return false;
        }
        pending.jobs.push_back(Box::new(job));
        true
    }

    /// Runs every action queued so far, oldest first, on the calling
    /// thread. Returns how many ran.
    ///
    /// The queue is swapped out under the lock and the batch runs with
    /// the lock released, so background threads can keep enqueuing while
    /// jobs execute. Anything enqueued during the drain (including by the
    /// jobs themselves) runs on the next drain, which keeps a job that
    /// re-enqueues itself from looping forever.
    ///
    /// Must only be called by the owner. A drain started from inside a
    /// running job is refused and returns 0. If a job panics, the jobs
    /// after it go back to the head of the queue for the next drain.
    pub fn drain_and_run(&self, ctx: &mut C) -> usize {
        if self.inner.draining.swap(true, Ordering::AcqRel) {
            warn!("re-entrant drain_and_run refused");
            return 0;
        }
        // Clears `draining` even if a job panics.
        let _guard = DrainGuard(&self.inner.draining);

        let mut batch = Batch {
            queue: self,
            jobs: std::mem::take(&mut self.lock().jobs),
        };
        let mut ran = 0;
        while let Some(job) = batch.jobs.pop_front() {
            job(ctx);
            ran += 1;
        }

        if ran > 0 {
            trace!(ran, "execution queue drained");
        }
        ran
    }

    /// Tears the queue down: drops every pending action without running
    /// it and rejects future enqueues. Returns how many were dropped.
    ///
    /// Idempotent.
    pub fn close(&self) -> usize {
        let mut pending = self.lock();
        pending.closed = true;
        let dropped = pending.jobs.len();
        pending.jobs.clear();
        dropped
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Number of actions waiting for the next drain.
    pub fn len(&self) -> usize {
        self.lock().jobs.len()
    }

    /// Returns `true` if nothing is waiting.
    pub fn is_empty(&self) -> bool {
        self.lock().jobs.is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, Pending<C>> {
        // A panic while holding the lock can only happen inside `push_back`
        // or `clear`; the deque is still consistent, so keep going.
        self.inner
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// The batch being drained. Jobs still in it when it drops (a job
/// panicked) are put back ahead of anything enqueued since.
struct Batch<'a, C> {
    queue: &'a ExecutionQueue<C>,
    jobs: VecDeque<Job<C>>,
}

impl<C> Drop for Batch<'_, C> {
    fn drop(&mut self) {
        if self.jobs.is_empty() {
            return;
        }
        let mut pending = self.queue.lock();
        if pending.closed {
            trace!(dropped = self.jobs.len(), "execution queue closed, dropping unrun jobs");
            return;
        }
        warn!(requeued = self.jobs.len(), "job panicked, requeueing the rest of the batch");
        let mut rest = std::mem::take(&mut self.jobs);
        rest.append(&mut pending.jobs);
        pending.jobs = rest;
    }
}

struct DrainGuard<'a>(&'a AtomicBool);

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drain_and_run_executes_in_fifo_order() {
        let queue: ExecutionQueue<Vec<u32>> = ExecutionQueue::new();
        for i in 1..=3 {
            queue.enqueue(move |log: &mut Vec<u32>| log.push(i));
        }

        let mut log = Vec::new();
        let ran = queue.drain_and_run(&mut log);

        assert_eq!(ran, 3);
        assert_eq!(log, vec![1, 2, 3]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_drain_and_run_empty_queue_returns_zero() {
        let queue: ExecutionQueue<()> = ExecutionQueue::new();
        assert_eq!(queue.drain_and_run(&mut ()), 0);
    }

    #[test]
    fn test_each_job_runs_exactly_once() {
        let queue: ExecutionQueue<u32> = ExecutionQueue::new();
        queue.enqueue(|count: &mut u32| *count += 1);

        let mut count = 0;
        queue.drain_and_run(&mut count);
        queue.drain_and_run(&mut count);

        assert_eq!(count, 1);
    }

    #[test]
    fn test_job_enqueued_during_drain_runs_on_next_drain() {
        let queue: ExecutionQueue<Vec<&'static str>> = ExecutionQueue::new();
        let requeue = queue.clone();
        queue.enqueue(move |log: &mut Vec<&'static str>| {
            log.push("outer");
            requeue.enqueue(|log: &mut Vec<&'static str>| log.push("inner"));
        });

        let mut log = Vec::new();
        assert_eq!(queue.drain_and_run(&mut log), 1);
        assert_eq!(log, vec!["outer"]);

        assert_eq!(queue.drain_and_run(&mut log), 1);
        assert_eq!(log, vec!["outer", "inner"]);
    }

    #[test]
    fn test_reentrant_drain_is_refused() {
        let queue: ExecutionQueue<Vec<usize>> = ExecutionQueue::new();
        let inner_queue = queue.clone();
        queue.enqueue(|_: &mut Vec<usize>| {});
        queue.enqueue(move |log: &mut Vec<usize>| {
            let mut scratch = Vec::new();
            log.push(inner_queue.drain_and_run(&mut scratch));
        });

        let mut log = Vec::new();
        queue.drain_and_run(&mut log);

        assert_eq!(log, vec![0]);
    }

    #[test]
    fn test_close_drops_pending_and_rejects_new_jobs() {
        let queue: ExecutionQueue<u32> = ExecutionQueue::new();
        queue.enqueue(|n: &mut u32| *n += 1);
        queue.enqueue(|n: &mut u32| *n += 1);

        assert_eq!(queue.close(), 2);
        assert!(queue.is_closed());
        assert!(!queue.enqueue(|n: &mut u32| *n += 1));

        let mut n = 0;
        assert_eq!(queue.drain_and_run(&mut n), 0);
        assert_eq!(n, 0);
    }

    #[test]
    fn test_close_is_idempotent() {
        let queue: ExecutionQueue<()> = ExecutionQueue::new();
        queue.enqueue(|_| {});
        assert_eq!(queue.close(), 1);
        assert_eq!(queue.close(), 0);
    }

    #[test]
    fn test_unit_context_supports_plain_callbacks() {
        use std::sync::atomic::AtomicUsize;

        let hits = Arc::new(AtomicUsize::new(0));
        let queue: ExecutionQueue<()> = ExecutionQueue::new();
        let h = Arc::clone(&hits);
        queue.enqueue(move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });

        queue.drain_and_run(&mut ());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_drain_recovers_after_panicking_job() {
        let queue: ExecutionQueue<u32> = ExecutionQueue::new();
        queue.enqueue(|_: &mut u32| panic!("job failed"));

        let q = queue.clone();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            q.drain_and_run(&mut 0);
        }));
        assert!(result.is_err());

        // The draining flag was reset, so the owner can keep pumping.
        queue.enqueue(|n: &mut u32| *n = 7);
        let mut n = 0;
        assert_eq!(queue.drain_and_run(&mut n), 1);
        assert_eq!(n, 7);
    }

    #[test]
    fn test_panicking_job_requeues_rest_of_batch() {
        let queue: ExecutionQueue<Vec<u32>> = ExecutionQueue::new();
        queue.enqueue(|log: &mut Vec<u32>| log.push(1));
        queue.enqueue(|_: &mut Vec<u32>| panic!("job failed"));
        queue.enqueue(|log: &mut Vec<u32>| log.push(3));
        queue.enqueue(|log: &mut Vec<u32>| log.push(4));

        let mut log = Vec::new();
        let q = queue.clone();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            q.drain_and_run(&mut log);
        }));
        assert!(result.is_err());
        assert_eq!(log, vec![1]);
        assert_eq!(queue.len(), 2);

        // Survivors keep their place ahead of newer work.
        queue.enqueue(|log: &mut Vec<u32>| log.push(5));
        assert_eq!(queue.drain_and_run(&mut log), 3);
        assert_eq!(log, vec![1, 3, 4, 5]);
    }
}
