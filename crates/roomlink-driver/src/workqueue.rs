//! Single-flight batched work queue.
//!
//! Several feature handlers need the same shape of queue: work posted
//! from any task, drained by at most one worker at a time, in bounded
//! batches so one burst of messages cannot monopolize the runtime. This
//! module implements that shape once.
//!
//! - posting is non-blocking and never drops work;
//! - a compare-and-swap on the draining flag guarantees a single drain
//!   task at a time;
//! - the drain processes at most `batch_size` jobs, then yields back to
//!   the scheduler before continuing;
//! - each job runs at most once; a panicking job is caught, logged, and
//!   does not stop the batch.
//!
//! Must be used from within a tokio runtime (the drain is spawned).

use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, error};

/// Default number of jobs processed per drain activation.
pub const DEFAULT_BATCH_SIZE: usize = 16;

type Job = Box<dyn FnOnce() + Send + 'static>;

struct Inner {
    label: String,
    batch_size: usize,
    jobs: Mutex<VecDeque<Job>>,
    draining: AtomicBool,
}

/// A work queue drained by at most one task at a time.
#[derive(Clone)]
pub struct WorkQueue {
    inner: Arc<Inner>,
}

impl WorkQueue {
    /// Creates a queue processing up to `batch_size` jobs per drain
    /// activation. The label appears in logs.
    pub fn new(label: impl Into<String>, batch_size: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                label: label.into(),
                batch_size: batch_size.max(1),
                jobs: Mutex::new(VecDeque::new()),
                draining: AtomicBool::new(false),
            }),
        }
    }

    /// Creates a queue with the default batch size.
    pub fn with_default_batch(label: impl Into<String>) -> Self {
        Self::new(label, DEFAULT_BATCH_SIZE)
    }

    /// Posts one unit of work. Non-blocking; schedules a drain if none
    /// is running.
    pub fn post(&self, job: impl FnOnce() + Send + 'static) {
        self.inner
            .jobs
            .lock()
            .expect("work queue mutex poisoned")
            .push_back(Box::new(job));
        self.schedule();
    }

    /// Number of jobs waiting (excluding any job currently executing).
    pub fn pending(&self) -> usize {
        self.inner
            .jobs
            .lock()
            .expect("work queue mutex poisoned")
            .len()
    }

    /// True when nothing is queued and no drain is running.
    pub fn is_idle(&self) -> bool {
        !self.inner.draining.load(Ordering::Acquire) && self.pending() == 0
    }

    fn schedule(&self) {
        if self
            .inner
            .draining
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            let inner = Arc::clone(&self.inner);
            tokio::spawn(drain(inner));
        }
    }
}

async fn drain(inner: Arc<Inner>) {
    loop {
        for _ in 0..inner.batch_size {
            let job = inner
                .jobs
                .lock()
                .expect("work queue mutex poisoned")
                .pop_front();
            let Some(job) = job else { break };
            if catch_unwind(AssertUnwindSafe(job)).is_err() {
                error!(queue = %inner.label, "Posted work item panicked");
            }
        }

        let remaining = inner
            .jobs
            .lock()
            .expect("work queue mutex poisoned")
            .len();
        if remaining == 0 {
            inner.draining.store(false, Ordering::Release);
            // A post may have landed between the batch and the flag
            // release; reclaim the drain if so.
            let requeued = !inner
                .jobs
                .lock()
                .expect("work queue mutex poisoned")
                .is_empty();
            if !requeued
                || inner
                    .draining
                    .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                    .is_err()
            {
                return;
            }
        } else {
            debug!(queue = %inner.label, remaining, "Yielding between work batches");
            tokio::task::yield_now().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    async fn wait_idle(queue: &WorkQueue) {
        tokio::time::timeout(Duration::from_secs(1), async {
            while !queue.is_idle() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("queue did not drain");
    }

    #[tokio::test]
    async fn every_posted_job_runs_exactly_once() {
        let queue = WorkQueue::new("test", 4);
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..100 {
            let counter = counter.clone();
            queue.post(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }

        wait_idle(&queue).await;
        assert_eq!(counter.load(Ordering::SeqCst), 100);
    }

    #[tokio::test]
    async fn concurrent_posters_lose_no_work() {
        let queue = WorkQueue::new("test", 8);
        let counter = Arc::new(AtomicUsize::new(0));

        let mut posters = Vec::new();
        for _ in 0..10 {
            let queue = queue.clone();
            let counter = counter.clone();
            posters.push(tokio::spawn(async move {
                for _ in 0..50 {
                    let counter = counter.clone();
                    queue.post(move || {
                        counter.fetch_add(1, Ordering::SeqCst);
                    });
                    tokio::task::yield_now().await;
                }
            }));
        }
        for poster in posters {
            poster.await.unwrap();
        }

        wait_idle(&queue).await;
        assert_eq!(counter.load(Ordering::SeqCst), 500);
    }

    #[tokio::test]
    async fn panicking_job_does_not_stop_the_batch() {
        let queue = WorkQueue::new("test", 4);
        let counter = Arc::new(AtomicUsize::new(0));

        {
            let counter = counter.clone();
            queue.post(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        queue.post(|| panic!("boom"));
        {
            let counter = counter.clone();
            queue.post(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }

        wait_idle(&queue).await;
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn batches_are_bounded_but_complete() {
        // More jobs than one batch; all must still run.
        let queue = WorkQueue::new("test", 2);
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..9 {
            let counter = counter.clone();
            queue.post(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }

        wait_idle(&queue).await;
        assert_eq!(counter.load(Ordering::SeqCst), 9);
    }

    #[tokio::test]
    async fn jobs_run_in_post_order() {
        let queue = WorkQueue::new("test", 3);
        let order = Arc::new(Mutex::new(Vec::new()));

        for i in 0..10 {
            let order = order.clone();
            queue.post(move || {
                order.lock().unwrap().push(i);
            });
        }

        wait_idle(&queue).await;
        assert_eq!(*order.lock().unwrap(), (0..10).collect::<Vec<_>>());
    }
}
