//! Bounded FIFO worker pool for payment jobs (§4.7).
//!
//! Ordering is FIFO across workers but not per-payment; per-payment
//! ordering is the responsibility of the [`LockService`](crate::lock::LockService)
//! the job acquires internally.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use gateway_common::backoff::get_backoff_iter;
use gateway_common::shutdown::ShutdownChannel;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

#[derive(Clone, Debug)]
pub struct QueueConfig {
    pub capacity: usize,
    pub workers: usize,
    pub processing_timeout: Duration,
    pub max_retries: u32,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: 10_000,
            workers: 50,
            processing_timeout: Duration::from_secs(5 * 60),
            max_retries: 3,
            backoff_base: Duration::from_secs(30),
            backoff_max: Duration::from_secs(30 * 60),
        }
    }
}

/// Cooperative cancellation, checked by jobs between steps and before
/// external calls (§4.7).
#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Whether a job is safe to retry verbatim after a failure. Non-idempotent
/// jobs that fail mid-flight are left in whatever state they reached rather
/// than retried, per §4.7's cancellation contract.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Idempotence {
    Idempotent,
    NotIdempotent,
}

pub type JobFuture =
    Pin<Box<dyn Future<Output = Result<(), String>> + Send + 'static>>;

/// A unit of work submitted to the [`PaymentQueue`]. `run` is re-invoked on
/// retry, so it must be safe to call again up to `idempotence`'s contract.
pub struct Job {
    pub name: &'static str,
    pub idempotence: Idempotence,
    pub cancel: CancelToken,
    pub run: Box<dyn FnMut() -> JobFuture + Send>,
}

#[derive(Debug, Eq, PartialEq)]
pub enum EnqueueOutcome {
    Accepted,
    QueueFull,
}

/// A bounded FIFO of [`Job`]s processed by a fixed worker pool.
pub struct PaymentQueue {
    tx: mpsc::Sender<Job>,
}

impl PaymentQueue {
    /// Spawns `config.workers` worker tasks draining a channel of capacity
    /// `config.capacity`, and returns the queue handle plus the worker
    /// tasks (for the caller to register with task supervision).
    pub fn spawn(
        config: QueueConfig,
        shutdown: ShutdownChannel,
    ) -> (Self, Vec<gateway_common::task::GwTask<()>>) {
        let (tx, rx) = mpsc::channel(config.capacity);
        let rx = Arc::new(tokio::sync::Mutex::new(rx));

        let tasks = (0..config.workers)
            .map(|worker_id| {
                let rx = rx.clone();
                let config = config.clone();
                let shutdown = shutdown.clone();
                gateway_common::task::GwTask::spawn(
                    "payment-queue-worker",
                    async move {
                        worker_loop(worker_id, rx, config, shutdown).await;
                    },
                )
            })
            .collect();

        (Self { tx }, tasks)
    }

    pub async fn enqueue(&self, job: Job) -> EnqueueOutcome {
        match self.tx.try_send(job) {
            Ok(()) => EnqueueOutcome::Accepted,
            Err(_) => EnqueueOutcome::QueueFull,
        }
    }
}

async fn worker_loop(
    worker_id: usize,
    rx: Arc<tokio::sync::Mutex<mpsc::Receiver<Job>>>,
    config: QueueConfig,
    shutdown: ShutdownChannel,
) {
    loop {
        let job = {
            let mut rx = rx.lock().await;
            tokio::select! {
                job = rx.recv() => job,
                () = shutdown.recv() => None,
            }
        };
        let Some(job) = job else {
            info!(worker_id, "payment queue worker shutting down");
            return;
        };
        run_job_with_retries(job, &config).await;
    }
}

async fn run_job_with_retries(mut job: Job, config: &QueueConfig) {
    let mut backoff = get_backoff_iter(config.backoff_base, config.backoff_max);
    let mut attempt = 0u32;

    loop {
        if job.cancel.is_cancelled() {
            warn!(name = job.name, "job cancelled before execution");
            return;
        }

        let result =
            tokio::time::timeout(config.processing_timeout, (job.run)()).await;

        match result {
            Ok(Ok(())) => return,
            Ok(Err(_)) | Err(_) => {
                if job.cancel.is_cancelled() {
                    warn!(name = job.name, "job cancelled after failed attempt");
                    return;
                }
                if job.idempotence == Idempotence::NotIdempotent {
                    error!(
                        name = job.name,
                        "non-idempotent job failed; leaving state unchanged, not retrying"
                    );
                    return;
                }
                attempt += 1;
                if attempt > config.max_retries {
                    error!(
                        name = job.name,
                        attempt,
                        "job exhausted retry budget"
                    );
                    return;
                }
                let delay = backoff.next().unwrap_or(config.backoff_max);
                warn!(name = job.name, attempt, ?delay, "job failed, retrying");
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[tokio::test]
    async fn job_succeeds_first_try() {
        let config = QueueConfig {
            backoff_base: Duration::from_millis(1),
            backoff_max: Duration::from_millis(5),
            ..QueueConfig::default()
        };
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        let job = Job {
            name: "test-job",
            idempotence: Idempotence::Idempotent,
            cancel: CancelToken::new(),
            run: Box::new(move || {
                c.fetch_add(1, Ordering::SeqCst);
                Box::pin(async { Ok(()) })
            }),
        };
        run_job_with_retries(job, &config).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn idempotent_job_retries_until_success() {
        let config = QueueConfig {
            backoff_base: Duration::from_millis(1),
            backoff_max: Duration::from_millis(5),
            max_retries: 5,
            ..QueueConfig::default()
        };
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        let job = Job {
            name: "test-job",
            idempotence: Idempotence::Idempotent,
            cancel: CancelToken::new(),
            run: Box::new(move || {
                let n = c.fetch_add(1, Ordering::SeqCst);
                Box::pin(async move {
                    if n < 2 {
                        Err("boom".to_string())
                    } else {
                        Ok(())
                    }
                })
            }),
        };
        run_job_with_retries(job, &config).await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_idempotent_job_never_retries() {
        let config = QueueConfig {
            backoff_base: Duration::from_millis(1),
            backoff_max: Duration::from_millis(5),
            ..QueueConfig::default()
        };
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        let job = Job {
            name: "test-job",
            idempotence: Idempotence::NotIdempotent,
            cancel: CancelToken::new(),
            run: Box::new(move || {
                c.fetch_add(1, Ordering::SeqCst);
                Box::pin(async { Err("boom".to_string()) })
            }),
        };
        run_job_with_retries(job, &config).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancelled_job_does_not_execute() {
        let config = QueueConfig::default();
        let cancel = CancelToken::new();
        cancel.cancel();
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        let job = Job {
            name: "test-job",
            idempotence: Idempotence::Idempotent,
            cancel,
            run: Box::new(move || {
                c.fetch_add(1, Ordering::SeqCst);
                Box::pin(async { Ok(()) })
            }),
        };
        run_job_with_retries(job, &config).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn enqueue_accepted_and_processed() {
        let shutdown = ShutdownChannel::new();
        let config = QueueConfig {
            capacity: 4,
            workers: 2,
            ..QueueConfig::default()
        };
        let (queue, _tasks) = PaymentQueue::spawn(config, shutdown.clone());
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        let outcome = queue
            .enqueue(Job {
                name: "test-job",
                idempotence: Idempotence::Idempotent,
                cancel: CancelToken::new(),
                run: Box::new(move || {
                    c.fetch_add(1, Ordering::SeqCst);
                    Box::pin(async { Ok(()) })
                }),
            })
            .await;
        assert_eq!(outcome, EnqueueOutcome::Accepted);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        shutdown.send();
    }
}
