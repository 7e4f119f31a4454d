//! Structured task supervision: named, joinable task handles, plus a helper
//! that joins a fleet of "static" (must-run-forever) and "ephemeral" tasks
//! against a shutdown signal.

use std::borrow::Cow;
use std::fmt::{self, Display};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::stream::FuturesUnordered;
use futures::StreamExt;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, error, info, warn, Instrument};

use crate::shutdown::ShutdownChannel;

#[derive(Debug, Error)]
pub enum Error {
    #[error("static task finished prematurely: {name}")]
    PrematureFinish { name: Cow<'static, str> },
    #[error("some tasks failed to finish on time: {hung_tasks:?}")]
    Hung { hung_tasks: Vec<String> },
}

/// Joins `static_tasks` (expected to run for the program's lifetime) and any
/// `ephemeral_tasks` sent over `eph_tasks_rx` against `shutdown`.
///
/// If any static task finishes before `shutdown` fires, this triggers a
/// shutdown so the rest of the fleet (queue workers, deadlock detector, HTTP
/// server) winds down together instead of leaving a half-running gateway.
/// After shutdown, waits up to `shutdown_timeout` for everything to finish.
pub async fn try_join_tasks_and_shutdown(
    static_tasks: Vec<GwTask<()>>,
    mut eph_tasks_rx: mpsc::Receiver<GwTask<()>>,
    shutdown: ShutdownChannel,
    shutdown_timeout: Duration,
) -> Result<(), Error> {
    if static_tasks.is_empty() {
        shutdown.recv().await;
        return Ok(());
    }

    let mut static_tasks = static_tasks
        .into_iter()
        .map(GwTask::logged)
        .collect::<FuturesUnordered<_>>();
    let mut ephemeral_tasks = FuturesUnordered::new();

    let mut result = Ok(());

    loop {
        tokio::select! {
            biased;
            () = shutdown.recv() => break,
            Some(task) = eph_tasks_rx.recv() => {
                debug!("Received ephemeral task: {name}", name = task.name());
                ephemeral_tasks.push(task.logged());
            }
            Some(name) = ephemeral_tasks.next() => {
                debug!("Ephemeral task finished: {name}");
            }
            Some(name) = static_tasks.next() => {
                result = Err(Error::PrematureFinish { name });
                break shutdown.send();
            }
        }
    }

    let mut all_tasks = static_tasks
        .into_iter()
        .chain(ephemeral_tasks.into_iter())
        .collect::<FuturesUnordered<_>>();

    let shutdown_timeout_fut = tokio::time::sleep(shutdown_timeout);
    tokio::pin!(shutdown_timeout_fut);

    while !all_tasks.is_empty() {
        tokio::select! {
            Some(_name) = all_tasks.next() => (),
            () = &mut shutdown_timeout_fut => {
                let hung_tasks = all_tasks
                    .iter()
                    .map(|task| task.name().to_owned())
                    .collect::<Vec<_>>();
                return Err(Error::Hung { hung_tasks });
            }
        }
    }

    result
}

/// A thin wrapper around [`JoinHandle`] that:
///
/// 1. propagates panics instead of swallowing them
/// 2. carries a `#[must_use]` lint so spawned tasks are joined or explicitly
///    [`detach`](Self::detach)ed
/// 3. carries a name for logging when the task finishes
#[must_use]
pub struct GwTask<T> {
    task: JoinHandle<T>,
    name: Cow<'static, str>,
}

pub struct LoggedGwTask<T>(GwTask<T>);

struct TaskOutputDisplay<'a> {
    name: &'a str,
    result: Result<(), &'a JoinError>,
}

impl<T> GwTask<T> {
    pub fn from_tokio(
        handle: JoinHandle<T>,
        name: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self {
            task: handle,
            name: name.into(),
        }
    }

    /// Spawns a named task which inherits the current tracing span.
    #[inline]
    pub fn spawn<F>(name: impl Into<Cow<'static, str>>, future: F) -> GwTask<F::Output>
    where
        F: Future<Output = T> + Send + 'static,
        F::Output: Send + 'static,
    {
        let name = name.into();
        let span = tracing::Span::current();
        debug!("Spawning task: {name}");
        GwTask {
            task: tokio::spawn(future.instrument(span)),
            name,
        }
    }

    #[inline]
    pub fn detach(self) {
        std::mem::drop(self)
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    #[inline]
    pub fn logged(self) -> LoggedGwTask<T> {
        LoggedGwTask(self)
    }

    #[inline]
    pub fn abort(&self) {
        self.task.abort();
    }
}

impl<T> Future for GwTask<T> {
    type Output = Result<T, JoinError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let result = match Pin::new(&mut self.task).poll(cx) {
            Poll::Ready(result) => result,
            Poll::Pending => return Poll::Pending,
        };

        let result = match result {
            Ok(val) => Ok(val),
            Err(join_err) => match join_err.try_into_panic() {
                Ok(panic_reason) => {
                    error!("Task '{name}' panicked!", name = self.name());
                    std::panic::resume_unwind(panic_reason)
                }
                Err(join_err) => Err(join_err),
            },
        };

        Poll::Ready(result)
    }
}

impl<T> LoggedGwTask<T> {
    #[inline]
    pub fn name(&self) -> &str {
        self.0.name()
    }
}

impl<T> Future for LoggedGwTask<T> {
    type Output = Cow<'static, str>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.0).poll(cx).map(|result| {
            let mut log_error = false;
            let mut log_warn = false;

            match &result {
                Ok(_) => (),
                Err(e) if e.is_cancelled() => log_warn = true,
                Err(e) if e.is_panic() => log_error = true,
                _ => log_warn = true,
            };

            let msg = TaskOutputDisplay {
                name: self.name(),
                result: result.as_ref().map(|_| ()),
            };

            if log_error {
                error!("{msg}")
            } else if log_warn {
                warn!("{msg}")
            } else {
                info!("{msg}")
            }

            self.0.name.clone()
        })
    }
}

impl Display for TaskOutputDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let join_label = match &self.result {
            Ok(_) => "finished",
            Err(e) if e.is_cancelled() => "cancelled",
            Err(e) if e.is_panic() => "panicked",
            _ => "(unknown join error)",
        };
        let name = self.name;
        write!(f, "Task '{name}' {join_label}")?;
        if let Err(e) = self.result {
            write!(f, ": {e:#}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn static_task_premature_finish_triggers_shutdown() {
        let shutdown = ShutdownChannel::new();
        let (_tx, rx) = mpsc::channel(1);
        let static_tasks = vec![GwTask::spawn("noop", async {})];

        let result = tokio::time::timeout(
            Duration::from_secs(1),
            try_join_tasks_and_shutdown(
                static_tasks,
                rx,
                shutdown,
                Duration::from_secs(1),
            ),
        )
        .await
        .expect("did not finish in time");

        assert!(matches!(result, Err(Error::PrematureFinish { .. })));
    }

    #[tokio::test]
    async fn clean_shutdown_returns_ok() {
        let shutdown = ShutdownChannel::new();
        let (_tx, rx) = mpsc::channel(1);
        let shutdown2 = shutdown.clone();
        let static_tasks = vec![GwTask::spawn("waits-for-shutdown", async move {
            shutdown2.recv().await;
        })];

        shutdown.send();

        let result = tokio::time::timeout(
            Duration::from_secs(1),
            try_join_tasks_and_shutdown(
                static_tasks,
                rx,
                shutdown,
                Duration::from_secs(1),
            ),
        )
        .await
        .expect("did not finish in time");

        assert!(result.is_ok());
    }
}
