//! A small notification channel wrapping [`tokio::sync::mpsc`] with the
//! property that multiple sends before a `recv` coalesce into one wakeup.
//! Used to wake the [`DeadlockDetector`](crate) loop and queue workers
//! without an unbounded backlog of notifications.

use tokio::sync::mpsc;

pub fn channel() -> (Sender, Receiver) {
    let (tx, rx) = mpsc::channel(1);
    (Sender(tx), Receiver(rx))
}

#[derive(Clone)]
pub struct Sender(mpsc::Sender<()>);

pub struct Receiver(mpsc::Receiver<()>);

impl Sender {
    /// Sends a notification. Never blocks; coalesces with any pending,
    /// unconsumed notification.
    pub fn send(&self) {
        let _ = self.0.try_send(());
    }
}

impl Receiver {
    /// Waits for a notification. Never resolves if all [`Sender`]s have been
    /// dropped (mirrors `mpsc`'s closed-channel semantics without spuriously
    /// waking callers).
    pub async fn recv(&mut self) {
        match self.0.recv().await {
            Some(()) => (),
            None => std::future::pending().await,
        }
    }

    pub fn clear(&mut self) {
        while self.0.try_recv().is_ok() {}
    }
}
