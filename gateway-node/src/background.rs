//! Periodic maintenance tasks, each a static [`GwTask`] run to completion
//! alongside the API server (§4.7/§4.8/§4.9/§4.10): the deadlock detector,
//! the expired-payment sweep (driven through [`PaymentQueue`], giving C7's
//! worker pool an actual job to run), and webhook delivery.

use std::sync::Arc;

use gateway_common::shutdown::ShutdownChannel;
use gateway_common::task::GwTask;
use gateway_core::deadlock::DeadlockDetector;
use gateway_core::queue::{CancelToken, Idempotence, Job, PaymentQueue};
use tracing::{info, warn};

use crate::app::Coordinator;
use crate::config::GatewayConfig;

async fn sleep_or_shutdown(period: std::time::Duration, shutdown: &ShutdownChannel) -> bool {
    tokio::select! {
        biased;
        () = shutdown.recv() => false,
        _ = tokio::time::sleep(period) => true,
    }
}

fn spawn_deadlock_detector(
    coordinator: Arc<Coordinator>,
    config: &GatewayConfig,
    shutdown: ShutdownChannel,
) -> GwTask<()> {
    let detector = DeadlockDetector::new(config.deadlock.to_core());
    let interval = config.deadlock.interval();
    GwTask::spawn("deadlock-detector", async move {
        while sleep_or_shutdown(interval, &shutdown).await {
            let cycles = detector.run_once(&coordinator.locks).await;
            if !cycles.is_empty() {
                warn!(count = cycles.len(), "deadlock cycle(s) detected");
            }
        }
        info!("deadlock detector shutting down");
    })
}

fn spawn_expiry_sweeper(
    coordinator: Arc<Coordinator>,
    queue: Arc<PaymentQueue>,
    shutdown: ShutdownChannel,
) -> GwTask<()> {
    // The sweep itself is cheap and idempotent; routing it through the
    // queue (rather than calling it directly off the ticker) exercises the
    // worker pool (§4.7) the same way a real per-payment job would.
    const SWEEP_INTERVAL: std::time::Duration = std::time::Duration::from_secs(30);
    GwTask::spawn("expiry-sweep-ticker", async move {
        while sleep_or_shutdown(SWEEP_INTERVAL, &shutdown).await {
            let coordinator = coordinator.clone();
            let outcome = queue
                .enqueue(Job {
                    name: "sweep-expired-payments",
                    idempotence: Idempotence::Idempotent,
                    cancel: CancelToken::new(),
                    run: Box::new(move || {
                        let coordinator = coordinator.clone();
                        Box::pin(async move {
                            let swept = coordinator.sweep_expired_payments().await;
                            if swept > 0 {
                                info!(swept, "expired payments swept");
                            }
                            Ok(())
                        })
                    }),
                })
                .await;
            if outcome == gateway_core::queue::EnqueueOutcome::QueueFull {
                warn!("expiry sweep job dropped: queue full");
            }
        }
        info!("expiry sweep ticker shutting down");
    })
}

fn spawn_webhook_delivery(
    coordinator: Arc<Coordinator>,
    config: &GatewayConfig,
    shutdown: ShutdownChannel,
) -> GwTask<()> {
    let poll_interval = config.webhook.poll_interval();
    GwTask::spawn("webhook-delivery", async move {
        while sleep_or_shutdown(poll_interval, &shutdown).await {
            let delivered = coordinator.webhooks.run_once().await;
            if delivered > 0 {
                info!(delivered, "webhook deliveries attempted");
            }
        }
        info!("webhook delivery loop shutting down");
    })
}

/// Spawns every periodic task, returning them as static tasks for
/// [`gateway_common::task::try_join_tasks_and_shutdown`] to supervise.
pub fn spawn(
    coordinator: Arc<Coordinator>,
    queue: Arc<PaymentQueue>,
    config: &GatewayConfig,
    shutdown: ShutdownChannel,
) -> Vec<GwTask<()>> {
    vec![
        spawn_deadlock_detector(coordinator.clone(), config, shutdown.clone()),
        spawn_expiry_sweeper(coordinator.clone(), queue, shutdown.clone()),
        spawn_webhook_delivery(coordinator, config, shutdown),
    ]
}
