//! At-least-once webhook delivery (§4.10).

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use gateway_common::backoff::webhook_schedule_minutes;
use gateway_common::time::TimestampMs;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::model::WebhookDelivery;

/// The outbound HTTP call itself, abstracted so tests don't need a live
/// server. 2xx is success; anything else (including transport errors) is a
/// retry candidate.
#[async_trait]
pub trait WebhookSink: Send + Sync {
    async fn deliver(
        &self,
        target_url: &str,
        payload: &serde_json::Value,
    ) -> Result<(), String>;
}

/// Delivers over HTTP with [`reqwest`].
pub struct ReqwestWebhookSink {
    client: reqwest::Client,
}

impl ReqwestWebhookSink {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .expect("reqwest client"),
        }
    }
}

#[async_trait]
impl WebhookSink for ReqwestWebhookSink {
    async fn deliver(
        &self,
        target_url: &str,
        payload: &serde_json::Value,
    ) -> Result<(), String> {
        let resp = self
            .client
            .post(target_url)
            .json(payload)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(format!("non-2xx status: {}", resp.status()))
        }
    }
}

#[derive(Clone, Debug)]
pub struct WebhookConfig {
    pub max_attempts: u32,
    pub poll_interval: Duration,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            max_attempts: webhook_schedule_minutes().len() as u32,
            poll_interval: Duration::from_secs(1),
        }
    }
}

/// A bounded-retry queue of [`WebhookDelivery`] records, driven by
/// [`WebhookNotifier::run_once`]. Deliveries for different payments are
/// independent and may be attempted concurrently within one pass; same-payment
/// deliveries stay in their enqueue order (§4.10's causal-order guarantee),
/// since each payment only ever has one delivery in flight at a time and
/// retries reuse the original queue slot.
pub struct WebhookNotifier<S: WebhookSink> {
    sink: S,
    config: WebhookConfig,
    pending: Mutex<VecDeque<WebhookDelivery>>,
}

impl<S: WebhookSink> WebhookNotifier<S> {
    pub fn new(sink: S, config: WebhookConfig) -> Self {
        Self {
            sink,
            config,
            pending: Mutex::new(VecDeque::new()),
        }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub async fn enqueue(&self, delivery: WebhookDelivery) {
        self.pending.lock().await.push_back(delivery);
    }

    pub async fn pending_len(&self) -> usize {
        self.pending.lock().await.len()
    }

    /// Attempts every delivery currently due. Returns the number of
    /// deliveries that reached terminal failure this pass.
    pub async fn run_once(&self) -> usize {
        let now = TimestampMs::now();
        let due: Vec<WebhookDelivery> = {
            let mut pending = self.pending.lock().await;
            let mut due = Vec::new();
            let mut keep = VecDeque::with_capacity(pending.len());
            while let Some(delivery) = pending.pop_front() {
                if delivery.next_attempt_at.as_i64() <= now.as_i64() {
                    due.push(delivery);
                } else {
                    keep.push_back(delivery);
                }
            }
            *pending = keep;
            due
        };

        let mut terminal_failures = 0;
        for mut delivery in due {
            match self.sink.deliver(&delivery.target_url, &delivery.payload).await
            {
                Ok(()) => {
                    info!(
                        payment_internal_id = %delivery.payment_internal_id,
                        attempt = delivery.attempt_count,
                        "webhook delivered"
                    );
                }
                Err(err) => {
                    delivery.attempt_count += 1;
                    let schedule = webhook_schedule_minutes();
                    if delivery.attempt_count >= self.config.max_attempts
                        || delivery.attempt_count as usize >= schedule.len()
                    {
                        delivery.terminal = true;
                        terminal_failures += 1;
                        warn!(
                            payment_internal_id = %delivery.payment_internal_id,
                            attempts = delivery.attempt_count,
                            %err,
                            "webhook delivery exhausted retry budget"
                        );
                    } else {
                        let delay_minutes =
                            schedule[delivery.attempt_count as usize];
                        delivery.next_attempt_at = now
                            .checked_add(Duration::from_secs(
                                delay_minutes * 60,
                            ))
                            .unwrap_or(now);
                        self.pending.lock().await.push_back(delivery);
                    }
                }
            }
        }
        terminal_failures
    }
}

#[cfg(test)]
mod test {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use serde_json::json;

    use super::*;

    struct FlakySink {
        fail_times: usize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl WebhookSink for FlakySink {
        async fn deliver(
            &self,
            _target_url: &str,
            _payload: &serde_json::Value,
        ) -> Result<(), String> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_times {
                Err("boom".to_string())
            } else {
                Ok(())
            }
        }
    }

    fn delivery() -> WebhookDelivery {
        WebhookDelivery {
            payment_internal_id: uuid::Uuid::new_v4(),
            target_url: "https://merchant.example/hook".to_string(),
            payload: json!({"status": "CONFIRMED"}),
            attempt_count: 0,
            next_attempt_at: TimestampMs::now(),
            terminal: false,
        }
    }

    #[tokio::test]
    async fn successful_delivery_is_removed() {
        let notifier = WebhookNotifier::new(
            FlakySink {
                fail_times: 0,
                calls: AtomicUsize::new(0),
            },
            WebhookConfig::default(),
        );
        notifier.enqueue(delivery()).await;
        let failures = notifier.run_once().await;
        assert_eq!(failures, 0);
        assert_eq!(notifier.pending_len().await, 0);
    }

    #[tokio::test]
    async fn failure_reschedules_with_backoff() {
        let notifier = WebhookNotifier::new(
            FlakySink {
                fail_times: 100,
                calls: AtomicUsize::new(0),
            },
            WebhookConfig::default(),
        );
        notifier.enqueue(delivery()).await;
        notifier.run_once().await;
        assert_eq!(notifier.pending_len().await, 1);
    }

    #[tokio::test]
    async fn exhausting_schedule_marks_terminal() {
        let notifier = Arc::new(WebhookNotifier::new(
            FlakySink {
                fail_times: 100,
                calls: AtomicUsize::new(0),
            },
            WebhookConfig {
                max_attempts: 1,
                poll_interval: Duration::from_millis(1),
            },
        ));
        notifier.enqueue(delivery()).await;
        let failures = notifier.run_once().await;
        assert_eq!(failures, 1);
        assert_eq!(notifier.pending_len().await, 0);
    }
}
