//! Deterministic, in-memory stand-ins for the collaborators the coordinator
//! is generic over. The card network's wire protocol is out of scope (§1);
//! this crate only needs *some* [`Acquirer`](crate::acquirer::Acquirer) and
//! [`WebhookSink`](crate::webhook::WebhookSink) to exercise the lifecycle
//! end to end in tests and in `gateway-node`'s local/demo mode.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use gateway_common::amount::Amount;

use crate::acquirer::{
    Acquirer, AcquirerUnavailable, AuthorizeOutcome, AuthorizeRequest,
    ConfirmRequest, RefundRequest, ReverseRequest,
};
use crate::webhook::WebhookSink;

/// Scripted per-`card_ref` behavior for [`ScriptedAcquirer`]. Defaults to
/// immediate approval, the common case in tests.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum CardScript {
    Approve,
    ThreeDsThenApprove,
    Reject,
    Unavailable,
}

/// An [`Acquirer`] whose authorize outcome is driven by the card reference
/// string, so tests can steer specific payments down specific branches of
/// the state machine without a real network call.
#[derive(Default)]
pub struct ScriptedAcquirer {
    authorize_calls: AtomicUsize,
    three_ds_checked: Mutex<std::collections::HashSet<String>>,
}

impl ScriptedAcquirer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn authorize_call_count(&self) -> usize {
        self.authorize_calls.load(Ordering::SeqCst)
    }

    fn script_for(card_ref: &str) -> CardScript {
        match card_ref {
            "3ds" => CardScript::ThreeDsThenApprove,
            "rejected" => CardScript::Reject,
            "unavailable" => CardScript::Unavailable,
            _ => CardScript::Approve,
        }
    }
}

#[async_trait]
impl Acquirer for ScriptedAcquirer {
    async fn authorize(
        &self,
        req: AuthorizeRequest,
    ) -> Result<AuthorizeOutcome, AcquirerUnavailable> {
        self.authorize_calls.fetch_add(1, Ordering::SeqCst);
        match Self::script_for(&req.card_ref) {
            CardScript::Approve => Ok(AuthorizeOutcome::Approved {
                authorized_amount: req.amount,
                masked_pan: "4111111111111111".to_string(),
            }),
            CardScript::ThreeDsThenApprove => {
                let mut checked = self.three_ds_checked.lock().unwrap();
                if checked.insert(req.card_ref.clone()) {
                    Ok(AuthorizeOutcome::ThreeDsRequired)
                } else {
                    Ok(AuthorizeOutcome::Approved {
                        authorized_amount: req.amount,
                        masked_pan: "4111111111111111".to_string(),
                    })
                }
            }
            CardScript::Reject => Ok(AuthorizeOutcome::Rejected),
            CardScript::Unavailable => {
                Err(AcquirerUnavailable("simulated outage".to_string()))
            }
        }
    }

    async fn confirm(
        &self,
        _req: ConfirmRequest,
    ) -> Result<(), AcquirerUnavailable> {
        Ok(())
    }

    async fn reverse(
        &self,
        _req: ReverseRequest,
    ) -> Result<(), AcquirerUnavailable> {
        Ok(())
    }

    async fn refund(
        &self,
        _req: RefundRequest,
    ) -> Result<(), AcquirerUnavailable> {
        Ok(())
    }
}

/// A [`WebhookSink`] that records deliveries in memory instead of making an
/// HTTP call, for asserting on webhook fan-out in tests.
#[derive(Default)]
pub struct RecordingWebhookSink {
    delivered: Mutex<Vec<(String, serde_json::Value)>>,
}

impl RecordingWebhookSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delivered(&self) -> Vec<(String, serde_json::Value)> {
        self.delivered.lock().unwrap().clone()
    }
}

#[async_trait]
impl WebhookSink for RecordingWebhookSink {
    async fn deliver(
        &self,
        target_url: &str,
        payload: &serde_json::Value,
    ) -> Result<(), String> {
        self.delivered
            .lock()
            .unwrap()
            .push((target_url.to_string(), payload.clone()));
        Ok(())
    }
}

/// Convenience: a [`gateway_common::amount::Amount`] from a plain integer,
/// for readable test fixtures.
pub fn amount(units: u64) -> Amount {
    Amount::from_minor_units(units).expect("valid test amount")
}
