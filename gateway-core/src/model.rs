//! The core data model (§3): [`Payment`], [`PaymentTransition`], [`Merchant`],
//! and the ephemeral [`LockLease`], [`RateBucket`], [`WebhookDelivery`]
//! records.

use gateway_common::amount::{Amount, Currency};
use gateway_common::ids::{OrderId, PaymentId, TeamSlug};
use gateway_common::time::TimestampMs;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A payment's lifecycle status (§4.4). Ordering here is purely for
/// [`Default`]; legality of transitions lives in
/// [`state_machine`](crate::state_machine).
#[derive(
    Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize,
)]
pub enum PaymentStatus {
    Init,
    New,
    FormShowed,
    Authorizing,
    ThreeDsChecking,
    ThreeDsChecked,
    Authorized,
    AuthFail,
    Confirming,
    Confirmed,
    Cancelling,
    Cancelled,
    Reversing,
    Reversed,
    Refunding,
    Refunded,
    PartialRefunded,
    Rejected,
    DeadlineExpired,
    Failed,
}

impl PaymentStatus {
    /// Terminal states never transition again (§4.4).
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Confirmed
                | Self::Cancelled
                | Self::Reversed
                | Self::Refunded
                | Self::AuthFail
                | Self::Rejected
                | Self::DeadlineExpired
                | Self::Failed
        )
    }
}

/// Single-stage (authorize + capture atomically) or two-stage (separate
/// confirm step) payment, per §3/§4.4.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum PayType {
    /// `O`: single-stage.
    OneStage,
    /// `T`: two-stage.
    TwoStage,
}

/// Who initiated a [`PaymentTransition`].
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum Actor {
    System,
    Merchant,
    Acquirer,
}

/// The central payment entity (§3).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Payment {
    /// Opaque 128-bit internal identifier.
    pub internal_id: Uuid,
    pub payment_id: PaymentId,
    pub order_id: OrderId,
    pub team_slug: TeamSlug,
    pub amount: Amount,
    pub currency: Currency,
    pub pay_type: PayType,
    pub status: PaymentStatus,
    pub success_url: Option<String>,
    pub fail_url: Option<String>,
    pub notification_url: Option<String>,
    pub customer_email: Option<String>,
    pub customer_phone: Option<String>,
    pub receipt: Option<Vec<u8>>,
    pub masked_pan: Option<String>,
    pub authorized_amount: Option<Amount>,
    pub confirmed_amount: Option<Amount>,
    pub refunded_amount: Option<Amount>,
    pub created_at: TimestampMs,
    pub updated_at: TimestampMs,
    pub expires_at: TimestampMs,
    pub authorized_at: Option<TimestampMs>,
    pub confirmed_at: Option<TimestampMs>,
    pub cancelled_at: Option<TimestampMs>,
    /// Monotonic version, incremented by every
    /// [`PaymentStore::transition`](crate::payment_store::PaymentStore::transition).
    pub version: u64,
}

impl Payment {
    pub fn is_expired(&self, now: TimestampMs) -> bool {
        now.as_i64() > self.expires_at.as_i64()
    }
}

/// An append-only audit record (§3). Invariant: strictly monotonic
/// timestamps per payment.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PaymentTransition {
    pub payment_internal_id: Uuid,
    pub previous_status: PaymentStatus,
    pub new_status: PaymentStatus,
    pub actor: Actor,
    pub reason_code: Option<String>,
    pub timestamp: TimestampMs,
    pub correlation_id: String,
}

/// An immutable-per-request merchant snapshot (§3).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Merchant {
    pub team_slug: TeamSlug,
    /// Hex SHA-256 of the merchant's plaintext password.
    pub password_hash: String,
    pub active: bool,
    pub success_url: Option<String>,
    pub fail_url: Option<String>,
    pub notification_url: Option<String>,
    pub supported_currencies: Vec<Currency>,
    pub min_amount: Amount,
    pub max_amount: Amount,
    pub daily_limit: Amount,
    pub monthly_limit: Amount,
}

/// An ephemeral lock lease (§3). Owned by the acquirer for the lease
/// duration; [`LockService`](crate::lock::LockService) exclusively owns the
/// lookup structure.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LockLease {
    pub key: String,
    pub holder: String,
    pub acquired_at: TimestampMs,
    pub expires_at: TimestampMs,
}

impl LockLease {
    pub fn is_expired(&self, now: TimestampMs) -> bool {
        now.as_i64() > self.expires_at.as_i64()
    }
}

/// An ephemeral per-`(policy, scope)` token bucket (§3).
#[derive(Clone, Debug)]
pub struct RateBucket {
    pub tokens: f64,
    pub last_refill: TimestampMs,
}

/// A queued, pending webhook delivery record (§3).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WebhookDelivery {
    pub payment_internal_id: Uuid,
    pub target_url: String,
    pub payload: serde_json::Value,
    pub attempt_count: u32,
    pub next_attempt_at: TimestampMs,
    pub terminal: bool,
}

/// Lock key helpers (§4.5): `payment:{PaymentId}` / `order:{TeamSlug}:{OrderId}`.
pub fn payment_lock_key(payment_id: &PaymentId) -> String {
    format!("payment:{payment_id}")
}

pub fn order_lock_key(team_slug: &TeamSlug, order_id: &OrderId) -> String {
    format!("order:{team_slug}:{order_id}")
}
