//! Optimistic-concurrency payment persistence (§4.3).
//!
//! Each state update consists of a check against the in-memory row (the
//! caller already holds the per-payment lock from [`crate::lock`]) followed
//! by a version-gated write. The version check is a backstop behind the
//! lock, per §4.3: the lock is primary, the version the tiebreaker.

use std::collections::HashMap;

use gateway_common::ids::{OrderId, PaymentId, TeamSlug};
use gateway_common::time::TimestampMs;
use tokio::sync::Mutex;

use crate::model::{Payment, PaymentStatus, PaymentTransition};

#[derive(thiserror::Error, Debug, Clone, Eq, PartialEq)]
pub enum StoreError {
    #[error("duplicate order")]
    DuplicateOrder,
    #[error("payment not found")]
    NotFound,
    #[error("concurrency conflict: expected version {expected}, found {found}")]
    ConcurrencyConflict { expected: u64, found: u64 },
}

/// Fields a [`PaymentStore::transition`] writes alongside the new status.
pub struct TransitionMetadata {
    pub actor: crate::model::Actor,
    pub reason_code: Option<String>,
    pub correlation_id: String,
    pub authorized_amount: Option<gateway_common::amount::Amount>,
    pub confirmed_amount: Option<gateway_common::amount::Amount>,
    pub refunded_amount: Option<gateway_common::amount::Amount>,
    pub masked_pan: Option<String>,
}

impl Default for TransitionMetadata {
    fn default() -> Self {
        Self {
            actor: crate::model::Actor::System,
            reason_code: None,
            correlation_id: gateway_common::correlation::new_correlation_id(),
            authorized_amount: None,
            confirmed_amount: None,
            refunded_amount: None,
            masked_pan: None,
        }
    }
}

struct Db {
    payments: HashMap<uuid::Uuid, Payment>,
    by_order_key: HashMap<(TeamSlug, OrderId), uuid::Uuid>,
    by_payment_id: HashMap<PaymentId, uuid::Uuid>,
    transitions: Vec<PaymentTransition>,
}

/// In-memory stand-in for the `payments` / `payment_transitions` tables
/// (§6). Serializable per payment via the version check; cross-payment
/// ordering is unguaranteed, matching §5.
pub struct PaymentStore {
    db: Mutex<Db>,
}

impl Default for PaymentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl PaymentStore {
    pub fn new() -> Self {
        Self {
            db: Mutex::new(Db {
                payments: HashMap::new(),
                by_order_key: HashMap::new(),
                by_payment_id: HashMap::new(),
                transitions: Vec::new(),
            }),
        }
    }

    /// Inserts `payment` in its initial status. Fails [`StoreError::DuplicateOrder`]
    /// when `(team_slug, order_id)` already exists.
    pub async fn create(&self, payment: Payment) -> Result<Payment, StoreError> {
        let mut db = self.db.lock().await;
        let order_key =
            (payment.team_slug.clone(), payment.order_id.clone());
        if db.by_order_key.contains_key(&order_key) {
            return Err(StoreError::DuplicateOrder);
        }
        db.by_order_key
            .insert(order_key, payment.internal_id);
        db.by_payment_id
            .insert(payment.payment_id.clone(), payment.internal_id);
        db.payments.insert(payment.internal_id, payment.clone());
        Ok(payment)
    }

    pub async fn get_by_payment_id(
        &self,
        payment_id: &PaymentId,
    ) -> Option<Payment> {
        let db = self.db.lock().await;
        let internal_id = db.by_payment_id.get(payment_id)?;
        db.payments.get(internal_id).cloned()
    }

    pub async fn get_by_order_key(
        &self,
        team_slug: &TeamSlug,
        order_id: &OrderId,
    ) -> Option<Payment> {
        let db = self.db.lock().await;
        let internal_id =
            db.by_order_key.get(&(team_slug.clone(), order_id.clone()))?;
        db.payments.get(internal_id).cloned()
    }

    /// Atomically checks `expected_version` against the stored row, writes
    /// `new_status`, increments the version, stamps the status-specific
    /// timestamp, and appends a [`PaymentTransition`] (§4.3).
    pub async fn transition(
        &self,
        payment_id: &PaymentId,
        expected_version: u64,
        new_status: PaymentStatus,
        metadata: TransitionMetadata,
    ) -> Result<Payment, StoreError> {
        let mut db = self.db.lock().await;
        let internal_id = *db
            .by_payment_id
            .get(payment_id)
            .ok_or(StoreError::NotFound)?;
        let payment =
            db.payments.get_mut(&internal_id).ok_or(StoreError::NotFound)?;

        if payment.version != expected_version {
            return Err(StoreError::ConcurrencyConflict {
                expected: expected_version,
                found: payment.version,
            });
        }

        let previous_status = payment.status;
        let now = TimestampMs::now();
        payment.status = new_status;
        payment.version += 1;
        payment.updated_at = now;
        if let Some(amount) = metadata.authorized_amount {
            payment.authorized_amount = Some(amount);
        }
        if let Some(amount) = metadata.confirmed_amount {
            payment.confirmed_amount = Some(amount);
        }
        if let Some(amount) = metadata.refunded_amount {
            payment.refunded_amount = Some(amount);
        }
        if metadata.masked_pan.is_some() {
            payment.masked_pan = metadata.masked_pan;
        }
        match new_status {
            PaymentStatus::Authorized => payment.authorized_at = Some(now),
            PaymentStatus::Confirmed => payment.confirmed_at = Some(now),
            PaymentStatus::Cancelled | PaymentStatus::Reversed => {
                payment.cancelled_at = Some(now)
            }
            _ => (),
        }

        let transition = PaymentTransition {
            payment_internal_id: internal_id,
            previous_status,
            new_status,
            actor: metadata.actor,
            reason_code: metadata.reason_code,
            timestamp: now,
            correlation_id: metadata.correlation_id,
        };
        db.transitions.push(transition);

        Ok(db.payments.get(&internal_id).expect("just written").clone())
    }

    /// All transitions recorded for `payment_internal_id`, in append order.
    pub async fn transitions_for(
        &self,
        payment_internal_id: uuid::Uuid,
    ) -> Vec<PaymentTransition> {
        let db = self.db.lock().await;
        db.transitions
            .iter()
            .filter(|t| t.payment_internal_id == payment_internal_id)
            .cloned()
            .collect()
    }

    /// Sum of confirmed amounts minus refunds for `team_slug`, restricted to
    /// payments confirmed on `day`'s calendar day (§8's daily-limit
    /// invariant). Excludes `exclude`, the payment currently being confirmed,
    /// so its own in-flight confirm isn't double-counted against itself.
    pub async fn daily_confirmed_minus_refunded(
        &self,
        team_slug: &TeamSlug,
        day: i64,
        exclude: &PaymentId,
    ) -> u64 {
        let db = self.db.lock().await;
        db.payments
            .values()
            .filter(|p| &p.team_slug == team_slug && &p.payment_id != exclude)
            .filter(|p| {
                p.confirmed_at.is_some_and(|t| t.day_index() == day)
            })
            .map(|p| {
                let confirmed =
                    p.confirmed_amount.map(|a| a.as_u64()).unwrap_or(0);
                let refunded =
                    p.refunded_amount.map(|a| a.as_u64()).unwrap_or(0);
                confirmed.saturating_sub(refunded)
            })
            .sum()
    }

    /// Payment ids in a non-terminal status whose `expires_at` has already
    /// passed, for the periodic expiry sweep (§4.5/§4.9). The coordinator
    /// also checks this lazily on access; the sweep exists so a payment
    /// nobody touches again still reaches `DEADLINE_EXPIRED`.
    pub async fn expired_payment_ids(&self, now: TimestampMs) -> Vec<PaymentId> {
        let db = self.db.lock().await;
        db.payments
            .values()
            .filter(|p| !p.status.is_terminal() && p.expires_at.as_i64() <= now.as_i64())
            .map(|p| p.payment_id.clone())
            .collect()
    }
}

#[cfg(test)]
mod test {
    use std::str::FromStr;

    use gateway_common::amount::{Amount, Currency};

    use super::*;
    use crate::model::{Actor, PayType};

    fn new_payment(order: &str) -> Payment {
        let now = TimestampMs::now();
        Payment {
            internal_id: uuid::Uuid::new_v4(),
            payment_id: PaymentId::from_str("pay-1").unwrap(),
            order_id: OrderId::from_str(order).unwrap(),
            team_slug: TeamSlug::from_str("demo-team").unwrap(),
            amount: Amount::from_minor_units(15000).unwrap(),
            currency: Currency::default(),
            pay_type: PayType::OneStage,
            status: PaymentStatus::Init,
            success_url: None,
            fail_url: None,
            notification_url: None,
            customer_email: None,
            customer_phone: None,
            receipt: None,
            masked_pan: None,
            authorized_amount: None,
            confirmed_amount: None,
            refunded_amount: None,
            created_at: now,
            updated_at: now,
            expires_at: now.checked_add(std::time::Duration::from_secs(900)).unwrap(),
            authorized_at: None,
            confirmed_at: None,
            cancelled_at: None,
            version: 0,
        }
    }

    #[tokio::test]
    async fn create_then_duplicate_order_fails() {
        let store = PaymentStore::new();
        let p1 = new_payment("order-1");
        store.create(p1.clone()).await.unwrap();

        let mut p2 = new_payment("order-1");
        p2.payment_id = PaymentId::from_str("pay-2").unwrap();
        let err = store.create(p2).await.unwrap_err();
        assert_eq!(err, StoreError::DuplicateOrder);
    }

    #[tokio::test]
    async fn transition_increments_version_and_records_transition() {
        let store = PaymentStore::new();
        let p = new_payment("order-1");
        let payment_id = p.payment_id.clone();
        let internal_id = p.internal_id;
        store.create(p).await.unwrap();

        let updated = store
            .transition(
                &payment_id,
                0,
                PaymentStatus::New,
                TransitionMetadata {
                    actor: Actor::System,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.version, 1);
        assert_eq!(updated.status, PaymentStatus::New);

        let transitions = store.transitions_for(internal_id).await;
        assert_eq!(transitions.len(), 1);
        assert_eq!(transitions[0].previous_status, PaymentStatus::Init);
    }

    #[tokio::test]
    async fn stale_version_is_rejected() {
        let store = PaymentStore::new();
        let p = new_payment("order-1");
        let payment_id = p.payment_id.clone();
        store.create(p).await.unwrap();

        store
            .transition(
                &payment_id,
                0,
                PaymentStatus::New,
                TransitionMetadata::default(),
            )
            .await
            .unwrap();

        let err = store
            .transition(
                &payment_id,
                0,
                PaymentStatus::FormShowed,
                TransitionMetadata::default(),
            )
            .await
            .unwrap_err();
        assert_eq!(
            err,
            StoreError::ConcurrencyConflict {
                expected: 0,
                found: 1
            }
        );
    }
}
