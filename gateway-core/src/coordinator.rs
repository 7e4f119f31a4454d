//! The lifecycle coordinator (§4.9): the single place every write operation
//! passes through. Each write follows the same nine steps: rate-limit,
//! lock, re-read, propose, persist, call acquirer, persist terminal
//! substate, release, enqueue webhook.

use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::Duration;

use gateway_common::amount::{Amount, Currency};
use gateway_common::ids::{OrderId, PaymentId, TeamSlug};
use gateway_common::pan::mask_pan;
use gateway_common::time::TimestampMs;
use serde_json::json;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::acquirer::{
    Acquirer, AuthorizeOutcome, AuthorizeRequest, ConfirmRequest,
    IdempotencyKey, RefundRequest, ReverseRequest,
};
use crate::lock::LockService;
use crate::merchant_store::{MerchantSource, MerchantStore};
use crate::model::{Actor, LockLease, PayType, Payment, PaymentStatus};
use crate::payment_store::{PaymentStore, StoreError, TransitionMetadata};
use crate::rate_limit::{Decision, Policy, RateLimiter};
use crate::state_machine::{propose, EntryAction, Event};
use crate::webhook::{WebhookNotifier, WebhookSink};

#[derive(thiserror::Error, Debug, Clone, Eq, PartialEq)]
pub enum CoordinatorError {
    #[error("merchant not found or inactive")]
    MerchantInactive,
    #[error("duplicate order")]
    DuplicateOrder,
    #[error("validation failed: {0}")]
    ValidationFailed(String),
    #[error("limit exceeded")]
    LimitExceeded,
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },
    #[error("lock timeout")]
    LockTimeout,
    #[error("payment not found")]
    NotFound,
    #[error("illegal state transition")]
    IllegalStateTransition,
    #[error("amount exceeds authorized")]
    AmountExceedsAuthorized,
    #[error("acquirer unavailable")]
    AcquirerUnavailable,
    #[error("internal error: {0}")]
    InternalError(String),
}

impl From<CoordinatorError> for gateway_common::error::DomainError {
    fn from(err: CoordinatorError) -> Self {
        use gateway_common::error::DomainError as D;
        match err {
            CoordinatorError::MerchantInactive => D::MerchantInactive,
            CoordinatorError::DuplicateOrder => D::DuplicateOrder,
            CoordinatorError::ValidationFailed(msg) => D::ValidationFailed(msg),
            CoordinatorError::LimitExceeded => D::LimitExceeded,
            CoordinatorError::RateLimited { retry_after_ms } => {
                D::RateLimited { retry_after_ms }
            }
            CoordinatorError::LockTimeout => D::LockTimeout,
            CoordinatorError::NotFound => D::NotFound,
            CoordinatorError::IllegalStateTransition => {
                D::IllegalStateTransition
            }
            CoordinatorError::AmountExceedsAuthorized => {
                D::AmountExceedsAuthorized
            }
            CoordinatorError::AcquirerUnavailable => D::AcquirerUnavailable,
            CoordinatorError::InternalError(_) => D::InternalError,
        }
    }
}

const WRITE_LOCK_WAIT: Duration = Duration::from_secs(30);
const LOCK_LEASE_DURATION: Duration = Duration::from_secs(60);
const MAX_CONCURRENCY_RETRIES: u32 = 3;
const MAX_ACQUIRER_RETRIES: u32 = 2;

pub struct InitRequest {
    pub team_slug: TeamSlug,
    pub order_id: OrderId,
    pub amount: Amount,
    pub currency: Currency,
    pub pay_type: PayType,
    pub success_url: Option<String>,
    pub fail_url: Option<String>,
    pub notification_url: Option<String>,
}

#[derive(Debug)]
pub struct InitResponse {
    pub payment_id: PaymentId,
    pub payment_url: String,
    pub status: PaymentStatus,
}

/// The central orchestrator tying together locking, rate limiting,
/// persistence, the state machine, the acquirer, and webhook delivery.
pub struct LifecycleCoordinator<A: Acquirer, S: MerchantSource, W: WebhookSink>
{
    pub locks: LockService,
    pub rate_limiter: RateLimiter,
    pub payments: PaymentStore,
    pub merchants: MerchantStore<S>,
    pub acquirer: A,
    pub webhooks: WebhookNotifier<W>,
    sequence: AtomicU64,
}

impl<A: Acquirer, S: MerchantSource, W: WebhookSink>
    LifecycleCoordinator<A, S, W>
{
    pub fn new(
        locks: LockService,
        rate_limiter: RateLimiter,
        payments: PaymentStore,
        merchants: MerchantStore<S>,
        acquirer: A,
        webhooks: WebhookNotifier<W>,
    ) -> Self {
        Self {
            locks,
            rate_limiter,
            payments,
            merchants,
            acquirer,
            webhooks,
            sequence: AtomicU64::new(0),
        }
    }

    fn next_idempotency_key(&self, payment_id: &PaymentId) -> IdempotencyKey {
        let seq = self.sequence.fetch_add(1, AtomicOrdering::SeqCst);
        IdempotencyKey(format!("{payment_id}:{seq}"))
    }

    /// `init(req)` (§4.9's table). Validates the merchant is active, the
    /// order is unclaimed, and the amount and limits are within policy
    /// before creating the payment in `NEW`.
    #[instrument(skip(self, req), fields(team_slug = %req.team_slug, order_id = %req.order_id))]
    pub async fn init(
        &self,
        req: InitRequest,
    ) -> Result<InitResponse, CoordinatorError> {
        self.rate_limit(&Policy::PAYMENT_INIT, req.team_slug.as_str())
            .await?;

        let merchant = self
            .merchants
            .lookup(&req.team_slug)
            .await
            .filter(|m| m.active)
            .ok_or(CoordinatorError::MerchantInactive)?;

        if req.amount.as_u64() < merchant.min_amount.as_u64()
            || req.amount.as_u64() > merchant.max_amount.as_u64()
        {
            return Err(CoordinatorError::ValidationFailed(
                "amount outside merchant's allowed range".to_string(),
            ));
        }
        if !merchant.supported_currencies.contains(&req.currency) {
            return Err(CoordinatorError::ValidationFailed(
                "unsupported currency".to_string(),
            ));
        }

        let now = TimestampMs::now();
        let payment_id = PaymentId::from_str(&Uuid::new_v4().simple().to_string()[..20])
            .map_err(|e| CoordinatorError::InternalError(e.to_string()))?;
        let payment = Payment {
            internal_id: Uuid::new_v4(),
            payment_id: payment_id.clone(),
            order_id: req.order_id,
            team_slug: req.team_slug,
            amount: req.amount,
            currency: req.currency,
            pay_type: req.pay_type,
            status: PaymentStatus::Init,
            success_url: req.success_url.or(merchant.success_url.clone()),
            fail_url: req.fail_url.or(merchant.fail_url.clone()),
            notification_url: req
                .notification_url
                .or(merchant.notification_url.clone()),
            customer_email: None,
            customer_phone: None,
            receipt: None,
            masked_pan: None,
            authorized_amount: None,
            confirmed_amount: None,
            refunded_amount: None,
            created_at: now,
            updated_at: now,
            expires_at: now
                .checked_add(Duration::from_secs(15 * 60))
                .unwrap_or(now),
            authorized_at: None,
            confirmed_at: None,
            cancelled_at: None,
            version: 0,
        };

        // Open Question (§9): the lock on `order:{team}:{order}` is taken
        // here in addition to the store's unique constraint. The lock is the
        // primary serialization mechanism under contention; the store's
        // uniqueness check remains the backstop (§4.3).
        let order_key = crate::model::order_lock_key(&payment.team_slug, &payment.order_id);
        let order_lease = self
            .locks
            .acquire(
                &order_key,
                &format!("{}:{}", payment.order_id, Uuid::new_v4()),
                LOCK_LEASE_DURATION,
                WRITE_LOCK_WAIT,
            )
            .await
            .map_err(|_| CoordinatorError::LockTimeout)?;

        let created = self.payments.create(payment).await;
        self.release(order_lease).await;
        let created = created.map_err(|e| match e {
            StoreError::DuplicateOrder => CoordinatorError::DuplicateOrder,
            _ => CoordinatorError::InternalError(e.to_string()),
        })?;

        let new_status = self
            .apply_event(&created.payment_id, Event::InitAccepted, None, None)
            .await?;

        info!(payment_id = %payment_id, "payment initialized");
        Ok(InitResponse {
            payment_id: payment_id.clone(),
            payment_url: format!("https://pay.example/form/{payment_id}"),
            status: new_status,
        })
    }

    /// `submitCard(paymentId, cardRef)` — calls the acquirer under lock.
    #[instrument(skip(self, card_ref))]
    pub async fn submit_card(
        &self,
        team_slug: &TeamSlug,
        payment_id: &PaymentId,
        card_ref: &str,
    ) -> Result<PaymentStatus, CoordinatorError> {
        self.rate_limit(&Policy::PROCESSING, "global").await?;
        self.owned_payment(team_slug, payment_id).await?;
        self.apply_event(payment_id, Event::CardSubmitted, Some(card_ref), None)
            .await
    }

    /// `confirm(paymentId, amount?)`.
    #[instrument(skip(self))]
    pub async fn confirm(
        &self,
        team_slug: &TeamSlug,
        payment_id: &PaymentId,
        amount: Option<Amount>,
    ) -> Result<PaymentStatus, CoordinatorError> {
        self.rate_limit(&Policy::GENERAL, team_slug.as_str()).await?;

        let payment = self.owned_payment(team_slug, payment_id).await?;

        if payment.status == PaymentStatus::Confirmed
            && (amount.is_none() || amount == payment.confirmed_amount)
        {
            // Idempotent re-confirm with no amount or the same amount as
            // already recorded: no new transition row (§8). A repeat with a
            // *different* amount is not idempotent and falls through to the
            // normal path, where `propose(Confirmed, ConfirmRequested)`
            // correctly rejects it as an illegal transition.
            return Ok(payment.status);
        }

        let confirm_amount = match amount {
            Some(amount) => {
                let authorized = payment
                    .authorized_amount
                    .ok_or(CoordinatorError::IllegalStateTransition)?;
                if amount.as_u64() > authorized.as_u64() {
                    return Err(CoordinatorError::AmountExceedsAuthorized);
                }
                amount
            }
            None => payment.authorized_amount.unwrap_or(payment.amount),
        };

        let merchant = self
            .merchants
            .lookup(team_slug)
            .await
            .filter(|m| m.active)
            .ok_or(CoordinatorError::MerchantInactive)?;
        let today = TimestampMs::now().day_index();
        let already_today = self
            .payments
            .daily_confirmed_minus_refunded(team_slug, today, payment_id)
            .await;
        if already_today + confirm_amount.as_u64() > merchant.daily_limit.as_u64() {
            return Err(CoordinatorError::LimitExceeded);
        }

        self.apply_event(payment_id, Event::ConfirmRequested, None, Some(confirm_amount))
            .await
    }

    /// `cancel(paymentId)` — branches to pre-auth cancellation or
    /// post-auth reversal depending on current state.
    #[instrument(skip(self))]
    pub async fn cancel(
        &self,
        team_slug: &TeamSlug,
        payment_id: &PaymentId,
    ) -> Result<PaymentStatus, CoordinatorError> {
        self.rate_limit(&Policy::GENERAL, team_slug.as_str()).await?;

        let payment = self.owned_payment(team_slug, payment_id).await?;

        let event = match payment.status {
            PaymentStatus::New | PaymentStatus::FormShowed => {
                Event::CancelRequested
            }
            PaymentStatus::Authorized => Event::ReverseRequested,
            _ => return Err(CoordinatorError::IllegalStateTransition),
        };
        self.apply_event(payment_id, event, None, None).await
    }

    /// `refund(paymentId, amount)`.
    #[instrument(skip(self))]
    pub async fn refund(
        &self,
        team_slug: &TeamSlug,
        payment_id: &PaymentId,
        amount: Amount,
    ) -> Result<PaymentStatus, CoordinatorError> {
        self.rate_limit(&Policy::GENERAL, team_slug.as_str()).await?;

        let payment = self.owned_payment(team_slug, payment_id).await?;

        let confirmed = payment
            .confirmed_amount
            .ok_or(CoordinatorError::IllegalStateTransition)?;
        let already_refunded =
            payment.refunded_amount.map(|a| a.as_u64()).unwrap_or(0);
        if already_refunded + amount.as_u64() > confirmed.as_u64() {
            return Err(CoordinatorError::AmountExceedsAuthorized);
        }

        self.apply_event(payment_id, Event::RefundRequested, None, Some(amount))
            .await
    }

    /// `status(paymentId)` — read-only, pure, repeatable (§8).
    pub async fn status(
        &self,
        team_slug: &TeamSlug,
        payment_id: &PaymentId,
    ) -> Result<Payment, CoordinatorError> {
        self.owned_payment(team_slug, payment_id).await
    }

    /// Proactively transitions every non-terminal payment past its
    /// `expires_at` to `DEADLINE_EXPIRED`, instead of waiting for the lazy
    /// check in [`Self::apply_event_locked`] to be triggered by some other
    /// write touching that same payment. Meant to be driven periodically by
    /// `gateway-node`, e.g. via [`crate::queue::PaymentQueue`]. Returns the
    /// number of payments actually transitioned; a payment that raced past
    /// expiry into a terminal state between the scan and the attempt is not
    /// an error, just uncounted.
    pub async fn sweep_expired_payments(&self) -> usize {
        let now = TimestampMs::now();
        let mut swept = 0;
        for payment_id in self.payments.expired_payment_ids(now).await {
            match self
                .apply_event(&payment_id, Event::DeadlineExpired, None, None)
                .await
            {
                Ok(_) => swept += 1,
                Err(CoordinatorError::IllegalStateTransition)
                | Err(CoordinatorError::NotFound) => {}
                Err(err) => {
                    warn!(%payment_id, %err, "expiry sweep failed for payment");
                }
            }
        }
        swept
    }

    /// Reads `payment_id` and checks it belongs to `team_slug`; payments are
    /// merchant-scoped (§3), so a payment id owned by another team is
    /// reported as `NotFound` rather than leaking its existence.
    async fn owned_payment(
        &self,
        team_slug: &TeamSlug,
        payment_id: &PaymentId,
    ) -> Result<Payment, CoordinatorError> {
        let payment = self
            .payments
            .get_by_payment_id(payment_id)
            .await
            .ok_or(CoordinatorError::NotFound)?;
        if &payment.team_slug != team_slug {
            return Err(CoordinatorError::NotFound);
        }
        Ok(payment)
    }

    async fn rate_limit(
        &self,
        policy: &Policy,
        scope: &str,
    ) -> Result<(), CoordinatorError> {
        match self.rate_limiter.try_acquire(policy, scope, 1.0).await {
            Decision::Allowed => Ok(()),
            Decision::Denied { retry_after } => {
                Err(CoordinatorError::RateLimited {
                    retry_after_ms: retry_after.as_millis() as u64,
                })
            }
        }
    }

    /// The nine-step write path from §4.9: rate-limit (done by callers
    /// above, scoped to the specific policy), lock, re-read, propose,
    /// persist the proposed `*-ing` substate, call acquirer, persist the
    /// terminal substate, release, enqueue webhook.
    async fn apply_event(
        &self,
        payment_id: &PaymentId,
        event: Event,
        card_ref: Option<&str>,
        requested_amount: Option<Amount>,
    ) -> Result<PaymentStatus, CoordinatorError> {
        let lock_key = crate::model::payment_lock_key(payment_id);
        let lease = self
            .locks
            .acquire(
                &lock_key,
                &format!("{payment_id}:{}", Uuid::new_v4()),
                LOCK_LEASE_DURATION,
                WRITE_LOCK_WAIT,
            )
            .await
            .map_err(|_| CoordinatorError::LockTimeout)?;

        let result = self
            .apply_event_locked(payment_id, event, card_ref, requested_amount)
            .await;
        self.release(lease).await;
        result
    }

    async fn release(&self, lease: LockLease) {
        self.locks.release(&lease).await;
    }

    async fn apply_event_locked(
        &self,
        payment_id: &PaymentId,
        event: Event,
        card_ref: Option<&str>,
        requested_amount: Option<Amount>,
    ) -> Result<PaymentStatus, CoordinatorError> {
        for _ in 0..=MAX_CONCURRENCY_RETRIES {
            let payment = self
                .payments
                .get_by_payment_id(payment_id)
                .await
                .ok_or(CoordinatorError::NotFound)?;

            let now = TimestampMs::now();
            let event = if payment.is_expired(now) && !payment.status.is_terminal()
            {
                Event::DeadlineExpired
            } else {
                event
            };

            let proposal = propose(payment.status, event, payment.pay_type)
                .map_err(|_| CoordinatorError::IllegalStateTransition)?;

            // Step 5: persist the proposed substate (e.g. AUTHORIZING,
            // CONFIRMING) before touching the acquirer, so the persisted
            // status sequence is always a legal path through §4.4 rather
            // than jumping straight to the terminal substate.
            let entry_metadata = TransitionMetadata {
                actor: Actor::Merchant,
                ..Default::default()
            };
            let entered = match self
                .payments
                .transition(payment_id, payment.version, proposal.next, entry_metadata)
                .await
            {
                Ok(updated) => updated,
                Err(StoreError::ConcurrencyConflict { .. }) => continue,
                Err(e) => return Err(CoordinatorError::InternalError(e.to_string())),
            };

            if matches!(proposal.entry_action, EntryAction::EnqueueWebhook) {
                self.enqueue_webhook(&entered).await;
            }

            let idempotency_key = self.next_idempotency_key(payment_id);
            let mut terminal_metadata = TransitionMetadata {
                actor: Actor::Merchant,
                ..Default::default()
            };
            let acquirer_outcome = match proposal.entry_action {
                EntryAction::CallAcquirerAuthorize => {
                    let card_ref = card_ref.unwrap_or_default();
                    self.call_authorize(
                        payment_id,
                        &entered,
                        idempotency_key,
                        card_ref,
                        &mut terminal_metadata,
                    )
                    .await?
                }
                EntryAction::CallAcquirerConfirm => {
                    let confirm_amount = requested_amount.unwrap_or_else(|| {
                        entered.authorized_amount.unwrap_or(entered.amount)
                    });
                    self.call_confirm(
                        payment_id,
                        idempotency_key,
                        confirm_amount,
                        &mut terminal_metadata,
                    )
                    .await?
                }
                EntryAction::CallAcquirerReverse => {
                    self.call_reverse(payment_id, idempotency_key).await?
                }
                EntryAction::CallAcquirerRefund => {
                    let refund_amount = requested_amount.ok_or_else(|| {
                        CoordinatorError::InternalError(
                            "refund requires an amount".to_string(),
                        )
                    })?;
                    self.call_refund(
                        payment_id,
                        &entered,
                        idempotency_key,
                        refund_amount,
                        &mut terminal_metadata,
                    )
                    .await?
                }
                EntryAction::None | EntryAction::EnqueueWebhook => None,
            };

            let Some(terminal_status) = acquirer_outcome else {
                // No acquirer call: `entered` already carries the final
                // status for this request (e.g. NEW, FORM_SHOWED, AUTH_FAIL
                // via the already-enqueued-webhook branch above).
                return self.maybe_auto_advance_one_stage(payment_id, entered).await;
            };

            // Step 7: persist the terminal substate reached by the acquirer
            // call, version-gated off the just-persisted entry substate.
            match self
                .payments
                .transition(payment_id, entered.version, terminal_status, terminal_metadata)
                .await
            {
                Ok(updated) => {
                    self.enqueue_webhook(&updated).await;
                    return self.maybe_auto_advance_one_stage(payment_id, updated).await;
                }
                Err(StoreError::ConcurrencyConflict { .. }) => {
                    // The per-payment lock is held for the whole operation,
                    // so nothing else could have touched this payment
                    // between the two persists; a conflict here means the
                    // entry/terminal versions disagree, which is a bug.
                    return Err(CoordinatorError::InternalError(
                        "concurrency conflict persisting terminal substate"
                            .to_string(),
                    ));
                }
                Err(e) => return Err(CoordinatorError::InternalError(e.to_string())),
            }
        }
        Err(CoordinatorError::InternalError(
            "exhausted concurrency retry budget".to_string(),
        ))
    }

    /// Single-stage auto-advance: AUTHORIZED -> CONFIRMING -> CONFIRMED
    /// happens immediately, without a new external request, per §4.4.
    async fn maybe_auto_advance_one_stage(
        &self,
        payment_id: &PaymentId,
        payment: Payment,
    ) -> Result<PaymentStatus, CoordinatorError> {
        if payment.status == PaymentStatus::Authorized
            && payment.pay_type == PayType::OneStage
        {
            return Box::pin(self.apply_event_locked(
                payment_id,
                Event::ConfirmRequested,
                None,
                None,
            ))
            .await;
        }
        Ok(payment.status)
    }

    async fn call_authorize(
        &self,
        payment_id: &PaymentId,
        payment: &Payment,
        idempotency_key: IdempotencyKey,
        card_ref: &str,
        metadata: &mut TransitionMetadata,
    ) -> Result<Option<PaymentStatus>, CoordinatorError> {
        metadata.actor = Actor::Acquirer;
        let outcome = self
            .retrying_acquirer_call(payment_id, || {
                self.acquirer.authorize(AuthorizeRequest {
                    idempotency_key: idempotency_key.clone(),
                    amount: payment.amount,
                    currency: payment.currency.clone(),
                    card_ref: card_ref.to_string(),
                })
            })
            .await?;

        match outcome {
            AuthorizeOutcome::ThreeDsRequired => Ok(Some(PaymentStatus::ThreeDsChecking)),
            AuthorizeOutcome::Approved {
                authorized_amount,
                masked_pan,
            } => {
                metadata.authorized_amount = Some(authorized_amount);
                metadata.masked_pan = Some(mask_pan(&masked_pan));
                Ok(Some(PaymentStatus::Authorized))
            }
            AuthorizeOutcome::Rejected => Ok(Some(PaymentStatus::AuthFail)),
        }
    }

    async fn call_confirm(
        &self,
        payment_id: &PaymentId,
        idempotency_key: IdempotencyKey,
        amount: Amount,
        metadata: &mut TransitionMetadata,
    ) -> Result<Option<PaymentStatus>, CoordinatorError> {
        metadata.actor = Actor::Acquirer;
        self.retrying_acquirer_call(payment_id, || {
            self.acquirer.confirm(ConfirmRequest {
                idempotency_key: idempotency_key.clone(),
                amount,
            })
        })
        .await?;
        metadata.confirmed_amount = Some(amount);
        Ok(Some(PaymentStatus::Confirmed))
    }

    async fn call_reverse(
        &self,
        payment_id: &PaymentId,
        idempotency_key: IdempotencyKey,
    ) -> Result<Option<PaymentStatus>, CoordinatorError> {
        self.retrying_acquirer_call(payment_id, || {
            self.acquirer.reverse(ReverseRequest {
                idempotency_key: idempotency_key.clone(),
            })
        })
        .await?;
        Ok(Some(PaymentStatus::Reversed))
    }

    async fn call_refund(
        &self,
        payment_id: &PaymentId,
        payment: &Payment,
        idempotency_key: IdempotencyKey,
        refund_amount: Amount,
        metadata: &mut TransitionMetadata,
    ) -> Result<Option<PaymentStatus>, CoordinatorError> {
        metadata.actor = Actor::Acquirer;
        let confirmed = payment.confirmed_amount.unwrap_or(payment.amount);
        let already_refunded =
            payment.refunded_amount.map(|a| a.as_u64()).unwrap_or(0);

        self.retrying_acquirer_call(payment_id, || {
            self.acquirer.refund(RefundRequest {
                idempotency_key: idempotency_key.clone(),
                amount: refund_amount,
            })
        })
        .await?;

        let total_refunded = already_refunded + refund_amount.as_u64();
        metadata.refunded_amount =
            Amount::from_minor_units(total_refunded).ok();
        Ok(Some(if total_refunded >= confirmed.as_u64() {
            PaymentStatus::Refunded
        } else {
            PaymentStatus::PartialRefunded
        }))
    }

    /// Retries an acquirer call up to `MAX_ACQUIRER_RETRIES` times on
    /// transport failure before surfacing `AcquirerUnavailable` (§4.9).
    async fn retrying_acquirer_call<T, F, Fut>(
        &self,
        payment_id: &PaymentId,
        mut call: F,
    ) -> Result<T, CoordinatorError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<
            Output = Result<T, crate::acquirer::AcquirerUnavailable>,
        >,
    {
        let mut attempt = 0;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    attempt += 1;
                    if attempt > MAX_ACQUIRER_RETRIES {
                        warn!(
                            payment_id = %payment_id,
                            %err,
                            "acquirer call failed after retry budget"
                        );
                        return Err(CoordinatorError::AcquirerUnavailable);
                    }
                }
            }
        }
    }

    async fn enqueue_webhook(&self, payment: &Payment) {
        let Some(target_url) = payment.notification_url.clone() else {
            return;
        };
        self.webhooks
            .enqueue(crate::model::WebhookDelivery {
                payment_internal_id: payment.internal_id,
                target_url,
                payload: json!({
                    "paymentId": payment.payment_id.as_str(),
                    "orderId": payment.order_id.as_str(),
                    "status": format!("{:?}", payment.status),
                    "amount": payment.amount.as_u64(),
                }),
                attempt_count: 0,
                next_attempt_at: TimestampMs::now(),
                terminal: false,
            })
            .await;
    }
}
