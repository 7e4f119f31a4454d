//! The boundary to the card acquirer. The spec leaves the wire protocol
//! unspecified (§4.9 deals only in outcomes); this trait is the seam the
//! [coordinator](crate::coordinator) calls through, and is what a real
//! deployment implements against its acquiring bank.

use async_trait::async_trait;
use gateway_common::amount::{Amount, Currency};

/// An idempotency key derived from `PaymentId` + transition sequence number
/// (§4.9), so acquirer-side retries of the same logical step are safe.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct IdempotencyKey(pub String);

#[derive(Clone, Debug)]
pub struct AuthorizeRequest {
    pub idempotency_key: IdempotencyKey,
    pub amount: Amount,
    pub currency: Currency,
    pub card_ref: String,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum AuthorizeOutcome {
    ThreeDsRequired,
    Approved { authorized_amount: Amount, masked_pan: String },
    Rejected,
}

#[derive(Clone, Debug)]
pub struct ConfirmRequest {
    pub idempotency_key: IdempotencyKey,
    pub amount: Amount,
}

#[derive(Clone, Debug)]
pub struct ReverseRequest {
    pub idempotency_key: IdempotencyKey,
}

#[derive(Clone, Debug)]
pub struct RefundRequest {
    pub idempotency_key: IdempotencyKey,
    pub amount: Amount,
}

/// Transport or acquirer-side failure not attributable to the request
/// itself; the coordinator retries these up to a bounded budget (§4.9).
#[derive(thiserror::Error, Clone, Debug, Eq, PartialEq)]
#[error("acquirer unavailable: {0}")]
pub struct AcquirerUnavailable(pub String);

#[async_trait]
pub trait Acquirer: Send + Sync {
    async fn authorize(
        &self,
        req: AuthorizeRequest,
    ) -> Result<AuthorizeOutcome, AcquirerUnavailable>;

    async fn confirm(
        &self,
        req: ConfirmRequest,
    ) -> Result<(), AcquirerUnavailable>;

    async fn reverse(
        &self,
        req: ReverseRequest,
    ) -> Result<(), AcquirerUnavailable>;

    async fn refund(
        &self,
        req: RefundRequest,
    ) -> Result<(), AcquirerUnavailable>;
}
