//! The pure payment lifecycle state machine (§4.4). All side effects live in
//! [`coordinator`](crate::coordinator); this module only decides legality.

use thiserror::Error;

use crate::model::{PayType, PaymentStatus};

/// An event that can move a payment between states.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Event {
    /// `init` accepted, payment persisted.
    InitAccepted,
    /// Customer fetched the payment form.
    FormFetched,
    /// Card data submitted.
    CardSubmitted,
    /// Acquirer demands 3-DS.
    ThreeDsRequired,
    /// 3-DS check completed.
    ThreeDsCompleted { approved: bool },
    /// Acquirer approved authorization directly (no 3-DS).
    Authorized,
    /// Acquirer rejected authorization.
    AuthRejected,
    /// `confirm` invoked; two-stage capture begins.
    ConfirmRequested,
    /// Acquirer confirmed the capture.
    ConfirmSettled,
    /// `cancel` invoked pre-authorization.
    CancelRequested,
    /// Cancellation settled pre-authorization.
    Cancelled,
    /// `cancel` invoked post-authorization (reversal).
    ReverseRequested,
    /// Reversal settled.
    Reversed,
    /// `refund` invoked.
    RefundRequested,
    /// Refund settled, fully covering the confirmed amount.
    RefundSettledFull,
    /// Refund settled, partially covering the confirmed amount.
    RefundSettledPartial,
    /// `now > payment.expires`.
    DeadlineExpired,
    /// Unrecoverable acquirer error.
    AcquirerFailed,
}

/// What the coordinator should do upon entering the new state. Purely
/// descriptive; the coordinator decides how.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum EntryAction {
    None,
    CallAcquirerAuthorize,
    CallAcquirerConfirm,
    CallAcquirerReverse,
    CallAcquirerRefund,
    EnqueueWebhook,
}

#[derive(Debug, Error, Eq, PartialEq)]
#[error("illegal transition: {current:?} does not accept {event:?}")]
pub struct IllegalTransition {
    pub current: PaymentStatus,
    pub event: Event,
}

/// The outcome of a legal [`propose`] call.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Proposal {
    pub next: PaymentStatus,
    pub entry_action: EntryAction,
}

/// Proposes the next state for `current` given `event` and (for events whose
/// legality depends on it) the payment's [`PayType`]. Pure: no I/O, no
/// clock reads — the caller supplies [`Event::DeadlineExpired`] itself after
/// checking `now > payment.expires`.
pub fn propose(
    current: PaymentStatus,
    event: Event,
    pay_type: PayType,
) -> Result<Proposal, IllegalTransition> {
    use Event::*;
    use PaymentStatus as S;

    // A deadline expiry or unrecoverable acquirer error can end any
    // non-terminal state (§4.4's "Any ... state" rules), so check these
    // first regardless of the event-specific match below.
    if !current.is_terminal() {
        match event {
            DeadlineExpired => {
                return Ok(Proposal {
                    next: S::DeadlineExpired,
                    entry_action: EntryAction::EnqueueWebhook,
                })
            }
            AcquirerFailed => {
                return Ok(Proposal {
                    next: S::Failed,
                    entry_action: EntryAction::EnqueueWebhook,
                })
            }
            _ => (),
        }
    }

    let illegal = || IllegalTransition { current, event };

    let proposal = match (current, event) {
        (S::Init, InitAccepted) => Proposal {
            next: S::New,
            entry_action: EntryAction::None,
        },
        (S::New, FormFetched) => Proposal {
            next: S::FormShowed,
            entry_action: EntryAction::None,
        },
        (S::New, CardSubmitted) | (S::FormShowed, CardSubmitted) => Proposal {
            next: S::Authorizing,
            entry_action: EntryAction::CallAcquirerAuthorize,
        },
        (S::Authorizing, ThreeDsRequired) => Proposal {
            next: S::ThreeDsChecking,
            entry_action: EntryAction::None,
        },
        (S::ThreeDsChecking, ThreeDsCompleted { approved: true }) => Proposal {
            next: S::ThreeDsChecked,
            entry_action: EntryAction::None,
        },
        (S::ThreeDsChecking, ThreeDsCompleted { approved: false }) => {
            Proposal {
                next: S::AuthFail,
                entry_action: EntryAction::EnqueueWebhook,
            }
        }
        (S::ThreeDsChecked, Authorized) | (S::Authorizing, Authorized) => {
            let entry_action = match pay_type {
                // Single-stage auto-advances past AUTHORIZED; the coordinator
                // immediately re-proposes ConfirmRequested/ConfirmSettled.
                PayType::OneStage => EntryAction::None,
                PayType::TwoStage => EntryAction::EnqueueWebhook,
            };
            Proposal {
                next: S::Authorized,
                entry_action,
            }
        }
        (S::ThreeDsChecked, AuthRejected) | (S::Authorizing, AuthRejected) => {
            Proposal {
                next: S::AuthFail,
                entry_action: EntryAction::EnqueueWebhook,
            }
        }
        (S::Authorized, ConfirmRequested) => Proposal {
            next: S::Confirming,
            entry_action: EntryAction::CallAcquirerConfirm,
        },
        (S::Confirming, ConfirmSettled) => Proposal {
            next: S::Confirmed,
            entry_action: EntryAction::EnqueueWebhook,
        },
        (S::New, CancelRequested) | (S::FormShowed, CancelRequested) => {
            Proposal {
                next: S::Cancelling,
                entry_action: EntryAction::None,
            }
        }
        (S::Cancelling, Cancelled) => Proposal {
            next: S::Cancelled,
            entry_action: EntryAction::EnqueueWebhook,
        },
        (S::Authorized, ReverseRequested) => Proposal {
            next: S::Reversing,
            entry_action: EntryAction::CallAcquirerReverse,
        },
        (S::Reversing, Reversed) => Proposal {
            next: S::Reversed,
            entry_action: EntryAction::EnqueueWebhook,
        },
        (S::Confirmed, RefundRequested)
        | (S::PartialRefunded, RefundRequested) => Proposal {
            next: S::Refunding,
            entry_action: EntryAction::CallAcquirerRefund,
        },
        (S::Refunding, RefundSettledFull) => Proposal {
            next: S::Refunded,
            entry_action: EntryAction::EnqueueWebhook,
        },
        (S::Refunding, RefundSettledPartial) => Proposal {
            next: S::PartialRefunded,
            entry_action: EntryAction::EnqueueWebhook,
        },
        _ => return Err(illegal()),
    };

    Ok(proposal)
}

/// All states reachable from [`PaymentStatus::Init`] by at least one legal
/// path, used by property tests to sample realistic current states.
pub const ALL_STATES: &[PaymentStatus] = &[
    PaymentStatus::Init,
    PaymentStatus::New,
    PaymentStatus::FormShowed,
    PaymentStatus::Authorizing,
    PaymentStatus::ThreeDsChecking,
    PaymentStatus::ThreeDsChecked,
    PaymentStatus::Authorized,
    PaymentStatus::AuthFail,
    PaymentStatus::Confirming,
    PaymentStatus::Confirmed,
    PaymentStatus::Cancelling,
    PaymentStatus::Cancelled,
    PaymentStatus::Reversing,
    PaymentStatus::Reversed,
    PaymentStatus::Refunding,
    PaymentStatus::Refunded,
    PaymentStatus::PartialRefunded,
    PaymentStatus::Rejected,
    PaymentStatus::DeadlineExpired,
    PaymentStatus::Failed,
];
