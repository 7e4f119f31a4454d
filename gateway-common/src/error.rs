//! Serializable API error types and error kinds returned by the gateway.

#![deny(non_snake_case)]

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The common serialized representation for every [`GatewayErrorKind`].
pub type ErrorCode = u16;

/// The only error struct actually sent across the wire. Never carries
/// secrets (password hashes, tokens, full PAN) - see
/// [`crate::pan::mask_pan`].
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: ErrorCode,
    pub msg: String,
    /// Correlation id for cross-referencing logs, per §7's observable
    /// failure behaviour rule.
    pub correlation_id: String,
}

/// Methods generated by the [`error_kind!`] macro.
pub trait ErrorKindGenerated:
    Copy + Clone + Default + Eq + PartialEq + fmt::Debug + fmt::Display + From<ErrorCode> + Sized + 'static
{
    /// All known variants, excluding `Unknown(_)`.
    const KINDS: &'static [Self];

    fn is_unknown(&self) -> bool;
    fn to_name(self) -> &'static str;
    fn to_msg(self) -> &'static str;
    fn to_code(self) -> ErrorCode;
    fn from_code(code: ErrorCode) -> Self;
}

/// Generates [`ErrorKindGenerated`] (and dependent trait impls) for an error
/// kind enum.
///
/// All error kind types must have an `Unknown(ErrorCode)` variant, listed
/// first, to preserve the code of errors unrecognized by this build.
/// Doc strings on variants become [`ErrorKindGenerated::to_msg`] and the
/// [`fmt::Display`] impl.
#[macro_export]
macro_rules! error_kind {
    {
        $(#[$enum_meta:meta])*
        pub enum $error_kind_name:ident {
            $( #[doc = $unknown_msg:literal] )*
            Unknown(ErrorCode),

            $(
                $( #[doc = $item_msg:literal] )*
                $item_name:ident = $item_code:literal
            ),*
            $(,)?
        }
    } => {
        $(#[$enum_meta])*
        pub enum $error_kind_name {
            $( #[doc = $unknown_msg] )*
            Unknown(ErrorCode),
            $(
                $( #[doc = $item_msg] )*
                $item_name
            ),*
        }

        impl $crate::error::ErrorKindGenerated for $error_kind_name {
            const KINDS: &'static [Self] = &[
                $( Self::$item_name, )*
            ];

            #[inline]
            fn is_unknown(&self) -> bool {
                matches!(self, Self::Unknown(_))
            }

            fn to_name(self) -> &'static str {
                match self {
                    $( Self::$item_name => stringify!($item_name), )*
                    Self::Unknown(_) => "Unknown",
                }
            }

            fn to_msg(self) -> &'static str {
                match self {
                    $( Self::$item_name => concat!($( $item_msg, )*), )*
                    Self::Unknown(_) => concat!($( $unknown_msg, )*),
                }
            }

            fn to_code(self) -> $crate::error::ErrorCode {
                match self {
                    $( Self::$item_name => $item_code, )*
                    Self::Unknown(code) => code,
                }
            }

            fn from_code(code: $crate::error::ErrorCode) -> Self {
                #[deny(unreachable_patterns)]
                match code {
                    0 => Self::Unknown(0),
                    $( $item_code => Self::$item_name, )*
                    _ => Self::Unknown(code),
                }
            }
        }

        impl Default for $error_kind_name {
            fn default() -> Self {
                Self::Unknown(0)
            }
        }

        impl fmt::Display for $error_kind_name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                use $crate::error::ErrorKindGenerated;
                let name = (*self).to_name();
                let msg = (*self).to_msg();
                let code = (*self).to_code();
                write!(f, "[{code}={name}] {msg}")
            }
        }

        impl From<$crate::error::ErrorCode> for $error_kind_name {
            #[inline]
            fn from(code: $crate::error::ErrorCode) -> Self {
                use $crate::error::ErrorKindGenerated;
                Self::from_code(code)
            }
        }

        impl From<$error_kind_name> for $crate::error::ErrorCode {
            #[inline]
            fn from(val: $error_kind_name) -> $crate::error::ErrorCode {
                use $crate::error::ErrorKindGenerated;
                val.to_code()
            }
        }
    }
}

/// Maps an error kind to the HTTP status code returned alongside it.
pub trait ToHttpStatus {
    fn to_http_status(&self) -> http::StatusCode;
}

error_kind! {
    /// Error kinds surfaced to gateway callers (§7).
    #[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
    pub enum GatewayErrorKind {
        /// Unknown error
        Unknown(ErrorCode),

        /// Required field is missing from the request
        MissingField = 201,
        /// Payment is in a terminal state and cannot accept new writes
        TerminalBlocked = 202,
        /// Token signature did not match
        AuthenticationFailed = 204,
        /// Payment not found
        NotFound = 205,
        /// Request field failed validation
        ValidationFailed = 251,
        /// Requested transition is not legal from the current state
        IllegalStateTransition = 1003,
        /// Confirm/refund amount exceeds the authorized amount
        AmountExceedsAuthorized = 1007,
        /// Authentication is required for this operation
        AuthenticationRequired = 4001,
        /// Internal authentication error
        InternalAuthError = 9007,
        /// Unexpected internal error (legacy code)
        InternalErrorLegacy = 99,
        /// Unexpected internal error
        InternalError = 999,
    }
}

impl ToHttpStatus for GatewayErrorKind {
    fn to_http_status(&self) -> http::StatusCode {
        use http::StatusCode as S;
        match self {
            Self::Unknown(_) => S::INTERNAL_SERVER_ERROR,
            Self::MissingField => S::BAD_REQUEST,
            Self::TerminalBlocked => S::CONFLICT,
            Self::AuthenticationFailed => S::UNAUTHORIZED,
            Self::NotFound => S::NOT_FOUND,
            Self::ValidationFailed => S::BAD_REQUEST,
            Self::IllegalStateTransition => S::CONFLICT,
            Self::AmountExceedsAuthorized => S::BAD_REQUEST,
            Self::AuthenticationRequired => S::UNAUTHORIZED,
            Self::InternalAuthError => S::INTERNAL_SERVER_ERROR,
            Self::InternalErrorLegacy => S::INTERNAL_SERVER_ERROR,
            Self::InternalError => S::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Errors surfaced by [`GatewayErrorKind`] variants not directly tied to a
/// numeric code above: these map onto one of the codes at the API boundary.
#[derive(Error, Clone, Debug, Eq, PartialEq, Hash)]
pub enum DomainError {
    #[error("duplicate order")]
    DuplicateOrder,
    #[error("amount exceeds authorized")]
    AmountExceedsAuthorized,
    #[error("limit exceeded")]
    LimitExceeded,
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },
    #[error("lock timeout")]
    LockTimeout,
    #[error("deadlock detected")]
    Deadlock,
    #[error("acquirer unavailable")]
    AcquirerUnavailable,
    #[error("acquirer rejected")]
    AcquirerRejected,
    #[error("expired")]
    Expired,
    #[error("illegal state transition")]
    IllegalStateTransition,
    #[error("not found")]
    NotFound,
    #[error("validation failed: {0}")]
    ValidationFailed(String),
    #[error("authentication failed")]
    AuthenticationFailed,
    #[error("merchant inactive")]
    MerchantInactive,
    #[error("internal error")]
    InternalError,
}

impl DomainError {
    pub fn to_kind(&self) -> GatewayErrorKind {
        match self {
            Self::DuplicateOrder => GatewayErrorKind::ValidationFailed,
            Self::AmountExceedsAuthorized => {
                GatewayErrorKind::AmountExceedsAuthorized
            }
            Self::LimitExceeded => GatewayErrorKind::ValidationFailed,
            Self::RateLimited { .. } => GatewayErrorKind::ValidationFailed,
            Self::LockTimeout => GatewayErrorKind::InternalError,
            Self::Deadlock => GatewayErrorKind::InternalError,
            Self::AcquirerUnavailable => GatewayErrorKind::InternalError,
            Self::AcquirerRejected => GatewayErrorKind::InternalError,
            Self::Expired => GatewayErrorKind::TerminalBlocked,
            Self::IllegalStateTransition => {
                GatewayErrorKind::IllegalStateTransition
            }
            Self::NotFound => GatewayErrorKind::NotFound,
            Self::ValidationFailed(_) => GatewayErrorKind::ValidationFailed,
            Self::AuthenticationFailed => {
                GatewayErrorKind::AuthenticationFailed
            }
            Self::MerchantInactive => GatewayErrorKind::AuthenticationRequired,
            Self::InternalError => GatewayErrorKind::InternalError,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn round_trips_known_codes() {
        for &kind in GatewayErrorKind::KINDS {
            let code = kind.to_code();
            assert_eq!(GatewayErrorKind::from_code(code), kind);
        }
    }

    #[test]
    fn unknown_code_round_trips() {
        let kind = GatewayErrorKind::from_code(12345);
        assert!(kind.is_unknown());
        assert_eq!(kind.to_code(), 12345);
    }

    #[test]
    fn domain_error_maps_to_spec_codes() {
        assert_eq!(
            DomainError::AmountExceedsAuthorized.to_kind().to_code(),
            1007
        );
        assert_eq!(
            DomainError::IllegalStateTransition.to_kind().to_code(),
            1003
        );
        assert_eq!(DomainError::AuthenticationFailed.to_kind().to_code(), 204);
        assert_eq!(DomainError::NotFound.to_kind().to_code(), 205);
    }
}
