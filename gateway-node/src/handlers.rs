//! The five lifecycle endpoints from §6, plus `submitCard` (§4.9 names it as
//! a coordinator operation but the endpoint table omits it — without it
//! nothing ever drives a payment past `NEW`, so it's exposed the same way as
//! the other writes) and an unauthenticated `/health`.

use std::str::FromStr;

use axum::extract::State;
use gateway_api::response::{ApiError, Envelope, GwJson};
use gateway_common::amount::{Amount, Currency};
use gateway_common::error::{DomainError, ErrorKindGenerated, GatewayErrorKind};
use gateway_common::ids::{OrderId, PaymentId};
use gateway_core::coordinator::{CoordinatorError, InitRequest};
use gateway_core::model::{Payment, PayType, PaymentStatus};
use serde::Serialize;
use serde_json::Value;

use crate::app::AppState;

/// Maps a failed write into the `{success:false, ...}` envelope. Two cases
/// need more than `DomainError::to_kind()` carries: `RateLimited`'s
/// `Retry-After` hint (§6), and `LockTimeout`, which travels under
/// `InternalError`'s wire code but HTTP 503 rather than 500 (§7).
fn coordinator_error_to_api(err: CoordinatorError) -> ApiError {
    let retry_after_ms = match &err {
        CoordinatorError::RateLimited { retry_after_ms } => Some(*retry_after_ms),
        _ => None,
    };
    let is_lock_timeout = matches!(err, CoordinatorError::LockTimeout);
    let domain: DomainError = err.into();
    let mut api_error = ApiError::from_kind(domain.to_kind(), domain.to_string());
    if let Some(ms) = retry_after_ms {
        api_error = api_error.with_retry_after(std::time::Duration::from_millis(ms));
    }
    if is_lock_timeout {
        api_error = api_error
            .with_status(http::StatusCode::SERVICE_UNAVAILABLE)
            .with_retry_after(std::time::Duration::from_secs(1));
    }
    api_error
}

fn ok_response<T: Serialize>(
    status: PaymentStatus,
    details: T,
) -> axum::response::Response {
    use axum::response::IntoResponse;
    axum::Json(Envelope {
        success: true,
        status: Some(format!("{status:?}").to_uppercase()),
        error_code: GatewayErrorKind::Unknown(0).to_code(),
        message: None,
        details,
    })
    .into_response()
}

fn missing_field(field: &str) -> ApiError {
    ApiError::from_kind(GatewayErrorKind::MissingField, format!("missing {field}"))
}

fn invalid_field(field: &str, err: impl std::fmt::Display) -> ApiError {
    ApiError::from_kind(
        GatewayErrorKind::ValidationFailed,
        format!("invalid {field}: {err}"),
    )
}

fn parse_payment_id(value: &Value) -> Result<PaymentId, ApiError> {
    let raw = value
        .get("PaymentId")
        .and_then(Value::as_str)
        .ok_or_else(|| missing_field("PaymentId"))?;
    PaymentId::from_str(raw).map_err(|e| invalid_field("PaymentId", e))
}

fn parse_amount_field(
    value: &Value,
    field: &str,
) -> Result<Option<Amount>, ApiError> {
    match value.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => {
            let units = v
                .as_u64()
                .ok_or_else(|| invalid_field(field, "must be a positive integer"))?;
            Amount::from_minor_units(units)
                .map(Some)
                .map_err(|e| invalid_field(field, e))
        }
    }
}

#[derive(Serialize)]
struct InitDetails {
    #[serde(rename = "PaymentId")]
    payment_id: String,
    #[serde(rename = "PaymentURL")]
    payment_url: String,
}

pub async fn init(
    State(state): State<AppState>,
    GwJson(body): GwJson<Value>,
) -> Result<axum::response::Response, ApiError> {
    let merchant =
        crate::auth::authenticate(&state.coordinator.merchants, &body).await?;

    let order_id = body
        .get("OrderId")
        .and_then(Value::as_str)
        .ok_or_else(|| missing_field("OrderId"))
        .and_then(|s| OrderId::from_str(s).map_err(|e| invalid_field("OrderId", e)))?;
    let amount = parse_amount_field(&body, "Amount")?
        .ok_or_else(|| missing_field("Amount"))?;
    let currency = match body.get("Currency").and_then(Value::as_str) {
        Some(s) => Currency::from_str(s).map_err(|e| invalid_field("Currency", e))?,
        None => Currency::default(),
    };
    let pay_type = match body.get("PayType").and_then(Value::as_str) {
        Some("T") => PayType::TwoStage,
        _ => PayType::OneStage,
    };

    let resp = state
        .coordinator
        .init(InitRequest {
            team_slug: merchant.team_slug,
            order_id,
            amount,
            currency,
            pay_type,
            success_url: None,
            fail_url: None,
            notification_url: None,
        })
        .await
        .map_err(coordinator_error_to_api)?;

    Ok(ok_response(
        resp.status,
        InitDetails {
            payment_id: resp.payment_id.as_str().to_string(),
            payment_url: resp.payment_url,
        },
    ))
}

#[derive(Serialize)]
struct PaymentIdDetails {
    #[serde(rename = "PaymentId")]
    payment_id: String,
}

pub async fn submit_card(
    State(state): State<AppState>,
    GwJson(body): GwJson<Value>,
) -> Result<axum::response::Response, ApiError> {
    let merchant =
        crate::auth::authenticate(&state.coordinator.merchants, &body).await?;
    let payment_id = parse_payment_id(&body)?;
    let card_ref = body
        .get("CardRef")
        .and_then(Value::as_str)
        .ok_or_else(|| missing_field("CardRef"))?;

    let status = state
        .coordinator
        .submit_card(&merchant.team_slug, &payment_id, card_ref)
        .await
        .map_err(coordinator_error_to_api)?;

    Ok(ok_response(
        status,
        PaymentIdDetails {
            payment_id: payment_id.as_str().to_string(),
        },
    ))
}

pub async fn confirm(
    State(state): State<AppState>,
    GwJson(body): GwJson<Value>,
) -> Result<axum::response::Response, ApiError> {
    let merchant =
        crate::auth::authenticate(&state.coordinator.merchants, &body).await?;
    let payment_id = parse_payment_id(&body)?;
    let amount = parse_amount_field(&body, "Amount")?;

    let status = state
        .coordinator
        .confirm(&merchant.team_slug, &payment_id, amount)
        .await
        .map_err(coordinator_error_to_api)?;

    Ok(ok_response(
        status,
        PaymentIdDetails {
            payment_id: payment_id.as_str().to_string(),
        },
    ))
}

pub async fn cancel(
    State(state): State<AppState>,
    GwJson(body): GwJson<Value>,
) -> Result<axum::response::Response, ApiError> {
    let merchant =
        crate::auth::authenticate(&state.coordinator.merchants, &body).await?;
    let payment_id = parse_payment_id(&body)?;

    let status = state
        .coordinator
        .cancel(&merchant.team_slug, &payment_id)
        .await
        .map_err(coordinator_error_to_api)?;

    Ok(ok_response(
        status,
        PaymentIdDetails {
            payment_id: payment_id.as_str().to_string(),
        },
    ))
}

pub async fn refund(
    State(state): State<AppState>,
    GwJson(body): GwJson<Value>,
) -> Result<axum::response::Response, ApiError> {
    let merchant =
        crate::auth::authenticate(&state.coordinator.merchants, &body).await?;
    let payment_id = parse_payment_id(&body)?;
    let amount = parse_amount_field(&body, "Amount")?
        .ok_or_else(|| missing_field("Amount"))?;

    let status = state
        .coordinator
        .refund(&merchant.team_slug, &payment_id, amount)
        .await
        .map_err(coordinator_error_to_api)?;

    Ok(ok_response(
        status,
        PaymentIdDetails {
            payment_id: payment_id.as_str().to_string(),
        },
    ))
}

#[derive(Serialize)]
struct StatusDetails {
    #[serde(rename = "PaymentId")]
    payment_id: String,
    #[serde(rename = "OrderId")]
    order_id: String,
    #[serde(rename = "Amount")]
    amount: u64,
    #[serde(rename = "Currency")]
    currency: String,
    #[serde(rename = "AuthorizedAmount")]
    authorized_amount: Option<u64>,
    #[serde(rename = "ConfirmedAmount")]
    confirmed_amount: Option<u64>,
    #[serde(rename = "RefundedAmount")]
    refunded_amount: Option<u64>,
}

impl From<&Payment> for StatusDetails {
    fn from(p: &Payment) -> Self {
        Self {
            payment_id: p.payment_id.as_str().to_string(),
            order_id: p.order_id.as_str().to_string(),
            amount: p.amount.as_u64(),
            currency: p.currency.as_str().to_string(),
            authorized_amount: p.authorized_amount.map(Amount::as_u64),
            confirmed_amount: p.confirmed_amount.map(Amount::as_u64),
            refunded_amount: p.refunded_amount.map(Amount::as_u64),
        }
    }
}

pub async fn status(
    State(state): State<AppState>,
    GwJson(body): GwJson<Value>,
) -> Result<axum::response::Response, ApiError> {
    let merchant =
        crate::auth::authenticate(&state.coordinator.merchants, &body).await?;
    let payment_id = parse_payment_id(&body)?;

    let payment = state
        .coordinator
        .status(&merchant.team_slug, &payment_id)
        .await
        .map_err(coordinator_error_to_api)?;

    Ok(ok_response(payment.status, StatusDetails::from(&payment)))
}

pub async fn health() -> &'static str {
    "ok"
}
