//! Request authentication (§4.1/§6): every write endpoint's JSON body
//! carries `TeamSlug` and `Token` alongside its operation-specific fields.
//! `Token` is verified against the merchant's stored password hash with
//! [`gateway_common::token::verify_signature`] before the body is parsed
//! into its operation-specific request type.

use std::collections::BTreeMap;
use std::str::FromStr;

use gateway_api::response::ApiError;
use gateway_common::error::GatewayErrorKind;
use gateway_common::ids::TeamSlug;
use gateway_common::token::verify_signature;
use gateway_core::merchant_store::{MerchantSource, MerchantStore};
use gateway_core::model::Merchant;
use serde_json::Value;

/// Verifies `body`'s `Token` field against the merchant named by its
/// `TeamSlug` field, returning the merchant on success. `body` must be a
/// JSON object; anything else is a `MissingField`.
pub async fn authenticate<S: MerchantSource>(
    merchants: &MerchantStore<S>,
    body: &Value,
) -> Result<Merchant, ApiError> {
    let fields = body.as_object().ok_or_else(|| {
        ApiError::from_kind(
            GatewayErrorKind::MissingField,
            "request body must be a JSON object".to_string(),
        )
    })?;

    let team_slug_str = fields
        .get("TeamSlug")
        .and_then(Value::as_str)
        .ok_or_else(|| {
            ApiError::from_kind(
                GatewayErrorKind::MissingField,
                "missing TeamSlug".to_string(),
            )
        })?;
    let token = fields.get("Token").and_then(Value::as_str).ok_or_else(|| {
        ApiError::from_kind(
            GatewayErrorKind::MissingField,
            "missing Token".to_string(),
        )
    })?;
    let team_slug = TeamSlug::from_str(team_slug_str).map_err(|e| {
        ApiError::from_kind(GatewayErrorKind::ValidationFailed, e.to_string())
    })?;

    let merchant = merchants
        .lookup(&team_slug)
        .await
        .filter(|m| m.active)
        .ok_or_else(|| {
            ApiError::from_kind(
                GatewayErrorKind::AuthenticationFailed,
                "unknown or inactive merchant".to_string(),
            )
        })?;

    let scalar_fields: BTreeMap<String, Value> = fields
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    if !verify_signature(&scalar_fields, &merchant.password_hash, token) {
        return Err(ApiError::from_kind(
            GatewayErrorKind::AuthenticationFailed,
            "token signature mismatch".to_string(),
        ));
    }

    Ok(merchant)
}
