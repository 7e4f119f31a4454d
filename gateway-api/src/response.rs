//! The `{Success, Status, ErrorCode, Message, Details}` response envelope
//! (§6), plus [`GwJson`]/[`GwQuery`] extractors that conform to it.

use async_trait::async_trait;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::FromRequest;
use axum::response::IntoResponse;
use gateway_common::error::{
    ErrorCode, ErrorKindGenerated, GatewayErrorKind, ToHttpStatus,
};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// The envelope every write endpoint's response conforms to.
#[derive(Clone, Debug, Serialize)]
pub struct Envelope<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(rename = "errorCode")]
    pub error_code: ErrorCode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(flatten)]
    pub details: T,
}

/// The gateway's API error type. Implements [`IntoResponse`], always
/// serializing to the success-envelope's error shape and never leaking
/// internal error detail.
#[derive(Debug)]
pub struct ApiError {
    pub kind: GatewayErrorKind,
    pub msg: String,
    pub correlation_id: String,
    pub retry_after: Option<std::time::Duration>,
    /// Overrides `kind.to_http_status()` for the rare case where the wire
    /// error code and the HTTP status it should travel with disagree, e.g.
    /// a lock timeout (§7: surfaced as `InternalError`'s code, but HTTP 503
    /// with a retry hint rather than 500).
    pub status_override: Option<http::StatusCode>,
}

impl ApiError {
    pub fn from_kind(kind: GatewayErrorKind, msg: impl Into<String>) -> Self {
        Self {
            kind,
            msg: msg.into(),
            correlation_id: gateway_common::correlation::new_correlation_id(),
            retry_after: None,
            status_override: None,
        }
    }

    pub fn with_correlation_id(mut self, correlation_id: String) -> Self {
        self.correlation_id = correlation_id;
        self
    }

    pub fn with_retry_after(mut self, retry_after: std::time::Duration) -> Self {
        self.retry_after = Some(retry_after);
        self
    }

    pub fn with_status(mut self, status: http::StatusCode) -> Self {
        self.status_override = Some(status);
        self
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self
            .status_override
            .unwrap_or_else(|| self.kind.to_http_status());
        let body = serde_json::json!({
            "success": false,
            "errorCode": self.kind.to_code(),
            "message": self.msg,
            "correlationId": self.correlation_id,
        });
        let mut response = (status, axum::Json(body)).into_response();
        if let Some(retry_after) = self.retry_after {
            if let Ok(value) =
                http::HeaderValue::from_str(&retry_after.as_secs().to_string())
            {
                response
                    .headers_mut()
                    .insert(http::header::RETRY_AFTER, value);
            }
        }
        response
    }
}

/// A version of [`axum::Json`] whose rejections conform to the gateway's
/// error envelope instead of a bare string body.
pub struct GwJson<T>(pub T);

#[async_trait]
impl<T: DeserializeOwned, S: Send + Sync> FromRequest<S> for GwJson<T> {
    type Rejection = ApiError;

    async fn from_request(
        req: http::Request<axum::body::Body>,
        state: &S,
    ) -> Result<Self, Self::Rejection> {
        axum::Json::from_request(req, state)
            .await
            .map(|axum::Json(t)| Self(t))
            .map_err(rejection_to_api_error)
    }
}

impl<T: Serialize> IntoResponse for GwJson<T> {
    fn into_response(self) -> axum::response::Response {
        axum::Json(self.0).into_response()
    }
}

fn rejection_to_api_error(rejection: JsonRejection) -> ApiError {
    ApiError::from_kind(
        GatewayErrorKind::MissingField,
        format!("Bad JSON: {rejection}"),
    )
}

pub mod extract {
    use axum::extract::FromRequestParts;

    use super::*;

    /// A version of [`axum::extract::Query`] whose rejections conform to the
    /// gateway's error envelope.
    pub struct GwQuery<T>(pub T);

    #[async_trait]
    impl<T: DeserializeOwned, S: Send + Sync> FromRequestParts<S> for GwQuery<T> {
        type Rejection = ApiError;

        async fn from_request_parts(
            parts: &mut http::request::Parts,
            state: &S,
        ) -> Result<Self, Self::Rejection> {
            axum::extract::Query::from_request_parts(parts, state)
                .await
                .map(|axum::extract::Query(t)| Self(t))
                .map_err(query_rejection_to_api_error)
        }
    }

    fn query_rejection_to_api_error(rejection: QueryRejection) -> ApiError {
        ApiError::from_kind(
            GatewayErrorKind::MissingField,
            format!("Bad query string: {rejection}"),
        )
    }
}
