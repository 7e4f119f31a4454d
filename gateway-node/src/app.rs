//! Wires the gateway's collaborators into a [`LifecycleCoordinator`], builds
//! the HTTP router, and runs everything to completion against a
//! [`ShutdownChannel`] — the `gateway-node` analogue of the teacher's
//! `node::run::UserNode` / server bring-up.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::routing::post;
use axum::Router;
use gateway_api::server::LayerConfig;
use gateway_common::amount::{Amount, Currency};
use gateway_common::ids::TeamSlug;
use gateway_common::shutdown::ShutdownChannel;
use gateway_core::coordinator::LifecycleCoordinator;
use gateway_core::lock::LockService;
use gateway_core::merchant_store::{MerchantStore, StaticMerchantSource};
use gateway_core::model::Merchant;
use gateway_core::queue::PaymentQueue;
use gateway_core::rate_limit::RateLimiter;
use gateway_core::test_support::ScriptedAcquirer;
use gateway_core::webhook::{ReqwestWebhookSink, WebhookNotifier};
use sha2::{Digest, Sha256};
use std::str::FromStr;
use tokio::sync::mpsc;
use tracing::info;

use crate::config::GatewayConfig;

/// A demo merchant seeded into the in-memory [`StaticMerchantSource`], since
/// this crate has no `teams` table to read from (§6 scopes persistence out
/// of core scope).
pub struct DemoMerchantSeed {
    pub team_slug: String,
    pub password: String,
    pub daily_limit: u64,
}

pub type Coordinator =
    LifecycleCoordinator<ScriptedAcquirer, StaticMerchantSource, ReqwestWebhookSink>;

#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<Coordinator>,
}

fn hash_password(password: &str) -> String {
    let digest = Sha256::digest(password.as_bytes());
    hex::encode(digest)
}

fn seed_merchant_source(seed: &DemoMerchantSeed) -> anyhow::Result<StaticMerchantSource> {
    let team_slug = TeamSlug::from_str(&seed.team_slug)
        .map_err(|e| anyhow::anyhow!("invalid --demo-team-slug: {e}"))?;
    let daily_limit = Amount::from_minor_units(seed.daily_limit)
        .map_err(|e| anyhow::anyhow!("invalid --demo-daily-limit: {e}"))?;

    let mut source = StaticMerchantSource::new();
    source.insert(Merchant {
        team_slug,
        password_hash: hash_password(&seed.password),
        active: true,
        success_url: None,
        fail_url: None,
        notification_url: None,
        supported_currencies: vec![Currency::default()],
        min_amount: Amount::from_minor_units(100)?,
        max_amount: daily_limit,
        daily_limit,
        monthly_limit: daily_limit,
    });
    Ok(source)
}

pub fn build_router(state: AppState) -> Router<()> {
    Router::new()
        .route("/api/payment/init", post(crate::handlers::init))
        .route("/api/payment/submit_card", post(crate::handlers::submit_card))
        .route("/api/payment/confirm", post(crate::handlers::confirm))
        .route("/api/payment/cancel", post(crate::handlers::cancel))
        .route("/api/payment/refund", post(crate::handlers::refund))
        .route("/api/payment/status", post(crate::handlers::status))
        .route("/health", axum::routing::get(crate::handlers::health))
        .with_state(state)
}

pub async fn run(
    addr: SocketAddr,
    config: GatewayConfig,
    demo_merchant: DemoMerchantSeed,
) -> anyhow::Result<()> {
    let merchant_source = seed_merchant_source(&demo_merchant)?;

    let locks = LockService::new();
    let rate_limiter = RateLimiter::new();
    let payments = gateway_core::payment_store::PaymentStore::new();
    let merchants = MerchantStore::new(merchant_source, Duration::from_secs(60));
    let acquirer = ScriptedAcquirer::new();
    let webhook_sink = ReqwestWebhookSink::new(config.webhook.timeout());
    let webhooks = WebhookNotifier::new(webhook_sink, config.webhook.to_core());

    let coordinator = Arc::new(LifecycleCoordinator::new(
        locks,
        rate_limiter,
        payments,
        merchants,
        acquirer,
        webhooks,
    ));

    let shutdown = ShutdownChannel::new();

    let router = build_router(AppState {
        coordinator: coordinator.clone(),
    });
    let (server_task, bound_addr) = gateway_api::server::spawn_server_task(
        addr,
        router,
        LayerConfig::default(),
        "gateway-node",
        shutdown.clone(),
    )?;
    info!(%bound_addr, "gateway-node listening");

    let (queue, queue_worker_tasks) =
        PaymentQueue::spawn(config.queue.to_core(), shutdown.clone());

    let mut static_tasks = vec![server_task];
    static_tasks.extend(queue_worker_tasks);
    static_tasks.extend(crate::background::spawn(
        coordinator.clone(),
        Arc::new(queue),
        &config,
        shutdown.clone(),
    ));

    let (_eph_tx, eph_rx) = mpsc::channel(1);

    let ctrl_c_shutdown = shutdown.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        info!("received Ctrl-C, shutting down");
        ctrl_c_shutdown.send();
    });

    gateway_common::task::try_join_tasks_and_shutdown(
        static_tasks,
        eph_rx,
        shutdown,
        Duration::from_secs(10),
    )
    .await
    .map_err(anyhow::Error::from)
}

#[cfg(test)]
mod test {
    use axum::body::Body;
    use gateway_common::token::compute_signature;
    use http::{Request, StatusCode};
    use serde_json::{json, Value};
    use std::collections::BTreeMap;
    use tower::ServiceExt;

    use super::*;

    fn test_state() -> AppState {
        let seed = DemoMerchantSeed {
            team_slug: "demo-team".to_string(),
            password: "demo-password".to_string(),
            daily_limit: 9_999_999,
        };
        let merchants = MerchantStore::new(
            seed_merchant_source(&seed).unwrap(),
            Duration::from_secs(60),
        );
        let coordinator = Arc::new(LifecycleCoordinator::new(
            LockService::new(),
            RateLimiter::new(),
            gateway_core::payment_store::PaymentStore::new(),
            merchants,
            ScriptedAcquirer::new(),
            WebhookNotifier::new(
                ReqwestWebhookSink::new(Duration::from_secs(5)),
                gateway_core::webhook::WebhookConfig::default(),
            ),
        ));
        AppState { coordinator }
    }

    fn signed_body(mut fields: serde_json::Map<String, Value>) -> Value {
        fields.insert("TeamSlug".to_string(), json!("demo-team"));
        let scalars: BTreeMap<String, Value> = fields
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let token = compute_signature(&scalars, &hash_password("demo-password"));
        fields.insert("Token".to_string(), json!(token));
        Value::Object(fields)
    }

    async fn post(router: &Router<()>, path: &str, body: Value) -> (StatusCode, Value) {
        let response = router
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(path)
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: Value = serde_json::from_slice(&bytes).unwrap();
        (status, json)
    }

    #[tokio::test]
    async fn health_is_unauthenticated() {
        let router = build_router(test_state());
        let response = router
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn init_then_submit_card_then_confirm() {
        let router = build_router(test_state());

        let mut init_fields = serde_json::Map::new();
        init_fields.insert("OrderId".to_string(), json!("order-1"));
        init_fields.insert("Amount".to_string(), json!(50_000));
        init_fields.insert("PayType".to_string(), json!("T"));
        let (status, body) = post(
            &router,
            "/api/payment/init",
            signed_body(init_fields),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], json!(true));
        let payment_id = body["PaymentId"].as_str().unwrap().to_string();

        let mut card_fields = serde_json::Map::new();
        card_fields.insert("PaymentId".to_string(), json!(payment_id.clone()));
        card_fields.insert("CardRef".to_string(), json!("4111111111111111"));
        let (status, body) = post(
            &router,
            "/api/payment/submit_card",
            signed_body(card_fields),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], json!("AUTHORIZED"));

        let mut confirm_fields = serde_json::Map::new();
        confirm_fields.insert("PaymentId".to_string(), json!(payment_id));
        let (status, body) = post(
            &router,
            "/api/payment/confirm",
            signed_body(confirm_fields),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], json!("CONFIRMED"));
    }

    #[tokio::test]
    async fn status_reports_amounts_after_confirm() {
        let router = build_router(test_state());

        let mut init_fields = serde_json::Map::new();
        init_fields.insert("OrderId".to_string(), json!("order-2"));
        init_fields.insert("Amount".to_string(), json!(50_000));
        let (_, body) = post(&router, "/api/payment/init", signed_body(init_fields)).await;
        let payment_id = body["PaymentId"].as_str().unwrap().to_string();

        let mut card_fields = serde_json::Map::new();
        card_fields.insert("PaymentId".to_string(), json!(payment_id.clone()));
        card_fields.insert("CardRef".to_string(), json!("4111111111111111"));
        post(&router, "/api/payment/submit_card", signed_body(card_fields)).await;

        let mut status_fields = serde_json::Map::new();
        status_fields.insert("PaymentId".to_string(), json!(payment_id));
        let (status, body) = post(&router, "/api/payment/status", signed_body(status_fields)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], json!("CONFIRMED"));
        assert_eq!(body["ConfirmedAmount"], json!(50_000));
    }

    #[tokio::test]
    async fn cancel_on_fresh_payment_succeeds() {
        let router = build_router(test_state());

        let mut init_fields = serde_json::Map::new();
        init_fields.insert("OrderId".to_string(), json!("order-3"));
        init_fields.insert("Amount".to_string(), json!(50_000));
        let (_, body) = post(&router, "/api/payment/init", signed_body(init_fields)).await;
        let payment_id = body["PaymentId"].as_str().unwrap().to_string();

        let mut cancel_fields = serde_json::Map::new();
        cancel_fields.insert("PaymentId".to_string(), json!(payment_id));
        let (status, body) = post(&router, "/api/payment/cancel", signed_body(cancel_fields)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], json!("CANCELLING"));
    }

    #[tokio::test]
    async fn refund_beyond_confirmed_amount_is_rejected() {
        let router = build_router(test_state());

        let mut init_fields = serde_json::Map::new();
        init_fields.insert("OrderId".to_string(), json!("order-4"));
        init_fields.insert("Amount".to_string(), json!(50_000));
        let (_, body) = post(&router, "/api/payment/init", signed_body(init_fields)).await;
        let payment_id = body["PaymentId"].as_str().unwrap().to_string();

        let mut card_fields = serde_json::Map::new();
        card_fields.insert("PaymentId".to_string(), json!(payment_id.clone()));
        card_fields.insert("CardRef".to_string(), json!("4111111111111111"));
        post(&router, "/api/payment/submit_card", signed_body(card_fields)).await;

        let mut refund_fields = serde_json::Map::new();
        refund_fields.insert("PaymentId".to_string(), json!(payment_id));
        refund_fields.insert("Amount".to_string(), json!(999_999));
        let (status, body) = post(&router, "/api/payment/refund", signed_body(refund_fields)).await;
        assert_ne!(status, StatusCode::OK);
        assert_eq!(body["success"], json!(false));
    }

    #[tokio::test]
    async fn bad_token_is_unauthorized() {
        let router = build_router(test_state());
        let body = json!({"TeamSlug": "demo-team", "OrderId": "o1", "Amount": 1000, "Token": "bad"});
        let (status, body) = post(&router, "/api/payment/init", body).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["success"], json!(false));
    }
}
