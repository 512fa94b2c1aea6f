use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use chrono::{Duration, Utc};
use fieldops_api::middleware::Claims;
use fieldops_api::{app, signature, AppState, Repositories};
use fieldops_catalog::{CatalogEntry, ItemType, Technician};
use fieldops_core::{GeoPoint, Role, UserRecord};
use fieldops_store::app_config::{
    AuthConfig, BusinessRules, Config, DatabaseConfig, GatewayConfig, ServerConfig, WebhookConfig,
};
use fieldops_store::MemoryStore;
use jsonwebtoken::{encode, EncodingKey, Header};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;

const JWT_SECRET: &str = "integration-secret";
const STRIPE_SECRET: &str = "whsec_integration";

struct TestApp {
    router: Router,
    admin: Uuid,
    client: Uuid,
    technician: Uuid,
    labour: Uuid,
    valve: Uuid,
}

fn config() -> Config {
    Config {
        server: ServerConfig { port: 0 },
        database: DatabaseConfig::default(),
        auth: AuthConfig {
            jwt_secret: JWT_SECRET.to_string(),
        },
        webhooks: WebhookConfig {
            stripe_secret: Some(STRIPE_SECRET.to_string()),
            paypal_secret: None,
            tolerance_seconds: 300,
            allow_unsigned: false,
        },
        business_rules: BusinessRules::default(),
        gateway: GatewayConfig {
            failure_threshold: 2,
            reset_timeout_seconds: 600,
        },
    }
}

async fn setup() -> TestApp {
    setup_with(config()).await
}

async fn setup_with(config: Config) -> TestApp {
    let store = Arc::new(MemoryStore::new());
    let admin = Uuid::new_v4();
    let client = Uuid::new_v4();
    let technician = Uuid::new_v4();

    for (id, role) in [(admin, Role::Admin), (client, Role::Client)] {
        store
            .add_user(UserRecord {
                id,
                name: role.to_string(),
                email: None,
                role,
            })
            .await;
    }
    store
        .add_technician(Technician {
            id: technician,
            name: "Riley".into(),
            qualification: "hvac".into(),
            location: GeoPoint::new(34.0522, -118.2437),
            available_from: Utc::now() - Duration::days(1),
            rating: 4.2,
        })
        .await;

    let labour = CatalogEntry::new(ItemType::Service, "Labour hour", Decimal::from(50));
    let valve = CatalogEntry::new(ItemType::Material, "Valve", Decimal::from(100));
    let (labour_id, valve_id) = (labour.id, valve.id);
    store.add_catalog_entry(labour).await;
    store.add_catalog_entry(valve).await;

    let state = AppState::new(Repositories::in_memory(store), &config);
    TestApp {
        router: app(state),
        admin,
        client,
        technician,
        labour: labour_id,
        valve: valve_id,
    }
}

fn token(user_id: Uuid, role: &str) -> String {
    let claims = Claims {
        sub: user_id.to_string(),
        role: role.to_string(),
        exp: (Utc::now() + Duration::hours(1)).timestamp() as usize,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .unwrap()
}

async fn call(router: &Router, method: Method, uri: &str, bearer: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(t) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", t));
    }
    let request = match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn stripe_webhook(router: &Router, body: &Value, signature: Option<String>) -> (StatusCode, Value) {
    post_webhook(router, "stripe", body, signature).await
}

async fn post_webhook(router: &Router, gateway: &str, body: &Value, signature: Option<String>) -> (StatusCode, Value) {
    let raw = body.to_string();
    let mut builder = Request::builder()
        .method(Method::POST)
        .uri(format!("/webhooks/{}", gateway))
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(sig) = signature {
        builder = builder.header(format!("{}-signature", gateway), sig);
    }
    let response = router
        .clone()
        .oneshot(builder.body(Body::from(raw)).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

async fn place_order(t: &TestApp, client_token: &str) -> Value {
    let (status, order) = call(
        &t.router,
        Method::POST,
        "/orders",
        Some(client_token),
        Some(json!({
            "qualification": "hvac",
            "address": "500 Spring St",
            "location": {"latitude": 34.05, "longitude": -118.25},
            "items": [{"item_type": "service", "item_id": t.labour, "quantity": "2"}]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    order
}

#[tokio::test]
async fn test_missing_token_is_unauthorized() {
    let t = setup().await;
    let (status, body) = call(&t.router, Method::GET, "/orders", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["kind"], "unauthenticated");

    let (status, _) = call(&t.router, Method::GET, "/orders", Some("garbage"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_role_policy_blocks_before_handler() {
    let t = setup().await;
    let tech = token(t.technician, "technician");

    let (status, body) = call(
        &t.router,
        Method::POST,
        &format!("/orders/{}/assign-technician", Uuid::new_v4()),
        Some(&tech),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["kind"], "forbidden");

    let (status, _) = call(&t.router, Method::GET, "/invoices/reports/summary", Some(&tech), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_estimate_to_order_flow() {
    let t = setup().await;
    let tech = token(t.technician, "technician");
    let client = token(t.client, "user");
    let admin = token(t.admin, "admin");

    let (status, estimate) = call(
        &t.router,
        Method::POST,
        "/estimates",
        Some(&tech),
        Some(json!({
            "client_id": t.client,
            "items": [
                {"item_type": "service", "item_id": t.labour, "quantity": "2"},
                {"item_type": "material", "item_id": t.valve, "quantity": "1"}
            ],
            "discount": "20",
            "tax": "10"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(estimate["total"], "198.00");
    assert_eq!(estimate["status"], "draft");
    let id = estimate["id"].as_str().unwrap().to_string();

    let (status, _) = call(&t.router, Method::POST, &format!("/estimates/{}/convert-to-order", id), Some(&admin), None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, sent) = call(&t.router, Method::POST, &format!("/estimates/{}/send", id), Some(&tech), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(sent["status"], "sent");

    let (status, approved) = call(&t.router, Method::POST, &format!("/estimates/{}/approve", id), Some(&client), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(approved["status"], "approved");

    let (status, conversion) = call(
        &t.router,
        Method::POST,
        &format!("/estimates/{}/convert-to-order", id),
        Some(&admin),
        Some(json!({"qualification": "hvac", "address": "500 Spring St"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(conversion["order"]["status"]["execution"], "pending");
    assert_eq!(conversion["order"]["technician_id"], t.technician.to_string());
    assert_eq!(conversion["order"]["items"].as_array().unwrap().len(), 2);

    let (status, body) = call(&t.router, Method::POST, &format!("/estimates/{}/convert-to-order", id), Some(&admin), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["kind"], "invalid_state");
}

#[tokio::test]
async fn test_technician_field_restrictions() {
    let t = setup().await;
    let tech = token(t.technician, "technician");
    let client = token(t.client, "client");
    let admin = token(t.admin, "admin");

    let order = place_order(&t, &client).await;
    let order_id = order["id"].as_str().unwrap().to_string();

    let (status, assignment) = call(
        &t.router,
        Method::POST,
        &format!("/orders/{}/assign-technician", order_id),
        Some(&admin),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(assignment["technician_id"], t.technician.to_string());

    let (status, body) = call(
        &t.router,
        Method::PUT,
        &format!("/orders/{}", order_id),
        Some(&tech),
        Some(json!({"notes": "gate code 1234"})),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["kind"], "forbidden");

    let (status, updated) = call(
        &t.router,
        Method::PUT,
        &format!("/orders/{}", order_id),
        Some(&tech),
        Some(json!({"status": "in_progress"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["status"]["execution"], "in_progress");
    assert!(!updated["actual_start_time"].is_null());

    let (status, done) = call(
        &t.router,
        Method::PUT,
        &format!("/orders/{}/status", order_id),
        Some(&tech),
        Some(json!({"status": "completed"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(done["status"]["execution"], "completed");

    let (status, _) = call(&t.router, Method::PUT, &format!("/orders/{}/cancel", order_id), Some(&client), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_signed_webhook_replay_records_one_payment() {
    let t = setup().await;
    let client = token(t.client, "client");
    let order = place_order(&t, &client).await;
    let order_id = order["id"].as_str().unwrap().to_string();

    let event = json!({
        "id": "evt_1",
        "type": "payment_intent.succeeded",
        "data": {"object": {
            "id": "pi_replayed",
            "amount": 10000,
            "currency": "usd",
            "metadata": {"order_id": order_id}
        }}
    });
    let sig = || Some(signature::sign(STRIPE_SECRET, event.to_string().as_bytes(), Utc::now().timestamp()));

    for _ in 0..2 {
        let (status, body) = stripe_webhook(&t.router, &event, sig()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "success");
    }

    let (status, payments) = call(&t.router, Method::GET, &format!("/orders/{}/payments", order_id), Some(&client), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(payments.as_array().unwrap().len(), 1);
    assert_eq!(payments[0]["transaction_id"], "pi_replayed");

    let (_, order) = call(&t.router, Method::GET, &format!("/orders/{}", order_id), Some(&client), None).await;
    assert_eq!(order["status"]["payment"], "paid");
}

#[tokio::test]
async fn test_bad_webhook_signature_is_rejected() {
    let t = setup().await;
    let event = json!({"type": "payment_intent.succeeded", "data": {"object": {}}});

    let (status, _) = stripe_webhook(&t.router, &event, Some("t=1,v1=deadbeef".into())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = stripe_webhook(&t.router, &event, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_capture_breaker_opens_after_gateway_failures() {
    let t = setup().await;
    let client = token(t.client, "client");
    let order = place_order(&t, &client).await;
    let order_id = order["id"].as_str().unwrap().to_string();
    let capture = |reference: &str| json!({"order_id": order_id, "reference": reference});

    for _ in 0..2 {
        let (status, body) = call(
            &t.router,
            Method::POST,
            "/payments/stripe/capture",
            Some(&client),
            Some(capture("fail-gateway")),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["kind"], "upstream_failure");
    }

    let (status, _) = call(
        &t.router,
        Method::POST,
        "/payments/stripe/capture",
        Some(&client),
        Some(capture("pi_ok")),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_capture_records_payment() {
    let t = setup().await;
    let client = token(t.client, "client");
    let order = place_order(&t, &client).await;
    let order_id = order["id"].as_str().unwrap().to_string();

    let (status, body) = call(
        &t.router,
        Method::POST,
        "/payments/stripe/capture",
        Some(&client),
        Some(json!({"order_id": order_id, "reference": "pi_capture_1"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "successful");
    assert_eq!(body["payment"]["amount"], "100");

    let (status, _) = call(
        &t.router,
        Method::POST,
        "/payments/bitcoin/capture",
        Some(&client),
        Some(json!({"order_id": order_id, "reference": "x"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

fn paypal_capture(order_id: &str) -> Value {
    json!({
        "event_type": "PAYMENT.CAPTURE.COMPLETED",
        "resource": {
            "id": "CAP-1",
            "amount": {"value": "100.00", "currency_code": "USD"},
            "custom_id": order_id
        }
    })
}

#[tokio::test]
async fn test_webhook_without_configured_secret_is_refused() {
    let t = setup().await;
    let client = token(t.client, "client");
    let order = place_order(&t, &client).await;
    let order_id = order["id"].as_str().unwrap().to_string();

    let (status, body) = post_webhook(&t.router, "paypal", &paypal_capture(&order_id), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "bad_request");

    let (_, order) = call(&t.router, Method::GET, &format!("/orders/{}", order_id), Some(&client), None).await;
    assert_eq!(order["status"]["payment"], "unpaid");
    let (_, payments) = call(&t.router, Method::GET, &format!("/orders/{}/payments", order_id), Some(&client), None).await;
    assert!(payments.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_unsigned_webhooks_accepted_when_allowed() {
    let mut config = config();
    config.webhooks.allow_unsigned = true;
    let t = setup_with(config).await;
    let client = token(t.client, "client");
    let order = place_order(&t, &client).await;
    let order_id = order["id"].as_str().unwrap().to_string();

    let (status, body) = post_webhook(&t.router, "paypal", &paypal_capture(&order_id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");

    let (_, order) = call(&t.router, Method::GET, &format!("/orders/{}", order_id), Some(&client), None).await;
    assert_eq!(order["status"]["payment"], "paid");
}

#[tokio::test]
async fn test_webhook_for_unknown_order_is_acknowledged() {
    let t = setup().await;
    let event = json!({
        "type": "payment_intent.succeeded",
        "data": {"object": {
            "id": "pi_orphan",
            "amount": 5000,
            "metadata": {"order_id": Uuid::new_v4().to_string()}
        }}
    });
    let sig = signature::sign(STRIPE_SECRET, event.to_string().as_bytes(), Utc::now().timestamp());

    let (status, body) = stripe_webhook(&t.router, &event, Some(sig)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
}

#[tokio::test]
async fn test_overflowing_invoice_quantity_is_rejected() {
    let t = setup().await;
    let client = token(t.client, "client");
    let order = place_order(&t, &client).await;

    let (status, body) = call(
        &t.router,
        Method::POST,
        "/invoices",
        Some(&client),
        Some(json!({
            "order_id": order["id"],
            "amount": "100",
            "items": [{
                "description": "Bulk fittings",
                "quantity": "79228162514264337593543950335",
                "unit_price": "2"
            }]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "validation_error");
}
