//! HTTP-surface tests: the production router wired to the in-memory store
//! and mock collaborators, driven through tower's oneshot.

mod common;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use crate::common::{app_state, harness, tx_hash, TEST_PHONE, TEST_WALLET};

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn json_request(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn form_request(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_health_route() {
    let h = harness();
    let app = airpesa_backend::api_router(app_state(&h));

    let response = app
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_create_order_endpoint() {
    let h = harness();
    let app = airpesa_backend::api_router(app_state(&h));

    let response = app
        .oneshot(json_request(
            "/api/orders",
            json!({
                "phoneNumber": TEST_PHONE,
                "amount": "100",
                "walletAddress": TEST_WALLET,
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["currency"], "KES");
    assert_eq!(body["orderRef"].as_str().unwrap().len(), 8);
    assert_eq!(body["totalUsdc"], "0.825194");
}

#[tokio::test]
async fn test_create_order_rejects_bad_amount() {
    let h = harness();
    let app = airpesa_backend::api_router(app_state(&h));

    let response = app
        .oneshot(json_request(
            "/api/orders",
            json!({
                "phoneNumber": TEST_PHONE,
                "amount": "2",
                "walletAddress": TEST_WALLET,
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert!(body["error"].as_str().unwrap().contains("Amount out of bounds"));
}

#[tokio::test]
async fn test_order_polling() {
    let h = harness();
    let order = h
        .saga
        .create_order(TEST_PHONE, rust_decimal_macros::dec!(100), TEST_WALLET)
        .await
        .unwrap();
    let app = airpesa_backend::api_router(app_state(&h));

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/api/orders/{}", order.order_ref))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "pending");
    assert_eq!(body["orderRef"], order.order_ref.as_str());

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/orders/zzzzzzzz")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_submit_payment_and_webhook_flow() {
    let h = harness();
    let order = h
        .saga
        .create_order(TEST_PHONE, rust_decimal_macros::dec!(100), TEST_WALLET)
        .await
        .unwrap();
    let app = airpesa_backend::api_router(app_state(&h));

    let response = app
        .clone()
        .oneshot(json_request(
            "/api/airtime/send",
            json!({
                "orderRef": order.order_ref,
                "txHash": tx_hash(1),
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["status"], "dispatched");
    let request_id = body["requestId"].as_str().unwrap().to_string();

    // Provider reports delivery on the form-encoded webhook
    let response = app
        .clone()
        .oneshot(form_request(
            "/api/airtime/status",
            &format!("requestId={}&status=Success", request_id),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "fulfilled");

    // Duplicate webhook delivery is acknowledged
    let response = app
        .oneshot(form_request(
            "/api/airtime/status",
            &format!("requestId={}&status=Success", request_id),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "fulfilled");
}

#[tokio::test]
async fn test_webhook_unknown_request_id() {
    let h = harness();
    let app = airpesa_backend::api_router(app_state(&h));

    let response = app
        .oneshot(form_request(
            "/api/airtime/status",
            "requestId=ATQid_nope&status=Success",
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_validation_callback_enforces_source_ip() {
    let h = harness();
    h.saga
        .create_order(TEST_PHONE, rust_decimal_macros::dec!(100), TEST_WALLET)
        .await
        .unwrap();
    let app = airpesa_backend::api_router(app_state(&h));

    // Untrusted source is refused
    let response = app
        .clone()
        .oneshot(json_request(
            "/api/airtime/validate",
            json!({
                "transactionId": "ATPid_1",
                "phoneNumber": TEST_PHONE,
                "sourceIpAddress": "203.0.113.9",
                "currencyCode": "KES",
                "amount": "100",
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = body_json(response).await;
    assert_eq!(body["status"], "Failed");

    // Trusted source with a matching pending order validates
    let response = app
        .oneshot(json_request(
            "/api/airtime/validate",
            json!({
                "transactionId": "ATPid_1",
                "phoneNumber": TEST_PHONE,
                "sourceIpAddress": "196.250.215.198",
                "currencyCode": "KES",
                "amount": "100",
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "Validated");
}

#[tokio::test]
async fn test_validation_callback_currency_mismatch() {
    let h = harness();
    h.saga
        .create_order(TEST_PHONE, rust_decimal_macros::dec!(100), TEST_WALLET)
        .await
        .unwrap();
    let app = airpesa_backend::api_router(app_state(&h));

    let response = app
        .oneshot(json_request(
            "/api/airtime/validate",
            json!({
                "transactionId": "ATPid_1",
                "phoneNumber": TEST_PHONE,
                "sourceIpAddress": "196.250.215.198",
                "currencyCode": "UGX",
                "amount": "100",
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["status"], "Failed");
}

#[tokio::test]
async fn test_price_endpoint() {
    let h = harness();
    let app = airpesa_backend::api_router(app_state(&h));

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/prices/kes")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["currency"], "KES");
    assert_eq!(body["rate"], "129");
}
