use chrono::Utc;
use rust_decimal_macros::dec;
use storefront_api::{
    config::GatewayConfig,
    errors::ServiceError,
    services::payments::{
        signature_header, HttpPaymentGateway, InitializeSessionRequest, PaymentGateway,
    },
};
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn gateway_config(base_url: &str, timeout_secs: u64) -> GatewayConfig {
    GatewayConfig {
        secret_key: "sk_test_secret".to_string(),
        public_key: "pk_test_public".to_string(),
        base_url: base_url.to_string(),
        callback_base_url: "https://shop.test".to_string(),
        timeout_secs,
        webhook_tolerance_secs: 300,
    }
}

fn session_request(order_id: Uuid) -> InitializeSessionRequest {
    InitializeSessionRequest {
        order_id,
        amount: dec!(150),
        currency: "USD".to_string(),
        customer_email: "shopper@example.com".to_string(),
        callback_url: "https://shop.test/orders/confirm".to_string(),
    }
}

#[tokio::test]
async fn initialize_session_sends_minor_units_and_parses_the_redirect() {
    let server = MockServer::start().await;
    let order_id = Uuid::new_v4();

    Mock::given(method("POST"))
        .and(path("/sessions"))
        .and(header("authorization", "Bearer sk_test_secret"))
        .and(body_partial_json(serde_json::json!({
            "reference": order_id.to_string(),
            "amount_minor": 15000,
            "currency": "USD",
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "redirect_url": "https://provider.test/pay/abc123",
            "reference": "abc123",
        })))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = HttpPaymentGateway::new(&gateway_config(&server.uri(), 5)).unwrap();
    let session = gateway
        .initialize_session(session_request(order_id))
        .await
        .unwrap();

    assert_eq!(session.redirect_url, "https://provider.test/pay/abc123");
    assert_eq!(session.session_reference, "abc123");
}

#[tokio::test]
async fn non_success_response_is_a_rejection_with_the_provider_message() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/sessions"))
        .respond_with(ResponseTemplate::new(422).set_body_json(serde_json::json!({
            "message": "currency not supported",
        })))
        .mount(&server)
        .await;

    let gateway = HttpPaymentGateway::new(&gateway_config(&server.uri(), 5)).unwrap();
    let result = gateway.initialize_session(session_request(Uuid::new_v4())).await;

    match result {
        Err(ServiceError::GatewayRejected(message)) => {
            assert!(message.contains("currency not supported"));
        }
        other => panic!("expected GatewayRejected, got {:?}", other.map(|_| ())),
    }
}

#[tokio::test]
async fn timeout_maps_to_gateway_unavailable() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/sessions"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({
                    "redirect_url": "https://provider.test/pay/slow",
                    "reference": "slow",
                }))
                .set_delay(std::time::Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let gateway = HttpPaymentGateway::new(&gateway_config(&server.uri(), 1)).unwrap();
    let result = gateway.initialize_session(session_request(Uuid::new_v4())).await;

    assert!(matches!(result, Err(ServiceError::GatewayUnavailable(_))));
}

#[tokio::test]
async fn verify_parses_the_settlement_report() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/sessions/abc123"))
        .and(header("authorization", "Bearer sk_test_secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "status": "success",
            "amount_minor": 15000,
            "authorization_token": "AUTH_xyz",
        })))
        .mount(&server)
        .await;

    let gateway = HttpPaymentGateway::new(&gateway_config(&server.uri(), 5)).unwrap();
    let verification = gateway.verify("abc123").await.unwrap();

    assert!(verification.succeeded);
    assert_eq!(verification.amount_minor, 15000);
    assert_eq!(verification.authorization_token.as_deref(), Some("AUTH_xyz"));
}

#[tokio::test]
async fn verify_reports_failed_sessions_without_erroring() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/sessions/nope"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "status": "failed",
            "amount_minor": 0,
            "authorization_token": null,
        })))
        .mount(&server)
        .await;

    let gateway = HttpPaymentGateway::new(&gateway_config(&server.uri(), 5)).unwrap();
    let verification = gateway.verify("nope").await.unwrap();

    assert!(!verification.succeeded);
    assert_eq!(verification.authorization_token, None);
}

#[tokio::test]
async fn webhook_signature_check_uses_the_configured_secret() {
    let gateway =
        HttpPaymentGateway::new(&gateway_config("https://provider.test", 5)).unwrap();

    let payload = br#"{"event":"charge.success","reference":"abc123"}"#;
    let valid = signature_header("sk_test_secret", Utc::now().timestamp(), payload);
    assert!(gateway.verify_webhook_signature(payload, &valid));

    let forged = signature_header("sk_other_secret", Utc::now().timestamp(), payload);
    assert!(!gateway.verify_webhook_signature(payload, &forged));
}
