mod common;

use common::{body_json, spawn_app_with, PASSWORD};
use reqwest::StatusCode;
use serde_json::json;

/// Pin the limiter key with a forwarded address so connection reuse does not
/// matter.
async fn login_as(app: &common::TestApp, forwarded_for: &str) -> reqwest::Response {
    app.client
        .post(format!("{}/auth/login", app.address))
        .header("x-forwarded-for", forwarded_for)
        .json(&json!({ "email": "maya@example.com", "password": PASSWORD }))
        .send()
        .await
        .unwrap()
}

#[tokio::test]
async fn login_attempts_are_limited_per_ip() {
    let app = spawn_app_with(|config| {
        config.rate_limit.login_attempts = 2;
        config.rate_limit.login_window_seconds = 60;
    })
    .await;
    app.cognito.with_confirmed_user("maya@example.com", PASSWORD);

    assert_ne!(login_as(&app, "10.1.2.3").await.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_ne!(login_as(&app, "10.1.2.3").await.status(), StatusCode::TOO_MANY_REQUESTS);

    let limited = login_as(&app, "10.1.2.3").await;
    assert_eq!(limited.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(limited.headers().get("retry-after").is_some());
    let body = body_json(limited).await;
    assert_eq!(body["error"]["code"], "RATE_LIMITED");

    // Another address still has its own allowance.
    assert_ne!(login_as(&app, "10.9.9.9").await.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn login_limiter_does_not_throttle_registration() {
    let app = spawn_app_with(|config| {
        config.rate_limit.login_attempts = 1;
        config.rate_limit.login_window_seconds = 60;
    })
    .await;

    let first = login_as(&app, "10.4.4.4").await;
    assert_ne!(first.status(), StatusCode::TOO_MANY_REQUESTS);
    let limited = login_as(&app, "10.4.4.4").await;
    assert_eq!(limited.status(), StatusCode::TOO_MANY_REQUESTS);

    // The register group has its own limiter.
    let response = app
        .client
        .post(format!("{}/auth/register", app.address))
        .header("x-forwarded-for", "10.4.4.4")
        .json(&json!({
            "email": "maya@example.com",
            "password": PASSWORD,
            "firstName": "Maya",
            "lastName": "Lindqvist"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
}
