mod common;

use common::{body_json, spawn_app, PASSWORD};
use identity_service::providers::MockProvider;
use identity_service::services::IdentityStore;
use reqwest::StatusCode;
use serde_json::json;

#[tokio::test]
async fn confirm_flips_the_local_flag_and_unlocks_login() {
    let app = spawn_app().await;
    app.post(
        "/auth/register",
        &json!({
            "email": "maya@example.com",
            "password": PASSWORD,
            "firstName": "Maya",
            "lastName": "Lindqvist"
        }),
    )
    .await;

    // Unconfirmed accounts cannot sign in yet.
    let response = app.login_with_password("maya@example.com", PASSWORD).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .post(
            "/auth/confirm",
            &json!({
                "email": "maya@example.com",
                "confirmationCode": MockProvider::CONFIRMATION_CODE
            }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert!(body["message"].as_str().unwrap().contains("confirmed"));

    let user = app
        .store
        .find_user_by_email("maya@example.com")
        .await
        .unwrap()
        .unwrap();
    assert!(user.is_verified);
    assert_eq!(app.cognito.is_confirmed("maya@example.com"), Some(true));

    let response = app.login_with_password("maya@example.com", PASSWORD).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn wrong_code_is_rejected_and_nothing_changes() {
    let app = spawn_app().await;
    app.post(
        "/auth/register",
        &json!({
            "email": "maya@example.com",
            "password": PASSWORD,
            "firstName": "Maya",
            "lastName": "Lindqvist"
        }),
    )
    .await;

    let response = app
        .post(
            "/auth/confirm",
            &json!({ "email": "maya@example.com", "confirmationCode": "000000" }),
        )
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "INVALID_CODE");

    let user = app
        .store
        .find_user_by_email("maya@example.com")
        .await
        .unwrap()
        .unwrap();
    assert!(!user.is_verified);
    assert_eq!(app.cognito.is_confirmed("maya@example.com"), Some(false));
}

#[tokio::test]
async fn confirming_an_unknown_email_reads_like_a_wrong_code() {
    let app = spawn_app().await;

    let response = app
        .post(
            "/auth/confirm",
            &json!({
                "email": "ghost@example.com",
                "confirmationCode": MockProvider::CONFIRMATION_CODE
            }),
        )
        .await;

    // Whether the code or the address was wrong is not disclosed.
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "INVALID_CODE");
}

#[tokio::test]
async fn resend_code_never_reveals_account_existence() {
    let app = spawn_app().await;
    app.cognito
        .with_unconfirmed_user("real@example.com", PASSWORD);

    let known = app
        .post("/auth/resend-code", &json!({ "email": "real@example.com" }))
        .await;
    assert_eq!(known.status(), StatusCode::OK);
    let known_body = body_json(known).await;

    let unknown = app
        .post("/auth/resend-code", &json!({ "email": "ghost@example.com" }))
        .await;
    assert_eq!(unknown.status(), StatusCode::OK);
    let unknown_body = body_json(unknown).await;

    // Same envelope either way.
    assert_eq!(known_body["success"], true);
    assert_eq!(known_body["message"], unknown_body["message"]);
    assert_eq!(app.cognito.call_count("resend_confirmation_code"), 2);
}
