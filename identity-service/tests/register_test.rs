mod common;

use common::{body_json, spawn_app, PASSWORD};
use identity_service::models::{AccountStatus, UserRole};
use identity_service::providers::AuthProvider;
use identity_service::services::IdentityStore;
use reqwest::StatusCode;
use serde_json::json;

fn registration(email: &str) -> serde_json::Value {
    json!({
        "email": email,
        "password": PASSWORD,
        "firstName": "Maya",
        "lastName": "Lindqvist",
        "phoneNumber": "+46701234567"
    })
}

#[tokio::test]
async fn registration_creates_an_unverified_local_row() {
    let app = spawn_app().await;

    let response = app
        .post("/auth/register", &registration("maya@example.com"))
        .await;

    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    assert_eq!(body["success"], true);
    assert!(body["message"]
        .as_str()
        .unwrap()
        .contains("confirmation code"));
    let user_id: uuid::Uuid = body["data"]["userId"].as_str().unwrap().parse().unwrap();

    // Registrations always land on the configured primary.
    assert_eq!(app.cognito.call_count("sign_up"), 1);
    assert_eq!(app.firebase.call_count("sign_up"), 0);

    let user = app
        .store
        .find_user_by_email("maya@example.com")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(user.user_id, user_id);
    assert!(!user.is_verified);
    assert_eq!(user.role(), UserRole::Client);
    assert_eq!(user.status(), AccountStatus::Active);
    assert_eq!(user.login_count, 0);
    assert_eq!(user.current_provider(), Some(AuthProvider::Cognito));

    let mappings = app.store.mappings_for(user_id);
    assert_eq!(mappings.len(), 1);
    assert!(mappings[0].is_primary);
    assert_eq!(
        mappings[0].provider_subject,
        app.cognito.subject_of("maya@example.com").unwrap()
    );

    let profile = app.store.profile_for(user_id).expect("no client profile");
    assert_eq!(profile.phone_number.as_deref(), Some("+46701234567"));
}

#[tokio::test]
async fn duplicate_email_conflicts_before_the_provider_is_called() {
    let app = spawn_app().await;

    let first = app
        .post("/auth/register", &registration("dup@example.com"))
        .await;
    assert_eq!(first.status(), StatusCode::CREATED);

    let second = app
        .post("/auth/register", &registration("DUP@Example.com"))
        .await;
    assert_eq!(second.status(), StatusCode::CONFLICT);
    let body = body_json(second).await;
    assert_eq!(body["error"]["code"], "CONFLICT");

    // The local uniqueness check fires first; no second pool account.
    assert_eq!(app.cognito.call_count("sign_up"), 1);
}

#[tokio::test]
async fn invalid_fields_are_rejected() {
    let app = spawn_app().await;

    let response = app
        .post(
            "/auth/register",
            &json!({
                "email": "not-an-email",
                "password": "short",
                "firstName": "Maya",
                "lastName": "Lindqvist"
            }),
        )
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    assert_eq!(app.cognito.call_count("sign_up"), 0);
}

#[tokio::test]
async fn malformed_json_is_a_bad_request() {
    let app = spawn_app().await;

    let response = app
        .client
        .post(format!("{}/auth/register", app.address))
        .header("content-type", "application/json")
        .body("{ not json")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn staff_roles_cannot_self_register() {
    let app = spawn_app().await;
    let mut request = registration("admin@example.com");
    request["role"] = json!("admin");

    let response = app.post("/auth/register", &request).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(app.cognito.call_count("sign_up"), 0);
    assert_eq!(app.store.user_count(), 0);
}

#[tokio::test]
async fn therapist_registration_waits_for_manual_approval() {
    let app = spawn_app().await;
    let mut request = registration("tess@example.com");
    request["role"] = json!("therapist");

    let response = app.post("/auth/register", &request).await;

    assert_eq!(response.status(), StatusCode::CREATED);
    let user = app
        .store
        .find_user_by_email("tess@example.com")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(user.role(), UserRole::Therapist);
    assert_eq!(user.status(), AccountStatus::PendingVerification);
    assert!(!user.can_login());
    // Client intake profiles are not created for therapists.
    assert!(app.store.profile_for(user.user_id).is_none());
}
