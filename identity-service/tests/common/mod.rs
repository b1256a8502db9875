//! Shared harness for identity-service integration tests.
//!
//! Spawns the real application on an ephemeral port, backed by the in-memory
//! store and one mock per provider, so tests drive the full HTTP surface
//! without PostgreSQL or vendor credentials.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use identity_service::config::{
    AuthSettings, DatabaseConfig, Environment, IdentityConfig, RateLimitConfig, SwaggerMode,
};
use identity_service::providers::{
    AuthProvider, MockProvider, ProviderCapability, RegisteredProviders,
};
use identity_service::services::{IdentityStore, MemoryStore};
use identity_service::startup::Application;
use serde_json::{json, Value};

pub const PASSWORD: &str = "sup3r-secret-pw";

pub struct TestApp {
    pub address: String,
    pub client: reqwest::Client,
    pub store: Arc<MemoryStore>,
    pub cognito: Arc<MockProvider>,
    pub firebase: Arc<MockProvider>,
}

pub async fn spawn_app() -> TestApp {
    spawn_app_with(|_| {}).await
}

pub async fn spawn_app_with(tweak: impl FnOnce(&mut IdentityConfig)) -> TestApp {
    let mut config = test_config();
    tweak(&mut config);

    let store = Arc::new(MemoryStore::new());
    let cognito = Arc::new(MockProvider::new(AuthProvider::Cognito));
    let firebase = Arc::new(MockProvider::new(AuthProvider::Firebase));

    let mut providers = RegisteredProviders::default();
    providers.insert(Arc::clone(&cognito) as Arc<dyn ProviderCapability>);
    providers.insert(Arc::clone(&firebase) as Arc<dyn ProviderCapability>);

    let app = Application::build_with_state(
        config,
        Arc::clone(&store) as Arc<dyn IdentityStore>,
        providers,
    )
    .await
    .expect("Failed to build test application");

    let address = format!("http://127.0.0.1:{}", app.port());
    tokio::spawn(app.run_until_stopped());
    tokio::time::sleep(Duration::from_millis(50)).await;

    TestApp {
        address,
        client: reqwest::Client::new(),
        store,
        cognito,
        firebase,
    }
}

pub fn test_config() -> IdentityConfig {
    IdentityConfig {
        common: service_core::config::Config {
            port: 0,
            bind_address: "127.0.0.1".to_string(),
        },
        environment: Environment::Dev,
        service_name: "identity-service-test".to_string(),
        service_version: "0.0.0".to_string(),
        log_level: "error".to_string(),
        otlp_endpoint: None,
        database: DatabaseConfig {
            url: "postgres://unused-in-tests".to_string(),
            max_connections: 5,
            min_connections: 1,
        },
        auth: AuthSettings {
            primary_provider: AuthProvider::Cognito,
            enable_universal_fallback: true,
            provider_timeout_secs: 2,
            request_timeout_secs: 10,
            cognito: None,
            firebase: None,
        },
        allowed_origins: vec!["*".to_string()],
        swagger: SwaggerMode::Public,
        // Generous limits so ordinary tests never trip 429.
        rate_limit: RateLimitConfig {
            login_attempts: 1000,
            login_window_seconds: 60,
            register_attempts: 1000,
            register_window_seconds: 60,
            password_reset_attempts: 1000,
            password_reset_window_seconds: 60,
            global_ip_limit: 10_000,
            global_ip_window_seconds: 60,
        },
    }
}

impl TestApp {
    pub async fn post(&self, path: &str, body: &Value) -> reqwest::Response {
        self.client
            .post(format!("{}{}", self.address, path))
            .json(body)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn get(&self, path: &str) -> reqwest::Response {
        self.client
            .get(format!("{}{}", self.address, path))
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn login_with_password(&self, email: &str, password: &str) -> reqwest::Response {
        self.post(
            "/auth/login",
            &json!({ "email": email, "password": password }),
        )
        .await
    }

    /// Register through the API and confirm at the primary provider, leaving
    /// the account ready to sign in. Returns the local user id.
    pub async fn register_confirmed(&self, email: &str) -> uuid::Uuid {
        let response = self
            .post(
                "/auth/register",
                &json!({
                    "email": email,
                    "password": PASSWORD,
                    "firstName": "Maya",
                    "lastName": "Lindqvist"
                }),
            )
            .await;
        assert_eq!(response.status().as_u16(), 201, "registration failed");
        let body = body_json(response).await;
        let user_id = body["data"]["userId"]
            .as_str()
            .expect("registration envelope missing userId")
            .parse()
            .expect("userId was not a uuid");

        let response = self
            .post(
                "/auth/confirm",
                &json!({
                    "email": email,
                    "confirmationCode": MockProvider::CONFIRMATION_CODE
                }),
            )
            .await;
        assert_eq!(response.status().as_u16(), 200, "confirmation failed");

        user_id
    }
}

pub async fn body_json(response: reqwest::Response) -> Value {
    response
        .json()
        .await
        .expect("Response body was not valid JSON")
}
