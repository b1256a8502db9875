use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use sha2::Sha256;

use super::jwks::{JwksError, JwksVerifier};
use super::{
    AuthProvider, ProviderCapability, ProviderError, ProviderErrorKind, ProviderIdentity,
    ProviderSession, ProviderTokens, SignUpAttributes, SignUpReceipt, VerifiedToken,
};
use crate::config::CognitoSettings;

const TARGET_PREFIX: &str = "AWSCognitoIdentityProviderService";

/// AWS Cognito user-pool adapter.
///
/// Talks the `x-amz-json-1.1` dialect directly. Vendor exception names are
/// classified into [`ProviderErrorKind`] here and nowhere else.
pub struct CognitoProvider {
    settings: CognitoSettings,
    endpoint: String,
    client: Client,
    verifier: JwksVerifier,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InitiateAuthResponse {
    authentication_result: Option<AuthenticationResult>,
    challenge_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AuthenticationResult {
    access_token: Option<String>,
    id_token: Option<String>,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SignUpResponse {
    user_sub: String,
    user_confirmed: bool,
}

#[derive(Debug, Deserialize)]
struct CognitoClaims {
    sub: String,
    email: Option<String>,
    #[serde(default)]
    email_verified: bool,
    given_name: Option<String>,
    family_name: Option<String>,
    #[serde(rename = "custom:role")]
    role: Option<String>,
    exp: i64,
}

impl CognitoProvider {
    pub fn new(settings: CognitoSettings, timeout: Duration) -> Result<Self, ProviderError> {
        let client = Client::builder().timeout(timeout).build().map_err(|e| {
            ProviderError::new(
                AuthProvider::Cognito,
                ProviderErrorKind::Other,
                format!("failed to build http client: {}", e),
            )
        })?;

        let issuer = format!(
            "https://cognito-idp.{}.amazonaws.com/{}",
            settings.region, settings.user_pool_id
        );
        let jwks_url = format!("{}/.well-known/jwks.json", issuer);
        let verifier = JwksVerifier::new(client.clone(), jwks_url, &issuer, &settings.client_id);
        let endpoint = format!("https://cognito-idp.{}.amazonaws.com/", settings.region);

        Ok(Self {
            settings,
            endpoint,
            client,
            verifier,
        })
    }

    /// HMAC-SHA256 over `username + client_id`, required whenever the app
    /// client carries a secret.
    fn secret_hash(&self, username: &str) -> Option<String> {
        let secret = self.settings.client_secret.as_deref()?;
        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).ok()?;
        mac.update(username.as_bytes());
        mac.update(self.settings.client_id.as_bytes());
        Some(BASE64.encode(mac.finalize().into_bytes()))
    }

    async fn call(&self, target: &str, body: Value) -> Result<Value, ProviderError> {
        let response = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", "application/x-amz-json-1.1")
            .header("X-Amz-Target", format!("{}.{}", TARGET_PREFIX, target))
            .json(&body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        let text = response.text().await.map_err(|e| self.transport_error(e))?;
        let payload: Value = if text.is_empty() {
            json!({})
        } else {
            serde_json::from_str(&text).map_err(|e| {
                ProviderError::new(
                    AuthProvider::Cognito,
                    ProviderErrorKind::Other,
                    format!("unparseable response: {}", e),
                )
            })?
        };

        if status.is_success() {
            Ok(payload)
        } else {
            Err(self.classify(&payload, status))
        }
    }

    fn transport_error(&self, e: reqwest::Error) -> ProviderError {
        let kind = if e.is_timeout() || e.is_connect() {
            ProviderErrorKind::Transient
        } else {
            ProviderErrorKind::Other
        };
        ProviderError::new(AuthProvider::Cognito, kind, format!("request failed: {}", e))
    }

    fn classify(&self, payload: &Value, status: reqwest::StatusCode) -> ProviderError {
        let raw = payload.get("__type").and_then(Value::as_str).unwrap_or("");
        let code = raw.rsplit('#').next().unwrap_or(raw);
        let message = payload
            .get("message")
            .or_else(|| payload.get("Message"))
            .and_then(Value::as_str)
            .unwrap_or("request rejected");

        let kind = match code {
            "UserNotFoundException" => ProviderErrorKind::IdentityNotFound,
            "UserNotConfirmedException" => ProviderErrorKind::NotConfirmed,
            "NotAuthorizedException" | "PasswordResetRequiredException" => {
                ProviderErrorKind::BadCredentials
            }
            "UsernameExistsException" | "AliasExistsException" => ProviderErrorKind::AlreadyExists,
            "CodeMismatchException" | "ExpiredCodeException" => ProviderErrorKind::CodeInvalid,
            "InvalidPasswordException" | "InvalidParameterException" => ProviderErrorKind::Rejected,
            "TooManyRequestsException"
            | "LimitExceededException"
            | "InternalErrorException"
            | "ServiceUnavailableException" => ProviderErrorKind::Transient,
            _ if status.is_server_error() => ProviderErrorKind::Transient,
            _ => ProviderErrorKind::Other,
        };

        ProviderError::new(
            AuthProvider::Cognito,
            kind,
            format!("{}: {}", code, message),
        )
    }

    fn jwks_error(&self, e: JwksError) -> ProviderError {
        let kind = match e {
            JwksError::Fetch(_) => ProviderErrorKind::Transient,
            JwksError::UnknownKey(_) | JwksError::Invalid(_) => ProviderErrorKind::BadCredentials,
        };
        ProviderError::new(AuthProvider::Cognito, kind, e.to_string())
    }

    fn identity(&self, claims: CognitoClaims) -> Result<ProviderIdentity, ProviderError> {
        let email = claims.email.ok_or_else(|| {
            ProviderError::new(
                AuthProvider::Cognito,
                ProviderErrorKind::Other,
                "token missing email claim",
            )
        })?;
        Ok(ProviderIdentity {
            subject: claims.sub,
            email,
            first_name: claims.given_name,
            last_name: claims.family_name,
            role_hint: claims.role,
            email_verified: claims.email_verified,
        })
    }

    fn tokens(&self, result: AuthenticationResult) -> Result<ProviderTokens, ProviderError> {
        let access_token = result.access_token.ok_or_else(|| {
            ProviderError::new(
                AuthProvider::Cognito,
                ProviderErrorKind::Other,
                "response missing access token",
            )
        })?;
        Ok(ProviderTokens::bearer(
            access_token,
            result.id_token,
            result.refresh_token,
            result.expires_in.unwrap_or(3600),
        ))
    }

    fn unwrap_auth(&self, payload: Value) -> Result<AuthenticationResult, ProviderError> {
        let parsed: InitiateAuthResponse = serde_json::from_value(payload).map_err(|e| {
            ProviderError::new(
                AuthProvider::Cognito,
                ProviderErrorKind::Other,
                format!("unparseable auth response: {}", e),
            )
        })?;
        if let Some(challenge) = parsed.challenge_name {
            return Err(ProviderError::new(
                AuthProvider::Cognito,
                ProviderErrorKind::BadCredentials,
                format!("unresolved auth challenge: {}", challenge),
            ));
        }
        parsed.authentication_result.ok_or_else(|| {
            ProviderError::new(
                AuthProvider::Cognito,
                ProviderErrorKind::Other,
                "auth response missing result",
            )
        })
    }
}

#[async_trait]
impl ProviderCapability for CognitoProvider {
    fn kind(&self) -> AuthProvider {
        AuthProvider::Cognito
    }

    async fn verify_token(&self, id_token: &str) -> Result<VerifiedToken, ProviderError> {
        let data = self
            .verifier
            .verify::<CognitoClaims>(id_token)
            .await
            .map_err(|e| self.jwks_error(e))?;
        let expires_at = DateTime::from_timestamp(data.claims.exp, 0).unwrap_or_else(Utc::now);
        Ok(VerifiedToken {
            identity: self.identity(data.claims)?,
            expires_at,
        })
    }

    async fn sign_in(
        &self,
        email: &str,
        password: &str,
    ) -> Result<ProviderSession, ProviderError> {
        let mut params = json!({
            "USERNAME": email,
            "PASSWORD": password,
        });
        if let Some(hash) = self.secret_hash(email) {
            params["SECRET_HASH"] = Value::String(hash);
        }

        let payload = self
            .call(
                "InitiateAuth",
                json!({
                    "AuthFlow": "USER_PASSWORD_AUTH",
                    "ClientId": self.settings.client_id,
                    "AuthParameters": params,
                }),
            )
            .await?;

        let tokens = self.tokens(self.unwrap_auth(payload)?)?;
        let id_token = tokens.id_token.clone().ok_or_else(|| {
            ProviderError::new(
                AuthProvider::Cognito,
                ProviderErrorKind::Other,
                "sign-in response missing id token",
            )
        })?;
        let verified = self.verify_token(&id_token).await?;

        Ok(ProviderSession {
            identity: verified.identity,
            tokens,
        })
    }

    async fn sign_up(&self, attrs: &SignUpAttributes) -> Result<SignUpReceipt, ProviderError> {
        let mut user_attributes = vec![
            json!({"Name": "email", "Value": attrs.email}),
            json!({"Name": "given_name", "Value": attrs.first_name}),
            json!({"Name": "family_name", "Value": attrs.last_name}),
            json!({"Name": "custom:role", "Value": attrs.role}),
        ];
        if let Some(phone) = &attrs.phone_number {
            user_attributes.push(json!({"Name": "phone_number", "Value": phone}));
        }

        let mut body = json!({
            "ClientId": self.settings.client_id,
            "Username": attrs.email,
            "Password": attrs.password,
            "UserAttributes": user_attributes,
        });
        if let Some(hash) = self.secret_hash(&attrs.email) {
            body["SecretHash"] = Value::String(hash);
        }

        let payload = self.call("SignUp", body).await?;
        let parsed: SignUpResponse = serde_json::from_value(payload).map_err(|e| {
            ProviderError::new(
                AuthProvider::Cognito,
                ProviderErrorKind::Other,
                format!("unparseable sign-up response: {}", e),
            )
        })?;

        tracing::info!(subject = %parsed.user_sub, "cognito sign-up accepted");

        Ok(SignUpReceipt {
            subject: parsed.user_sub,
            confirmation_required: !parsed.user_confirmed,
        })
    }

    async fn confirm_sign_up(&self, email: &str, code: &str) -> Result<(), ProviderError> {
        let mut body = json!({
            "ClientId": self.settings.client_id,
            "Username": email,
            "ConfirmationCode": code,
        });
        if let Some(hash) = self.secret_hash(email) {
            body["SecretHash"] = Value::String(hash);
        }
        self.call("ConfirmSignUp", body).await.map(|_| ())
    }

    async fn resend_confirmation_code(&self, email: &str) -> Result<(), ProviderError> {
        let mut body = json!({
            "ClientId": self.settings.client_id,
            "Username": email,
        });
        if let Some(hash) = self.secret_hash(email) {
            body["SecretHash"] = Value::String(hash);
        }
        self.call("ResendConfirmationCode", body).await.map(|_| ())
    }

    async fn forgot_password(&self, email: &str) -> Result<(), ProviderError> {
        let mut body = json!({
            "ClientId": self.settings.client_id,
            "Username": email,
        });
        if let Some(hash) = self.secret_hash(email) {
            body["SecretHash"] = Value::String(hash);
        }
        self.call("ForgotPassword", body).await.map(|_| ())
    }

    async fn confirm_forgot_password(
        &self,
        email: &str,
        code: &str,
        new_password: &str,
    ) -> Result<(), ProviderError> {
        let mut body = json!({
            "ClientId": self.settings.client_id,
            "Username": email,
            "ConfirmationCode": code,
            "Password": new_password,
        });
        if let Some(hash) = self.secret_hash(email) {
            body["SecretHash"] = Value::String(hash);
        }
        self.call("ConfirmForgotPassword", body).await.map(|_| ())
    }

    async fn refresh_token(&self, refresh_token: &str) -> Result<ProviderTokens, ProviderError> {
        // SECRET_HASH is username-bound and a refresh request carries only the
        // token, so it is omitted for this flow.
        let payload = self
            .call(
                "InitiateAuth",
                json!({
                    "AuthFlow": "REFRESH_TOKEN_AUTH",
                    "ClientId": self.settings.client_id,
                    "AuthParameters": { "REFRESH_TOKEN": refresh_token },
                }),
            )
            .await?;

        self.tokens(self.unwrap_auth(payload)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> CognitoProvider {
        CognitoProvider::new(
            CognitoSettings {
                region: "eu-west-1".to_string(),
                user_pool_id: "eu-west-1_TEST".to_string(),
                client_id: "client123".to_string(),
                client_secret: Some("sekret".to_string()),
            },
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn classifies_vendor_exceptions() {
        let p = provider();
        let err = p.classify(
            &json!({"__type": "UserNotFoundException", "message": "no such user"}),
            reqwest::StatusCode::BAD_REQUEST,
        );
        assert_eq!(err.kind, ProviderErrorKind::IdentityNotFound);

        let err = p.classify(
            &json!({"__type": "com.amazon#UserNotConfirmedException"}),
            reqwest::StatusCode::BAD_REQUEST,
        );
        assert_eq!(err.kind, ProviderErrorKind::NotConfirmed);

        let err = p.classify(
            &json!({"__type": "TooManyRequestsException"}),
            reqwest::StatusCode::BAD_REQUEST,
        );
        assert!(err.is_transient());

        let err = p.classify(&json!({}), reqwest::StatusCode::INTERNAL_SERVER_ERROR);
        assert!(err.is_transient());

        let err = p.classify(
            &json!({"__type": "SomethingNovelException"}),
            reqwest::StatusCode::BAD_REQUEST,
        );
        assert_eq!(err.kind, ProviderErrorKind::Other);
    }

    #[test]
    fn secret_hash_is_deterministic_and_optional() {
        let p = provider();
        let a = p.secret_hash("user@example.com").unwrap();
        let b = p.secret_hash("user@example.com").unwrap();
        assert_eq!(a, b);

        let no_secret = CognitoProvider::new(
            CognitoSettings {
                region: "eu-west-1".to_string(),
                user_pool_id: "eu-west-1_TEST".to_string(),
                client_id: "client123".to_string(),
                client_secret: None,
            },
            Duration::from_secs(5),
        )
        .unwrap();
        assert!(no_secret.secret_hash("user@example.com").is_none());
    }

    #[test]
    fn auth_challenge_is_rejected() {
        let p = provider();
        let err = p
            .unwrap_auth(json!({"ChallengeName": "NEW_PASSWORD_REQUIRED"}))
            .unwrap_err();
        assert_eq!(err.kind, ProviderErrorKind::BadCredentials);
    }
}
