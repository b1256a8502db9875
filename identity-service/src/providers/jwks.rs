use std::collections::HashMap;

use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, TokenData, Validation};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::sync::RwLock;

/// Failures during signing-key retrieval or token validation.
#[derive(Debug, thiserror::Error)]
pub enum JwksError {
    #[error("failed to fetch signing keys: {0}")]
    Fetch(String),
    #[error("token signed with unknown key {0}")]
    UnknownKey(String),
    #[error("token rejected: {0}")]
    Invalid(String),
}

#[derive(Debug, Deserialize)]
struct Jwk {
    kid: String,
    #[serde(default)]
    kty: String,
    n: Option<String>,
    e: Option<String>,
}

#[derive(Debug, Deserialize)]
struct JwkSet {
    keys: Vec<Jwk>,
}

/// RS256 verifier backed by a provider's published JWK set.
///
/// Keys are cached by `kid`. A token referencing an unknown `kid` triggers one
/// re-fetch before being rejected, which absorbs provider key rotation.
pub struct JwksVerifier {
    jwks_url: String,
    validation: Validation,
    http: reqwest::Client,
    keys: RwLock<HashMap<String, DecodingKey>>,
}

impl JwksVerifier {
    pub fn new(http: reqwest::Client, jwks_url: String, issuer: &str, audience: &str) -> Self {
        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_issuer(&[issuer]);
        validation.set_audience(&[audience]);
        Self {
            jwks_url,
            validation,
            http,
            keys: RwLock::new(HashMap::new()),
        }
    }

    pub async fn verify<C: DeserializeOwned>(&self, token: &str) -> Result<TokenData<C>, JwksError> {
        let header = decode_header(token).map_err(|e| JwksError::Invalid(e.to_string()))?;
        let kid = header
            .kid
            .ok_or_else(|| JwksError::Invalid("token header missing kid".to_string()))?;

        let key = match self.cached_key(&kid).await {
            Some(key) => key,
            None => {
                self.refresh_keys().await?;
                self.cached_key(&kid)
                    .await
                    .ok_or_else(|| JwksError::UnknownKey(kid.clone()))?
            }
        };

        decode::<C>(token, &key, &self.validation).map_err(|e| JwksError::Invalid(e.to_string()))
    }

    async fn cached_key(&self, kid: &str) -> Option<DecodingKey> {
        self.keys.read().await.get(kid).cloned()
    }

    async fn refresh_keys(&self) -> Result<(), JwksError> {
        let set: JwkSet = self
            .http
            .get(&self.jwks_url)
            .send()
            .await
            .map_err(|e| JwksError::Fetch(e.to_string()))?
            .error_for_status()
            .map_err(|e| JwksError::Fetch(e.to_string()))?
            .json()
            .await
            .map_err(|e| JwksError::Fetch(e.to_string()))?;

        let mut fresh = HashMap::new();
        for jwk in set.keys {
            if jwk.kty != "RSA" {
                continue;
            }
            let (Some(n), Some(e)) = (jwk.n.as_deref(), jwk.e.as_deref()) else {
                continue;
            };
            if let Ok(key) = DecodingKey::from_rsa_components(n, e) {
                fresh.insert(jwk.kid, key);
            }
        }

        *self.keys.write().await = fresh;
        Ok(())
    }
}
