//! Google service account credentials for the Cloud Vision API.
//!
//! Mints OAuth2 access tokens from the JSON key named by
//! `GOOGLE_APPLICATION_CREDENTIALS` using the JWT bearer grant, and caches the
//! token until shortly before it expires.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

const VISION_SCOPE: &str = "https://www.googleapis.com/auth/cloud-vision";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
/// Refresh this many seconds before the reported expiry.
const EXPIRY_MARGIN_SECS: u64 = 60;

#[derive(Clone, Deserialize)]
struct ServiceAccountKey {
    client_email: String,
    private_key: String,
    #[serde(default)]
    token_uri: Option<String>,
}

#[derive(Clone)]
struct CachedToken {
    access_token: String,
    expires_at: u64,
}

/// Token source backed by a service account key.
#[derive(Clone)]
pub struct ServiceAccountAuth {
    sa_key: ServiceAccountKey,
    token_cache: Arc<Mutex<Option<CachedToken>>>,
}

impl ServiceAccountAuth {
    /// Load the service account key from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let key_json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read service account key: {:?}", path))?;
        Self::from_json(&key_json)
            .with_context(|| format!("Failed to parse service account key: {:?}", path))
    }

    pub fn from_json(key_json: &str) -> Result<Self> {
        let sa_key: ServiceAccountKey =
            serde_json::from_str(key_json).context("Invalid service account JSON")?;

        Ok(Self {
            sa_key,
            token_cache: Arc::new(Mutex::new(None)),
        })
    }

    pub fn client_email(&self) -> &str {
        &self.sa_key.client_email
    }

    fn token_uri(&self) -> &str {
        self.sa_key.token_uri.as_deref().unwrap_or(DEFAULT_TOKEN_URI)
    }

    fn cached_token(&self, now: u64) -> Option<String> {
        let cache = self.token_cache.lock().unwrap_or_else(PoisonError::into_inner);
        cache
            .as_ref()
            .filter(|cached| now < cached.expires_at.saturating_sub(EXPIRY_MARGIN_SECS))
            .map(|cached| cached.access_token.clone())
    }

    /// Get a valid OAuth2 access token, refreshing if expired.
    pub async fn access_token(&self, client: &reqwest::Client) -> Result<String> {
        let now = now_secs();
        if let Some(token) = self.cached_token(now) {
            return Ok(token);
        }

        let claims = serde_json::json!({
            "iss": self.sa_key.client_email,
            "scope": VISION_SCOPE,
            "aud": self.token_uri(),
            "iat": now,
            "exp": now + 3600,
        });

        let header = jsonwebtoken::Header::new(jsonwebtoken::Algorithm::RS256);
        let encoding_key =
            jsonwebtoken::EncodingKey::from_rsa_pem(self.sa_key.private_key.as_bytes())
                .context("Invalid RSA private key in service account JSON")?;

        let jwt = jsonwebtoken::encode(&header, &claims, &encoding_key)
            .context("Failed to encode JWT")?;

        #[derive(Deserialize)]
        struct TokenResponse {
            access_token: String,
            expires_in: u64,
        }

        debug!("Requesting Vision access token for {}", self.sa_key.client_email);

        let resp: TokenResponse = client
            .post(self.token_uri())
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", jwt.as_str()),
            ])
            .send()
            .await
            .context("Token exchange request failed")?
            .error_for_status()
            .context("Token exchange returned error")?
            .json()
            .await
            .context("Failed to parse token response")?;

        let token = resp.access_token.clone();
        {
            let mut cache = self.token_cache.lock().unwrap_or_else(PoisonError::into_inner);
            *cache = Some(CachedToken {
                access_token: resp.access_token,
                expires_at: now + resp.expires_in,
            });
        }

        Ok(token)
    }
}

fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
