//! Access token providers for the Drive API
//!
//! Two credential flows are supported:
//! - a refresh token obtained once through the interactive consent flow
//! - a service account key, exchanged for tokens with a signed assertion
//!
//! Both cache the access token until shortly before it expires.

use crate::config::AuthConfig;
use async_trait::async_trait;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

/// Full Drive access, needed to create and delete backups
pub const DRIVE_SCOPE: &str = "https://www.googleapis.com/auth/drive";

const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);
const ASSERTION_LIFETIME_SECS: u64 = 3600;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Failed to read credential file {path}: {source}")]
    KeyFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid service account key: {0}")]
    InvalidKey(String),

    #[error("Token request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Token endpoint rejected the request ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("Failed to sign token assertion: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),

    #[error("No refresh token configured; run `drive-backup authorize` first")]
    MissingRefreshToken,
}

/// Source of bearer tokens for the remote store
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn access_token(&self) -> Result<String, AuthError>;
}

/// Token endpoint response
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

struct CachedToken {
    value: String,
    expires_at: Instant,
}

/// Holds the current access token until it is about to expire
#[derive(Default)]
struct TokenCache {
    current: Mutex<Option<CachedToken>>,
}

impl TokenCache {
    async fn get_or_fetch<F, Fut>(&self, fetch: F) -> Result<String, AuthError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<TokenResponse, AuthError>>,
    {
        let mut current = self.current.lock().await;
        if let Some(ref token) = *current {
            if Instant::now() + EXPIRY_MARGIN < token.expires_at {
                return Ok(token.value.clone());
            }
        }

        let response = fetch().await?;
        let lifetime = Duration::from_secs(response.expires_in.unwrap_or(3600));
        *current = Some(CachedToken {
            value: response.access_token.clone(),
            expires_at: Instant::now() + lifetime,
        });
        debug!("Obtained new access token valid for {:?}", lifetime);
        Ok(response.access_token)
    }
}

/// POST a form to the token endpoint and decode the response
pub async fn request_token(
    http: &reqwest::Client,
    token_uri: &str,
    form: &[(&str, &str)],
) -> Result<TokenResponse, AuthError> {
    let response = http.post(token_uri).form(form).send().await?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(AuthError::Rejected {
            status: status.as_u16(),
            body,
        });
    }
    Ok(response.json().await?)
}

/// Exchange an authorization code from the consent flow for tokens
pub async fn exchange_code(
    http: &reqwest::Client,
    token_uri: &str,
    client_id: &str,
    client_secret: &str,
    redirect_uri: &str,
    code: &str,
) -> Result<TokenResponse, AuthError> {
    request_token(
        http,
        token_uri,
        &[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", client_id),
            ("client_secret", client_secret),
            ("redirect_uri", redirect_uri),
        ],
    )
    .await
}

/// Provider backed by a long-lived refresh token
pub struct RefreshTokenProvider {
    http: reqwest::Client,
    client_id: String,
    client_secret: String,
    refresh_token: String,
    token_uri: String,
    cache: TokenCache,
}

impl RefreshTokenProvider {
    pub fn new(
        http: reqwest::Client,
        client_id: String,
        client_secret: String,
        refresh_token: String,
        token_uri: String,
    ) -> Self {
        Self {
            http,
            client_id,
            client_secret,
            refresh_token,
            token_uri,
            cache: TokenCache::default(),
        }
    }
}

#[async_trait]
impl TokenProvider for RefreshTokenProvider {
    async fn access_token(&self) -> Result<String, AuthError> {
        if self.refresh_token.is_empty() {
            return Err(AuthError::MissingRefreshToken);
        }

        self.cache
            .get_or_fetch(|| async move {
                request_token(
                    &self.http,
                    &self.token_uri,
                    &[
                        ("grant_type", "refresh_token"),
                        ("refresh_token", self.refresh_token.as_str()),
                        ("client_id", self.client_id.as_str()),
                        ("client_secret", self.client_secret.as_str()),
                    ],
                )
                .await
            })
            .await
    }
}

/// Fields of a service account key file that the token exchange needs
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default)]
    pub private_key_id: Option<String>,
    #[serde(default)]
    pub token_uri: Option<String>,
}

impl ServiceAccountKey {
    pub fn from_file(path: &std::path::Path) -> Result<Self, AuthError> {
        let contents = std::fs::read_to_string(path).map_err(|source| AuthError::KeyFile {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&contents).map_err(|e| AuthError::InvalidKey(e.to_string()))
    }

    pub fn token_uri(&self) -> &str {
        self.token_uri.as_deref().unwrap_or(DEFAULT_TOKEN_URI)
    }
}

#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: u64,
    exp: u64,
}

/// Build the signed assertion exchanged for an access token
pub fn sign_assertion(key: &ServiceAccountKey, issued_at: u64) -> Result<String, AuthError> {
    let claims = AssertionClaims {
        iss: &key.client_email,
        scope: DRIVE_SCOPE,
        aud: key.token_uri(),
        iat: issued_at,
        exp: issued_at + ASSERTION_LIFETIME_SECS,
    };

    let mut header = Header::new(Algorithm::RS256);
    header.kid = key.private_key_id.clone();

    let signing_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())?;
    Ok(jsonwebtoken::encode(&header, &claims, &signing_key)?)
}

/// Provider backed by a service account key file.
///
/// The key file is read on every token refresh, so a missing file surfaces
/// when the first token is requested.
pub struct ServiceAccountProvider {
    http: reqwest::Client,
    key_file: PathBuf,
    cache: TokenCache,
}

impl ServiceAccountProvider {
    pub fn new(http: reqwest::Client, key_file: PathBuf) -> Self {
        Self {
            http,
            key_file,
            cache: TokenCache::default(),
        }
    }

    async fn fetch(&self) -> Result<TokenResponse, AuthError> {
        let key = ServiceAccountKey::from_file(&self.key_file)?;
        let issued_at = chrono::Utc::now().timestamp().max(0) as u64;
        let assertion = sign_assertion(&key, issued_at)?;

        request_token(
            &self.http,
            key.token_uri(),
            &[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())],
        )
        .await
    }
}

#[async_trait]
impl TokenProvider for ServiceAccountProvider {
    async fn access_token(&self) -> Result<String, AuthError> {
        self.cache.get_or_fetch(|| self.fetch()).await
    }
}

/// Build the token provider matching the configured credential flow
pub fn provider_from_config(auth: &AuthConfig, http: reqwest::Client) -> Arc<dyn TokenProvider> {
    match auth {
        AuthConfig::OAuth {
            client_id,
            client_secret,
            refresh_token,
            token_uri,
            ..
        } => Arc::new(RefreshTokenProvider::new(
            http,
            client_id.clone(),
            client_secret.clone(),
            refresh_token.clone(),
            token_uri.clone(),
        )),
        AuthConfig::ServiceAccount { key_file } => Arc::new(ServiceAccountProvider::new(
            http,
            crate::config::expand_tilde(key_file),
        )),
    }
}
