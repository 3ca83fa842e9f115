//! One-time credential bootstrap for the refresh-token flow
//!
//! Prints a consent URL, waits on the redirect URI for the authorization
//! code, exchanges it for tokens and hands back the refresh token. The
//! listener shuts down as soon as one exchange succeeds.

use super::auth::{exchange_code, DRIVE_SCOPE};
use crate::config::AuthConfig;
use anyhow::{Context, Result};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use reqwest::Url;
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tracing::{error, info, warn};

const CONSENT_ENDPOINT: &str = "https://accounts.google.com/o/oauth2/v2/auth";

const SUCCESS_PAGE: &str = "<!DOCTYPE html>\
<html><head><title>drive-backup</title></head>\
<body><h1>Authorization complete</h1>\
<p>The refresh token has been printed in your terminal. You can close this window.</p>\
</body></html>";

/// OAuth client settings needed to run the consent flow
#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub token_uri: String,
}

impl ClientSettings {
    pub fn from_auth(auth: &AuthConfig) -> Result<Self> {
        match auth {
            AuthConfig::OAuth {
                client_id,
                client_secret,
                redirect_uri,
                token_uri,
                ..
            } => Ok(Self {
                client_id: client_id.clone(),
                client_secret: client_secret.clone(),
                redirect_uri: redirect_uri.clone(),
                token_uri: token_uri.clone(),
            }),
            AuthConfig::ServiceAccount { .. } => {
                anyhow::bail!("`authorize` only applies to the oauth credential type; service accounts need no bootstrap")
            }
        }
    }
}

/// Consent page URL requesting offline Drive access
pub fn consent_url(settings: &ClientSettings) -> Result<Url> {
    Url::parse_with_params(
        CONSENT_ENDPOINT,
        &[
            ("client_id", settings.client_id.as_str()),
            ("redirect_uri", settings.redirect_uri.as_str()),
            ("response_type", "code"),
            ("scope", DRIVE_SCOPE),
            ("access_type", "offline"),
            ("prompt", "consent"),
        ],
    )
    .context("Failed to build consent URL")
}

/// Local address and route the redirect URI points at
pub fn callback_target(redirect_uri: &str) -> Result<(SocketAddr, String)> {
    let url = Url::parse(redirect_uri)
        .with_context(|| format!("Invalid redirect URI: {}", redirect_uri))?;
    let port = url.port_or_known_default().unwrap_or(3000);
    Ok((SocketAddr::from(([127, 0, 0, 1], port)), url.path().to_string()))
}

#[derive(Debug, Deserialize)]
struct CallbackParams {
    code: Option<String>,
    error: Option<String>,
}

struct CallbackState {
    http: reqwest::Client,
    settings: ClientSettings,
    refresh_token: Mutex<Option<String>>,
    done: Notify,
}

async fn handle_callback(
    State(state): State<Arc<CallbackState>>,
    Query(params): Query<CallbackParams>,
) -> Response {
    if let Some(reason) = params.error {
        warn!("Consent was not granted: {}", reason);
        return (StatusCode::BAD_REQUEST, format!("Authorization failed: {}", reason)).into_response();
    }

    let Some(code) = params.code else {
        return (StatusCode::BAD_REQUEST, "Missing authorization code").into_response();
    };

    let settings = &state.settings;
    let tokens = match exchange_code(
        &state.http,
        &settings.token_uri,
        &settings.client_id,
        &settings.client_secret,
        &settings.redirect_uri,
        &code,
    )
    .await
    {
        Ok(tokens) => tokens,
        Err(e) => {
            error!("Failed to exchange authorization code: {}", e);
            return (StatusCode::INTERNAL_SERVER_ERROR, format!("Token exchange failed: {}", e)).into_response();
        }
    };

    let Some(refresh_token) = tokens.refresh_token else {
        error!("Token endpoint returned no refresh token");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            "No refresh token returned. Revoke the app's access and try again.",
        )
            .into_response();
    };

    if let Ok(mut slot) = state.refresh_token.lock() {
        *slot = Some(refresh_token);
    }
    state.done.notify_one();
    Html(SUCCESS_PAGE).into_response()
}

/// Serve the callback route on `listener` until one code exchange succeeds
pub async fn serve_callback(
    listener: TcpListener,
    path: &str,
    settings: ClientSettings,
    http: reqwest::Client,
) -> Result<String> {
    let state = Arc::new(CallbackState {
        http,
        settings,
        refresh_token: Mutex::new(None),
        done: Notify::new(),
    });

    let app = Router::new()
        .route(path, get(handle_callback))
        .with_state(state.clone());

    let shutdown_state = state.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown_state.done.notified().await })
        .await
        .context("Callback server failed")?;

    let token = state
        .refresh_token
        .lock()
        .ok()
        .and_then(|mut slot| slot.take());
    token.context("Callback server stopped before receiving a refresh token")
}

/// Run the interactive bootstrap and return the refresh token
pub async fn run_authorize(auth: &AuthConfig) -> Result<String> {
    let settings = ClientSettings::from_auth(auth)?;
    let url = consent_url(&settings)?;
    let (addr, path) = callback_target(&settings.redirect_uri)?;

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to listen on {}", addr))?;

    println!("Open this URL in a browser and grant access:\n\n{}\n", url);
    info!("Waiting for the authorization callback on http://{}{}", addr, path);

    serve_callback(listener, &path, settings, reqwest::Client::new()).await
}
