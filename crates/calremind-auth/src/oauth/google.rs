use std::time::Duration;

use anyhow::{Context, Result};
use base64::Engine;
use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::server::{wait_for_oauth_callback, OAUTH_CALLBACK_ADDR, OAUTH_CALLBACK_PATH};
use crate::credentials::ClientCredentials;
use crate::token_store::StoredToken;

pub const CALENDAR_READONLY_SCOPE: &str = "https://www.googleapis.com/auth/calendar.readonly";

const CONSENT_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PkcePair {
    pub verifier: String,
    pub challenge: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GoogleTokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub scope: Option<String>,
}

impl GoogleTokenResponse {
    /// Convert into the cached form. Google omits the refresh token on
    /// refresh responses, so the previous one is carried over.
    pub fn into_stored(self, now: DateTime<Utc>, previous_refresh: Option<String>) -> StoredToken {
        StoredToken {
            access_token: self.access_token,
            refresh_token: self.refresh_token.or(previous_refresh),
            expires_at: self
                .expires_in
                .map(|secs| now + chrono::Duration::seconds(secs)),
            scope: self.scope,
        }
    }
}

pub fn generate_pkce_pair() -> PkcePair {
    let mut random = [0_u8; 32];
    rand::thread_rng().fill_bytes(&mut random);
    let verifier = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(random);

    let challenge = {
        let digest = Sha256::digest(verifier.as_bytes());
        base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(digest)
    };

    PkcePair {
        verifier,
        challenge,
    }
}

pub fn redirect_uri() -> String {
    format!("http://{OAUTH_CALLBACK_ADDR}{OAUTH_CALLBACK_PATH}")
}

/// Consent URL requesting offline access so a refresh token is issued.
pub fn build_authorize_url(
    creds: &ClientCredentials,
    redirect_uri: &str,
    code_challenge: &str,
    state: &str,
) -> String {
    format!(
        "{}?response_type=code&client_id={}&redirect_uri={}&scope={}&code_challenge={}&code_challenge_method=S256&state={}&access_type=offline&prompt=consent",
        creds.auth_uri,
        urlencoding::encode(&creds.client_id),
        urlencoding::encode(redirect_uri),
        urlencoding::encode(CALENDAR_READONLY_SCOPE),
        urlencoding::encode(code_challenge),
        urlencoding::encode(state),
    )
}

pub fn open_authorize_url(url: &str) -> Result<()> {
    webbrowser::open(url)
        .map(|_| ())
        .with_context(|| format!("failed to open browser for {url}"))
}

pub async fn run_installed_app_flow(
    http: &reqwest::Client,
    creds: &ClientCredentials,
) -> Result<GoogleTokenResponse> {
    let pkce = generate_pkce_pair();
    let state = uuid::Uuid::new_v4().to_string();
    let redirect = redirect_uri();

    let authorize_url = build_authorize_url(creds, &redirect, &pkce.challenge, &state);
    println!("Opening browser for Google Calendar consent. If it does not open, visit:\n{authorize_url}");
    if let Err(e) = open_authorize_url(&authorize_url) {
        tracing::warn!("{e:#}");
    }

    let callback = wait_for_oauth_callback(OAUTH_CALLBACK_ADDR, state, CONSENT_TIMEOUT).await?;

    exchange_code_for_tokens(http, creds, &redirect, &callback.code, &pkce.verifier).await
}

pub async fn exchange_code_for_tokens(
    http: &reqwest::Client,
    creds: &ClientCredentials,
    redirect_uri: &str,
    code: &str,
    code_verifier: &str,
) -> Result<GoogleTokenResponse> {
    let mut payload = vec![
        ("grant_type", "authorization_code"),
        ("client_id", creds.client_id.as_str()),
        ("redirect_uri", redirect_uri),
        ("code", code),
        ("code_verifier", code_verifier),
    ];
    if let Some(secret) = creds.client_secret.as_deref() {
        payload.push(("client_secret", secret));
    }

    post_token_form(http, &creds.token_uri, &payload)
        .await
        .context("google token exchange failed")
}

pub async fn refresh_access_token(
    http: &reqwest::Client,
    creds: &ClientCredentials,
    refresh_token: &str,
) -> Result<GoogleTokenResponse> {
    let mut payload = vec![
        ("grant_type", "refresh_token"),
        ("client_id", creds.client_id.as_str()),
        ("refresh_token", refresh_token),
    ];
    if let Some(secret) = creds.client_secret.as_deref() {
        payload.push(("client_secret", secret));
    }

    post_token_form(http, &creds.token_uri, &payload)
        .await
        .context("google token refresh failed")
}

async fn post_token_form(
    http: &reqwest::Client,
    token_uri: &str,
    payload: &[(&str, &str)],
) -> Result<GoogleTokenResponse> {
    let response = http
        .post(token_uri)
        .header("content-type", "application/x-www-form-urlencoded")
        .form(payload)
        .send()
        .await
        .with_context(|| format!("failed to reach {token_uri}"))?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<failed to read error body>".to_string());
        anyhow::bail!("token endpoint returned {status}: {body}");
    }

    response
        .json::<GoogleTokenResponse>()
        .await
        .context("invalid token response payload")
}
