use std::path::PathBuf;

use anyhow::{anyhow, Result};
use chrono::Utc;
use tokio::sync::Mutex;

use crate::credentials::ClientCredentials;
use crate::oauth::{refresh_access_token, run_installed_app_flow};
use crate::token_store::{StoredToken, TokenStore};

/// Supplies bearer tokens for the Google Calendar API.
///
/// The cached token is refreshed transparently when it is about to expire.
pub struct GoogleAuthenticator {
    credentials_path: PathBuf,
    store: TokenStore,
    http: reqwest::Client,
    cached: Mutex<Option<StoredToken>>,
}

impl GoogleAuthenticator {
    pub fn new(credentials_path: impl Into<PathBuf>, token_path: impl Into<PathBuf>) -> Self {
        Self {
            credentials_path: credentials_path.into(),
            store: TokenStore::new(token_path),
            http: reqwest::Client::new(),
            cached: Mutex::new(None),
        }
    }

    /// Make sure a usable token exists, running the consent flow if needed.
    pub async fn authenticate(&self) -> Result<()> {
        if self.refreshed_token().await?.is_some() {
            tracing::info!("google calendar token is valid");
            return Ok(());
        }

        let creds = ClientCredentials::load(&self.credentials_path)?;
        tracing::info!("starting google consent flow");
        let response = run_installed_app_flow(&self.http, &creds).await?;
        let token = response.into_stored(Utc::now(), None);
        self.store.save(&token)?;
        *self.cached.lock().await = Some(token);
        tracing::info!("google calendar token saved to {}", self.store.path().display());
        Ok(())
    }

    /// Current access token; fails when no usable token can be obtained
    /// without user interaction.
    pub async fn access_token(&self) -> Result<String> {
        self.refreshed_token()
            .await?
            .map(|token| token.access_token)
            .ok_or_else(|| anyhow!("not authenticated with google calendar; run `calremind auth`"))
    }

    async fn refreshed_token(&self) -> Result<Option<StoredToken>> {
        let mut cached = self.cached.lock().await;
        if cached.is_none() {
            *cached = self.store.load()?;
        }

        let Some(token) = cached.clone() else {
            return Ok(None);
        };

        if !token.needs_refresh(Utc::now()) {
            return Ok(Some(token));
        }
        if !token.can_refresh() {
            tracing::warn!("google token expired and no refresh token is stored");
            *cached = None;
            return Ok(None);
        }

        let creds = ClientCredentials::load(&self.credentials_path)?;
        let refresh = token.refresh_token.clone().unwrap_or_default();
        tracing::debug!("refreshing google access token");
        let response = refresh_access_token(&self.http, &creds, &refresh).await?;
        let renewed = response.into_stored(Utc::now(), token.refresh_token);
        self.store.save(&renewed)?;
        *cached = Some(renewed.clone());
        Ok(Some(renewed))
    }
}
