use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;

const DEFAULT_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// OAuth client registration downloaded from the Google Cloud console.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ClientCredentials {
    pub client_id: String,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_auth_uri() -> String {
    DEFAULT_AUTH_URI.to_string()
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

#[derive(Debug, Deserialize)]
struct CredentialsFile {
    installed: Option<ClientCredentials>,
    web: Option<ClientCredentials>,
}

impl ClientCredentials {
    /// Parse a `credentials.json`; both "installed" and "web" clients are accepted.
    pub fn parse(content: &str) -> Result<Self> {
        let file: CredentialsFile =
            serde_json::from_str(content).context("invalid credentials json")?;
        file.installed
            .or(file.web)
            .ok_or_else(|| anyhow!("credentials file has neither an 'installed' nor a 'web' client"))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read credentials {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("in {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_installed_client() {
        let creds = ClientCredentials::parse(
            r#"{"installed": {"client_id": "cid.apps.googleusercontent.com",
                "client_secret": "shh",
                "auth_uri": "https://accounts.google.com/o/oauth2/auth",
                "token_uri": "https://oauth2.googleapis.com/token",
                "redirect_uris": ["http://localhost"]}}"#,
        )
        .unwrap();
        assert_eq!(creds.client_id, "cid.apps.googleusercontent.com");
        assert_eq!(creds.client_secret.as_deref(), Some("shh"));
    }

    #[test]
    fn parses_web_client_with_defaults() {
        let creds = ClientCredentials::parse(r#"{"web": {"client_id": "w"}}"#).unwrap();
        assert_eq!(creds.client_id, "w");
        assert_eq!(creds.token_uri, DEFAULT_TOKEN_URI);
        assert_eq!(creds.auth_uri, DEFAULT_AUTH_URI);
    }

    #[test]
    fn rejects_file_without_client() {
        let err = ClientCredentials::parse(r#"{"other": {}}"#).unwrap_err();
        assert!(err.to_string().contains("neither"));
    }

    #[test]
    fn load_reports_missing_file() {
        let temp = tempfile::tempdir().unwrap();
        let err = ClientCredentials::load(&temp.path().join("credentials.json")).unwrap_err();
        assert!(err.to_string().contains("failed to read credentials"));
    }
}
