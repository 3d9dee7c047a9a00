use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Tokens are refreshed this long before they actually expire.
pub const REFRESH_SKEW_SECS: i64 = 60;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredToken {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub scope: Option<String>,
}

impl StoredToken {
    pub fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expires_at) => expires_at - Duration::seconds(REFRESH_SKEW_SECS) <= now,
            None => self.access_token.is_empty(),
        }
    }

    pub fn can_refresh(&self) -> bool {
        self.refresh_token
            .as_deref()
            .is_some_and(|token| !token.is_empty())
    }
}

/// JSON token cache on disk.
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A missing or unreadable cache yields `None` so the caller re-authenticates.
    pub fn load(&self) -> Result<Option<StoredToken>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read {}", self.path.display()))?;

        match serde_json::from_str::<StoredToken>(&content) {
            Ok(token) => Ok(Some(token)),
            Err(e) => {
                tracing::warn!("ignoring corrupt token cache {}: {e}", self.path.display());
                Ok(None)
            }
        }
    }

    pub fn save(&self, token: &StoredToken) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        let payload = serde_json::to_string_pretty(token).context("serialize token cache")?;
        fs::write(&self.path, payload)
            .with_context(|| format!("failed to write {}", self.path.display()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn token(expires_at: Option<DateTime<Utc>>) -> StoredToken {
        StoredToken {
            access_token: "ya29.token".into(),
            refresh_token: Some("1//refresh".into()),
            expires_at,
            scope: None,
        }
    }

    #[test]
    fn needs_refresh_applies_skew() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        assert!(!token(Some(now + Duration::seconds(61))).needs_refresh(now));
        assert!(token(Some(now + Duration::seconds(60))).needs_refresh(now));
        assert!(token(Some(now - Duration::hours(1))).needs_refresh(now));
        assert!(!token(None).needs_refresh(now));
    }

    #[test]
    fn save_creates_directory_and_round_trips() {
        let temp = tempfile::tempdir().expect("create temp dir");
        let store = TokenStore::new(temp.path().join("nested").join("token.json"));
        let original = token(Some(Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()));

        store.save(&original).expect("save token");

        assert!(store.path().exists());
        assert_eq!(store.load().unwrap(), Some(original));
    }

    #[test]
    fn missing_file_loads_none() {
        let temp = tempfile::tempdir().expect("create temp dir");
        let store = TokenStore::new(temp.path().join("token.json"));
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn invalid_json_loads_none() {
        let temp = tempfile::tempdir().expect("create temp dir");
        let store = TokenStore::new(temp.path().join("token.json"));
        std::fs::write(store.path(), "{ this is invalid json ").expect("write invalid json");
        assert!(store.load().expect("load should not fail").is_none());
    }

    #[test]
    fn can_refresh_requires_non_empty_refresh_token() {
        let mut t = token(None);
        assert!(t.can_refresh());
        t.refresh_token = Some(String::new());
        assert!(!t.can_refresh());
        t.refresh_token = None;
        assert!(!t.can_refresh());
    }
}
