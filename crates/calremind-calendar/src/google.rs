use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use calremind_auth::GoogleAuthenticator;
use calremind_schema::CalendarEvent;
use chrono::{Duration, SecondsFormat, Utc};
use chrono_tz::Tz;

use crate::convert::{convert_events, GoogleEventList};
use crate::CalendarSource;

const CALENDAR_API_BASE: &str = "https://www.googleapis.com/calendar/v3";
const DEFAULT_MAX_RESULTS: u32 = 50;

pub struct GoogleCalendarSource {
    auth: Arc<GoogleAuthenticator>,
    http: reqwest::Client,
    api_base: String,
    calendar_id: String,
    timezone: Tz,
    max_results: u32,
}

impl GoogleCalendarSource {
    pub fn new(auth: Arc<GoogleAuthenticator>, calendar_id: impl Into<String>, timezone: Tz) -> Self {
        Self {
            auth,
            http: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
            api_base: CALENDAR_API_BASE.to_string(),
            calendar_id: calendar_id.into(),
            timezone,
            max_results: DEFAULT_MAX_RESULTS,
        }
    }

    pub fn with_base_url(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_max_results(mut self, max_results: u32) -> Self {
        self.max_results = max_results;
        self
    }

    fn events_url(&self) -> String {
        format!(
            "{}/calendars/{}/events",
            self.api_base,
            urlencoding::encode(&self.calendar_id)
        )
    }
}

#[async_trait]
impl CalendarSource for GoogleCalendarSource {
    async fn authenticate(&self) -> Result<()> {
        self.auth
            .authenticate()
            .await
            .context("google calendar authentication failed")
    }

    async fn fetch_events(&self, lookahead_hours: u32) -> Result<Vec<CalendarEvent>> {
        let token = self.auth.access_token().await?;
        let now = Utc::now();
        let time_min = now.to_rfc3339_opts(SecondsFormat::Secs, true);
        let time_max =
            (now + Duration::hours(i64::from(lookahead_hours))).to_rfc3339_opts(SecondsFormat::Secs, true);
        let max_results = self.max_results.to_string();

        let response = self
            .http
            .get(self.events_url())
            .bearer_auth(token)
            .query(&[
                ("timeMin", time_min.as_str()),
                ("timeMax", time_max.as_str()),
                ("maxResults", max_results.as_str()),
                ("singleEvents", "true"),
                ("orderBy", "startTime"),
            ])
            .send()
            .await
            .context("failed to reach google calendar")?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<failed to read error body>".to_string());
            anyhow::bail!("google calendar returned {status}: {body}");
        }

        let list: GoogleEventList = response
            .json()
            .await
            .context("invalid google calendar events payload")?;
        let events = convert_events(&list, self.timezone);
        tracing::info!(
            "fetched {} events from calendar {} (next {lookahead_hours}h)",
            events.len(),
            self.calendar_id
        );
        Ok(events)
    }
}
