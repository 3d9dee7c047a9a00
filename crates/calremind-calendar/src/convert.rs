//! Google Calendar API payloads and their mapping onto [`CalendarEvent`].

use anyhow::{anyhow, Context, Result};
use calremind_schema::CalendarEvent;
use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, Offset, TimeZone};
use chrono_tz::Tz;
use serde::Deserialize;

const UNTITLED: &str = "No Title";

#[derive(Debug, Clone, Deserialize)]
pub struct GoogleEventList {
    #[serde(default)]
    pub items: Vec<GoogleEvent>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleEvent {
    pub id: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub start: Option<GoogleEventTime>,
    #[serde(default)]
    pub end: Option<GoogleEventTime>,
    #[serde(default)]
    pub attendees: Vec<serde_json::Value>,
    #[serde(default)]
    pub html_link: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleEventTime {
    #[serde(default)]
    pub date_time: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
}

/// Convert one API item. All-day dates are interpreted in `tz`.
pub fn convert_event(item: &GoogleEvent, tz: Tz) -> Result<CalendarEvent> {
    let start_raw = item
        .start
        .as_ref()
        .ok_or_else(|| anyhow!("event {} has no start", item.id))?;

    let (start, is_all_day) = match (&start_raw.date_time, &start_raw.date) {
        (Some(dt), _) => (parse_date_time(dt)?, false),
        (None, Some(date)) => (local_at(date, NaiveTime::MIN, tz)?, true),
        (None, None) => return Err(anyhow!("event {} has an empty start", item.id)),
    };

    let end = match item.end.as_ref() {
        Some(GoogleEventTime {
            date_time: Some(dt),
            ..
        }) => parse_date_time(dt)?,
        Some(GoogleEventTime {
            date: Some(date), ..
        }) => {
            let last_second = NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN);
            local_at(date, last_second, tz)?
        }
        _ => start + Duration::hours(1),
    };

    let title = item
        .summary
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(UNTITLED);

    let mut event = CalendarEvent::new(&item.id, title, start, end)
        .with_description(item.description.clone().unwrap_or_default())
        .with_location(item.location.clone().unwrap_or_default())
        .with_attendees(u32::try_from(item.attendees.len()).unwrap_or(u32::MAX));
    if let Some(link) = item.html_link.as_deref().filter(|l| !l.is_empty()) {
        event = event.with_link(link);
    }
    if is_all_day {
        event = event.all_day();
    }
    Ok(event)
}

/// Convert a page of items, skipping the ones that cannot be interpreted.
pub fn convert_events(list: &GoogleEventList, tz: Tz) -> Vec<CalendarEvent> {
    list.items
        .iter()
        .filter_map(|item| match convert_event(item, tz) {
            Ok(event) => Some(event),
            Err(e) => {
                tracing::warn!("skipping calendar item: {e:#}");
                None
            }
        })
        .collect()
}

fn parse_date_time(raw: &str) -> Result<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(raw).with_context(|| format!("invalid dateTime {raw:?}"))
}

fn local_at(date: &str, time: NaiveTime, tz: Tz) -> Result<DateTime<FixedOffset>> {
    let day = NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .with_context(|| format!("invalid date {date:?}"))?;
    let local = tz
        .from_local_datetime(&day.and_time(time))
        .earliest()
        .ok_or_else(|| anyhow!("{date} {time} does not exist in {tz}"))?;
    Ok(local.with_timezone(&local.offset().fix()))
}
