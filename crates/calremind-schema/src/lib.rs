use std::fmt;

use chrono::{DateTime, FixedOffset, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub const MIN_IMPORTANCE: u8 = 1;
pub const MAX_IMPORTANCE: u8 = 10;
pub const DEFAULT_IMPORTANCE: u8 = 5;

/// Snapshot of one calendar occurrence as returned by the calendar source.
///
/// Produced fresh on every fetch; never persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CalendarEvent {
    /// Provider-assigned id, stable across fetches of the same occurrence.
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub location: String,
    pub start: DateTime<FixedOffset>,
    pub end: DateTime<FixedOffset>,
    #[serde(default)]
    pub is_all_day: bool,
    #[serde(default)]
    pub attendee_count: u32,
    /// Deep link into the calendar UI
    #[serde(default)]
    pub html_link: Option<String>,
}

impl CalendarEvent {
    /// Build an event; `end` is clamped so it never precedes `start`.
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        start: DateTime<FixedOffset>,
        end: DateTime<FixedOffset>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: String::new(),
            location: String::new(),
            start,
            end: end.max(start),
            is_all_day: false,
            attendee_count: 0,
            html_link: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    pub fn with_attendees(mut self, count: u32) -> Self {
        self.attendee_count = count;
        self
    }

    pub fn with_link(mut self, link: impl Into<String>) -> Self {
        self.html_link = Some(link.into());
        self
    }

    pub fn all_day(mut self) -> Self {
        self.is_all_day = true;
        self
    }

    pub fn start_utc(&self) -> DateTime<Utc> {
        self.start.with_timezone(&Utc)
    }

    /// Whole minutes between start and end, never negative.
    pub fn duration_minutes(&self) -> i64 {
        (self.end - self.start).num_minutes().max(0)
    }

    pub fn has_location(&self) -> bool {
        !self.location.trim().is_empty()
    }

    pub fn version_key(&self) -> VersionKey {
        VersionKey::for_event(self)
    }
}

/// Fingerprint of the fields that affect reminder scheduling.
///
/// Title, start instant and location participate; description, attendees and
/// links do not, so editing them never triggers re-planning.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VersionKey(String);

impl VersionKey {
    pub fn for_event(event: &CalendarEvent) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(event.title.as_bytes());
        hasher.update(b"\x1f");
        hasher.update(format_instant(event.start_utc()).as_bytes());
        hasher.update(b"\x1f");
        hasher.update(event.location.as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VersionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0[..12])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanSource {
    Oracle,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedReminder {
    pub fire_at: DateTime<Utc>,
    pub message: String,
}

impl PlannedReminder {
    pub fn new(fire_at: DateTime<Utc>, message: impl Into<String>) -> Self {
        Self {
            fire_at,
            message: message.into(),
        }
    }
}

/// Reminder schedule derived for one version of an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderPlan {
    pub summary: String,
    pub importance: u8,
    /// Ordered by increasing `fire_at`; instants may repeat.
    pub reminders: Vec<PlannedReminder>,
    pub generated_at: DateTime<Utc>,
    pub source: PlanSource,
}

impl ReminderPlan {
    pub fn new(
        summary: impl Into<String>,
        importance: i64,
        mut reminders: Vec<PlannedReminder>,
        generated_at: DateTime<Utc>,
        source: PlanSource,
    ) -> Self {
        reminders.sort_by_key(|r| r.fire_at);
        Self {
            summary: summary.into(),
            importance: clamp_importance(importance),
            reminders,
            generated_at,
            source,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.reminders.is_empty()
    }

    pub fn len(&self) -> usize {
        self.reminders.len()
    }
}

pub fn clamp_importance(raw: i64) -> u8 {
    raw.clamp(MIN_IMPORTANCE as i64, MAX_IMPORTANCE as i64) as u8
}

/// One delivered reminder as recorded in the ledger. Never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentReminder {
    pub event_id: String,
    pub event_title: String,
    pub event_start: DateTime<Utc>,
    pub fire_at: DateTime<Utc>,
    pub sent_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerStats {
    pub total: u64,
    pub last_7_days: u64,
}

impl fmt::Display for LedgerStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} reminders sent in total, {} in the last 7 days",
            self.total, self.last_7_days
        )
    }
}

/// Outcome of one pass of the reminder cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleReport {
    pub events_seen: usize,
    pub plans_generated: usize,
    pub plans_reused: usize,
    pub reminders_due: usize,
    pub reminders_sent: usize,
    pub reminders_skipped: usize,
    pub delivery_failures: usize,
    pub event_failures: usize,
    pub pruned: usize,
}

/// Canonical text form of an instant: UTC, RFC 3339, nanosecond precision.
///
/// Two instants are equal iff their canonical forms are equal.
pub fn format_instant(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;

    fn offset() -> FixedOffset {
        FixedOffset::east_opt(2 * 3600).unwrap()
    }

    fn sample() -> CalendarEvent {
        let start = offset().with_ymd_and_hms(2026, 3, 2, 10, 0, 0).unwrap();
        CalendarEvent::new("evt-1", "Board Review", start, start + Duration::minutes(90))
            .with_location("Room 4")
            .with_description("Quarterly numbers")
    }

    #[test]
    fn end_before_start_is_clamped() {
        let start = offset().with_ymd_and_hms(2026, 3, 2, 10, 0, 0).unwrap();
        let event = CalendarEvent::new("e", "t", start, start - Duration::hours(1));
        assert_eq!(event.end, event.start);
        assert_eq!(event.duration_minutes(), 0);
    }

    #[test]
    fn duration_is_whole_minutes() {
        let mut event = sample();
        event.end = event.start + Duration::seconds(150);
        assert_eq!(event.duration_minutes(), 2);
        assert_eq!(sample().duration_minutes(), 90);
    }

    #[test]
    fn version_key_ignores_description_and_attendees() {
        let base = sample();
        let edited = sample()
            .with_description("something else entirely")
            .with_attendees(12)
            .with_link("https://calendar.example/e");
        assert_eq!(base.version_key(), edited.version_key());
    }

    #[test]
    fn version_key_tracks_title_start_and_location() {
        let base = sample().version_key();

        let mut moved = sample();
        moved.start += Duration::minutes(30);
        assert_ne!(base, moved.version_key());

        let renamed = CalendarEvent {
            title: "Board Review (moved)".into(),
            ..sample()
        };
        assert_ne!(base, renamed.version_key());

        assert_ne!(base, sample().with_location("Room 5").version_key());
    }

    #[test]
    fn version_key_compares_instants_not_offsets() {
        let event = sample();
        let mut same_instant = sample();
        same_instant.start = event.start.with_timezone(&FixedOffset::east_opt(0).unwrap());
        assert_eq!(event.version_key(), same_instant.version_key());
    }

    #[test]
    fn plan_orders_reminders_and_clamps_importance() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap();
        let plan = ReminderPlan::new(
            "summary",
            42,
            vec![
                PlannedReminder::new(now + Duration::hours(2), "late"),
                PlannedReminder::new(now + Duration::minutes(5), "early"),
            ],
            now,
            PlanSource::Oracle,
        );
        assert_eq!(plan.importance, MAX_IMPORTANCE);
        assert_eq!(plan.reminders[0].message, "early");
        assert_eq!(plan.len(), 2);
        assert_eq!(clamp_importance(-3), MIN_IMPORTANCE);
    }

    #[test]
    fn format_instant_keeps_sub_second_precision() {
        let at = Utc.timestamp_opt(1_700_000_000, 123_456_789).unwrap();
        let later = at + Duration::nanoseconds(1);
        assert_eq!(format_instant(at), "2023-11-14T22:13:20.123456789Z");
        assert_ne!(format_instant(at), format_instant(later));
    }

    #[test]
    fn plan_source_serializes_snake_case() {
        let value = serde_json::to_value(PlanSource::Fallback).unwrap();
        assert_eq!(value, "fallback");
    }
}
