use std::sync::Arc;

use async_trait::async_trait;
use calremind_provider::{LlmProvider, LlmRequest};
use calremind_schema::{CalendarEvent, PlanSource, PlannedReminder, ReminderPlan, DEFAULT_IMPORTANCE};
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use serde_json::Value;

use super::{future_only, PlanError, ReminderPlanner};

const DEFAULT_HOURS_BEFORE: f64 = 1.0;
const DEFAULT_MESSAGE: &str = "Upcoming event reminder";
const MS_PER_HOUR: f64 = 3_600_000.0;
/// Offsets beyond roughly a century are treated as garbage.
const MAX_OFFSET_HOURS: f64 = 1_000_000.0;

/// Asks a language model for a reminder schedule.
pub struct LlmPlanner {
    provider: Arc<dyn LlmProvider>,
    model: String,
    max_tokens: u32,
}

impl LlmPlanner {
    pub fn new(provider: Arc<dyn LlmProvider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            max_tokens: 1024,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

#[async_trait]
impl ReminderPlanner for LlmPlanner {
    async fn plan(
        &self,
        event: &CalendarEvent,
        now: DateTime<Utc>,
    ) -> Result<ReminderPlan, PlanError> {
        let request = LlmRequest::simple(self.model.clone(), None, build_prompt(event, now))
            .with_max_tokens(self.max_tokens);
        let response = self
            .provider
            .chat(request)
            .await
            .map_err(PlanError::Provider)?;
        let reply = parse_reply(&response.text)?;
        Ok(reply.into_plan(event, now))
    }
}

pub fn build_prompt(event: &CalendarEvent, now: DateTime<Utc>) -> String {
    let hours_until = (event.start_utc() - now).num_seconds() as f64 / 3600.0;
    let or_none = |s: &str| {
        if s.trim().is_empty() {
            "None".to_string()
        } else {
            s.to_string()
        }
    };

    format!(
        r#"You are an intelligent calendar assistant. Analyze this upcoming event and decide how and when to remind the user about it.

Event Details:
- Title: {title}
- Description: {description}
- Location: {location}
- Location specified: {has_location}
- Start Time: {start}
- Duration: {duration} minutes
- All-day event: {all_day}
- Number of attendees: {attendees}
- Hours until event: {hours_until:.1}

Your task:
1. Write a natural, friendly summary of this event (1-2 sentences)
2. Rate the event's importance from 1 to 10, considering the number of attendees, the duration and keywords in the title or description (interview, deadline, meeting with leadership, ...)
3. Choose reminder times, considering travel to the location, the kind of event, preparation needed for long events and how far away the event is
4. Write a short contextual message for each reminder

Rules:
- If a location is specified, assume 30-60 minutes of travel and remind accordingly
- Very important events (8+) get 3-4 reminders
- Normal events (5-7) get 2-3 reminders
- Low importance events (1-4) get 1-2 reminders
- The first reminder should be 12-24 hours before when there is time for it
- Always include a final reminder 10-15 minutes before the start
- If the event starts within 1 hour, send only one immediate reminder
- Never schedule a reminder in the past

Respond ONLY with valid JSON in exactly this format:
{{
  "natural_summary": "friendly event description",
  "importance_score": 7,
  "reminder_schedule": [
    {{"hours_before": 24, "message": "Reminder message for this timing"}},
    {{"hours_before": 2, "message": "Another reminder message"}}
  ]
}}"#,
        title = event.title,
        description = or_none(&event.description),
        location = or_none(&event.location),
        has_location = if event.has_location() { "yes" } else { "no" },
        start = event.start.format("%Y-%m-%d %H:%M"),
        duration = event.duration_minutes(),
        all_day = event.is_all_day,
        attendees = event.attendee_count,
    )
}

/// Remove a surrounding Markdown code fence, if any.
pub fn strip_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    let body = body.trim();
    body.strip_suffix("```").unwrap_or(body).trim()
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlanReply {
    #[serde(default)]
    pub natural_summary: Option<String>,
    #[serde(default)]
    pub importance_score: Option<Value>,
    #[serde(default)]
    pub reminder_schedule: Option<Vec<ScheduleEntry>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScheduleEntry {
    #[serde(default)]
    pub hours_before: Option<Value>,
    #[serde(default)]
    pub message: Option<String>,
}

pub fn parse_reply(text: &str) -> Result<PlanReply, PlanError> {
    let payload = strip_fences(text);
    serde_json::from_str(payload).map_err(|e| PlanError::Decode(e.to_string()))
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

impl PlanReply {
    pub fn into_plan(self, event: &CalendarEvent, now: DateTime<Utc>) -> ReminderPlan {
        let start = event.start_utc();
        let candidates = self
            .reminder_schedule
            .unwrap_or_default()
            .into_iter()
            .filter_map(|entry| {
                let hours = entry
                    .hours_before
                    .as_ref()
                    .and_then(as_number)
                    .unwrap_or(DEFAULT_HOURS_BEFORE);
                if !hours.is_finite() || hours.abs() > MAX_OFFSET_HOURS {
                    tracing::debug!("ignoring reminder offset {hours} for '{}'", event.title);
                    return None;
                }
                let offset = Duration::milliseconds((hours * MS_PER_HOUR).round() as i64);
                let fire_at = start.checked_sub_signed(offset)?;
                let message = entry
                    .message
                    .filter(|m| !m.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_MESSAGE.to_string());
                Some(PlannedReminder::new(fire_at, message))
            })
            .collect();

        let reminders = future_only(event, now, candidates, || {
            format!("Immediate reminder: {} is coming up soon!", event.title)
        });

        let summary = self
            .natural_summary
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| event.title.clone());
        let importance = self
            .importance_score
            .as_ref()
            .and_then(as_number)
            .filter(|n| n.is_finite())
            .map(|n| n as i64)
            .unwrap_or(i64::from(DEFAULT_IMPORTANCE));

        ReminderPlan::new(summary, importance, reminders, now, PlanSource::Oracle)
    }
}

#[cfg(test)]
mod tests {
    use calremind_provider::StubProvider;
    use chrono::{FixedOffset, TimeZone};

    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()
    }

    fn event() -> CalendarEvent {
        let start = (now() + Duration::hours(30)).with_timezone(&FixedOffset::east_opt(3600).unwrap());
        CalendarEvent::new("evt", "Interview", start, start + Duration::minutes(45))
            .with_location("HQ, floor 3")
            .with_attendees(4)
    }

    #[test]
    fn strip_fences_handles_json_and_bare_fences() {
        assert_eq!(strip_fences("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(strip_fences("```\n{}\n```  "), "{}");
        assert_eq!(strip_fences("  {\"a\": 1}  "), "{\"a\": 1}");
    }

    #[test]
    fn prompt_carries_event_context() {
        let prompt = build_prompt(&event(), now());
        assert!(prompt.contains("- Title: Interview"));
        assert!(prompt.contains("- Location: HQ, floor 3"));
        assert!(prompt.contains("- Description: None"));
        assert!(prompt.contains("- Duration: 45 minutes"));
        assert!(prompt.contains("- Number of attendees: 4"));
        assert!(prompt.contains("- Hours until event: 30.0"));
        assert!(prompt.contains("- Start Time: 2026-03-02 16:00"));
        assert!(prompt.contains("\"reminder_schedule\""));
    }

    #[test]
    fn reply_converts_offsets_to_instants() {
        let reply = parse_reply(
            r#"```json
{"natural_summary": "Big interview", "importance_score": 9,
 "reminder_schedule": [
   {"hours_before": 24, "message": "Prepare"},
   {"hours_before": 0.25, "message": "Leave now"},
   {"hours_before": 1.5, "message": "Pack"}
 ]}
```"#,
        )
        .unwrap();
        let plan = reply.into_plan(&event(), now());
        let start = event().start_utc();

        assert_eq!(plan.importance, 9);
        assert_eq!(plan.summary, "Big interview");
        assert_eq!(
            plan.reminders
                .iter()
                .map(|r| (r.fire_at, r.message.as_str()))
                .collect::<Vec<_>>(),
            vec![
                (start - Duration::hours(24), "Prepare"),
                (start - Duration::minutes(90), "Pack"),
                (start - Duration::minutes(15), "Leave now"),
            ]
        );
    }

    #[test]
    fn missing_fields_get_defaults() {
        let plan = parse_reply(r#"{"reminder_schedule": [{}]}"#)
            .unwrap()
            .into_plan(&event(), now());

        assert_eq!(plan.summary, "Interview");
        assert_eq!(plan.importance, DEFAULT_IMPORTANCE);
        assert_eq!(plan.reminders[0].fire_at, event().start_utc() - Duration::hours(1));
        assert_eq!(plan.reminders[0].message, DEFAULT_MESSAGE);
    }

    #[test]
    fn importance_is_clamped_and_accepts_strings() {
        let high = parse_reply(r#"{"importance_score": 42}"#).unwrap();
        assert_eq!(high.into_plan(&event(), now()).importance, 10);
        let text = parse_reply(r#"{"importance_score": "0"}"#).unwrap();
        assert_eq!(text.into_plan(&event(), now()).importance, 1);
    }

    #[test]
    fn only_past_offsets_yield_single_immediate_reminder() {
        let plan = parse_reply(
            r#"{"reminder_schedule": [{"hours_before": 48, "message": "way back"},
                                     {"hours_before": 31, "message": "also past"}]}"#,
        )
        .unwrap()
        .into_plan(&event(), now());

        assert_eq!(plan.len(), 1);
        assert_eq!(plan.reminders[0].fire_at, now() + Duration::minutes(5));
        assert_eq!(
            plan.reminders[0].message,
            "Immediate reminder: Interview is coming up soon!"
        );
        assert!(plan.reminders.iter().all(|r| r.fire_at > now()));
    }

    #[test]
    fn non_json_reply_is_decode_error() {
        assert!(matches!(
            parse_reply("Sure! Here is your plan."),
            Err(PlanError::Decode(_))
        ));
        assert!(matches!(parse_reply("[1, 2]"), Err(PlanError::Decode(_))));
    }

    #[tokio::test]
    async fn planner_sends_prompt_and_parses_reply() {
        let provider = Arc::new(StubProvider::new(
            r#"{"natural_summary": "s", "importance_score": 6, "reminder_schedule": []}"#,
        ));
        let plan = LlmPlanner::new(provider, "gemini-1.5-flash")
            .with_max_tokens(256)
            .plan(&event(), now())
            .await
            .unwrap();

        assert_eq!(plan.source, PlanSource::Oracle);
        assert_eq!(plan.len(), 1);
        assert_eq!(plan.importance, 6);
    }
}
