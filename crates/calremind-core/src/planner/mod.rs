//! Reminder plan generation.
//!
//! [`PlanOracle`] asks the language-model planner first and degrades to the
//! deterministic [`FallbackPlanner`] on any failure, so planning never fails.

mod fallback;
mod llm;

use std::sync::Arc;

use async_trait::async_trait;
use calremind_schema::{CalendarEvent, PlannedReminder, ReminderPlan};
use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

pub use fallback::FallbackPlanner;
pub use llm::{build_prompt, parse_reply, strip_fences, LlmPlanner, PlanReply, ScheduleEntry};

/// Lead time of the synthesized reminder when nothing in a schedule is still ahead.
pub const SYNTHESIZED_LEAD_MINUTES: i64 = 5;

#[derive(Debug, Error)]
pub enum PlanError {
    #[error("plan provider failed: {0:#}")]
    Provider(anyhow::Error),
    #[error("undecodable plan reply: {0}")]
    Decode(String),
}

#[async_trait]
pub trait ReminderPlanner: Send + Sync {
    async fn plan(&self, event: &CalendarEvent, now: DateTime<Utc>)
        -> Result<ReminderPlan, PlanError>;
}

/// Primary planner with a deterministic safety net.
pub struct PlanOracle {
    primary: Option<Arc<dyn ReminderPlanner>>,
    fallback: FallbackPlanner,
}

impl PlanOracle {
    pub fn new(primary: Arc<dyn ReminderPlanner>) -> Self {
        Self {
            primary: Some(primary),
            fallback: FallbackPlanner,
        }
    }

    pub fn fallback_only() -> Self {
        Self {
            primary: None,
            fallback: FallbackPlanner,
        }
    }

    pub async fn plan(&self, event: &CalendarEvent, now: DateTime<Utc>) -> ReminderPlan {
        if let Some(primary) = &self.primary {
            match primary.plan(event, now).await {
                Ok(plan) => {
                    tracing::info!(
                        "planned {} reminders for '{}' (importance {})",
                        plan.len(),
                        event.title,
                        plan.importance
                    );
                    return plan;
                }
                Err(e) => {
                    tracing::warn!("planner failed for '{}', using fallback: {e}", event.title);
                }
            }
        }
        self.fallback.plan_at(event, now)
    }
}

/// Keep only reminders strictly after `now`. When none survive, add one
/// near-term reminder as long as the event has not started yet.
pub(crate) fn future_only(
    event: &CalendarEvent,
    now: DateTime<Utc>,
    candidates: Vec<PlannedReminder>,
    synthesized_message: impl FnOnce() -> String,
) -> Vec<PlannedReminder> {
    let mut kept: Vec<PlannedReminder> = candidates
        .into_iter()
        .filter(|r| r.fire_at > now)
        .collect();

    if kept.is_empty() {
        let start = event.start_utc();
        if start > now {
            let fire_at = (now + Duration::minutes(SYNTHESIZED_LEAD_MINUTES)).min(start);
            kept.push(PlannedReminder::new(fire_at, synthesized_message()));
        } else {
            tracing::debug!("'{}' already started; no reminder synthesized", event.title);
        }
    }
    kept
}
