use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use calremind_calendar::CalendarSource;
use calremind_channels::DeliveryGateway;
use calremind_scheduler::{CycleRunner, SentLedger};
use calremind_schema::{format_instant, CalendarEvent, CycleReport, ReminderPlan};
use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;

use crate::config::ReminderSettings;
use crate::notification::format_reminder;
use crate::plan_cache::PlanCache;
use crate::planner::PlanOracle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    pub lookahead_hours: u32,
    pub retention_days: u32,
    /// A reminder is due once its fire time is at most this far ahead.
    pub due_window: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from(&ReminderSettings::default())
    }
}

impl From<&ReminderSettings> for EngineSettings {
    fn from(settings: &ReminderSettings) -> Self {
        Self {
            lookahead_hours: settings.lookahead_hours,
            retention_days: settings.retention_days,
            due_window: Duration::seconds(settings.due_window_seconds),
        }
    }
}

/// Fetch, plan, deliver and record reminders, one cycle at a time.
pub struct ReminderEngine {
    calendar: Arc<dyn CalendarSource>,
    oracle: PlanOracle,
    ledger: Arc<dyn SentLedger>,
    gateway: DeliveryGateway,
    settings: EngineSettings,
    // Held for a whole cycle, so cycles never overlap.
    cache: Mutex<PlanCache>,
}

impl ReminderEngine {
    pub fn new(
        calendar: Arc<dyn CalendarSource>,
        oracle: PlanOracle,
        ledger: Arc<dyn SentLedger>,
        gateway: DeliveryGateway,
        settings: EngineSettings,
    ) -> Self {
        Self {
            calendar,
            oracle,
            ledger,
            gateway,
            settings,
            cache: Mutex::new(PlanCache::new()),
        }
    }

    pub async fn run_cycle_at(&self, now: DateTime<Utc>) -> Result<CycleReport> {
        let mut cache = self.cache.lock().await;
        let mut report = CycleReport::default();

        let events = self
            .calendar
            .fetch_events(self.settings.lookahead_hours)
            .await
            .context("fetching calendar events")?;
        if events.is_empty() {
            tracing::info!("no upcoming events in the next {}h", self.settings.lookahead_hours);
            return Ok(report);
        }
        report.events_seen = events.len();

        for event in &events {
            if let Err(e) = self.process_event(&mut cache, event, now, &mut report).await {
                report.event_failures += 1;
                tracing::error!(
                    event_id = %event.id,
                    "failed to process '{}': {e:#}",
                    event.title
                );
            }
        }

        match self.ledger.prune_at(self.settings.retention_days, now).await {
            Ok(removed) => {
                report.pruned = removed;
                if removed > 0 {
                    tracing::info!("pruned {removed} old ledger entries");
                }
            }
            Err(e) => tracing::warn!("ledger prune failed: {e:#}"),
        }

        tracing::info!(
            events = report.events_seen,
            generated = report.plans_generated,
            reused = report.plans_reused,
            due = report.reminders_due,
            sent = report.reminders_sent,
            skipped = report.reminders_skipped,
            "cycle finished"
        );
        Ok(report)
    }

    async fn process_event(
        &self,
        cache: &mut PlanCache,
        event: &CalendarEvent,
        now: DateTime<Utc>,
        report: &mut CycleReport,
    ) -> Result<()> {
        let plan: ReminderPlan = match cache.get(event) {
            Some(plan) => {
                report.plans_reused += 1;
                plan.clone()
            }
            None => {
                let plan = self.oracle.plan(event, now).await;
                report.plans_generated += 1;
                cache.insert(event, plan.clone());
                plan
            }
        };

        let start = event.start_utc();
        for reminder in &plan.reminders {
            if reminder.fire_at - now > self.settings.due_window {
                continue;
            }
            report.reminders_due += 1;

            if self.ledger.exists(&event.id, reminder.fire_at).await? {
                report.reminders_skipped += 1;
                continue;
            }

            let notification = format_reminder(event, &reminder.message, &plan.summary);
            if self
                .gateway
                .deliver(&notification.subject, &notification.body)
                .await
            {
                self.ledger
                    .commit_at(&event.id, &event.title, start, reminder.fire_at, now)
                    .await?;
                report.reminders_sent += 1;
            } else {
                report.delivery_failures += 1;
                tracing::warn!(
                    "reminder for '{}' at {} not delivered; will retry next cycle",
                    event.title,
                    format_instant(reminder.fire_at)
                );
            }
        }
        Ok(())
    }
}

#[async_trait]
impl CycleRunner for ReminderEngine {
    async fn run_cycle(&self) -> Result<CycleReport> {
        self.run_cycle_at(Utc::now()).await
    }
}
