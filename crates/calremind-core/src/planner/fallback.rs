use async_trait::async_trait;
use calremind_schema::{
    CalendarEvent, PlanSource, PlannedReminder, ReminderPlan, DEFAULT_IMPORTANCE,
};
use chrono::{DateTime, Duration, Utc};

use super::{future_only, PlanError, ReminderPlanner};

/// Fixed 24h / 2h / 15m schedule used when the model cannot be consulted.
#[derive(Debug, Clone, Copy, Default)]
pub struct FallbackPlanner;

impl FallbackPlanner {
    pub fn plan_at(&self, event: &CalendarEvent, now: DateTime<Utc>) -> ReminderPlan {
        let start = event.start_utc();
        let title = &event.title;
        let offsets = [
            (Duration::hours(24), format!("Tomorrow: {title}")),
            (Duration::hours(2), format!("In 2 hours: {title}")),
            (Duration::minutes(15), format!("Starting soon: {title}")),
        ];

        let candidates = offsets
            .into_iter()
            .map(|(offset, message)| PlannedReminder::new(start - offset, message))
            .collect();
        let reminders = future_only(event, now, candidates, || {
            format!("Reminder: {title} is coming up!")
        });

        ReminderPlan::new(
            title.clone(),
            i64::from(DEFAULT_IMPORTANCE),
            reminders,
            now,
            PlanSource::Fallback,
        )
    }
}

#[async_trait]
impl ReminderPlanner for FallbackPlanner {
    async fn plan(
        &self,
        event: &CalendarEvent,
        now: DateTime<Utc>,
    ) -> Result<ReminderPlan, PlanError> {
        Ok(self.plan_at(event, now))
    }
}

#[cfg(test)]
mod tests {
    use chrono::{FixedOffset, TimeZone};

    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()
    }

    fn event_starting_after(delta: Duration) -> CalendarEvent {
        let start = (now() + delta).with_timezone(&FixedOffset::east_opt(3600).unwrap());
        CalendarEvent::new("evt", "Board Review", start, start + Duration::hours(1))
    }

    #[test]
    fn distant_event_gets_three_reminders() {
        let event = event_starting_after(Duration::hours(24) + Duration::minutes(10));
        let plan = FallbackPlanner.plan_at(&event, now());

        let fire_times: Vec<_> = plan.reminders.iter().map(|r| r.fire_at).collect();
        let start = event.start_utc();
        assert_eq!(
            fire_times,
            vec![
                start - Duration::hours(24),
                start - Duration::hours(2),
                start - Duration::minutes(15),
            ]
        );
        assert_eq!(plan.reminders[0].message, "Tomorrow: Board Review");
        assert_eq!(plan.reminders[1].message, "In 2 hours: Board Review");
        assert_eq!(plan.reminders[2].message, "Starting soon: Board Review");
        assert_eq!(plan.reminders[0].fire_at, now() + Duration::minutes(10));
    }

    #[test]
    fn event_in_three_hours_skips_day_before() {
        let plan = FallbackPlanner.plan_at(&event_starting_after(Duration::hours(3)), now());
        assert_eq!(plan.len(), 2);
        assert!(plan.reminders.iter().all(|r| r.fire_at > now()));
    }

    #[test]
    fn event_in_twenty_minutes_keeps_only_final_reminder() {
        let plan = FallbackPlanner.plan_at(&event_starting_after(Duration::minutes(20)), now());
        assert_eq!(plan.len(), 1);
        assert_eq!(plan.reminders[0].message, "Starting soon: Board Review");
        assert_eq!(plan.reminders[0].fire_at, now() + Duration::minutes(5));
    }

    #[test]
    fn event_in_ten_minutes_gets_synthesized_reminder() {
        let plan = FallbackPlanner.plan_at(&event_starting_after(Duration::minutes(10)), now());
        assert_eq!(plan.len(), 1);
        assert_eq!(plan.reminders[0].fire_at, now() + Duration::minutes(5));
        assert_eq!(
            plan.reminders[0].message,
            "Reminder: Board Review is coming up!"
        );
    }

    #[test]
    fn fallback_defaults_summary_and_importance() {
        let plan = FallbackPlanner.plan_at(&event_starting_after(Duration::days(3)), now());
        assert_eq!(plan.summary, "Board Review");
        assert_eq!(plan.importance, DEFAULT_IMPORTANCE);
        assert_eq!(plan.source, PlanSource::Fallback);
        assert_eq!(plan.generated_at, now());
    }
}
