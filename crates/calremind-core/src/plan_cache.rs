use std::collections::HashMap;

use calremind_schema::{CalendarEvent, ReminderPlan, VersionKey};

/// Memoized plans keyed by event id, valid only for the version they were made for.
#[derive(Debug, Default)]
pub struct PlanCache {
    entries: HashMap<String, (VersionKey, ReminderPlan)>,
}

impl PlanCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The cached plan, unless the event changed since it was planned.
    pub fn get(&self, event: &CalendarEvent) -> Option<&ReminderPlan> {
        let (version, plan) = self.entries.get(&event.id)?;
        (*version == event.version_key()).then_some(plan)
    }

    pub fn insert(&mut self, event: &CalendarEvent, plan: ReminderPlan) {
        let version = event.version_key();
        if let Some((previous, _)) = self.entries.get(&event.id) {
            tracing::debug!(
                "replacing plan for '{}' ({previous} -> {version})",
                event.title
            );
        }
        self.entries.insert(event.id.clone(), (version, plan));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
