pub mod convert;
pub mod google;

use anyhow::Result;
use async_trait::async_trait;
use calremind_schema::CalendarEvent;

pub use google::GoogleCalendarSource;

/// Read access to upcoming calendar events.
#[async_trait]
pub trait CalendarSource: Send + Sync {
    /// Establish credentials; may be interactive the first time.
    async fn authenticate(&self) -> Result<()>;

    /// Events starting between now and `lookahead_hours` from now, ordered by start.
    async fn fetch_events(&self, lookahead_hours: u32) -> Result<Vec<CalendarEvent>>;
}
