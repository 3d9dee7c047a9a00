pub mod config;
pub mod engine;
pub mod notification;
pub mod plan_cache;
pub mod planner;

pub use config::*;
pub use engine::{EngineSettings, ReminderEngine};
pub use notification::{format_reminder, send_test_notification, test_notification, Notification};
pub use plan_cache::PlanCache;
pub use planner::{FallbackPlanner, LlmPlanner, PlanError, PlanOracle, ReminderPlanner};
