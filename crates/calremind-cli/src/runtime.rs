use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use calremind_auth::GoogleAuthenticator;
use calremind_calendar::GoogleCalendarSource;
use calremind_channels::email::EmailChannel;
use calremind_channels::telegram::TelegramChannel;
use calremind_channels::DeliveryGateway;
use calremind_core::{
    CalendarConfig, CalremindConfig, ChannelsConfig, EngineSettings, LlmConfig, LlmPlanner,
    PlanOracle, ReminderEngine, StorageConfig,
};
use calremind_provider::{create_provider, ProviderConfig};
use calremind_scheduler::ReminderLedger;

pub fn build_gateway(channels: &ChannelsConfig) -> Result<DeliveryGateway> {
    let mut gateway = DeliveryGateway::new();

    let email = &channels.email;
    if email.enabled {
        let channel = EmailChannel::new(
            &email.smtp_server,
            email.smtp_port,
            &email.address,
            &email.password,
        )?;
        gateway.add_channel(Box::new(channel));
    }

    let telegram = &channels.telegram;
    if telegram.enabled {
        let channel = TelegramChannel::new(telegram.bot_token.clone(), &telegram.chat_id)?;
        gateway.add_channel(Box::new(channel));
    }

    tracing::info!("notification channels: {:?}", gateway.channel_names());
    Ok(gateway)
}

pub fn build_oracle(llm: &LlmConfig) -> Result<PlanOracle> {
    let mut provider_config = ProviderConfig::new(llm.provider).with_api_key(llm.api_key.clone());
    if let Some(base_url) = llm.base_url.as_deref().filter(|u| !u.trim().is_empty()) {
        provider_config = provider_config.with_base_url(base_url);
    }
    let provider = create_provider(&provider_config)?;
    let planner = LlmPlanner::new(provider, llm.model.clone()).with_max_tokens(llm.max_tokens);
    Ok(PlanOracle::new(Arc::new(planner)))
}

pub fn build_calendar(calendar: &CalendarConfig) -> Result<Arc<GoogleCalendarSource>> {
    let tz = calendar
        .tz()
        .ok_or_else(|| anyhow!("unknown timezone {:?}", calendar.timezone))?;
    let auth = Arc::new(GoogleAuthenticator::new(
        calendar.credentials_path.clone(),
        calendar.token_path.clone(),
    ));
    let source = GoogleCalendarSource::new(auth, calendar.calendar_id.clone(), tz)
        .with_max_results(calendar.max_results);
    Ok(Arc::new(source))
}

pub fn open_ledger(storage: &StorageConfig) -> Result<Arc<ReminderLedger>> {
    if let Some(parent) = storage.db_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    let ledger = ReminderLedger::open(&storage.db_path)
        .with_context(|| format!("opening ledger at {}", storage.db_path.display()))?;
    Ok(Arc::new(ledger))
}

/// Everything a calendar-driven command needs, wired from config.
pub struct Assembly {
    pub engine: ReminderEngine,
    /// Authenticate this before the first cycle.
    pub calendar: Arc<GoogleCalendarSource>,
    pub ledger: Arc<ReminderLedger>,
}

pub fn build_engine(config: &CalremindConfig) -> Result<Assembly> {
    let calendar = build_calendar(&config.calendar)?;
    let ledger = open_ledger(&config.storage)?;
    let engine = ReminderEngine::new(
        calendar.clone(),
        build_oracle(&config.llm)?,
        ledger.clone(),
        build_gateway(&config.channels)?,
        EngineSettings::from(&config.reminders),
    );
    Ok(Assembly {
        engine,
        calendar,
        ledger,
    })
}

#[cfg(test)]
mod tests {
    use calremind_provider::ProviderType;

    use super::*;

    #[tokio::test]
    async fn gateway_has_enabled_channels_only() {
        let mut channels = ChannelsConfig::default();
        assert!(build_gateway(&channels).unwrap().is_empty());

        channels.email.enabled = true;
        channels.email.address = "me@example.com".into();
        channels.email.password = "secret".into();
        channels.telegram.enabled = true;
        channels.telegram.bot_token = "123:abc".into();
        channels.telegram.chat_id = "42".into();

        let gateway = build_gateway(&channels).unwrap();
        assert_eq!(gateway.channel_names(), vec!["email", "telegram"]);
    }

    #[test]
    fn bad_chat_id_is_rejected() {
        let mut channels = ChannelsConfig::default();
        channels.telegram.enabled = true;
        channels.telegram.bot_token = "123:abc".into();
        channels.telegram.chat_id = "not-a-chat".into();
        assert!(build_gateway(&channels).is_err());
    }

    #[test]
    fn oracle_needs_key_for_hosted_providers() {
        let mut llm = LlmConfig::default();
        llm.provider = ProviderType::Gemini;
        llm.api_key = String::new();
        assert!(build_oracle(&llm).is_err());

        llm.provider = ProviderType::Ollama;
        assert!(build_oracle(&llm).is_ok());
    }

    #[test]
    fn ledger_directory_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let storage = StorageConfig {
            db_path: dir.path().join("data/nested/reminders.db"),
        };
        open_ledger(&storage).unwrap();
        assert!(storage.db_path.exists());
    }

    #[test]
    fn calendar_rejects_unknown_timezone() {
        let calendar = CalendarConfig {
            timezone: "Nowhere/Special".into(),
            ..CalendarConfig::default()
        };
        assert!(build_calendar(&calendar).is_err());
    }
}
