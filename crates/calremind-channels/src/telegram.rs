use anyhow::{anyhow, Result};
use teloxide::prelude::*;
use teloxide::types::ChatId;

use crate::NotificationChannel;

pub struct TelegramChannel {
    bot: Bot,
    chat_id: ChatId,
}

impl TelegramChannel {
    pub fn new(token: impl Into<String>, chat_id: &str) -> Result<Self> {
        let chat_id = parse_chat_id(chat_id)
            .ok_or_else(|| anyhow!("invalid telegram chat_id: {chat_id:?}"))?;
        Ok(Self {
            bot: Bot::new(token),
            chat_id: ChatId(chat_id),
        })
    }
}

#[async_trait::async_trait]
impl NotificationChannel for TelegramChannel {
    fn name(&self) -> &str {
        "telegram"
    }

    /// The subject is dropped; chat messages carry the body alone.
    async fn send(&self, _subject: &str, body: &str) -> Result<()> {
        self.bot
            .send_message(self.chat_id, body)
            .await
            .map_err(|e| anyhow!("telegram send_message failed: {e}"))?;
        Ok(())
    }
}

/// Group chats carry a leading minus sign.
fn parse_chat_id(raw: &str) -> Option<i64> {
    raw.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_chat_id_accepts_user_and_group_ids() {
        assert_eq!(parse_chat_id("123456789"), Some(123456789));
        assert_eq!(parse_chat_id(" -1001234567890 "), Some(-1001234567890));
        assert_eq!(parse_chat_id("@channel"), None);
    }

    #[test]
    fn new_rejects_bad_chat_id() {
        assert!(TelegramChannel::new("123:abc", "not-a-number").is_err());
    }
}
