use anyhow::Result;

/// A single outbound notification transport.
#[async_trait::async_trait]
pub trait NotificationChannel: Send + Sync {
    fn name(&self) -> &str;
    async fn send(&self, subject: &str, body: &str) -> Result<()>;
}

#[cfg(feature = "telegram")]
pub mod telegram;

#[cfg(feature = "email")]
pub mod email;

/// Fans a notification out to every configured channel.
#[derive(Default)]
pub struct DeliveryGateway {
    channels: Vec<Box<dyn NotificationChannel>>,
}

impl DeliveryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_channel(mut self, channel: Box<dyn NotificationChannel>) -> Self {
        self.channels.push(channel);
        self
    }

    pub fn add_channel(&mut self, channel: Box<dyn NotificationChannel>) {
        self.channels.push(channel);
    }

    pub fn channel_names(&self) -> Vec<&str> {
        self.channels.iter().map(|c| c.name()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Try every channel in order. True iff at least one accepted the message.
    pub async fn deliver(&self, subject: &str, body: &str) -> bool {
        if self.channels.is_empty() {
            tracing::warn!("no notification channels configured; dropping \"{subject}\"");
            return false;
        }

        let mut delivered = false;
        for channel in &self.channels {
            match channel.send(subject, body).await {
                Ok(()) => {
                    tracing::info!("delivered \"{subject}\" via {}", channel.name());
                    delivered = true;
                }
                Err(e) => {
                    tracing::error!("{} delivery failed: {e:#}", channel.name());
                }
            }
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use anyhow::anyhow;

    use super::*;

    struct FakeChannel {
        name: &'static str,
        fail: bool,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl NotificationChannel for FakeChannel {
        fn name(&self) -> &str {
            self.name
        }

        async fn send(&self, _subject: &str, _body: &str) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(anyhow!("{} is down", self.name))
            } else {
                Ok(())
            }
        }
    }

    fn fake(name: &'static str, fail: bool, calls: &Arc<AtomicUsize>) -> Box<dyn NotificationChannel> {
        Box::new(FakeChannel {
            name,
            fail,
            calls: Arc::clone(calls),
        })
    }

    #[tokio::test]
    async fn empty_gateway_reports_failure() {
        assert!(!DeliveryGateway::new().deliver("s", "b").await);
    }

    #[tokio::test]
    async fn one_success_is_enough() {
        let calls = Arc::new(AtomicUsize::new(0));
        let gateway = DeliveryGateway::new()
            .with_channel(fake("email", true, &calls))
            .with_channel(fake("telegram", false, &calls));

        assert!(gateway.deliver("s", "b").await);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn every_channel_is_tried_after_success() {
        let calls = Arc::new(AtomicUsize::new(0));
        let gateway = DeliveryGateway::new()
            .with_channel(fake("email", false, &calls))
            .with_channel(fake("telegram", false, &calls));

        assert!(gateway.deliver("s", "b").await);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(gateway.channel_names(), vec!["email", "telegram"]);
    }

    #[tokio::test]
    async fn all_failures_report_false() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut gateway = DeliveryGateway::new();
        gateway.add_channel(fake("email", true, &calls));
        gateway.add_channel(fake("telegram", true, &calls));

        assert!(!gateway.deliver("s", "b").await);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
