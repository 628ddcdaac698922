use std::sync::Arc;

use poise::serenity_prelude::{
    async_trait, ChannelId, CreateActionRow, CreateButton, CreateEmbed, CreateMessage, Http,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MessagingError {
    #[error("failed to send to channel {0}: {1}")]
    Send(ChannelId, #[source] poise::serenity_prelude::Error),
}

/// Outbound messaging seam. The lifecycle talks to Discord only through
/// this trait, which keeps it testable against a recording double.
#[async_trait]
pub trait Messenger: Send + Sync {
    async fn send_message(&self, channel: ChannelId, text: &str) -> Result<(), MessagingError>;

    /// Send an embed, optionally with a link button pointing at the
    /// challenge files.
    async fn send_embed(
        &self,
        channel: ChannelId,
        embed: CreateEmbed,
        attachment_url: Option<&str>,
    ) -> Result<(), MessagingError>;
}

pub struct DiscordMessenger {
    http: Arc<Http>,
}

impl DiscordMessenger {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl Messenger for DiscordMessenger {
    async fn send_message(&self, channel: ChannelId, text: &str) -> Result<(), MessagingError> {
        channel
            .say(&self.http, text)
            .await
            .map(|_| ())
            .map_err(|e| MessagingError::Send(channel, e))
    }

    async fn send_embed(
        &self,
        channel: ChannelId,
        embed: CreateEmbed,
        attachment_url: Option<&str>,
    ) -> Result<(), MessagingError> {
        let mut message = CreateMessage::new().embed(embed);
        if let Some(url) = attachment_url {
            message = message.components(vec![CreateActionRow::Buttons(vec![
                CreateButton::new_link(url).label("📎 Attachment"),
            ])]);
        }
        channel
            .send_message(&self.http, message)
            .await
            .map(|_| ())
            .map_err(|e| MessagingError::Send(channel, e))
    }
}

#[cfg(test)]
pub mod test_support {
    use std::sync::Mutex;

    use poise::serenity_prelude as ser;
    use poise::serenity_prelude::{async_trait, ChannelId, CreateEmbed};

    use super::{Messenger, MessagingError};

    #[derive(Clone, Debug)]
    pub struct Sent {
        pub channel: ChannelId,
        /// Plain text for messages, serialised JSON for embeds.
        pub content: String,
        pub attachment_url: Option<String>,
    }

    /// Records outbound messages instead of talking to Discord, and can
    /// be told to start failing after a number of successful sends.
    #[derive(Default)]
    pub struct RecordingMessenger {
        pub sent: Mutex<Vec<Sent>>,
        fail_after: Option<usize>,
    }

    impl RecordingMessenger {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn failing_after(n: usize) -> Self {
            Self { sent: Mutex::new(Vec::new()), fail_after: Some(n) }
        }

        pub fn contents(&self) -> Vec<String> {
            self.sent.lock().unwrap().iter().map(|s| s.content.clone()).collect()
        }

        pub fn sent_count(&self) -> usize {
            self.sent.lock().unwrap().len()
        }

        fn record(
            &self,
            channel: ChannelId,
            content: String,
            attachment_url: Option<String>,
        ) -> Result<(), MessagingError> {
            let mut sent = self.sent.lock().unwrap();
            if let Some(limit) = self.fail_after {
                if sent.len() >= limit {
                    return Err(MessagingError::Send(
                        channel,
                        ser::Error::Other("simulated send failure"),
                    ));
                }
            }
            sent.push(Sent { channel, content, attachment_url });
            Ok(())
        }
    }

    #[async_trait]
    impl Messenger for RecordingMessenger {
        async fn send_message(&self, channel: ChannelId, text: &str) -> Result<(), MessagingError> {
            self.record(channel, text.to_owned(), None)
        }

        async fn send_embed(
            &self,
            channel: ChannelId,
            embed: CreateEmbed,
            attachment_url: Option<&str>,
        ) -> Result<(), MessagingError> {
            let content = serde_json::to_string(&embed).unwrap_or_default();
            self.record(channel, content, attachment_url.map(str::to_owned))
        }
    }
}
