use std::time::Duration;

use anyhow::{Result, anyhow};
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::core::config::DiscordConfig;
use crate::core::state::MessageIdStore;

const API_BASE: &str = "https://discord.com/api/v10";

#[derive(Debug, Deserialize)]
struct ChannelMessage {
    id: String,
    author: MessageAuthor,
}

#[derive(Debug, Deserialize)]
struct MessageAuthor {
    id: String,
}

#[derive(Deserialize)]
struct CurrentUser {
    id: String,
    username: String,
}

#[derive(Serialize)]
struct MessagePayload<'a> {
    content: &'a str,
}

/// Keeps one channel message in sync with the rendered report. Owns the
/// persisted message id: loaded once at construction, overwritten only after
/// a successful create, untouched by in-place edits.
pub struct DiscordPublisher {
    http: Client,
    auth: String,
    channel_id: String,
    bot_user_id: Option<String>,
    last_message_id: Option<String>,
    store: Box<dyn MessageIdStore>,
}

impl DiscordPublisher {
    pub async fn new(
        config: &DiscordConfig,
        store: Box<dyn MessageIdStore>,
        timeout: Duration,
    ) -> Result<Self> {
        let http = Client::builder().timeout(timeout).build()?;
        let last_message_id = match store.load().await {
            Ok(id) => id,
            Err(e) => {
                warn!("Could not read persisted message id, starting fresh: {e:#}");
                None
            }
        };
        if let Some(id) = &last_message_id {
            info!("Resuming with persisted status message {id}");
        }

        Ok(Self {
            http,
            auth: format!("Bot {}", config.bot_token.trim()),
            channel_id: config.channel_id.clone(),
            bot_user_id: None,
            last_message_id,
            store,
        })
    }

    /// Reconciles the channel against the previous publish: edits the last
    /// message in place when it is still the newest message in the channel
    /// and still ours, otherwise deletes it (best effort) and posts a
    /// replacement.
    pub async fn publish(&mut self, text: &str) -> Result<()> {
        let bot_id = self.bot_user_id().await?;
        let latest = self.latest_message().await?;

        if let Some(prior) = self.last_message_id.as_deref()
            && should_edit_in_place(latest.as_ref(), prior, &bot_id)
        {
            self.edit_message(prior, text).await?;
            debug!("Edited status message {prior} in place");
            return Ok(());
        }

        if let Some(stale) = self.last_message_id.take()
            && let Err(e) = self.delete_message(&stale).await
        {
            // Already-gone is the common case here, not a failure.
            debug!("Old status message {stale} not deleted: {e}");
        }

        let new_id = self.create_message(text).await?;
        info!("Posted new status message {new_id}");
        if let Err(e) = self.store.save(&new_id).await {
            warn!("Failed to persist message id {new_id}: {e:#}");
        }
        self.last_message_id = Some(new_id);
        Ok(())
    }

    /// Fetched lazily so a bad token surfaces as a per-tick publish error
    /// instead of killing startup.
    async fn bot_user_id(&mut self) -> Result<String> {
        if let Some(id) = &self.bot_user_id {
            return Ok(id.clone());
        }
        let res = self
            .http
            .get(format!("{API_BASE}/users/@me"))
            .header("Authorization", &self.auth)
            .send()
            .await?;
        let me: CurrentUser = check(res, "fetch bot identity").await?.json().await?;
        info!("Authenticated to Discord as {} ({})", me.username, me.id);
        self.bot_user_id = Some(me.id.clone());
        Ok(me.id)
    }

    async fn latest_message(&self) -> Result<Option<ChannelMessage>> {
        let res = self
            .http
            .get(format!("{API_BASE}/channels/{}/messages", self.channel_id))
            .query(&[("limit", "1")])
            .header("Authorization", &self.auth)
            .send()
            .await?;
        let messages: Vec<ChannelMessage> =
            check(res, "fetch channel messages").await?.json().await?;
        Ok(messages.into_iter().next())
    }

    async fn create_message(&self, content: &str) -> Result<String> {
        let res = self
            .http
            .post(format!("{API_BASE}/channels/{}/messages", self.channel_id))
            .header("Authorization", &self.auth)
            .json(&MessagePayload { content })
            .send()
            .await?;
        let message: ChannelMessage = check(res, "create message").await?.json().await?;
        Ok(message.id)
    }

    async fn edit_message(&self, message_id: &str, content: &str) -> Result<()> {
        let res = self
            .http
            .patch(format!(
                "{API_BASE}/channels/{}/messages/{message_id}",
                self.channel_id
            ))
            .header("Authorization", &self.auth)
            .json(&MessagePayload { content })
            .send()
            .await?;
        check(res, "edit message").await?;
        Ok(())
    }

    async fn delete_message(&self, message_id: &str) -> Result<()> {
        let res = self
            .http
            .delete(format!(
                "{API_BASE}/channels/{}/messages/{message_id}",
                self.channel_id
            ))
            .header("Authorization", &self.auth)
            .send()
            .await?;
        check(res, "delete message").await?;
        Ok(())
    }
}

fn should_edit_in_place(
    latest: Option<&ChannelMessage>,
    prior_id: &str,
    bot_user_id: &str,
) -> bool {
    latest.is_some_and(|m| m.id == prior_id && m.author.id == bot_user_id)
}

async fn check(res: Response, action: &str) -> Result<Response> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }
    Err(anyhow!(
        "Discord API error ({status}) on {action}: {}",
        res.text().await.unwrap_or_default()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(id: &str, author: &str) -> ChannelMessage {
        ChannelMessage {
            id: id.to_string(),
            author: MessageAuthor {
                id: author.to_string(),
            },
        }
    }

    #[test]
    fn edits_when_latest_is_ours_and_matches_prior() {
        let latest = message("100", "bot");
        assert!(should_edit_in_place(Some(&latest), "100", "bot"));
    }

    #[test]
    fn recreates_when_someone_posted_after_us() {
        let latest = message("200", "someone-else");
        assert!(!should_edit_in_place(Some(&latest), "100", "bot"));
    }

    #[test]
    fn recreates_when_latest_is_ours_but_newer_than_prior() {
        let latest = message("300", "bot");
        assert!(!should_edit_in_place(Some(&latest), "100", "bot"));
    }

    #[test]
    fn recreates_when_channel_is_empty() {
        assert!(!should_edit_in_place(None, "100", "bot"));
    }

    #[test]
    fn channel_message_parses_from_api_payload() {
        let json = r#"{
            "id": "1178901234567890123",
            "channel_id": "999",
            "content": "hello",
            "author": {"id": "42", "username": "streampulse", "bot": true}
        }"#;
        let message: ChannelMessage = serde_json::from_str(json).unwrap();
        assert_eq!(message.id, "1178901234567890123");
        assert_eq!(message.author.id, "42");
    }

    #[test]
    fn message_payload_is_just_content() {
        let payload = serde_json::to_value(MessagePayload { content: "hi" }).unwrap();
        assert_eq!(payload, serde_json::json!({"content": "hi"}));
    }
}
