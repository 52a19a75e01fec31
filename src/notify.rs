use anyhow::{Context, anyhow};
use async_trait::async_trait;
use log::debug;
use reqwest::{Client, ClientBuilder};
use serde::{Deserialize, Serialize};

use crate::{ports::NotificationSink, ratelimit::SendLimiter};

const TELEGRAM_API: &str = "https://api.telegram.org";

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: i64,
    text: &'a str,
}

#[derive(Deserialize)]
struct ApiReply {
    ok: bool,
    description: Option<String>,
}

/// Sends notifications through the Telegram Bot API.
pub struct TelegramNotifier {
    client: Client,
    limiter: SendLimiter,
    send_url: String,
}

impl TelegramNotifier {
    pub fn new(bot_token: &str) -> anyhow::Result<Self> {
        Self::with_base_url(TELEGRAM_API, bot_token)
    }

    pub fn with_base_url(base_url: &str, bot_token: &str) -> anyhow::Result<Self> {
        let client = ClientBuilder::new().build()?;
        Ok(Self {
            client,
            limiter: SendLimiter::new(),
            send_url: format!("{}/bot{}/sendMessage", base_url.trim_end_matches('/'), bot_token),
        })
    }

    pub async fn send_message(&self, chat_id: i64, text: &str) -> anyhow::Result<()> {
        self.limiter.wait_for(chat_id).await;

        let response = self
            .client
            .post(&self.send_url)
            .json(&SendMessage { chat_id, text })
            .send()
            .await
            .context("telegram request failed")?;
        let status = response.status();
        let reply: ApiReply = response
            .json()
            .await
            .with_context(|| format!("unreadable telegram reply ({status})"))?;
        if !reply.ok {
            return Err(anyhow!(
                "telegram rejected message to {chat_id}: {}",
                reply.description.unwrap_or_else(|| status.to_string())
            ));
        }
        self.limiter.forget_idle_chats();
        debug!("sent message to chat {chat_id}");
        Ok(())
    }
}

#[async_trait]
impl NotificationSink for TelegramNotifier {
    async fn send(&self, recipient_id: i64, text: &str) -> anyhow::Result<()> {
        self.send_message(recipient_id, text).await
    }
}
