//! # notify: Notification delivery
//!
//! Fan-out of report text to every configured channel. Delivery is best
//! effort: failures are logged and reported as `false`, never as errors,
//! and never influence trading or persistence.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

const SEND_TIMEOUT: Duration = Duration::from_secs(15);
const DEFAULT_PROXY_PORT: &str = "7890";

#[async_trait]
pub trait Notifier: Send + Sync {
    fn channel(&self) -> &str;

    /// `true` when the channel accepted the message.
    async fn notify(&self, text: &str) -> bool;
}

// ─── WeChat Work ──────────────────────────────────────────────────────────────

pub struct WeChatNotifier {
    client:      reqwest::Client,
    webhook_url: String,
}

impl WeChatNotifier {
    pub fn new(client: reqwest::Client, webhook_url: impl Into<String>) -> Self {
        Self { client, webhook_url: webhook_url.into() }
    }
}

#[async_trait]
impl Notifier for WeChatNotifier {
    fn channel(&self) -> &str {
        "wechat"
    }

    async fn notify(&self, text: &str) -> bool {
        let payload = json!({ "msgtype": "markdown", "markdown": { "content": text } });
        let response = match self
            .client
            .post(&self.webhook_url)
            .json(&payload)
            .timeout(SEND_TIMEOUT)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                error!(channel = "wechat", error = %e, "Webhook unreachable");
                return false;
            }
        };

        match response.json::<Value>().await {
            Ok(body) if body.get("errcode").and_then(Value::as_i64) == Some(0) => true,
            Ok(body) => {
                warn!(channel = "wechat", response = %body, "Webhook refused message");
                false
            }
            Err(e) => {
                warn!(channel = "wechat", error = %e, "Webhook response unreadable");
                false
            }
        }
    }
}

// ─── Telegram ─────────────────────────────────────────────────────────────────

pub struct TelegramNotifier {
    client:    reqwest::Client,
    bot_token: String,
    chat_id:   String,
}

/// `host:port` or bare `host` → `http://host:port`. Full URLs (`http`,
/// `https`, `socks5`, `socks5h`) pass through.
fn proxy_url(raw: &str) -> String {
    let raw = raw.trim();
    if raw.contains("://") {
        return raw.to_string();
    }
    if raw.contains(':') {
        format!("http://{raw}")
    } else {
        format!("http://{raw}:{DEFAULT_PROXY_PORT}")
    }
}

impl TelegramNotifier {
    /// A proxy gets its own HTTP client; otherwise `client` is shared.
    pub fn new(
        client: reqwest::Client,
        bot_token: impl Into<String>,
        chat_id: impl Into<String>,
        proxy: Option<&str>,
    ) -> anyhow::Result<Self> {
        let client = match proxy.filter(|p| !p.trim().is_empty()) {
            Some(raw) => {
                let url = proxy_url(raw);
                let proxy = reqwest::Proxy::all(&url).with_context(|| format!("invalid TELEGRAM_PROXY '{url}'"))?;
                reqwest::Client::builder()
                    .proxy(proxy)
                    .build()
                    .context("failed to build proxied Telegram client")?
            }
            None => client,
        };
        Ok(Self { client, bot_token: bot_token.into(), chat_id: chat_id.into() })
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    fn channel(&self) -> &str {
        "telegram"
    }

    async fn notify(&self, text: &str) -> bool {
        let url = format!("https://api.telegram.org/bot{}/sendMessage", self.bot_token);
        let payload = json!({ "chat_id": self.chat_id, "text": text });

        let response = match self.client.post(&url).json(&payload).timeout(SEND_TIMEOUT).send().await {
            Ok(r) => r,
            Err(e) => {
                // The URL carries the token; log the error kind only.
                error!(channel = "telegram", error = %e.without_url(), "Bot API unreachable");
                return false;
            }
        };

        match response.json::<Value>().await {
            Ok(body) if body.get("ok").and_then(Value::as_bool) == Some(true) => true,
            Ok(body) => {
                warn!(channel = "telegram", response = %body, "Bot API refused message");
                false
            }
            Err(e) => {
                warn!(channel = "telegram", error = %e.without_url(), "Bot API response unreadable");
                false
            }
        }
    }
}

// ─── Hub ──────────────────────────────────────────────────────────────────────

#[derive(Clone, Default)]
pub struct NotificationHub {
    notifiers: Vec<Arc<dyn Notifier>>,
}

impl NotificationHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifiers.push(notifier);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.notifiers.is_empty()
    }

    pub fn channels(&self) -> Vec<&str> {
        self.notifiers.iter().map(|n| n.channel()).collect()
    }

    /// Send to every channel; `true` when at least one accepted.
    pub async fn broadcast(&self, text: &str) -> bool {
        if self.notifiers.is_empty() {
            debug!("No notification channel configured");
            return false;
        }

        let mut delivered = 0;
        for notifier in &self.notifiers {
            if notifier.notify(text).await {
                delivered += 1;
            } else {
                warn!(channel = notifier.channel(), "⚠️ Notification not delivered");
            }
        }

        info!(delivered, channels = self.notifiers.len(), "📨 Notification sent");
        delivered > 0
    }
}
