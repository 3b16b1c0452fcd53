//! Telegram Bot API: signal delivery and `/start` subscription

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use live_monitor::{Notifier, NotifyError, Recipient};
use serde::Deserialize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub const DEFAULT_API_BASE: &str = "https://api.telegram.org";

const GREETING: &str = "🏐 volley-live\n\n\
    Subscribed. You will get a message whenever a pre-match favorite \
    loses set 1 while its live odds drift up.";

// ====================================================================
// getUpdates response
// ====================================================================

#[derive(Debug, Deserialize)]
pub struct TgUpdatesResponse {
    pub ok:     bool,
    #[serde(default)]
    pub result: Vec<TgUpdate>,
}

#[derive(Debug, Deserialize)]
pub struct TgUpdate {
    pub update_id: i64,
    pub message:   Option<TgMessage>,
}

#[derive(Debug, Deserialize)]
pub struct TgMessage {
    pub message_id: i64,
    pub chat:       TgChat,
    pub text:       Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TgChat {
    pub id: i64,
}

fn excerpt(body: &str) -> String {
    body.chars().take(200).collect()
}

/// Chat id of a `/start` (or `/start@bot`) command, if this update is one.
pub fn start_command_chat(update: &TgUpdate) -> Option<i64> {
    let msg = update.message.as_ref()?;
    let command = msg.text.as_deref()?.split_whitespace().next()?;
    let command = command.split('@').next()?;
    (command == "/start").then_some(msg.chat.id)
}

// ====================================================================
// Client
// ====================================================================

#[derive(Clone)]
pub struct TelegramClient {
    http:     reqwest::Client,
    token:    String,
    api_base: String,
}

impl TelegramClient {
    pub fn new(token: impl Into<String>) -> Result<Self> {
        Self::with_base(token, DEFAULT_API_BASE)
    }

    pub fn with_base(token: impl Into<String>, api_base: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("failed to create reqwest client")?;
        Ok(Self { http, token: token.into(), api_base: api_base.into() })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.token, method)
    }

    /// Plain-text sendMessage. Returns the message id.
    pub async fn send_message(&self, chat_id: i64, text: &str) -> Result<i64, NotifyError> {
        let body = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
            "disable_web_page_preview": true,
        });
        let resp = self
            .http
            .post(self.method_url("sendMessage"))
            .json(&body)
            .send()
            .await
            .map_err(|e| NotifyError::Transport(e.without_url().to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(NotifyError::Rejected(format!("{status}: {}", excerpt(&body))));
        }
        let json: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| NotifyError::Transport(e.without_url().to_string()))?;
        Ok(json["result"]["message_id"].as_i64().unwrap_or(0))
    }

    pub async fn get_updates(&self, offset: i64) -> Result<TgUpdatesResponse> {
        let url = format!(
            "{}?offset={}&timeout=5&allowed_updates=[\"message\"]",
            self.method_url("getUpdates"),
            offset
        );
        let resp = self.http.get(&url).send().await.map_err(|e| e.without_url())?;
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            anyhow::bail!("getUpdates HTTP {}: {}", status, body);
        }
        let parsed: TgUpdatesResponse = serde_json::from_str(&body)
            .with_context(|| format!("failed to parse getUpdates: {}", excerpt(&body)))?;
        Ok(parsed)
    }

    pub async fn get_me(&self) -> Result<i64> {
        let resp: serde_json::Value = self
            .http
            .get(self.method_url("getMe"))
            .send()
            .await
            .map_err(|e| e.without_url())?
            .json()
            .await
            .map_err(|e| e.without_url())?;
        resp["result"]["id"].as_i64().context("getMe: no bot id in response")
    }
}

// ====================================================================
// Notifier + subscription
// ====================================================================

#[derive(Clone)]
pub struct TelegramNotifier {
    client: TelegramClient,
}

impl TelegramNotifier {
    pub fn new(client: TelegramClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, to: Recipient, text: &str) -> Result<(), NotifyError> {
        self.client.send_message(to.chat_id(), text).await.map(|_| ())
    }
}

/// Long-polls getUpdates and publishes the chat of every `/start` as the
/// current recipient. Runs until `stop` fires.
pub async fn run_subscription_listener(
    client: TelegramClient,
    recipient: watch::Sender<Option<Recipient>>,
    stop: CancellationToken,
) {
    let mut offset: i64 = 0;
    info!("telegram listener up, waiting for /start");

    loop {
        let polled = tokio::select! {
            _ = stop.cancelled() => break,
            polled = client.get_updates(offset) => polled,
        };

        match polled {
            Ok(updates) => {
                for update in &updates.result {
                    offset = update.update_id + 1;
                    let Some(chat_id) = start_command_chat(update) else {
                        continue;
                    };
                    info!(chat_id, "subscriber registered via /start");
                    recipient.send_replace(Some(Recipient(chat_id)));
                    if let Err(e) = client.send_message(chat_id, GREETING).await {
                        warn!(chat_id, "greeting not delivered: {e}");
                    }
                }
            }
            Err(e) => {
                warn!("getUpdates error: {e:#}");
                tokio::select! {
                    _ = stop.cancelled() => break,
                    _ = tokio::time::sleep(Duration::from_secs(2)) => {}
                }
            }
        }
    }
    info!("telegram listener stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn updates(json: &str) -> TgUpdatesResponse {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn start_commands_are_recognised() {
        let resp = updates(
            r#"{"ok":true,"result":[
                {"update_id":10,"message":{"message_id":1,"chat":{"id":555},"text":"/start"}},
                {"update_id":11,"message":{"message_id":2,"chat":{"id":556},"text":"/start@volley_bot hi"}},
                {"update_id":12,"message":{"message_id":3,"chat":{"id":557},"text":"hello /start"}},
                {"update_id":13,"message":{"message_id":4,"chat":{"id":558}}},
                {"update_id":14}
            ]}"#,
        );
        let chats: Vec<Option<i64>> = resp.result.iter().map(start_command_chat).collect();
        assert_eq!(chats, [Some(555), Some(556), None, None, None]);
    }

    #[test]
    fn empty_update_batch_parses() {
        let resp = updates(r#"{"ok":true,"result":[]}"#);
        assert!(resp.ok);
        assert!(resp.result.is_empty());
    }

    async fn canned_server(status: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                let mut buf = [0u8; 4096];
                let _ = stream.read(&mut buf).await;
                let resp = format!(
                    "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = stream.write_all(resp.as_bytes()).await;
            }
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn send_returns_message_id() {
        let base = canned_server("200 OK", r#"{"ok":true,"result":{"message_id":321}}"#).await;
        let client = TelegramClient::with_base("tok", base).unwrap();
        assert_eq!(client.send_message(1, "hi").await.unwrap(), 321);
    }

    #[tokio::test]
    async fn rejected_message_maps_to_notify_error() {
        let base = canned_server("403 Forbidden", r#"{"ok":false,"description":"bot was blocked by the user"}"#).await;
        let notifier = TelegramNotifier::new(TelegramClient::with_base("tok", base).unwrap());

        let err = notifier.send(Recipient(9), "signal").await.unwrap_err();
        match err {
            NotifyError::Rejected(msg) => assert!(msg.contains("blocked")),
            other => panic!("unexpected error: {other}"),
        }
    }
}
