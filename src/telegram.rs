//! Minimal Telegram Bot API client.
//!
//! Long-polling transport over plain HTTP, covering only the methods the bot
//! needs: `getMe`, `getUpdates`, and `sendMessage`. Messages are the only
//! update kind we subscribe to.

use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

const API_BASE: &str = "https://api.telegram.org";

/// How long the server may hold a getUpdates call open, in seconds
const POLL_TIMEOUT_SECS: u64 = 25;

/// Hard Telegram limit on message length, in characters
pub const MAX_MESSAGE_CHARS: usize = 4096;

#[derive(Error, Debug)]
pub enum TelegramError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Telegram API error: {0}")]
    Api(String),
}

/// Envelope every Bot API method responds with
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub from: Option<User>,
    pub chat: Chat,
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

/// Bot API client bound to one bot token
pub struct Telegram {
    client: Client,
    base_url: String,
}

impl Telegram {
    pub fn new(token: &str) -> Result<Self, TelegramError> {
        // The request timeout must sit above the long-poll window.
        let client = Client::builder()
            .timeout(Duration::from_secs(POLL_TIMEOUT_SECS + 10))
            .build()?;
        Ok(Self {
            client,
            base_url: format!("{API_BASE}/bot{token}"),
        })
    }

    /// Identify the bot account behind the token
    pub async fn get_me(&self) -> Result<User, TelegramError> {
        let response: ApiResponse<User> = self
            .client
            .get(format!("{}/getMe", self.base_url))
            .send()
            .await?
            .json()
            .await?;
        unwrap_api(response)
    }

    /// Long-poll for updates at or after `offset`
    pub async fn get_updates(&self, offset: i64) -> Result<Vec<Update>, TelegramError> {
        let response: ApiResponse<Vec<Update>> = self
            .client
            .post(format!("{}/getUpdates", self.base_url))
            .json(&serde_json::json!({
                "offset": offset,
                "timeout": POLL_TIMEOUT_SECS,
                "allowed_updates": ["message"],
            }))
            .send()
            .await?
            .json()
            .await?;
        unwrap_api(response)
    }

    /// Send a plain-text message to a chat
    pub async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), TelegramError> {
        let response: ApiResponse<serde_json::Value> = self
            .client
            .post(format!("{}/sendMessage", self.base_url))
            .json(&serde_json::json!({
                "chat_id": chat_id,
                "text": text,
            }))
            .send()
            .await?
            .json()
            .await?;
        unwrap_api(response).map(|_| ())
    }
}

fn unwrap_api<T>(response: ApiResponse<T>) -> Result<T, TelegramError> {
    if !response.ok {
        return Err(TelegramError::Api(
            response
                .description
                .unwrap_or_else(|| "no error description".to_string()),
        ));
    }
    response
        .result
        .ok_or_else(|| TelegramError::Api("ok response without a result".to_string()))
}

/// Truncate to at most `max_chars` characters, never splitting a code point.
pub fn clip(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((index, _)) => text[..index].to_string(),
        None => text.to_string(),
    }
}
