//! # briefbot
//!
//! A Telegram bot that summarises text, YouTube videos, and articles using LLMs.
//!
//! ## Features
//!
//! - **Content routing**: plain text, YouTube links, and article URLs each get
//!   their own fetch path before summarization
//! - **Metered free tier**: a per-day quota backed by sled, bypassed by premium
//! - **Payment links**: premium is bought through a provider-minted payment
//!   link that the bot verifies on demand

pub mod bot;
pub mod config;
pub mod content;
pub mod payments;
pub mod pipeline;
pub mod prefs;
pub mod quota;
pub mod scraper;
pub mod storage;
pub mod summarizer;
pub mod telegram;
pub mod transcript;

pub use config::Config;
pub use storage::{Store, UserId};
