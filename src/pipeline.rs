//! The message pipeline: everything between an incoming message and the
//! reply text.
//!
//! Order matters here. The quota gate runs first, on one clock reading that
//! the eventual charge reuses. Content that turns out to be unavailable and
//! summarizations that fail are both free; the user is only charged once a
//! summary is actually on its way to them.

use chrono::Utc;
use std::sync::Arc;

use crate::config::Config;
use crate::content::{classify, Classified, Fetched};
use crate::prefs::StyleBook;
use crate::quota;
use crate::scraper;
use crate::storage::{StorageError, Store, UserId};
use crate::summarizer::{self, Style, SummarizeError};
use crate::telegram::{clip, MAX_MESSAGE_CHARS};
use crate::transcript;

/// Appended to every delivered summary
const PROMO_SUFFIX: &str = "\n\n🤖 briefbot — /buy lifts the daily limit";

const LIMIT_REPLY: &str =
    "You've used all your free summaries for today. Send /buy to go premium, or come back tomorrow.";

const TRANSCRIPT_REPLY: &str =
    "Couldn't fetch a transcript for that video. Captions may be disabled or in an unsupported language.";

const ARTICLE_REPLY: &str =
    "Couldn't extract readable text from that page. It may be paywalled or scripted.";

const FAILURE_REPLY: &str = "Something went wrong. Please try again.";

/// How much of an upstream error message gets quoted back to the user
const ERROR_DETAIL_CHARS: usize = 300;

/// The bot's slow edges (content fetching and the LLM), kept behind one seam
/// so tests can run the whole flow with canned responses.
#[allow(async_fn_in_trait)]
pub trait Upstream {
    async fn transcript(&self, video_id: &str) -> Fetched;
    async fn article(&self, url: &str) -> Fetched;
    async fn summarize(&self, text: &str, style: Style) -> Result<String, SummarizeError>;
}

/// Production upstream: real fetchers, real model
pub struct LiveUpstream {
    config: Config,
}

impl LiveUpstream {
    pub fn new(config: Config) -> Self {
        Self { config }
    }
}

impl Upstream for LiveUpstream {
    async fn transcript(&self, video_id: &str) -> Fetched {
        transcript::fetch_transcript(video_id).await
    }

    async fn article(&self, url: &str) -> Fetched {
        scraper::fetch_article(url).await
    }

    async fn summarize(&self, text: &str, style: Style) -> Result<String, SummarizeError> {
        summarizer::summarize(text, style, &self.config).await
    }
}

pub struct Pipeline<U> {
    store: Store,
    styles: Arc<StyleBook>,
    free_per_day: u64,
    upstream: U,
}

impl<U: Upstream> Pipeline<U> {
    pub fn new(store: Store, styles: Arc<StyleBook>, free_per_day: u64, upstream: U) -> Self {
        Self {
            store,
            styles,
            free_per_day,
            upstream,
        }
    }

    /// Turn one message into one reply. Never fails outward; storage errors
    /// become a generic apology (and a log line).
    pub async fn handle(&self, user: UserId, text: &str) -> String {
        match self.run(user, text).await {
            Ok(reply) => reply,
            Err(err) => {
                log::error!("pipeline failed for user {user}: {err}");
                FAILURE_REPLY.to_string()
            }
        }
    }

    async fn run(&self, user: UserId, text: &str) -> Result<String, StorageError> {
        self.store.ensure_user(user)?;

        // One clock reading for the whole request, so the quota check and
        // the charge land on the same UTC day.
        let now = Utc::now();

        if !quota::can_use(&self.store, user, self.free_per_day, now)? {
            log::info!("user {user} hit the daily limit");
            return Ok(LIMIT_REPLY.to_string());
        }

        let source = match classify(text) {
            Classified::Plain => text.trim().to_string(),
            Classified::Video(video_id) => match self.upstream.transcript(&video_id).await {
                Fetched::Text(transcript) => transcript,
                Fetched::Unavailable => return Ok(TRANSCRIPT_REPLY.to_string()),
            },
            Classified::Article(url) => match self.upstream.article(&url).await {
                Fetched::Text(article) => article,
                Fetched::Unavailable => return Ok(ARTICLE_REPLY.to_string()),
            },
        };

        let style = self.styles.get(user);
        let summary = match self.upstream.summarize(&source, style).await {
            Ok(summary) => summary,
            Err(err) => {
                log::warn!("summarization failed for user {user}: {err}");
                // Failures don't count against the allowance.
                return Ok(format!(
                    "Summarization failed: {}",
                    clip(&err.to_string(), ERROR_DETAIL_CHARS)
                ));
            }
        };

        quota::record_usage(&self.store, user, now)?;
        log::info!("delivered a {} summary to user {user}", style.name());

        Ok(clip(&format!("{summary}{PROMO_SUFFIX}"), MAX_MESSAGE_CHARS))
    }
}
