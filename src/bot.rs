//! The bot loop: long-polls Telegram, dispatches commands, and routes
//! everything else through the summary pipeline.
//!
//! Updates are handled one at a time, in arrival order. A failed poll backs
//! off and retries; one bad message never takes the loop down.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::payments::{self, PaymentApi, VerifyOutcome};
use crate::pipeline::{Pipeline, Upstream};
use crate::prefs::StyleBook;
use crate::storage::{StorageError, Store, UserId};
use crate::summarizer::Style;
use crate::telegram::{Telegram, TelegramError, Update};

/// Wait between failed polls before trying again
const POLL_RETRY_SECS: u64 = 5;

const PAYMENTS_UNAVAILABLE: &str =
    "Payments aren't set up on this bot, so premium can't be purchased right now.";

const GENERIC_FAILURE: &str = "Something went wrong. Please try again.";

pub struct Bot<U> {
    telegram: Telegram,
    store: Store,
    styles: Arc<StyleBook>,
    pipeline: Pipeline<U>,
    payments: Option<PaymentApi>,
    config: Config,
}

impl<U: Upstream> Bot<U> {
    pub fn new(
        telegram: Telegram,
        store: Store,
        styles: Arc<StyleBook>,
        pipeline: Pipeline<U>,
        payments: Option<PaymentApi>,
        config: Config,
    ) -> Self {
        Self {
            telegram,
            store,
            styles,
            pipeline,
            payments,
            config,
        }
    }

    /// Poll forever. Only startup problems (a bad token, no network at boot)
    /// surface as errors; everything after that is logged and retried.
    pub async fn run(&self) -> Result<(), TelegramError> {
        let me = self.telegram.get_me().await?;
        log::info!(
            "bot started as @{}",
            me.username.as_deref().unwrap_or("unknown")
        );
        if self.payments.is_none() {
            log::warn!("payment credentials missing; /buy and /verify are disabled");
        }

        let mut offset = 0i64;
        loop {
            let updates = match self.telegram.get_updates(offset).await {
                Ok(updates) => updates,
                Err(err) => {
                    log::warn!("polling failed: {err}; retrying in {POLL_RETRY_SECS}s");
                    tokio::time::sleep(Duration::from_secs(POLL_RETRY_SECS)).await;
                    continue;
                }
            };

            for update in updates {
                offset = offset.max(update.update_id + 1);
                self.handle_update(update).await;
            }
        }
    }

    async fn handle_update(&self, update: Update) {
        let Some(message) = update.message else {
            return;
        };
        let chat_id = message.chat.id;
        let Some(user) = message.from else {
            return;
        };
        let Some(text) = message.text else {
            return;
        };
        let text = text.trim();
        if text.is_empty() {
            return;
        }

        let reply = self.dispatch(user.id, text).await;
        if let Err(err) = self.telegram.send_message(chat_id, &reply).await {
            log::warn!("failed to reply to chat {chat_id}: {err}");
        }
    }

    async fn dispatch(&self, user: UserId, text: &str) -> String {
        if let Err(err) = self.store.ensure_user(user) {
            log::error!("failed to register user {user}: {err}");
            return GENERIC_FAILURE.to_string();
        }

        let Some(rest) = text.strip_prefix('/') else {
            return self.pipeline.handle(user, text).await;
        };

        let (name, args) = match rest.split_once(char::is_whitespace) {
            Some((name, args)) => (name, args.trim()),
            None => (rest, ""),
        };
        // Commands may arrive as /status@botname in group chats.
        let name = name.split('@').next().unwrap_or(name);

        let result = match name {
            "start" | "help" => Ok(self.help_text()),
            "style" => Ok(self.style_command(user, args)),
            "status" => self.status_command(user),
            "buy" => self.buy_command(user).await,
            "verify" => self.verify_command(user).await,
            _ => Ok("Unknown command. Send /help for the list.".to_string()),
        };

        match result {
            Ok(reply) => reply,
            Err(err) => {
                log::error!("command /{name} failed for user {user}: {err}");
                GENERIC_FAILURE.to_string()
            }
        }
    }

    fn help_text(&self) -> String {
        format!(
            "👋 Send me text, a YouTube link, or an article URL and I'll reply with a summary.\n\n\
             Commands:\n\
             /style <name> — pick a summary style ({})\n\
             /status — your plan and today's usage\n\
             /buy — get {} days of premium\n\
             /verify — check your payment\n\
             /help — this message\n\n\
             Free plan: {} summaries per day. Styles reset to auto when the bot restarts.",
            style_names(),
            self.config.payment.grant_days,
            self.config.quota.free_per_day
        )
    }

    fn style_command(&self, user: UserId, args: &str) -> String {
        if args.is_empty() {
            return format!(
                "Current style: {}. Available: {}.\nSend /style <name> to change it.",
                self.styles.get(user).name(),
                style_names()
            );
        }
        match Style::parse(args) {
            Some(style) => {
                self.styles.set(user, style);
                format!("Style set to {}.", style.name())
            }
            None => format!("Unknown style \"{args}\". Available: {}.", style_names()),
        }
    }

    fn status_command(&self, user: UserId) -> Result<String, StorageError> {
        let now = Utc::now();
        if let Some(until) = self.store.premium_until(user)?.filter(|until| *until > now) {
            return Ok(format!(
                "⭐ Premium is active until {} UTC.",
                until.format("%Y-%m-%d %H:%M")
            ));
        }
        let used = self.store.usage_today(user, now)?;
        Ok(format!(
            "Free plan: {used}/{} summaries used today. Send /buy to go premium.",
            self.config.quota.free_per_day
        ))
    }

    async fn buy_command(&self, user: UserId) -> Result<String, StorageError> {
        let Some(provider) = &self.payments else {
            return Ok(PAYMENTS_UNAVAILABLE.to_string());
        };
        let url = payments::create_intent(
            &self.store,
            provider,
            user,
            self.config.payment.price_usd,
            Utc::now(),
        )
        .await;
        Ok(match url {
            Some(url) => format!(
                "💳 Pay here to unlock {} days of premium:\n{url}\n\nOnce you've paid, send /verify.",
                self.config.payment.grant_days
            ),
            None => {
                "Couldn't create a payment link right now. Please try again in a minute.".to_string()
            }
        })
    }

    async fn verify_command(&self, user: UserId) -> Result<String, StorageError> {
        let Some(provider) = &self.payments else {
            return Ok(PAYMENTS_UNAVAILABLE.to_string());
        };
        let outcome = payments::verify(
            &self.store,
            provider,
            user,
            self.config.payment.grant_days,
            Utc::now(),
        )
        .await?;

        Ok(match outcome {
            VerifyOutcome::NoIntent => "No payment to check. Send /buy first.".to_string(),
            VerifyOutcome::Unreachable => {
                "Couldn't reach the payment provider. Please try /verify again in a minute."
                    .to_string()
            }
            VerifyOutcome::Granted { premium_until } => format!(
                "✅ Payment received! Premium is active until {} UTC. Thank you!",
                premium_until.format("%Y-%m-%d")
            ),
            VerifyOutcome::AlreadyPaid {
                premium_until: Some(until),
            } => format!(
                "This payment was already applied. Premium runs until {} UTC.",
                until.format("%Y-%m-%d")
            ),
            VerifyOutcome::AlreadyPaid {
                premium_until: None,
            } => "This payment was already applied.".to_string(),
            VerifyOutcome::NotFinished(status) if status == payments::STATUS_PARTIALLY_PAID => {
                "Your payment is only partially paid. Finish it and send /verify again.".to_string()
            }
            VerifyOutcome::NotFinished(_) => {
                "The payment hasn't gone through yet. Pay first, then send /verify.".to_string()
            }
            VerifyOutcome::Unrecognized(status) => {
                format!("Payment status: {status}. Try /verify again later.")
            }
        })
    }
}

fn style_names() -> String {
    Style::ALL
        .iter()
        .map(|style| style.name())
        .collect::<Vec<_>>()
        .join(", ")
}
