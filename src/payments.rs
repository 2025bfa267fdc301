//! Payment links and premium grants.
//!
//! The bot never takes money itself: it asks the payment provider for a
//! hosted checkout link, remembers the intent, and reconciles on demand when
//! the user asks. Reconciliation is idempotent; a payment produces exactly
//! one grant no matter how often its status is re-checked.

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use thiserror::Error;

use crate::config::PaymentConfig;
use crate::storage::{PaymentRecord, StorageError, Store, UserId};

/// Provider statuses the bot acts on. Anything else is surfaced verbatim.
pub const STATUS_CREATED: &str = "created";
pub const STATUS_PARTIALLY_PAID: &str = "partially_paid";
pub const STATUS_PAID: &str = "paid";

const LINK_DESCRIPTION: &str = "briefbot premium";

const PROVIDER_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(15);

#[derive(Error, Debug)]
pub enum PaymentError {
    #[error("provider request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("provider returned HTTP {0}")]
    BadStatus(reqwest::StatusCode),
}

/// A hosted checkout link created by the provider
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentLink {
    pub id: String,
    pub url: String,
}

#[derive(Debug, Deserialize)]
struct LinkState {
    status: String,
}

/// The payment-provider surface the bot depends on, kept narrow so tests can
/// substitute a canned provider.
#[allow(async_fn_in_trait)]
pub trait PaymentProvider {
    async fn create_link(
        &self,
        amount: f64,
        reference: &str,
        description: &str,
    ) -> Result<PaymentLink, PaymentError>;

    async fn link_status(&self, link_id: &str) -> Result<String, PaymentError>;
}

/// HTTP client for the hosted-checkout provider
pub struct PaymentApi {
    client: reqwest::Client,
    base_url: String,
    shop_id: String,
    api_key: String,
}

impl PaymentApi {
    /// Build a client from config, or None when any provider credential is
    /// missing. A bot without payments still summarizes; it just can't sell
    /// premium.
    pub fn from_config(config: &PaymentConfig) -> Option<Self> {
        let base_url = config
            .api_base
            .as_deref()?
            .trim_end_matches('/')
            .to_string();
        let shop_id = config.shop_id.clone()?;
        let api_key = config.api_key.clone()?;
        let client = reqwest::Client::builder()
            .timeout(PROVIDER_TIMEOUT)
            .build()
            .ok()?;
        Some(Self {
            client,
            base_url,
            shop_id,
            api_key,
        })
    }
}

impl PaymentProvider for PaymentApi {
    async fn create_link(
        &self,
        amount: f64,
        reference: &str,
        description: &str,
    ) -> Result<PaymentLink, PaymentError> {
        let response = self
            .client
            .post(format!("{}/links", self.base_url))
            .header("X-Shop-Id", &self.shop_id)
            .header("X-Api-Key", &self.api_key)
            .json(&serde_json::json!({
                "amount": amount,
                "currency": "USD",
                "reference": reference,
                "description": description,
            }))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(PaymentError::BadStatus(response.status()));
        }
        Ok(response.json().await?)
    }

    async fn link_status(&self, link_id: &str) -> Result<String, PaymentError> {
        let response = self
            .client
            .get(format!("{}/links/{}", self.base_url, link_id))
            .header("X-Shop-Id", &self.shop_id)
            .header("X-Api-Key", &self.api_key)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(PaymentError::BadStatus(response.status()));
        }
        let state: LinkState = response.json().await?;
        Ok(state.status)
    }
}

/// Result of a reconciliation pass over the user's latest payment
#[derive(Debug, Clone, PartialEq)]
pub enum VerifyOutcome {
    /// No payment link was ever created for this user
    NoIntent,
    /// Provider unreachable or erroring; stored state was left untouched
    Unreachable,
    /// Payment completed and premium was granted just now
    Granted { premium_until: DateTime<Utc> },
    /// Payment completed earlier and its grant was already applied
    AlreadyPaid { premium_until: Option<DateTime<Utc>> },
    /// Payment still in progress (created or partially paid)
    NotFinished(String),
    /// Provider reported a status this bot does not act on
    Unrecognized(String),
}

/// Ask the provider for a checkout link and persist the intent. Returns the
/// URL to hand to the user, or None when the provider or the store balked
/// (both already logged).
pub async fn create_intent(
    store: &Store,
    provider: &impl PaymentProvider,
    user: UserId,
    amount: f64,
    now: DateTime<Utc>,
) -> Option<String> {
    let reference = format!("tg-{user}-{}", now.timestamp());
    let link = match provider
        .create_link(amount, &reference, LINK_DESCRIPTION)
        .await
    {
        Ok(link) => link,
        Err(err) => {
            log::warn!("payment link creation failed for user {user}: {err}");
            return None;
        }
    };

    let record = PaymentRecord {
        link_id: link.id,
        status: STATUS_CREATED.to_string(),
        amount,
        created_at: now,
        grant_applied: false,
    };
    if let Err(err) = store.append_payment(user, &record) {
        log::warn!("failed to persist payment intent for user {user}: {err}");
        return None;
    }
    Some(link.url)
}

/// Re-check the user's latest payment against the provider and apply any
/// premium grant it has earned.
///
/// A paid link grants `grant_days` exactly once, marked by the record's
/// `grant_applied` flag. The stored record is only rewritten when something
/// actually changed, and never when the provider couldn't be reached.
pub async fn verify(
    store: &Store,
    provider: &impl PaymentProvider,
    user: UserId,
    grant_days: i64,
    now: DateTime<Utc>,
) -> Result<VerifyOutcome, StorageError> {
    let Some(mut record) = store.latest_payment(user)? else {
        return Ok(VerifyOutcome::NoIntent);
    };

    let fetched = match provider.link_status(&record.link_id).await {
        Ok(status) => status,
        Err(err) => {
            log::warn!("payment status check failed for user {user}: {err}");
            return Ok(VerifyOutcome::Unreachable);
        }
    };

    let mut dirty = fetched != record.status;
    record.status = fetched;

    let outcome = match record.status.as_str() {
        STATUS_PAID => {
            if record.grant_applied {
                VerifyOutcome::AlreadyPaid {
                    premium_until: store.premium_until(user)?,
                }
            } else {
                // Stack onto a still-active entitlement; start from now otherwise.
                let base = store
                    .premium_until(user)?
                    .filter(|until| *until > now)
                    .unwrap_or(now);
                let premium_until = base + Duration::days(grant_days);
                store.set_premium_until(user, premium_until)?;
                record.grant_applied = true;
                dirty = true;
                log::info!("granted {grant_days} days of premium to user {user}");
                VerifyOutcome::Granted { premium_until }
            }
        }
        STATUS_CREATED | STATUS_PARTIALLY_PAID => {
            VerifyOutcome::NotFinished(record.status.clone())
        }
        other => VerifyOutcome::Unrecognized(other.to_string()),
    };

    if dirty {
        store.update_latest_payment(user, &record)?;
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::Mutex;

    const GRANT_DAYS: i64 = 30;
    const PRICE: f64 = 5.0;

    struct StubProvider {
        status: Mutex<String>,
        fail: bool,
    }

    impl StubProvider {
        fn with_status(status: &str) -> Self {
            Self {
                status: Mutex::new(status.to_string()),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                status: Mutex::new(String::new()),
                fail: true,
            }
        }

        fn set_status(&self, status: &str) {
            *self.status.lock().unwrap() = status.to_string();
        }
    }

    impl PaymentProvider for StubProvider {
        async fn create_link(
            &self,
            _amount: f64,
            _reference: &str,
            _description: &str,
        ) -> Result<PaymentLink, PaymentError> {
            if self.fail {
                return Err(PaymentError::BadStatus(reqwest::StatusCode::BAD_GATEWAY));
            }
            Ok(PaymentLink {
                id: "link-1".to_string(),
                url: "https://pay.example/link-1".to_string(),
            })
        }

        async fn link_status(&self, _link_id: &str) -> Result<String, PaymentError> {
            if self.fail {
                return Err(PaymentError::BadStatus(reqwest::StatusCode::BAD_GATEWAY));
            }
            Ok(self.status.lock().unwrap().clone())
        }
    }

    fn open_store() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        (dir, store)
    }

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn create_intent_persists_a_created_record() {
        let (_dir, store) = open_store();
        let provider = StubProvider::with_status(STATUS_CREATED);

        let url = create_intent(&store, &provider, 1, PRICE, noon()).await;
        assert_eq!(url.as_deref(), Some("https://pay.example/link-1"));

        let record = store.latest_payment(1).unwrap().unwrap();
        assert_eq!(record.link_id, "link-1");
        assert_eq!(record.status, STATUS_CREATED);
        assert_eq!(record.amount, PRICE);
        assert!(!record.grant_applied);
    }

    #[tokio::test]
    async fn create_intent_failure_writes_nothing() {
        let (_dir, store) = open_store();
        let provider = StubProvider::failing();

        assert_eq!(create_intent(&store, &provider, 1, PRICE, noon()).await, None);
        assert_eq!(store.latest_payment(1).unwrap(), None);
    }

    #[tokio::test]
    async fn verify_without_an_intent() {
        let (_dir, store) = open_store();
        let provider = StubProvider::with_status(STATUS_PAID);

        let outcome = verify(&store, &provider, 1, GRANT_DAYS, noon()).await.unwrap();
        assert_eq!(outcome, VerifyOutcome::NoIntent);
    }

    #[tokio::test]
    async fn provider_outage_leaves_the_record_alone() {
        let (_dir, store) = open_store();
        let provider = StubProvider::with_status(STATUS_CREATED);
        create_intent(&store, &provider, 1, PRICE, noon()).await.unwrap();

        let outage = StubProvider::failing();
        let outcome = verify(&store, &outage, 1, GRANT_DAYS, noon()).await.unwrap();
        assert_eq!(outcome, VerifyOutcome::Unreachable);

        let record = store.latest_payment(1).unwrap().unwrap();
        assert_eq!(record.status, STATUS_CREATED);
        assert!(!record.grant_applied);
    }

    #[tokio::test]
    async fn partial_payment_is_reported_and_stored() {
        let (_dir, store) = open_store();
        let provider = StubProvider::with_status(STATUS_CREATED);
        create_intent(&store, &provider, 1, PRICE, noon()).await.unwrap();

        provider.set_status(STATUS_PARTIALLY_PAID);
        let outcome = verify(&store, &provider, 1, GRANT_DAYS, noon()).await.unwrap();
        assert_eq!(
            outcome,
            VerifyOutcome::NotFinished(STATUS_PARTIALLY_PAID.to_string())
        );

        let record = store.latest_payment(1).unwrap().unwrap();
        assert_eq!(record.status, STATUS_PARTIALLY_PAID);
        assert!(!record.grant_applied);
    }

    #[tokio::test]
    async fn unknown_statuses_grant_nothing() {
        let (_dir, store) = open_store();
        let provider = StubProvider::with_status(STATUS_CREATED);
        create_intent(&store, &provider, 1, PRICE, noon()).await.unwrap();

        provider.set_status("expired");
        let outcome = verify(&store, &provider, 1, GRANT_DAYS, noon()).await.unwrap();
        assert_eq!(outcome, VerifyOutcome::Unrecognized("expired".to_string()));
        assert_eq!(store.premium_until(1).unwrap(), None);

        let record = store.latest_payment(1).unwrap().unwrap();
        assert_eq!(record.status, "expired");
    }

    #[tokio::test]
    async fn a_payment_grants_exactly_once() {
        let (_dir, store) = open_store();
        let provider = StubProvider::with_status(STATUS_CREATED);
        let now = noon();
        create_intent(&store, &provider, 1, PRICE, now).await.unwrap();

        // Still unpaid: nothing granted.
        let outcome = verify(&store, &provider, 1, GRANT_DAYS, now).await.unwrap();
        assert_eq!(outcome, VerifyOutcome::NotFinished(STATUS_CREATED.to_string()));
        assert_eq!(store.premium_until(1).unwrap(), None);

        // Paid: one grant of GRANT_DAYS from now.
        provider.set_status(STATUS_PAID);
        let outcome = verify(&store, &provider, 1, GRANT_DAYS, now).await.unwrap();
        let expected = now + Duration::days(GRANT_DAYS);
        assert_eq!(
            outcome,
            VerifyOutcome::Granted {
                premium_until: expected
            }
        );
        assert_eq!(store.premium_until(1).unwrap(), Some(expected));

        let record = store.latest_payment(1).unwrap().unwrap();
        assert_eq!(record.status, STATUS_PAID);
        assert!(record.grant_applied);

        // Re-checking the same payment must not grant again.
        let outcome = verify(&store, &provider, 1, GRANT_DAYS, now).await.unwrap();
        assert_eq!(
            outcome,
            VerifyOutcome::AlreadyPaid {
                premium_until: Some(expected)
            }
        );
        assert_eq!(store.premium_until(1).unwrap(), Some(expected));
    }

    #[tokio::test]
    async fn grants_stack_onto_active_premium() {
        let (_dir, store) = open_store();
        let provider = StubProvider::with_status(STATUS_PAID);
        let now = noon();
        store.set_premium_until(1, now + Duration::days(10)).unwrap();
        create_intent(&store, &provider, 1, PRICE, now).await.unwrap();

        let outcome = verify(&store, &provider, 1, GRANT_DAYS, now).await.unwrap();
        let expected = now + Duration::days(10 + GRANT_DAYS);
        assert_eq!(
            outcome,
            VerifyOutcome::Granted {
                premium_until: expected
            }
        );
    }

    #[tokio::test]
    async fn expired_premium_restarts_from_now() {
        let (_dir, store) = open_store();
        let provider = StubProvider::with_status(STATUS_PAID);
        let now = noon();
        store.set_premium_until(1, now - Duration::days(5)).unwrap();
        create_intent(&store, &provider, 1, PRICE, now).await.unwrap();

        let outcome = verify(&store, &provider, 1, GRANT_DAYS, now).await.unwrap();
        assert_eq!(
            outcome,
            VerifyOutcome::Granted {
                premium_until: now + Duration::days(GRANT_DAYS)
            }
        );
    }
}
