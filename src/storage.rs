//! Sled-based storage for user state, usage metering, and payments.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json;
use std::path::Path;
use thiserror::Error;

/// Telegram user id.
pub type UserId = i64;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("database error: {0}")]
    DbError(#[from] sled::Error),
    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
    #[error("no payment intent on file for user {0}")]
    NoPayment(UserId),
}

/// Durable per-user state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    /// When the premium entitlement lapses; None for free-tier users
    pub premium_until: Option<DateTime<Utc>>,
}

/// One payment intent, overwritten in place as its status moves
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRecord {
    /// Provider-side id of the payment link
    pub link_id: String,
    /// Last provider status we saw for this link
    pub status: String,
    /// Price at creation time, in USD
    pub amount: f64,
    /// When the intent was created
    pub created_at: DateTime<Utc>,
    /// Whether this payment already produced a premium grant. Guards against
    /// granting twice when the user re-checks a finished payment.
    #[serde(default)]
    pub grant_applied: bool,
}

/// Sled-backed state for users, metering, and payments.
///
/// Three trees, all keyed by the Telegram user id:
/// - `users`: JSON records holding the premium expiry
/// - `usage`: big-endian `u64` counters keyed by `{user}:{YYYY-MM-DD}`
/// - `payments`: JSON payment intents keyed by `{user}:{seq}` in creation order
#[derive(Clone)]
pub struct Store {
    db: sled::Db,
    users: sled::Tree,
    usage: sled::Tree,
    payments: sled::Tree,
}

impl Store {
    /// Open or create storage at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let db = sled::open(path)?;
        let users = db.open_tree("users")?;
        let usage = db.open_tree("usage")?;
        let payments = db.open_tree("payments")?;
        Ok(Self {
            db,
            users,
            usage,
            payments,
        })
    }

    /// Record that a user exists. First contact writes a default record;
    /// existing records are left untouched.
    pub fn ensure_user(&self, user: UserId) -> Result<(), StorageError> {
        let key = user_key(user);
        let fresh = serde_json::to_vec(&UserRecord::default())?;
        if self
            .users
            .compare_and_swap(key.as_bytes(), None::<&[u8]>, Some(fresh))?
            .is_ok()
        {
            self.users.flush()?;
        }
        Ok(())
    }

    fn read_user(&self, user: UserId) -> Result<UserRecord, StorageError> {
        match self.users.get(user_key(user).as_bytes())? {
            Some(data) => Ok(serde_json::from_slice(&data)?),
            None => Ok(UserRecord::default()),
        }
    }

    /// When this user's premium lapses, if they ever had any
    pub fn premium_until(&self, user: UserId) -> Result<Option<DateTime<Utc>>, StorageError> {
        Ok(self.read_user(user)?.premium_until)
    }

    /// Whether the user holds an unexpired premium entitlement. The boundary
    /// instant itself is already expired.
    pub fn is_premium(&self, user: UserId, now: DateTime<Utc>) -> Result<bool, StorageError> {
        Ok(self
            .read_user(user)?
            .premium_until
            .is_some_and(|until| until > now))
    }

    /// Set the premium expiry for a user
    pub fn set_premium_until(
        &self,
        user: UserId,
        until: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let mut record = self.read_user(user)?;
        record.premium_until = Some(until);
        self.users
            .insert(user_key(user).as_bytes(), serde_json::to_vec(&record)?)?;
        self.users.flush()?;
        Ok(())
    }

    /// How many summaries the user has been charged for on the UTC day of
    /// `now`
    pub fn usage_today(&self, user: UserId, now: DateTime<Utc>) -> Result<u64, StorageError> {
        match self.usage.get(usage_key(user, now).as_bytes())? {
            Some(data) => Ok(read_u64(&data)),
            None => Ok(0),
        }
    }

    /// Charge one use against the UTC day of `now`, returning the new count
    pub fn increment_usage(&self, user: UserId, now: DateTime<Utc>) -> Result<u64, StorageError> {
        let new = self.usage.update_and_fetch(
            usage_key(user, now).as_bytes(),
            |old: Option<&[u8]>| {
                let current = old.map(read_u64).unwrap_or(0);
                Some((current + 1).to_be_bytes().to_vec())
            },
        )?;
        self.usage.flush()?;
        Ok(new.as_deref().map(read_u64).unwrap_or(0))
    }

    /// Append a new payment intent for a user. Keys embed a monotonic
    /// database sequence so lexicographic order is creation order.
    pub fn append_payment(&self, user: UserId, record: &PaymentRecord) -> Result<(), StorageError> {
        let seq = self.db.generate_id()?;
        let key = payment_key(user, seq);
        self.payments
            .insert(key.as_bytes(), serde_json::to_vec(record)?)?;
        self.payments.flush()?;
        Ok(())
    }

    /// The most recently created payment intent for a user
    pub fn latest_payment(&self, user: UserId) -> Result<Option<PaymentRecord>, StorageError> {
        match self
            .payments
            .scan_prefix(payment_prefix(user).as_bytes())
            .last()
        {
            Some(entry) => {
                let (_key, value) = entry?;
                Ok(Some(serde_json::from_slice(&value)?))
            }
            None => Ok(None),
        }
    }

    /// Overwrite the most recently created payment intent for a user
    pub fn update_latest_payment(
        &self,
        user: UserId,
        record: &PaymentRecord,
    ) -> Result<(), StorageError> {
        let Some(entry) = self
            .payments
            .scan_prefix(payment_prefix(user).as_bytes())
            .last()
        else {
            return Err(StorageError::NoPayment(user));
        };
        let (key, _value) = entry?;
        self.payments.insert(key, serde_json::to_vec(record)?)?;
        self.payments.flush()?;
        Ok(())
    }
}

fn user_key(user: UserId) -> String {
    user.to_string()
}

fn usage_key(user: UserId, now: DateTime<Utc>) -> String {
    format!("{user}:{}", now.format("%Y-%m-%d"))
}

fn payment_prefix(user: UserId) -> String {
    format!("{user}:")
}

/// Zero-padded so lexicographic key order matches numeric sequence order
fn payment_key(user: UserId, seq: u64) -> String {
    format!("{user}:{seq:020}")
}

fn read_u64(bytes: &[u8]) -> u64 {
    bytes.try_into().map(u64::from_be_bytes).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn open_store() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        (dir, store)
    }

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, day, hour, 0, 0).unwrap()
    }

    #[test]
    fn fresh_users_have_no_premium() {
        let (_dir, store) = open_store();
        store.ensure_user(1).unwrap();
        assert_eq!(store.premium_until(1).unwrap(), None);
        assert!(!store.is_premium(1, at(1, 12)).unwrap());
        assert_eq!(store.usage_today(1, at(1, 12)).unwrap(), 0);
    }

    #[test]
    fn ensure_user_never_overwrites_existing_state() {
        let (_dir, store) = open_store();
        store.ensure_user(1).unwrap();
        store.set_premium_until(1, at(20, 0)).unwrap();
        store.ensure_user(1).unwrap();
        assert_eq!(store.premium_until(1).unwrap(), Some(at(20, 0)));
    }

    #[test]
    fn premium_expiry_boundary_is_exclusive() {
        let (_dir, store) = open_store();
        store.set_premium_until(7, at(10, 0)).unwrap();
        assert!(store.is_premium(7, at(9, 23)).unwrap());
        assert!(!store.is_premium(7, at(10, 0)).unwrap());
        assert!(!store.is_premium(7, at(10, 1)).unwrap());
    }

    #[test]
    fn usage_counts_per_user_and_per_day() {
        let (_dir, store) = open_store();
        assert_eq!(store.increment_usage(1, at(1, 9)).unwrap(), 1);
        assert_eq!(store.increment_usage(1, at(1, 10)).unwrap(), 2);
        assert_eq!(store.usage_today(1, at(1, 23)).unwrap(), 2);

        // Next UTC day starts a fresh counter; other users are untouched.
        assert_eq!(store.usage_today(1, at(2, 0)).unwrap(), 0);
        assert_eq!(store.usage_today(2, at(1, 12)).unwrap(), 0);
    }

    #[test]
    fn payments_keep_creation_order() {
        let (_dir, store) = open_store();
        let first = PaymentRecord {
            link_id: "link-1".to_string(),
            status: "created".to_string(),
            amount: 5.0,
            created_at: at(1, 9),
            grant_applied: false,
        };
        let second = PaymentRecord {
            link_id: "link-2".to_string(),
            status: "created".to_string(),
            amount: 5.0,
            created_at: at(1, 10),
            grant_applied: false,
        };
        store.append_payment(1, &first).unwrap();
        store.append_payment(1, &second).unwrap();

        let latest = store.latest_payment(1).unwrap().unwrap();
        assert_eq!(latest.link_id, "link-2");

        let mut updated = latest.clone();
        updated.status = "paid".to_string();
        updated.grant_applied = true;
        store.update_latest_payment(1, &updated).unwrap();

        let reread = store.latest_payment(1).unwrap().unwrap();
        assert_eq!(reread.status, "paid");
        assert!(reread.grant_applied);
        // The older intent is not what we read back.
        assert_eq!(reread.link_id, "link-2");
    }

    #[test]
    fn updating_without_an_intent_fails() {
        let (_dir, store) = open_store();
        let record = PaymentRecord {
            link_id: "link-1".to_string(),
            status: "paid".to_string(),
            amount: 5.0,
            created_at: at(1, 9),
            grant_applied: false,
        };
        assert!(matches!(
            store.update_latest_payment(42, &record),
            Err(StorageError::NoPayment(42))
        ));
        assert_eq!(store.latest_payment(42).unwrap(), None);
    }

    #[test]
    fn state_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = Store::open(dir.path()).unwrap();
            store.set_premium_until(1, at(20, 0)).unwrap();
            store.increment_usage(1, at(1, 9)).unwrap();
        }
        let store = Store::open(dir.path()).unwrap();
        assert_eq!(store.premium_until(1).unwrap(), Some(at(20, 0)));
        assert_eq!(store.usage_today(1, at(1, 18)).unwrap(), 1);
    }
}
