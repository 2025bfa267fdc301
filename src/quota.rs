//! Free-tier metering.
//!
//! Premium users bypass the daily counter entirely: their traffic is neither
//! limited nor recorded. Everyone else gets `free_per_day` summaries per UTC
//! day. Callers pass the same `now` to the check and to the charge, so a
//! request that straddles midnight lands wholly on one day.

use chrono::{DateTime, Utc};

use crate::storage::{StorageError, Store, UserId};

/// Whether this user may run a summary right now.
pub fn can_use(
    store: &Store,
    user: UserId,
    free_per_day: u64,
    now: DateTime<Utc>,
) -> Result<bool, StorageError> {
    if store.is_premium(user, now)? {
        return Ok(true);
    }
    Ok(store.usage_today(user, now)? < free_per_day)
}

/// Charge one use against today's counter. No-op for premium users.
pub fn record_usage(store: &Store, user: UserId, now: DateTime<Utc>) -> Result<(), StorageError> {
    if store.is_premium(user, now)? {
        return Ok(());
    }
    store.increment_usage(user, now)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const LIMIT: u64 = 5;

    fn open_store() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        (dir, store)
    }

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, day, hour, 0, 0).unwrap()
    }

    #[test]
    fn fresh_users_start_with_the_full_allowance() {
        let (_dir, store) = open_store();
        assert!(can_use(&store, 1, LIMIT, at(1, 9)).unwrap());
        assert_eq!(store.usage_today(1, at(1, 9)).unwrap(), 0);
    }

    #[test]
    fn the_limit_bites_after_the_last_free_use() {
        let (_dir, store) = open_store();
        for _ in 0..LIMIT - 1 {
            record_usage(&store, 1, at(1, 9)).unwrap();
        }
        assert!(can_use(&store, 1, LIMIT, at(1, 10)).unwrap());

        record_usage(&store, 1, at(1, 10)).unwrap();
        assert!(!can_use(&store, 1, LIMIT, at(1, 11)).unwrap());
    }

    #[test]
    fn the_allowance_resets_at_utc_midnight() {
        let (_dir, store) = open_store();
        for _ in 0..LIMIT {
            record_usage(&store, 1, at(1, 23)).unwrap();
        }
        assert!(!can_use(&store, 1, LIMIT, at(1, 23)).unwrap());
        assert!(can_use(&store, 1, LIMIT, at(2, 0)).unwrap());
    }

    #[test]
    fn premium_users_bypass_an_exhausted_counter() {
        let (_dir, store) = open_store();
        for _ in 0..LIMIT {
            record_usage(&store, 1, at(1, 9)).unwrap();
        }
        assert!(!can_use(&store, 1, LIMIT, at(1, 10)).unwrap());

        store.set_premium_until(1, at(30, 0)).unwrap();
        assert!(can_use(&store, 1, LIMIT, at(1, 10)).unwrap());
    }

    #[test]
    fn premium_usage_is_not_recorded() {
        let (_dir, store) = open_store();
        store.set_premium_until(1, at(30, 0)).unwrap();
        record_usage(&store, 1, at(1, 9)).unwrap();
        record_usage(&store, 1, at(1, 10)).unwrap();
        assert_eq!(store.usage_today(1, at(1, 11)).unwrap(), 0);
    }

    #[test]
    fn premium_expiring_this_instant_is_already_metered() {
        let (_dir, store) = open_store();
        let now = at(15, 12);
        store.set_premium_until(1, now).unwrap();
        for _ in 0..LIMIT {
            record_usage(&store, 1, now).unwrap();
        }
        assert!(!can_use(&store, 1, LIMIT, now).unwrap());
        assert_eq!(store.usage_today(1, now).unwrap(), LIMIT);
    }
}
