//! Per-user summary style preferences.
//!
//! Kept in memory only: restarting the bot resets everyone to the automatic
//! style. Durable state (premium, usage, payments) lives in [`crate::storage`].

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use crate::storage::UserId;
use crate::summarizer::Style;

/// In-memory map from user to their chosen summary style.
pub struct StyleBook {
    styles: Mutex<HashMap<UserId, Style>>,
}

impl StyleBook {
    pub fn new() -> Self {
        Self {
            styles: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<UserId, Style>> {
        // A poisoned lock still holds plain data; keep serving it.
        self.styles
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// The user's current style; [`Style::Auto`] until they pick one.
    pub fn get(&self, user: UserId) -> Style {
        self.lock().get(&user).copied().unwrap_or(Style::Auto)
    }

    pub fn set(&self, user: UserId, style: Style) {
        self.lock().insert(user, style);
    }
}

impl Default for StyleBook {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_auto() {
        let book = StyleBook::new();
        assert_eq!(book.get(1), Style::Auto);
    }

    #[test]
    fn remembers_the_last_choice_per_user() {
        let book = StyleBook::new();
        book.set(1, Style::Bullets);
        book.set(1, Style::Short);
        book.set(2, Style::Detailed);

        assert_eq!(book.get(1), Style::Short);
        assert_eq!(book.get(2), Style::Detailed);
        assert_eq!(book.get(3), Style::Auto);
    }
}
