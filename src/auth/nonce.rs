// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 DID Auth Server Contributors

//! Replay-token (nonce) registry.
//!
//! The registry is constructor-injected and lives in `AppState` for the
//! duration of the serving process. Entries are never swept; expiry is
//! checked lazily at validation time, so the map grows with traffic.
//!
//! A nonce passes validation exactly once inside the expiry window:
//! unknown nonces are registered on first sight, registry-generated nonces
//! are issued unconsumed and pass their first check, and any second check
//! of the same value inside the window is rejected as a replay.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use rand::{distributions::Alphanumeric, Rng};

#[derive(Debug, Clone)]
struct NonceEntry {
    issued_at: DateTime<Utc>,
    consumed: bool,
}

/// Tracks short-lived, single-use replay tokens.
pub struct NonceRegistry {
    entries: Mutex<HashMap<String, NonceEntry>>,
    expire_minutes: i64,
}

impl NonceRegistry {
    pub fn new(expire_minutes: i64) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            expire_minutes,
        }
    }

    /// Generate a random alphanumeric nonce and record its issuance.
    pub fn generate(&self, length: usize) -> String {
        let nonce: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(length)
            .map(char::from)
            .collect();

        let mut entries = self.entries.lock().expect("nonce registry poisoned");
        entries.insert(
            nonce.clone(),
            NonceEntry {
                issued_at: Utc::now(),
                consumed: false,
            },
        );
        nonce
    }

    /// Validate and consume a nonce.
    ///
    /// Returns `true` for the first check of a value inside the expiry
    /// window (registering it as consumed), `false` for every check after
    /// that. Expired entries are treated as absent.
    pub fn is_valid(&self, nonce: &str) -> bool {
        let now = Utc::now();
        let window = Duration::minutes(self.expire_minutes);
        let mut entries = self.entries.lock().expect("nonce registry poisoned");

        match entries.get_mut(nonce) {
            None => {
                entries.insert(
                    nonce.to_string(),
                    NonceEntry {
                        issued_at: now,
                        consumed: true,
                    },
                );
                true
            }
            Some(entry) if now - entry.issued_at > window => {
                // Expired-and-forgotten: treat as fresh.
                entry.issued_at = now;
                entry.consumed = true;
                true
            }
            Some(entry) if !entry.consumed => {
                entry.consumed = true;
                true
            }
            Some(_) => false,
        }
    }

    /// Number of tracked nonces (for diagnostics).
    pub fn len(&self) -> usize {
        self.entries.lock().expect("nonce registry poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
