// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 DID Auth Server Contributors

//! Per-agent access-token cache.
//!
//! Each hosted agent keeps two maps keyed by the remote peer's DID: tokens
//! this agent issued to remote requesters, and tokens remote responders
//! issued to it. The issued map is the server's fast path; a presented
//! token that matches a live cached record skips JWT verification
//! entirely.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};

use super::error::AuthError;

/// Which side of a handshake a cached token came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Minted locally for a remote requester.
    IssuedToRemote,
    /// Received from a remote responder after authenticating to it.
    ReceivedFromRemote,
}

/// One cached token with its lifecycle state.
#[derive(Debug, Clone)]
pub struct TokenRecord {
    pub token: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub is_revoked: bool,
}

impl TokenRecord {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Token store for a single hosted agent.
#[derive(Debug, Default)]
pub struct TokenCache {
    issued: Mutex<HashMap<String, TokenRecord>>,
    received: Mutex<HashMap<String, TokenRecord>>,
}

impl TokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn map(&self, direction: Direction) -> &Mutex<HashMap<String, TokenRecord>> {
        match direction {
            Direction::IssuedToRemote => &self.issued,
            Direction::ReceivedFromRemote => &self.received,
        }
    }

    /// Store (or replace) the token for a peer. A replaced record loses any
    /// revoked flag; re-issuing is the recovery path after revocation.
    pub fn store(
        &self,
        direction: Direction,
        peer_did: &str,
        token: &str,
        expires_at: DateTime<Utc>,
    ) {
        let record = TokenRecord {
            token: token.to_string(),
            created_at: Utc::now(),
            expires_at,
            is_revoked: false,
        };
        let mut map = self.map(direction).lock().expect("token cache poisoned");
        map.insert(peer_did.to_string(), record);
    }

    pub fn lookup(&self, direction: Direction, peer_did: &str) -> Option<TokenRecord> {
        let map = self.map(direction).lock().expect("token cache poisoned");
        map.get(peer_did).cloned()
    }

    /// Mark a peer's token revoked. The record is kept so later
    /// presentations fail as revoked rather than falling through to
    /// signature verification.
    ///
    /// Returns `false` when no record exists for the peer.
    pub fn revoke(&self, direction: Direction, peer_did: &str) -> bool {
        let mut map = self.map(direction).lock().expect("token cache poisoned");
        match map.get_mut(peer_did) {
            Some(record) => {
                record.is_revoked = true;
                true
            }
            None => false,
        }
    }

    pub fn remove(&self, direction: Direction, peer_did: &str) -> bool {
        let mut map = self.map(direction).lock().expect("token cache poisoned");
        map.remove(peer_did).is_some()
    }

    /// Fast-path check of a presented token against the issued-token map.
    ///
    /// `None` means no record exists and the caller must fall back to
    /// cryptographic verification. `Some(Ok(()))` accepts the token without
    /// touching the JWT; `Some(Err(_))` rejects it with the reason found
    /// first: revoked, then expired, then literal mismatch.
    pub fn check_presented(&self, peer_did: &str, presented: &str) -> Option<Result<(), AuthError>> {
        let map = self.issued.lock().expect("token cache poisoned");
        let record = map.get(peer_did)?;

        if record.is_revoked {
            return Some(Err(AuthError::TokenRevoked));
        }
        if record.is_expired(Utc::now()) {
            return Some(Err(AuthError::TokenExpired));
        }
        if record.token != presented {
            return Some(Err(AuthError::TokenMismatch));
        }
        Some(Ok(()))
    }
}
