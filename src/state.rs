// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 DID Auth Server Contributors

//! Shared application state.
//!
//! Every collaborating store is constructor-injected so tests can assemble
//! a state from temp-dir agents, a short-window nonce registry, or a
//! substitute signature verifier without touching process globals.

use std::sync::Arc;

use crate::agent::AgentRegistry;
use crate::auth::nonce::NonceRegistry;
use crate::auth::resolver::DidResolver;
use crate::auth::signature::{Ed25519Verifier, SignatureVerifier};
use crate::config::Settings;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub agents: Arc<AgentRegistry>,
    pub nonces: Arc<NonceRegistry>,
    pub resolver: Arc<DidResolver>,
    pub verifier: Arc<dyn SignatureVerifier>,
}

impl AppState {
    /// Assemble a state with the default Ed25519 verifier.
    pub fn new(settings: Settings, agents: AgentRegistry, resolver: DidResolver) -> Self {
        let nonces = NonceRegistry::new(settings.nonce_expire_minutes);
        Self {
            settings: Arc::new(settings),
            agents: Arc::new(agents),
            nonces: Arc::new(nonces),
            resolver: Arc::new(resolver),
            verifier: Arc::new(Ed25519Verifier),
        }
    }

    pub fn with_verifier(mut self, verifier: Arc<dyn SignatureVerifier>) -> Self {
        self.verifier = verifier;
        self
    }
}
