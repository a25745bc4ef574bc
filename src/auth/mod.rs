// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 DID Auth Server Contributors

//! DID-based mutual authentication.
//!
//! The module splits along the handshake's phases:
//!
//! - [`header`]: the `DIDWba` claim scheme and response encodings
//! - [`timestamp`] / [`nonce`]: freshness and replay guards
//! - [`resolver`]: local-then-remote DID document resolution
//! - [`signature`]: claim signing and the verification seam
//! - [`token`] / [`cache`]: access-token lifecycle
//! - [`handshake`]: the server-side pipeline tying the above together
//! - [`client`]: the requester side, token reuse included
//! - [`middleware`]: the auth gate in front of the router

pub mod cache;
pub mod client;
pub mod error;
pub mod handshake;
pub mod header;
pub mod middleware;
pub mod nonce;
pub mod resolver;
pub mod signature;
pub mod timestamp;
pub mod token;

pub use cache::{Direction, TokenCache};
pub use client::AuthClient;
pub use error::AuthError;
pub use handshake::{handle_bearer_claim, handle_did_claim, REVERSE_CLAIM_DOMAIN};
pub use header::{DidAuthHeader, HandshakeResult, ResponseAuth};
pub use middleware::{auth_middleware, AuthenticatedAgent};
pub use nonce::NonceRegistry;
pub use resolver::{DidResolver, IdentityDocument, VerificationMethod};
pub use signature::{ClaimSigner, Ed25519Verifier, SignatureVerifier};
