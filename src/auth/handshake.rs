// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 DID Auth Server Contributors

//! Server-side handshake pipeline.
//!
//! [`handle_did_claim`] runs the full claim verification sequence: parse,
//! timestamp window, replay guard, DID resolution, signature check, token
//! issuance, and (for two-way handshakes) the responder's reverse claim.
//! Each stage returns early with its own [`AuthError`] variant, so the
//! gate can log and report exactly which check failed.
//!
//! [`handle_bearer_claim`] is the fast path for returning callers: a
//! presented token is matched against the issuing agent's cache first and
//! only cryptographically verified when no cached record exists.

use crate::agent::LocalAgent;
use crate::state::AppState;

use super::error::AuthError;
use super::header::{DidAuthHeader, HandshakeResult};
use super::timestamp::{claim_timestamp_now, verify_timestamp};
use super::token::{create_access_token, verify_access_token};

/// Virtual domain that reverse claims are scoped to. The requester checks
/// the responder's claim against this fixed value instead of a real host,
/// since the reverse claim travels inside an existing response rather than
/// to a served endpoint.
pub const REVERSE_CLAIM_DOMAIN: &str = "virtual.wba.callback";

/// Nonce length used for responder-minted reverse claims.
const REVERSE_NONCE_LENGTH: usize = 16;

/// Identity attached to a request once a bearer token checks out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedBearer {
    pub req_did: String,
    pub resp_did: String,
}

/// Verify a `DIDWba` claim and mint an access token for the requester.
pub async fn handle_did_claim(
    state: &AppState,
    authorization: &str,
    service_domain: &str,
) -> Result<HandshakeResult, AuthError> {
    let claim = DidAuthHeader::parse(authorization)?;

    if !verify_timestamp(&claim.timestamp, state.settings.nonce_expire_minutes) {
        return Err(AuthError::TimestampExpired);
    }
    if !state.nonces.is_valid(&claim.nonce) {
        return Err(AuthError::InvalidNonce);
    }

    let document = state.resolver.resolve(&claim.did).await?;

    let (valid, message) = state.verifier.verify(&claim, &document, service_domain);
    if !valid {
        return Err(AuthError::InvalidSignature(message));
    }

    let responder = responder_for(state, claim.resp_did.as_deref())?;

    let (access_token, expires_at) = create_access_token(
        &responder.jwt_private_key_path(),
        state.settings.jwt_algorithm,
        &claim.did,
        responder.did(),
        None,
        state.settings.token_expire_minutes,
    )?;
    responder.tokens().store(
        super::cache::Direction::IssuedToRemote,
        &claim.did,
        &access_token,
        expires_at,
    );

    // Reverse claim only when the requester named a responder; the legacy
    // one-way mode gets a bare token.
    let resp_did_auth_header = if claim.resp_did.is_some() {
        build_reverse_claim(state, &responder, &claim.did)
    } else {
        None
    };

    tracing::info!(
        req_did = claim.did,
        resp_did = responder.did(),
        two_way = claim.resp_did.is_some(),
        "authenticated DID claim"
    );

    Ok(HandshakeResult {
        access_token,
        token_type: "bearer".to_string(),
        req_did: claim.did,
        resp_did: claim.resp_did.map(|_| responder.did().to_string()),
        resp_did_auth_header,
    })
}

/// Verify a presented bearer token for `(req_did, resp_did)`.
pub fn handle_bearer_claim(
    state: &AppState,
    authorization: &str,
    req_did: &str,
    resp_did: &str,
) -> Result<VerifiedBearer, AuthError> {
    let token = authorization
        .strip_prefix("Bearer ")
        .or_else(|| authorization.strip_prefix("bearer "))
        .ok_or_else(|| AuthError::MalformedHeader("expected bearer scheme".into()))?
        .trim();

    let responder = state
        .agents
        .get(resp_did)
        .ok_or_else(|| AuthError::IdentityUnresolved(resp_did.to_string()))?;

    match responder.tokens().check_presented(req_did, token) {
        Some(Ok(())) => {}
        Some(Err(err)) => return Err(err),
        None => {
            // No cached record: fall back to signature verification.
            let claims = verify_access_token(
                token,
                &responder.jwt_public_key_path(),
                state.settings.jwt_algorithm,
            )?;
            if claims.req_did != req_did || claims.resp_did != resp_did {
                return Err(AuthError::TokenMismatch);
            }
        }
    }

    Ok(VerifiedBearer {
        req_did: req_did.to_string(),
        resp_did: resp_did.to_string(),
    })
}

fn responder_for(
    state: &AppState,
    resp_did: Option<&str>,
) -> Result<std::sync::Arc<LocalAgent>, AuthError> {
    match resp_did {
        Some(did) => state
            .agents
            .get(did)
            .ok_or_else(|| AuthError::IdentityUnresolved(did.to_string())),
        None => state
            .agents
            .default_agent()
            .ok_or_else(|| AuthError::Internal("no agents configured".into())),
    }
}

/// Sign the responder's reverse claim, targeted at the requester. Signer
/// failures degrade the handshake to one-way rather than failing it.
fn build_reverse_claim(state: &AppState, responder: &LocalAgent, req_did: &str) -> Option<String> {
    match responder.claim_signer() {
        Ok(signer) => {
            let nonce = state.nonces.generate(REVERSE_NONCE_LENGTH);
            let claim = signer.build_claim(
                nonce,
                claim_timestamp_now(),
                Some(req_did),
                REVERSE_CLAIM_DOMAIN,
            );
            Some(claim.encode())
        }
        Err(err) => {
            tracing::warn!(resp_did = responder.did(), %err, "reverse claim signing failed");
            None
        }
    }
}
