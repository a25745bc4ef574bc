// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 DID Auth Server Contributors

//! Authorization header parsing and construction.
//!
//! Two schemes travel in the `authorization` request header:
//!
//! - **DID claim**: `DIDWba did="...", nonce="...", timestamp="...",
//!   resp_did="...", verification_method="...", signature="..."`, a signed
//!   identity assertion. `resp_did` may carry the `none` sentinel when the
//!   caller does not know (or does not care) who answers.
//! - **Bearer**: `Bearer <token>`, an access token from a previous
//!   handshake.
//!
//! On success the *response* carries an `authorization` header too: a JSON
//! object (`HandshakeResult`) with the minted token and, for two-way
//! handshakes, the responder's reverse claim. The legacy one-way mode
//! instead returns a bare `bearer <token>` string.

use serde::{Deserialize, Serialize};

use super::error::AuthError;

/// Scheme prefix for DID claim headers.
pub const DID_SCHEME: &str = "DIDWba";

/// Sentinel meaning "no responder DID supplied".
pub const NO_RESPONDER: &str = "none";

/// Request headers naming the token binding on bearer requests.
pub const REQ_DID_HEADER: &str = "req_did";
pub const RESP_DID_HEADER: &str = "resp_did";

/// Parsed identity claim from an authorization header. Constructed once per
/// request and never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DidAuthHeader {
    /// Requester DID.
    pub did: String,
    /// Single-use replay token.
    pub nonce: String,
    /// ISO-8601 claim creation time.
    pub timestamp: String,
    /// Responder DID; `None` when the sentinel was supplied.
    pub resp_did: Option<String>,
    /// Verification method (key id) within the requester's DID document.
    pub verification_method: String,
    /// Signature over the canonical claim, base64url.
    pub signature: String,
}

impl DidAuthHeader {
    /// Whether a header value carries a DID claim rather than a bearer token.
    pub fn is_did_scheme(header: &str) -> bool {
        header.contains("did=\"")
    }

    /// Parse a DID claim header. All six fields are required; `resp_did`
    /// may be the `none` sentinel.
    pub fn parse(header: &str) -> Result<Self, AuthError> {
        let require = |name: &str| {
            extract_field(header, name)
                .ok_or_else(|| AuthError::MalformedHeader(format!("missing field '{name}'")))
        };

        let did = require("did")?;
        let nonce = require("nonce")?;
        let timestamp = require("timestamp")?;
        let resp_did_raw = require("resp_did")?;
        let verification_method = require("verification_method")?;
        let signature = require("signature")?;

        let resp_did = if resp_did_raw == NO_RESPONDER {
            None
        } else {
            Some(resp_did_raw)
        };

        Ok(Self {
            did,
            nonce,
            timestamp,
            resp_did,
            verification_method,
            signature,
        })
    }

    /// `resp_did` as transmitted (sentinel included). This exact string is
    /// covered by the claim signature.
    pub fn resp_did_raw(&self) -> &str {
        self.resp_did.as_deref().unwrap_or(NO_RESPONDER)
    }

    /// Serialize back to header form.
    pub fn encode(&self) -> String {
        format!(
            "{DID_SCHEME} did=\"{}\", nonce=\"{}\", timestamp=\"{}\", resp_did=\"{}\", \
             verification_method=\"{}\", signature=\"{}\"",
            self.did,
            self.nonce,
            self.timestamp,
            self.resp_did_raw(),
            self.verification_method,
            self.signature,
        )
    }
}

/// Find `name="value"` in a header, honoring field-name boundaries so that
/// a search for `did` does not land inside `resp_did`.
fn extract_field(header: &str, name: &str) -> Option<String> {
    let pattern = format!("{name}=\"");
    let bytes = header.as_bytes();
    let mut from = 0;

    while let Some(offset) = header[from..].find(&pattern) {
        let start = from + offset;
        let at_boundary = start == 0 || {
            let prev = bytes[start - 1];
            !(prev.is_ascii_alphanumeric() || prev == b'_')
        };
        if at_boundary {
            let value_start = start + pattern.len();
            let value_end = header[value_start..].find('"')? + value_start;
            return Some(header[value_start..value_end].to_string());
        }
        from = start + pattern.len();
    }
    None
}

/// Outcome of a successful authentication, carried back to the caller in
/// the response's `authorization` header.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HandshakeResult {
    /// Minted (or re-presented) access token.
    pub access_token: String,
    /// Always `"bearer"`.
    pub token_type: String,
    /// Requester DID the token is bound to.
    pub req_did: String,
    /// Responder DID, when one was named in the claim.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resp_did: Option<String>,
    /// Responder's reverse identity claim, present on two-way handshakes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resp_did_auth_header: Option<String>,
}

impl HandshakeResult {
    /// Encode for the response `authorization` header: JSON for two-way
    /// results, the legacy bare bearer string when no responder was named.
    pub fn authorization_header(&self) -> Result<String, AuthError> {
        if self.resp_did.is_some() {
            serde_json::to_string(self)
                .map_err(|err| AuthError::Internal(format!("encoding handshake result: {err}")))
        } else {
            Ok(format!("bearer {}", self.access_token))
        }
    }
}

/// A response `authorization` header as seen by the requester.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseAuth {
    /// Two-way result with token and (usually) a reverse claim.
    TwoWay(HandshakeResult),
    /// Legacy bare token from a one-way-only peer.
    Bearer(String),
}

impl ResponseAuth {
    pub fn parse(value: &str) -> Option<Self> {
        let trimmed = value.trim();
        for prefix in ["Bearer ", "bearer "] {
            if let Some(token) = trimmed.strip_prefix(prefix) {
                return Some(ResponseAuth::Bearer(token.trim().to_string()));
            }
        }
        serde_json::from_str::<HandshakeResult>(trimmed)
            .ok()
            .map(ResponseAuth::TwoWay)
    }
}
