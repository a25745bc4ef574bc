// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 DID Auth Server Contributors

//! Authentication errors.
//!
//! Every verification stage fails closed: resolver and verifier failures are
//! converted into the nearest taxonomy kind here rather than propagated raw.
//! Only genuinely unexpected failures surface as `Internal` (500); everything
//! else is a 401 with a short reason string.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Authentication error taxonomy.
#[derive(Debug, Error)]
pub enum AuthError {
    /// No authorization header present.
    #[error("authorization header is required")]
    MissingHeader,
    /// Authorization header is present but cannot be parsed.
    #[error("malformed authorization header: {0}")]
    MalformedHeader(String),
    /// Claim timestamp is outside the freshness window or unparseable.
    #[error("timestamp expired or invalid")]
    TimestampExpired,
    /// Claim nonce was already consumed inside the expiry window.
    #[error("nonce already used or invalid")]
    InvalidNonce,
    /// Neither the local nor the remote resolver produced a DID document.
    #[error("failed to resolve DID document for {0}")]
    IdentityUnresolved(String),
    /// Claim signature does not verify against the resolved document.
    #[error("invalid signature: {0}")]
    InvalidSignature(String),
    /// Signing key material could not be loaded.
    #[error("signing key unavailable: {0}")]
    KeyUnavailable(String),
    /// Access token expiry has passed.
    #[error("token has expired")]
    TokenExpired,
    /// Access token was revoked by the issuer.
    #[error("token has been revoked")]
    TokenRevoked,
    /// Presented token differs from the literal token on record.
    #[error("token does not match issued token")]
    TokenMismatch,
    /// Access token failed cryptographic or structural validation.
    #[error("invalid token: {0}")]
    InvalidToken(String),
    /// HTTP method the client cannot dispatch.
    #[error("unsupported HTTP method: {0}")]
    UnsupportedMethod(String),
    /// Unexpected failure during authentication.
    #[error("internal authentication error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
struct AuthErrorBody {
    error: String,
    error_code: String,
}

impl AuthError {
    /// Stable machine-readable code for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::MissingHeader => "missing_header",
            AuthError::MalformedHeader(_) => "malformed_header",
            AuthError::TimestampExpired => "timestamp_expired",
            AuthError::InvalidNonce => "invalid_nonce",
            AuthError::IdentityUnresolved(_) => "identity_unresolved",
            AuthError::InvalidSignature(_) => "invalid_signature",
            AuthError::KeyUnavailable(_) => "key_unavailable",
            AuthError::TokenExpired => "token_expired",
            AuthError::TokenRevoked => "token_revoked",
            AuthError::TokenMismatch => "token_mismatch",
            AuthError::InvalidToken(_) => "invalid_token",
            AuthError::UnsupportedMethod(_) => "unsupported_method",
            AuthError::Internal(_) => "internal_error",
        }
    }

    /// HTTP status for this error: 401 for authentication failures, 500 for
    /// key-load and unexpected failures, 400 for unusable client input.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::MissingHeader
            | AuthError::MalformedHeader(_)
            | AuthError::TimestampExpired
            | AuthError::InvalidNonce
            | AuthError::IdentityUnresolved(_)
            | AuthError::InvalidSignature(_)
            | AuthError::TokenExpired
            | AuthError::TokenRevoked
            | AuthError::TokenMismatch
            | AuthError::InvalidToken(_) => StatusCode::UNAUTHORIZED,
            AuthError::UnsupportedMethod(_) => StatusCode::BAD_REQUEST,
            AuthError::KeyUnavailable(_) | AuthError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(AuthErrorBody {
            error: self.to_string(),
            error_code: self.error_code().to_string(),
        });
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[tokio::test]
    async fn missing_header_returns_401() {
        let response = AuthError::MissingHeader.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let body_bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&body_bytes).unwrap();
        assert_eq!(body["error_code"], "missing_header");
    }

    #[tokio::test]
    async fn key_unavailable_returns_500() {
        let response = AuthError::KeyUnavailable("no such file".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn unsupported_method_is_client_error() {
        assert_eq!(
            AuthError::UnsupportedMethod("PATCH".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn all_verification_failures_are_401() {
        for err in [
            AuthError::MalformedHeader("x".into()),
            AuthError::TimestampExpired,
            AuthError::InvalidNonce,
            AuthError::IdentityUnresolved("did:wba:x".into()),
            AuthError::InvalidSignature("bad".into()),
            AuthError::TokenExpired,
            AuthError::TokenRevoked,
            AuthError::TokenMismatch,
            AuthError::InvalidToken("garbage".into()),
        ] {
            assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);
        }
    }
}
