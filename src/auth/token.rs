// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 DID Auth Server Contributors

//! Access-token issuance and verification.
//!
//! Tokens are asymmetrically signed JWTs binding a requester DID to a
//! responder DID. The responder signs with its private key; verification
//! uses the matching public key. The algorithm is configurable (default
//! RS256); signing keys are PEM files on disk, loaded per issuance.

use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{
    decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};

use super::error::AuthError;

/// Clock skew tolerance for token expiry checks (60 seconds).
const CLOCK_SKEW_LEEWAY: u64 = 60;

/// Signed token payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccessTokenClaims {
    /// Requester the token was issued to.
    pub req_did: String,
    /// Responder that issued (and signed) the token.
    pub resp_did: String,
    #[serde(default)]
    pub comments: String,
    /// Expiry (Unix timestamp).
    pub exp: i64,
}

/// Resolve the effective token lifetime: an explicit per-call override wins
/// only when strictly positive; anything else falls back to the configured
/// default.
pub fn effective_lifetime_minutes(override_minutes: Option<i64>, default_minutes: i64) -> i64 {
    override_minutes
        .filter(|minutes| *minutes > 0)
        .unwrap_or(default_minutes)
}

/// Mint a signed access token for `(req_did, resp_did)`.
///
/// Returns the encoded token and its expiry instant.
pub fn create_access_token(
    private_key_path: &Path,
    algorithm: Algorithm,
    req_did: &str,
    resp_did: &str,
    lifetime_override: Option<i64>,
    default_lifetime_minutes: i64,
) -> Result<(String, DateTime<Utc>), AuthError> {
    let lifetime = effective_lifetime_minutes(lifetime_override, default_lifetime_minutes);
    let expires_at = Utc::now() + Duration::minutes(lifetime);

    let claims = AccessTokenClaims {
        req_did: req_did.to_string(),
        resp_did: resp_did.to_string(),
        comments: "open for req_did".to_string(),
        exp: expires_at.timestamp(),
    };

    let pem_bytes = std::fs::read(private_key_path).map_err(|err| {
        AuthError::KeyUnavailable(format!("reading {}: {err}", private_key_path.display()))
    })?;
    let key = encoding_key(algorithm, &pem_bytes)?;

    let token = encode(&Header::new(algorithm), &claims, &key)
        .map_err(|err| AuthError::Internal(format!("signing access token: {err}")))?;

    Ok((token, expires_at))
}

/// Decode and verify an access token against the issuer's public key.
pub fn verify_access_token(
    token: &str,
    public_key_path: &Path,
    algorithm: Algorithm,
) -> Result<AccessTokenClaims, AuthError> {
    let pem_bytes = std::fs::read(public_key_path).map_err(|err| {
        AuthError::KeyUnavailable(format!("reading {}: {err}", public_key_path.display()))
    })?;
    let key = decoding_key(algorithm, &pem_bytes)?;

    let mut validation = Validation::new(algorithm);
    validation.leeway = CLOCK_SKEW_LEEWAY;
    validation.validate_aud = false;

    let data = decode::<AccessTokenClaims>(token, &key, &validation).map_err(|err| {
        match err.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            _ => AuthError::InvalidToken(err.to_string()),
        }
    })?;

    if data.claims.req_did.is_empty() {
        return Err(AuthError::InvalidToken("missing req_did in payload".into()));
    }

    Ok(data.claims)
}

fn encoding_key(algorithm: Algorithm, pem_bytes: &[u8]) -> Result<EncodingKey, AuthError> {
    let key = match algorithm {
        Algorithm::RS256
        | Algorithm::RS384
        | Algorithm::RS512
        | Algorithm::PS256
        | Algorithm::PS384
        | Algorithm::PS512 => EncodingKey::from_rsa_pem(pem_bytes),
        Algorithm::ES256 | Algorithm::ES384 => EncodingKey::from_ec_pem(pem_bytes),
        Algorithm::EdDSA => EncodingKey::from_ed_pem(pem_bytes),
        Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => {
            return Err(AuthError::KeyUnavailable(
                "symmetric JWT algorithms are not supported".into(),
            ))
        }
    };
    key.map_err(|err| AuthError::KeyUnavailable(format!("loading private key: {err}")))
}

fn decoding_key(algorithm: Algorithm, pem_bytes: &[u8]) -> Result<DecodingKey, AuthError> {
    let key = match algorithm {
        Algorithm::RS256
        | Algorithm::RS384
        | Algorithm::RS512
        | Algorithm::PS256
        | Algorithm::PS384
        | Algorithm::PS512 => DecodingKey::from_rsa_pem(pem_bytes),
        Algorithm::ES256 | Algorithm::ES384 => DecodingKey::from_ec_pem(pem_bytes),
        Algorithm::EdDSA => DecodingKey::from_ed_pem(pem_bytes),
        Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => {
            return Err(AuthError::KeyUnavailable(
                "symmetric JWT algorithms are not supported".into(),
            ))
        }
    };
    key.map_err(|err| AuthError::KeyUnavailable(format!("loading public key: {err}")))
}

/// Test fixtures: Ed25519 JWT keypairs written as PEM files.
#[cfg(test)]
pub(crate) mod test_keys {
    use std::path::PathBuf;

    use ring::rand::SystemRandom;
    use ring::signature::{Ed25519KeyPair, KeyPair};
    use tempfile::TempDir;

    // SubjectPublicKeyInfo header for an Ed25519 raw public key.
    const ED25519_SPKI_PREFIX: [u8; 12] = [
        0x30, 0x2a, 0x30, 0x05, 0x06, 0x03, 0x2b, 0x65, 0x70, 0x03, 0x21, 0x00,
    ];

    pub(crate) fn generate_jwt_keypair_pem() -> (String, String) {
        let rng = SystemRandom::new();
        let document = Ed25519KeyPair::generate_pkcs8(&rng).unwrap();
        let key_pair = Ed25519KeyPair::from_pkcs8(document.as_ref()).unwrap();

        let private_pem = pem::encode(&pem::Pem::new("PRIVATE KEY", document.as_ref().to_vec()));
        let mut spki = ED25519_SPKI_PREFIX.to_vec();
        spki.extend_from_slice(key_pair.public_key().as_ref());
        let public_pem = pem::encode(&pem::Pem::new("PUBLIC KEY", spki));
        (private_pem, public_pem)
    }

    /// Write a fresh keypair into `dir` and return the two file paths.
    pub(crate) fn write_jwt_keypair(dir: &TempDir) -> (PathBuf, PathBuf) {
        let (private_pem, public_pem) = generate_jwt_keypair_pem();
        let private_path = dir.path().join("private_key.pem");
        let public_path = dir.path().join("public_key.pem");
        std::fs::write(&private_path, private_pem).unwrap();
        std::fs::write(&public_path, public_pem).unwrap();
        (private_path, public_path)
    }
}
