// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 DID Auth Server Contributors

//! Claim signing and verification.
//!
//! The verification side is a seam: the handshake pipeline only knows the
//! [`SignatureVerifier`] contract and supplies the claim exactly as
//! received plus the service domain it was scoped to. The bundled
//! [`Ed25519Verifier`] signs/checks an Ed25519 signature over a canonical
//! JSON payload with sorted keys; swapping suites means implementing the
//! trait, not touching the pipeline.

use std::path::Path;

use base64ct::{Base64, Base64UrlUnpadded, Encoding};
use ring::rand::SystemRandom;
use ring::signature::{self, Ed25519KeyPair, KeyPair};

use super::error::AuthError;
use super::header::DidAuthHeader;
use super::resolver::IdentityDocument;

/// Canonical byte payload covered by a claim signature: a JSON object with
/// sorted keys over the claim fields and the service domain. `resp_did` is
/// covered exactly as transmitted, sentinel included.
pub fn signing_payload(
    did: &str,
    nonce: &str,
    timestamp: &str,
    resp_did_raw: &str,
    service_domain: &str,
) -> Vec<u8> {
    let mut map = serde_json::Map::new();
    map.insert("did".into(), did.into());
    map.insert("nonce".into(), nonce.into());
    map.insert("resp_did".into(), resp_did_raw.into());
    map.insert("service".into(), service_domain.into());
    map.insert("timestamp".into(), timestamp.into());
    serde_json::Value::Object(map).to_string().into_bytes()
}

/// Verifies that a claim's signature covers its fields for a given service
/// domain. Consumed by the handshake orchestrator; implementations are
/// otherwise opaque to the pipeline.
pub trait SignatureVerifier: Send + Sync {
    fn verify(
        &self,
        claim: &DidAuthHeader,
        document: &IdentityDocument,
        service_domain: &str,
    ) -> (bool, String);
}

/// Default verifier: Ed25519 over the canonical payload, public key taken
/// from the resolved document's verification method.
pub struct Ed25519Verifier;

impl SignatureVerifier for Ed25519Verifier {
    fn verify(
        &self,
        claim: &DidAuthHeader,
        document: &IdentityDocument,
        service_domain: &str,
    ) -> (bool, String) {
        let Some(method) = document.verification_method(&claim.verification_method) else {
            return (
                false,
                format!(
                    "verification method '{}' not found in document for {}",
                    claim.verification_method, document.id
                ),
            );
        };

        let public_key = match Base64::decode_vec(&method.public_key_base64) {
            Ok(bytes) => bytes,
            Err(_) => return (false, "invalid public key encoding".into()),
        };

        let signature_bytes = match Base64UrlUnpadded::decode_vec(&claim.signature) {
            Ok(bytes) => bytes,
            Err(_) => return (false, "invalid signature encoding".into()),
        };

        let payload = signing_payload(
            &claim.did,
            &claim.nonce,
            &claim.timestamp,
            claim.resp_did_raw(),
            service_domain,
        );

        let key = signature::UnparsedPublicKey::new(&signature::ED25519, public_key);
        match key.verify(&payload, &signature_bytes) {
            Ok(()) => (true, "ok".into()),
            Err(_) => (false, "signature check failed".into()),
        }
    }
}

/// Client-side claim signer bound to one agent's DID and key.
#[derive(Debug)]
pub struct ClaimSigner {
    did: String,
    verification_method: String,
    key_pair: Ed25519KeyPair,
}

impl ClaimSigner {
    /// Load a PKCS#8 Ed25519 private key from a PEM file.
    pub fn from_pem_file(
        did: impl Into<String>,
        verification_method: impl Into<String>,
        key_path: &Path,
    ) -> Result<Self, AuthError> {
        let pem_text = std::fs::read_to_string(key_path).map_err(|err| {
            AuthError::KeyUnavailable(format!("reading {}: {err}", key_path.display()))
        })?;
        Self::from_pkcs8_pem(did, verification_method, &pem_text)
    }

    pub fn from_pkcs8_pem(
        did: impl Into<String>,
        verification_method: impl Into<String>,
        pem_text: &str,
    ) -> Result<Self, AuthError> {
        let block = pem::parse(pem_text)
            .map_err(|err| AuthError::KeyUnavailable(format!("parsing key PEM: {err}")))?;
        let key_pair = Ed25519KeyPair::from_pkcs8_maybe_unchecked(block.contents())
            .map_err(|_| AuthError::KeyUnavailable("not a PKCS#8 Ed25519 key".into()))?;

        Ok(Self {
            did: did.into(),
            verification_method: verification_method.into(),
            key_pair,
        })
    }

    pub fn did(&self) -> &str {
        &self.did
    }

    /// Public half of the signing key, standard base64, as published in the
    /// DID document.
    pub fn public_key_base64(&self) -> String {
        Base64::encode_string(self.key_pair.public_key().as_ref())
    }

    /// Build and sign a claim for `service_domain`.
    pub fn build_claim(
        &self,
        nonce: impl Into<String>,
        timestamp: impl Into<String>,
        resp_did: Option<&str>,
        service_domain: &str,
    ) -> DidAuthHeader {
        let nonce = nonce.into();
        let timestamp = timestamp.into();
        let resp_did_raw = resp_did.unwrap_or(super::header::NO_RESPONDER);

        let payload = signing_payload(&self.did, &nonce, &timestamp, resp_did_raw, service_domain);
        let signature = Base64UrlUnpadded::encode_string(self.key_pair.sign(&payload).as_ref());

        DidAuthHeader {
            did: self.did.clone(),
            nonce,
            timestamp,
            resp_did: resp_did.map(str::to_string),
            verification_method: self.verification_method.clone(),
            signature,
        }
    }
}

/// Generate a fresh Ed25519 signing key for agent provisioning.
///
/// Returns the PKCS#8 PEM and the standard-base64 public key to embed in
/// the agent's DID document.
pub fn generate_signing_key() -> Result<(String, String), AuthError> {
    let rng = SystemRandom::new();
    let document = Ed25519KeyPair::generate_pkcs8(&rng)
        .map_err(|_| AuthError::Internal("Ed25519 key generation failed".into()))?;
    let key_pair = Ed25519KeyPair::from_pkcs8(document.as_ref())
        .map_err(|_| AuthError::Internal("generated key did not parse".into()))?;

    let pem_text = pem::encode(&pem::Pem::new("PRIVATE KEY", document.as_ref().to_vec()));
    let public_key = Base64::encode_string(key_pair.public_key().as_ref());
    Ok((pem_text, public_key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::resolver::VerificationMethod;

    fn signer_and_document(did: &str) -> (ClaimSigner, IdentityDocument) {
        let (pem_text, public_key) = generate_signing_key().unwrap();
        let method_id = format!("{did}#key-1");
        let signer = ClaimSigner::from_pkcs8_pem(did, method_id.clone(), &pem_text).unwrap();
        let document = IdentityDocument {
            id: did.to_string(),
            verification_methods: vec![VerificationMethod {
                id: method_id.clone(),
                method_type: "Ed25519VerificationKey2020".into(),
                controller: did.to_string(),
                public_key_base64: public_key,
            }],
            authentication: vec![method_id],
        };
        (signer, document)
    }

    #[test]
    fn signed_claim_verifies_against_document() {
        let did = "did:wba:localhost%3A9527:wba:user:alice";
        let (signer, document) = signer_and_document(did);

        let claim = signer.build_claim("nonce1", "2026-08-25T10:00:00Z", None, "localhost");
        let (valid, message) = Ed25519Verifier.verify(&claim, &document, "localhost");
        assert!(valid, "{message}");
    }

    #[test]
    fn tampered_field_fails_verification() {
        let did = "did:wba:localhost%3A9527:wba:user:alice";
        let (signer, document) = signer_and_document(did);

        let mut claim = signer.build_claim("nonce1", "2026-08-25T10:00:00Z", None, "localhost");
        claim.nonce = "different".into();
        let (valid, _) = Ed25519Verifier.verify(&claim, &document, "localhost");
        assert!(!valid);
    }

    #[test]
    fn wrong_service_domain_fails_verification() {
        let did = "did:wba:localhost%3A9527:wba:user:alice";
        let (signer, document) = signer_and_document(did);

        let claim = signer.build_claim("nonce1", "2026-08-25T10:00:00Z", None, "localhost");
        let (valid, _) = Ed25519Verifier.verify(&claim, &document, "other-host");
        assert!(!valid);
    }

    #[test]
    fn signature_covers_responder_did() {
        let did = "did:wba:localhost%3A9527:wba:user:alice";
        let (signer, document) = signer_and_document(did);

        let mut claim = signer.build_claim(
            "nonce1",
            "2026-08-25T10:00:00Z",
            Some("did:wba:b"),
            "localhost",
        );
        claim.resp_did = Some("did:wba:mallory".into());
        let (valid, _) = Ed25519Verifier.verify(&claim, &document, "localhost");
        assert!(!valid);
    }

    #[test]
    fn unknown_verification_method_is_reported() {
        let did = "did:wba:localhost%3A9527:wba:user:alice";
        let (signer, document) = signer_and_document(did);

        let mut claim = signer.build_claim("nonce1", "2026-08-25T10:00:00Z", None, "localhost");
        claim.verification_method = "#key-9".into();
        let (valid, message) = Ed25519Verifier.verify(&claim, &document, "localhost");
        assert!(!valid);
        assert!(message.contains("not found"));
    }

    #[test]
    fn canonical_payload_is_key_sorted() {
        let payload = signing_payload("d", "n", "t", "r", "s");
        let text = String::from_utf8(payload).unwrap();
        assert_eq!(
            text,
            r#"{"did":"d","nonce":"n","resp_did":"r","service":"s","timestamp":"t"}"#
        );
    }

    #[test]
    fn pem_round_trip_preserves_key() {
        let (pem_text, public_key) = generate_signing_key().unwrap();
        let signer = ClaimSigner::from_pkcs8_pem("did:wba:x", "#key-1", &pem_text).unwrap();
        assert_eq!(signer.public_key_base64(), public_key);
    }

    #[test]
    fn garbage_pem_is_key_unavailable() {
        let err = ClaimSigner::from_pkcs8_pem("did:wba:x", "#key-1", "not pem").unwrap_err();
        assert!(matches!(err, AuthError::KeyUnavailable(_)));
    }
}
