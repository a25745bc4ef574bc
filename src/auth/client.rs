// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 DID Auth Server Contributors

//! Requester-side handshake client.
//!
//! The client signs outbound claims with one agent's key, reuses access
//! tokens per target domain, and verifies responder reverse claims so both
//! sides of a two-way handshake end up mutually authenticated. A rejected
//! cached token is dropped and the request retried once with a fresh
//! claim.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, TimeZone, Utc};
use rand::{distributions::Alphanumeric, Rng};

use super::cache::{Direction, TokenCache};
use super::error::AuthError;
use super::handshake::REVERSE_CLAIM_DOMAIN;
use super::header::{DidAuthHeader, ResponseAuth, REQ_DID_HEADER, RESP_DID_HEADER};
use super::resolver::DidResolver;
use super::signature::{ClaimSigner, SignatureVerifier};
use super::timestamp::{claim_timestamp_now, verify_timestamp};
use super::token::AccessTokenClaims;

const CLAIM_NONCE_LENGTH: usize = 16;

/// What a call through the client produced.
#[derive(Debug, Clone)]
pub struct ClientResponse {
    pub status: u16,
    pub body: serde_json::Value,
    /// Access token obtained (or re-confirmed) during this exchange.
    pub token: Option<String>,
}

/// Outcome of processing a response `authorization` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeOutcome {
    pub token: String,
    /// Responder DID proven by a verified reverse claim; `None` for the
    /// legacy one-way mode.
    pub verified_resp_did: Option<String>,
}

/// HTTP client that authenticates as one local agent.
pub struct AuthClient {
    signer: ClaimSigner,
    http: reqwest::Client,
    // Domain -> live access token.
    tokens: Mutex<HashMap<String, String>>,
    received: TokenCache,
    default_token_lifetime_minutes: i64,
}

impl AuthClient {
    pub fn new(signer: ClaimSigner) -> Self {
        Self {
            signer,
            http: reqwest::Client::builder()
                .timeout(StdDuration::from_secs(15))
                .build()
                .expect("Failed to create HTTP client"),
            tokens: Mutex::new(HashMap::new()),
            received: TokenCache::new(),
            default_token_lifetime_minutes: 60,
        }
    }

    pub fn did(&self) -> &str {
        self.signer.did()
    }

    /// Tokens received from remote responders, keyed by their DID.
    pub fn received_tokens(&self) -> &TokenCache {
        &self.received
    }

    /// Authorization header for a request to `domain`: the cached token
    /// when one exists, otherwise a freshly signed claim.
    pub fn auth_header_for(&self, domain: &str, resp_did: Option<&str>) -> String {
        let tokens = self.tokens.lock().expect("client token map poisoned");
        match tokens.get(domain) {
            Some(token) => format!("Bearer {token}"),
            None => self.fresh_claim_header(domain, resp_did),
        }
    }

    /// A newly signed claim header, bypassing any cached token.
    pub fn fresh_claim_header(&self, domain: &str, resp_did: Option<&str>) -> String {
        let nonce: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(CLAIM_NONCE_LENGTH)
            .map(char::from)
            .collect();
        self.signer
            .build_claim(nonce, claim_timestamp_now(), resp_did, domain)
            .encode()
    }

    /// Drop the cached token for a domain, forcing re-authentication.
    pub fn clear_token(&self, domain: &str) {
        let mut tokens = self.tokens.lock().expect("client token map poisoned");
        tokens.remove(domain);
    }

    pub fn cached_token(&self, domain: &str) -> Option<String> {
        let tokens = self.tokens.lock().expect("client token map poisoned");
        tokens.get(domain).cloned()
    }

    /// Process the responder's `authorization` response header.
    ///
    /// Two-way results must carry a reverse claim when `expected_resp_did`
    /// is set; the claim is verified and its DID matched before the token
    /// is accepted and cached.
    pub async fn complete_handshake(
        &self,
        domain: &str,
        expected_resp_did: Option<&str>,
        response_auth: &str,
        resolver: &DidResolver,
        verifier: &dyn SignatureVerifier,
        timestamp_window_minutes: i64,
    ) -> Result<HandshakeOutcome, AuthError> {
        let parsed = ResponseAuth::parse(response_auth).ok_or_else(|| {
            AuthError::MalformedHeader("unrecognized response authorization".into())
        })?;

        match parsed {
            ResponseAuth::Bearer(token) => {
                self.store_domain_token(domain, &token);
                Ok(HandshakeOutcome {
                    token,
                    verified_resp_did: None,
                })
            }
            ResponseAuth::TwoWay(result) => {
                let verified_resp_did = match expected_resp_did {
                    Some(expected) => {
                        let reverse = result.resp_did_auth_header.as_deref().ok_or_else(|| {
                            AuthError::InvalidSignature("missing reverse claim".into())
                        })?;
                        let claimed = verify_reverse_claim(
                            resolver,
                            verifier,
                            timestamp_window_minutes,
                            reverse,
                        )
                        .await?;
                        if claimed != expected {
                            return Err(AuthError::InvalidSignature(format!(
                                "reverse claim from {claimed}, expected {expected}"
                            )));
                        }
                        Some(claimed)
                    }
                    None => None,
                };

                self.store_domain_token(domain, &result.access_token);
                if let Some(resp_did) = result.resp_did.as_deref() {
                    let expires_at = self.token_expiry(&result.access_token);
                    self.received.store(
                        Direction::ReceivedFromRemote,
                        resp_did,
                        &result.access_token,
                        expires_at,
                    );
                }

                Ok(HandshakeOutcome {
                    token: result.access_token,
                    verified_resp_did,
                })
            }
        }
    }

    /// Send an authenticated GET or POST, retrying once with a fresh claim
    /// if a cached token is rejected.
    pub async fn send_authenticated_request(
        &self,
        method: &str,
        url: &str,
        body: Option<serde_json::Value>,
        resp_did: Option<&str>,
        resolver: &DidResolver,
        verifier: &dyn SignatureVerifier,
        timestamp_window_minutes: i64,
    ) -> Result<ClientResponse, AuthError> {
        let parsed_url = url::Url::parse(url)
            .map_err(|err| AuthError::Internal(format!("invalid URL {url}: {err}")))?;
        let domain = parsed_url
            .host_str()
            .ok_or_else(|| AuthError::Internal(format!("URL {url} has no host")))?
            .to_string();

        let had_cached_token = self.cached_token(&domain).is_some();
        let header = self.auth_header_for(&domain, resp_did);
        // Bearer requests carry the token's DID binding so the responder
        // can answer from its issued-token cache.
        let binding = if had_cached_token {
            resp_did.map(|resp| (self.did(), resp))
        } else {
            None
        };
        let response = self
            .execute(method, url, body.clone(), &header, binding)
            .await?;

        let response = if response.status().as_u16() == 401 && had_cached_token {
            // Token no longer honored; re-authenticate from scratch.
            self.clear_token(&domain);
            let header = self.fresh_claim_header(&domain, resp_did);
            self.execute(method, url, body, &header, None).await?
        } else {
            response
        };

        let status = response.status().as_u16();
        let auth_header = response
            .headers()
            .get(reqwest::header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        let token = match auth_header {
            Some(value) => Some(
                self.complete_handshake(
                    &domain,
                    resp_did,
                    &value,
                    resolver,
                    verifier,
                    timestamp_window_minutes,
                )
                .await?
                .token,
            ),
            None => None,
        };

        let text = response
            .text()
            .await
            .map_err(|err| AuthError::Internal(format!("reading response body: {err}")))?;
        let body = serde_json::from_str(&text).unwrap_or(serde_json::Value::String(text));

        Ok(ClientResponse {
            status,
            body,
            token,
        })
    }

    async fn execute(
        &self,
        method: &str,
        url: &str,
        body: Option<serde_json::Value>,
        auth_header: &str,
        binding: Option<(&str, &str)>,
    ) -> Result<reqwest::Response, AuthError> {
        let request = match method.to_ascii_uppercase().as_str() {
            "GET" => self.http.get(url),
            "POST" => {
                let request = self.http.post(url);
                match body {
                    Some(json) => request.json(&json),
                    None => request,
                }
            }
            other => return Err(AuthError::UnsupportedMethod(other.to_string())),
        };

        let mut request = request.header(reqwest::header::AUTHORIZATION, auth_header);
        if let Some((req_did, resp_did)) = binding {
            request = request
                .header(REQ_DID_HEADER, req_did)
                .header(RESP_DID_HEADER, resp_did);
        }

        request
            .send()
            .await
            .map_err(|err| AuthError::Internal(format!("request to {url} failed: {err}")))
    }

    fn store_domain_token(&self, domain: &str, token: &str) {
        let mut tokens = self.tokens.lock().expect("client token map poisoned");
        tokens.insert(domain.to_string(), token.to_string());
    }

    /// Expiry for a received token, read from its payload without signature
    /// verification (the reverse claim vouches for the responder). Falls
    /// back to the default lifetime when the payload is unreadable.
    fn token_expiry(&self, token: &str) -> DateTime<Utc> {
        jsonwebtoken::dangerous::insecure_decode::<AccessTokenClaims>(token)
            .ok()
            .and_then(|data| Utc.timestamp_opt(data.claims.exp, 0).single())
            .unwrap_or_else(|| {
                Utc::now() + Duration::minutes(self.default_token_lifetime_minutes)
            })
    }
}

/// Verify a responder's reverse claim and return the DID it proves.
///
/// Reverse claims are scoped to the fixed virtual callback domain; their
/// nonces are minted by the responder and checked only for timestamp
/// freshness here.
pub async fn verify_reverse_claim(
    resolver: &DidResolver,
    verifier: &dyn SignatureVerifier,
    timestamp_window_minutes: i64,
    header_value: &str,
) -> Result<String, AuthError> {
    let claim = DidAuthHeader::parse(header_value)?;

    if !verify_timestamp(&claim.timestamp, timestamp_window_minutes) {
        return Err(AuthError::TimestampExpired);
    }

    let document = resolver.resolve(&claim.did).await?;
    let (valid, message) = verifier.verify(&claim, &document, REVERSE_CLAIM_DOMAIN);
    if !valid {
        return Err(AuthError::InvalidSignature(message));
    }

    Ok(claim.did)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{provision_agent_dir, LocalAgent};
    use crate::auth::header::HandshakeResult;
    use crate::auth::signature::Ed25519Verifier;
    use crate::auth::token::{create_access_token, test_keys};
    use jsonwebtoken::Algorithm;
    use tempfile::TempDir;

    const ALICE: &str = "did:wba:localhost%3A9527:wba:user:alice";
    const BOB: &str = "did:wba:localhost%3A9527:wba:user:bob";

    fn agent_in(dir: &TempDir, name: &str, did: &str) -> LocalAgent {
        let agent_dir = dir.path().join(name);
        provision_agent_dir(&agent_dir, did, "key-1").unwrap();
        LocalAgent::from_dir(&agent_dir).unwrap()
    }

    async fn resolver_with(agents: &[&LocalAgent]) -> DidResolver {
        let resolver = DidResolver::new();
        for agent in agents {
            resolver.register_local(agent.load_document().unwrap()).await;
        }
        resolver
    }

    #[tokio::test]
    async fn fresh_claim_header_verifies_against_own_document() {
        let dir = TempDir::new().unwrap();
        let alice = agent_in(&dir, "alice", ALICE);
        let client = AuthClient::new(alice.claim_signer().unwrap());

        let header = client.auth_header_for("localhost", Some(BOB));
        let claim = DidAuthHeader::parse(&header).unwrap();
        assert_eq!(claim.did, ALICE);
        assert_eq!(claim.resp_did.as_deref(), Some(BOB));

        let (valid, message) =
            Ed25519Verifier.verify(&claim, &alice.load_document().unwrap(), "localhost");
        assert!(valid, "{message}");
    }

    #[tokio::test]
    async fn reverse_claim_round_trip_verifies() {
        let dir = TempDir::new().unwrap();
        let bob = agent_in(&dir, "bob", BOB);
        let resolver = resolver_with(&[&bob]).await;

        let reverse = bob
            .claim_signer()
            .unwrap()
            .build_claim("n1", claim_timestamp_now(), Some(ALICE), REVERSE_CLAIM_DOMAIN)
            .encode();

        let claimed = verify_reverse_claim(&resolver, &Ed25519Verifier, 5, &reverse)
            .await
            .unwrap();
        assert_eq!(claimed, BOB);
    }

    #[tokio::test]
    async fn reverse_claim_scoped_to_other_domain_fails() {
        let dir = TempDir::new().unwrap();
        let bob = agent_in(&dir, "bob", BOB);
        let resolver = resolver_with(&[&bob]).await;

        let reverse = bob
            .claim_signer()
            .unwrap()
            .build_claim("n1", claim_timestamp_now(), Some(ALICE), "localhost")
            .encode();

        let err = verify_reverse_claim(&resolver, &Ed25519Verifier, 5, &reverse)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidSignature(_)));
    }

    #[tokio::test]
    async fn stale_reverse_claim_fails() {
        let dir = TempDir::new().unwrap();
        let bob = agent_in(&dir, "bob", BOB);
        let resolver = resolver_with(&[&bob]).await;

        let stale = (Utc::now() - Duration::minutes(120))
            .to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
        let reverse = bob
            .claim_signer()
            .unwrap()
            .build_claim("n1", stale, Some(ALICE), REVERSE_CLAIM_DOMAIN)
            .encode();

        let err = verify_reverse_claim(&resolver, &Ed25519Verifier, 5, &reverse)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::TimestampExpired));
    }

    #[tokio::test]
    async fn two_way_handshake_completion_caches_token() {
        let dir = TempDir::new().unwrap();
        let alice = agent_in(&dir, "alice", ALICE);
        let bob = agent_in(&dir, "bob", BOB);
        let resolver = resolver_with(&[&bob]).await;

        let keys = TempDir::new().unwrap();
        let (private_path, _) = test_keys::write_jwt_keypair(&keys);
        let (token, _) = create_access_token(
            &private_path,
            Algorithm::EdDSA,
            ALICE,
            BOB,
            None,
            60,
        )
        .unwrap();

        let reverse = bob
            .claim_signer()
            .unwrap()
            .build_claim("n1", claim_timestamp_now(), Some(ALICE), REVERSE_CLAIM_DOMAIN)
            .encode();
        let response_auth = HandshakeResult {
            access_token: token.clone(),
            token_type: "bearer".into(),
            req_did: ALICE.into(),
            resp_did: Some(BOB.into()),
            resp_did_auth_header: Some(reverse),
        }
        .authorization_header()
        .unwrap();

        let client = AuthClient::new(alice.claim_signer().unwrap());
        let outcome = client
            .complete_handshake("localhost", Some(BOB), &response_auth, &resolver, &Ed25519Verifier, 5)
            .await
            .unwrap();

        assert_eq!(outcome.token, token);
        assert_eq!(outcome.verified_resp_did.as_deref(), Some(BOB));
        assert_eq!(client.cached_token("localhost").as_deref(), Some(&*token));
        // The next header for this domain reuses the token.
        assert_eq!(
            client.auth_header_for("localhost", Some(BOB)),
            format!("Bearer {token}")
        );
        // Expiry was read from the token payload.
        let record = client
            .received_tokens()
            .lookup(Direction::ReceivedFromRemote, BOB)
            .unwrap();
        assert!(record.expires_at > Utc::now() + Duration::minutes(59));
    }

    #[tokio::test]
    async fn reverse_claim_from_wrong_responder_is_rejected() {
        let dir = TempDir::new().unwrap();
        let alice = agent_in(&dir, "alice", ALICE);
        let mallory = agent_in(&dir, "mallory", "did:wba:localhost%3A9527:wba:user:mallory");
        let resolver = resolver_with(&[&mallory]).await;

        let reverse = mallory
            .claim_signer()
            .unwrap()
            .build_claim("n1", claim_timestamp_now(), Some(ALICE), REVERSE_CLAIM_DOMAIN)
            .encode();
        let response_auth = HandshakeResult {
            access_token: "tok".into(),
            token_type: "bearer".into(),
            req_did: ALICE.into(),
            resp_did: Some(BOB.into()),
            resp_did_auth_header: Some(reverse),
        }
        .authorization_header()
        .unwrap();

        let client = AuthClient::new(alice.claim_signer().unwrap());
        let err = client
            .complete_handshake("localhost", Some(BOB), &response_auth, &resolver, &Ed25519Verifier, 5)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidSignature(_)));
        // Nothing cached after a failed handshake.
        assert!(client.cached_token("localhost").is_none());
    }

    #[tokio::test]
    async fn missing_reverse_claim_is_rejected_when_expected() {
        let dir = TempDir::new().unwrap();
        let alice = agent_in(&dir, "alice", ALICE);
        let resolver = DidResolver::new();

        let response_auth = HandshakeResult {
            access_token: "tok".into(),
            token_type: "bearer".into(),
            req_did: ALICE.into(),
            resp_did: Some(BOB.into()),
            resp_did_auth_header: None,
        }
        .authorization_header()
        .unwrap();

        let client = AuthClient::new(alice.claim_signer().unwrap());
        let err = client
            .complete_handshake("localhost", Some(BOB), &response_auth, &resolver, &Ed25519Verifier, 5)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidSignature(_)));
    }

    #[tokio::test]
    async fn cached_token_is_reused_through_live_server() {
        let dir = TempDir::new().unwrap();

        let bob_dir = dir.path().join("bob");
        provision_agent_dir(&bob_dir, BOB, "key-1").unwrap();
        let (private_pem, public_pem) = test_keys::generate_jwt_keypair_pem();
        std::fs::write(bob_dir.join("private_key.pem"), private_pem).unwrap();
        std::fs::write(bob_dir.join("public_key.pem"), public_pem).unwrap();

        let alice_dir = dir.path().join("alice");
        let alice_document = provision_agent_dir(&alice_dir, ALICE, "key-1").unwrap();
        let alice = LocalAgent::from_dir(&alice_dir).unwrap();

        let bob = LocalAgent::from_dir(&bob_dir).unwrap();
        let bob_document = bob.load_document().unwrap();
        let mut agents = crate::agent::AgentRegistry::new();
        agents.insert(bob);

        let server_resolver = DidResolver::new();
        server_resolver.register_local(alice_document).await;

        let settings = crate::config::Settings {
            jwt_algorithm: Algorithm::EdDSA,
            ..crate::config::Settings::default()
        };
        let state = crate::state::AppState::new(settings, agents, server_resolver);
        let app = crate::api::router(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let client = AuthClient::new(alice.claim_signer().unwrap());
        let client_resolver = DidResolver::new();
        client_resolver.register_local(bob_document).await;

        let url = format!("http://{addr}/wba/auth");
        let first = client
            .send_authenticated_request(
                "GET",
                &url,
                None,
                Some(BOB),
                &client_resolver,
                &Ed25519Verifier,
                5,
            )
            .await
            .unwrap();
        assert_eq!(first.status, 200);
        let token = first.token.expect("handshake should yield a token");

        // The second call presents the cached bearer token with its DID
        // binding; the responder answers from its issued-token cache and
        // attaches no new authorization header, so the token survives.
        let second = client
            .send_authenticated_request(
                "GET",
                &url,
                None,
                Some(BOB),
                &client_resolver,
                &Ed25519Verifier,
                5,
            )
            .await
            .unwrap();
        assert_eq!(second.status, 200);
        assert!(second.token.is_none());
        assert_eq!(client.cached_token("127.0.0.1").as_deref(), Some(&*token));
    }

    #[tokio::test]
    async fn legacy_bearer_response_is_accepted_one_way() {
        let dir = TempDir::new().unwrap();
        let alice = agent_in(&dir, "alice", ALICE);
        let resolver = DidResolver::new();

        let client = AuthClient::new(alice.claim_signer().unwrap());
        let outcome = client
            .complete_handshake("localhost", None, "bearer tok-1", &resolver, &Ed25519Verifier, 5)
            .await
            .unwrap();
        assert_eq!(outcome.token, "tok-1");
        assert_eq!(outcome.verified_resp_did, None);

        client.clear_token("localhost");
        let header = client.auth_header_for("localhost", None);
        assert!(DidAuthHeader::is_did_scheme(&header));
    }
}
