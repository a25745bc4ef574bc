// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 DID Auth Server Contributors

//! DID document resolution.
//!
//! Resolution tries the local store first (documents of agents hosted by
//! this process), then falls back to remote `did:wba` resolution over
//! HTTPS. Any resolver failure is treated as a miss so the fallback still
//! runs; only when both paths miss does resolution fail.
//!
//! Remote documents are cached with a TTL. Entries older than the TTL are
//! refetched on demand.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use utoipa::ToSchema;

use super::error::AuthError;

/// Default remote-document cache TTL (5 minutes).
const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

/// A public key entry in a DID document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct VerificationMethod {
    pub id: String,
    #[serde(rename = "type")]
    pub method_type: String,
    pub controller: String,
    #[serde(rename = "publicKeyBase64")]
    pub public_key_base64: String,
}

/// The subset of a DID document this service reads.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct IdentityDocument {
    pub id: String,
    #[serde(rename = "verificationMethod")]
    pub verification_methods: Vec<VerificationMethod>,
    #[serde(default)]
    pub authentication: Vec<String>,
}

impl IdentityDocument {
    /// Look up a verification method by full id or `#fragment`.
    pub fn verification_method(&self, key_id: &str) -> Option<&VerificationMethod> {
        self.verification_methods.iter().find(|vm| {
            vm.id == key_id
                || key_id
                    .strip_prefix('#')
                    .is_some_and(|fragment| vm.id.ends_with(&format!("#{fragment}")))
        })
    }
}

struct CacheEntry {
    document: IdentityDocument,
    fetched_at: Instant,
}

/// Local-then-remote DID resolver with a TTL'd remote cache.
pub struct DidResolver {
    local: RwLock<HashMap<String, Arc<IdentityDocument>>>,
    cache: RwLock<HashMap<String, CacheEntry>>,
    cache_ttl: Duration,
    client: reqwest::Client,
}

impl Default for DidResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl DidResolver {
    pub fn new() -> Self {
        Self {
            local: RwLock::new(HashMap::new()),
            cache: RwLock::new(HashMap::new()),
            cache_ttl: DEFAULT_CACHE_TTL,
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .expect("Failed to create HTTP client"),
        }
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Register a locally hosted document; local hits never touch the
    /// network.
    pub async fn register_local(&self, document: IdentityDocument) {
        let mut local = self.local.write().await;
        local.insert(document.id.clone(), Arc::new(document));
    }

    /// Resolve a DID, local store first, remote second. Resolver errors on
    /// either path are misses; both missing is `IdentityUnresolved`.
    pub async fn resolve(&self, did: &str) -> Result<Arc<IdentityDocument>, AuthError> {
        if let Some(document) = self.local.read().await.get(did) {
            return Ok(document.clone());
        }

        match self.resolve_remote(did).await {
            Ok(document) => Ok(document),
            Err(err) => {
                tracing::warn!(did, %err, "remote DID resolution failed");
                Err(AuthError::IdentityUnresolved(did.to_string()))
            }
        }
    }

    async fn resolve_remote(&self, did: &str) -> Result<Arc<IdentityDocument>, AuthError> {
        {
            let cache = self.cache.read().await;
            if let Some(entry) = cache.get(did) {
                if entry.fetched_at.elapsed() < self.cache_ttl {
                    return Ok(Arc::new(entry.document.clone()));
                }
            }
        }

        let url = url_for_did(did)
            .ok_or_else(|| AuthError::IdentityUnresolved(format!("unsupported DID: {did}")))?;

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|err| AuthError::Internal(format!("fetching {url}: {err}")))?;

        if !response.status().is_success() {
            return Err(AuthError::Internal(format!(
                "HTTP {} from {url}",
                response.status()
            )));
        }

        let document: IdentityDocument = response
            .json()
            .await
            .map_err(|err| AuthError::Internal(format!("decoding document from {url}: {err}")))?;

        {
            let mut cache = self.cache.write().await;
            cache.insert(
                did.to_string(),
                CacheEntry {
                    document: document.clone(),
                    fetched_at: Instant::now(),
                },
            );
        }

        Ok(Arc::new(document))
    }
}

/// Map a `did:wba` identifier to its document URL.
///
/// `did:wba:example.com%3A8000:wba:user:abc` becomes
/// `https://example.com:8000/wba/user/abc/did.json`; a DID with no path
/// segments resolves at `/.well-known/did.json`. Local hosts use plain
/// HTTP so development setups work without certificates.
pub fn url_for_did(did: &str) -> Option<String> {
    let mut parts = did.split(':');
    if parts.next() != Some("did") || parts.next() != Some("wba") {
        return None;
    }

    let host = parts.next()?.replace("%3A", ":").replace("%3a", ":");
    if host.is_empty() {
        return None;
    }

    let hostname = host.split(':').next().unwrap_or(&host);
    let scheme = if hostname == "localhost" || hostname.starts_with("127.") {
        "http"
    } else {
        "https"
    };

    let segments: Vec<&str> = parts.collect();
    let path = if segments.is_empty() {
        "/.well-known/did.json".to_string()
    } else {
        format!("/{}/did.json", segments.join("/"))
    };

    Some(format!("{scheme}://{host}{path}"))
}
