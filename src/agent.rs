// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 DID Auth Server Contributors

//! Hosted agents and their on-disk identities.
//!
//! Each agent lives in its own directory under the data dir:
//!
//! ```text
//! data/
//!   alice/
//!     did_document.json      published identity document
//!     key-1_private.pem      claim-signing key (named after the key id)
//!     private_key.pem        JWT signing key
//!     public_key.pem         JWT verification key
//! ```
//!
//! The registry loads every agent directory at startup; the first one
//! loaded acts as the default responder for claims that carry the `none`
//! sentinel instead of a responder DID.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::auth::cache::TokenCache;
use crate::auth::error::AuthError;
use crate::auth::resolver::IdentityDocument;
use crate::auth::signature::ClaimSigner;

const DID_DOCUMENT_FILE: &str = "did_document.json";
const JWT_PRIVATE_KEY_FILE: &str = "private_key.pem";
const JWT_PUBLIC_KEY_FILE: &str = "public_key.pem";

/// One agent hosted by this process.
#[derive(Debug)]
pub struct LocalAgent {
    did: String,
    user_dir: PathBuf,
    verification_method: String,
    tokens: TokenCache,
}

impl LocalAgent {
    /// Load an agent from its directory. The DID and verification method
    /// come from the document; key files are resolved lazily.
    pub fn from_dir(user_dir: &Path) -> Result<Self, AuthError> {
        let document = read_document(&user_dir.join(DID_DOCUMENT_FILE))?;
        let verification_method = document
            .verification_methods
            .first()
            .map(|vm| vm.id.clone())
            .ok_or_else(|| {
                AuthError::KeyUnavailable(format!(
                    "no verification method in {}",
                    user_dir.display()
                ))
            })?;

        Ok(Self {
            did: document.id,
            user_dir: user_dir.to_path_buf(),
            verification_method,
            tokens: TokenCache::new(),
        })
    }

    pub fn did(&self) -> &str {
        &self.did
    }

    pub fn verification_method(&self) -> &str {
        &self.verification_method
    }

    pub fn tokens(&self) -> &TokenCache {
        &self.tokens
    }

    /// Re-read the published DID document from disk.
    pub fn load_document(&self) -> Result<IdentityDocument, AuthError> {
        read_document(&self.user_dir.join(DID_DOCUMENT_FILE))
    }

    /// Claim-signing key file, named after the verification method's key id
    /// fragment (`...#key-1` -> `key-1_private.pem`).
    pub fn claim_key_path(&self) -> PathBuf {
        let fragment = self
            .verification_method
            .rsplit('#')
            .next()
            .unwrap_or(&self.verification_method);
        self.user_dir.join(format!("{fragment}_private.pem"))
    }

    pub fn jwt_private_key_path(&self) -> PathBuf {
        self.user_dir.join(JWT_PRIVATE_KEY_FILE)
    }

    pub fn jwt_public_key_path(&self) -> PathBuf {
        self.user_dir.join(JWT_PUBLIC_KEY_FILE)
    }

    /// Signer for this agent's outbound claims (reverse claims included).
    pub fn claim_signer(&self) -> Result<ClaimSigner, AuthError> {
        ClaimSigner::from_pem_file(
            self.did.clone(),
            self.verification_method.clone(),
            &self.claim_key_path(),
        )
    }
}

/// All agents hosted by this process, keyed by DID.
#[derive(Default)]
pub struct AgentRegistry {
    agents: HashMap<String, Arc<LocalAgent>>,
    order: Vec<String>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, agent: LocalAgent) {
        let did = agent.did.clone();
        if !self.agents.contains_key(&did) {
            self.order.push(did.clone());
        }
        self.agents.insert(did, Arc::new(agent));
    }

    pub fn get(&self, did: &str) -> Option<Arc<LocalAgent>> {
        self.agents.get(did).cloned()
    }

    /// The responder used when a claim names no responder DID.
    pub fn default_agent(&self) -> Option<Arc<LocalAgent>> {
        self.order.first().and_then(|did| self.get(did))
    }

    pub fn dids(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// Load every subdirectory of `data_dir` that parses as an agent.
    /// Directories that fail to load are logged and skipped.
    pub fn load_from_dir(data_dir: &Path) -> Self {
        let mut registry = Self::new();
        let entries = match std::fs::read_dir(data_dir) {
            Ok(entries) => entries,
            Err(err) => {
                tracing::warn!(dir = %data_dir.display(), %err, "agent data dir not readable");
                return registry;
            }
        };

        let mut dirs: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.is_dir())
            .collect();
        dirs.sort();

        for dir in dirs {
            match LocalAgent::from_dir(&dir) {
                Ok(agent) => {
                    tracing::info!(did = agent.did(), dir = %dir.display(), "loaded agent");
                    registry.insert(agent);
                }
                Err(err) => {
                    tracing::warn!(dir = %dir.display(), %err, "skipping agent dir");
                }
            }
        }
        registry
    }
}

fn read_document(path: &Path) -> Result<IdentityDocument, AuthError> {
    let text = std::fs::read_to_string(path)
        .map_err(|err| AuthError::KeyUnavailable(format!("reading {}: {err}", path.display())))?;
    serde_json::from_str(&text)
        .map_err(|err| AuthError::KeyUnavailable(format!("parsing {}: {err}", path.display())))
}

/// Provision a complete agent directory: a fresh claim-signing keypair, a
/// JWT keypair placeholder location, and a published DID document.
///
/// Used by tests and by deployments bootstrapping a new agent. The JWT
/// keypair is not generated here; operators supply their own RSA (or EC)
/// PEM files matching the configured algorithm.
pub fn provision_agent_dir(
    user_dir: &Path,
    did: &str,
    key_fragment: &str,
) -> Result<IdentityDocument, AuthError> {
    use crate::auth::resolver::VerificationMethod;
    use crate::auth::signature::generate_signing_key;

    std::fs::create_dir_all(user_dir)
        .map_err(|err| AuthError::Internal(format!("creating {}: {err}", user_dir.display())))?;

    let (pem_text, public_key) = generate_signing_key()?;
    let key_path = user_dir.join(format!("{key_fragment}_private.pem"));
    std::fs::write(&key_path, pem_text)
        .map_err(|err| AuthError::Internal(format!("writing {}: {err}", key_path.display())))?;

    let method_id = format!("{did}#{key_fragment}");
    let document = IdentityDocument {
        id: did.to_string(),
        verification_methods: vec![VerificationMethod {
            id: method_id.clone(),
            method_type: "Ed25519VerificationKey2020".to_string(),
            controller: did.to_string(),
            public_key_base64: public_key,
        }],
        authentication: vec![method_id],
    };

    let document_path = user_dir.join(DID_DOCUMENT_FILE);
    let json = serde_json::to_string_pretty(&document)
        .map_err(|err| AuthError::Internal(format!("encoding DID document: {err}")))?;
    std::fs::write(&document_path, json).map_err(|err| {
        AuthError::Internal(format!("writing {}: {err}", document_path.display()))
    })?;

    Ok(document)
}
