// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 DID Auth Server Contributors

//! DID Auth Server - Mutual agent authentication service
//!
//! HTTP service implementing two-way `did:wba` authentication between
//! autonomous agents: signed claim verification, access-token issuance,
//! and the responder's reverse claim that makes the handshake mutual.
//!
//! ## Modules
//!
//! - `api` - HTTP API handlers (Axum)
//! - `auth` - Claim verification, tokens, handshake pipeline, client
//! - `agent` - Hosted agent identities and key material
//! - `config` - Environment-driven settings

pub mod agent;
pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod state;
