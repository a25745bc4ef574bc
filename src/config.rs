// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 DID Auth Server Contributors

//! Environment-driven configuration.

use jsonwebtoken::Algorithm;

pub const ENV_HOST: &str = "HOST";
pub const ENV_PORT: &str = "PORT";
pub const ENV_DATA_DIR: &str = "DATA_DIR";
pub const ENV_NONCE_EXPIRE_MINUTES: &str = "NONCE_EXPIRE_MINUTES";
pub const ENV_TOKEN_EXPIRE_MINUTES: &str = "TOKEN_EXPIRE_MINUTES";
pub const ENV_JWT_ALGORITHM: &str = "JWT_ALGORITHM";
pub const ENV_AUTH_EXEMPT_PATHS: &str = "AUTH_EXEMPT_PATHS";
pub const ENV_LOG_FORMAT: &str = "LOG_FORMAT";

/// The handshake endpoint always authenticates, even if listed exempt.
pub const ALWAYS_AUTH_PATH: &str = "/wba/auth";

/// Paths the auth gate lets through unauthenticated by default. `*` and
/// `?` glob within a single segment or across the rest of the pattern.
pub const DEFAULT_EXEMPT_PATHS: &[&str] = &[
    "/",
    "/docs",
    "/docs/",
    "/openapi.json",
    "/status",
    "/wba/user/*",
    "/agents/*/ad.json",
];

/// Runtime settings, resolved once at startup and shared via `AppState`.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Replay-token validity window.
    pub nonce_expire_minutes: i64,
    /// Default access-token lifetime.
    pub token_expire_minutes: i64,
    /// JWT signing algorithm for access tokens.
    pub jwt_algorithm: Algorithm,
    /// Auth-exempt path patterns.
    pub exempt_paths: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            nonce_expire_minutes: 5,
            token_expire_minutes: 60,
            jwt_algorithm: Algorithm::RS256,
            exempt_paths: DEFAULT_EXEMPT_PATHS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl Settings {
    /// Read settings from the environment, falling back to defaults for
    /// anything unset or unparseable (unparseable values are logged).
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let nonce_expire_minutes = env_parse(ENV_NONCE_EXPIRE_MINUTES)
            .unwrap_or(defaults.nonce_expire_minutes);
        let token_expire_minutes = env_parse(ENV_TOKEN_EXPIRE_MINUTES)
            .unwrap_or(defaults.token_expire_minutes);
        let jwt_algorithm = env_parse(ENV_JWT_ALGORITHM).unwrap_or(defaults.jwt_algorithm);

        let exempt_paths = std::env::var(ENV_AUTH_EXEMPT_PATHS)
            .ok()
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or(defaults.exempt_paths);

        Self {
            nonce_expire_minutes,
            token_expire_minutes,
            jwt_algorithm,
            exempt_paths,
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(var = name, value = raw, "unparseable env var, using default");
            None
        }
    }
}
