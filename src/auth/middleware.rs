// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 DID Auth Server Contributors

//! Authentication gate.
//!
//! Applied to the whole router; exempt paths pass through untouched, the
//! handshake endpoint always authenticates, and everything else requires
//! either a `DIDWba` claim or a bearer token in the `authorization`
//! header. Successful requests carry an [`AuthenticatedAgent`] extension
//! into their handler, and DID-claim responses get the handshake result
//! attached to their `authorization` response header.

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, header::HOST, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::config::ALWAYS_AUTH_PATH;
use crate::state::AppState;

use super::error::AuthError;
use super::handshake::{handle_bearer_claim, handle_did_claim};
use super::header::{DidAuthHeader, HandshakeResult, REQ_DID_HEADER, RESP_DID_HEADER};

/// Identity of the authenticated requester, attached as a request
/// extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedAgent {
    pub req_did: String,
    /// Responder the request was addressed to; `None` on one-way claims.
    pub resp_did: Option<String>,
}

/// Axum middleware enforcing authentication on non-exempt paths.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();

    if path != ALWAYS_AUTH_PATH && is_exempt(&path, &state.settings.exempt_paths) {
        return next.run(request).await;
    }

    match authenticate(&state, &mut request).await {
        Ok((agent, handshake)) => {
            request.extensions_mut().insert(agent);
            let mut response = next.run(request).await;

            if let Some(result) = handshake {
                attach_result_header(&mut response, &result);
            }
            response
        }
        Err(err) => {
            tracing::warn!(path, error_code = err.error_code(), %err, "authentication failed");
            err.into_response()
        }
    }
}

/// Run the appropriate verification pipeline for the request's
/// `authorization` header.
///
/// Takes the request mutably so the future stays `Send`: the body type is
/// `!Sync`, which makes a shared borrow unusable across await points.
async fn authenticate(
    state: &AppState,
    request: &mut Request,
) -> Result<(AuthenticatedAgent, Option<HandshakeResult>), AuthError> {
    let authorization = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or(AuthError::MissingHeader)?;

    if DidAuthHeader::is_did_scheme(authorization) {
        let domain = service_domain(request)?;
        let result = handle_did_claim(state, authorization, &domain).await?;
        let agent = AuthenticatedAgent {
            req_did: result.req_did.clone(),
            resp_did: result.resp_did.clone(),
        };
        Ok((agent, Some(result)))
    } else {
        let req_did = required_header(request, REQ_DID_HEADER)?;
        let resp_did = required_header(request, RESP_DID_HEADER)?;
        let verified = handle_bearer_claim(state, authorization, &req_did, &resp_did)?;
        let agent = AuthenticatedAgent {
            req_did: verified.req_did,
            resp_did: Some(verified.resp_did),
        };
        Ok((agent, None))
    }
}

/// Hostname the claim must be scoped to, from the request's `host` header
/// with any port stripped.
fn service_domain(request: &Request) -> Result<String, AuthError> {
    let host = request
        .headers()
        .get(HOST)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| AuthError::MalformedHeader("missing host header".into()))?;
    Ok(host.split(':').next().unwrap_or(host).to_string())
}

fn required_header(request: &Request, name: &str) -> Result<String, AuthError> {
    request
        .headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
        .ok_or_else(|| AuthError::MalformedHeader(format!("missing header '{name}'")))
}

fn attach_result_header(response: &mut Response, result: &HandshakeResult) {
    match result
        .authorization_header()
        .ok()
        .and_then(|value| HeaderValue::from_str(&value).ok())
    {
        Some(value) => {
            response.headers_mut().insert(AUTHORIZATION, value);
        }
        None => {
            tracing::warn!(req_did = result.req_did, "handshake result not header-encodable");
        }
    }
}

/// Whether a path matches any exempt pattern. The bare root pattern `/`
/// only matches the root itself; other patterns match exactly, as a
/// directory prefix when they end in `/`, or as a glob.
pub fn is_exempt(path: &str, patterns: &[String]) -> bool {
    patterns.iter().any(|pattern| match pattern.as_str() {
        "/" => path == "/",
        p if p.ends_with('/') => path.starts_with(p),
        p => path == p || glob_match(p, path),
    })
}

/// Minimal glob: `*` matches any run of characters, `?` matches one.
fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();

    let (mut p, mut t) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while t < text.len() {
        if p < pattern.len() && (pattern[p] == '?' || pattern[p] == text[t]) {
            p += 1;
            t += 1;
        } else if p < pattern.len() && pattern[p] == '*' {
            star = Some((p, t));
            p += 1;
        } else if let Some((star_p, star_t)) = star {
            // Backtrack: let the last `*` swallow one more character.
            p = star_p + 1;
            t = star_t + 1;
            star = Some((star_p, star_t + 1));
        } else {
            return false;
        }
    }

    while p < pattern.len() && pattern[p] == '*' {
        p += 1;
    }
    p == pattern.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patterns(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn glob_matches_segments_and_rests() {
        assert!(glob_match("/wba/user/*", "/wba/user/alice/did.json"));
        assert!(glob_match("/agents/*/ad.json", "/agents/alice/ad.json"));
        assert!(!glob_match("/agents/*/ad.json", "/agents/alice/other.json"));
        assert!(glob_match("/v?", "/v1"));
        assert!(!glob_match("/v?", "/v10"));
        assert!(glob_match("*", "/anything/at/all"));
    }

    #[test]
    fn root_pattern_matches_only_root() {
        let exempt = patterns(&["/"]);
        assert!(is_exempt("/", &exempt));
        assert!(!is_exempt("/anything", &exempt));
    }

    #[test]
    fn exact_and_prefix_patterns() {
        let exempt = patterns(&["/status", "/docs/"]);
        assert!(is_exempt("/status", &exempt));
        assert!(!is_exempt("/status/deep", &exempt));
        assert!(is_exempt("/docs/index.html", &exempt));
        assert!(!is_exempt("/docs", &exempt));
    }

    #[test]
    fn default_patterns_cover_published_documents() {
        let exempt = patterns(crate::config::DEFAULT_EXEMPT_PATHS);
        assert!(is_exempt("/wba/user/alice/did.json", &exempt));
        assert!(is_exempt("/status", &exempt));
        assert!(is_exempt("/openapi.json", &exempt));
        assert!(!is_exempt("/wba/auth", &exempt));
        assert!(!is_exempt("/api/private", &exempt));
    }
}
