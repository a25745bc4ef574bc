// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 DID Auth Server Contributors

use axum::{middleware, routing::get, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::auth::middleware::auth_middleware;
use crate::auth::resolver::{IdentityDocument, VerificationMethod};
use crate::state::AppState;

pub mod handlers;

pub fn router(state: AppState) -> Router {
    let routes = Router::new()
        .route("/status", get(handlers::status))
        .route("/wba/auth", get(handlers::auth_verify))
        .route("/wba/user/{user_id}/did.json", get(handlers::did_document))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .with_state(state);

    routes
        .merge(SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

#[derive(OpenApi)]
#[openapi(
    paths(handlers::status, handlers::auth_verify, handlers::did_document),
    components(schemas(
        handlers::StatusResponse,
        handlers::AuthVerifyResponse,
        IdentityDocument,
        VerificationMethod
    )),
    tags(
        (name = "Service", description = "Service status"),
        (name = "Auth", description = "DID handshake and token verification"),
        (name = "Identity", description = "Published DID documents")
    )
)]
struct ApiDoc;
