//! Router assembly: CORS, tracing, body limits, and the protected-vs-public
//! route split. Grounded on the teacher's `api::routes::create_router_with_config`
//! and `build_cors_layer` (spec §4.1 lists the full route table).

use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderValue, Method};
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::Level;

use crate::auth::auth_middleware;
use crate::handlers::{control, events, health, messages, runs, shutdown};
use crate::state::AppState;

const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

pub fn build_router(state: AppState) -> Router {
    let cors = build_cors_layer(&state);

    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_request(DefaultOnRequest::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    let routes = Router::new()
        .route("/v1/health", get(health::health))
        .route("/v1/info", get(health::info))
        .route("/v1/runs", post(runs::create_run).get(runs::list_runs))
        .route("/v1/runs/{id}", get(runs::get_run))
        .route("/v1/runs/{id}/events", get(events::stream_events))
        .route("/v1/runs/{id}/interrupt", post(control::interrupt_run))
        .route("/v1/runs/{id}/stop", post(control::stop_run))
        .route("/v1/runs/{id}/resume", post(control::resume_run))
        .route("/v1/runs/{id}/steer", post(control::steer_run))
        .route("/v1/runs/{id}/messages", get(messages::messages))
        .route("/v1/runs/{id}/thinking-summaries", get(messages::thinking_summaries))
        .route("/v1/shutdown", post(shutdown::shutdown))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .with_state(state);

    let content_security_policy = HeaderValue::from_static("default-src 'none'");

    Router::new()
        .merge(routes)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(SetResponseHeaderLayer::overriding(
            header::CONTENT_SECURITY_POLICY,
            content_security_policy,
        ))
        .layer(cors)
        .layer(trace_layer)
}

/// In dev mode the daemon is expected to be hit from a local web UI on an
/// arbitrary dev-server port, so any origin is allowed; in production mode
/// this is a localhost-only CLI-mediated API with no browser client, so
/// cross-origin requests are denied outright rather than maintaining an
/// allowed-origins list that has no configuration surface in this spec.
fn build_cors_layer(state: &AppState) -> CorsLayer {
    let methods = [Method::GET, Method::POST, Method::OPTIONS];
    let headers = [header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT];

    if state.dev_mode {
        tracing::warn!("CORS: dev mode, allowing any origin");
        CorsLayer::new()
            .allow_origin(AllowOrigin::any())
            .allow_methods(methods)
            .allow_headers(headers)
    } else {
        CorsLayer::new().allow_origin(AllowOrigin::exact(HeaderValue::from_static("null")))
    }
}
