use axum::{
    Router,
    http::{HeaderValue, Method, header},
    middleware,
    routing::{get, post},
};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

use crate::auth::middleware::auth_middleware;
use crate::infra::app_state::AppState;
use crate::infra::config::CorsConfig;
use crate::playback::handlers as playback_handlers;
use crate::stream::handlers as stream_handlers;

/// Build the full application router.
pub fn create_router(state: AppState) -> Router {
    let protected = Router::new()
        .route(
            "/audio/{book_id}/{file_id}",
            get(stream_handlers::stream_audio_handler),
        )
        .route(
            "/audio/{book_id}/{file_id}/transcode/{*path}",
            get(stream_handlers::hls_artifact_handler),
        )
        .route("/playback/prepare", post(playback_handlers::prepare_handler))
        .route(
            "/transcode/jobs/{id}",
            get(playback_handlers::job_status_handler),
        )
        .route(
            "/transcode/jobs/{id}/priority",
            post(playback_handlers::reprioritize_handler),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let cors = cors_layer(&state.config.cors);

    Router::new()
        .route("/health", get(playback_handlers::health_handler))
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn cors_layer(config: &CorsConfig) -> CorsLayer {
    let methods = [Method::GET, Method::HEAD, Method::POST, Method::OPTIONS];
    let headers = [header::AUTHORIZATION, header::CONTENT_TYPE, header::RANGE];

    let allow_origin = if config.is_wildcard_included() {
        AllowOrigin::any()
    } else {
        let origins: Vec<HeaderValue> = config
            .allowed_origins
            .iter()
            .filter_map(|s| HeaderValue::from_str(s.trim()).ok())
            .collect();
        AllowOrigin::list(origins)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(methods)
        .allow_headers(headers)
        .expose_headers([
            header::CONTENT_RANGE,
            header::ACCEPT_RANGES,
            header::CONTENT_LENGTH,
        ])
}
