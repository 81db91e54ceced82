pub mod auth;
pub mod health;
pub mod metrics;
pub mod shapes;
pub mod websocket;

use axum::{
    http::{header, HeaderValue, Method},
    routing::{get, post},
    Router,
};
use tower_http::cors::{AllowHeaders, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::AppState;

pub fn router(state: AppState) -> Router {
    // Localhost is always allowed for development; anything else must be
    // listed in CORS_ALLOWED_ORIGINS.
    let allowed = state.config.cors_allowed_origins.clone();
    let cors_origin = AllowOrigin::predicate(move |origin: &HeaderValue, _| {
        let o = match origin.to_str() {
            Ok(s) => s,
            Err(_) => return false,
        };
        if o.starts_with("http://localhost") || o.starts_with("http://127.0.0.1") {
            return true;
        }
        allowed.iter().any(|a| a == o)
    });

    // Credentials must be allowed or the refresh cookie never travels.
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(AllowHeaders::list([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            header::ACCEPT,
        ]))
        .allow_credentials(true)
        .allow_origin(cors_origin);

    Router::new()
        .route("/health", get(health::health_check))
        .route("/metrics", get(metrics::metrics_handler))
        // Accounts
        .route("/api/accounts/login/", post(auth::login))
        .route("/api/accounts/logout/", post(auth::logout))
        .route("/api/accounts/token/refresh/", post(auth::refresh_token))
        .route(
            "/api/accounts/token/verify/",
            post(auth::verify_token).get(auth::verify_bearer),
        )
        .route("/api/accounts/me/", get(auth::me))
        // Shapes
        .route("/api/shapes/", get(shapes::list_shapes).post(shapes::create_shape))
        .route(
            "/api/shapes/{id}/",
            get(shapes::get_shape)
                .put(shapes::replace_shape)
                .patch(shapes::update_shape)
                .delete(shapes::delete_shape),
        )
        // WebSocket
        .route("/ws/shapes/", get(websocket::ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
