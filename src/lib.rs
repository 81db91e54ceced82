pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;

use std::sync::Arc;

use config::Config;
use services::{
    auth::AuthService,
    broadcast::{Topic, SHAPES_TOPIC},
    sessions::SessionStore,
    shapes::{ShapeService, ShapeStore},
    tokens::TokenService,
    users::Authenticator,
};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub auth: Arc<AuthService>,
    pub shapes: Arc<ShapeService>,
    pub topic: Arc<Topic>,
}

impl AppState {
    /// Wire the services around the given stores. The topic is created here
    /// and is the only one for the life of the process.
    pub fn new(
        config: Config,
        directory: Arc<dyn Authenticator>,
        store: Arc<dyn ShapeStore>,
        sessions: Arc<SessionStore>,
    ) -> Self {
        let tokens = TokenService::new(
            &config.jwt_secret,
            &config.jwt_refresh_secret,
            config.jwt_expiry_seconds,
            config.jwt_refresh_expiry_seconds,
        );
        let auth = AuthService::new(tokens, sessions, directory, config.rotate_refresh_tokens);
        let topic = Topic::new(SHAPES_TOPIC, config.subscriber_queue_size);
        let shapes = ShapeService::new(store, topic.clone());

        Self {
            config: Arc::new(config),
            auth: Arc::new(auth),
            shapes: Arc::new(shapes),
            topic,
        }
    }
}
