pub mod auth;
pub mod broadcast;
pub mod cookies;
pub mod metrics;
pub mod sessions;
pub mod shapes;
pub mod tokens;
pub mod users;
