pub mod auth;
pub mod event;
pub mod shape;
pub mod user;
