pub mod app;
pub mod auth_handlers;
pub mod config;
pub mod metrics;
pub mod passwords;
pub mod service;
pub mod store;
pub mod tokens;
pub mod user_handlers;
pub mod validation;

pub use app::{router, AppState};
