pub mod app;
pub mod auth_handlers;
pub mod config;
pub mod cookies;
pub mod credentials;
pub mod keys;
pub mod metrics;
pub mod refresh_store;
pub mod session;
pub mod tenant_handlers;
pub mod tenants;
pub mod tokens;
pub mod user_handlers;
pub mod users;

pub use app::{build_router, AppState, StateParts};
