//! token_api_rust - Token listing API, refresh loop and live price-update stream

pub mod api;
pub mod config;
pub mod ws;

pub use api::{create_router, AppState};
pub use config::Config;
