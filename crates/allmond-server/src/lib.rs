//! Allmond Server
//!
//! HTTP surface over the sentiment pipeline: `/analyze`, `/health`, and
//! `/metrics`, plus the configuration and CLI the binary starts from.

pub mod cli;
pub mod config;
pub mod routes;
pub mod state;

pub use cli::Cli;
pub use config::ServiceConfig;
pub use routes::create_router;
pub use state::AppState;
