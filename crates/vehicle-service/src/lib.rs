pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod state;

pub use config::{ModelBackend, ServiceConfig};
pub use error::ApiError;
pub use state::AppState;
