pub mod server;

// Re-export the pieces embedders and tests reach for most often.
pub use server::config::{configure_app, configure_app_with_identity, AppState, Settings};
pub use server::services;
