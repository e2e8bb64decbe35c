pub mod auth;
pub mod chat;
pub mod dto;
pub mod extract;
pub mod hub;
pub mod middleware;
pub mod protocol;
pub mod rest;
pub mod sessions;
pub mod state;
pub mod ws_handler;

// Re-export what the binaries need to build and serve the application.
pub use middleware::require_auth;
pub use rest::{create_router, ApiDoc};
pub use ws_handler::ws_handler;
