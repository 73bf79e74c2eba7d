//! HTTP 层

pub mod dto;
pub mod error;
pub mod handlers;
pub mod identity;
pub mod middleware;
pub mod range;
pub mod routes;
pub mod server;
pub mod state;

pub use server::{HttpServer, ServerConfig};
pub use state::AppState;
