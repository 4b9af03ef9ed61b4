//! Network layer for Jukebox
//!
//! The mock endpoint server, its request service, and the client used for live calls.

mod client;
mod handler;
mod http;

pub use client::{ForwardedResponse, HttpClient, OutboundRequest, Transport};
pub use handler::NetworkHandler;
pub use http::HttpHandler;

/// Graceful shutdown timeout
pub const SHUTDOWN_TIMEOUT_MS: u64 = 5000;
