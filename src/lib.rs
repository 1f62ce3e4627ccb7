//! http-svr - embedded HTTP/1.x server core
//!
//! Turns per-connection byte streams into requests for a single handler,
//! pools per-connection state and reaps idle connections.

pub mod config;
pub mod http;
pub mod server;
