//! HTTP + WebSocket surface: routing, request mapping, realtime relay.

pub mod app;
pub mod context;
pub mod directory;
pub mod middleware;
pub mod ws;
