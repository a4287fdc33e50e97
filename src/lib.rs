// Shared infrastructure
pub mod config;
pub mod error;
pub mod metrics;

// Relay core
pub mod connection_manager;
pub mod notification;

// Application layer
pub mod api;
pub mod client;
pub mod server;
pub mod websocket;

// Supporting modules
pub mod shutdown;
pub mod tasks;
pub mod telemetry;
