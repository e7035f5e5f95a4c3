// Shared infrastructure
pub mod config;
pub mod error;
pub mod metrics;

// Collaboration domain
pub mod connection_manager;
pub mod hub;
pub mod notification;
pub mod ratelimit;

// Application layer
pub mod api;
pub mod server;
pub mod websocket;

// Supporting modules
pub mod shutdown;
pub mod tasks;
pub mod telemetry;
