// Board model and collaborators
pub mod board;
pub mod client;
pub mod credentials;
pub mod network;
pub mod storage;

// Delivery core
pub mod delivery;
pub mod digest;
pub mod queue;

// Application layer
pub mod api;
pub mod server;
pub mod tasks;

// Supporting modules
pub mod config;
pub mod error;
pub mod metrics;
pub mod shutdown;
pub mod telemetry;
