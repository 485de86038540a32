//! API layer - HTTP endpoint handlers organized by domain.

mod board;
mod events;
mod health;
mod messages;
mod metrics;
mod routes;

// Re-export all handlers for use in server/app.rs
pub use board::{board, history, process_pending, send_digest};
pub use events::event_stream;
pub use health::{health, stats};
pub use messages::{cancel_message, clear_failed, list_messages, retry_message, send_message};
pub use metrics::prometheus_metrics;
pub use routes::api_routes;
