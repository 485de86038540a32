//! Message delivery: strategy, conflict checks, retries and the processing loop.
//!
//! Flow: `send_message` → queue → loop → dequeue → conflict check → post →
//! `mark_as_sent` / `mark_as_failed` → cache update → observer notification.

mod background;
mod backoff;
mod config;
mod conflict;
mod error;
mod events;
mod orchestrator;
mod state;
mod strategy;

pub use background::{BackgroundConfig, BackgroundProcessor, BackgroundRunResult};
pub use backoff::BackoffPolicy;
pub use config::DeliveryConfiguration;
pub use conflict::{ConflictCheck, ConflictDetector};
pub use error::DeliveryError;
pub use events::{DeliveryEvent, DeliveryObserver, EventBroadcaster};
pub use orchestrator::{Deadline, DeliveryOrchestrator, ProcessOutcome};
pub use state::QueueState;
pub use strategy::DeliveryStrategy;
