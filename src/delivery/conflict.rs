//! Staleness check between the cached and the live board.

use std::sync::Arc;

use crate::board::BoardSnapshot;
use crate::storage::ContentCache;

/// Result of comparing a fresh snapshot with the cache.
#[derive(Debug, Clone, PartialEq)]
pub enum ConflictCheck {
    /// No cached snapshot, or content unchanged
    Clear,
    /// Board changed since it was last observed
    Conflict { previous: BoardSnapshot },
}

impl ConflictCheck {
    pub fn is_conflict(&self) -> bool {
        matches!(self, ConflictCheck::Conflict { .. })
    }
}

/// Compares freshly fetched board content against the shared cache.
///
/// Every check refreshes the cache with the fetched snapshot, whatever the
/// outcome. Whether delivery proceeds is left to the strategy.
pub struct ConflictDetector {
    cache: Arc<dyn ContentCache>,
}

impl ConflictDetector {
    pub fn new(cache: Arc<dyn ContentCache>) -> Self {
        Self { cache }
    }

    /// A conflict exists when a cached snapshot exists and its content differs.
    pub fn detect(cached: Option<&BoardSnapshot>, current: &BoardSnapshot) -> bool {
        cached.is_some_and(|cached| !cached.same_content(current))
    }

    /// Compare `current` with the cache, then store it as the last known board.
    pub async fn check(&self, current: &BoardSnapshot) -> ConflictCheck {
        let cached = match self.cache.last_known_board().await {
            Ok(cached) => cached,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read cached board, skipping conflict check");
                None
            }
        };

        if let Err(e) = self.cache.save_board(current).await {
            tracing::warn!(error = %e, "Failed to refresh cached board");
        }

        match cached {
            Some(previous) if Self::detect(Some(&previous), current) => {
                tracing::info!(
                    cached_at = %previous.captured_at,
                    "Board content changed since last sync"
                );
                ConflictCheck::Conflict { previous }
            }
            _ => ConflictCheck::Clear,
        }
    }
}
