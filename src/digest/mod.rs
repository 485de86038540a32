//! Burst coalescing: many near-simultaneous messages become one digest.
//!
//! A digest is itself an ordinary [`BoardMessage`]; nothing here touches the
//! queue. Callers decide whether to send a digest instead of the individual
//! messages.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::board::{BoardMessage, HistoryEntry, BOARD_COLUMNS, BOARD_ROWS};
use crate::queue::QueuedMessage;

const BULLET: &str = "- ";
const ELLIPSIS: &str = "...";

/// Digest behaviour settings.
#[derive(Debug, Clone, PartialEq)]
pub struct DigestConfig {
    /// Messages closer together than this form a burst
    pub burst_window: Duration,
    /// Most recent messages considered for a digest
    pub max_messages_in_digest: usize,
    /// Characters of message text per bullet line
    pub max_characters_per_line: usize,
    /// History window examined by `analyze_history`
    pub recent_window: Duration,
    /// Minimum recent messages before a digest is sent
    pub min_messages_for_digest: usize,
    /// Rows available on the board
    pub rows: usize,
    /// Columns available on the board
    pub columns: usize,
}

impl Default for DigestConfig {
    fn default() -> Self {
        Self {
            burst_window: Duration::from_secs(120),
            max_messages_in_digest: 4,
            max_characters_per_line: 20,
            recent_window: Duration::from_secs(300),
            min_messages_for_digest: 3,
            rows: BOARD_ROWS,
            columns: BOARD_COLUMNS,
        }
    }
}

/// Anything with text and a timestamp can be digested.
pub trait DigestSource {
    fn digest_text(&self) -> &str;
    fn digest_timestamp(&self) -> DateTime<Utc>;
}

impl DigestSource for BoardMessage {
    fn digest_text(&self) -> &str {
        &self.text
    }

    fn digest_timestamp(&self) -> DateTime<Utc> {
        self.created_at
    }
}

impl DigestSource for HistoryEntry {
    fn digest_text(&self) -> &str {
        &self.text
    }

    fn digest_timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

impl DigestSource for QueuedMessage {
    fn digest_text(&self) -> &str {
        self.text()
    }

    fn digest_timestamp(&self) -> DateTime<Utc> {
        self.message.created_at
    }
}

/// Builds digests from bursts of messages.
#[derive(Debug, Clone, Default)]
pub struct BurstDigestService {
    config: DigestConfig,
}

impl BurstDigestService {
    pub fn new(config: DigestConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DigestConfig {
        &self.config
    }

    /// At least two messages, all within `burst_window` of each other.
    pub fn is_burst<T: DigestSource>(&self, messages: &[T]) -> bool {
        if messages.len() < 2 {
            return false;
        }

        let timestamps = messages.iter().map(|m| m.digest_timestamp());
        let (Some(oldest), Some(newest)) = (timestamps.clone().min(), timestamps.max()) else {
            return false;
        };

        let window = chrono::Duration::from_std(self.config.burst_window)
            .unwrap_or_else(|_| chrono::Duration::zero());
        newest - oldest <= window
    }

    /// Combine messages into one board-sized digest. `None` for no messages.
    ///
    /// The header counts every message; the most recent ones are listed as
    /// bullets and any overflow collapses into a `...+K MORE` line.
    pub fn create_digest<T: DigestSource>(&self, messages: &[T]) -> Option<BoardMessage> {
        if messages.is_empty() {
            return None;
        }

        let mut recent: Vec<&T> = messages.iter().collect();
        recent.sort_by_key(|m| std::cmp::Reverse(m.digest_timestamp()));

        let text = self.format_digest(&recent);
        let digest = BoardMessage::from_valid_text(text)
            .with_metadata("digest_message_count", messages.len().to_string())
            .with_metadata("digest_created_at", Utc::now().to_rfc3339());

        tracing::debug!(messages = messages.len(), "Created message digest");
        Some(digest)
    }

    /// Digest only when the messages form a burst.
    pub fn create_digest_if_burst<T: DigestSource>(&self, messages: &[T]) -> Option<BoardMessage> {
        if self.is_burst(messages) {
            self.create_digest(messages)
        } else {
            None
        }
    }

    /// Select history within `recent_window` and report whether it is a burst.
    pub fn analyze_history<T: DigestSource + Clone>(&self, history: &[T]) -> (bool, Vec<T>) {
        self.analyze_history_at(history, Utc::now())
    }

    /// [`analyze_history`](Self::analyze_history) relative to `now`.
    pub fn analyze_history_at<T: DigestSource + Clone>(
        &self,
        history: &[T],
        now: DateTime<Utc>,
    ) -> (bool, Vec<T>) {
        let window = chrono::Duration::from_std(self.config.recent_window)
            .unwrap_or_else(|_| chrono::Duration::zero());
        let cutoff = now - window;

        let recent: Vec<T> = history
            .iter()
            .filter(|m| m.digest_timestamp() >= cutoff)
            .cloned()
            .collect();

        (self.is_burst(&recent), recent)
    }

    fn format_digest<T: DigestSource>(&self, messages: &[&T]) -> String {
        let total = messages.len();
        let header = if total == 1 {
            "1 UPDATE".to_string()
        } else {
            format!("{} UPDATES", total)
        };

        let mut lines = vec![center(&header, self.config.columns), String::new()];

        let body_rows = self.config.rows.saturating_sub(lines.len());
        let listed = self.config.max_messages_in_digest.min(body_rows);

        if total <= listed {
            lines.extend(messages.iter().map(|m| self.format_line(m.digest_text())));
        } else if listed > 0 {
            let shown = listed - 1;
            lines.extend(
                messages
                    .iter()
                    .take(shown)
                    .map(|m| self.format_line(m.digest_text())),
            );
            lines.push(format!("{}+{} MORE", ELLIPSIS, total - shown));
        }

        while lines.len() < self.config.rows {
            lines.push(String::new());
        }

        lines.join("\n")
    }

    fn format_line(&self, text: &str) -> String {
        let cleaned: String = text
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_uppercase();

        let max = self.config.max_characters_per_line;
        let truncated = if cleaned.chars().count() > max {
            let keep = max.saturating_sub(ELLIPSIS.len());
            let mut s: String = cleaned.chars().take(keep).collect();
            s.push_str(ELLIPSIS);
            s
        } else {
            cleaned
        };

        format!("{}{}", BULLET, truncated)
    }
}

fn center(text: &str, width: usize) -> String {
    let trimmed = text.trim();
    let len = trimmed.chars().count();
    if len >= width {
        return trimmed.to_string();
    }
    format!("{}{}", " ".repeat((width - len) / 2), trimmed)
}
