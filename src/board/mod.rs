//! Board model: the fixed character grid, posted messages, and observed snapshots.

pub mod charset;

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use charset::ValidationIssue;

/// Number of rows on the board
pub const BOARD_ROWS: usize = 6;

/// Number of columns on the board
pub const BOARD_COLUMNS: usize = 22;

/// Maximum characters that fit when text flows across every row
pub const MAX_MESSAGE_LENGTH: usize = BOARD_ROWS * BOARD_COLUMNS;

/// A board layout as rows of character codes.
pub type Grid = Vec<Vec<u8>>;

/// A message ready to be posted to the board.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoardMessage {
    /// Text as submitted
    pub text: String,

    /// Resolved character grid
    pub grid: Grid,

    /// When the message was created
    pub created_at: DateTime<Utc>,

    /// Free-form annotations
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
}

impl BoardMessage {
    /// Validate text and resolve its grid.
    pub fn new(text: impl Into<String>) -> Result<Self, ValidationIssue> {
        let text = text.into();
        charset::validate(&text)?;
        Ok(Self::from_valid_text(text))
    }

    /// Build a message without validation. Unsupported characters render as blanks.
    pub fn from_valid_text(text: impl Into<String>) -> Self {
        let text = text.into();
        let grid = charset::board_layout(&text);
        Self {
            text,
            grid,
            created_at: Utc::now(),
            metadata: HashMap::new(),
        }
    }

    /// Attach a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Override the creation time.
    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }
}

/// The last observed content of the board.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoardSnapshot {
    /// Character codes, one vector per row
    pub rows: Grid,

    /// When the content was captured
    pub captured_at: DateTime<Utc>,
}

impl BoardSnapshot {
    /// Snapshot captured now.
    pub fn new(rows: Grid) -> Self {
        Self {
            rows,
            captured_at: Utc::now(),
        }
    }

    /// Snapshot of a blank board.
    pub fn blank() -> Self {
        Self::new(vec![vec![charset::BLANK; BOARD_COLUMNS]; BOARD_ROWS])
    }

    /// Whether two snapshots show the same content, ignoring capture time.
    pub fn same_content(&self, other: &BoardSnapshot) -> bool {
        self.rows == other.rows
    }

    /// Board content rendered as text.
    pub fn text(&self) -> String {
        charset::text_from_layout(&self.rows)
    }
}

/// Outcome recorded for a message in the display history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryStatus {
    Sent,
    Failed,
}

/// A message as it appears in the display history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Id of the queued message that produced this entry
    pub id: uuid::Uuid,
    pub text: String,
    pub status: HistoryStatus,
    pub timestamp: DateTime<Utc>,
}
