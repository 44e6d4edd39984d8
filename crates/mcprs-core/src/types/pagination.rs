//! Cursor-based pagination shared by every `*/list` endpoint.

use serde::{Deserialize, Serialize};

use super::core::Cursor;

/// Common request shape for cursor-paginated list endpoints.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PaginatedRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<Cursor>,
}

/// Common result shape for cursor-paginated list endpoints.
///
/// Iteration ends when `next_cursor` is absent. The cursor value is opaque to the
/// client; servers are free to encode offsets, ids, or signed tokens into it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginatedResult<T> {
    pub items: Vec<T>,
    #[serde(rename = "nextCursor", skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<Cursor>,
}

impl<T> PaginatedResult<T> {
    #[must_use]
    pub fn new(items: Vec<T>) -> Self {
        Self {
            items,
            next_cursor: None,
        }
    }

    #[must_use]
    pub fn with_next_cursor(items: Vec<T>, next_cursor: Cursor) -> Self {
        Self {
            items,
            next_cursor: Some(next_cursor),
        }
    }

    #[must_use]
    pub const fn has_more(&self) -> bool {
        self.next_cursor.is_some()
    }
}
