use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use super::record::SCORE_FIELD;
use super::sort::SortField;
use crate::error::{Result, SearchError};

/// How a result chain is paged. Chosen once when a chain is started.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PaginationStrategy {
    /// `skip += top` per page. Latency grows with depth on large result sets.
    Offset,
    /// Keyset paging on a sortable, unique field: `key gt <last key>`.
    Range { key_field: String },
    /// Sort-key continuation for relevance-ranked results. The sort must end
    /// in a unique tiebreaker.
    SearchAfter { sort: Vec<SortField> },
}

impl PaginationStrategy {
    pub fn range(key_field: impl Into<String>) -> Self {
        PaginationStrategy::Range {
            key_field: key_field.into(),
        }
    }

    pub fn search_after(sort: Vec<SortField>) -> Self {
        PaginationStrategy::SearchAfter { sort }
    }

    pub fn name(&self) -> &'static str {
        match self {
            PaginationStrategy::Offset => "offset",
            PaginationStrategy::Range { .. } => "range",
            PaginationStrategy::SearchAfter { .. } => "search_after",
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            PaginationStrategy::Offset => Ok(()),
            PaginationStrategy::Range { key_field } => {
                if key_field.trim().is_empty() {
                    return Err(SearchError::Validation(
                        "range pagination requires a key field".to_string(),
                    ));
                }
                if key_field == SCORE_FIELD {
                    return Err(SearchError::Validation(
                        "relevance score is not a unique key; use search-after paging".to_string(),
                    ));
                }
                Ok(())
            }
            PaginationStrategy::SearchAfter { sort } => {
                let Some(last) = sort.last() else {
                    return Err(SearchError::Validation(
                        "search-after pagination requires a sort".to_string(),
                    ));
                };
                if last.field == SCORE_FIELD {
                    return Err(SearchError::Validation(
                        "search-after sort must end with a unique tiebreaker field".to_string(),
                    ));
                }
                Ok(())
            }
        }
    }

    /// Cursor for the first page of a chain.
    pub fn initial_cursor(&self, top: usize) -> PageCursor {
        match self {
            PaginationStrategy::Offset => PageCursor::Offset { skip: 0, top },
            PaginationStrategy::Range { .. } => PageCursor::Range { last_key: None, top },
            PaginationStrategy::SearchAfter { .. } => PageCursor::SearchAfter {
                sort_values: None,
                top,
            },
        }
    }
}

impl fmt::Display for PaginationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Position of a page within its chain. Immutable; the next cursor is
/// derived from the last record of the current page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PageCursor {
    Offset {
        skip: usize,
        top: usize,
    },
    Range {
        last_key: Option<Value>,
        top: usize,
    },
    SearchAfter {
        sort_values: Option<Vec<Value>>,
        top: usize,
    },
}

impl PageCursor {
    pub fn top(&self) -> usize {
        match self {
            PageCursor::Offset { top, .. }
            | PageCursor::Range { top, .. }
            | PageCursor::SearchAfter { top, .. } => *top,
        }
    }

    pub fn strategy_name(&self) -> &'static str {
        match self {
            PageCursor::Offset { .. } => "offset",
            PageCursor::Range { .. } => "range",
            PageCursor::SearchAfter { .. } => "search_after",
        }
    }

    /// Whether this cursor can drive a chain of the given strategy.
    pub fn matches(&self, strategy: &PaginationStrategy) -> bool {
        self.strategy_name() == strategy.name()
    }

    /// Opaque, URL-safe token for resuming a chain later.
    pub fn encode(&self) -> String {
        // Serializing a cursor cannot fail: all keys are strings.
        let json = serde_json::to_vec(self).unwrap_or_default();
        URL_SAFE_NO_PAD.encode(json)
    }

    pub fn decode(token: &str) -> Result<Self> {
        let bytes = URL_SAFE_NO_PAD
            .decode(token.trim())
            .map_err(|e| SearchError::InvalidCursor(e.to_string()))?;
        let cursor: PageCursor = serde_json::from_slice(&bytes)?;

        if cursor.top() == 0 {
            return Err(SearchError::InvalidCursor("cursor page size is zero".to_string()));
        }

        Ok(cursor)
    }
}
