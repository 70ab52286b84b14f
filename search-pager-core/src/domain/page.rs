use serde::{Deserialize, Serialize};

use super::cursor::PageCursor;
use super::record::Record;

/// A page delivered to the caller of a result chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultPage {
    pub records: Vec<Record>,
    pub total_count: Option<u64>,
    /// 1-indexed position within the chain.
    pub page_number: usize,
    /// Cursor that produced this page.
    pub cursor: PageCursor,
    /// Cursor for the following page; `None` once the chain is exhausted.
    pub next_cursor: Option<PageCursor>,
    pub raw_cursor: Option<String>,
    pub from_cache: bool,
}

impl ResultPage {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn is_last(&self) -> bool {
        self.next_cursor.is_none()
    }

    /// Token for resuming the chain after this page.
    pub fn continuation_token(&self) -> Option<String> {
        self.next_cursor.as_ref().map(PageCursor::encode)
    }
}
