use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use super::query::SearchRequest;

/// Cache key for one page request.
///
/// The digest covers the normalized query text, filter, order-by, selected
/// fields, page size and the strategy-specific cursor (skip or search-after
/// values; keyset cursors are already folded into the filter). Query text
/// whitespace is collapsed and selected fields are compared as a set, so
/// requests differing only in those respects share a signature.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QuerySignature(String);

impl QuerySignature {
    pub fn of(request: &SearchRequest) -> Self {
        let mut hasher = Sha256::new();

        let query_text = request
            .query_text
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");
        write_field(&mut hasher, "q", query_text.as_bytes());

        if let Some(filter) = &request.filter {
            write_field(&mut hasher, "filter", filter.trim().as_bytes());
        }

        for term in &request.order_by {
            let term = term.split_whitespace().collect::<Vec<_>>().join(" ");
            write_field(&mut hasher, "order", term.as_bytes());
        }

        let mut select: Vec<&str> = request.select.iter().map(|s| s.trim()).collect();
        select.sort_unstable();
        select.dedup();
        for field in select {
            write_field(&mut hasher, "select", field.as_bytes());
        }

        write_field(&mut hasher, "top", request.top.to_string().as_bytes());

        if let Some(skip) = request.skip {
            write_field(&mut hasher, "skip", skip.to_string().as_bytes());
        }

        if let Some(values) = &request.search_after {
            for value in values {
                write_field(&mut hasher, "after", value.to_string().as_bytes());
            }
        }

        if request.include_total_count {
            write_field(&mut hasher, "count", b"1");
        }

        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// Tag and length prefixes keep adjacent fields from running into each other.
fn write_field(hasher: &mut Sha256, tag: &str, bytes: &[u8]) {
    hasher.update(tag.as_bytes());
    hasher.update((bytes.len() as u64).to_be_bytes());
    hasher.update(bytes);
}

impl fmt::Display for QuerySignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&SearchRequest> for QuerySignature {
    fn from(request: &SearchRequest) -> Self {
        Self::of(request)
    }
}
