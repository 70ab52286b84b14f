use search_pager_core::{
    and_filter, filter_literal, PageCursor, Result, SearchError, SearchRequest, SortField,
    TransportResponse,
};
use serde_json::Value;
use tracing::warn;

use super::{cursor_mismatch, ChainQuery, PageStrategy};

/// Keyset paging on a sortable, unique field. The chain is ordered by the
/// key ascending and each page filters `key gt <last key>`, so the cost of a
/// page does not depend on its depth.
#[derive(Debug, Clone)]
pub struct RangePaging {
    key_field: String,
    order_by: String,
}

impl RangePaging {
    pub fn new(key_field: String, requested_order: &[String]) -> Self {
        let order_by = format!("{} asc", key_field);

        let matches = match requested_order {
            [] => true,
            [single] => SortField::parse(single).is_ok_and(|f| f == SortField::asc(&key_field)),
            _ => false,
        };
        if !matches {
            warn!(
                key = %key_field,
                requested = ?requested_order,
                "Range paging orders by its key; ignoring requested order"
            );
        }

        Self {
            key_field,
            order_by,
        }
    }

    pub fn key_field(&self) -> &str {
        &self.key_field
    }

    fn parts<'a>(&self, cursor: &'a PageCursor) -> Result<(Option<&'a Value>, usize)> {
        match cursor {
            PageCursor::Range { last_key, top } => Ok((last_key.as_ref(), *top)),
            other => Err(cursor_mismatch("range", other)),
        }
    }
}

impl PageStrategy for RangePaging {
    fn name(&self) -> &'static str {
        "range"
    }

    fn request(
        &self,
        query: &ChainQuery,
        cursor: &PageCursor,
        include_total_count: bool,
    ) -> Result<SearchRequest> {
        let (last_key, top) = self.parts(cursor)?;
        let mut request = query
            .base_request(top, include_total_count)
            .with_order_by(vec![self.order_by.clone()]);

        if let Some(key) = last_key {
            let predicate = format!("{} gt {}", self.key_field, filter_literal(key)?);
            request.filter = Some(and_filter(query.filter.as_deref(), &predicate));
        }

        Ok(request)
    }

    fn advance(
        &self,
        cursor: &PageCursor,
        response: &TransportResponse,
        _total_count: Option<u64>,
    ) -> Result<Option<PageCursor>> {
        let (previous, top) = self.parts(cursor)?;

        let Some(last) = response.records.last() else {
            return Ok(None);
        };

        let key = match last.get(&self.key_field) {
            Some(Value::Null) | None => {
                return Err(SearchError::Validation(format!(
                    "record is missing range key '{}'",
                    self.key_field
                )))
            }
            Some(key) => key.clone(),
        };

        if previous == Some(&key) {
            return Err(SearchError::Internal(format!(
                "range cursor did not advance past {}",
                key
            )));
        }

        Ok(Some(PageCursor::Range {
            last_key: Some(key),
            top,
        }))
    }
}
