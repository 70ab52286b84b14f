use search_pager_core::{
    PageCursor, Result, SearchError, SearchRequest, SortField, TransportResponse,
};
use serde_json::Value;
use tracing::warn;

use super::{cursor_mismatch, ChainQuery, PageStrategy};

/// Sort-key continuation for relevance-ranked results: the next page starts
/// after the sort tuple of the last record.
#[derive(Debug, Clone)]
pub struct SearchAfterPaging {
    sort: Vec<SortField>,
    order_by: Vec<String>,
}

impl SearchAfterPaging {
    pub fn new(sort: Vec<SortField>, requested_order: &[String]) -> Self {
        let order_by: Vec<String> = sort.iter().map(ToString::to_string).collect();

        if !requested_order.is_empty() {
            let requested: Vec<SortField> = requested_order
                .iter()
                .filter_map(|term| SortField::parse(term).ok())
                .collect();
            if requested != sort {
                warn!(
                    requested = ?requested_order,
                    sort = ?order_by,
                    "Search-after paging orders by its sort; ignoring requested order"
                );
            }
        }

        Self { sort, order_by }
    }

    pub fn sort(&self) -> &[SortField] {
        &self.sort
    }

    fn parts<'a>(&self, cursor: &'a PageCursor) -> Result<(Option<&'a Vec<Value>>, usize)> {
        match cursor {
            PageCursor::SearchAfter { sort_values, top } => Ok((sort_values.as_ref(), *top)),
            other => Err(cursor_mismatch("search_after", other)),
        }
    }
}

impl PageStrategy for SearchAfterPaging {
    fn name(&self) -> &'static str {
        "search_after"
    }

    fn request(
        &self,
        query: &ChainQuery,
        cursor: &PageCursor,
        include_total_count: bool,
    ) -> Result<SearchRequest> {
        let (sort_values, top) = self.parts(cursor)?;

        if let Some(values) = sort_values {
            if values.len() != self.sort.len() {
                return Err(SearchError::InvalidCursor(format!(
                    "cursor has {} sort values for a {}-field sort",
                    values.len(),
                    self.sort.len()
                )));
            }
        }

        let request = query
            .base_request(top, include_total_count)
            .with_order_by(self.order_by.clone());

        Ok(match sort_values {
            Some(values) => request.with_search_after(values.clone()),
            None => request,
        })
    }

    fn advance(
        &self,
        cursor: &PageCursor,
        response: &TransportResponse,
        _total_count: Option<u64>,
    ) -> Result<Option<PageCursor>> {
        let (previous, top) = self.parts(cursor)?;

        if response.records.len() < top {
            return Ok(None);
        }
        let Some(last) = response.records.last() else {
            return Ok(None);
        };

        let values = self
            .sort
            .iter()
            .map(|field| {
                last.sort_value(&field.field).ok_or_else(|| {
                    SearchError::Validation(format!(
                        "record is missing sort field '{}'",
                        field.field
                    ))
                })
            })
            .collect::<Result<Vec<Value>>>()?;

        if previous == Some(&values) {
            return Err(SearchError::Internal(
                "search-after cursor did not advance".to_string(),
            ));
        }

        Ok(Some(PageCursor::SearchAfter {
            sort_values: Some(values),
            top,
        }))
    }
}
