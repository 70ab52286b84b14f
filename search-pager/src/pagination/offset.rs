use search_pager_core::{PageCursor, Result, SearchRequest, TransportResponse};

use super::{cursor_mismatch, ChainQuery, PageStrategy};

/// `skip += top` paging. Each page costs the service `skip + top` rows, so
/// latency grows with depth, and rows inserted ahead of the cursor between
/// two pages shift later pages.
#[derive(Debug, Clone, Copy, Default)]
pub struct OffsetPaging;

fn parts(cursor: &PageCursor) -> Result<(usize, usize)> {
    match cursor {
        PageCursor::Offset { skip, top } => Ok((*skip, *top)),
        other => Err(cursor_mismatch("offset", other)),
    }
}

/// Cursor for the `page_index`-th page (0-based) of an offset chain.
pub fn offset_cursor(page_index: usize, top: usize) -> PageCursor {
    PageCursor::Offset {
        skip: page_index.saturating_mul(top),
        top,
    }
}

impl PageStrategy for OffsetPaging {
    fn name(&self) -> &'static str {
        "offset"
    }

    fn request(
        &self,
        query: &ChainQuery,
        cursor: &PageCursor,
        include_total_count: bool,
    ) -> Result<SearchRequest> {
        let (skip, top) = parts(cursor)?;
        Ok(query.base_request(top, include_total_count).with_skip(skip))
    }

    fn advance(
        &self,
        cursor: &PageCursor,
        response: &TransportResponse,
        total_count: Option<u64>,
    ) -> Result<Option<PageCursor>> {
        let (skip, top) = parts(cursor)?;
        let returned = response.records.len();

        if returned < top {
            return Ok(None);
        }

        let next_skip = skip + returned;
        if total_count.is_some_and(|total| next_skip as u64 >= total) {
            return Ok(None);
        }

        Ok(Some(PageCursor::Offset {
            skip: next_skip,
            top,
        }))
    }
}
