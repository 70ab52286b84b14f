use proptest::prelude::*;
use search_pager_core::*;
use serde_json::json;
use std::time::Duration;

// ===== SearchOptions Tests =====

#[test]
fn test_search_options_default() {
    let options = SearchOptions::default();

    assert_eq!(options.page_size, DEFAULT_PAGE_SIZE);
    assert!(options.filter.is_none());
    assert!(options.order_by.is_empty());
    assert!(options.cache_ttl().is_none());
    assert!(options.check().is_ok());
}

#[test]
fn test_search_options_builder() {
    let options = SearchOptions::new(25)
        .with_filter("category eq 'books'")
        .with_order_by(["rating desc", "id asc"])
        .with_select(["id", "title"])
        .with_cache_ttl(Duration::from_secs(30))
        .with_max_retries(2)
        .with_rate_limit(10, Duration::from_secs(1))
        .with_circuit_breaker(3, Duration::from_millis(5000));

    assert_eq!(options.page_size, 25);
    assert_eq!(options.cache_ttl(), Some(Duration::from_secs(30)));
    assert_eq!(options.rate_limit.unwrap().window(), Duration::from_secs(1));
    assert_eq!(options.circuit_breaker.unwrap().cooldown(), Duration::from_secs(5));
    assert_eq!(
        options.sort_fields().unwrap(),
        vec![SortField::desc("rating"), SortField::asc("id")]
    );
    assert!(options.check().is_ok());
}

#[test]
fn test_search_options_rejects_invalid_values() {
    assert!(matches!(
        SearchOptions::new(0).check(),
        Err(SearchError::Validation(_))
    ));
    assert!(SearchOptions::new(MAX_PAGE_SIZE + 1).check().is_err());
    assert!(SearchOptions::new(10).with_filter("(open").check().is_err());
    assert!(SearchOptions::new(10)
        .with_order_by(["rating sideways"])
        .check()
        .is_err());
    assert!(SearchOptions::new(10)
        .with_rate_limit(0, Duration::from_secs(1))
        .check()
        .is_err());
    assert!(SearchOptions::new(10)
        .with_circuit_breaker(0, Duration::from_secs(1))
        .check()
        .is_err());
    assert!(SearchOptions::new(10).with_max_concurrent(0).check().is_err());
}

#[test]
fn test_search_options_bounds_max_retries() {
    assert!(SearchOptions::new(10).with_max_retries(MAX_RETRIES).check().is_ok());
    assert!(matches!(
        SearchOptions::new(10).with_max_retries(MAX_RETRIES + 1).check(),
        Err(SearchError::Validation(_))
    ));
    assert!(SearchOptions::new(10)
        .with_max_retries(usize::MAX)
        .check()
        .is_err());
}

#[test]
fn test_search_options_deserialize_camel_case() {
    let options: SearchOptions = serde_json::from_value(json!({
        "pageSize": 10,
        "filter": "rating gt 3",
        "orderBy": ["rating desc"],
        "cacheTtlMs": 60000,
        "maxConcurrent": 4,
        "rateLimit": {"max": 5, "windowMs": 1000},
        "circuitBreaker": {"threshold": 3, "cooldownMs": 5000}
    }))
    .unwrap();

    assert_eq!(options.page_size, 10);
    assert_eq!(options.max_concurrent, Some(4));
    assert_eq!(options.rate_limit.unwrap().max, 5);
    assert_eq!(options.circuit_breaker.unwrap().cooldown_ms, 5000);
    assert!(options.select.is_empty());
}

// ===== ResultPage Tests =====

#[test]
fn test_result_page_continuation_token() {
    let next = PageCursor::Range {
        last_key: Some(json!("doc-10")),
        top: 10,
    };
    let page = ResultPage {
        records: vec![Record::new().with_field("id", "doc-10")],
        total_count: None,
        page_number: 1,
        cursor: PageCursor::Range { last_key: None, top: 10 },
        next_cursor: Some(next.clone()),
        raw_cursor: None,
        from_cache: false,
    };

    assert!(!page.is_last());
    assert_eq!(page.len(), 1);
    let token = page.continuation_token().unwrap();
    assert_eq!(PageCursor::decode(&token).unwrap(), next);
}

// ===== QuerySignature Properties =====

fn request_strategy() -> impl Strategy<Value = SearchRequest> {
    (
        "[a-z ]{0,24}",
        proptest::option::of("[a-z]{1,8} eq [0-9]{1,3}"),
        1usize..=MAX_PAGE_SIZE,
        proptest::option::of(0usize..=MAX_SKIP),
    )
        .prop_map(|(query_text, filter, top, skip)| SearchRequest {
            query_text,
            filter,
            top,
            skip,
            ..Default::default()
        })
}

proptest! {
    #[test]
    fn prop_signature_is_deterministic(request in request_strategy()) {
        prop_assert_eq!(QuerySignature::of(&request), QuerySignature::of(&request.clone()));
    }

    #[test]
    fn prop_page_size_change_changes_signature(request in request_strategy()) {
        let mut other = request.clone();
        other.top = if request.top == MAX_PAGE_SIZE { 1 } else { request.top + 1 };
        prop_assert_ne!(QuerySignature::of(&request), QuerySignature::of(&other));
    }

    #[test]
    fn prop_skip_change_changes_signature(request in request_strategy(), delta in 1usize..100) {
        let mut other = request.clone();
        other.skip = Some(request.skip.unwrap_or(0) + delta);
        prop_assert_ne!(QuerySignature::of(&request), QuerySignature::of(&other));
    }
}
