mod common;

use common::{ids, InMemoryTransport};
use futures::TryStreamExt;
use pretty_assertions::assert_eq;
use rstest::rstest;
use search_pager::{
    ClientConfig, PaginationStrategy, ResultPage, SearchClient, SearchError, SearchOptions,
    SortField,
};
use std::collections::HashSet;
use std::sync::Arc;

fn client(transport: Arc<InMemoryTransport>) -> SearchClient {
    SearchClient::builder()
        .transport(transport)
        .config(ClientConfig::default())
        .build()
        .unwrap()
}

fn by_score() -> PaginationStrategy {
    PaginationStrategy::search_after(vec![SortField::desc("@search.score"), SortField::asc("id")])
}

async fn pages(
    client: &SearchClient,
    options: &SearchOptions,
    strategy: PaginationStrategy,
) -> Vec<ResultPage> {
    client
        .search("*", options, strategy)
        .unwrap()
        .try_collect()
        .await
        .unwrap()
}

#[tokio::test]
async fn test_offset_pages_of_twenty_five_records() {
    let transport = Arc::new(InMemoryTransport::numbered(25));
    let client = client(transport.clone());

    let pages = pages(&client, &SearchOptions::new(10), PaginationStrategy::Offset).await;

    let sizes: Vec<usize> = pages.iter().map(ResultPage::len).collect();
    assert_eq!(sizes, vec![10, 10, 5]);
    assert!(pages[2].is_last());
    assert_eq!(
        pages.iter().map(|p| p.page_number).collect::<Vec<_>>(),
        vec![1, 2, 3]
    );

    let all: Vec<u64> = pages.iter().flat_map(|p| ids(&p.records)).collect();
    assert_eq!(all, (1..=25).collect::<Vec<_>>());
    assert_eq!(transport.calls(), 3);
}

#[rstest]
#[case::offset(PaginationStrategy::Offset)]
#[case::range(PaginationStrategy::range("id"))]
#[case::search_after(by_score())]
#[tokio::test]
async fn test_every_strategy_yields_each_record_once(
    #[case] strategy: PaginationStrategy,
    #[values((0, 5), (1, 5), (10, 5), (23, 5), (7, 1), (30, 50))] shape: (u64, usize),
) {
    let (total, page_size) = shape;
    let client = client(Arc::new(InMemoryTransport::numbered(total)));

    let pages = pages(&client, &SearchOptions::new(page_size), strategy).await;

    let expected_pages = (total as usize).div_ceil(page_size);
    assert_eq!(pages.len(), expected_pages);

    let seen: Vec<u64> = pages.iter().flat_map(|p| ids(&p.records)).collect();
    let unique: HashSet<u64> = seen.iter().copied().collect();
    assert_eq!(seen.len(), total as usize);
    assert_eq!(unique.len(), total as usize);
}

#[tokio::test]
async fn test_range_chain_filters_on_last_key() {
    let transport = Arc::new(InMemoryTransport::numbered(12));
    let client = client(transport.clone());
    let options = SearchOptions::new(5).with_filter("id gt 2");

    let pages = pages(&client, &options, PaginationStrategy::range("id")).await;

    let all: Vec<u64> = pages.iter().flat_map(|p| ids(&p.records)).collect();
    assert_eq!(all, (3..=12).collect::<Vec<_>>());

    let filters: Vec<Option<String>> = transport.requests().into_iter().map(|r| r.filter).collect();
    assert_eq!(
        filters,
        vec![
            Some("id gt 2".to_string()),
            Some("(id gt 2) and (id gt 7)".to_string()),
            Some("(id gt 2) and (id gt 12)".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_search_after_follows_relevance_order() {
    let client = client(Arc::new(InMemoryTransport::numbered(9)));

    let pages = pages(&client, &SearchOptions::new(4), by_score()).await;

    let all: Vec<u64> = pages.iter().flat_map(|p| ids(&p.records)).collect();
    // score 3: 2,5,8  score 2: 1,4,7  score 1: 3,6,9
    assert_eq!(all, vec![2, 5, 8, 1, 4, 7, 3, 6, 9]);
    assert_eq!(pages.len(), 3);
}

#[tokio::test]
async fn test_first_page_carries_total_count() {
    let transport = Arc::new(InMemoryTransport::numbered(25));
    let client = client(transport.clone());

    let pages = pages(&client, &SearchOptions::new(10), PaginationStrategy::Offset).await;

    assert!(pages.iter().all(|p| p.total_count == Some(25)));
    let requests = transport.requests();
    assert!(requests[0].include_total_count);
    assert!(!requests[1].include_total_count);
}

#[tokio::test]
async fn test_resume_from_continuation_token() {
    let client = client(Arc::new(InMemoryTransport::numbered(25)));
    let options = SearchOptions::new(10);

    let mut stream = client.search("*", &options, by_score()).unwrap();
    let first = stream.try_next().await.unwrap().unwrap();
    drop(stream);

    let token = first.continuation_token().unwrap();
    let rest: Vec<ResultPage> = client
        .resume(&token, "*", &options, by_score())
        .unwrap()
        .try_collect()
        .await
        .unwrap();

    let mut all = ids(&first.records);
    all.extend(rest.iter().flat_map(|p| ids(&p.records)));
    let unique: HashSet<u64> = all.iter().copied().collect();
    assert_eq!(all.len(), 25);
    assert_eq!(unique.len(), 25);
    assert_eq!(rest[0].page_number, 1);
}

#[tokio::test]
async fn test_resume_rejects_bad_tokens() {
    let client = client(Arc::new(InMemoryTransport::numbered(5)));
    let options = SearchOptions::new(10);

    assert!(matches!(
        client.resume("%%%", "*", &options, PaginationStrategy::Offset),
        Err(SearchError::InvalidCursor(_))
    ));

    let offset_token = search_pager::PageCursor::Offset { skip: 10, top: 10 }.encode();
    assert!(matches!(
        client.resume(&offset_token, "*", &options, PaginationStrategy::range("id")),
        Err(SearchError::InvalidCursor(_))
    ));
}

#[tokio::test]
async fn test_invalid_options_fail_before_any_request() {
    let transport = Arc::new(InMemoryTransport::numbered(5));
    let client = client(transport.clone());

    let bad_filter = SearchOptions::new(10).with_filter("(id gt 3");
    assert!(matches!(
        client.search("*", &bad_filter, PaginationStrategy::Offset),
        Err(SearchError::Validation(_))
    ));

    let oversized = SearchOptions::new(5000);
    assert!(client.search("*", &oversized, PaginationStrategy::Offset).is_err());

    assert!(client
        .search("*", &SearchOptions::new(10), PaginationStrategy::range("@search.score"))
        .is_err());
    assert_eq!(transport.calls(), 0);
}

#[tokio::test]
async fn test_collect_all_returns_every_record() {
    let client = client(Arc::new(InMemoryTransport::numbered(42)));

    let records = client
        .collect_all("*", &SearchOptions::new(10), PaginationStrategy::range("id"))
        .await
        .unwrap();

    assert_eq!(ids(&records), (1..=42).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_fetch_offset_pages_returns_pages_in_order() {
    let transport = Arc::new(InMemoryTransport::numbered(25));
    let client = client(transport.clone());

    let pages = client
        .fetch_offset_pages("*", &SearchOptions::new(10), 0, 5)
        .await
        .unwrap();

    let pages: Vec<ResultPage> = pages.into_iter().map(Result::unwrap).collect();
    assert_eq!(pages.iter().map(ResultPage::len).collect::<Vec<_>>(), vec![10, 10, 5]);
    assert_eq!(pages.iter().map(|p| p.page_number).collect::<Vec<_>>(), vec![1, 2, 3]);
    assert!(pages.iter().all(|p| p.total_count == Some(25)));
    assert_eq!(transport.calls(), 5);
}
