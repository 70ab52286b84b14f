use futures::TryStreamExt;
use pretty_assertions::assert_eq;
use search_pager::{PaginationStrategy, ResultPage, SearchClient, SearchOptions};
use search_pager_core::{SearchRequest, Transport, TransportError};
use search_pager_http::{HttpTransport, HttpTransportConfig, DEFAULT_API_VERSION};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SEARCH_PATH: &str = "/indexes/products/docs/search";

fn transport(server: &MockServer) -> HttpTransport {
    let config = HttpTransportConfig::builder(server.uri(), "products")
        .header("api-key", "secret")
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap();
    HttpTransport::new(config).unwrap()
}

fn docs(ids: std::ops::RangeInclusive<u64>) -> Vec<Value> {
    ids.map(|id| json!({"@search.score": 1.0, "id": id, "name": format!("item-{id}")}))
        .collect()
}

#[tokio::test]
async fn test_sends_search_body_with_headers() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(SEARCH_PATH))
        .and(query_param("api-version", DEFAULT_API_VERSION))
        .and(header("api-key", "secret"))
        .and(body_partial_json(json!({
            "search": "laptop",
            "filter": "price lt 1000",
            "orderby": "price asc,id asc",
            "top": 3,
            "skip": 6,
            "count": true,
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "@odata.count": 9,
            "value": docs(7..=9),
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut request = SearchRequest::new("laptop", 3)
        .with_filter("price lt 1000")
        .with_order_by(vec!["price asc".to_string(), "id asc".to_string()])
        .with_skip(6);
    request.include_total_count = true;

    let response = transport(&server).send(&request).await.unwrap();

    assert_eq!(response.total_count, Some(9));
    assert_eq!(response.records.len(), 3);
    assert_eq!(response.records[0].get("id"), Some(&json!(7)));
    assert_eq!(response.records[0].score, Some(1.0));
}

#[tokio::test]
async fn test_error_envelope_maps_to_status_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": {"code": "InvalidRequestParameter", "message": "Invalid expression"}
        })))
        .mount(&server)
        .await;

    let err = transport(&server)
        .send(&SearchRequest::new("*", 10))
        .await
        .unwrap_err();

    assert_eq!(
        err,
        TransportError::status(400, "InvalidRequestParameter: Invalid expression")
    );
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_throttling_is_retryable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    let err = transport(&server)
        .send(&SearchRequest::new("*", 10))
        .await
        .unwrap_err();

    assert_eq!(err.status_code(), Some(429));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_slow_response_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"value": []}))
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;
    let config = HttpTransportConfig::builder(server.uri(), "products")
        .timeout(Duration::from_millis(100))
        .build()
        .unwrap();

    let err = HttpTransport::new(config)
        .unwrap()
        .send(&SearchRequest::new("*", 10))
        .await
        .unwrap_err();

    assert_eq!(err, TransportError::Timeout(Duration::from_millis(100)));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_malformed_body_is_a_decode_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let err = transport(&server)
        .send(&SearchRequest::new("*", 10))
        .await
        .unwrap_err();

    assert!(matches!(err, TransportError::Decode(_)));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_unreachable_service_is_a_network_error() {
    let config = HttpTransportConfig::builder("http://127.0.0.1:1", "products")
        .build()
        .unwrap();

    let err = HttpTransport::new(config)
        .unwrap()
        .send(&SearchRequest::new("*", 10))
        .await
        .unwrap_err();

    assert!(matches!(err, TransportError::Network(_)));
}

#[tokio::test]
async fn test_offset_chain_over_http() {
    let server = MockServer::start().await;
    for (skip, ids) in [(0, 1..=10), (10, 11..=20), (20, 21..=25)] {
        Mock::given(method("POST"))
            .and(path(SEARCH_PATH))
            .and(body_partial_json(json!({"skip": skip, "top": 10})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "@odata.count": 25,
                "value": docs(ids),
            })))
            .expect(1)
            .mount(&server)
            .await;
    }
    let client = SearchClient::builder()
        .transport(Arc::new(transport(&server)))
        .build()
        .unwrap();

    let pages: Vec<ResultPage> = client
        .search("*", &SearchOptions::new(10), PaginationStrategy::Offset)
        .unwrap()
        .try_collect()
        .await
        .unwrap();

    assert_eq!(pages.iter().map(ResultPage::len).collect::<Vec<_>>(), vec![10, 10, 5]);
    assert_eq!(pages[0].total_count, Some(25));
    assert_eq!(client.endpoint(), "products");
}

#[tokio::test]
async fn test_client_retries_unavailable_service() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"value": docs(1..=3)})))
        .mount(&server)
        .await;
    let client = SearchClient::builder()
        .transport(Arc::new(transport(&server)))
        .build()
        .unwrap();

    let records = client
        .collect_all(
            "*",
            &SearchOptions::new(10).with_max_retries(3),
            PaginationStrategy::Offset,
        )
        .await
        .unwrap();

    assert_eq!(records.len(), 3);
    assert_eq!(server.received_requests().await.unwrap().len(), 3);
}
