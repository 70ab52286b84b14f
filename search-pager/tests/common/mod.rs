//! In-memory search endpoint for integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use search_pager::{Record, SearchRequest, Transport, TransportError, TransportResponse};
use serde_json::Value;
use std::cmp::Ordering as CmpOrdering;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Serves a fixed dataset. Understands `skip`/`top`, `orderby`, `searchAfter`
/// and `<field> gt <number>` predicates inside the filter.
pub struct InMemoryTransport {
    records: Vec<Record>,
    failures: Mutex<VecDeque<TransportError>>,
    requests: Mutex<Vec<SearchRequest>>,
    latency: Option<Duration>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl InMemoryTransport {
    pub fn new(records: Vec<Record>) -> Self {
        Self {
            records,
            failures: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            latency: None,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
    }

    /// Records with ids `1..=n`, a name and a score that repeats every 3 ids.
    pub fn numbered(n: u64) -> Self {
        Self::new(
            (1..=n)
                .map(|id| {
                    Record::new()
                        .with_field("id", id)
                        .with_field("name", format!("item-{id}"))
                        .with_score(((id % 3) + 1) as f64)
                })
                .collect(),
        )
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// The next `count` calls fail with `error`.
    pub fn fail_next(&self, count: usize, error: TransportError) {
        let mut failures = self.failures.lock().unwrap();
        failures.extend(std::iter::repeat(error).take(count));
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<SearchRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn serve(&self, request: &SearchRequest) -> TransportResponse {
        let mut matching: Vec<Record> = self
            .records
            .iter()
            .filter(|record| passes_filter(record, request.filter.as_deref()))
            .cloned()
            .collect();

        let order: Vec<(String, bool)> = request
            .order_by
            .iter()
            .map(|term| {
                let mut parts = term.split_whitespace();
                let field = parts.next().unwrap_or_default().to_string();
                let desc = parts.next() == Some("desc");
                (field, desc)
            })
            .collect();
        if !order.is_empty() {
            matching.sort_by(|a, b| compare(a, b, &order));
        }

        let total = matching.len() as u64;

        if let Some(after) = &request.search_after {
            let position = matching.iter().position(|record| {
                let tuple: Vec<Value> = order
                    .iter()
                    .filter_map(|(field, _)| record.sort_value(field))
                    .collect();
                &tuple == after
            });
            matching = match position {
                Some(index) => matching.split_off(index + 1),
                None => Vec::new(),
            };
        }

        let records = matching
            .into_iter()
            .skip(request.skip.unwrap_or(0))
            .take(request.top)
            .collect();

        let mut response = TransportResponse::new(records);
        if request.include_total_count {
            response.total_count = Some(total);
        }
        response
    }
}

fn passes_filter(record: &Record, filter: Option<&str>) -> bool {
    let Some(filter) = filter else {
        return true;
    };

    let tokens: Vec<&str> = filter
        .split(|c: char| c.is_whitespace() || c == '(' || c == ')')
        .filter(|t| !t.is_empty())
        .collect();

    tokens.windows(3).all(|window| match window {
        [field, "gt", literal] => match (record.get(field).and_then(Value::as_f64), literal.parse::<f64>()) {
            (Some(value), Ok(bound)) => value > bound,
            _ => true,
        },
        _ => true,
    })
}

fn compare(a: &Record, b: &Record, order: &[(String, bool)]) -> CmpOrdering {
    for (field, desc) in order {
        let ordering = match (a.sort_value(field), b.sort_value(field)) {
            (Some(Value::Number(x)), Some(Value::Number(y))) => x
                .as_f64()
                .unwrap_or_default()
                .total_cmp(&y.as_f64().unwrap_or_default()),
            (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(&y),
            _ => CmpOrdering::Equal,
        };
        let ordering = if *desc { ordering.reverse() } else { ordering };
        if ordering != CmpOrdering::Equal {
            return ordering;
        }
    }
    CmpOrdering::Equal
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Transport for InMemoryTransport {
    async fn send(&self, request: &SearchRequest) -> Result<TransportResponse, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let failure = self.failures.lock().unwrap().pop_front();
        match failure {
            Some(error) => Err(error),
            None => Ok(self.serve(request)),
        }
    }

    fn endpoint(&self) -> &str {
        "in-memory"
    }
}

pub fn ids(records: &[Record]) -> Vec<u64> {
    records
        .iter()
        .filter_map(|r| r.get("id").and_then(Value::as_u64))
        .collect()
}
