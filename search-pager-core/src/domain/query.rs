use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, SearchError};

/// Largest `top` the search service accepts for a single page.
pub const MAX_PAGE_SIZE: usize = 1000;

/// Deepest `skip` the search service accepts; offset chains stop being valid past it.
pub const MAX_SKIP: usize = 100_000;

/// The concrete query issued to a [`Transport`](crate::Transport) for one page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub order_by: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub select: Vec<String>,
    pub top: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_after: Option<Vec<Value>>,
    #[serde(default)]
    pub include_total_count: bool,
}

impl SearchRequest {
    pub fn new(query_text: impl Into<String>, top: usize) -> Self {
        Self {
            query_text: query_text.into(),
            top,
            ..Default::default()
        }
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    pub fn with_order_by(mut self, order_by: Vec<String>) -> Self {
        self.order_by = order_by;
        self
    }

    pub fn with_select(mut self, select: Vec<String>) -> Self {
        self.select = select;
        self
    }

    pub fn with_skip(mut self, skip: usize) -> Self {
        self.skip = Some(skip);
        self
    }

    pub fn with_search_after(mut self, values: Vec<Value>) -> Self {
        self.search_after = Some(values);
        self
    }

    /// Checks page bounds and filter syntax before anything is sent.
    pub fn validate(&self) -> Result<()> {
        if self.top == 0 || self.top > MAX_PAGE_SIZE {
            return Err(SearchError::Validation(format!(
                "page size {} is outside 1..={}",
                self.top, MAX_PAGE_SIZE
            )));
        }

        if let Some(skip) = self.skip {
            if skip > MAX_SKIP {
                return Err(SearchError::Validation(format!(
                    "skip {} exceeds the maximum of {}; use range or search-after paging",
                    skip, MAX_SKIP
                )));
            }
        }

        if let Some(filter) = &self.filter {
            validate_filter(filter)?;
        }

        Ok(())
    }
}

/// Structural check of a filter expression: non-empty, quotes closed,
/// parentheses balanced. Grammar is the service's concern.
pub fn validate_filter(filter: &str) -> Result<()> {
    if filter.trim().is_empty() {
        return Err(SearchError::Validation("filter expression is empty".to_string()));
    }

    let mut depth: i64 = 0;
    let mut in_string = false;
    let mut chars = filter.chars().peekable();

    while let Some(c) = chars.next() {
        if in_string {
            if c == '\'' {
                // '' is an escaped quote inside a literal
                if chars.peek() == Some(&'\'') {
                    chars.next();
                } else {
                    in_string = false;
                }
            }
            continue;
        }

        match c {
            '\'' => in_string = true,
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth < 0 {
                    return Err(SearchError::Validation(format!(
                        "unbalanced ')' in filter '{}'",
                        filter
                    )));
                }
            }
            _ => {}
        }
    }

    if in_string {
        return Err(SearchError::Validation(format!(
            "unterminated string literal in filter '{}'",
            filter
        )));
    }
    if depth != 0 {
        return Err(SearchError::Validation(format!(
            "unbalanced '(' in filter '{}'",
            filter
        )));
    }

    Ok(())
}

/// Renders a key value as a filter literal: strings single-quoted with
/// embedded quotes doubled, numbers and booleans verbatim.
pub fn filter_literal(value: &Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(format!("'{}'", s.replace('\'', "''"))),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(SearchError::Validation(format!(
            "key value {} cannot be used in a range filter",
            other
        ))),
    }
}

/// AND-combines an optional user filter with an extra predicate.
pub fn and_filter(base: Option<&str>, predicate: &str) -> String {
    match base {
        Some(base) if !base.trim().is_empty() => format!("({}) and ({})", base, predicate),
        _ => predicate.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case("rating gt 3")]
    #[case("(a eq 'x') and (b eq 'it''s')")]
    #[case("name eq 'has ) paren'")]
    fn test_validate_filter_accepts(#[case] filter: &str) {
        assert!(validate_filter(filter).is_ok());
    }

    #[rstest]
    #[case("")]
    #[case("   ")]
    #[case("(a eq 1")]
    #[case("a eq 1)")]
    #[case("name eq 'open")]
    fn test_validate_filter_rejects(#[case] filter: &str) {
        assert!(matches!(validate_filter(filter), Err(SearchError::Validation(_))));
    }

    #[test]
    fn test_filter_literal_quotes_strings() {
        assert_eq!(filter_literal(&json!("o'neil")).unwrap(), "'o''neil'");
        assert_eq!(filter_literal(&json!(42)).unwrap(), "42");
        assert_eq!(filter_literal(&json!(true)).unwrap(), "true");
        assert!(filter_literal(&json!(null)).is_err());
        assert!(filter_literal(&json!([1, 2])).is_err());
    }

    #[test]
    fn test_and_filter() {
        assert_eq!(and_filter(None, "id gt 5"), "id gt 5");
        assert_eq!(and_filter(Some("  "), "id gt 5"), "id gt 5");
        assert_eq!(
            and_filter(Some("rating ge 4"), "id gt 5"),
            "(rating ge 4) and (id gt 5)"
        );
    }

    #[test]
    fn test_request_validation_bounds() {
        assert!(SearchRequest::new("q", 10).validate().is_ok());
        assert!(SearchRequest::new("q", 0).validate().is_err());
        assert!(SearchRequest::new("q", MAX_PAGE_SIZE + 1).validate().is_err());
        assert!(SearchRequest::new("q", 10).with_skip(MAX_SKIP).validate().is_ok());
        assert!(SearchRequest::new("q", 10)
            .with_skip(MAX_SKIP + 1)
            .validate()
            .is_err());
        assert!(SearchRequest::new("q", 10)
            .with_filter("(broken")
            .validate()
            .is_err());
    }
}
