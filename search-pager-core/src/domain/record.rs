use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Pseudo-field naming the relevance score in sort expressions.
pub const SCORE_FIELD: &str = "@search.score";

/// A single search hit: its stored fields plus the relevance score, if any.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
    #[serde(rename = "@search.score", default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn with_score(mut self, score: f64) -> Self {
        self.score = Some(score);
        self
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Value used when ordering by `field`; resolves [`SCORE_FIELD`] to the score.
    pub fn sort_value(&self, field: &str) -> Option<Value> {
        if field == SCORE_FIELD {
            self.score
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
        } else {
            self.fields.get(field).cloned()
        }
    }
}
