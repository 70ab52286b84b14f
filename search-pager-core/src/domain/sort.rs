use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Result, SearchError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

/// One `field [asc|desc]` term of an order-by clause.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SortField {
    pub field: String,
    pub direction: SortDirection,
}

impl SortField {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Desc,
        }
    }

    /// Parses `"rating desc"`, `"id"` or `"id asc"`.
    pub fn parse(expr: &str) -> Result<Self> {
        let mut parts = expr.split_whitespace();
        let field = parts
            .next()
            .ok_or_else(|| SearchError::Validation("empty order-by term".to_string()))?;

        let direction = match parts.next().map(str::to_ascii_lowercase).as_deref() {
            None | Some("asc") => SortDirection::Asc,
            Some("desc") => SortDirection::Desc,
            Some(other) => {
                return Err(SearchError::Validation(format!(
                    "invalid sort direction '{}' in '{}'",
                    other, expr
                )))
            }
        };

        if parts.next().is_some() {
            return Err(SearchError::Validation(format!(
                "unexpected tokens in order-by term '{}'",
                expr
            )));
        }

        Ok(Self {
            field: field.to_string(),
            direction,
        })
    }
}

impl fmt::Display for SortField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.direction {
            SortDirection::Asc => write!(f, "{} asc", self.field),
            SortDirection::Desc => write!(f, "{} desc", self.field),
        }
    }
}
