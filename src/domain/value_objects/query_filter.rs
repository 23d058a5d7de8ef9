use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOp {
    Eq,
    ArrayContains,
}

impl FilterOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOp::Eq => "==",
            FilterOp::ArrayContains => "array-contains",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterCondition {
    pub field: String,
    pub op: FilterOp,
    pub value: Value,
}

/// Conjunction of field conditions applied to a record's raw fields.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct QueryFilter {
    conditions: Vec<FilterCondition>,
}

impl QueryFilter {
    /// Matches every record in the collection.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn eq(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.conditions.push(FilterCondition {
            field: field.to_string(),
            op: FilterOp::Eq,
            value: value.into(),
        });
        self
    }

    pub fn array_contains(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.conditions.push(FilterCondition {
            field: field.to_string(),
            op: FilterOp::ArrayContains,
            value: value.into(),
        });
        self
    }

    pub fn conditions(&self) -> &[FilterCondition] {
        &self.conditions
    }

    pub fn matches(&self, fields: &Value) -> bool {
        self.conditions.iter().all(|cond| {
            let actual = fields.get(&cond.field);
            match cond.op {
                FilterOp::Eq => actual == Some(&cond.value),
                FilterOp::ArrayContains => actual
                    .and_then(Value::as_array)
                    .map(|items| items.contains(&cond.value))
                    .unwrap_or(false),
            }
        })
    }
}

impl fmt::Display for QueryFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.conditions.is_empty() {
            return write!(f, "*");
        }
        let parts: Vec<String> = self
            .conditions
            .iter()
            .map(|c| format!("{}{}{}", c.field, c.op.as_str(), c.value))
            .collect();
        write!(f, "{}", parts.join("&"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn eq_condition_matches_exact_field() {
        let filter = QueryFilter::all().eq("postId", "p1");
        assert!(filter.matches(&json!({"postId": "p1", "text": "hi"})));
        assert!(!filter.matches(&json!({"postId": "p2"})));
        assert!(!filter.matches(&json!({})));
    }

    #[test]
    fn array_contains_checks_membership() {
        let filter = QueryFilter::all().array_contains("users", "u1");
        assert!(filter.matches(&json!({"users": ["u1", "u2"]})));
        assert!(!filter.matches(&json!({"users": ["u2"]})));
        assert!(!filter.matches(&json!({"users": "u1"})));
    }

    #[test]
    fn empty_filter_matches_everything() {
        assert!(QueryFilter::all().matches(&json!({"anything": 1})));
    }
}
