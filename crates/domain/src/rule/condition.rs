//! Condition — a sandboxed predicate evaluated against an event payload.
//!
//! Conditions are a small tagged expression tree instead of free-form
//! code. Field references are dotted paths into the JSON payload
//! (`client.id`, `items.0.sku`).

use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;

/// A predicate over an event payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Condition {
    /// The value at `field` equals `value`.
    Equals {
        field: String,
        value: serde_json::Value,
    },
    /// The value at `field` is missing or differs from `value`.
    NotEquals {
        field: String,
        value: serde_json::Value,
    },
    /// Substring match on strings, membership on arrays.
    Contains {
        field: String,
        value: serde_json::Value,
    },
    /// The payload has a non-null value at `field`.
    Exists { field: String },
    And { all: Vec<Condition> },
    Or { any: Vec<Condition> },
    Not { condition: Box<Condition> },
}

impl Condition {
    /// Convenience constructor for [`Condition::Equals`].
    #[must_use]
    pub fn equals(field: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        Self::Equals {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Convenience constructor for [`Condition::Contains`].
    #[must_use]
    pub fn contains(field: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        Self::Contains {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Check the expression is well formed without evaluating it.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::MalformedCondition`] for empty field
    /// paths, empty path segments, or empty `and`/`or` groups.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        match self {
            Self::Equals { field, .. }
            | Self::NotEquals { field, .. }
            | Self::Contains { field, .. }
            | Self::Exists { field } => parse_path(field).map(|_| ()),
            Self::And { all: items } | Self::Or { any: items } => {
                ensure_non_empty(self, items)?;
                items.iter().try_for_each(Self::validate)
            }
            Self::Not { condition } => condition.validate(),
        }
    }

    /// Evaluate against a payload. Pure and side-effect free.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::MalformedCondition`] when the
    /// expression is malformed; callers must treat this as "no match".
    pub fn evaluate(&self, payload: &serde_json::Value) -> Result<bool, ConfigurationError> {
        match self {
            Self::Equals { field, value } => Ok(lookup(payload, field)? == Some(value)),
            Self::NotEquals { field, value } => Ok(lookup(payload, field)? != Some(value)),
            Self::Contains { field, value } => {
                Ok(lookup(payload, field)?.is_some_and(|actual| contains(actual, value)))
            }
            Self::Exists { field } => {
                Ok(lookup(payload, field)?.is_some_and(|actual| !actual.is_null()))
            }
            Self::And { all } => {
                ensure_non_empty(self, all)?;
                for condition in all {
                    if !condition.evaluate(payload)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Self::Or { any } => {
                ensure_non_empty(self, any)?;
                for condition in any {
                    if condition.evaluate(payload)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Self::Not { condition } => Ok(!condition.evaluate(payload)?),
        }
    }
}

/// Evaluate a list of conditions as a logical AND. Empty means "always".
///
/// # Errors
///
/// Propagates the first malformed condition.
pub fn evaluate_all(
    conditions: &[Condition],
    payload: &serde_json::Value,
) -> Result<bool, ConfigurationError> {
    for condition in conditions {
        if !condition.evaluate(payload)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn ensure_non_empty(group: &Condition, items: &[Condition]) -> Result<(), ConfigurationError> {
    if items.is_empty() {
        return Err(ConfigurationError::MalformedCondition(format!(
            "empty group in `{group}`"
        )));
    }
    Ok(())
}

fn parse_path(path: &str) -> Result<Vec<&str>, ConfigurationError> {
    if path.is_empty() {
        return Err(ConfigurationError::MalformedCondition(
            "empty field path".to_string(),
        ));
    }
    let segments: Vec<&str> = path.split('.').collect();
    if segments.iter().any(|s| s.is_empty()) {
        return Err(ConfigurationError::MalformedCondition(format!(
            "empty segment in field path `{path}`"
        )));
    }
    Ok(segments)
}

/// Resolve a dotted path. Numeric segments index into arrays.
pub(crate) fn lookup<'a>(
    payload: &'a serde_json::Value,
    path: &str,
) -> Result<Option<&'a serde_json::Value>, ConfigurationError> {
    let mut current = payload;
    for segment in parse_path(path)? {
        let next = match current {
            serde_json::Value::Object(map) => map.get(segment),
            serde_json::Value::Array(items) => {
                segment.parse::<usize>().ok().and_then(|i| items.get(i))
            }
            _ => None,
        };
        match next {
            Some(value) => current = value,
            None => return Ok(None),
        }
    }
    Ok(Some(current))
}

fn contains(haystack: &serde_json::Value, needle: &serde_json::Value) -> bool {
    match (haystack, needle) {
        (serde_json::Value::String(h), serde_json::Value::String(n)) => h.contains(n.as_str()),
        (serde_json::Value::Array(items), _) => items.contains(needle),
        _ => false,
    }
}

impl std::fmt::Display for Condition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Equals { field, value } => write!(f, "{field} == {value}"),
            Self::NotEquals { field, value } => write!(f, "{field} != {value}"),
            Self::Contains { field, value } => write!(f, "{field} contains {value}"),
            Self::Exists { field } => write!(f, "exists({field})"),
            Self::And { all } => write_group(f, "and", all),
            Self::Or { any } => write_group(f, "or", any),
            Self::Not { condition } => write!(f, "not({condition})"),
        }
    }
}

fn write_group(
    f: &mut std::fmt::Formatter<'_>,
    op: &str,
    items: &[Condition],
) -> std::fmt::Result {
    write!(f, "{op}(")?;
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{item}")?;
    }
    f.write_str(")")
}
