//! Schedule — cron-like time trigger attached to a rule or template.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;
use crate::time::Timestamp;

/// A validated cron expression.
///
/// Accepts classic 5-field expressions (`min hour dom month dow`, minute
/// resolution) as well as the 6/7-field form with seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Schedule {
    expression: String,
    #[serde(skip)]
    parsed: cron::Schedule,
}

impl PartialEq for Schedule {
    fn eq(&self, other: &Self) -> bool {
        self.expression == other.expression
    }
}

impl Eq for Schedule {}

impl Schedule {
    /// Parse and validate a cron expression.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::InvalidSchedule`] when the expression
    /// cannot be parsed.
    pub fn parse(expression: impl Into<String>) -> Result<Self, ConfigurationError> {
        let expression = expression.into();
        let normalized = if expression.split_whitespace().count() == 5 {
            format!("0 {expression}")
        } else {
            expression.clone()
        };
        let parsed = cron::Schedule::from_str(&normalized).map_err(|err| {
            ConfigurationError::InvalidSchedule {
                expression: expression.clone(),
                reason: err.to_string(),
            }
        })?;
        Ok(Self {
            expression,
            parsed,
        })
    }

    /// The expression as written by the author.
    #[must_use]
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// Slots strictly after `after` and at or before `until`, oldest first.
    #[must_use]
    pub fn slots_between(&self, after: Timestamp, until: Timestamp) -> Vec<Timestamp> {
        self.parsed
            .after(&after)
            .take_while(|slot| *slot <= until)
            .collect()
    }

    /// The first slot strictly after `after`.
    #[must_use]
    pub fn next_after(&self, after: Timestamp) -> Option<Timestamp> {
        self.parsed.after(&after).next()
    }
}

impl TryFrom<String> for Schedule {
    type Error = ConfigurationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<Schedule> for String {
    fn from(value: Schedule) -> Self {
        value.expression
    }
}

impl std::fmt::Display for Schedule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.expression)
    }
}
