//! Selectors: the base addressable unit of a query
//!
//! ```text
//! 'base'.'cpu'.'system' FROM 'myorg'
//! ALL FROM 'myorg' WHERE dl:'source' = 'agent1' SHIFT BY 1h
//! ```

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::sync::Arc;

use crate::query::condition::{Combinator, Condition};
use crate::query::error::{QueryError, QueryResult};

/// Keyword selecting every metric of a collection
pub const ALL: &str = "ALL";

/// Metric path of a selector
///
/// Either a non-empty sequence of path segments or the ALL marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Metric {
    All,
    Path(Vec<String>),
}

impl Metric {
    /// Build a metric path, failing on an empty sequence
    pub fn path<I, S>(segments: I) -> QueryResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let segments: Vec<String> = segments.into_iter().map(Into::into).collect();
        if segments.is_empty() {
            return Err(QueryError::InvalidMetric(
                "metric path must not be empty".to_string(),
            ));
        }
        Ok(Self::Path(segments))
    }

    pub fn is_all(&self) -> bool {
        matches!(self, Self::All)
    }
}

impl std::str::FromStr for Metric {
    type Err = QueryError;

    /// Only the ALL keyword (any case) is accepted as a bare string
    fn from_str(s: &str) -> QueryResult<Self> {
        if s.eq_ignore_ascii_case(ALL) {
            Ok(Self::All)
        } else {
            Err(QueryError::InvalidMetric(format!(
                "expected a metric path or ALL, got '{}'",
                s
            )))
        }
    }
}

impl TryFrom<&str> for Metric {
    type Error = QueryError;

    fn try_from(s: &str) -> QueryResult<Self> {
        s.parse()
    }
}

impl<const N: usize> TryFrom<[&str; N]> for Metric {
    type Error = QueryError;

    fn try_from(segments: [&str; N]) -> QueryResult<Self> {
        Self::path(segments)
    }
}

impl TryFrom<&[&str]> for Metric {
    type Error = QueryError;

    fn try_from(segments: &[&str]) -> QueryResult<Self> {
        Self::path(segments.iter().copied())
    }
}

impl TryFrom<Vec<String>> for Metric {
    type Error = QueryError;

    fn try_from(segments: Vec<String>) -> QueryResult<Self> {
        Self::path(segments)
    }
}

impl TryFrom<Vec<&str>> for Metric {
    type Error = QueryError;

    fn try_from(segments: Vec<&str>) -> QueryResult<Self> {
        Self::path(segments)
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str(ALL),
            Self::Path(segments) => {
                for (i, segment) in segments.iter().enumerate() {
                    if i > 0 {
                        f.write_str(".")?;
                    }
                    write!(f, "'{}'", segment)?;
                }
                Ok(())
            }
        }
    }
}

// JSON form: `"ALL"` or `["base", "cpu"]`, validated on the way in.
impl Serialize for Metric {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::All => serializer.serialize_str(ALL),
            Self::Path(segments) => segments.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for Metric {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Keyword(String),
            Path(Vec<String>),
        }

        let metric = match Raw::deserialize(deserializer)? {
            Raw::Keyword(s) => s.parse(),
            Raw::Path(segments) => Metric::path(segments),
        };
        metric.map_err(serde::de::Error::custom)
    }
}

/// Offset modifier; the offset is an opaque duration token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timeshift {
    pub offset: String,
}

impl Timeshift {
    pub fn new(offset: impl Into<String>) -> Self {
        Self {
            offset: offset.into(),
        }
    }
}

impl fmt::Display for Timeshift {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SHIFT BY {}", self.offset)
    }
}

/// `metric FROM 'collection' [WHERE condition] [SHIFT BY offset]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Selector {
    pub collection: String,
    pub metric: Metric,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Arc<Condition>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeshift: Option<Timeshift>,
}

impl Selector {
    /// Create a selector; fails unless `metric` is a non-empty path or ALL
    pub fn new<M>(collection: impl Into<String>, metric: M) -> QueryResult<Self>
    where
        M: TryInto<Metric>,
        QueryError: From<M::Error>,
    {
        Ok(Self {
            collection: collection.into(),
            metric: metric.try_into()?,
            condition: None,
            timeshift: None,
        })
    }

    /// Replace the condition
    pub fn where_(&self, condition: impl Into<Arc<Condition>>) -> Self {
        Self {
            condition: Some(condition.into()),
            ..self.clone()
        }
    }

    /// Combine with the existing condition, or set it if there is none
    pub fn combine_where(&self, condition: impl Into<Arc<Condition>>, op: Combinator) -> Self {
        let condition = condition.into();
        let combined = match &self.condition {
            Some(existing) => Arc::new(existing.combine(condition, op)),
            None => condition,
        };
        Self {
            condition: Some(combined),
            ..self.clone()
        }
    }

    pub fn and_where(&self, condition: impl Into<Arc<Condition>>) -> Self {
        self.combine_where(condition, Combinator::And)
    }

    pub fn or_where(&self, condition: impl Into<Arc<Condition>>) -> Self {
        self.combine_where(condition, Combinator::Or)
    }

    pub fn shift_by(&self, offset: impl Into<String>) -> Self {
        Self {
            timeshift: Some(Timeshift::new(offset)),
            ..self.clone()
        }
    }

    /// Write everything except the timeshift
    ///
    /// Function chains wrap this form and append the shift after the
    /// outermost call.
    pub(crate) fn fmt_source(&self, f: &mut impl fmt::Write) -> fmt::Result {
        write!(f, "{} FROM '{}'", self.metric, self.collection)?;
        if let Some(condition) = &self.condition {
            write!(f, " WHERE {}", condition)?;
        }
        Ok(())
    }

    pub(crate) fn source(&self) -> String {
        let mut out = String::new();
        // Writing into a String cannot fail
        let _ = self.fmt_source(&mut out);
        out
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_source(f)?;
        if let Some(timeshift) = &self.timeshift {
            write!(f, " {}", timeshift)?;
        }
        Ok(())
    }
}
