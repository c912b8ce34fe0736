//! Tag predicates for the WHERE clause
//!
//! Conditions form a binary expression tree. Combining two conditions never
//! rebalances or flattens the tree, and rendering adds no parentheses:
//! `a.and(b).or(c)` and `a.and(b.or(c))` produce the same text. Operator
//! precedence is left to the caller.
//!
//! ```text
//! dl:'source' = 'agent1'
//! label:'production' != '' AND label:'web' != ''
//! label:'production'
//! ```

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, OnceLock};

use crate::query::error::{QueryError, QueryResult};

/// A `(namespace, name)` pair identifying a piece of series metadata
///
/// Serialized as the two element array `[namespace, name]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "(Option<String>, String)", into = "(Option<String>, String)")]
pub struct Tag {
    namespace: Option<String>,
    name: String,
}

impl Tag {
    /// Create a tag; an empty namespace is treated as no namespace
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        let namespace = namespace.into();
        Self {
            namespace: (!namespace.is_empty()).then_some(namespace),
            name: name.into(),
        }
    }

    /// Create a tag in the default (empty) namespace
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            namespace: None,
            name: name.into(),
        }
    }

    /// Parse `(<ns>:)?<name>`, optionally prefixed with `$`
    ///
    /// `"note"` parses to `(None, "note")`, `"dl:hostname"` and `"$dl:hostname"`
    /// to `("dl", "hostname")`.
    pub fn parse(s: &str) -> QueryResult<Self> {
        static TAG: OnceLock<Regex> = OnceLock::new();
        let re = match TAG.get() {
            Some(re) => re,
            None => {
                let re = Regex::new(r"^\$?(?:([a-z]*):)?(.*)$")
                    .map_err(|e| QueryError::InvalidAnnotation(e.to_string()))?;
                TAG.get_or_init(|| re)
            }
        };

        let caps = re
            .captures(s)
            .ok_or_else(|| QueryError::InvalidAnnotation(s.to_string()))?;
        let namespace = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
        let name = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
        if name.is_empty() {
            return Err(QueryError::InvalidAnnotation(s.to_string()));
        }

        Ok(Self::new(namespace, name))
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Key used for this tag in decoded series metadata (`ns:name` or `name`)
    pub fn key(&self) -> String {
        match &self.namespace {
            Some(ns) => format!("{}:{}", ns, self.name),
            None => self.name.clone(),
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}:'{}'", ns, self.name),
            None => write!(f, "'{}'", self.name),
        }
    }
}

impl From<(Option<String>, String)> for Tag {
    fn from((namespace, name): (Option<String>, String)) -> Self {
        Self::new(namespace.unwrap_or_default(), name)
    }
}

impl From<Tag> for (Option<String>, String) {
    fn from(tag: Tag) -> Self {
        (tag.namespace, tag.name)
    }
}

impl From<(&str, &str)> for Tag {
    fn from((namespace, name): (&str, &str)) -> Self {
        Self::new(namespace, name)
    }
}

impl TryFrom<&str> for Tag {
    type Error = QueryError;

    fn try_from(s: &str) -> QueryResult<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Tag {
    type Error = QueryError;

    fn try_from(s: String) -> QueryResult<Self> {
        Self::parse(&s)
    }
}

/// How a new WHERE condition combines with an existing one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Combinator {
    And,
    Or,
}

/// A boolean predicate over tags
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", content = "args", rename_all = "lowercase")]
pub enum Condition {
    /// `tag = 'value'`
    Eq(Tag, String),
    /// `tag != 'value'`
    Neq(Tag, String),
    /// `tag`
    Present(Tag),
    /// `a AND b`
    And(Arc<Condition>, Arc<Condition>),
    /// `a OR b`
    Or(Arc<Condition>, Arc<Condition>),
    /// Unrecognised operator; renders as an empty string
    #[serde(other)]
    Unknown,
}

impl Condition {
    pub fn eq(tag: impl Into<Tag>, value: impl Into<String>) -> Self {
        Self::Eq(tag.into(), value.into())
    }

    pub fn neq(tag: impl Into<Tag>, value: impl Into<String>) -> Self {
        Self::Neq(tag.into(), value.into())
    }

    pub fn present(tag: impl Into<Tag>) -> Self {
        Self::Present(tag.into())
    }

    /// New node with `[self, other]` as operands
    pub fn and(&self, other: impl Into<Arc<Condition>>) -> Self {
        Self::And(Arc::new(self.clone()), other.into())
    }

    /// New node with `[self, other]` as operands
    pub fn or(&self, other: impl Into<Arc<Condition>>) -> Self {
        Self::Or(Arc::new(self.clone()), other.into())
    }

    /// Combine with `other` using the given combinator
    pub fn combine(&self, other: impl Into<Arc<Condition>>, op: Combinator) -> Self {
        match op {
            Combinator::And => self.and(other),
            Combinator::Or => self.or(other),
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Eq(tag, value) => write!(f, "{} = '{}'", tag, value),
            Self::Neq(tag, value) => write!(f, "{} != '{}'", tag, value),
            Self::Present(tag) => write!(f, "{}", tag),
            Self::And(a, b) => write!(f, "{} AND {}", a, b),
            Self::Or(a, b) => write!(f, "{} OR {}", a, b),
            Self::Unknown => Ok(()),
        }
    }
}

/// `tag = 'value'`
pub fn equals(tag: impl Into<Tag>, value: impl Into<String>) -> Condition {
    Condition::eq(tag, value)
}

/// `tag != 'value'`
pub fn not_equals(tag: impl Into<Tag>, value: impl Into<String>) -> Condition {
    Condition::neq(tag, value)
}

/// `tag` (presence check)
pub fn present(tag: impl Into<Tag>) -> Condition {
    Condition::present(tag)
}
