//! Part annotations: label, tag annotations, prefix and static metadata
//!
//! Annotations render as the `AS` clause of a part. Sections are written in a
//! fixed order (prefix, tags, label) and dot-joined:
//!
//! ```text
//! AS '0'.'v'.$dl:'hostname'.'cpu [%]'
//! ```
//!
//! The server echoes the evaluated alias back as the series name, which is how
//! the decoder recovers the part index, channel and tag values.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::query::condition::Tag;
use crate::query::error::{QueryError, QueryResult};

/// Static key reserved for index prefixes
pub const PREFIX_KEY: &str = "__prefix";

/// Label, tag and prefix metadata attached to a part
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Annotations {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<Tag>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub prefix: Vec<String>,
    #[serde(
        rename = "static",
        default,
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub statics: BTreeMap<String, serde_json::Value>,
}

impl Annotations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Annotations carrying only a label
    pub fn labeled(label: impl Into<String>) -> Self {
        Self {
            label: Some(label.into()),
            ..Self::default()
        }
    }

    pub fn label_by(&self, label: impl Into<String>) -> Self {
        Self {
            label: Some(label.into()),
            ..self.clone()
        }
    }

    /// Replace the prefix sections
    pub fn prefix_with<I, S>(&self, prefix: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            prefix: prefix.into_iter().map(Into::into).collect(),
            ..self.clone()
        }
    }

    /// Append tag annotations
    ///
    /// Accepts [`Tag`]s, `(ns, name)` pairs, or strings in `(ns:)?name` form.
    pub fn annotate_with<I, T>(&self, tags: I) -> QueryResult<Self>
    where
        I: IntoIterator<Item = T>,
        T: TryInto<Tag>,
        QueryError: From<T::Error>,
    {
        let mut annotations = self.clone();
        for tag in tags {
            annotations.tags.push(tag.try_into()?);
        }
        Ok(annotations)
    }

    /// Merge a single static entry
    pub fn annotate_with_static(
        &self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> QueryResult<Self> {
        let mut fields = BTreeMap::new();
        fields.insert(key.into(), value.into());
        self.annotate_with_statics(fields)
    }

    /// Merge several static entries, later values winning
    pub fn annotate_with_statics(
        &self,
        fields: BTreeMap<String, serde_json::Value>,
    ) -> QueryResult<Self> {
        if fields.contains_key(PREFIX_KEY) {
            return Err(QueryError::ReservedStaticKey(PREFIX_KEY.to_string()));
        }
        let mut annotations = self.clone();
        annotations.statics.extend(fields);
        Ok(annotations)
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.statics.get(key)
    }

    /// True when rendering would produce no sections
    pub fn is_empty(&self) -> bool {
        self.prefix.is_empty() && self.tags.is_empty() && self.label.is_none()
    }

    fn encode(&self) -> String {
        let prefix = self.prefix.iter().map(|p| encode_name(p));
        let tags = self.tags.iter().map(encode_tag);
        let label = self.label.iter().map(|l| encode_name(l));

        prefix.chain(tags).chain(label).collect::<Vec<_>>().join(".")
    }
}

impl fmt::Display for Annotations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AS {}", self.encode())
    }
}

/// Quote a plain section, escaping `'` and `\`
///
/// Names starting with `$` or already wrapped in single quotes pass through.
fn encode_name(name: &str) -> String {
    let quoted = name.len() >= 2 && name.starts_with('\'') && name.ends_with('\'');
    if name.starts_with('$') || quoted {
        return name.to_string();
    }

    let mut out = String::with_capacity(name.len() + 2);
    out.push('\'');
    for c in name.chars() {
        if c == '\'' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('\'');
    out
}

fn encode_tag(tag: &Tag) -> String {
    match tag.namespace() {
        Some(ns) => format!("${}:{}", ns, encode_name(tag.name())),
        None => format!("${}", encode_name(tag.name())),
    }
}
