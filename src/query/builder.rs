//! Chainable query builder
//!
//! Every chain call returns a new value; unchanged parts are shared with the
//! original. [`Query::select`] returns a [`Selection`], an explicit handle on
//! the part it appended. Part-level operations (`apply`, `where_`,
//! `annotate_with`, ...) live on the handle, which also forwards the
//! query-level chain so the fluent style is preserved:
//!
//! ```rust
//! use dalmatiner_query::Query;
//!
//! # fn main() -> Result<(), dalmatiner_query::QueryError> {
//! let q = Query::new()
//!     .from("myorg")
//!     .select(["base", "cpu"])?
//!     .with("interval", "30s")
//!     .apply("avg", vec!["$interval".into()])
//!     .select(["base", "cpu", "system"])?;
//!
//! assert_eq!(
//!     q.render()?,
//!     "SELECT avg('base'.'cpu' FROM 'myorg', 30s), 'base'.'cpu'.'system' FROM 'myorg'"
//! );
//! # Ok(())
//! # }
//! ```

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::Deref;
use std::sync::Arc;

use crate::query::condition::{Combinator, Condition, Tag};
use crate::query::error::{QueryError, QueryResult};
use crate::query::function::{Arg, RenderContext, Value, Vars};
use crate::query::part::Part;
use crate::query::range::encode_range;
use crate::query::selector::{Metric, Selector};
use crate::serializer;

/// DalmatinerDB query: ordered parts, a time range and variables
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Query {
    /// Target of subsequent `select` calls
    #[serde(default, skip_serializing_if = "Option::is_none")]
    collection: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    beginning: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    ending: Option<DateTime<Utc>>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "serializer::duration_ms"
    )]
    duration: Option<Duration>,
    /// Template parameters; never serialized
    #[serde(skip)]
    vars: Vars,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the collection used by subsequent `select` calls
    pub fn from(&self, collection: impl Into<String>) -> Self {
        Self {
            collection: Some(collection.into()),
            ..self.clone()
        }
    }

    /// Append a part selecting `metric` from the current collection
    pub fn select<M>(&self, metric: M) -> QueryResult<Selection>
    where
        M: TryInto<Metric>,
        QueryError: From<M::Error>,
    {
        let collection = self
            .collection
            .as_ref()
            .ok_or(QueryError::MissingCollection)?;
        let part = Part::new(Selector::new(collection.clone(), metric)?);

        let mut query = self.clone();
        query.parts.push(part);
        let index = query.parts.len() - 1;
        Ok(Selection { query, index })
    }

    /// Sugar for `select("ALL")`
    pub fn select_all(&self) -> QueryResult<Selection> {
        self.select(Metric::All)
    }

    pub fn beginning_at(&self, t: impl Into<DateTime<Utc>>) -> Self {
        Self {
            beginning: Some(t.into()),
            ..self.clone()
        }
    }

    pub fn ending_at(&self, t: impl Into<DateTime<Utc>>) -> Self {
        Self {
            ending: Some(t.into()),
            ..self.clone()
        }
    }

    /// Relative range; clears any absolute beginning or ending
    pub fn last(&self, duration: Duration) -> Self {
        Self {
            duration: Some(duration),
            beginning: None,
            ending: None,
            ..self.clone()
        }
    }

    /// Bind a variable
    ///
    /// Variables are query-wide template parameters rather than structure,
    /// so this updates the query in place and hands it back instead of
    /// deriving a copy.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.vars.insert(name.into(), value.into());
        self
    }

    /// Handle on the part at `index`
    pub fn at(&self, index: usize) -> QueryResult<Selection> {
        if index >= self.parts.len() {
            return Err(QueryError::PartOutOfRange {
                index,
                len: self.parts.len(),
            });
        }
        Ok(Selection {
            query: self.clone(),
            index,
        })
    }

    /// Handle on the most recently selected part
    pub fn last_selection(&self) -> QueryResult<Selection> {
        match self.parts.len() {
            0 => Err(QueryError::NoSelection),
            len => self.at(len - 1),
        }
    }

    /// Replace the part at `index` with `f(part)`
    pub fn update_part<F>(&self, index: usize, f: F) -> QueryResult<Self>
    where
        F: FnOnce(&Part) -> QueryResult<Part>,
    {
        let part = self.parts.get(index).ok_or(QueryError::PartOutOfRange {
            index,
            len: self.parts.len(),
        })?;
        let updated = f(part)?;

        let mut query = self.clone();
        query.parts[index] = updated;
        Ok(query)
    }

    /// Most recently appended part, for splicing into other queries
    pub fn last_part(&self) -> Option<&Part> {
        self.parts.last()
    }

    pub fn part(&self, index: usize) -> Option<&Part> {
        self.parts.get(index)
    }

    pub fn parts(&self) -> &[Part] {
        &self.parts
    }

    pub fn collection(&self) -> Option<&str> {
        self.collection.as_deref()
    }

    pub fn vars(&self) -> &Vars {
        &self.vars
    }

    pub fn beginning(&self) -> Option<&DateTime<Utc>> {
        self.beginning.as_ref()
    }

    pub fn ending(&self) -> Option<&DateTime<Utc>> {
        self.ending.as_ref()
    }

    pub fn duration(&self) -> Option<&Duration> {
        self.duration.as_ref()
    }

    /// Render the query text using the query's own variables
    pub fn render(&self) -> QueryResult<String> {
        self.render_with(&Vars::new())
    }

    /// Render the query text, `overrides` winning over the query's variables
    pub fn render_with(&self, overrides: &Vars) -> QueryResult<String> {
        let vars = self.environment(overrides);
        let ctx = RenderContext::new(&vars);

        let parts = self
            .parts
            .iter()
            .filter(|part| !part.excluded)
            .map(|part| part.render(&ctx))
            .collect::<QueryResult<Vec<_>>>()?;

        let mut out = format!("SELECT {}", parts.join(", "));
        if let Some(range) = self.encode_range() {
            out.push(' ');
            out.push_str(&range);
        }
        Ok(out)
    }

    /// Range clause, if any range is set
    pub fn encode_range(&self) -> Option<String> {
        encode_range(
            self.beginning.as_ref(),
            self.ending.as_ref(),
            self.duration.as_ref(),
        )
    }

    pub fn to_json(&self) -> QueryResult<serde_json::Value> {
        serializer::to_json(self)
    }

    pub fn from_json(json: serde_json::Value) -> QueryResult<Self> {
        serializer::from_json(json)
    }

    /// Same query with its parts replaced; used to prepare execution
    pub(crate) fn with_parts(&self, parts: Vec<Part>) -> Self {
        Self {
            parts,
            ..self.clone()
        }
    }

    /// Named parts, then query variables, then overrides
    fn environment(&self, overrides: &Vars) -> Vars {
        let mut vars: Vars = self
            .parts
            .iter()
            .filter_map(|part| {
                part.name
                    .as_ref()
                    .map(|name| (name.clone(), Value::Part(Arc::new(part.clone()))))
            })
            .collect();
        vars.extend(self.vars.iter().map(|(k, v)| (k.clone(), v.clone())));
        vars.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
        vars
    }
}

/// Handle on one part of a query
///
/// Part-level operations target the handle's part and return a new handle
/// on the same index of the derived query.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    query: Query,
    index: usize,
}

impl Selection {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn query(&self) -> &Query {
        &self.query
    }

    pub fn into_query(self) -> Query {
        self.query
    }

    /// The selected part
    pub fn part(&self) -> &Part {
        &self.query.parts[self.index]
    }

    pub fn where_(&self, condition: impl Into<Arc<Condition>>) -> Self {
        self.map(|part| part.where_(condition))
    }

    pub fn combine_where(&self, condition: impl Into<Arc<Condition>>, op: Combinator) -> Self {
        self.map(|part| part.combine_where(condition, op))
    }

    pub fn and_where(&self, condition: impl Into<Arc<Condition>>) -> Self {
        self.map(|part| part.and_where(condition))
    }

    pub fn or_where(&self, condition: impl Into<Arc<Condition>>) -> Self {
        self.map(|part| part.or_where(condition))
    }

    pub fn shift_by(&self, offset: impl Into<String>) -> Self {
        self.map(|part| part.shift_by(offset))
    }

    pub fn apply(&self, fun: impl Into<String>, args: Vec<Arg>) -> Self {
        self.map(|part| part.apply(fun, args))
    }

    pub fn name_by(&self, name: impl Into<String>) -> Self {
        self.map(|part| part.name_by(name))
    }

    pub fn label_by(&self, label: impl Into<String>) -> Self {
        self.map(|part| part.label_by(label))
    }

    pub fn prefix_with<I, S>(&self, prefix: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.map(|part| part.prefix_with(prefix))
    }

    pub fn annotate_with<I, T>(&self, tags: I) -> QueryResult<Self>
    where
        I: IntoIterator<Item = T>,
        T: TryInto<Tag>,
        QueryError: From<T::Error>,
    {
        self.try_map(|part| part.annotate_with(tags))
    }

    pub fn annotate_with_static(
        &self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> QueryResult<Self> {
        self.try_map(|part| part.annotate_with_static(key, value))
    }

    pub fn annotate_with_statics(
        &self,
        fields: BTreeMap<String, serde_json::Value>,
    ) -> QueryResult<Self> {
        self.try_map(|part| part.annotate_with_statics(fields))
    }

    pub fn exclude(&self) -> Self {
        self.map(Part::exclude)
    }

    pub fn include(&self) -> Self {
        self.map(Part::include)
    }

    pub fn from(&self, collection: impl Into<String>) -> Query {
        self.query.from(collection)
    }

    pub fn select<M>(&self, metric: M) -> QueryResult<Selection>
    where
        M: TryInto<Metric>,
        QueryError: From<M::Error>,
    {
        self.query.select(metric)
    }

    pub fn select_all(&self) -> QueryResult<Selection> {
        self.query.select_all()
    }

    pub fn beginning_at(&self, t: impl Into<DateTime<Utc>>) -> Self {
        self.with_query(self.query.beginning_at(t))
    }

    pub fn ending_at(&self, t: impl Into<DateTime<Utc>>) -> Self {
        self.with_query(self.query.ending_at(t))
    }

    pub fn last(&self, duration: Duration) -> Self {
        self.with_query(self.query.last(duration))
    }

    /// See [`Query::with`]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.query = self.query.with(name, value);
        self
    }

    fn map<F>(&self, f: F) -> Self
    where
        F: FnOnce(&Part) -> Part,
    {
        let mut query = self.query.clone();
        query.parts[self.index] = f(self.part());
        self.with_query(query)
    }

    fn try_map<F>(&self, f: F) -> QueryResult<Self>
    where
        F: FnOnce(&Part) -> QueryResult<Part>,
    {
        let query = self.query.update_part(self.index, f)?;
        Ok(self.with_query(query))
    }

    fn with_query(&self, query: Query) -> Self {
        Self {
            query,
            index: self.index,
        }
    }
}

impl Deref for Selection {
    type Target = Query;

    fn deref(&self) -> &Query {
        &self.query
    }
}

impl From<Selection> for Query {
    fn from(selection: Selection) -> Self {
        selection.query
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::condition::{equals, present};
    use crate::query::range::parse_time;

    #[test]
    fn test_simple_select() {
        let q = Query::new()
            .from("myorg")
            .select(["base", "cpu", "system"])
            .unwrap();
        assert_eq!(q.render().unwrap(), "SELECT 'base'.'cpu'.'system' FROM 'myorg'");
    }

    #[test]
    fn test_select_requires_collection() {
        let err = Query::new().select(["base", "cpu"]).unwrap_err();
        assert!(matches!(err, QueryError::MissingCollection));
    }

    #[test]
    fn test_multi_part_select() {
        let q = Query::new()
            .from("myorg")
            .select(["base", "cpu", "system"])
            .unwrap()
            .select(["base", "cpu", "user"])
            .unwrap();
        assert_eq!(
            q.render().unwrap(),
            "SELECT 'base'.'cpu'.'system' FROM 'myorg', 'base'.'cpu'.'user' FROM 'myorg'"
        );
    }

    #[test]
    fn test_select_uses_most_recent_collection() {
        let q = Query::new()
            .from("first-org")
            .select(["base", "cpu", "system"])
            .unwrap()
            .from("second-org")
            .select(["base", "cpu", "user"])
            .unwrap();
        assert_eq!(
            q.render().unwrap(),
            "SELECT 'base'.'cpu'.'system' FROM 'first-org', 'base'.'cpu'.'user' FROM 'second-org'"
        );
    }

    #[test]
    fn test_select_all() {
        let q = Query::new().from("myorg").select_all().unwrap();
        assert_eq!(q.render().unwrap(), "SELECT ALL FROM 'myorg'");
    }

    #[test]
    fn test_apply_on_active_selection() {
        let q = Query::new()
            .from("myorg")
            .select(["base", "network", "eth0", "sent"])
            .unwrap()
            .apply("derivate", vec![]);
        assert_eq!(
            q.render().unwrap(),
            "SELECT derivate('base'.'network'.'eth0'.'sent' FROM 'myorg')"
        );
    }

    #[test]
    fn test_apply_with_extra_argument() {
        let q = Query::new()
            .from("myorg")
            .select(["base", "cpu"])
            .unwrap()
            .apply("avg", vec!["30s".into()]);
        assert_eq!(q.render().unwrap(), "SELECT avg('base'.'cpu' FROM 'myorg', 30s)");
    }

    #[test]
    fn test_variables_expand_like_literals() {
        let q = Query::new()
            .from("myorg")
            .select(["base", "cpu"])
            .unwrap()
            .with("interval", "30s")
            .apply("avg", vec!["$interval".into()]);
        assert_eq!(q.render().unwrap(), "SELECT avg('base'.'cpu' FROM 'myorg', 30s)");
    }

    #[test]
    fn test_undeclared_variable_fails_at_render() {
        let q = Query::new()
            .from("myorg")
            .select(["base", "cpu"])
            .unwrap()
            .apply("avg", vec!["$interval".into()]);
        assert!(matches!(
            q.render(),
            Err(QueryError::UndeclaredVariable(name)) if name == "interval"
        ));
    }

    #[test]
    fn test_render_with_overrides_win() {
        let q = Query::new()
            .from("myorg")
            .select(["base", "cpu"])
            .unwrap()
            .with("interval", "30s")
            .apply("avg", vec!["$interval".into()]);

        let mut overrides = Vars::new();
        overrides.insert("interval".to_string(), "1m".into());
        assert_eq!(
            q.render_with(&overrides).unwrap(),
            "SELECT avg('base'.'cpu' FROM 'myorg', 1m)"
        );
    }

    #[test]
    fn test_apply_only_targets_its_selection() {
        let q = Query::new()
            .from("myorg")
            .select(["base", "cpu", "user"])
            .unwrap()
            .select(["base", "cpu", "system"])
            .unwrap()
            .apply("max", vec![])
            .select(["base", "cpu", "idle"])
            .unwrap()
            .apply("min", vec![]);
        assert_eq!(
            q.render().unwrap(),
            "SELECT 'base'.'cpu'.'user' FROM 'myorg', \
             max('base'.'cpu'.'system' FROM 'myorg'), \
             min('base'.'cpu'.'idle' FROM 'myorg')"
        );
    }

    #[test]
    fn test_explicit_handle_on_earlier_part() {
        let q = Query::new()
            .from("myorg")
            .select(["base", "cpu", "user"])
            .unwrap()
            .select(["base", "cpu", "system"])
            .unwrap()
            .into_query();

        let q = q.at(0).unwrap().apply("max", vec![]).into_query();
        assert_eq!(
            q.render().unwrap(),
            "SELECT max('base'.'cpu'.'user' FROM 'myorg'), 'base'.'cpu'.'system' FROM 'myorg'"
        );
        assert!(matches!(
            q.at(2),
            Err(QueryError::PartOutOfRange { index: 2, len: 2 })
        ));
    }

    #[test]
    fn test_part_operations_need_a_selection() {
        let q = Query::new().from("myorg");
        assert!(matches!(q.last_selection(), Err(QueryError::NoSelection)));
    }

    #[test]
    fn test_shift_only_targets_its_selection() {
        let q = Query::new()
            .from("first-org")
            .select(["base", "cpu", "system"])
            .unwrap()
            .shift_by("1h")
            .from("second-org")
            .select(["base", "cpu", "user"])
            .unwrap();
        assert_eq!(
            q.render().unwrap(),
            "SELECT 'base'.'cpu'.'system' FROM 'first-org' SHIFT BY 1h, \
             'base'.'cpu'.'user' FROM 'second-org'"
        );
    }

    #[test]
    fn test_annotate_with_tags() {
        let q = Query::new()
            .from("best-org")
            .select(["base", "cpu"])
            .unwrap()
            .annotate_with([("dl", "hostname"), ("dl", "source"), ("", "custom")])
            .unwrap();
        assert_eq!(
            q.render().unwrap(),
            "SELECT 'base'.'cpu' FROM 'best-org' AS $dl:'hostname'.$dl:'source'.$'custom'"
        );
    }

    #[test]
    fn test_where_chain() {
        let q = Query::new()
            .from("my-org")
            .select(["base", "cpu"])
            .unwrap()
            .and_where(present(("label", "prod")))
            .or_where(equals(("dl", "source"), "my-agent"));
        assert_eq!(
            q.render().unwrap(),
            "SELECT 'base'.'cpu' FROM 'my-org' WHERE label:'prod' OR dl:'source' = 'my-agent'"
        );
    }

    #[test]
    fn test_excluded_parts_keep_their_slot() {
        let q = Query::new()
            .from("my-org")
            .select(["base", "cpu", "excluded"])
            .unwrap()
            .name_by("hidden")
            .exclude()
            .select(["base", "cpu", "included"])
            .unwrap()
            .apply("divide", vec!["$hidden".into()]);

        assert_eq!(q.parts().len(), 2);
        assert_eq!(
            q.render().unwrap(),
            "SELECT divide('base'.'cpu'.'included' FROM 'my-org', \
             'base'.'cpu'.'excluded' FROM 'my-org')"
        );
    }

    #[test]
    fn test_named_part_reference() {
        let q = Query::new()
            .from("myorg")
            .select(["base", "cpu"])
            .unwrap()
            .apply("avg", vec!["1m".into()])
            .name_by("cpu")
            .select(["base", "load"])
            .unwrap()
            .apply("divide", vec!["$cpu".into()]);
        assert_eq!(
            q.render().unwrap(),
            "SELECT avg('base'.'cpu' FROM 'myorg', 1m), \
             divide('base'.'load' FROM 'myorg', avg('base'.'cpu' FROM 'myorg', 1m))"
        );
    }

    #[test]
    fn test_last_part_spliced_into_other_query() {
        let sub = Query::new()
            .from("other")
            .select(["base", "mem"])
            .unwrap()
            .apply("max", vec![]);
        let spliced = sub.last_part().cloned().unwrap();

        let q = Query::new()
            .from("myorg")
            .select(["base", "cpu"])
            .unwrap()
            .with("peak", spliced)
            .apply("divide", vec!["$peak".into()]);
        assert_eq!(
            q.render().unwrap(),
            "SELECT divide('base'.'cpu' FROM 'myorg', max('base'.'mem' FROM 'other'))"
        );
    }

    #[test]
    fn test_range_rendering() {
        let q = Query::new()
            .from("myorg")
            .select(["base", "cpu"])
            .unwrap()
            .beginning_at(parse_time("2016-11-08 12:00").unwrap())
            .ending_at(parse_time("2016-11-08 16:00").unwrap());
        assert_eq!(
            q.render().unwrap(),
            "SELECT 'base'.'cpu' FROM 'myorg' \
             BETWEEN \"2016-11-08 12:00:00\" AND \"2016-11-08 16:00:00\""
        );

        let q = q.last(Duration::minutes(10));
        assert!(q.beginning().is_none());
        assert!(q.ending().is_none());
        assert_eq!(q.render().unwrap(), "SELECT 'base'.'cpu' FROM 'myorg' LAST 600s");
    }

    #[test]
    fn test_chain_leaves_original_untouched() {
        let base = Query::new().from("myorg").select(["base", "cpu"]).unwrap();
        let derived = base.apply("avg", vec!["30s".into()]);
        assert_eq!(base.render().unwrap(), "SELECT 'base'.'cpu' FROM 'myorg'");
        assert_ne!(base.part(), derived.part());
        assert!(Arc::ptr_eq(&base.part().selector, &derived.part().selector));
    }
}
