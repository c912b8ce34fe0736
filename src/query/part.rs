//! Query parts
//!
//! A [`Part`] is one selectable unit of a query: a selector, an optional
//! function chain rooted at that selector, and annotations. Applying a
//! function wraps the existing chain; the selector always stays at the root.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::query::annotations::Annotations;
use crate::query::condition::{Combinator, Condition, Tag};
use crate::query::error::{QueryError, QueryResult};
use crate::query::function::{Arg, Function, RenderContext, Value};
use crate::query::selector::Selector;

/// One selectable unit of a query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Part {
    pub selector: Arc<Selector>,
    #[serde(rename = "fn", default, skip_serializing_if = "Option::is_none")]
    pub func: Option<Arc<Function>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<Arc<Annotations>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub excluded: bool,
}

impl Part {
    pub fn new(selector: Selector) -> Self {
        Self {
            selector: Arc::new(selector),
            func: None,
            annotations: None,
            name: None,
            excluded: false,
        }
    }

    /// Wrap the current chain in `fun(<chain>, args...)`
    pub fn apply(&self, fun: impl Into<String>, args: Vec<Arg>) -> Self {
        let inner = match &self.func {
            Some(func) => Arg::Value(Value::Function(func.clone())),
            None => Arg::Subject,
        };
        let mut fargs = Vec::with_capacity(args.len() + 1);
        fargs.push(inner);
        fargs.extend(args);

        Self {
            func: Some(Arc::new(Function::new(fun, fargs))),
            ..self.clone()
        }
    }

    /// Name the part so it can be referenced as `$name` by other parts
    pub fn name_by(&self, name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..self.clone()
        }
    }

    pub fn label_by(&self, label: impl Into<String>) -> Self {
        self.with_annotations(self.annotations_or_default().label_by(label))
    }

    pub fn prefix_with<I, S>(&self, prefix: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.with_annotations(self.annotations_or_default().prefix_with(prefix))
    }

    pub fn annotate_with<I, T>(&self, tags: I) -> QueryResult<Self>
    where
        I: IntoIterator<Item = T>,
        T: TryInto<Tag>,
        QueryError: From<T::Error>,
    {
        let annotations = self.annotations_or_default().annotate_with(tags)?;
        Ok(self.with_annotations(annotations))
    }

    pub fn annotate_with_static(
        &self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> QueryResult<Self> {
        let annotations = self
            .annotations_or_default()
            .annotate_with_static(key, value)?;
        Ok(self.with_annotations(annotations))
    }

    pub fn annotate_with_statics(
        &self,
        fields: BTreeMap<String, serde_json::Value>,
    ) -> QueryResult<Self> {
        let annotations = self.annotations_or_default().annotate_with_statics(fields)?;
        Ok(self.with_annotations(annotations))
    }

    /// Hide the part from rendering; it keeps its index
    pub fn exclude(&self) -> Self {
        if self.excluded {
            return self.clone();
        }
        Self {
            excluded: true,
            ..self.clone()
        }
    }

    pub fn include(&self) -> Self {
        if !self.excluded {
            return self.clone();
        }
        Self {
            excluded: false,
            ..self.clone()
        }
    }

    pub fn where_(&self, condition: impl Into<Arc<Condition>>) -> Self {
        self.with_selector(self.selector.where_(condition))
    }

    pub fn combine_where(&self, condition: impl Into<Arc<Condition>>, op: Combinator) -> Self {
        self.with_selector(self.selector.combine_where(condition, op))
    }

    pub fn and_where(&self, condition: impl Into<Arc<Condition>>) -> Self {
        self.combine_where(condition, Combinator::And)
    }

    pub fn or_where(&self, condition: impl Into<Arc<Condition>>) -> Self {
        self.combine_where(condition, Combinator::Or)
    }

    pub fn shift_by(&self, offset: impl Into<String>) -> Self {
        self.with_selector(self.selector.shift_by(offset))
    }

    /// Label if set
    pub fn label(&self) -> Option<&str> {
        self.annotations.as_ref().and_then(|a| a.label.as_deref())
    }

    /// Tag annotation definitions, in declaration order
    pub fn tags(&self) -> &[Tag] {
        self.annotations
            .as_ref()
            .map(|a| a.tags.as_slice())
            .unwrap_or_default()
    }

    /// Prefix sections, if any were assigned
    pub fn prefix(&self) -> &[String] {
        self.annotations
            .as_ref()
            .map(|a| a.prefix.as_slice())
            .unwrap_or_default()
    }

    /// Render the selector or function chain, without the `AS` clause
    ///
    /// A timeshift is written after the outermost function call.
    pub fn render_expr(&self, ctx: &RenderContext<'_>) -> QueryResult<String> {
        let func = match &self.func {
            Some(func) => func,
            None => return Ok(self.selector.to_string()),
        };

        let ctx = ctx.with_subject(&self.selector);
        let mut out = func.render(&ctx)?;
        if let Some(timeshift) = &self.selector.timeshift {
            out.push(' ');
            out.push_str(&timeshift.to_string());
        }
        Ok(out)
    }

    /// Render the full part, including its `AS` clause
    pub fn render(&self, ctx: &RenderContext<'_>) -> QueryResult<String> {
        let mut out = self.render_expr(ctx)?;
        if let Some(annotations) = self.annotations.as_ref().filter(|a| !a.is_empty()) {
            out.push(' ');
            out.push_str(&annotations.to_string());
        }
        Ok(out)
    }

    fn annotations_or_default(&self) -> Annotations {
        self.annotations
            .as_deref()
            .cloned()
            .unwrap_or_default()
    }

    fn with_annotations(&self, annotations: Annotations) -> Self {
        Self {
            annotations: Some(Arc::new(annotations)),
            ..self.clone()
        }
    }

    fn with_selector(&self, selector: Selector) -> Self {
        Self {
            selector: Arc::new(selector),
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::condition::present;
    use crate::query::function::Vars;

    fn part() -> Part {
        Part::new(Selector::new("myorg", ["base", "network", "eth0", "sent"]).unwrap())
    }

    fn render(part: &Part) -> String {
        part.render(&RenderContext::new(&Vars::new())).unwrap()
    }

    #[test]
    fn test_plain_part() {
        assert_eq!(render(&part()), "'base'.'network'.'eth0'.'sent' FROM 'myorg'");
    }

    #[test]
    fn test_apply_chains_outer_last() {
        let p = part().apply("derivate", vec![]).apply("sum", vec!["30s".into()]);
        assert_eq!(
            render(&p),
            "sum(derivate('base'.'network'.'eth0'.'sent' FROM 'myorg'), 30s)"
        );
    }

    #[test]
    fn test_selector_stays_at_root() {
        let p = part().apply("derivate", vec![]);
        let q = p.apply("sum", vec![]);
        assert!(Arc::ptr_eq(&p.selector, &q.selector));
    }

    #[test]
    fn test_where_after_apply_reaches_selector() {
        let p = part()
            .apply("avg", vec!["10s".into()])
            .where_(present(("dl", "source")));
        assert_eq!(
            render(&p),
            "avg('base'.'network'.'eth0'.'sent' FROM 'myorg' WHERE dl:'source', 10s)"
        );
    }

    #[test]
    fn test_shift_after_function_chain() {
        let p = part()
            .apply("derivate", vec![])
            .apply("sum", vec!["30s".into()])
            .shift_by("1h");
        assert_eq!(
            render(&p),
            "sum(derivate('base'.'network'.'eth0'.'sent' FROM 'myorg'), 30s) SHIFT BY 1h"
        );
    }

    #[test]
    fn test_shift_with_annotations() {
        let p = part().shift_by("1h").annotate_with([("", "region")]).unwrap();
        assert_eq!(
            render(&p),
            "'base'.'network'.'eth0'.'sent' FROM 'myorg' SHIFT BY 1h AS $'region'"
        );
    }

    #[test]
    fn test_label_and_prefix() {
        let p = part().label_by("sent").prefix_with(["0"]);
        assert_eq!(p.label(), Some("sent"));
        assert_eq!(
            render(&p),
            "'base'.'network'.'eth0'.'sent' FROM 'myorg' AS '0'.'sent'"
        );
    }

    #[test]
    fn test_static_only_annotations_do_not_render() {
        let p = part().annotate_with_static("unit", "bytes").unwrap();
        assert_eq!(render(&p), "'base'.'network'.'eth0'.'sent' FROM 'myorg'");
        assert_eq!(
            p.annotations.as_ref().and_then(|a| a.get("unit").cloned()),
            Some(serde_json::json!("bytes"))
        );
    }

    #[test]
    fn test_exclude_include_idempotent() {
        let p = part();
        assert_eq!(p.include(), p);
        let excluded = p.exclude();
        assert!(excluded.excluded);
        assert_eq!(excluded.exclude(), excluded);
        assert_eq!(excluded.include(), p);
    }

    #[test]
    fn test_part_as_argument_renders_without_alias() {
        let inner = part().apply("avg", vec!["1m".into()]).label_by("inner");
        let outer = Part::new(Selector::new("myorg", ["base", "cpu"]).unwrap())
            .apply("divide", vec![inner.into()]);
        assert_eq!(
            render(&outer),
            "divide('base'.'cpu' FROM 'myorg', avg('base'.'network'.'eth0'.'sent' FROM 'myorg', 1m))"
        );
    }
}
