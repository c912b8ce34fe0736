//! Function application and variable substitution
//!
//! A [`Function`] is a template: `$name` arguments are resolved when the
//! function is rendered, not when it is built, so the same function can be
//! rendered against different variable environments.
//!
//! ```text
//! avg('base'.'cpu' FROM 'myorg', 30s)
//! sum(derivate('base'.'network'.'eth0'.'sent' FROM 'myorg'), 30s)
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::query::error::{QueryError, QueryResult};
use crate::query::part::Part;
use crate::query::selector::Selector;

/// Variable environment used while rendering
pub type Vars = BTreeMap<String, Value>;

/// Maximum nesting of variable expansions
const MAX_RENDER_DEPTH: usize = 32;

/// A value that can be bound to a variable or passed as an argument
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Value {
    /// Rendered verbatim, without quoting
    Text(String),
    Number(f64),
    Selector(Arc<Selector>),
    Function(Arc<Function>),
    /// Rendered without its `AS` clause
    Part(Arc<Part>),
}

impl Value {
    pub fn render(&self, ctx: &RenderContext<'_>) -> QueryResult<String> {
        match self {
            Self::Text(text) => Ok(text.clone()),
            Self::Number(n) => Ok(n.to_string()),
            Self::Selector(selector) => Ok(selector.to_string()),
            Self::Function(function) => function.render(ctx),
            Self::Part(part) => part.render_expr(ctx),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Number(n as f64)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Self::Number(n.into())
    }
}

impl From<Selector> for Value {
    fn from(selector: Selector) -> Self {
        Self::Selector(Arc::new(selector))
    }
}

impl From<Function> for Value {
    fn from(function: Function) -> Self {
        Self::Function(Arc::new(function))
    }
}

impl From<Part> for Value {
    fn from(part: Part) -> Self {
        Self::Part(Arc::new(part))
    }
}

/// A function argument
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Arg {
    /// Placeholder for the selector the function chain is rooted at
    Subject,
    /// Reference to a variable, resolved at render time
    Var(String),
    Value(Value),
}

impl Arg {
    pub fn var(name: impl Into<String>) -> Self {
        Self::Var(name.into())
    }
}

/// Strings starting with `$` become variable references
impl From<&str> for Arg {
    fn from(s: &str) -> Self {
        match s.strip_prefix('$') {
            Some(name) => Self::Var(name.to_string()),
            None => Self::Value(Value::from(s)),
        }
    }
}

impl From<String> for Arg {
    fn from(s: String) -> Self {
        Self::from(s.as_str())
    }
}

impl From<f64> for Arg {
    fn from(n: f64) -> Self {
        Self::Value(n.into())
    }
}

impl From<i64> for Arg {
    fn from(n: i64) -> Self {
        Self::Value(n.into())
    }
}

impl From<i32> for Arg {
    fn from(n: i32) -> Self {
        Self::Value(n.into())
    }
}

impl From<Value> for Arg {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl From<Selector> for Arg {
    fn from(selector: Selector) -> Self {
        Self::Value(selector.into())
    }
}

impl From<Function> for Arg {
    fn from(function: Function) -> Self {
        Self::Value(function.into())
    }
}

impl From<Part> for Arg {
    fn from(part: Part) -> Self {
        Self::Value(part.into())
    }
}

/// Variables and subject in scope while rendering
#[derive(Debug, Clone, Copy)]
pub struct RenderContext<'a> {
    vars: &'a Vars,
    subject: Option<&'a Selector>,
    depth: usize,
}

impl<'a> RenderContext<'a> {
    pub fn new(vars: &'a Vars) -> Self {
        Self {
            vars,
            subject: None,
            depth: 0,
        }
    }

    pub fn vars(&self) -> &'a Vars {
        self.vars
    }

    /// Same variables, with `subject` bound to the `Subject` placeholder
    pub fn with_subject<'b>(&self, subject: &'b Selector) -> RenderContext<'b>
    where
        'a: 'b,
    {
        RenderContext {
            vars: self.vars,
            subject: Some(subject),
            depth: self.depth,
        }
    }

    fn resolve(&self, name: &str) -> QueryResult<(&'a Value, Self)> {
        let value = self
            .vars
            .get(name)
            .ok_or_else(|| QueryError::UndeclaredVariable(name.to_string()))?;
        if self.depth >= MAX_RENDER_DEPTH {
            return Err(QueryError::RenderDepthExceeded(name.to_string()));
        }
        let nested = Self {
            depth: self.depth + 1,
            ..*self
        };
        Ok((value, nested))
    }
}

/// Named function applied to ordered arguments
///
/// Function names are opaque; the catalogue is defined by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Function {
    pub fun: String,
    pub args: Vec<Arg>,
}

impl Function {
    pub fn new(fun: impl Into<String>, args: Vec<Arg>) -> Self {
        Self {
            fun: fun.into(),
            args,
        }
    }

    /// Render as `fun(arg1, arg2, ...)`
    pub fn render(&self, ctx: &RenderContext<'_>) -> QueryResult<String> {
        let args = self
            .args
            .iter()
            .map(|arg| self.encode_arg(arg, ctx))
            .collect::<QueryResult<Vec<_>>>()?;
        Ok(format!("{}({})", self.fun, args.join(", ")))
    }

    fn encode_arg(&self, arg: &Arg, ctx: &RenderContext<'_>) -> QueryResult<String> {
        match arg {
            Arg::Subject => ctx
                .subject
                .map(Selector::source)
                .ok_or_else(|| QueryError::MissingSubject(self.fun.clone())),
            Arg::Var(name) => {
                let (value, nested) = ctx.resolve(name)?;
                value.render(&nested)
            }
            Arg::Value(value) => value.render(ctx),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn selector() -> Selector {
        Selector::new("myorg", ["base", "cpu"]).unwrap()
    }

    #[test]
    fn test_render_literals() {
        let vars = Vars::new();
        let f = Function::new("avg", vec![Arg::Subject, "30s".into(), 2i64.into()]);
        let s = selector();
        let out = f.render(&RenderContext::new(&vars).with_subject(&s)).unwrap();
        assert_eq!(out, "avg('base'.'cpu' FROM 'myorg', 30s, 2)");
    }

    #[test]
    fn test_numbers_render_like_plain_values() {
        let vars = Vars::new();
        let f = Function::new("percentile", vec![0.5f64.into(), 30.0f64.into()]);
        assert_eq!(
            f.render(&RenderContext::new(&vars)).unwrap(),
            "percentile(0.5, 30)"
        );
    }

    #[test]
    fn test_variable_substitution() {
        let mut vars = Vars::new();
        vars.insert("interval".to_string(), "30s".into());
        let f = Function::new("avg", vec!["$interval".into()]);
        assert_eq!(f.render(&RenderContext::new(&vars)).unwrap(), "avg(30s)");
    }

    #[test]
    fn test_undeclared_variable() {
        let vars = Vars::new();
        let f = Function::new("avg", vec!["$interval".into()]);
        let err = f.render(&RenderContext::new(&vars)).unwrap_err();
        assert!(matches!(err, QueryError::UndeclaredVariable(name) if name == "interval"));
    }

    #[test]
    fn test_missing_subject() {
        let vars = Vars::new();
        let f = Function::new("derivate", vec![Arg::Subject]);
        assert!(matches!(
            f.render(&RenderContext::new(&vars)),
            Err(QueryError::MissingSubject(_))
        ));
    }

    #[test]
    fn test_nested_function_through_variable() {
        let mut vars = Vars::new();
        vars.insert("interval".to_string(), "1m".into());
        vars.insert(
            "inner".to_string(),
            Function::new("avg", vec![selector().into(), "$interval".into()]).into(),
        );
        let f = Function::new("max", vec!["$inner".into()]);
        assert_eq!(
            f.render(&RenderContext::new(&vars)).unwrap(),
            "max(avg('base'.'cpu' FROM 'myorg', 1m))"
        );
    }

    #[test]
    fn test_self_referencing_variable_is_bounded() {
        let mut vars = Vars::new();
        vars.insert(
            "loop".to_string(),
            Function::new("f", vec!["$loop".into()]).into(),
        );
        let f = Function::new("g", vec!["$loop".into()]);
        assert!(matches!(
            f.render(&RenderContext::new(&vars)),
            Err(QueryError::RenderDepthExceeded(_))
        ));
    }

    #[test]
    fn test_arg_json_discriminants() {
        let f = Function::new("avg", vec![Arg::Subject, "$interval".into(), "30s".into()]);
        let json = serde_json::to_value(&f).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "fun": "avg",
                "args": ["subject", {"var": "interval"}, {"value": {"text": "30s"}}]
            })
        );
    }
}
