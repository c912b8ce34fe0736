//! DalmatinerDB Query Builder
//!
//! Immutable, chainable builders rendering the DalmatinerDB query language:
//!
//! - **Condition**: `WHERE` expression trees over tags
//! - **Selector**: metric path, collection, condition and timeshift
//! - **Function**: function application with render-time variables
//! - **Annotations**: the `AS` clause (prefix, tags, label) and static metadata
//! - **Part**: one selectable unit; a function chain rooted at a selector
//! - **Query**: ordered parts plus a time range
//!
//! # Query Language
//!
//! ```text
//! SELECT part [, part2, ...]
//! [BETWEEN t1 AND t2 | BEFORE t FOR d | AFTER t FOR d | LAST d]
//!
//! part := metric FROM 'collection' [WHERE condition] [SHIFT BY offset] [AS alias]
//! ```
//!
//! # Examples
//!
//! ```rust
//! use dalmatiner_query::{equals, Query};
//!
//! # fn main() -> Result<(), dalmatiner_query::QueryError> {
//! let q = Query::new()
//!     .from("myorg")
//!     .select(["base", "network", "eth0", "sent"])?
//!     .where_(equals(("dl", "source"), "agent1"))
//!     .apply("derivate", vec![])
//!     .apply("sum", vec!["30s".into()]);
//!
//! assert_eq!(
//!     q.render()?,
//!     "SELECT sum(derivate('base'.'network'.'eth0'.'sent' FROM 'myorg' \
//!      WHERE dl:'source' = 'agent1'), 30s)"
//! );
//! # Ok(())
//! # }
//! ```

mod annotations;
mod builder;
mod condition;
mod error;
mod function;
mod part;
mod range;
mod selector;

pub use annotations::{Annotations, PREFIX_KEY};
pub use builder::{Query, Selection};
pub use condition::{equals, not_equals, present, Combinator, Condition, Tag};
pub use error::{QueryError, QueryResult, TransportError};
pub use function::{Arg, Function, RenderContext, Value, Vars};
pub use part::Part;
pub use range::{encode_duration, encode_range, encode_time, parse_duration, parse_time};
pub use selector::{Metric, Selector, Timeshift, ALL};
