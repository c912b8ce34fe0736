//! # DalmatinerDB Query
//!
//! Immutable, chainable builder for the DalmatinerDB query language, with a
//! decoder for query responses and a JSON encoding of builder state.
//!
//! ## Features
//!
//! - **Structural sharing**: every chain call returns a new value; unchanged
//!   sub-structure is shared through `Arc`
//! - **Explicit part handles**: `select` returns a [`Selection`] that targets
//!   part-level operations
//! - **Render-time variables**: functions are templates resolved per render
//! - **Confidence decoding**: value/confidence channels merged per series
//!
//! ## Modules
//!
//! - [`query`]: Builders and query text rendering
//! - [`decoder`]: Response decoding
//! - [`exec`]: Transports and query execution
//! - [`serializer`]: JSON encoding of builder state
//! - [`config`]: Configuration and logging setup
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use chrono::Duration;
//! use dalmatiner_query::{Confidence, ExecOptions, HttpTransport, Query};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let query = Query::new()
//!         .from("myorg")
//!         .select(["base", "cpu"])?
//!         .apply("avg", vec!["10s".into()])
//!         .annotate_with(["dl:hostname"])?
//!         .last(Duration::minutes(10));
//!
//!     let transport = HttpTransport::new(std::time::Duration::from_secs(30))?;
//!     let options = ExecOptions::new().apply_confidence(Confidence::On);
//!     let response = query.exec(&transport, options)?.await?;
//!
//!     for series in &response.series {
//!         println!("{} {:?}: {} points", series.name, series.tags, series.points.len());
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod decoder;
pub mod exec;
pub mod query;
pub mod serializer;

// Re-export top-level types for convenience
pub use query::{
    equals, not_equals, present, Annotations, Arg, Combinator, Condition, Function, Metric, Part,
    Query, QueryError, QueryResult, Selection, Selector, Tag, Timeshift, Value, Vars,
};

pub use decoder::{Confidence, DecodedResponse, Decoder, Point, RawResponse, RawSeries, Series};

pub use exec::http::HttpTransport;
pub use exec::{ExecOptions, ExecRequest, Execution, InFlight, Transport};

pub use config::{ClientConfig, Config, ConfigError, LoggingConfig};
