//! Query error types
//!
//! Defines all error conditions that can occur while building, rendering,
//! executing and decoding queries.

use thiserror::Error;

/// Opaque error produced by a transport implementation
pub type TransportError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur during query operations
#[derive(Error, Debug)]
pub enum QueryError {
    /// `select` was called before `from`
    #[error("You need to set collection (from statement) before selecting metric")]
    MissingCollection,

    /// A part-scoped operation was requested on a query without parts
    #[error("You need to select something before doing any further operations")]
    NoSelection,

    /// A part handle pointed past the end of the query
    #[error("Part index {index} out of range (query has {len} parts)")]
    PartOutOfRange { index: usize, len: usize },

    /// Metric is neither a non-empty path nor ALL
    #[error("Invalid metric: {0}")]
    InvalidMetric(String),

    /// Annotation tag string does not match `(ns:)?name`
    #[error("Invalid annotations variable: {0}")]
    InvalidAnnotation(String),

    /// Static annotation key is reserved for internal use
    #[error("Static annotation key is reserved: {0}")]
    ReservedStaticKey(String),

    /// Time value could not be parsed
    #[error("Invalid time: {0}")]
    InvalidTime(String),

    /// Duration value could not be parsed
    #[error("Invalid duration: {0}")]
    InvalidDuration(String),

    /// Function argument references a variable that was never declared
    #[error("Variable {0} was not declared")]
    UndeclaredVariable(String),

    /// Function chain rendered outside of a part
    #[error("Function {0} refers to a selector but none is in scope")]
    MissingSubject(String),

    /// Variable references nest too deeply (usually a part referencing itself)
    #[error("Render depth exceeded while expanding variable {0}")]
    RenderDepthExceeded(String),

    /// Series name in the response could not be decoded
    #[error("Invalid series name: {0}")]
    InvalidSeriesName(String),

    /// Channel section is neither `v` nor `c`
    #[error("Invalid channel '{channel}' in series {name}")]
    InvalidChannel { name: String, channel: String },

    /// Series refers to a part index the query does not have
    #[error("Series {name} refers to unknown part {index}")]
    UnknownPart { name: String, index: usize },

    /// Confidence channel arrived without its value channel
    #[error("Missing data channel for part {index}")]
    MissingDataChannel { index: usize },

    /// Value and confidence channels disagree on resolution
    #[error("Mismatched resolution for part {index}: {value} != {confidence}")]
    MismatchedResolution {
        index: usize,
        value: i64,
        confidence: i64,
    },

    /// Resolution is not positive or timestamps would overflow
    #[error("Invalid resolution {resolution} for part {index}")]
    InvalidResolution { index: usize, resolution: i64 },

    /// JSON encoding or decoding failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Transport cannot cancel in-flight requests
    #[error("Tried to initialise abort-able execution without abort handler")]
    NotAbortable,

    /// Transport failed; the underlying error is passed through untouched
    #[error("Transport error: {0}")]
    Transport(#[source] TransportError),
}

impl From<serde_json::Error> for QueryError {
    fn from(err: serde_json::Error) -> Self {
        QueryError::Serialization(err.to_string())
    }
}

impl From<std::convert::Infallible> for QueryError {
    fn from(err: std::convert::Infallible) -> Self {
        match err {}
    }
}

/// Result type for query operations
pub type QueryResult<T> = Result<T, QueryError>;
