//! JSON transcoding of builder state
//!
//! Every node derives its serde encoding; polymorphic slots are closed enums
//! with explicit discriminants, so decoding never sniffs shapes. Decoding
//! validates: unknown discriminants, missing fields and invalid metric paths
//! fail with [`QueryError::Serialization`].
//!
//! Query variables are template parameters and are never serialized; pass
//! them back through [`Query::render_with`](crate::Query::render_with).

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::query::{QueryError, QueryResult};

/// Encode any builder node as a JSON value
pub fn to_json<T: Serialize>(value: &T) -> QueryResult<serde_json::Value> {
    Ok(serde_json::to_value(value)?)
}

/// Encode any builder node as a JSON string
pub fn to_string<T: Serialize>(value: &T) -> QueryResult<String> {
    Ok(serde_json::to_string(value)?)
}

/// Rebuild a builder node from a JSON value
pub fn from_json<T: DeserializeOwned>(json: serde_json::Value) -> QueryResult<T> {
    serde_json::from_value(json).map_err(|e| QueryError::Serialization(e.to_string()))
}

/// Rebuild a builder node from a JSON string
pub fn from_str<T: DeserializeOwned>(json: &str) -> QueryResult<T> {
    serde_json::from_str(json).map_err(|e| QueryError::Serialization(e.to_string()))
}

/// Optional durations as integer milliseconds
pub(crate) mod duration_ms {
    use chrono::Duration;
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(d) => serializer.serialize_i64(d.num_milliseconds()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<i64>::deserialize(deserializer)? {
            Some(ms) => Duration::try_milliseconds(ms)
                .map(Some)
                .ok_or_else(|| D::Error::custom(format!("duration out of range: {}ms", ms))),
            None => Ok(None),
        }
    }
}
