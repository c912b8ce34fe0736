//! Response Decoder
//!
//! Maps a raw DalmatinerDB response back onto the parts that produced it:
//! 1. Split each series name into sections (part index, channel, metadata)
//! 2. Group value and confidence channels per logical series
//! 3. Name and tag each series from its originating part
//! 4. Materialize points, gated by confidence when requested
//!
//! # Response Format
//!
//! ```text
//! {"s": 1478606400, "d": [{"n": "'0'.'v'.'mac-1'", "r": 1000, "v": [5, 6, 7]}]}
//! ```

mod confidence;
mod name;

pub use confidence::{interpolate, merge_overlay, Confidence};
pub use name::split_sections;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, trace};

use crate::query::{Part, Query, QueryError, QueryResult};

/// A single data point: `(value, timestamp_ms)`
pub type Point = (f64, i64);

/// Raw response body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawResponse {
    /// Start of the result window, epoch seconds
    pub s: i64,
    /// Result rows
    #[serde(default)]
    pub d: Vec<RawSeries>,
}

/// One raw result row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSeries {
    /// Encoded series name (the evaluated alias)
    pub n: String,
    /// Resolution in milliseconds
    pub r: i64,
    /// Values, one per resolution step
    #[serde(default)]
    pub v: Vec<f64>,
}

/// A decoded series
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Series {
    /// Part the series originates from
    #[serde(skip)]
    pub part: Arc<Part>,
    /// Part label, or the rendered selector
    pub name: String,
    /// Tag keys of the part zipped with the decoded metadata
    pub tags: BTreeMap<String, String>,
    /// Points in timestamp order
    pub points: Vec<Point>,
}

/// Decoded response
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecodedResponse {
    /// Start of the result window
    pub start: DateTime<Utc>,
    /// Series in order of first appearance
    pub series: Vec<Series>,
}

impl DecodedResponse {
    /// Get the number of series
    pub fn len(&self) -> usize {
        self.series.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Channel {
    Value,
    Confidence,
}

/// Grouping key: part index, metadata sections, occurrence
type GroupKey = (usize, Vec<String>, usize);

/// Value and confidence rows of one logical series
#[derive(Debug)]
struct Group<'a> {
    key: GroupKey,
    value: Option<&'a RawSeries>,
    confidence: Option<&'a RawSeries>,
}

impl<'a> Group<'a> {
    fn filled(&self, channel: Channel) -> bool {
        match channel {
            Channel::Value => self.value.is_some(),
            Channel::Confidence => self.confidence.is_some(),
        }
    }

    fn slot(&mut self, channel: Channel) -> &mut Option<&'a RawSeries> {
        match channel {
            Channel::Value => &mut self.value,
            Channel::Confidence => &mut self.confidence,
        }
    }
}

/// Decoder bound to the logical parts of a query
#[derive(Debug, Clone)]
pub struct Decoder {
    parts: Vec<Arc<Part>>,
    confidence: Confidence,
}

impl Decoder {
    /// Create a decoder for `parts`, indexed by position
    pub fn new(parts: &[Part], confidence: Confidence) -> Self {
        Self {
            parts: parts.iter().cloned().map(Arc::new).collect(),
            confidence,
        }
    }

    /// Create a decoder for the parts of `query`
    pub fn for_query(query: &Query, confidence: Confidence) -> Self {
        Self::new(query.parts(), confidence)
    }

    pub fn confidence(&self) -> Confidence {
        self.confidence
    }

    /// Decode a raw response
    pub fn decode(&self, response: &RawResponse) -> QueryResult<DecodedResponse> {
        let start_ms = response.s.saturating_mul(1000);
        let start = DateTime::from_timestamp_millis(start_ms)
            .ok_or_else(|| QueryError::InvalidTime(response.s.to_string()))?;

        let groups = self.group(&response.d)?;
        let overlays = match self.confidence {
            Confidence::Aligned => Self::overlays(&groups),
            _ => HashMap::new(),
        };

        let series = groups
            .iter()
            .map(|group| self.materialize(group, start_ms, &overlays))
            .collect::<QueryResult<Vec<_>>>()?;

        debug!(
            rows = response.d.len(),
            series = series.len(),
            confidence = ?self.confidence,
            "Decoded response"
        );

        Ok(DecodedResponse { start, series })
    }

    /// First pass: assign every row to a group
    fn group<'a>(&self, rows: &'a [RawSeries]) -> QueryResult<Vec<Group<'a>>> {
        let mut groups: Vec<Group<'a>> = Vec::new();
        let mut lookup: HashMap<GroupKey, usize> = HashMap::new();

        for row in rows {
            let (index, channel, meta) = self.parse_name(&row.n)?;

            let mut occurrence = 0;
            let slot = loop {
                let key = (index, meta.clone(), occurrence);
                match lookup.get(&key).copied() {
                    Some(i) if groups[i].filled(channel) => occurrence += 1,
                    Some(i) => break i,
                    None => {
                        groups.push(Group {
                            key: key.clone(),
                            value: None,
                            confidence: None,
                        });
                        lookup.insert(key, groups.len() - 1);
                        break groups.len() - 1;
                    }
                }
            };

            trace!(name = %row.n, index, ?channel, occurrence, "Grouped series row");

            let group = &mut groups[slot];
            *group.slot(channel) = Some(row);
            if let (Some(value), Some(confidence)) = (group.value, group.confidence) {
                if value.r != confidence.r {
                    return Err(QueryError::MismatchedResolution {
                        index,
                        value: value.r,
                        confidence: confidence.r,
                    });
                }
            }
        }

        Ok(groups)
    }

    /// Part index, channel and metadata sections of an encoded name
    fn parse_name(&self, name: &str) -> QueryResult<(usize, Channel, Vec<String>)> {
        let mut sections = split_sections(name)?.into_iter();

        let index: usize = sections
            .next()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| QueryError::InvalidSeriesName(name.to_string()))?;
        if index >= self.parts.len() {
            return Err(QueryError::UnknownPart {
                name: name.to_string(),
                index,
            });
        }

        let channel = if self.confidence.is_enabled() {
            match sections.next().as_deref() {
                Some("v") => Channel::Value,
                Some("c") => Channel::Confidence,
                other => {
                    return Err(QueryError::InvalidChannel {
                        name: name.to_string(),
                        channel: other.unwrap_or_default().to_string(),
                    })
                }
            }
        } else {
            Channel::Value
        };

        Ok((index, channel, sections.collect()))
    }

    /// Element-wise maximum confidence per (metadata, occurrence)
    fn overlays(groups: &[Group<'_>]) -> HashMap<(Vec<String>, usize), Vec<f64>> {
        let mut overlays: HashMap<(Vec<String>, usize), Vec<f64>> = HashMap::new();
        for group in groups {
            if let Some(confidence) = group.confidence {
                let (_, meta, occurrence) = &group.key;
                let overlay = overlays.entry((meta.clone(), *occurrence)).or_default();
                merge_overlay(overlay, &confidence.v);
            }
        }
        overlays
    }

    /// Second pass: build a series from a group
    fn materialize(
        &self,
        group: &Group<'_>,
        start_ms: i64,
        overlays: &HashMap<(Vec<String>, usize), Vec<f64>>,
    ) -> QueryResult<Series> {
        let (index, meta, occurrence) = &group.key;
        let value = group
            .value
            .ok_or(QueryError::MissingDataChannel { index: *index })?;
        let part = self.parts[*index].clone();

        let name = part
            .label()
            .map(str::to_string)
            .unwrap_or_else(|| part.selector.to_string());
        let tags = part
            .tags()
            .iter()
            .zip(meta)
            .map(|(tag, value)| (tag.key(), value.clone()))
            .collect();

        let span = (value.v.len().saturating_sub(1) as i64).checked_mul(value.r);
        if value.r <= 0 || span.and_then(|span| start_ms.checked_add(span)).is_none() {
            return Err(QueryError::InvalidResolution {
                index: *index,
                resolution: value.r,
            });
        }
        let timestamp = |i: usize| start_ms + i as i64 * value.r;
        let points = match (self.confidence, group.confidence) {
            (Confidence::Off, _) | (_, None) => value
                .v
                .iter()
                .enumerate()
                .map(|(i, v)| (*v, timestamp(i)))
                .collect(),
            (Confidence::On, Some(confidence)) => gate(&value.v, &confidence.v)
                .map(|i| (value.v[i], timestamp(i)))
                .collect(),
            (Confidence::Aligned, Some(confidence)) => {
                let overlay = overlays
                    .get(&(meta.clone(), *occurrence))
                    .map(Vec::as_slice)
                    .unwrap_or(confidence.v.as_slice());
                let values = interpolate(&value.v, &confidence.v);
                gate(&values, overlay)
                    .map(|i| (values[i], timestamp(i)))
                    .collect()
            }
        };

        Ok(Series {
            part,
            name,
            tags,
            points,
        })
    }
}

/// Indexes of `values` whose confidence is positive
fn gate<'a>(values: &'a [f64], confidence: &'a [f64]) -> impl Iterator<Item = usize> + 'a {
    (0..values.len()).filter(move |&i| confidence.get(i).is_some_and(|c| *c > 0.0))
}
