//! Confidence channel handling
//!
//! Aligned decoding merges the confidence arrays of series sharing the same
//! metadata into one overlay, gates points on the overlay and fills values the
//! series itself is not confident about by linear interpolation.

use serde::{Deserialize, Serialize};

/// How confidence channels are requested and applied
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    /// Plain values only
    #[default]
    Off,
    /// Keep only points with positive confidence
    On,
    /// Gate on the shared overlay and interpolate unconfident values
    Aligned,
}

impl Confidence {
    /// True when parts are split into value and confidence channels
    pub fn is_enabled(self) -> bool {
        !matches!(self, Self::Off)
    }
}

/// Element-wise maximum of `confidence` into `overlay`, growing it as needed
pub fn merge_overlay(overlay: &mut Vec<f64>, confidence: &[f64]) {
    if overlay.len() < confidence.len() {
        overlay.resize(confidence.len(), f64::NEG_INFINITY);
    }
    for (slot, c) in overlay.iter_mut().zip(confidence) {
        *slot = slot.max(*c);
    }
}

/// Values with unconfident entries replaced by linear interpolation
///
/// An entry is unconfident when its confidence is not positive. With a
/// confident neighbour on one side only, that neighbour's value is used;
/// with none at all the value is left as is.
pub fn interpolate(values: &[f64], confidence: &[f64]) -> Vec<f64> {
    let confident = |i: usize| confidence.get(i).map_or(true, |c| *c > 0.0);

    let mut prev = Vec::with_capacity(values.len());
    let mut last = None;
    for i in 0..values.len() {
        if confident(i) {
            last = Some(i);
        }
        prev.push(last);
    }

    let mut next = vec![None; values.len()];
    let mut last = None;
    for i in (0..values.len()).rev() {
        if confident(i) {
            last = Some(i);
        }
        next[i] = last;
    }

    values
        .iter()
        .enumerate()
        .map(|(i, value)| match (prev[i], next[i]) {
            (Some(j), _) if j == i => *value,
            (Some(j), Some(k)) => {
                let ratio = (i - j) as f64 / (k - j) as f64;
                values[j] + (values[k] - values[j]) * ratio
            }
            (Some(j), None) => values[j],
            (None, Some(k)) => values[k],
            (None, None) => *value,
        })
        .collect()
}
