//! Feature building
//!
//! Transforms raw adapter [`DataFrame`]s into model-ready [`FeatureFrame`]s,
//! extracting the metric value and time-based features from each row.

use std::collections::{HashMap, HashSet};

use anyhow::{bail, Result};
use chrono::{DateTime, Datelike, Timelike, Utc};
use serde_json::Value;

use crate::adapters::DataFrame;
use crate::models::FeatureFrame;

/// Constructs feature frames from data frames.
#[derive(Debug, Clone, Copy, Default)]
pub struct FeatureBuilder;

impl FeatureBuilder {
    pub fn new() -> Self {
        Self
    }

    /// Converts a `DataFrame` from an adapter into a `FeatureFrame` for a
    /// model. Extracted per row:
    ///   - `value`: the metric value (required)
    ///   - `timestamp`: Unix timestamp in seconds (from the `ts` field)
    ///   - `hour`: hour of day (0-23)
    ///   - `day`: day of week (0-6, Sunday=0)
    ///
    /// Rows without a coercible `value` field are skipped. If `ts` is missing
    /// or unparseable, the time-based features are omitted for that row.
    pub fn build(&self, df: &DataFrame) -> Result<FeatureFrame> {
        if df.rows.is_empty() {
            bail!("dataframe is empty");
        }

        let mut rows = Vec::with_capacity(df.rows.len());
        for row in &df.rows {
            let Some(value) = row.get("value").and_then(to_f64) else {
                continue;
            };

            let mut features = HashMap::from([("value".to_string(), value)]);

            if let Some(ts) = row.get("ts").and_then(parse_timestamp) {
                features.insert("timestamp".to_string(), ts.timestamp() as f64);
                features.insert("hour".to_string(), ts.hour() as f64);
                features.insert("day".to_string(), ts.weekday().num_days_from_sunday() as f64);
            }

            rows.push(features);
        }

        if rows.is_empty() {
            bail!("no valid rows with 'value' field");
        }

        Ok(FeatureFrame { rows })
    }
}

fn to_f64(v: &Value) -> Option<f64> {
    v.as_f64()
}

/// Parses a timestamp from an RFC 3339 string or an epoch-seconds number.
fn parse_timestamp(v: &Value) -> Option<DateTime<Utc>> {
    match v {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|t| t.with_timezone(&Utc)),
        Value::Number(n) => DateTime::from_timestamp(n.as_f64()? as i64, 0),
        _ => None,
    }
}

/// Fills missing values in a feature frame using forward fill: for each
/// field, a missing value is replaced with the last value seen for that
/// field. Leading gaps (before the first observation) stay missing.
pub fn fill_missing_values(mut frame: FeatureFrame) -> FeatureFrame {
    if frame.rows.is_empty() {
        return frame;
    }

    let keys: HashSet<String> = frame
        .rows
        .iter()
        .flat_map(|row| row.keys().cloned())
        .collect();

    for key in keys {
        let mut last_valid: Option<f64> = None;
        for row in &mut frame.rows {
            match row.get(&key) {
                Some(&v) => last_valid = Some(v),
                None => {
                    if let Some(v) = last_valid {
                        row.insert(key.clone(), v);
                    }
                }
            }
        }
    }

    frame
}
