//! Prediction log record types

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::classifier::PredictionResult;

/// A stored prediction, as returned by `list`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: i64,
    pub filename: Option<String>,
    pub content_type: Option<String>,
    #[serde(rename = "class")]
    pub predicted_class: String,
    pub confidence: f64,
    pub probabilities: BTreeMap<String, f64>,
    pub image_data: Option<String>,
    /// None for legacy rows with a missing or unreadable timestamp
    #[serde(default, with = "sqlite_timestamp")]
    pub created_at: Option<NaiveDateTime>,
}

/// Caller-supplied part of an entry; the store assigns id and created_at
#[derive(Debug, Clone, PartialEq)]
pub struct NewHistoryEntry {
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub predicted_class: String,
    pub confidence: f64,
    pub probabilities: BTreeMap<String, f64>,
    pub image_data: Option<String>,
}

impl NewHistoryEntry {
    /// Build an entry from a prediction and the upload it came from
    pub fn from_prediction(
        prediction: &PredictionResult,
        filename: Option<String>,
        content_type: Option<String>,
        image_data: Option<String>,
    ) -> Self {
        Self {
            filename,
            content_type,
            predicted_class: prediction.label.clone(),
            confidence: prediction.confidence,
            probabilities: prediction.probabilities.clone(),
            image_data,
        }
    }
}

/// Wire format of `created_at`: what SQLite's CURRENT_TIMESTAMP produces
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Formats other writers of the table are known to have used
const LEGACY_TIMESTAMP_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

/// Parse a stored timestamp; unreadable text yields None
pub fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    std::iter::once(TIMESTAMP_FORMAT)
        .chain(LEGACY_TIMESTAMP_FORMATS.iter().copied())
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
}

mod sqlite_timestamp {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    use super::{parse_timestamp, TIMESTAMP_FORMAT};

    pub fn serialize<S: Serializer>(
        value: &Option<NaiveDateTime>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(ts) => serializer.serialize_str(&ts.format(TIMESTAMP_FORMAT).to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<NaiveDateTime>, D::Error> {
        let text = Option::<String>::deserialize(deserializer)?;
        Ok(text.as_deref().and_then(parse_timestamp))
    }
}
