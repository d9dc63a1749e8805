use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::youtube::RawItem;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MappingError {
    #[error("required field `{path}` is missing or not a string")]
    MissingField { path: &'static str },
}

/// One video, flattened into the shape published on the stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappedEvent {
    pub id: String,
    pub title: String,
    pub views: u64,
    pub likes: u64,
    pub comments: u64,
}

fn required_str<'v>(
    raw: &'v Value,
    pointer: &str,
    path: &'static str,
) -> Result<&'v str, MappingError> {
    raw.pointer(pointer)
        .and_then(Value::as_str)
        .ok_or(MappingError::MissingField { path })
}

/// Video id referenced by a playlist item (`contentDetails.videoId`).
pub fn container_video_id(item: &RawItem) -> Result<String, MappingError> {
    required_str(item, "/contentDetails/videoId", "contentDetails.videoId").map(str::to_string)
}

/// Map one `videos` resource item into a [`MappedEvent`].
///
/// `id` and `snippet.title` are required. Statistics counters that are
/// absent, null, negative or not numeric become 0.
pub fn map_video(raw: &RawItem) -> Result<MappedEvent, MappingError> {
    let id = required_str(raw, "/id", "id")?;
    let title = required_str(raw, "/snippet/title", "snippet.title")?;
    let stats = raw.get("statistics");

    Ok(MappedEvent {
        id: id.to_string(),
        title: title.to_string(),
        views: counter(stats, "viewCount"),
        likes: counter(stats, "likes"),
        comments: counter(stats, "commentCount"),
    })
}

fn counter(stats: Option<&Value>, key: &str) -> u64 {
    stats
        .and_then(|stats| stats.get(key))
        .and_then(coerce_count)
        .unwrap_or(0)
}

/// The Data API encodes counts as decimal strings; plain numbers are accepted too.
///
/// Non-negative floats are truncated toward zero.
pub fn coerce_count(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && *f >= 0.0)
                .map(|f| f.trunc() as u64)
        }),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    }
}
