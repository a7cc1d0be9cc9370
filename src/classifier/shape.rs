use serde_json::Value;

use crate::taxonomy::TrackRecord;

/// Envelope the service wrapped its track list in.
#[derive(Debug, PartialEq)]
pub enum ResponseShape {
    List(Vec<Value>),
    Keyed(serde_json::Map<String, Value>),
    Other(Value),
}

impl From<Value> for ResponseShape {
    fn from(value: Value) -> Self {
        match value {
            Value::Array(items) => Self::List(items),
            Value::Object(map) => Self::Keyed(map),
            other => Self::Other(other),
        }
    }
}

impl ResponseShape {
    /// The track list: the value itself if it is a list, else the first
    /// list-valued entry of a mapping, else nothing.
    pub fn into_track_list(self) -> Vec<Value> {
        match self {
            Self::List(items) => items,
            Self::Keyed(map) => map
                .into_iter()
                .find_map(|(_, v)| match v {
                    Value::Array(items) => Some(items),
                    _ => None,
                })
                .unwrap_or_default(),
            Self::Other(_) => Vec::new(),
        }
    }
}

pub fn extract_track_list(value: Value) -> Vec<Value> {
    ResponseShape::from(value).into_track_list()
}

/// Decode raw list entries into records. Entries that don't decode or break
/// the taxonomy invariants are logged and dropped; returns the drop count too.
pub fn decode_tracks(batch_id: &str, items: Vec<Value>) -> (Vec<TrackRecord>, usize) {
    let mut tracks = Vec::with_capacity(items.len());
    let mut rejected = 0;

    for (i, item) in items.into_iter().enumerate() {
        let label = item
            .get("filename")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("entry {i}"));

        let decoded = serde_json::from_value::<TrackRecord>(item)
            .map_err(|e| e.to_string())
            .and_then(|t| t.validate().map(|_| t));

        match decoded {
            Ok(t) => tracks.push(t),
            Err(e) => {
                rejected += 1;
                log::warn!("{batch_id}: rejected {label}: {e}");
            }
        }
    }

    (tracks, rejected)
}
