// ABOUTME: The record model: a parsed JSON object stamped with its creation time and store position.
// ABOUTME: Records are immutable once appended; to_json renders the wire shape served to clients.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Field added to every record on the wire carrying the creation timestamp.
pub const CREATED_AT_FIELD: &str = "created_at";

/// Field added on the wire by stores that assign their own identifiers.
pub const ID_FIELD: &str = "id";

/// A parsed object that has not been appended to a store yet.
///
/// The timestamp is taken when the candidate parses successfully, so it is
/// fixed before the store round-trip happens.
#[derive(Debug, Clone, PartialEq)]
pub struct NewRecord {
    pub payload: Map<String, Value>,
    pub created_at: DateTime<Utc>,
}

impl NewRecord {
    pub fn new(payload: Map<String, Value>) -> Self {
        Self {
            payload,
            created_at: Utc::now(),
        }
    }

    /// Finish the record with the position (and optional id) the store assigned.
    pub fn into_record(self, seq: u64, id: Option<String>) -> Record {
        Record {
            seq,
            id,
            created_at: self.created_at,
            payload: self.payload,
        }
    }
}

/// A stored record. `seq` is the 1-based append position and doubles as the
/// subscription cursor; it is never reused.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub seq: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub payload: Map<String, Value>,
}

impl Record {
    /// Render the client-facing shape: the payload's own fields plus
    /// `created_at` and, when present, `id`. The added fields win over
    /// payload fields of the same name.
    pub fn to_json(&self) -> Value {
        let mut obj = self.payload.clone();
        obj.insert(
            CREATED_AT_FIELD.to_string(),
            Value::String(format_timestamp(&self.created_at)),
        );
        if let Some(ref id) = self.id {
            obj.insert(ID_FIELD.to_string(), Value::String(id.clone()));
        }
        Value::Object(obj)
    }
}

/// ISO-8601 with microseconds and a `Z` suffix. Fixed width, so the strings
/// sort in time order.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(v: Value) -> Map<String, Value> {
        match v {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[test]
    fn wire_shape_adds_created_at() {
        let record = NewRecord::new(payload(json!({"a": 1}))).into_record(1, None);
        let wire = record.to_json();

        assert_eq!(wire["a"], 1);
        assert!(wire[CREATED_AT_FIELD].as_str().unwrap().ends_with('Z'));
        assert!(wire.get(ID_FIELD).is_none());
    }

    #[test]
    fn wire_shape_includes_store_id() {
        let record =
            NewRecord::new(payload(json!({"a": 1}))).into_record(7, Some("01ABC".to_string()));
        let wire = record.to_json();

        assert_eq!(wire[ID_FIELD], "01ABC");
        assert!(wire.get("seq").is_none(), "seq is not part of the body");
    }

    #[test]
    fn added_fields_override_payload_fields() {
        let record = NewRecord::new(payload(json!({"created_at": "bogus", "id": 3})))
            .into_record(1, Some("real".to_string()));
        let wire = record.to_json();

        assert_ne!(wire[CREATED_AT_FIELD], "bogus");
        assert_eq!(wire[ID_FIELD], "real");
    }

    #[test]
    fn timestamps_sort_lexically() {
        let early = "2024-01-01T00:00:00Z".parse::<DateTime<Utc>>().unwrap();
        let late = "2024-01-01T00:00:00.5Z".parse::<DateTime<Utc>>().unwrap();
        assert!(format_timestamp(&early) < format_timestamp(&late));
    }
}
