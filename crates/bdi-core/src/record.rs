//! Records accepted by the domain stores, plus the safe nested-field accessors used to
//! read optional payload data.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Field names stamped at ingestion; caller-supplied values are replaced.
const RESERVED_FIELDS: [&str; 2] = ["id", "received_at"];

/// Naive ISO-8601 layouts emitted by upstream producers without an offset.
const NAIVE_LAYOUTS: [&str; 3] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"];

/// One accepted write: the caller payload plus ingestion metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// `<prefix>_<uuid>`; unique within a store's lifetime.
    pub id: String,
    /// When the gateway accepted the record.
    pub received_at: DateTime<Utc>,
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl Record {
    /// Stamps a validated payload with a fresh id and the given ingestion time.
    pub fn ingest(id_prefix: &str, mut payload: Map<String, Value>, received_at: DateTime<Utc>) -> Self {
        for key in RESERVED_FIELDS {
            payload.remove(key);
        }
        Self {
            id: format!("{}_{}", id_prefix, Uuid::new_v4().simple()),
            received_at,
            payload,
        }
    }

    /// Value at a nested payload path, `None` if any segment is missing.
    pub fn get(&self, path: &[&str]) -> Option<&Value> {
        let (first, rest) = path.split_first()?;
        value_at(self.payload.get(*first)?, rest)
    }

    pub fn str_at(&self, path: &[&str]) -> Option<&str> {
        self.get(path).and_then(Value::as_str)
    }
}

/// Walks `path` from `root`; an empty path yields `root` itself.
pub fn value_at<'a>(root: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(root, |node, segment| node.as_object()?.get(*segment))
}

/// Parses RFC 3339, naive ISO-8601 (taken as UTC) or epoch-millisecond timestamps.
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => parse_timestamp_str(s),
        Value::Number(n) => n.as_i64().and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        _ => None,
    }
}

fn parse_timestamp_str(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NAIVE_LAYOUTS
        .iter()
        .find_map(|layout| NaiveDateTime::parse_from_str(raw, layout).ok())
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(payload: Value) -> Record {
        let map = payload.as_object().cloned().unwrap_or_default();
        Record::ingest("belief", map, Utc::now())
    }

    #[test]
    fn ingest_replaces_caller_metadata() {
        let rec = record(json!({ "id": "spoofed", "received_at": "yesterday", "timestamp": "t" }));
        assert!(rec.id.starts_with("belief_"));
        assert_ne!(rec.id, "spoofed");
        assert!(!rec.payload.contains_key("id"));
        assert!(!rec.payload.contains_key("received_at"));

        let value = serde_json::to_value(&rec).unwrap();
        assert_eq!(value["id"], rec.id.as_str());
        assert_eq!(value["timestamp"], "t");
    }

    #[test]
    fn ids_are_unique() {
        let a = record(json!({}));
        let b = record(json!({}));
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn nested_reads_stop_at_the_first_missing_segment() {
        let rec = record(json!({
            "solution": { "optimization_score": { "net_value": 1.25 } },
            "plan": { "quality_metrics": null }
        }));
        assert_eq!(rec.get(&["solution", "optimization_score", "net_value"]), Some(&json!(1.25)));
        assert!(rec.get(&["solution", "missing", "net_value"]).is_none());
        assert!(rec.get(&["plan", "quality_metrics", "overall_quality"]).is_none());
        assert!(rec.get(&["nothing"]).is_none());
        assert!(rec.get(&[]).is_none());
    }

    #[test]
    fn parses_common_timestamp_shapes() {
        let expected = Utc.with_ymd_and_hms(2026, 3, 1, 12, 30, 0).unwrap();
        assert_eq!(parse_timestamp(&json!("2026-03-01T12:30:00Z")), Some(expected));
        assert_eq!(parse_timestamp(&json!("2026-03-01T14:30:00+02:00")), Some(expected));
        assert_eq!(parse_timestamp(&json!("2026-03-01T12:30:00")), Some(expected));
        assert_eq!(parse_timestamp(&json!("2026-03-01T12:30:00.000000")), Some(expected));
        assert_eq!(parse_timestamp(&json!(expected.timestamp_millis())), Some(expected));
        assert_eq!(parse_timestamp(&json!("not a date")), None);
        assert_eq!(parse_timestamp(&json!(true)), None);
    }
}
