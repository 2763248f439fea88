//! Reply decoding for RedisTimeSeries commands.
//!
//! TS.MRANGE and TS.RANGE replies are untyped nested arrays; every shape
//! assumption lives in this module so there is exactly one place to review
//! when the store changes its wire format. Numeric fields that fail to parse
//! decode to 0 (the store occasionally returns values as text); each such
//! fallback is recorded as a [`DecodeIssue`] so callers can log what was lost.

use crate::model::{SeriesCollection, TimeSeriesPoint};
use redis::Value;
use std::collections::BTreeMap;

/// One lossy decode event: a timestamp or value that did not parse and was
/// replaced by 0.
#[derive(Clone, Debug, PartialEq)]
pub struct DecodeIssue {
    pub series: String,
    pub index: usize,
    pub field: &'static str,
    pub raw: String,
}

/// Decode a TS.MRANGE reply: an array of `[name, [[label, value], ...],
/// [[ts, value], ...]]` entries. Trailing elements beyond the first three
/// are ignored; entries with fewer are skipped. A reply with no entries is
/// an empty collection, not an error.
pub fn decode_mrange(value: &Value) -> (SeriesCollection, Vec<DecodeIssue>) {
    let mut collection = SeriesCollection::new();
    let mut issues = Vec::new();

    let Value::Bulk(entries) = value else {
        return (collection, issues);
    };

    for entry in entries {
        let Value::Bulk(parts) = entry else { continue };
        let [name, labels, points, ..] = parts.as_slice() else {
            continue;
        };
        let Some(key) = as_text(name) else { continue };

        let labels = decode_labels(labels);
        let points = decode_points(&key, points, &labels, &mut issues);
        collection.insert(key, points);
    }

    (collection, issues)
}

/// Decode a TS.RANGE reply (plain or AGGREGATION): an array of `[ts, value]`
/// pairs. Points carry the given labels; single-key queries pass an empty map.
pub fn decode_range(
    key: &str,
    value: &Value,
    labels: &BTreeMap<String, String>,
) -> (Vec<TimeSeriesPoint>, Vec<DecodeIssue>) {
    let mut issues = Vec::new();
    let points = match value {
        Value::Bulk(_) => decode_points(key, value, labels, &mut issues),
        _ => Vec::new(),
    };
    (points, issues)
}

fn decode_labels(value: &Value) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    let Value::Bulk(pairs) = value else {
        return labels;
    };
    for pair in pairs {
        let Value::Bulk(kv) = pair else { continue };
        let [key, val, ..] = kv.as_slice() else { continue };
        if let (Some(key), Some(val)) = (as_text(key), as_text(val)) {
            labels.insert(key, val);
        }
    }
    labels
}

fn decode_points(
    series: &str,
    value: &Value,
    labels: &BTreeMap<String, String>,
    issues: &mut Vec<DecodeIssue>,
) -> Vec<TimeSeriesPoint> {
    let Value::Bulk(raw_points) = value else {
        return Vec::new();
    };

    let mut points = Vec::with_capacity(raw_points.len());
    for (index, raw) in raw_points.iter().enumerate() {
        let Value::Bulk(pair) = raw else { continue };
        let [ts, val, ..] = pair.as_slice() else { continue };

        let timestamp_ms = decode_i64(series, index, "timestamp", ts, issues);
        let value = decode_f64(series, index, "value", val, issues);
        points.push(TimeSeriesPoint::new(timestamp_ms, value, labels.clone()));
    }
    points
}

fn decode_i64(
    series: &str,
    index: usize,
    field: &'static str,
    value: &Value,
    issues: &mut Vec<DecodeIssue>,
) -> i64 {
    match value {
        Value::Int(n) => *n,
        other => match as_text(other).and_then(|s| s.trim().parse::<i64>().ok()) {
            Some(n) => n,
            None => {
                issues.push(issue(series, index, field, other));
                0
            }
        },
    }
}

fn decode_f64(
    series: &str,
    index: usize,
    field: &'static str,
    value: &Value,
    issues: &mut Vec<DecodeIssue>,
) -> f64 {
    match value {
        Value::Int(n) => *n as f64,
        other => match as_text(other).and_then(|s| s.trim().parse::<f64>().ok()) {
            Some(v) => v,
            None => {
                issues.push(issue(series, index, field, other));
                0.0
            }
        },
    }
}

fn issue(series: &str, index: usize, field: &'static str, value: &Value) -> DecodeIssue {
    DecodeIssue {
        series: series.to_string(),
        index,
        field,
        raw: as_text(value).unwrap_or_else(|| format!("{value:?}")),
    }
}

fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::Data(bytes) => Some(String::from_utf8_lossy(bytes).into_owned()),
        Value::Status(s) => Some(s.clone()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(s: &str) -> Value {
        Value::Data(s.as_bytes().to_vec())
    }

    fn point(ts: i64, value: &str) -> Value {
        Value::Bulk(vec![Value::Int(ts), data(value)])
    }

    fn series_entry(name: &str, labels: &[(&str, &str)], points: Vec<Value>) -> Value {
        let label_pairs = labels
            .iter()
            .map(|(k, v)| Value::Bulk(vec![data(k), data(v)]))
            .collect();
        Value::Bulk(vec![data(name), Value::Bulk(label_pairs), Value::Bulk(points)])
    }

    #[test]
    fn decodes_multi_series_reply_with_labels_preserved() {
        let reply = Value::Bulk(vec![
            series_entry(
                "cpu_usage",
                &[("region", "us-east"), ("host", "a1")],
                vec![point(1000, "10"), point(2000, "20.5")],
            ),
            series_entry("mem_usage", &[], vec![point(1000, "512")]),
        ]);

        let (collection, issues) = decode_mrange(&reply);
        assert!(issues.is_empty());
        assert_eq!(collection.len(), 2);

        let cpu = &collection["cpu_usage"];
        assert_eq!(cpu.len(), 2);
        assert_eq!(cpu[0].timestamp_ms, 1000);
        assert_eq!(cpu[0].value, 10.0);
        assert_eq!(cpu[1].value, 20.5);
        for p in cpu {
            assert_eq!(p.labels.get("region").map(String::as_str), Some("us-east"));
            assert_eq!(p.labels.get("host").map(String::as_str), Some("a1"));
        }
        assert!(collection["mem_usage"][0].labels.is_empty());
    }

    #[test]
    fn empty_reply_is_empty_collection() {
        let (collection, issues) = decode_mrange(&Value::Bulk(vec![]));
        assert!(collection.is_empty());
        assert!(issues.is_empty());
    }

    #[test]
    fn unparseable_value_falls_back_to_zero_and_records_issue() {
        let reply = Value::Bulk(vec![series_entry(
            "cpu_usage",
            &[],
            vec![point(1000, "not-a-number"), point(2000, "30")],
        )]);

        let (collection, issues) = decode_mrange(&reply);
        let points = &collection["cpu_usage"];
        assert_eq!(points[0].value, 0.0);
        assert_eq!(points[1].value, 30.0);
        assert_eq!(
            issues,
            vec![DecodeIssue {
                series: "cpu_usage".to_string(),
                index: 0,
                field: "value",
                raw: "not-a-number".to_string(),
            }]
        );
    }

    #[test]
    fn unparseable_timestamp_falls_back_to_zero() {
        let reply = Value::Bulk(vec![Value::Bulk(vec![data("oops"), data("1.5")])]);
        let (points, issues) = decode_range("disk", &reply, &BTreeMap::new());
        assert_eq!(points[0].timestamp_ms, 0);
        assert_eq!(points[0].value, 1.5);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].field, "timestamp");
        assert_eq!(issues[0].series, "disk");
    }

    #[test]
    fn textual_timestamps_parse() {
        let reply = Value::Bulk(vec![Value::Bulk(vec![data("1700000000000"), data("2")])]);
        let (points, issues) = decode_range("disk", &reply, &BTreeMap::new());
        assert!(issues.is_empty());
        assert_eq!(points[0].timestamp_ms, 1_700_000_000_000);
    }

    #[test]
    fn trailing_elements_are_ignored() {
        // Some server versions append extra metadata after the documented
        // [name, labels, points] / [ts, value] elements.
        let reply = Value::Bulk(vec![Value::Bulk(vec![
            data("cpu_usage"),
            Value::Bulk(vec![Value::Bulk(vec![data("host"), data("a1"), data("extra")])]),
            Value::Bulk(vec![Value::Bulk(vec![Value::Int(1000), data("7.5"), Value::Int(0)])]),
            data("trailing-metadata"),
        ])]);

        let (collection, issues) = decode_mrange(&reply);
        assert!(issues.is_empty());
        let points = &collection["cpu_usage"];
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].timestamp_ms, 1000);
        assert_eq!(points[0].value, 7.5);
        assert_eq!(points[0].labels.get("host").map(String::as_str), Some("a1"));
    }

    #[test]
    fn malformed_entries_are_skipped() {
        let reply = Value::Bulk(vec![
            Value::Int(42),
            Value::Bulk(vec![data("lonely")]),
            series_entry("ok", &[], vec![point(1, "1")]),
        ]);
        let (collection, _) = decode_mrange(&reply);
        assert_eq!(collection.len(), 1);
        assert!(collection.contains_key("ok"));
    }
}
