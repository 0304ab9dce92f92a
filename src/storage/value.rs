// Engine value -> JSON conversion
//
// Integers of 64 bits and wider leave as decimal strings so that no client
// ever parses them into a lossy double. Everything that serializes to JSON
// goes through here.

use chrono::{DateTime, NaiveDate, NaiveTime};
use duckdb::types::{TimeUnit, Value};
use serde_json::{Map, Number, Value as JsonValue};

use super::ResultSet;

/// Convert one engine value to its JSON form
pub fn to_json(value: &Value) -> JsonValue {
    match value {
        Value::Null => JsonValue::Null,
        Value::Boolean(b) => JsonValue::Bool(*b),
        Value::TinyInt(v) => JsonValue::from(*v),
        Value::SmallInt(v) => JsonValue::from(*v),
        Value::Int(v) => JsonValue::from(*v),
        Value::UTinyInt(v) => JsonValue::from(*v),
        Value::USmallInt(v) => JsonValue::from(*v),
        Value::UInt(v) => JsonValue::from(*v),
        Value::BigInt(v) => JsonValue::String(v.to_string()),
        Value::UBigInt(v) => JsonValue::String(v.to_string()),
        Value::HugeInt(v) => JsonValue::String(v.to_string()),
        Value::Float(v) => float_to_json(f64::from(*v)),
        Value::Double(v) => float_to_json(*v),
        Value::Decimal(d) => JsonValue::String(d.to_string()),
        Value::Text(s) | Value::Enum(s) => JsonValue::String(s.clone()),
        Value::Blob(bytes) => JsonValue::String(bytes.iter().map(|b| format!("{:02x}", b)).collect()),
        Value::Date32(days) => date_to_json(*days),
        Value::Timestamp(unit, v) => timestamp_to_json(*unit, *v),
        Value::Time64(unit, v) => time_to_json(*unit, *v),
        Value::List(items) | Value::Array(items) => JsonValue::Array(items.iter().map(to_json).collect()),
        other => JsonValue::String(format!("{:?}", other)),
    }
}

fn float_to_json(v: f64) -> JsonValue {
    Number::from_f64(v).map(JsonValue::Number).unwrap_or(JsonValue::Null)
}

fn to_micros(unit: TimeUnit, v: i64) -> i64 {
    match unit {
        TimeUnit::Second => v.saturating_mul(1_000_000),
        TimeUnit::Millisecond => v.saturating_mul(1_000),
        TimeUnit::Microsecond => v,
        TimeUnit::Nanosecond => v / 1_000,
    }
}

fn date_to_json(days: i32) -> JsonValue {
    NaiveDate::from_ymd_opt(1970, 1, 1)
        .and_then(|epoch| epoch.checked_add_signed(chrono::Duration::days(i64::from(days))))
        .map(|d| JsonValue::String(d.format("%Y-%m-%d").to_string()))
        .unwrap_or_else(|| JsonValue::from(days))
}

fn timestamp_to_json(unit: TimeUnit, v: i64) -> JsonValue {
    match DateTime::from_timestamp_micros(to_micros(unit, v)) {
        Some(ts) => JsonValue::String(ts.naive_utc().format("%Y-%m-%dT%H:%M:%S%.f").to_string()),
        None => JsonValue::String(v.to_string()),
    }
}

fn time_to_json(unit: TimeUnit, v: i64) -> JsonValue {
    let micros = to_micros(unit, v);
    let secs = micros.div_euclid(1_000_000);
    let nanos = micros.rem_euclid(1_000_000) * 1_000;
    u32::try_from(secs)
        .ok()
        .and_then(|s| NaiveTime::from_num_seconds_from_midnight_opt(s, nanos as u32))
        .map(|t| JsonValue::String(t.format("%H:%M:%S%.f").to_string()))
        .unwrap_or_else(|| JsonValue::String(v.to_string()))
}

/// Convert a result set to JSON objects keyed by column name, in column order
pub fn rows_to_json(result: &ResultSet) -> Vec<JsonValue> {
    result
        .rows
        .iter()
        .map(|row| {
            let obj: Map<String, JsonValue> = result
                .columns
                .iter()
                .zip(row.iter())
                .map(|(column, value)| (column.clone(), to_json(value)))
                .collect();
            JsonValue::Object(obj)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wide_integers_become_exact_strings() {
        assert_eq!(to_json(&Value::BigInt(i64::MAX)), json!("9223372036854775807"));
        assert_eq!(to_json(&Value::BigInt(-42)), json!("-42"));
        assert_eq!(to_json(&Value::UBigInt(u64::MAX)), json!("18446744073709551615"));
        assert_eq!(
            to_json(&Value::HugeInt(170141183460469231731687303715884105727)),
            json!("170141183460469231731687303715884105727")
        );
    }

    #[test]
    fn test_narrow_values_pass_through() {
        assert_eq!(to_json(&Value::Int(7)), json!(7));
        assert_eq!(to_json(&Value::SmallInt(-3)), json!(-3));
        assert_eq!(to_json(&Value::Double(1.5)), json!(1.5));
        assert_eq!(to_json(&Value::Double(f64::NAN)), JsonValue::Null);
        assert_eq!(to_json(&Value::Boolean(true)), json!(true));
        assert_eq!(to_json(&Value::Text("East".into())), json!("East"));
        assert_eq!(to_json(&Value::Null), JsonValue::Null);
    }

    #[test]
    fn test_temporal_values() {
        // 2024-01-05 is 19727 days after the epoch
        assert_eq!(to_json(&Value::Date32(19727)), json!("2024-01-05"));
        assert_eq!(
            to_json(&Value::Timestamp(TimeUnit::Microsecond, 1_704_412_800_000_000)),
            json!("2024-01-05T00:00:00")
        );
        assert_eq!(
            to_json(&Value::Time64(TimeUnit::Microsecond, 3_723_500_000)),
            json!("01:02:03.500")
        );
    }

    #[test]
    fn test_nested_and_binary_values() {
        let list = Value::List(vec![Value::BigInt(1), Value::Null]);
        assert_eq!(to_json(&list), json!(["1", null]));
        assert_eq!(to_json(&Value::Blob(vec![0xde, 0xad])), json!("dead"));
    }

    #[test]
    fn test_rows_keep_column_order() {
        let result = ResultSet {
            columns: vec!["z".to_string(), "a".to_string()],
            rows: vec![vec![Value::BigInt(10_000_000_000), Value::Text("x".into())]],
        };
        let rows = rows_to_json(&result);
        assert_eq!(rows.len(), 1);

        let keys: Vec<&String> = rows[0].as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["z", "a"]);
        assert_eq!(rows[0]["z"], json!("10000000000"));
    }
}
