use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

/// Epoch values below this are seconds, anything above is milliseconds.
/// `1e11` seconds is past year 5000 and `1e11` ms is early 1973.
const SECONDS_CEILING: f64 = 1e11;

/// Composer and prompt-log records carry epoch millis (integer or float),
/// occasionally epoch seconds, and RFC 3339 strings in a few places.
pub fn parse_timestamp_value(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => n.as_f64().and_then(from_epoch),
        Value::String(s) => {
            let s = s.trim();
            DateTime::parse_from_rfc3339(s)
                .map(|dt| dt.with_timezone(&Utc))
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(from_epoch))
        }
        _ => None,
    }
}

fn from_epoch(raw: f64) -> Option<DateTime<Utc>> {
    if !raw.is_finite() || raw <= 0.0 {
        return None;
    }
    let millis = if raw < SECONDS_CEILING { raw * 1000.0 } else { raw };
    Utc.timestamp_millis_opt(millis.round() as i64).single()
}

/// Counters in stored payloads are usually integers but occasionally floats.
pub fn count_from_value(value: &Value) -> u64 {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f > 0.0).map(|f| f.round() as u64))
            .unwrap_or(0),
        Value::String(s) => s.trim().parse::<u64>().unwrap_or(0),
        _ => 0,
    }
}

/// Like [`count_from_value`] but keeps the fraction, for sums rounded later.
pub fn amount_from_value(value: &Value) -> Option<f64> {
    let amount = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    amount.filter(|f| f.is_finite())
}
