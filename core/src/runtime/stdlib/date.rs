//! Dates: milliseconds since the epoch, always UTC

use chrono::{DateTime, NaiveDate, TimeZone, Utc};

use crate::runtime::control::{RtResult, RuntimeError};
use crate::runtime::value::{ObjectClass, ObjectRef, Value};

pub fn now_millis() -> f64 {
    Utc::now().timestamp_millis() as f64
}

/// Largest distance from the epoch a date may be, in milliseconds
pub const MAX_TIME_VALUE: f64 = 8.64e15;

/// Out-of-range time values become NaN
fn time_clip(ms: f64) -> f64 {
    if !ms.is_finite() || ms.abs() > MAX_TIME_VALUE {
        return f64::NAN;
    }
    ms.trunc()
}

/// ISO 8601 form, `None` for an invalid date
pub fn format_iso(ms: f64) -> Option<String> {
    if !ms.is_finite() {
        return None;
    }
    Utc.timestamp_millis_opt(ms as i64)
        .single()
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string())
}

/// ISO 8601 form used for display
pub fn iso_string(ms: f64) -> String {
    format_iso(ms).unwrap_or_else(|| "Invalid Date".to_string())
}

fn parse(text: &str) -> f64 {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return dt.timestamp_millis() as f64;
    }
    // Date-only forms are midnight UTC
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        if let Some(dt) = date.and_hms_opt(0, 0, 0) {
            return dt.and_utc().timestamp_millis() as f64;
        }
    }
    f64::NAN
}

fn date_value(ms: f64) -> Value {
    Value::Object(ObjectRef::with_class(ObjectClass::Date(ms)))
}

/// `new Date()`, `new Date(ms)`, `new Date(isoString)`, `new Date(y, m, d, ...)`
pub fn construct(args: &[Value]) -> RtResult<Value> {
    let ms = match args {
        [] => now_millis(),
        [Value::Str(s)] => parse(s),
        [Value::Object(obj)] => match obj.class() {
            ObjectClass::Date(ms) => ms,
            _ => f64::NAN,
        },
        [single] => single.to_number(),
        parts => {
            let field = |i: usize, default: f64| parts.get(i).map(|v| v.to_number()).unwrap_or(default);
            let fields = [
                field(0, f64::NAN),
                field(1, 0.0),
                field(2, 1.0),
                field(3, 0.0),
                field(4, 0.0),
                field(5, 0.0),
                field(6, 0.0),
            ];
            if fields.iter().any(|f| !f.is_finite()) {
                f64::NAN
            } else {
                from_fields(fields)
            }
        }
    };
    Ok(date_value(time_clip(ms)))
}

/// Calendar fields to epoch millis; month overflow rolls into the year
fn from_fields([year, month, day, hours, minutes, seconds, millis]: [f64; 7]) -> f64 {
    let total_months = year as i64 * 12 + month as i64;
    let (y, m) = (total_months.div_euclid(12), total_months.rem_euclid(12));
    let Some(first) = NaiveDate::from_ymd_opt(y as i32, m as u32 + 1, 1) else {
        return f64::NAN;
    };
    let Some(midnight) = first.and_hms_opt(0, 0, 0) else {
        return f64::NAN;
    };
    midnight.and_utc().timestamp_millis() as f64
        + (day - 1.0) * 86_400_000.0
        + hours * 3_600_000.0
        + minutes * 60_000.0
        + seconds * 1000.0
        + millis
}

fn millis_of(this: &Value, method: &str) -> RtResult<f64> {
    match this {
        Value::Object(obj) => match obj.class() {
            ObjectClass::Date(ms) => Ok(ms),
            _ => Err(RuntimeError::type_error(format!("this is not a Date object. ({})", method))),
        },
        _ => Err(RuntimeError::type_error(format!("this is not a Date object. ({})", method))),
    }
}

pub fn to_iso(this: &Value) -> RtResult<Value> {
    let ms = millis_of(this, "toISOString")?;
    format_iso(ms)
        .map(Value::Str)
        .ok_or_else(|| RuntimeError::range_error("Invalid time value"))
}

pub fn get_time(this: &Value) -> RtResult<Value> {
    Ok(Value::Num(millis_of(this, "getTime")?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iso_string() {
        assert_eq!(iso_string(0.0), "1970-01-01T00:00:00.000Z");
        assert_eq!(iso_string(1_700_000_000_123.0), "2023-11-14T22:13:20.123Z");
        assert_eq!(iso_string(f64::NAN), "Invalid Date");
    }

    #[test]
    fn test_construct_from_string() {
        let d = construct(&[Value::from("2024-01-02T03:04:05.006Z")]).unwrap();
        assert_eq!(to_iso(&d).unwrap().as_str(), Some("2024-01-02T03:04:05.006Z"));
        let day = construct(&[Value::from("2024-01-02")]).unwrap();
        assert_eq!(to_iso(&day).unwrap().as_str(), Some("2024-01-02T00:00:00.000Z"));
    }

    #[test]
    fn test_construct_from_fields() {
        let d = construct(&[Value::from(2024), Value::from(12), Value::from(1)]).unwrap();
        assert_eq!(to_iso(&d).unwrap().as_str(), Some("2025-01-01T00:00:00.000Z"));
    }

    #[test]
    fn test_time_values_past_the_limit_are_invalid() {
        let edge = construct(&[Value::from(MAX_TIME_VALUE)]).unwrap();
        assert_eq!(get_time(&edge).unwrap().as_f64(), Some(MAX_TIME_VALUE));
        let past = construct(&[Value::from(MAX_TIME_VALUE + 1.0)]).unwrap();
        assert!(get_time(&past).unwrap().as_f64().unwrap().is_nan());
        assert_eq!(to_iso(&past).unwrap_err(), RuntimeError::range_error("Invalid time value"));
        let before = construct(&[Value::from(-MAX_TIME_VALUE - 1.0)]).unwrap();
        assert!(to_iso(&before).is_err());
    }

    #[test]
    fn test_invalid_date() {
        let d = construct(&[Value::from("not a date")]).unwrap();
        assert!(get_time(&d).unwrap().as_f64().unwrap().is_nan());
        assert!(to_iso(&d).is_err());
    }
}
