//! Normalises raw rows by declared column type before deserialising.
//!
//! Transports return cells in whatever form the backend produces: the HTTP
//! endpoint sends every value as text, SQLite sends integers for booleans
//! and text for timestamps. Decoding rewrites each declared column into the
//! JSON shape its Rust type expects.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde_json::Value as Json;
use wicket_schema::EntityDef;
use wicket_types::ColumnType;

use crate::transport::Row;

/// Normalises every declared column present in `row`.
pub(crate) fn normalize_row(def: &EntityDef, mut row: Row) -> Result<Row, String> {
    for column in &def.columns {
        if let Some(cell) = row.get_mut(&column.name) {
            let raw = std::mem::take(cell);
            *cell = normalize(column.ty, raw)
                .map_err(|message| format!("column '{}': {message}", column.name))?;
        }
    }
    Ok(row)
}

/// Normalises one cell.
pub(crate) fn normalize(ty: ColumnType, cell: Json) -> Result<Json, String> {
    if cell.is_null() {
        return Ok(Json::Null);
    }

    match ty {
        ColumnType::Serial | ColumnType::BigInt | ColumnType::Integer => match cell {
            Json::Number(n) if n.is_i64() => Ok(Json::Number(n)),
            Json::String(s) => s
                .trim()
                .parse::<i64>()
                .map(Json::from)
                .map_err(|_| format!("'{s}' is not an integer")),
            other => Err(format!("expected an integer, got {other}")),
        },
        ColumnType::Float => match cell {
            Json::Number(n) => n
                .as_f64()
                .map(Json::from)
                .ok_or_else(|| format!("{n} is not a float")),
            Json::String(s) => s
                .trim()
                .parse::<f64>()
                .map(Json::from)
                .map_err(|_| format!("'{s}' is not a number")),
            other => Err(format!("expected a number, got {other}")),
        },
        ColumnType::Boolean => match cell {
            Json::Bool(b) => Ok(Json::Bool(b)),
            Json::Number(n) => match n.as_i64() {
                Some(0) => Ok(Json::Bool(false)),
                Some(1) => Ok(Json::Bool(true)),
                _ => Err(format!("{n} is not a boolean")),
            },
            Json::String(s) => match s.as_str() {
                "t" | "true" | "1" => Ok(Json::Bool(true)),
                "f" | "false" | "0" => Ok(Json::Bool(false)),
                _ => Err(format!("'{s}' is not a boolean")),
            },
            other => Err(format!("expected a boolean, got {other}")),
        },
        ColumnType::Text => match cell {
            Json::String(s) => Ok(Json::String(s)),
            Json::Number(n) => Ok(Json::String(n.to_string())),
            other => Err(format!("expected text, got {other}")),
        },
        ColumnType::Timestamp => match cell {
            Json::String(s) => parse_timestamp(&s)
                .map(|ts| Json::String(ts.to_rfc3339_opts(SecondsFormat::Micros, true)))
                .ok_or_else(|| format!("'{s}' is not a timestamp")),
            other => Err(format!("expected a timestamp, got {other}")),
        },
        ColumnType::Json => match cell {
            Json::String(s) => {
                serde_json::from_str(&s).map_err(|e| format!("invalid JSON document: {e}"))
            }
            other => Ok(other),
        },
    }
}

/// Parses RFC 3339 and the Postgres text form (`2024-03-01 10:00:00.5+00`).
/// A timestamp without an offset is taken as UTC.
fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Some(ts.with_timezone(&Utc));
    }
    if let Ok(ts) = DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f%#z") {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn text_protocol_cells_are_typed() {
        assert_eq!(normalize(ColumnType::Serial, json!("42")), Ok(json!(42)));
        assert_eq!(normalize(ColumnType::Float, json!("49.99")), Ok(json!(49.99)));
        assert_eq!(normalize(ColumnType::Boolean, json!("t")), Ok(json!(true)));
        assert_eq!(normalize(ColumnType::Boolean, json!(0)), Ok(json!(false)));
        assert_eq!(
            normalize(ColumnType::Json, json!("{\"grip\":\"round\"}")),
            Ok(json!({"grip": "round"}))
        );
        assert_eq!(normalize(ColumnType::Text, Json::Null), Ok(Json::Null));
    }

    #[test]
    fn integers_widen_to_floats() {
        assert_eq!(normalize(ColumnType::Float, json!(50)), Ok(json!(50.0)));
    }

    #[test]
    fn timestamps_normalise_to_rfc3339_utc() {
        let expected = json!("2024-03-01T10:00:00.500000Z");
        assert_eq!(
            normalize(ColumnType::Timestamp, json!("2024-03-01 10:00:00.5+00")),
            Ok(expected.clone())
        );
        assert_eq!(
            normalize(ColumnType::Timestamp, json!("2024-03-01T11:00:00.5+01:00")),
            Ok(expected.clone())
        );
        assert_eq!(
            normalize(ColumnType::Timestamp, json!("2024-03-01 10:00:00.5")),
            Ok(expected)
        );
    }

    #[test]
    fn malformed_cells_are_reported() {
        assert!(normalize(ColumnType::Integer, json!("twelve")).is_err());
        assert!(normalize(ColumnType::Boolean, json!("maybe")).is_err());
        assert!(normalize(ColumnType::Timestamp, json!(12)).is_err());
    }
}
