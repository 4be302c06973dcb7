use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde_json::{Map, Value};
use sqlx::postgres::types::PgInterval;
use sqlx::postgres::PgRow;
use sqlx::types::BigDecimal;
use sqlx::{Column, Row, TypeInfo};
use uuid::Uuid;

const UNSUPPORTED: &str = "[unsupported SQL type]";

/// Project a row into a JSON object. The single column `*` takes every
/// column of the result row; named columns are copied in declaration order,
/// absent ones as `null`.
pub fn row_to_object(row: &PgRow, columns: &[String]) -> Map<String, Value> {
    let mut obj = Map::new();
    if columns.len() == 1 && columns[0] == "*" {
        for (i, col) in row.columns().iter().enumerate() {
            obj.insert(col.name().to_string(), value_at(row, i));
        }
    } else {
        for name in columns {
            let value = row
                .columns()
                .iter()
                .position(|c| c.name() == name)
                .map(|i| value_at(row, i))
                .unwrap_or(Value::Null);
            obj.insert(name.clone(), value);
        }
    }
    obj
}

macro_rules! fetch {
    ($row:expr, $i:expr, $ty:ty, $conv:expr) => {
        match $row.try_get::<Option<$ty>, _>($i) {
            Ok(Some(v)) => $conv(v),
            Ok(None) => Value::Null,
            Err(_) => Value::String(UNSUPPORTED.to_string()),
        }
    };
}

/// Convert one column of a row to JSON by PostgreSQL type: text to string,
/// numerics to number, bool to boolean, temporal types to ISO strings,
/// one-dimensional arrays to JSON arrays, and anything unrecognised to the
/// `"[unsupported SQL type]"` marker.
pub fn value_at(row: &PgRow, i: usize) -> Value {
    let type_name = row.columns()[i].type_info().name().to_uppercase();
    match type_name.as_str() {
        "TEXT" | "VARCHAR" | "CHAR" | "BPCHAR" | "NAME" | "CITEXT" => {
            fetch!(row, i, String, Value::String)
        }
        "BYTEA" => fetch!(row, i, Vec<u8>, |v: Vec<u8>| {
            Value::String(String::from_utf8_lossy(&v).into_owned())
        }),
        "INT2" => fetch!(row, i, i16, |v: i16| Value::from(v)),
        "INT4" => fetch!(row, i, i32, Value::from),
        "INT8" => fetch!(row, i, i64, Value::from),
        "FLOAT4" => fetch!(row, i, f32, Value::from),
        "FLOAT8" => fetch!(row, i, f64, Value::from),
        "NUMERIC" => fetch!(row, i, BigDecimal, |v: BigDecimal| {
            let text = v.to_string();
            text.parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
                .unwrap_or(Value::String(text))
        }),
        "BOOL" => fetch!(row, i, bool, Value::Bool),
        "JSON" | "JSONB" => fetch!(row, i, Value, |v| v),
        "UUID" => fetch!(row, i, Uuid, |v: Uuid| Value::String(v.to_string())),
        "DATE" => fetch!(row, i, NaiveDate, |v: NaiveDate| {
            Value::String(v.format("%Y-%m-%d").to_string())
        }),
        "TIME" => fetch!(row, i, NaiveTime, |v: NaiveTime| {
            Value::String(v.format("%H:%M:%S%.f").to_string())
        }),
        "TIMESTAMP" => fetch!(row, i, NaiveDateTime, |v: NaiveDateTime| {
            Value::String(v.format("%Y-%m-%dT%H:%M:%S%.f").to_string())
        }),
        "TIMESTAMPTZ" => fetch!(row, i, DateTime<Utc>, |v: DateTime<Utc>| {
            Value::String(v.to_rfc3339())
        }),
        "INTERVAL" => fetch!(row, i, PgInterval, |v: PgInterval| {
            Value::String(interval_iso(&v))
        }),
        "TEXT[]" | "VARCHAR[]" => fetch!(row, i, Vec<String>, Value::from),
        "INT2[]" => fetch!(row, i, Vec<i16>, |v: Vec<i16>| Value::from(v)),
        "INT4[]" => fetch!(row, i, Vec<i32>, Value::from),
        "INT8[]" => fetch!(row, i, Vec<i64>, Value::from),
        "FLOAT8[]" => fetch!(row, i, Vec<f64>, Value::from),
        "BOOL[]" => fetch!(row, i, Vec<bool>, Value::from),
        _ => Value::String(UNSUPPORTED.to_string()),
    }
}

/// ISO 8601 duration text for a PostgreSQL interval.
fn interval_iso(v: &PgInterval) -> String {
    let seconds = v.microseconds as f64 / 1_000_000.0;
    format!("P{}M{}DT{}S", v.months, v.days, seconds)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval_iso() {
        let v = PgInterval { months: 2, days: 3, microseconds: 90_500_000 };
        assert_eq!(interval_iso(&v), "P2M3DT90.5S");
    }

    #[test]
    fn test_interval_iso_zero() {
        let v = PgInterval { months: 0, days: 0, microseconds: 0 };
        assert_eq!(interval_iso(&v), "P0M0DT0S");
    }
}
