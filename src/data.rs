use std::{fmt, str::FromStr};

use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::{Decimal, prelude::ToPrimitive};

use crate::{
    error::InferenceError,
    inference::{DECIMAL_SCALE, SqlType},
    reconcile::ColumnDef,
    rows::Row,
};

/// Date layouts recognised in CSV input, in priority order.
pub const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%d-%m-%Y", "%Y/%m/%d"];

const DATETIME_TIME_FORMATS: &[&str] = &[" %H:%M:%S", "T%H:%M:%S"];

const MAX_EXPONENT: u32 = 28;

const NULL_TOKENS: &[&str] = &["null", "na", "n/a", "nan", "none", "#n/a"];

const TRUE_TOKENS: &[&str] = &["true", "1", "yes", "y"];
const FALSE_TOKENS: &[&str] = &["false", "0", "no", "n"];

/// A single CSV field after it has been typed against a column.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    Null,
    Boolean(bool),
    Integer(i64),
    Decimal(Decimal),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Text(String),
}

impl Value {
    /// Types a raw CSV field for `ty`. Returns `None` when the field does not
    /// fit the column.
    pub fn from_field(raw: &str, ty: SqlType) -> Option<Value> {
        let trimmed = raw.trim();
        if is_null_token(trimmed) {
            return Some(Value::Null);
        }
        match ty {
            SqlType::Boolean => parse_boolean(trimmed).map(Value::Boolean),
            SqlType::TinyInt | SqlType::SmallInt | SqlType::Int | SqlType::BigInt => {
                parse_integer(trimmed)
                    .filter(|value| ty.fits_integer(*value))
                    .map(Value::Integer)
            }
            SqlType::Decimal => {
                parse_number(trimmed).map(|number| Value::Decimal(number.round_dp(DECIMAL_SCALE)))
            }
            SqlType::Date => parse_naive_date(trimmed).map(Value::Date),
            SqlType::DateTime => parse_naive_datetime(trimmed).map(Value::DateTime),
            SqlType::Varchar(limit) => {
                (raw.chars().count() <= limit).then(|| Value::Text(raw.to_string()))
            }
            SqlType::Text => Some(Value::Text(raw.to_string())),
        }
    }

    /// Normalises a value read back from the database to the representation
    /// [`Value::from_field`] produces for the same column type, so rows can be
    /// compared structurally.
    pub fn conform(self, ty: SqlType) -> Value {
        match (self, ty) {
            (Value::Null, _) => Value::Null,
            (Value::Integer(i), SqlType::Boolean) => Value::Boolean(i != 0),
            (Value::Text(text), SqlType::Boolean) => match parse_boolean(text.trim()) {
                Some(flag) => Value::Boolean(flag),
                None => Value::Text(text),
            },
            (Value::Integer(i), SqlType::Decimal) => Value::Decimal(Decimal::from(i)),
            (Value::Decimal(d), SqlType::Decimal) => Value::Decimal(d.round_dp(DECIMAL_SCALE)),
            (Value::Decimal(d), ty) if ty.is_integer() && d.fract().is_zero() => d
                .to_i64()
                .map(Value::Integer)
                .unwrap_or(Value::Decimal(d)),
            (Value::Text(text), ty) if ty.is_integer() || ty == SqlType::Decimal => {
                Value::from_field(&text, ty).unwrap_or(Value::Text(text))
            }
            (Value::Text(text), SqlType::Date) => match parse_naive_date(text.trim()) {
                Some(date) => Value::Date(date),
                None => Value::Text(text),
            },
            (Value::Text(text), SqlType::DateTime) => match parse_naive_datetime(text.trim()) {
                Some(datetime) => Value::DateTime(datetime),
                None => Value::Text(text),
            },
            (Value::Integer(i), SqlType::Varchar(_) | SqlType::Text) => Value::Text(i.to_string()),
            (Value::Decimal(d), SqlType::Varchar(_) | SqlType::Text) => Value::Text(d.to_string()),
            (value, _) => value,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_display(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Boolean(b) => b.to_string(),
            Value::Integer(i) => i.to_string(),
            Value::Decimal(d) => d.to_string(),
            Value::Date(d) => d.format("%Y-%m-%d").to_string(),
            Value::DateTime(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
            Value::Text(s) => s.clone(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_display())
    }
}

/// Types every field of `row` against the matching column definition.
pub fn coerce_row(row: &Row, columns: &[ColumnDef]) -> Result<Vec<Value>, InferenceError> {
    row.fields
        .iter()
        .zip(columns)
        .map(|(raw, column)| {
            Value::from_field(raw, column.sql_type).ok_or_else(|| InferenceError::ValueMismatch {
                row: row.line,
                column: column.name.clone(),
                value: raw.clone(),
                sql_type: column.sql_type,
            })
        })
        .collect()
}

/// Blank fields and the usual spreadsheet placeholders count as SQL NULL.
pub fn is_null_token(trimmed: &str) -> bool {
    trimmed.is_empty()
        || NULL_TOKENS
            .iter()
            .any(|token| token.eq_ignore_ascii_case(trimmed))
}

pub fn is_boolean_token(trimmed: &str) -> bool {
    parse_boolean(trimmed).is_some()
}

pub fn parse_boolean(trimmed: &str) -> Option<bool> {
    if TRUE_TOKENS.iter().any(|t| t.eq_ignore_ascii_case(trimmed)) {
        Some(true)
    } else if FALSE_TOKENS.iter().any(|t| t.eq_ignore_ascii_case(trimmed)) {
        Some(false)
    } else {
        None
    }
}

pub fn parse_number(trimmed: &str) -> Option<Decimal> {
    // rust_decimal skips `_` separators; "1_000" stays text here.
    if trimmed.contains('_') || !trimmed.bytes().any(|b| b.is_ascii_digit()) {
        return None;
    }
    if let Some((_, exponent)) = trimmed.split_once(['e', 'E']) {
        let magnitude = exponent.parse::<i32>().ok()?.unsigned_abs();
        if magnitude > MAX_EXPONENT {
            return None;
        }
        return Decimal::from_scientific(trimmed).ok();
    }
    Decimal::from_str(trimmed).ok()
}

/// Integral numbers that fit in an `i64`. `"2.0"` counts as the integer 2.
pub fn parse_integer(trimmed: &str) -> Option<i64> {
    parse_number(trimmed)
        .filter(|number| number.fract().is_zero())
        .and_then(|number| number.to_i64())
}

pub fn parse_naive_date(value: &str) -> Option<NaiveDate> {
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
}

pub fn parse_naive_datetime(value: &str) -> Option<NaiveDateTime> {
    DATE_FORMATS.iter().find_map(|date_fmt| {
        DATETIME_TIME_FORMATS.iter().find_map(|time_fmt| {
            NaiveDateTime::parse_from_str(value, &format!("{date_fmt}{time_fmt}")).ok()
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn decimal(value: &str) -> Decimal {
        Decimal::from_str(value).unwrap()
    }

    #[test]
    fn parse_naive_date_supports_recognised_layouts() {
        let expected = NaiveDate::from_ymd_opt(2024, 5, 6).unwrap();
        assert_eq!(parse_naive_date("2024-05-06"), Some(expected));
        assert_eq!(parse_naive_date("05/06/2024"), Some(expected));
        assert_eq!(parse_naive_date("06-05-2024"), Some(expected));
        assert_eq!(parse_naive_date("2024/05/06"), Some(expected));
        assert_eq!(parse_naive_date("2024-05-06 10:00:00"), None);
        assert_eq!(parse_naive_date("yesterday"), None);
    }

    #[test]
    fn parse_naive_datetime_accepts_space_and_t_separators() {
        let expected = NaiveDate::from_ymd_opt(2024, 5, 6)
            .unwrap()
            .and_hms_opt(14, 30, 0)
            .unwrap();
        assert_eq!(parse_naive_datetime("2024-05-06 14:30:00"), Some(expected));
        assert_eq!(parse_naive_datetime("2024-05-06T14:30:00"), Some(expected));
        assert_eq!(parse_naive_datetime("05/06/2024 14:30:00"), Some(expected));
        assert_eq!(parse_naive_datetime("2024-05-06"), None);
    }

    #[test]
    fn null_tokens_are_case_insensitive() {
        assert!(is_null_token(""));
        assert!(is_null_token("NULL"));
        assert!(is_null_token("N/A"));
        assert!(is_null_token("NaN"));
        assert!(!is_null_token("n"));
        assert!(!is_null_token("0"));
    }

    #[test]
    fn numbers_parse_plain_and_scientific_forms() {
        assert_eq!(parse_number("3.25"), Some(decimal("3.25")));
        assert_eq!(parse_number("-7"), Some(decimal("-7")));
        assert_eq!(parse_number("1e3"), Some(decimal("1000")));
        assert_eq!(parse_number("abc"), None);
        assert_eq!(parse_number("-"), None);
        assert_eq!(parse_number("1_000"), None);
        assert_eq!(parse_number("7__"), None);
        assert_eq!(parse_number("1e_3"), None);
        assert_eq!(parse_integer("2.0"), Some(2));
        assert_eq!(parse_integer("2.5"), None);
        assert_eq!(parse_integer("99999999999999999999"), None);
    }

    #[test]
    fn from_field_types_values_per_column() {
        assert_eq!(
            Value::from_field("Yes", SqlType::Boolean),
            Some(Value::Boolean(true))
        );
        assert_eq!(Value::from_field("maybe", SqlType::Boolean), None);
        assert_eq!(
            Value::from_field("127", SqlType::TinyInt),
            Some(Value::Integer(127))
        );
        assert_eq!(Value::from_field("128", SqlType::TinyInt), None);
        assert_eq!(Value::from_field("1_000", SqlType::Int), None);
        assert_eq!(
            Value::from_field("2.499", SqlType::Decimal),
            Some(Value::Decimal(decimal("2.50")))
        );
        assert_eq!(Value::from_field("", SqlType::Int), Some(Value::Null));
        assert_eq!(Value::from_field("abcdef", SqlType::Varchar(5)), None);
        assert_eq!(
            Value::from_field(" padded ", SqlType::Text),
            Some(Value::Text(" padded ".to_string()))
        );
    }

    #[test]
    fn conform_matches_values_read_back_from_storage() {
        let typed = Value::from_field("2.50", SqlType::Decimal).unwrap();
        let stored = Value::Decimal(Decimal::from_f64_retain(2.5).unwrap());
        assert_eq!(stored.conform(SqlType::Decimal), typed);

        let whole = Value::from_field("3.00", SqlType::Decimal).unwrap();
        assert_eq!(Value::Integer(3).conform(SqlType::Decimal), whole);

        assert_eq!(
            Value::Integer(1).conform(SqlType::Boolean),
            Value::Boolean(true)
        );
        assert_eq!(
            Value::Text("2024-01-05".to_string()).conform(SqlType::Date),
            Value::from_field("01/05/2024", SqlType::Date).unwrap()
        );
        assert_eq!(
            Value::Integer(7).conform(SqlType::Varchar(10)),
            Value::Text("7".to_string())
        );
    }

    #[test]
    fn coerce_row_reports_row_and_column_context() {
        let columns = vec![
            ColumnDef::new("id", SqlType::TinyInt),
            ColumnDef::new("name", SqlType::Varchar(5)),
        ];
        let good = Row::new(2, vec!["1".to_string(), "a".to_string()]);
        assert_eq!(
            coerce_row(&good, &columns).unwrap(),
            vec![Value::Integer(1), Value::Text("a".to_string())]
        );

        let bad = Row::new(9, vec!["one".to_string(), "a".to_string()]);
        let err = coerce_row(&bad, &columns).expect_err("text in integer column");
        let message = err.to_string();
        assert!(message.contains("Row 9"));
        assert!(message.contains("'id'"));
        assert!(message.contains("TINYINT"));
    }
}
