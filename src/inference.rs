//! Column type inference.
//!
//! [`ColumnProfile`] accumulates observations one field at a time and
//! [`ColumnProfile::decide`] applies the classification rules in priority
//! order (first match wins):
//!
//! 1. no non-null values: `TEXT`
//! 2. every value is a boolean token: `BOOLEAN`
//! 3. every value is an integral number: the narrowest integer type that
//!    holds the observed minimum and maximum
//! 4. every value is numeric and at least one is fractional: `DECIMAL(10,2)`
//! 5. the first value looks like a date and every value parses as one: `DATE`
//! 6. the first value looks like a date-time and every value parses: `DATETIME`
//! 7. otherwise `VARCHAR(n)` with 20% headroom, or `TEXT` past the limit
//!
//! Classification is all-or-nothing: a single value that fails a rule
//! disqualifies that rule for the whole column. Mixed columns therefore fall
//! through to `VARCHAR`/`TEXT` and never produce an error.

use std::{fmt, sync::OnceLock};

use regex::Regex;
use rust_decimal::prelude::ToPrimitive;
use serde::{Serialize, Serializer};

use crate::data::{
    is_boolean_token, is_null_token, parse_naive_date, parse_naive_datetime, parse_number,
};

/// `DECIMAL` columns use a fixed precision; it does not adapt to the data.
pub const DECIMAL_PRECISION: u32 = 10;
pub const DECIMAL_SCALE: u32 = 2;
pub const DEFAULT_MAX_VARCHAR_LENGTH: usize = 255;

const VARCHAR_HEADROOM: f64 = 1.2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SqlType {
    Boolean,
    TinyInt,
    SmallInt,
    Int,
    BigInt,
    Decimal,
    Date,
    DateTime,
    Varchar(usize),
    Text,
}

impl SqlType {
    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            SqlType::TinyInt | SqlType::SmallInt | SqlType::Int | SqlType::BigInt
        )
    }

    pub fn integer_bounds(&self) -> Option<(i64, i64)> {
        match self {
            SqlType::TinyInt => Some((i8::MIN.into(), i8::MAX.into())),
            SqlType::SmallInt => Some((i16::MIN.into(), i16::MAX.into())),
            SqlType::Int => Some((i32::MIN.into(), i32::MAX.into())),
            SqlType::BigInt => Some((i64::MIN, i64::MAX)),
            _ => None,
        }
    }

    pub fn fits_integer(&self, value: i64) -> bool {
        self.integer_bounds()
            .is_some_and(|(min, max)| (min..=max).contains(&value))
    }

    /// Narrowest integer type holding both `min` and `max`.
    pub fn narrowest_integer(min: i64, max: i64) -> SqlType {
        [SqlType::TinyInt, SqlType::SmallInt, SqlType::Int]
            .into_iter()
            .find(|ty| ty.fits_integer(min) && ty.fits_integer(max))
            .unwrap_or(SqlType::BigInt)
    }

    /// Maps a declared column type read from an existing table back to the
    /// closest inferred type. Unknown declarations are treated as `TEXT`.
    pub fn from_declared(declared: &str) -> SqlType {
        let normalized = declared.trim().to_ascii_uppercase();
        let (base, args) = match normalized.split_once('(') {
            Some((base, rest)) => (base.trim(), rest.trim_end_matches(')').trim()),
            None => (normalized.as_str(), ""),
        };
        match base {
            "BOOLEAN" | "BOOL" => SqlType::Boolean,
            "TINYINT" => SqlType::TinyInt,
            "SMALLINT" | "INT2" => SqlType::SmallInt,
            "INT" | "INT4" | "MEDIUMINT" => SqlType::Int,
            "BIGINT" | "INT8" | "INTEGER" => SqlType::BigInt,
            "DECIMAL" | "NUMERIC" => SqlType::Decimal,
            "DATE" => SqlType::Date,
            "DATETIME" | "TIMESTAMP" => SqlType::DateTime,
            "VARCHAR" | "CHARACTER VARYING" | "CHAR" | "CHARACTER" => args
                .parse::<usize>()
                .map(SqlType::Varchar)
                .unwrap_or(SqlType::Text),
            _ => SqlType::Text,
        }
    }
}

impl fmt::Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlType::Boolean => f.write_str("BOOLEAN"),
            SqlType::TinyInt => f.write_str("TINYINT"),
            SqlType::SmallInt => f.write_str("SMALLINT"),
            SqlType::Int => f.write_str("INT"),
            SqlType::BigInt => f.write_str("BIGINT"),
            SqlType::Decimal => write!(f, "DECIMAL({DECIMAL_PRECISION},{DECIMAL_SCALE})"),
            SqlType::Date => f.write_str("DATE"),
            SqlType::DateTime => f.write_str("DATETIME"),
            SqlType::Varchar(length) => write!(f, "VARCHAR({length})"),
            SqlType::Text => f.write_str("TEXT"),
        }
    }
}

impl Serialize for SqlType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

fn date_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(\d{4}-\d{2}-\d{2}|\d{2}/\d{2}/\d{4}|\d{2}-\d{2}-\d{4}|\d{4}/\d{2}/\d{2})$")
            .expect("valid date pattern")
    })
}

fn datetime_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"^(\d{4}-\d{2}-\d{2}|\d{2}/\d{2}/\d{4}|\d{2}-\d{2}-\d{4}|\d{4}/\d{2}/\d{2})[ T]\d{2}:\d{2}:\d{2}$",
        )
        .expect("valid datetime pattern")
    })
}

pub fn looks_like_date(value: &str) -> bool {
    date_pattern().is_match(value)
}

pub fn looks_like_datetime(value: &str) -> bool {
    datetime_pattern().is_match(value)
}

/// Streaming accumulator for one column's values.
#[derive(Debug, Clone, Default)]
pub struct ColumnProfile {
    non_null: usize,
    nulls: usize,
    first_value: Option<String>,
    boolean_matches: usize,
    numeric_matches: usize,
    integer_matches: usize,
    integer_range: Option<(i64, i64)>,
    fractional_seen: bool,
    date_matches: usize,
    datetime_matches: usize,
    max_length: usize,
}

impl ColumnProfile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, value: &str) {
        let trimmed = value.trim();
        if is_null_token(trimmed) {
            self.nulls += 1;
            return;
        }

        self.non_null += 1;
        if self.first_value.is_none() {
            self.first_value = Some(trimmed.to_string());
        }
        self.max_length = self.max_length.max(value.chars().count());

        if is_boolean_token(trimmed) {
            self.boolean_matches += 1;
        }

        if let Some(number) = parse_number(trimmed) {
            self.numeric_matches += 1;
            if !number.fract().is_zero() {
                self.fractional_seen = true;
            } else if let Some(integer) = number.to_i64() {
                self.integer_matches += 1;
                self.integer_range = Some(match self.integer_range {
                    Some((min, max)) => (min.min(integer), max.max(integer)),
                    None => (integer, integer),
                });
            }
        }

        if parse_naive_date(trimmed).is_some() {
            self.date_matches += 1;
        }
        if parse_naive_datetime(trimmed).is_some() {
            self.datetime_matches += 1;
        }
    }

    pub fn non_null(&self) -> usize {
        self.non_null
    }

    pub fn nulls(&self) -> usize {
        self.nulls
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }

    pub fn decide(&self, max_varchar_length: usize) -> SqlType {
        if self.non_null == 0 {
            return SqlType::Text;
        }
        if self.boolean_matches == self.non_null {
            return SqlType::Boolean;
        }
        if self.integer_matches == self.non_null
            && let Some((min, max)) = self.integer_range
        {
            return SqlType::narrowest_integer(min, max);
        }
        if self.numeric_matches == self.non_null && self.fractional_seen {
            return SqlType::Decimal;
        }
        let first = self.first_value.as_deref().unwrap_or_default();
        if looks_like_date(first) && self.date_matches == self.non_null {
            return SqlType::Date;
        }
        if looks_like_datetime(first) && self.datetime_matches == self.non_null {
            return SqlType::DateTime;
        }
        varchar_or_text(self.max_length, max_varchar_length)
    }
}

/// `VARCHAR` sized at 120% of the longest value (capped at the limit), or
/// `TEXT` once the longest value exceeds the limit.
pub fn varchar_or_text(max_length: usize, max_varchar_length: usize) -> SqlType {
    if max_length > max_varchar_length {
        return SqlType::Text;
    }
    let padded = (max_length as f64 * VARCHAR_HEADROOM).round() as usize;
    SqlType::Varchar(padded.clamp(1, max_varchar_length.max(1)))
}

/// Infers the SQL type of a column from its values.
pub fn infer<I, S>(values: I, max_varchar_length: usize) -> SqlType
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut profile = ColumnProfile::new();
    for value in values {
        profile.observe(value.as_ref());
    }
    profile.decide(max_varchar_length)
}
