//! SQL dialects and statement rendering.
//!
//! Only sanitized identifiers are interpolated into statement text, and they
//! are always quoted. Values travel as bound parameters.

use std::{fmt, str::FromStr};

use clap::ValueEnum;
use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::{error::InferenceError, inference::SqlType, reconcile::ColumnDef};

const MYSQL_MAX_VARCHAR: usize = 65_535;
const POSTGRES_MAX_VARCHAR: usize = 10_485_760;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, ValueEnum, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    #[default]
    Sqlite,
    Mysql,
    #[value(alias = "postgresql")]
    #[serde(alias = "postgresql")]
    Postgres,
}

impl Dialect {
    /// Quotes `name`, doubling any embedded quote character. Column names
    /// read back from an existing table are not necessarily sanitized.
    pub fn quote_identifier(&self, name: &str) -> String {
        match self {
            Dialect::Mysql => format!("`{}`", name.replace('`', "``")),
            Dialect::Sqlite | Dialect::Postgres => format!("\"{}\"", name.replace('"', "\"\"")),
        }
    }

    /// Longest `VARCHAR` the dialect accepts, if it has a limit.
    pub fn max_varchar_length(&self) -> Option<usize> {
        match self {
            Dialect::Sqlite => None,
            Dialect::Mysql => Some(MYSQL_MAX_VARCHAR),
            Dialect::Postgres => Some(POSTGRES_MAX_VARCHAR),
        }
    }

    /// Column type as written in this dialect's DDL. The error carries the
    /// reason the type cannot be expressed.
    pub fn render_type(&self, ty: SqlType) -> Result<String, String> {
        if let SqlType::Varchar(length) = ty {
            if length == 0 {
                return Err("VARCHAR length must be positive".to_string());
            }
            if let Some(limit) = self.max_varchar_length()
                && length > limit
            {
                return Err(format!("VARCHAR length {length} exceeds the limit of {limit}"));
            }
        }
        let rendered = match (self, ty) {
            (Dialect::Postgres, SqlType::TinyInt) => "SMALLINT".to_string(),
            (Dialect::Postgres, SqlType::DateTime) => "TIMESTAMP".to_string(),
            (_, ty) => ty.to_string(),
        };
        Ok(rendered)
    }

    fn placeholder(&self, position: usize) -> String {
        match self {
            Dialect::Postgres => format!("${position}"),
            Dialect::Sqlite | Dialect::Mysql => "?".to_string(),
        }
    }

    pub fn create_table_sql(
        &self,
        table: &str,
        columns: &[ColumnDef],
    ) -> Result<String, InferenceError> {
        let definitions = columns
            .iter()
            .map(|column| {
                self.render_type(column.sql_type)
                    .map(|rendered| format!("    {} {rendered}", self.quote_identifier(&column.name)))
                    .map_err(|reason| InferenceError::TypeConflict {
                        column: column.name.clone(),
                        sql_type: column.sql_type,
                        dialect: *self,
                        reason,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(format!(
            "CREATE TABLE {} (\n{}\n)",
            self.quote_identifier(table),
            definitions.join(",\n")
        ))
    }

    pub fn drop_table_sql(&self, table: &str) -> String {
        format!("DROP TABLE IF EXISTS {}", self.quote_identifier(table))
    }

    pub fn insert_sql(&self, table: &str, columns: &[ColumnDef]) -> String {
        let names = columns
            .iter()
            .map(|column| self.quote_identifier(&column.name))
            .join(", ");
        let placeholders = (1..=columns.len())
            .map(|position| self.placeholder(position))
            .join(", ");
        format!(
            "INSERT INTO {} ({names}) VALUES ({placeholders})",
            self.quote_identifier(table)
        )
    }

    pub fn select_columns_sql(&self, table: &str, columns: &[ColumnDef]) -> String {
        let names = columns
            .iter()
            .map(|column| self.quote_identifier(&column.name))
            .join(", ");
        format!("SELECT {names} FROM {}", self.quote_identifier(table))
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Dialect::Sqlite => "sqlite",
            Dialect::Mysql => "mysql",
            Dialect::Postgres => "postgres",
        })
    }
}

impl FromStr for Dialect {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "sqlite" | "sqlite3" => Ok(Dialect::Sqlite),
            "mysql" | "mariadb" => Ok(Dialect::Mysql),
            "postgres" | "postgresql" => Ok(Dialect::Postgres),
            other => Err(format!("Unknown database type '{other}'")),
        }
    }
}
