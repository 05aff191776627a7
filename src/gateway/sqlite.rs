//! SQLite gateway. A data directory plays the role of the server and every
//! `<name>.db` file inside it is one database.

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use log::{debug, info};
use rusqlite::{
    Connection, params_from_iter,
    types::{FromSql, FromSqlResult, ToSql, ToSqlOutput, Value as SqlValue, ValueRef},
};
use rust_decimal::{
    Decimal,
    prelude::{FromPrimitive, ToPrimitive},
};

use super::{Gateway, RowSet};
use crate::{
    data::Value, dialect::Dialect, error::GatewayError, inference::SqlType,
    reconcile::ColumnDef, sanitize::is_sanitized,
};

const DATABASE_EXTENSION: &str = "db";

pub struct SqliteGateway {
    data_dir: PathBuf,
    conn: Option<Connection>,
    current: Option<String>,
}

impl SqliteGateway {
    /// Opens the data directory, creating it when missing. When `database`
    /// is given its file is opened (and created) as the active database.
    pub fn open(data_dir: &Path, database: Option<&str>) -> Result<Self, GatewayError> {
        fs::create_dir_all(data_dir).map_err(|source| GatewayError::Io {
            path: data_dir.to_path_buf(),
            source,
        })?;
        let mut gateway = Self {
            data_dir: data_dir.to_path_buf(),
            conn: None,
            current: None,
        };
        if let Some(name) = database {
            gateway.create_database(name)?;
            gateway.use_database(name)?;
        }
        Ok(gateway)
    }

    /// Private in-memory database named `memory`, used by tests and dry runs.
    pub fn in_memory() -> Result<Self, GatewayError> {
        let conn = Connection::open_in_memory().map_err(|source| GatewayError::Connection {
            target: ":memory:".to_string(),
            source,
        })?;
        Ok(Self {
            data_dir: PathBuf::new(),
            conn: Some(conn),
            current: Some("memory".to_string()),
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn database_path(&self, name: &str) -> Result<PathBuf, GatewayError> {
        if !is_sanitized(name) {
            return Err(GatewayError::InvalidName {
                name: name.to_string(),
            });
        }
        Ok(self.data_dir.join(format!("{name}.{DATABASE_EXTENSION}")))
    }

    fn connection(&self) -> Result<&Connection, GatewayError> {
        self.conn.as_ref().ok_or(GatewayError::NoDatabaseSelected)
    }

    fn open_file(path: &Path) -> Result<Connection, GatewayError> {
        Connection::open(path).map_err(|source| GatewayError::Connection {
            target: path.display().to_string(),
            source,
        })
    }
}

impl Gateway for SqliteGateway {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<RowSet, GatewayError> {
        let statement_error = |source: rusqlite::Error| GatewayError::Statement {
            statement: sql.to_string(),
            source,
        };
        let conn = self.connection()?;
        let mut statement = conn.prepare_cached(sql).map_err(statement_error)?;
        let columns: Vec<String> = statement
            .column_names()
            .into_iter()
            .map(str::to_string)
            .collect();

        if columns.is_empty() {
            let affected = statement
                .execute(params_from_iter(params.iter()))
                .map_err(statement_error)?;
            return Ok(RowSet {
                columns,
                rows: Vec::new(),
                affected,
            });
        }

        let width = columns.len();
        let rows = statement
            .query_map(params_from_iter(params.iter()), |row| {
                (0..width)
                    .map(|idx| row.get::<_, Value>(idx))
                    .collect::<rusqlite::Result<Vec<_>>>()
            })
            .map_err(statement_error)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(statement_error)?;
        Ok(RowSet {
            affected: rows.len(),
            columns,
            rows,
        })
    }

    fn list_databases(&mut self) -> Result<Vec<String>, GatewayError> {
        let io_error = |source: io::Error| GatewayError::Io {
            path: self.data_dir.clone(),
            source,
        };
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.data_dir).map_err(io_error)? {
            let path = entry.map_err(io_error)?.path();
            let is_database = path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case(DATABASE_EXTENSION));
            if is_database
                && path.is_file()
                && let Some(stem) = path.file_stem().and_then(|stem| stem.to_str())
                && is_sanitized(stem)
            {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    fn list_tables(&mut self) -> Result<Vec<String>, GatewayError> {
        let result = self.execute(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
            &[],
        )?;
        Ok(result
            .rows
            .into_iter()
            .filter_map(|row| row.into_iter().next())
            .map(|value| value.as_display())
            .collect())
    }

    fn table_columns(&mut self, table: &str) -> Result<Vec<ColumnDef>, GatewayError> {
        let result = self.execute(
            "SELECT name, type FROM pragma_table_info(?) ORDER BY cid",
            &[Value::Text(table.to_string())],
        )?;
        Ok(result
            .rows
            .into_iter()
            .filter_map(|row| {
                let mut values = row.into_iter();
                let name = values.next()?.as_display();
                let declared = values.next().map(|v| v.as_display()).unwrap_or_default();
                Some(ColumnDef::new(name, SqlType::from_declared(&declared)))
            })
            .collect())
    }

    fn create_database(&mut self, name: &str) -> Result<(), GatewayError> {
        let path = self.database_path(name)?;
        if path.exists() {
            debug!("Database '{name}' already exists at {path:?}");
            return Ok(());
        }
        Self::open_file(&path)?;
        info!("Created database '{name}' at {path:?}");
        Ok(())
    }

    fn drop_database(&mut self, name: &str) -> Result<(), GatewayError> {
        let path = self.database_path(name)?;
        if !path.exists() {
            return Err(GatewayError::UnknownDatabase {
                name: name.to_string(),
            });
        }
        if self.current.as_deref() == Some(name) {
            return Err(GatewayError::ActiveDatabase {
                name: name.to_string(),
            });
        }
        fs::remove_file(&path).map_err(|source| GatewayError::Io {
            path: path.clone(),
            source,
        })?;
        info!("Dropped database '{name}'");
        Ok(())
    }

    fn use_database(&mut self, name: &str) -> Result<(), GatewayError> {
        let path = self.database_path(name)?;
        if !path.exists() {
            return Err(GatewayError::UnknownDatabase {
                name: name.to_string(),
            });
        }
        self.conn = Some(Self::open_file(&path)?);
        self.current = Some(name.to_string());
        debug!("Using database '{name}'");
        Ok(())
    }

    fn current_database(&self) -> Option<&str> {
        self.current.as_deref()
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::Owned(SqlValue::Null),
            Value::Boolean(flag) => ToSqlOutput::Owned(SqlValue::Integer(i64::from(*flag))),
            Value::Integer(value) => ToSqlOutput::Owned(SqlValue::Integer(*value)),
            Value::Decimal(value) => match value.to_f64() {
                Some(real) => ToSqlOutput::Owned(SqlValue::Real(real)),
                None => ToSqlOutput::Owned(SqlValue::Text(value.to_string())),
            },
            Value::Date(_) | Value::DateTime(_) => {
                ToSqlOutput::Owned(SqlValue::Text(self.as_display()))
            }
            Value::Text(text) => ToSqlOutput::Borrowed(ValueRef::Text(text.as_bytes())),
        })
    }
}

impl FromSql for Value {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        Ok(match value {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(integer) => Value::Integer(integer),
            ValueRef::Real(real) => Decimal::from_f64(real)
                .map(Value::Decimal)
                .unwrap_or_else(|| Value::Text(real.to_string())),
            ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
                Value::Text(String::from_utf8_lossy(bytes).into_owned())
            }
        })
    }
}
