//! Database gateway seam.
//!
//! The import core talks to storage only through [`Gateway`]. Statement text
//! never contains values; they are bound from the `params` slice.

pub mod sqlite;

use log::info;

use crate::{
    config::DatabaseSettings, data::Value, dialect::Dialect, error::GatewayError,
    reconcile::ColumnDef,
};

pub use sqlite::SqliteGateway;

/// Result of [`Gateway::execute`]. Statements that return no columns report
/// the number of affected rows instead.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
    pub affected: usize,
}

pub trait Gateway {
    fn dialect(&self) -> Dialect;

    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<RowSet, GatewayError>;

    fn list_databases(&mut self) -> Result<Vec<String>, GatewayError>;

    /// Tables of the active database, sorted by name.
    fn list_tables(&mut self) -> Result<Vec<String>, GatewayError>;

    /// Declared columns of `table` in ordinal order, mapped back to
    /// [`crate::inference::SqlType`]. Empty when the table does not exist.
    fn table_columns(&mut self, table: &str) -> Result<Vec<ColumnDef>, GatewayError>;

    fn create_database(&mut self, name: &str) -> Result<(), GatewayError>;

    fn drop_database(&mut self, name: &str) -> Result<(), GatewayError>;

    fn use_database(&mut self, name: &str) -> Result<(), GatewayError>;

    fn current_database(&self) -> Option<&str>;

    fn begin_chunk(&mut self) -> Result<(), GatewayError> {
        self.execute("BEGIN", &[]).map(|_| ())
    }

    fn commit_chunk(&mut self) -> Result<(), GatewayError> {
        self.execute("COMMIT", &[]).map(|_| ())
    }

    fn rollback_chunk(&mut self) -> Result<(), GatewayError> {
        self.execute("ROLLBACK", &[]).map(|_| ())
    }
}

/// Opens the gateway described by `settings`.
pub fn connect(settings: &DatabaseSettings) -> Result<Box<dyn Gateway>, GatewayError> {
    match settings.kind {
        Dialect::Sqlite => {
            let gateway = SqliteGateway::open(&settings.data_dir, settings.name.as_deref())?;
            info!(
                "Connected to sqlite data directory {:?} (database: {})",
                settings.data_dir,
                settings.name.as_deref().unwrap_or("none")
            );
            Ok(Box::new(gateway))
        }
        kind => Err(GatewayError::UnsupportedKind { kind }),
    }
}
