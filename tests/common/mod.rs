#![allow(dead_code)]

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use csv_to_sql::data::Value;
use csv_to_sql::gateway::{Gateway, SqliteGateway};
use tempfile::{TempDir, tempdir};

/// Scratch directory holding CSV inputs and sqlite database files. Everything
/// is removed on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Directory used as the sqlite data directory.
    pub fn data_dir(&self) -> PathBuf {
        self.temp_dir.path().join("databases")
    }

    /// Writes `contents` into a file under the workspace and returns the path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        let mut file = File::create(&path).expect("create temp file");
        file.write_all(contents.as_bytes())
            .expect("write temp file contents");
        path
    }

    /// Opens (and creates) database `name` in the workspace data directory.
    pub fn gateway(&self, name: &str) -> SqliteGateway {
        SqliteGateway::open(&self.data_dir(), Some(name)).expect("open sqlite gateway")
    }
}

/// All rows of `table`, ordered by the first column.
pub fn select_all(gateway: &mut dyn Gateway, table: &str) -> Vec<Vec<Value>> {
    gateway
        .execute(&format!("SELECT * FROM \"{table}\" ORDER BY 1"), &[])
        .expect("select rows")
        .rows
}

pub fn count_rows(gateway: &mut dyn Gateway, table: &str) -> i64 {
    let result = gateway
        .execute(&format!("SELECT COUNT(*) FROM \"{table}\""), &[])
        .expect("count rows");
    match result.rows[0][0] {
        Value::Integer(count) => count,
        ref other => panic!("unexpected count value {other:?}"),
    }
}
