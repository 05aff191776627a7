//! Schema reconciliation: decide how analysed CSV columns meet the target
//! table and turn the raw rows into a typed [`Plan`].
//!
//! The target is resolved into a [`TargetState`] first, inspected through the
//! gateway into a [`TableTarget`], and then combined with the conflict policy:
//!
//! | table exists | policy  | outcome                                   |
//! |--------------|---------|-------------------------------------------|
//! | no           | merge   | `AmbiguousTarget`                         |
//! | no           | other   | `CreateTable`                             |
//! | yes          | fail    | `TableExists`                             |
//! | yes          | replace | `CreateTable` (drop first)                |
//! | yes          | append  | `AppendRows` after a column count check   |
//! | yes          | merge   | `MergeRows` filtered against the snapshot |

use std::{cell::Cell, collections::HashSet, fmt, rc::Rc};

use clap::ValueEnum;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    analysis::ColumnDescriptor,
    data::{Value, coerce_row},
    dialect::Dialect,
    error::{ImportError, InputError, SchemaError},
    gateway::Gateway,
    inference::SqlType,
    rows::Row,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnDef {
    pub name: String,
    pub sql_type: SqlType,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, sql_type: SqlType) -> Self {
        Self {
            name: name.into(),
            sql_type,
        }
    }
}

/// What to do when the target table already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictPolicy {
    /// Refuse to touch an existing table
    Fail,
    /// Drop the existing table and recreate it from the CSV analysis
    Replace,
    /// Insert every row into the existing table
    #[default]
    Append,
    /// Insert only rows that are not already present in the existing table
    Merge,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetState {
    NoTableSelected,
    TableChosenNew(String),
    TableChosenExisting(String),
}

impl TargetState {
    /// Matches the requested name against the tables the gateway reported.
    /// SQL identifiers compare case-insensitively, so an existing table keeps
    /// its stored spelling.
    pub fn resolve(requested: Option<&str>, available: &[String]) -> Self {
        match requested.map(str::trim).filter(|name| !name.is_empty()) {
            None => TargetState::NoTableSelected,
            Some(name) => available
                .iter()
                .find(|table| table.eq_ignore_ascii_case(name))
                .map(|table| TargetState::TableChosenExisting(table.clone()))
                .unwrap_or_else(|| TargetState::TableChosenNew(name.to_string())),
        }
    }
}

/// Snapshot of the target table taken at decision time.
#[derive(Debug, Clone)]
pub struct TableTarget {
    pub name: String,
    pub existing: bool,
    pub existing_columns: Vec<ColumnDef>,
    pub existing_row_snapshot: HashSet<Vec<Value>>,
    pub available_tables: Vec<String>,
}

impl TableTarget {
    /// Queries the gateway for the table's state. Existing rows are only
    /// loaded when `policy` is [`ConflictPolicy::Merge`].
    pub fn inspect(
        gateway: &mut dyn Gateway,
        requested: Option<&str>,
        policy: ConflictPolicy,
    ) -> Result<Self, ImportError> {
        let available_tables = gateway.list_tables()?;
        let (name, existing) = match TargetState::resolve(requested, &available_tables) {
            TargetState::NoTableSelected => return Err(SchemaError::NoTableSelected.into()),
            TargetState::TableChosenNew(name) => (name, false),
            TargetState::TableChosenExisting(name) => (name, true),
        };

        let existing_columns = if existing {
            gateway.table_columns(&name)?
        } else {
            Vec::new()
        };
        let existing_row_snapshot = if existing && policy == ConflictPolicy::Merge {
            load_snapshot(gateway, &name, &existing_columns)?
        } else {
            HashSet::new()
        };
        debug!(
            "Target table '{}': existing={}, columns={}, snapshot rows={}",
            name,
            existing,
            existing_columns.len(),
            existing_row_snapshot.len()
        );

        Ok(Self {
            name,
            existing,
            existing_columns,
            existing_row_snapshot,
            available_tables,
        })
    }
}

fn load_snapshot(
    gateway: &mut dyn Gateway,
    table: &str,
    columns: &[ColumnDef],
) -> Result<HashSet<Vec<Value>>, ImportError> {
    let sql = gateway.dialect().select_columns_sql(table, columns);
    let result = gateway.execute(&sql, &[])?;
    Ok(result
        .rows
        .into_iter()
        .map(|row| {
            row.into_iter()
                .zip(columns)
                .map(|(value, column)| value.conform(column.sql_type))
                .collect()
        })
        .collect())
}

pub type RowStream<'a> = Box<dyn Iterator<Item = Result<Vec<Value>, ImportError>> + 'a>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanAction {
    Create,
    Replace,
    Append,
    Merge,
}

impl fmt::Display for PlanAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PlanAction::Create => "created",
            PlanAction::Replace => "replaced",
            PlanAction::Append => "appended to",
            PlanAction::Merge => "merged into",
        })
    }
}

pub enum Plan<'a> {
    CreateTable {
        table: String,
        columns: Vec<ColumnDef>,
        ddl: String,
        replace_existing: bool,
        rows: RowStream<'a>,
    },
    AppendRows {
        table: String,
        columns: Vec<ColumnDef>,
        rows: RowStream<'a>,
    },
    MergeRows {
        table: String,
        columns: Vec<ColumnDef>,
        rows: RowStream<'a>,
        duplicates: Rc<Cell<usize>>,
    },
}

impl Plan<'_> {
    pub fn table(&self) -> &str {
        match self {
            Plan::CreateTable { table, .. }
            | Plan::AppendRows { table, .. }
            | Plan::MergeRows { table, .. } => table,
        }
    }

    pub fn columns(&self) -> &[ColumnDef] {
        match self {
            Plan::CreateTable { columns, .. }
            | Plan::AppendRows { columns, .. }
            | Plan::MergeRows { columns, .. } => columns,
        }
    }

    pub fn action(&self) -> PlanAction {
        match self {
            Plan::CreateTable {
                replace_existing: false,
                ..
            } => PlanAction::Create,
            Plan::CreateTable { .. } => PlanAction::Replace,
            Plan::AppendRows { .. } => PlanAction::Append,
            Plan::MergeRows { .. } => PlanAction::Merge,
        }
    }
}

/// Combines the inspected target with the analysed columns. Rows are typed
/// lazily as the returned plan is consumed; nothing is read here.
pub fn plan<'a, I>(
    target: TableTarget,
    descriptors: &[ColumnDescriptor],
    rows: I,
    policy: ConflictPolicy,
    dialect: Dialect,
) -> Result<Plan<'a>, ImportError>
where
    I: Iterator<Item = Result<Row, InputError>> + 'a,
{
    let incoming: Vec<ColumnDef> = descriptors
        .iter()
        .map(ColumnDescriptor::column_def)
        .collect();

    match (target.existing, policy) {
        (false, ConflictPolicy::Merge) => Err(SchemaError::AmbiguousTarget {
            table: target.name,
            available: target.available_tables,
        }
        .into()),
        (false, _) => create_plan(target.name, incoming, false, rows, dialect),
        (true, ConflictPolicy::Fail) => Err(SchemaError::TableExists { table: target.name }.into()),
        (true, ConflictPolicy::Replace) => create_plan(target.name, incoming, true, rows, dialect),
        (true, ConflictPolicy::Append) => {
            check_column_count(&target, incoming.len())?;
            let columns = target.existing_columns;
            Ok(Plan::AppendRows {
                table: target.name,
                rows: Box::new(typed_rows(rows, columns.clone())),
                columns,
            })
        }
        (true, ConflictPolicy::Merge) => {
            check_column_count(&target, incoming.len())?;
            let columns = target.existing_columns;
            let snapshot = target.existing_row_snapshot;
            let duplicates = Rc::new(Cell::new(0));
            let counter = Rc::clone(&duplicates);
            let filtered = typed_rows(rows, columns.clone()).filter(move |row| match row {
                Ok(values) if snapshot.contains(values) => {
                    counter.set(counter.get() + 1);
                    false
                }
                _ => true,
            });
            Ok(Plan::MergeRows {
                table: target.name,
                rows: Box::new(filtered),
                columns,
                duplicates,
            })
        }
    }
}

fn create_plan<'a, I>(
    table: String,
    columns: Vec<ColumnDef>,
    replace_existing: bool,
    rows: I,
    dialect: Dialect,
) -> Result<Plan<'a>, ImportError>
where
    I: Iterator<Item = Result<Row, InputError>> + 'a,
{
    let ddl = dialect.create_table_sql(&table, &columns)?;
    Ok(Plan::CreateTable {
        table,
        ddl,
        replace_existing,
        rows: Box::new(typed_rows(rows, columns.clone())),
        columns,
    })
}

fn check_column_count(target: &TableTarget, incoming: usize) -> Result<(), SchemaError> {
    if target.existing_columns.len() != incoming {
        return Err(SchemaError::ColumnCountMismatch {
            table: target.name.clone(),
            existing: target.existing_columns.len(),
            incoming,
        });
    }
    Ok(())
}

fn typed_rows<'a, I>(
    rows: I,
    columns: Vec<ColumnDef>,
) -> impl Iterator<Item = Result<Vec<Value>, ImportError>> + 'a
where
    I: Iterator<Item = Result<Row, InputError>> + 'a,
{
    rows.map(move |row| {
        let row = row?;
        Ok(coerce_row(&row, &columns)?)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(name: &str, sql_type: SqlType) -> ColumnDescriptor {
        ColumnDescriptor::new(name, name, sql_type)
    }

    fn target(existing: bool, snapshot: Vec<Vec<Value>>) -> TableTarget {
        TableTarget {
            name: "items".to_string(),
            existing,
            existing_columns: if existing {
                vec![
                    ColumnDef::new("id", SqlType::BigInt),
                    ColumnDef::new("label", SqlType::Varchar(10)),
                ]
            } else {
                Vec::new()
            },
            existing_row_snapshot: snapshot.into_iter().collect(),
            available_tables: vec!["other".to_string()],
        }
    }

    fn rows(values: &[(&str, &str)]) -> impl Iterator<Item = Result<Row, InputError>> + 'static {
        values
            .iter()
            .enumerate()
            .map(|(idx, (id, label))| {
                Ok::<Row, InputError>(Row::new(
                    idx as u64 + 2,
                    vec![id.to_string(), label.to_string()],
                ))
            })
            .collect::<Vec<_>>()
            .into_iter()
    }

    fn incoming() -> Vec<ColumnDescriptor> {
        vec![
            descriptor("id", SqlType::TinyInt),
            descriptor("label", SqlType::Varchar(2)),
        ]
    }

    #[test]
    fn resolve_matches_existing_tables_case_insensitively() {
        let available = vec!["Orders".to_string()];
        assert_eq!(
            TargetState::resolve(Some("orders"), &available),
            TargetState::TableChosenExisting("Orders".to_string())
        );
        assert_eq!(
            TargetState::resolve(Some("items"), &available),
            TargetState::TableChosenNew("items".to_string())
        );
        assert_eq!(
            TargetState::resolve(Some("  "), &available),
            TargetState::NoTableSelected
        );
        assert_eq!(TargetState::resolve(None, &available), TargetState::NoTableSelected);
    }

    #[test]
    fn new_table_gets_a_create_plan() {
        let plan = plan(
            target(false, Vec::new()),
            &incoming(),
            rows(&[("1", "a")]),
            ConflictPolicy::Append,
            Dialect::Sqlite,
        )
        .unwrap();
        assert_eq!(plan.action(), PlanAction::Create);
        match plan {
            Plan::CreateTable { ddl, rows, .. } => {
                assert!(ddl.contains("\"label\" VARCHAR(2)"));
                let typed: Vec<_> = rows.map(|row| row.unwrap()).collect();
                assert_eq!(
                    typed,
                    vec![vec![Value::Integer(1), Value::Text("a".to_string())]]
                );
            }
            _ => panic!("expected create plan"),
        }
    }

    #[test]
    fn merge_into_missing_table_is_ambiguous() {
        let err = plan(
            target(false, Vec::new()),
            &incoming(),
            rows(&[]),
            ConflictPolicy::Merge,
            Dialect::Sqlite,
        )
        .err()
        .expect("merge needs a table");
        assert!(matches!(
            err,
            ImportError::Schema(SchemaError::AmbiguousTarget { .. })
        ));
        assert!(err.to_string().contains("other"));
    }

    #[test]
    fn fail_policy_rejects_existing_table() {
        let err = plan(
            target(true, Vec::new()),
            &incoming(),
            rows(&[]),
            ConflictPolicy::Fail,
            Dialect::Sqlite,
        )
        .err()
        .expect("table exists");
        assert!(matches!(
            err,
            ImportError::Schema(SchemaError::TableExists { .. })
        ));
    }

    #[test]
    fn replace_recreates_with_incoming_types() {
        let plan = plan(
            target(true, Vec::new()),
            &incoming(),
            rows(&[]),
            ConflictPolicy::Replace,
            Dialect::Sqlite,
        )
        .unwrap();
        assert_eq!(plan.action(), PlanAction::Replace);
        assert_eq!(plan.columns()[0].sql_type, SqlType::TinyInt);
    }

    #[test]
    fn append_uses_existing_column_types() {
        let plan = plan(
            target(true, Vec::new()),
            &incoming(),
            rows(&[("300", "wide value")]),
            ConflictPolicy::Append,
            Dialect::Sqlite,
        )
        .unwrap();
        assert_eq!(plan.action(), PlanAction::Append);
        assert_eq!(plan.columns()[0].sql_type, SqlType::BigInt);
        match plan {
            Plan::AppendRows { rows, .. } => {
                let typed: Vec<_> = rows.map(|row| row.unwrap()).collect();
                assert_eq!(typed[0][0], Value::Integer(300));
            }
            _ => panic!("expected append plan"),
        }
    }

    #[test]
    fn column_count_mismatch_is_rejected() {
        let narrow = vec![descriptor("id", SqlType::TinyInt)];
        let err = plan(
            target(true, Vec::new()),
            &narrow,
            rows(&[]),
            ConflictPolicy::Append,
            Dialect::Sqlite,
        )
        .err()
        .expect("count mismatch");
        assert!(matches!(
            err,
            ImportError::Schema(SchemaError::ColumnCountMismatch {
                existing: 2,
                incoming: 1,
                ..
            })
        ));
    }

    #[test]
    fn merge_filters_rows_already_present() {
        let snapshot = vec![
            vec![Value::Integer(1), Value::Text("a".to_string())],
            vec![Value::Integer(2), Value::Text("b".to_string())],
        ];
        let plan = plan(
            target(true, snapshot),
            &incoming(),
            rows(&[("2", "b"), ("3", "c")]),
            ConflictPolicy::Merge,
            Dialect::Sqlite,
        )
        .unwrap();
        match plan {
            Plan::MergeRows {
                rows, duplicates, ..
            } => {
                let typed: Vec<_> = rows.map(|row| row.unwrap()).collect();
                assert_eq!(
                    typed,
                    vec![vec![Value::Integer(3), Value::Text("c".to_string())]]
                );
                assert_eq!(duplicates.get(), 1);
            }
            _ => panic!("expected merge plan"),
        }
    }

    #[test]
    fn values_that_do_not_fit_surface_while_streaming() {
        let plan = plan(
            target(false, Vec::new()),
            &incoming(),
            rows(&[("1", "a"), ("x", "b")]),
            ConflictPolicy::Append,
            Dialect::Sqlite,
        )
        .unwrap();
        let Plan::CreateTable { rows, .. } = plan else {
            panic!("expected create plan");
        };
        let results: Vec<_> = rows.collect();
        assert!(results[0].is_ok());
        let err = results[1].as_ref().expect_err("text in integer column");
        assert!(err.to_string().contains("Row 3"));
    }
}
