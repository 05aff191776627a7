mod common;

use std::path::PathBuf;

use common::{TestWorkspace, count_rows, select_all};
use csv_to_sql::config::Settings;
use csv_to_sql::data::Value;
use csv_to_sql::dialect::Dialect;
use csv_to_sql::error::{GatewayError, ImportError, InferenceError, SchemaError};
use csv_to_sql::gateway::{Gateway, RowSet, SqliteGateway};
use csv_to_sql::import::{ImportOptions, import_csv};
use csv_to_sql::inference::SqlType;
use csv_to_sql::load::LoadReport;
use csv_to_sql::reconcile::{ColumnDef, ConflictPolicy, PlanAction};
use indicatif::ProgressBar;

fn options(csv: PathBuf, table: &str, policy: ConflictPolicy) -> ImportOptions {
    let mut options = ImportOptions::from_settings(csv, &Settings::default()).expect("options");
    options.table = Some(table.to_string());
    options.policy = policy;
    options
}

fn run(gateway: &mut dyn Gateway, options: &ImportOptions) -> Result<LoadReport, ImportError> {
    import_csv(gateway, options, &ProgressBar::hidden())
}

fn text(value: &str) -> Value {
    Value::Text(value.to_string())
}

#[test]
fn round_trip_preserves_column_and_row_counts() {
    let workspace = TestWorkspace::new();
    let csv = workspace.write(
        "Customer Orders.csv",
        "Order ID,Customer Name,Amount,Paid,Ordered On\n\
         1,Alice,42.50,yes,2024-01-01\n\
         2,Bob,13.37,no,2024-01-03\n\
         3,Carla,7,yes,2024-01-04\n",
    );
    let mut gateway = workspace.gateway("shop");
    let mut options = options(csv, "", ConflictPolicy::Append);
    options.table = None;

    let report = run(&mut gateway, &options).expect("import");
    assert_eq!(report.table, "customer_orders");
    assert_eq!(report.action, PlanAction::Create);
    assert_eq!(report.rows_inserted, 3);

    let columns = gateway.table_columns("customer_orders").expect("columns");
    assert_eq!(
        columns,
        vec![
            ColumnDef::new("Order_ID", SqlType::TinyInt),
            ColumnDef::new("Customer_Name", SqlType::Varchar(6)),
            ColumnDef::new("Amount", SqlType::Decimal),
            ColumnDef::new("Paid", SqlType::Boolean),
            ColumnDef::new("Ordered_On", SqlType::Date),
        ]
    );
    assert_eq!(count_rows(&mut gateway, "customer_orders"), 3);

    let rows = select_all(&mut gateway, "customer_orders");
    assert_eq!(rows[0][0], Value::Integer(1));
    assert_eq!(rows[0][1], text("Alice"));
    assert_eq!(rows[1][3], Value::Integer(0));
    assert_eq!(rows[2][4], text("2024-01-04"));
}

#[test]
fn merge_inserts_only_new_rows() {
    let workspace = TestWorkspace::new();
    let first = workspace.write("first.csv", "id,label\n1,a\n2,b\n");
    let second = workspace.write("second.csv", "id,label\n2,b\n3,c\n");
    let mut gateway = workspace.gateway("merge");

    run(&mut gateway, &options(first, "items", ConflictPolicy::Append)).expect("seed");
    let report = run(&mut gateway, &options(second, "items", ConflictPolicy::Merge)).expect("merge");

    assert_eq!(report.action, PlanAction::Merge);
    assert_eq!(report.rows_inserted, 1);
    assert_eq!(report.duplicates_skipped, 1);
    assert_eq!(
        select_all(&mut gateway, "items"),
        vec![
            vec![Value::Integer(1), text("a")],
            vec![Value::Integer(2), text("b")],
            vec![Value::Integer(3), text("c")],
        ]
    );
}

#[test]
fn merge_compares_decimals_by_value() {
    let workspace = TestWorkspace::new();
    let csv = workspace.write("prices.csv", "sku,price\nA1,2.50\nB2,3.00\nC3,0.10\n");
    let mut gateway = workspace.gateway("prices");

    run(&mut gateway, &options(csv.clone(), "prices", ConflictPolicy::Append)).expect("seed");
    let report = run(&mut gateway, &options(csv, "prices", ConflictPolicy::Merge)).expect("merge");
    assert_eq!(report.rows_inserted, 0);
    assert_eq!(report.duplicates_skipped, 3);
    assert_eq!(count_rows(&mut gateway, "prices"), 3);
}

#[test]
fn merge_requires_an_existing_table() {
    let workspace = TestWorkspace::new();
    let csv = workspace.write("items.csv", "id\n1\n");
    let mut gateway = workspace.gateway("empty");

    let err = run(&mut gateway, &options(csv, "items", ConflictPolicy::Merge))
        .expect_err("nothing to merge into");
    assert!(matches!(
        err,
        ImportError::Schema(SchemaError::AmbiguousTarget { .. })
    ));
    assert!(gateway.list_tables().unwrap().is_empty());
}

#[test]
fn fail_policy_leaves_existing_table_untouched() {
    let workspace = TestWorkspace::new();
    let csv = workspace.write("items.csv", "id,label\n1,a\n");
    let mut gateway = workspace.gateway("fail");

    run(&mut gateway, &options(csv.clone(), "items", ConflictPolicy::Fail)).expect("create");
    let err = run(&mut gateway, &options(csv, "items", ConflictPolicy::Fail))
        .expect_err("table exists");
    assert!(err.to_string().contains("already exists"));
    assert_eq!(count_rows(&mut gateway, "items"), 1);
}

#[test]
fn replace_recreates_the_table() {
    let workspace = TestWorkspace::new();
    let old = workspace.write("old.csv", "id,label\n1,a\n2,b\n");
    let new = workspace.write("new.csv", "code,amount,note\nX,1.5,hello\n");
    let mut gateway = workspace.gateway("replace");

    run(&mut gateway, &options(old, "items", ConflictPolicy::Append)).expect("seed");
    let report = run(&mut gateway, &options(new, "items", ConflictPolicy::Replace)).expect("replace");
    assert_eq!(report.action, PlanAction::Replace);
    assert_eq!(gateway.table_columns("items").unwrap().len(), 3);
    assert_eq!(count_rows(&mut gateway, "items"), 1);
}

#[test]
fn append_rejects_a_different_column_count() {
    let workspace = TestWorkspace::new();
    let seed = workspace.write("seed.csv", "id,label\n1,a\n");
    let wide = workspace.write("wide.csv", "id,label,extra\n2,b,c\n");
    let mut gateway = workspace.gateway("append");

    run(&mut gateway, &options(seed, "items", ConflictPolicy::Append)).expect("seed");
    let err = run(&mut gateway, &options(wide, "items", ConflictPolicy::Append))
        .expect_err("column count differs");
    assert!(matches!(
        err,
        ImportError::Schema(SchemaError::ColumnCountMismatch {
            existing: 2,
            incoming: 3,
            ..
        })
    ));
    assert_eq!(count_rows(&mut gateway, "items"), 1);
}

#[test]
fn append_coerces_rows_to_existing_types() {
    let workspace = TestWorkspace::new();
    let seed = workspace.write("seed.csv", "id,amount\n10,2.5\n");
    let more = workspace.write("more.csv", "id,amount\n11,7\n");
    let mut gateway = workspace.gateway("append_types");

    run(&mut gateway, &options(seed, "items", ConflictPolicy::Append)).expect("seed");
    let report = run(&mut gateway, &options(more, "items", ConflictPolicy::Append)).expect("append");
    assert_eq!(report.action, PlanAction::Append);
    let rows = select_all(&mut gateway, "items");
    assert_eq!(rows.len(), 2);
    assert_eq!(
        rows[1][1].clone().conform(SqlType::Decimal),
        Value::from_field("7", SqlType::Decimal).unwrap()
    );
}

#[test]
fn sampled_inference_reports_late_mismatches() {
    let workspace = TestWorkspace::new();
    let csv = workspace.write("late.csv", "code\n1\n2\n3\nfour\n");
    let mut gateway = workspace.gateway("sampled");
    let mut options = options(csv, "codes", ConflictPolicy::Append);
    options.analysis.sample_rows = 2;
    options.chunk_size = 2;

    let err = run(&mut gateway, &options).expect_err("value does not fit");
    match &err {
        ImportError::Interrupted {
            chunk,
            committed_rows,
            source,
            ..
        } => {
            assert_eq!((*chunk, *committed_rows), (2, 2));
            assert!(matches!(
                source.as_ref(),
                ImportError::Inference(InferenceError::ValueMismatch { row: 5, .. })
            ));
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(count_rows(&mut gateway, "codes"), 2);
}

/// Gateway that rejects the n-th INSERT statement.
struct FailingGateway {
    inner: SqliteGateway,
    fail_on_insert: usize,
    inserts: usize,
}

impl Gateway for FailingGateway {
    fn dialect(&self) -> Dialect {
        self.inner.dialect()
    }

    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<RowSet, GatewayError> {
        if sql.starts_with("INSERT") {
            self.inserts += 1;
            if self.inserts == self.fail_on_insert {
                return Err(GatewayError::Rejected {
                    statement: sql.to_string(),
                    reason: "injected failure".to_string(),
                });
            }
        }
        self.inner.execute(sql, params)
    }

    fn list_databases(&mut self) -> Result<Vec<String>, GatewayError> {
        self.inner.list_databases()
    }

    fn list_tables(&mut self) -> Result<Vec<String>, GatewayError> {
        self.inner.list_tables()
    }

    fn table_columns(&mut self, table: &str) -> Result<Vec<ColumnDef>, GatewayError> {
        self.inner.table_columns(table)
    }

    fn create_database(&mut self, name: &str) -> Result<(), GatewayError> {
        self.inner.create_database(name)
    }

    fn drop_database(&mut self, name: &str) -> Result<(), GatewayError> {
        self.inner.drop_database(name)
    }

    fn use_database(&mut self, name: &str) -> Result<(), GatewayError> {
        self.inner.use_database(name)
    }

    fn current_database(&self) -> Option<&str> {
        self.inner.current_database()
    }
}

#[test]
fn failure_mid_load_keeps_earlier_chunks() {
    let workspace = TestWorkspace::new();
    let mut contents = String::from("id,label\n");
    for i in 1..=25 {
        contents.push_str(&format!("{i},row{i}\n"));
    }
    let csv = workspace.write("bulk.csv", &contents);
    let chunk_size = 5;
    // 25 rows in chunks of 5: fail inside chunk ceil(25 / 5 / 2) = 3.
    let mut gateway = FailingGateway {
        inner: workspace.gateway("bulk"),
        fail_on_insert: 13,
        inserts: 0,
    };
    let mut options = options(csv, "bulk", ConflictPolicy::Append);
    options.chunk_size = chunk_size;

    let err = run(&mut gateway, &options).expect_err("injected failure");
    match &err {
        ImportError::Interrupted {
            chunk,
            committed_chunks,
            committed_rows,
            ..
        } => {
            assert_eq!(*chunk, 3);
            assert_eq!(*committed_chunks, 2);
            assert_eq!(*committed_rows, 10);
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(err.committed_rows(), 10);
    assert_eq!(count_rows(&mut gateway, "bulk"), 10);
    let ids: Vec<Value> = select_all(&mut gateway, "bulk")
        .into_iter()
        .map(|row| row[0].clone())
        .collect();
    assert_eq!(ids, (1..=10).map(Value::Integer).collect::<Vec<_>>());
}

#[test]
fn existing_columns_with_quote_characters_are_escaped() {
    let workspace = TestWorkspace::new();
    let csv = workspace.write("weird.csv", "weird,label\n10,a\n11,b\n");
    let mut gateway = workspace.gateway("quoted");
    gateway
        .execute(
            "CREATE TABLE \"items\" (\"we\"\"ird\" INTEGER, \"la`bel\" TEXT)",
            &[],
        )
        .expect("create table");

    let report = run(&mut gateway, &options(csv.clone(), "items", ConflictPolicy::Append))
        .expect("append");
    assert_eq!(report.rows_inserted, 2);

    let report = run(&mut gateway, &options(csv, "items", ConflictPolicy::Merge)).expect("merge");
    assert_eq!(report.rows_inserted, 0);
    assert_eq!(report.duplicates_skipped, 2);

    assert_eq!(gateway.table_columns("items").unwrap()[0].name, "we\"ird");
    assert_eq!(
        select_all(&mut gateway, "items"),
        vec![
            vec![Value::Integer(10), text("a")],
            vec![Value::Integer(11), text("b")],
        ]
    );
}
