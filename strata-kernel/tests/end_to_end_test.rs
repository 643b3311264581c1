//! End-to-end tests for the compile pipeline
//!
//! These tests drive statements through routing, rewriting and execution
//! unit assembly with SQL logging enabled.

use std::collections::HashSet;

use strata_kernel::{ConfigProperties, Kernel, SchemaMetaData, ShardingRuleConfiguration};
use strata_types::{
    AndPredicate, BoundStatement, ColumnPredicate, ConnectionContext, ExprValue, HintValues, InsertRowSegment,
    InsertSegment, InsertValueSegment, LimitSegment, Operator, PaginationValue, QueryContext, Span, StatementKind,
    TableSegment, Value,
};
use tracing::{debug, info};

/// Initialize tracing for tests
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(tracing_subscriber::EnvFilter::new("debug"))
        .try_init();
}

const RULE: &str = r#"{
    "data_sources": ["ds_0", "ds_1"],
    "tables": [
        {
            "logic_table": "t_order",
            "actual_data_nodes": "ds_${0..1}.t_order_${0..1}",
            "database_strategy": {"type": "standard", "sharding_column": "user_id", "sharding_algorithm_name": "db_inline"},
            "table_strategy": {"type": "standard", "sharding_column": "order_id", "sharding_algorithm_name": "order_inline"},
            "key_generate_strategy": {"column": "order_id", "key_generator_name": "snowflake"}
        },
        {
            "logic_table": "t_audit",
            "actual_data_nodes": "ds_${0..1}.t_audit",
            "database_strategy": {"type": "hint", "sharding_algorithm_name": "audit_hint"}
        }
    ],
    "sharding_algorithms": {
        "db_inline": {"type": "INLINE", "props": {"algorithm-expression": "ds_${user_id % 2}"}},
        "order_inline": {"type": "INLINE", "props": {"algorithm-expression": "t_order_${order_id % 2}"}},
        "audit_hint": {"type": "HINT_INLINE", "props": {"algorithm-expression": "ds_${value % 2}"}}
    },
    "key_generators": {"snowflake": {"type": "SNOWFLAKE"}}
}"#;

fn create_kernel() -> Kernel {
    let config = ShardingRuleConfiguration::from_json(RULE).unwrap();
    let props = ConfigProperties::default().with_sql_show(true);
    Kernel::from_config(props, &config, SchemaMetaData::new()).unwrap()
}

fn span_of(sql: &str, needle: &str) -> Span {
    Span::find(sql, needle, 0).unwrap()
}

/// `INSERT INTO t_order (user_id, status) VALUES (?, ?), ...` with one
/// marker pair per user
fn batch_insert(users: &[i64]) -> QueryContext {
    let rows = vec!["(?, ?)"; users.len()].join(", ");
    let sql = format!("INSERT INTO t_order (user_id, status) VALUES {rows}");
    let values_start = sql.len() - rows.len();

    let segments = (0..users.len())
        .map(|i| {
            let start = values_start + i * 8;
            InsertRowSegment {
                span: Span::new(start, start + 6),
                values: vec![
                    InsertValueSegment { span: Span::new(start + 1, start + 2), value: ExprValue::Parameter(i * 2) },
                    InsertValueSegment { span: Span::new(start + 4, start + 5), value: ExprValue::Parameter(i * 2 + 1) },
                ],
            }
        })
        .collect();
    let stmt = BoundStatement::new(StatementKind::Insert)
        .with_table(TableSegment::new("t_order", span_of(&sql, "t_order")))
        .with_insert(InsertSegment {
            table: "t_order".into(),
            columns: vec!["user_id".into(), "status".into()],
            columns_span: Some(span_of(&sql, "(user_id, status)")),
            rows: segments,
        });
    let parameters = users.iter().flat_map(|u| [Value::Int(*u), Value::from(format!("new-{u}"))]).collect();
    QueryContext::new(sql, stmt, parameters)
}

#[test]
fn test_batch_insert_with_generated_keys() -> anyhow::Result<()> {
    init_tracing();
    info!("Starting end-to-end test: batch insert");

    let kernel = create_kernel();
    let context = kernel.compile(&batch_insert(&[1, 2, 3, 4]))?;

    let mut rows_seen = 0;
    let mut keys = HashSet::new();
    for unit in &context.execution_units {
        debug!(unit = %unit, "Execution unit");
        assert!(unit.sql_unit.sql.contains("(user_id, status, order_id)"), "{}", unit.sql_unit.sql);

        // every row carries user, status and the generated key
        let rows = unit.sql_unit.sql.matches("(?, ?, ?)").count();
        assert_eq!(unit.sql_unit.parameters.len(), rows * 3);
        rows_seen += rows;

        for row in unit.sql_unit.parameters.chunks(3) {
            let user = row[0].as_i64().unwrap();
            let key = row[2].as_i64().unwrap();
            assert_eq!(unit.data_source, format!("ds_{}", user % 2));
            assert!(unit.sql_unit.sql.contains(&format!("t_order_{}", key % 2)));
            keys.insert(key);
        }
    }
    assert_eq!(rows_seen, 4);
    assert_eq!(keys.len(), 4);

    // generated keys make every batch unique, nothing is cached
    assert_eq!(kernel.cache_stats().inserted, 0);
    Ok(())
}

#[test]
fn test_paginated_fan_out() -> anyhow::Result<()> {
    init_tracing();

    let kernel = create_kernel();
    let sql = "SELECT * FROM t_order WHERE status = ? ORDER BY order_id LIMIT ?, ?";
    let offset = Span::find(sql, "?", 50).unwrap();
    let stmt = BoundStatement::new(StatementKind::Select)
        .with_table(TableSegment::new("t_order", span_of(sql, "t_order")))
        .with_limit(LimitSegment {
            offset: Some(PaginationValue { span: offset, value: ExprValue::Parameter(1) }),
            row_count: Some(PaginationValue { span: Span::new(offset.end + 2, offset.end + 3), value: ExprValue::Parameter(2) }),
        });
    let query = QueryContext::new(sql, stmt, vec![Value::from("paid"), Value::Int(20), Value::Int(10)]);

    let context = kernel.compile(&query)?;

    assert_eq!(context.len(), 4);
    for unit in &context.execution_units {
        assert_eq!(unit.sql_unit.parameters, vec![Value::from("paid"), Value::Int(0), Value::Int(30)]);
    }
    Ok(())
}

#[test]
fn test_hint_routes_and_bypasses_cache() -> anyhow::Result<()> {
    init_tracing();

    let kernel = create_kernel();
    let sql = "SELECT * FROM t_audit";
    let stmt = BoundStatement::new(StatementKind::Select).with_table(TableSegment::new("t_audit", span_of(sql, "t_audit")));
    let hint = HintValues { database: vec![Value::Int(3)], table: vec![] };

    let context = kernel.compile(&QueryContext::new(sql, stmt.clone(), vec![]).with_hint(hint.clone()))?;
    kernel.compile(&QueryContext::new(sql, stmt, vec![]).with_hint(hint))?;

    assert_eq!(context.data_sources(), vec!["ds_1"]);
    assert_eq!(context.sqls(), vec![sql]);
    assert_eq!(kernel.cache_stats().hits, 0);
    Ok(())
}

#[test]
fn test_owner_stripped_for_current_database() -> anyhow::Result<()> {
    let kernel = create_kernel();
    let sql = "SELECT * FROM sharding_db.t_order WHERE user_id = ? AND order_id = ?";
    let stmt = BoundStatement::new(StatementKind::Select)
        .with_table(
            TableSegment::new("t_order", span_of(sql, "t_order")).with_owner("sharding_db", span_of(sql, "sharding_db.")),
        )
        .with_where(AndPredicate::new(vec![
            ColumnPredicate::new("t_order", "user_id", Operator::Eq, vec![ExprValue::Parameter(0)]),
            ColumnPredicate::new("t_order", "order_id", Operator::Eq, vec![ExprValue::Parameter(1)]),
        ]));
    let query = QueryContext::new(sql, stmt, vec![Value::Int(5), Value::Int(7)])
        .with_connection(ConnectionContext { current_database: Some("sharding_db".into()) });

    let context = kernel.compile(&query)?;

    assert_eq!(context.sqls(), vec!["SELECT * FROM t_order_1 WHERE user_id = ? AND order_id = ?"]);
    assert_eq!(context.data_sources(), vec!["ds_1"]);
    Ok(())
}

#[test]
fn test_concurrent_compiles_share_cache() {
    init_tracing();

    let kernel = create_kernel();
    let sql = "SELECT * FROM t_order WHERE user_id = ? AND order_id = ?";
    let stmt = BoundStatement::new(StatementKind::Select)
        .with_table(TableSegment::new("t_order", span_of(sql, "t_order")))
        .with_where(AndPredicate::new(vec![
            ColumnPredicate::new("t_order", "user_id", Operator::Eq, vec![ExprValue::Parameter(0)]),
            ColumnPredicate::new("t_order", "order_id", Operator::Eq, vec![ExprValue::Parameter(1)]),
        ]));

    std::thread::scope(|scope| {
        for worker in 0..4i64 {
            let kernel = &kernel;
            let stmt = stmt.clone();
            scope.spawn(move || {
                for i in 0..50i64 {
                    let (user, order) = ((worker + i) % 4, i % 4);
                    let query = QueryContext::new(sql, stmt.clone(), vec![Value::Int(user), Value::Int(order)]);
                    let context = kernel.compile(&query).unwrap();
                    assert_eq!(context.data_sources(), vec![format!("ds_{}", user % 2)]);
                    assert!(context.sqls()[0].contains(&format!("t_order_{}", order % 2)));
                }
            });
        }
    });

    let stats = kernel.cache_stats();
    assert_eq!(stats.hits + stats.misses, 200);
    // each worker cycles through four keys and misses each at most once
    assert!(stats.misses <= 16);
    assert!(stats.inserted <= stats.misses);
}
