//! Integration tests for Kernel compilation

use std::time::{Duration, Instant};

use serde_json::json;
use strata_core::ConfigError;
use strata_kernel::{ConfigProperties, Kernel, KernelError, SchemaMetaData, ShardingRuleConfiguration, TableMetaData};
use strata_router_core::RouteError;
use strata_types::{
    AndPredicate, BoundStatement, ColumnPredicate, DdlKind, ExprValue, Operator, QueryContext, Span, StatementKind,
    TableSegment, Value,
};

/// Orders and items sharded by user and order, plus an unbound product
/// table, a broadcast config table and a single user table
fn rule_config() -> ShardingRuleConfiguration {
    let config = json!({
        "data_sources": ["ds_0", "ds_1"],
        "tables": [
            {
                "logic_table": "t_order",
                "actual_data_nodes": "ds_${0..1}.t_order_${0..1}",
                "table_strategy": {"type": "standard", "sharding_column": "order_id", "sharding_algorithm_name": "order_inline"}
            },
            {
                "logic_table": "t_order_item",
                "actual_data_nodes": "ds_${0..1}.t_order_item_${0..1}",
                "table_strategy": {"type": "standard", "sharding_column": "order_id", "sharding_algorithm_name": "item_inline"}
            },
            {
                "logic_table": "t_product",
                "actual_data_nodes": "ds_${0..1}.t_product",
                "database_strategy": {"type": "standard", "sharding_column": "product_id", "sharding_algorithm_name": "product_mod"}
            }
        ],
        "binding_tables": ["t_order, t_order_item"],
        "broadcast_tables": ["t_config"],
        "single_tables": {"t_user": "ds_0"},
        "default_database_strategy": {"type": "standard", "sharding_column": "user_id", "sharding_algorithm_name": "db_inline"},
        "sharding_algorithms": {
            "db_inline": {"type": "INLINE", "props": {"algorithm-expression": "ds_${user_id % 2}"}},
            "order_inline": {"type": "INLINE", "props": {"algorithm-expression": "t_order_$->{order_id % 2}"}},
            "item_inline": {"type": "INLINE", "props": {"algorithm-expression": "t_order_item_$->{order_id % 2}"}},
            "product_mod": {"type": "MOD", "props": {"sharding-count": 2}}
        }
    });
    serde_json::from_value(config).unwrap()
}

fn create_kernel() -> Kernel {
    let schema = SchemaMetaData::new()
        .with_table(TableMetaData::new("t_order").with_columns(&["order_id", "user_id", "status"]))
        .with_table(TableMetaData::new("t_config").with_columns(&["k", "v"]));
    Kernel::from_config(ConfigProperties::default(), &rule_config(), schema).unwrap()
}

/// Statement over `tables`, each located by its first occurrence in `sql`
fn bind(kind: StatementKind, sql: &str, tables: &[&str]) -> BoundStatement {
    let mut stmt = BoundStatement::new(kind);
    let mut from = 0;
    for table in tables {
        let span = Span::find(sql, table, from).unwrap();
        from = span.end;
        stmt = stmt.with_table(TableSegment::new(*table, span));
    }
    stmt
}

fn eq_param(table: &str, column: &str, index: usize) -> ColumnPredicate {
    ColumnPredicate::new(table, column, Operator::Eq, vec![ExprValue::Parameter(index)])
}

fn order_query(user_id: i64, order_id: i64) -> QueryContext {
    let sql = "SELECT * FROM t_order WHERE user_id = ? AND order_id = ?";
    let stmt = bind(StatementKind::Select, sql, &["t_order"]).with_where(AndPredicate::new(vec![
        eq_param("t_order", "user_id", 0),
        eq_param("t_order", "order_id", 1),
    ]));
    QueryContext::new(sql, stmt, vec![Value::Int(user_id), Value::Int(order_id)])
}

#[test]
fn test_select_routes_to_single_shard() -> anyhow::Result<()> {
    let kernel = create_kernel();

    let context = kernel.compile(&order_query(3, 8))?;

    assert_eq!(context.len(), 1);
    let unit = &context.execution_units[0];
    assert_eq!(unit.data_source, "ds_1");
    assert_eq!(unit.sql_unit.sql, "SELECT * FROM t_order_0 WHERE user_id = ? AND order_id = ?");
    assert_eq!(unit.sql_unit.parameters, vec![Value::Int(3), Value::Int(8)]);
    Ok(())
}

#[test]
fn test_binding_tables_share_shard_index() -> anyhow::Result<()> {
    let kernel = create_kernel();
    let sql = "SELECT * FROM t_order o JOIN t_order_item i ON o.order_id = i.order_id WHERE o.user_id = ? AND o.order_id IN (?, ?)";
    let stmt = bind(StatementKind::Select, sql, &["t_order", "t_order_item"]).with_where(AndPredicate::new(vec![
        eq_param("t_order", "user_id", 0),
        ColumnPredicate::new(
            "t_order",
            "order_id",
            Operator::In,
            vec![ExprValue::Parameter(1), ExprValue::Parameter(2)],
        ),
    ]));

    let context = kernel.compile(&QueryContext::new(sql, stmt, vec![Value::Int(2), Value::Int(4), Value::Int(5)]))?;

    assert_eq!(context.len(), 2);
    for unit in &context.execution_units {
        assert_eq!(unit.data_source, "ds_0");
        let suffix = if unit.sql_unit.sql.contains("t_order_0 ") { "0" } else { "1" };
        assert!(unit.sql_unit.sql.contains(&format!("JOIN t_order_item_{suffix} i")), "{}", unit.sql_unit.sql);
    }
    Ok(())
}

#[test]
fn test_dml_over_independent_sharding_tables_rejected() {
    let kernel = create_kernel();
    let sql = "UPDATE t_order, t_product SET status = 'x' WHERE t_order.user_id = t_product.product_id";
    let stmt = bind(StatementKind::Update, sql, &["t_order", "t_product"]);

    let err = kernel.compile(&QueryContext::new(sql, stmt, vec![])).unwrap_err();
    assert!(matches!(err, KernelError::Route(RouteError::DmlWithMultipleShardingTables(_))));
}

fn order_user_join(user_id: i64) -> QueryContext {
    let sql = "SELECT * FROM t_order JOIN t_user ON t_order.user_id = t_user.user_id WHERE t_order.user_id = ? AND t_order.order_id = ?";
    let stmt = bind(StatementKind::Select, sql, &["t_order", "t_user"]).with_where(AndPredicate::new(vec![
        eq_param("t_order", "user_id", 0),
        eq_param("t_order", "order_id", 1),
    ]));
    QueryContext::new(sql, stmt, vec![Value::Int(user_id), Value::Int(0)])
}

#[test]
fn test_single_table_join_stays_on_its_data_source() -> anyhow::Result<()> {
    let kernel = create_kernel();

    let context = kernel.compile(&order_user_join(0))?;

    assert_eq!(context.data_sources(), vec!["ds_0"]);
    assert_eq!(
        context.sqls(),
        vec!["SELECT * FROM t_order_0 JOIN t_user ON t_order.user_id = t_user.user_id WHERE t_order.user_id = ? AND t_order.order_id = ?"]
    );
    Ok(())
}

#[test]
fn test_single_table_join_across_data_sources_rejected() {
    let kernel = create_kernel();

    // t_user lives on ds_0, user 1 on ds_1
    let err = kernel.compile(&order_user_join(1)).unwrap_err();
    assert!(matches!(err, KernelError::Route(RouteError::UnsupportedShardingOperation(_))));
}

#[test]
fn test_unknown_table_rejected() {
    let kernel = create_kernel();
    let sql = "SELECT * FROM t_missing";
    let stmt = bind(StatementKind::Select, sql, &["t_missing"]);

    let err = kernel.compile(&QueryContext::new(sql, stmt, vec![])).unwrap_err();
    assert!(matches!(err, KernelError::Route(RouteError::NoSuchTable(ref t)) if t == "t_missing"));
}

#[test]
fn test_create_table_broadcast_to_every_actual_table() -> anyhow::Result<()> {
    let kernel = create_kernel();
    let sql = "CREATE TABLE t_order_item (order_id BIGINT, item_id BIGINT)";
    let stmt = bind(StatementKind::Ddl(DdlKind::CreateTable { if_not_exists: false }), sql, &["t_order_item"]);

    let context = kernel.compile(&QueryContext::new(sql, stmt, vec![]))?;

    assert_eq!(
        context.sqls(),
        vec![
            "CREATE TABLE t_order_item_0 (order_id BIGINT, item_id BIGINT)",
            "CREATE TABLE t_order_item_1 (order_id BIGINT, item_id BIGINT)",
            "CREATE TABLE t_order_item_0 (order_id BIGINT, item_id BIGINT)",
            "CREATE TABLE t_order_item_1 (order_id BIGINT, item_id BIGINT)",
        ]
    );
    assert_eq!(context.data_sources(), vec!["ds_0", "ds_1"]);
    Ok(())
}

#[test]
fn test_create_existing_table_rejected() {
    let kernel = create_kernel();
    let sql = "CREATE TABLE t_order (order_id BIGINT)";
    let stmt = bind(StatementKind::Ddl(DdlKind::CreateTable { if_not_exists: false }), sql, &["t_order"]);

    let err = kernel.compile(&QueryContext::new(sql, stmt, vec![])).unwrap_err();
    assert!(matches!(err, KernelError::Route(RouteError::TableExists(_))));
}

#[test]
fn test_dcl_runs_on_every_data_source() -> anyhow::Result<()> {
    let kernel = create_kernel();
    let sql = "GRANT SELECT ON *.* TO 'reader'";

    let context = kernel.compile(&QueryContext::new(sql, BoundStatement::new(StatementKind::Dcl), vec![]))?;

    assert_eq!(context.data_sources(), vec!["ds_0", "ds_1"]);
    assert!(context.sqls().iter().all(|s| *s == sql));
    Ok(())
}

#[test]
fn test_broadcast_select_runs_once() -> anyhow::Result<()> {
    let kernel = create_kernel();
    let sql = "SELECT v FROM t_config WHERE k = ?";
    let stmt = bind(StatementKind::Select, sql, &["t_config"]);

    let context = kernel.compile(&QueryContext::new(sql, stmt, vec![Value::from("mode")]))?;

    assert_eq!(context.len(), 1);
    assert_eq!(context.execution_units[0].sql_unit.sql, sql);
    Ok(())
}

#[test]
fn test_repeated_query_served_from_cache() -> anyhow::Result<()> {
    let kernel = create_kernel();

    let first = kernel.compile(&order_query(1, 2))?;
    let second = kernel.compile(&order_query(1, 2))?;
    let other = kernel.compile(&order_query(2, 2))?;

    assert!(std::sync::Arc::ptr_eq(&first.route_context, &second.route_context));
    assert_eq!(other.execution_units[0].data_source, "ds_0");

    let stats = kernel.cache_stats();
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 2);
    Ok(())
}

#[test]
fn test_reload_invalidates_cached_routes() -> anyhow::Result<()> {
    let kernel = create_kernel();
    kernel.compile(&order_query(1, 3))?;

    let mut config = rule_config();
    config.data_sources.push("ds_2".into());
    kernel.reload_rule(strata_kernel::ShardingRule::new(&config, &strata_core::AlgorithmRegistry::new())?);

    kernel.compile(&order_query(1, 3))?;
    let stats = kernel.cache_stats();
    assert_eq!(stats.hits, 0);
    assert_eq!(stats.misses, 2);
    Ok(())
}

#[test]
fn test_expired_deadline_aborts_before_routing() {
    let kernel = create_kernel();
    let query = order_query(1, 1).with_deadline(Instant::now() - Duration::from_millis(1));

    let err = kernel.compile(&query).unwrap_err();
    assert!(matches!(err, KernelError::DeadlineExceeded { stage: "routing" }));
}

#[test]
fn test_missing_algorithm_fails_at_build() {
    let mut config = rule_config();
    config.sharding_algorithms.shift_remove("order_inline");

    let err = Kernel::from_config(ConfigProperties::default(), &config, SchemaMetaData::new()).err();
    assert!(matches!(err, Some(KernelError::Config(ConfigError::MissingAlgorithm(ref name))) if name == "order_inline"));
}
