//! Strata Kernel - command line compiler
//!
//! Usage: `strata-kernel <rule.json> <query.json>`
//!
//! The query file holds the bound statement as produced by the binder:
//! `{"sql": ..., "statement": ..., "parameters": [...]}` plus optional
//! `hint`, `connection` and `schema`. Execution units are printed as JSON.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use strata_kernel::{BoundStatement, ConfigProperties, Kernel, QueryContext, SchemaMetaData, ShardingRuleConfiguration, Value};
use strata_types::{ConnectionContext, HintValues};
use tracing::Level;

#[derive(Debug, Deserialize)]
struct CompileRequest {
    sql: String,
    statement: BoundStatement,
    #[serde(default)]
    parameters: Vec<Value>,
    #[serde(default)]
    hint: Option<HintValues>,
    #[serde(default)]
    connection: ConnectionContext,
    #[serde(default)]
    schema: SchemaMetaData,
}

#[derive(Debug, Serialize)]
struct CompiledUnit<'a> {
    data_source: &'a str,
    sql: &'a str,
    parameters: &'a [Value],
}

fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt().with_max_level(Level::INFO).with_writer(std::io::stderr).init();

    let mut args = std::env::args().skip(1);
    let (Some(rule_path), Some(query_path)) = (args.next(), args.next()) else {
        anyhow::bail!("usage: strata-kernel <rule.json> <query.json>");
    };

    let rule_json = std::fs::read_to_string(&rule_path).with_context(|| format!("reading {rule_path}"))?;
    let config = ShardingRuleConfiguration::from_json(&rule_json)?;

    let request: CompileRequest = serde_json::from_str(
        &std::fs::read_to_string(&query_path).with_context(|| format!("reading {query_path}"))?,
    )
    .with_context(|| format!("parsing {query_path}"))?;

    // Load properties from environment
    let kernel = Kernel::from_config(ConfigProperties::from_env(), &config, request.schema)?;

    let mut query = QueryContext::new(request.sql, request.statement, request.parameters)
        .with_connection(request.connection);
    if let Some(hint) = request.hint {
        query = query.with_hint(hint);
    }

    let context = kernel.compile(&query)?;
    let units: Vec<CompiledUnit<'_>> = context
        .execution_units
        .iter()
        .map(|u| CompiledUnit { data_source: &u.data_source, sql: &u.sql_unit.sql, parameters: &u.sql_unit.parameters })
        .collect();
    println!("{}", serde_json::to_string_pretty(&units)?);

    Ok(())
}
