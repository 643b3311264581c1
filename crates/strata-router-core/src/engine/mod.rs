//! Routing Engines
//!
//! Each engine turns a set of tables plus sharding conditions into a
//! `RouteContext`:
//!
//! - `Standard`: one sharding table or one binding group
//! - `Cartesian`: SELECT across independent sharding tables
//! - `TableBroadcast`: every actual node of every table (DDL)
//! - `DatabaseBroadcast`: every data source (DCL, DML on broadcast tables)
//! - `Unicast`: one data source (DAL, SELECT on broadcast tables)
//! - `Single`: single tables on the data source hosting them
//!
//! The router picks the engine; see `router.rs` for the decision tree.

mod broadcast;
mod cartesian;
mod single;
mod standard;

pub(crate) use single::merge_single_and_broadcast_tables;

use strata_core::{EvalLimits, ShardingRule};

use crate::condition::ShardingConditions;
use crate::context::StatementContext;
use crate::error::RouteError;
use crate::types::RouteContext;

/// Everything an engine reads while routing
pub struct RouteEnv<'a> {
    pub ctx: &'a StatementContext<'a>,
    pub rule: &'a ShardingRule,
    pub conditions: &'a ShardingConditions,
    pub limits: EvalLimits,
}

impl RouteEnv<'_> {
    pub(crate) fn check_deadline(&self) -> Result<(), RouteError> {
        if self.ctx.query().deadline_exceeded() {
            Err(RouteError::DeadlineExceeded)
        } else {
            Ok(())
        }
    }
}

/// Engine selected for one statement
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteEngine {
    /// First table is the primary, the rest are bound to it
    Standard { tables: Vec<String> },
    /// One entry per independent table or binding group
    Cartesian { groups: Vec<Vec<String>> },
    TableBroadcast { tables: Vec<String> },
    DatabaseBroadcast { tables: Vec<String> },
    Unicast { tables: Vec<String> },
    Single { tables: Vec<String> },
}

impl RouteEngine {
    pub fn name(&self) -> &'static str {
        match self {
            RouteEngine::Standard { .. } => "standard",
            RouteEngine::Cartesian { .. } => "cartesian",
            RouteEngine::TableBroadcast { .. } => "table-broadcast",
            RouteEngine::DatabaseBroadcast { .. } => "database-broadcast",
            RouteEngine::Unicast { .. } => "unicast",
            RouteEngine::Single { .. } => "single",
        }
    }

    pub fn route(&self, env: &RouteEnv<'_>) -> Result<RouteContext, RouteError> {
        env.check_deadline()?;
        match self {
            RouteEngine::Standard { tables } => standard::route(env, tables),
            RouteEngine::Cartesian { groups } => cartesian::route(env, groups),
            RouteEngine::TableBroadcast { tables } => Ok(broadcast::route_tables(env, tables)),
            RouteEngine::DatabaseBroadcast { tables } => Ok(broadcast::route_databases(env, tables)),
            RouteEngine::Unicast { tables } => Ok(broadcast::route_unicast(env, tables)),
            RouteEngine::Single { tables } => single::route(env, tables),
        }
    }
}
