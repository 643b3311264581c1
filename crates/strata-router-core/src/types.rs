//! Route result types
//!
//! A `RouteContext` is produced once per query by the routing engine and is
//! never mutated afterwards. Engines accumulate into a `RouteContextBuilder`
//! that is consumed by `build()`.

use strata_core::DataNode;

/// Logic name to actual name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RouteMapper {
    pub logic_name: String,
    pub actual_name: String,
}

impl RouteMapper {
    pub fn new(logic_name: impl Into<String>, actual_name: impl Into<String>) -> Self {
        Self { logic_name: logic_name.into(), actual_name: actual_name.into() }
    }

    /// Mapper that leaves the name unchanged
    pub fn identity(name: impl Into<String>) -> Self {
        let name = name.into();
        Self { logic_name: name.clone(), actual_name: name }
    }

    pub fn is_identity(&self) -> bool {
        self.logic_name == self.actual_name
    }
}

/// One physical target: a data source plus the actual tables the statement
/// touches there
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RouteUnit {
    data_source_mapper: RouteMapper,
    table_mappers: Vec<RouteMapper>,
}

impl RouteUnit {
    pub fn new(data_source_mapper: RouteMapper, table_mappers: Vec<RouteMapper>) -> Self {
        Self { data_source_mapper, table_mappers }
    }

    pub fn data_source_mapper(&self) -> &RouteMapper {
        &self.data_source_mapper
    }

    pub fn data_source(&self) -> &str {
        &self.data_source_mapper.actual_name
    }

    pub fn table_mappers(&self) -> &[RouteMapper] {
        &self.table_mappers
    }

    pub fn find_table_mapper(&self, logic_table: &str) -> Option<&RouteMapper> {
        self.table_mappers.iter().find(|m| m.logic_name.eq_ignore_ascii_case(logic_table))
    }

    /// Actual name of `logic_table` in this unit
    pub fn actual_table(&self, logic_table: &str) -> Option<&str> {
        self.find_table_mapper(logic_table).map(|m| m.actual_name.as_str())
    }

    /// No name in this unit differs from its logic name
    pub fn is_identity(&self) -> bool {
        self.data_source_mapper.is_identity() && self.table_mappers.iter().all(RouteMapper::is_identity)
    }
}

/// Outcome of routing one query
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteContext {
    route_units: Vec<RouteUnit>,
    /// Data nodes consulted, one group per sharding condition (per INSERT
    /// row for INSERT statements)
    original_data_nodes: Vec<Vec<DataNode>>,
}

impl RouteContext {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn route_units(&self) -> &[RouteUnit] {
        &self.route_units
    }

    pub fn original_data_nodes(&self) -> &[Vec<DataNode>] {
        &self.original_data_nodes
    }

    pub fn is_empty(&self) -> bool {
        self.route_units.is_empty()
    }

    /// Exactly one unit, one table, one consulted node
    pub fn is_single_shard(&self) -> bool {
        self.route_units.len() == 1
            && self.route_units[0].table_mappers.len() == 1
            && self.original_data_nodes.len() == 1
            && self.original_data_nodes[0].len() == 1
    }

    /// Distinct actual data sources, in unit order
    pub fn actual_data_source_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for unit in &self.route_units {
            if !names.contains(&unit.data_source()) {
                names.push(unit.data_source());
            }
        }
        names
    }
}

/// Per-call accumulator for a `RouteContext`
#[derive(Debug, Default)]
pub struct RouteContextBuilder {
    route_units: Vec<RouteUnit>,
    original_data_nodes: Vec<Vec<DataNode>>,
}

impl RouteContextBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a unit unless an identical one is already present
    pub fn add_unit(&mut self, unit: RouteUnit) {
        if !self.route_units.contains(&unit) {
            self.route_units.push(unit);
        }
    }

    pub fn add_original_data_nodes(&mut self, nodes: Vec<DataNode>) {
        self.original_data_nodes.push(nodes);
    }

    pub fn units(&self) -> &[RouteUnit] {
        &self.route_units
    }

    /// Append `mapper` to every unit on `data_source`. Returns false when
    /// no unit lives there.
    pub fn append_table_mapper(&mut self, data_source: &str, mapper: &RouteMapper) -> bool {
        let mut appended = false;
        for unit in self.route_units.iter_mut().filter(|u| u.data_source() == data_source) {
            if unit.find_table_mapper(&mapper.logic_name).is_none() {
                unit.table_mappers.push(mapper.clone());
            }
            appended = true;
        }
        appended
    }

    /// Append `mapper` to every unit
    pub fn append_table_mapper_to_all(&mut self, mapper: &RouteMapper) {
        for unit in &mut self.route_units {
            if unit.find_table_mapper(&mapper.logic_name).is_none() {
                unit.table_mappers.push(mapper.clone());
            }
        }
    }

    pub fn build(self) -> RouteContext {
        RouteContext { route_units: self.route_units, original_data_nodes: self.original_data_nodes }
    }
}

impl From<RouteContext> for RouteContextBuilder {
    fn from(context: RouteContext) -> Self {
        Self { route_units: context.route_units, original_data_nodes: context.original_data_nodes }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(ds: &str, tables: &[(&str, &str)]) -> RouteUnit {
        RouteUnit::new(
            RouteMapper::identity(ds),
            tables.iter().map(|(l, a)| RouteMapper::new(*l, *a)).collect(),
        )
    }

    #[test]
    fn test_route_unit_lookup() {
        let unit = unit("ds_0", &[("t_order", "t_order_1")]);
        assert_eq!(unit.actual_table("T_ORDER"), Some("t_order_1"));
        assert_eq!(unit.actual_table("t_user"), None);
        assert!(!unit.is_identity());
        assert!(RouteUnit::new(RouteMapper::identity("ds_0"), vec![RouteMapper::identity("t_config")]).is_identity());
    }

    #[test]
    fn test_builder_dedup_and_single_shard() {
        let mut builder = RouteContextBuilder::new();
        builder.add_unit(unit("ds_0", &[("t_order", "t_order_1")]));
        builder.add_unit(unit("ds_0", &[("t_order", "t_order_1")]));
        builder.add_original_data_nodes(vec![DataNode::new("ds_0", "t_order_1")]);

        let context = builder.build();
        assert_eq!(context.route_units().len(), 1);
        assert!(context.is_single_shard());
    }

    #[test]
    fn test_append_table_mapper() {
        let mut builder = RouteContextBuilder::new();
        builder.add_unit(unit("ds_0", &[("t_order", "t_order_0")]));
        builder.add_unit(unit("ds_1", &[("t_order", "t_order_0")]));

        assert!(builder.append_table_mapper("ds_1", &RouteMapper::identity("t_user")));
        assert!(!builder.append_table_mapper("ds_9", &RouteMapper::identity("t_user")));

        let context = builder.build();
        assert_eq!(context.route_units()[0].table_mappers().len(), 1);
        assert_eq!(context.route_units()[1].table_mappers().len(), 2);
        assert_eq!(context.actual_data_source_names(), vec!["ds_0", "ds_1"]);
        assert!(!context.is_single_shard());
    }
}
