//! Parameter builders and rewriters
//!
//! Parameters of a multi-row INSERT are split into one group per row so a
//! unit receiving a subset of the rows receives exactly their parameters.
//! Added and replaced values are kept per group, keyed by index inside the
//! group, so rewriting one row never shifts another.

use indexmap::IndexMap;
use strata_router_core::StatementContext;
use strata_types::{ExprValue, Value};
use tracing::trace;

use crate::context::RewriteContext;
use crate::error::RewriteError;
use crate::generator::merged_pagination;

/// Original parameters plus the values added and replaced by rewriters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StandardParameterBuilder {
    original: Vec<Value>,
    /// Inserted before the original parameter at the key; a key equal to
    /// the parameter count appends
    added: IndexMap<usize, Vec<Value>>,
    replaced: IndexMap<usize, Value>,
}

impl StandardParameterBuilder {
    pub fn new(original: Vec<Value>) -> Self {
        Self { original, added: IndexMap::new(), replaced: IndexMap::new() }
    }

    pub fn original(&self) -> &[Value] {
        &self.original
    }

    pub fn add(&mut self, index: usize, value: Value) {
        self.added.entry(index.min(self.original.len())).or_default().push(value);
    }

    /// Append after every original parameter
    pub fn append(&mut self, value: Value) {
        self.add(self.original.len(), value);
    }

    pub fn replace(&mut self, index: usize, value: Value) {
        if index < self.original.len() {
            self.replaced.insert(index, value);
        }
    }

    pub fn parameters(&self) -> Vec<Value> {
        let added: usize = self.added.values().map(Vec::len).sum();
        let mut result = Vec::with_capacity(self.original.len() + added);
        for (index, value) in self.original.iter().enumerate() {
            if let Some(values) = self.added.get(&index) {
                result.extend(values.iter().cloned());
            }
            result.push(self.replaced.get(&index).unwrap_or(value).clone());
        }
        if let Some(values) = self.added.get(&self.original.len()) {
            result.extend(values.iter().cloned());
        }
        result
    }
}

/// One builder per INSERT row plus the parameters outside the rows
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupedParameterBuilder {
    groups: Vec<StandardParameterBuilder>,
    generic: StandardParameterBuilder,
}

impl GroupedParameterBuilder {
    pub fn new(groups: Vec<Vec<Value>>, generic: Vec<Value>) -> Self {
        Self {
            groups: groups.into_iter().map(StandardParameterBuilder::new).collect(),
            generic: StandardParameterBuilder::new(generic),
        }
    }

    pub fn groups(&self) -> &[StandardParameterBuilder] {
        &self.groups
    }

    pub fn group_mut(&mut self, index: usize) -> Option<&mut StandardParameterBuilder> {
        self.groups.get_mut(index)
    }

    pub fn generic_mut(&mut self) -> &mut StandardParameterBuilder {
        &mut self.generic
    }

    pub fn parameters(&self) -> Vec<Value> {
        self.groups
            .iter()
            .flat_map(StandardParameterBuilder::parameters)
            .chain(self.generic.parameters())
            .collect()
    }

    /// Parameters of the selected rows, in row order, then the rest
    pub fn parameters_for_groups(&self, groups: &[usize]) -> Vec<Value> {
        groups
            .iter()
            .filter_map(|i| self.groups.get(*i))
            .flat_map(StandardParameterBuilder::parameters)
            .chain(self.generic.parameters())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParameterBuilder {
    Standard(StandardParameterBuilder),
    Grouped(GroupedParameterBuilder),
}

impl ParameterBuilder {
    /// Grouped for INSERT ... VALUES, standard otherwise
    pub fn new(ctx: &StatementContext<'_>) -> Result<Self, RewriteError> {
        let parameters = ctx.parameters();
        let Some(insert) = ctx.statement().insert.as_ref().filter(|i| !i.rows.is_empty()) else {
            return Ok(Self::Standard(StandardParameterBuilder::new(parameters.to_vec())));
        };

        let mut used = vec![false; parameters.len()];
        let mut groups = Vec::with_capacity(insert.rows.len());
        for row in &insert.rows {
            let mut group = Vec::with_capacity(row.parameter_count());
            for index in row.values.iter().filter_map(|v| v.value.parameter_index()) {
                let value = parameters.get(index).ok_or(RewriteError::MissingParameter(index))?;
                group.push(value.clone());
                used[index] = true;
            }
            groups.push(group);
        }
        let generic = parameters
            .iter()
            .zip(&used)
            .filter(|(_, used)| !**used)
            .map(|(value, _)| value.clone())
            .collect();

        Ok(Self::Grouped(GroupedParameterBuilder::new(groups, generic)))
    }

    pub fn parameters(&self) -> Vec<Value> {
        match self {
            ParameterBuilder::Standard(builder) => builder.parameters(),
            ParameterBuilder::Grouped(builder) => builder.parameters(),
        }
    }
}

/// Closed set of parameter rewriters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterRewriter {
    /// Generated key per parameterised INSERT row
    GeneratedKey,
    /// Offset and row count markers of a page spread over several units
    Pagination,
}

impl ParameterRewriter {
    pub const ALL: [ParameterRewriter; 2] = [ParameterRewriter::GeneratedKey, ParameterRewriter::Pagination];

    pub fn rewrite(&self, builder: &mut ParameterBuilder, ctx: &RewriteContext<'_>) -> Result<(), RewriteError> {
        match self {
            ParameterRewriter::GeneratedKey => {
                rewrite_generated_keys(builder, ctx);
                Ok(())
            }
            ParameterRewriter::Pagination => rewrite_pagination(builder, ctx),
        }
    }
}

fn rewrite_generated_keys(builder: &mut ParameterBuilder, ctx: &RewriteContext<'_>) {
    let ParameterBuilder::Grouped(grouped) = builder else {
        return;
    };
    let (Some(insert), Some(keys)) = (&ctx.bound().insert, ctx.statement.generated_keys()) else {
        return;
    };

    for (row_index, row) in insert.rows.iter().enumerate() {
        // literal rows carry their key in the SQL text
        if row.parameter_count() == 0 {
            continue;
        }
        if let (Some(group), Some(key)) = (grouped.group_mut(row_index), keys.values.get(row_index)) {
            group.append(key.clone());
        }
    }
    trace!(rows = insert.rows.len(), column = %keys.column, "Added generated key parameters");
}

fn rewrite_pagination(builder: &mut ParameterBuilder, ctx: &RewriteContext<'_>) -> Result<(), RewriteError> {
    let ParameterBuilder::Standard(standard) = builder else {
        return Ok(());
    };
    let Some(merged) = merged_pagination(ctx)? else {
        return Ok(());
    };
    let Some(limit) = &ctx.bound().limit else {
        return Ok(());
    };

    if let Some(ExprValue::Parameter(index)) = limit.offset.as_ref().map(|o| &o.value) {
        standard.replace(*index, Value::Int(merged.offset));
    }
    if let (Some(ExprValue::Parameter(index)), Some(row_count)) =
        (limit.row_count.as_ref().map(|r| &r.value), merged.row_count)
    {
        standard.replace(*index, Value::Int(row_count));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_add_and_replace() {
        let mut builder = StandardParameterBuilder::new(vec![Value::Int(1), Value::Int(2)]);
        builder.add(1, Value::Int(9));
        builder.append(Value::Int(10));
        builder.replace(0, Value::Int(0));
        builder.replace(7, Value::Int(7));

        assert_eq!(
            builder.parameters(),
            vec![Value::Int(0), Value::Int(9), Value::Int(2), Value::Int(10)]
        );
        assert_eq!(builder.original(), [Value::Int(1), Value::Int(2)]);
    }

    #[test]
    fn test_grouped_batch_rows_stay_independent() {
        let rows: Vec<Vec<Value>> = (0..3).map(|i| vec![Value::Int(i * 10), Value::Int(i * 10 + 1)]).collect();
        let mut builder = GroupedParameterBuilder::new(rows, vec![Value::from("tail")]);
        for i in 0..3 {
            builder.group_mut(i).unwrap().append(Value::Int(1000 + i as i64));
        }

        for i in 0..3usize {
            let params = builder.groups()[i].parameters();
            assert_eq!(params.len(), 3);
            for j in (0..3).filter(|j| *j != i) {
                assert!(!params.contains(&Value::Int(1000 + j as i64)));
            }
        }

        assert_eq!(builder.parameters().len(), 10);
        assert_eq!(
            builder.parameters_for_groups(&[2]),
            vec![Value::Int(20), Value::Int(21), Value::Int(1002), Value::from("tail")]
        );
    }
}
