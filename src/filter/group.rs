use std::collections::BTreeMap;
use crate::core::error::{Error, ErrorKind, Result};
use crate::filter::operand::{FilterOperand, Operator};
use crate::schema::column::CollectionSchema;

/// Group used by `add_filter` when the caller names none
pub const DEFAULT_GROUP: &str = "default";
/// Reserved group holding scoping filters that survive `clear_filters`
pub const STATIC_GROUP: &str = "static";

/// One predicate: column, operator, value
#[derive(Debug, Clone)]
pub struct FilterValue {
    pub column: String,
    pub operator: Operator,
    pub value: FilterOperand,
}

/// Named set of predicates joined uniformly by AND or OR
#[derive(Debug, Clone)]
pub struct FilterGroup {
    pub name: String,
    pub parent: String,         // "" = top level
    pub or_sequence: bool,
    pub values: Vec<FilterValue>,
    pub is_static: bool,
    customized: bool,           // set once setup_group configured it
}

impl FilterGroup {
    fn new(name: &str, or_sequence: bool, parent: &str, is_static: bool) -> Self {
        FilterGroup {
            name: name.to_string(),
            parent: parent.to_string(),
            or_sequence,
            values: Vec::new(),
            is_static,
            customized: false,
        }
    }
}

/// Arena of filter groups keyed by name.
///
/// Parent links are stored as names, never as references; the compiler
/// resolves them with a children index at compile time. `BTreeMap` keeps
/// iteration lexicographic so compiled output is reproducible.
#[derive(Debug, Clone, Default)]
pub struct FilterTree {
    groups: BTreeMap<String, FilterGroup>,
}

impl FilterTree {
    pub fn new() -> Self {
        FilterTree {
            groups: BTreeMap::new(),
        }
    }

    /// Idempotent creation.
    ///
    /// An existing group is only reconfigured if nothing configured it before;
    /// groups created implicitly by `add_filter` can be configured once.
    pub fn setup_group(&mut self, name: &str, or_sequence: bool, parent: &str) -> Result<()> {
        if name.is_empty() {
            return Err(Error::new(
                ErrorKind::InvalidArgument,
                "filter group name must not be empty".to_string(),
            ));
        }

        let group = self
            .groups
            .entry(name.to_string())
            .or_insert_with(|| FilterGroup::new(name, or_sequence, parent, name == STATIC_GROUP));

        if !group.customized {
            group.or_sequence = or_sequence;
            group.parent = parent.to_string();
            group.customized = true;
        }
        Ok(())
    }

    /// Append a predicate to `group`, creating it (AND, top level) on demand
    pub fn add_filter(
        &mut self,
        schema: &CollectionSchema,
        group: &str,
        column: &str,
        operator: Operator,
        value: FilterOperand,
    ) -> Result<()> {
        if group.is_empty() {
            return Err(Error::new(
                ErrorKind::InvalidArgument,
                "filter group name must not be empty".to_string(),
            ));
        }
        schema.column(column)?;

        let is_static = group == STATIC_GROUP;
        self.groups
            .entry(group.to_string())
            .or_insert_with(|| FilterGroup::new(group, false, "", is_static))
            .values
            .push(FilterValue {
                column: column.to_string(),
                operator,
                value,
            });
        Ok(())
    }

    pub fn add_static_filter(
        &mut self,
        schema: &CollectionSchema,
        column: &str,
        operator: Operator,
        value: FilterOperand,
    ) -> Result<()> {
        self.add_filter(schema, STATIC_GROUP, column, operator, value)
    }

    /// Drop every non-static group; static groups keep their predicates
    pub fn clear_filters(&mut self) {
        self.groups.retain(|_, group| group.is_static);
    }

    /// Copy containing only the static groups
    pub fn static_only(&self) -> FilterTree {
        let mut tree = self.clone();
        tree.clear_filters();
        tree
    }

    pub fn group(&self, name: &str) -> Option<&FilterGroup> {
        self.groups.get(name)
    }

    /// Groups in lexicographic name order
    pub fn groups(&self) -> impl Iterator<Item = &FilterGroup> {
        self.groups.values()
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}
