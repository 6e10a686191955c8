use std::collections::{BTreeMap, HashMap};
use crate::core::error::{Error, ErrorKind, Result};
use crate::filter::group::FilterTree;
use crate::query::translate::{OperatorTranslator, Predicate};
use crate::schema::column::CollectionSchema;

/// Compiles a filter tree into one native boolean expression.
///
/// Implementations only describe how a single predicate is rendered and how
/// terms are joined; the tree walk is shared.
pub trait QueryCompiler {
    type Selector;

    fn translator(&self) -> &OperatorTranslator;

    fn predicate(&mut self, predicate: Predicate) -> Result<Self::Selector>;

    /// Join two or more terms, parenthesized/nested as one term
    fn join(&self, terms: Vec<Self::Selector>, or_sequence: bool) -> Self::Selector;

    fn match_all(&self) -> Self::Selector;

    fn compile(&mut self, schema: &CollectionSchema, filters: &FilterTree) -> Result<Self::Selector> {
        let walk = GroupWalk::new(filters)?;
        let mut collapsed: HashMap<&str, Self::Selector> = HashMap::new();

        for name in &walk.post_order {
            let group = match filters.group(name) {
                Some(group) => group,
                None => continue,
            };

            let mut terms = Vec::with_capacity(group.values.len());
            for value in &group.values {
                let predicate = self.translator().translate(schema, value)?;
                terms.push(self.predicate(predicate)?);
            }
            for child in walk.children(name) {
                if let Some(term) = collapsed.remove(child) {
                    terms.push(term);
                }
            }

            if let Some(term) = self.collapse(terms, group.or_sequence) {
                collapsed.insert(*name, term);
            }
        }

        let roots: Vec<Self::Selector> = walk
            .children("")
            .iter()
            .filter_map(|name| collapsed.remove(name))
            .collect();

        Ok(self.collapse(roots, false).unwrap_or_else(|| self.match_all()))
    }

    fn collapse(&self, mut terms: Vec<Self::Selector>, or_sequence: bool) -> Option<Self::Selector> {
        match terms.len() {
            0 => None,
            1 => terms.pop(),
            _ => Some(self.join(terms, or_sequence)),
        }
    }
}

/// Children index plus a leaves-first visiting order over the group forest
struct GroupWalk<'a> {
    children: BTreeMap<&'a str, Vec<&'a str>>,
    post_order: Vec<&'a str>,
}

impl<'a> GroupWalk<'a> {
    fn new(filters: &'a FilterTree) -> Result<Self> {
        let mut children: BTreeMap<&'a str, Vec<&'a str>> = BTreeMap::new();

        // groups() is lexicographic, so every child list is too
        for group in filters.groups() {
            if !group.parent.is_empty() && filters.group(&group.parent).is_none() {
                return Err(Error::new(
                    ErrorKind::CompileError,
                    format!(
                        "filter group '{}' references unknown parent '{}'",
                        group.name, group.parent
                    ),
                ));
            }
            if group.parent == group.name {
                return Err(Error::new(
                    ErrorKind::CompileError,
                    format!("filter group '{}' is its own parent", group.name),
                ));
            }
            children
                .entry(group.parent.as_str())
                .or_default()
                .push(group.name.as_str());
        }

        // Iterative DFS from the virtual root; groups on a cycle are never reached
        let mut post_order = Vec::with_capacity(filters.len());
        let mut stack: Vec<(&'a str, bool)> = vec![("", false)];
        while let Some((name, expanded)) = stack.pop() {
            if expanded {
                if !name.is_empty() {
                    post_order.push(name);
                }
                continue;
            }
            stack.push((name, true));
            if let Some(kids) = children.get(name) {
                for kid in kids.iter().rev() {
                    stack.push((*kid, false));
                }
            }
        }

        if post_order.len() != filters.len() {
            let unreachable: Vec<&str> = filters
                .groups()
                .map(|group| group.name.as_str())
                .filter(|name| !post_order.contains(name))
                .collect();
            return Err(Error::new(
                ErrorKind::CompileError,
                format!("filter groups form a cycle: {}", unreachable.join(", ")),
            ));
        }

        Ok(GroupWalk {
            children,
            post_order,
        })
    }

    fn children(&self, name: &str) -> &[&'a str] {
        self.children.get(name).map(Vec::as_slice).unwrap_or(&[])
    }
}
