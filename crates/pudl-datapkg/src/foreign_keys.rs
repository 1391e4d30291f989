//! Foreign key dependency resolution
//!
//! A standalone export of some tables must also carry every table they
//! reference, directly or transitively, or the referential integrity of the
//! export breaks. [`ForeignKeyGraph::closure`] computes that set.
//!
//! The traversal is an explicit-stack depth first search, so arbitrarily deep
//! graphs cannot overflow the call stack, and a reference cycle is reported
//! instead of looping.

use crate::catalog::SchemaCatalog;
use crate::error::{DatapkgError, Result};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

static NO_REFERENCES: BTreeSet<String> = BTreeSet::new();

/// Table name -> tables it references through a foreign key
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ForeignKeyGraph {
    edges: BTreeMap<String, BTreeSet<String>>,
}

enum Visit {
    Enter(String),
    Exit(String),
}

impl ForeignKeyGraph {
    /// Derive the graph from every table in the catalog
    pub fn from_catalog(catalog: &SchemaCatalog) -> Self {
        let edges = catalog
            .tables()
            .map(|table| {
                let references = table
                    .schema
                    .foreign_keys
                    .iter()
                    .map(|fk| fk.reference.resource.clone())
                    .collect();
                (table.name.clone(), references)
            })
            .collect();
        Self { edges }
    }

    /// Build a graph from explicit `(table, referenced tables)` pairs
    pub fn from_edges<I, S, R>(edges: I) -> Self
    where
        I: IntoIterator<Item = (S, R)>,
        S: Into<String>,
        R: IntoIterator<Item = S>,
    {
        let edges = edges
            .into_iter()
            .map(|(table, refs)| (table.into(), refs.into_iter().map(Into::into).collect()))
            .collect();
        Self { edges }
    }

    pub fn contains(&self, table: &str) -> bool {
        self.edges.contains_key(table)
    }

    /// Tables directly referenced by `table`
    pub fn references(&self, table: &str) -> Option<&BTreeSet<String>> {
        self.edges.get(table)
    }

    pub fn tables(&self) -> impl Iterator<Item = &str> {
        self.edges.keys().map(String::as_str)
    }

    /// Seed tables plus every table reachable from them
    ///
    /// Any table that is not in the graph, whether a seed or a referenced
    /// table, is a lookup error. Cycles are logged and traversal continues
    /// without revisiting.
    pub fn closure<I, S>(&self, seeds: I) -> Result<BTreeSet<String>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut done: BTreeSet<String> = BTreeSet::new();
        let mut on_path: BTreeSet<String> = BTreeSet::new();
        let mut stack: Vec<Visit> = Vec::new();

        for seed in seeds {
            stack.push(Visit::Enter(seed.as_ref().to_string()));

            while let Some(visit) = stack.pop() {
                match visit {
                    Visit::Enter(table) => {
                        if done.contains(&table) || on_path.contains(&table) {
                            continue;
                        }
                        let references = self
                            .edges
                            .get(&table)
                            .ok_or_else(|| DatapkgError::TableNotFound(table.clone()))?;

                        debug!(table = %table, "Finding dependent tables");
                        on_path.insert(table.clone());
                        stack.push(Visit::Exit(table.clone()));

                        for referenced in references {
                            if on_path.contains(referenced) {
                                warn!(
                                    from = %table,
                                    to = %referenced,
                                    "Foreign key cycle detected, not following reference"
                                );
                            } else if !done.contains(referenced) {
                                stack.push(Visit::Enter(referenced.clone()));
                            }
                        }
                    }
                    Visit::Exit(table) => {
                        on_path.remove(&table);
                        done.insert(table);
                    }
                }
            }
        }

        Ok(done)
    }

    /// One reference cycle, first table repeated at the end, if any exists
    pub fn find_cycle(&self) -> Option<Vec<String>> {
        let mut done: BTreeSet<&str> = BTreeSet::new();

        for start in self.edges.keys() {
            if done.contains(start.as_str()) {
                continue;
            }

            let mut path: Vec<&str> = vec![start.as_str()];
            let mut pending = vec![self.neighbours(start)];

            while let Some(neighbours) = pending.last_mut() {
                match neighbours.next() {
                    Some(next) => {
                        if let Some(pos) = path.iter().position(|t| *t == next.as_str()) {
                            let mut cycle: Vec<String> =
                                path[pos..].iter().map(|t| t.to_string()).collect();
                            cycle.push(next.clone());
                            return Some(cycle);
                        }
                        if !done.contains(next.as_str()) {
                            path.push(next.as_str());
                            pending.push(self.neighbours(next));
                        }
                    }
                    None => {
                        pending.pop();
                        if let Some(finished) = path.pop() {
                            done.insert(finished);
                        }
                    }
                }
            }
        }

        None
    }

    fn neighbours(&self, table: &str) -> std::collections::btree_set::Iter<'_, String> {
        self.edges.get(table).unwrap_or(&NO_REFERENCES).iter()
    }
}
