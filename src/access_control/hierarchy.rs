//! Role hierarchy
//!
//! An edge `ROLE_A > ROLE_B` means a principal holding `ROLE_A` also holds
//! `ROLE_B`. The transitive closure is recomputed on every edge insertion, so
//! lookups during request handling are read-only.

use crate::error::HierarchyError;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::debug;

/// Directed role implication graph with a precomputed closure
#[derive(Debug, Clone, Default)]
pub struct RoleHierarchy {
    /// superior -> direct subordinates
    edges: BTreeMap<String, Vec<String>>,
    /// role -> every role it implies (itself excluded)
    closure: HashMap<String, HashSet<String>>,
}

impl RoleHierarchy {
    /// A hierarchy without edges; `expand` is the identity
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the textual form: one relation per line or `;`-separated,
    /// each possibly chained (`ROLE_A > ROLE_B > ROLE_C`)
    pub fn parse(text: &str) -> Result<Self, HierarchyError> {
        let mut hierarchy = Self::new();
        for line in text.split(['\n', ';']).map(str::trim) {
            if line.is_empty() {
                continue;
            }
            let roles: Vec<&str> = line.split('>').map(str::trim).collect();
            if roles.len() < 2 || roles.iter().any(|r| r.is_empty()) {
                return Err(HierarchyError::Malformed(line.to_string()));
            }
            for pair in roles.windows(2) {
                hierarchy.add_edge(pair[0], pair[1])?;
            }
        }
        Ok(hierarchy)
    }

    /// Add `superior > subordinate`, rejecting edges that close a cycle
    pub fn add_edge(&mut self, superior: &str, subordinate: &str) -> Result<(), HierarchyError> {
        if superior == subordinate || self.implies(subordinate, superior) {
            return Err(HierarchyError::Cycle(superior.to_string()));
        }

        let subordinates = self.edges.entry(superior.to_string()).or_default();
        if subordinates.iter().any(|s| s == subordinate) {
            return Ok(());
        }
        subordinates.push(subordinate.to_string());

        self.rebuild_closure();
        debug!(superior, subordinate, "Added role hierarchy edge");
        Ok(())
    }

    /// Granted roles plus every role they transitively imply
    pub fn expand<'a, I>(&self, granted: I) -> HashSet<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut expanded = HashSet::new();
        for role in granted {
            if let Some(implied) = self.closure.get(role) {
                expanded.extend(implied.iter().cloned());
            }
            expanded.insert(role.to_string());
        }
        expanded
    }

    /// Whether holding `superior` grants `subordinate` through the hierarchy
    pub fn implies(&self, superior: &str, subordinate: &str) -> bool {
        self.closure
            .get(superior)
            .is_some_and(|implied| implied.contains(subordinate))
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// All direct edges, ordered by superior
    pub fn edges(&self) -> impl Iterator<Item = (&str, &str)> {
        self.edges
            .iter()
            .flat_map(|(sup, subs)| subs.iter().map(move |sub| (sup.as_str(), sub.as_str())))
    }

    fn rebuild_closure(&mut self) {
        let mut closure = HashMap::with_capacity(self.edges.len());
        for role in self.edges.keys() {
            let mut reached = HashSet::new();
            let mut stack: Vec<&str> = vec![role.as_str()];
            while let Some(current) = stack.pop() {
                for next in self.edges.get(current).into_iter().flatten() {
                    if reached.insert(next.clone()) {
                        stack.push(next);
                    }
                }
            }
            closure.insert(role.clone(), reached);
        }
        self.closure = closure;
    }
}
