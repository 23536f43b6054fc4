//! Dependency graph between cache types.

use super::traits::Dependency;
use dove_core::{CacheError, CacheId, DoveResult};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone)]
struct Node {
    dependencies: Vec<Dependency>,
    principal_scoped: bool,
}

/// Adjacency list of cache types to the types they read from.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    nodes: BTreeMap<CacheId, Node>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node. Edges are checked by [`validate`](Self::validate).
    pub fn insert(
        &mut self,
        id: CacheId,
        dependencies: Vec<Dependency>,
        principal_scoped: bool,
    ) -> DoveResult<()> {
        if self.nodes.contains_key(&id) {
            return Err(CacheError::DuplicateCacheType { cache: id }.into());
        }
        self.nodes.insert(
            id,
            Node {
                dependencies,
                principal_scoped,
            },
        );
        Ok(())
    }

    pub fn contains(&self, id: CacheId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn ids(&self) -> impl Iterator<Item = CacheId> + '_ {
        self.nodes.keys().copied()
    }

    pub fn is_principal_scoped(&self, id: CacheId) -> bool {
        self.nodes.get(&id).is_some_and(|n| n.principal_scoped)
    }

    pub fn principal_scoped(&self) -> impl Iterator<Item = CacheId> + '_ {
        self.nodes
            .iter()
            .filter(|(_, node)| node.principal_scoped)
            .map(|(id, _)| *id)
    }

    pub fn dependencies_of(&self, id: CacheId) -> &[Dependency] {
        self.nodes
            .get(&id)
            .map(|n| n.dependencies.as_slice())
            .unwrap_or(&[])
    }

    /// Check every edge: dependencies exist, no shared type reads a
    /// principal-scoped one, and there are no cycles.
    pub fn validate(&self) -> DoveResult<()> {
        for (id, node) in &self.nodes {
            for dependency in &node.dependencies {
                let Some(target) = self.nodes.get(&dependency.id) else {
                    return Err(CacheError::UnknownDependency {
                        cache: *id,
                        dependency: dependency.id,
                    }
                    .into());
                };
                if !node.principal_scoped && target.principal_scoped {
                    return Err(CacheError::PrincipalScopeViolation {
                        cache: *id,
                        dependency: dependency.id,
                    }
                    .into());
                }
            }
        }
        self.topological_order().map(|_| ())
    }

    /// Order in which every type comes after all of its dependencies.
    pub fn topological_order(&self) -> DoveResult<Vec<CacheId>> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Visiting,
            Done,
        }

        fn visit(
            graph: &DependencyGraph,
            id: CacheId,
            marks: &mut BTreeMap<CacheId, Mark>,
            path: &mut Vec<CacheId>,
            order: &mut Vec<CacheId>,
        ) -> DoveResult<()> {
            match marks.get(&id) {
                Some(Mark::Done) => return Ok(()),
                Some(Mark::Visiting) => {
                    let start = path.iter().position(|p| *p == id).unwrap_or(0);
                    let mut cycle = path[start..].to_vec();
                    cycle.push(id);
                    return Err(CacheError::DependencyCycle { path: cycle }.into());
                }
                None => {}
            }
            marks.insert(id, Mark::Visiting);
            path.push(id);
            for dependency in graph.dependencies_of(id) {
                if graph.contains(dependency.id) {
                    visit(graph, dependency.id, marks, path, order)?;
                }
            }
            path.pop();
            marks.insert(id, Mark::Done);
            order.push(id);
            Ok(())
        }

        let mut marks = BTreeMap::new();
        let mut order = Vec::with_capacity(self.nodes.len());
        for id in self.nodes.keys() {
            visit(self, *id, &mut marks, &mut Vec::new(), &mut order)?;
        }
        Ok(order)
    }

    /// `id` plus everything it transitively depends on.
    pub fn dependency_closure(&self, id: CacheId) -> BTreeSet<CacheId> {
        let mut seen = BTreeSet::new();
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            if seen.insert(next) {
                stack.extend(self.dependencies_of(next).iter().map(|d| d.id));
            }
        }
        seen
    }

    /// Every type that transitively depends on `id`.
    pub fn dependents_of(&self, id: CacheId) -> BTreeSet<CacheId> {
        let mut found = BTreeSet::new();
        let mut stack = vec![id];
        while let Some(target) = stack.pop() {
            for (candidate, node) in &self.nodes {
                if node.dependencies.iter().any(|d| d.id == target) && found.insert(*candidate) {
                    stack.push(*candidate);
                }
            }
        }
        found
    }

    pub fn depends_on(&self, id: CacheId, dependency: CacheId) -> bool {
        id != dependency && self.dependency_closure(id).contains(&dependency)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dove_core::DoveError;

    const WORLD: CacheId = CacheId::new("world-cache");
    const COLLATERAL: CacheId = CacheId::new("collateral-cache");
    const VAULT: CacheId = CacheId::new("vault-cache");
    const DVD: CacheId = CacheId::new("dvd-cache");

    fn protocol_graph() -> DependencyGraph {
        let mut graph = DependencyGraph::new();
        graph.insert(WORLD, vec![], false).unwrap();
        graph.insert(COLLATERAL, vec![], false).unwrap();
        graph
            .insert(
                VAULT,
                vec![Dependency::required(WORLD), Dependency::required(COLLATERAL)],
                true,
            )
            .unwrap();
        graph.insert(DVD, vec![Dependency::required(WORLD)], true).unwrap();
        graph
    }

    #[test]
    fn test_valid_graph_orders_dependencies_first() {
        let graph = protocol_graph();
        graph.validate().unwrap();
        let order = graph.topological_order().unwrap();
        let pos = |id| order.iter().position(|x| *x == id).unwrap();
        assert!(pos(WORLD) < pos(VAULT));
        assert!(pos(COLLATERAL) < pos(VAULT));
        assert!(pos(WORLD) < pos(DVD));
    }

    #[test]
    fn test_dependents_are_transitive() {
        let mut graph = protocol_graph();
        let summary = CacheId::new("summary-cache");
        graph.insert(summary, vec![Dependency::required(VAULT)], true).unwrap();
        let dependents = graph.dependents_of(WORLD);
        assert!(dependents.contains(&VAULT));
        assert!(dependents.contains(&DVD));
        assert!(dependents.contains(&summary));
        assert!(!dependents.contains(&COLLATERAL));
        assert!(graph.depends_on(summary, WORLD));
        assert!(!graph.depends_on(WORLD, WORLD));
    }

    #[test]
    fn test_closure_includes_self() {
        let graph = protocol_graph();
        let closure = graph.dependency_closure(VAULT);
        assert_eq!(closure.into_iter().collect::<Vec<_>>(), {
            let mut v = vec![COLLATERAL, VAULT, WORLD];
            v.sort();
            v
        });
    }

    #[test]
    fn test_cycle_is_rejected_with_path() {
        let a = CacheId::new("a-cache");
        let b = CacheId::new("b-cache");
        let mut graph = DependencyGraph::new();
        graph.insert(a, vec![Dependency::required(b)], false).unwrap();
        graph.insert(b, vec![Dependency::required(a)], false).unwrap();
        match graph.validate() {
            Err(DoveError::Cache(CacheError::DependencyCycle { path })) => {
                assert_eq!(path.first(), path.last());
                assert!(path.contains(&a) && path.contains(&b));
            }
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let a = CacheId::new("a-cache");
        let mut graph = DependencyGraph::new();
        graph.insert(a, vec![Dependency::required(a)], false).unwrap();
        assert!(graph.validate().is_err());
    }

    #[test]
    fn test_shared_type_cannot_read_principal_scoped() {
        let mut graph = protocol_graph();
        let bad = CacheId::new("bad-cache");
        graph.insert(bad, vec![Dependency::required(VAULT)], false).unwrap();
        assert!(matches!(
            graph.validate(),
            Err(DoveError::Cache(CacheError::PrincipalScopeViolation { .. }))
        ));
    }

    #[test]
    fn test_unknown_dependency_and_duplicate() {
        let mut graph = DependencyGraph::new();
        graph.insert(VAULT, vec![Dependency::required(WORLD)], true).unwrap();
        assert!(matches!(
            graph.validate(),
            Err(DoveError::Cache(CacheError::UnknownDependency { .. }))
        ));
        assert!(graph.insert(VAULT, vec![], true).is_err());
    }
}
