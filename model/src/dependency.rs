//! FILENAME: model/src/dependency.rs
//! PURPOSE: Directed graph of references between formulas, parameters, and
//! user columns.
//! CONTEXT: Expression text embeds id-typed placeholders. Instead of the
//! listener wiring a notification framework would give us, the report keeps
//! explicit edges in both directions, detects circular references, and
//! answers "which expressions go stale when this object changes" in an
//! order where every expression comes after the things it reads.
//!
//! TERMINOLOGY:
//! - Precedents: objects an expression references (its inputs). If formula
//!   3 is "{@1} + {?2}", formula 1 and parameter 2 are precedents of 3.
//! - Dependents: expressions that reference a given object (the reverse
//!   index used for invalidation).
//!
//! USAGE:
//! 1. When an expression's text is set or changed, call
//!    `set_dependencies()` with its scanned precedent set.
//! 2. When an object's text or value changes, call `invalidation_order()`
//!    to learn which expressions must be marked stale, in order.
//! 3. Use `would_create_cycle()` to vet an edit before committing it.

use crate::expr::ObjectRef;
use std::collections::{HashMap, HashSet, VecDeque};

/// Error type for circular references.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleError {
    /// The objects involved in the cycle, in reference order.
    pub cycle_path: Vec<ObjectRef>,
}

impl std::fmt::Display for CycleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "circular reference detected: ")?;
        for (i, obj) in self.cycle_path.iter().enumerate() {
            if i > 0 {
                write!(f, " -> ")?;
            }
            write!(f, "{}", obj)?;
        }
        Ok(())
    }
}

impl std::error::Error for CycleError {}

/// Tracks reference relationships between identified report objects in
/// both directions so lookups are cheap either way.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    /// For each expression, the set of objects it directly references.
    precedents: HashMap<ObjectRef, HashSet<ObjectRef>>,

    /// For each object, the set of expressions that directly reference it.
    dependents: HashMap<ObjectRef, HashSet<ObjectRef>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        DependencyGraph {
            precedents: HashMap::new(),
            dependents: HashMap::new(),
        }
    }

    /// Sets the precedents of an expression, replacing any previous set
    /// and updating the reverse index to match.
    ///
    /// Does NOT check for cycles; vet with `would_create_cycle()` first
    /// when the edit comes from user input.
    pub fn set_dependencies(&mut self, dependent: ObjectRef, new_precedents: HashSet<ObjectRef>) {
        self.clear_dependencies(dependent);

        if !new_precedents.is_empty() {
            for &prec in &new_precedents {
                self.dependents.entry(prec).or_default().insert(dependent);
            }
            self.precedents.insert(dependent, new_precedents);
        }
    }

    /// Removes every edge owned by an expression. Called when its text is
    /// torn down (changed or the object is destroyed).
    pub fn clear_dependencies(&mut self, dependent: ObjectRef) {
        if let Some(old_precs) = self.precedents.remove(&dependent) {
            for prec in old_precs {
                if let Some(deps) = self.dependents.get_mut(&prec) {
                    deps.remove(&dependent);
                    if deps.is_empty() {
                        self.dependents.remove(&prec);
                    }
                }
            }
        }
    }

    /// The objects an expression directly references, if any.
    pub fn precedents_of(&self, obj: ObjectRef) -> Option<&HashSet<ObjectRef>> {
        self.precedents.get(&obj)
    }

    /// The expressions that directly reference an object, if any.
    pub fn dependents_of(&self, obj: ObjectRef) -> Option<&HashSet<ObjectRef>> {
        self.dependents.get(&obj)
    }

    /// Whether giving `dependent` these precedents would close a loop.
    /// Runs a DFS from each proposed precedent looking for `dependent`.
    pub fn would_create_cycle(
        &self,
        dependent: ObjectRef,
        new_precedents: &HashSet<ObjectRef>,
    ) -> bool {
        // An expression referencing itself is the trivial cycle
        if new_precedents.contains(&dependent) {
            return true;
        }

        for &prec in new_precedents {
            if self.can_reach(prec, dependent) {
                return true;
            }
        }

        false
    }

    /// True when `start` reaches `target` by following precedent chains.
    fn can_reach(&self, start: ObjectRef, target: ObjectRef) -> bool {
        let mut visited = HashSet::new();
        let mut stack = vec![start];

        while let Some(current) = stack.pop() {
            if current == target {
                return true;
            }

            if !visited.insert(current) {
                continue;
            }

            if let Some(precs) = self.precedents.get(&current) {
                for &prec in precs {
                    if !visited.contains(&prec) {
                        stack.push(prec);
                    }
                }
            }
        }

        false
    }

    /// Everything that must be marked stale when `changed` changes,
    /// ordered so each expression appears after all of its precedents.
    /// `changed` itself is not included.
    pub fn invalidation_order(&self, changed: ObjectRef) -> Result<Vec<ObjectRef>, CycleError> {
        let affected = self.all_dependents(changed);

        if affected.is_empty() {
            return Ok(Vec::new());
        }

        self.topological_sort(&affected)
    }

    /// Transitive dependents of an object, excluding the object itself.
    fn all_dependents(&self, obj: ObjectRef) -> HashSet<ObjectRef> {
        let mut result = HashSet::new();
        let mut queue = VecDeque::new();

        if let Some(deps) = self.dependents.get(&obj) {
            queue.extend(deps.iter().copied());
        }

        while let Some(current) = queue.pop_front() {
            if !result.insert(current) {
                continue;
            }

            if let Some(deps) = self.dependents.get(&current) {
                for &dep in deps {
                    if !result.contains(&dep) {
                        queue.push_back(dep);
                    }
                }
            }
        }

        result
    }

    /// Kahn's algorithm over a subset of objects; edges outside the subset
    /// are ignored. Leftover objects after the sort mean a cycle.
    fn topological_sort(&self, objs: &HashSet<ObjectRef>) -> Result<Vec<ObjectRef>, CycleError> {
        let mut in_degree: HashMap<ObjectRef, usize> = objs.iter().map(|&o| (o, 0)).collect();

        for (obj, deg) in in_degree.iter_mut() {
            if let Some(precs) = self.precedents.get(obj) {
                *deg += precs.iter().filter(|p| objs.contains(p)).count();
            }
        }

        let mut queue: VecDeque<ObjectRef> = in_degree
            .iter()
            .filter(|(_, &deg)| deg == 0)
            .map(|(&obj, _)| obj)
            .collect();

        let mut result = Vec::with_capacity(objs.len());

        while let Some(obj) = queue.pop_front() {
            result.push(obj);

            if let Some(deps) = self.dependents.get(&obj) {
                for &dep in deps {
                    if let Some(deg) = in_degree.get_mut(&dep) {
                        *deg -= 1;
                        if *deg == 0 {
                            queue.push_back(dep);
                        }
                    }
                }
            }
        }

        if result.len() != objs.len() {
            let cycle_objs: Vec<ObjectRef> = in_degree
                .iter()
                .filter(|(_, &deg)| deg > 0)
                .map(|(&obj, _)| obj)
                .collect();
            return Err(CycleError {
                cycle_path: self.trace_cycle(&cycle_objs),
            });
        }

        Ok(result)
    }

    /// Reconstructs one concrete loop through the leftover objects for the
    /// error message, falling back to the bare participant list.
    fn trace_cycle(&self, cycle_objs: &[ObjectRef]) -> Vec<ObjectRef> {
        if cycle_objs.is_empty() {
            return Vec::new();
        }

        let member: HashSet<ObjectRef> = cycle_objs.iter().copied().collect();
        let start = cycle_objs[0];
        let mut path = vec![start];
        let mut current = start;

        for _ in 0..cycle_objs.len() {
            let next = match self.precedents.get(&current) {
                Some(precs) => match precs.iter().find(|p| member.contains(p)) {
                    Some(&next) => next,
                    None => break,
                },
                None => break,
            };
            path.push(next);
            if next == start || path[..path.len() - 1].contains(&next) {
                return path;
            }
            current = next;
        }

        cycle_objs.to_vec()
    }

    /// Number of expressions currently holding edges.
    pub fn expression_count(&self) -> usize {
        self.precedents.len()
    }

    /// Total number of reference edges.
    pub fn edge_count(&self) -> usize {
        self.precedents.values().map(|v| v.len()).sum()
    }

    pub fn clear(&mut self) {
        self.precedents.clear();
        self.dependents.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn f(id: u64) -> ObjectRef {
        ObjectRef::Formula(id)
    }

    fn p(id: u64) -> ObjectRef {
        ObjectRef::Parameter(id)
    }

    fn set_of(objs: &[ObjectRef]) -> HashSet<ObjectRef> {
        objs.iter().copied().collect()
    }

    #[test]
    fn test_set_and_get_dependencies() {
        let mut graph = DependencyGraph::new();

        // Formula 3 reads formula 1 and parameter 2
        graph.set_dependencies(f(3), set_of(&[f(1), p(2)]));

        let precs = graph.precedents_of(f(3)).unwrap();
        assert!(precs.contains(&f(1)));
        assert!(precs.contains(&p(2)));
        assert_eq!(precs.len(), 2);

        assert!(graph.dependents_of(f(1)).unwrap().contains(&f(3)));
        assert!(graph.dependents_of(p(2)).unwrap().contains(&f(3)));
    }

    #[test]
    fn test_clear_dependencies() {
        let mut graph = DependencyGraph::new();

        graph.set_dependencies(f(3), set_of(&[f(1), f(2)]));
        graph.clear_dependencies(f(3));

        assert!(graph.precedents_of(f(3)).is_none());
        assert!(graph.dependents_of(f(1)).is_none());
        assert!(graph.dependents_of(f(2)).is_none());
    }

    #[test]
    fn test_text_change_replaces_edges() {
        let mut graph = DependencyGraph::new();

        graph.set_dependencies(f(3), set_of(&[f(1), f(2)]));
        graph.set_dependencies(f(3), set_of(&[p(7)]));

        let precs = graph.precedents_of(f(3)).unwrap();
        assert_eq!(precs.len(), 1);
        assert!(precs.contains(&p(7)));

        assert!(graph.dependents_of(f(1)).is_none());
        assert!(graph.dependents_of(f(2)).is_none());
        assert!(graph.dependents_of(p(7)).unwrap().contains(&f(3)));
    }

    #[test]
    fn test_cycle_detection_self_reference() {
        let graph = DependencyGraph::new();
        assert!(graph.would_create_cycle(f(1), &set_of(&[f(1)])));
    }

    #[test]
    fn test_cycle_detection_simple() {
        let mut graph = DependencyGraph::new();

        graph.set_dependencies(f(2), set_of(&[f(1)]));
        assert!(graph.would_create_cycle(f(1), &set_of(&[f(2)])));
    }

    #[test]
    fn test_cycle_detection_transitive() {
        let mut graph = DependencyGraph::new();

        graph.set_dependencies(f(2), set_of(&[f(1)]));
        graph.set_dependencies(f(3), set_of(&[f(2)]));

        // Formula 1 reading formula 3 closes 1 -> 3 -> 2 -> 1
        assert!(graph.would_create_cycle(f(1), &set_of(&[f(3)])));
    }

    #[test]
    fn test_no_false_positive_cycle() {
        let mut graph = DependencyGraph::new();

        graph.set_dependencies(f(2), set_of(&[f(1)]));

        assert!(!graph.would_create_cycle(f(9), &set_of(&[f(1)])));
        assert!(!graph.would_create_cycle(f(9), &set_of(&[f(2)])));
    }

    #[test]
    fn test_invalidation_order_chain() {
        let mut graph = DependencyGraph::new();

        graph.set_dependencies(f(2), set_of(&[p(1)]));
        graph.set_dependencies(f(3), set_of(&[f(2)]));

        // When parameter 1 changes, formula 2 goes stale before formula 3
        let order = graph.invalidation_order(p(1)).unwrap();
        assert_eq!(order, vec![f(2), f(3)]);
    }

    #[test]
    fn test_invalidation_order_diamond() {
        let mut graph = DependencyGraph::new();

        //     p1
        //    /  \
        //   f2  f3
        //    \  /
        //     f4
        graph.set_dependencies(f(2), set_of(&[p(1)]));
        graph.set_dependencies(f(3), set_of(&[p(1)]));
        graph.set_dependencies(f(4), set_of(&[f(2), f(3)]));

        let order = graph.invalidation_order(p(1)).unwrap();
        assert_eq!(order.len(), 3);

        let f2_pos = order.iter().position(|&o| o == f(2)).unwrap();
        let f3_pos = order.iter().position(|&o| o == f(3)).unwrap();
        let f4_pos = order.iter().position(|&o| o == f(4)).unwrap();

        assert!(f4_pos > f2_pos);
        assert!(f4_pos > f3_pos);
    }

    #[test]
    fn test_invalidation_order_no_dependents() {
        let graph = DependencyGraph::new();
        assert!(graph.invalidation_order(f(1)).unwrap().is_empty());
    }

    #[test]
    fn test_invalidation_reports_cycle() {
        let mut graph = DependencyGraph::new();

        // Build the loop directly, as a broken report file would
        graph.precedents.insert(f(1), set_of(&[f(2)]));
        graph.precedents.insert(f(2), set_of(&[f(1)]));
        graph.dependents.insert(f(1), set_of(&[f(2)]));
        graph.dependents.insert(f(2), set_of(&[f(1)]));

        let result = graph.invalidation_order(f(1));
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(!err.cycle_path.is_empty());
        assert!(err.to_string().contains("circular reference"));
    }

    #[test]
    fn test_counts() {
        let mut graph = DependencyGraph::new();

        assert_eq!(graph.expression_count(), 0);
        assert_eq!(graph.edge_count(), 0);

        graph.set_dependencies(f(2), set_of(&[p(1)]));
        graph.set_dependencies(f(3), set_of(&[p(1), f(2)]));

        assert_eq!(graph.expression_count(), 2);
        assert_eq!(graph.edge_count(), 3);
    }
}
