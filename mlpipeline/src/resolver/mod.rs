//! Dependency resolution for stage sets.
//!
//! Two orderings are derived from the declared dependency edges: a single
//! total order (DAG mode) and a sequence of dependency groups (parallel
//! mode). Both fail with a circular-dependency error before any stage runs
//! when the edges do not form a DAG. Within a group, and among siblings
//! with no ordering constraint, declaration order is preserved; nothing
//! is implicitly reordered.

use crate::errors::{CycleError, ValidationError, ValidationIssue};
use std::collections::{HashMap, HashSet};

/// A stage name plus its declared dependency names, in declaration order.
pub type DependencyNode = (String, Vec<String>);

/// Validates that every dependency references another stage in the set and
/// that no stage depends on itself.
///
/// # Errors
///
/// Returns all reference problems as itemized validation issues.
pub fn validate_references(nodes: &[DependencyNode]) -> Result<(), ValidationError> {
    let names: HashSet<&str> = nodes.iter().map(|(name, _)| name.as_str()).collect();
    let mut issues = Vec::new();

    for (name, deps) in nodes {
        for dep in deps {
            if dep == name {
                issues.push(ValidationIssue::stage(
                    name.as_str(),
                    "stage cannot depend on itself",
                ));
            } else if !names.contains(dep.as_str()) {
                issues.push(ValidationIssue::stage(
                    name.as_str(),
                    format!("depends on unknown stage '{dep}'"),
                ));
            }
        }
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(ValidationError::new(issues))
    }
}

/// Partitions stages into an ordered sequence of groups such that every
/// stage's dependencies lie in strictly earlier groups and stages within a
/// group have no dependency relationship to each other.
///
/// # Errors
///
/// Returns a [`CycleError`] naming the unprocessable stages when no
/// progress can be made while stages remain.
pub fn group_stages(nodes: &[DependencyNode]) -> Result<Vec<Vec<String>>, CycleError> {
    let names: HashSet<&str> = nodes.iter().map(|(name, _)| name.as_str()).collect();
    let mut done: HashSet<&str> = HashSet::new();
    let mut remaining: Vec<usize> = (0..nodes.len()).collect();
    let mut groups = Vec::new();

    while !remaining.is_empty() {
        let (ready, blocked): (Vec<usize>, Vec<usize>) = remaining.iter().copied().partition(|&idx| {
            nodes[idx]
                .1
                .iter()
                .all(|dep| done.contains(dep.as_str()) || !names.contains(dep.as_str()))
        });

        if ready.is_empty() {
            let stuck: Vec<String> = blocked.iter().map(|&idx| nodes[idx].0.clone()).collect();
            return Err(CycleError::new(stuck));
        }

        for &idx in &ready {
            done.insert(nodes[idx].0.as_str());
        }
        groups.push(ready.into_iter().map(|idx| nodes[idx].0.clone()).collect());
        remaining = blocked;
    }

    Ok(groups)
}

/// Produces a total order consistent with all dependency edges via a
/// three-color depth-first visit (unvisited / in-progress / done).
///
/// # Errors
///
/// Returns a [`CycleError`] carrying the cycle path when a depth-first
/// visit re-enters an in-progress stage.
pub fn topological_order(nodes: &[DependencyNode]) -> Result<Vec<String>, CycleError> {
    let index: HashMap<&str, usize> = nodes
        .iter()
        .enumerate()
        .map(|(idx, (name, _))| (name.as_str(), idx))
        .collect();

    let mut done: HashSet<usize> = HashSet::new();
    let mut in_progress: HashSet<usize> = HashSet::new();
    let mut path: Vec<usize> = Vec::new();
    let mut order: Vec<String> = Vec::new();

    fn visit(
        idx: usize,
        nodes: &[DependencyNode],
        index: &HashMap<&str, usize>,
        done: &mut HashSet<usize>,
        in_progress: &mut HashSet<usize>,
        path: &mut Vec<usize>,
        order: &mut Vec<String>,
    ) -> Result<(), CycleError> {
        if done.contains(&idx) {
            return Ok(());
        }
        if in_progress.contains(&idx) {
            let start = path.iter().position(|&p| p == idx).unwrap_or(0);
            let mut cycle: Vec<String> =
                path[start..].iter().map(|&p| nodes[p].0.clone()).collect();
            cycle.push(nodes[idx].0.clone());
            return Err(CycleError::new(cycle));
        }

        in_progress.insert(idx);
        path.push(idx);

        for dep in &nodes[idx].1 {
            if let Some(&dep_idx) = index.get(dep.as_str()) {
                visit(dep_idx, nodes, index, done, in_progress, path, order)?;
            }
        }

        in_progress.remove(&idx);
        path.pop();
        done.insert(idx);
        order.push(nodes[idx].0.clone());
        Ok(())
    }

    // Visit in declaration order so unconstrained siblings keep it.
    for idx in 0..nodes.len() {
        visit(
            idx,
            nodes,
            &index,
            &mut done,
            &mut in_progress,
            &mut path,
            &mut order,
        )?;
    }

    Ok(order)
}
