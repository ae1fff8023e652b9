//! # Router
//!
//! Shortest paths over the adjacency model.
//!
//! Every conveyor link costs one hop, so path cost is hop count. The search
//! is Dijkstra with a binary min-heap and an early exit once the target is
//! popped. When several shortest paths exist, which one is returned depends
//! on heap order and is not part of the contract: callers may rely on the
//! length of the path and on each step being an edge, not on the exact
//! modules chosen.

use crate::observer::{ConveyorEvent, Observer};
use crate::topology::Topology;
use crate::{ConveyorError, ModuleId};
use serde::Serialize;
use std::cmp::Reverse;
use std::collections::BinaryHeap;

/// An ordered path from start to target, both inclusive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Route(Vec<ModuleId>);

impl Route {
    /// The modules along the route.
    #[must_use]
    pub fn modules(&self) -> &[ModuleId] {
        &self.0
    }

    /// Number of edges travelled.
    #[must_use]
    pub fn hops(&self) -> usize {
        self.0.len().saturating_sub(1)
    }

    #[must_use]
    pub fn start(&self) -> Option<&ModuleId> {
        self.0.first()
    }

    #[must_use]
    pub fn target(&self) -> Option<&ModuleId> {
        self.0.last()
    }

    /// The module after the start, or `None` when start is the target.
    #[must_use]
    pub fn next_hop(&self) -> Option<&ModuleId> {
        self.0.get(1)
    }
}

/// Find a shortest path from `start` to `target`.
///
/// # Returns
///
/// - `Err(UnknownModule)` when either end is not a module of the topology
/// - `Ok(None)` when `target` is unreachable from `start`
/// - `Ok(Some(route))` otherwise; `start == target` yields `[start]`
///   without searching
pub fn shortest_path(
    topology: &Topology,
    start: &ModuleId,
    target: &ModuleId,
    observer: &dyn Observer,
) -> Result<Option<Route>, ConveyorError> {
    let Some(start_slot) = topology.slot(start) else {
        return Err(ConveyorError::UnknownModule(start.clone()));
    };
    let Some(target_slot) = topology.slot(target) else {
        return Err(ConveyorError::UnknownModule(target.clone()));
    };

    let route = if start_slot == target_slot {
        Some(Route(vec![start.clone()]))
    } else {
        search(topology, start_slot, target_slot).map(Route)
    };

    match &route {
        Some(route) => observer.record(&ConveyorEvent::PathFound {
            start: start.clone(),
            target: target.clone(),
            hops: route.hops(),
        }),
        None => observer.record(&ConveyorEvent::NoPath {
            start: start.clone(),
            target: target.clone(),
        }),
    }

    Ok(route)
}

/// Dijkstra over module slots with unit edge weights.
fn search(topology: &Topology, start: usize, target: usize) -> Option<Vec<ModuleId>> {
    let n = topology.module_count();
    let mut dist: Vec<Option<usize>> = vec![None; n];
    let mut prev: Vec<Option<usize>> = vec![None; n];
    let mut done = vec![false; n];
    let mut frontier = BinaryHeap::new();

    *dist.get_mut(start)? = Some(0);
    frontier.push(Reverse((0_usize, start)));

    while let Some(Reverse((d, slot))) = frontier.pop() {
        if done[slot] {
            // Stale entry superseded by a shorter distance.
            continue;
        }
        done[slot] = true;
        if slot == target {
            break;
        }

        let module = topology.module_at(slot)?;
        for (_, neighbour) in topology.neighbours(module) {
            // Dangling edges lead outside the system.
            let Some(next) = topology.slot(neighbour) else {
                continue;
            };
            if done[next] {
                continue;
            }
            let candidate = d.saturating_add(1);
            if dist[next].is_none_or(|known| candidate < known) {
                dist[next] = Some(candidate);
                prev[next] = Some(slot);
                frontier.push(Reverse((candidate, next)));
            }
        }
    }

    if !done[target] {
        return None;
    }

    let mut path = Vec::new();
    let mut current = target;
    path.push(topology.module_at(current)?.clone());
    while current != start {
        current = prev[current]?;
        path.push(topology.module_at(current)?.clone());
    }
    path.reverse();
    Some(path)
}

// =============================================================================
// TESTS
// =============================================================================
