//! Wait-for graph and cycle detection.
//!
//! The graph is derived from a [`LedgerSnapshot`] on every observation and
//! dropped afterwards. An edge `waiter -> holder` exists when `waiter` is
//! blocked on a resource it is short of and `holder` holds at least one unit
//! of that resource.
//!
//! Adjacency is kept in ordered maps so traversal always starts from the
//! lowest pid and visits successors in ascending order. Detection on an
//! unchanged snapshot therefore always reports the same cycle.

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
};

use serde::Serialize;

use crate::{ledger::LedgerSnapshot, types::Pid};

/// `waiter` is blocked on units currently held by `holder`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct WaitForEdge {
    /// Blocked participant.
    pub waiter: Pid,
    /// Participant holding what the waiter needs.
    pub holder: Pid,
}

/// Directed wait-for graph over participants.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WaitForGraph {
    edges: BTreeMap<Pid, BTreeSet<Pid>>,
}

impl WaitForGraph {
    /// Build the graph from a consistent snapshot.
    pub fn build(snapshot: &LedgerSnapshot) -> Self {
        let mut graph = Self::default();

        for blocked in &snapshot.blocked {
            for resource in blocked.request.shortfall(&snapshot.available) {
                for (idx, held) in snapshot.allocation.iter().enumerate() {
                    let holder = Pid(idx);
                    if holder != blocked.pid && held.get(resource) > 0 {
                        graph.insert(WaitForEdge { waiter: blocked.pid, holder });
                    }
                }
            }
        }

        graph
    }

    /// Build a graph from explicit edges. Self-edges are dropped.
    pub fn from_edges(edges: impl IntoIterator<Item = WaitForEdge>) -> Self {
        let mut graph = Self::default();
        for edge in edges {
            graph.insert(edge);
        }
        graph
    }

    fn insert(&mut self, edge: WaitForEdge) {
        if edge.waiter != edge.holder {
            self.edges.entry(edge.waiter).or_default().insert(edge.holder);
        }
    }

    /// All edges, ordered by `(waiter, holder)`.
    pub fn edges(&self) -> impl Iterator<Item = WaitForEdge> + '_ {
        self.edges.iter().flat_map(|(&waiter, holders)| {
            holders.iter().map(move |&holder| WaitForEdge { waiter, holder })
        })
    }

    /// Whether `waiter` waits on `holder`.
    pub fn contains(&self, waiter: Pid, holder: Pid) -> bool {
        self.edges.get(&waiter).is_some_and(|holders| holders.contains(&holder))
    }

    /// Number of edges.
    pub fn len(&self) -> usize {
        self.edges.values().map(BTreeSet::len).sum()
    }

    /// True when nobody waits on anybody.
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Participants `waiter` waits on, ascending.
    pub fn holders(&self, waiter: Pid) -> impl Iterator<Item = Pid> + '_ {
        self.edges.get(&waiter).into_iter().flatten().copied()
    }

    /// Whether `pid` can reach itself, i.e. lies on some cycle.
    pub fn on_cycle(&self, pid: Pid) -> bool {
        let mut seen = BTreeSet::new();
        let mut stack: Vec<Pid> = self.holders(pid).collect();
        while let Some(node) = stack.pop() {
            if node == pid {
                return true;
            }
            if seen.insert(node) {
                stack.extend(self.holders(node));
            }
        }
        false
    }

    /// First cycle found by depth-first search from each node in ascending
    /// pid order.
    pub fn find_cycle(&self) -> Option<Cycle> {
        let mut search = Search { graph: self, colors: BTreeMap::new(), path: Vec::new() };
        self.edges.keys().find_map(|&start| search.visit(start))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    /// On the current DFS path.
    Visiting,
    /// Fully explored; no cycle through it.
    Done,
}

struct Search<'a> {
    graph: &'a WaitForGraph,
    colors: BTreeMap<Pid, Color>,
    path: Vec<Pid>,
}

impl Search<'_> {
    fn visit(&mut self, node: Pid) -> Option<Cycle> {
        match self.colors.get(&node) {
            Some(Color::Done) => return None,
            Some(Color::Visiting) => {
                let start = self.path.iter().position(|&pid| pid == node)?;
                return Some(Cycle { members: self.path[start..].to_vec() });
            },
            None => {},
        }

        self.colors.insert(node, Color::Visiting);
        self.path.push(node);

        let graph = self.graph;
        for next in graph.holders(node) {
            if let Some(cycle) = self.visit(next) {
                return Some(cycle);
            }
        }

        self.path.pop();
        self.colors.insert(node, Color::Done);
        None
    }
}

/// Closed wait-for path. `members` lists each participant once in traversal
/// order; the last member waits on the first.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Cycle {
    members: Vec<Pid>,
}

impl Cycle {
    /// Participants on the cycle, in traversal order.
    pub fn members(&self) -> &[Pid] {
        &self.members
    }

    /// Closed path `[p0, p1, ..., p0]`.
    pub fn path(&self) -> Vec<Pid> {
        let mut path = self.members.clone();
        path.extend(self.members.first().copied());
        path
    }

    /// Whether `pid` is on the cycle.
    pub fn contains(&self, pid: Pid) -> bool {
        self.members.contains(&pid)
    }

    /// Highest pid on the cycle.
    pub fn highest_pid(&self) -> Option<Pid> {
        self.members.iter().max().copied()
    }

    /// Number of participants on the cycle.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Always false for cycles produced by detection.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

impl fmt::Display for Cycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, pid) in self.path().iter().enumerate() {
            if i > 0 {
                write!(f, " -> ")?;
            }
            write!(f, "{pid}")?;
        }
        Ok(())
    }
}

/// Build the wait-for graph of `snapshot`.
pub fn build_wait_for_graph(snapshot: &LedgerSnapshot) -> WaitForGraph {
    WaitForGraph::build(snapshot)
}

/// First cycle in `graph`, if any.
pub fn find_cycle(graph: &WaitForGraph) -> Option<Cycle> {
    graph.find_cycle()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edge(waiter: usize, holder: usize) -> WaitForEdge {
        WaitForEdge { waiter: Pid(waiter), holder: Pid(holder) }
    }

    #[test]
    fn empty_graph_has_no_cycle() {
        assert_eq!(WaitForGraph::default().find_cycle(), None);
    }

    #[test]
    fn chain_has_no_cycle() {
        let graph = WaitForGraph::from_edges([edge(0, 1), edge(1, 2)]);
        assert_eq!(graph.find_cycle(), None);
    }

    #[test]
    fn ring_is_reported_from_lowest_pid() {
        let graph = WaitForGraph::from_edges([edge(1, 2), edge(2, 0), edge(0, 1)]);
        let cycle = graph.find_cycle().unwrap();
        assert_eq!(cycle.members(), &[Pid(0), Pid(1), Pid(2)]);
        assert_eq!(cycle.to_string(), "P0 -> P1 -> P2 -> P0");
    }

    #[test]
    fn cycle_behind_a_tail_excludes_the_tail() {
        let graph = WaitForGraph::from_edges([edge(0, 1), edge(1, 2), edge(2, 1)]);
        let cycle = graph.find_cycle().unwrap();
        assert_eq!(cycle.members(), &[Pid(1), Pid(2)]);
    }

    #[test]
    fn tail_is_not_on_the_cycle_it_waits_behind() {
        let graph = WaitForGraph::from_edges([edge(0, 1), edge(1, 2), edge(2, 1)]);
        assert!(graph.on_cycle(Pid(1)));
        assert!(graph.on_cycle(Pid(2)));
        assert!(!graph.on_cycle(Pid(0)));
        assert!(!graph.on_cycle(Pid(7)));
    }

    #[test]
    fn self_edges_are_dropped() {
        let graph = WaitForGraph::from_edges([edge(3, 3)]);
        assert!(graph.is_empty());
    }

    #[test]
    fn path_closes_the_loop() {
        let cycle = Cycle { members: vec![Pid(4), Pid(2)] };
        assert_eq!(cycle.path(), vec![Pid(4), Pid(2), Pid(4)]);
        assert_eq!(cycle.highest_pid(), Some(Pid(4)));
    }
}
