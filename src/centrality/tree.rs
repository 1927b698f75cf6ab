//! Distance-bounded single-source path trees
//!
//! `ShortestTree` is a Dijkstra expansion over impedance-weighted length that
//! keeps every equal-cost predecessor and the count of shortest paths.
//!
//! `SimplestTree` minimises cumulative angular change. Relaxation is keyed on
//! directed edge states (the edge a path arrives by, and its direction) rather
//! than on nodes, so a path is never extended from a node-level optimum whose
//! arrival heading would make the onward turn more expensive. A node takes the
//! first state settled at it.

use rustc_hash::FxHashMap;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::geom;
use crate::graph::{EdgeIdx, NetworkStructure, NodeIdx};

/// Relative tolerance under which two path costs are equal
const TIE_EPS: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pred {
    pub node: NodeIdx,
    pub edge: EdgeIdx,
}

/// Min-heap entry ordered by cost, then secondary cost, then index
#[derive(Debug, Clone, Copy)]
struct Candidate {
    cost: f64,
    secondary: f64,
    idx: usize,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .cost
            .total_cmp(&self.cost)
            .then_with(|| other.secondary.total_cmp(&self.secondary))
            .then_with(|| other.idx.cmp(&self.idx))
    }
}

fn ties(a: f64, b: f64) -> bool {
    (a - b).abs() <= TIE_EPS * a.abs().max(b.abs()).max(1.0)
}

#[derive(Debug, Clone)]
pub struct ShortestTree {
    pub source: NodeIdx,
    /// Impedance-weighted distance, infinite when unreached
    pub dist: Vec<f64>,
    /// Number of equal shortest paths
    pub sigma: Vec<f64>,
    pub preds: Vec<Vec<Pred>>,
    /// Reached nodes in non-decreasing distance, source first
    pub order: Vec<NodeIdx>,
}

impl ShortestTree {
    pub fn build(network: &NetworkStructure, source: NodeIdx, max_dist: f64) -> Self {
        let n = network.node_capacity();
        let adjacency = network.adjacency();
        let mut dist = vec![f64::INFINITY; n];
        let mut sigma = vec![0.0; n];
        let mut preds: Vec<Vec<Pred>> = vec![Vec::new(); n];
        let mut settled = vec![false; n];
        let mut order = Vec::new();
        let mut heap = BinaryHeap::new();

        if source >= n || network.node(source).is_none() {
            return Self { source, dist, sigma, preds, order };
        }
        dist[source] = 0.0;
        sigma[source] = 1.0;
        heap.push(Candidate { cost: 0.0, secondary: 0.0, idx: source });

        while let Some(Candidate { cost, idx: u, .. }) = heap.pop() {
            if settled[u] || cost > dist[u] {
                continue;
            }
            settled[u] = true;
            order.push(u);

            for inc in adjacency.incident(u) {
                let v = inc.neighbor;
                if settled[v] {
                    continue;
                }
                let Some(edge) = network.edge(inc.edge) else { continue };
                let nd = dist[u] + edge.cost();
                if nd > max_dist {
                    continue;
                }
                let pred = Pred { node: u, edge: inc.edge };
                if dist[v].is_finite() && ties(nd, dist[v]) {
                    sigma[v] += sigma[u];
                    preds[v].push(pred);
                } else if nd < dist[v] {
                    dist[v] = nd;
                    sigma[v] = sigma[u];
                    preds[v].clear();
                    preds[v].push(pred);
                    heap.push(Candidate { cost: nd, secondary: 0.0, idx: v });
                }
            }
        }

        Self { source, dist, sigma, preds, order }
    }

    pub fn reached(&self, node: NodeIdx) -> bool {
        self.dist.get(node).is_some_and(|d| d.is_finite())
    }
}

/// Per-state search record
#[derive(Debug, Clone, Copy)]
struct StateEntry {
    angular: f64,
    length: f64,
    pred: Option<usize>,
    settled: bool,
}

#[derive(Debug, Clone)]
pub struct SimplestTree {
    pub source: NodeIdx,
    /// Cumulative angular change in degrees, infinite when unreached
    pub angular: Vec<f64>,
    /// Network length of the simplest path
    pub dist: Vec<f64>,
    /// Reached nodes in settling order, source first
    pub order: Vec<NodeIdx>,
    arrival: Vec<Option<usize>>,
    states: FxHashMap<usize, StateEntry>,
}

/// Directed traversal of `edge`; even states run start -> end
fn state_of(edge: EdgeIdx, forward: bool) -> usize {
    2 * edge + usize::from(!forward)
}

fn edge_of(state: usize) -> EdgeIdx {
    state / 2
}

impl SimplestTree {
    pub fn build(network: &NetworkStructure, source: NodeIdx, max_dist: f64) -> Self {
        let n = network.node_capacity();
        let adjacency = network.adjacency();
        let mut tree = Self {
            source,
            angular: vec![f64::INFINITY; n],
            dist: vec![f64::INFINITY; n],
            order: Vec::new(),
            arrival: vec![None; n],
            states: FxHashMap::default(),
        };
        if source >= n || network.node(source).is_none() {
            return tree;
        }
        tree.angular[source] = 0.0;
        tree.dist[source] = 0.0;
        tree.order.push(source);
        let mut node_done = vec![false; n];
        node_done[source] = true;
        let mut heap = BinaryHeap::new();

        // the first edge out of the source carries no entry turn
        for inc in adjacency.incident(source) {
            let Some(edge) = network.edge(inc.edge) else { continue };
            if edge.length > max_dist || inc.neighbor == source {
                continue;
            }
            let state = state_of(inc.edge, inc.forward);
            tree.relax(&mut heap, state, edge.angle_sum, edge.length, None);
        }

        while let Some(Candidate { cost, idx: state, .. }) = heap.pop() {
            let Some(entry) = tree.states.get_mut(&state) else { continue };
            if entry.settled || cost > entry.angular {
                continue;
            }
            entry.settled = true;
            let StateEntry { angular, length, .. } = *entry;

            let Some(edge) = network.edge(edge_of(state)) else { continue };
            let forward = state % 2 == 0;
            let (tail, head) = if forward { (edge.start, edge.end) } else { (edge.end, edge.start) };
            if !node_done[head] {
                node_done[head] = true;
                tree.arrival[head] = Some(state);
                tree.angular[head] = angular;
                tree.dist[head] = length;
                tree.order.push(head);
            }

            let (_, arrive) = edge.bearings_from(tail);
            for inc in adjacency.incident(head) {
                if inc.edge == edge_of(state) || inc.neighbor == source {
                    continue;
                }
                let Some(next) = network.edge(inc.edge) else { continue };
                let next_length = length + next.length;
                if next_length > max_dist {
                    continue;
                }
                let (depart, _) = next.bearings_from(head);
                let next_angular = angular + geom::turn_angle(arrive, depart) + next.angle_sum;
                let next_state = state_of(inc.edge, inc.forward);
                tree.relax(&mut heap, next_state, next_angular, next_length, Some(state));
            }
        }
        tree
    }

    fn relax(
        &mut self,
        heap: &mut BinaryHeap<Candidate>,
        state: usize,
        angular: f64,
        length: f64,
        pred: Option<usize>,
    ) {
        let entry = self.states.entry(state).or_insert(StateEntry {
            angular: f64::INFINITY,
            length: f64::INFINITY,
            pred: None,
            settled: false,
        });
        if entry.settled {
            return;
        }
        let better = angular < entry.angular
            || (ties(angular, entry.angular) && length < entry.length);
        if better {
            *entry = StateEntry { angular, length, pred, settled: false };
            heap.push(Candidate { cost: angular, secondary: length, idx: state });
        }
    }

    pub fn reached(&self, node: NodeIdx) -> bool {
        self.angular.get(node).is_some_and(|a| a.is_finite())
    }

    /// Intermediate nodes on the simplest path to `target`, nearest first
    pub fn path_nodes(&self, network: &NetworkStructure, target: NodeIdx) -> Vec<NodeIdx> {
        let mut nodes = Vec::new();
        let mut state = self.arrival.get(target).copied().flatten();
        while let Some(s) = state {
            let Some(edge) = network.edge(edge_of(s)) else { break };
            let tail = if s % 2 == 0 { edge.start } else { edge.end };
            if tail == self.source {
                break;
            }
            nodes.push(tail);
            state = self.states.get(&s).and_then(|e| e.pred);
        }
        nodes.reverse();
        nodes
    }
}
