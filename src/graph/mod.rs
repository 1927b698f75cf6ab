//! Network model: arena of nodes and edges with separate geometry
//!
//! Key properties:
//! - Nodes and edges live in index-stable slots; removal leaves a tombstone
//! - Every structural mutation bumps `generation` and drops the cached CSR
//!   adjacency, which is rebuilt lazily on the next lookup
//! - Edge geometry endpoints always coincide with the end-node coordinates
//!   within the configured tolerance

use geo::{Coord, LineString};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

use crate::config::GraphConfig;
use crate::error::{NetworkError, Result};
use crate::geom;

pub mod adjacency;
pub mod dual;

pub use adjacency::{Adjacency, Incidence};

pub type NodeIdx = usize;
pub type EdgeIdx = usize;

/// Node as supplied by a graph-building collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub id: String,
    pub x: f64,
    pub y: f64,
    #[serde(default = "default_live")]
    pub live: bool,
    /// Marks a real intersection that filler removal must keep
    #[serde(default)]
    pub preserve: bool,
}

fn default_live() -> bool {
    true
}

/// Edge as supplied by a graph-building collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeRecord {
    pub id: String,
    pub start: String,
    pub end: String,
    /// Polyline as `[x, y]` pairs; a straight segment is used when absent
    #[serde(default)]
    pub geometry: Option<Vec<[f64; 2]>>,
    #[serde(default)]
    pub imp_factor: Option<f64>,
}

impl NodeRecord {
    pub fn new(id: impl Into<String>, x: f64, y: f64) -> Self {
        Self {
            id: id.into(),
            x,
            y,
            live: true,
            preserve: false,
        }
    }
}

impl EdgeRecord {
    pub fn new(id: impl Into<String>, start: impl Into<String>, end: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            start: start.into(),
            end: end.into(),
            geometry: None,
            imp_factor: None,
        }
    }

    pub fn with_geometry(mut self, coords: Vec<[f64; 2]>) -> Self {
        self.geometry = Some(coords);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: String,
    pub coord: Coord<f64>,
    /// Participates as a source in windowed analysis
    pub live: bool,
    /// Contribution weight when reached by another node
    pub weight: f64,
    pub preserve: bool,
}

impl Node {
    pub fn new(id: impl Into<String>, coord: Coord<f64>, live: bool) -> Self {
        Self {
            id: id.into(),
            coord,
            live,
            weight: 1.0,
            preserve: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Edge {
    pub id: String,
    pub start: NodeIdx,
    pub end: NodeIdx,
    /// Index among edges joining the same node pair
    pub parallel: usize,
    /// Oriented from `start` to `end`
    pub geom: LineString<f64>,
    pub length: f64,
    /// Cumulative absolute turn along the geometry, degrees
    pub angle_sum: f64,
    /// Heading leaving `start`
    pub in_bearing: f64,
    /// Heading arriving at `end`
    pub out_bearing: f64,
    pub imp_factor: f64,
}

impl Edge {
    /// Derive length, angle sum and bearings from the geometry
    pub fn from_geometry(
        id: impl Into<String>,
        start: NodeIdx,
        end: NodeIdx,
        geom: LineString<f64>,
        imp_factor: f64,
    ) -> Self {
        let length = geom::line_length(&geom);
        let angle_sum = geom::angle_sum(&geom);
        let (in_bearing, out_bearing) = geom::end_bearings(&geom);
        Self {
            id: id.into(),
            start,
            end,
            parallel: 0,
            geom,
            length,
            angle_sum,
            in_bearing,
            out_bearing,
            imp_factor,
        }
    }

    pub fn is_loop(&self) -> bool {
        self.start == self.end
    }

    /// Endpoint opposite `node`
    pub fn other(&self, node: NodeIdx) -> NodeIdx {
        if self.start == node {
            self.end
        } else {
            self.start
        }
    }

    /// Geometry oriented to begin at `node`
    pub fn geom_from(&self, node: NodeIdx) -> LineString<f64> {
        if self.start == node {
            self.geom.clone()
        } else {
            geom::reversed(&self.geom)
        }
    }

    /// (departure, arrival) headings when traversed away from `node`
    pub fn bearings_from(&self, node: NodeIdx) -> (f64, f64) {
        if self.start == node {
            (self.in_bearing, self.out_bearing)
        } else {
            (
                geom::flip_bearing(self.out_bearing),
                geom::flip_bearing(self.in_bearing),
            )
        }
    }

    /// Impedance-weighted traversal cost
    pub fn cost(&self) -> f64 {
        self.length * self.imp_factor
    }
}

/// Arena-backed undirected multigraph
#[derive(Debug, Clone)]
pub struct NetworkStructure {
    nodes: Vec<Option<Node>>,
    edges: Vec<Option<Edge>>,
    /// Incident edge slots per node; a self-loop appears twice
    incident: Vec<Vec<EdgeIdx>>,
    node_lookup: FxHashMap<String, NodeIdx>,
    edge_lookup: FxHashMap<String, EdgeIdx>,
    generation: u64,
    tolerance: f64,
    adjacency: OnceLock<Adjacency>,
}

impl Default for NetworkStructure {
    fn default() -> Self {
        Self::new(&GraphConfig::default())
    }
}

impl NetworkStructure {
    pub fn new(config: &GraphConfig) -> Self {
        Self {
            nodes: Vec::new(),
            edges: Vec::new(),
            incident: Vec::new(),
            node_lookup: FxHashMap::default(),
            edge_lookup: FxHashMap::default(),
            generation: 0,
            tolerance: config.endpoint_tolerance,
            adjacency: OnceLock::new(),
        }
    }

    /// Build a network from input records
    ///
    /// Missing geometry becomes a straight segment. Supplied geometry must
    /// touch both end nodes within tolerance; a geometry drawn end-to-start
    /// is reversed. With `snap_endpoints`, endpoints within tolerance are
    /// replaced by the exact node coordinates.
    pub fn from_records(
        nodes: &[NodeRecord],
        edges: &[EdgeRecord],
        config: &GraphConfig,
    ) -> Result<Self> {
        config.validate()?;
        let mut network = Self::new(config);

        for record in nodes {
            if !record.x.is_finite() || !record.y.is_finite() {
                return Err(NetworkError::structural(&record.id, "non-finite coordinate"));
            }
            let mut node = Node::new(&record.id, Coord { x: record.x, y: record.y }, record.live);
            node.preserve = record.preserve;
            network.add_node(node)?;
        }

        for record in edges {
            let start = network.require_node(&record.start, &record.id)?;
            let end = network.require_node(&record.end, &record.id)?;
            let a = network.nodes[start].as_ref().map(|n| n.coord);
            let b = network.nodes[end].as_ref().map(|n| n.coord);
            let (Some(a), Some(b)) = (a, b) else {
                return Err(NetworkError::structural(&record.id, "dangling node reference"));
            };

            let geom = match &record.geometry {
                None => geom::straight(a, b),
                Some(coords) => {
                    let ls = geom::dedup(coords.iter().map(|c| Coord { x: c[0], y: c[1] }).collect());
                    orient_geometry(&record.id, ls, a, b, config)?
                }
            };

            let imp = record.imp_factor.unwrap_or(1.0);
            network.add_edge_with_id(&record.id, start, end, geom, imp)?;
        }

        tracing::debug!(
            nodes = network.node_count(),
            edges = network.edge_count(),
            "network built from records"
        );
        Ok(network)
    }

    fn require_node(&self, id: &str, edge_id: &str) -> Result<NodeIdx> {
        self.node_lookup.get(id).copied().ok_or_else(|| {
            NetworkError::structural(edge_id, format!("references unknown node '{id}'"))
        })
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    fn touch(&mut self) {
        self.generation += 1;
        self.adjacency = OnceLock::new();
    }

    pub fn add_node(&mut self, node: Node) -> Result<NodeIdx> {
        if self.node_lookup.contains_key(&node.id) {
            return Err(NetworkError::structural(&node.id, "duplicate node identifier"));
        }
        let idx = self.nodes.len();
        self.node_lookup.insert(node.id.clone(), idx);
        self.nodes.push(Some(node));
        self.incident.push(Vec::new());
        self.touch();
        Ok(idx)
    }

    /// Add an edge with an identifier derived from its end nodes
    pub fn add_edge(
        &mut self,
        start: NodeIdx,
        end: NodeIdx,
        geom: LineString<f64>,
        imp_factor: f64,
    ) -> Result<EdgeIdx> {
        let base = format!("{}~{}", self.node_id(start)?, self.node_id(end)?);
        let mut id = base.clone();
        let mut suffix = 1;
        while self.edge_lookup.contains_key(&id) {
            id = format!("{base}~{suffix}");
            suffix += 1;
        }
        self.add_edge_with_id(&id, start, end, geom, imp_factor)
    }

    pub fn add_edge_with_id(
        &mut self,
        id: &str,
        start: NodeIdx,
        end: NodeIdx,
        geom: LineString<f64>,
        imp_factor: f64,
    ) -> Result<EdgeIdx> {
        if self.edge_lookup.contains_key(id) {
            return Err(NetworkError::structural(id, "duplicate edge identifier"));
        }
        let a = self.node(start).map(|n| n.coord);
        let b = self.node(end).map(|n| n.coord);
        let (Some(a), Some(b)) = (a, b) else {
            return Err(NetworkError::structural(id, "edge references a removed node"));
        };
        if geom.0.len() < 2 {
            return Err(NetworkError::structural(id, "geometry needs at least two vertices"));
        }
        check_endpoints(id, &geom, a, b, self.tolerance)?;

        let mut edge = Edge::from_geometry(id, start, end, geom, imp_factor);
        if !edge.length.is_finite() || edge.length < 0.0 {
            return Err(NetworkError::structural(id, format!("invalid length {}", edge.length)));
        }
        if !imp_factor.is_finite() || imp_factor < 0.0 {
            return Err(NetworkError::structural(id, format!("invalid impedance factor {imp_factor}")));
        }
        edge.parallel = self.edges_between(start, end).len();

        let idx = self.edges.len();
        self.edge_lookup.insert(edge.id.clone(), idx);
        self.edges.push(Some(edge));
        self.incident[start].push(idx);
        self.incident[end].push(idx);
        self.touch();
        Ok(idx)
    }

    /// Insert a prepared edge, keeping its attributes as given
    ///
    /// Used where attributes are attributed explicitly rather than derived
    /// from the geometry (decomposition pieces).
    pub(crate) fn insert_edge(&mut self, mut edge: Edge) -> Result<EdgeIdx> {
        let a = self.node(edge.start).map(|n| n.coord);
        let b = self.node(edge.end).map(|n| n.coord);
        let (Some(a), Some(b)) = (a, b) else {
            return Err(NetworkError::structural(&edge.id, "edge references a removed node"));
        };
        check_endpoints(&edge.id, &edge.geom, a, b, self.tolerance)?;
        if self.edge_lookup.contains_key(&edge.id) {
            return Err(NetworkError::structural(&edge.id, "duplicate edge identifier"));
        }
        edge.parallel = self.edges_between(edge.start, edge.end).len();
        let idx = self.edges.len();
        self.edge_lookup.insert(edge.id.clone(), idx);
        self.incident[edge.start].push(idx);
        self.incident[edge.end].push(idx);
        self.edges.push(Some(edge));
        self.touch();
        Ok(idx)
    }

    pub fn remove_edge(&mut self, idx: EdgeIdx) -> Option<Edge> {
        let edge = self.edges.get_mut(idx)?.take()?;
        self.edge_lookup.remove(&edge.id);
        for end in [edge.start, edge.end] {
            if let Some(pos) = self.incident[end].iter().position(|&e| e == idx) {
                self.incident[end].swap_remove(pos);
            }
        }
        self.touch();
        Some(edge)
    }

    /// Remove a node together with its incident edges
    pub fn remove_node(&mut self, idx: NodeIdx) -> Option<Node> {
        self.nodes.get(idx)?.as_ref()?;
        let mut incident = self.incident[idx].clone();
        incident.sort_unstable();
        incident.dedup();
        for e in incident {
            self.remove_edge(e);
        }
        let node = self.nodes[idx].take()?;
        self.node_lookup.remove(&node.id);
        self.touch();
        Some(node)
    }

    pub fn node(&self, idx: NodeIdx) -> Option<&Node> {
        self.nodes.get(idx).and_then(|n| n.as_ref())
    }

    pub fn edge(&self, idx: EdgeIdx) -> Option<&Edge> {
        self.edges.get(idx).and_then(|e| e.as_ref())
    }

    fn node_id(&self, idx: NodeIdx) -> Result<String> {
        self.node(idx)
            .map(|n| n.id.clone())
            .ok_or_else(|| NetworkError::structural(format!("#{idx}"), "node slot is empty"))
    }

    pub fn node_index(&self, id: &str) -> Option<NodeIdx> {
        self.node_lookup.get(id).copied()
    }

    pub fn edge_index(&self, id: &str) -> Option<EdgeIdx> {
        self.edge_lookup.get(id).copied()
    }

    /// Live node slots in ascending index order
    pub fn node_indices(&self) -> impl Iterator<Item = NodeIdx> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter_map(|(i, n)| n.as_ref().map(|_| i))
    }

    pub fn edge_indices(&self) -> impl Iterator<Item = EdgeIdx> + '_ {
        self.edges
            .iter()
            .enumerate()
            .filter_map(|(i, e)| e.as_ref().map(|_| i))
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeIdx, &Node)> {
        self.nodes
            .iter()
            .enumerate()
            .filter_map(|(i, n)| n.as_ref().map(|n| (i, n)))
    }

    pub fn edges(&self) -> impl Iterator<Item = (EdgeIdx, &Edge)> {
        self.edges
            .iter()
            .enumerate()
            .filter_map(|(i, e)| e.as_ref().map(|e| (i, e)))
    }

    /// Node indices ordered by identifier
    pub fn nodes_by_id(&self) -> Vec<NodeIdx> {
        let mut order: Vec<NodeIdx> = self.node_indices().collect();
        order.sort_by(|&a, &b| self.nodes[a].as_ref().map(|n| &n.id).cmp(&self.nodes[b].as_ref().map(|n| &n.id)));
        order
    }

    pub fn node_count(&self) -> usize {
        self.node_lookup.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edge_lookup.len()
    }

    /// Slot count including tombstones
    pub fn node_capacity(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_capacity(&self) -> usize {
        self.edges.len()
    }

    pub fn degree(&self, idx: NodeIdx) -> usize {
        self.incident.get(idx).map_or(0, |v| v.len())
    }

    pub fn incident_edges(&self, idx: NodeIdx) -> &[EdgeIdx] {
        self.incident.get(idx).map_or(&[], |v| v.as_slice())
    }

    /// Distinct neighbouring nodes, excluding `idx` itself
    pub fn neighbors(&self, idx: NodeIdx) -> Vec<NodeIdx> {
        let mut out: Vec<NodeIdx> = self
            .incident_edges(idx)
            .iter()
            .filter_map(|&e| self.edge(e))
            .filter(|e| !e.is_loop())
            .map(|e| e.other(idx))
            .collect();
        out.sort_unstable();
        out.dedup();
        out
    }

    /// Edges joining `a` and `b` in either orientation
    pub fn edges_between(&self, a: NodeIdx, b: NodeIdx) -> Vec<EdgeIdx> {
        let mut out: Vec<EdgeIdx> = self
            .incident_edges(a)
            .iter()
            .copied()
            .filter(|&e| {
                self.edge(e)
                    .is_some_and(|edge| (edge.start == a && edge.end == b) || (edge.start == b && edge.end == a))
            })
            .collect();
        out.sort_unstable();
        out.dedup();
        out
    }

    pub fn set_weight(&mut self, idx: NodeIdx, weight: f64) {
        if let Some(Some(node)) = self.nodes.get_mut(idx) {
            node.weight = weight;
        }
    }

    pub fn set_live(&mut self, idx: NodeIdx, live: bool) {
        if let Some(Some(node)) = self.nodes.get_mut(idx) {
            node.live = live;
        }
    }

    /// CSR adjacency over the current topology, built on first use
    pub fn adjacency(&self) -> &Adjacency {
        self.adjacency.get_or_init(|| Adjacency::build(self))
    }

    pub fn total_length(&self) -> f64 {
        self.edges().map(|(_, e)| e.length).sum()
    }

    /// Set every node's weight to half the length of its incident edges
    pub fn length_weighted_nodes(&mut self) {
        let weights: Vec<(NodeIdx, f64)> = self
            .node_indices()
            .map(|n| {
                let w = self
                    .incident_edges(n)
                    .iter()
                    .filter_map(|&e| self.edge(e))
                    .map(|e| e.length / 2.0)
                    .sum();
                (n, w)
            })
            .collect();
        for (n, w) in weights {
            self.set_weight(n, w);
        }
    }

    /// Copy of the network without tombstoned slots
    ///
    /// Nodes keep their relative order; edges keep their identifiers.
    pub fn compacted(&self) -> Result<Self> {
        let mut out = Self {
            tolerance: self.tolerance,
            ..Self::new(&GraphConfig::default())
        };
        let mut remap = vec![usize::MAX; self.nodes.len()];
        for (idx, node) in self.nodes() {
            remap[idx] = out.add_node(node.clone())?;
        }
        for (_, edge) in self.edges() {
            let mut moved = edge.clone();
            moved.start = remap[edge.start];
            moved.end = remap[edge.end];
            out.insert_edge(moved)?;
        }
        Ok(out)
    }

    /// Invariant violations, empty when the network is consistent
    pub fn verify(&self) -> Vec<String> {
        let mut errors = Vec::new();
        for (idx, edge) in self.edges() {
            let (Some(a), Some(b)) = (self.node(edge.start), self.node(edge.end)) else {
                errors.push(format!("edge '{}' references a removed node", edge.id));
                continue;
            };
            if let Err(e) = check_endpoints(&edge.id, &edge.geom, a.coord, b.coord, self.tolerance) {
                errors.push(e.to_string());
            }
            if !edge.length.is_finite() || edge.length < 0.0 {
                errors.push(format!("edge '{}' has invalid length {}", edge.id, edge.length));
            }
            for end in [edge.start, edge.end] {
                if !self.incident[end].contains(&idx) {
                    errors.push(format!("edge '{}' missing from incidence of '{}'", edge.id, self.nodes[end].as_ref().map_or("?", |n| n.id.as_str())));
                }
            }
        }
        errors
    }

    pub fn validate(&self) -> Result<()> {
        match self.verify().into_iter().next() {
            Some(first) => Err(NetworkError::structural("network", first)),
            None => Ok(()),
        }
    }
}

fn check_endpoints(
    id: &str,
    geom: &LineString<f64>,
    a: Coord<f64>,
    b: Coord<f64>,
    tolerance: f64,
) -> Result<()> {
    let (Some(&first), Some(&last)) = (geom.0.first(), geom.0.last()) else {
        return Err(NetworkError::structural(id, "empty geometry"));
    };
    let gap_start = geom::distance(first, a);
    let gap_end = geom::distance(last, b);
    if gap_start > tolerance || gap_end > tolerance {
        return Err(NetworkError::structural(
            id,
            format!(
                "geometry endpoints are {gap_start:.6} and {gap_end:.6} from their nodes (tolerance {tolerance})"
            ),
        ));
    }
    Ok(())
}

/// Match a supplied geometry to the start -> end direction
fn orient_geometry(
    id: &str,
    ls: LineString<f64>,
    a: Coord<f64>,
    b: Coord<f64>,
    config: &GraphConfig,
) -> Result<LineString<f64>> {
    let tol = config.endpoint_tolerance;
    let (Some(&first), Some(&last)) = (ls.0.first(), ls.0.last()) else {
        return Err(NetworkError::structural(id, "empty geometry"));
    };
    let forward = geom::coords_close(first, a, tol) && geom::coords_close(last, b, tol);
    let backward = geom::coords_close(first, b, tol) && geom::coords_close(last, a, tol);
    let mut oriented = if forward {
        ls
    } else if backward {
        geom::reversed(&ls)
    } else {
        return Err(NetworkError::structural(
            id,
            "geometry endpoints do not coincide with its nodes",
        ));
    };
    if config.snap_endpoints {
        let n = oriented.0.len();
        oriented.0[0] = a;
        oriented.0[n - 1] = b;
    }
    Ok(oriented)
}
