//! Node consolidation: merge clusters of nearby nodes into one centroid node

use geo::Coord;
use rayon::prelude::*;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::config::CleanConfig;
use crate::error::Result;
use crate::geom;
use crate::graph::{Node, NetworkStructure, NodeIdx};
use crate::spatial::NodeIndex;

/// Nodes slated to become a single centroid node
#[derive(Debug, Clone, PartialEq)]
struct Group {
    members: Vec<NodeIdx>,
}

/// Merge groups of nodes lying within `buffer_dist` of each other
///
/// Seeds are visited by descending degree, then ascending identifier. A group
/// grows from its seed's neighbours within the buffer; with `crawl` it keeps
/// absorbing the neighbours of every new member. Only nodes of at least
/// `min_node_degree` join, and groups smaller than `min_node_group` are
/// dropped. Neighbour searches run against the unmodified network.
pub fn consolidate_nodes(network: &NetworkStructure, config: &CleanConfig) -> Result<NetworkStructure> {
    config.validate()?;
    let groups = find_groups(network, config);
    let merged = groups.len();
    let absorbed: usize = groups.iter().map(|g| g.members.len()).sum();
    let net = merge_groups(network, &groups, config.cent_min_degree)?;
    tracing::debug!(
        groups = merged,
        absorbed,
        nodes = net.node_count(),
        "nodes consolidated"
    );
    Ok(net)
}

fn find_groups(network: &NetworkStructure, config: &CleanConfig) -> Vec<Group> {
    let index = NodeIndex::build(network);
    let eligible = |n: NodeIdx| network.degree(n) >= config.min_node_degree;

    let candidates: Vec<NodeIdx> = network.node_indices().filter(|&n| eligible(n)).collect();
    let within: FxHashMap<NodeIdx, Vec<NodeIdx>> = candidates
        .par_iter()
        .filter_map(|&n| {
            let coord = network.node(n)?.coord;
            let near: Vec<NodeIdx> = index
                .within(coord, config.buffer_dist)
                .into_iter()
                .filter(|&m| m != n && eligible(m))
                .collect();
            Some((n, near))
        })
        .collect();

    let mut seeds = candidates;
    seeds.sort_by(|&a, &b| {
        network
            .degree(b)
            .cmp(&network.degree(a))
            .then_with(|| node_id(network, a).cmp(node_id(network, b)))
    });

    let mut consumed: FxHashSet<NodeIdx> = FxHashSet::default();
    let mut groups = Vec::new();
    for seed in seeds {
        if consumed.contains(&seed) {
            continue;
        }
        let mut members = vec![seed];
        let mut in_group: FxHashSet<NodeIdx> = FxHashSet::from_iter([seed]);
        let mut cursor = 0;
        while cursor < members.len() {
            let from = members[cursor];
            cursor += 1;
            if from != seed && !config.crawl {
                break;
            }
            for &m in within.get(&from).map(Vec::as_slice).unwrap_or_default() {
                if !consumed.contains(&m) && in_group.insert(m) {
                    members.push(m);
                }
            }
        }
        if members.len() < config.min_node_group.max(2) {
            continue;
        }
        consumed.extend(members.iter().copied());
        groups.push(Group { members });
    }
    groups
}

fn node_id(network: &NetworkStructure, n: NodeIdx) -> &str {
    network.node(n).map_or("", |node| node.id.as_str())
}

fn merge_groups(
    network: &NetworkStructure,
    groups: &[Group],
    cent_min_degree: usize,
) -> Result<NetworkStructure> {
    let mut net = network.clone();
    let mut target: FxHashMap<NodeIdx, NodeIdx> = FxHashMap::default();

    for group in groups {
        let members: Vec<&Node> = group.members.iter().filter_map(|&n| network.node(n)).collect();
        let anchors: Vec<Coord<f64>> = group
            .members
            .iter()
            .filter(|&&n| network.degree(n) >= cent_min_degree)
            .filter_map(|&n| network.node(n).map(|node| node.coord))
            .collect();
        let all: Vec<Coord<f64>> = members.iter().map(|node| node.coord).collect();
        let Some(centroid) = geom::centroid(&anchors).or_else(|| geom::centroid(&all)) else {
            continue;
        };

        let mut ids: Vec<&str> = members.iter().map(|node| node.id.as_str()).collect();
        ids.sort_unstable();
        let mut merged = Node::new(ids.join("±"), centroid, members.iter().any(|node| node.live));
        merged.preserve = members.iter().any(|node| node.preserve);
        let idx = net.add_node(merged)?;
        for &m in &group.members {
            target.insert(m, idx);
        }
    }

    // re-home every edge touching a group, in edge order
    let touched: Vec<usize> = network
        .edges()
        .filter(|(_, e)| target.contains_key(&e.start) || target.contains_key(&e.end))
        .map(|(i, _)| i)
        .collect();
    let mut rehomed = Vec::with_capacity(touched.len());
    for &e in &touched {
        let Some(edge) = net.remove_edge(e) else { continue };
        rehomed.push(edge);
    }

    let mut seen: Vec<(NodeIdx, NodeIdx, Vec<Coord<f64>>)> = Vec::new();
    let mut dropped = 0usize;
    for edge in rehomed {
        let start = target.get(&edge.start).copied().unwrap_or(edge.start);
        let end = target.get(&edge.end).copied().unwrap_or(edge.end);
        if start == end {
            dropped += 1;
            continue;
        }
        let mut coords = edge.geom.0.clone();
        if let (Some(node), Some(first)) = (net.node(start), coords.first_mut()) {
            *first = node.coord;
        }
        if let (Some(node), Some(last)) = (net.node(end), coords.last_mut()) {
            *last = node.coord;
        }
        let geom = geom::dedup(coords);

        let duplicate = seen.iter().any(|(s, t, c)| {
            (*s == start && *t == end && *c == geom.0)
                || (*s == end && *t == start && c.iter().rev().eq(geom.0.iter()))
        });
        if duplicate {
            dropped += 1;
            continue;
        }
        seen.push((start, end, geom.0.clone()));
        net.add_edge_with_id(&edge.id, start, end, geom, edge.imp_factor)?;
    }

    for group in groups {
        for &m in &group.members {
            net.remove_node(m);
        }
    }
    tracing::trace!(dropped, "internal and duplicate edges dropped");
    Ok(net)
}
