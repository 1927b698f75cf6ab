//! Network decomposition into fixed-length pieces
//!
//! Every edge longer than `decomposition_length` is cut into `ceil(L / len)`
//! equal pieces. Piece attributes are assigned rather than re-derived so the
//! totals of the original edge survive exactly:
//! - piece lengths telescope to the edge length;
//! - each interior vertex turn goes to exactly one piece, the following one
//!   when the vertex sits on a cut;
//! - a piece enters on the heading the previous piece left on, so crossing an
//!   inserted node costs no turn.

use geo::LineString;

use crate::config::DecomposeConfig;
use crate::error::Result;
use crate::geom;
use crate::graph::{Edge, EdgeIdx, NetworkStructure, Node};

/// Offsets closer than this to a cut are treated as lying on it
const CUT_EPS: f64 = 1e-9;

pub fn decompose(network: &NetworkStructure, config: &DecomposeConfig) -> Result<NetworkStructure> {
    config.validate()?;
    let mut net = network.clone();
    let mut inserted = 0usize;

    let long: Vec<(EdgeIdx, usize)> = network
        .edges()
        .filter_map(|(idx, edge)| {
            let pieces = (edge.length / config.decomposition_length).ceil() as usize;
            (pieces > 1).then_some((idx, pieces))
        })
        .collect();

    for (idx, pieces) in long {
        let Some(edge) = network.edge(idx) else { continue };
        // position among edges joining the same pair keeps node names unique
        let k = network
            .edges_between(edge.start, edge.end)
            .iter()
            .position(|&e| e == idx)
            .unwrap_or(edge.parallel);
        let (Some(start), Some(end)) = (network.node(edge.start), network.node(edge.end)) else {
            continue;
        };
        let live = start.live && end.live;
        let prefix = format!("{}±{}±{k}", start.id, end.id);

        let cuts = cut_edge(edge, pieces);
        net.remove_edge(idx);
        let mut prev = edge.start;
        for (j, piece) in cuts.into_iter().enumerate() {
            let next = if j + 1 == pieces {
                edge.end
            } else {
                let at = geom::interpolate(&edge.geom, piece.end);
                inserted += 1;
                net.add_node(Node::new(format!("{prefix}±{j}"), at, live))?
            };
            net.insert_edge(Edge {
                id: format!("{}#{j}", edge.id),
                start: prev,
                end: next,
                parallel: 0,
                geom: piece.geom,
                length: piece.end - piece.start,
                angle_sum: piece.angle_sum,
                in_bearing: piece.in_bearing,
                out_bearing: piece.out_bearing,
                imp_factor: edge.imp_factor,
            })?;
            prev = next;
        }
    }

    tracing::info!(
        inserted,
        nodes = net.node_count(),
        edges = net.edge_count(),
        length = config.decomposition_length,
        "network decomposed"
    );
    Ok(net)
}

struct Piece {
    start: f64,
    end: f64,
    geom: LineString<f64>,
    angle_sum: f64,
    in_bearing: f64,
    out_bearing: f64,
}

fn cut_edge(edge: &Edge, pieces: usize) -> Vec<Piece> {
    let offsets = geom::vertex_offsets(&edge.geom);
    let coords = &edge.geom.0;
    let headings: Vec<f64> = coords.windows(2).map(|w| geom::bearing(w[0], w[1])).collect();

    // interior vertex turns at their offsets
    let turns: Vec<(f64, f64)> = (1..coords.len().saturating_sub(1))
        .filter_map(|v| {
            let before = heading_before(&offsets, &headings, offsets[v])?;
            let after = heading_after(&offsets, &headings, offsets[v])?;
            Some((offsets[v], geom::turn_angle(before, after)))
        })
        .collect();

    let step = edge.length / pieces as f64;
    (0..pieces)
        .map(|j| {
            let start = j as f64 * step;
            let end = if j + 1 == pieces { edge.length } else { (j + 1) as f64 * step };
            let angle_sum = turns
                .iter()
                .filter(|(at, _)| *at >= start - CUT_EPS && *at < end - CUT_EPS)
                .map(|(_, t)| t)
                .sum();
            let in_bearing = if j == 0 {
                edge.in_bearing
            } else {
                heading_before(&offsets, &headings, start).unwrap_or(edge.in_bearing)
            };
            let out_bearing = if j + 1 == pieces {
                edge.out_bearing
            } else {
                heading_before(&offsets, &headings, end).unwrap_or(edge.out_bearing)
            };
            Piece {
                start,
                end,
                geom: geom::substring(&edge.geom, start, end),
                angle_sum,
                in_bearing,
                out_bearing,
            }
        })
        .collect()
}

/// Heading of the last non-degenerate segment ending at or after `at`
fn heading_before(offsets: &[f64], headings: &[f64], at: f64) -> Option<f64> {
    (0..headings.len())
        .find(|&k| offsets[k + 1] > offsets[k] && offsets[k + 1] >= at - CUT_EPS)
        .map(|k| headings[k])
}

/// Heading of the first non-degenerate segment starting at or after `at`
fn heading_after(offsets: &[f64], headings: &[f64], at: f64) -> Option<f64> {
    (0..headings.len())
        .find(|&k| offsets[k + 1] > offsets[k] && offsets[k] >= at - CUT_EPS)
        .map(|k| headings[k])
}
