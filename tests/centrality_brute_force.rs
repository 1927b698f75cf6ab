//! Centrality checked against exhaustive path enumeration
//!
//! Random subgraphs of a square lattice keep every edge length an exact
//! multiple of the spacing, so shortest-path ties are exact and simple-path
//! enumeration stays small.

use anyhow::Result;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rustc_hash::FxHashMap;
use streetnet::config::{beta_from_distance, MIN_THRESHOLD_WEIGHT};
use streetnet::{compute_centrality, CentralityConfig, EdgeRecord, GraphConfig, NetworkStructure, NodeRecord, PathMode};

const SPACING: f64 = 10.0;

struct Lattice {
    side: usize,
    edges: Vec<(usize, usize)>,
}

impl Lattice {
    fn random(side: usize, keep: f64, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut edges = Vec::new();
        for i in 0..side {
            for j in 0..side {
                let n = i * side + j;
                if i + 1 < side && rng.random_bool(keep) {
                    edges.push((n, n + side));
                }
                if j + 1 < side && rng.random_bool(keep) {
                    edges.push((n, n + 1));
                }
            }
        }
        Self { side, edges }
    }

    fn len(&self) -> usize {
        self.side * self.side
    }

    fn coord(&self, n: usize) -> (i64, i64) {
        ((n / self.side) as i64, (n % self.side) as i64)
    }

    fn adjacency(&self) -> Vec<Vec<usize>> {
        let mut adj = vec![Vec::new(); self.len()];
        for &(a, b) in &self.edges {
            adj[a].push(b);
            adj[b].push(a);
        }
        adj
    }

    fn edge_lookup(&self) -> FxHashMap<(usize, usize), usize> {
        let mut lookup = FxHashMap::default();
        for (k, &(a, b)) in self.edges.iter().enumerate() {
            lookup.insert((a, b), k);
            lookup.insert((b, a), k);
        }
        lookup
    }

    /// All-pairs hop distances, `usize::MAX` when unreachable
    fn hops(&self) -> Vec<Vec<usize>> {
        let n = self.len();
        let mut d = vec![vec![usize::MAX; n]; n];
        for (i, row) in d.iter_mut().enumerate() {
            row[i] = 0;
        }
        for &(a, b) in &self.edges {
            d[a][b] = 1;
            d[b][a] = 1;
        }
        for k in 0..n {
            for i in 0..n {
                for j in 0..n {
                    if d[i][k] != usize::MAX && d[k][j] != usize::MAX && d[i][k] + d[k][j] < d[i][j] {
                        d[i][j] = d[i][k] + d[k][j];
                    }
                }
            }
        }
        d
    }

    fn network(&self) -> Result<NetworkStructure> {
        let nodes: Vec<NodeRecord> = (0..self.len())
            .map(|n| {
                let (x, y) = self.coord(n);
                NodeRecord::new(format!("n{n}"), x as f64 * SPACING, y as f64 * SPACING)
            })
            .collect();
        let edges: Vec<EdgeRecord> = self
            .edges
            .iter()
            .enumerate()
            .map(|(k, &(a, b))| EdgeRecord::new(format!("e{k}"), format!("n{a}"), format!("n{b}")))
            .collect();
        Ok(NetworkStructure::from_records(&nodes, &edges, &GraphConfig::default())?)
    }
}

/// Visit every simple path from `source` with at most `max_hops` edges
fn simple_paths(adj: &[Vec<usize>], path: &mut Vec<usize>, max_hops: usize, visit: &mut impl FnMut(&[usize])) {
    if path.len() > max_hops {
        return;
    }
    let Some(&last) = path.last() else { return };
    for &next in &adj[last] {
        if path.contains(&next) {
            continue;
        }
        path.push(next);
        visit(path);
        simple_paths(adj, path, max_hops, visit);
        path.pop();
    }
}

#[derive(Debug, Clone, Default)]
struct Expected {
    density: f64,
    farness: f64,
    cycles: f64,
    harmonic: f64,
    beta: f64,
    betweenness: f64,
    betweenness_beta: f64,
}

#[derive(Clone)]
struct Best {
    hops: usize,
    count: f64,
    through: Vec<f64>,
    edges: Vec<f64>,
}

impl Best {
    fn new(hops: usize, nodes: usize, edges: usize) -> Self {
        Self {
            hops,
            count: 0.0,
            through: vec![0.0; nodes],
            edges: vec![0.0; edges],
        }
    }
}

/// Segment betweenness per edge: (unit, beta-decayed)
fn brute_segment_betweenness(lattice: &Lattice, distance: f64) -> Vec<(f64, f64)> {
    let n = lattice.len();
    let adj = lattice.adjacency();
    let lookup = lattice.edge_lookup();
    let beta = beta_from_distance(distance, MIN_THRESHOLD_WEIGHT);
    let max_hops = (distance / SPACING).floor() as usize;
    let mut expected = vec![(0.0, 0.0); lattice.edges.len()];

    for s in 0..n {
        let mut best: Vec<Option<Best>> = vec![None; n];
        let mut path = vec![s];
        simple_paths(&adj, &mut path, max_hops, &mut |p| {
            let t = p[p.len() - 1];
            let hops = p.len() - 1;
            let entry = best[t].get_or_insert_with(|| Best::new(hops, n, lattice.edges.len()));
            if hops < entry.hops {
                *entry = Best::new(hops, n, lattice.edges.len());
            }
            if hops == entry.hops {
                entry.count += 1.0;
                for w in p.windows(2) {
                    entry.edges[lookup[&(w[0], w[1])]] += 1.0;
                }
            }
        });
        for (t, b) in best.iter().enumerate() {
            let Some(b) = b else { continue };
            if t <= s {
                continue;
            }
            let decay = (-beta * b.hops as f64 * SPACING).exp();
            for (k, &used) in b.edges.iter().enumerate() {
                expected[k].0 += used / b.count;
                expected[k].1 += used / b.count * decay;
            }
        }
    }
    expected
}

fn brute_shortest(lattice: &Lattice, distance: f64) -> Vec<Expected> {
    let n = lattice.len();
    let adj = lattice.adjacency();
    let beta = beta_from_distance(distance, MIN_THRESHOLD_WEIGHT);
    let max_hops = (distance / SPACING).floor() as usize;
    let mut expected = vec![Expected::default(); n];

    for s in 0..n {
        let mut best: Vec<Option<Best>> = vec![None; n];
        let mut path = vec![s];
        simple_paths(&adj, &mut path, max_hops, &mut |p| {
            let t = p[p.len() - 1];
            let hops = p.len() - 1;
            let entry = best[t].get_or_insert_with(|| Best::new(hops, n, 0));
            if hops < entry.hops {
                *entry = Best::new(hops, n, 0);
            }
            if hops == entry.hops {
                entry.count += 1.0;
                for &v in &p[1..p.len() - 1] {
                    entry.through[v] += 1.0;
                }
            }
        });

        for (t, b) in best.iter().enumerate() {
            let Some(b) = b else { continue };
            if t == s {
                continue;
            }
            let d = b.hops as f64 * SPACING;
            let e = &mut expected[s];
            e.density += 1.0;
            e.farness += d;
            e.harmonic += 1.0 / d;
            e.beta += (-beta * d).exp();
            if b.count > 1.0 {
                e.cycles += 1.0;
            }
            if s < t {
                for (v, &through) in b.through.iter().enumerate() {
                    if through > 0.0 {
                        expected[v].betweenness += through / b.count;
                        expected[v].betweenness_beta += through / b.count * (-beta * d).exp();
                    }
                }
            }
        }
    }
    expected
}

fn close(actual: f64, expected: f64) -> bool {
    (actual - expected).abs() <= 1e-9 * actual.abs().max(expected.abs()).max(1.0)
}

#[test]
fn shortest_metrics_match_path_enumeration() -> Result<()> {
    for seed in [7, 19, 42] {
        let lattice = Lattice::random(5, 0.8, seed);
        let network = lattice.network()?;
        let config = CentralityConfig {
            distance_thresholds: vec![20.0, 40.0],
            ..Default::default()
        };
        let result = compute_centrality(&network, &config)?.nodes;

        for distance in [20.0, 40.0] {
            let expected = brute_shortest(&lattice, distance);
            for (n, e) in expected.iter().enumerate() {
                let id = format!("n{n}");
                let checks = [
                    ("node_density", e.density),
                    ("node_farness", e.farness),
                    ("node_cycles", e.cycles),
                    ("node_harmonic", e.harmonic),
                    ("node_beta", e.beta),
                    ("node_betweenness", e.betweenness),
                    ("node_betweenness_beta", e.betweenness_beta),
                ];
                for (metric, want) in checks {
                    let got = result.get(&id, distance, metric).unwrap_or(f64::NAN);
                    assert!(
                        close(got, want),
                        "seed {seed} node {id} {metric}@{distance}: got {got}, expected {want}"
                    );
                }
            }
        }
    }
    Ok(())
}

/// Cumulative turn along a lattice path: 90 degrees per change of direction
fn lattice_turns(lattice: &Lattice, path: &[usize]) -> f64 {
    path.windows(3)
        .filter(|w| {
            let (a, b, c) = (lattice.coord(w[0]), lattice.coord(w[1]), lattice.coord(w[2]));
            (b.0 - a.0, b.1 - a.1) != (c.0 - b.0, c.1 - b.1)
        })
        .count() as f64
        * 90.0
}

/// Minimal cumulative turn to a target, with the interior nodes common to
/// every minimal path and those on at least one
#[derive(Clone)]
struct MinTurn {
    turn: f64,
    in_all: Vec<bool>,
    in_any: Vec<bool>,
}

#[test]
fn angular_metrics_match_path_enumeration() -> Result<()> {
    for seed in [3, 11] {
        let lattice = Lattice::random(4, 0.85, seed);
        let network = lattice.network()?;
        let config = CentralityConfig {
            distance_thresholds: vec![1000.0],
            path_mode: PathMode::Simplest,
            ..Default::default()
        };
        let result = compute_centrality(&network, &config)?.nodes;
        let adj = lattice.adjacency();
        let n = lattice.len();
        let mut lower = vec![0.0; n];
        let mut upper = vec![0.0; n];

        for s in 0..n {
            let mut best: Vec<Option<MinTurn>> = vec![None; n];
            let mut path = vec![s];
            simple_paths(&adj, &mut path, usize::MAX, &mut |p| {
                let t = p[p.len() - 1];
                let turn = lattice_turns(&lattice, p);
                let mut interior = vec![false; n];
                for &v in &p[1..p.len() - 1] {
                    interior[v] = true;
                }
                match &mut best[t] {
                    Some(b) if turn > b.turn => {}
                    Some(b) if turn == b.turn => {
                        for v in 0..n {
                            b.in_all[v] &= interior[v];
                            b.in_any[v] |= interior[v];
                        }
                    }
                    slot => {
                        *slot = Some(MinTurn {
                            turn,
                            in_all: interior.clone(),
                            in_any: interior,
                        })
                    }
                }
            });

            let (harmonic, farness) = best
                .iter()
                .enumerate()
                .filter(|&(t, _)| t != s)
                .filter_map(|(_, b)| b.as_ref())
                .fold((0.0, 0.0), |(h, f), b| (h + 1.0 / (1.0 + b.turn / 180.0), f + 1.0 + b.turn / 180.0));

            let id = format!("n{s}");
            let got_h = result.get(&id, 1000.0, "node_harmonic_angular").unwrap_or(f64::NAN);
            let got_f = result.get(&id, 1000.0, "node_farness_angular").unwrap_or(f64::NAN);
            assert!(close(got_h, harmonic), "seed {seed} {id}: harmonic {got_h} vs {harmonic}");
            assert!(close(got_f, farness), "seed {seed} {id}: farness {got_f} vs {farness}");

            // each pair is counted once, along one of its minimal-turn paths
            for b in best.iter().skip(s + 1).flatten() {
                for v in 0..n {
                    lower[v] += f64::from(u8::from(b.in_all[v]));
                    upper[v] += f64::from(u8::from(b.in_any[v]));
                }
            }
        }

        for v in 0..n {
            let id = format!("n{v}");
            let got = result.get(&id, 1000.0, "node_betweenness_angular").unwrap_or(f64::NAN);
            assert!(
                got >= lower[v] && got <= upper[v],
                "seed {seed} {id}: angular betweenness {got} outside [{}, {}]",
                lower[v],
                upper[v]
            );
        }
    }
    Ok(())
}

/// ∫ 1/max(x, 1) dx from 0
fn harmonic_antiderivative(x: f64) -> f64 {
    if x <= 1.0 {
        x
    } else {
        1.0 + x.ln()
    }
}

#[test]
fn segment_metrics_match_brute_force() -> Result<()> {
    let thresholds = [20.0, 40.0];
    for seed in [7, 19, 42] {
        let lattice = Lattice::random(5, 0.8, seed);
        let network = lattice.network()?;
        let config = CentralityConfig {
            distance_thresholds: thresholds.to_vec(),
            segment: true,
            ..Default::default()
        };
        let segments = compute_centrality(&network, &config)?
            .segments
            .ok_or_else(|| anyhow::anyhow!("segment table missing"))?;
        let hops = lattice.hops();
        let window = thresholds[1];

        for distance in thresholds {
            let beta = beta_from_distance(distance, MIN_THRESHOLD_WEIGHT);
            let betweenness = brute_segment_betweenness(&lattice, distance);
            for (k, &(a, b)) in lattice.edges.iter().enumerate() {
                let (mut density, mut harmonic, mut decayed) = (0.0, 0.0, 0.0);
                for s in 0..lattice.len() {
                    // nodes beyond the largest window are never reached
                    let reach = |v: usize| {
                        let d = hops[s][v];
                        if d != usize::MAX && d as f64 * SPACING <= window {
                            d as f64 * SPACING
                        } else {
                            f64::INFINITY
                        }
                    };
                    let (da, db) = (reach(a), reach(b));
                    for (near, far) in [(da, db), (db, da)] {
                        if near > distance {
                            continue;
                        }
                        let split = if far.is_finite() { (SPACING + near + far) / 2.0 } else { near + SPACING };
                        let end = split.min(distance);
                        if end <= near {
                            continue;
                        }
                        density += end - near;
                        harmonic += harmonic_antiderivative(end) - harmonic_antiderivative(near);
                        decayed += ((-beta * near).exp() - (-beta * end).exp()) / beta;
                    }
                }

                let id = format!("e{k}");
                let checks = [
                    ("segment_density", density),
                    ("segment_harmonic", harmonic),
                    ("segment_beta", decayed),
                    ("segment_betweenness", betweenness[k].0),
                    ("segment_betweenness_beta", betweenness[k].1),
                ];
                for (metric, want) in checks {
                    let got = segments.get(&id, distance, metric).unwrap_or(f64::NAN);
                    assert!(
                        close(got, want),
                        "seed {seed} edge {id} {metric}@{distance}: got {got}, expected {want}"
                    );
                }
            }
        }
    }
    Ok(())
}

#[test]
fn square_scenario() -> Result<()> {
    let lattice = Lattice {
        side: 2,
        edges: vec![(0, 1), (1, 3), (3, 2), (2, 0)],
    };
    let network = lattice.network()?;
    let config = CentralityConfig {
        distance_thresholds: vec![20.0],
        ..Default::default()
    };
    let shortest = compute_centrality(&network, &config)?.nodes;
    let simplest = compute_centrality(
        &network,
        &CentralityConfig {
            path_mode: PathMode::Simplest,
            ..config
        },
    )?
    .nodes;
    for n in 0..4 {
        let id = format!("n{n}");
        assert_eq!(shortest.get(&id, 20.0, "node_farness"), Some(40.0));
        let h = simplest.get(&id, 20.0, "node_harmonic_angular").unwrap_or(f64::NAN);
        assert!(close(h, 2.0 + 2.0 / 3.0));
    }
    Ok(())
}
