//! Diversity indices over per-class counts
//!
//! `counts[i]` is the number of data points of class `i` in the window and
//! `distances[i]` the network distance to the nearest of them. Every index
//! returns 0 for an empty window.

fn total(counts: &[f64]) -> f64 {
    counts.iter().sum()
}

/// Hill number of order `q`
pub fn hill(counts: &[f64], q: f64) -> f64 {
    let n = total(counts);
    if n <= 0.0 {
        return 0.0;
    }
    let probs = counts.iter().filter(|&&c| c > 0.0).map(|&c| c / n);
    if q == 0.0 {
        probs.count() as f64
    } else if q == 1.0 {
        (-probs.map(|p| p * p.ln()).sum::<f64>()).exp()
    } else {
        probs.map(|p| p.powf(q)).sum::<f64>().powf(1.0 / (1.0 - q))
    }
}

/// Hill number with each class down-weighted by the distance to its nearest member
pub fn hill_branch_wt(counts: &[f64], distances: &[f64], q: f64, beta: f64) -> f64 {
    let n = total(counts);
    if n <= 0.0 {
        return 0.0;
    }
    let present: Vec<(f64, f64)> = counts
        .iter()
        .zip(distances)
        .filter(|(&c, _)| c > 0.0)
        .map(|(&c, &d)| (c / n, (-beta * d).exp()))
        .collect();
    let t: f64 = present.iter().map(|(p, w)| p * w).sum();
    if t <= 0.0 {
        return 0.0;
    }
    if q == 1.0 {
        let d: f64 = present.iter().map(|(p, w)| w * p / t * (p / t).ln()).sum();
        (-d).exp()
    } else {
        present
            .iter()
            .map(|(p, w)| w * (p / t).powf(q))
            .sum::<f64>()
            .powf(1.0 / (1.0 - q))
    }
}

/// Functional Hill number over class pairs with pair weights `weight(i, j)`
fn hill_pairwise(counts: &[f64], q: f64, weight: impl Fn(usize, usize) -> f64) -> f64 {
    let n = total(counts);
    if n <= 0.0 {
        return 0.0;
    }
    let present: Vec<(usize, f64)> = counts
        .iter()
        .enumerate()
        .filter(|(_, &c)| c > 0.0)
        .map(|(i, &c)| (i, c / n))
        .collect();

    let mut pairs = Vec::with_capacity(present.len() * present.len());
    for &(i, pi) in &present {
        for &(j, pj) in &present {
            pairs.push((weight(i, j), pi * pj));
        }
    }
    let big_q: f64 = pairs.iter().map(|(w, a)| w * a).sum();
    if big_q <= 0.0 {
        return 0.0;
    }
    let d = if q == 1.0 {
        let s: f64 = pairs
            .iter()
            .filter(|(w, _)| *w > 0.0)
            .map(|(w, a)| w * (a / big_q) * (a / big_q).ln())
            .sum();
        (-s).exp()
    } else {
        pairs
            .iter()
            .filter(|(w, _)| *w > 0.0)
            .map(|(w, a)| w * (a / big_q).powf(q))
            .sum::<f64>()
            .powf(1.0 / (1.0 - q))
    };
    d.sqrt()
}

/// Pairwise Hill number weighted by the decayed distance between class pairs
pub fn hill_pairwise_wt(counts: &[f64], distances: &[f64], q: f64, beta: f64) -> f64 {
    hill_pairwise(counts, q, |i, j| (-beta * (distances[i] + distances[j])).exp())
}

/// Pairwise Hill number weighted by a class disparity matrix
pub fn hill_pairwise_disparity(counts: &[f64], disparity: &[Vec<f64>], q: f64) -> f64 {
    hill_pairwise(counts, q, |i, j| disparity[i][j])
}

/// Shannon entropy in nats
pub fn shannon(counts: &[f64]) -> f64 {
    let n = total(counts);
    if n <= 0.0 {
        return 0.0;
    }
    -counts
        .iter()
        .filter(|&&c| c > 0.0)
        .map(|&c| {
            let p = c / n;
            p * p.ln()
        })
        .sum::<f64>()
}

/// Probability that two points drawn without replacement differ in class
pub fn gini_simpson(counts: &[f64]) -> f64 {
    let n = total(counts);
    if n < 2.0 {
        return 0.0;
    }
    let same: f64 = counts.iter().map(|&c| c / n * ((c - 1.0).max(0.0) / (n - 1.0))).sum();
    1.0 - same
}

/// Expected disparity between two points drawn without replacement
pub fn raos_pairwise_disparity(counts: &[f64], disparity: &[Vec<f64>]) -> f64 {
    let n = total(counts);
    if n < 2.0 {
        return 0.0;
    }
    let mut r = 0.0;
    for (i, &ci) in counts.iter().enumerate() {
        if ci <= 0.0 {
            continue;
        }
        for (j, &cj) in counts.iter().enumerate() {
            if i != j && cj > 0.0 {
                r += disparity[i][j] * (ci / n) * (cj / (n - 1.0));
            }
        }
    }
    r
}
