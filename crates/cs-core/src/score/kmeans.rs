//! k-means clustering used to seed the mixture fit.

use cs_math::Matrix;
use rand::Rng;

const MAX_ITER: usize = 300;
const TOL: f64 = 1e-4;

/// Result of a single k-means run.
#[derive(Debug, Clone, PartialEq)]
pub struct KMeans {
    pub centers: Vec<Vec<f64>>,
    pub labels: Vec<usize>,
    pub inertia: f64,
    pub n_iter: usize,
}

fn sq_dist(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

fn nearest(point: &[f64], centers: &[Vec<f64>]) -> (usize, f64) {
    let mut best = (0, f64::INFINITY);
    for (k, c) in centers.iter().enumerate() {
        let d = sq_dist(point, c);
        if d < best.1 {
            best = (k, d);
        }
    }
    best
}

/// k-means++ seeding: each new center is drawn with probability
/// proportional to its squared distance from the closest chosen center.
pub fn kmeans_plus_plus<R: Rng + ?Sized>(x: &Matrix, k: usize, rng: &mut R) -> Vec<Vec<f64>> {
    let n = x.rows();
    let mut centers = Vec::with_capacity(k);
    centers.push(x.row(rng.random_range(0..n)).to_vec());

    let mut closest: Vec<f64> = x.iter_rows().map(|r| sq_dist(r, &centers[0])).collect();
    while centers.len() < k {
        let total: f64 = closest.iter().sum();
        let pick = if total > 0.0 && total.is_finite() {
            let target = rng.random::<f64>() * total;
            let mut acc = 0.0;
            let mut chosen = n - 1;
            for (i, d) in closest.iter().enumerate() {
                acc += d;
                if acc >= target && *d > 0.0 {
                    chosen = i;
                    break;
                }
            }
            chosen
        } else {
            rng.random_range(0..n)
        };
        let center = x.row(pick).to_vec();
        for (i, row) in x.iter_rows().enumerate() {
            closest[i] = closest[i].min(sq_dist(row, &center));
        }
        centers.push(center);
    }
    centers
}

/// Lloyd iterations from k-means++ seeds.
///
/// A cluster that loses all its points is re-seeded at the point farthest
/// from its current center.
pub fn kmeans<R: Rng + ?Sized>(x: &Matrix, k: usize, rng: &mut R) -> KMeans {
    let (n, d) = x.shape();
    let mut centers = kmeans_plus_plus(x, k, rng);
    let mut labels = vec![0usize; n];
    let mut n_iter = 0;

    for iter in 1..=MAX_ITER {
        n_iter = iter;
        let mut farthest = (0usize, -1.0f64);
        for (i, row) in x.iter_rows().enumerate() {
            let (label, dist) = nearest(row, &centers);
            labels[i] = label;
            if dist > farthest.1 {
                farthest = (i, dist);
            }
        }

        let mut sums = vec![vec![0.0; d]; k];
        let mut counts = vec![0usize; k];
        for (i, row) in x.iter_rows().enumerate() {
            counts[labels[i]] += 1;
            for (s, v) in sums[labels[i]].iter_mut().zip(row) {
                *s += v;
            }
        }

        let mut shift = 0.0;
        for c in 0..k {
            let new_center = if counts[c] == 0 {
                x.row(farthest.0).to_vec()
            } else {
                sums[c].iter().map(|s| s / counts[c] as f64).collect()
            };
            shift += sq_dist(&centers[c], &new_center);
            centers[c] = new_center;
        }

        if shift <= TOL * TOL {
            break;
        }
    }

    let mut inertia = 0.0;
    for (i, row) in x.iter_rows().enumerate() {
        let (label, dist) = nearest(row, &centers);
        labels[i] = label;
        inertia += dist;
    }

    KMeans {
        centers,
        labels,
        inertia,
        n_iter,
    }
}
