//! Seeded k-means over feature rows.
//!
//! Centroids start from k-means++ seeding and are refined with Lloyd
//! iterations until they stop moving. Several restarts run from different
//! seeds and the tightest fit wins. All randomness comes from a seed, so the
//! same rows, `k` and config always give the same model.

use log::trace;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::error::{RecError, Result};
use crate::features::{FeatureRow, FEATURE_COUNT};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KMeansConfig {
    pub max_iterations: usize,
    /// Stop once the total squared centroid movement drops to this.
    pub tolerance: f64,
    pub restarts: usize,
    pub seed: u64,
}

impl Default for KMeansConfig {
    fn default() -> Self {
        Self {
            max_iterations: 300,
            tolerance: 1e-4,
            restarts: 10,
            seed: 42,
        }
    }
}

/// A fitted partition of feature space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterModel {
    centroids: Vec<FeatureRow>,
    inertia: f64,
    iterations: usize,
}

impl ClusterModel {
    /// Fits `k` clusters to `rows`.
    ///
    /// # Errors
    ///
    /// - [`RecError::EmptyMatrix`] when there are no rows
    /// - [`RecError::InvalidConfig`] when `k` is zero
    /// - [`RecError::InsufficientData`] when there are fewer rows than clusters
    pub fn fit(rows: &[FeatureRow], k: usize, config: &KMeansConfig) -> Result<Self> {
        if rows.is_empty() {
            return Err(RecError::EmptyMatrix { what: "training matrix" });
        }
        if k == 0 {
            return Err(RecError::InvalidConfig("cluster count must be positive".into()));
        }
        if k > rows.len() {
            return Err(RecError::InsufficientData {
                rows: rows.len(),
                needed: k,
            });
        }

        let base_seed = config
            .seed
            .wrapping_mul(0x9E37_79B9_7F4A_7C15)
            .wrapping_add(k as u64);

        let mut best: Option<Self> = None;
        for restart in 0..config.restarts.max(1) {
            let mut rng = StdRng::seed_from_u64(base_seed.wrapping_add(restart as u64));
            let candidate = fit_once(rows, k, config, &mut rng);
            trace!(
                "k={k} restart {restart}: inertia {:.4} after {} iterations",
                candidate.inertia,
                candidate.iterations
            );
            if best.as_ref().map_or(true, |b| candidate.inertia < b.inertia) {
                best = Some(candidate);
            }
        }

        best.ok_or_else(|| RecError::InvalidConfig("k-means produced no fit".into()))
    }

    /// Model with fixed centroids, nothing fitted.
    #[must_use]
    pub fn from_centroids(centroids: Vec<FeatureRow>) -> Self {
        Self {
            centroids,
            inertia: 0.0,
            iterations: 0,
        }
    }

    #[must_use]
    pub fn k(&self) -> usize {
        self.centroids.len()
    }

    #[must_use]
    pub fn centroids(&self) -> &[FeatureRow] {
        &self.centroids
    }

    /// Sum of squared distances from each training row to its centroid.
    #[must_use]
    pub fn inertia(&self) -> f64 {
        self.inertia
    }

    #[must_use]
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Label of the nearest centroid; equal distances go to the lower label.
    #[must_use]
    pub fn predict(&self, row: &FeatureRow) -> usize {
        nearest(row, &self.centroids).0
    }

    #[must_use]
    pub fn predict_all(&self, rows: &[FeatureRow]) -> Vec<usize> {
        rows.iter().map(|row| self.predict(row)).collect()
    }

    /// Tightness of `rows` under this model.
    #[must_use]
    pub fn score(&self, rows: &[FeatureRow]) -> f64 {
        rows.iter().map(|row| nearest(row, &self.centroids).1).sum()
    }
}

fn fit_once(rows: &[FeatureRow], k: usize, config: &KMeansConfig, rng: &mut StdRng) -> ClusterModel {
    let mut centroids = plus_plus_init(rows, k, rng);
    let mut labels = vec![0usize; rows.len()];
    let mut iterations = 0;

    for iter in 0..config.max_iterations {
        iterations = iter + 1;

        let mut distances = vec![0.0; rows.len()];
        for (i, row) in rows.iter().enumerate() {
            let (label, dist) = nearest(row, &centroids);
            labels[i] = label;
            distances[i] = dist;
        }

        let mut sums = vec![[0.0; FEATURE_COUNT]; k];
        let mut counts = vec![0usize; k];
        for (row, &label) in rows.iter().zip(&labels) {
            counts[label] += 1;
            for (acc, v) in sums[label].iter_mut().zip(row) {
                *acc += v;
            }
        }

        let mut shift = 0.0;
        for c in 0..k {
            let updated = if counts[c] > 0 {
                let n = counts[c] as f64;
                sums[c].map(|s| s / n)
            } else {
                // Empty cluster: move it onto the worst-served row.
                let (far, _) = distances
                    .iter()
                    .enumerate()
                    .fold((0, f64::NEG_INFINITY), |acc, (i, &d)| if d > acc.1 { (i, d) } else { acc });
                distances[far] = 0.0;
                rows[far]
            };
            shift += squared_distance(&centroids[c], &updated);
            centroids[c] = updated;
        }

        if shift <= config.tolerance {
            break;
        }
    }

    let mut model = ClusterModel {
        centroids,
        inertia: 0.0,
        iterations,
    };
    model.inertia = model.score(rows);
    model
}

/// k-means++: first centroid uniform, the rest weighted by squared distance
/// to the closest centroid chosen so far.
fn plus_plus_init(rows: &[FeatureRow], k: usize, rng: &mut StdRng) -> Vec<FeatureRow> {
    let mut centroids = Vec::with_capacity(k);
    centroids.push(rows[rng.gen_range(0..rows.len())]);

    while centroids.len() < k {
        let weights: Vec<f64> = rows.iter().map(|row| nearest(row, &centroids).1).collect();
        let total: f64 = weights.iter().sum();

        let pick = if total <= 0.0 {
            rng.gen_range(0..rows.len())
        } else {
            let threshold = rng.gen::<f64>() * total;
            let mut cumulative = 0.0;
            weights
                .iter()
                .position(|w| {
                    cumulative += w;
                    cumulative >= threshold
                })
                .unwrap_or(rows.len() - 1)
        };
        centroids.push(rows[pick]);
    }

    centroids
}

/// Index of the closest centroid and the squared distance to it.
fn nearest(row: &FeatureRow, centroids: &[FeatureRow]) -> (usize, f64) {
    centroids
        .iter()
        .enumerate()
        .map(|(i, c)| (i, squared_distance(row, c)))
        .fold((0, f64::INFINITY), |best, cur| if cur.1 < best.1 { cur } else { best })
}

#[must_use]
pub fn squared_distance(a: &FeatureRow, b: &FeatureRow) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}
