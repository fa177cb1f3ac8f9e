//! # Cluster Count Selection
//!
//! Fits one k-means model per candidate cluster count and picks the count
//! at the elbow of the tightness curve.
//!
//! ## Elbow Detection
//!
//! Both axes are normalised to `[0, 1]`, a straight line is drawn from the
//! first point of the curve to the last, and the interior point lying
//! furthest below that line is the elbow. Curves that are flat, rise, or
//! never bend below the line have no elbow and selection fails with
//! [`RecError::NoElbowDetected`].

use log::{debug, info};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{RecError, Result};
use crate::features::FeatureRow;
use crate::kmeans::{ClusterModel, KMeansConfig};

/// Smallest normalised drop below the chord that still counts as a bend.
const MIN_BEND: f64 = 1e-3;

/// Inclusive range of cluster counts to try.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KRange {
    pub min: usize,
    pub max: usize,
}

impl Default for KRange {
    fn default() -> Self {
        Self { min: 2, max: 10 }
    }
}

impl KRange {
    /// # Errors
    ///
    /// [`RecError::InvalidConfig`] unless `1 <= min` and the range holds at
    /// least three counts.
    pub fn validate(&self) -> Result<()> {
        if self.min == 0 || self.max < self.min + 2 {
            return Err(RecError::InvalidConfig(format!(
                "cluster range {}..={} must start at 1 or more and span at least three counts",
                self.min, self.max
            )));
        }
        Ok(())
    }
}

/// Outcome of model selection.
#[derive(Debug, Clone)]
pub struct Selection {
    pub k: usize,
    pub model: ClusterModel,
    /// `(k, tightness)` for every count tried, in increasing `k`.
    pub scores: Vec<(usize, f64)>,
}

/// Fits every count in `range` and returns the model at the elbow.
///
/// # Returns
///
/// * `Ok(Selection)` - The elbow `k`, its fitted model and the tightness
///   score of every count tried
/// * `Err(RecError)` - When the range or the data cannot support a choice
///
/// # Errors
///
/// - [`RecError::InvalidConfig`] for a bad range
/// - [`RecError::InsufficientData`] when there are fewer rows than `range.max`
/// - [`RecError::NoElbowDetected`] when the score curve has no elbow
///
/// # Examples
///
/// ```no_run
/// use tunesift::features::FeatureRow;
/// use tunesift::kmeans::KMeansConfig;
/// use tunesift::selector::{select_model, KRange};
///
/// let rows: Vec<FeatureRow> = Vec::new(); // one row per playlist track
/// let selection = select_model(&rows, KRange::default(), &KMeansConfig::default())?;
/// println!("{} clusters", selection.k);
/// # Ok::<(), anyhow::Error>(())
/// ```
///
/// # Design Notes
///
/// - Fits for different counts run in parallel on rayon's pool
/// - Each fit is seeded from the config seed and its own `k`, so the
///   result does not depend on scheduling
/// - The elbow is always an interior count, never `range.min` or `range.max`
pub fn select_model(rows: &[FeatureRow], range: KRange, config: &KMeansConfig) -> Result<Selection> {
    range.validate()?;
    if rows.len() < range.max {
        return Err(RecError::InsufficientData {
            rows: rows.len(),
            needed: range.max,
        });
    }

    let mut fitted = (range.min..=range.max)
        .into_par_iter()
        .map(|k| ClusterModel::fit(rows, k, config).map(|model| (k, model)))
        .collect::<Result<Vec<_>>>()?;

    let scores: Vec<(usize, f64)> = fitted.iter().map(|(k, m)| (*k, m.inertia())).collect();
    for (k, score) in &scores {
        debug!("k={k}: tightness {score:.4}");
    }

    let ks: Vec<usize> = scores.iter().map(|(k, _)| *k).collect();
    let values: Vec<f64> = scores.iter().map(|(_, s)| *s).collect();
    let elbow = find_elbow(&ks, &values)?;
    info!("Selected {elbow} clusters from range {}..={}", range.min, range.max);

    let position = elbow - range.min;
    let (k, model) = fitted.swap_remove(position);
    Ok(Selection { k, model, scores })
}

/// Picks the elbow of a decreasing score curve. Returns the `k` at the
/// elbow, which is always an interior point of `ks`.
///
/// # Errors
///
/// [`RecError::NoElbowDetected`] when the curve has fewer than three points,
/// is flat, does not decrease, or never bends below its chord.
pub fn find_elbow(ks: &[usize], scores: &[f64]) -> Result<usize> {
    let no_elbow = |reason: &str| RecError::NoElbowDetected {
        reason: reason.to_string(),
    };

    if ks.len() != scores.len() {
        return Err(no_elbow("cluster counts and scores differ in length"));
    }
    if ks.len() < 3 {
        return Err(no_elbow("need at least three cluster counts"));
    }
    if scores.iter().any(|s| !s.is_finite()) {
        return Err(no_elbow("scores contain non-finite values"));
    }

    let (lo, hi) = scores
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &s| (lo.min(s), hi.max(s)));
    let spread = hi - lo;
    if spread <= f64::EPSILON * hi.abs().max(1.0) {
        return Err(no_elbow("scores are flat"));
    }

    let first = scores[0];
    let last = scores[scores.len() - 1];
    if first <= last {
        return Err(no_elbow("scores do not decrease"));
    }

    let k0 = ks[0] as f64;
    let k_span = (ks[ks.len() - 1] as f64 - k0).max(f64::EPSILON);
    let x = |i: usize| (ks[i] as f64 - k0) / k_span;
    let y = |i: usize| (scores[i] - lo) / spread;

    // Chord from (0, y0) to (1, yn); distance below it, scaled by chord length.
    let (y0, yn) = (y(0), y(ks.len() - 1));
    let chord = (1.0 + (yn - y0).powi(2)).sqrt();

    let (best, bend) = (1..ks.len() - 1)
        .map(|i| {
            let on_chord = y0 + (yn - y0) * x(i);
            (i, (on_chord - y(i)) / chord)
        })
        .fold((0, f64::NEG_INFINITY), |acc, cur| if cur.1 > acc.1 { cur } else { acc });

    if bend <= MIN_BEND {
        return Err(no_elbow("score curve never bends below its chord"));
    }
    Ok(ks[best])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::FEATURE_COUNT;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn ks() -> Vec<usize> {
        (2..=10).collect()
    }

    /// `per_blob` points around each of three well separated centres.
    fn three_blobs(seed: u64, per_blob: usize) -> Vec<FeatureRow> {
        let mut rng = StdRng::seed_from_u64(seed);
        let centres: [f64; 3] = [0.0, 5.0, 10.0];
        let mut rows = Vec::new();
        for (b, centre) in centres.iter().enumerate() {
            for _ in 0..per_blob {
                let mut row = [0.0; FEATURE_COUNT];
                for (d, v) in row.iter_mut().enumerate() {
                    let offset = if d % 3 == b { *centre } else { -centre };
                    *v = offset + rng.gen_range(-0.05..0.05);
                }
                rows.push(row);
            }
        }
        rows
    }

    #[test]
    fn test_three_blobs_select_three() {
        for seed in 0..5 {
            let rows = three_blobs(seed, 20);
            let selection = select_model(&rows, KRange::default(), &KMeansConfig::default()).unwrap();
            assert_eq!(selection.k, 3, "data seed {seed} picked {}", selection.k);
            assert_eq!(selection.model.k(), 3);
            assert_eq!(selection.scores.len(), 9);
        }
    }

    #[test]
    fn test_selection_is_repeatable() {
        let rows = three_blobs(7, 15);
        let a = select_model(&rows, KRange::default(), &KMeansConfig::default()).unwrap();
        let b = select_model(&rows, KRange::default(), &KMeansConfig::default()).unwrap();
        assert_eq!(a.k, b.k);
        assert_eq!(a.model, b.model);
        assert_eq!(a.scores, b.scores);
    }

    #[test]
    fn test_elbow_on_known_curve() {
        let scores = [100.0, 20.0, 15.0, 12.0, 10.0, 9.0, 8.0, 7.5, 7.0];
        assert_eq!(find_elbow(&ks(), &scores).unwrap(), 3);

        let later = [100.0, 90.0, 80.0, 20.0, 18.0, 16.0, 15.0, 14.0, 13.0];
        assert_eq!(find_elbow(&ks(), &later).unwrap(), 5);
    }

    #[test]
    fn test_flat_curve_has_no_elbow() {
        let scores = [5.0; 9];
        assert!(matches!(
            find_elbow(&ks(), &scores),
            Err(RecError::NoElbowDetected { .. })
        ));
    }

    #[test]
    fn test_straight_line_has_no_elbow() {
        let scores: Vec<f64> = (0..9).map(|i| 90.0 - 10.0 * f64::from(i)).collect();
        assert!(matches!(
            find_elbow(&ks(), &scores),
            Err(RecError::NoElbowDetected { .. })
        ));
    }

    #[test]
    fn test_rising_or_short_curve_has_no_elbow() {
        let rising = [1.0, 2.0, 3.0, 5.0, 8.0, 9.0, 9.5, 9.7, 9.8];
        assert!(find_elbow(&ks(), &rising).is_err());
        assert!(find_elbow(&[2, 3], &[10.0, 1.0]).is_err());
    }

    #[test]
    fn test_identical_rows_fail_selection() {
        let rows = vec![[0.5; FEATURE_COUNT]; 12];
        let result = select_model(&rows, KRange::default(), &KMeansConfig::default());
        assert!(matches!(result, Err(RecError::NoElbowDetected { .. })));
    }

    #[test]
    fn test_too_few_rows() {
        let rows = three_blobs(1, 2);
        let result = select_model(&rows, KRange::default(), &KMeansConfig::default());
        assert!(matches!(
            result,
            Err(RecError::InsufficientData { rows: 6, needed: 10 })
        ));
    }

    #[test]
    fn test_range_validation() {
        assert!(KRange { min: 2, max: 3 }.validate().is_err());
        assert!(KRange { min: 0, max: 5 }.validate().is_err());
        assert!(KRange { min: 2, max: 4 }.validate().is_ok());
    }
}
