//! Cluster-based recommendation filtering.
//!
//! The user's own tracks vote for a cluster; candidates predicted into that
//! cluster are recommended in pool order.

use log::debug;
use std::collections::BTreeMap;

use crate::catalog::Track;
use crate::error::{RecError, Result};
use crate::features::FeatureMatrix;
use crate::kmeans::ClusterModel;

/// Number of tracks recommended when nothing else is asked for.
pub const DEFAULT_COUNT: usize = 5;

/// Most frequent label. Ties go to the lowest label; `None` for no labels.
#[must_use]
pub fn dominant_cluster(labels: &[usize]) -> Option<usize> {
    let mut counts: BTreeMap<usize, usize> = BTreeMap::new();
    for &label in labels {
        *counts.entry(label).or_default() += 1;
    }
    // BTreeMap iterates in label order, so keeping only strictly larger
    // counts leaves the lowest label among equals.
    counts
        .into_iter()
        .fold(None, |best: Option<(usize, usize)>, (label, n)| match best {
            Some((_, top)) if top >= n => best,
            _ => Some((label, n)),
        })
        .map(|(label, _)| label)
}

/// Pool entries whose label is `cluster`, in pool order, at most `count`.
/// `labels[i]` is the label of `pool[i]`.
#[must_use]
pub fn select_matching(labels: &[usize], pool: &[Track], cluster: usize, count: usize) -> Vec<Track> {
    labels
        .iter()
        .zip(pool)
        .filter(|(label, _)| **label == cluster)
        .map(|(_, track)| track.clone())
        .take(count)
        .collect()
}

/// Recommends up to `count` tracks from `pool` sharing the user's dominant
/// cluster.
///
/// Row `i` of `candidates` describes `pool[candidates.source_index(i)]`, so
/// pool entries without features are simply never recommended. Fewer
/// matches than `count` is not an error.
///
/// # Errors
///
/// [`RecError::EmptyMatrix`] when the user matrix has no rows.
pub fn recommend(
    user: &FeatureMatrix,
    candidates: &FeatureMatrix,
    pool: &[Track],
    model: &ClusterModel,
    count: usize,
) -> Result<Vec<Track>> {
    let user_labels = model.predict_all(user.rows());
    let main = dominant_cluster(&user_labels).ok_or(RecError::EmptyMatrix {
        what: "user feature matrix",
    })?;
    debug!("User tracks fall mostly in cluster {main} of {}", model.k());

    let mut labels = Vec::with_capacity(candidates.len());
    let mut aligned = Vec::with_capacity(candidates.len());
    for (row, features) in candidates.rows().iter().enumerate() {
        let Some(track) = candidates.source_index(row).and_then(|i| pool.get(i)) else {
            continue;
        };
        labels.push(model.predict(features));
        aligned.push(track.clone());
    }

    let picks = select_matching(&labels, &aligned, main, count);
    debug!(
        "{} of {} candidates share cluster {main}, returning {}",
        labels.iter().filter(|&&l| l == main).count(),
        labels.len(),
        picks.len()
    );
    Ok(picks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::{AudioFeatureVector, FeatureRow, FEATURE_COUNT};

    fn track(id: &str) -> Track {
        Track {
            id: id.to_string(),
            name: id.to_string(),
            artists: vec!["X".to_string()],
        }
    }

    fn pool(ids: &[&str]) -> Vec<Track> {
        ids.iter().map(|id| track(id)).collect()
    }

    fn at(x: f64) -> FeatureRow {
        let mut row = [0.0; FEATURE_COUNT];
        row[0] = x;
        row
    }

    /// Centroids at 0, 10 and 20 on the first axis.
    fn model() -> ClusterModel {
        ClusterModel::from_centroids(vec![at(0.0), at(10.0), at(20.0)])
    }

    fn matrix(ids: &[&str], xs: &[Option<f64>]) -> FeatureMatrix {
        let slots = ids
            .iter()
            .zip(xs)
            .map(|(id, x)| x.map(|x| AudioFeatureVector::from_values(id, at(x))))
            .collect();
        let ids: Vec<String> = ids.iter().map(|s| (*s).to_string()).collect();
        FeatureMatrix::from_slots(slots, &ids)
    }

    #[test]
    fn test_dominant_cluster_ties_pick_lowest() {
        assert_eq!(dominant_cluster(&[2, 2, 1, 1, 0]), Some(1));
        assert_eq!(dominant_cluster(&[3, 3, 3, 0]), Some(3));
        assert_eq!(dominant_cluster(&[4]), Some(4));
        assert_eq!(dominant_cluster(&[]), None);
    }

    #[test]
    fn test_select_matching_keeps_pool_order() {
        let pool = pool(&["A", "B", "C", "D", "E"]);
        let picks = select_matching(&[0, 1, 1, 2, 1], &pool, 1, 5);
        let ids: Vec<_> = picks.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["B", "C", "E"]);
    }

    #[test]
    fn test_select_matching_truncates() {
        let pool = pool(&["A", "B", "C", "D", "E"]);
        let picks = select_matching(&[1, 1, 1, 1, 1], &pool, 1, 2);
        let ids: Vec<_> = picks.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["A", "B"]);
    }

    #[test]
    fn test_recommend_end_to_end() {
        let user = matrix(&["u1", "u2", "u3"], &[Some(9.0), Some(11.0), Some(1.0)]);
        let pool = pool(&["A", "B", "C", "D", "E"]);
        let candidates = matrix(
            &["A", "B", "C", "D", "E"],
            &[Some(0.5), Some(10.5), Some(9.5), Some(19.0), Some(10.0)],
        );

        let picks = recommend(&user, &candidates, &pool, &model(), 5).unwrap();
        let ids: Vec<_> = picks.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["B", "C", "E"]);
    }

    #[test]
    fn test_missing_candidate_features_stay_aligned() {
        let user = matrix(&["u1"], &[Some(20.0)]);
        let pool = pool(&["A", "B", "C", "D"]);
        // B has no features; D must still map to D, not C.
        let candidates = matrix(&["A", "B", "C", "D"], &[Some(0.0), None, Some(10.0), Some(21.0)]);

        let picks = recommend(&user, &candidates, &pool, &model(), 5).unwrap();
        assert_eq!(picks, vec![track("D")]);
    }

    #[test]
    fn test_no_matches_is_empty_not_error() {
        let user = matrix(&["u1"], &[Some(20.0)]);
        let pool = pool(&["A"]);
        let candidates = matrix(&["A"], &[Some(0.0)]);
        let picks = recommend(&user, &candidates, &pool, &model(), 5).unwrap();
        assert!(picks.is_empty());
    }

    #[test]
    fn test_empty_user_matrix_is_error() {
        let user = FeatureMatrix::default();
        let result = recommend(&user, &FeatureMatrix::default(), &[], &model(), 5);
        assert!(matches!(result, Err(RecError::EmptyMatrix { .. })));
    }
}
