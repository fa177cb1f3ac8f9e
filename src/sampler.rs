//! Candidate pool sampling through randomized search.
//!
//! The catalog has no "random track" call, so the pool is built by firing
//! short random alphanumeric queries at search and keeping every result not
//! seen before. This is not a uniform sample of the catalog: it leans
//! towards whatever the search engine ranks highly for short, meaningless
//! strings. That bias is accepted; the pool only needs to be varied.

use log::{debug, warn};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::catalog::{CatalogApi, Track};
use crate::error::{RecError, Result};
use crate::rate_limiter::{RateLimiter, RequestCategory};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    /// Characters per random query.
    pub query_length: usize,
    /// Results requested per query.
    pub page_size: usize,
    /// Queries to try before settling for a partial pool.
    pub max_queries: usize,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            query_length: 2,
            page_size: 10,
            max_queries: 200,
        }
    }
}

/// De-duplicated candidate tracks in discovery order.
#[derive(Debug, Clone, Default)]
pub struct SamplePool {
    pub tracks: Vec<Track>,
    pub ids: HashSet<String>,
    /// Search calls spent building the pool.
    pub queries: usize,
}

impl SamplePool {
    #[must_use]
    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    #[must_use]
    pub fn track_ids(&self) -> Vec<String> {
        self.tracks.iter().map(|t| t.id.clone()).collect()
    }
}

#[must_use]
pub fn random_query<R: Rng>(rng: &mut R, length: usize) -> String {
    (0..length.max(1))
        .map(|_| char::from(rng.sample(Alphanumeric)))
        .collect()
}

/// Grows a pool of at least `target` distinct tracks, skipping any id in
/// `exclude`. Whole result pages are kept, so the pool may end up slightly
/// larger than `target`.
///
/// If `config.max_queries` runs out first, the partial pool is returned
/// with a warning.
///
/// # Errors
///
/// - [`RecError::PageFetchFailure`] when a search call fails
/// - [`RecError::EmptyCandidatePool`] when no query produced a usable track
pub fn sample_tracks<R: Rng>(
    api: &dyn CatalogApi,
    limiter: &RateLimiter,
    target: usize,
    exclude: &HashSet<String>,
    config: &SamplerConfig,
    rng: &mut R,
) -> Result<SamplePool> {
    let mut pool = SamplePool::default();

    while pool.len() < target && pool.queries < config.max_queries {
        let query = random_query(rng, config.query_length);
        pool.queries += 1;

        limiter.try_acquire(RequestCategory::Search)?;
        let results = api
            .search_tracks(&query, config.page_size)
            .map_err(|source| RecError::PageFetchFailure {
                category: RequestCategory::Search,
                page: pool.queries,
                source,
            })?;

        let before = pool.len();
        for track in results {
            if exclude.contains(&track.id) {
                continue;
            }
            if pool.ids.insert(track.id.clone()) {
                pool.tracks.push(track);
            }
        }
        debug!("Query '{query}' added {} new tracks ({}/{target})", pool.len() - before, pool.len());
    }

    if pool.len() < target {
        if pool.is_empty() {
            return Err(RecError::EmptyCandidatePool {
                attempts: pool.queries,
            });
        }
        warn!(
            "Candidate pool stopped at {}/{target} tracks after {} queries",
            pool.len(),
            pool.queries
        );
    }

    Ok(pool)
}
