//! # Recommendation Pipeline
//!
//! Wires the pieces together in data-flow order:
//!
//! ```text
//! playlist tracks ──> features ──> model selection ──┐
//!                                                    ├──> filter ──> picks
//! random search ───> features ───────────────────────┘
//! ```
//!
//! Every remote call goes through the one [`RateLimiter`] the pipeline was
//! built with. Any fetch or clustering failure aborts the run; there are no
//! partial recommendations.

use log::info;
use rand::Rng;
use std::collections::HashSet;

use crate::catalog::{CatalogApi, Playlist, Track};
use crate::config::RuntimeConfig;
use crate::error::{RecError, Result};
use crate::features::{extract_features, FeatureMatrix};
use crate::paginate::{fetch_playlist_tracks, fetch_playlists};
use crate::rate_limiter::RateLimiter;
use crate::recommend::recommend;
use crate::sampler::sample_tracks;
use crate::selector::select_model;

/// Outcome of one pipeline run.
#[derive(Debug, Clone)]
pub struct Recommendation {
    pub playlist: Playlist,
    pub tracks: Vec<Track>,
    /// Chosen cluster count.
    pub k: usize,
    /// `(k, tightness)` for every count tried.
    pub scores: Vec<(usize, f64)>,
    pub pool_size: usize,
    /// Playlist tracks left out of training for lack of features.
    pub skipped_user_tracks: usize,
}

/// Runs recommendation requests against one catalog session.
pub struct Recommender<'a> {
    api: &'a dyn CatalogApi,
    limiter: &'a RateLimiter,
    config: &'a RuntimeConfig,
}

impl<'a> Recommender<'a> {
    /// Creates a recommender over borrowed collaborators.
    ///
    /// # Returns
    ///
    /// A `Recommender` that issues every remote call through `limiter`.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use tunesift::catalog::SnapshotCatalog;
    /// use tunesift::config::RuntimeConfig;
    /// use tunesift::pipeline::Recommender;
    ///
    /// let catalog = SnapshotCatalog::load(std::path::Path::new("snapshot.json"))?;
    /// let config = RuntimeConfig::load(None)?;
    /// let limiter = config.rate_limiter();
    ///
    /// let recommender = Recommender::new(&catalog, &limiter, &config);
    /// for name in recommender.playlist_names()? {
    ///     println!("{name}");
    /// }
    /// # Ok::<(), anyhow::Error>(())
    /// ```
    ///
    /// # Design Notes
    ///
    /// - Nothing is owned, so one limiter can throttle several recommenders
    ///   sharing a catalog session
    /// - Construction does no I/O
    #[must_use]
    pub fn new(api: &'a dyn CatalogApi, limiter: &'a RateLimiter, config: &'a RuntimeConfig) -> Self {
        Self { api, limiter, config }
    }

    /// Names of the user's playlists, in service order.
    ///
    /// # Errors
    ///
    /// Propagates [`RecError::PageFetchFailure`].
    pub fn playlist_names(&self) -> Result<Vec<String>> {
        Ok(fetch_playlists(self.api, self.limiter)?
            .into_iter()
            .map(|p| p.name)
            .collect())
    }

    /// Finds a playlist by exact name, falling back to a case-insensitive
    /// match.
    ///
    /// # Errors
    ///
    /// [`RecError::PlaylistNotFound`] when nothing matches.
    pub fn find_playlist(&self, name: &str) -> Result<Playlist> {
        let playlists = fetch_playlists(self.api, self.limiter)?;
        let exact = playlists.iter().position(|p| p.name == name);
        let loose = || playlists.iter().position(|p| p.name.eq_ignore_ascii_case(name));

        exact
            .or_else(loose)
            .map(|i| playlists[i].clone())
            .ok_or_else(|| RecError::PlaylistNotFound { name: name.to_string() })
    }

    /// Fetches features for `tracks` and builds a matrix from the ones that
    /// have them.
    ///
    /// # Errors
    ///
    /// See [`extract_features`].
    pub fn feature_matrix(&self, tracks: &[Track]) -> Result<FeatureMatrix> {
        let ids: Vec<String> = tracks.iter().map(|t| t.id.clone()).collect();
        let slots = extract_features(self.api, self.limiter, &ids, self.config.chunk_size)?;
        Ok(FeatureMatrix::from_slots(slots, &ids))
    }

    /// Runs the whole pipeline for the playlist called `playlist_name`.
    ///
    /// `rng` drives the candidate sampling only; clustering is seeded from
    /// the config.
    ///
    /// # Returns
    ///
    /// * `Ok(Recommendation)` - Up to `recommendation_count` picks plus the
    ///   model selection scores. The pick list may be empty when no
    ///   candidate landed in the dominant cluster.
    /// * `Err(RecError)` - The first failure of any stage
    ///
    /// # Errors
    ///
    /// This function will return an error if:
    /// - No playlist matches `playlist_name` ([`RecError::PlaylistNotFound`])
    /// - A listing, search or feature call fails ([`RecError::PageFetchFailure`])
    /// - The playlist has fewer featured tracks than the largest cluster
    ///   count tried ([`RecError::InsufficientData`])
    /// - The tightness curve has no elbow ([`RecError::NoElbowDetected`])
    /// - Sampling finds no candidates ([`RecError::EmptyCandidatePool`])
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use rand::rngs::StdRng;
    /// use rand::SeedableRng;
    /// use tunesift::catalog::SnapshotCatalog;
    /// use tunesift::config::RuntimeConfig;
    /// use tunesift::pipeline::Recommender;
    ///
    /// let catalog = SnapshotCatalog::load(std::path::Path::new("snapshot.json"))?;
    /// let config = RuntimeConfig::default();
    /// let limiter = config.rate_limiter();
    /// let recommender = Recommender::new(&catalog, &limiter, &config);
    ///
    /// let result = recommender.recommend_for("Evening Mix", &mut StdRng::seed_from_u64(7))?;
    /// for track in &result.tracks {
    ///     println!("{track}");
    /// }
    /// # Ok::<(), anyhow::Error>(())
    /// ```
    pub fn recommend_for<R: Rng>(&self, playlist_name: &str, rng: &mut R) -> Result<Recommendation> {
        let playlist = self.find_playlist(playlist_name)?;
        let user_tracks = fetch_playlist_tracks(self.api, self.limiter, &playlist.id)?;
        info!("Playlist '{}' has {} tracks", playlist.name, user_tracks.len());

        let user = self.feature_matrix(&user_tracks)?;
        let selection = select_model(user.rows(), self.config.k_range, &self.config.kmeans)?;

        let exclude: HashSet<String> = if self.config.exclude_known {
            user_tracks.iter().map(|t| t.id.clone()).collect()
        } else {
            HashSet::new()
        };
        let pool = sample_tracks(
            self.api,
            self.limiter,
            self.config.pool_size,
            &exclude,
            &self.config.sampler,
            rng,
        )?;
        info!("Sampled {} candidates in {} searches", pool.len(), pool.queries);

        let candidates = self.feature_matrix(&pool.tracks)?;
        let tracks = recommend(
            &user,
            &candidates,
            &pool.tracks,
            &selection.model,
            self.config.recommendation_count,
        )?;

        Ok(Recommendation {
            playlist,
            tracks,
            k: selection.k,
            scores: selection.scores,
            pool_size: pool.len(),
            skipped_user_tracks: user.missing().len(),
        })
    }
}
