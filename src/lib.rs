//! Playlist-driven track recommendations by audio-feature clustering.
//!
//! Core modules:
//! - [`rate_limiter`] - Per-category request quotas over a one-second window
//! - [`paginate`] - Cursor-following collection of paged listings
//! - [`features`] - Batched audio-feature extraction and feature matrices
//! - [`sampler`] - Candidate pool built from random searches
//! - [`kmeans`] - Seeded k-means with k-means++ initialization
//! - [`selector`] - Cluster count selection by elbow detection
//! - [`recommend`] - Dominant-cluster candidate filtering
//! - [`pipeline`] - End-to-end wiring of the above
//! - [`lookup`] - Title and artist search for individual songs
//!
//! ### Supporting Modules
//!
//! - [`catalog`] - Catalog service trait and the offline snapshot backend
//! - [`config`] - Runtime configuration and its file location
//! - [`error`] - Domain error type
//! - [`cli`] - Command-line interface definitions with clap integration
//! - [`completion`] - Shell completion generation
//!
//! ## Quick Start Example
//!
//! ```no_run
//! use rand::SeedableRng;
//! use tunesift::catalog::SnapshotCatalog;
//! use tunesift::config::RuntimeConfig;
//! use tunesift::pipeline::Recommender;
//!
//! let config = RuntimeConfig::load(None)?;
//! let catalog = SnapshotCatalog::load(std::path::Path::new("snapshot.json"))?;
//! let limiter = config.rate_limiter();
//!
//! let recommender = Recommender::new(&catalog, &limiter, &config);
//! let mut rng = rand::rngs::StdRng::seed_from_u64(7);
//! let result = recommender.recommend_for("Evening Mix", &mut rng)?;
//! for track in &result.tracks {
//!     println!("{track}");
//! }
//! # Ok::<(), anyhow::Error>(())
//! ```
//!
//! ## How Recommendations Are Made
//!
//! 1. The playlist's tracks are listed page by page and their audio features
//!    fetched in batches of at most 50.
//! 2. K-means is fit for every cluster count in 2..=10 and the count at the
//!    elbow of the tightness curve is kept.
//! 3. A candidate pool is sampled through short random search queries.
//! 4. Candidates predicted into the cluster holding most of the playlist are
//!    recommended, in discovery order.
//!
//! Every catalog call passes through one shared [`rate_limiter::RateLimiter`]:
//! 5 searches and 10 other requests per second by default.
//!
//! ## Error Handling
//!
//! Domain failures are [`error::RecError`] values; file and setup errors use
//! `anyhow` with context. Some errors carry a short hint for the user, see
//! [`error::RecError::user_hint`].

pub mod catalog;
pub mod cli;
pub mod completion;
pub mod config;
pub mod error;
pub mod features;
pub mod kmeans;
pub mod lookup;
pub mod paginate;
pub mod pipeline;
pub mod rate_limiter;
pub mod recommend;
pub mod sampler;
pub mod selector;
