//! # Error Types
//!
//! Every failure the recommendation core can report, as one typed enum.
//! Fetch-layer errors keep the collaborator's `anyhow::Error` as their source
//! so the full chain is available to whoever prints it.

use std::time::Duration;
use thiserror::Error;

use crate::rate_limiter::RequestCategory;

/// Result alias used throughout the library.
pub type Result<T, E = RecError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum RecError {
    /// A bounded quota wait would have exceeded its limit.
    #[error("waiting for the {category} quota would take {needed:?}, limit is {limit:?}")]
    QuotaWaitTimeout {
        category: RequestCategory,
        needed: Duration,
        limit: Duration,
    },

    /// A remote page could not be fetched. Items gathered before it are discarded.
    #[error("failed to fetch {category} page {page}")]
    PageFetchFailure {
        category: RequestCategory,
        page: usize,
        #[source]
        source: anyhow::Error,
    },

    /// A track has no audio feature record.
    #[error("no audio features available for track {id}")]
    MissingFeatureVector { id: String },

    /// A feature record is present but a field is absent or not numeric.
    #[error("feature record for track {id} has a missing or non-numeric `{field}`")]
    InvalidFeatureRecord { id: String, field: &'static str },

    /// The remote batch call did not return one slot per requested id.
    #[error("requested features for {requested} tracks but received {returned} slots")]
    FeatureCountMismatch { requested: usize, returned: usize },

    /// The score curve has no usable elbow.
    #[error("no elbow detected in the cluster score curve: {reason}")]
    NoElbowDetected { reason: String },

    /// Not enough rows to fit the requested cluster counts.
    #[error("need at least {needed} tracks with audio features, found {rows}")]
    InsufficientData { rows: usize, needed: usize },

    /// The sampler could not find a single candidate track.
    #[error("random sampling produced no candidate tracks after {attempts} queries")]
    EmptyCandidatePool { attempts: usize },

    #[error("cannot work with an empty {what}")]
    EmptyMatrix { what: &'static str },

    #[error("no playlist named '{name}'")]
    PlaylistNotFound { name: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl RecError {
    /// Short hint for the person running the tool, when there is one.
    #[must_use]
    pub fn user_hint(&self) -> Option<&'static str> {
        match self {
            Self::InsufficientData { .. } => Some("try a larger playlist"),
            Self::NoElbowDetected { .. } => Some("insufficient variation in data"),
            Self::EmptyCandidatePool { .. } => Some("the catalog returned no search results, try again later"),
            Self::PageFetchFailure { .. } => Some("check network access and credentials"),
            _ => None,
        }
    }
}
