//! # Audio Features
//!
//! Turns track ids into fixed-schema numeric vectors and assembles them into
//! the matrices the clustering code consumes.
//!
//! Raw feature records arrive as schema-less JSON. They are validated here,
//! at the ingestion boundary, into [`AudioFeatureVector`]; downstream code
//! only ever sees the typed form.
//!
//! ## Missing Features
//!
//! The service answers unknown ids with an empty slot. [`FeatureMatrix`]
//! drops those rows but remembers, for every row it keeps, which input slot
//! the row came from, so rows can always be mapped back to the tracks that
//! produced them.

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::catalog::CatalogApi;
use crate::error::{RecError, Result};
use crate::rate_limiter::{RateLimiter, RequestCategory};

pub const FEATURE_COUNT: usize = 11;

/// Field names in vector order.
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "danceability",
    "energy",
    "key",
    "loudness",
    "mode",
    "speechiness",
    "acousticness",
    "instrumentalness",
    "liveness",
    "valence",
    "tempo",
];

/// Largest batch the features endpoint accepts.
pub const DEFAULT_CHUNK_SIZE: usize = 50;

/// One point in feature space.
pub type FeatureRow = [f64; FEATURE_COUNT];

/// Audio features of a single track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioFeatureVector {
    pub id: String,
    pub danceability: f64,
    pub energy: f64,
    pub key: f64,
    pub loudness: f64,
    pub mode: f64,
    pub speechiness: f64,
    pub acousticness: f64,
    pub instrumentalness: f64,
    pub liveness: f64,
    pub valence: f64,
    pub tempo: f64,
}

impl AudioFeatureVector {
    /// Validates a raw record. Every one of [`FEATURE_NAMES`] must be present
    /// and numeric; extra fields are ignored.
    ///
    /// # Errors
    ///
    /// [`RecError::InvalidFeatureRecord`] naming the first bad field.
    pub fn from_record(id: &str, record: &Value) -> Result<Self> {
        let mut values = [0.0; FEATURE_COUNT];
        for (slot, field) in values.iter_mut().zip(FEATURE_NAMES) {
            *slot = record
                .get(field)
                .and_then(Value::as_f64)
                .filter(|v| v.is_finite())
                .ok_or_else(|| RecError::InvalidFeatureRecord {
                    id: id.to_string(),
                    field,
                })?;
        }
        Ok(Self::from_values(id, values))
    }

    #[must_use]
    pub fn from_values(id: &str, values: FeatureRow) -> Self {
        let [danceability, energy, key, loudness, mode, speechiness, acousticness, instrumentalness, liveness, valence, tempo] =
            values;
        Self {
            id: id.to_string(),
            danceability,
            energy,
            key,
            loudness,
            mode,
            speechiness,
            acousticness,
            instrumentalness,
            liveness,
            valence,
            tempo,
        }
    }

    #[must_use]
    pub fn values(&self) -> FeatureRow {
        [
            self.danceability,
            self.energy,
            self.key,
            self.loudness,
            self.mode,
            self.speechiness,
            self.acousticness,
            self.instrumentalness,
            self.liveness,
            self.valence,
            self.tempo,
        ]
    }
}

/// Fetches features for `ids` in batches of at most `chunk_size`, one quota
/// acquisition per batch. The result has one slot per input id, in input
/// order; `None` marks ids the service has no features for.
///
/// # Errors
///
/// - [`RecError::InvalidConfig`] for a zero chunk size
/// - [`RecError::PageFetchFailure`] when a batch call fails
/// - [`RecError::FeatureCountMismatch`] when a batch answer has the wrong length
/// - [`RecError::InvalidFeatureRecord`] for malformed records
pub fn extract_features(
    api: &dyn CatalogApi,
    limiter: &RateLimiter,
    ids: &[String],
    chunk_size: usize,
) -> Result<Vec<Option<AudioFeatureVector>>> {
    if chunk_size == 0 {
        return Err(RecError::InvalidConfig("feature chunk size must be positive".into()));
    }

    let mut slots = Vec::with_capacity(ids.len());
    for (batch, chunk) in ids.chunks(chunk_size).enumerate() {
        limiter.try_acquire(RequestCategory::Other)?;
        let records = api
            .audio_features(chunk)
            .map_err(|source| RecError::PageFetchFailure {
                category: RequestCategory::Other,
                page: batch + 1,
                source,
            })?;

        if records.len() != chunk.len() {
            return Err(RecError::FeatureCountMismatch {
                requested: chunk.len(),
                returned: records.len(),
            });
        }

        for (id, record) in chunk.iter().zip(records) {
            slots.push(
                record
                    .map(|r| AudioFeatureVector::from_record(id, &r))
                    .transpose()?,
            );
        }
    }

    debug!(
        "Extracted features for {}/{} tracks",
        slots.iter().filter(|s| s.is_some()).count(),
        ids.len()
    );
    Ok(slots)
}

/// Rows of feature vectors, each tied back to the slot it came from.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureMatrix {
    ids: Vec<String>,
    rows: Vec<FeatureRow>,
    source_index: Vec<usize>,
    missing: Vec<String>,
}

impl FeatureMatrix {
    /// Builds a matrix from extractor output, skipping empty slots.
    #[must_use]
    pub fn from_slots(slots: Vec<Option<AudioFeatureVector>>, ids: &[String]) -> Self {
        let mut matrix = Self::default();
        for (i, slot) in slots.into_iter().enumerate() {
            match slot {
                Some(vector) => {
                    matrix.rows.push(vector.values());
                    matrix.ids.push(vector.id);
                    matrix.source_index.push(i);
                }
                None => {
                    let id = ids.get(i).cloned().unwrap_or_else(|| format!("#{i}"));
                    matrix.missing.push(id);
                }
            }
        }

        if !matrix.missing.is_empty() {
            warn!(
                "Dropped {} tracks without audio features: {}",
                matrix.missing.len(),
                matrix.missing.join(", ")
            );
        }
        matrix
    }

    /// Like [`from_slots`](Self::from_slots) but refuses any gap.
    ///
    /// # Errors
    ///
    /// [`RecError::MissingFeatureVector`] for the first empty slot.
    pub fn strict(slots: Vec<Option<AudioFeatureVector>>, ids: &[String]) -> Result<Self> {
        if let Some(i) = slots.iter().position(Option::is_none) {
            let id = ids.get(i).cloned().unwrap_or_else(|| format!("#{i}"));
            return Err(RecError::MissingFeatureVector { id });
        }
        Ok(Self::from_slots(slots, ids))
    }

    #[must_use]
    pub fn from_vectors(vectors: Vec<AudioFeatureVector>) -> Self {
        Self::from_slots(vectors.into_iter().map(Some).collect(), &[])
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    #[must_use]
    pub fn rows(&self) -> &[FeatureRow] {
        &self.rows
    }

    #[must_use]
    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    /// Input slot that row `row` was built from.
    #[must_use]
    pub fn source_index(&self, row: usize) -> Option<usize> {
        self.source_index.get(row).copied()
    }

    /// Ids whose slots were empty.
    #[must_use]
    pub fn missing(&self) -> &[String] {
        &self.missing
    }
}
