//! # Track Lookup
//!
//! Resolves songs typed by a person, a title with an optional artist, into
//! catalog tracks through field-filtered search.
//!
//! ## Input Format
//!
//! Several songs go on one line, separated by semicolons. Each song is a
//! title, optionally followed by a comma and the artist:
//!
//! ```text
//! Hey Jude, The Beatles; Clair de Lune; Teardrop, Massive Attack
//! ```

use log::{debug, warn};

use crate::catalog::{CatalogApi, Track};
use crate::error::{RecError, Result};
use crate::rate_limiter::{RateLimiter, RequestCategory};

/// One requested song.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SongQuery {
    pub title: String,
    pub artist: Option<String>,
}

impl SongQuery {
    #[must_use]
    pub fn new(title: &str, artist: Option<&str>) -> Self {
        Self {
            title: title.trim().to_string(),
            artist: artist.map(str::trim).filter(|a| !a.is_empty()).map(str::to_string),
        }
    }

    /// Search string restricting the title field and, when known, the
    /// artist field.
    #[must_use]
    pub fn search_query(&self) -> String {
        match &self.artist {
            Some(artist) => format!("track:{} artist:{artist}", self.title),
            None => format!("track:{}", self.title),
        }
    }
}

/// Parses `title, artist; title; ...` into song queries.
///
/// Only the first comma of an entry separates title from artist, so an
/// artist name may itself contain commas. Entries without a title are
/// skipped.
#[must_use]
pub fn parse_song_list(input: &str) -> Vec<SongQuery> {
    input
        .split(';')
        .filter_map(|entry| {
            let (title, artist) = match entry.split_once(',') {
                Some((title, artist)) => (title, Some(artist)),
                None => (entry, None),
            };
            let song = SongQuery::new(title, artist);
            (!song.title.is_empty()).then_some(song)
        })
        .collect()
}

/// Finds the best catalog match for `song`.
///
/// Costs exactly one `search` quota acquisition and asks the catalog for a
/// single result.
///
/// # Returns
///
/// * `Ok(Some(track))` - The top search hit
/// * `Ok(None)` - Nothing matched; a warning is logged
///
/// # Errors
///
/// - [`RecError::QuotaWaitTimeout`] when the limiter refuses the wait
/// - [`RecError::PageFetchFailure`] when the search call fails
///
/// # Examples
///
/// ```no_run
/// use tunesift::catalog::SnapshotCatalog;
/// use tunesift::config::RuntimeConfig;
/// use tunesift::lookup::{lookup_track, SongQuery};
///
/// let catalog = SnapshotCatalog::load(std::path::Path::new("snapshot.json"))?;
/// let limiter = RuntimeConfig::default().rate_limiter();
///
/// let song = SongQuery::new("Teardrop", Some("Massive Attack"));
/// if let Some(track) = lookup_track(&catalog, &limiter, &song)? {
///     println!("{} is {track}", track.id);
/// }
/// # Ok::<(), anyhow::Error>(())
/// ```
///
/// # Design Notes
///
/// - A miss is not an error, so one unknown song does not abort a batch
/// - Search failures keep their cause as the error source
pub fn lookup_track(api: &dyn CatalogApi, limiter: &RateLimiter, song: &SongQuery) -> Result<Option<Track>> {
    let query = song.search_query();
    limiter.try_acquire(RequestCategory::Search)?;
    let hits = api
        .search_tracks(&query, 1)
        .map_err(|source| RecError::PageFetchFailure {
            category: RequestCategory::Search,
            page: 1,
            source,
        })?;

    let found = hits.into_iter().next();
    match &found {
        Some(track) => debug!("'{query}' resolved to {}", track.id),
        None => warn!("Track not found for {}", song.title),
    }
    Ok(found)
}
