//! # Catalog Collaborator
//!
//! The recommendation core never talks HTTP itself. Everything it needs from
//! the streaming service goes through [`CatalogApi`]: paged playlist and
//! track listings, batched audio-feature lookups, and keyword search.
//!
//! [`SnapshotCatalog`] implements the trait over a JSON snapshot of a
//! user's library so the whole pipeline can run offline.
//!
//! ## Snapshot Format
//!
//! ```json
//! {
//!   "page_size": 20,
//!   "playlists": [{ "id": "p1", "name": "Evening", "tracks": ["t1", "t2"] }],
//!   "tracks": [{ "id": "t1", "name": "Song", "artists": ["Artist"] }],
//!   "features": { "t1": { "danceability": 0.5, "energy": 0.7, "...": 0.0 } }
//! }
//! ```

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::Path;

/// A track as returned by listing and search calls.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Track {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub artists: Vec<String>,
}

impl Track {
    #[must_use]
    pub fn artist_line(&self) -> String {
        self.artists.join(", ")
    }
}

impl fmt::Display for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.artists.is_empty() {
            f.write_str(&self.name)
        } else {
            write!(f, "{} - {}", self.name, self.artist_line())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Playlist {
    pub id: String,
    pub name: String,
}

/// One page of a listing. `next` is the cursor for the following page.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next: Option<String>,
}

impl<T> Page<T> {
    #[must_use]
    pub fn last(items: Vec<T>) -> Self {
        Self { items, next: None }
    }
}

/// Capabilities the core consumes from the remote catalog.
///
/// Implementations do no throttling of their own; callers acquire quota
/// from a [`RateLimiter`](crate::rate_limiter::RateLimiter) before every call.
pub trait CatalogApi {
    /// A page of the current user's playlists. `None` asks for the first page.
    fn playlists_page(&self, cursor: Option<&str>) -> Result<Page<Playlist>>;

    /// A page of the tracks in `playlist_id`.
    fn playlist_tracks_page(&self, playlist_id: &str, cursor: Option<&str>) -> Result<Page<Track>>;

    /// One raw feature record per requested id, `None` where the service has
    /// nothing for that id.
    fn audio_features(&self, ids: &[String]) -> Result<Vec<Option<Value>>>;

    /// Up to `limit` tracks matching `query`.
    fn search_tracks(&self, query: &str, limit: usize) -> Result<Vec<Track>>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotPlaylist {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub tracks: Vec<String>,
}

/// Serialized form of an offline catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogSnapshot {
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default)]
    pub playlists: Vec<SnapshotPlaylist>,
    #[serde(default)]
    pub tracks: Vec<Track>,
    #[serde(default)]
    pub features: HashMap<String, Value>,
}

fn default_page_size() -> usize {
    20
}

/// Offline [`CatalogApi`] backed by a [`CatalogSnapshot`].
#[derive(Debug, Clone)]
pub struct SnapshotCatalog {
    snapshot: CatalogSnapshot,
    track_index: HashMap<String, usize>,
}

impl SnapshotCatalog {
    #[must_use]
    pub fn from_snapshot(snapshot: CatalogSnapshot) -> Self {
        let track_index = snapshot
            .tracks
            .iter()
            .enumerate()
            .map(|(i, track)| (track.id.clone(), i))
            .collect();
        Self { snapshot, track_index }
    }

    /// Reads a snapshot from a JSON file.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be read or is not a valid snapshot.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read catalog snapshot {}", path.display()))?;
        let snapshot: CatalogSnapshot = serde_json::from_str(&text)
            .with_context(|| format!("Catalog snapshot {} is not valid JSON", path.display()))?;
        if snapshot.page_size == 0 {
            bail!("Catalog snapshot {} has page_size 0", path.display());
        }
        Ok(Self::from_snapshot(snapshot))
    }

    #[must_use]
    pub fn snapshot(&self) -> &CatalogSnapshot {
        &self.snapshot
    }

    fn page_of<T: Clone>(&self, all: &[T], cursor: Option<&str>) -> Result<Page<T>> {
        let start = match cursor {
            None => 0,
            Some(c) => c
                .parse::<usize>()
                .map_err(|_| anyhow!("Malformed page cursor '{c}'"))?,
        };
        let end = start.saturating_add(self.snapshot.page_size.max(1)).min(all.len());
        let items = all.get(start..end).map(<[T]>::to_vec).unwrap_or_default();
        let next = (end < all.len()).then(|| end.to_string());
        Ok(Page { items, next })
    }

    fn track(&self, id: &str) -> Option<&Track> {
        self.track_index.get(id).map(|&i| &self.snapshot.tracks[i])
    }
}

impl CatalogApi for SnapshotCatalog {
    fn playlists_page(&self, cursor: Option<&str>) -> Result<Page<Playlist>> {
        let playlists: Vec<Playlist> = self
            .snapshot
            .playlists
            .iter()
            .map(|p| Playlist {
                id: p.id.clone(),
                name: p.name.clone(),
            })
            .collect();
        self.page_of(&playlists, cursor)
    }

    fn playlist_tracks_page(&self, playlist_id: &str, cursor: Option<&str>) -> Result<Page<Track>> {
        let playlist = self
            .snapshot
            .playlists
            .iter()
            .find(|p| p.id == playlist_id)
            .ok_or_else(|| anyhow!("Unknown playlist id '{playlist_id}'"))?;

        let ids = self.page_of(&playlist.tracks, cursor)?;
        let items = ids
            .items
            .iter()
            .map(|id| {
                self.track(id)
                    .cloned()
                    .ok_or_else(|| anyhow!("Playlist '{}' references unknown track '{id}'", playlist.name))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Page { items, next: ids.next })
    }

    fn audio_features(&self, ids: &[String]) -> Result<Vec<Option<Value>>> {
        Ok(ids
            .iter()
            .map(|id| match self.snapshot.features.get(id) {
                Some(Value::Null) | None => None,
                Some(record) => Some(record.clone()),
            })
            .collect())
    }

    /// Deterministic stand-in for a search engine.
    ///
    /// Queries carrying `track:` or `artist:` filters return the tracks whose
    /// name or artists contain the filter text, ignoring case, in catalog
    /// order. Any other query picks an offset into the track list and
    /// results wrap around from there.
    fn search_tracks(&self, query: &str, limit: usize) -> Result<Vec<Track>> {
        let tracks = &self.snapshot.tracks;
        if tracks.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let title = field_filter(query, "track").map(str::to_lowercase);
        let artist = field_filter(query, "artist").map(str::to_lowercase);
        if title.is_some() || artist.is_some() {
            return Ok(tracks
                .iter()
                .filter(|t| title.as_ref().map_or(true, |title| t.name.to_lowercase().contains(title)))
                .filter(|t| {
                    artist
                        .as_ref()
                        .map_or(true, |artist| t.artists.iter().any(|a| a.to_lowercase().contains(artist)))
                })
                .take(limit)
                .cloned()
                .collect());
        }

        let offset = usize::try_from(fnv1a(query) % tracks.len() as u64).unwrap_or(0);
        Ok(tracks
            .iter()
            .cycle()
            .skip(offset)
            .take(limit.min(tracks.len()))
            .cloned()
            .collect())
    }
}

const FIELD_TAGS: [&str; 2] = ["track:", "artist:"];

/// Text following `field:` in a search query, up to the next field tag.
fn field_filter<'q>(query: &'q str, field: &str) -> Option<&'q str> {
    let tag = format!("{field}:");
    let rest = &query[query.find(&tag)? + tag.len()..];
    let end = FIELD_TAGS
        .iter()
        .filter_map(|t| rest.find(t))
        .min()
        .unwrap_or(rest.len());
    Some(rest[..end].trim()).filter(|value| !value.is_empty())
}

fn fnv1a(text: &str) -> u64 {
    text.bytes()
        .fold(0xcbf2_9ce4_8422_2325, |hash, byte| {
            (hash ^ u64::from(byte)).wrapping_mul(0x0000_0100_0000_01b3)
        })
}
