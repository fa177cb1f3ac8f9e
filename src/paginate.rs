//! Throttled pagination over cursor-based listings.
//!
//! Every page costs exactly one quota acquisition, taken immediately before
//! the call. Items come back in server order across pages. A failing page
//! aborts the whole listing; nothing fetched before it is returned.

use anyhow::anyhow;
use log::{debug, trace};
use std::collections::HashSet;

use crate::catalog::{CatalogApi, Page, Playlist, Track};
use crate::error::{RecError, Result};
use crate::rate_limiter::{RateLimiter, RequestCategory};

/// Fetches every page of a listing and concatenates the items.
///
/// `first` fetches page one; `next` is called with each cursor until a page
/// arrives without one.
///
/// # Errors
///
/// Returns [`RecError::PageFetchFailure`] for the first page that fails, or
/// when the server hands back a cursor it has already handed out. A listing
/// that cycles back to an earlier page would otherwise never end.
pub fn fetch_all<T, F, N>(
    limiter: &RateLimiter,
    category: RequestCategory,
    first: F,
    mut next: N,
) -> Result<Vec<T>>
where
    F: FnOnce() -> anyhow::Result<Page<T>>,
    N: FnMut(&str) -> anyhow::Result<Page<T>>,
{
    let page_failure = |page: usize, source: anyhow::Error| RecError::PageFetchFailure {
        category,
        page,
        source,
    };

    limiter.try_acquire(category)?;
    let Page { mut items, next: mut cursor } = first().map_err(|e| page_failure(1, e))?;
    let mut seen: HashSet<String> = cursor.iter().cloned().collect();
    let mut pages = 1;

    while let Some(current) = cursor {
        pages += 1;
        trace!("Fetching {category} page {pages} (cursor {current})");
        limiter.try_acquire(category)?;
        let page = next(&current).map_err(|e| page_failure(pages, e))?;

        if let Some(upcoming) = &page.next {
            if !seen.insert(upcoming.clone()) {
                return Err(page_failure(pages, anyhow!("cursor '{upcoming}' was already visited")));
            }
        }

        items.extend(page.items);
        cursor = page.next;
    }

    debug!("Fetched {} items over {pages} {category} pages", items.len());
    Ok(items)
}

/// All of the user's playlists, in the order the service lists them.
///
/// # Errors
///
/// See [`fetch_all`].
pub fn fetch_playlists(api: &dyn CatalogApi, limiter: &RateLimiter) -> Result<Vec<Playlist>> {
    fetch_all(
        limiter,
        RequestCategory::Other,
        || api.playlists_page(None),
        |cursor| api.playlists_page(Some(cursor)),
    )
}

/// Every track of one playlist, in playlist order.
///
/// # Errors
///
/// See [`fetch_all`].
pub fn fetch_playlist_tracks(
    api: &dyn CatalogApi,
    limiter: &RateLimiter,
    playlist_id: &str,
) -> Result<Vec<Track>> {
    fetch_all(
        limiter,
        RequestCategory::Other,
        || api.playlist_tracks_page(playlist_id, None),
        |cursor| api.playlist_tracks_page(playlist_id, Some(cursor)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate_limiter::{ManualClock, Quotas, WindowMode};
    use std::sync::Arc;

    fn limiter() -> RateLimiter {
        RateLimiter::with_clock(Quotas::default(), WindowMode::Shared, Arc::new(ManualClock::new()))
    }

    /// Serves pages in order, using the page index as cursor.
    struct Pager(Vec<Vec<u32>>);

    impl Pager {
        fn page(&self, cursor: Option<&str>) -> anyhow::Result<Page<u32>> {
            let idx: usize = cursor.map_or(Ok(0), str::parse::<usize>)?;
            let next = (idx + 1 < self.0.len()).then(|| (idx + 1).to_string());
            Ok(Page {
                items: self.0[idx].clone(),
                next,
            })
        }
    }

    #[test]
    fn test_pages_concatenate_in_order() {
        let limiter = limiter();
        let serve = Pager(vec![vec![1, 2, 3], vec![4], vec![5, 6]]);

        let items = fetch_all(
            &limiter,
            RequestCategory::Other,
            || serve.page(None),
            |c| serve.page(Some(c)),
        )
        .unwrap();

        assert_eq!(items, vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(limiter.count(RequestCategory::Other), 3);
    }

    #[test]
    fn test_single_page_without_cursor() {
        let limiter = limiter();
        let mut next_calls = 0;

        let items = fetch_all(
            &limiter,
            RequestCategory::Search,
            || Ok(Page::last(vec!["a", "b"])),
            |_| {
                next_calls += 1;
                Ok(Page::last(vec![]))
            },
        )
        .unwrap();

        assert_eq!(items, vec!["a", "b"]);
        assert_eq!(next_calls, 0);
        assert_eq!(limiter.count(RequestCategory::Search), 1);
    }

    #[test]
    fn test_failed_page_discards_everything() {
        let limiter = limiter();

        let result: Result<Vec<u32>> = fetch_all(
            &limiter,
            RequestCategory::Other,
            || {
                Ok(Page {
                    items: vec![1, 2],
                    next: Some("2".into()),
                })
            },
            |_| Err(anyhow!("401 unauthorized")),
        );

        match result {
            Err(RecError::PageFetchFailure { page, category, .. }) => {
                assert_eq!(page, 2);
                assert_eq!(category, RequestCategory::Other);
            }
            other => panic!("expected page failure, got {other:?}"),
        }
    }

    #[test]
    fn test_stuck_cursor_is_rejected() {
        let limiter = limiter();

        let result: Result<Vec<u32>> = fetch_all(
            &limiter,
            RequestCategory::Other,
            || {
                Ok(Page {
                    items: vec![1],
                    next: Some("same".into()),
                })
            },
            |_| {
                Ok(Page {
                    items: vec![2],
                    next: Some("same".into()),
                })
            },
        );

        assert!(matches!(result, Err(RecError::PageFetchFailure { page: 2, .. })));
    }

    #[test]
    fn test_cursor_cycle_is_rejected() {
        let limiter = limiter();
        let mut fetched = Vec::new();

        // a -> b -> a
        let result: Result<Vec<u32>> = fetch_all(
            &limiter,
            RequestCategory::Other,
            || {
                Ok(Page {
                    items: vec![1],
                    next: Some("a".into()),
                })
            },
            |cursor| {
                fetched.push(cursor.to_string());
                let next = if cursor == "a" { "b" } else { "a" };
                Ok(Page {
                    items: vec![2],
                    next: Some(next.into()),
                })
            },
        );

        assert!(matches!(result, Err(RecError::PageFetchFailure { page: 3, .. })));
        assert_eq!(fetched, vec!["a", "b"]);
        assert_eq!(limiter.count(RequestCategory::Other), 3);
    }

    #[test]
    fn test_many_pages_pass_through_limiter() {
        let clock = Arc::new(ManualClock::new());
        let limiter = RateLimiter::with_clock(Quotas::default(), WindowMode::Shared, clock.clone());
        let pages: Vec<Vec<u32>> = (0..25).map(|i| vec![i]).collect();
        let serve = Pager(pages);

        let items = fetch_all(
            &limiter,
            RequestCategory::Other,
            || serve.page(None),
            |c| serve.page(Some(c)),
        )
        .unwrap();

        assert_eq!(items.len(), 25);
        // 25 requests at 10/s on a frozen clock: two forced waits.
        assert_eq!(clock.sleeps().len(), 2);
    }
}
