//! CM server directory resolver (spec §4.3), grounded on `crates/auth/src/
//! main.rs` for bare `reqwest::Client` usage against a JSON HTTPS API and on
//! `crates/network/client/src/discovery.rs` for the cache/refresh task
//! shape. Backed by `GetCMList`, cached for 30 minutes per cell id, with
//! concurrent callers for the same cell id coalescing onto one in-flight
//! request.

use std::{collections::HashMap, sync::Arc, time::Duration};

use serde::Deserialize;
use steambot_core::{CancelToken, Cancelled, RateLimiter};
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

const DIRECTORY_URL: &str = "https://api.steampowered.com/ISteamDirectory/GetCMList/v1/";
const CACHE_TTL: Duration = Duration::from_secs(30 * 60);
/// spec.md §5: "the directory HTTP has an implicit per-request deadline via
/// the rate limiter (5 s between requests of a given queue)".
const MIN_REQUEST_SPACING: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("directory request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("operation cancelled")]
    Cancelled,
}

impl From<Cancelled> for DirectoryError {
    fn from(_: Cancelled) -> Self {
        DirectoryError::Cancelled
    }
}

#[derive(Debug, Deserialize)]
struct DirectoryResponseEnvelope {
    response: DirectoryResponseBody,
}

#[derive(Debug, Deserialize)]
struct DirectoryResponseBody {
    #[serde(default)]
    serverlist: Vec<String>,
}

/// A resolved, still-fresh CM endpoint list.
#[derive(Debug, Clone)]
pub struct CmList {
    pub serverlist: Vec<String>,
    pub timestamp: Instant,
}

struct CacheEntry {
    list: Option<CmList>,
}

/// Client for Steam's `GetCMList` endpoint. One instance is shared by every
/// account thread; the per-cell-id mutex both coalesces concurrent requests
/// and enforces the cache TTL.
pub struct Directory {
    http: reqwest::Client,
    rate_limit: RateLimiter,
    cells: Mutex<HashMap<u32, Arc<Mutex<CacheEntry>>>>,
}

impl Directory {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
            rate_limit: RateLimiter::new(MIN_REQUEST_SPACING),
            cells: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the cached list for `cell_id` if still fresh, otherwise
    /// fetches a new one. Concurrent calls for the same `cell_id` share the
    /// same fetch: the second caller blocks on the first's in-flight
    /// request rather than issuing a duplicate one.
    pub async fn get_cm_list(&self, cell_id: u32, cancel: &CancelToken) -> Result<CmList, DirectoryError> {
        let slot = {
            let mut cells = cancel.race(self.cells.lock()).await?;
            cells
                .entry(cell_id)
                .or_insert_with(|| Arc::new(Mutex::new(CacheEntry { list: None })))
                .clone()
        };

        let mut entry = cancel.race(slot.lock()).await?;
        if let Some(list) = &entry.list {
            if list.timestamp.elapsed() < CACHE_TTL {
                debug!(target: "steambot::directory", cell_id, "serving cached CM list");
                return Ok(list.clone());
            }
        }

        let fetched = self
            .rate_limit
            .limit(cancel, || self.fetch(cell_id))
            .await??;
        entry.list = Some(fetched.clone());
        Ok(fetched)
    }

    async fn fetch(&self, cell_id: u32) -> Result<CmList, DirectoryError> {
        debug!(target: "steambot::directory", cell_id, "fetching CM list");
        let response = self
            .http
            .get(DIRECTORY_URL)
            .query(&[("cellid", cell_id)])
            .send()
            .await?
            .error_for_status()?
            .json::<DirectoryResponseEnvelope>()
            .await?;
        Ok(CmList {
            serverlist: response.response.serverlist,
            timestamp: Instant::now(),
        })
    }
}

impl Default for Directory {
    fn default() -> Self {
        Self::new()
    }
}

/// Picks a random endpoint out of a resolved list, parsing the `"host:port"`
/// form spec.md §4.4 attempts up to 100 times while dialing.
pub fn random_endpoint(list: &CmList) -> Option<std::net::SocketAddr> {
    use rand::seq::SliceRandom;
    list.serverlist
        .choose(&mut rand::thread_rng())
        .and_then(|entry| entry.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_endpoint_parses_host_port_strings() {
        let list = CmList {
            serverlist: vec!["162.254.197.39:27017".to_string()],
            timestamp: Instant::now(),
        };
        let endpoint = random_endpoint(&list).unwrap();
        assert_eq!(endpoint.port(), 27017);
    }

    #[test]
    fn random_endpoint_skips_unparseable_entries() {
        let list = CmList {
            serverlist: vec!["not-an-endpoint".to_string()],
            timestamp: Instant::now(),
        };
        assert!(random_endpoint(&list).is_none());
    }

    #[tokio::test]
    async fn cache_entry_created_lazily_per_cell() {
        let directory = Directory::new();
        assert!(directory.cells.lock().await.is_empty());
    }
}
