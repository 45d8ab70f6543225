use std::{
    num::NonZeroUsize,
    sync::Mutex,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use lru::LruCache;

use crate::{error::NavError, models::Coordinate, providers::Geocoder};

/// Geocoder decorator that remembers recent answers for `ttl`.
///
/// Failed lookups are never cached.
pub struct CachedGeocoder<G> {
    inner: G,
    ttl: Duration,
    entries: Mutex<LruCache<String, (Coordinate, Instant)>>,
}

impl<G: Geocoder> CachedGeocoder<G> {
    pub fn new(inner: G, capacity: NonZeroUsize, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    fn cache_key(address: &str) -> String {
        address.trim().to_lowercase()
    }

    fn lookup(&self, key: &str) -> Option<Coordinate> {
        let mut entries = self.entries.lock().ok()?;
        let cached = entries.get(key).copied();
        match cached {
            Some((coord, stored_at)) if stored_at.elapsed() < self.ttl => Some(coord),
            Some(_) => {
                entries.pop(key);
                None
            }
            None => None,
        }
    }

    fn store(&self, key: String, coord: Coordinate) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.put(key, (coord, Instant::now()));
        }
    }
}

#[async_trait]
impl<G: Geocoder> Geocoder for CachedGeocoder<G> {
    async fn geocode(&self, address: &str) -> Result<Coordinate, NavError> {
        let key = Self::cache_key(address);
        if let Some(coord) = self.lookup(&key) {
            tracing::debug!("geocode cache hit for {address:?}");
            return Ok(coord);
        }

        let coord = self.inner.geocode(address).await?;
        self.store(key, coord);
        Ok(coord)
    }
}
