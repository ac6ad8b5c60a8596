//! Multi-tier geocoding resolver
//!
//! Resolution chain, each tier short-circuiting on success: in-process map,
//! persistent cache (30-day TTL, purged lazily on read), exact curated city
//! table, geocoding API on the raw name, the same API with the city context
//! appended, a partial curated match (deliberately last: a landmark like
//! "X Caves, Rome" must not silently collapse to the city center before the
//! network has been tried), and finally the resolved coordinate of the city
//! context itself. Every success is written through to both cache levels.

use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::cache::{self, CacheStore};
use crate::config::GeocodingConfig;
use crate::models::Coordinate;

/// Default persistent-cache TTL for geocode entries
pub const GEOCODE_TTL_DAYS: u64 = 30;

/// Short TTL for city-context fallback entries, so a later run retries the
/// real landmark once the upstream index catches up
pub const CONTEXT_FALLBACK_TTL_DAYS: u64 = 1;

/// Maximum jitter in decimal degrees, roughly a kilometer
const JITTER_DEGREES: f64 = 0.01;

/// Well-known cities for offline resolution (lowercased names)
const CURATED_CITIES: &[(&str, f64, f64)] = &[
    ("amsterdam", 52.3676, 4.9041),
    ("athens", 37.9838, 23.7275),
    ("bangkok", 13.7563, 100.5018),
    ("barcelona", 41.3874, 2.1686),
    ("berlin", 52.5200, 13.4050),
    ("budapest", 47.4979, 19.0402),
    ("chicago", 41.8781, -87.6298),
    ("delhi", 28.6139, 77.2090),
    ("dubai", 25.2048, 55.2708),
    ("florence", 43.7696, 11.2558),
    ("geneva", 46.2044, 6.1432),
    ("hanoi", 21.0285, 105.8542),
    ("istanbul", 41.0082, 28.9784),
    ("kyoto", 35.0116, 135.7681),
    ("lisbon", 38.7223, -9.1393),
    ("london", 51.5074, -0.1278),
    ("los angeles", 34.0522, -118.2437),
    ("madrid", 40.4168, -3.7038),
    ("milan", 45.4642, 9.1900),
    ("mumbai", 19.0760, 72.8777),
    ("munich", 48.1351, 11.5820),
    ("new york", 40.7128, -74.0060),
    ("osaka", 34.6937, 135.5023),
    ("paris", 48.8566, 2.3522),
    ("prague", 50.0755, 14.4378),
    ("rome", 41.9028, 12.4964),
    ("san francisco", 37.7749, -122.4194),
    ("seoul", 37.5665, 126.9780),
    ("singapore", 1.3521, 103.8198),
    ("sydney", -33.8688, 151.2093),
    ("tokyo", 35.6762, 139.6503),
    ("venice", 45.4408, 12.3155),
    ("vienna", 48.2082, 16.3738),
    ("zurich", 47.3769, 8.5417),
];

/// External geocoding service: free-text query to best-match coordinate
#[async_trait]
pub trait GeocodingApi: Send + Sync {
    async fn search(&self, query: &str) -> Result<Option<Coordinate>>;
}

/// Rate limiter for API requests
#[derive(Debug)]
pub struct RateLimiter {
    /// Maximum requests per minute
    max_requests_per_minute: u32,
    /// Request timestamps within the current minute
    request_times: Vec<Instant>,
}

impl RateLimiter {
    /// Create a new rate limiter
    #[must_use]
    pub fn new(max_requests_per_minute: u32) -> Self {
        Self {
            max_requests_per_minute,
            request_times: Vec::new(),
        }
    }

    /// Check if a request is allowed and record it
    pub fn allow_request(&mut self) -> bool {
        self.cleanup_old_requests();

        if self.request_times.len() >= self.max_requests_per_minute as usize {
            false
        } else {
            self.request_times.push(Instant::now());
            true
        }
    }

    /// Get time until the next request is allowed
    pub fn time_until_next_request(&mut self) -> Duration {
        self.cleanup_old_requests();

        if self.request_times.len() < self.max_requests_per_minute as usize {
            Duration::from_secs(0)
        } else if let Some(oldest) = self.request_times.first() {
            let elapsed = oldest.elapsed();
            if elapsed >= Duration::from_secs(60) {
                Duration::from_secs(0)
            } else {
                Duration::from_secs(60) - elapsed
            }
        } else {
            Duration::from_secs(0)
        }
    }

    /// Remove requests older than 1 minute
    fn cleanup_old_requests(&mut self) {
        let cutoff = Instant::now() - Duration::from_secs(60);
        self.request_times.retain(|&time| time > cutoff);
    }
}

/// OpenMeteo geocoding client with rate limiting and bounded retries
pub struct OpenMeteoGeocoder {
    client: reqwest::Client,
    config: GeocodingConfig,
    rate_limiter: tokio::sync::Mutex<RateLimiter>,
}

#[derive(Debug, Deserialize)]
struct GeocodingResponse {
    results: Option<Vec<GeocodingHit>>,
}

#[derive(Debug, Deserialize)]
struct GeocodingHit {
    latitude: f64,
    longitude: f64,
}

impl OpenMeteoGeocoder {
    pub fn new(config: GeocodingConfig) -> Result<Self> {
        let timeout = Duration::from_secs(config.timeout_seconds.into());
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent("TripWeaver/0.1.0")
            .build()
            .with_context(|| "Failed to create HTTP client")?;
        let rate_limiter = tokio::sync::Mutex::new(RateLimiter::new(config.max_requests_per_minute));

        Ok(Self {
            client,
            config,
            rate_limiter,
        })
    }

    async fn wait_for_slot(&self) {
        let mut limiter = self.rate_limiter.lock().await;
        if !limiter.allow_request() {
            let wait_time = limiter.time_until_next_request();
            if wait_time > Duration::from_secs(0) {
                warn!("Rate limit reached, waiting {:.1}s", wait_time.as_secs_f64());
                tokio::time::sleep(wait_time).await;
            }
            limiter.allow_request();
        }
    }

    async fn make_request(&self, url: &str) -> Result<reqwest::Response> {
        let max_attempts = self.config.max_retries + 1;
        let mut attempt = 0;

        loop {
            self.wait_for_slot().await;
            debug!("Geocoding request (attempt {}/{})", attempt + 1, max_attempts);

            match self.client.get(url).send().await {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) => {
                    let status = response.status();
                    warn!("Geocoding HTTP error on attempt {}: {}", attempt + 1, status);
                    if attempt + 1 >= max_attempts {
                        anyhow::bail!("Geocoding request failed with status {status}");
                    }
                }
                Err(e) => {
                    warn!("Geocoding network error on attempt {}: {}", attempt + 1, e);
                    if attempt + 1 >= max_attempts {
                        return Err(e).context("Geocoding request failed after all retries");
                    }
                }
            }

            // Exponential backoff between attempts
            let backoff = Duration::from_millis(1000 * 2_u64.pow(attempt));
            tokio::time::sleep(backoff).await;
            attempt += 1;
        }
    }
}

#[async_trait]
impl GeocodingApi for OpenMeteoGeocoder {
    #[instrument(skip(self))]
    async fn search(&self, query: &str) -> Result<Option<Coordinate>> {
        let url = format!(
            "{}/search?name={}&count=1&language=en&format=json",
            self.config.base_url,
            urlencoding::encode(query)
        );

        let response = self.make_request(&url).await?;
        let parsed: GeocodingResponse = response
            .json()
            .await
            .with_context(|| "Failed to parse geocoding response")?;

        Ok(parsed
            .results
            .unwrap_or_default()
            .first()
            .map(|hit| Coordinate::new(hit.latitude, hit.longitude)))
    }
}

/// Cache record: the base coordinate plus whether it is a city-center level
/// resolution (those get per-activity jitter so markers do not stack)
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct CachedPlace {
    coordinate: Coordinate,
    city_level: bool,
}

/// Multi-tier place-name resolver
pub struct GeocodeResolver {
    api: Arc<dyn GeocodingApi>,
    cache: Arc<dyn CacheStore>,
    memory: Mutex<HashMap<String, CachedPlace>>,
    ttl: Duration,
}

impl GeocodeResolver {
    pub fn new(api: Arc<dyn GeocodingApi>, cache: Arc<dyn CacheStore>) -> Self {
        Self {
            api,
            cache,
            memory: Mutex::new(HashMap::new()),
            ttl: Duration::from_secs(GEOCODE_TTL_DAYS * 24 * 60 * 60),
        }
    }

    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Resolve a place name to a coordinate.
    ///
    /// `hint` feeds the deterministic jitter for city-level results;
    /// `city_context` disambiguates landmark names and is the final fallback.
    /// Returns `None` when every tier fails; the caller marks the segment
    /// `geocode_failed`.
    #[instrument(skip(self), level = "debug")]
    pub async fn resolve(
        &self,
        place: &str,
        hint: Option<&str>,
        city_context: Option<&str>,
    ) -> Option<Coordinate> {
        let place = place.trim();
        if place.is_empty() {
            return None;
        }
        let key = Self::cache_key(place);

        // Tier 1: in-process map
        if let Some(cached) = self.memory_get(&key) {
            return Some(apply_jitter(cached, hint));
        }

        // Tier 2: persistent cache (TTL purged lazily on read)
        match cache::get::<CachedPlace>(self.cache.as_ref(), &key).await {
            Ok(Some(cached)) => {
                self.memory_put(&key, cached);
                return Some(apply_jitter(cached, hint));
            }
            Ok(None) => {}
            Err(e) => debug!("Persistent cache read failed for '{place}': {e}"),
        }

        // Tier 3: exact curated city match
        if let Some(coordinate) = curated_exact(place) {
            let entry = CachedPlace {
                coordinate,
                city_level: true,
            };
            self.write_through(&key, entry).await;
            return Some(apply_jitter(entry, hint));
        }

        // Tier 4: geocoding API on the raw name
        if let Some(coordinate) = self.api_search(place).await {
            let entry = CachedPlace {
                coordinate,
                city_level: false,
            };
            self.write_through(&key, entry).await;
            return Some(coordinate);
        }

        // Tier 5: API again with the city context appended; disambiguates
        // landmarks that share a name across cities
        if let Some(context) = city_context {
            let contextual = format!("{place}, {context}");
            if let Some(coordinate) = self.api_search(&contextual).await {
                let entry = CachedPlace {
                    coordinate,
                    city_level: false,
                };
                self.write_through(&key, entry).await;
                return Some(coordinate);
            }
        }

        // Tier 6: partial curated match, only after the network has been tried
        if let Some(coordinate) = curated_partial(place) {
            let entry = CachedPlace {
                coordinate,
                city_level: true,
            };
            self.write_through(&key, entry).await;
            return Some(apply_jitter(entry, hint));
        }

        // Tier 7: coordinate of the city context itself. Cached under the
        // place key like every other tier, but with a short TTL so a later
        // run can still find the real landmark.
        if let Some(context) = city_context {
            if let Some(coordinate) = Box::pin(self.resolve(context, None, None)).await {
                let entry = CachedPlace {
                    coordinate,
                    city_level: true,
                };
                let ttl = Duration::from_secs(CONTEXT_FALLBACK_TTL_DAYS * 24 * 60 * 60);
                self.write_through_with_ttl(&key, entry, ttl).await;
                return Some(apply_jitter(entry, hint));
            }
        }

        debug!("All resolver tiers failed for '{place}'");
        None
    }

    /// Resolve a batch of places concurrently. Each lookup writes only its
    /// own cache entry, so independent activities are safe to run in parallel.
    pub async fn resolve_batch(
        &self,
        items: &[(String, Option<String>, Option<String>)],
    ) -> Vec<Option<Coordinate>> {
        let futures = items.iter().map(|(place, hint, context)| {
            self.resolve(place, hint.as_deref(), context.as_deref())
        });
        join_all(futures).await
    }

    fn cache_key(place: &str) -> String {
        format!("geocode:{}", place.to_lowercase())
    }

    fn memory_get(&self, key: &str) -> Option<CachedPlace> {
        self.memory.lock().ok()?.get(key).copied()
    }

    fn memory_put(&self, key: &str, entry: CachedPlace) {
        if let Ok(mut map) = self.memory.lock() {
            map.insert(key.to_string(), entry);
        }
    }

    async fn write_through(&self, key: &str, entry: CachedPlace) {
        self.write_through_with_ttl(key, entry, self.ttl).await;
    }

    async fn write_through_with_ttl(&self, key: &str, entry: CachedPlace, ttl: Duration) {
        self.memory_put(key, entry);
        if let Err(e) = cache::put(self.cache.as_ref(), key, entry, ttl).await {
            debug!("Persistent cache write failed for '{key}': {e}");
        }
    }

    async fn api_search(&self, query: &str) -> Option<Coordinate> {
        match self.api.search(query).await {
            Ok(found) => found,
            Err(e) => {
                debug!("Geocoding API failed for '{query}': {e}");
                None
            }
        }
    }
}

fn normalize(name: &str) -> String {
    name.trim().to_lowercase()
}

fn curated_exact(place: &str) -> Option<Coordinate> {
    let normalized = normalize(place);
    CURATED_CITIES
        .iter()
        .find(|(name, _, _)| *name == normalized)
        .map(|&(_, lat, lon)| Coordinate::new(lat, lon))
}

fn curated_partial(place: &str) -> Option<Coordinate> {
    let normalized = normalize(place);
    CURATED_CITIES
        .iter()
        .find(|(name, _, _)| normalized.contains(name))
        .map(|&(_, lat, lon)| Coordinate::new(lat, lon))
}

/// Deterministic ~±0.01° offset derived from the hint string. The same hint
/// always yields the same offset, so repeated resolutions are bit-identical.
fn apply_jitter(entry: CachedPlace, hint: Option<&str>) -> Coordinate {
    let (Some(hint), true) = (hint, entry.city_level) else {
        return entry.coordinate;
    };

    let mut hasher = DefaultHasher::new();
    hint.hash(&mut hasher);
    let h = hasher.finish();

    let lat_unit = f64::from((h & 0xffff) as u16) / f64::from(u16::MAX);
    let lon_unit = f64::from(((h >> 16) & 0xffff) as u16) / f64::from(u16::MAX);

    Coordinate::new(
        entry.coordinate.latitude + (lat_unit - 0.5) * 2.0 * JITTER_DEGREES,
        entry.coordinate.longitude + (lon_unit - 0.5) * 2.0 * JITTER_DEGREES,
    )
}
