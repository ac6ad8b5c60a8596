//! Routing API seam and the GraphHopper-backed client
//!
//! Real route estimates override the tier-based distance/duration guesses in
//! the transport builders when available. Lookups are cached for about a week
//! with a jittered TTL so a cold start does not expire everything at once.

use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use rand::RngExt;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::cache::{self, CacheStore};
use crate::config::RoutingConfig;
use crate::models::Coordinate;

/// Best-route estimate between two coordinates
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct RouteEstimate {
    pub duration_secs: u64,
    pub distance_meters: f64,
}

impl RouteEstimate {
    #[must_use]
    pub fn duration_hours(&self) -> f64 {
        self.duration_secs as f64 / 3600.0
    }

    #[must_use]
    pub fn distance_km(&self) -> f64 {
        self.distance_meters / 1000.0
    }
}

/// External routing service
#[async_trait]
pub trait RoutingApi: Send + Sync {
    async fn route(&self, source: &Coordinate, destination: &Coordinate) -> Result<RouteEstimate>;
}

/// Cached route lookup. Failures propagate so the caller can fall back to its
/// tier-based estimate.
#[instrument(skip(routing, store))]
pub async fn cached_route(
    routing: &dyn RoutingApi,
    store: &dyn CacheStore,
    source: &Coordinate,
    destination: &Coordinate,
) -> Result<RouteEstimate> {
    let key = format!("route:{}-{}", source.to_key(), destination.to_key());

    if let Some(cached) = cache::get::<RouteEstimate>(store, &key).await? {
        return Ok(cached);
    }

    let estimate = routing.route(source, destination).await?;

    let jitter: f32 = rand::rng().random_range(0.9..1.1);
    let week_secs = 7 * 24 * 60 * 60;
    cache::put(
        store,
        &key,
        estimate,
        Duration::from_secs((week_secs as f32 * jitter) as u64),
    )
    .await?;
    Ok(estimate)
}

/// GraphHopper routing client
pub struct GraphHopperClient {
    client: reqwest::Client,
    config: RoutingConfig,
}

#[derive(Debug, Deserialize)]
struct PathResponse {
    time: u64,
    distance: f64,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    paths: Vec<PathResponse>,
}

impl GraphHopperClient {
    pub fn new(config: RoutingConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds.into()))
            .user_agent("TripWeaver/0.1.0")
            .build()
            .with_context(|| "Failed to create HTTP client")?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl RoutingApi for GraphHopperClient {
    async fn route(&self, source: &Coordinate, destination: &Coordinate) -> Result<RouteEstimate> {
        tracing::debug!("Calling the routing API");
        let api_key = self
            .config
            .api_key
            .as_deref()
            .context("Routing API key not configured")?;
        let url = format!(
            "{}/route?point={},{}&point={},{}&profile=car&points_encoded=false&calc_points=false&key={}",
            self.config.base_url,
            source.latitude,
            source.longitude,
            destination.latitude,
            destination.longitude,
            api_key,
        );
        let response = self.client.get(url).send().await?;
        let response: ApiResponse = response.json().await?;

        response
            .paths
            .first()
            .map(|path| RouteEstimate {
                duration_secs: path.time / 1000,
                distance_meters: path.distance,
            })
            .ok_or(anyhow!("No paths in response"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedRouter {
        estimate: RouteEstimate,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl RoutingApi for FixedRouter {
        async fn route(&self, _: &Coordinate, _: &Coordinate) -> Result<RouteEstimate> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.estimate)
        }
    }

    #[tokio::test]
    async fn test_cached_route_issues_one_call() {
        let router = FixedRouter {
            estimate: RouteEstimate {
                duration_secs: 7200,
                distance_meters: 180_000.0,
            },
            calls: AtomicUsize::new(0),
        };
        let store = MemoryCache::new();
        let from = Coordinate::new(48.8566, 2.3522);
        let to = Coordinate::new(51.5074, -0.1278);

        let first = cached_route(&router, &store, &from, &to).await.unwrap();
        let second = cached_route(&router, &store, &from, &to).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(router.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_estimate_conversions() {
        let estimate = RouteEstimate {
            duration_secs: 5400,
            distance_meters: 120_500.0,
        };
        assert!((estimate.duration_hours() - 1.5).abs() < 1e-9);
        assert!((estimate.distance_km() - 120.5).abs() < 1e-9);
    }
}
