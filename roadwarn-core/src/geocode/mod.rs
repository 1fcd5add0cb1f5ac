//! Reverse-geocoding with a bounded cache.
//!
//! The place name under the warning panel is looked up from the current
//! coordinates. Nearby fixes share a cache slot (coordinates rounded to
//! five decimals, roughly a metre), entries expire after a TTL, the
//! cache holds a bounded number of places, and upstream lookups are
//! rate-limited.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::DetectError;

/// Place name used when the upstream service knows nothing.
pub const UNKNOWN_LOCATION: &str = "unknown location";

const SCALE: f64 = 100_000.0;

// ── CoordKey ─────────────────────────────────────────────────────

/// Coordinates rounded to five decimal places.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CoordKey {
    lat_e5: i64,
    lon_e5: i64,
}

impl CoordKey {
    pub fn new(lat: f64, lon: f64) -> Result<Self, DetectError> {
        if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
            return Err(DetectError::Geocode(format!("latitude out of range: {lat}")));
        }
        if !lon.is_finite() || !(-180.0..=180.0).contains(&lon) {
            return Err(DetectError::Geocode(format!("longitude out of range: {lon}")));
        }
        Ok(Self {
            lat_e5: (lat * SCALE).round() as i64,
            lon_e5: (lon * SCALE).round() as i64,
        })
    }

    pub fn lat(&self) -> f64 {
        self.lat_e5 as f64 / SCALE
    }

    pub fn lon(&self) -> f64 {
        self.lon_e5 as f64 / SCALE
    }
}

impl fmt::Display for CoordKey {
    /// `lon,lat`, the order geocoding URLs use.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.5},{:.5}", self.lon(), self.lat())
    }
}

// ── GeocodeCache ─────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct CachedPlace {
    name: String,
    stored_at: Instant,
}

/// Place names by [`CoordKey`], with TTL and a capacity bound.
/// When full, the oldest stored entry is evicted first.
#[derive(Debug, Clone)]
pub struct GeocodeCache {
    ttl: Duration,
    capacity: usize,
    places: HashMap<CoordKey, CachedPlace>,
    order: VecDeque<CoordKey>,
}

impl GeocodeCache {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            ttl,
            capacity: capacity.max(1),
            places: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    /// A fresh entry for `key`, if any.
    pub fn get(&self, key: &CoordKey, now: Instant) -> Option<&str> {
        self.places
            .get(key)
            .filter(|place| now.duration_since(place.stored_at) < self.ttl)
            .map(|place| place.name.as_str())
    }

    pub fn insert(&mut self, key: CoordKey, name: impl Into<String>, now: Instant) {
        if self.places.contains_key(&key) {
            self.order.retain(|k| k != &key);
        } else {
            while self.places.len() >= self.capacity {
                let Some(oldest) = self.order.pop_front() else {
                    break;
                };
                self.places.remove(&oldest);
            }
        }
        self.order.push_back(key);
        self.places.insert(
            key,
            CachedPlace {
                name: name.into(),
                stored_at: now,
            },
        );
    }

    /// Remove expired entries. Returns how many went.
    pub fn purge_expired(&mut self, now: Instant) -> usize {
        let ttl = self.ttl;
        let before = self.places.len();
        self.places
            .retain(|_, place| now.duration_since(place.stored_at) < ttl);
        let places = &self.places;
        self.order.retain(|k| places.contains_key(k));
        before - self.places.len()
    }

    pub fn len(&self) -> usize {
        self.places.len()
    }

    pub fn is_empty(&self) -> bool {
        self.places.is_empty()
    }
}

// ── ReverseGeocoder ──────────────────────────────────────────────

/// Upstream reverse-geocoding service.
#[async_trait]
pub trait ReverseGeocoder: Send {
    /// Place name for the coordinates; `Ok(None)` when there is none.
    async fn lookup(&mut self, lat: f64, lon: f64) -> Result<Option<String>, DetectError>;
}

/// Settings for [`CachedGeocoder`].
#[derive(Debug, Clone)]
pub struct GeocodeConfig {
    pub ttl: Duration,
    pub capacity: usize,
    /// Minimum spacing between upstream lookups.
    pub min_interval: Duration,
}

impl Default for GeocodeConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(600),
            capacity: 256,
            min_interval: Duration::from_secs(10),
        }
    }
}

/// A [`ReverseGeocoder`] front-end that answers from the cache when it
/// can and spaces out upstream calls.
pub struct CachedGeocoder<G> {
    inner: G,
    cache: GeocodeCache,
    min_interval: Duration,
    last_lookup: Option<Instant>,
    last_place: Option<String>,
}

impl<G: ReverseGeocoder> CachedGeocoder<G> {
    pub fn new(inner: G, config: GeocodeConfig) -> Self {
        Self {
            inner,
            cache: GeocodeCache::new(config.ttl, config.capacity),
            min_interval: config.min_interval,
            last_lookup: None,
            last_place: None,
        }
    }

    pub fn cache(&self) -> &GeocodeCache {
        &self.cache
    }

    /// Resolve a place name.
    ///
    /// A cache miss inside the rate-limit window answers with the most
    /// recent place (or [`UNKNOWN_LOCATION`]) without calling upstream.
    /// Upstream errors are returned and not cached.
    pub async fn resolve(&mut self, lat: f64, lon: f64) -> Result<String, DetectError> {
        let key = CoordKey::new(lat, lon)?;
        let now = Instant::now();

        if let Some(name) = self.cache.get(&key, now) {
            let name = name.to_string();
            self.last_place = Some(name.clone());
            return Ok(name);
        }

        if let Some(last) = self.last_lookup {
            if now.duration_since(last) < self.min_interval {
                debug!(%key, "geocode lookup rate-limited");
                return Ok(self
                    .last_place
                    .clone()
                    .unwrap_or_else(|| UNKNOWN_LOCATION.to_string()));
            }
        }

        self.last_lookup = Some(now);
        let name = match self.inner.lookup(key.lat(), key.lon()).await {
            Ok(Some(name)) => name,
            Ok(None) => UNKNOWN_LOCATION.to_string(),
            Err(e) => {
                warn!(%key, "address lookup failed: {e}");
                return Err(e);
            }
        };
        self.cache.purge_expired(now);
        self.cache.insert(key, name.clone(), now);
        self.last_place = Some(name.clone());
        Ok(name)
    }
}
