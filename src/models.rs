//! Data models for the USGS GeoJSON summary feed.
//!
//! The wire structures only name the fields we read; serde skips the rest.
//! [`RawEvent`] is the normalized, immutable form handed to ranking.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::FeedError;

/// Place text used when the feed has no place description.
pub const UNKNOWN_PLACE: &str = "Unknown location";

/// Top-level GeoJSON response from USGS feeds.
#[derive(Debug, Clone, Deserialize)]
pub struct FeatureCollection {
    /// "FeatureCollection" when present
    #[serde(rename = "type", default)]
    pub type_: Option<String>,

    /// Feed metadata
    #[serde(default)]
    pub metadata: Option<Metadata>,

    /// Earthquake events
    pub features: Vec<Feature>,
}

/// Metadata about the feed response.
#[derive(Debug, Clone, Deserialize)]
pub struct Metadata {
    /// Human-readable title, e.g. "USGS All Earthquakes, Past Day"
    pub title: Option<String>,

    /// Number of events in response
    pub count: Option<usize>,
}

/// A single earthquake feature on the wire.
#[derive(Debug, Clone, Deserialize)]
pub struct Feature {
    /// Unique event ID
    pub id: String,

    /// Geographic location
    pub geometry: Geometry,

    /// Event properties
    pub properties: Properties,
}

/// Coordinates: [longitude, latitude, depth_km]
#[derive(Debug, Clone, Deserialize)]
pub struct Geometry {
    pub coordinates: Vec<f64>,
}

/// The subset of event properties the map needs.
#[derive(Debug, Clone, Deserialize)]
pub struct Properties {
    /// Magnitude, null for some automatic solutions
    pub mag: Option<f64>,

    /// Human-readable place description
    pub place: Option<String>,

    /// Event time (ms since epoch)
    pub time: i64,

    /// Event page URL
    #[serde(default)]
    pub url: Option<String>,
}

impl FeatureCollection {
    /// Decode a feed payload.
    ///
    /// # Errors
    ///
    /// Returns [`FeedError::Decode`] for malformed JSON or missing fields and
    /// [`FeedError::InvalidResponse`] for a wrong top-level type.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, FeedError> {
        let feed: Self = serde_json::from_slice(bytes)?;
        feed.validate()?;
        Ok(feed)
    }

    /// Validate the response structure.
    pub fn validate(&self) -> Result<(), FeedError> {
        match self.type_.as_deref() {
            None | Some("FeatureCollection") => Ok(()),
            Some(other) => Err(FeedError::InvalidResponse(format!(
                "expected type 'FeatureCollection', got '{other}'"
            ))),
        }
    }

    /// Feed title from metadata, if any.
    #[must_use]
    pub fn title(&self) -> Option<&str> {
        self.metadata.as_ref().and_then(|m| m.title.as_deref())
    }

    /// Normalize every feature, in feed order.
    ///
    /// All-or-nothing: one bad feature rejects the whole feed.
    pub fn into_events(self) -> Result<Vec<RawEvent>, FeedError> {
        self.features.into_iter().map(RawEvent::try_from).collect()
    }
}

/// A normalized seismic event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RawEvent {
    pub id: String,
    pub longitude: f64,
    pub latitude: f64,
    pub depth_km: f64,
    pub magnitude: Option<f64>,
    pub place: String,
    pub time_ms: i64,
    pub url: Option<String>,
}

impl RawEvent {
    /// Event time as a `DateTime<Utc>`.
    #[must_use]
    pub fn time(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.time_ms).single()
    }
}

impl TryFrom<Feature> for RawEvent {
    type Error = FeedError;

    fn try_from(f: Feature) -> Result<Self, Self::Error> {
        if f.id.is_empty() {
            return Err(FeedError::InvalidResponse("empty event ID".into()));
        }
        let [longitude, latitude, rest @ ..] = f.geometry.coordinates.as_slice() else {
            return Err(FeedError::InvalidResponse(format!(
                "event {}: expected at least 2 coordinates, got {}",
                f.id,
                f.geometry.coordinates.len()
            )));
        };

        Ok(Self {
            longitude: *longitude,
            latitude: *latitude,
            depth_km: rest.first().copied().unwrap_or(0.0),
            magnitude: f.properties.mag,
            place: f
                .properties
                .place
                .filter(|p| !p.trim().is_empty())
                .unwrap_or_else(|| UNKNOWN_PLACE.to_string()),
            time_ms: f.properties.time,
            url: f.properties.url,
            id: f.id,
        })
    }
}
