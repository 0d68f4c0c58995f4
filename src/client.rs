//! USGS earthquake feed client.
//!
//! Provides blocking HTTP access to USGS GeoJSON summary feeds.
//! Uses reqwest with rustls for TLS.

use std::fmt;
use std::time::Duration;

use reqwest::blocking::Client;
use tracing::{debug, instrument};

use crate::errors::FeedError;
use crate::models::{FeatureCollection, RawEvent};
use crate::ranking::sort_by_recency;

/// Default request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 10;

/// User agent string for API requests.
const USER_AGENT: &str = concat!("quakeview/", env!("CARGO_PKG_VERSION"));

/// USGS base URL for earthquake feeds.
const USGS_BASE_URL: &str = "https://earthquake.usgs.gov";

/// Minimum magnitude of a summary feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedLevel {
    All,
    Mag1,
    Mag25,
    Mag45,
    Significant,
}

/// Time window of a summary feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedWindow {
    Hour,
    Day,
    Week,
    Month,
}

/// A USGS summary feed, e.g. `all_day` or `4.5_week`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedType {
    pub level: FeedLevel,
    pub window: FeedWindow,
}

impl FeedType {
    /// Every event from the past day.
    pub const ALL_DAY: Self = Self {
        level: FeedLevel::All,
        window: FeedWindow::Day,
    };

    /// Full feed URL under `base_url`.
    #[must_use]
    pub fn url(self, base_url: &str) -> String {
        format!("{base_url}/earthquakes/feed/v1.0/summary/{self}.geojson")
    }
}

impl Default for FeedType {
    fn default() -> Self {
        Self::ALL_DAY
    }
}

impl fmt::Display for FeedType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.level {
            FeedLevel::All => "all",
            FeedLevel::Mag1 => "1.0",
            FeedLevel::Mag25 => "2.5",
            FeedLevel::Mag45 => "4.5",
            FeedLevel::Significant => "significant",
        };
        let window = match self.window {
            FeedWindow::Hour => "hour",
            FeedWindow::Day => "day",
            FeedWindow::Week => "week",
            FeedWindow::Month => "month",
        };
        write!(f, "{level}_{window}")
    }
}

impl std::str::FromStr for FeedType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_lowercase();
        let Some((level, window)) = lower.rsplit_once('_') else {
            return Err(format!("unknown feed type: {s} (expected <level>_<window>)"));
        };

        let level = match level {
            "all" => FeedLevel::All,
            "1.0" => FeedLevel::Mag1,
            "2.5" => FeedLevel::Mag25,
            "4.5" => FeedLevel::Mag45,
            "significant" => FeedLevel::Significant,
            _ => return Err(format!("unknown feed level: {level}")),
        };
        let window = match window {
            "hour" => FeedWindow::Hour,
            "day" => FeedWindow::Day,
            "week" => FeedWindow::Week,
            "month" => FeedWindow::Month,
            _ => return Err(format!("unknown feed window: {window}")),
        };

        Ok(Self { level, window })
    }
}

/// A decoded feed, events most recent first.
#[derive(Debug, Clone, Default)]
pub struct Feed {
    pub title: Option<String>,
    pub events: Vec<RawEvent>,
}

/// Anything that can produce the event feed.
///
/// The view runtime only sees this trait, so tests can swap in a fake.
pub trait FeedSource: Send + Sync {
    /// Fetch the whole feed once.
    fn fetch_feed(&self) -> Result<Feed, FeedError>;
}

/// Client for one USGS summary feed.
pub struct FeedClient {
    client: Client,
    url: String,
}

impl FeedClient {
    /// Create a client for a USGS summary feed.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be initialized.
    pub fn new(feed_type: FeedType) -> Result<Self, FeedError> {
        Self::with_url(feed_type.url(USGS_BASE_URL))
    }

    /// Create a client for an explicit feed URL.
    pub fn with_url(url: impl Into<String>) -> Result<Self, FeedError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Fetch the events only, most recent first.
    ///
    /// # Errors
    ///
    /// See [`FeedSource::fetch_feed`].
    pub fn fetch_events(&self) -> Result<Vec<RawEvent>, FeedError> {
        self.fetch_feed().map(|feed| feed.events)
    }
}

impl FeedSource for FeedClient {
    /// Issue a single GET and decode the response.
    ///
    /// Non-2xx statuses and transport failures are network errors; anything
    /// that does not decode into the event schema is a parse error.
    #[instrument(skip(self), fields(url = %self.url))]
    fn fetch_feed(&self) -> Result<Feed, FeedError> {
        debug!("fetching feed");

        let response = self.client.get(&self.url).send()?;

        // Check status before parsing
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(FeedError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes()?;
        let collection = FeatureCollection::from_slice(&bytes)?;
        if let Some(count) = collection.metadata.as_ref().and_then(|m| m.count) {
            debug!(count, "feed metadata");
        }
        let title = collection.title().map(str::to_string);
        let mut events = collection.into_events()?;
        sort_by_recency(&mut events);

        debug!("fetched {} events", events.len());
        Ok(Feed { title, events })
    }
}
