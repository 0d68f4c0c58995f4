//! Renderable view models.
//!
//! Built by [`crate::view::ViewBinding::render`] from a state snapshot and
//! consumed by the HTML renderer. No logic beyond formatting lives here.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::ranking::{RankedEvent, SeverityTier, format_magnitude};
use crate::selection::{Camera, Coordinates};

/// Radius of every marker dot, in pixels.
pub const MARKER_RADIUS_PX: u32 = 8;

/// Notice shown in the list area when the feed has no events.
pub const NO_DATA_NOTICE: &str = "No earthquakes reported in this period.";

/// One of three mutually exclusive screens.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum ViewModel {
    Loading,
    Failed { message: String },
    Ready(ReadyView),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReadyView {
    pub title: Option<String>,
    pub list: ListView,
    pub markers: Vec<MarkerView>,
    pub legend: Vec<LegendEntry>,
    pub sidebar: SidebarView,
    pub camera: Camera,
    pub focus: Option<Coordinates>,
}

/// The list panel: the most recent events, or an explicit notice.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "items", rename_all = "snake_case")]
pub enum ListView {
    Events(Vec<ListItem>),
    NoData,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListItem {
    pub id: String,
    pub place: String,
    pub magnitude: String,
    pub tier: SeverityTier,
    pub color: &'static str,
    pub time: String,
    pub is_focused: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarkerView {
    pub id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub color: &'static str,
    pub radius: u32,
    pub popup: Popup,
}

/// Dismissible info popup attached to a marker.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Popup {
    pub place: String,
    pub magnitude: String,
    pub time: String,
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LegendEntry {
    pub label: &'static str,
    pub range: &'static str,
    pub color: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SidebarView {
    /// Panel is drawn
    pub visible: bool,
    /// Toggle control is drawn (narrow viewports only)
    pub toggle_visible: bool,
}

/// Format an event time for display.
#[must_use]
pub fn format_time(time: Option<DateTime<Utc>>) -> String {
    time.map_or_else(
        || "unknown time".to_string(),
        |t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

impl ListItem {
    #[must_use]
    pub fn new(ranked: &RankedEvent, focus: Option<Coordinates>) -> Self {
        let event = &ranked.event;
        Self {
            id: event.id.clone(),
            place: event.place.clone(),
            magnitude: format_magnitude(event.magnitude),
            tier: ranked.tier,
            color: ranked.color(),
            time: format_time(event.time()),
            is_focused: focus == Some(coordinates_of(ranked)),
        }
    }
}

impl MarkerView {
    #[must_use]
    pub fn new(ranked: &RankedEvent) -> Self {
        let event = &ranked.event;
        Self {
            id: event.id.clone(),
            latitude: event.latitude,
            longitude: event.longitude,
            color: ranked.color(),
            radius: MARKER_RADIUS_PX,
            popup: Popup {
                place: event.place.clone(),
                magnitude: format_magnitude(event.magnitude),
                time: format_time(event.time()),
                url: event.url.clone(),
            },
        }
    }
}

/// Legend rows, weakest tier first.
#[must_use]
pub fn legend() -> Vec<LegendEntry> {
    SeverityTier::ALL
        .iter()
        .map(|tier| LegendEntry {
            label: tier.label(),
            range: tier.range(),
            color: tier.color(),
        })
        .collect()
}

/// Map position of a ranked event.
#[must_use]
pub fn coordinates_of(ranked: &RankedEvent) -> Coordinates {
    Coordinates {
        latitude: ranked.event.latitude,
        longitude: ranked.event.longitude,
    }
}
