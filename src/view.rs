//! View binding: the single owner of all view state.
//!
//! State changes go through the methods on [`ViewBinding`]. Each returns the
//! side effects the runtime must carry out ([`Effect`]), and
//! [`ViewBinding::render`] is a pure function of the current state.
//!
//! ```text
//! mount/refresh/retry ──► Effect::Fetch(token) ──► runtime fetches feed
//!                                                        │
//! complete_fetch(token, result) ◄────────────────────────┘
//!        │  (stale tokens dropped)
//!        ▼
//! FetchState::Ready ──► render() ──► list + markers + legend
//!        │
//! select(id) ──► Effect::FlyTo ──► MapSurface::fly_to
//!            └─► sidebar collapses on narrow viewports
//! ```

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::client::Feed;
use crate::errors::FeedError;
use crate::ranking::{LIST_LIMIT, RankedEvent, rank, top_n};
use crate::selection::{CameraFlight, SelectionCoordinator};
use crate::sidebar::{SidebarState, ViewportQuery};
use crate::viewmodel::{
    ListItem, ListView, MarkerView, ReadyView, SidebarView, ViewModel, coordinates_of, legend,
};

/// The only failure text users see; details go to the log.
pub const GENERIC_FAILURE_MESSAGE: &str = "Could not load earthquake data. Please try again.";

/// Delay of the one-shot layout correction after mount.
pub const LAYOUT_FIX_DELAY: Duration = Duration::from_millis(200);

/// Where the feed is in its lifecycle.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchState {
    Loading,
    Ready(Vec<RankedEvent>),
    Failed(String),
}

/// Identifies one issued fetch. Only the latest token is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct RequestToken(u64);

/// Side effects requested by a state transition.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Fetch the feed, then call [`ViewBinding::complete_fetch`] with the token.
    Fetch(RequestToken),
    /// Animate the map camera.
    FlyTo(CameraFlight),
    /// Ask the map to re-measure its container once, after a delay.
    InvalidateLayout { after: Duration },
}

/// The map rendering surface.
pub trait MapSurface {
    /// Animate the viewport to the flight target.
    fn fly_to(&mut self, flight: &CameraFlight);

    /// Re-measure the container after layout settles.
    fn invalidate_size(&mut self);
}

/// Owns fetch, selection and sidebar state for one mounted view.
pub struct ViewBinding {
    viewport: Arc<dyn ViewportQuery>,
    fetch: FetchState,
    title: Option<String>,
    selection: SelectionCoordinator,
    sidebar: SidebarState,
    issued: u64,
    pending: Option<RequestToken>,
}

impl ViewBinding {
    #[must_use]
    pub fn new(viewport: Arc<dyn ViewportQuery>) -> Self {
        let sidebar = SidebarState::for_viewport(viewport.as_ref());
        Self {
            viewport,
            fetch: FetchState::Loading,
            title: None,
            selection: SelectionCoordinator::new(),
            sidebar,
            issued: 0,
            pending: None,
        }
    }

    /// Start a fresh view: reset state, fetch, and schedule the layout fix.
    ///
    /// The request counter survives remounts so a response to an earlier
    /// mount can never be applied.
    pub fn mount(&mut self) -> Vec<Effect> {
        self.title = None;
        self.selection = SelectionCoordinator::new();
        self.sidebar = SidebarState::for_viewport(self.viewport.as_ref());
        info!(width = self.viewport.width(), "mounting view");

        vec![
            self.begin_fetch(),
            Effect::InvalidateLayout {
                after: LAYOUT_FIX_DELAY,
            },
        ]
    }

    /// Reload the feed. Inert while a fetch is outstanding.
    pub fn refresh(&mut self) -> Option<Effect> {
        if self.fetch == FetchState::Loading {
            debug!("refresh ignored while loading");
            return None;
        }
        Some(self.begin_fetch())
    }

    /// Re-issue the fetch after a failure.
    pub fn retry(&mut self) -> Option<Effect> {
        if !matches!(self.fetch, FetchState::Failed(_)) {
            return None;
        }
        info!("retrying feed fetch");
        Some(self.begin_fetch())
    }

    fn begin_fetch(&mut self) -> Effect {
        self.issued += 1;
        let token = RequestToken(self.issued);
        self.pending = Some(token);
        self.fetch = FetchState::Loading;
        Effect::Fetch(token)
    }

    /// Apply a finished fetch.
    ///
    /// Returns `false` when the token is stale and the result was dropped.
    pub fn complete_fetch(&mut self, token: RequestToken, result: Result<Feed, FeedError>) -> bool {
        if self.pending != Some(token) {
            warn!(token = token.0, "discarding stale feed response");
            return false;
        }
        self.pending = None;

        match result {
            Ok(feed) => {
                info!(events = feed.events.len(), "feed loaded");
                self.title = feed.title;
                self.fetch = FetchState::Ready(rank(feed.events));
            }
            Err(e) => {
                warn!(kind = e.kind().as_str(), "feed fetch failed: {e}");
                self.fetch = FetchState::Failed(GENERIC_FAILURE_MESSAGE.to_string());
            }
        }
        true
    }

    /// Focus a listed event and fly the camera to it.
    ///
    /// Collapses the sidebar on narrow viewports. Unknown ids and selections
    /// outside the ready state change nothing.
    pub fn select(&mut self, event_id: &str) -> Option<Effect> {
        let FetchState::Ready(events) = &self.fetch else {
            return None;
        };
        let coordinates = events
            .iter()
            .find(|e| e.event.id == event_id)
            .map(coordinates_of)?;

        let flight = self.selection.select(coordinates);
        debug!(event_id, revision = self.selection.revision(), "event selected");
        if self.sidebar.collapse_if_narrow(self.viewport.as_ref()) {
            debug!("sidebar collapsed after selection");
        }
        Some(Effect::FlyTo(flight))
    }

    pub fn toggle_sidebar(&mut self) {
        self.sidebar.toggle();
    }

    /// Zoom level reported back by the map surface.
    pub fn record_zoom(&mut self, zoom: f64) {
        self.selection.set_zoom(zoom);
    }

    #[cfg(test)]
    pub fn fetch_state(&self) -> &FetchState {
        &self.fetch
    }

    #[cfg(test)]
    pub fn selection(&self) -> &SelectionCoordinator {
        &self.selection
    }

    #[cfg(test)]
    pub fn sidebar(&self) -> SidebarState {
        self.sidebar
    }

    /// Build the view model for the current state.
    #[must_use]
    pub fn render(&self) -> ViewModel {
        let events = match &self.fetch {
            FetchState::Loading => return ViewModel::Loading,
            FetchState::Failed(message) => {
                return ViewModel::Failed {
                    message: message.clone(),
                };
            }
            FetchState::Ready(events) => events,
        };

        let focus = self.selection.focus();
        let list = if events.is_empty() {
            ListView::NoData
        } else {
            ListView::Events(
                top_n(events, LIST_LIMIT)
                    .iter()
                    .map(|e| ListItem::new(e, focus))
                    .collect(),
            )
        };

        ViewModel::Ready(ReadyView {
            title: self.title.clone(),
            list,
            markers: events.iter().map(MarkerView::new).collect(),
            legend: legend(),
            sidebar: SidebarView {
                visible: self.sidebar.is_visible(self.viewport.as_ref()),
                toggle_visible: self.viewport.is_narrow(),
            },
            camera: self.selection.camera(),
            focus,
        })
    }
}

/// Carry out the surface-facing effects against `surface`.
///
/// Fetches are returned for the caller to schedule. Layout fixes are applied
/// immediately; callers that want the delay should wait before calling.
pub fn apply_surface_effects(effects: Vec<Effect>, surface: &mut dyn MapSurface) -> Vec<RequestToken> {
    let mut fetches = Vec::new();
    for effect in effects {
        match effect {
            Effect::Fetch(token) => fetches.push(token),
            Effect::FlyTo(flight) => surface.fly_to(&flight),
            Effect::InvalidateLayout { .. } => surface.invalidate_size(),
        }
    }
    fetches
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ranking::tests::event;
    use crate::selection::FOCUS_ZOOM_FLOOR;
    use crate::sidebar::SharedViewport;
    use crate::viewmodel::NO_DATA_NOTICE;

    #[derive(Default)]
    struct RecordingSurface {
        flights: Vec<CameraFlight>,
        layout_fixes: usize,
    }

    impl MapSurface for RecordingSurface {
        fn fly_to(&mut self, flight: &CameraFlight) {
            self.flights.push(*flight);
        }

        fn invalidate_size(&mut self) {
            self.layout_fixes += 1;
        }
    }

    fn binding(width: u32) -> (ViewBinding, SharedViewport) {
        let viewport = SharedViewport::new(width);
        (ViewBinding::new(Arc::new(viewport.clone())), viewport)
    }

    fn fetch_token(effect: Option<&Effect>) -> RequestToken {
        match effect {
            Some(Effect::Fetch(token)) => *token,
            other => panic!("expected fetch effect, got {other:?}"),
        }
    }

    fn sample_feed() -> Feed {
        Feed {
            title: Some("Past Day".into()),
            events: vec![
                event("a", Some(6.5), 100),
                event("b", Some(3.2), 300),
                event("c", Some(1.0), 200),
            ],
        }
    }

    fn network_error() -> FeedError {
        FeedError::Status {
            status: 502,
            body: "bad gateway".into(),
        }
    }

    fn ready(width: u32) -> (ViewBinding, SharedViewport) {
        let (mut view, viewport) = binding(width);
        let effects = view.mount();
        let token = fetch_token(effects.first());
        assert!(view.complete_fetch(token, Ok(sample_feed())));
        (view, viewport)
    }

    #[test]
    fn test_mount_starts_loading_with_fetch_and_layout_fix() {
        let (mut view, _) = binding(1200);
        let effects = view.mount();

        assert_eq!(view.fetch_state(), &FetchState::Loading);
        assert_eq!(view.render(), ViewModel::Loading);
        assert!(matches!(effects[0], Effect::Fetch(_)));
        assert_eq!(
            effects[1],
            Effect::InvalidateLayout {
                after: LAYOUT_FIX_DELAY
            }
        );

        let mut surface = RecordingSurface::default();
        let fetches = apply_surface_effects(effects, &mut surface);
        assert_eq!(fetches.len(), 1);
        assert_eq!(surface.layout_fixes, 1);
        assert!(surface.flights.is_empty());
    }

    #[test]
    fn test_ready_renders_ranked_list_markers_and_legend() {
        let (view, _) = ready(1200);

        let ViewModel::Ready(ready) = view.render() else {
            panic!("expected ready view");
        };
        let ListView::Events(items) = &ready.list else {
            panic!("expected events");
        };
        let ids: Vec<&str> = items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, ["b", "c", "a"]);
        assert_eq!(ready.markers.len(), 3);
        assert_eq!(ready.legend.len(), 4);
        assert_eq!(ready.title.as_deref(), Some("Past Day"));
        assert_eq!(ready.focus, None);
        assert!(ready.sidebar.visible);
        assert!(!ready.sidebar.toggle_visible);
    }

    #[test]
    fn test_list_is_bounded_but_map_shows_everything() {
        let (mut view, _) = binding(1200);
        let token = fetch_token(view.mount().first());
        let events = (0..25).map(|i| event(&format!("e{i}"), Some(2.0), i)).collect();
        view.complete_fetch(token, Ok(Feed { title: None, events }));

        let ViewModel::Ready(ready) = view.render() else {
            panic!("expected ready view");
        };
        assert!(matches!(&ready.list, ListView::Events(items) if items.len() == LIST_LIMIT));
        assert_eq!(ready.markers.len(), 25);
    }

    #[test]
    fn test_failure_then_retry_recovers() {
        let (mut view, _) = binding(1200);
        let token = fetch_token(view.mount().first());
        assert!(view.complete_fetch(token, Err(network_error())));

        assert_eq!(
            view.render(),
            ViewModel::Failed {
                message: GENERIC_FAILURE_MESSAGE.to_string()
            }
        );

        let retry = view.retry();
        let token = fetch_token(retry.as_ref());
        assert_eq!(view.fetch_state(), &FetchState::Loading);

        assert!(view.complete_fetch(token, Ok(sample_feed())));
        assert!(matches!(view.fetch_state(), FetchState::Ready(events) if events.len() == 3));
        assert!(matches!(view.render(), ViewModel::Ready(_)));
    }

    #[test]
    fn test_retry_and_refresh_guards() {
        let (mut view, _) = binding(1200);
        let token = fetch_token(view.mount().first());

        // Loading: both inert
        assert_eq!(view.refresh(), None);
        assert_eq!(view.retry(), None);

        view.complete_fetch(token, Ok(sample_feed()));
        // Ready: retry is not offered, refresh is
        assert_eq!(view.retry(), None);
        assert!(matches!(view.refresh(), Some(Effect::Fetch(_))));
        assert_eq!(view.fetch_state(), &FetchState::Loading);
    }

    #[test]
    fn test_empty_feed_renders_no_data() {
        let (mut view, _) = binding(1200);
        let token = fetch_token(view.mount().first());
        view.complete_fetch(token, Ok(Feed::default()));

        let ViewModel::Ready(ready) = view.render() else {
            panic!("expected ready view");
        };
        assert_eq!(ready.list, ListView::NoData);
        assert!(ready.markers.is_empty());
        assert!(!NO_DATA_NOTICE.is_empty());
    }

    #[test]
    fn test_stale_completion_is_discarded() {
        let (mut view, _) = binding(1200);
        let first = fetch_token(view.mount().first());
        let second = fetch_token(view.mount().first());
        assert_ne!(first, second);

        // Newest request finishes first, then the older one limps in.
        assert!(view.complete_fetch(second, Ok(sample_feed())));
        assert!(!view.complete_fetch(first, Err(network_error())));
        assert!(matches!(view.fetch_state(), FetchState::Ready(_)));

        // A completion for an already-applied token is also stale.
        assert!(!view.complete_fetch(second, Ok(Feed::default())));
        assert!(matches!(view.fetch_state(), FetchState::Ready(events) if events.len() == 3));
    }

    #[test]
    fn test_select_flies_every_time() {
        let (mut view, _) = ready(1200);
        let mut surface = RecordingSurface::default();

        for _ in 0..2 {
            let effect = view.select("a").expect("known event");
            apply_surface_effects(vec![effect], &mut surface);
        }

        assert_eq!(surface.flights.len(), 2);
        assert_eq!(view.selection().revision(), 2);
        let target = surface.flights[1].target;
        assert!((target.center.latitude - 20.0).abs() < f64::EPSILON);
        assert!((target.zoom - FOCUS_ZOOM_FLOOR).abs() < f64::EPSILON);

        let ViewModel::Ready(ready) = view.render() else {
            panic!("expected ready view");
        };
        assert!(ready.focus.is_some());
        assert!((ready.camera.zoom - FOCUS_ZOOM_FLOOR).abs() < f64::EPSILON);
    }

    #[test]
    fn test_select_unknown_or_not_ready_is_noop() {
        let (mut view, _) = binding(1200);
        view.mount();
        assert_eq!(view.select("a"), None);

        let (mut view, _) = ready(1200);
        assert_eq!(view.select("missing"), None);
        assert_eq!(view.selection().revision(), 0);
        assert_eq!(view.selection().focus(), None);
    }

    #[test]
    fn test_select_collapses_sidebar_on_narrow_only() {
        let (mut narrow, _) = ready(400);
        narrow.toggle_sidebar();
        assert_eq!(narrow.sidebar(), SidebarState::Expanded);
        narrow.select("b");
        assert_eq!(narrow.sidebar(), SidebarState::Collapsed);

        let ViewModel::Ready(ready_view) = narrow.render() else {
            panic!("expected ready view");
        };
        assert!(!ready_view.sidebar.visible);
        assert!(ready_view.sidebar.toggle_visible);

        let (mut wide, _) = ready(1400);
        wide.select("b");
        assert_eq!(wide.sidebar(), SidebarState::Expanded);
    }

    #[test]
    fn test_selection_survives_refresh() {
        let (mut view, _) = ready(1200);
        view.select("c");
        let focus = view.selection().focus();

        let token = fetch_token(view.refresh().as_ref());
        view.complete_fetch(token, Ok(sample_feed()));
        assert_eq!(view.selection().focus(), focus);
    }

    #[test]
    fn test_remount_reads_current_viewport() {
        let (mut view, viewport) = binding(1200);
        view.mount();
        assert_eq!(view.sidebar(), SidebarState::Expanded);

        viewport.set_width(600);
        view.mount();
        assert_eq!(view.sidebar(), SidebarState::Collapsed);
    }
}
