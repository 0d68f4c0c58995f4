//! Web server hosting the map surface.
//!
//! Provides the interactive map page using:
//! - Axum for HTTP server
//! - HTMX for swapping the rendered panel
//! - SSE (Server-Sent Events) for camera flights and re-render signals
//! - Leaflet in the page as the map rendering surface
//!
//! Every page load mounts its own [`ViewBinding`] under a fresh
//! [`SessionId`]. Handlers apply a state transition to that session, run the
//! resulting effects against the session's own SSE channel, and answer with
//! the freshly rendered panel. A session ends when its SSE stream drops.

use std::collections::HashMap;
use std::convert::Infallible;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use axum::{
    Form, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{
        Html,
        sse::{Event, KeepAlive, Sse},
    },
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, info};

use crate::client::FeedSource;
use crate::selection::CameraFlight;
use crate::sidebar::SharedViewport;
use crate::view::{Effect, MapSurface, RequestToken, ViewBinding, apply_surface_effects};
use crate::viewmodel::{ListItem, ListView, NO_DATA_NOTICE, ReadyView, ViewModel};

/// Capacity of each session's surface command channel.
const SURFACE_CHANNEL_CAPACITY: usize = 100;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
}

/// Identifies one mounted page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(transparent)]
pub struct SessionId(u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Commands pushed to the map page over SSE.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SurfaceCommand {
    /// Fly the camera
    Camera(CameraFlight),
    /// Re-measure the map container
    Layout,
    /// State changed outside a request; fetch the panel again
    Render,
}

impl SurfaceCommand {
    fn event_name(&self) -> &'static str {
        match self {
            Self::Camera(_) => "camera",
            Self::Layout => "layout",
            Self::Render => "render",
        }
    }
}

/// Map surface backed by a session's broadcast channel.
struct BroadcastSurface {
    tx: broadcast::Sender<SurfaceCommand>,
}

impl MapSurface for BroadcastSurface {
    fn fly_to(&mut self, flight: &CameraFlight) {
        // No subscribers just means the page has not connected yet.
        let _ = self.tx.send(SurfaceCommand::Camera(*flight));
    }

    fn invalidate_size(&mut self) {
        let _ = self.tx.send(SurfaceCommand::Layout);
    }
}

/// State of one mounted page.
struct Session {
    view: ViewBinding,
    /// Width reported by this page
    viewport: SharedViewport,
    /// Surface commands for this page only
    tx: broadcast::Sender<SurfaceCommand>,
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    sessions: Arc<Mutex<HashMap<SessionId, Session>>>,
    next_session: Arc<AtomicU64>,
    /// Where feed data comes from
    source: Arc<dyn FeedSource>,
}

impl AppState {
    pub fn new(source: Arc<dyn FeedSource>) -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            next_session: Arc::new(AtomicU64::new(1)),
            source,
        }
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<SessionId, Session>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mount a fresh view for a page of the given width.
    fn mount(&self, width: u32) -> (SessionId, Html<String>) {
        let id = SessionId(self.next_session.fetch_add(1, Ordering::Relaxed));
        let viewport = SharedViewport::new(width);
        let mut view = ViewBinding::new(Arc::new(viewport.clone()));
        let (tx, _rx) = broadcast::channel(SURFACE_CHANNEL_CAPACITY);

        let effects = view.mount();
        let model = view.render();
        self.sessions().insert(
            id,
            Session {
                view,
                viewport,
                tx: tx.clone(),
            },
        );
        info!(session = %id, width, "session mounted");

        self.run_effects(id, &tx, effects);
        (id, Html(render_view(id, &model)))
    }

    /// Subscribe to a session's surface commands.
    pub fn subscribe(&self, id: SessionId) -> Option<broadcast::Receiver<SurfaceCommand>> {
        self.sessions().get(&id).map(|session| session.tx.subscribe())
    }

    fn end_session(&self, id: SessionId) {
        if self.sessions().remove(&id).is_some() {
            info!(session = %id, "session ended");
        }
    }

    /// Apply `f` to one session, run its effects, and render the panel.
    fn transition<F>(&self, id: SessionId, f: F) -> Result<Html<String>, StatusCode>
    where
        F: FnOnce(&mut Session) -> Vec<Effect>,
    {
        let (effects, model, tx) = {
            let mut sessions = self.sessions();
            let session = sessions.get_mut(&id).ok_or(StatusCode::NOT_FOUND)?;
            let effects = f(session);
            (effects, session.view.render(), session.tx.clone())
        };
        self.run_effects(id, &tx, effects);
        Ok(Html(render_view(id, &model)))
    }

    fn run_effects(&self, id: SessionId, tx: &broadcast::Sender<SurfaceCommand>, effects: Vec<Effect>) {
        let (delayed, immediate): (Vec<Effect>, Vec<Effect>) = effects
            .into_iter()
            .partition(|e| matches!(e, Effect::InvalidateLayout { .. }));

        let mut surface = BroadcastSurface { tx: tx.clone() };
        for token in apply_surface_effects(immediate, &mut surface) {
            self.spawn_fetch(id, token);
        }

        for effect in delayed {
            let Effect::InvalidateLayout { after } = effect else {
                continue;
            };
            let mut surface = BroadcastSurface { tx: tx.clone() };
            tokio::spawn(async move {
                tokio::time::sleep(after).await;
                apply_surface_effects(vec![effect], &mut surface);
            });
        }
    }

    /// Fetch off the async executor, then hand the result to the session.
    fn spawn_fetch(&self, id: SessionId, token: RequestToken) {
        let state = self.clone();
        tokio::spawn(async move {
            let source = Arc::clone(&state.source);
            let result = match tokio::task::spawn_blocking(move || source.fetch_feed()).await {
                Ok(result) => result,
                Err(e) => {
                    tracing::error!("feed fetch task failed: {e}");
                    return;
                }
            };

            let mut sessions = state.sessions();
            let Some(session) = sessions.get_mut(&id) else {
                debug!(session = %id, "session ended before the feed arrived");
                return;
            };
            if session.view.complete_fetch(token, result) {
                let _ = session.tx.send(SurfaceCommand::Render);
            }
        });
    }
}

/// Ends its session when the page's SSE stream is dropped.
struct SessionGuard {
    state: AppState,
    id: SessionId,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.state.end_session(self.id);
    }
}

/// Create the Axum router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/mount", post(mount_handler))
        .route("/session/{session}/view", get(view_handler))
        .route("/session/{session}/refresh", post(refresh_handler))
        .route("/session/{session}/retry", post(retry_handler))
        .route("/session/{session}/select/{id}", post(select_handler))
        .route("/session/{session}/sidebar/toggle", post(toggle_sidebar_handler))
        .route("/session/{session}/viewport", post(viewport_handler))
        .route("/session/{session}/zoom", post(zoom_handler))
        .route("/session/{session}/stream", get(sse_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

/// Start the web server.
pub async fn run_server(config: ServerConfig, source: Arc<dyn FeedSource>) -> anyhow::Result<()> {
    let app = create_router(AppState::new(source));

    let addr = format!("{}:{}", config.host, config.port);
    info!("map UI starting at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============================================================================
// Route Handlers
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct WidthForm {
    width: u32,
}

#[derive(Debug, Deserialize)]
pub struct ZoomForm {
    zoom: f64,
}

type Panel = Result<Html<String>, StatusCode>;

/// Main page handler - serves the map shell.
async fn index_handler() -> Html<&'static str> {
    Html(INDEX_HTML)
}

/// Page load: mount a fresh view in a new session.
async fn mount_handler(State(state): State<AppState>, Form(form): Form<WidthForm>) -> Html<String> {
    state.mount(form.width).1
}

/// Current panel.
async fn view_handler(State(state): State<AppState>, Path(session): Path<SessionId>) -> Panel {
    state.transition(session, |_| Vec::new())
}

async fn refresh_handler(State(state): State<AppState>, Path(session): Path<SessionId>) -> Panel {
    state.transition(session, |s| s.view.refresh().into_iter().collect())
}

async fn retry_handler(State(state): State<AppState>, Path(session): Path<SessionId>) -> Panel {
    state.transition(session, |s| s.view.retry().into_iter().collect())
}

/// List click.
async fn select_handler(
    State(state): State<AppState>,
    Path((session, id)): Path<(SessionId, String)>,
) -> Panel {
    state.transition(session, |s| s.view.select(&id).into_iter().collect())
}

async fn toggle_sidebar_handler(
    State(state): State<AppState>,
    Path(session): Path<SessionId>,
) -> Panel {
    state.transition(session, |s| {
        s.view.toggle_sidebar();
        Vec::new()
    })
}

/// Window resize.
async fn viewport_handler(
    State(state): State<AppState>,
    Path(session): Path<SessionId>,
    Form(form): Form<WidthForm>,
) -> Panel {
    state.transition(session, |s| {
        s.viewport.set_width(form.width);
        Vec::new()
    })
}

/// Zoom level after the user zoomed the map.
async fn zoom_handler(
    State(state): State<AppState>,
    Path(session): Path<SessionId>,
    Form(form): Form<ZoomForm>,
) -> StatusCode {
    match state.sessions().get_mut(&session) {
        Some(s) => {
            s.view.record_zoom(form.zoom);
            StatusCode::NO_CONTENT
        }
        None => StatusCode::NOT_FOUND,
    }
}

/// SSE stream of one session's surface commands.
async fn sse_handler(
    State(state): State<AppState>,
    Path(session): Path<SessionId>,
) -> Result<Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>>, StatusCode> {
    let rx = state.subscribe(session).ok_or(StatusCode::NOT_FOUND)?;
    let guard = SessionGuard { state, id: session };
    let stream = BroadcastStream::new(rx).filter_map(move |result| {
        let _session = &guard;
        let command = result.ok()?;
        let data = serde_json::to_string(&command).ok()?;
        Some(Ok(Event::default().event(command.event_name()).data(data)))
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

/// Health check endpoint.
async fn health_handler() -> &'static str {
    "OK"
}

// ============================================================================
// Panel Rendering
// ============================================================================

/// Escape text for HTML element and attribute content.
fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Serialize for an inline `<script type="application/json">` block.
fn script_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value)
        .unwrap_or_else(|_| "null".to_string())
        .replace("</", "<\\/")
}

/// Render the panel for a session's view model.
#[must_use]
pub fn render_view(session: SessionId, model: &ViewModel) -> String {
    match model {
        ViewModel::Loading => format!(
            r##"<div class="view" data-mode="loading" data-session="{session}" hx-get="/session/{session}/view" hx-trigger="every 2s" hx-target="#panel" hx-swap="innerHTML">
  <div class="busy"><div class="spinner"></div><p>Loading recent earthquakes…</p></div>
</div>"##
        ),
        ViewModel::Failed { message } => format!(
            r##"<div class="view" data-mode="failed" data-session="{session}">
  <div class="failure">
    <p>{message}</p>
    <button class="btn" hx-post="/session/{session}/retry" hx-target="#panel" hx-swap="innerHTML">Retry</button>
  </div>
</div>"##,
            message = escape_html(message)
        ),
        ViewModel::Ready(ready) => render_ready(session, ready),
    }
}

fn render_ready(session: SessionId, ready: &ReadyView) -> String {
    let title = escape_html(ready.title.as_deref().unwrap_or("Recent earthquakes"));

    let list = match &ready.list {
        ListView::NoData => format!(r##"<p class="no-data">{NO_DATA_NOTICE}</p>"##),
        ListView::Events(items) => {
            let rows: String = items
                .iter()
                .map(|item| render_list_item(session, item))
                .collect();
            format!(r##"<ol class="event-list">{rows}</ol>"##)
        }
    };

    let legend: String = ready
        .legend
        .iter()
        .map(|entry| {
            format!(
                r##"<li><span class="dot" style="background:{}"></span>{} <span class="dim">{}</span></li>"##,
                entry.color, entry.label, entry.range
            )
        })
        .collect();

    let toggle = if ready.sidebar.toggle_visible {
        let label = if ready.sidebar.visible { "Hide list" } else { "Show list" };
        format!(
            r##"<button class="btn toggle" hx-post="/session/{session}/sidebar/toggle" hx-target="#panel" hx-swap="innerHTML">{label}</button>"##
        )
    } else {
        String::new()
    };

    let sidebar_class = if ready.sidebar.visible {
        "sidebar"
    } else {
        "sidebar collapsed"
    };

    format!(
        r##"<div class="view" data-mode="ready" data-session="{session}">
  {toggle}
  <aside class="{sidebar_class}">
    <header>
      <h1>{title}</h1>
      <button class="btn" hx-post="/session/{session}/refresh" hx-target="#panel" hx-swap="innerHTML">Refresh</button>
    </header>
    {list}
  </aside>
  <ul class="legend">{legend}</ul>
  <script type="application/json" id="markers-data">{markers}</script>
  <script type="application/json" id="camera-data">{camera}</script>
</div>"##,
        markers = script_json(&ready.markers),
        camera = script_json(&ready.camera),
    )
}

fn render_list_item(session: SessionId, item: &ListItem) -> String {
    let focused = if item.is_focused { " focused" } else { "" };
    // Ids come from the feed and may contain `/`, `?` or `#`.
    format!(
        r##"<li class="event{focused}" hx-post="/session/{session}/select/{id}" hx-target="#panel" hx-swap="innerHTML">
  <span class="mag" style="background:{color}">{mag}</span>
  <span class="place">{place}</span>
  <span class="time">{time}</span>
</li>"##,
        id = escape_html(&urlencoding::encode(&item.id)),
        color = item.color,
        mag = escape_html(&item.magnitude),
        place = escape_html(&item.place),
        time = escape_html(&item.time),
    )
}

// ============================================================================
// HTML Template (embedded for single-binary deployment)
// ============================================================================

const INDEX_HTML: &str = r##"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <meta name="viewport" content="width=device-width, initial-scale=1">
  <title>quakeview</title>
  <link rel="stylesheet" href="https://unpkg.com/leaflet@1.9.4/dist/leaflet.css">
  <script src="https://unpkg.com/leaflet@1.9.4/dist/leaflet.js"></script>
  <script src="https://unpkg.com/htmx.org@2.0.4"></script>
  <style>
    html, body { margin: 0; height: 100%; font-family: system-ui, sans-serif; background: #111418; color: #e3e3e3; }
    #map { position: absolute; inset: 0; }
    #map.hidden { visibility: hidden; }
    #panel { position: absolute; inset: 0; pointer-events: none; z-index: 1000; }
    #panel > .view > * { pointer-events: auto; }
    .busy, .failure { position: absolute; inset: 0; display: flex; flex-direction: column; align-items: center; justify-content: center; gap: 12px; }
    .spinner { width: 36px; height: 36px; border: 4px solid #333; border-top-color: #fc8d59; border-radius: 50%; animation: spin 1s linear infinite; }
    @keyframes spin { to { transform: rotate(360deg); } }
    .btn { background: #2a2f36; color: inherit; border: 1px solid #444; border-radius: 6px; padding: 6px 12px; cursor: pointer; }
    .sidebar { position: absolute; top: 0; left: 0; bottom: 0; width: 340px; overflow-y: auto; background: rgba(17, 20, 24, 0.94); box-shadow: 2px 0 8px rgba(0,0,0,.4); }
    .sidebar.collapsed { display: none; }
    .sidebar header { display: flex; align-items: center; justify-content: space-between; padding: 12px 16px; border-bottom: 1px solid #2a2f36; }
    .sidebar h1 { font-size: 16px; margin: 0; }
    .event-list { list-style: none; margin: 0; padding: 0; }
    .event { display: grid; grid-template-columns: 48px 1fr; grid-template-rows: auto auto; gap: 2px 10px; padding: 10px 16px; border-bottom: 1px solid #1e2227; cursor: pointer; }
    .event:hover { background: #1b1f24; }
    .event.focused { background: #24303c; }
    .mag { grid-row: span 2; display: flex; align-items: center; justify-content: center; border-radius: 6px; color: #111; font-weight: 700; }
    .time, .dim { color: #8a8f98; font-size: 12px; }
    .no-data { padding: 16px; color: #8a8f98; }
    .toggle { position: absolute; top: 12px; right: 12px; z-index: 1001; }
    .legend { position: absolute; right: 12px; bottom: 24px; list-style: none; margin: 0; padding: 10px 14px; background: rgba(17, 20, 24, 0.9); border-radius: 8px; font-size: 13px; }
    .dot { display: inline-block; width: 10px; height: 10px; border-radius: 50%; margin-right: 6px; }
    @media (max-width: 767px) { .sidebar { width: 100%; } }
  </style>
</head>
<body>
  <div id="map" class="hidden"></div>
  <div id="panel" hx-post="/mount" hx-trigger="load" hx-vals='js:{width: window.innerWidth}' hx-swap="innerHTML"></div>
  <script>
    const map = L.map('map', { worldCopyJump: true }).setView([20, 0], 2);
    L.tileLayer('https://{s}.tile.openstreetmap.org/{z}/{x}/{y}.png', {
      attribution: '&copy; OpenStreetMap contributors', maxZoom: 18
    }).addTo(map);
    const markers = L.layerGroup().addTo(map);
    let cameraSynced = false;
    let session = null;
    let stream = null;

    function popupContent(p) {
      const root = document.createElement('div');
      const place = document.createElement('strong');
      place.textContent = p.place;
      const mag = document.createElement('div');
      mag.textContent = 'Magnitude: ' + p.magnitude;
      const time = document.createElement('div');
      time.textContent = p.time;
      root.append(place, mag, time);
      if (p.url) {
        const link = document.createElement('a');
        link.href = p.url; link.target = '_blank'; link.rel = 'noopener';
        link.textContent = 'Event page';
        root.append(link);
      }
      return root;
    }

    function remount() {
      if (stream) { stream.close(); stream = null; }
      session = null;
      cameraSynced = false;
      htmx.ajax('POST', '/mount', { target: '#panel', swap: 'innerHTML', values: { width: window.innerWidth } });
    }

    function connect(id) {
      if (stream) stream.close();
      session = id;
      stream = new EventSource('/session/' + id + '/stream');
      stream.addEventListener('camera', (e) => {
        const f = JSON.parse(e.data);
        map.flyTo([f.target.center.latitude, f.target.center.longitude], f.target.zoom, {
          duration: f.duration_ms / 1000, easeLinearity: 0.25
        });
      });
      stream.addEventListener('layout', () => map.invalidateSize());
      stream.addEventListener('render', () => {
        htmx.ajax('GET', '/session/' + id + '/view', { target: '#panel', swap: 'innerHTML' });
      });
      // The server ends the session once the stream drops.
      stream.onerror = () => {
        if (stream && stream.readyState === EventSource.CLOSED) remount();
      };
    }

    function syncMap() {
      const view = document.querySelector('#panel > .view');
      if (view && view.dataset.session !== session) connect(view.dataset.session);
      const ready = view && view.dataset.mode === 'ready';
      document.getElementById('map').classList.toggle('hidden', !ready);
      markers.clearLayers();
      if (!ready) return;
      if (!cameraSynced) {
        const cam = JSON.parse(document.getElementById('camera-data').textContent);
        map.setView([cam.center.latitude, cam.center.longitude], cam.zoom);
        cameraSynced = true;
      }
      const data = JSON.parse(document.getElementById('markers-data').textContent);
      for (const m of data) {
        L.circleMarker([m.latitude, m.longitude], {
          radius: m.radius, color: m.color, fillColor: m.color, fillOpacity: 0.8, weight: 1
        }).bindPopup(popupContent(m.popup)).addTo(markers);
      }
      map.invalidateSize();
    }
    document.body.addEventListener('htmx:afterSwap', syncMap);
    document.body.addEventListener('htmx:responseError', (e) => {
      if (e.detail.xhr.status === 404) remount();
    });

    map.on('zoomend', () => {
      if (!session) return;
      fetch('/session/' + session + '/zoom', { method: 'POST', body: new URLSearchParams({ zoom: map.getZoom() }) });
    });

    let resizeTimer;
    window.addEventListener('resize', () => {
      clearTimeout(resizeTimer);
      resizeTimer = setTimeout(() => {
        if (!session) return;
        htmx.ajax('POST', '/session/' + session + '/viewport', { target: '#panel', swap: 'innerHTML', values: { width: window.innerWidth } });
      }, 150);
    });
  </script>
</body>
</html>
"##;
