//! Selection and camera coordination.
//!
//! Tracks the focused event's coordinates and turns every selection into one
//! animated camera flight for the map surface.

use std::time::Duration;

use serde::Serialize;

/// Duration of a camera flight to a selected event.
pub const FLIGHT_DURATION: Duration = Duration::from_millis(1500);

/// Flights never zoom out below this level.
pub const FOCUS_ZOOM_FLOOR: f64 = 5.0;

/// World view shown before the first selection.
pub const WORLD_CENTER: Coordinates = Coordinates {
    latitude: 20.0,
    longitude: 0.0,
};
pub const WORLD_ZOOM: f64 = 2.0;

/// A point on the map.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

/// The map viewport.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Camera {
    pub center: Coordinates,
    pub zoom: f64,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            center: WORLD_CENTER,
            zoom: WORLD_ZOOM,
        }
    }
}

/// Easing curve for camera flights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Easing {
    EaseInOut,
}

/// An animated move of the camera, handed to the map surface.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CameraFlight {
    pub target: Camera,
    #[serde(rename = "duration_ms", serialize_with = "serialize_millis")]
    pub duration: Duration,
    pub easing: Easing,
    /// Selection revision that produced this flight
    pub revision: u64,
}

fn serialize_millis<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

/// Owns the selection state and the camera it drives.
#[derive(Debug, Clone, Default)]
pub struct SelectionCoordinator {
    focus: Option<Coordinates>,
    camera: Camera,
    revision: u64,
}

impl SelectionCoordinator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Focus the given coordinates.
    ///
    /// Every call yields exactly one flight, including repeat selections of
    /// the same point.
    pub fn select(&mut self, coordinates: Coordinates) -> CameraFlight {
        self.focus = Some(coordinates);
        self.revision += 1;
        self.camera = Camera {
            center: coordinates,
            zoom: self.camera.zoom.max(FOCUS_ZOOM_FLOOR),
        };

        CameraFlight {
            target: self.camera,
            duration: FLIGHT_DURATION,
            easing: Easing::EaseInOut,
            revision: self.revision,
        }
    }

    /// Record a zoom level the user reached on the map.
    pub fn set_zoom(&mut self, zoom: f64) {
        if zoom.is_finite() {
            self.camera.zoom = zoom;
        }
    }

    #[must_use]
    pub fn focus(&self) -> Option<Coordinates> {
        self.focus
    }

    #[must_use]
    pub fn camera(&self) -> Camera {
        self.camera
    }

    /// Number of selections applied so far.
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.revision
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOKYO: Coordinates = Coordinates {
        latitude: 35.68,
        longitude: 139.69,
    };

    #[test]
    fn test_initial_world_view() {
        let coordinator = SelectionCoordinator::new();
        assert_eq!(coordinator.focus(), None);
        assert_eq!(coordinator.camera().center, WORLD_CENTER);
        assert!((coordinator.camera().zoom - WORLD_ZOOM).abs() < f64::EPSILON);
        assert_eq!(coordinator.revision(), 0);
    }

    #[test]
    fn test_select_flies_to_target_at_zoom_floor() {
        let mut coordinator = SelectionCoordinator::new();
        let flight = coordinator.select(TOKYO);

        assert_eq!(coordinator.focus(), Some(TOKYO));
        assert_eq!(flight.target.center, TOKYO);
        assert!((flight.target.zoom - FOCUS_ZOOM_FLOOR).abs() < f64::EPSILON);
        assert_eq!(flight.duration, FLIGHT_DURATION);
        assert_eq!(flight.easing, Easing::EaseInOut);
    }

    #[test]
    fn test_select_keeps_deeper_zoom() {
        let mut coordinator = SelectionCoordinator::new();
        coordinator.set_zoom(9.0);
        let flight = coordinator.select(TOKYO);
        assert!((flight.target.zoom - 9.0).abs() < f64::EPSILON);

        coordinator.set_zoom(f64::NAN);
        assert!((coordinator.camera().zoom - 9.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_reselect_same_point_triggers_again() {
        let mut coordinator = SelectionCoordinator::new();
        let first = coordinator.select(TOKYO);
        let second = coordinator.select(TOKYO);

        assert_eq!(first.revision, 1);
        assert_eq!(second.revision, 2);
        assert_eq!(coordinator.revision(), 2);
        assert_eq!(first.target, second.target);
    }

    #[test]
    fn test_flight_serializes_duration_in_millis() {
        let mut coordinator = SelectionCoordinator::new();
        let json = serde_json::to_value(coordinator.select(TOKYO)).expect("serializable");
        assert_eq!(json["duration_ms"], 1500);
        assert_eq!(json["easing"], "ease-in-out");
        assert_eq!(json["revision"], 1);
    }
}
