//! Event ranking and magnitude classification.
//!
//! Events are ordered most recent first and annotated with a severity tier
//! that drives marker color, list badges, and terminal colors.

use serde::Serialize;

use crate::models::RawEvent;

/// Number of events shown in the list panel.
pub const LIST_LIMIT: usize = 10;

// Tier thresholds (inclusive lower bounds)
const SEVERE_MIN: f64 = 6.0;
const MODERATE_MIN: f64 = 4.0;
const LIGHT_MIN: f64 = 2.0;

// ANSI color codes for terminal output
const RED: &str = "\x1b[91m";
const YELLOW: &str = "\x1b[93m";
const GREEN: &str = "\x1b[92m";
const CYAN: &str = "\x1b[96m";

/// Discrete severity bucket derived from magnitude.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SeverityTier {
    Minor,
    Light,
    Moderate,
    Severe,
}

impl SeverityTier {
    /// All tiers, weakest first (legend order).
    pub const ALL: [Self; 4] = [Self::Minor, Self::Light, Self::Moderate, Self::Severe];

    /// Marker and badge color.
    #[must_use]
    pub const fn color(self) -> &'static str {
        match self {
            Self::Severe => "#d73027",
            Self::Moderate => "#fc8d59",
            Self::Light => "#fee08b",
            Self::Minor => "#91cf60",
        }
    }

    /// Display name.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Severe => "Severe",
            Self::Moderate => "Moderate",
            Self::Light => "Light",
            Self::Minor => "Minor",
        }
    }

    /// Magnitude range text for the legend.
    #[must_use]
    pub const fn range(self) -> &'static str {
        match self {
            Self::Severe => "M 6.0+",
            Self::Moderate => "M 4.0 - 5.9",
            Self::Light => "M 2.0 - 3.9",
            Self::Minor => "below M 2.0",
        }
    }

    /// Terminal color for the CLI list.
    #[must_use]
    pub const fn ansi(self) -> &'static str {
        match self {
            Self::Severe => RED,
            Self::Moderate => YELLOW,
            Self::Light => GREEN,
            Self::Minor => CYAN,
        }
    }
}

/// Classify a magnitude into its severity tier.
///
/// Total over every input: missing and NaN magnitudes are `Minor`.
#[must_use]
pub fn classify(magnitude: Option<f64>) -> SeverityTier {
    match magnitude {
        Some(m) if m >= SEVERE_MIN => SeverityTier::Severe,
        Some(m) if m >= MODERATE_MIN => SeverityTier::Moderate,
        Some(m) if m >= LIGHT_MIN => SeverityTier::Light,
        _ => SeverityTier::Minor,
    }
}

/// Format a magnitude with one decimal place, `?` when unknown.
#[must_use]
pub fn format_magnitude(magnitude: Option<f64>) -> String {
    match magnitude {
        Some(m) if m.is_finite() => format!("{m:.1}"),
        _ => "?".to_string(),
    }
}

/// A feed event annotated with its severity tier.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedEvent {
    #[serde(flatten)]
    pub event: RawEvent,
    pub tier: SeverityTier,
}

impl RankedEvent {
    #[must_use]
    pub fn new(event: RawEvent) -> Self {
        let tier = classify(event.magnitude);
        Self { event, tier }
    }

    #[must_use]
    pub fn color(&self) -> &'static str {
        self.tier.color()
    }
}

/// Stable sort, most recent first. Equal timestamps keep feed order.
pub fn sort_by_recency(events: &mut [RawEvent]) {
    events.sort_by(|a, b| b.time_ms.cmp(&a.time_ms));
}

/// Order events by recency and classify each one.
#[must_use]
pub fn rank(mut events: Vec<RawEvent>) -> Vec<RankedEvent> {
    sort_by_recency(&mut events);
    events.into_iter().map(RankedEvent::new).collect()
}

/// The first `n` events of an already ranked collection.
#[must_use]
pub fn top_n(events: &[RankedEvent], n: usize) -> &[RankedEvent] {
    &events[..n.min(events.len())]
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn event(id: &str, magnitude: Option<f64>, time_ms: i64) -> RawEvent {
        RawEvent {
            id: id.to_string(),
            longitude: 10.0,
            latitude: 20.0,
            depth_km: 5.0,
            magnitude,
            place: format!("near {id}"),
            time_ms,
            url: None,
        }
    }

    #[test]
    fn test_classify_thresholds() {
        assert_eq!(classify(Some(6.0)), SeverityTier::Severe);
        assert_eq!(classify(Some(5.99)), SeverityTier::Moderate);
        assert_eq!(classify(Some(4.0)), SeverityTier::Moderate);
        assert_eq!(classify(Some(3.99)), SeverityTier::Light);
        assert_eq!(classify(Some(2.0)), SeverityTier::Light);
        assert_eq!(classify(Some(1.99)), SeverityTier::Minor);
    }

    #[test]
    fn test_classify_degenerate_magnitudes() {
        assert_eq!(classify(None), SeverityTier::Minor);
        assert_eq!(classify(Some(f64::NAN)), SeverityTier::Minor);
        assert_eq!(classify(Some(-1.2)), SeverityTier::Minor);
        assert_eq!(classify(Some(0.0)), SeverityTier::Minor);
        assert_eq!(classify(Some(1e9)), SeverityTier::Severe);
        assert_eq!(classify(Some(f64::INFINITY)), SeverityTier::Severe);
    }

    #[test]
    fn test_format_magnitude() {
        assert_eq!(format_magnitude(Some(4.26)), "4.3");
        assert_eq!(format_magnitude(Some(-0.4)), "-0.4");
        assert_eq!(format_magnitude(None), "?");
        assert_eq!(format_magnitude(Some(f64::NAN)), "?");
    }

    #[test]
    fn test_rank_scenario() {
        let ranked = rank(vec![
            event("a", Some(6.5), 100),
            event("b", Some(3.2), 300),
            event("c", Some(1.0), 200),
        ]);

        let ids: Vec<&str> = ranked.iter().map(|r| r.event.id.as_str()).collect();
        assert_eq!(ids, ["b", "c", "a"]);

        let tiers: Vec<SeverityTier> = ranked.iter().map(|r| r.tier).collect();
        assert_eq!(
            tiers,
            [SeverityTier::Light, SeverityTier::Minor, SeverityTier::Severe]
        );
    }

    #[test]
    fn test_rank_ties_keep_feed_order() {
        let ranked = rank(vec![
            event("first", Some(1.0), 50),
            event("newest", Some(1.0), 90),
            event("second", Some(1.0), 50),
            event("third", Some(1.0), 50),
        ]);
        let ids: Vec<&str> = ranked.iter().map(|r| r.event.id.as_str()).collect();
        assert_eq!(ids, ["newest", "first", "second", "third"]);
    }

    #[test]
    fn test_top_n_bounds() {
        let ranked = rank((0..15).map(|i| event(&i.to_string(), None, i)).collect());
        assert_eq!(top_n(&ranked, LIST_LIMIT).len(), 10);
        assert_eq!(top_n(&ranked, 100).len(), 15);
        assert!(top_n(&ranked, 0).is_empty());
        assert!(top_n(&[], LIST_LIMIT).is_empty());
        assert_eq!(top_n(&ranked, 3), &ranked[..3]);
    }

    #[test]
    fn test_ranked_event_serializes_flat() {
        let ranked = RankedEvent::new(event("x", Some(4.5), 1));
        let json = serde_json::to_value(&ranked).expect("serializable");
        assert_eq!(json["id"], "x");
        assert_eq!(json["tier"], "moderate");
    }

    mod proptest_ranking {
        use super::*;
        use proptest::prelude::*;

        fn magnitude() -> impl Strategy<Value = Option<f64>> {
            prop_oneof![
                Just(None),
                Just(Some(f64::NAN)),
                Just(Some(f64::INFINITY)),
                Just(Some(f64::NEG_INFINITY)),
                (-10.0f64..12.0).prop_map(Some),
                any::<f64>().prop_map(Some),
            ]
        }

        proptest! {
            /// Tiers partition magnitudes exactly at 2.0, 4.0 and 6.0.
            #[test]
            fn prop_classify_partitions(mag in magnitude()) {
                let tier = classify(mag);
                let expected = match mag {
                    Some(m) if m >= 6.0 => SeverityTier::Severe,
                    Some(m) if (4.0..6.0).contains(&m) => SeverityTier::Moderate,
                    Some(m) if (2.0..4.0).contains(&m) => SeverityTier::Light,
                    _ => SeverityTier::Minor,
                };
                prop_assert_eq!(tier, expected);
            }

            /// Sorted descending by time; equal times keep input order.
            #[test]
            fn prop_rank_is_stable_descending(times in prop::collection::vec(0i64..5, 0..40)) {
                let events: Vec<RawEvent> = times
                    .iter()
                    .enumerate()
                    .map(|(i, t)| event(&i.to_string(), None, *t))
                    .collect();
                let ranked = rank(events);

                for pair in ranked.windows(2) {
                    let (a, b) = (&pair[0].event, &pair[1].event);
                    prop_assert!(a.time_ms >= b.time_ms);
                    if a.time_ms == b.time_ms {
                        let ia: usize = a.id.parse().unwrap_or_default();
                        let ib: usize = b.id.parse().unwrap_or_default();
                        prop_assert!(ia < ib);
                    }
                }
            }

            /// `top_n` is a prefix of at most `min(n, len)` elements.
            #[test]
            fn prop_top_n_is_prefix(len in 0usize..30, n in 0usize..40) {
                let ranked = rank((0..len).map(|i| event(&i.to_string(), None, 0)).collect());
                let top = top_n(&ranked, n);
                prop_assert_eq!(top.len(), n.min(len));
                prop_assert_eq!(top, &ranked[..top.len()]);
            }
        }
    }
}
