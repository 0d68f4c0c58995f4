//! Terminal output for ranked events.
//!
//! Supports human-readable (with tier colors), JSON, and NDJSON formats.

use std::io::{self, Write};

use serde::Serialize;

use crate::ranking::{RankedEvent, SeverityTier, format_magnitude};
use crate::viewmodel::{NO_DATA_NOTICE, format_time};

// ANSI codes
const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";

/// Output format selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Format {
    /// Human-readable terminal output (default)
    #[default]
    Human,
    /// JSON array
    Json,
    /// Newline-delimited JSON (one object per line)
    Ndjson,
}

impl std::str::FromStr for Format {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "human" => Ok(Self::Human),
            "json" => Ok(Self::Json),
            "ndjson" => Ok(Self::Ndjson),
            _ => Err(format!("unknown format: {s} (expected: human, json, ndjson)")),
        }
    }
}

/// Normalized structure emitted in JSON/NDJSON output.
#[derive(Debug, Clone, Serialize)]
pub struct OutputEvent<'a> {
    pub id: &'a str,
    pub time: String,
    pub magnitude: Option<f64>,
    pub tier: SeverityTier,
    pub color: &'static str,
    pub latitude: f64,
    pub longitude: f64,
    pub depth_km: f64,
    pub place: &'a str,
    pub url: Option<&'a str>,
}

impl<'a> From<&'a RankedEvent> for OutputEvent<'a> {
    fn from(r: &'a RankedEvent) -> Self {
        let e = &r.event;
        Self {
            id: &e.id,
            time: e
                .time()
                .map_or_else(|| "unknown".into(), |t| t.to_rfc3339()),
            magnitude: e.magnitude.filter(|m| m.is_finite()),
            tier: r.tier,
            color: r.color(),
            latitude: e.latitude,
            longitude: e.longitude,
            depth_km: e.depth_km,
            place: &e.place,
            url: e.url.as_deref(),
        }
    }
}

/// Write events in human-readable format, colored by tier.
///
/// # Errors
///
/// Returns an error if writing fails.
pub fn write_human<W: Write>(writer: &mut W, events: &[RankedEvent]) -> io::Result<()> {
    if events.is_empty() {
        return writeln!(writer, "{DIM}{NO_DATA_NOTICE}{RESET}");
    }

    for ranked in events {
        let event = &ranked.event;
        let color = ranked.tier.ansi();
        let mag = format_magnitude(event.magnitude);
        let label = ranked.tier.label();
        let time = format_time(event.time());

        writeln!(
            writer,
            "{color}{BOLD}M{mag:>4}{RESET} │ \
             {color}{label:8}{RESET} │ \
             {DIM}{:>5.0}km{RESET} │ \
             {time} │ \
             {}",
            event.depth_km, event.place
        )?;
    }
    Ok(())
}

/// Write events as a JSON array.
///
/// # Errors
///
/// Returns an error if serialization or writing fails.
pub fn write_json<W: Write>(writer: &mut W, events: &[RankedEvent]) -> io::Result<()> {
    let output: Vec<OutputEvent<'_>> = events.iter().map(OutputEvent::from).collect();
    let json = serde_json::to_string_pretty(&output)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    writeln!(writer, "{json}")
}

/// Write events as newline-delimited JSON.
///
/// # Errors
///
/// Returns an error if serialization or writing fails.
pub fn write_ndjson<W: Write>(writer: &mut W, events: &[RankedEvent]) -> io::Result<()> {
    for event in events {
        let json = serde_json::to_string(&OutputEvent::from(event))
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        writeln!(writer, "{json}")?;
    }
    Ok(())
}

/// Write events in the specified format.
///
/// # Errors
///
/// Returns an error if writing fails.
pub fn write_events<W: Write>(
    writer: &mut W,
    events: &[RankedEvent],
    format: Format,
) -> io::Result<()> {
    match format {
        Format::Human => write_human(writer, events),
        Format::Json => write_json(writer, events),
        Format::Ndjson => write_ndjson(writer, events),
    }
}
