//! Handshake age parsing.
//!
//! Tunnel tooling reports the latest handshake in several shapes: an
//! elapsed duration (`"0:01:23"`, `"2 days, 3:04:05"`), an ISO-8601
//! timestamp, or Unix epoch seconds. All of them are normalised to an age
//! relative to `now`.

use std::time::Duration;

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeZone, Utc};

use peerwatch_tunnel::HandshakeValue;

/// Textual values meaning "no handshake has ever happened".
pub const NEVER_SENTINELS: &[&str] = &["No Handshake", "N/A", "", "0"];

const NAIVE_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Age of the latest handshake together with its absolute time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HandshakeAge {
    pub age: Duration,
    pub at: DateTime<Utc>,
}

/// Normalise a reported handshake to its age.
///
/// Returns `None` for sentinels, non-positive epochs and anything that
/// cannot be parsed. Timestamps in the future yield a zero age.
pub fn parse_handshake(value: &HandshakeValue, now: DateTime<Utc>) -> Option<HandshakeAge> {
    match value {
        HandshakeValue::Absent => None,
        HandshakeValue::At(at) => Some(since(*at, now)),
        HandshakeValue::Unix(secs) => from_unix(*secs).map(|at| since(at, now)),
        HandshakeValue::Text(text) => parse_text(text.trim(), now),
    }
}

fn parse_text(text: &str, now: DateTime<Utc>) -> Option<HandshakeAge> {
    if NEVER_SENTINELS.contains(&text) {
        return None;
    }
    if let Some(age) = parse_elapsed(text) {
        let at = now.checked_sub_signed(chrono::Duration::from_std(age).ok()?)?;
        return Some(HandshakeAge { age, at });
    }
    if let Some(at) = parse_iso(text) {
        return Some(since(at, now));
    }
    let secs = text.parse::<f64>().ok()?;
    from_unix(secs).map(|at| since(at, now))
}

/// `H:MM:SS`, optionally preceded by `N day, ` or `N days, `.
fn parse_elapsed(text: &str) -> Option<Duration> {
    let (days, clock) = match text.split_once("day") {
        Some((count, rest)) => {
            let days: u64 = count.trim().parse().ok()?;
            let rest = rest.trim_start_matches('s').trim_start_matches(',').trim();
            (days, if rest.is_empty() { "0:00:00" } else { rest })
        }
        None => (0, text),
    };

    let mut fields = clock.split(':');
    let (Some(h), Some(m), Some(s), None) = (fields.next(), fields.next(), fields.next(), fields.next())
    else {
        return None;
    };
    let hours: u64 = h.trim().parse().ok()?;
    let minutes: u64 = m.trim().parse().ok()?;
    let seconds: u64 = s.trim().parse().ok()?;
    let total = days
        .checked_mul(86_400)?
        .checked_add(hours.checked_mul(3_600)?)?
        .checked_add(minutes.checked_mul(60)?)?
        .checked_add(seconds)?;
    Some(Duration::from_secs(total))
}

/// RFC 3339 with offset, or a naive timestamp/date taken as local time.
fn parse_iso(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    let naive = NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}

fn from_unix(secs: f64) -> Option<DateTime<Utc>> {
    if !secs.is_finite() || secs <= 0.0 {
        return None;
    }
    let whole = secs.trunc() as i64;
    let nanos = (secs.fract() * 1e9) as u32;
    DateTime::from_timestamp(whole, nanos)
}

fn since(at: DateTime<Utc>, now: DateTime<Utc>) -> HandshakeAge {
    HandshakeAge {
        age: (now - at).to_std().unwrap_or(Duration::ZERO),
        at,
    }
}
