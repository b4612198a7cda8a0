//! Coordinate-to-UTC-offset resolution
//!
//! The EXIF offset tag must reflect the civil time in force at the capture
//! location and instant, including daylight-saving transitions. A coarse
//! longitude/15 estimate gets this wrong for most of the planet, so the
//! coordinate is resolved to an IANA zone first and the zone's rules are
//! evaluated at the capture instant.
//!
//! Resolution can genuinely fail (open ocean, poles). That case is reported
//! as `None`, never substituted with UTC: a missing offset and an offset of
//! +00:00 mean different things to an archival consumer.

use chrono::{DateTime, FixedOffset, NaiveDateTime, Offset, TimeZone, Utc};
use chrono_tz::Tz;
use once_cell::sync::Lazy;
use tzf_rs::DefaultFinder;

/// Shared zone finder.
///
/// Building the finder parses the embedded timezone polygon data, which is
/// far too expensive to repeat per image.
static ZONE_FINDER: Lazy<DefaultFinder> = Lazy::new(DefaultFinder::new);

/// Local civil time context resolved for a capture.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalTimeContext {
    /// IANA zone identifier, e.g. `America/Los_Angeles`
    pub zone_name: String,
    /// UTC offset in force at the capture instant
    pub offset: FixedOffset,
    /// Capture instant expressed as civil time in that zone
    pub local: NaiveDateTime,
}

impl LocalTimeContext {
    /// The offset as a signed `+HH:MM` / `-HH:MM` string, the form the EXIF
    /// offset tags expect.
    pub fn offset_string(&self) -> String {
        let total = self.offset.local_minus_utc();
        let sign = if total < 0 { '-' } else { '+' };
        let total = total.abs();
        format!("{}{:02}:{:02}", sign, total / 3600, (total % 3600) / 60)
    }
}

/// Resolve the local time context for a coordinate at an instant.
///
/// Returns `None` when the coordinate maps to no IANA zone. Daylight-saving
/// rules are honored: the same coordinate yields different offsets for
/// January and July captures in most mid-latitude zones.
pub fn resolve(latitude: f64, longitude: f64, instant: DateTime<Utc>) -> Option<LocalTimeContext> {
    let zone_name = ZONE_FINDER.get_tz_name(longitude, latitude);
    if zone_name.is_empty() {
        return None;
    }

    let tz: Tz = zone_name.parse().ok()?;
    let offset = tz.offset_from_utc_datetime(&instant.naive_utc()).fix();
    let local = instant.with_timezone(&tz).naive_local();

    Some(LocalTimeContext {
        zone_name: zone_name.to_string(),
        offset,
        local,
    })
}
