//! Geo tag record assembly
//!
//! Converts one [`ImageDescriptor`] into the complete, internally consistent
//! set of values the metadata writer embeds: DMS coordinate triples with
//! hemisphere references, optional altitude and bearing rationals, and a
//! capture timestamp split into civil date-time, rational sub-second and
//! resolved UTC offset.
//!
//! Absence is meaningful throughout: a missing altitude stays missing (zero
//! is a valid altitude), missing camera identity stays missing (an empty
//! string is not "unknown"), and an unresolvable timezone omits the offset
//! rather than pretending the capture happened at UTC.

use crate::exif::rational::{Rational, RationalError};
use crate::exif::timezone;
use crate::{ImageDescriptor, ProjectionKind};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Timelike, Utc};
use tracing::warn;

/// Denominator bound for DMS seconds.
///
/// One arc second of latitude is about 30.9 m, so the worst-case rounding
/// error of 1/(2 * 10^7) s translates to roughly 1.5 micrometers on the
/// ground - three orders of magnitude inside the sub-0.2 mm target. The
/// bound also keeps the numerator (< 60 * 10^7) inside the u32 range EXIF
/// rationals require.
const SECONDS_DENOMINATOR_BOUND: u64 = 10_000_000;

/// Denominator bound for altitude (meters) and bearing (degrees).
const SCALAR_DENOMINATOR_BOUND: u64 = 100_000;

/// Denominator bound for the sub-second fraction of a capture instant.
/// Capture timestamps carry millisecond precision, so 10^3 is exact.
const SUBSEC_DENOMINATOR_BOUND: u64 = 1_000;

/// Geo tag assembly errors. Terminal for the affected image only.
#[derive(Debug, thiserror::Error)]
pub enum GeoTagError {
    /// Descriptor carries no coordinate pair
    #[error("image {0} has no coordinates")]
    MissingCoordinates(String),

    /// Latitude outside [-90, 90]
    #[error("latitude {0} out of range [-90, 90]")]
    LatitudeOutOfRange(f64),

    /// Longitude outside [-180, 180]
    #[error("longitude {0} out of range [-180, 180]")]
    LongitudeOutOfRange(f64),

    /// Rational encoding failed
    #[error("rational encoding failed: {0}")]
    Rational(#[from] RationalError),
}

/// A coordinate axis split into degrees/minutes/seconds rationals plus the
/// hemisphere reference that carries the sign.
#[derive(Debug, PartialEq)]
pub struct DmsAngle {
    /// Whole degrees, denominator 1
    pub degrees: Rational,
    /// Whole minutes, denominator 1
    pub minutes: Rational,
    /// Seconds, best-rational encoded
    pub seconds: Rational,
    /// Hemisphere reference: `N`/`S` for latitude, `E`/`W` for longitude
    pub hemisphere: char,
}

impl DmsAngle {
    /// Reassemble the signed decimal-degree value.
    pub fn to_decimal_degrees(&self) -> f64 {
        let magnitude = self.degrees.to_f64()
            + self.minutes.to_f64() / 60.0
            + self.seconds.to_f64() / 3600.0;
        match self.hemisphere {
            'S' | 'W' => -magnitude,
            _ => magnitude,
        }
    }
}

/// Altitude value plus its sea-level reference.
#[derive(Debug, PartialEq)]
pub struct AltitudeTag {
    /// Magnitude in meters, non-negative
    pub meters: Rational,
    /// True when the capture point lies below sea level
    pub below_sea_level: bool,
}

/// Capture instant split into the fields the EXIF tag set needs.
#[derive(Debug, PartialEq)]
pub struct CaptureTimestamp {
    /// Civil date-time at the capture location (UTC wall time when the zone
    /// could not be resolved)
    pub local: NaiveDateTime,
    /// Signed `+HH:MM` offset, absent when the coordinate resolved to no zone
    pub utc_offset: Option<String>,
    /// Fractional second in [0, 1), millisecond-exact
    pub subsec: Rational,
    /// Millisecond component, for filenames and the sub-second tag digits
    pub millis: u32,
    /// UTC calendar date of the capture
    pub utc_date: NaiveDate,
    /// UTC time of day as hour/minute/second rationals; the sub-second
    /// fraction is folded into the seconds entry
    pub utc_time: [Rational; 3],
}

/// Complete metadata record for one image.
///
/// Built once per descriptor, immutable afterwards, and deliberately not
/// `Clone`: exactly one writer consumes it.
#[derive(Debug)]
pub struct GeoTagRecord {
    /// Image identifier the record was built for
    pub image_id: String,
    /// Sequence the image belongs to
    pub sequence_id: String,
    /// Latitude as DMS with `N`/`S` reference
    pub latitude: DmsAngle,
    /// Longitude as DMS with `E`/`W` reference
    pub longitude: DmsAngle,
    /// Altitude, absent when the source reported none
    pub altitude: Option<AltitudeTag>,
    /// Compass bearing in [0, 360) referenced to true north, absent when the
    /// source reported none
    pub bearing: Option<Rational>,
    /// Capture timestamp fields
    pub capture: CaptureTimestamp,
    /// Camera manufacturer, absent when unknown
    pub camera_make: Option<String>,
    /// Camera model, absent when unknown
    pub camera_model: Option<String>,
    /// True for 360° content; drives the projection marker
    pub spherical: bool,
}

impl GeoTagRecord {
    /// Whether the record was built without a resolvable UTC offset.
    pub fn offset_omitted(&self) -> bool {
        self.capture.utc_offset.is_none()
    }
}

/// Builds [`GeoTagRecord`]s from descriptors.
#[derive(Debug, Clone, Default)]
pub struct GeoTagBuilder;

impl GeoTagBuilder {
    /// Create a builder with the default precision bounds.
    pub fn new() -> Self {
        Self
    }

    /// Build the record for one descriptor.
    ///
    /// # Errors
    /// [`GeoTagError::MissingCoordinates`] and the out-of-range variants are
    /// terminal for this image; the caller records the failure and moves on.
    pub fn build(&self, descriptor: &ImageDescriptor) -> Result<GeoTagRecord, GeoTagError> {
        let (lat, lon) = match (descriptor.latitude, descriptor.longitude) {
            (Some(lat), Some(lon)) => (lat, lon),
            _ => {
                return Err(GeoTagError::MissingCoordinates(
                    descriptor.image_id.clone(),
                ))
            }
        };

        if !(-90.0..=90.0).contains(&lat) || !lat.is_finite() {
            return Err(GeoTagError::LatitudeOutOfRange(lat));
        }
        if !(-180.0..=180.0).contains(&lon) || !lon.is_finite() {
            return Err(GeoTagError::LongitudeOutOfRange(lon));
        }

        let latitude = encode_dms(lat, if lat < 0.0 { 'S' } else { 'N' })?;
        let longitude = encode_dms(lon, if lon < 0.0 { 'W' } else { 'E' })?;

        let altitude = match descriptor.altitude {
            Some(meters) => Some(AltitudeTag {
                meters: Rational::approximate(meters.abs(), SCALAR_DENOMINATOR_BOUND)?,
                below_sea_level: meters < 0.0,
            }),
            None => None,
        };

        let bearing = match descriptor.bearing {
            Some(raw) => {
                let normalized = normalize_bearing(raw)
                    .ok_or(RationalError::NonFinite(raw))?;
                Some(Rational::approximate(
                    normalized,
                    SCALAR_DENOMINATOR_BOUND,
                )?)
            }
            None => None,
        };

        let capture = build_capture(lat, lon, descriptor.captured_at)?;
        if capture.utc_offset.is_none() {
            warn!(
                image_id = %descriptor.image_id,
                latitude = lat,
                longitude = lon,
                "coordinate resolved to no timezone; omitting UTC offset"
            );
        }

        Ok(GeoTagRecord {
            image_id: descriptor.image_id.clone(),
            sequence_id: descriptor.sequence_id.clone(),
            latitude,
            longitude,
            altitude,
            bearing,
            capture,
            camera_make: descriptor.camera_make.clone().filter(|s| !s.is_empty()),
            camera_model: descriptor.camera_model.clone().filter(|s| !s.is_empty()),
            spherical: descriptor.projection == ProjectionKind::Spherical,
        })
    }
}

/// Wrap a bearing into [0, 360). Returns `None` for non-finite input.
fn normalize_bearing(raw: f64) -> Option<f64> {
    if !raw.is_finite() {
        return None;
    }
    let wrapped = raw.rem_euclid(360.0);
    // rem_euclid of a tiny negative can land exactly on 360.0
    Some(if wrapped >= 360.0 { 0.0 } else { wrapped })
}

/// Split signed decimal degrees into a DMS triple.
///
/// Float residue can push the seconds term to exactly 60; the carry is
/// propagated so the triple always satisfies minutes < 60, seconds < 60.
fn encode_dms(value: f64, hemisphere: char) -> Result<DmsAngle, GeoTagError> {
    let magnitude = value.abs();
    let mut degrees = magnitude.floor();
    let mut minutes = ((magnitude - degrees) * 60.0).floor();
    let seconds = (magnitude - degrees - minutes / 60.0) * 3600.0;

    // The encoder may legitimately round a seconds value like 59.9999999964
    // up to exactly 60/1, so the carry check runs on the encoded value.
    let mut seconds = Rational::approximate(seconds, SECONDS_DENOMINATOR_BOUND)?;
    if seconds.to_f64() >= 60.0 {
        seconds = Rational {
            numerator: 0,
            denominator: 1,
        };
        minutes += 1.0;
    }
    if minutes >= 60.0 {
        minutes -= 60.0;
        degrees += 1.0;
    }

    Ok(DmsAngle {
        degrees: Rational::approximate(degrees, 1)?,
        minutes: Rational::approximate(minutes, 1)?,
        seconds,
        hemisphere,
    })
}

fn build_capture(
    lat: f64,
    lon: f64,
    instant: DateTime<Utc>,
) -> Result<CaptureTimestamp, GeoTagError> {
    let millis = instant.timestamp_subsec_millis();
    let subsec = Rational::approximate(f64::from(millis) / 1000.0, SUBSEC_DENOMINATOR_BOUND)?;

    let context = timezone::resolve(lat, lon, instant);
    let (local, utc_offset) = match &context {
        Some(ctx) => (ctx.local, Some(ctx.offset_string())),
        None => (instant.naive_utc(), None),
    };

    let utc = instant.naive_utc();
    let seconds_with_subsec = f64::from(utc.second()) + f64::from(millis) / 1000.0;
    let utc_time = [
        Rational::approximate(f64::from(utc.hour()), 1)?,
        Rational::approximate(f64::from(utc.minute()), 1)?,
        Rational::approximate(seconds_with_subsec, SUBSEC_DENOMINATOR_BOUND * 60)?,
    ];

    Ok(CaptureTimestamp {
        local,
        utc_offset,
        subsec,
        millis,
        utc_date: utc.date(),
        utc_time,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    /// Meters of ground distance per degree at the equator, for error bounds.
    const METERS_PER_DEGREE: f64 = 111_320.0;

    fn descriptor() -> ImageDescriptor {
        ImageDescriptor {
            image_id: "1234567890".to_string(),
            sequence_id: "gEMwF50mdNXOlW7qJUaiRv".to_string(),
            download_url: "https://example.com/signed.jpg".to_string(),
            latitude: Some(37.7749),
            longitude: Some(-122.4194),
            altitude: Some(15.2),
            bearing: Some(271.5),
            captured_at: Utc
                .with_ymd_and_hms(2025, 7, 28, 18, 7, 30)
                .unwrap()
                .checked_add_signed(chrono::Duration::milliseconds(120))
                .unwrap(),
            camera_make: None,
            camera_model: None,
            projection: ProjectionKind::Flat,
        }
    }

    #[test]
    fn test_round_trip_position_error_below_sub_millimeter_target() {
        let record = GeoTagBuilder::new().build(&descriptor()).unwrap();

        let lat_err =
            (record.latitude.to_decimal_degrees() - 37.7749).abs() * METERS_PER_DEGREE;
        let lon_err =
            (record.longitude.to_decimal_degrees() - (-122.4194)).abs() * METERS_PER_DEGREE;
        assert!(lat_err < 0.0002, "latitude error {lat_err} m");
        assert!(lon_err < 0.0002, "longitude error {lon_err} m");

        assert_eq!(record.latitude.hemisphere, 'N');
        assert_eq!(record.longitude.hemisphere, 'W');
        assert_eq!(record.latitude.degrees.numerator, 37);
        assert_eq!(record.longitude.degrees.numerator, 122);
    }

    #[test]
    fn test_bearing_encodes_exactly() {
        let record = GeoTagBuilder::new().build(&descriptor()).unwrap();
        let bearing = record.bearing.unwrap();
        assert_eq!((bearing.numerator, bearing.denominator), (543, 2));
    }

    #[test]
    fn test_bearing_wraps_out_of_range_values() {
        let mut d = descriptor();
        d.bearing = Some(451.5);
        let record = GeoTagBuilder::new().build(&d).unwrap();
        let bearing = record.bearing.unwrap();
        assert!((bearing.to_f64() - 91.5).abs() < 1e-9);

        let mut d = descriptor();
        d.bearing = Some(-90.0);
        let record = GeoTagBuilder::new().build(&d).unwrap();
        assert!((record.bearing.unwrap().to_f64() - 270.0).abs() < 1e-9);
    }

    #[test]
    fn test_altitude_sign_and_absence() {
        let record = GeoTagBuilder::new().build(&descriptor()).unwrap();
        let altitude = record.altitude.unwrap();
        assert!(!altitude.below_sea_level);
        assert_eq!((altitude.meters.numerator, altitude.meters.denominator), (76, 5));

        let mut d = descriptor();
        d.altitude = Some(-3.5);
        let record = GeoTagBuilder::new().build(&d).unwrap();
        assert!(record.altitude.as_ref().unwrap().below_sea_level);

        // Absent altitude must stay absent, never default to zero.
        let mut d = descriptor();
        d.altitude = None;
        let record = GeoTagBuilder::new().build(&d).unwrap();
        assert!(record.altitude.is_none());
    }

    #[test]
    fn test_capture_timestamp_fields() {
        let record = GeoTagBuilder::new().build(&descriptor()).unwrap();
        let capture = &record.capture;

        // San Francisco in July is PDT.
        assert_eq!(capture.utc_offset.as_deref(), Some("-07:00"));
        assert_eq!(
            capture.local,
            NaiveDate::from_ymd_opt(2025, 7, 28)
                .unwrap()
                .and_hms_milli_opt(11, 7, 30, 120)
                .unwrap()
        );

        assert_eq!(capture.millis, 120);
        assert_eq!(
            (capture.subsec.numerator, capture.subsec.denominator),
            (3, 25)
        );

        assert_eq!(capture.utc_date, NaiveDate::from_ymd_opt(2025, 7, 28).unwrap());
        assert_eq!(capture.utc_time[0].numerator, 18);
        assert_eq!(capture.utc_time[1].numerator, 7);
        assert!((capture.utc_time[2].to_f64() - 30.12).abs() < 1e-9);
    }

    #[test]
    fn test_unresolvable_timezone_omits_offset() {
        let mut d = descriptor();
        // Middle of the South Pacific.
        d.latitude = Some(-48.0);
        d.longitude = Some(-123.0);
        let record = GeoTagBuilder::new().build(&d).unwrap();

        if record.offset_omitted() {
            // Local time falls back to UTC wall time.
            assert_eq!(record.capture.local, d.captured_at.naive_utc());
        } else {
            // Some finder data versions attach nearest-territory zones to
            // open ocean; either way the record must still have been built.
            assert!(record.capture.utc_offset.is_some());
        }
    }

    #[test]
    fn test_missing_coordinates_is_terminal_for_the_image() {
        let mut d = descriptor();
        d.latitude = None;
        assert!(matches!(
            GeoTagBuilder::new().build(&d),
            Err(GeoTagError::MissingCoordinates(_))
        ));
    }

    #[test]
    fn test_out_of_range_coordinates_rejected() {
        let mut d = descriptor();
        d.latitude = Some(90.0001);
        assert!(matches!(
            GeoTagBuilder::new().build(&d),
            Err(GeoTagError::LatitudeOutOfRange(_))
        ));

        let mut d = descriptor();
        d.longitude = Some(-180.0001);
        assert!(matches!(
            GeoTagBuilder::new().build(&d),
            Err(GeoTagError::LongitudeOutOfRange(_))
        ));
    }

    #[test]
    fn test_camera_identity_empty_strings_become_absent() {
        let mut d = descriptor();
        d.camera_make = Some(String::new());
        d.camera_model = Some("Max".to_string());
        let record = GeoTagBuilder::new().build(&d).unwrap();
        assert!(record.camera_make.is_none());
        assert_eq!(record.camera_model.as_deref(), Some("Max"));
    }

    #[test]
    fn test_spherical_marker() {
        let mut d = descriptor();
        d.projection = ProjectionKind::Spherical;
        assert!(GeoTagBuilder::new().build(&d).unwrap().spherical);

        d.projection = ProjectionKind::Flat;
        assert!(!GeoTagBuilder::new().build(&d).unwrap().spherical);
    }

    #[test]
    fn test_dms_carry_at_degree_boundary() {
        // 44.99999999999 deg: seconds round to 60 and must carry cleanly.
        let angle = encode_dms(44.999999999999, 'N').unwrap();
        let reassembled = angle.to_decimal_degrees();
        assert!((reassembled - 45.0).abs() * METERS_PER_DEGREE < 0.0002);
        assert!(angle.seconds.to_f64() < 60.0);
        assert!(angle.minutes.to_f64() < 60.0);
    }
}
