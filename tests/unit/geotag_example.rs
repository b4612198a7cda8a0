//! Worked example: one descriptor through builder and layout

use crate::support::{example_descriptor, example_instant};
use mapillary_sequence_downloader::exif::GeoTagBuilder;
use mapillary_sequence_downloader::output::SequenceLayout;
use std::path::Path;

const METERS_PER_DEGREE: f64 = 111_320.0;

#[test]
fn example_descriptor_produces_expected_record_and_filename() {
    let descriptor = example_descriptor("1234567890");
    let record = GeoTagBuilder::new().build(&descriptor).unwrap();

    // Position error under 0.0002 m equivalent.
    let lat_err = (record.latitude.to_decimal_degrees() - 37.7749).abs() * METERS_PER_DEGREE;
    let lon_err = (record.longitude.to_decimal_degrees() + 122.4194).abs() * METERS_PER_DEGREE;
    assert!(lat_err < 0.0002, "latitude error {lat_err} m");
    assert!(lon_err < 0.0002, "longitude error {lon_err} m");

    // Bearing encodes to exactly 271.5 degrees.
    let bearing = record.bearing.unwrap();
    assert_eq!(bearing.numerator * 2, bearing.denominator * 543);

    // Altitude 15.2 m above sea level.
    let altitude = record.altitude.unwrap();
    assert!(!altitude.below_sea_level);
    assert!((altitude.meters.to_f64() - 15.2).abs() < 1e-9);

    // Millisecond component survives.
    assert_eq!(record.capture.millis, 120);

    // Output filename derives from the capture instant.
    let layout = SequenceLayout::new(Path::new("out"), "seqExample", example_instant());
    let path = layout.image_path(example_instant());
    assert_eq!(
        path.file_name().unwrap().to_str().unwrap(),
        "20250728_180730_120.jpg"
    );
}

#[test]
fn descriptor_without_altitude_produces_record_without_altitude() {
    let mut descriptor = example_descriptor("1234567890");
    descriptor.altitude = None;
    let record = GeoTagBuilder::new().build(&descriptor).unwrap();
    assert!(record.altitude.is_none());
}
