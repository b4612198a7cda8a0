//! Metadata writer determinism over the public API

use crate::support::{example_descriptor, sample_jpeg};
use mapillary_sequence_downloader::exif::{GeoTagBuilder, MetadataWriter, WriterError};
use mapillary_sequence_downloader::ProjectionKind;

#[test]
fn writing_the_same_record_twice_is_byte_identical() {
    let builder = GeoTagBuilder::new();
    let writer = MetadataWriter::new();
    let source = sample_jpeg();

    let descriptor = example_descriptor("777");
    let first = writer
        .embed(&source, &builder.build(&descriptor).unwrap())
        .unwrap();
    let second = writer
        .embed(&source, &builder.build(&descriptor).unwrap())
        .unwrap();

    assert_eq!(first, second);
}

#[test]
fn writing_is_idempotent_over_its_own_output() {
    let builder = GeoTagBuilder::new();
    let writer = MetadataWriter::new();
    let source = sample_jpeg();

    let mut descriptor = example_descriptor("777");
    descriptor.projection = ProjectionKind::Spherical;

    let once = writer
        .embed(&source, &builder.build(&descriptor).unwrap())
        .unwrap();
    let twice = writer
        .embed(&once, &builder.build(&descriptor).unwrap())
        .unwrap();

    assert_eq!(once, twice, "re-tagging must replace, not accumulate");
}

#[test]
fn corrupt_payload_surfaces_as_decode_error() {
    let builder = GeoTagBuilder::new();
    let writer = MetadataWriter::new();
    let record = builder.build(&example_descriptor("777")).unwrap();

    let result = writer.embed(&[0x00, 0x01, 0x02, 0x03], &record);
    assert!(matches!(result, Err(WriterError::Decode(_))));
}

#[test]
fn quality_reencode_still_decodes_and_carries_exif() {
    let builder = GeoTagBuilder::new();
    let writer = MetadataWriter::new().with_quality(Some(70));
    let record = builder.build(&example_descriptor("777")).unwrap();

    let tagged = writer.embed(&sample_jpeg(), &record).unwrap();
    image::load_from_memory(&tagged).expect("re-encoded output must stay decodable");
    assert!(mapillary_sequence_downloader::exif::writer::is_geotagged_jpeg(&tagged));
}
