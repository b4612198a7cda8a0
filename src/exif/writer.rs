//! EXIF/XMP embedding into JPEG containers
//!
//! Serializes a [`GeoTagRecord`] into an EXIF APP1 segment with `little_exif`
//! and splices it into the JPEG byte stream, replacing any existing EXIF
//! segment. Spherical images additionally get an XMP APP1 segment carrying
//! the GPano projection marker, which is the signal panorama viewers key on.
//!
//! The whole operation works on in-memory buffers and is deterministic:
//! embedding the same record into the same bytes twice produces identical
//! output. Nothing derived from the wall clock is ever written.

use crate::exif::geotag::GeoTagRecord;
use crate::exif::rational::Rational;
use little_exif::exif_tag::ExifTag;
use little_exif::filetype::FileExtension;
use little_exif::metadata::Metadata;
use little_exif::rational::uR64;
use std::ops::Range;

/// JPEG start-of-image marker.
const SOI: [u8; 2] = [0xFF, 0xD8];

/// Header that identifies an APP1 segment as EXIF.
const EXIF_HEADER: &[u8] = b"Exif\0\0";

/// Header that identifies an APP1 segment as XMP.
const XMP_HEADER: &[u8] = b"http://ns.adobe.com/xap/1.0/\0";

/// Largest payload a single JPEG segment can carry (two length bytes,
/// length includes itself).
const MAX_SEGMENT_PAYLOAD: usize = u16::MAX as usize - 2;

/// Fixed Software tag value. Version only, never a timestamp, so repeated
/// runs stay byte-identical.
const SOFTWARE_TAG: &str = concat!("mapillary-sequence-downloader ", env!("CARGO_PKG_VERSION"));

/// Metadata writing errors. Terminal for the affected image only.
#[derive(Debug, thiserror::Error)]
pub enum WriterError {
    /// Payload is not decodable as an image (truncated or corrupt download)
    #[error("image payload failed to decode: {0}")]
    Decode(String),

    /// Payload is not a JPEG container the splicer can work with
    #[error("invalid JPEG structure: {0}")]
    InvalidJpeg(String),

    /// EXIF serialization failed
    #[error("EXIF serialization failed: {0}")]
    Exif(String),

    /// Re-encoding at the requested quality failed
    #[error("JPEG re-encode failed: {0}")]
    Encode(String),

    /// A rational value does not fit the unsigned 32-bit EXIF field
    #[error("rational {0} does not fit an EXIF field")]
    RationalOverflow(Rational),
}

/// Embeds [`GeoTagRecord`]s into JPEG bytes.
#[derive(Debug, Clone, Default)]
pub struct MetadataWriter {
    quality: Option<u8>,
}

impl MetadataWriter {
    /// Create a writer that passes pixel data through unchanged.
    pub fn new() -> Self {
        Self { quality: None }
    }

    /// Re-encode pixel data at the given JPEG quality (1-100) before tagging.
    pub fn with_quality(mut self, quality: Option<u8>) -> Self {
        self.quality = quality;
        self
    }

    /// Embed `record` into `bytes`, returning the tagged JPEG.
    ///
    /// The payload is decoded first so a truncated or corrupt download
    /// surfaces here as [`WriterError::Decode`] instead of producing a broken
    /// output file. Unless a quality was requested the original pixel data is
    /// preserved untouched; only metadata segments change.
    pub fn embed(&self, bytes: &[u8], record: &GeoTagRecord) -> Result<Vec<u8>, WriterError> {
        let decoded =
            image::load_from_memory(bytes).map_err(|e| WriterError::Decode(e.to_string()))?;

        let source = match self.quality {
            Some(quality) => {
                let mut reencoded = Vec::new();
                let mut cursor = std::io::Cursor::new(&mut reencoded);
                let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(
                    &mut cursor,
                    quality,
                );
                decoded
                    .write_with_encoder(encoder)
                    .map_err(|e| WriterError::Encode(e.to_string()))?;
                drop(cursor);
                reencoded
            }
            None => bytes.to_vec(),
        };
        drop(decoded);

        let exif_segment = build_exif_segment(record)?;
        let mut output = splice_app1(&source, EXIF_HEADER, &exif_segment)?;

        if record.spherical {
            let xmp_segment = build_xmp_segment(&gpano_packet())?;
            output = splice_app1(&output, XMP_HEADER, &xmp_segment)?;
        }

        Ok(output)
    }
}

/// Whether `bytes` look like a finished output of this writer: a JPEG with an
/// EXIF APP1 segment. Used by the resume check; a partial or foreign file
/// fails the probe and gets re-downloaded.
pub fn is_geotagged_jpeg(bytes: &[u8]) -> bool {
    if bytes.len() < 4 || bytes[..2] != SOI {
        return false;
    }
    matches!(find_app1(bytes, EXIF_HEADER), Ok(search) if search.existing.is_some())
}

fn to_ur64(value: Rational) -> Result<uR64, WriterError> {
    if value.numerator < 0 {
        return Err(WriterError::RationalOverflow(value));
    }
    let nominator =
        u32::try_from(value.numerator).map_err(|_| WriterError::RationalOverflow(value))?;
    let denominator =
        u32::try_from(value.denominator).map_err(|_| WriterError::RationalOverflow(value))?;
    Ok(uR64 {
        nominator,
        denominator,
    })
}

fn dms_to_ur64(angle: &crate::exif::geotag::DmsAngle) -> Result<Vec<uR64>, WriterError> {
    Ok(vec![
        to_ur64(angle.degrees)?,
        to_ur64(angle.minutes)?,
        to_ur64(angle.seconds)?,
    ])
}

/// Serialize the record into a complete EXIF APP1 segment
/// (`FF E1 <len> Exif\0\0 <tiff>`).
fn build_exif_segment(record: &GeoTagRecord) -> Result<Vec<u8>, WriterError> {
    let mut metadata = Metadata::new();

    metadata.set_tag(ExifTag::ImageDescription(format!(
        "Mapillary image {} (sequence {})",
        record.image_id, record.sequence_id
    )));
    metadata.set_tag(ExifTag::Software(SOFTWARE_TAG.to_string()));

    if let Some(make) = &record.camera_make {
        metadata.set_tag(ExifTag::Make(make.clone()));
    }
    if let Some(model) = &record.camera_model {
        metadata.set_tag(ExifTag::Model(model.clone()));
    }

    let capture = &record.capture;
    metadata.set_tag(ExifTag::DateTimeOriginal(
        capture.local.format("%Y:%m:%d %H:%M:%S").to_string(),
    ));
    metadata.set_tag(ExifTag::SubSecTimeOriginal(format!(
        "{:03}",
        capture.millis
    )));
    if let Some(offset) = &capture.utc_offset {
        metadata.set_tag(ExifTag::OffsetTimeOriginal(offset.clone()));
    }

    metadata.set_tag(ExifTag::GPSVersionID(vec![2, 3, 0, 0]));
    metadata.set_tag(ExifTag::GPSLatitudeRef(record.latitude.hemisphere.to_string()));
    metadata.set_tag(ExifTag::GPSLatitude(dms_to_ur64(&record.latitude)?));
    metadata.set_tag(ExifTag::GPSLongitudeRef(
        record.longitude.hemisphere.to_string(),
    ));
    metadata.set_tag(ExifTag::GPSLongitude(dms_to_ur64(&record.longitude)?));

    if let Some(altitude) = &record.altitude {
        metadata.set_tag(ExifTag::GPSAltitudeRef(vec![u8::from(
            altitude.below_sea_level,
        )]));
        metadata.set_tag(ExifTag::GPSAltitude(vec![to_ur64(altitude.meters)?]));
    }

    if let Some(bearing) = record.bearing {
        metadata.set_tag(ExifTag::GPSImgDirectionRef("T".to_string()));
        metadata.set_tag(ExifTag::GPSImgDirection(vec![to_ur64(bearing)?]));
    }

    metadata.set_tag(ExifTag::GPSTimeStamp(vec![
        to_ur64(capture.utc_time[0])?,
        to_ur64(capture.utc_time[1])?,
        to_ur64(capture.utc_time[2])?,
    ]));
    metadata.set_tag(ExifTag::GPSDateStamp(
        capture.utc_date.format("%Y:%m:%d").to_string(),
    ));

    metadata
        .as_u8_vec(FileExtension::JPEG)
        .map_err(|e| WriterError::Exif(format!("{e:?}")))
}

/// Deterministic GPano XMP packet marking 360° content.
fn gpano_packet() -> Vec<u8> {
    let xml = "<?xpacket begin=\"\u{FEFF}\" id=\"W5M0MpCehiHzreSzNTczkc9d\"?>\
<x:xmpmeta xmlns:x=\"adobe:ns:meta/\">\
<rdf:RDF xmlns:rdf=\"http://www.w3.org/1999/02/22-rdf-syntax-ns#\">\
<rdf:Description rdf:about=\"\" xmlns:GPano=\"http://ns.google.com/photos/1.0/panorama/\">\
<GPano:ProjectionType>equirectangular</GPano:ProjectionType>\
<GPano:UsePanoramaViewer>True</GPano:UsePanoramaViewer>\
</rdf:Description>\
</rdf:RDF>\
</x:xmpmeta>\
<?xpacket end=\"w\"?>";
    xml.as_bytes().to_vec()
}

/// Wrap an XMP packet into an APP1 segment.
fn build_xmp_segment(packet: &[u8]) -> Result<Vec<u8>, WriterError> {
    let payload_len = XMP_HEADER.len() + packet.len();
    if payload_len > MAX_SEGMENT_PAYLOAD {
        return Err(WriterError::InvalidJpeg(format!(
            "XMP packet of {payload_len} bytes exceeds a single segment"
        )));
    }

    let mut segment = Vec::with_capacity(4 + payload_len);
    segment.extend_from_slice(&[0xFF, 0xE1]);
    segment.extend_from_slice(&((payload_len + 2) as u16).to_be_bytes());
    segment.extend_from_slice(XMP_HEADER);
    segment.extend_from_slice(packet);
    Ok(segment)
}

/// Result of scanning for an APP1 segment with a given header.
struct SegmentSearch {
    /// Byte range of an existing matching segment
    existing: Option<Range<usize>>,
    /// Where a new segment should be inserted when none exists
    insert_at: usize,
}

/// Walk the JPEG marker stream looking for an APP1 segment whose payload
/// starts with `header`.
///
/// EXIF inserts directly after SOI; any other APP1 inserts after the last
/// APPn segment so the EXIF block stays first.
fn find_app1(data: &[u8], header: &[u8]) -> Result<SegmentSearch, WriterError> {
    if data.len() < 4 || data[..2] != SOI {
        return Err(WriterError::InvalidJpeg("missing SOI marker".to_string()));
    }

    let mut pos = 2;
    let mut last_app_end = 2;

    while pos + 4 <= data.len() {
        if data[pos] != 0xFF {
            return Err(WriterError::InvalidJpeg(format!(
                "expected marker at offset {pos}"
            )));
        }

        let marker = data[pos + 1];
        match marker {
            // Fill bytes before a marker
            0xFF => {
                pos += 1;
                continue;
            }
            // Start of scan: metadata segments end here
            0xDA => break,
            // EOI or restart markers carry no length
            0xD9 => break,
            0xD0..=0xD7 | 0x01 => {
                pos += 2;
                continue;
            }
            _ => {
                let length = u16::from_be_bytes([data[pos + 2], data[pos + 3]]) as usize;
                if length < 2 {
                    return Err(WriterError::InvalidJpeg(format!(
                        "segment length {length} at offset {pos}"
                    )));
                }
                let end = pos + 2 + length;
                if end > data.len() {
                    return Err(WriterError::InvalidJpeg(
                        "segment extends past end of data".to_string(),
                    ));
                }

                if marker == 0xE1 {
                    let payload = &data[pos + 4..end];
                    if payload.starts_with(header) {
                        return Ok(SegmentSearch {
                            existing: Some(pos..end),
                            insert_at: pos,
                        });
                    }
                }

                if (0xE0..=0xEF).contains(&marker) {
                    last_app_end = end;
                }

                pos = end;
            }
        }
    }

    let insert_at = if header == EXIF_HEADER { 2 } else { last_app_end };
    Ok(SegmentSearch {
        existing: None,
        insert_at,
    })
}

/// Replace or insert an APP1 segment, returning the new byte stream.
fn splice_app1(data: &[u8], header: &[u8], segment: &[u8]) -> Result<Vec<u8>, WriterError> {
    let search = find_app1(data, header)?;

    let mut output = Vec::with_capacity(data.len() + segment.len());
    match search.existing {
        Some(range) => {
            output.extend_from_slice(&data[..range.start]);
            output.extend_from_slice(segment);
            output.extend_from_slice(&data[range.end..]);
        }
        None => {
            output.extend_from_slice(&data[..search.insert_at]);
            output.extend_from_slice(segment);
            output.extend_from_slice(&data[search.insert_at..]);
        }
    }
    Ok(output)
}
