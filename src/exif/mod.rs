//! Geospatial metadata encoding
//!
//! This module turns the floating-point measurements of an
//! [`ImageDescriptor`](crate::ImageDescriptor) into the exact fixed-format
//! rational encoding EXIF requires, and embeds the result into JPEG bytes.
//!
//! # Components
//!
//! - [`rational`] - best-rational approximation under a denominator bound
//! - [`timezone`] - coordinate-to-UTC-offset resolution
//! - [`geotag`] - assembly of a complete, internally consistent tag record
//! - [`writer`] - EXIF/XMP embedding into JPEG containers
//!
//! The pipeline is pure data transformation: no network access, no clocks.
//! Building the same record from the same descriptor twice, and writing it
//! twice, yields byte-identical output.

pub mod geotag;
pub mod rational;
pub mod timezone;
pub mod writer;

pub use geotag::{GeoTagBuilder, GeoTagError, GeoTagRecord};
pub use rational::{Rational, RationalError};
pub use writer::{MetadataWriter, WriterError};
