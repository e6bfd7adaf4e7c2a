//! I/O operations for reading and writing geospatial data

mod banded;
mod geotiff;

pub use banded::{BandReader, BandSample, BandSink, GeoTiffWriter, DEFAULT_STRIP_ROWS};
pub use geotiff::{read_geotiff, write_geotiff};
