//! Strip-streamed band I/O
//!
//! The evidence pipeline never holds a full criterion raster in memory:
//! inputs are read and outputs written one row strip at a time. This
//! module provides the two halves of that contract:
//!
//! - [`BandReader`]: sequential windowed reads over a stripped
//!   single-band GeoTIFF, yielding `f64` arrays with nodata cells
//!   already converted to NaN.
//! - [`GeoTiffWriter`] + [`BandSink`]: incremental strip encoding with
//!   NaN cells filled by the declared nodata sentinel.
//!
//! Readers buffer decoded strips, so the caller's window heights do not
//! have to match the file's strip heights. Handles release their file
//! resources on drop; a sink must be `finish()`ed for the output to be
//! complete, otherwise the partial file is abandoned.

use crate::error::{Error, Result};
use crate::io::geotiff::{read_geotransform, read_nodata, write_geo_tags};
use crate::raster::{GeoTransform, GridSpec, RasterElement, Window};
use ndarray::{Array2, ArrayView2};
use std::collections::VecDeque;
use std::fs::File;
use std::path::Path;
use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::colortype::{ColorType, Gray32Float, Gray8};
use tiff::encoder::{ImageEncoder, TiffEncoder, TiffKindStandard, TiffValue};

/// Default strip height for pipeline outputs, in rows
pub const DEFAULT_STRIP_ROWS: usize = 64;

/// Sequential strip reader for a single-band GeoTIFF.
///
/// Windows must be requested front to back with no gaps; this is the
/// access pattern of the streaming pipeline and lets the reader drop
/// each decoded strip as soon as it has been consumed.
pub struct BandReader {
    decoder: Decoder<File>,
    grid: GridSpec,
    nodata: Option<f64>,
    strip_rows: usize,
    strip_count: u32,
    next_chunk: u32,
    next_row: usize,
    pending: VecDeque<f64>,
}

impl BandReader {
    /// Open a stripped single-band GeoTIFF for sequential reading
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        let mut decoder = Decoder::new(file)?;

        let (width, height) = decoder.dimensions()?;
        let (chunk_w, chunk_h) = decoder.chunk_dimensions();
        if (chunk_w as usize) < width as usize {
            return Err(Error::UnsupportedDataType(format!(
                "tiled TIFF layout ({}x{} chunks) is not supported; expected row strips",
                chunk_w, chunk_h
            )));
        }

        let transform = read_geotransform(&mut decoder).unwrap_or_default();
        let nodata = read_nodata(&mut decoder);
        let strip_count = decoder.strip_count()?;

        Ok(Self {
            decoder,
            grid: GridSpec::new(height as usize, width as usize, transform),
            nodata,
            strip_rows: (chunk_h as usize).max(1),
            strip_count,
            next_chunk: 0,
            next_row: 0,
            pending: VecDeque::new(),
        })
    }

    /// Grid placement of the underlying raster
    pub fn grid(&self) -> GridSpec {
        self.grid
    }

    /// Declared nodata sentinel, if any
    pub fn nodata(&self) -> Option<f64> {
        self.nodata
    }

    /// The file's native strip height, a good window height for callers
    pub fn strip_rows(&self) -> usize {
        self.strip_rows
    }

    /// Read the next window as a masked array (nodata cells are NaN).
    ///
    /// `window` must start where the previous read ended and stay within
    /// the raster.
    pub fn read_window(&mut self, window: Window) -> Result<Array2<f64>> {
        if window.cols != self.grid.cols {
            return Err(Error::SizeMismatch {
                er: window.rows,
                ec: self.grid.cols,
                ar: window.rows,
                ac: window.cols,
            });
        }
        if window.row_offset != self.next_row {
            return Err(Error::InvalidParameter {
                name: "window",
                value: format!("row offset {}", window.row_offset),
                reason: format!("reads must be sequential; expected row {}", self.next_row),
            });
        }
        if window.row_offset + window.rows > self.grid.rows {
            return Err(Error::IndexOutOfBounds {
                row: window.row_offset + window.rows,
                col: 0,
                rows: self.grid.rows,
                cols: self.grid.cols,
            });
        }

        let needed = window.len();
        while self.pending.len() < needed {
            self.decode_next_chunk()?;
        }

        let samples: Vec<f64> = self.pending.drain(..needed).collect();
        self.next_row += window.rows;

        Array2::from_shape_vec((window.rows, window.cols), samples)
            .map_err(|e| Error::Other(e.to_string()))
    }

    fn decode_next_chunk(&mut self) -> Result<()> {
        if self.next_chunk >= self.strip_count {
            return Err(Error::Tiff(format!(
                "image data ended after {} strips, before row {}",
                self.strip_count, self.next_row
            )));
        }

        let result = self.decoder.read_chunk(self.next_chunk)?;
        self.next_chunk += 1;

        let nodata = self.nodata;
        let mask = |v: f64| {
            if v.is_nan() || Some(v) == nodata {
                f64::NAN
            } else {
                v
            }
        };

        match result {
            DecodingResult::F32(buf) => self.pending.extend(buf.iter().map(|&v| mask(v as f64))),
            DecodingResult::F64(buf) => self.pending.extend(buf.iter().map(|&v| mask(v))),
            DecodingResult::U8(buf) => self.pending.extend(buf.iter().map(|&v| mask(v as f64))),
            DecodingResult::U16(buf) => self.pending.extend(buf.iter().map(|&v| mask(v as f64))),
            DecodingResult::U32(buf) => self.pending.extend(buf.iter().map(|&v| mask(v as f64))),
            DecodingResult::I8(buf) => self.pending.extend(buf.iter().map(|&v| mask(v as f64))),
            DecodingResult::I16(buf) => self.pending.extend(buf.iter().map(|&v| mask(v as f64))),
            DecodingResult::I32(buf) => self.pending.extend(buf.iter().map(|&v| mask(v as f64))),
            _ => {
                return Err(Error::UnsupportedDataType(
                    "Unsupported TIFF pixel format".to_string(),
                ))
            }
        }

        Ok(())
    }
}

/// Cell types that can be streamed out as TIFF samples
pub trait BandSample: RasterElement {
    type Color: ColorType<Inner = Self>;
}

impl BandSample for f32 {
    type Color = Gray32Float;
}

impl BandSample for u8 {
    type Color = Gray8;
}

/// An open single-band GeoTIFF output file.
///
/// Create the file, obtain the one [`BandSink`] with [`Self::band`],
/// stream rows into it, then `finish()` the sink. Dropping the writer
/// closes the file.
pub struct GeoTiffWriter {
    encoder: TiffEncoder<File>,
    grid: GridSpec,
    nodata: Option<f64>,
    strip_rows: usize,
}

impl GeoTiffWriter {
    /// Create the output file and write the TIFF header
    pub fn create<P: AsRef<Path>>(
        path: P,
        grid: GridSpec,
        nodata: Option<f64>,
        strip_rows: usize,
    ) -> Result<Self> {
        let file = File::create(path.as_ref())?;
        let encoder = TiffEncoder::new(file)?;
        Ok(Self {
            encoder,
            grid,
            nodata,
            strip_rows: strip_rows.max(1),
        })
    }

    /// Begin the single image band. Call exactly once per writer.
    pub fn band<T>(&mut self) -> Result<BandSink<'_, T>>
    where
        T: BandSample,
        [T]: TiffValue,
    {
        let mut image = self
            .encoder
            .new_image::<T::Color>(self.grid.cols as u32, self.grid.rows as u32)?;
        image.rows_per_strip(self.strip_rows as u32)?;
        write_geo_tags(image.encoder(), &self.grid.transform, self.nodata)?;

        let fill = self
            .nodata
            .and_then(num_traits::cast)
            .unwrap_or(T::default_nodata());

        Ok(BandSink {
            image,
            grid: self.grid,
            fill,
            pending: Vec::new(),
            rows_written: 0,
        })
    }
}

/// Incremental strip encoder for one output band
pub struct BandSink<'a, T: BandSample> {
    image: ImageEncoder<'a, File, T::Color, TiffKindStandard>,
    grid: GridSpec,
    fill: T,
    pending: Vec<T>,
    rows_written: usize,
}

impl<'a, T> BandSink<'a, T>
where
    T: BandSample,
    [T]: TiffValue,
{
    /// Append a block of rows (NaN cells become the nodata sentinel)
    pub fn write_rows(&mut self, rows: ArrayView2<'_, f64>) -> Result<()> {
        if rows.ncols() != self.grid.cols {
            return Err(Error::SizeMismatch {
                er: rows.nrows(),
                ec: self.grid.cols,
                ar: rows.nrows(),
                ac: rows.ncols(),
            });
        }
        if self.rows_written + rows.nrows() > self.grid.rows {
            return Err(Error::IndexOutOfBounds {
                row: self.rows_written + rows.nrows(),
                col: 0,
                rows: self.grid.rows,
                cols: self.grid.cols,
            });
        }

        let fill = self.fill;
        self.pending.extend(rows.iter().map(|&v| {
            if v.is_nan() {
                fill
            } else {
                num_traits::cast(v).unwrap_or(fill)
            }
        }));
        self.rows_written += rows.nrows();

        self.flush_strips()
    }

    fn flush_strips(&mut self) -> Result<()> {
        loop {
            let need = self.image.next_strip_sample_count() as usize;
            if need == 0 || self.pending.len() < need {
                return Ok(());
            }
            self.image.write_strip(&self.pending[..need])?;
            self.pending.drain(..need);
        }
    }

    /// Complete the band. Errors if the row count does not match the grid.
    pub fn finish(mut self) -> Result<()> {
        if self.rows_written != self.grid.rows {
            return Err(Error::SizeMismatch {
                er: self.grid.rows,
                ec: self.grid.cols,
                ar: self.rows_written,
                ac: self.grid.cols,
            });
        }
        self.flush_strips()?;
        if !self.pending.is_empty() {
            return Err(Error::Other(
                "partial strip left unwritten at end of band".to_string(),
            ));
        }
        self.image.finish()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::strip_windows;
    use ndarray::s;

    fn grid(rows: usize, cols: usize) -> GridSpec {
        GridSpec::new(rows, cols, GeoTransform::new(5000.0, 8000.0, 10.0, -10.0))
    }

    #[test]
    fn test_f32_stream_roundtrip_with_mask() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("band.tif");

        let mut data = Array2::from_shape_fn((10, 4), |(r, c)| (r * 4 + c) as f64);
        data[[3, 2]] = f64::NAN;

        let spec = grid(10, 4);
        {
            let mut writer = GeoTiffWriter::create(&path, spec, Some(-9999.0), 4).unwrap();
            let mut sink = writer.band::<f32>().unwrap();
            // Deliberately misaligned with the 4-row strips
            sink.write_rows(data.slice(s![0..3, ..])).unwrap();
            sink.write_rows(data.slice(s![3..6, ..])).unwrap();
            sink.write_rows(data.slice(s![6..10, ..])).unwrap();
            sink.finish().unwrap();
        }

        let mut reader = BandReader::open(&path).unwrap();
        assert_eq!(reader.grid().shape(), (10, 4));
        assert!(reader.grid().matches(&spec));
        assert_eq!(reader.nodata(), Some(-9999.0));

        let mut back = Array2::zeros((0, 4));
        for w in strip_windows(10, 4, reader.strip_rows()) {
            let tile = reader.read_window(w).unwrap();
            back.append(ndarray::Axis(0), tile.view()).unwrap();
        }

        assert!(back[[3, 2]].is_nan(), "sentinel cell should read back as NaN");
        assert_eq!(back[[0, 0]], 0.0);
        assert_eq!(back[[9, 3]], 39.0);
    }

    #[test]
    fn test_u8_stream_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mask.tif");

        let data = Array2::from_shape_fn((6, 3), |(r, _)| if r % 2 == 0 { 1.0 } else { 0.0 });

        let spec = grid(6, 3);
        {
            let mut writer = GeoTiffWriter::create(&path, spec, Some(255.0), 2).unwrap();
            let mut sink = writer.band::<u8>().unwrap();
            sink.write_rows(data.view()).unwrap();
            sink.finish().unwrap();
        }

        let mut reader = BandReader::open(&path).unwrap();
        let tile = reader.read_window(Window::new(0, 6, 3)).unwrap();
        assert_eq!(tile[[0, 0]], 1.0);
        assert_eq!(tile[[1, 0]], 0.0);
    }

    #[test]
    fn test_out_of_order_read_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seq.tif");

        let data = Array2::zeros((8, 2));
        let mut writer = GeoTiffWriter::create(&path, grid(8, 2), None, 4).unwrap();
        let mut sink = writer.band::<f32>().unwrap();
        sink.write_rows(data.view()).unwrap();
        sink.finish().unwrap();

        let mut reader = BandReader::open(&path).unwrap();
        assert!(reader.read_window(Window::new(4, 4, 2)).is_err());
    }

    #[test]
    fn test_short_band_fails_finish() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.tif");

        let data = Array2::zeros((3, 2));
        let mut writer = GeoTiffWriter::create(&path, grid(8, 2), None, 4).unwrap();
        let mut sink = writer.band::<f32>().unwrap();
        sink.write_rows(data.view()).unwrap();
        assert!(sink.finish().is_err());
    }
}
