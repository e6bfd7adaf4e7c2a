//! Native GeoTIFF reading/writing
//!
//! Uses the `tiff` crate for single-band TIFF I/O. Georeferencing is
//! carried in the ModelPixelScale/ModelTiepoint tags, the nodata value in
//! the GDAL nodata tag. Projection keys beyond a minimal GeoKey directory
//! are out of scope.

use crate::error::{Error, Result};
use crate::raster::{GeoTransform, Raster, RasterElement};
use std::fs::File;
use std::io::{Read, Seek, Write};
use std::path::Path;
use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::colortype::{Gray32Float, Gray8};
use tiff::encoder::{DirectoryEncoder, TiffEncoder, TiffKind};
use tiff::tags::Tag;

/// ModelPixelScaleTag
pub(crate) const TAG_PIXEL_SCALE: u16 = 33550;
/// ModelTiepointTag
pub(crate) const TAG_TIEPOINT: u16 = 33922;
/// GeoKeyDirectoryTag
pub(crate) const TAG_GEO_KEYS: u16 = 34735;
/// GDAL nodata tag (ASCII)
pub(crate) const TAG_GDAL_NODATA: u16 = 42113;

/// Read a single-band GeoTIFF file into a Raster
///
/// The declared nodata value (if any) is kept as the raster's nodata
/// sentinel; float cell data is left untouched, so callers see exactly
/// what the file stores.
pub fn read_geotiff<T, P>(path: P) -> Result<Raster<T>>
where
    T: RasterElement,
    P: AsRef<Path>,
{
    let file = File::open(path.as_ref())?;
    let mut decoder = Decoder::new(file)?;

    let (width, height) = decoder.dimensions()?;
    let rows = height as usize;
    let cols = width as usize;

    let result = decoder.read_image()?;
    let data = convert_samples::<T>(result)?;

    if data.len() != rows * cols {
        return Err(Error::InvalidDimensions {
            width: cols,
            height: rows,
        });
    }

    let mut raster = Raster::from_vec(data, rows, cols)?;

    if let Ok(transform) = read_geotransform(&mut decoder) {
        raster.set_transform(transform);
    }
    if let Some(nodata) = read_nodata(&mut decoder) {
        raster.set_nodata(num_traits::cast(nodata));
    }

    Ok(raster)
}

/// Convert a decoded sample buffer into cell values of type `T`
pub(crate) fn convert_samples<T: RasterElement>(result: DecodingResult) -> Result<Vec<T>> {
    let data: Vec<T> = match result {
        DecodingResult::F32(buf) => buf
            .iter()
            .map(|&v| num_traits::cast(v).unwrap_or(T::default_nodata()))
            .collect(),
        DecodingResult::F64(buf) => buf
            .iter()
            .map(|&v| num_traits::cast(v).unwrap_or(T::default_nodata()))
            .collect(),
        DecodingResult::U8(buf) => buf
            .iter()
            .map(|&v| num_traits::cast(v).unwrap_or(T::default_nodata()))
            .collect(),
        DecodingResult::U16(buf) => buf
            .iter()
            .map(|&v| num_traits::cast(v).unwrap_or(T::default_nodata()))
            .collect(),
        DecodingResult::U32(buf) => buf
            .iter()
            .map(|&v| num_traits::cast(v).unwrap_or(T::default_nodata()))
            .collect(),
        DecodingResult::I8(buf) => buf
            .iter()
            .map(|&v| num_traits::cast(v).unwrap_or(T::default_nodata()))
            .collect(),
        DecodingResult::I16(buf) => buf
            .iter()
            .map(|&v| num_traits::cast(v).unwrap_or(T::default_nodata()))
            .collect(),
        DecodingResult::I32(buf) => buf
            .iter()
            .map(|&v| num_traits::cast(v).unwrap_or(T::default_nodata()))
            .collect(),
        _ => {
            return Err(Error::UnsupportedDataType(
                "Unsupported TIFF pixel format".to_string(),
            ))
        }
    };
    Ok(data)
}

/// Attempt to read a GeoTransform from TIFF tags
pub(crate) fn read_geotransform<R: Read + Seek>(decoder: &mut Decoder<R>) -> Result<GeoTransform> {
    // The decoder maps these tag numbers to the named `Tag` variants, so
    // looking them up as `Tag::Unknown` would never match.
    let scale = decoder
        .get_tag_f64_vec(Tag::ModelPixelScaleTag)
        .map_err(|_| Error::Other("No pixel scale tag".into()))?;

    let tiepoint = decoder
        .get_tag_f64_vec(Tag::ModelTiepointTag)
        .map_err(|_| Error::Other("No tiepoint tag".into()))?;

    if scale.len() >= 2 && tiepoint.len() >= 6 {
        // tiepoint: [I, J, K, X, Y, Z]; scale: [ScaleX, ScaleY, ScaleZ]
        let origin_x = tiepoint[3] - tiepoint[0] * scale[0];
        let origin_y = tiepoint[4] + tiepoint[1] * scale[1];
        let pixel_width = scale[0];
        let pixel_height = -scale[1]; // Negative for north-up

        return Ok(GeoTransform::new(origin_x, origin_y, pixel_width, pixel_height));
    }

    Err(Error::Other("Cannot determine geotransform".into()))
}

/// Attempt to read the GDAL nodata tag
pub(crate) fn read_nodata<R: Read + Seek>(decoder: &mut Decoder<R>) -> Option<f64> {
    let text = decoder
        .get_tag_ascii_string(Tag::GdalNodata)
        .ok()?;
    text.trim_matches(|c: char| c == '\0' || c == ' ')
        .parse::<f64>()
        .ok()
}

/// Write a single-band Raster to a GeoTIFF file
///
/// Float rasters are written as 32-bit float samples with NaN cells
/// filled by the declared nodata sentinel; `u8` rasters are written as
/// 8-bit gray (the binary/cleaned threshold artifacts). Other integer
/// types are widened to f32.
pub fn write_geotiff<T, P>(raster: &Raster<T>, path: P) -> Result<()>
where
    T: RasterElement,
    P: AsRef<Path>,
{
    let file = File::create(path.as_ref())?;
    let mut encoder = TiffEncoder::new(file)?;

    let (rows, cols) = raster.shape();
    let nodata = raster.nodata().and_then(|v| v.to_f64());

    if !T::is_float() && std::mem::size_of::<T>() == 1 {
        let data: Vec<u8> = raster
            .data()
            .iter()
            .map(|&v| num_traits::cast(v).unwrap_or(u8::MAX))
            .collect();

        let mut image = encoder.new_image::<Gray8>(cols as u32, rows as u32)?;
        write_geo_tags(image.encoder(), raster.transform(), nodata)?;
        image.write_data(&data)?;
    } else {
        let fill = nodata.map(|v| v as f32).unwrap_or(f32::NAN);
        let data: Vec<f32> = raster
            .data()
            .iter()
            .map(|&v| {
                let v: f32 = num_traits::cast(v).unwrap_or(f32::NAN);
                if v.is_nan() {
                    fill
                } else {
                    v
                }
            })
            .collect();

        let mut image = encoder.new_image::<Gray32Float>(cols as u32, rows as u32)?;
        write_geo_tags(image.encoder(), raster.transform(), nodata)?;
        image.write_data(&data)?;
    }

    Ok(())
}

/// Write georeferencing and nodata tags into the current image directory
pub(crate) fn write_geo_tags<W: Write + Seek, K: TiffKind>(
    dir: &mut DirectoryEncoder<'_, W, K>,
    gt: &GeoTransform,
    nodata: Option<f64>,
) -> Result<()> {
    let scale = [gt.pixel_width, gt.pixel_height.abs(), 0.0];
    dir.write_tag(Tag::Unknown(TAG_PIXEL_SCALE), &scale[..])?;

    let tiepoint = [0.0, 0.0, 0.0, gt.origin_x, gt.origin_y, 0.0];
    dir.write_tag(Tag::Unknown(TAG_TIEPOINT), &tiepoint[..])?;

    // Minimal GeoKey directory: GTModelTypeGeoKey=1 (Projected),
    // GTRasterTypeGeoKey=1 (RasterPixelIsArea).
    let geokeys: [u16; 12] = [
        1, 1, 0, 2, //
        1024, 0, 1, 1, //
        1025, 0, 1, 1, //
    ];
    dir.write_tag(Tag::Unknown(TAG_GEO_KEYS), &geokeys[..])?;

    if let Some(nd) = nodata {
        dir.write_tag(Tag::Unknown(TAG_GDAL_NODATA), format!("{}", nd).as_str())?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::GeoTransform;

    #[test]
    fn test_float_roundtrip_preserves_grid_and_nodata() {
        let mut raster: Raster<f32> = Raster::new(4, 5);
        raster.set_transform(GeoTransform::new(1000.0, 2000.0, 10.0, -10.0));
        raster.set_nodata(Some(-9999.0));
        raster.set(0, 0, 1.5).unwrap();
        raster.set(2, 3, f32::NAN).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("roundtrip.tif");
        write_geotiff(&raster, &path).unwrap();
        let back: Raster<f32> = read_geotiff(&path).unwrap();

        assert_eq!(back.shape(), (4, 5));
        assert_eq!(back.nodata(), Some(-9999.0));
        assert!(raster.grid_spec().matches(&back.grid_spec()));
        assert_eq!(back.get(0, 0).unwrap(), 1.5);
        // The NaN cell comes back as the sentinel
        assert_eq!(back.get(2, 3).unwrap(), -9999.0);
        assert!(back.is_nodata(back.get(2, 3).unwrap()));
    }

    #[test]
    fn test_u8_roundtrip_is_exact() {
        let mut raster: Raster<u8> = Raster::new(3, 3);
        raster.set_nodata(Some(255));
        raster.set(1, 1, 1).unwrap();
        raster.set(2, 2, 255).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mask.tif");
        write_geotiff(&raster, &path).unwrap();
        let back: Raster<u8> = read_geotiff(&path).unwrap();

        assert_eq!(back.get(0, 0).unwrap(), 0);
        assert_eq!(back.get(1, 1).unwrap(), 1);
        assert_eq!(back.get(2, 2).unwrap(), 255);
        assert_eq!(back.nodata(), Some(255));
    }
}
