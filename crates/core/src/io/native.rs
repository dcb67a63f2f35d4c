//! Native GeoTIFF reading/writing with the `tiff` crate.
//!
//! Rasters are written as single-band Float32 with NaN under invalid
//! cells, the pixel-scale and tiepoint tags, and a minimal GeoKey
//! directory carrying the EPSG code when one is known.

use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::raster::{GeoTransform, Raster, RasterElement};
use std::fs::File;
use std::io::{BufWriter, Cursor};
use std::path::Path;
use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::colortype::Gray32Float;
use tiff::encoder::TiffEncoder;
use tiff::tags::Tag;
use tracing::debug;

const PROJECTED_CS_TYPE_KEY: u16 = 3072;
const GEOGRAPHIC_TYPE_KEY: u16 = 2048;

/// Options for reading GeoTIFF files
#[derive(Debug, Clone, Default)]
pub struct ReadOptions {
    /// Value marking invalid cells, overriding the file's GDAL_NODATA tag
    pub nodata: Option<f64>,
}

/// Read a GeoTIFF file into a Raster named after the file stem
pub fn read_geotiff<T, P>(path: P, options: Option<ReadOptions>) -> Result<Raster<T>>
where
    T: RasterElement,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let file = File::open(path)?;
    let raster = decode_geotiff(file, options.unwrap_or_default())?;
    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    debug!(path = %path.display(), rows = raster.rows(), cols = raster.cols(), "read raster");
    Ok(raster.named(name))
}

/// Read a GeoTIFF from an in-memory buffer into a Raster
pub fn read_geotiff_from_buffer<T>(data: &[u8], options: Option<ReadOptions>) -> Result<Raster<T>>
where
    T: RasterElement,
{
    decode_geotiff(Cursor::new(data), options.unwrap_or_default())
}

fn decode_geotiff<T, R>(reader: R, options: ReadOptions) -> Result<Raster<T>>
where
    T: RasterElement,
    R: std::io::Read + std::io::Seek,
{
    let mut decoder =
        Decoder::new(reader).map_err(|e| Error::Other(format!("TIFF decode error: {}", e)))?;

    let (width, height) = decoder
        .dimensions()
        .map_err(|e| Error::Other(format!("Cannot read dimensions: {}", e)))?;
    let rows = height as usize;
    let cols = width as usize;

    let result = decoder
        .read_image()
        .map_err(|e| Error::Other(format!("Cannot read image data: {}", e)))?;

    let values: Vec<f64> = match result {
        DecodingResult::F32(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::F64(buf) => buf,
        DecodingResult::U8(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::U16(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::U32(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::I8(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::I16(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::I32(buf) => buf.into_iter().map(f64::from).collect(),
        _ => {
            return Err(Error::UnsupportedDataType(
                "Unsupported TIFF pixel format".to_string(),
            ))
        }
    };

    if values.len() != rows * cols {
        return Err(Error::InvalidDimensions {
            width: cols,
            height: rows,
        });
    }

    let nodata = options.nodata.or_else(|| read_nodata(&mut decoder));
    let mut valid = Vec::with_capacity(values.len());
    let mut data = Vec::with_capacity(values.len());
    for v in values {
        let is_nodata = v.is_nan() || nodata.map_or(false, |nd| v == nd);
        match (is_nodata, T::cast_from_f64(v)) {
            (false, Some(t)) => {
                data.push(t);
                valid.push(true);
            }
            _ => {
                data.push(T::fill_value());
                valid.push(false);
            }
        }
    }

    let data = ndarray::Array2::from_shape_vec((rows, cols), data)
        .map_err(|e| Error::Other(e.to_string()))?;
    let valid = ndarray::Array2::from_shape_vec((rows, cols), valid)
        .map_err(|e| Error::Other(e.to_string()))?;
    let mut raster = Raster::from_parts(data, valid)?;

    if let Ok(transform) = read_geotransform(&mut decoder) {
        raster.set_transform(transform);
    }
    raster.set_crs(read_epsg(&mut decoder).map(CRS::from_epsg));

    Ok(raster)
}

fn read_nodata<R: std::io::Read + std::io::Seek>(decoder: &mut Decoder<R>) -> Option<f64> {
    decoder
        .get_tag_ascii_string(Tag::GdalNodata)
        .ok()
        .and_then(|s| s.trim_end_matches('\0').trim().parse::<f64>().ok())
        .filter(|v| !v.is_nan())
}

fn read_geotransform<R: std::io::Read + std::io::Seek>(
    decoder: &mut Decoder<R>,
) -> Result<GeoTransform> {
    let scale = decoder
        .get_tag_f64_vec(Tag::ModelPixelScaleTag)
        .map_err(|_| Error::Other("No pixel scale tag".into()))?;
    let tiepoint = decoder
        .get_tag_f64_vec(Tag::ModelTiepointTag)
        .map_err(|_| Error::Other("No tiepoint tag".into()))?;

    if scale.len() >= 2 && tiepoint.len() >= 6 {
        // tiepoint: [I, J, K, X, Y, Z], scale: [ScaleX, ScaleY, ScaleZ]
        let origin_x = tiepoint[3] - tiepoint[0] * scale[0];
        let origin_y = tiepoint[4] + tiepoint[1] * scale[1];
        return Ok(GeoTransform::new(origin_x, origin_y, scale[0], -scale[1]));
    }

    Err(Error::Other("Cannot determine geotransform".into()))
}

fn read_epsg<R: std::io::Read + std::io::Seek>(decoder: &mut Decoder<R>) -> Option<u32> {
    let keys = decoder.get_tag_u16_vec(Tag::GeoKeyDirectoryTag).ok()?;
    // Header is 4 shorts, then (key, location, count, value) entries
    keys.get(4..)?
        .chunks_exact(4)
        .find(|k| (k[0] == PROJECTED_CS_TYPE_KEY || k[0] == GEOGRAPHIC_TYPE_KEY) && k[1] == 0)
        .map(|k| u32::from(k[3]))
}

/// Write a Raster to a GeoTIFF file
pub fn write_geotiff<T, P>(raster: &Raster<T>, path: P) -> Result<()>
where
    T: RasterElement,
    P: AsRef<Path>,
{
    if let Some(parent) = path.as_ref().parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let file = BufWriter::new(File::create(path.as_ref())?);
    debug!(path = %path.as_ref().display(), name = raster.name(), "write raster");
    encode_geotiff(raster, file)
}

/// Write a Raster to an in-memory GeoTIFF buffer
pub fn write_geotiff_to_buffer<T>(raster: &Raster<T>) -> Result<Vec<u8>>
where
    T: RasterElement,
{
    let mut buf = Vec::new();
    encode_geotiff(raster, Cursor::new(&mut buf))?;
    Ok(buf)
}

fn encode_geotiff<T, W>(raster: &Raster<T>, writer: W) -> Result<()>
where
    T: RasterElement,
    W: std::io::Write + std::io::Seek,
{
    let mut encoder =
        TiffEncoder::new(writer).map_err(|e| Error::Other(format!("TIFF encoder error: {}", e)))?;

    let (rows, cols) = raster.shape();

    let data: Vec<f32> = raster
        .data()
        .iter()
        .zip(raster.mask().iter())
        .map(|(&v, &m)| if m { v.as_f64() as f32 } else { f32::NAN })
        .collect();

    let mut image = encoder
        .new_image::<Gray32Float>(cols as u32, rows as u32)
        .map_err(|e| Error::Other(format!("Cannot create TIFF image: {}", e)))?;

    let gt = raster.transform();

    let scale = vec![gt.pixel_width, gt.pixel_height.abs(), 0.0];
    image
        .encoder()
        .write_tag(Tag::ModelPixelScaleTag, scale.as_slice())
        .map_err(|e| Error::Other(format!("Cannot write scale tag: {}", e)))?;

    let tiepoint = vec![0.0, 0.0, 0.0, gt.origin_x, gt.origin_y, 0.0];
    image
        .encoder()
        .write_tag(Tag::ModelTiepointTag, tiepoint.as_slice())
        .map_err(|e| Error::Other(format!("Cannot write tiepoint tag: {}", e)))?;

    // GTModelType, GTRasterType=PixelIsArea, plus the EPSG code.
    // EPSG 4000-4999 are geographic systems.
    let mut geokeys: Vec<u16> = vec![1, 1, 0, 2, 1024, 0, 1, 1, 1025, 0, 1, 1];
    if let Some(code) = raster.crs().and_then(CRS::epsg).and_then(|c| u16::try_from(c).ok()) {
        let (model, key) = if (4000..5000).contains(&code) {
            (2, GEOGRAPHIC_TYPE_KEY)
        } else {
            (1, PROJECTED_CS_TYPE_KEY)
        };
        geokeys[3] = 3;
        geokeys[7] = model;
        geokeys.extend_from_slice(&[key, 0, 1, code]);
    }
    image
        .encoder()
        .write_tag(Tag::GeoKeyDirectoryTag, geokeys.as_slice())
        .map_err(|e| Error::Other(format!("Cannot write geokey tag: {}", e)))?;

    image
        .write_data(&data)
        .map_err(|e| Error::Other(format!("Cannot write image data: {}", e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_roundtrip_keeps_mask_and_grid() {
        let mut raster: Raster<f64> = Raster::filled(3, 4, 0.25);
        raster.set_transform(GeoTransform::square(-1_000_000.0, 2_000_000.0, 90.0));
        raster.set_crs(Some(CRS::conus_albers()));
        raster.set_invalid(1, 2).unwrap();

        let bytes = write_geotiff_to_buffer(&raster).unwrap();
        let back: Raster<f64> = read_geotiff_from_buffer(&bytes, None).unwrap();

        assert_eq!(back.shape(), (3, 4));
        assert!(!back.is_valid(1, 2));
        assert_eq!(back.value(0, 0), Some(0.25));
        assert!(back.transform().is_aligned_with(raster.transform()));
        assert_eq!(back.crs().and_then(CRS::epsg), Some(5070));
    }

    #[test]
    fn test_file_roundtrip_keeps_georeferencing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rangeland.tif");
        let mut raster: Raster<f64> = Raster::filled(4, 6, 1.0);
        raster.set_transform(GeoTransform::square(-1_500_000.0, 2_400_000.0, 90.0));
        raster.set_crs(Some(CRS::conus_albers()));
        write_geotiff(&raster, &path).unwrap();

        let back: Raster<f64> = read_geotiff(&path, None).unwrap();
        assert_eq!(back.cell_size(), 90.0);
        assert_eq!(back.transform().origin_x, -1_500_000.0);
        assert_eq!(back.transform().origin_y, 2_400_000.0);
        assert_eq!(back.transform().pixel_height, -90.0);
        assert_eq!(back.crs(), Some(&CRS::conus_albers()));
    }

    #[test]
    fn test_geographic_crs_roundtrip() {
        let mut raster: Raster<f64> = Raster::filled(2, 2, 0.5);
        raster.set_transform(GeoTransform::square(-120.0, 45.0, 0.01));
        raster.set_crs(Some(CRS::from_epsg(4326)));
        let bytes = write_geotiff_to_buffer(&raster).unwrap();
        let back: Raster<f64> = read_geotiff_from_buffer(&bytes, None).unwrap();
        assert_eq!(back.crs().and_then(CRS::epsg), Some(4326));
    }

    #[test]
    fn test_explicit_nodata_value() {
        let raster = Raster::from_vec(vec![0.0, 1.0, 2.0, 0.0], 2, 2).unwrap();
        let bytes = write_geotiff_to_buffer(&raster).unwrap();
        let back: Raster<f64> =
            read_geotiff_from_buffer(&bytes, Some(ReadOptions { nodata: Some(0.0) })).unwrap();
        assert_eq!(back.valid_count(), 2);
    }

    #[test]
    fn test_file_roundtrip_names_raster() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("sagebrush_2020.tif");
        let raster: Raster<u8> = Raster::filled(2, 2, 3);
        write_geotiff(&raster, &path).unwrap();

        let back: Raster<u8> = read_geotiff(&path, None).unwrap();
        assert_eq!(back.name(), "sagebrush_2020");
        assert_eq!(back.value(1, 1), Some(3));
    }
}
