//! Decoding of DICOM and raster images into signed 16-bit pixel matrices.

use std::path::Path;

use dicom_dictionary_std::tags;
use dicom_pixeldata::{ConvertOptions, ModalityLutOption, PixelDecoder};
use image::{DynamicImage, GenericImageView};
use ndarray::Array2;

use crate::error::{NpsError, NpsResult};

/// Pixels of one image and the spacing found in its metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedImage {
    pub pixels: Array2<i16>,
    /// `(row, column)` spacing in mm, `None` when absent or malformed.
    pub pixel_spacing: Option<(f64, f64)>,
}

/// Anything able to turn a file path into pixels.
pub trait ImageSource {
    fn load(&self, path: &Path) -> NpsResult<DecodedImage>;
}

/// Reads DICOM files with dicom-rs and everything else with the `image` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileImageSource;

impl ImageSource for FileImageSource {
    fn load(&self, path: &Path) -> NpsResult<DecodedImage> {
        if is_dicom_path(path) {
            load_dicom(path)
        } else {
            load_raster(path)
        }
    }
}

fn is_dicom_path(path: &Path) -> bool {
    match path.extension() {
        None => true,
        Some(ext) => {
            let ext = ext.to_string_lossy().to_lowercase();
            ext == "dcm" || ext == "dicom"
        }
    }
}

/// Spacing values must be finite and positive. A single value is used for
/// both axes.
fn parse_spacing(values: &[f64]) -> Option<(f64, f64)> {
    let valid = |v: f64| v.is_finite() && v > 0.0;
    match values {
        [row, col, ..] if valid(*row) && valid(*col) => Some((*row, *col)),
        [both] if valid(*both) => Some((*both, *both)),
        _ => None,
    }
}

fn load_dicom(path: &Path) -> NpsResult<DecodedImage> {
    let obj = dicom_object::open_file(path).map_err(|e| NpsError::decode(path, e))?;

    let pixel_spacing = obj
        .element(tags::PIXEL_SPACING)
        .ok()
        .and_then(|e| e.to_multi_float64().ok())
        .and_then(|values| parse_spacing(&values));

    let decoded = obj
        .decode_pixel_data()
        .map_err(|e| NpsError::decode(path, e))?;
    // Stored values, no rescale slope/intercept.
    let options = ConvertOptions::new().with_modality_lut(ModalityLutOption::None);
    let frames = decoded
        .to_ndarray_with_options::<i32>(&options)
        .map_err(|e| NpsError::decode(path, e))?;

    let shape = frames.shape();
    if shape.len() != 4 || shape[0] == 0 || shape[3] == 0 {
        return Err(NpsError::decode(path, format!("unexpected pixel shape {:?}", shape)));
    }
    let (rows, cols) = (shape[1], shape[2]);
    // First frame, first sample. Values beyond the i16 range wrap.
    let pixels = Array2::from_shape_fn((rows, cols), |(r, c)| frames[[0, r, c, 0]] as i16);

    Ok(DecodedImage {
        pixels,
        pixel_spacing,
    })
}

fn grey(r: f64, g: f64, b: f64) -> i16 {
    (0.299 * r + 0.587 * g + 0.114 * b).round() as i64 as i16
}

fn load_raster(path: &Path) -> NpsResult<DecodedImage> {
    let img = image::open(path).map_err(|e| NpsError::decode(path, e))?;
    let (width, height) = img.dimensions();
    let shape = (height as usize, width as usize);

    let pixels = match &img {
        DynamicImage::ImageLuma8(buf) => {
            Array2::from_shape_fn(shape, |(r, c)| buf.get_pixel(c as u32, r as u32)[0] as i16)
        }
        DynamicImage::ImageLuma16(buf) => {
            Array2::from_shape_fn(shape, |(r, c)| buf.get_pixel(c as u32, r as u32)[0] as i16)
        }
        other if other.color().has_color() && other.color().bytes_per_pixel() > 4 => {
            let rgb = other.to_rgb16();
            Array2::from_shape_fn(shape, |(r, c)| {
                let p = rgb.get_pixel(c as u32, r as u32);
                grey(p[0] as f64, p[1] as f64, p[2] as f64)
            })
        }
        other if other.color().has_color() => {
            let rgb = other.to_rgb8();
            Array2::from_shape_fn(shape, |(r, c)| {
                let p = rgb.get_pixel(c as u32, r as u32);
                grey(p[0] as f64, p[1] as f64, p[2] as f64)
            })
        }
        other => {
            let luma = other.to_luma16();
            Array2::from_shape_fn(shape, |(r, c)| luma.get_pixel(c as u32, r as u32)[0] as i16)
        }
    };

    Ok(DecodedImage {
        pixels,
        pixel_spacing: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma, Rgb, RgbImage};

    #[test]
    fn spacing_must_be_positive() {
        assert_eq!(parse_spacing(&[0.5, 0.6]), Some((0.5, 0.6)));
        assert_eq!(parse_spacing(&[0.7]), Some((0.7, 0.7)));
        assert_eq!(parse_spacing(&[0.0, 0.6]), None);
        assert_eq!(parse_spacing(&[]), None);
    }

    #[test]
    fn grey_png_keeps_pixel_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("img_1.png");
        let img = GrayImage::from_fn(6, 4, |x, y| Luma([(x * 10 + y) as u8]));
        img.save(&path).unwrap();

        let decoded = FileImageSource.load(&path).unwrap();
        assert_eq!(decoded.pixels.dim(), (4, 6));
        assert_eq!(decoded.pixels[[3, 5]], 53);
        assert_eq!(decoded.pixel_spacing, None);
    }

    #[test]
    fn colour_png_is_converted_to_luminance() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rgb.png");
        RgbImage::from_pixel(2, 2, Rgb([100, 100, 100])).save(&path).unwrap();
        let decoded = FileImageSource.load(&path).unwrap();
        assert_eq!(decoded.pixels[[0, 0]], 100);
    }

    #[test]
    fn unreadable_file_is_a_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.dcm");
        std::fs::write(&path, b"not a dicom file").unwrap();
        assert!(matches!(
            FileImageSource.load(&path),
            Err(NpsError::Decode { .. })
        ));
    }
}
