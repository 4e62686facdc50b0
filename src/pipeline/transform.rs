//! Transform executor: rotate and scale staged images.
//!
//! Each step reads one staged file and writes a new one next to it, named by
//! appending the step suffix (`foo.jpg` → `foo-rot90.jpg`). Parameters are
//! parsed here, so a malformed `rotate`/`scale` option surfaces as
//! [`ImageError::InvalidRotation`] / [`ImageError::InvalidScaleSpec`] at the
//! step that needs it.
//!
//! Rotation follows the usual raster-library convention: positive degrees
//! turn the picture counter-clockwise about its centre, on a canvas of the
//! original size. Corners that end up uncovered are transparent (black once
//! saved to a format without alpha).

use crate::error::ImageError;
use crate::pipeline::form::TransformKind;
use crate::pipeline::staging::derived_path;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, ImageReader, Rgba, RgbaImage};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Applies one transform step to a staged file.
pub trait Transformer {
    /// Rotate by `degrees`; returns the path of the new file.
    fn rotate(&self, path: &Path, degrees: &str) -> Result<PathBuf, ImageError>;

    /// Shrink according to `spec` (`0.25` or `200x150`); returns the new path.
    fn scale(&self, path: &Path, spec: &str) -> Result<PathBuf, ImageError>;
}

/// [`Transformer`] backed by the `image` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageTransformer;

impl Transformer for ImageTransformer {
    fn rotate(&self, path: &Path, degrees: &str) -> Result<PathBuf, ImageError> {
        let angle = parse_degrees(degrees)?;
        let img = open_image(path)?;
        let rotated = rotate_about_center(&img, angle);
        let out = derived_path(path, &TransformKind::Rotate.suffix(degrees));
        save_image(&rotated, &out)?;
        debug!("Rotated {} by {}° → {}", path.display(), angle, out.display());
        Ok(out)
    }

    fn scale(&self, path: &Path, spec: &str) -> Result<PathBuf, ImageError> {
        let parsed = ScaleSpec::parse(spec)?;
        let img = open_image(path)?;
        let (w, h) = parsed.target_size(img.width(), img.height());
        let scaled = if (w, h) == (img.width(), img.height()) {
            img
        } else {
            img.resize_exact(w, h, FilterType::Lanczos3)
        };
        let out = derived_path(path, &TransformKind::Scale.suffix(spec));
        save_image(&scaled, &out)?;
        debug!("Scaled {} to {}x{} → {}", path.display(), w, h, out.display());
        Ok(out)
    }
}

/// Parsed `scale` option.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScaleSpec {
    /// Multiply both sides.
    Factor(f64),
    /// Fit inside a `WxH` box.
    Dimensions(u32, u32),
}

impl ScaleSpec {
    pub fn parse(spec: &str) -> Result<Self, ImageError> {
        let invalid = || ImageError::InvalidScaleSpec {
            spec: spec.to_string(),
        };
        let s = spec.trim();
        if let Some((w, h)) = s.split_once(['x', 'X']) {
            let w: u32 = w.trim().parse().map_err(|_| invalid())?;
            let h: u32 = h.trim().parse().map_err(|_| invalid())?;
            if w == 0 || h == 0 {
                return Err(invalid());
            }
            return Ok(ScaleSpec::Dimensions(w, h));
        }
        match s.parse::<f64>() {
            Ok(f) if f.is_finite() && f > 0.0 => Ok(ScaleSpec::Factor(f)),
            _ => Err(invalid()),
        }
    }

    /// Output size for a `width`×`height` source.
    ///
    /// A factor multiplies both sides; a box is filled as far as the aspect
    /// ratio allows. Sides are floored to whole pixels (at least one) and the
    /// image is never enlarged.
    pub fn target_size(&self, width: u32, height: u32) -> (u32, u32) {
        let (max_w, max_h) = match *self {
            ScaleSpec::Factor(f) if f >= 1.0 => return (width, height),
            ScaleSpec::Factor(f) => {
                return (
                    ((width as f64 * f).floor() as u32).max(1),
                    ((height as f64 * f).floor() as u32).max(1),
                )
            }
            ScaleSpec::Dimensions(w, h) => (w, h),
        };
        if width <= max_w && height <= max_h {
            return (width, height);
        }
        let rw = max_w as f64 / width as f64;
        let rh = max_h as f64 / height as f64;
        if rw <= rh {
            let h = ((height as f64 * rw).floor() as u32).clamp(1, max_h);
            (max_w, h)
        } else {
            let w = ((width as f64 * rh).floor() as u32).clamp(1, max_w);
            (w, max_h)
        }
    }
}

fn parse_degrees(degrees: &str) -> Result<f64, ImageError> {
    match degrees.trim().parse::<f64>() {
        Ok(d) if d.is_finite() => Ok(d),
        _ => Err(ImageError::InvalidRotation {
            degrees: degrees.to_string(),
        }),
    }
}

fn open_image(path: &Path) -> Result<DynamicImage, ImageError> {
    let decode_err = |detail: String| ImageError::ImageDecode {
        path: path.to_path_buf(),
        detail,
    };
    ImageReader::open(path)
        .map_err(|e| ImageError::io(path, e))?
        .with_guessed_format()
        .map_err(|e| ImageError::io(path, e))?
        .decode()
        .map_err(|e| decode_err(e.to_string()))
}

fn save_image(img: &DynamicImage, path: &Path) -> Result<(), ImageError> {
    let result = match ImageFormat::from_path(path) {
        // JPEG has no alpha channel.
        Ok(ImageFormat::Jpeg) => DynamicImage::ImageRgb8(img.to_rgb8()).save(path),
        _ => img.save(path),
    };
    result.map_err(|e| ImageError::ImageDecode {
        path: path.to_path_buf(),
        detail: format!("cannot encode: {e}"),
    })
}

/// Rotate counter-clockwise by `degrees` about the centre, same canvas size,
/// nearest-neighbour sampling.
pub fn rotate_about_center(img: &DynamicImage, degrees: f64) -> DynamicImage {
    let turns = degrees.rem_euclid(360.0);
    if turns == 0.0 {
        return img.clone();
    }

    let src = img.to_rgba8();
    let (w, h) = src.dimensions();
    let (sin, cos) = turns.to_radians().sin_cos();
    let (cx, cy) = (w as f64 / 2.0, h as f64 / 2.0);
    let mut out = RgbaImage::from_pixel(w, h, Rgba([0, 0, 0, 0]));

    for (x, y, px) in out.enumerate_pixels_mut() {
        // Map the destination pixel centre back into the source (y points down).
        let dx = x as f64 + 0.5 - cx;
        let dy = y as f64 + 0.5 - cy;
        let sx = (dx * cos - dy * sin + cx).floor();
        let sy = (dx * sin + dy * cos + cy).floor();
        if sx >= 0.0 && sy >= 0.0 && sx < w as f64 && sy < h as f64 {
            *px = *src.get_pixel(sx as u32, sy as u32);
        }
    }

    let rotated = DynamicImage::ImageRgba8(out);
    if img.color().has_alpha() {
        rotated
    } else {
        DynamicImage::ImageRgb8(rotated.to_rgb8())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::GenericImageView;

    #[test]
    fn parse_scale_specs() {
        assert_eq!(ScaleSpec::parse("0.25").unwrap(), ScaleSpec::Factor(0.25));
        assert_eq!(ScaleSpec::parse("200x150").unwrap(), ScaleSpec::Dimensions(200, 150));
        assert_eq!(ScaleSpec::parse(" 64X48 ").unwrap(), ScaleSpec::Dimensions(64, 48));
        for bad in ["big", "0", "-1", "0x10", "10x", "NaN", "inf", ""] {
            assert!(
                matches!(ScaleSpec::parse(bad), Err(ImageError::InvalidScaleSpec { .. })),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn factor_target_size_is_floored() {
        assert_eq!(ScaleSpec::Factor(0.25).target_size(4000, 3000), (1000, 750));
        assert_eq!(ScaleSpec::Factor(0.5).target_size(33, 21), (16, 10));
        assert_eq!(ScaleSpec::Factor(0.001).target_size(100, 50), (1, 1));
    }

    #[test]
    fn dimensions_fit_inside_box() {
        assert_eq!(ScaleSpec::Dimensions(200, 200).target_size(4000, 3000), (200, 150));
        assert_eq!(ScaleSpec::Dimensions(300, 100).target_size(4000, 3000), (133, 100));
    }

    #[test]
    fn never_enlarges() {
        assert_eq!(ScaleSpec::Factor(2.0).target_size(40, 30), (40, 30));
        assert_eq!(ScaleSpec::Dimensions(800, 600).target_size(40, 30), (40, 30));
    }

    #[test]
    fn invalid_rotation_is_rejected() {
        assert!(matches!(
            parse_degrees("quarter"),
            Err(ImageError::InvalidRotation { .. })
        ));
        assert_eq!(parse_degrees("-12.5").unwrap(), -12.5);
    }

    #[test]
    fn rotate_90_is_counter_clockwise() {
        // Red left half, blue right half, on a square canvas.
        let img = RgbaImage::from_fn(4, 4, |x, _| {
            if x < 2 {
                Rgba([255, 0, 0, 255])
            } else {
                Rgba([0, 0, 255, 255])
            }
        });
        let rotated = rotate_about_center(&DynamicImage::ImageRgba8(img), 90.0);
        assert_eq!(rotated.dimensions(), (4, 4));
        // Counter-clockwise: the right half moves to the top.
        assert_eq!(rotated.get_pixel(1, 0), Rgba([0, 0, 255, 255]));
        assert_eq!(rotated.get_pixel(1, 3), Rgba([255, 0, 0, 255]));
    }

    #[test]
    fn rotate_keeps_canvas_size() {
        let img = DynamicImage::ImageRgb8(image::RgbImage::new(8, 6));
        let rotated = rotate_about_center(&img, 90.0);
        assert_eq!(rotated.dimensions(), (8, 6));
        assert!(!rotated.color().has_alpha());
    }

    #[test]
    fn transformer_writes_suffixed_files() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("foo.png");
        DynamicImage::ImageRgb8(image::RgbImage::new(40, 32))
            .save(&src)
            .unwrap();

        let t = ImageTransformer;
        let rotated = t.rotate(&src, "90").unwrap();
        assert_eq!(rotated, dir.path().join("foo-rot90.png"));
        let scaled = t.scale(&rotated, "0.25").unwrap();
        assert_eq!(scaled, dir.path().join("foo-rot90-scale0.25.png"));
        assert_eq!(image::open(&scaled).unwrap().dimensions(), (10, 8));
    }

    #[test]
    fn jpeg_output_drops_alpha() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("pic.jpg");
        DynamicImage::ImageRgb8(image::RgbImage::from_pixel(16, 16, image::Rgb([10, 200, 10])))
            .save(&src)
            .unwrap();
        let out = ImageTransformer.rotate(&src, "45").unwrap();
        assert_eq!(image::open(&out).unwrap().dimensions(), (16, 16));
    }

    #[test]
    fn undecodable_source_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("notes.png");
        std::fs::write(&src, b"definitely not a png").unwrap();
        assert!(matches!(
            ImageTransformer.scale(&src, "0.5"),
            Err(ImageError::ImageDecode { .. })
        ));
    }
}
