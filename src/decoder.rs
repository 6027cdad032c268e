use image::imageops::{self, FilterType};
use image::{DynamicImage, GenericImageView, ImageReader};
use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::catalog::ImageRef;

// ---------------------------------------------------------------------------
// Viewport and decoded buffers
// ---------------------------------------------------------------------------

/// Size of the display surface in physical pixels. Never zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ViewportSize {
    pub width: u32,
    pub height: u32,
}

impl ViewportSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
        }
    }
}

/// Decoded, orientation-corrected RGBA8 pixels that fit inside a viewport.
#[derive(Clone, PartialEq, Eq)]
pub struct DisplayBuffer {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl fmt::Debug for DisplayBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DisplayBuffer")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.pixels.len())
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("cannot open {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot decode {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

// ---------------------------------------------------------------------------
// Decoder contract
// ---------------------------------------------------------------------------

/// Turns an image reference into a buffer sized for a viewport.
///
/// Implementations must be callable from several worker threads at once and
/// must not touch viewer state.
pub trait Decode: Send + Sync + 'static {
    fn decode(&self, image: &ImageRef, viewport: ViewportSize) -> Result<DisplayBuffer, DecodeError>;
}

/// Decoder backed by the `image` crate with EXIF orientation support.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImageDecoder;

impl Decode for ImageDecoder {
    fn decode(&self, image: &ImageRef, viewport: ViewportSize) -> Result<DisplayBuffer, DecodeError> {
        let path = image.path();
        let img = ImageReader::open(path)
            .map_err(|source| DecodeError::Io {
                path: path.to_path_buf(),
                source,
            })?
            .with_guessed_format()
            .map_err(|source| DecodeError::Io {
                path: path.to_path_buf(),
                source,
            })?
            .decode()
            .map_err(|source| DecodeError::Image {
                path: path.to_path_buf(),
                source,
            })?;

        let orientation = read_orientation(path).unwrap_or(1);
        let img = apply_orientation(img, orientation);
        let img = fit_within(img, viewport);

        let (width, height) = img.dimensions();
        Ok(DisplayBuffer {
            width,
            height,
            pixels: img.to_rgba8().into_raw(),
        })
    }
}

fn read_orientation(path: &Path) -> Option<u32> {
    let file = File::open(path).ok()?;
    let mut buf = BufReader::new(file);
    let exif = exif::Reader::new().read_from_container(&mut buf).ok()?;
    let field = exif.get_field(exif::Tag::Orientation, exif::In::PRIMARY)?;
    let o = field.value.get_uint(0)?;
    log::debug!("exif orientation {} for {}", o, path.display());
    Some(o)
}

/// Apply an EXIF orientation value (1..=8). Unknown values leave the image as is.
pub fn apply_orientation(img: DynamicImage, orientation: u32) -> DynamicImage {
    match orientation {
        2 => img.fliph(),
        3 => img.rotate180(),
        4 => img.flipv(),
        5 => img.rotate90().fliph(),
        6 => img.rotate90(),
        7 => img.rotate270().fliph(),
        8 => img.rotate270(),
        _ => img,
    }
}

/// Downscale to fit the viewport, keeping the aspect ratio. Never upscales.
pub fn fit_within(img: DynamicImage, viewport: ViewportSize) -> DynamicImage {
    let (w, h) = img.dimensions();
    if w <= viewport.width && h <= viewport.height {
        return img;
    }
    let (tw, th) = fit_dimensions(w, h, viewport);
    DynamicImage::ImageRgba8(imageops::resize(&img, tw, th, FilterType::Lanczos3))
}

fn fit_dimensions(w: u32, h: u32, viewport: ViewportSize) -> (u32, u32) {
    let scale = (viewport.width as f64 / w as f64).min(viewport.height as f64 / h as f64);
    let tw = ((w as f64 * scale).round() as u32).clamp(1, viewport.width);
    let th = ((h as f64 * scale).round() as u32).clamp(1, viewport.height);
    (tw, th)
}
