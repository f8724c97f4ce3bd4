//! The seam to the image codec machinery.
//!
//! The conversion engine never touches pixels itself; everything between
//! "open this image" and "here are the WebP bytes" goes through the [`Codec`]
//! trait. [`WebpCodec`] is the bundled implementation.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use image::DynamicImage;
use thiserror::Error;
use tracing::{debug, trace};
use webp::{Encoder, WebPConfig};

/// Pixel decode/encode service used by the conversion engine.
pub trait Codec: Sync {
    /// Gather the metadata needed to decide the encode options.
    fn probe(&self, input: &Path) -> Result<ImageProbe, CodecError>;

    /// Produce the encoded WebP bytes for `input`.
    fn encode(&self, input: &Path, options: &EncodeOptions) -> Result<Vec<u8>, CodecError>;
}

/// The color space an image declares for its pixel data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorSpace {
    /// Standard RGB, the encode target.
    Srgb,
    /// Apple's wide-gamut Display P3.
    DisplayP3,
    /// RGB data without an sRGB declaration.
    Rgb,
    /// No usable color space information.
    Unknown,
}

impl ColorSpace {
    /// Whether sources in this space get normalized to sRGB before encoding.
    pub const fn needs_srgb_normalization(self) -> bool {
        matches!(self, Self::Rgb | Self::DisplayP3)
    }
}

/// Metadata reported by [`Codec::probe`].
#[derive(Debug, Clone, Copy)]
pub struct ImageProbe {
    /// Declared color space of the source.
    pub color_space: ColorSpace,
    /// Pixel width.
    pub width: u32,
    /// Pixel height.
    pub height: u32,
}

/// The full set of options handed to [`Codec::encode`].
#[derive(Debug, Clone, Copy)]
pub struct EncodeOptions {
    /// WebP quality within `1..=100`.
    pub quality: u8,
    /// Apply the embedded EXIF orientation before encoding.
    pub auto_rotate: bool,
    /// Color space to convert into, when the source needs normalization.
    pub target_color_space: Option<ColorSpace>,
    /// Compression effort (WebP method 0-6).
    pub effort: u8,
    /// Quality of the alpha channel.
    pub alpha_quality: u8,
    /// Lossless instead of lossy encoding.
    pub lossless: bool,
}

impl EncodeOptions {
    /// The engine's fixed encode profile: lossy, maximum effort, full alpha
    /// quality, auto-rotated, normalized to sRGB where the source asks for it.
    pub fn webp(quality: u8, source: ColorSpace) -> Self {
        let target_color_space = source
            .needs_srgb_normalization()
            .then_some(ColorSpace::Srgb);
        Self {
            quality,
            auto_rotate: true,
            target_color_space,
            effort: 6,
            alpha_quality: 100,
            lossless: false,
        }
    }
}

/// Failure inside the codec while working on one image.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The image file could not be opened.
    #[error("Could not open image '{0}'")]
    Open(PathBuf, #[source] std::io::Error),
    /// The image file could not be decoded.
    #[error("Could not decode image '{0}'")]
    Decode(PathBuf, #[source] image::ImageError),
    /// The encoder rejected its own configuration.
    #[error("WebP encoder rejected its configuration")]
    Configure,
    /// The encoder gave up on the decoded pixels.
    #[error("WebP encoding failed for '{0}': {1}")]
    Encode(PathBuf, String),
}

/// Codec backed by the `image` decoders and the libwebp encoder.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebpCodec;

impl Codec for WebpCodec {
    fn probe(&self, input: &Path) -> Result<ImageProbe, CodecError> {
        let (width, height) = image::image_dimensions(input)
            .map_err(|e| CodecError::Decode(input.to_path_buf(), e))?;
        let color_space = declared_color_space(input);
        trace!("probed {input:?}: {width}x{height}, {color_space:?}");
        Ok(ImageProbe {
            color_space,
            width,
            height,
        })
    }

    fn encode(&self, input: &Path, options: &EncodeOptions) -> Result<Vec<u8>, CodecError> {
        let open_err = |e| CodecError::Open(input.to_path_buf(), e);

        let image = image::ImageReader::open(input)
            .map_err(open_err)?
            .with_guessed_format()
            .map_err(open_err)?
            .decode()
            .map_err(|e| CodecError::Decode(input.to_path_buf(), e))?;

        let image = match options.auto_rotate {
            true => apply_orientation(image, exif_orientation(input)),
            false => image,
        };

        // Decoding to 8-bit RGBA is the sRGB normalization step; wide-gamut
        // sources carry their intent only in metadata we drop here.
        let pixels = image.to_rgba8();
        let (width, height) = pixels.dimensions();

        let mut config = WebPConfig::new().map_err(|()| CodecError::Configure)?;
        config.quality = f32::from(options.quality);
        config.method = i32::from(options.effort);
        config.alpha_quality = i32::from(options.alpha_quality);
        config.lossless = i32::from(options.lossless);

        let encoded = Encoder::from_rgba(pixels.as_raw(), width, height)
            .encode_advanced(&config)
            .map_err(|e| CodecError::Encode(input.to_path_buf(), format!("{e:?}")))?;
        debug!(
            "encoded {input:?} at quality {}: {} bytes",
            options.quality,
            encoded.len()
        );
        Ok(encoded.to_vec())
    }
}

/// Read the EXIF Orientation tag, defaulting to 1 (upright).
fn exif_orientation(input: &Path) -> u32 {
    let Ok(file) = File::open(input) else {
        return 1;
    };
    let mut reader = BufReader::new(file);
    let Ok(data) = exif::Reader::new().read_from_container(&mut reader) else {
        return 1;
    };
    data.get_field(exif::Tag::Orientation, exif::In::PRIMARY)
        .and_then(|field| field.value.get_uint(0))
        .unwrap_or(1)
}

/// Map the source's declared color space from its EXIF metadata.
fn declared_color_space(input: &Path) -> ColorSpace {
    let Ok(file) = File::open(input) else {
        return ColorSpace::Unknown;
    };
    let mut reader = BufReader::new(file);
    let Ok(data) = exif::Reader::new().read_from_container(&mut reader) else {
        return ColorSpace::Unknown;
    };
    match data
        .get_field(exif::Tag::ColorSpace, exif::In::PRIMARY)
        .and_then(|field| field.value.get_uint(0))
    {
        Some(1) => ColorSpace::Srgb,
        // uncalibrated: typically a wide-gamut profile such as Display P3
        Some(_) => ColorSpace::Rgb,
        None => ColorSpace::Unknown,
    }
}

/// Bake the EXIF orientation into the pixel data.
fn apply_orientation(image: DynamicImage, orientation: u32) -> DynamicImage {
    match orientation {
        2 => image.fliph(),
        3 => image.rotate180(),
        4 => image.flipv(),
        5 => image.rotate90().fliph(),
        6 => image.rotate90(),
        7 => image.rotate270().fliph(),
        8 => image.rotate270(),
        _ => image,
    }
}
