//! # Codec Module
//!
//! Confine tra l'engine (file, concorrenza, atomicità) e il lavoro sui pixel.
//!
//! ## Pipeline di `WebpCodec`:
//! 1. **Decodifica**: formato rilevato dal contenuto, decodifica strict con
//!    `image::Limits` derivati dalla configurazione
//! 2. **Orientamento**: applica l'orientamento EXIF (JPEG, PNG, TIFF, WebP)
//! 3. **Colore**: buffer float (lineari) e profili Display P3 vengono portati
//!    in sRGB, poi a 8 bit RGB/RGBA
//! 4. **Encoding**: WebP lossy via libwebp (qualità configurata, method 6,
//!    alpha quality 100, sharp YUV, near-lossless disattivato)
//!
//! Il codec è sincrono: l'engine lo chiama su `spawn_blocking`.
//!
//! ## Esempio:
//! ```rust,ignore
//! let codec = WebpCodec::new(&config);
//! codec.encode(Path::new("in.jpg"), Path::new("/tmp/out.webp"), 90)?;
//! ```

use image::{DynamicImage, ImageDecoder, ImageReader, Limits};
use std::path::Path;
use tracing::debug;

use crate::config::Config;
use crate::error::CodecError;

/// Decode a source image and encode it to WebP at `destination`
pub trait Codec: Send + Sync {
    fn encode(&self, source: &Path, destination: &Path, quality: u8) -> Result<(), CodecError>;
}

/// Color space of a decoded source, as far as normalization cares
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceColorSpace {
    Srgb,
    LinearRgb,
    DisplayP3,
}

/// In-process decoder + libwebp lossy encoder
#[derive(Debug, Clone)]
pub struct WebpCodec {
    memory_limit_bytes: u64,
    max_pixels: u64,
}

impl WebpCodec {
    pub fn new(config: &Config) -> Self {
        Self {
            memory_limit_bytes: config.decode_memory_limit_mb * 1024 * 1024,
            max_pixels: config.max_input_pixels,
        }
    }

    fn decode(&self, source: &Path) -> Result<DynamicImage, CodecError> {
        let mut limits = Limits::default();
        limits.max_alloc = Some(self.memory_limit_bytes);

        let mut reader = ImageReader::open(source)?.with_guessed_format()?;
        reader.limits(limits);
        let mut decoder = reader.into_decoder()?;

        let (width, height) = decoder.dimensions();
        if u64::from(width) * u64::from(height) > self.max_pixels {
            return Err(CodecError::TooLarge {
                width,
                height,
                limit: self.max_pixels,
            });
        }

        let orientation = decoder.orientation()?;
        let icc_profile = decoder.icc_profile()?;

        let mut image = DynamicImage::from_decoder(decoder)?;
        image.apply_orientation(orientation);

        let color_space = classify_color_space(&image, icc_profile.as_deref());
        debug!(
            "Decoded {} ({}x{}, {:?}, {:?})",
            source.display(),
            width,
            height,
            color_space,
            orientation
        );

        Ok(normalize_to_srgb(image, color_space))
    }
}

impl Codec for WebpCodec {
    fn encode(&self, source: &Path, destination: &Path, quality: u8) -> Result<(), CodecError> {
        let image = self.decode(source)?;

        let encoder = webp::Encoder::from_image(&image)
            .map_err(|e| CodecError::Encode(e.to_string()))?;

        let mut config = webp::WebPConfig::new()
            .map_err(|_| CodecError::Encode("cannot initialise WebP encoder".to_string()))?;
        config.lossless = 0;
        config.quality = f32::from(quality);
        config.method = 6;
        config.alpha_quality = 100;
        config.use_sharp_yuv = 1;
        // 100 disables near-lossless preprocessing
        config.near_lossless = 100;

        let encoded = encoder
            .encode_advanced(&config)
            .map_err(|e| CodecError::Encode(format!("{:?}", e)))?;

        std::fs::write(destination, &*encoded)?;
        Ok(())
    }
}

/// Decide how a decoded image must be normalized before encoding
pub fn classify_color_space(image: &DynamicImage, icc_profile: Option<&[u8]>) -> SourceColorSpace {
    if matches!(
        image,
        DynamicImage::ImageRgb32F(_) | DynamicImage::ImageRgba32F(_)
    ) {
        return SourceColorSpace::LinearRgb;
    }

    match icc_profile {
        Some(profile) if is_display_p3(profile) => SourceColorSpace::DisplayP3,
        _ => SourceColorSpace::Srgb,
    }
}

/// ICC descriptions are ASCII (`desc`) or UTF-16BE (`mluc`); look for either
fn is_display_p3(profile: &[u8]) -> bool {
    const NAME: &str = "Display P3";
    let ascii = NAME.as_bytes();
    let utf16: Vec<u8> = NAME.encode_utf16().flat_map(u16::to_be_bytes).collect();

    profile.windows(ascii.len()).any(|w| w == ascii)
        || profile.windows(utf16.len()).any(|w| w == utf16.as_slice())
}

/// Bring the image to 8-bit sRGB, keeping alpha when present
pub fn normalize_to_srgb(image: DynamicImage, color_space: SourceColorSpace) -> DynamicImage {
    let has_alpha = image.color().has_alpha();

    match color_space {
        SourceColorSpace::Srgb => {
            if has_alpha {
                DynamicImage::ImageRgba8(image.to_rgba8())
            } else {
                DynamicImage::ImageRgb8(image.to_rgb8())
            }
        }
        SourceColorSpace::LinearRgb => {
            let mut buffer = image.to_rgba32f();
            for pixel in buffer.pixels_mut() {
                for channel in &mut pixel.0[..3] {
                    *channel = linear_to_srgb(*channel);
                }
            }
            finish_float(buffer, has_alpha)
        }
        SourceColorSpace::DisplayP3 => {
            let mut buffer = image.to_rgba32f();
            for pixel in buffer.pixels_mut() {
                let [r, g, b, _] = pixel.0;
                let linear = [srgb_to_linear(r), srgb_to_linear(g), srgb_to_linear(b)];
                for (channel, row) in pixel.0[..3].iter_mut().zip(P3_TO_SRGB.iter()) {
                    let value = row[0] * linear[0] + row[1] * linear[1] + row[2] * linear[2];
                    *channel = linear_to_srgb(value);
                }
            }
            finish_float(buffer, has_alpha)
        }
    }
}

/// Linear Display P3 to linear sRGB (both D65)
const P3_TO_SRGB: [[f32; 3]; 3] = [
    [1.224_940_2, -0.224_940_4, 0.0],
    [-0.042_056_955, 1.042_057_1, 0.0],
    [-0.019_637_555, -0.078_636_05, 1.098_273_6],
];

fn finish_float(buffer: image::Rgba32FImage, has_alpha: bool) -> DynamicImage {
    let image = DynamicImage::ImageRgba32F(buffer);
    if has_alpha {
        DynamicImage::ImageRgba8(image.to_rgba8())
    } else {
        DynamicImage::ImageRgb8(image.to_rgb8())
    }
}

fn srgb_to_linear(value: f32) -> f32 {
    let value = value.clamp(0.0, 1.0);
    if value <= 0.040_45 {
        value / 12.92
    } else {
        ((value + 0.055) / 1.055).powf(2.4)
    }
}

fn linear_to_srgb(value: f32) -> f32 {
    let value = value.clamp(0.0, 1.0);
    if value <= 0.003_130_8 {
        value * 12.92
    } else {
        1.055 * value.powf(1.0 / 2.4) - 0.055
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, Rgb32FImage, RgbImage, Rgba, RgbaImage};
    use tempfile::TempDir;

    #[test]
    fn test_transfer_functions_round_trip() {
        for value in [0.0f32, 0.002, 0.04, 0.2, 0.5, 0.9, 1.0] {
            let back = linear_to_srgb(srgb_to_linear(value));
            assert!((back - value).abs() < 1e-4, "{value} -> {back}");
        }
    }

    #[test]
    fn test_classify_float_as_linear() {
        let image = DynamicImage::ImageRgb32F(Rgb32FImage::new(2, 2));
        assert_eq!(classify_color_space(&image, None), SourceColorSpace::LinearRgb);
    }

    #[test]
    fn test_classify_display_p3_profile() {
        let image = DynamicImage::ImageRgb8(RgbImage::new(2, 2));

        let mut ascii_profile = vec![0u8; 64];
        ascii_profile.extend_from_slice(b"Display P3");
        assert_eq!(
            classify_color_space(&image, Some(&ascii_profile)),
            SourceColorSpace::DisplayP3
        );

        let utf16_profile: Vec<u8> = "Display P3"
            .encode_utf16()
            .flat_map(u16::to_be_bytes)
            .collect();
        assert_eq!(
            classify_color_space(&image, Some(&utf16_profile)),
            SourceColorSpace::DisplayP3
        );

        assert_eq!(
            classify_color_space(&image, Some(b"sRGB IEC61966-2.1")),
            SourceColorSpace::Srgb
        );
        assert_eq!(classify_color_space(&image, None), SourceColorSpace::Srgb);
    }

    #[test]
    fn test_normalize_linear_brightens_midtones() {
        let mut buffer = Rgb32FImage::new(1, 1);
        buffer.put_pixel(0, 0, Rgb([0.214, 0.214, 0.214]));

        let out = normalize_to_srgb(DynamicImage::ImageRgb32F(buffer), SourceColorSpace::LinearRgb);
        let DynamicImage::ImageRgb8(rgb) = out else {
            panic!("expected 8-bit rgb output");
        };
        let value = rgb.get_pixel(0, 0).0[0];
        assert!((126..=129).contains(&value), "got {value}");
    }

    #[test]
    fn test_normalize_keeps_alpha() {
        let mut buffer = RgbaImage::new(1, 1);
        buffer.put_pixel(0, 0, Rgba([10, 20, 30, 128]));

        let out = normalize_to_srgb(DynamicImage::ImageRgba8(buffer), SourceColorSpace::Srgb);
        let DynamicImage::ImageRgba8(rgba) = out else {
            panic!("expected rgba output");
        };
        assert_eq!(rgba.get_pixel(0, 0).0, [10, 20, 30, 128]);
    }

    #[test]
    fn test_p3_white_stays_white() {
        let mut buffer = RgbImage::new(1, 1);
        buffer.put_pixel(0, 0, Rgb([255, 255, 255]));

        let out = normalize_to_srgb(DynamicImage::ImageRgb8(buffer), SourceColorSpace::DisplayP3);
        let DynamicImage::ImageRgb8(rgb) = out else {
            panic!("expected 8-bit rgb output");
        };
        for channel in rgb.get_pixel(0, 0).0 {
            assert!(channel >= 254, "got {channel}");
        }
    }

    #[test]
    fn test_encode_png_to_webp() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("gradient.png");
        let destination = dir.path().join("gradient.webp");

        let image = RgbImage::from_fn(32, 24, |x, y| Rgb([(x * 8) as u8, (y * 10) as u8, 128]));
        image.save(&source).unwrap();

        WebpCodec::new(&Config::default())
            .encode(&source, &destination, 80)
            .unwrap();

        let bytes = std::fs::read(&destination).unwrap();
        assert!(bytes.len() > 12);
        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"WEBP");
    }

    /// Baseline JPEG with an APP1 Exif block carrying only the orientation tag
    fn jpeg_with_orientation(width: u32, height: u32, orientation: u16) -> Vec<u8> {
        let mut jpeg = Vec::new();
        RgbImage::from_pixel(width, height, Rgb([200, 30, 30]))
            .write_to(&mut std::io::Cursor::new(&mut jpeg), image::ImageFormat::Jpeg)
            .unwrap();

        // big-endian TIFF header, one IFD entry: 0x0112 SHORT x1
        let mut tiff = b"MM\x00\x2a\x00\x00\x00\x08\x00\x01\x01\x12\x00\x03\x00\x00\x00\x01".to_vec();
        tiff.extend_from_slice(&orientation.to_be_bytes());
        tiff.extend_from_slice(&[0, 0, 0, 0, 0, 0]);

        let mut app1 = vec![0xFF, 0xE1];
        app1.extend_from_slice(&((2 + 6 + tiff.len()) as u16).to_be_bytes());
        app1.extend_from_slice(b"Exif\0\0");
        app1.extend_from_slice(&tiff);

        jpeg.splice(2..2, app1);
        jpeg
    }

    #[test]
    fn test_exif_orientation_is_applied() {
        let dir = TempDir::new().unwrap();
        let codec = WebpCodec::new(&Config::default());

        let upright = dir.path().join("upright.jpg");
        std::fs::write(&upright, jpeg_with_orientation(4, 2, 1)).unwrap();
        let image = codec.decode(&upright).unwrap();
        assert_eq!((image.width(), image.height()), (4, 2));

        let rotated = dir.path().join("rotated.jpg");
        std::fs::write(&rotated, jpeg_with_orientation(4, 2, 6)).unwrap();
        let image = codec.decode(&rotated).unwrap();
        assert_eq!((image.width(), image.height()), (2, 4));

        let destination = dir.path().join("rotated.webp");
        codec.encode(&rotated, &destination, 90).unwrap();
        assert_eq!(image::image_dimensions(&destination).unwrap(), (2, 4));
    }

    #[test]
    fn test_encode_rejects_corrupt_input() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("broken.jpg");
        std::fs::write(&source, b"definitely not a jpeg").unwrap();

        let result = WebpCodec::new(&Config::default()).encode(
            &source,
            &dir.path().join("broken.webp"),
            90,
        );
        assert!(result.is_err());
        assert!(!dir.path().join("broken.webp").exists());
    }

    #[test]
    fn test_encode_rejects_oversized_input() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("wide.png");
        RgbImage::new(20, 10).save(&source).unwrap();

        let config = Config {
            max_input_pixels: 100,
            ..Default::default()
        };
        let result = WebpCodec::new(&config).encode(&source, &dir.path().join("wide.webp"), 90);
        assert!(matches!(result, Err(CodecError::TooLarge { width: 20, height: 10, .. })));
    }
}
