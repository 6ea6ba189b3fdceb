// ============================================================================
// IO — source decoding service and output encoding
// ============================================================================

use image::codecs::bmp::BmpEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::codecs::tga::TgaEncoder;
use image::codecs::tiff::TiffEncoder;
use image::io::Reader as ImageReader;
use image::{ColorType, DynamicImage, ImageEncoder, ImageError, RgbaImage};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use crate::canvas::{MAX_SURFACE_PIXELS, Surface};

// ============================================================================
// DECODE SERVICE
// ============================================================================

/// Why a source path produced no pixels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Empty path, or nothing (or not a regular file) at that path.
    Missing,
    /// The file exists but could not be read or decoded.
    Unreadable(String),
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecodeError::Missing => write!(f, "file not found"),
            DecodeError::Unreadable(e) => write!(f, "decode error: {}", e),
        }
    }
}

impl From<std::io::Error> for DecodeError {
    fn from(e: std::io::Error) -> Self {
        DecodeError::Unreadable(e.to_string())
    }
}

impl From<ImageError> for DecodeError {
    fn from(e: ImageError) -> Self {
        DecodeError::Unreadable(e.to_string())
    }
}

/// Turns a file path into an RGBA pixel grid.
///
/// Implementations must report failure through the `Err` value and never
/// panic on a missing or corrupt file.
pub trait SourceDecoder: Send + Sync {
    fn decode(&self, path: &Path) -> Result<RgbaImage, DecodeError>;
}

/// Decoder backed by the `image` crate. The format is sniffed from the file's
/// leading bytes, so the extension may be missing or wrong.
#[derive(Clone, Copy, Debug, Default)]
pub struct ImageFileDecoder;

impl SourceDecoder for ImageFileDecoder {
    fn decode(&self, path: &Path) -> Result<RgbaImage, DecodeError> {
        if path.as_os_str().is_empty() || !path.is_file() {
            return Err(DecodeError::Missing);
        }
        let (w, h) = ImageReader::open(path)?.with_guessed_format()?.into_dimensions()?;
        if (w as u64) * (h as u64) > MAX_SURFACE_PIXELS {
            return Err(DecodeError::Unreadable(format!(
                "{}×{} exceeds the {} pixel limit",
                w, h, MAX_SURFACE_PIXELS
            )));
        }
        let img = ImageReader::open(path)?.with_guessed_format()?.decode()?;
        Ok(img.to_rgba8())
    }
}

/// Load a destination image (errors are reported, unlike source slots).
pub fn load_surface(path: &Path) -> Result<Surface, String> {
    let img = ImageFileDecoder
        .decode(path)
        .map_err(|e| format!("{}: {}", path.display(), e))?;
    Ok(Surface::from_rgba_image(&img))
}

// ============================================================================
// OUTPUT ENCODING
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum SaveFormat {
    #[default]
    Png,
    Jpeg,
    Bmp,
    Tga,
    Tiff,
}

impl SaveFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            SaveFormat::Png => "png",
            SaveFormat::Jpeg => "jpg",
            SaveFormat::Bmp => "bmp",
            SaveFormat::Tga => "tga",
            SaveFormat::Tiff => "tiff",
        }
    }

    /// Parse a format name or file extension. Unknown names yield `None`.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "png" => Some(SaveFormat::Png),
            "jpg" | "jpeg" => Some(SaveFormat::Jpeg),
            "bmp" => Some(SaveFormat::Bmp),
            "tga" => Some(SaveFormat::Tga),
            "tif" | "tiff" => Some(SaveFormat::Tiff),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_name)
    }
}

/// Encode and write a surface to `path`.
/// `quality` (1–100) only affects JPEG.
pub fn encode_and_write(
    surface: &Surface,
    path: &Path,
    format: SaveFormat,
    quality: u8,
) -> Result<(), ImageError> {
    let image = surface.to_rgba_image();
    let (w, h) = image.dimensions();

    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);

    match format {
        SaveFormat::Png => {
            PngEncoder::new(&mut writer).write_image(image.as_raw(), w, h, ColorType::Rgba8)?;
        }
        SaveFormat::Jpeg => {
            let rgb = DynamicImage::ImageRgba8(image).to_rgb8();
            let mut encoder = JpegEncoder::new_with_quality(&mut writer, quality.clamp(1, 100));
            encoder.encode(rgb.as_raw(), w, h, ColorType::Rgb8)?;
        }
        SaveFormat::Bmp => {
            let mut encoder = BmpEncoder::new(&mut writer);
            encoder.encode(image.as_raw(), w, h, ColorType::Rgba8)?;
        }
        SaveFormat::Tga => {
            TgaEncoder::new(&mut writer).encode(image.as_raw(), w, h, ColorType::Rgba8)?;
        }
        SaveFormat::Tiff => {
            TiffEncoder::new(&mut writer).write_image(image.as_raw(), w, h, ColorType::Rgba8)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pixel::ColorBgra;

    #[test]
    fn missing_and_empty_paths_are_missing() {
        assert_eq!(ImageFileDecoder.decode(Path::new("")), Err(DecodeError::Missing));
        assert_eq!(
            ImageFileDecoder.decode(Path::new("/definitely/not/here.png")),
            Err(DecodeError::Missing)
        );
    }

    #[test]
    fn corrupt_file_is_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.png");
        std::fs::write(&path, b"not really a png").unwrap();
        assert!(matches!(
            ImageFileDecoder.decode(&path),
            Err(DecodeError::Unreadable(_))
        ));
    }

    #[test]
    fn png_written_then_decoded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.png");
        let surface = Surface::new_filled(3, 2, ColorBgra::from_rgba(1, 2, 3, 4));
        encode_and_write(&surface, &path, SaveFormat::Png, 90).unwrap();
        let img = ImageFileDecoder.decode(&path).unwrap();
        assert_eq!(img.dimensions(), (3, 2));
        assert_eq!(img.get_pixel(2, 1).0, [1, 2, 3, 4]);
    }

    #[test]
    fn format_comes_from_contents_not_extension() {
        let dir = tempfile::tempdir().unwrap();
        let real = dir.path().join("real.png");
        let surface = Surface::new_filled(2, 2, ColorBgra::from_rgba(10, 0, 0, 255));
        encode_and_write(&surface, &real, SaveFormat::Png, 90).unwrap();

        for name in ["mask", "mask.jpg"] {
            let path = dir.path().join(name);
            std::fs::copy(&real, &path).unwrap();
            let img = ImageFileDecoder.decode(&path).unwrap();
            assert_eq!(img.dimensions(), (2, 2), "{}", name);
            assert_eq!(img.get_pixel(1, 1).0, [10, 0, 0, 255], "{}", name);
        }
    }

    #[test]
    fn format_from_path() {
        assert_eq!(SaveFormat::from_path(Path::new("a/b.JPEG")), Some(SaveFormat::Jpeg));
        assert_eq!(SaveFormat::from_path(Path::new("x.tif")), Some(SaveFormat::Tiff));
        assert_eq!(SaveFormat::from_path(Path::new("x.xyz")), None);
        assert_eq!(SaveFormat::from_path(Path::new("noext")), None);
    }
}
