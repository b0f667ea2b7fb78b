//! Image loading and texture slot detection.
//!
//! Decodes PNG, JPG, TGA and EXR files into RGBA8 buffers. EXR values are
//! tone-mapped to 8-bit by the decoder before analysis.

use crate::{Error, Result};
use image::{DynamicImage, GenericImageView, ImageFormat, RgbaImage};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::path::Path;

/// Functional texture channel of a material.
///
/// The declaration order is the canonical order used for rule evaluation,
/// fingerprinting and reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TextureSlot {
    Albedo,
    Normal,
    Roughness,
    Metallic,
    AmbientOcclusion,
    Height,
}

impl TextureSlot {
    pub const ALL: [TextureSlot; 6] = [
        TextureSlot::Albedo,
        TextureSlot::Normal,
        TextureSlot::Roughness,
        TextureSlot::Metallic,
        TextureSlot::AmbientOcclusion,
        TextureSlot::Height,
    ];

    /// Slots every complete material is expected to carry.
    pub const CORE: [TextureSlot; 5] = [
        TextureSlot::Albedo,
        TextureSlot::Normal,
        TextureSlot::Roughness,
        TextureSlot::Metallic,
        TextureSlot::AmbientOcclusion,
    ];

    /// Canonical name used in manifests, script payloads and reports.
    pub fn name(&self) -> &'static str {
        match self {
            TextureSlot::Albedo => "albedo",
            TextureSlot::Normal => "normal",
            TextureSlot::Roughness => "roughness",
            TextureSlot::Metallic => "metallic",
            TextureSlot::AmbientOcclusion => "ao",
            TextureSlot::Height => "height",
        }
    }

    /// Accepted spellings, canonical name first.
    pub fn aliases(&self) -> &'static [&'static str] {
        match self {
            TextureSlot::Albedo => &["albedo", "basecolor", "base_color", "diffuse", "color"],
            TextureSlot::Normal => &["normal", "norm", "nrm"],
            TextureSlot::Roughness => &["roughness", "rough"],
            TextureSlot::Metallic => &["metallic", "metal", "metalness"],
            TextureSlot::AmbientOcclusion => {
                &["ao", "ambient_occlusion", "ambientocclusion", "occlusion"]
            }
            TextureSlot::Height => &["height", "displacement", "bump"],
        }
    }

    /// Resolve a slot from any accepted spelling (case-insensitive).
    pub fn from_name(name: &str) -> Option<TextureSlot> {
        let lower = name.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|slot| slot.aliases().contains(&lower.as_str()))
    }
}

impl fmt::Display for TextureSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for TextureSlot {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for TextureSlot {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        TextureSlot::from_name(&name)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown texture slot '{}'", name)))
    }
}

/// Formats accepted by [`ImageLoader::load`].
pub const SUPPORTED_FORMATS: &[ImageFormat] = &[
    ImageFormat::Png,
    ImageFormat::Jpeg,
    ImageFormat::Tga,
    ImageFormat::OpenExr,
];

/// File extensions considered when scanning a material folder.
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "tga", "exr"];

/// A decoded image
#[derive(Debug, Clone)]
pub struct LoadedImage {
    pub width: u32,
    pub height: u32,
    /// RGBA pixel data (4 bytes per pixel, row-major)
    pub data: Vec<u8>,
    pub format: ImageFormat,
}

impl LoadedImage {
    fn from_dynamic(image: DynamicImage, format: ImageFormat) -> Self {
        let (width, height) = image.dimensions();
        Self {
            width,
            height,
            data: image.to_rgba8().into_raw(),
            format,
        }
    }
}

pub struct ImageLoader;

impl ImageLoader {
    /// Load an image file and convert it to RGBA8.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<LoadedImage> {
        let path = path.as_ref();
        let reader = image::ImageReader::open(path)?.with_guessed_format()?;
        let format = reader
            .format()
            .or_else(|| {
                path.extension()
                    .and_then(|e| e.to_str())
                    .and_then(|e| ImageFormat::from_extension(e))
            })
            .ok_or_else(|| Error::Other(format!("Unknown image format: {}", path.display())))?;

        if !SUPPORTED_FORMATS.contains(&format) {
            return Err(Error::Other(format!(
                "Unsupported format {:?} for {}. Use PNG, JPG, TGA, or EXR.",
                format,
                path.display()
            )));
        }

        let loaded = LoadedImage::from_dynamic(reader.decode()?, format);
        if loaded.width == 0 || loaded.height == 0 {
            return Err(Error::Other(format!(
                "Image {} has zero dimensions",
                path.display()
            )));
        }
        Ok(loaded)
    }

    /// Save an RGBA8 buffer. The format follows the file extension.
    pub fn save<P: AsRef<Path>>(width: u32, height: u32, data: &[u8], path: P) -> Result<()> {
        let path = path.as_ref();
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|s| s.to_lowercase());
        if !matches!(ext.as_deref(), Some("png" | "jpg" | "jpeg" | "tga")) {
            return Err(Error::InvalidParameter(format!(
                "Unsupported output format {:?}. Use .png, .jpg, or .tga.",
                ext
            )));
        }

        let img = RgbaImage::from_raw(width, height, data.to_vec()).ok_or_else(|| {
            Error::InvalidParameter(format!(
                "Pixel buffer does not match {}x{} RGBA",
                width, height
            ))
        })?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        if matches!(ext.as_deref(), Some("jpg" | "jpeg")) {
            // JPEG has no alpha channel
            DynamicImage::ImageRgba8(img).to_rgb8().save(path)?;
        } else {
            img.save(path)?;
        }
        Ok(())
    }

    /// Detect the texture slot from a file name.
    ///
    /// Stems are split on `_`, `-`, `.` and spaces; a token equal to an alias
    /// wins. Aliases of four letters or more also match inside a token
    /// (e.g. `brickalbedo`).
    pub fn detect_slot_from_path<P: AsRef<Path>>(path: P) -> Option<TextureSlot> {
        let stem = path.as_ref().file_stem()?.to_str()?.to_lowercase();
        let tokens: Vec<&str> = stem
            .split(|c: char| c == '_' || c == '-' || c == '.' || c.is_whitespace())
            .filter(|t| !t.is_empty())
            .collect();

        for token in tokens.iter().rev() {
            if let Some(slot) = TextureSlot::from_name(token) {
                return Some(slot);
            }
        }

        TextureSlot::ALL.into_iter().find(|slot| {
            slot.aliases()
                .iter()
                .filter(|alias| alias.len() >= 4)
                .any(|alias| stem.contains(alias))
        })
    }
}
