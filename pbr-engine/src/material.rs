//! Materials and their texture maps.
//!
//! A [`TextureSet`] owns at most one [`Texture`] per [`TextureSlot`] and is
//! read-only once built.

use crate::image_loading::{ImageLoader, LoadedImage, TextureSlot, IMAGE_EXTENSIONS};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// A decoded texture map. Dimensions are never zero and the buffer always
/// holds `width * height` RGBA pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct Texture {
    width: u32,
    height: u32,
    /// RGBA pixel data (4 bytes per pixel, row-major)
    data: Vec<u8>,
    /// Source path when loaded from file
    path: Option<PathBuf>,
}

impl Texture {
    /// Build a texture from raw RGBA8 data. The buffer must hold exactly
    /// `width * height * 4` bytes.
    pub fn new(width: u32, height: u32, data: Vec<u8>, path: Option<PathBuf>) -> Result<Self> {
        let expected = width as usize * height as usize * 4;
        if width == 0 || height == 0 || data.len() != expected {
            return Err(Error::InvalidParameter(format!(
                "Texture buffer of {} bytes does not match {}x{} RGBA",
                data.len(),
                width,
                height
            )));
        }
        Ok(Self {
            width,
            height,
            data,
            path,
        })
    }

    /// Uniformly filled texture.
    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Result<Self> {
        let data = rgba
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * 4)
            .collect();
        Self::new(width, height, data, None)
    }

    /// Expand a single-channel buffer into gray RGBA.
    pub fn from_grayscale(width: u32, height: u32, luma: &[u8]) -> Result<Self> {
        let data = luma.iter().flat_map(|&v| [v, v, v, 255]).collect();
        Self::new(width, height, data, None)
    }

    pub fn from_loaded(image: LoadedImage, path: Option<PathBuf>) -> Result<Self> {
        Self::new(image.width, image.height, image.data, path)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let image = ImageLoader::load(path)?;
        Self::from_loaded(image, Some(path.to_path_buf()))
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// RGBA8 pixels, row-major
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Same size and source path with new pixels.
    pub(crate) fn with_pixels(&self, data: Vec<u8>) -> Texture {
        debug_assert_eq!(data.len(), self.data.len());
        Texture {
            width: self.width,
            height: self.height,
            data,
            path: self.path.clone(),
        }
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn is_power_of_two(&self) -> bool {
        is_power_of_two(self.width) && is_power_of_two(self.height)
    }

    /// Get pixel at (x, y) as [R, G, B, A]
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = (y as usize * self.width as usize + x as usize) * 4;
        let p = self.data.get(i..i + 4)?;
        Some([p[0], p[1], p[2], p[3]])
    }

    /// Rec. 601 luma of the pixel at (x, y), 0-255.
    pub fn luminance(&self, x: u32, y: u32) -> Option<f64> {
        self.pixel(x, y).map(|[r, g, b, _]| luma(r, g, b))
    }

    /// Write the texture to disk (format from extension).
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        ImageLoader::save(self.width, self.height, &self.data, path)
    }
}

pub(crate) fn luma(r: u8, g: u8, b: u8) -> f64 {
    0.299 * r as f64 + 0.587 * g as f64 + 0.114 * b as f64
}

pub(crate) fn is_power_of_two(n: u32) -> bool {
    n > 0 && (n & (n - 1)) == 0
}

/// One material: named set of texture maps keyed by slot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TextureSet {
    textures: BTreeMap<TextureSlot, Texture>,
    /// Display name (e.g. folder name)
    pub name: Option<String>,
    /// Folder the material was loaded from
    pub origin: Option<PathBuf>,
}

impl TextureSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Default::default()
        }
    }

    /// Builder-style insert.
    pub fn with(mut self, slot: TextureSlot, texture: Texture) -> Self {
        self.insert(slot, texture);
        self
    }

    /// Put a texture into a slot, returning the one it replaced.
    pub fn insert(&mut self, slot: TextureSlot, texture: Texture) -> Option<Texture> {
        self.textures.insert(slot, texture)
    }

    pub fn get(&self, slot: TextureSlot) -> Option<&Texture> {
        self.textures.get(&slot)
    }

    pub fn has(&self, slot: TextureSlot) -> bool {
        self.textures.contains_key(&slot)
    }

    /// Present textures in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (TextureSlot, &Texture)> {
        self.textures.iter().map(|(slot, t)| (*slot, t))
    }

    pub fn missing_slots<'a>(
        &'a self,
        required: &'a [TextureSlot],
    ) -> impl Iterator<Item = TextureSlot> + 'a {
        required.iter().copied().filter(|s| !self.has(*s))
    }

    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.textures.is_empty()
    }

    /// Dimensions of the first present texture in slot order.
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.textures.values().next().map(|t| (t.width, t.height))
    }

    pub fn dimensions_consistent(&self) -> bool {
        let Some((w, h)) = self.dimensions() else {
            return true;
        };
        self.textures
            .values()
            .all(|t| t.width == w && t.height == h)
    }

    /// Name for reports: explicit name, else origin folder name, else "unnamed".
    pub fn display_name(&self) -> String {
        self.name
            .clone()
            .or_else(|| {
                self.origin
                    .as_ref()
                    .and_then(|p| p.file_name())
                    .map(|n| n.to_string_lossy().into_owned())
            })
            .unwrap_or_else(|| "unnamed".to_string())
    }

    /// Report label of one map: its source path, else `material:slot`.
    pub fn texture_label(&self, slot: TextureSlot) -> String {
        match self.get(slot).and_then(|t| t.path()) {
            Some(path) => path.display().to_string(),
            None => format!("{}:{}", self.display_name(), slot),
        }
    }

    /// Analyzable state of the material (the script rule payload).
    pub fn summary(&self) -> MaterialSummary {
        let has = |slot| self.has(slot);
        MaterialSummary {
            path: self.origin.as_ref().map(|p| p.display().to_string()),
            name: self.name.clone(),
            texture_count: self.texture_count(),
            dimensions: self
                .dimensions()
                .map(|(width, height)| Dimensions { width, height }),
            maps: MapPresence {
                albedo: has(TextureSlot::Albedo),
                normal: has(TextureSlot::Normal),
                roughness: has(TextureSlot::Roughness),
                metallic: has(TextureSlot::Metallic),
                ao: has(TextureSlot::AmbientOcclusion),
                height: has(TextureSlot::Height),
            },
            dimensions_consistent: self.dimensions_consistent(),
        }
    }

    /// Load a material from a folder by scanning for image files and
    /// detecting slots from file names. Files are visited in name order and
    /// the first match per slot wins.
    pub fn load_from_folder<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut set = TextureSet {
            name: path
                .file_name()
                .and_then(|n| n.to_str())
                .map(String::from),
            origin: Some(path.to_path_buf()),
            ..Default::default()
        };

        let mut candidates: Vec<(PathBuf, TextureSlot)> = Vec::new();
        for entry in std::fs::read_dir(path)? {
            let file = entry?.path();
            if !file.is_file() {
                continue;
            }
            let Some(ext) = file
                .extension()
                .and_then(|e| e.to_str())
                .map(|s| s.to_lowercase())
            else {
                continue;
            };
            if !IMAGE_EXTENSIONS.contains(&ext.as_str()) {
                continue;
            }
            if let Some(slot) = ImageLoader::detect_slot_from_path(&file) {
                candidates.push((file, slot));
            }
        }
        candidates.sort_by(|a, b| a.0.file_name().cmp(&b.0.file_name()));

        for (file, slot) in candidates {
            if set.has(slot) {
                tracing::debug!(
                    path = %file.display(),
                    slot = %slot,
                    "Slot already filled, skipping"
                );
                continue;
            }
            set.insert(slot, Texture::load(&file)?);
        }

        Ok(set)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapPresence {
    pub albedo: bool,
    pub normal: bool,
    pub roughness: bool,
    pub metallic: bool,
    pub ao: bool,
    pub height: bool,
}

/// Material state exposed to script rules
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterialSummary {
    pub path: Option<String>,
    pub name: Option<String>,
    pub texture_count: usize,
    pub dimensions: Option<Dimensions>,
    pub maps: MapPresence,
    pub dimensions_consistent: bool,
}
