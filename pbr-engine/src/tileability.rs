//! Seam detection and repair.
//!
//! A texture tiles cleanly when each border matches the opposite border.
//! [`edge_difference`] measures the mismatch; [`fix`] cross-blends a band
//! along every border so opposite edges agree.

use crate::image_loading::TextureSlot;
use crate::material::{Texture, TextureSet};
use crate::{Error, Result};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default edge-difference threshold above which a texture is considered non-tileable.
pub const TILEABILITY_THRESHOLD: f64 = 10.0;

/// Default number of border rows/columns compared.
pub const DEFAULT_EDGE_BAND: u32 = 1;

/// Default blend width used when fixing.
pub const DEFAULT_BLEND_WIDTH: u32 = 4;

/// Mean absolute per-channel (RGB) difference between opposite borders.
///
/// Compares column `k` with column `w-1-k` and row `k` with row `h-1-k` for
/// every `k < band`. The band is clamped so a pixel is never compared with
/// itself. 0 means the borders match exactly; 255 is the maximum.
pub fn edge_difference(texture: &Texture, band: u32) -> f64 {
    let w = texture.width() as usize;
    let h = texture.height() as usize;
    let band = band.max(1) as usize;
    let data = texture.data();
    let px = |x: usize, y: usize| (y * w + x) * 4;

    let mut sum = 0u64;
    let mut pairs = 0u64;
    let mut compare = |a: usize, b: usize| {
        for c in 0..3 {
            sum += (data[a + c] as i32 - data[b + c] as i32).unsigned_abs() as u64;
        }
        pairs += 1;
    };

    for k in 0..band.min(w / 2) {
        for y in 0..h {
            compare(px(k, y), px(w - 1 - k, y));
        }
    }
    for k in 0..band.min(h / 2) {
        for x in 0..w {
            compare(px(x, k), px(x, h - 1 - k));
        }
    }

    if pairs == 0 {
        0.0
    } else {
        sum as f64 / (pairs * 3) as f64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TileabilityOptions {
    /// Edge difference above which a texture needs fixing
    pub threshold: f64,
    /// Border rows/columns compared
    pub band: u32,
}

impl Default for TileabilityOptions {
    fn default() -> Self {
        Self {
            threshold: TILEABILITY_THRESHOLD,
            band: DEFAULT_EDGE_BAND,
        }
    }
}

impl TileabilityOptions {
    pub fn validate(&self) -> Result<()> {
        if !self.threshold.is_finite() || self.threshold < 0.0 {
            return Err(Error::InvalidParameter(format!(
                "tileability threshold must be a non-negative number, got {}",
                self.threshold
            )));
        }
        if self.band == 0 {
            return Err(Error::InvalidParameter(
                "tileability edge band must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TileabilityAnalysis {
    pub edge_difference: f64,
    pub needs_fix: bool,
}

pub fn analyze(texture: &Texture, options: &TileabilityOptions) -> TileabilityAnalysis {
    let edge_difference = edge_difference(texture, options.band);
    TileabilityAnalysis {
        edge_difference,
        needs_fix: edge_difference > options.threshold,
    }
}

/// Blend opposite borders so the texture wraps without a visible seam.
///
/// For `k < blend_width` the pixel at distance `k` from one edge is mixed
/// with its opposite using `alpha = 0.5 * (blend_width - k) / blend_width`:
/// the outermost pair becomes its average, deeper pairs are pulled less.
/// Columns are blended first, then rows. Pixels further than
/// `blend_width` from every edge are left untouched.
pub fn fix(texture: &Texture, blend_width: u32) -> Result<Texture> {
    let bw = blend_width as usize;
    let w = texture.width() as usize;
    let h = texture.height() as usize;
    if bw == 0 || 2 * bw >= w.min(h) {
        return Err(Error::InvalidParameter(format!(
            "blend width {} does not fit a {}x{} texture (need 1 <= width and 2*width < {})",
            blend_width,
            texture.width(),
            texture.height(),
            w.min(h)
        )));
    }

    let mut data = texture.data().to_vec();
    let px = |x: usize, y: usize| (y * w + x) * 4;

    // Left/right
    for k in 0..bw {
        let alpha = blend_alpha(k, bw);
        for y in 0..h {
            cross_blend(&mut data, px(k, y), px(w - 1 - k, y), alpha);
        }
    }
    // Top/bottom
    for k in 0..bw {
        let alpha = blend_alpha(k, bw);
        for x in 0..w {
            cross_blend(&mut data, px(x, k), px(x, h - 1 - k), alpha);
        }
    }

    Ok(texture.with_pixels(data))
}

fn blend_alpha(k: usize, bw: usize) -> f32 {
    0.5 * (bw - k) as f32 / bw as f32
}

fn cross_blend(data: &mut [u8], a: usize, b: usize, alpha: f32) {
    for c in 0..4 {
        let va = data[a + c] as f32;
        let vb = data[b + c] as f32;
        data[a + c] = ((1.0 - alpha) * va + alpha * vb).round().clamp(0.0, 255.0) as u8;
        data[b + c] = ((1.0 - alpha) * vb + alpha * va).round().clamp(0.0, 255.0) as u8;
    }
}

/// Before/after metrics of a tileability fix
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TileabilityFixResult {
    pub path: String,
    pub original_edge_difference: f64,
    pub fixed_edge_difference: f64,
    pub improved: bool,
}

/// Run [`fix`] and measure the edge difference over `band` before and after.
pub fn fix_with_report(
    texture: &Texture,
    blend_width: u32,
    band: u32,
) -> Result<(Texture, TileabilityFixResult)> {
    let path = texture
        .path()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "unknown".into());
    let original = edge_difference(texture, band);
    let fixed = fix(texture, blend_width)?;
    let after = edge_difference(&fixed, band);

    let report = TileabilityFixResult {
        path,
        original_edge_difference: original,
        fixed_edge_difference: after,
        improved: after < original,
    };
    Ok((fixed, report))
}

/// Fix a texture and write the result (PNG, JPEG or TGA by extension).
pub fn fix_to_file<P: AsRef<Path>>(
    texture: &Texture,
    blend_width: u32,
    band: u32,
    output: P,
) -> Result<TileabilityFixResult> {
    let output = output.as_ref();
    let (fixed, mut report) = fix_with_report(texture, blend_width, band)?;
    fixed.save(output)?;
    tracing::debug!(
        path = %output.display(),
        before = report.original_edge_difference,
        after = report.fixed_edge_difference,
        "Tileability fix written"
    );
    report.path = output.display().to_string();
    Ok(report)
}

/// Per-texture tileability analysis (which textures would benefit from edge blending).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TileabilityAnalysisEntry {
    pub path: String,
    pub slot: TextureSlot,
    pub material_name: String,
    pub edge_difference: f64,
    pub needs_fix: bool,
}

/// Analyze every present texture. Output is in material order, then slot order.
pub fn analyze_tileability(
    materials: &[TextureSet],
    options: &TileabilityOptions,
) -> Result<Vec<TileabilityAnalysisEntry>> {
    options.validate()?;
    let per_material: Vec<Vec<TileabilityAnalysisEntry>> = materials
        .par_iter()
        .map(|set| {
            let material_name = set.display_name();
            set.iter()
                .map(|(slot, texture)| {
                    let analysis = analyze(texture, options);
                    TileabilityAnalysisEntry {
                        path: set.texture_label(slot),
                        slot,
                        material_name: material_name.clone(),
                        edge_difference: analysis.edge_difference,
                        needs_fix: analysis.needs_fix,
                    }
                })
                .collect()
        })
        .collect();
    Ok(per_material.into_iter().flatten().collect())
}
