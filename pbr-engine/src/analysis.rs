//! Advanced batch analysis.
//!
//! Combines duplicate/similar texture detection, cross-material consistency
//! analysis and tileability checks into one report. All analyses are fully
//! offline and the report is returned to the caller as structured data.

use crate::cross_material::{analyze_cross_material, CrossMaterialOptions, CrossMaterialResult};
use crate::fingerprint::{
    check_thresholds, detect_duplicates, DuplicateAnalysisResult, DEFAULT_DUPLICATE_THRESHOLD,
    DEFAULT_SIMILAR_THRESHOLD,
};
use crate::material::TextureSet;
use crate::tileability::{
    analyze_tileability, fix_with_report, TileabilityAnalysisEntry, TileabilityFixResult,
    TileabilityOptions, DEFAULT_BLEND_WIDTH,
};
use crate::{Error, Result};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisOptions {
    pub duplicate_threshold: f64,
    pub similar_threshold: f64,
    /// Report per-texture edge differences
    pub include_tileability: bool,
    /// Preview a seam fix for every texture that needs one
    pub fix_tileability: bool,
    pub tileability: TileabilityOptions,
    pub blend_width: u32,
    pub cross_material: CrossMaterialOptions,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            duplicate_threshold: DEFAULT_DUPLICATE_THRESHOLD,
            similar_threshold: DEFAULT_SIMILAR_THRESHOLD,
            include_tileability: true,
            fix_tileability: false,
            tileability: TileabilityOptions::default(),
            blend_width: DEFAULT_BLEND_WIDTH,
            cross_material: CrossMaterialOptions::default(),
        }
    }
}

impl AnalysisOptions {
    pub fn validate(&self) -> Result<()> {
        check_thresholds(self.duplicate_threshold, self.similar_threshold)?;
        self.tileability.validate()?;
        if self.blend_width == 0 {
            return Err(Error::InvalidParameter("blend width must be at least 1".into()));
        }
        if !(0.0..=100.0).contains(&self.cross_material.coverage_threshold) {
            return Err(Error::InvalidParameter(format!(
                "coverage threshold must be within 0..=100, got {}",
                self.cross_material.coverage_threshold
            )));
        }
        Ok(())
    }
}

/// Combined advanced analysis output for JSON export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdvancedAnalysisReport {
    pub duplicates: DuplicateAnalysisResult,
    pub cross_material: CrossMaterialResult,
    /// Textures that would benefit from tileability fix (edge difference above threshold).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tileability_analysis: Option<Vec<TileabilityAnalysisEntry>>,
    /// Fix previews, when requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tileability_fixes: Option<Vec<TileabilityFixResult>>,
}

impl AdvancedAnalysisReport {
    /// Serialize to formatted JSON string.
    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Serialize to compact JSON string.
    pub fn to_json_compact(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Run all advanced analyses and return a combined report.
pub fn run_advanced_analysis(
    materials: &[TextureSet],
    options: &AnalysisOptions,
) -> Result<AdvancedAnalysisReport> {
    options.validate()?;
    let duplicates = detect_duplicates(
        materials,
        options.duplicate_threshold,
        options.similar_threshold,
    )?;
    let cross_material = analyze_cross_material(materials, &options.cross_material)?;

    let entries = if options.include_tileability || options.fix_tileability {
        Some(analyze_tileability(materials, &options.tileability)?)
    } else {
        None
    };

    let tileability_fixes = match (&entries, options.fix_tileability) {
        (Some(entries), true) => Some(preview_fixes(
            materials,
            entries,
            options.blend_width,
            options.tileability.band,
        )),
        _ => None,
    };

    tracing::info!(
        materials = materials.len(),
        duplicates = duplicates.duplicate_pairs.len(),
        similar = duplicates.similar_pairs.len(),
        fixes = tileability_fixes.as_ref().map_or(0, |f| f.len()),
        "Advanced analysis finished"
    );

    Ok(AdvancedAnalysisReport {
        duplicates,
        cross_material,
        tileability_analysis: entries.filter(|_| options.include_tileability),
        tileability_fixes,
    })
}

/// Fix every texture flagged by the analysis, in entry order. Textures too
/// small for the blend width are skipped.
fn preview_fixes(
    materials: &[TextureSet],
    entries: &[TileabilityAnalysisEntry],
    blend_width: u32,
    band: u32,
) -> Vec<TileabilityFixResult> {
    // Entries follow material order, then slot order
    let flagged: Vec<(&TextureSet, &TileabilityAnalysisEntry)> = materials
        .iter()
        .flat_map(|set| set.iter().map(move |_| set))
        .zip(entries)
        .filter(|(_, e)| e.needs_fix)
        .collect();

    flagged
        .par_iter()
        .filter_map(|(set, entry)| {
            let texture = set.get(entry.slot)?;
            match fix_with_report(texture, blend_width, band) {
                Ok((_, mut report)) => {
                    report.path = entry.path.clone();
                    Some(report)
                }
                Err(e) => {
                    tracing::debug!(path = %entry.path, error = %e, "Skipping tileability fix");
                    None
                }
            }
        })
        .collect()
}
