//! Consistency analysis across many materials: shared resolutions and map
//! coverage.

use crate::image_loading::TextureSlot;
use crate::material::TextureSet;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Coverage below this percentage triggers a recommendation.
pub const DEFAULT_COVERAGE_THRESHOLD: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrossMaterialOptions {
    pub coverage_threshold: f64,
}

impl Default for CrossMaterialOptions {
    fn default() -> Self {
        Self {
            coverage_threshold: DEFAULT_COVERAGE_THRESHOLD,
        }
    }
}

/// Materials sharing one exact resolution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionDistribution {
    pub width: u32,
    pub height: u32,
    pub count: usize,
    /// Member names in input order
    pub materials: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapCoverage {
    pub slot: TextureSlot,
    pub present_count: usize,
    pub total_count: usize,
    pub coverage_percent: f64,
    pub missing_in: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecommendationKind {
    /// Materials at this resolution differ from the majority
    MinorityResolution { width: u32, height: u32 },
    /// Slot present in some but not enough materials
    LowCoverage { slot: TextureSlot },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recommendation {
    #[serde(flatten)]
    pub kind: RecommendationKind,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossMaterialResult {
    pub material_count: usize,
    /// Sorted by count (descending), then width and height
    pub resolution_distributions: Vec<ResolutionDistribution>,
    pub resolution_inconsistent: bool,
    /// One entry per slot, in slot order
    pub map_coverage: Vec<MapCoverage>,
    pub recommendations: Vec<Recommendation>,
}

/// Analyze consistency across multiple materials.
///
/// A material's resolution is that of its first map in slot order; empty
/// materials belong to no resolution group.
pub fn analyze_cross_material(
    materials: &[TextureSet],
    options: &CrossMaterialOptions,
) -> Result<CrossMaterialResult> {
    if !(0.0..=100.0).contains(&options.coverage_threshold) {
        return Err(Error::InvalidParameter(format!(
            "coverage threshold must be within 0..=100, got {}",
            options.coverage_threshold
        )));
    }

    let names: Vec<String> = materials.iter().map(|m| m.display_name()).collect();
    let total = materials.len();

    let mut groups: BTreeMap<(u32, u32), Vec<String>> = BTreeMap::new();
    for (set, name) in materials.iter().zip(&names) {
        if let Some(dims) = set.dimensions() {
            groups.entry(dims).or_default().push(name.clone());
        }
    }
    let mut resolution_distributions: Vec<ResolutionDistribution> = groups
        .into_iter()
        .map(|((width, height), members)| ResolutionDistribution {
            width,
            height,
            count: members.len(),
            materials: members,
        })
        .collect();
    // BTreeMap already orders by (width, height); the sort is stable
    resolution_distributions.sort_by(|a, b| b.count.cmp(&a.count));
    let resolution_inconsistent = resolution_distributions.len() > 1;

    let map_coverage: Vec<MapCoverage> = TextureSlot::ALL
        .iter()
        .map(|&slot| {
            let missing_in: Vec<String> = materials
                .iter()
                .zip(&names)
                .filter(|(set, _)| !set.has(slot))
                .map(|(_, name)| name.clone())
                .collect();
            let present_count = total - missing_in.len();
            MapCoverage {
                slot,
                present_count,
                total_count: total,
                coverage_percent: if total > 0 {
                    100.0 * present_count as f64 / total as f64
                } else {
                    0.0
                },
                missing_in,
            }
        })
        .collect();

    let mut recommendations = Vec::new();
    if resolution_inconsistent {
        let majority = &resolution_distributions[0];
        for group in &resolution_distributions[1..] {
            recommendations.push(Recommendation {
                kind: RecommendationKind::MinorityResolution {
                    width: group.width,
                    height: group.height,
                },
                message: format!(
                    "{} material(s) use {}x{} while most use {}x{}. Consider standardizing: {}.",
                    group.count,
                    group.width,
                    group.height,
                    majority.width,
                    majority.height,
                    group.materials.join(", ")
                ),
            });
        }
    }
    for cov in &map_coverage {
        if cov.coverage_percent > 0.0 && cov.coverage_percent < options.coverage_threshold {
            recommendations.push(Recommendation {
                kind: RecommendationKind::LowCoverage { slot: cov.slot },
                message: format!(
                    "Map '{}' missing in {} of {} material(s). Consider adding for consistency.",
                    cov.slot,
                    cov.missing_in.len(),
                    total
                ),
            });
        }
    }

    tracing::debug!(
        materials = total,
        resolutions = resolution_distributions.len(),
        recommendations = recommendations.len(),
        "Cross-material analysis finished"
    );

    Ok(CrossMaterialResult {
        material_count: total,
        resolution_distributions,
        resolution_inconsistent,
        map_coverage,
        recommendations,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::material::Texture;

    fn mat(name: &str, size: u32, slots: &[TextureSlot]) -> TextureSet {
        slots.iter().fold(TextureSet::named(name), |set, &slot| {
            set.with(slot, Texture::solid(size, size, [100, 100, 100, 255]).unwrap())
        })
    }

    fn coverage(result: &CrossMaterialResult, slot: TextureSlot) -> &MapCoverage {
        result.map_coverage.iter().find(|c| c.slot == slot).unwrap()
    }

    #[test]
    fn coverage_is_share_of_materials() {
        use TextureSlot::*;
        let materials = vec![
            mat("m1", 64, &[Albedo, Normal, Height]),
            mat("m2", 64, &[Albedo, Normal]),
            mat("m3", 64, &[Albedo, Height]),
            mat("m4", 64, &[Albedo]),
        ];
        let result = analyze_cross_material(&materials, &CrossMaterialOptions::default()).unwrap();
        assert_eq!(result.material_count, 4);

        let albedo = coverage(&result, Albedo);
        assert_eq!(albedo.coverage_percent, 100.0);
        assert!(albedo.missing_in.is_empty());

        let normal = coverage(&result, Normal);
        assert_eq!(normal.present_count, 2);
        assert_eq!(normal.coverage_percent, 50.0);
        assert_eq!(normal.missing_in, vec!["m3", "m4"]);

        let height = coverage(&result, Height);
        assert_eq!(height.missing_in, vec!["m2", "m4"]);

        let ao = coverage(&result, AmbientOcclusion);
        assert_eq!(ao.coverage_percent, 0.0);
        assert_eq!(ao.missing_in.len(), 4);

        let low: Vec<&RecommendationKind> =
            result.recommendations.iter().map(|r| &r.kind).collect();
        assert_eq!(
            low,
            vec![
                &RecommendationKind::LowCoverage { slot: Normal },
                &RecommendationKind::LowCoverage { slot: Height },
            ]
        );
        assert!(!result.resolution_inconsistent);
    }

    #[test]
    fn resolution_groups_sorted_by_count_then_size() {
        use TextureSlot::*;
        let materials = vec![
            mat("small", 256, &[Albedo]),
            mat("big_a", 1024, &[Albedo]),
            mat("mid", 512, &[Albedo]),
            mat("big_b", 1024, &[Albedo]),
        ];
        let result = analyze_cross_material(&materials, &CrossMaterialOptions::default()).unwrap();
        let groups: Vec<(u32, usize)> = result
            .resolution_distributions
            .iter()
            .map(|g| (g.width, g.count))
            .collect();
        assert_eq!(groups, vec![(1024, 2), (256, 1), (512, 1)]);
        assert_eq!(result.resolution_distributions[0].materials, vec!["big_a", "big_b"]);
        assert!(result.resolution_inconsistent);

        let kinds: Vec<&RecommendationKind> =
            result.recommendations.iter().map(|r| &r.kind).collect();
        assert_eq!(
            kinds,
            vec![
                &RecommendationKind::MinorityResolution {
                    width: 256,
                    height: 256
                },
                &RecommendationKind::MinorityResolution {
                    width: 512,
                    height: 512
                },
            ]
        );
    }

    #[test]
    fn coverage_threshold_is_configurable() {
        use TextureSlot::*;
        let materials: Vec<TextureSet> = (0..10)
            .map(|i| {
                if i == 0 {
                    mat("m0", 64, &[Albedo])
                } else {
                    mat(&format!("m{}", i), 64, &[Albedo, Normal])
                }
            })
            .collect();
        let strict = analyze_cross_material(&materials, &CrossMaterialOptions::default()).unwrap();
        assert_eq!(strict.recommendations.len(), 1);
        let relaxed = analyze_cross_material(
            &materials,
            &CrossMaterialOptions {
                coverage_threshold: 80.0,
            },
        )
        .unwrap();
        assert!(relaxed.recommendations.is_empty());
        assert!(analyze_cross_material(
            &materials,
            &CrossMaterialOptions {
                coverage_threshold: 150.0
            }
        )
        .is_err());
    }

    #[test]
    fn empty_batch() {
        let result = analyze_cross_material(&[], &CrossMaterialOptions::default()).unwrap();
        assert_eq!(result.material_count, 0);
        assert!(result.resolution_distributions.is_empty());
        assert!(result.map_coverage.iter().all(|c| c.coverage_percent == 0.0));
        assert!(result.recommendations.is_empty());
    }

    #[test]
    fn recommendation_json_carries_kind_tag() {
        let rec = Recommendation {
            kind: RecommendationKind::LowCoverage {
                slot: TextureSlot::AmbientOcclusion,
            },
            message: "m".into(),
        };
        let json = serde_json::to_value(&rec).unwrap();
        assert_eq!(json["kind"], "low_coverage");
        assert_eq!(json["slot"], "ao");
    }
}
