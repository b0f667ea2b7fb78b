//! Validation engine: rule registry, scoring and pass/fail.
//!
//! Rules run in registry order (built-ins first, then plugin rules in
//! discovery order). Each issue deducts its severity penalty from 100;
//! the score never drops below 0.

use crate::cancel::CancellationToken;
use crate::material::{Texture, TextureSet};
use crate::plugin::LoadedPlugins;
use crate::rules::{builtin_definitions, BuiltinLimits, ConditionRule, RuleDefinition};
use crate::script::DEFAULT_SCRIPT_TIMEOUT;
use crate::tileability::{edge_difference, TileabilityOptions};
use crate::{Error, Result};
use rayon::prelude::*;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Minimum score a material needs to pass when the caller has no preference.
pub const DEFAULT_MIN_SCORE: i32 = 60;

/// Severity of a validation finding.
/// Maps to scoring: Critical -20, Major -10, Minor -5.
/// Ordering sorts the most severe first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    Major,
    Minor,
}

impl Severity {
    pub fn score_penalty(&self) -> i32 {
        match self {
            Severity::Critical => 20,
            Severity::Major => 10,
            Severity::Minor => 5,
        }
    }

    /// Parse a severity name. `error`, `warning` and `info` are accepted
    /// as aliases.
    pub fn parse(s: &str) -> Option<Severity> {
        match s.trim().to_lowercase().as_str() {
            "critical" | "error" => Some(Severity::Critical),
            "major" | "warning" => Some(Severity::Major),
            "minor" | "info" => Some(Severity::Minor),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::Major => "major",
            Severity::Minor => "minor",
        }
    }
}

impl<'de> Deserialize<'de> for Severity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Severity::parse(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown severity '{}'", s)))
    }
}

/// Compute material score from issues. Start at 100, subtract penalties,
/// floor at 0.
pub fn compute_score(issues: &[Issue]) -> i32 {
    let total: i32 = issues.iter().map(|i| i.severity.score_penalty()).sum();
    (100 - total).max(0)
}

/// A validation issue found by a rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub rule_id: String,
    pub severity: Severity,
    pub message: String,
}

impl Issue {
    pub fn new(rule_id: impl Into<String>, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            rule_id: rule_id.into(),
            severity,
            message: message.into(),
        }
    }
}

/// Pluggable validation rule
pub trait ValidationRule: Send + Sync {
    /// Unique identifier for this rule
    fn id(&self) -> &str;

    /// Human-readable description
    fn description(&self) -> &str;

    /// Check the material set. Returns `Some(Issue)` if a problem is found, `None` if valid.
    fn check(&self, set: &TextureSet) -> Option<Issue>;

    /// Check and return all issues (default: 0 or 1 from `check`).
    /// Override for rules that can emit multiple issues (e.g. script plugins).
    fn check_all(&self, set: &TextureSet, cancel: &CancellationToken) -> Vec<Issue> {
        let _ = cancel;
        self.check(set).into_iter().collect()
    }
}

/// Ordered, deduplicated rule registry.
///
/// Adding a rule whose id is already registered replaces the earlier rule in
/// place, so later sources win while the evaluation order stays stable.
#[derive(Default)]
pub struct RuleSet {
    rules: Vec<Box<dyn ValidationRule>>,
    index: HashMap<String, usize>,
}

impl RuleSet {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Built-in structural rules with default limits.
    pub fn builtin() -> Self {
        Self::builtin_with_limits(&BuiltinLimits::default())
    }

    pub fn builtin_with_limits(limits: &BuiltinLimits) -> Self {
        let mut set = Self::new();
        set.add_definitions(builtin_definitions(limits), DEFAULT_SCRIPT_TIMEOUT);
        set
    }

    /// Append the pixel-content rules (brightness, uniformity, normal
    /// strength, seams) after the rules already registered.
    pub fn with_content_rules(self, tileability: &TileabilityOptions) -> Self {
        self.with_rule(ResolutionMismatchRule)
            .with_rule(AlbedoBrightnessRule)
            .with_rule(RoughnessUniformityRule)
            .with_rule(MetallicMidGrayRule)
            .with_rule(NormalMapStrengthRule)
            .with_rule(TileabilityRule {
                options: *tileability,
            })
    }

    /// Merge plugin rules in discovery order.
    pub fn with_plugins(mut self, plugins: &LoadedPlugins) -> Self {
        self.add_definitions(plugins.rules.iter().cloned(), plugins.script_timeout);
        self
    }

    pub fn with_rule<R: ValidationRule + 'static>(mut self, rule: R) -> Self {
        self.add_rule(rule);
        self
    }

    /// Register a rule. Returns `true` when it replaced a rule with the same id.
    pub fn add_rule<R: ValidationRule + 'static>(&mut self, rule: R) -> bool {
        self.add_boxed(Box::new(rule))
    }

    pub fn add_definitions<I>(&mut self, definitions: I, script_timeout: Duration)
    where
        I: IntoIterator<Item = RuleDefinition>,
    {
        for def in definitions {
            self.add_rule(ConditionRule::new(def, script_timeout));
        }
    }

    fn add_boxed(&mut self, rule: Box<dyn ValidationRule>) -> bool {
        match self.index.get(rule.id()) {
            Some(&i) => {
                tracing::debug!(rule_id = rule.id(), "Rule overridden");
                self.rules[i] = rule;
                true
            }
            None => {
                self.index.insert(rule.id().to_string(), self.rules.len());
                self.rules.push(rule);
                false
            }
        }
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&dyn ValidationRule> {
        self.index.get(id).map(|&i| self.rules[i].as_ref())
    }

    /// Rule ids in evaluation order.
    pub fn ids(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.id()).collect()
    }

    /// Run every rule, issues in evaluation order.
    pub fn check(&self, set: &TextureSet, cancel: &CancellationToken) -> Vec<Issue> {
        self.rules
            .iter()
            .flat_map(|r| r.check_all(set, cancel))
            .collect()
    }
}

impl std::fmt::Debug for RuleSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleSet").field("rules", &self.ids()).finish()
    }
}

/// Outcome of validating one material
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub issues: Vec<Issue>,
    pub score: i32,
    pub passed: bool,
}

impl ValidationResult {
    pub fn from_issues(issues: Vec<Issue>, min_score: i32) -> Self {
        let score = compute_score(&issues);
        let passed = score >= min_score && !issues.iter().any(|i| i.severity == Severity::Critical);
        Self {
            issues,
            score,
            passed,
        }
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.issues.iter().filter(|i| i.severity == severity).count()
    }
}

fn check_min_score(min_score: i32) -> Result<()> {
    if !(0..=100).contains(&min_score) {
        return Err(Error::InvalidParameter(format!(
            "min_score must be within 0..=100, got {}",
            min_score
        )));
    }
    Ok(())
}

/// Validate one material against a rule set.
///
/// Passes when `score >= min_score` and no issue is critical.
pub fn validate(set: &TextureSet, rules: &RuleSet, min_score: i32) -> Result<ValidationResult> {
    validate_with_cancel(set, rules, min_score, &CancellationToken::new())
}

/// [`validate`] that aborts running scripts when `cancel` fires.
pub fn validate_with_cancel(
    set: &TextureSet,
    rules: &RuleSet,
    min_score: i32,
    cancel: &CancellationToken,
) -> Result<ValidationResult> {
    check_min_score(min_score)?;
    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }
    let issues = rules.check(set, cancel);
    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }
    tracing::debug!(
        material = %set.display_name(),
        rules = rules.len(),
        issues = issues.len(),
        "Material validated"
    );
    Ok(ValidationResult::from_issues(issues, min_score))
}

/// Result for one item of a batch
#[derive(Debug)]
pub struct BatchEntry {
    /// Position in the input
    pub index: usize,
    pub name: String,
    pub result: Result<ValidationResult>,
}

/// Validate many materials in parallel on the current rayon pool.
/// Results come back in input order.
pub fn validate_batch(
    materials: &[TextureSet],
    rules: &RuleSet,
    min_score: i32,
    cancel: &CancellationToken,
) -> Result<Vec<BatchEntry>> {
    check_min_score(min_score)?;
    let mut entries: Vec<BatchEntry> = materials
        .par_iter()
        .enumerate()
        .map(|(index, set)| BatchEntry {
            index,
            name: set.display_name(),
            result: validate_with_cancel(set, rules, min_score, cancel),
        })
        .collect();
    entries.sort_by_key(|e| e.index);
    Ok(entries)
}

/// Load each folder as a material and validate it. A folder that fails to
/// load produces an error entry; the others are unaffected.
pub fn validate_folders(
    folders: &[PathBuf],
    rules: &RuleSet,
    min_score: i32,
    cancel: &CancellationToken,
) -> Result<Vec<BatchEntry>> {
    check_min_score(min_score)?;
    let mut entries: Vec<BatchEntry> = folders
        .par_iter()
        .enumerate()
        .map(|(index, folder)| {
            let result = if cancel.is_cancelled() {
                Err(Error::Cancelled)
            } else {
                TextureSet::load_from_folder(folder)
                    .and_then(|set| validate_with_cancel(&set, rules, min_score, cancel))
            };
            if let Err(e) = &result {
                tracing::warn!(path = %folder.display(), error = %e, "Material validation failed");
            }
            BatchEntry {
                index,
                name: folder_name(folder),
                result,
            }
        })
        .collect();
    entries.sort_by_key(|e| e.index);
    Ok(entries)
}

fn folder_name(folder: &Path) -> String {
    folder
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| folder.display().to_string())
}

/// Rule: all maps share one resolution
pub struct ResolutionMismatchRule;

impl ValidationRule for ResolutionMismatchRule {
    fn id(&self) -> &str {
        "resolution_mismatch"
    }

    fn description(&self) -> &str {
        "Texture resolution mismatch across maps"
    }

    fn check(&self, set: &TextureSet) -> Option<Issue> {
        if set.dimensions_consistent() {
            return None;
        }
        let list = set
            .iter()
            .map(|(slot, t)| format!("{} ({}x{})", slot, t.width(), t.height()))
            .collect::<Vec<_>>()
            .join(", ");
        Some(Issue::new(
            self.id(),
            Severity::Major,
            format!("Texture resolution mismatch: {}. All maps should share dimensions.", list),
        ))
    }
}

/// Rule: albedo brightness and clipped colors
pub struct AlbedoBrightnessRule;

impl ValidationRule for AlbedoBrightnessRule {
    fn id(&self) -> &str {
        "albedo_brightness_range"
    }

    fn description(&self) -> &str {
        "Albedo brightness should be in valid PBR range (not fully black or excessively bright)"
    }

    fn check(&self, set: &TextureSet) -> Option<Issue> {
        let albedo = set.get(crate::TextureSlot::Albedo)?;
        let (mean_lum, max_lum) = luminance_stats(albedo);

        if mean_lum < 5.0 {
            return Some(Issue::new(
                self.id(),
                Severity::Major,
                format!("Albedo appears nearly black (mean luminance {:.1}/255).", mean_lum),
            ));
        }
        if max_lum > 250.0 {
            return Some(Issue::new(
                self.id(),
                Severity::Minor,
                format!(
                    "Albedo has very bright pixels (max {:.1}/255). May indicate non-PBR or HDR.",
                    max_lum
                ),
            ));
        }

        let total = albedo.data().len() / 4;
        let clipped = albedo
            .data()
            .chunks_exact(4)
            .filter(|p| p[..3].iter().any(|&c| c == 0 || c == 255))
            .count();
        let pct = 100.0 * clipped as f64 / total.max(1) as f64;
        if pct > 5.0 {
            return Some(Issue::new(
                self.id(),
                Severity::Minor,
                format!("Albedo has {:.1}% clipped pixels (255 or 0).", pct),
            ));
        }
        None
    }
}

/// Rule: roughness should vary and not be black
pub struct RoughnessUniformityRule;

impl ValidationRule for RoughnessUniformityRule {
    fn id(&self) -> &str {
        "roughness_uniformity"
    }

    fn description(&self) -> &str {
        "Roughness map should have variation; uniformly constant or black may indicate placeholder"
    }

    fn check(&self, set: &TextureSet) -> Option<Issue> {
        let roughness = set.get(crate::TextureSlot::Roughness)?;
        let (mean, stddev) = channel_stats(roughness, 0);
        if mean < 5.0 {
            return Some(Issue::new(
                self.id(),
                Severity::Major,
                "Roughness map is nearly black. May indicate missing or incorrect texture.",
            ));
        }
        if stddev < 2.0 {
            return Some(Issue::new(
                self.id(),
                Severity::Minor,
                format!(
                    "Roughness map is nearly uniform (stddev {:.2}, mean {:.1}).",
                    stddev, mean
                ),
            ));
        }
        None
    }
}

/// Rule: a flat mid-gray metallic map is usually a placeholder
pub struct MetallicMidGrayRule;

impl ValidationRule for MetallicMidGrayRule {
    fn id(&self) -> &str {
        "metallic_mid_gray"
    }

    fn description(&self) -> &str {
        "Metallic map uniformly mid-gray may indicate non-metallic or placeholder"
    }

    fn check(&self, set: &TextureSet) -> Option<Issue> {
        let metallic = set.get(crate::TextureSlot::Metallic)?;
        let (mean, stddev) = channel_stats(metallic, 0);
        if (mean - 128.0).abs() < 5.0 && stddev < 2.0 {
            return Some(Issue::new(
                self.id(),
                Severity::Minor,
                "Metallic map is uniformly mid-gray. May indicate uniform or placeholder.",
            ));
        }
        None
    }
}

/// Rule: tangent-space normals have a dominant blue channel
pub struct NormalMapStrengthRule;

impl ValidationRule for NormalMapStrengthRule {
    fn id(&self) -> &str {
        "normal_map_strength"
    }

    fn description(&self) -> &str {
        "Normal map blue channel should be dominant (tangent-space normals point up)"
    }

    fn check(&self, set: &TextureSet) -> Option<Issue> {
        let normal = set.get(crate::TextureSlot::Normal)?;
        let (mean_b, _) = channel_stats(normal, 2);
        if mean_b < 100.0 {
            return Some(Issue::new(
                self.id(),
                Severity::Minor,
                format!(
                    "Normal map blue channel low (mean {:.1}). \
                     Tangent-space normals typically have dominant blue.",
                    mean_b
                ),
            ));
        }
        None
    }
}

/// Rule: visible seams on the albedo when wrapped
#[derive(Default)]
pub struct TileabilityRule {
    pub options: TileabilityOptions,
}

impl ValidationRule for TileabilityRule {
    fn id(&self) -> &str {
        "tileability"
    }

    fn description(&self) -> &str {
        "Detect obvious seams at texture edges"
    }

    fn check(&self, set: &TextureSet) -> Option<Issue> {
        let albedo = set.get(crate::TextureSlot::Albedo)?;
        if albedo.width() < 4 || albedo.height() < 4 {
            return None;
        }
        let diff = edge_difference(albedo, self.options.band);
        if diff > self.options.threshold {
            return Some(Issue::new(
                self.id(),
                Severity::Minor,
                format!(
                    "High edge difference ({:.1}). Texture may not tile seamlessly.",
                    diff
                ),
            ));
        }
        None
    }
}

/// Mean and max Rec. 601 luminance
fn luminance_stats(map: &Texture) -> (f64, f64) {
    let mut sum = 0.0f64;
    let mut max_val = 0.0f64;
    let mut count = 0usize;
    for p in map.data().chunks_exact(4) {
        let lum = crate::material::luma(p[0], p[1], p[2]);
        sum += lum;
        max_val = max_val.max(lum);
        count += 1;
    }
    let mean = if count > 0 { sum / count as f64 } else { 0.0 };
    (mean, max_val)
}

/// Mean and sample standard deviation of one channel
fn channel_stats(map: &Texture, channel: usize) -> (f64, f64) {
    let values: Vec<f64> = map
        .data()
        .chunks_exact(4)
        .map(|p| p[channel] as f64)
        .collect();
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    if values.len() < 2 {
        return (mean, 0.0);
    }
    let sum_sq: f64 = values.iter().map(|v| (v - mean) * (v - mean)).sum();
    (mean, (sum_sq / (values.len() - 1) as f64).sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image_loading::TextureSlot;
    use crate::rules::RuleCondition;

    fn tex(w: u32, h: u32) -> Texture {
        Texture::solid(w, h, [128, 128, 128, 255]).unwrap()
    }

    fn complete_material(size: u32) -> TextureSet {
        TextureSlot::CORE
            .into_iter()
            .fold(TextureSet::named("complete"), |set, slot| {
                set.with(slot, tex(size, size))
            })
    }

    #[test]
    fn builtin_order_is_fixed() {
        assert_eq!(
            RuleSet::builtin().ids(),
            vec![
                "required_maps",
                "max_resolution",
                "min_resolution",
                "power_of_two",
                "max_texture_count"
            ]
        );
    }

    #[test]
    fn complete_material_scores_100() {
        let result =
            validate(&complete_material(1024), &RuleSet::builtin(), DEFAULT_MIN_SCORE).unwrap();
        assert_eq!(result.score, 100);
        assert!(result.passed);
        assert!(result.issues.is_empty());
    }

    #[test]
    fn critical_issue_fails_even_with_high_score() {
        let rules = RuleSet::new().with_rule(ConditionRule::new(
            RuleDefinition::new(
                "needs_height",
                "",
                Severity::Critical,
                RuleCondition::RequiredMaps {
                    maps: vec![TextureSlot::Height],
                },
            ),
            DEFAULT_SCRIPT_TIMEOUT,
        ));
        let result = validate(&complete_material(64), &rules, 60).unwrap();
        assert_eq!(result.score, 80);
        assert!(!result.passed);
    }

    #[test]
    fn score_below_threshold_fails() {
        let issues: Vec<Issue> = (0..5)
            .map(|i| Issue::new(format!("r{}", i), Severity::Major, "m"))
            .collect();
        let result = ValidationResult::from_issues(issues, 60);
        assert_eq!(result.score, 50);
        assert!(!result.passed);
        assert_eq!(result.count(Severity::Major), 5);
    }

    #[test]
    fn score_floors_at_zero() {
        let issues: Vec<Issue> = (0..7)
            .map(|i| Issue::new(format!("r{}", i), Severity::Critical, "c"))
            .collect();
        assert_eq!(compute_score(&issues), 0);
    }

    #[test]
    fn invalid_min_score_is_rejected() {
        let err = validate(&TextureSet::new(), &RuleSet::builtin(), 101).unwrap_err();
        assert!(matches!(err, Error::InvalidParameter(_)));
        assert!(validate(&TextureSet::new(), &RuleSet::builtin(), -1).is_err());
    }

    #[test]
    fn later_rule_with_same_id_replaces_in_place() {
        let mut rules = RuleSet::builtin();
        let replaced = rules.add_rule(ConditionRule::new(
            RuleDefinition::new(
                "max_resolution",
                "project limit",
                Severity::Critical,
                RuleCondition::MaxResolution {
                    max_width: 512,
                    max_height: 512,
                },
            ),
            DEFAULT_SCRIPT_TIMEOUT,
        ));
        assert!(replaced);
        assert_eq!(rules.len(), 5);
        assert_eq!(rules.ids()[1], "max_resolution");
        assert_eq!(rules.get("max_resolution").unwrap().description(), "project limit");

        let result = validate(&complete_material(1024), &rules, 60).unwrap();
        assert_eq!(result.issues.len(), 1);
        assert_eq!(result.issues[0].severity, Severity::Critical);
    }

    #[test]
    fn validation_is_deterministic() {
        let set = TextureSet::new().with(TextureSlot::Albedo, tex(100, 100));
        let rules = RuleSet::builtin().with_content_rules(&TileabilityOptions::default());
        let a = serde_json::to_string(&validate(&set, &rules, 60).unwrap()).unwrap();
        let b = serde_json::to_string(&validate(&set, &rules, 60).unwrap()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn cancelled_token_short_circuits() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err =
            validate_with_cancel(&TextureSet::new(), &RuleSet::builtin(), 60, &cancel).unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }

    #[test]
    fn batch_preserves_input_order() {
        let materials: Vec<TextureSet> = (0..16)
            .map(|i| {
                let mut set = complete_material(64);
                set.name = Some(format!("m{:02}", i));
                if i % 3 == 0 {
                    set.insert(TextureSlot::Albedo, tex(100, 64));
                }
                set
            })
            .collect();
        let entries =
            validate_batch(&materials, &RuleSet::builtin(), 60, &CancellationToken::new()).unwrap();
        assert_eq!(entries.len(), 16);
        for (i, entry) in entries.iter().enumerate() {
            assert_eq!(entry.index, i);
            assert_eq!(entry.name, format!("m{:02}", i));
            let score = entry.result.as_ref().unwrap().score;
            assert_eq!(score, if i % 3 == 0 { 95 } else { 100 });
        }
    }

    #[test]
    fn folder_load_failure_is_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good");
        std::fs::create_dir(&good).unwrap();
        image::RgbaImage::from_raw(4, 4, vec![90u8; 64])
            .unwrap()
            .save(good.join("albedo.png"))
            .unwrap();
        let missing = dir.path().join("missing");

        let entries = validate_folders(
            &[missing, good],
            &RuleSet::builtin(),
            60,
            &CancellationToken::new(),
        )
        .unwrap();
        assert!(entries[0].result.is_err());
        let good_result = entries[1].result.as_ref().unwrap();
        assert_eq!(entries[1].name, "good");
        assert_eq!(good_result.issues.len(), 1);
        assert_eq!(good_result.issues[0].rule_id, "required_maps");
    }

    #[test]
    fn content_rules_flag_placeholder_maps() {
        let set = TextureSet::new()
            .with(TextureSlot::Albedo, Texture::solid(4, 4, [0, 0, 0, 255]).unwrap())
            .with(TextureSlot::Roughness, tex(4, 4))
            .with(TextureSlot::Metallic, tex(4, 4))
            .with(TextureSlot::Normal, Texture::solid(4, 4, [128, 128, 40, 255]).unwrap());
        let rules = RuleSet::new().with_content_rules(&TileabilityOptions::default());
        let ids: Vec<String> = rules
            .check(&set, &CancellationToken::new())
            .into_iter()
            .map(|i| i.rule_id)
            .collect();
        assert_eq!(
            ids,
            vec![
                "albedo_brightness_range",
                "roughness_uniformity",
                "metallic_mid_gray",
                "normal_map_strength"
            ]
        );
    }

    #[test]
    fn tileability_rule_flags_hard_seams() {
        let mut data = Vec::new();
        for _y in 0..8 {
            for x in 0..8u8 {
                let v = x * 30;
                data.extend_from_slice(&[v, v, v, 255]);
            }
        }
        let set =
            TextureSet::new().with(TextureSlot::Albedo, Texture::new(8, 8, data, None).unwrap());
        let issue = TileabilityRule::default().check(&set).unwrap();
        assert_eq!(issue.rule_id, "tileability");
        assert_eq!(issue.severity, Severity::Minor);
    }

    #[test]
    fn tileability_rule_uses_configured_band() {
        // Outer columns match; the second column from the left does not.
        let mut data = Vec::new();
        for _y in 0..8 {
            for x in 0..8 {
                let v = if x == 1 { 255 } else { 0 };
                data.extend_from_slice(&[v, v, v, 255]);
            }
        }
        let set =
            TextureSet::new().with(TextureSlot::Albedo, Texture::new(8, 8, data, None).unwrap());
        assert!(TileabilityRule::default().check(&set).is_none());

        let wide = TileabilityRule {
            options: TileabilityOptions {
                band: 2,
                ..Default::default()
            },
        };
        assert!(wide.check(&set).is_some());
    }

    #[test]
    fn severity_aliases_parse() {
        assert_eq!(Severity::parse("ERROR"), Some(Severity::Critical));
        assert_eq!(Severity::parse("warning"), Some(Severity::Major));
        assert_eq!(Severity::parse("info"), Some(Severity::Minor));
        assert_eq!(Severity::parse("fatal"), None);
        assert!(Severity::Critical < Severity::Minor);
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        fn severity() -> impl Strategy<Value = Severity> {
            prop_oneof![
                Just(Severity::Critical),
                Just(Severity::Major),
                Just(Severity::Minor)
            ]
        }

        proptest! {
            #[test]
            fn score_is_bounded_and_non_increasing(
                severities in proptest::collection::vec(severity(), 0..40),
                extra in severity()
            ) {
                let issues: Vec<Issue> = severities
                    .iter()
                    .map(|s| Issue::new("r", *s, "m"))
                    .collect();
                let score = compute_score(&issues);
                prop_assert!((0..=100).contains(&score));

                let mut more = issues.clone();
                more.push(Issue::new("extra", extra, "m"));
                prop_assert!(compute_score(&more) <= score);
            }
        }
    }
}
