//! Engine configuration.
//!
//! Every field has a default, so an empty TOML file is a valid
//! configuration:
//!
//! ```toml
//! workers = 4
//!
//! [plugins]
//! dir = "studio/plugins"
//! strict = true
//!
//! [validation]
//! min_score = 70
//! content_rules = true
//!
//! [validation.limits]
//! max_width = 2048
//! max_height = 2048
//!
//! [script]
//! timeout_secs = 5
//!
//! [analysis]
//! duplicate_threshold = 0.98
//! similar_threshold = 0.85
//! ```

use crate::analysis::AnalysisOptions;
use crate::cross_material::{CrossMaterialOptions, DEFAULT_COVERAGE_THRESHOLD};
use crate::fingerprint::{DEFAULT_DUPLICATE_THRESHOLD, DEFAULT_SIMILAR_THRESHOLD};
use crate::plugin::{LoadedPlugins, PluginLoader};
use crate::rules::BuiltinLimits;
use crate::tileability::{
    TileabilityOptions, DEFAULT_BLEND_WIDTH, DEFAULT_EDGE_BAND, TILEABILITY_THRESHOLD,
};
use crate::validation::{RuleSet, DEFAULT_MIN_SCORE};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Explicit plugin directory, overriding `[plugins] dir`
pub const PLUGIN_DIR_ENV: &str = "PBR_STUDIO_PLUGIN_DIR";

/// `1`, `true` or `yes` turns on strict plugin loading
pub const STRICT_PLUGINS_ENV: &str = "PBR_STUDIO_STRICT_PLUGINS";

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Worker threads for batch operations. Unset means one per core.
    pub workers: Option<usize>,
    pub plugins: PluginsConfig,
    pub validation: ValidationConfig,
    pub script: ScriptConfig,
    pub analysis: AnalysisConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginsConfig {
    /// Highest-priority plugin directory
    pub dir: Option<PathBuf>,
    /// Fail on the first bad manifest instead of skipping it
    pub strict: bool,
    /// Search the project, user and environment directories
    pub default_paths: bool,
}

impl Default for PluginsConfig {
    fn default() -> Self {
        Self {
            dir: None,
            strict: false,
            default_paths: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    pub min_score: i32,
    /// Add the pixel-content rules after the structural built-ins
    pub content_rules: bool,
    pub limits: BuiltinLimits,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            min_score: DEFAULT_MIN_SCORE,
            content_rules: false,
            limits: BuiltinLimits::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptConfig {
    pub timeout_secs: u64,
}

impl Default for ScriptConfig {
    fn default() -> Self {
        Self { timeout_secs: 10 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub duplicate_threshold: f64,
    pub similar_threshold: f64,
    pub include_tileability: bool,
    pub fix_tileability: bool,
    pub tileability_threshold: f64,
    pub edge_band: u32,
    pub blend_width: u32,
    pub coverage_threshold: f64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            duplicate_threshold: DEFAULT_DUPLICATE_THRESHOLD,
            similar_threshold: DEFAULT_SIMILAR_THRESHOLD,
            include_tileability: true,
            fix_tileability: false,
            tileability_threshold: TILEABILITY_THRESHOLD,
            edge_band: DEFAULT_EDGE_BAND,
            blend_width: DEFAULT_BLEND_WIDTH,
            coverage_threshold: DEFAULT_COVERAGE_THRESHOLD,
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: EngineConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and validate a TOML config file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&text)?;
        tracing::debug!(path = %path.display(), "Engine config loaded");
        Ok(config)
    }

    /// Apply `PBR_STUDIO_PLUGIN_DIR` and `PBR_STUDIO_STRICT_PLUGINS`.
    pub fn apply_env(self) -> Self {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    fn apply_env_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(dir) = lookup(PLUGIN_DIR_ENV).filter(|d| !d.trim().is_empty()) {
            self.plugins.dir = Some(PathBuf::from(dir));
        }
        if let Some(value) = lookup(STRICT_PLUGINS_ENV) {
            match parse_flag(&value) {
                Some(strict) => self.plugins.strict = strict,
                None => tracing::warn!(
                    var = STRICT_PLUGINS_ENV,
                    value = %value,
                    "Ignoring unrecognized flag value"
                ),
            }
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.workers == Some(0) {
            return Err(Error::InvalidParameter("workers must be at least 1".into()));
        }
        if !(0..=100).contains(&self.validation.min_score) {
            return Err(Error::InvalidParameter(format!(
                "min_score must be within 0..=100, got {}",
                self.validation.min_score
            )));
        }
        if self.script.timeout_secs == 0 {
            return Err(Error::InvalidParameter(
                "script timeout_secs must be greater than zero".into(),
            ));
        }
        self.analysis_options().validate()
    }

    pub fn script_timeout(&self) -> Duration {
        Duration::from_secs(self.script.timeout_secs)
    }

    /// Plugin loader for the configured sources.
    pub fn plugin_loader(&self) -> PluginLoader {
        let mut loader = PluginLoader::new();
        if self.plugins.default_paths {
            loader = loader.with_default_paths();
        }
        if let Some(dir) = &self.plugins.dir {
            loader = loader.add_dir(dir);
        }
        loader
            .strict(self.plugins.strict)
            .script_timeout(self.script_timeout())
    }

    /// Built-ins with the configured limits, optional content rules, then
    /// plugin rules.
    pub fn rule_set(&self, plugins: Option<&LoadedPlugins>) -> RuleSet {
        let mut rules = RuleSet::builtin_with_limits(&self.validation.limits);
        if self.validation.content_rules {
            rules = rules.with_content_rules(&self.analysis_options().tileability);
        }
        match plugins {
            Some(plugins) => rules.with_plugins(plugins),
            None => rules,
        }
    }

    pub fn analysis_options(&self) -> AnalysisOptions {
        let a = &self.analysis;
        AnalysisOptions {
            duplicate_threshold: a.duplicate_threshold,
            similar_threshold: a.similar_threshold,
            include_tileability: a.include_tileability,
            fix_tileability: a.fix_tileability,
            tileability: TileabilityOptions {
                threshold: a.tileability_threshold,
                band: a.edge_band,
            },
            blend_width: a.blend_width,
            cross_material: CrossMaterialOptions {
                coverage_threshold: a.coverage_threshold,
            },
        }
    }

    /// Rayon pool sized by `workers`.
    pub fn thread_pool(&self) -> Result<rayon::ThreadPool> {
        rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers.unwrap_or(0))
            .thread_name(|i| format!("pbr-worker-{}", i))
            .build()
            .map_err(|e| Error::Other(format!("failed to build worker pool: {}", e)))
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" => Some(true),
        "0" | "false" | "no" | "" => Some(false),
        _ => None,
    }
}
