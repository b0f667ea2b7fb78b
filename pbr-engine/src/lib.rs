//! # PBR Engine
//!
//! Validation and batch-analysis engine for PBR (Physically Based Rendering)
//! texture sets. Designed for use by CLI tools and desktop applications.
//!
//! ## Architecture
//!
//! - [`image_loading`] - Image loading, slot detection from file names
//! - [`material`] - Textures and materials (texture sets)
//! - [`rules`] - Declarative rule conditions and built-in rule definitions
//! - [`validation`] - Rule registry, scoring and batch validation
//! - [`plugin`] - Plugin discovery and JSON/TOML manifests
//! - [`script`] - External script rules (stdin/stdout protocol)
//! - [`fingerprint`] - Perceptual fingerprints and duplicate detection
//! - [`cross_material`] - Resolution and map coverage consistency
//! - [`tileability`] - Seam detection and repair
//! - [`analysis`] - Combined batch analysis report
//! - [`config`] - Engine configuration (TOML + environment)
//!
//! ## Example
//!
//! ```no_run
//! use pbr_engine::{validate, RuleSet, TextureSet, DEFAULT_MIN_SCORE};
//!
//! # fn main() -> pbr_engine::Result<()> {
//! let material = TextureSet::load_from_folder("assets/brick")?;
//! let result = validate(&material, &RuleSet::builtin(), DEFAULT_MIN_SCORE)?;
//! println!("score {} passed {}", result.score, result.passed);
//! # Ok(())
//! # }
//! ```

pub mod analysis;
pub mod cancel;
pub mod config;
pub mod cross_material;
pub mod fingerprint;
pub mod image_loading;
pub mod material;
pub mod plugin;
pub mod rules;
pub mod script;
pub mod tileability;
pub mod validation;

// Re-export main types for convenient access
pub use analysis::{run_advanced_analysis, AdvancedAnalysisReport, AnalysisOptions};
pub use cancel::CancellationToken;
pub use config::EngineConfig;
pub use cross_material::{
    analyze_cross_material, CrossMaterialOptions, CrossMaterialResult, MapCoverage,
    Recommendation, RecommendationKind, ResolutionDistribution,
};
pub use fingerprint::{
    detect_duplicates, DuplicateAnalysisResult, DuplicatePair, Fingerprint, FingerprintIndex,
};
pub use image_loading::{ImageLoader, LoadedImage, TextureSlot};
pub use material::{MaterialSummary, Texture, TextureSet};
pub use plugin::{
    LoadError, LoadedPlugins, PluginInfo, PluginLoader, PluginManifest, PresetDefinition,
};
pub use rules::{BuiltinLimits, RuleCondition, RuleDefinition};
pub use script::{RuleEvaluationError, ScriptRunner};
pub use tileability::{
    analyze_tileability, edge_difference, TileabilityAnalysis, TileabilityAnalysisEntry,
    TileabilityFixResult, TileabilityOptions, TILEABILITY_THRESHOLD,
};
pub use validation::{
    compute_score, validate, validate_batch, validate_folders, validate_with_cancel, BatchEntry,
    Issue, RuleSet, Severity, ValidationResult, ValidationRule, DEFAULT_MIN_SCORE,
};

/// Common result type for PBR operations
pub type Result<T> = std::result::Result<T, Error>;

/// Library-wide error type
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Plugin error: {0}")]
    Load(#[from] LoadError),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(String),
}
