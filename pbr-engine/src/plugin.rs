//! Plugin system for custom validation rules and presets.
//!
//! Supports:
//! - JSON/TOML config-driven rules (no code changes)
//! - External script rules via stdin/stdout (see [`crate::script`])
//! - Discovery from project, user and environment directories
//!
//! Both manifest serializations are first read into one intermediate JSON
//! value and converted from there, so `plugin.json` and `plugin.toml`
//! describing the same plugin yield identical [`PluginManifest`] values.

use crate::rules::RuleDefinition;
use crate::script::DEFAULT_SCRIPT_TIMEOUT;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const MANIFEST_JSON: &str = "plugin.json";
pub const MANIFEST_TOML: &str = "plugin.toml";

/// Path list of extra plugin directories
pub const PLUGINS_ENV: &str = "PBR_STUDIO_PLUGINS";

const PROJECT_PLUGIN_DIR: &str = ".pbr-studio";
const APP_DIR: &str = "pbr-studio";
const PLUGINS_SUBDIR: &str = "plugins";

/// Plugin manifest (plugin.json or plugin.toml)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginManifest {
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub rules: Vec<RuleDefinition>,
    #[serde(default)]
    pub presets: Vec<PresetDefinition>,
}

/// Export preset declared by a plugin
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresetDefinition {
    pub id: String,
    pub name: String,
    /// 4k, 2k, 1k, 512, 256 or 128
    pub target_resolution: String,
    #[serde(default)]
    pub include_lod: bool,
}

impl PresetDefinition {
    /// Largest dimension the preset targets.
    pub fn max_dimension(&self) -> Option<u32> {
        match self.target_resolution.trim().to_lowercase().as_str() {
            "4k" | "4096" => Some(4096),
            "2k" | "2048" => Some(2048),
            "1k" | "1024" => Some(1024),
            "512" => Some(512),
            "256" => Some(256),
            "128" => Some(128),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestFormat {
    Json,
    Toml,
}

impl ManifestFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()?.to_lowercase().as_str() {
            "json" => Some(ManifestFormat::Json),
            "toml" => Some(ManifestFormat::Toml),
            _ => None,
        }
    }
}

impl fmt::Display for ManifestFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ManifestFormat::Json => f.write_str("JSON"),
            ManifestFormat::Toml => f.write_str("TOML"),
        }
    }
}

/// Manifest problems found while loading plugins
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {format} manifest {}: {message}", .path.display())]
    Parse {
        path: PathBuf,
        format: ManifestFormat,
        message: String,
    },

    #[error("{} contains both plugin.json and plugin.toml", .dir.display())]
    Ambiguous { dir: PathBuf },

    #[error("invalid plugin '{plugin}' ({}): {reason}", .path.display())]
    InvalidPlugin {
        path: PathBuf,
        plugin: String,
        reason: String,
    },

    #[error("invalid rule '{rule_id}' in plugin '{plugin}' ({}): {reason}", .path.display())]
    InvalidRule {
        path: PathBuf,
        plugin: String,
        rule_id: String,
        reason: String,
    },

    #[error("invalid preset '{preset_id}' in plugin '{plugin}' ({}): {reason}", .path.display())]
    InvalidPreset {
        path: PathBuf,
        plugin: String,
        preset_id: String,
        reason: String,
    },
}

/// Manifest header, with rules and presets left untyped so a bad entry can
/// be reported by id.
#[derive(Deserialize)]
struct RawManifest {
    name: String,
    #[serde(default)]
    version: String,
    #[serde(default)]
    rules: Vec<serde_json::Value>,
    #[serde(default)]
    presets: Vec<serde_json::Value>,
}

fn entry_id(value: &serde_json::Value) -> String {
    value
        .get("id")
        .and_then(|v| v.as_str())
        .unwrap_or("<missing id>")
        .to_string()
}

impl PluginManifest {
    /// Parse and validate a manifest. `path` is used for diagnostics only.
    pub fn parse(text: &str, format: ManifestFormat, path: &Path) -> Result<Self, LoadError> {
        let parse_error = |message: String| LoadError::Parse {
            path: path.to_path_buf(),
            format,
            message,
        };
        let value: serde_json::Value = match format {
            ManifestFormat::Json => {
                serde_json::from_str(text).map_err(|e| parse_error(e.to_string()))?
            }
            ManifestFormat::Toml => toml::from_str(text).map_err(|e| parse_error(e.to_string()))?,
        };
        let raw: RawManifest =
            serde_json::from_value(value).map_err(|e| parse_error(e.to_string()))?;

        let plugin = raw.name.trim().to_string();
        if plugin.is_empty() {
            return Err(LoadError::InvalidPlugin {
                path: path.to_path_buf(),
                plugin,
                reason: "name must not be empty".into(),
            });
        }

        let invalid_rule = |rule_id: String, reason: String| LoadError::InvalidRule {
            path: path.to_path_buf(),
            plugin: plugin.clone(),
            rule_id,
            reason,
        };
        let mut rules = Vec::with_capacity(raw.rules.len());
        let mut seen = HashSet::new();
        for value in raw.rules {
            let id = entry_id(&value);
            let rule: RuleDefinition =
                serde_json::from_value(value).map_err(|e| invalid_rule(id.clone(), e.to_string()))?;
            rule.validate().map_err(|reason| invalid_rule(id.clone(), reason))?;
            if !seen.insert(rule.id.clone()) {
                return Err(invalid_rule(id, "duplicate rule id in manifest".into()));
            }
            rules.push(rule);
        }

        let invalid_preset = |preset_id: String, reason: String| LoadError::InvalidPreset {
            path: path.to_path_buf(),
            plugin: plugin.clone(),
            preset_id,
            reason,
        };
        let mut presets = Vec::with_capacity(raw.presets.len());
        let mut seen = HashSet::new();
        for value in raw.presets {
            let id = entry_id(&value);
            let preset: PresetDefinition = serde_json::from_value(value)
                .map_err(|e| invalid_preset(id.clone(), e.to_string()))?;
            if preset.id.trim().is_empty() {
                return Err(invalid_preset(id, "preset id must not be empty".into()));
            }
            if preset.max_dimension().is_none() {
                return Err(invalid_preset(
                    id,
                    format!("unknown target_resolution '{}'", preset.target_resolution),
                ));
            }
            if !seen.insert(preset.id.clone()) {
                return Err(invalid_preset(id, "duplicate preset id in manifest".into()));
            }
            presets.push(preset);
        }

        Ok(PluginManifest {
            name: plugin,
            version: raw.version,
            rules,
            presets,
        })
    }

    /// Read a manifest file; the format follows the extension.
    pub fn load(path: &Path) -> Result<Self, LoadError> {
        let format = ManifestFormat::from_path(path).ok_or_else(|| LoadError::Parse {
            path: path.to_path_buf(),
            format: ManifestFormat::Json,
            message: "manifest must be plugin.json or plugin.toml".into(),
        })?;
        let text = std::fs::read_to_string(path).map_err(|source| LoadError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text, format, path)
    }
}

/// Plugin metadata for listing loaded plugins
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginInfo {
    pub name: String,
    pub version: String,
    pub path: PathBuf,
    pub rule_ids: Vec<String>,
    pub preset_ids: Vec<String>,
}

/// Merged outcome of a plugin load
#[derive(Debug, Clone)]
pub struct LoadedPlugins {
    /// Plugins in discovery order
    pub plugins: Vec<PluginInfo>,
    /// Rules after last-wins merging by id
    pub rules: Vec<RuleDefinition>,
    /// Presets after last-wins merging by id
    pub presets: Vec<PresetDefinition>,
    /// Plugins skipped in lenient mode
    pub warnings: Vec<String>,
    /// Timeout for script rules that do not set their own
    pub script_timeout: Duration,
}

impl Default for LoadedPlugins {
    fn default() -> Self {
        Self {
            plugins: Vec::new(),
            rules: Vec::new(),
            presets: Vec::new(),
            warnings: Vec::new(),
            script_timeout: DEFAULT_SCRIPT_TIMEOUT,
        }
    }
}

impl LoadedPlugins {
    fn merge(&mut self, path: PathBuf, manifest: PluginManifest) {
        self.plugins.push(PluginInfo {
            name: manifest.name.clone(),
            version: manifest.version.clone(),
            path,
            rule_ids: manifest.rules.iter().map(|r| r.id.clone()).collect(),
            preset_ids: manifest.presets.iter().map(|p| p.id.clone()).collect(),
        });
        for rule in manifest.rules {
            upsert(&mut self.rules, rule, |r| &r.id);
        }
        for preset in manifest.presets {
            upsert(&mut self.presets, preset, |p| &p.id);
        }
    }

    pub fn rule(&self, id: &str) -> Option<&RuleDefinition> {
        self.rules.iter().find(|r| r.id == id)
    }

    pub fn preset(&self, id: &str) -> Option<&PresetDefinition> {
        self.presets.iter().find(|p| p.id == id)
    }
}

/// Replace the item with the same id in place, or append.
fn upsert<T>(items: &mut Vec<T>, item: T, id: impl Fn(&T) -> &str) {
    match items.iter().position(|existing| id(existing) == id(&item)) {
        Some(i) => {
            tracing::debug!(id = id(&item), "Plugin definition overridden");
            items[i] = item;
        }
        None => items.push(item),
    }
}

/// Plugin loader: discovers and loads plugins from directories.
///
/// Sources are searched in a fixed priority order, lowest first:
/// project-local (`./.pbr-studio/plugins`), user config
/// (`<config>/pbr-studio/plugins`), [`PLUGINS_ENV`], then explicit
/// directories. Later sources override earlier ones by id.
#[derive(Debug, Clone)]
pub struct PluginLoader {
    project_root: Option<PathBuf>,
    user_config_dir: Option<PathBuf>,
    env_dirs: Vec<PathBuf>,
    explicit_dirs: Vec<PathBuf>,
    strict: bool,
    script_timeout: Duration,
}

impl Default for PluginLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl PluginLoader {
    /// Loader with no search directories.
    pub fn new() -> Self {
        Self {
            project_root: None,
            user_config_dir: None,
            env_dirs: Vec::new(),
            explicit_dirs: Vec::new(),
            strict: false,
            script_timeout: DEFAULT_SCRIPT_TIMEOUT,
        }
    }

    /// Fill the project, user and environment sources from the process
    /// environment.
    pub fn with_default_paths(mut self) -> Self {
        self.project_root = std::env::current_dir().ok();
        self.user_config_dir = dirs::config_dir();
        self.env_dirs = std::env::var_os(PLUGINS_ENV)
            .map(|v| {
                std::env::split_paths(&v)
                    .filter(|p| !p.as_os_str().is_empty())
                    .collect()
            })
            .unwrap_or_default();
        self
    }

    pub fn with_project_root<P: AsRef<Path>>(mut self, root: P) -> Self {
        self.project_root = Some(root.as_ref().to_path_buf());
        self
    }

    pub fn with_user_config_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.user_config_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn with_env_dirs<I, P>(mut self, dirs: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        self.env_dirs = dirs.into_iter().map(|p| p.as_ref().to_path_buf()).collect();
        self
    }

    /// Add an explicit plugin directory (highest priority).
    pub fn add_dir<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.explicit_dirs.push(path.as_ref().to_path_buf());
        self
    }

    /// Fail the whole load on the first bad manifest instead of skipping it.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn script_timeout(mut self, timeout: Duration) -> Self {
        self.script_timeout = timeout;
        self
    }

    /// Search directories in priority order, lowest first.
    pub fn search_dirs(&self) -> Vec<PathBuf> {
        let mut dirs = Vec::new();
        if let Some(root) = &self.project_root {
            dirs.push(root.join(PROJECT_PLUGIN_DIR).join(PLUGINS_SUBDIR));
        }
        if let Some(config) = &self.user_config_dir {
            dirs.push(config.join(APP_DIR).join(PLUGINS_SUBDIR));
        }
        dirs.extend(self.env_dirs.iter().cloned());
        dirs.extend(self.explicit_dirs.iter().cloned());
        dirs
    }

    /// Manifest paths in load order. Ambiguous directories are left out.
    pub fn discover(&self) -> Vec<PathBuf> {
        self.discover_entries()
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(path) => Some(path),
                Err(e) => {
                    tracing::warn!(error = %e, "Ignoring plugin directory");
                    None
                }
            })
            .collect()
    }

    fn discover_entries(&self) -> Vec<Result<PathBuf, LoadError>> {
        let mut found = Vec::new();
        for dir in self.search_dirs() {
            if !dir.is_dir() {
                tracing::debug!(dir = %dir.display(), "Plugin directory not present");
                continue;
            }
            // Each plugin is one subfolder, visited in name order
            let mut subdirs: Vec<PathBuf> = match std::fs::read_dir(&dir) {
                Ok(entries) => entries
                    .flatten()
                    .map(|e| e.path())
                    .filter(|p| p.is_dir())
                    .collect(),
                Err(source) => {
                    found.push(Err(LoadError::Read { path: dir, source }));
                    continue;
                }
            };
            subdirs.sort();
            found.extend(subdirs.iter().filter_map(|d| find_manifest(d)));
            // A manifest may also sit directly in the search directory
            found.extend(find_manifest(&dir));
        }
        found
    }

    /// Load every discovered manifest and merge rules and presets.
    pub fn load(&self) -> Result<LoadedPlugins, LoadError> {
        let mut loaded = LoadedPlugins {
            script_timeout: self.script_timeout,
            ..Default::default()
        };

        for entry in self.discover_entries() {
            let outcome = entry.and_then(|path| PluginManifest::load(&path).map(|m| (path, m)));
            match outcome {
                Ok((path, manifest)) => {
                    tracing::debug!(
                        plugin = %manifest.name,
                        path = %path.display(),
                        rules = manifest.rules.len(),
                        presets = manifest.presets.len(),
                        "Plugin manifest loaded"
                    );
                    loaded.merge(path, manifest);
                }
                Err(e) if self.strict => return Err(e),
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping plugin");
                    loaded.warnings.push(e.to_string());
                }
            }
        }

        tracing::info!(
            plugins = loaded.plugins.len(),
            rules = loaded.rules.len(),
            presets = loaded.presets.len(),
            skipped = loaded.warnings.len(),
            "Plugins loaded"
        );
        Ok(loaded)
    }
}

fn find_manifest(dir: &Path) -> Option<Result<PathBuf, LoadError>> {
    let json = dir.join(MANIFEST_JSON);
    let toml = dir.join(MANIFEST_TOML);
    match (json.is_file(), toml.is_file()) {
        (true, true) => Some(Err(LoadError::Ambiguous {
            dir: dir.to_path_buf(),
        })),
        (true, false) => Some(Ok(json)),
        (false, true) => Some(Ok(toml)),
        (false, false) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image_loading::TextureSlot;
    use crate::material::{Texture, TextureSet};
    use crate::rules::RuleCondition;
    use crate::validation::{validate, RuleSet, Severity};

    const JSON_MANIFEST: &str = r#"{
        "name": "studio-rules",
        "version": "1.2.0",
        "rules": [
            {
                "id": "require_height",
                "description": "Height maps are mandatory",
                "severity": "critical",
                "condition": { "type": "required_maps", "maps": ["height", "albedo"] }
            },
            {
                "id": "mobile_max",
                "severity": "minor",
                "condition": { "type": "max_resolution", "max_width": 2048, "max_height": 2048 }
            },
            {
                "id": "lint",
                "condition": { "type": "script", "command": "python3", "args": ["lint.py", "--strict"] }
            },
            { "id": "pot", "severity": "warning", "condition": { "type": "power_of_two" } }
        ],
        "presets": [
            { "id": "mobile", "name": "Mobile", "target_resolution": "1k", "include_lod": true }
        ]
    }"#;

    const TOML_MANIFEST: &str = r#"
name = "studio-rules"
version = "1.2.0"

[[rules]]
id = "require_height"
description = "Height maps are mandatory"
severity = "critical"
condition = { type = "required_maps", maps = ["height", "albedo"] }

[[rules]]
id = "mobile_max"
severity = "minor"
[rules.condition]
type = "max_resolution"
max_width = 2048
max_height = 2048

[[rules]]
id = "lint"
condition = { type = "script", command = "python3", args = ["lint.py", "--strict"] }

[[rules]]
id = "pot"
severity = "warning"
condition = { type = "power_of_two" }

[[presets]]
id = "mobile"
name = "Mobile"
target_resolution = "1k"
include_lod = true
"#;

    fn write_plugin(dir: &Path, file: &str, contents: &str) {
        std::fs::create_dir_all(dir).unwrap();
        std::fs::write(dir.join(file), contents).unwrap();
    }

    fn rule_json(plugin: &str, id: &str, severity: &str) -> String {
        format!(
            r#"{{"name":"{}","rules":[{{"id":"{}","severity":"{}","condition":{{"type":"power_of_two"}}}}]}}"#,
            plugin, id, severity
        )
    }

    #[test]
    fn json_and_toml_manifests_are_equivalent() {
        let json =
            PluginManifest::parse(JSON_MANIFEST, ManifestFormat::Json, Path::new("plugin.json"))
                .unwrap();
        let toml =
            PluginManifest::parse(TOML_MANIFEST, ManifestFormat::Toml, Path::new("plugin.toml"))
                .unwrap();
        assert_eq!(json, toml);

        assert_eq!(json.rules.len(), 4);
        assert_eq!(json.rules[0].severity, Severity::Critical);
        assert_eq!(
            json.rules[0].condition,
            RuleCondition::RequiredMaps {
                maps: vec![TextureSlot::Height, TextureSlot::Albedo]
            }
        );
        assert_eq!(json.rules[2].severity, Severity::Major);
        assert_eq!(json.rules[3].severity, Severity::Major);
        assert_eq!(json.presets[0].max_dimension(), Some(1024));
    }

    #[test]
    fn unknown_condition_type_names_plugin_and_rule() {
        let text = r#"{"name":"bad","rules":[{"id":"sharp","condition":{"type":"sharpness","min":3}}]}"#;
        let err = PluginManifest::parse(text, ManifestFormat::Json, Path::new("bad/plugin.json"))
            .unwrap_err();
        match &err {
            LoadError::InvalidRule {
                plugin, rule_id, ..
            } => {
                assert_eq!(plugin, "bad");
                assert_eq!(rule_id, "sharp");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(err.to_string().contains("sharp"));
    }

    #[test]
    fn invalid_condition_parameters_fail_at_load_time() {
        let cases = [
            r#"{"name":"p","rules":[{"id":"r","condition":{"type":"max_resolution","max_width":0,"max_height":10}}]}"#,
            r#"{"name":"p","rules":[{"id":"r","condition":{"type":"min_resolution","min_width":-4,"min_height":10}}]}"#,
            r#"{"name":"p","rules":[{"id":"r","condition":{"type":"script","command":""}}]}"#,
            r#"{"name":"p","rules":[{"id":"r","condition":{"type":"required_maps","maps":["emissive"]}}]}"#,
            r#"{"name":"p","rules":[{"id":"r","severity":"fatal","condition":{"type":"power_of_two"}}]}"#,
            r#"{"name":"p","rules":[{"id":"r","condition":{"type":"power_of_two"}},{"id":"r","condition":{"type":"power_of_two"}}]}"#,
        ];
        for text in cases {
            let err = PluginManifest::parse(text, ManifestFormat::Json, Path::new("plugin.json"))
                .unwrap_err();
            assert!(
                matches!(err, LoadError::InvalidRule { ref rule_id, .. } if rule_id == "r"),
                "{text}: {err}"
            );
        }
    }

    #[test]
    fn invalid_presets_and_names_are_rejected() {
        let text = r#"{"name":"p","presets":[{"id":"huge","name":"Huge","target_resolution":"16k"}]}"#;
        assert!(matches!(
            PluginManifest::parse(text, ManifestFormat::Json, Path::new("plugin.json")),
            Err(LoadError::InvalidPreset { .. })
        ));
        let text = r#"{"name":"  "}"#;
        assert!(matches!(
            PluginManifest::parse(text, ManifestFormat::Json, Path::new("plugin.json")),
            Err(LoadError::InvalidPlugin { .. })
        ));
        assert!(matches!(
            PluginManifest::parse("name = ", ManifestFormat::Toml, Path::new("plugin.toml")),
            Err(LoadError::Parse { .. })
        ));
    }

    #[test]
    fn later_sources_override_earlier_ones() {
        let tmp = tempfile::tempdir().unwrap();
        let project = tmp.path().join("project");
        let config = tmp.path().join("config");
        let env_dir = tmp.path().join("env");
        let explicit = tmp.path().join("explicit");

        write_plugin(
            &project.join(".pbr-studio/plugins/local"),
            MANIFEST_JSON,
            &rule_json("local", "shared", "minor"),
        );
        write_plugin(
            &config.join("pbr-studio/plugins/user"),
            MANIFEST_JSON,
            &rule_json("user", "shared", "major"),
        );
        write_plugin(
            &env_dir.join("team"),
            MANIFEST_TOML,
            "name = \"team\"\n[[rules]]\nid = \"team_only\"\ncondition = { type = \"power_of_two\" }\n",
        );
        write_plugin(&explicit, MANIFEST_JSON, &rule_json("explicit", "shared", "critical"));

        let loader = PluginLoader::new()
            .with_project_root(&project)
            .with_user_config_dir(&config)
            .with_env_dirs([&env_dir])
            .add_dir(&explicit);

        let discovered = loader.discover();
        assert_eq!(
            discovered,
            vec![
                project.join(".pbr-studio/plugins/local/plugin.json"),
                config.join("pbr-studio/plugins/user/plugin.json"),
                env_dir.join("team/plugin.toml"),
                explicit.join("plugin.json"),
            ]
        );

        let loaded = loader.load().unwrap();
        let names: Vec<&str> = loaded.plugins.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["local", "user", "team", "explicit"]);
        assert_eq!(loaded.rules.len(), 2);
        assert_eq!(loaded.rules[0].id, "shared");
        assert_eq!(loaded.rules[0].severity, Severity::Critical);
        assert_eq!(loaded.rules[1].id, "team_only");
        assert!(loaded.warnings.is_empty());
    }

    #[test]
    fn subfolders_load_in_name_order() {
        let tmp = tempfile::tempdir().unwrap();
        write_plugin(&tmp.path().join("b"), MANIFEST_JSON, &rule_json("b", "r", "critical"));
        write_plugin(&tmp.path().join("a"), MANIFEST_JSON, &rule_json("a", "r", "minor"));
        let loaded = PluginLoader::new().add_dir(tmp.path()).load().unwrap();
        assert_eq!(loaded.rule("r").unwrap().severity, Severity::Critical);
    }

    #[test]
    fn presets_merge_independently_of_rules() {
        let tmp = tempfile::tempdir().unwrap();
        write_plugin(
            &tmp.path().join("a"),
            MANIFEST_JSON,
            r#"{"name":"a","presets":[{"id":"web","name":"Web","target_resolution":"2k"}]}"#,
        );
        write_plugin(
            &tmp.path().join("b"),
            MANIFEST_JSON,
            r#"{"name":"b","presets":[{"id":"web","name":"Web small","target_resolution":"512"},{"id":"hero","name":"Hero","target_resolution":"4096"}]}"#,
        );
        let loaded = PluginLoader::new().add_dir(tmp.path()).load().unwrap();
        assert_eq!(loaded.presets.len(), 2);
        assert_eq!(loaded.preset("web").unwrap().max_dimension(), Some(512));
        assert_eq!(loaded.preset("hero").unwrap().max_dimension(), Some(4096));
    }

    #[test]
    fn lenient_mode_skips_bad_plugins_with_warning() {
        let tmp = tempfile::tempdir().unwrap();
        write_plugin(&tmp.path().join("a_broken"), MANIFEST_JSON, "{ not json");
        write_plugin(&tmp.path().join("b_good"), MANIFEST_JSON, &rule_json("good", "ok", "minor"));
        let both = tmp.path().join("c_both");
        write_plugin(&both, MANIFEST_JSON, &rule_json("json", "j", "minor"));
        write_plugin(&both, MANIFEST_TOML, "name = \"toml\"\n");

        let loaded = PluginLoader::new().add_dir(tmp.path()).load().unwrap();
        assert_eq!(loaded.plugins.len(), 1);
        assert_eq!(loaded.plugins[0].name, "good");
        assert_eq!(loaded.warnings.len(), 2);
        assert!(loaded.warnings[0].contains("a_broken"));
        assert!(loaded.warnings[1].contains("both"));
    }

    #[test]
    fn strict_mode_fails_on_first_bad_plugin() {
        let tmp = tempfile::tempdir().unwrap();
        write_plugin(
            &tmp.path().join("bad"),
            MANIFEST_JSON,
            r#"{"name":"bad","rules":[{"id":"r1","condition":{"type":"max_texture_count"}}]}"#,
        );
        let err = PluginLoader::new()
            .add_dir(tmp.path())
            .strict(true)
            .load()
            .unwrap_err();
        assert!(matches!(err, LoadError::InvalidRule { ref rule_id, .. } if rule_id == "r1"));
    }

    #[test]
    fn missing_directories_are_not_errors() {
        let loaded = PluginLoader::new()
            .add_dir("/nonexistent/pbr-plugins")
            .strict(true)
            .load()
            .unwrap();
        assert!(loaded.plugins.is_empty());
    }

    #[test]
    fn plugin_rules_extend_and_override_builtins() {
        let tmp = tempfile::tempdir().unwrap();
        write_plugin(
            tmp.path(),
            MANIFEST_JSON,
            r#"{"name":"house","rules":[
                {"id":"power_of_two","severity":"critical","condition":{"type":"power_of_two"}},
                {"id":"needs_height","severity":"minor","condition":{"type":"required_maps","slots":["height"]}}
            ]}"#,
        );
        let loaded = PluginLoader::new().add_dir(tmp.path()).load().unwrap();
        let rules = RuleSet::builtin().with_plugins(&loaded);
        assert_eq!(
            rules.ids(),
            vec![
                "required_maps",
                "max_resolution",
                "min_resolution",
                "power_of_two",
                "max_texture_count",
                "needs_height"
            ]
        );

        let set = TextureSlot::CORE
            .into_iter()
            .fold(TextureSet::new(), |s, slot| {
                s.with(slot, Texture::solid(100, 100, [128, 128, 128, 255]).unwrap())
            });
        let result = validate(&set, &rules, 0).unwrap();
        // five non-power-of-two maps at critical plus the missing height map
        assert_eq!(result.issues.len(), 6);
        assert_eq!(result.score, 0);
        assert!(!result.passed);
        assert_eq!(result.issues[5].rule_id, "needs_height");
    }
}
