//! Declarative rule conditions.
//!
//! Built-in structural rules and plugin rules share one representation: a
//! [`RuleDefinition`] carrying a [`RuleCondition`]. The `Script` condition
//! delegates to an external process (see [`crate::script`]).

use crate::cancel::CancellationToken;
use crate::image_loading::TextureSlot;
use crate::material::TextureSet;
use crate::script::ScriptRunner;
use crate::validation::{Issue, Severity, ValidationRule};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Rule condition kinds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuleCondition {
    /// All listed slots must be present
    RequiredMaps {
        #[serde(alias = "slots")]
        maps: Vec<TextureSlot>,
    },
    /// No texture may be wider or taller than the limit
    MaxResolution { max_width: u32, max_height: u32 },
    /// No texture may be narrower or shorter than the limit
    MinResolution { min_width: u32, min_height: u32 },
    /// Every texture must have power-of-two dimensions
    PowerOfTwo,
    /// At most `max` slots may be populated
    MaxTextureCount { max: usize },
    /// External script: material summary JSON on stdin, issues JSON on stdout
    Script {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout_secs: Option<u64>,
    },
}

impl RuleCondition {
    /// Snake-case tag, as written in manifests.
    pub fn kind(&self) -> &'static str {
        match self {
            RuleCondition::RequiredMaps { .. } => "required_maps",
            RuleCondition::MaxResolution { .. } => "max_resolution",
            RuleCondition::MinResolution { .. } => "min_resolution",
            RuleCondition::PowerOfTwo => "power_of_two",
            RuleCondition::MaxTextureCount { .. } => "max_texture_count",
            RuleCondition::Script { .. } => "script",
        }
    }

    /// Check parameters. Runs at load time so bad plugins fail before
    /// any material is evaluated.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            RuleCondition::RequiredMaps { maps } => {
                if maps.is_empty() {
                    return Err("required_maps needs at least one slot".into());
                }
            }
            RuleCondition::MaxResolution {
                max_width,
                max_height,
            } => {
                if *max_width == 0 || *max_height == 0 {
                    return Err(format!(
                        "max_resolution must be positive, got {}x{}",
                        max_width, max_height
                    ));
                }
            }
            RuleCondition::MinResolution {
                min_width,
                min_height,
            } => {
                if *min_width == 0 || *min_height == 0 {
                    return Err(format!(
                        "min_resolution must be positive, got {}x{}",
                        min_width, min_height
                    ));
                }
            }
            RuleCondition::PowerOfTwo | RuleCondition::MaxTextureCount { .. } => {}
            RuleCondition::Script {
                command,
                timeout_secs,
                ..
            } => {
                if command.trim().is_empty() {
                    return Err("script command must not be empty".into());
                }
                if *timeout_secs == Some(0) {
                    return Err("script timeout_secs must be greater than zero".into());
                }
            }
        }
        Ok(())
    }

    /// Evaluate every non-script condition. Script conditions yield nothing
    /// here; [`ConditionRule`] routes them to the script runner.
    pub fn evaluate(&self, set: &TextureSet, rule_id: &str, severity: Severity) -> Vec<Issue> {
        match self {
            RuleCondition::RequiredMaps { maps } => {
                let missing: Vec<&str> = set.missing_slots(maps).map(|s| s.name()).collect();
                if missing.is_empty() {
                    vec![]
                } else {
                    vec![Issue::new(
                        rule_id,
                        severity,
                        format!("Missing required maps: {}", missing.join(", ")),
                    )]
                }
            }
            RuleCondition::MaxResolution {
                max_width,
                max_height,
            } => set
                .iter()
                .find(|(_, t)| t.width() > *max_width || t.height() > *max_height)
                .map(|(slot, t)| {
                    Issue::new(
                        rule_id,
                        severity,
                        format!(
                            "{} is {}x{}, exceeds max {}x{}",
                            slot, t.width(), t.height(), max_width, max_height
                        ),
                    )
                })
                .into_iter()
                .collect(),
            RuleCondition::MinResolution {
                min_width,
                min_height,
            } => set
                .iter()
                .find(|(_, t)| t.width() < *min_width || t.height() < *min_height)
                .map(|(slot, t)| {
                    Issue::new(
                        rule_id,
                        severity,
                        format!(
                            "{} is {}x{}, below min {}x{}",
                            slot, t.width(), t.height(), min_width, min_height
                        ),
                    )
                })
                .into_iter()
                .collect(),
            RuleCondition::PowerOfTwo => set
                .iter()
                .filter(|(_, t)| !t.is_power_of_two())
                .map(|(slot, t)| {
                    Issue::new(
                        rule_id,
                        severity,
                        format!(
                            "{} is {}x{}, not a power of two. May cause GPU issues.",
                            slot, t.width(), t.height()
                        ),
                    )
                })
                .collect(),
            RuleCondition::MaxTextureCount { max } => {
                let count = set.texture_count();
                if count > *max {
                    vec![Issue::new(
                        rule_id,
                        severity,
                        format!("Texture count {} exceeds max {}", count, max),
                    )]
                } else {
                    vec![]
                }
            }
            RuleCondition::Script { .. } => vec![],
        }
    }
}

fn default_severity() -> Severity {
    Severity::Major
}

/// Rule definition (built-in or from a plugin manifest)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleDefinition {
    pub id: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_severity")]
    pub severity: Severity,
    pub condition: RuleCondition,
}

impl RuleDefinition {
    pub fn new(
        id: impl Into<String>,
        description: impl Into<String>,
        severity: Severity,
        condition: RuleCondition,
    ) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            severity,
            condition,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("rule id must not be empty".into());
        }
        self.condition.validate()
    }
}

/// Limits used by the built-in structural rules
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuiltinLimits {
    pub required_maps: Vec<TextureSlot>,
    pub max_width: u32,
    pub max_height: u32,
    pub min_width: u32,
    pub min_height: u32,
    pub max_texture_count: usize,
}

impl Default for BuiltinLimits {
    fn default() -> Self {
        Self {
            required_maps: TextureSlot::CORE.to_vec(),
            max_width: 4096,
            max_height: 4096,
            min_width: 1,
            min_height: 1,
            max_texture_count: TextureSlot::ALL.len(),
        }
    }
}

/// Built-in structural rules, in evaluation order.
pub fn builtin_definitions(limits: &BuiltinLimits) -> Vec<RuleDefinition> {
    vec![
        RuleDefinition::new(
            "required_maps",
            "Core PBR maps (albedo, normal, roughness, metallic, ao) must be present",
            Severity::Major,
            RuleCondition::RequiredMaps {
                maps: limits.required_maps.clone(),
            },
        ),
        RuleDefinition::new(
            "max_resolution",
            "Texture dimensions must not exceed the configured maximum",
            Severity::Major,
            RuleCondition::MaxResolution {
                max_width: limits.max_width,
                max_height: limits.max_height,
            },
        ),
        RuleDefinition::new(
            "min_resolution",
            "Texture dimensions must reach the configured minimum",
            Severity::Major,
            RuleCondition::MinResolution {
                min_width: limits.min_width,
                min_height: limits.min_height,
            },
        ),
        RuleDefinition::new(
            "power_of_two",
            "Texture dimensions should be powers of two",
            Severity::Minor,
            RuleCondition::PowerOfTwo,
        ),
        RuleDefinition::new(
            "max_texture_count",
            "Material must not carry more maps than the configured maximum",
            Severity::Major,
            RuleCondition::MaxTextureCount {
                max: limits.max_texture_count,
            },
        ),
    ]
}

/// Validation rule backed by a [`RuleDefinition`]
#[derive(Debug, Clone)]
pub struct ConditionRule {
    definition: RuleDefinition,
    script_timeout: Duration,
}

impl ConditionRule {
    pub fn new(definition: RuleDefinition, script_timeout: Duration) -> Self {
        Self {
            definition,
            script_timeout,
        }
    }

    pub fn definition(&self) -> &RuleDefinition {
        &self.definition
    }
}

impl ValidationRule for ConditionRule {
    fn id(&self) -> &str {
        &self.definition.id
    }

    fn description(&self) -> &str {
        if self.definition.description.is_empty() {
            "Custom rule from plugin config"
        } else {
            &self.definition.description
        }
    }

    fn check(&self, set: &TextureSet) -> Option<Issue> {
        self.check_all(set, &CancellationToken::new())
            .into_iter()
            .next()
    }

    fn check_all(&self, set: &TextureSet, cancel: &CancellationToken) -> Vec<Issue> {
        match &self.definition.condition {
            RuleCondition::Script {
                command,
                args,
                timeout_secs,
            } => {
                let timeout = timeout_secs
                    .map(Duration::from_secs)
                    .unwrap_or(self.script_timeout);
                ScriptRunner::new(timeout)
                    .with_cancellation(cancel.clone())
                    .run(command, args, set, &self.definition.id)
            }
            condition => condition.evaluate(set, &self.definition.id, self.definition.severity),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::material::Texture;

    fn tex(w: u32, h: u32) -> Texture {
        Texture::solid(w, h, [128, 128, 128, 255]).unwrap()
    }

    #[test]
    fn required_maps_lists_all_missing_slots_in_one_issue() {
        let set = TextureSet::new().with(TextureSlot::Albedo, tex(4, 4));
        let cond = RuleCondition::RequiredMaps {
            maps: TextureSlot::CORE.to_vec(),
        };
        let issues = cond.evaluate(&set, "required_maps", Severity::Major);
        assert_eq!(issues.len(), 1);
        assert_eq!(
            issues[0].message,
            "Missing required maps: normal, roughness, metallic, ao"
        );
    }

    #[test]
    fn max_resolution_reports_first_offending_slot() {
        let set = TextureSet::new()
            .with(TextureSlot::Normal, tex(8192, 8192))
            .with(TextureSlot::Albedo, tex(4100, 4100));
        let cond = RuleCondition::MaxResolution {
            max_width: 4096,
            max_height: 4096,
        };
        let issues = cond.evaluate(&set, "max_resolution", Severity::Major);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].message, "albedo is 4100x4100, exceeds max 4096x4096");
    }

    #[test]
    fn min_resolution_trips_on_small_maps() {
        let set = TextureSet::new().with(TextureSlot::Roughness, tex(64, 32));
        let cond = RuleCondition::MinResolution {
            min_width: 64,
            min_height: 64,
        };
        let issues = cond.evaluate(&set, "min", Severity::Minor);
        assert_eq!(issues.len(), 1);
        assert!(issues[0].message.contains("roughness is 64x32"));
    }

    #[test]
    fn power_of_two_emits_one_issue_per_texture() {
        let set = TextureSet::new()
            .with(TextureSlot::Albedo, tex(100, 64))
            .with(TextureSlot::Normal, tex(64, 64))
            .with(TextureSlot::Height, tex(3, 3));
        let issues = RuleCondition::PowerOfTwo.evaluate(&set, "pot", Severity::Minor);
        assert_eq!(issues.len(), 2);
        assert!(issues[0].message.starts_with("albedo"));
        assert!(issues[1].message.starts_with("height"));
    }

    #[test]
    fn max_texture_count() {
        let set = TextureSet::new()
            .with(TextureSlot::Albedo, tex(4, 4))
            .with(TextureSlot::Normal, tex(4, 4));
        let cond = RuleCondition::MaxTextureCount { max: 1 };
        assert_eq!(cond.evaluate(&set, "count", Severity::Major).len(), 1);
        let cond = RuleCondition::MaxTextureCount { max: 2 };
        assert!(cond.evaluate(&set, "count", Severity::Major).is_empty());
    }

    #[test]
    fn validation_rejects_bad_parameters() {
        assert!(RuleCondition::RequiredMaps { maps: vec![] }.validate().is_err());
        assert!(RuleCondition::MaxResolution {
            max_width: 0,
            max_height: 10
        }
        .validate()
        .is_err());
        assert!(RuleCondition::Script {
            command: "  ".into(),
            args: vec![],
            timeout_secs: None
        }
        .validate()
        .is_err());
        assert!(RuleCondition::Script {
            command: "python3".into(),
            args: vec![],
            timeout_secs: Some(0)
        }
        .validate()
        .is_err());
        assert!(RuleCondition::PowerOfTwo.validate().is_ok());
    }

    #[test]
    fn condition_json_uses_type_tag() {
        let cond: RuleCondition =
            serde_json::from_str(r#"{"type":"required_maps","slots":["albedo","Normal"]}"#)
                .unwrap();
        assert_eq!(
            cond,
            RuleCondition::RequiredMaps {
                maps: vec![TextureSlot::Albedo, TextureSlot::Normal]
            }
        );
        assert!(serde_json::from_str::<RuleCondition>(r#"{"type":"sharpness"}"#).is_err());
    }
}
