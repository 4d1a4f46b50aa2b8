//! Configuration for the Ascent progression engine.
//!
//! Maps directly to `ascent.toml`. Content (stats, skills, reputation
//! contexts) and tuning live side by side:
//!
//! ```toml
//! [general]
//! log_level = "debug"
//!
//! [[stats]]
//! id = "strength"
//! base = 10.0
//! max = 100.0
//!
//! [[skill_categories]]
//! id = "combat"
//! name = "Combat"
//!
//! [[skills]]
//! id = "swords"
//! category = "combat"
//! effects = [{ target_stat = "strength", magnitude_per_level = 1.0, kind = "Additive" }]
//!
//! [[reputation_contexts]]
//! id = "guild"
//! traits = ["honesty", "valor"]
//! ```

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{AscentError, Result};
use crate::skills::{SkillEffect, SkillRequirement};

/// Top-level Ascent configuration, loadable from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AscentConfig {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,
    /// Stat definitions.
    #[serde(default)]
    pub stats: Vec<StatDefinition>,
    /// Skill categories.
    #[serde(default)]
    pub skill_categories: Vec<SkillCategoryDefinition>,
    /// Skill definitions, each naming its category.
    #[serde(default)]
    pub skills: Vec<SkillDefinition>,
    /// Reputation contexts (factions, locations, NPCs).
    #[serde(default)]
    pub reputation_contexts: Vec<ReputationContextDefinition>,
    /// Reputation event defaults.
    #[serde(default)]
    pub reputation: ReputationSettings,
    /// Per-step budget enforcement.
    #[serde(default)]
    pub performance: PerformanceConfig,
    /// Persistence / save settings.
    #[serde(default)]
    pub persistence: PersistenceConfig,
}

impl AscentConfig {
    /// Load configuration from a TOML string and validate it.
    ///
    /// # Errors
    /// Returns `AscentError::Config` if the TOML is invalid, or any
    /// validation error from [`AscentConfig::validate`].
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(toml_str).map_err(|e| AscentError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Check the content for authoring mistakes.
    ///
    /// Duplicate ids, skills in undeclared categories and numerically
    /// impossible values fail fast. Dangling cross-registry references
    /// (an effect targeting an undeclared stat) only warn, since the engine
    /// treats unknown ids as no-ops at runtime.
    ///
    /// # Errors
    /// Returns the first problem found.
    pub fn validate(&self) -> Result<()> {
        let mut stat_ids = HashSet::new();
        for stat in &self.stats {
            if !stat_ids.insert(stat.id.as_str()) {
                return Err(duplicate("stat", &stat.id));
            }
            check_bounds(&stat.id, stat.min, stat.max).map_err(AscentError::Config)?;
            if !stat.base.is_finite() {
                return Err(AscentError::Config(format!(
                    "stat {} has a non-finite base value",
                    stat.id
                )));
            }
        }

        let mut category_ids = HashSet::new();
        for category in &self.skill_categories {
            if !category_ids.insert(category.id.as_str()) {
                return Err(duplicate("skill category", &category.id));
            }
        }

        let mut skill_ids = HashSet::new();
        for skill in &self.skills {
            if !skill_ids.insert(skill.id.as_str()) {
                return Err(duplicate("skill", &skill.id));
            }
            if !category_ids.contains(skill.category.as_str()) {
                return Err(AscentError::UnknownCategory {
                    skill: skill.id.clone(),
                    category: skill.category.clone(),
                });
            }
            check_threshold(&skill.id, skill.base_threshold).map_err(AscentError::Config)?;
            check_multiplier(&skill.id, skill.threshold_multiplier)
                .map_err(AscentError::Config)?;
            for effect in &skill.effects {
                if !stat_ids.contains(effect.target_stat.as_str()) {
                    warn!(
                        skill = %skill.id,
                        stat = %effect.target_stat,
                        "Skill effect targets an undeclared stat"
                    );
                }
            }
        }

        let mut context_ids = HashSet::new();
        for context in &self.reputation_contexts {
            if !context_ids.insert(context.id.as_str()) {
                return Err(duplicate("reputation context", &context.id));
            }
            let mut traits = HashSet::new();
            for trait_id in &context.traits {
                if !traits.insert(trait_id.as_str()) {
                    return Err(duplicate("reputation trait", trait_id));
                }
            }
        }

        check_decay_rate(self.reputation.default_decay_rate).map_err(AscentError::Config)?;

        Ok(())
    }
}

fn duplicate(kind: &'static str, id: &str) -> AscentError {
    AscentError::DuplicateId {
        kind,
        id: id.to_string(),
    }
}

/// `min ≤ max`, both finite. Shared by config and save validation.
pub(crate) fn check_bounds(id: &str, min: f32, max: f32) -> std::result::Result<(), String> {
    if !min.is_finite() || !max.is_finite() {
        return Err(format!("stat {id} has non-finite bounds"));
    }
    if min > max {
        return Err(format!("stat {id} has min {min} greater than max {max}"));
    }
    Ok(())
}

pub(crate) fn check_threshold(id: &str, threshold: f32) -> std::result::Result<(), String> {
    if threshold.is_finite() && threshold > 0.0 {
        Ok(())
    } else {
        Err(format!("skill {id} has non-positive level threshold {threshold}"))
    }
}

pub(crate) fn check_multiplier(id: &str, multiplier: f32) -> std::result::Result<(), String> {
    if multiplier.is_finite() && multiplier >= 1.0 {
        Ok(())
    } else {
        Err(format!(
            "skill {id} has threshold multiplier {multiplier} (must be at least 1.0)"
        ))
    }
}

pub(crate) fn check_decay_rate(rate: f32) -> std::result::Result<(), String> {
    if rate.is_finite() && rate >= 0.0 {
        Ok(())
    } else {
        Err(format!("decay rate {rate} must be finite and non-negative"))
    }
}

// ---------------------------------------------------------------------------
// Content definitions
// ---------------------------------------------------------------------------

/// One configured stat.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatDefinition {
    /// Unique stat id.
    pub id: String,
    /// Starting base value.
    #[serde(default)]
    pub base: f32,
    /// Lower bound of the effective value.
    #[serde(default)]
    pub min: f32,
    /// Upper bound of the effective value.
    #[serde(default = "default_stat_max")]
    pub max: f32,
    /// Growth rate; stored and persisted, not used by resolution.
    #[serde(default)]
    pub growth_rate: f32,
}

impl StatDefinition {
    /// Convenience constructor used by tests and tools.
    #[must_use]
    pub fn new(id: impl Into<String>, base: f32, min: f32, max: f32) -> Self {
        Self {
            id: id.into(),
            base,
            min,
            max,
            growth_rate: 0.0,
        }
    }
}

/// A named grouping of skills.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillCategoryDefinition {
    /// Unique category id.
    pub id: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
}

/// One configured skill.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillDefinition {
    /// Unique skill id.
    pub id: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Owning category id.
    pub category: String,
    /// Experience needed to go from level 0 to level 1.
    #[serde(default = "default_base_threshold")]
    pub base_threshold: f32,
    /// Factor applied to the threshold after each level.
    #[serde(default = "default_threshold_multiplier")]
    pub threshold_multiplier: f32,
    /// Stat boosts granted per level.
    #[serde(default)]
    pub effects: Vec<SkillEffect>,
    /// Prerequisites checked by gating queries.
    #[serde(default)]
    pub requirements: Vec<SkillRequirement>,
}

impl SkillDefinition {
    /// A skill with default thresholds and no effects or requirements.
    #[must_use]
    pub fn new(id: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            category: category.into(),
            base_threshold: default_base_threshold(),
            threshold_multiplier: default_threshold_multiplier(),
            effects: Vec::new(),
            requirements: Vec::new(),
        }
    }
}

/// One reputation context and the traits tracked within it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReputationContextDefinition {
    /// Unique context id.
    pub id: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Trait ids seeded at 0.
    #[serde(default)]
    pub traits: Vec<String>,
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// General system settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

/// Defaults applied to reputation impacts that omit metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReputationSettings {
    /// Impact units removed per second when an event carries no decay rate.
    #[serde(default = "default_decay_rate")]
    pub default_decay_rate: f32,
    /// Description used when an event carries none.
    #[serde(default = "default_description")]
    pub default_description: String,
}

impl Default for ReputationSettings {
    fn default() -> Self {
        Self {
            default_decay_rate: default_decay_rate(),
            default_description: default_description(),
        }
    }
}

/// Per-step budget enforcement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceConfig {
    /// Soft limit on time spent in one host step, in milliseconds.
    #[serde(default = "default_tick_budget")]
    pub tick_budget_ms: f64,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            tick_budget_ms: default_tick_budget(),
        }
    }
}

/// Persistence / save configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Use WAL mode for concurrent reads.
    #[serde(default = "default_true")]
    pub wal_mode: bool,
    /// Auto-save interval in seconds of game time (0 disables).
    #[serde(default = "default_300")]
    pub auto_save_interval_seconds: u32,
    /// Number of save backups to keep.
    #[serde(default = "default_3")]
    pub backup_count: u32,
    /// Detect save corruption via checksums.
    #[serde(default = "default_true")]
    pub checksum_enabled: bool,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            wal_mode: true,
            auto_save_interval_seconds: 300,
            backup_count: 3,
            checksum_enabled: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Serde default helpers
// ---------------------------------------------------------------------------

fn default_true() -> bool { true }
fn default_log_level() -> String { "info".to_string() }
fn default_description() -> String { "Reputation event".to_string() }
fn default_stat_max() -> f32 { 100.0 }
fn default_base_threshold() -> f32 { 100.0 }
fn default_threshold_multiplier() -> f32 { 1.5 }
fn default_decay_rate() -> f32 { 0.1 }
fn default_tick_budget() -> f64 { 1.0 }
fn default_3() -> u32 { 3 }
fn default_300() -> u32 { 300 }
