//! Skill Registry: experience accumulation and level thresholds.
//!
//! Skills are grouped into categories. Experience accumulates toward the
//! current level's threshold; crossing it consumes the threshold, raises the
//! level and scales the next threshold by the skill's multiplier:
//!
//! ```text
//! threshold 100, multiplier 1.5, grant 250
//!   250 ≥ 100 → level 1, exp 150, threshold 150
//!   150 ≥ 150 → level 2, exp   0, threshold 225
//! ```
//!
//! Requirements are evaluated on demand only; nothing here enforces them.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::{SkillCategoryDefinition, SkillDefinition, check_multiplier, check_threshold};
use crate::error::{AscentError, Result};
use crate::events::{CompleteAction, ProgressionEvent, SkillExperience};
use crate::types::{LevelUp, ModifierKind, usable_delta};

/// Upper bound on level-ups resolved by a single grant.
const LEVEL_UP_LIMIT: u32 = 10_000;

// ---------------------------------------------------------------------------
// Effects & requirements
// ---------------------------------------------------------------------------

/// A stat boost granted per skill level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillEffect {
    /// Stat receiving the boost.
    pub target_stat: String,
    /// Modifier value per level (`level × magnitude`).
    pub magnitude_per_level: f32,
    /// How the boost combines with the stat.
    pub kind: ModifierKind,
}

impl SkillEffect {
    /// Modifier value at `level`.
    #[must_use]
    pub fn value_at(&self, level: u32) -> f32 {
        self.magnitude_per_level * level as f32
    }
}

/// What a requirement checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequirementKind {
    /// Another skill must be at least `required_value`.
    SkillLevel,
    /// A stat's current value must be at least `required_value`.
    StatMinimum,
    /// An action must have been completed at least `required_value` times
    /// (at least once when the value is below 1).
    CompletedAction,
}

/// A prerequisite for learning or using a skill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillRequirement {
    /// Requirement type.
    pub kind: RequirementKind,
    /// Skill, stat or action id.
    pub target_id: String,
    /// Threshold to meet.
    pub required_value: f32,
}

/// Cross-registry lookups needed by `StatMinimum` and `CompletedAction`
/// requirements. The coordinator implements this over its own state.
pub trait RequirementContext {
    /// Current value of a stat, `0.0` if unknown.
    fn stat_current(&self, stat_id: &str) -> f32;
    /// How many times an action has been completed.
    fn completed_action_count(&self, action_id: &str) -> u32;
}

// ---------------------------------------------------------------------------
// Skills
// ---------------------------------------------------------------------------

/// A single skill and its progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Skill {
    /// Skill id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Current level, starting at 0.
    pub level: u32,
    /// Progress toward the next level; `0 ≤ experience < next_level_threshold`.
    pub experience: f32,
    /// Experience required to leave the current level.
    pub next_level_threshold: f32,
    /// Threshold growth factor applied per level.
    pub threshold_multiplier: f32,
    /// Per-level stat boosts.
    pub effects: Vec<SkillEffect>,
    /// Gating prerequisites.
    pub requirements: Vec<SkillRequirement>,
    /// Registry clock (seconds) at the last experience grant.
    pub last_practiced: Option<f64>,
}

impl Skill {
    /// Fresh level-0 skill from its definition.
    #[must_use]
    pub fn from_definition(def: &SkillDefinition) -> Self {
        Self {
            id: def.id.clone(),
            name: if def.name.is_empty() { def.id.clone() } else { def.name.clone() },
            level: 0,
            experience: 0.0,
            next_level_threshold: def.base_threshold,
            threshold_multiplier: def.threshold_multiplier,
            effects: def.effects.clone(),
            requirements: def.requirements.clone(),
            last_practiced: None,
        }
    }
}

/// A named group of skills.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillCategory {
    /// Category id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Skills in configuration order.
    pub skills: Vec<Skill>,
}

/// Owns every skill category and skill, plus the skill → category index.
#[derive(Debug, Clone, Default)]
pub struct SkillRegistry {
    categories: Vec<SkillCategory>,
    /// skill id → (category position, skill position).
    index: HashMap<String, (usize, usize)>,
    clock: f64,
}

impl SkillRegistry {
    /// Build the category tree from configuration.
    ///
    /// # Errors
    /// Duplicate ids, unknown categories or invalid thresholds.
    pub fn new(
        categories: &[SkillCategoryDefinition],
        skills: &[SkillDefinition],
    ) -> Result<Self> {
        let mut registry = Self::default();
        registry.initialize(categories, skills)?;
        Ok(registry)
    }

    /// Replace all skills with fresh level-0 skills built from configuration.
    ///
    /// # Errors
    /// See [`SkillRegistry::new`]. On error the registry is left unchanged.
    pub fn initialize(
        &mut self,
        categories: &[SkillCategoryDefinition],
        skills: &[SkillDefinition],
    ) -> Result<()> {
        let mut tree: Vec<SkillCategory> = Vec::with_capacity(categories.len());
        for def in categories {
            if tree.iter().any(|c| c.id == def.id) {
                return Err(AscentError::DuplicateId {
                    kind: "skill category",
                    id: def.id.clone(),
                });
            }
            tree.push(SkillCategory {
                id: def.id.clone(),
                name: if def.name.is_empty() { def.id.clone() } else { def.name.clone() },
                skills: Vec::new(),
            });
        }

        for def in skills {
            check_threshold(&def.id, def.base_threshold).map_err(AscentError::Config)?;
            check_multiplier(&def.id, def.threshold_multiplier).map_err(AscentError::Config)?;
            let Some(category) = tree.iter_mut().find(|c| c.id == def.category) else {
                return Err(AscentError::UnknownCategory {
                    skill: def.id.clone(),
                    category: def.category.clone(),
                });
            };
            category.skills.push(Skill::from_definition(def));
        }

        let index = build_index(&tree).map_err(|id| AscentError::DuplicateId { kind: "skill", id })?;
        self.categories = tree;
        self.index = index;
        self.clock = 0.0;
        debug!(
            categories = self.categories.len(),
            skills = self.index.len(),
            "Skill registry initialised"
        );
        Ok(())
    }

    /// Rebuild a registry from restored categories.
    ///
    /// # Errors
    /// Returns `AscentError::InvalidSaveData` for duplicate ids or invalid
    /// thresholds.
    pub fn from_categories(categories: Vec<SkillCategory>, clock: f64) -> Result<Self> {
        let mut seen = std::collections::HashSet::new();
        for category in &categories {
            if !seen.insert(category.id.as_str()) {
                return Err(AscentError::InvalidSaveData(format!(
                    "duplicate skill category {}",
                    category.id
                )));
            }
            for skill in &category.skills {
                check_threshold(&skill.id, skill.next_level_threshold)
                    .map_err(AscentError::InvalidSaveData)?;
                check_multiplier(&skill.id, skill.threshold_multiplier)
                    .map_err(AscentError::InvalidSaveData)?;
                if !skill.experience.is_finite() {
                    return Err(AscentError::InvalidSaveData(format!(
                        "skill {} has non-finite experience",
                        skill.id
                    )));
                }
            }
        }
        let index = build_index(&categories)
            .map_err(|id| AscentError::InvalidSaveData(format!("duplicate skill id {id}")))?;
        Ok(Self {
            categories,
            index,
            clock: if clock.is_finite() { clock } else { 0.0 },
        })
    }

    /// Advance the registry clock.
    pub fn tick(&mut self, delta: f32) {
        if usable_delta(delta, "skills") {
            self.clock += f64::from(delta);
        }
    }

    /// Seconds the registry has been ticked.
    #[must_use]
    pub fn clock(&self) -> f64 {
        self.clock
    }

    /// Grant experience, resolving as many level-ups as it pays for.
    ///
    /// Unknown skills, negative and non-finite amounts are no-ops.
    pub fn add_experience(&mut self, skill_id: &str, amount: f32) -> Option<LevelUp> {
        if !amount.is_finite() || amount < 0.0 {
            warn!(skill = %skill_id, amount, "Rejected experience grant");
            return None;
        }
        let clock = self.clock;
        let Some(skill) = self.skill_mut(skill_id) else {
            debug!(skill = %skill_id, "Experience for unknown skill ignored");
            return None;
        };

        skill.experience += amount;
        skill.last_practiced = Some(clock);

        let from_level = skill.level;
        let mut steps = 0;
        while skill.experience >= skill.next_level_threshold {
            if steps == LEVEL_UP_LIMIT {
                warn!(skill = %skill.id, level = skill.level, "Level-up limit reached; discarding excess experience");
                skill.experience = 0.0;
                break;
            }
            skill.experience -= skill.next_level_threshold;
            skill.level = skill.level.saturating_add(1);
            skill.next_level_threshold *= skill.threshold_multiplier;
            steps += 1;
        }

        if skill.level == from_level {
            return None;
        }
        info!(skill = %skill.id, from = from_level, to = skill.level, "Skill levelled up");
        Some(LevelUp {
            skill_id: skill.id.clone(),
            from_level,
            to_level: skill.level,
        })
    }

    /// Overwrite experience without any level-up check.
    ///
    /// Exists to undo a previous [`SkillRegistry::add_experience`]; the
    /// resulting state is not guaranteed to satisfy the threshold invariant.
    pub fn set_experience(&mut self, skill_id: &str, value: f32) -> bool {
        if !value.is_finite() {
            return false;
        }
        match self.skill_mut(skill_id) {
            Some(skill) => {
                skill.experience = value;
                true
            }
            None => false,
        }
    }

    /// Route skill-related events. Other variants are ignored.
    pub fn process_event(&mut self, event: &ProgressionEvent) -> Vec<LevelUp> {
        match event {
            ProgressionEvent::SkillExperience(SkillExperience {
                skill_id,
                experience_amount,
            }) => self.add_experience(skill_id, *experience_amount).into_iter().collect(),
            ProgressionEvent::CompleteAction(CompleteAction { relevant_skills, .. }) => relevant_skills
                .iter()
                .filter_map(|(skill_id, amount)| self.add_experience(skill_id, *amount))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Current level, 0 for unknown skills.
    #[must_use]
    pub fn skill_level(&self, skill_id: &str) -> u32 {
        self.skill(skill_id).map_or(0, |s| s.level)
    }

    /// Current experience, 0 for unknown skills.
    #[must_use]
    pub fn skill_experience(&self, skill_id: &str) -> f32 {
        self.skill(skill_id).map_or(0.0, |s| s.experience)
    }

    /// Seconds since the skill last gained experience.
    #[must_use]
    pub fn seconds_since_practice(&self, skill_id: &str) -> Option<f64> {
        let last = self.skill(skill_id)?.last_practiced?;
        Some((self.clock - last).max(0.0))
    }

    /// Evaluate requirements in isolation.
    ///
    /// `SkillLevel` requirements are checked against this registry;
    /// `StatMinimum` and `CompletedAction` need other registries and pass.
    /// Unknown skills have nothing to unlock and return `false`.
    #[must_use]
    pub fn check_requirements(&self, skill_id: &str) -> bool {
        self.evaluate_requirements(skill_id, None)
    }

    /// Evaluate every requirement, resolving cross-registry kinds through
    /// `context`.
    #[must_use]
    pub fn check_requirements_with(&self, skill_id: &str, context: &dyn RequirementContext) -> bool {
        self.evaluate_requirements(skill_id, Some(context))
    }

    fn evaluate_requirements(&self, skill_id: &str, context: Option<&dyn RequirementContext>) -> bool {
        let Some(skill) = self.skill(skill_id) else {
            return false;
        };
        skill.requirements.iter().all(|req| match req.kind {
            RequirementKind::SkillLevel => self.skill_level(&req.target_id) as f32 >= req.required_value,
            RequirementKind::StatMinimum => {
                context.is_none_or(|ctx| ctx.stat_current(&req.target_id) >= req.required_value)
            }
            RequirementKind::CompletedAction => context.is_none_or(|ctx| {
                f64::from(ctx.completed_action_count(&req.target_id))
                    >= f64::from(req.required_value.max(1.0))
            }),
        })
    }

    /// Borrow a skill.
    #[must_use]
    pub fn skill(&self, skill_id: &str) -> Option<&Skill> {
        let &(c, s) = self.index.get(skill_id)?;
        self.categories.get(c)?.skills.get(s)
    }

    /// Category id owning a skill.
    #[must_use]
    pub fn category_of(&self, skill_id: &str) -> Option<&str> {
        let &(c, _) = self.index.get(skill_id)?;
        self.categories.get(c).map(|cat| cat.id.as_str())
    }

    /// Skills of one category (empty for unknown categories).
    #[must_use]
    pub fn skills_in_category(&self, category_id: &str) -> &[Skill] {
        self.categories
            .iter()
            .find(|c| c.id == category_id)
            .map_or(&[], |c| c.skills.as_slice())
    }

    /// All categories in configuration order.
    pub fn categories(&self) -> impl Iterator<Item = &SkillCategory> {
        self.categories.iter()
    }

    /// Total number of skills.
    #[must_use]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Whether no skills are configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    fn skill_mut(&mut self, skill_id: &str) -> Option<&mut Skill> {
        let &(c, s) = self.index.get(skill_id)?;
        self.categories.get_mut(c)?.skills.get_mut(s)
    }
}

fn build_index(
    categories: &[SkillCategory],
) -> std::result::Result<HashMap<String, (usize, usize)>, String> {
    let mut index = HashMap::new();
    for (c, category) in categories.iter().enumerate() {
        for (s, skill) in category.skills.iter().enumerate() {
            if index.insert(skill.id.clone(), (c, s)).is_some() {
                return Err(skill.id.clone());
            }
        }
    }
    Ok(index)
}
