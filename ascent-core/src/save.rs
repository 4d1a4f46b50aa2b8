//! Save documents: the persisted shape of one player's progression.
//!
//! The layout is camelCase JSON. Only dynamic state is stored; static skill
//! content (threshold multiplier, effects, requirements) is re-read from the
//! configuration on restore so content patches apply to old saves.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{AscentConfig, SkillDefinition};
use crate::error::{AscentError, Result};
use crate::reputation::{Reputation, ReputationEvent};
use crate::skills::{Skill, SkillCategory};
use crate::stats::Stat;
use crate::types::StatModifier;

/// Full progression state of one player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveData {
    /// Owning player.
    pub player_id: String,
    /// Wall-clock time the document was generated (metadata only).
    pub saved_at: DateTime<Utc>,
    /// Engine clock in seconds.
    #[serde(default)]
    pub clock: f64,
    /// Every stat with its modifier stack.
    pub stats: Vec<StatSave>,
    /// Skills grouped by category.
    pub skill_categories: Vec<SkillCategorySave>,
    /// Every reputation context with its live events.
    pub reputations: Vec<ReputationSave>,
    /// Action id → completion count.
    #[serde(default)]
    pub completed_actions: BTreeMap<String, u32>,
}

impl SaveData {
    /// Encode as JSON bytes.
    ///
    /// # Errors
    /// Returns `AscentError::Serialization` if encoding fails.
    pub fn to_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| AscentError::Serialization(e.to_string()))
    }

    /// Decode from JSON bytes.
    ///
    /// # Errors
    /// Returns `AscentError::InvalidSaveData` if the document does not parse.
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| AscentError::InvalidSaveData(e.to_string()))
    }
}

/// Persisted stat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatSave {
    /// Stat id.
    pub stat_id: String,
    /// Authoritative base value.
    pub base_value: f32,
    /// Effective value at save time (recomputed on load).
    pub current_value: f32,
    /// Lower bound.
    pub min: f32,
    /// Upper bound.
    pub max: f32,
    /// Stored growth rate.
    #[serde(default)]
    pub growth_rate: f32,
    /// Modifier stack in insertion order.
    #[serde(default)]
    pub modifiers: Vec<StatModifier>,
}

impl From<&Stat> for StatSave {
    fn from(stat: &Stat) -> Self {
        Self {
            stat_id: stat.id.clone(),
            base_value: stat.base_value,
            current_value: stat.current_value,
            min: stat.min_value,
            max: stat.max_value,
            growth_rate: stat.growth_rate,
            modifiers: stat.modifiers.clone(),
        }
    }
}

impl From<StatSave> for Stat {
    fn from(save: StatSave) -> Self {
        Self {
            id: save.stat_id,
            base_value: save.base_value,
            current_value: save.current_value,
            min_value: save.min,
            max_value: save.max,
            growth_rate: save.growth_rate,
            modifiers: save.modifiers,
        }
    }
}

/// Persisted skill category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillCategorySave {
    /// Category id.
    pub category_id: String,
    /// Display name.
    #[serde(default)]
    pub category_name: String,
    /// Skills of the category.
    #[serde(default)]
    pub skills: Vec<SkillSave>,
}

impl SkillCategorySave {
    /// Rebuild the category, pulling static skill content from `config`.
    #[must_use]
    pub fn into_category(self, config: &AscentConfig) -> SkillCategory {
        SkillCategory {
            id: self.category_id,
            name: self.category_name,
            skills: self
                .skills
                .into_iter()
                .map(|s| {
                    let def = config.skills.iter().find(|d| d.id == s.skill_id);
                    s.into_skill(def)
                })
                .collect(),
        }
    }
}

impl From<&SkillCategory> for SkillCategorySave {
    fn from(category: &SkillCategory) -> Self {
        Self {
            category_id: category.id.clone(),
            category_name: category.name.clone(),
            skills: category.skills.iter().map(SkillSave::from).collect(),
        }
    }
}

/// Persisted skill progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillSave {
    /// Skill id.
    pub skill_id: String,
    /// Display name.
    #[serde(default)]
    pub skill_name: String,
    /// Level.
    pub level: u32,
    /// Progress toward the next level.
    pub experience: f32,
    /// Experience required to leave the current level.
    pub next_level_threshold: f32,
    /// Engine clock of the last experience grant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_practiced: Option<f64>,
}

impl SkillSave {
    /// Rebuild the skill. A skill no longer in the configuration keeps its
    /// progress with default growth and no effects.
    #[must_use]
    pub fn into_skill(self, def: Option<&SkillDefinition>) -> Skill {
        let template = def.map_or_else(
            || SkillDefinition::new(self.skill_id.clone(), String::new()),
            Clone::clone,
        );
        Skill {
            id: self.skill_id,
            name: self.skill_name,
            level: self.level,
            experience: self.experience,
            next_level_threshold: self.next_level_threshold,
            threshold_multiplier: template.threshold_multiplier,
            effects: template.effects,
            requirements: template.requirements,
            last_practiced: self.last_practiced,
        }
    }
}

impl From<&Skill> for SkillSave {
    fn from(skill: &Skill) -> Self {
        Self {
            skill_id: skill.id.clone(),
            skill_name: skill.name.clone(),
            level: skill.level,
            experience: skill.experience,
            next_level_threshold: skill.next_level_threshold,
            last_practiced: skill.last_practiced,
        }
    }
}

/// Persisted reputation context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReputationSave {
    /// Context id.
    pub context_id: String,
    /// Display name.
    #[serde(default)]
    pub context_name: String,
    /// Overall score at save time (recomputed on load).
    #[serde(default)]
    pub overall_score: f32,
    /// Trait scores at save time.
    #[serde(default)]
    pub trait_scores: Vec<TraitScoreSave>,
    /// Live events.
    #[serde(default)]
    pub recent_events: Vec<ReputationEventSave>,
}

/// One trait score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraitScoreSave {
    /// Trait id.
    pub trait_id: String,
    /// Score.
    pub score: f32,
}

/// One live reputation event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReputationEventSave {
    /// Event id.
    pub event_id: String,
    /// Description.
    #[serde(default)]
    pub description: String,
    /// Engine clock when recorded.
    #[serde(default)]
    pub timestamp: f64,
    /// Decay per second.
    pub decay_rate: f32,
    /// Remaining impacts.
    #[serde(default)]
    pub impacts: Vec<TraitImpactSave>,
}

/// One remaining trait impact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraitImpactSave {
    /// Trait id.
    pub trait_id: String,
    /// Remaining signed impact.
    pub impact: f32,
}

impl From<&Reputation> for ReputationSave {
    fn from(rep: &Reputation) -> Self {
        Self {
            context_id: rep.context_id.clone(),
            context_name: rep.name.clone(),
            overall_score: rep.overall_score,
            trait_scores: rep
                .trait_scores
                .iter()
                .map(|(trait_id, &score)| TraitScoreSave {
                    trait_id: trait_id.clone(),
                    score,
                })
                .collect(),
            recent_events: rep
                .recent_events
                .iter()
                .map(|e| ReputationEventSave {
                    event_id: e.event_id.clone(),
                    description: e.description.clone(),
                    timestamp: e.timestamp,
                    decay_rate: e.decay_rate,
                    impacts: e
                        .trait_impacts
                        .iter()
                        .map(|(trait_id, &impact)| TraitImpactSave {
                            trait_id: trait_id.clone(),
                            impact,
                        })
                        .collect(),
                })
                .collect(),
        }
    }
}

impl From<ReputationSave> for Reputation {
    fn from(save: ReputationSave) -> Self {
        Self {
            context_id: save.context_id,
            name: save.context_name,
            overall_score: save.overall_score,
            trait_scores: save
                .trait_scores
                .into_iter()
                .map(|t| (t.trait_id, t.score))
                .collect(),
            recent_events: save
                .recent_events
                .into_iter()
                .map(|e| ReputationEvent {
                    event_id: e.event_id,
                    description: e.description,
                    trait_impacts: e.impacts.into_iter().map(|i| (i.trait_id, i.impact)).collect(),
                    timestamp: e.timestamp,
                    decay_rate: e.decay_rate,
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ModifierKind;

    #[test]
    fn layout_uses_camel_case_keys() {
        let data = SaveData {
            player_id: "p1".to_string(),
            saved_at: Utc::now(),
            clock: 12.5,
            stats: vec![StatSave {
                stat_id: "strength".to_string(),
                base_value: 10.0,
                current_value: 15.0,
                min: 0.0,
                max: 100.0,
                growth_rate: 0.0,
                modifiers: vec![StatModifier::new("potion", 5.0, ModifierKind::Additive, 3.0)],
            }],
            skill_categories: vec![SkillCategorySave {
                category_id: "combat".to_string(),
                category_name: "Combat".to_string(),
                skills: vec![SkillSave {
                    skill_id: "swords".to_string(),
                    skill_name: "Swords".to_string(),
                    level: 2,
                    experience: 10.0,
                    next_level_threshold: 225.0,
                    last_practiced: None,
                }],
            }],
            reputations: Vec::new(),
            completed_actions: BTreeMap::from([("duel".to_string(), 3)]),
        };
        let json = String::from_utf8(data.to_json().expect("encode")).expect("utf8");
        for key in [
            "playerId",
            "savedAt",
            "statId",
            "baseValue",
            "currentValue",
            "remainingTime",
            "skillCategories",
            "nextLevelThreshold",
            "completedActions",
        ] {
            assert!(json.contains(key), "missing {key}");
        }
        assert!(!json.contains("lastPracticed"));
        assert_eq!(SaveData::from_json(json.as_bytes()).expect("decode"), data);
    }

    #[test]
    fn garbage_is_invalid_save_data() {
        assert!(matches!(
            SaveData::from_json(b"{\"playerId\": 4"),
            Err(AscentError::InvalidSaveData(_))
        ));
    }

    #[test]
    fn skill_restore_takes_static_content_from_definition() {
        let mut def = SkillDefinition::new("swords", "combat");
        def.threshold_multiplier = 2.0;
        let save = SkillSave {
            skill_id: "swords".to_string(),
            skill_name: "Swords".to_string(),
            level: 3,
            experience: 1.0,
            next_level_threshold: 800.0,
            last_practiced: Some(4.0),
        };
        let skill = save.clone().into_skill(Some(&def));
        assert!((skill.threshold_multiplier - 2.0).abs() < f32::EPSILON);
        assert_eq!(skill.level, 3);

        let orphan = save.into_skill(None);
        assert!((orphan.threshold_multiplier - 1.5).abs() < f32::EPSILON);
        assert!(orphan.effects.is_empty());
    }

    #[test]
    fn reputation_event_impacts_flatten_to_list() {
        let mut rep = Reputation {
            context_id: "guild".to_string(),
            name: "Guild".to_string(),
            overall_score: 0.0,
            trait_scores: BTreeMap::new(),
            recent_events: vec![ReputationEvent::new(
                "e1",
                "Paid debts",
                BTreeMap::from([("honesty".to_string(), 3.0), ("thrift".to_string(), -1.0)]),
                1.0,
                0.5,
            )],
        };
        rep.recompute();
        let save = ReputationSave::from(&rep);
        assert_eq!(save.recent_events[0].impacts.len(), 2);
        assert_eq!(save.trait_scores.len(), 2);
        assert_eq!(Reputation::from(save), rep);
    }
}
