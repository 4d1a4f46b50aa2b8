//! Inbound progression events.
//!
//! Events arrive from the host's event bus as adjacently tagged JSON:
//!
//! ```json
//! {"type": "SkillExperience", "params": {"skillId": "swords", "experienceAmount": 40}}
//! ```
//!
//! Every variant carries one typed payload. Decoding or validation failures
//! surface as [`AscentError::MalformedEvent`]; the coordinator logs and drops
//! them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{AscentError, Result};
use crate::reputation::ReputationEvent;
use crate::types::StatModifier;

/// The closed set of events the engine understands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "params")]
pub enum ProgressionEvent {
    /// Permanent base change and/or a new modifier on one stat.
    StatChange(StatChange),
    /// Experience for a single skill.
    SkillExperience(SkillExperience),
    /// A reputation event within one context.
    ReputationImpact(ReputationImpact),
    /// A completed action, training several skills at once.
    CompleteAction(CompleteAction),
    /// Passed through to the host untouched.
    UnlockAchievement(UnlockAchievement),
}

/// Payload of [`ProgressionEvent::StatChange`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatChange {
    /// Target stat.
    pub stat_id: String,
    /// Permanent delta applied to the base value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_value_change: Option<f32>,
    /// Modifier appended to the stat.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modifier: Option<StatModifier>,
    /// Remove every modifier from this source before anything else applies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remove_source: Option<String>,
}

/// Payload of [`ProgressionEvent::SkillExperience`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillExperience {
    /// Target skill.
    pub skill_id: String,
    /// Experience granted.
    pub experience_amount: f32,
}

/// Payload of [`ProgressionEvent::ReputationImpact`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReputationImpact {
    /// Target context.
    pub context_id: String,
    /// Either a fully built event or raw trait impacts.
    #[serde(flatten)]
    pub source: ImpactSource,
}

/// The two accepted shapes of a reputation impact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ImpactSource {
    /// `{"reputationEvent": {...}}`
    Prebuilt(PrebuiltImpact),
    /// `{"traitImpacts": {...}, "eventId"?, "description"?, "decayRate"?}`
    Traits(TraitImpacts),
}

/// A reputation event built by the producer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrebuiltImpact {
    /// The event, added as-is.
    pub reputation_event: ReputationEvent,
}

/// Raw trait impacts; missing metadata is filled from configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraitImpacts {
    /// Trait id → signed impact.
    pub trait_impacts: BTreeMap<String, f32>,
    /// Defaults to a fresh UUID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
    /// Defaults to the configured generic description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Defaults to the configured decay rate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decay_rate: Option<f32>,
}

/// Payload of [`ProgressionEvent::CompleteAction`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteAction {
    /// Action identifier, counted in the action history.
    pub action_id: String,
    /// Skill id → experience.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub relevant_skills: BTreeMap<String, f32>,
    /// Optional reputation consequence of the action.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reputation_impact: Option<ReputationImpact>,
}

/// Payload of [`ProgressionEvent::UnlockAchievement`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnlockAchievement {
    /// Host-defined achievement id.
    pub achievement_id: String,
}

impl ProgressionEvent {
    /// Experience for one skill.
    #[must_use]
    pub fn skill_experience(skill_id: impl Into<String>, amount: f32) -> Self {
        Self::SkillExperience(SkillExperience {
            skill_id: skill_id.into(),
            experience_amount: amount,
        })
    }

    /// A new modifier on one stat.
    #[must_use]
    pub fn stat_modifier(stat_id: impl Into<String>, modifier: StatModifier) -> Self {
        Self::StatChange(StatChange {
            stat_id: stat_id.into(),
            base_value_change: None,
            modifier: Some(modifier),
            remove_source: None,
        })
    }

    /// Take off every modifier a source put on one stat (unequip, dispel).
    #[must_use]
    pub fn remove_modifiers(stat_id: impl Into<String>, source: impl Into<String>) -> Self {
        Self::StatChange(StatChange {
            stat_id: stat_id.into(),
            base_value_change: None,
            modifier: None,
            remove_source: Some(source.into()),
        })
    }

    /// A permanent change to a stat's base value.
    #[must_use]
    pub fn base_change(stat_id: impl Into<String>, delta: f32) -> Self {
        Self::StatChange(StatChange {
            stat_id: stat_id.into(),
            base_value_change: Some(delta),
            modifier: None,
            remove_source: None,
        })
    }

    /// Raw trait impacts within a context, using configured defaults.
    #[must_use]
    pub fn reputation(context_id: impl Into<String>, impacts: BTreeMap<String, f32>) -> Self {
        Self::ReputationImpact(ReputationImpact {
            context_id: context_id.into(),
            source: ImpactSource::Traits(TraitImpacts {
                trait_impacts: impacts,
                ..TraitImpacts::default()
            }),
        })
    }

    /// Variant name, as used in the wire `type` field.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::StatChange(_) => "StatChange",
            Self::SkillExperience(_) => "SkillExperience",
            Self::ReputationImpact(_) => "ReputationImpact",
            Self::CompleteAction(_) => "CompleteAction",
            Self::UnlockAchievement(_) => "UnlockAchievement",
        }
    }

    /// Decode and validate a wire event.
    ///
    /// # Errors
    /// Returns `AscentError::MalformedEvent` for undecodable JSON or
    /// unusable values.
    pub fn from_json(json: &str) -> Result<Self> {
        let event: Self =
            serde_json::from_str(json).map_err(|e| AscentError::MalformedEvent(e.to_string()))?;
        event.validate()?;
        Ok(event)
    }

    /// Encode to the wire format.
    ///
    /// # Errors
    /// Returns `AscentError::Serialization` if encoding fails.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| AscentError::Serialization(e.to_string()))
    }

    /// Reject empty ids and non-finite numbers.
    ///
    /// # Errors
    /// Returns `AscentError::MalformedEvent` describing the first problem.
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::StatChange(change) => {
                require_id("statId", &change.stat_id)?;
                if let Some(source) = &change.remove_source {
                    require_id("removeSource", source)?;
                }
                if let Some(delta) = change.base_value_change {
                    require_finite("baseValueChange", delta)?;
                }
                if let Some(modifier) = &change.modifier {
                    require_finite("modifier.value", modifier.value)?;
                    require_finite("modifier.duration", modifier.duration)?;
                    require_finite("modifier.remainingTime", modifier.remaining_time)?;
                }
                Ok(())
            }
            Self::SkillExperience(grant) => {
                require_id("skillId", &grant.skill_id)?;
                require_finite("experienceAmount", grant.experience_amount)
            }
            Self::ReputationImpact(impact) => impact.validate(),
            Self::CompleteAction(action) => {
                require_id("actionId", &action.action_id)?;
                for (skill_id, amount) in &action.relevant_skills {
                    require_id("relevantSkills", skill_id)?;
                    require_finite("relevantSkills", *amount)?;
                }
                if let Some(impact) = &action.reputation_impact {
                    impact.validate()?;
                }
                Ok(())
            }
            Self::UnlockAchievement(unlock) => require_id("achievementId", &unlock.achievement_id),
        }
    }
}

impl ReputationImpact {
    fn validate(&self) -> Result<()> {
        require_id("contextId", &self.context_id)?;
        let (impacts, decay_rate) = match &self.source {
            ImpactSource::Prebuilt(p) => (
                &p.reputation_event.trait_impacts,
                Some(p.reputation_event.decay_rate),
            ),
            ImpactSource::Traits(t) => (&t.trait_impacts, t.decay_rate),
        };
        for (trait_id, impact) in impacts {
            require_id("traitImpacts", trait_id)?;
            require_finite("traitImpacts", *impact)?;
        }
        match decay_rate {
            Some(rate) if !rate.is_finite() || rate < 0.0 => Err(AscentError::MalformedEvent(
                format!("decayRate {rate} must be finite and non-negative"),
            )),
            _ => Ok(()),
        }
    }
}

fn require_id(field: &str, id: &str) -> Result<()> {
    if id.trim().is_empty() {
        Err(AscentError::MalformedEvent(format!("{field} is empty")))
    } else {
        Ok(())
    }
}

fn require_finite(field: &str, value: f32) -> Result<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(AscentError::MalformedEvent(format!("{field} is not finite")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ModifierKind;

    #[test]
    fn decodes_skill_experience() {
        let json = r#"{"type":"SkillExperience","params":{"skillId":"swords","experienceAmount":40}}"#;
        let event = ProgressionEvent::from_json(json).expect("decode");
        assert_eq!(event, ProgressionEvent::skill_experience("swords", 40.0));
        assert_eq!(event.kind(), "SkillExperience");
    }

    #[test]
    fn decodes_stat_change_with_modifier() {
        let json = r#"{
            "type": "StatChange",
            "params": {
                "statId": "strength",
                "modifier": {"source": "potion", "value": 5, "kind": "Additive", "duration": 30}
            }
        }"#;
        let ProgressionEvent::StatChange(change) = ProgressionEvent::from_json(json).expect("decode")
        else {
            panic!("wrong variant");
        };
        assert_eq!(change.stat_id, "strength");
        assert!(change.base_value_change.is_none());
        let modifier = change.modifier.expect("modifier");
        assert_eq!(modifier.kind, ModifierKind::Additive);
        assert!((modifier.remaining_time - 30.0).abs() < f32::EPSILON);
    }

    #[test]
    fn decodes_raw_trait_impacts() {
        let json = r#"{
            "type": "ReputationImpact",
            "params": {"contextId": "guild", "traitImpacts": {"honesty": 10}, "decayRate": 1.0}
        }"#;
        let ProgressionEvent::ReputationImpact(impact) = ProgressionEvent::from_json(json).expect("decode")
        else {
            panic!("wrong variant");
        };
        assert_eq!(impact.context_id, "guild");
        let ImpactSource::Traits(traits) = impact.source else {
            panic!("expected raw traits");
        };
        assert!((traits.trait_impacts["honesty"] - 10.0).abs() < f32::EPSILON);
        assert_eq!(traits.decay_rate, Some(1.0));
        assert!(traits.event_id.is_none());
    }

    #[test]
    fn decodes_prebuilt_reputation_event() {
        let json = r#"{
            "type": "ReputationImpact",
            "params": {
                "contextId": "guild",
                "reputationEvent": {
                    "eventId": "rescue-1",
                    "description": "Rescued a caravan",
                    "traitImpacts": {"valor": 4.5},
                    "timestamp": 12.0,
                    "decayRate": 0.5
                }
            }
        }"#;
        let ProgressionEvent::ReputationImpact(impact) = ProgressionEvent::from_json(json).expect("decode")
        else {
            panic!("wrong variant");
        };
        let ImpactSource::Prebuilt(prebuilt) = impact.source else {
            panic!("expected prebuilt event");
        };
        assert_eq!(prebuilt.reputation_event.event_id, "rescue-1");
        assert!((prebuilt.reputation_event.decay_rate - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn decodes_complete_action_with_reputation() {
        let json = r#"{
            "type": "CompleteAction",
            "params": {
                "actionId": "deliver_goods",
                "relevantSkills": {"trading": 25, "athletics": 5},
                "reputationImpact": {"contextId": "guild", "traitImpacts": {"honesty": 2}}
            }
        }"#;
        let ProgressionEvent::CompleteAction(action) = ProgressionEvent::from_json(json).expect("decode")
        else {
            panic!("wrong variant");
        };
        assert_eq!(action.relevant_skills.len(), 2);
        assert_eq!(action.reputation_impact.expect("impact").context_id, "guild");
    }

    #[test]
    fn complete_action_skills_are_optional() {
        let json = r#"{"type":"CompleteAction","params":{"actionId":"wave"}}"#;
        let ProgressionEvent::CompleteAction(action) = ProgressionEvent::from_json(json).expect("decode")
        else {
            panic!("wrong variant");
        };
        assert!(action.relevant_skills.is_empty());
        assert!(action.reputation_impact.is_none());
    }

    #[test]
    fn missing_required_field_is_malformed() {
        let json = r#"{"type":"SkillExperience","params":{"skillId":"swords"}}"#;
        assert!(matches!(
            ProgressionEvent::from_json(json),
            Err(AscentError::MalformedEvent(_))
        ));
    }

    #[test]
    fn unknown_variant_is_malformed() {
        let json = r#"{"type":"Teleport","params":{}}"#;
        assert!(matches!(
            ProgressionEvent::from_json(json),
            Err(AscentError::MalformedEvent(_))
        ));
    }

    #[test]
    fn empty_ids_fail_validation() {
        let event = ProgressionEvent::skill_experience("  ", 5.0);
        assert!(event.validate().is_err());
        let unlock = ProgressionEvent::UnlockAchievement(UnlockAchievement {
            achievement_id: String::new(),
        });
        assert!(unlock.validate().is_err());
    }

    #[test]
    fn non_finite_amounts_fail_validation() {
        assert!(ProgressionEvent::skill_experience("swords", f32::NAN).validate().is_err());
        assert!(ProgressionEvent::base_change("hp", f32::INFINITY).validate().is_err());
    }

    #[test]
    fn negative_decay_rate_fails_validation() {
        let event = ProgressionEvent::ReputationImpact(ReputationImpact {
            context_id: "guild".to_string(),
            source: ImpactSource::Traits(TraitImpacts {
                trait_impacts: BTreeMap::from([("honesty".to_string(), 1.0)]),
                decay_rate: Some(-1.0),
                ..TraitImpacts::default()
            }),
        });
        assert!(event.validate().is_err());
    }

    #[test]
    fn encodes_adjacently_tagged() {
        let event = ProgressionEvent::UnlockAchievement(UnlockAchievement {
            achievement_id: "first_blood".to_string(),
        });
        let json = event.to_json().expect("encode");
        assert_eq!(json, r#"{"type":"UnlockAchievement","params":{"achievementId":"first_blood"}}"#);
    }

    #[test]
    fn reputation_helper_encodes_trait_shape() {
        let event = ProgressionEvent::reputation(
            "guild",
            BTreeMap::from([("honesty".to_string(), 3.0)]),
        );
        let json = event.to_json().expect("encode");
        assert!(json.contains(r#""traitImpacts":{"honesty":3.0}"#));
        assert!(!json.contains("eventId"));
        assert_eq!(ProgressionEvent::from_json(&json).expect("decode"), event);
    }
}
