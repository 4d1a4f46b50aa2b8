//! Integration hooks for the host game's own systems.
//!
//! Each hook turns a gameplay occurrence (combat, crafting, trading, buffs,
//! quests) into a [`ProgressionEvent`] ready for an [`EventSender`].
//!
//! [`EventSender`]: crate::queue::EventSender

use std::collections::BTreeMap;

use ascent_core::events::{
    CompleteAction, ImpactSource, ProgressionEvent, ReputationImpact, TraitImpacts,
    UnlockAchievement,
};
use ascent_core::types::{ModifierKind, StatModifier};

/// Experience from defeating an enemy, credited to the weapon skill used.
#[must_use]
pub fn on_enemy_defeated(weapon_skill: &str, enemy_level: u32, xp_per_level: f32) -> ProgressionEvent {
    ProgressionEvent::skill_experience(weapon_skill, enemy_level.max(1) as f32 * xp_per_level)
}

/// Experience from practising a skill directly (training dummy, reading).
#[must_use]
pub fn on_training(skill_id: &str, amount: f32) -> ProgressionEvent {
    ProgressionEvent::skill_experience(skill_id, amount)
}

/// A timed buff or debuff from a consumable or spell.
#[must_use]
pub fn on_buff(
    stat_id: &str,
    source: &str,
    value: f32,
    kind: ModifierKind,
    duration_secs: f32,
) -> ProgressionEvent {
    ProgressionEvent::stat_modifier(stat_id, StatModifier::new(source, value, kind, duration_secs))
}

/// A permanent bonus from equipping an item. Pair with
/// [`on_item_unequipped`] using the same source.
#[must_use]
pub fn on_item_equipped(stat_id: &str, item_source: &str, value: f32, kind: ModifierKind) -> ProgressionEvent {
    ProgressionEvent::stat_modifier(stat_id, StatModifier::permanent(item_source, value, kind))
}

/// Take an item's bonus back off a stat.
#[must_use]
pub fn on_item_unequipped(stat_id: &str, item_source: &str) -> ProgressionEvent {
    ProgressionEvent::remove_modifiers(stat_id, item_source)
}

/// A permanent base-value change (attribute point spent, curse, blessing).
#[must_use]
pub fn on_attribute_point(stat_id: &str, delta: f32) -> ProgressionEvent {
    ProgressionEvent::base_change(stat_id, delta)
}

/// A deed witnessed within a reputation context.
#[must_use]
pub fn on_deed(
    context_id: &str,
    description: &str,
    impacts: &[(&str, f32)],
    decay_rate: Option<f32>,
) -> ProgressionEvent {
    ProgressionEvent::ReputationImpact(deed_impact(context_id, description, impacts, decay_rate))
}

/// A completed quest: trains the listed skills and, optionally, shifts
/// reputation with the quest giver.
#[must_use]
pub fn on_quest_completed(
    quest_id: &str,
    skills: &[(&str, f32)],
    giver: Option<(&str, &[(&str, f32)])>,
) -> ProgressionEvent {
    ProgressionEvent::CompleteAction(CompleteAction {
        action_id: format!("quest:{quest_id}"),
        relevant_skills: to_map(skills),
        reputation_impact: giver.map(|(context_id, impacts)| {
            deed_impact(context_id, &format!("Completed quest {quest_id}"), impacts, None)
        }),
    })
}

/// A crafted item: trains the crafting skill and counts the recipe.
#[must_use]
pub fn on_item_crafted(recipe_id: &str, skill_id: &str, amount: f32) -> ProgressionEvent {
    ProgressionEvent::CompleteAction(CompleteAction {
        action_id: format!("craft:{recipe_id}"),
        relevant_skills: to_map(&[(skill_id, amount)]),
        reputation_impact: None,
    })
}

/// A trade with a merchant; `fairness` in `[-1, 1]` moves honesty with the
/// merchant's faction.
#[must_use]
pub fn on_trade(faction_id: &str, trading_skill: &str, gold: f32, fairness: f32) -> ProgressionEvent {
    let honesty = fairness.clamp(-1.0, 1.0) * 2.0;
    ProgressionEvent::CompleteAction(CompleteAction {
        action_id: "trade".to_string(),
        relevant_skills: to_map(&[(trading_skill, gold.max(0.0).sqrt())]),
        reputation_impact: (honesty != 0.0)
            .then(|| deed_impact(faction_id, "Traded goods", &[("honesty", honesty)], None)),
    })
}

/// An achievement the host wants echoed back as a notice.
#[must_use]
pub fn on_achievement(achievement_id: &str) -> ProgressionEvent {
    ProgressionEvent::UnlockAchievement(UnlockAchievement {
        achievement_id: achievement_id.to_string(),
    })
}

fn deed_impact(
    context_id: &str,
    description: &str,
    impacts: &[(&str, f32)],
    decay_rate: Option<f32>,
) -> ReputationImpact {
    ReputationImpact {
        context_id: context_id.to_string(),
        source: ImpactSource::Traits(TraitImpacts {
            trait_impacts: to_map(impacts),
            event_id: None,
            description: Some(description.to_string()),
            decay_rate,
        }),
    }
}

fn to_map(pairs: &[(&str, f32)]) -> BTreeMap<String, f32> {
    pairs.iter().map(|&(k, v)| ((*k).to_string(), v)).collect()
}
