//! Progression Coordinator: routes events, drives ticks and owns save state.
//!
//! The host constructs one coordinator per player and passes it around by
//! reference. Events are routed by exhaustive match to the registry that
//! owns the affected state; skill level-ups are turned into stat modifiers
//! (source `skill:<id>`) so effects flow through the normal resolution.
//!
//! Tick order is fixed: stats, skills, reputation.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, info_span, warn};

use crate::config::AscentConfig;
use crate::error::{AscentError, Result};
use crate::events::{CompleteAction, ProgressionEvent};
use crate::metrics::{ProgressionCounters, spans};
use crate::reputation::{ReputationRegistry, ReputationTier};
use crate::save::{ReputationSave, SaveData, SkillCategorySave, StatSave};
use crate::skills::{RequirementContext, SkillRegistry};
use crate::stats::StatRegistry;
use crate::types::{LevelUp, ProgressionNotice, StatModifier, StatValue};

/// What a single coordinator tick removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickSummary {
    /// Stat modifiers that ran out.
    pub modifiers_expired: usize,
    /// Reputation events that fully decayed.
    pub reputation_events_expired: usize,
}

/// Modifier source tag for a skill's effects.
#[must_use]
pub fn skill_effect_source(skill_id: &str) -> String {
    format!("skill:{skill_id}")
}

/// Single entry point for one player's progression.
#[derive(Debug)]
pub struct ProgressionCoordinator {
    config: AscentConfig,
    stats: StatRegistry,
    skills: SkillRegistry,
    reputation: ReputationRegistry,
    completed_actions: BTreeMap<String, u32>,
    counters: Arc<ProgressionCounters>,
}

impl ProgressionCoordinator {
    /// Validate `config` and build the three registries.
    ///
    /// # Errors
    /// Any configuration error; nothing is built on failure.
    pub fn new(player_id: impl Into<String>, config: &AscentConfig) -> Result<Self> {
        config.validate()?;
        let player_id = player_id.into();
        let stats = StatRegistry::new(player_id.clone(), &config.stats)?;
        let skills = SkillRegistry::new(&config.skill_categories, &config.skills)?;
        let reputation = ReputationRegistry::new(&config.reputation_contexts, &config.reputation)?;
        info!(
            player = %player_id,
            stats = stats.len(),
            skills = skills.len(),
            contexts = reputation.len(),
            "Progression coordinator initialised"
        );
        Ok(Self {
            config: config.clone(),
            stats,
            skills,
            reputation,
            completed_actions: BTreeMap::new(),
            counters: Arc::new(ProgressionCounters::new()),
        })
    }

    /// Share a counter set with other coordinators or an exporter.
    #[must_use]
    pub fn with_counters(mut self, counters: Arc<ProgressionCounters>) -> Self {
        self.counters = counters;
        self
    }

    /// Owning player.
    #[must_use]
    pub fn player_id(&self) -> &str {
        self.stats.player_id()
    }

    /// The configuration the coordinator was built from.
    #[must_use]
    pub fn config(&self) -> &AscentConfig {
        &self.config
    }

    /// Activity counters.
    #[must_use]
    pub fn counters(&self) -> &Arc<ProgressionCounters> {
        &self.counters
    }

    // -----------------------------------------------------------------------
    // Events
    // -----------------------------------------------------------------------

    /// Route one event. Malformed events are logged and dropped.
    pub fn process_event(&mut self, event: ProgressionEvent) -> Vec<ProgressionNotice> {
        let _span = info_span!(spans::PROCESS_EVENT, kind = event.kind()).entered();
        if let Err(e) = event.validate() {
            warn!(kind = event.kind(), error = %e, "Dropping malformed event");
            ProgressionCounters::bump(&self.counters.events_rejected);
            return Vec::new();
        }
        ProgressionCounters::bump(&self.counters.events_processed);

        let mut notices = Vec::new();
        match &event {
            ProgressionEvent::StatChange(change) => {
                if self.stats.process_event(change) && change.modifier.is_some() {
                    ProgressionCounters::bump(&self.counters.modifiers_applied);
                }
            }
            ProgressionEvent::SkillExperience(_) => {
                let level_ups = self.skills.process_event(&event);
                self.finish_level_ups(level_ups, &mut notices);
            }
            ProgressionEvent::ReputationImpact(impact) => {
                if self.reputation.process_event(impact) {
                    ProgressionCounters::bump(&self.counters.reputation_events_added);
                }
            }
            ProgressionEvent::CompleteAction(CompleteAction {
                action_id,
                reputation_impact,
                ..
            }) => {
                let count = self.completed_actions.entry(action_id.clone()).or_insert(0);
                *count = count.saturating_add(1);
                debug!(action = %action_id, count = *count, "Action completed");

                let level_ups = self.skills.process_event(&event);
                self.finish_level_ups(level_ups, &mut notices);
                if let Some(impact) = reputation_impact {
                    if self.reputation.process_event(impact) {
                        ProgressionCounters::bump(&self.counters.reputation_events_added);
                    }
                }
            }
            ProgressionEvent::UnlockAchievement(unlock) => {
                info!(achievement = %unlock.achievement_id, "Achievement unlocked");
                notices.push(ProgressionNotice::AchievementUnlocked {
                    achievement_id: unlock.achievement_id.clone(),
                });
            }
        }
        notices
    }

    /// Decode a wire event and route it. Undecodable payloads are dropped.
    pub fn process_json(&mut self, json: &str) -> Vec<ProgressionNotice> {
        match ProgressionEvent::from_json(json) {
            Ok(event) => self.process_event(event),
            Err(e) => {
                warn!(error = %e, "Dropping undecodable event");
                ProgressionCounters::bump(&self.counters.events_rejected);
                Vec::new()
            }
        }
    }

    fn finish_level_ups(&mut self, level_ups: Vec<LevelUp>, notices: &mut Vec<ProgressionNotice>) {
        for up in level_ups {
            self.refresh_skill_effects(&up.skill_id);
            ProgressionCounters::bump(&self.counters.level_ups);
            notices.push(ProgressionNotice::LevelUp(up));
        }
    }

    /// Replace the `skill:<id>` modifiers with ones matching the skill's
    /// current level.
    fn refresh_skill_effects(&mut self, skill_id: &str) {
        let Some(skill) = self.skills.skill(skill_id) else {
            return;
        };
        if skill.effects.is_empty() {
            return;
        }
        let source = skill_effect_source(skill_id);
        let targets: BTreeSet<&str> = skill.effects.iter().map(|e| e.target_stat.as_str()).collect();
        for stat_id in targets {
            self.stats.remove_modifiers_from_source(stat_id, &source);
        }
        for effect in &skill.effects {
            let modifier = StatModifier::permanent(source.clone(), effect.value_at(skill.level), effect.kind);
            if self.stats.apply_modifier(&effect.target_stat, modifier) {
                ProgressionCounters::bump(&self.counters.modifiers_applied);
            }
        }
    }

    // -----------------------------------------------------------------------
    // Time
    // -----------------------------------------------------------------------

    /// Advance every registry by `delta` seconds.
    pub fn tick(&mut self, delta: f32) -> TickSummary {
        let _span = info_span!(spans::TICK, delta).entered();
        let modifiers_expired = self.stats.tick(delta);
        self.skills.tick(delta);
        let reputation_events_expired = self.reputation.tick(delta);

        ProgressionCounters::bump(&self.counters.ticks);
        ProgressionCounters::add(&self.counters.modifiers_expired, modifiers_expired as u64);
        ProgressionCounters::add(
            &self.counters.reputation_events_expired,
            reputation_events_expired as u64,
        );
        TickSummary {
            modifiers_expired,
            reputation_events_expired,
        }
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Snapshot of a stat; zeroed for unknown ids.
    #[must_use]
    pub fn stat_value(&self, stat_id: &str) -> StatValue {
        self.stats.stat_value(stat_id)
    }

    /// Skill level, 0 for unknown skills.
    #[must_use]
    pub fn skill_level(&self, skill_id: &str) -> u32 {
        self.skills.skill_level(skill_id)
    }

    /// Skill experience, 0 for unknown skills.
    #[must_use]
    pub fn skill_experience(&self, skill_id: &str) -> f32 {
        self.skills.skill_experience(skill_id)
    }

    /// Overall or per-trait reputation, 0 for unknown ids.
    #[must_use]
    pub fn reputation_score(&self, context_id: &str, trait_id: Option<&str>) -> f32 {
        self.reputation.reputation_score(context_id, trait_id)
    }

    /// Tier of a context's overall reputation.
    #[must_use]
    pub fn reputation_tier(&self, context_id: &str) -> ReputationTier {
        self.reputation.tier(context_id)
    }

    /// Times an action has been completed.
    #[must_use]
    pub fn completed_action_count(&self, action_id: &str) -> u32 {
        self.completed_actions.get(action_id).copied().unwrap_or(0)
    }

    /// Evaluate every requirement of a skill against live state.
    #[must_use]
    pub fn check_skill_requirements(&self, skill_id: &str) -> bool {
        let context = LiveState {
            stats: &self.stats,
            completed_actions: &self.completed_actions,
        };
        self.skills.check_requirements_with(skill_id, &context)
    }

    /// Stat registry.
    #[must_use]
    pub fn stats(&self) -> &StatRegistry {
        &self.stats
    }

    /// Skill registry.
    #[must_use]
    pub fn skills(&self) -> &SkillRegistry {
        &self.skills
    }

    /// Reputation registry.
    #[must_use]
    pub fn reputation(&self) -> &ReputationRegistry {
        &self.reputation
    }

    // -----------------------------------------------------------------------
    // Save / restore
    // -----------------------------------------------------------------------

    /// Snapshot the full progression state.
    #[must_use]
    pub fn generate_save_data(&self) -> SaveData {
        SaveData {
            player_id: self.player_id().to_string(),
            saved_at: Utc::now(),
            clock: self.skills.clock(),
            stats: self.stats.iter().map(StatSave::from).collect(),
            skill_categories: self.skills.categories().map(SkillCategorySave::from).collect(),
            reputations: self.reputation.iter().map(ReputationSave::from).collect(),
            completed_actions: self.completed_actions.clone(),
        }
    }

    /// Replace all state with a save document.
    ///
    /// The document is validated in full before anything is swapped in.
    ///
    /// # Errors
    /// Returns `AscentError::InvalidSaveData` if the document belongs to a
    /// different player or fails validation; current state is kept.
    pub fn restore_from_save_data(&mut self, data: SaveData) -> Result<()> {
        if data.player_id != self.player_id() {
            return Err(AscentError::InvalidSaveData(format!(
                "save belongs to player {}, not {}",
                data.player_id,
                self.player_id()
            )));
        }
        let clock = if data.clock.is_finite() && data.clock >= 0.0 { data.clock } else { 0.0 };

        let stats = StatRegistry::from_stats(
            data.player_id.clone(),
            data.stats.into_iter().map(Into::into).collect(),
        )?;
        let categories = data
            .skill_categories
            .into_iter()
            .map(|c| c.into_category(&self.config))
            .collect();
        let skills = SkillRegistry::from_categories(categories, clock)?;
        let reputation = ReputationRegistry::from_contexts(
            data.reputations.into_iter().map(Into::into).collect(),
            &self.config.reputation,
            clock,
        )?;

        self.stats = stats;
        self.skills = skills;
        self.reputation = reputation;
        self.completed_actions = data.completed_actions;
        info!(
            player = %self.player_id(),
            saved_at = %data.saved_at,
            "Progression state restored"
        );
        Ok(())
    }
}

/// Cross-registry view handed to requirement checks.
struct LiveState<'a> {
    stats: &'a StatRegistry,
    completed_actions: &'a BTreeMap<String, u32>,
}

impl RequirementContext for LiveState<'_> {
    fn stat_current(&self, stat_id: &str) -> f32 {
        self.stats.stat_value(stat_id).current
    }

    fn completed_action_count(&self, action_id: &str) -> u32 {
        self.completed_actions.get(action_id).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ModifierKind;

    const CONFIG: &str = r#"
        [[stats]]
        id = "strength"
        base = 10.0
        max = 1000.0

        [[stats]]
        id = "dexterity"
        base = 8.0

        [[skill_categories]]
        id = "combat"

        [[skills]]
        id = "swords"
        category = "combat"
        effects = [
            { target_stat = "strength", magnitude_per_level = 2.0, kind = "Additive" },
            { target_stat = "strength", magnitude_per_level = 0.1, kind = "Multiplicative" },
        ]

        [[skills]]
        id = "archery"
        category = "combat"
        requirements = [
            { kind = "StatMinimum", target_id = "dexterity", required_value = 10.0 },
            { kind = "CompletedAction", target_id = "hunt", required_value = 2.0 },
        ]

        [[reputation_contexts]]
        id = "guild"
        traits = ["honesty"]
    "#;

    fn coordinator() -> ProgressionCoordinator {
        let config = AscentConfig::from_toml(CONFIG).expect("config");
        ProgressionCoordinator::new("player-1", &config).expect("coordinator")
    }

    #[test]
    fn level_up_applies_skill_effects() {
        let mut c = coordinator();
        let notices = c.process_event(ProgressionEvent::skill_experience("swords", 100.0));
        assert_eq!(notices.len(), 1);
        // (10 + 2) × 1.1
        assert!((c.stat_value("strength").current - 13.2).abs() < 1e-4);

        c.process_event(ProgressionEvent::skill_experience("swords", 150.0));
        assert_eq!(c.skill_level("swords"), 2);
        let mods = c.stats().modifiers("strength");
        assert_eq!(mods.len(), 2, "previous effect modifiers replaced");
        // (10 + 4) × 1.2
        assert!((c.stat_value("strength").current - 16.8).abs() < 1e-4);
    }

    #[test]
    fn skill_effects_survive_ticks() {
        let mut c = coordinator();
        c.process_event(ProgressionEvent::skill_experience("swords", 100.0));
        c.tick(1_000.0);
        assert_eq!(c.stats().modifiers("strength").len(), 2);
    }

    #[test]
    fn achievement_passes_through() {
        let mut c = coordinator();
        let notices = c.process_json(r#"{"type":"UnlockAchievement","params":{"achievementId":"first_steps"}}"#);
        assert_eq!(
            notices,
            vec![ProgressionNotice::AchievementUnlocked {
                achievement_id: "first_steps".to_string()
            }]
        );
    }

    #[test]
    fn malformed_json_is_dropped() {
        let mut c = coordinator();
        assert!(c.process_json("{not json").is_empty());
        assert!(c.process_json(r#"{"type":"SkillExperience","params":{"skillId":"","experienceAmount":5}}"#).is_empty());
        let snap = c.counters().snapshot();
        assert_eq!(snap.events_rejected, 2);
        assert_eq!(snap.events_processed, 0);
    }

    #[test]
    fn complete_action_counts_and_gates() {
        let mut c = coordinator();
        let hunt = r#"{"type":"CompleteAction","params":{"actionId":"hunt","reputationImpact":{"contextId":"guild","traitImpacts":{"honesty":1.0}}}}"#;
        c.process_json(hunt);
        c.process_json(hunt);
        assert_eq!(c.completed_action_count("hunt"), 2);
        assert!((c.reputation_score("guild", Some("honesty")) - 2.0).abs() < f32::EPSILON);

        assert!(!c.check_skill_requirements("archery"), "dexterity 8 < 10");
        c.process_event(ProgressionEvent::stat_modifier(
            "dexterity",
            StatModifier::permanent("boots", 2.0, ModifierKind::Additive),
        ));
        assert!(c.check_skill_requirements("archery"));
    }

    #[test]
    fn stat_change_event() {
        let mut c = coordinator();
        c.process_event(ProgressionEvent::base_change("strength", 5.0));
        assert!((c.stat_value("strength").base - 15.0).abs() < f32::EPSILON);
        assert_eq!(c.counters().snapshot().modifiers_applied, 0);
    }

    #[test]
    fn tick_reports_expiries() {
        let mut c = coordinator();
        c.process_event(ProgressionEvent::stat_modifier(
            "strength",
            StatModifier::new("potion", 5.0, ModifierKind::Additive, 2.0),
        ));
        let summary = c.tick(3.0);
        assert_eq!(summary.modifiers_expired, 1);
        assert_eq!(c.counters().snapshot().ticks, 1);
    }

    #[test]
    fn equip_then_unequip_restores_stat() {
        let mut c = coordinator();
        c.process_json(
            r#"{"type":"StatChange","params":{"statId":"strength","modifier":{"source":"item:plate","value":12.0,"kind":"Additive","duration":-1.0}}}"#,
        );
        assert!((c.stat_value("strength").current - 22.0).abs() < 1e-4);

        c.process_json(r#"{"type":"StatChange","params":{"statId":"strength","removeSource":"item:plate"}}"#);
        assert!((c.stat_value("strength").current - 10.0).abs() < 1e-4);
        assert!(c.stats().modifiers("strength").is_empty());
        assert_eq!(c.counters().snapshot().events_rejected, 0);
    }

    #[test]
    fn empty_remove_source_is_rejected() {
        let mut c = coordinator();
        c.process_event(ProgressionEvent::remove_modifiers("strength", ""));
        assert_eq!(c.counters().snapshot().events_rejected, 1);
    }

    #[test]
    fn unknown_ids_read_as_zero() {
        let c = coordinator();
        assert_eq!(c.stat_value("charisma"), StatValue::default());
        assert_eq!(c.skill_level("cooking"), 0);
        assert!(c.reputation_score("nowhere", None).abs() < f32::EPSILON);
        assert_eq!(c.completed_action_count("nothing"), 0);
        assert!(!c.check_skill_requirements("cooking"));
    }

    #[test]
    fn save_round_trip() {
        let mut c = coordinator();
        c.process_event(ProgressionEvent::skill_experience("swords", 130.0));
        c.process_event(ProgressionEvent::stat_modifier(
            "dexterity",
            StatModifier::new("haste", 3.0, ModifierKind::Additive, 10.0),
        ));
        c.process_json(r#"{"type":"CompleteAction","params":{"actionId":"hunt"}}"#);
        c.tick(1.0);
        let save = c.generate_save_data();

        let mut restored = coordinator();
        restored.restore_from_save_data(save.clone()).expect("restore");
        assert_eq!(restored.skill_level("swords"), 1);
        assert!((restored.skill_experience("swords") - 30.0).abs() < 1e-4);
        assert_eq!(restored.stat_value("strength"), c.stat_value("strength"));
        assert_eq!(restored.stat_value("dexterity"), c.stat_value("dexterity"));
        assert_eq!(restored.completed_action_count("hunt"), 1);
        assert_eq!(restored.skills().category_of("swords"), Some("combat"));

        let again = restored.generate_save_data();
        assert_eq!(again.stats, save.stats);
        assert_eq!(again.skill_categories, save.skill_categories);
        assert_eq!(again.completed_actions, save.completed_actions);
    }

    #[test]
    fn restore_rejects_foreign_player() {
        let mut c = coordinator();
        let mut save = c.generate_save_data();
        save.player_id = "someone-else".to_string();
        assert!(matches!(
            c.restore_from_save_data(save),
            Err(AscentError::InvalidSaveData(_))
        ));
    }

    #[test]
    fn invalid_restore_keeps_state() {
        let mut c = coordinator();
        c.process_event(ProgressionEvent::skill_experience("swords", 120.0));
        let mut save = c.generate_save_data();
        save.stats[0].min = 500.0;
        save.stats[0].max = 1.0;
        save.skill_categories.clear();
        assert!(c.restore_from_save_data(save).is_err());
        assert_eq!(c.skill_level("swords"), 1);
    }

    #[test]
    fn invalid_config_fails_construction() {
        let mut config = AscentConfig::default();
        config.skills.push(crate::config::SkillDefinition::new("x", "missing"));
        assert!(ProgressionCoordinator::new("p", &config).is_err());
    }
}
