//! Reputation Registry: per-context standing built from decaying events.
//!
//! Each context (faction, location, NPC) keeps trait scores and a list of
//! live reputation events. Every event carries a signed impact per trait
//! that fades toward zero at its own decay rate; once all of an event's
//! impacts reach zero it is dropped.
//!
//! Scores are self-correcting: a trait's score is always the sum of the
//! remaining impacts of the live events for that trait, recomputed after
//! every change. Declared traits stay listed at 0 when nothing affects them.
//!
//! Features:
//! - Independent per-event, per-trait decay (never overshoots zero)
//! - Overall score = mean of trait scores
//! - Reputation tiers (Revered … Hated) for gating and UI

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::config::{ReputationContextDefinition, ReputationSettings, check_decay_rate};
use crate::error::{AscentError, Result};
use crate::events::{ImpactSource, ReputationImpact};
use crate::types::usable_delta;

/// A discrete reputation-affecting occurrence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReputationEvent {
    /// Unique id (UUID v4 when generated).
    pub event_id: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// Trait id → remaining signed impact.
    pub trait_impacts: BTreeMap<String, f32>,
    /// Registry clock (seconds) when the event was recorded.
    #[serde(default)]
    pub timestamp: f64,
    /// Impact units removed per second, per trait.
    pub decay_rate: f32,
}

impl ReputationEvent {
    /// Build an event.
    #[must_use]
    pub fn new(
        event_id: impl Into<String>,
        description: impl Into<String>,
        trait_impacts: BTreeMap<String, f32>,
        timestamp: f64,
        decay_rate: f32,
    ) -> Self {
        Self {
            event_id: event_id.into(),
            description: description.into(),
            trait_impacts,
            timestamp,
            decay_rate,
        }
    }

    /// Whether every impact has faded to zero.
    #[must_use]
    pub fn is_spent(&self) -> bool {
        self.trait_impacts.values().all(|&v| v == 0.0)
    }

    /// Move every impact toward zero by `decay_rate × delta`, clamping at zero.
    fn decay(&mut self, delta: f32) {
        let step = self.decay_rate * delta;
        for impact in self.trait_impacts.values_mut() {
            *impact = if *impact > 0.0 {
                (*impact - step).max(0.0)
            } else if *impact < 0.0 {
                (*impact + step).min(0.0)
            } else {
                0.0
            };
        }
    }
}

/// Standing within one context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reputation {
    /// Context id.
    pub context_id: String,
    /// Display name.
    pub name: String,
    /// Mean of all trait scores, 0 when there are none.
    pub overall_score: f32,
    /// Trait id → score.
    pub trait_scores: BTreeMap<String, f32>,
    /// Live events in arrival order.
    pub recent_events: Vec<ReputationEvent>,
}

impl Reputation {
    /// Empty standing with every declared trait at 0.
    #[must_use]
    pub fn from_definition(def: &ReputationContextDefinition) -> Self {
        Self {
            context_id: def.id.clone(),
            name: if def.name.is_empty() { def.id.clone() } else { def.name.clone() },
            overall_score: 0.0,
            trait_scores: def.traits.iter().map(|t| (t.clone(), 0.0)).collect(),
            recent_events: Vec::new(),
        }
    }

    /// Rebuild trait scores from live events, then the overall score.
    pub fn recompute(&mut self) {
        for score in self.trait_scores.values_mut() {
            *score = 0.0;
        }
        for event in &self.recent_events {
            for (trait_id, impact) in &event.trait_impacts {
                *self.trait_scores.entry(trait_id.clone()).or_insert(0.0) += impact;
            }
        }
        self.overall_score = if self.trait_scores.is_empty() {
            0.0
        } else {
            self.trait_scores.values().sum::<f32>() / self.trait_scores.len() as f32
        };
    }
}

/// Reputation tiers derived from a context's overall score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReputationTier {
    /// Score ≥ 50.
    Revered,
    /// Score 20 to 50.
    Honored,
    /// Score 5 to 20.
    Friendly,
    /// Score -5 to 5.
    Neutral,
    /// Score -20 to -5.
    Unfriendly,
    /// Score -50 to -20.
    Hostile,
    /// Score ≤ -50.
    Hated,
}

impl ReputationTier {
    /// Classify a score into a tier.
    #[must_use]
    pub fn from_score(score: f32) -> Self {
        match score {
            s if s >= 50.0 => Self::Revered,
            s if s >= 20.0 => Self::Honored,
            s if s >= 5.0 => Self::Friendly,
            s if s > -5.0 => Self::Neutral,
            s if s > -20.0 => Self::Unfriendly,
            s if s > -50.0 => Self::Hostile,
            _ => Self::Hated,
        }
    }

    /// Get a human-readable description.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::Revered => "Revered: your name is spoken with awe",
            Self::Honored => "Honored: trusted and respected",
            Self::Friendly => "Friendly: people know and like you",
            Self::Neutral => "Neutral: no strong feelings either way",
            Self::Unfriendly => "Unfriendly: regarded with suspicion",
            Self::Hostile => "Hostile: unwelcome here",
            Self::Hated => "Hated: expect violence on sight",
        }
    }
}

/// Owns every reputation context for one player.
#[derive(Debug, Clone, Default)]
pub struct ReputationRegistry {
    contexts: Vec<Reputation>,
    index: HashMap<String, usize>,
    settings: ReputationSettings,
    clock: f64,
}

impl ReputationRegistry {
    /// Build contexts from configuration.
    ///
    /// # Errors
    /// Duplicate context or trait ids, or an invalid default decay rate.
    pub fn new(
        contexts: &[ReputationContextDefinition],
        settings: &ReputationSettings,
    ) -> Result<Self> {
        let mut registry = Self::default();
        registry.initialize(contexts, settings)?;
        Ok(registry)
    }

    /// Replace all contexts with fresh, event-free ones.
    ///
    /// # Errors
    /// See [`ReputationRegistry::new`]. On error the registry is left unchanged.
    pub fn initialize(
        &mut self,
        contexts: &[ReputationContextDefinition],
        settings: &ReputationSettings,
    ) -> Result<()> {
        check_decay_rate(settings.default_decay_rate).map_err(AscentError::Config)?;
        let mut built = Vec::with_capacity(contexts.len());
        for def in contexts {
            let mut traits = HashSet::new();
            if let Some(dup) = def.traits.iter().find(|t| !traits.insert(t.as_str())) {
                return Err(AscentError::DuplicateId {
                    kind: "reputation trait",
                    id: dup.clone(),
                });
            }
            built.push(Reputation::from_definition(def));
        }
        let index = build_index(&built).map_err(|id| AscentError::DuplicateId {
            kind: "reputation context",
            id,
        })?;

        self.contexts = built;
        self.index = index;
        self.settings = settings.clone();
        self.clock = 0.0;
        debug!(contexts = self.contexts.len(), "Reputation registry initialised");
        Ok(())
    }

    /// Rebuild a registry from restored contexts. Scores are recomputed from
    /// the restored events.
    ///
    /// # Errors
    /// Returns `AscentError::InvalidSaveData` for duplicate ids, non-finite
    /// impacts or invalid decay rates.
    pub fn from_contexts(
        mut contexts: Vec<Reputation>,
        settings: &ReputationSettings,
        clock: f64,
    ) -> Result<Self> {
        for context in &mut contexts {
            for event in &context.recent_events {
                check_decay_rate(event.decay_rate).map_err(|e| {
                    AscentError::InvalidSaveData(format!("event {}: {e}", event.event_id))
                })?;
                if event.trait_impacts.values().any(|v| !v.is_finite()) {
                    return Err(AscentError::InvalidSaveData(format!(
                        "event {} has non-finite impacts",
                        event.event_id
                    )));
                }
            }
            context.recompute();
        }
        let index = build_index(&contexts).map_err(|id| {
            AscentError::InvalidSaveData(format!("duplicate reputation context {id}"))
        })?;
        Ok(Self {
            contexts,
            index,
            settings: settings.clone(),
            clock: if clock.is_finite() { clock } else { 0.0 },
        })
    }

    /// Decay every live event, drop spent ones and recompute scores.
    ///
    /// Returns the number of events removed.
    pub fn tick(&mut self, delta: f32) -> usize {
        if !usable_delta(delta, "reputation") {
            return 0;
        }
        self.clock += f64::from(delta);

        let mut removed = 0;
        for context in &mut self.contexts {
            if context.recent_events.is_empty() {
                continue;
            }
            for event in &mut context.recent_events {
                event.decay(delta);
            }
            let before = context.recent_events.len();
            context.recent_events.retain(|e| !e.is_spent());
            let expired = before - context.recent_events.len();
            if expired > 0 {
                trace!(context = %context.context_id, expired, "Reputation events faded");
            }
            removed += expired;
            context.recompute();
        }
        removed
    }

    /// Seconds the registry has been ticked.
    #[must_use]
    pub fn clock(&self) -> f64 {
        self.clock
    }

    /// Append an event to a context and fold it into the scores.
    ///
    /// Traits not yet tracked by the context are created. Returns `false`
    /// for unknown contexts, a negative or non-finite decay rate, or any
    /// non-finite impact.
    pub fn add_reputation_event(&mut self, context_id: &str, event: ReputationEvent) -> bool {
        if let Err(reason) = check_event(&event) {
            warn!(context = %context_id, event = %event.event_id, %reason, "Malformed reputation event ignored");
            return false;
        }
        let Some(context) = self.index.get(context_id).and_then(|&i| self.contexts.get_mut(i)) else {
            warn!(context = %context_id, event = %event.event_id, "Reputation event for unknown context ignored");
            return false;
        };
        info!(
            context = %context_id,
            event = %event.event_id,
            description = %event.description,
            "Reputation event recorded"
        );
        context.recent_events.push(event);
        context.recompute();
        true
    }

    /// Route an inbound impact, filling missing metadata from configuration.
    pub fn process_event(&mut self, impact: &ReputationImpact) -> bool {
        let event = match &impact.source {
            ImpactSource::Prebuilt(prebuilt) => prebuilt.reputation_event.clone(),
            ImpactSource::Traits(raw) => ReputationEvent {
                event_id: raw
                    .event_id
                    .clone()
                    .unwrap_or_else(|| Uuid::new_v4().to_string()),
                description: raw
                    .description
                    .clone()
                    .unwrap_or_else(|| self.settings.default_description.clone()),
                trait_impacts: raw.trait_impacts.clone(),
                timestamp: self.clock,
                decay_rate: raw.decay_rate.unwrap_or(self.settings.default_decay_rate),
            },
        };
        self.add_reputation_event(&impact.context_id, event)
    }

    /// Overall score (`trait_id` `None` or empty) or one trait's score.
    /// Unknown contexts and traits read as 0.
    #[must_use]
    pub fn reputation_score(&self, context_id: &str, trait_id: Option<&str>) -> f32 {
        let Some(context) = self.reputation(context_id) else {
            return 0.0;
        };
        match trait_id {
            None | Some("") => context.overall_score,
            Some(t) => context.trait_scores.get(t).copied().unwrap_or(0.0),
        }
    }

    /// Tier of a context's overall score.
    #[must_use]
    pub fn tier(&self, context_id: &str) -> ReputationTier {
        ReputationTier::from_score(self.reputation_score(context_id, None))
    }

    /// Live events of a context (empty for unknown contexts).
    #[must_use]
    pub fn active_events(&self, context_id: &str) -> &[ReputationEvent] {
        self.reputation(context_id)
            .map_or(&[], |c| c.recent_events.as_slice())
    }

    /// Borrow one context.
    #[must_use]
    pub fn reputation(&self, context_id: &str) -> Option<&Reputation> {
        self.index.get(context_id).and_then(|&i| self.contexts.get(i))
    }

    /// All contexts in configuration order.
    pub fn iter(&self) -> impl Iterator<Item = &Reputation> {
        self.contexts.iter()
    }

    /// Number of contexts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    /// Whether no contexts are configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }
}

fn build_index(contexts: &[Reputation]) -> std::result::Result<HashMap<String, usize>, String> {
    let mut index = HashMap::with_capacity(contexts.len());
    for (i, context) in contexts.iter().enumerate() {
        if index.insert(context.context_id.clone(), i).is_some() {
            return Err(context.context_id.clone());
        }
    }
    Ok(index)
}

fn check_event(event: &ReputationEvent) -> std::result::Result<(), String> {
    check_decay_rate(event.decay_rate)?;
    match event.trait_impacts.iter().find(|(_, v)| !v.is_finite()) {
        Some((trait_id, v)) => Err(format!("impact {v} on trait {trait_id} must be finite")),
        None => Ok(()),
    }
}
