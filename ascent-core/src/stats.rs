//! Stat Registry: layered modifier resolution.
//!
//! Every stat has an authoritative `base_value` and a derived
//! `current_value` that is recomputed from the base and the stat's modifier
//! stack whenever either changes:
//!
//! ```text
//! additive       = Σ additive.value
//! multiplicative = Π (1 + multiplicative.value)
//! override       = max(override.value)            (if any)
//!
//! current = clamp(override, min, max)                                 if override
//!         = clamp((base + additive) × multiplicative, min, max)       otherwise
//! ```
//!
//! Additive modifiers sit inside the parenthesis: two +10 modifiers and a
//! +50% modifier give `(base + 20) × 1.5`, never `base × 1.5 + 20`.

use std::collections::HashMap;

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::config::{StatDefinition, check_bounds};
use crate::error::{AscentError, Result};
use crate::events::StatChange;
use crate::types::{ModifierKind, StatModifier, StatValue, usable_delta};

/// A single character attribute and its modifier stack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stat {
    /// Stat id.
    pub id: String,
    /// Authoritative value, mutated only by permanent base changes.
    pub base_value: f32,
    /// Derived effective value; always within `[min_value, max_value]`.
    pub current_value: f32,
    /// Lower bound.
    pub min_value: f32,
    /// Upper bound.
    pub max_value: f32,
    /// Stored for content tooling; not used by resolution.
    pub growth_rate: f32,
    /// Active modifiers in insertion order.
    pub modifiers: Vec<StatModifier>,
}

impl Stat {
    /// Build a stat from its definition. The base is clamped into bounds.
    #[must_use]
    pub fn from_definition(def: &StatDefinition) -> Self {
        let base = def.base.clamp(def.min, def.max);
        if (base - def.base).abs() > f32::EPSILON {
            warn!(stat = %def.id, base = def.base, clamped = base, "Stat base outside bounds");
        }
        let mut stat = Self {
            id: def.id.clone(),
            base_value: base,
            current_value: base,
            min_value: def.min,
            max_value: def.max,
            growth_rate: def.growth_rate,
            modifiers: Vec::new(),
        };
        stat.recompute();
        stat
    }

    /// Recompute `current_value` from the base and the modifier stack.
    pub fn recompute(&mut self) {
        self.current_value = resolve(
            self.base_value,
            self.min_value,
            self.max_value,
            &self.modifiers,
        );
    }

    /// Query snapshot.
    #[must_use]
    pub fn value(&self) -> StatValue {
        StatValue {
            base: self.base_value,
            current: self.current_value,
            min: self.min_value,
            max: self.max_value,
        }
    }
}

/// Resolve an effective value from a base and a modifier stack.
///
/// `min` must not exceed `max`.
#[must_use]
pub fn resolve(base: f32, min: f32, max: f32, modifiers: &[StatModifier]) -> f32 {
    let mut additive = 0.0_f32;
    let mut multiplicative = 1.0_f32;
    let mut override_value: Option<OrderedFloat<f32>> = None;

    for modifier in modifiers {
        match modifier.kind {
            ModifierKind::Additive => additive += modifier.value,
            ModifierKind::Multiplicative => multiplicative *= 1.0 + modifier.value,
            ModifierKind::Override => {
                let candidate = OrderedFloat(modifier.value);
                override_value = Some(override_value.map_or(candidate, |v| v.max(candidate)));
            }
        }
    }

    let raw = match override_value {
        Some(value) => value.into_inner(),
        None => (base + additive) * multiplicative,
    };

    // Overflowing stacks (∞ × 0) can produce NaN; fall back to the base.
    if raw.is_nan() {
        return base.clamp(min, max);
    }
    raw.clamp(min, max)
}

/// Owns every stat of one player.
#[derive(Debug, Clone, Default)]
pub struct StatRegistry {
    player_id: String,
    stats: Vec<Stat>,
    index: HashMap<String, usize>,
}

impl StatRegistry {
    /// Create a registry with one stat per definition.
    ///
    /// # Errors
    /// Returns `AscentError::DuplicateId` or `AscentError::Config` for
    /// duplicate ids or inverted bounds.
    pub fn new(player_id: impl Into<String>, definitions: &[StatDefinition]) -> Result<Self> {
        let mut registry = Self::default();
        registry.initialize(player_id, definitions)?;
        Ok(registry)
    }

    /// Replace all stats with fresh ones built from `definitions`.
    ///
    /// # Errors
    /// See [`StatRegistry::new`]. On error the registry is left unchanged.
    pub fn initialize(
        &mut self,
        player_id: impl Into<String>,
        definitions: &[StatDefinition],
    ) -> Result<()> {
        for def in definitions {
            check_bounds(&def.id, def.min, def.max).map_err(AscentError::Config)?;
        }
        let stats = definitions.iter().map(Stat::from_definition).collect::<Vec<_>>();
        let index = build_index(&stats).map_err(|id| AscentError::DuplicateId { kind: "stat", id })?;

        self.player_id = player_id.into();
        self.stats = stats;
        self.index = index;
        debug!(player = %self.player_id, stats = self.stats.len(), "Stat registry initialised");
        Ok(())
    }

    /// Rebuild a registry from restored stats.
    ///
    /// # Errors
    /// Returns `AscentError::InvalidSaveData` for duplicate ids or inverted
    /// bounds.
    pub fn from_stats(player_id: impl Into<String>, mut stats: Vec<Stat>) -> Result<Self> {
        for stat in &mut stats {
            check_bounds(&stat.id, stat.min_value, stat.max_value)
                .map_err(AscentError::InvalidSaveData)?;
            if !stat.base_value.is_finite() || !stat.modifiers.iter().all(is_well_formed) {
                return Err(AscentError::InvalidSaveData(format!(
                    "stat {} has non-finite values",
                    stat.id
                )));
            }
            // The stored current value is derived; trust the inputs instead.
            stat.recompute();
        }
        let index = build_index(&stats)
            .map_err(|id| AscentError::InvalidSaveData(format!("duplicate stat id {id}")))?;
        Ok(Self {
            player_id: player_id.into(),
            stats,
            index,
        })
    }

    /// The player these stats belong to.
    #[must_use]
    pub fn player_id(&self) -> &str {
        &self.player_id
    }

    /// Advance modifier timers by `delta` seconds, drop expired modifiers and
    /// recompute every stat.
    ///
    /// Returns the number of modifiers that expired.
    pub fn tick(&mut self, delta: f32) -> usize {
        if !usable_delta(delta, "stats") {
            return 0;
        }

        let mut expired = 0;
        for stat in &mut self.stats {
            for modifier in &mut stat.modifiers {
                if !modifier.is_permanent() {
                    modifier.remaining_time -= delta;
                }
            }
            let before = stat.modifiers.len();
            stat.modifiers.retain(|m| {
                let keep = !m.is_expired();
                if !keep {
                    trace!(stat = %stat.id, source = %m.source, "Modifier expired");
                }
                keep
            });
            expired += before - stat.modifiers.len();
            stat.recompute();
        }
        expired
    }

    /// Apply a `StatChange`: removal by source first, then a permanent base
    /// delta and/or a new modifier.
    ///
    /// Returns `false` if the stat is unknown or the payload carried nothing
    /// usable. A removal that matched no modifier still counts as applied.
    pub fn process_event(&mut self, change: &StatChange) -> bool {
        let Some(stat) = self.stat_mut(&change.stat_id) else {
            debug!(stat = %change.stat_id, "StatChange for unknown stat ignored");
            return false;
        };

        let mut applied = false;
        if let Some(source) = &change.remove_source {
            let before = stat.modifiers.len();
            stat.modifiers.retain(|m| m.source != *source);
            trace!(stat = %change.stat_id, source = %source, removed = before - stat.modifiers.len(), "Modifiers removed");
            applied = true;
        }
        if let Some(delta) = change.base_value_change {
            if delta.is_finite() {
                stat.base_value = (stat.base_value + delta).clamp(stat.min_value, stat.max_value);
                applied = true;
            } else {
                warn!(stat = %change.stat_id, delta, "Non-finite base change ignored");
            }
        }
        if let Some(modifier) = &change.modifier {
            if is_well_formed(modifier) {
                stat.modifiers.push(modifier.clone());
                applied = true;
            } else {
                warn!(stat = %change.stat_id, source = %modifier.source, "Malformed modifier ignored");
            }
        }
        stat.recompute();
        applied
    }

    /// Append a modifier and recompute immediately.
    ///
    /// Returns `false` for unknown stats or non-finite modifiers.
    pub fn apply_modifier(&mut self, stat_id: &str, modifier: StatModifier) -> bool {
        if !is_well_formed(&modifier) {
            warn!(stat = %stat_id, source = %modifier.source, "Malformed modifier ignored");
            return false;
        }
        let Some(stat) = self.stat_mut(stat_id) else {
            debug!(stat = %stat_id, "Modifier for unknown stat ignored");
            return false;
        };
        trace!(stat = %stat_id, source = %modifier.source, kind = %modifier.kind, value = modifier.value, "Modifier applied");
        stat.modifiers.push(modifier);
        stat.recompute();
        true
    }

    /// Remove every modifier whose source equals `source`, then recompute.
    ///
    /// Returns the number removed.
    pub fn remove_modifiers_from_source(&mut self, stat_id: &str, source: &str) -> usize {
        let Some(stat) = self.stat_mut(stat_id) else {
            return 0;
        };
        let before = stat.modifiers.len();
        stat.modifiers.retain(|m| m.source != source);
        stat.recompute();
        before - stat.modifiers.len()
    }

    /// Snapshot of a stat; zeroed for unknown ids.
    #[must_use]
    pub fn stat_value(&self, stat_id: &str) -> StatValue {
        self.stat(stat_id).map(Stat::value).unwrap_or_default()
    }

    /// Borrow a stat.
    #[must_use]
    pub fn stat(&self, stat_id: &str) -> Option<&Stat> {
        self.index.get(stat_id).and_then(|&i| self.stats.get(i))
    }

    /// Active modifiers of a stat (empty for unknown ids).
    #[must_use]
    pub fn modifiers(&self, stat_id: &str) -> &[StatModifier] {
        self.stat(stat_id).map_or(&[], |s| s.modifiers.as_slice())
    }

    /// All stats in configuration order.
    pub fn iter(&self) -> impl Iterator<Item = &Stat> {
        self.stats.iter()
    }

    /// Number of stats.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stats.len()
    }

    /// Whether no stats are configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stats.is_empty()
    }

    fn stat_mut(&mut self, stat_id: &str) -> Option<&mut Stat> {
        let i = *self.index.get(stat_id)?;
        self.stats.get_mut(i)
    }
}

fn is_well_formed(modifier: &StatModifier) -> bool {
    modifier.value.is_finite() && modifier.duration.is_finite() && modifier.remaining_time.is_finite()
}

/// Map ids to positions, reporting the first duplicate.
fn build_index(stats: &[Stat]) -> std::result::Result<HashMap<String, usize>, String> {
    let mut index = HashMap::with_capacity(stats.len());
    for (i, stat) in stats.iter().enumerate() {
        if index.insert(stat.id.clone(), i).is_some() {
            return Err(stat.id.clone());
        }
    }
    Ok(index)
}
