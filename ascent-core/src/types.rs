//! Core type definitions shared by the registries.
//!
//! All types are plain data and serializable; the registries own them and
//! nothing holds references across registry boundaries (ids are strings).

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

// ---------------------------------------------------------------------------
// Modifiers
// ---------------------------------------------------------------------------

/// Duration sentinel marking a modifier as permanent.
///
/// Any negative duration is treated as permanent; this is the canonical value.
pub const PERMANENT: f32 = -1.0;

/// How a modifier combines with a stat's base value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModifierKind {
    /// Summed, then added to the base value.
    Additive,
    /// Each contributes a factor of `(1 + value)` applied to `base + additive`.
    Multiplicative,
    /// Replaces the computed value outright; the largest override wins.
    Override,
}

impl fmt::Display for ModifierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Additive => "additive",
            Self::Multiplicative => "multiplicative",
            Self::Override => "override",
        };
        f.write_str(name)
    }
}

/// A timed or permanent adjustment to a stat's effective value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "ModifierRepr")]
pub struct StatModifier {
    /// Origin tag, used for bulk removal (e.g. `"potion:haste"`, `"skill:archery"`).
    pub source: String,
    /// Magnitude. For multiplicative modifiers `0.5` means +50%.
    pub value: f32,
    /// Combination rule.
    pub kind: ModifierKind,
    /// Total lifetime in seconds; negative means permanent.
    pub duration: f32,
    /// Seconds left before expiry. Ignored for permanent modifiers.
    pub remaining_time: f32,
}

impl StatModifier {
    /// Create a modifier that expires after `duration` seconds.
    ///
    /// A negative `duration` yields a permanent modifier.
    #[must_use]
    pub fn new(source: impl Into<String>, value: f32, kind: ModifierKind, duration: f32) -> Self {
        Self {
            source: source.into(),
            value,
            kind,
            duration,
            remaining_time: duration,
        }
    }

    /// Create a modifier that never expires.
    #[must_use]
    pub fn permanent(source: impl Into<String>, value: f32, kind: ModifierKind) -> Self {
        Self::new(source, value, kind, PERMANENT)
    }

    /// Whether this modifier is exempt from countdown.
    #[must_use]
    pub fn is_permanent(&self) -> bool {
        self.duration < 0.0
    }

    /// Whether a timed modifier has run out.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        !self.is_permanent() && self.remaining_time <= 0.0
    }
}

/// Wire shape of a modifier. `remainingTime` may be omitted by event
/// producers, in which case the modifier starts with its full duration.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModifierRepr {
    source: String,
    value: f32,
    kind: ModifierKind,
    #[serde(default = "default_permanent")]
    duration: f32,
    #[serde(default)]
    remaining_time: Option<f32>,
}

impl From<ModifierRepr> for StatModifier {
    fn from(repr: ModifierRepr) -> Self {
        Self {
            source: repr.source,
            value: repr.value,
            kind: repr.kind,
            duration: repr.duration,
            remaining_time: repr.remaining_time.unwrap_or(repr.duration),
        }
    }
}

fn default_permanent() -> f32 {
    PERMANENT
}

// ---------------------------------------------------------------------------
// Query results
// ---------------------------------------------------------------------------

/// Snapshot of a stat returned by queries. Zeroed for unknown stats.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StatValue {
    /// Authoritative base value.
    pub base: f32,
    /// Effective value after modifiers, clamped to `[min, max]`.
    pub current: f32,
    /// Lower bound.
    pub min: f32,
    /// Upper bound.
    pub max: f32,
}

/// Record of a skill advancing one or more levels in a single grant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelUp {
    /// Which skill advanced.
    pub skill_id: String,
    /// Level before the grant.
    pub from_level: u32,
    /// Level after the grant.
    pub to_level: u32,
}

impl LevelUp {
    /// Number of levels gained.
    #[must_use]
    pub fn levels_gained(&self) -> u32 {
        self.to_level.saturating_sub(self.from_level)
    }
}

/// Something the host may want to react to after an event is processed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProgressionNotice {
    /// A skill crossed one or more level thresholds.
    LevelUp(LevelUp),
    /// An achievement unlock passed through the engine untouched.
    AchievementUnlocked {
        /// Host-defined achievement id.
        achievement_id: String,
    },
}

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// Tick deltas must be finite and non-negative; anything else is dropped.
pub(crate) fn usable_delta(delta: f32, registry: &'static str) -> bool {
    if delta.is_finite() && delta >= 0.0 {
        true
    } else {
        warn!(registry, delta, "Ignoring unusable tick delta");
        false
    }
}
