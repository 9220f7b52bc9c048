//! Table rule configuration.

use crate::error::Result;
use serde::{Deserialize, Serialize};

/// What to do when a roll is requested with both advantage and disadvantage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AdvantageConflict {
    /// Fail with `RulesError::ConflictingAdvantage`.
    #[default]
    Reject,
    /// Treat the pair as a plain roll.
    Cancel,
}

/// Variant rules a table can switch on or off.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RulesConfig {
    /// Policy for simultaneous advantage and disadvantage flags.
    pub advantage_conflict: AdvantageConflict,

    /// Instant death when damage at (or overflowing to) 0 HP reaches max HP.
    pub massive_damage: bool,

    /// Level-ups always take the hit die average, ignoring supplied rolls.
    pub average_hit_points: bool,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            advantage_conflict: AdvantageConflict::Reject,
            massive_damage: true,
            average_hit_points: false,
        }
    }
}

impl RulesConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a JSON document. Missing fields keep their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Set the advantage/disadvantage conflict policy.
    pub fn with_advantage_conflict(mut self, policy: AdvantageConflict) -> Self {
        self.advantage_conflict = policy;
        self
    }

    /// Enable or disable the massive damage rule.
    pub fn with_massive_damage(mut self, enabled: bool) -> Self {
        self.massive_damage = enabled;
        self
    }

    /// Force average hit points on every level-up.
    pub fn with_average_hit_points(mut self, enabled: bool) -> Self {
        self.average_hit_points = enabled;
        self
    }
}
