//! Config-aware entry point.
//!
//! [`RulesEngine`] carries a [`RulesConfig`] and applies its table rules
//! before delegating to the component modules. It holds no random source
//! and no mutable state, so one engine can serve any number of callers.

use crate::attack::AttackRequest;
use crate::config::RulesConfig;
use crate::death_saves::{DeathSaveState, HitPoints};
use crate::dice::{Advantage, DiceNotation, DiceRoll};
use crate::error::Result;
use crate::progression::{apply_level_up, LevelUpChoices, LevelUpResult, ProgressionCharacter};
use rand::rngs::OsRng;
use rand::RngCore;

/// Rules facade bound to one table's configuration.
#[derive(Debug, Clone, Default)]
pub struct RulesEngine {
    config: RulesConfig,
}

impl RulesEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: RulesConfig) -> Self {
        Self { config }
    }

    /// Build an engine from a JSON rules document.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(Self::with_config(RulesConfig::from_json(json)?))
    }

    pub fn config(&self) -> &RulesConfig {
        &self.config
    }

    /// Turn independent flags into an [`Advantage`] under the conflict policy.
    pub fn advantage(&self, advantage: bool, disadvantage: bool) -> Result<Advantage> {
        Advantage::from_flags(advantage, disadvantage, self.config.advantage_conflict)
    }

    /// Parse and roll with the OS random source.
    pub fn roll(&self, notation: &str, advantage: bool, disadvantage: bool) -> Result<DiceRoll> {
        self.roll_with_rng(notation, advantage, disadvantage, &mut OsRng)
    }

    pub fn roll_with_rng<R: RngCore + ?Sized>(
        &self,
        notation: &str,
        advantage: bool,
        disadvantage: bool,
        rng: &mut R,
    ) -> Result<DiceRoll> {
        let mode = self.advantage(advantage, disadvantage)?;
        Ok(DiceNotation::parse(notation)?.roll_with_rng(mode, rng))
    }

    /// Attach advantage flags to an attack request.
    pub fn prepare_attack(
        &self,
        request: AttackRequest,
        advantage: bool,
        disadvantage: bool,
    ) -> Result<AttackRequest> {
        Ok(request.with_advantage(self.advantage(advantage, disadvantage)?))
    }

    /// Damage a participant's hit points under the massive damage setting.
    pub fn apply_damage(
        &self,
        hit_points: &HitPoints,
        amount: i32,
        is_critical: bool,
    ) -> Result<HitPoints> {
        hit_points.apply_damage(amount, is_critical, &self.config)
    }

    /// Damage on an existing death-save track.
    pub fn damage_at_zero(
        &self,
        state: &DeathSaveState,
        damage: i32,
        max_hp: i32,
        is_critical: bool,
    ) -> Result<DeathSaveState> {
        state.take_damage(damage, max_hp, is_critical, self.config.massive_damage)
    }

    pub fn level_up(
        &self,
        character: &ProgressionCharacter,
        choices: &LevelUpChoices,
    ) -> Result<LevelUpResult> {
        apply_level_up(character, choices, &self.config)
    }
}
