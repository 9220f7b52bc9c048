//! Death saving throws and hit points at the edge of death.
//!
//! A participant at exactly 0 HP is `Dying` and rolls a d20 each turn:
//! 10+ is a success, below 10 a failure, a natural 1 two failures and a
//! natural 20 brings them back with 1 HP. Three successes stabilize, three
//! failures kill. `Stabilized` and `Dead` are terminal for the save
//! protocol; only healing moves a stabilized participant on.

use crate::config::RulesConfig;
use crate::dice::{Advantage, DiceNotation, DiceRoll};
use crate::error::{Result, RulesError};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Total a death save must reach to count as a success.
pub const DEATH_SAVE_DC: i32 = 10;

const MAX_MARKS: u8 = 3;

/// Where a participant at 0 HP stands.
///
/// A `Dying` track holds at most two of each mark; the third resolves it.
/// Deserialization rejects counters outside `0..=2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "status",
    rename_all = "snake_case",
    try_from = "RawDeathSaveState"
)]
pub enum DeathSaveState {
    Dying { successes: u8, failures: u8 },
    Stabilized,
    Dead,
}

#[derive(Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum RawDeathSaveState {
    Dying { successes: u8, failures: u8 },
    Stabilized,
    Dead,
}

impl TryFrom<RawDeathSaveState> for DeathSaveState {
    type Error = RulesError;

    fn try_from(raw: RawDeathSaveState) -> Result<Self> {
        Ok(match raw {
            RawDeathSaveState::Dying {
                successes,
                failures,
            } => {
                check_marks("death save successes", successes)?;
                check_marks("death save failures", failures)?;
                DeathSaveState::Dying {
                    successes,
                    failures,
                }
            }
            RawDeathSaveState::Stabilized => DeathSaveState::Stabilized,
            RawDeathSaveState::Dead => DeathSaveState::Dead,
        })
    }
}

fn check_marks(what: &'static str, marks: u8) -> Result<()> {
    if marks >= MAX_MARKS {
        return Err(RulesError::out_of_range(
            what,
            marks.into(),
            0,
            (MAX_MARKS - 1).into(),
        ));
    }
    Ok(())
}

impl Default for DeathSaveState {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of one death saving throw.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeathSaveOutcome {
    pub state: DeathSaveState,
    pub roll: DiceRoll,
    /// Hit points the caller must restore (1 on a natural 20).
    pub regained_hp: Option<i32>,
    pub description: String,
}

/// A participant brought back above 0 HP by healing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recovery {
    pub state: DeathSaveState,
    pub hit_points: i32,
}

impl DeathSaveState {
    /// Fresh state for a participant who just dropped to 0 HP.
    pub fn new() -> Self {
        DeathSaveState::Dying {
            successes: 0,
            failures: 0,
        }
    }

    pub fn successes(&self) -> u8 {
        match self {
            DeathSaveState::Dying { successes, .. } => *successes,
            _ => 0,
        }
    }

    pub fn failures(&self) -> u8 {
        match self {
            DeathSaveState::Dying { failures, .. } => *failures,
            _ => 0,
        }
    }

    pub fn is_stabilized(&self) -> bool {
        matches!(self, DeathSaveState::Stabilized)
    }

    pub fn is_dead(&self) -> bool {
        matches!(self, DeathSaveState::Dead)
    }

    fn require_dying(&self, operation: &str) -> Result<(u8, u8)> {
        match *self {
            DeathSaveState::Dying {
                successes,
                failures,
            } => {
                check_marks("death save successes", successes)?;
                check_marks("death save failures", failures)?;
                Ok((successes, failures))
            }
            DeathSaveState::Stabilized => Err(RulesError::invalid_state(format!(
                "cannot {operation}: participant is stabilized"
            ))),
            DeathSaveState::Dead => Err(RulesError::invalid_state(format!(
                "cannot {operation}: participant is dead"
            ))),
        }
    }

    /// Roll a death save with the OS random source.
    pub fn make_death_save(&self) -> Result<DeathSaveOutcome> {
        self.make_death_save_with_rng(&mut OsRng)
    }

    pub fn make_death_save_with_rng<R: RngCore + ?Sized>(
        &self,
        rng: &mut R,
    ) -> Result<DeathSaveOutcome> {
        self.require_dying("make a death save")?;
        let roll = DiceNotation::d20(0).roll_with_rng(Advantage::Normal, rng);
        self.resolve_save(roll)
    }

    /// Apply an already-rolled d20 to the save track.
    pub fn resolve_save(&self, roll: DiceRoll) -> Result<DeathSaveOutcome> {
        let (successes, failures) = self.require_dying("make a death save")?;

        let (state, regained_hp, description) = if roll.critical {
            // history is dropped: a natural 20 always ends the track
            (
                DeathSaveState::Stabilized,
                Some(1),
                "Natural 20! Regains 1 HP and wakes up".to_string(),
            )
        } else if roll.fumble {
            let state = with_failures(successes, failures.saturating_add(2));
            (state, None, format!("Natural 1! Two failures{}", suffix(state)))
        } else if roll.total >= DEATH_SAVE_DC {
            let state = with_successes(successes.saturating_add(1), failures);
            (
                state,
                None,
                format!("Rolled {}: success{}", roll.total, suffix(state)),
            )
        } else {
            let state = with_failures(successes, failures.saturating_add(1));
            (
                state,
                None,
                format!("Rolled {}: failure{}", roll.total, suffix(state)),
            )
        };

        debug!(from = ?self, to = ?state, natural = roll.total, "death save resolved");
        Ok(DeathSaveOutcome {
            state,
            roll,
            regained_hp,
            description,
        })
    }

    /// Damage taken while at 0 HP.
    ///
    /// One failure, two on a critical hit. Damage of at least `max_hp` kills
    /// outright when `massive_damage` is enabled, whatever the counters say.
    pub fn take_damage(
        &self,
        damage: i32,
        max_hp: i32,
        is_critical: bool,
        massive_damage: bool,
    ) -> Result<DeathSaveState> {
        let (successes, failures) = self.require_dying("take damage at 0 HP")?;

        let state = if massive_damage && damage >= max_hp {
            DeathSaveState::Dead
        } else {
            let marks = if is_critical { 2 } else { 1 };
            with_failures(successes, failures.saturating_add(marks))
        };
        debug!(from = ?self, to = ?state, damage, is_critical, "damage at 0 HP");
        Ok(state)
    }

    /// Healing at 0 HP. Counters reset and the participant wakes with the
    /// healed amount.
    pub fn heal(&self, amount: i32) -> Result<Recovery> {
        if self.is_dead() {
            return Err(RulesError::invalid_state("cannot heal: participant is dead"));
        }
        if amount < 1 {
            return Err(RulesError::out_of_range(
                "healing",
                amount.into(),
                1,
                i32::MAX.into(),
            ));
        }
        debug!(from = ?self, amount, "healed from 0 HP");
        Ok(Recovery {
            state: DeathSaveState::Stabilized,
            hit_points: amount,
        })
    }
}

fn with_successes(successes: u8, failures: u8) -> DeathSaveState {
    if successes >= MAX_MARKS {
        DeathSaveState::Stabilized
    } else {
        DeathSaveState::Dying {
            successes,
            failures,
        }
    }
}

fn with_failures(successes: u8, failures: u8) -> DeathSaveState {
    if failures >= MAX_MARKS {
        DeathSaveState::Dead
    } else {
        DeathSaveState::Dying {
            successes,
            failures,
        }
    }
}

fn suffix(state: DeathSaveState) -> String {
    match state {
        DeathSaveState::Dying {
            successes,
            failures,
        } => format!(" ({successes}/3 successes, {failures}/3 failures)"),
        DeathSaveState::Stabilized => ". Stable!".to_string(),
        DeathSaveState::Dead => ". Dead.".to_string(),
    }
}

// ============================================================================
// Hit Points
// ============================================================================

/// Hit points tracking, including the save track while at 0.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HitPoints {
    pub current: i32,
    pub maximum: i32,
    pub temporary: i32,
    /// Present only while at 0 HP (or dead).
    pub death_saves: Option<DeathSaveState>,
}

impl HitPoints {
    pub fn new(maximum: i32) -> Self {
        Self {
            current: maximum,
            maximum,
            temporary: 0,
            death_saves: None,
        }
    }

    pub fn is_dead(&self) -> bool {
        self.death_saves.is_some_and(|s| s.is_dead())
    }

    pub fn is_unconscious(&self) -> bool {
        self.current <= 0
    }

    /// Temporary hit points don't stack; the larger pool wins.
    pub fn with_temp_hp(&self, amount: i32) -> Self {
        Self {
            temporary: self.temporary.max(amount),
            ..self.clone()
        }
    }

    /// Apply damage. Temporary HP soaks first. Dropping to 0 starts the
    /// save track unless the overflow alone reaches max HP (massive
    /// damage, when enabled in `config`); damage at 0 feeds the track.
    pub fn apply_damage(
        &self,
        amount: i32,
        is_critical: bool,
        config: &RulesConfig,
    ) -> Result<HitPoints> {
        let massive_damage = config.massive_damage;
        if self.is_dead() {
            return Err(RulesError::invalid_state("cannot damage: participant is dead"));
        }
        if amount < 0 {
            return Err(RulesError::out_of_range(
                "damage",
                amount.into(),
                0,
                i32::MAX.into(),
            ));
        }

        let mut next = self.clone();
        let absorbed = next.temporary.clamp(0, amount);
        next.temporary = next.temporary.saturating_sub(absorbed);
        let remaining = amount - absorbed;

        if next.current <= 0 {
            if remaining == 0 {
                return Ok(next);
            }
            // a stabilized creature that takes damage starts dying again
            let track = match next.death_saves {
                Some(track @ DeathSaveState::Dying { .. }) => track,
                _ => DeathSaveState::new(),
            };
            next.death_saves =
                Some(track.take_damage(remaining, next.maximum, is_critical, massive_damage)?);
            return Ok(next);
        }

        next.current = next.current.saturating_sub(remaining);
        if next.current <= 0 {
            let overflow = next.current.saturating_neg();
            next.current = 0;
            next.death_saves = Some(if massive_damage && overflow >= next.maximum {
                DeathSaveState::Dead
            } else {
                DeathSaveState::new()
            });
            debug!(overflow, dead = next.is_dead(), "dropped to 0 HP");
        }
        Ok(next)
    }

    /// Heal, clamped to max. Healing at 0 ends the save track.
    pub fn heal(&self, amount: i32) -> Result<HitPoints> {
        let mut next = self.clone();
        match self.death_saves {
            Some(track) => {
                let recovery = track.heal(amount)?;
                next.current = recovery.hit_points.min(next.maximum);
                next.death_saves = None;
            }
            None => {
                if amount < 0 {
                    return Err(RulesError::out_of_range(
                        "healing",
                        amount.into(),
                        0,
                        i32::MAX.into(),
                    ));
                }
                next.current = next.current.saturating_add(amount).min(next.maximum);
            }
        }
        Ok(next)
    }

    /// Roll a death save and apply its hit point side effect.
    pub fn make_death_save_with_rng<R: RngCore + ?Sized>(
        &self,
        rng: &mut R,
    ) -> Result<(HitPoints, DeathSaveOutcome)> {
        let track = self
            .death_saves
            .ok_or_else(|| RulesError::invalid_state("not at 0 HP"))?;
        let outcome = track.make_death_save_with_rng(rng)?;

        let mut next = self.clone();
        match outcome.regained_hp {
            Some(hp) => {
                next.current = hp;
                next.death_saves = None;
            }
            None => next.death_saves = Some(outcome.state),
        }
        Ok((next, outcome))
    }
}
