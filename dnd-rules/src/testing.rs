//! Testing utilities for the rules engine.
//!
//! This module provides tools for deterministic tests:
//! - `ScriptedDice`, a random source that replays scripted die faces
//! - Sample records for common scenarios

use crate::character::{AbilityScores, CharacterId};
use crate::initiative::InitiativeEntry;
use chrono::{DateTime, TimeZone, Utc};
use rand::RngCore;
use std::collections::VecDeque;

/// A random source that replays scripted values.
///
/// Faces passed to [`ScriptedDice::new`] come back unchanged from any die
/// large enough to show them: face `f` is emitted as the raw draw `f - 1`,
/// which rejection sampling maps to `f`. Panics when the script runs out,
/// so a test that rolls more dice than expected fails loudly.
#[derive(Debug, Clone, Default)]
pub struct ScriptedDice {
    draws: VecDeque<u32>,
}

impl ScriptedDice {
    /// Script die faces, in roll order.
    pub fn new(faces: impl IntoIterator<Item = u32>) -> Self {
        Self {
            draws: faces
                .into_iter()
                .map(|face| {
                    assert!(face >= 1, "die faces start at 1");
                    face - 1
                })
                .collect(),
        }
    }

    /// Script raw 32-bit draws, bypassing the face mapping.
    pub fn from_raw(draws: impl IntoIterator<Item = u32>) -> Self {
        Self {
            draws: draws.into_iter().collect(),
        }
    }

    /// Number of scripted draws not yet consumed.
    pub fn remaining(&self) -> usize {
        self.draws.len()
    }
}

impl RngCore for ScriptedDice {
    fn next_u32(&mut self) -> u32 {
        self.draws
            .pop_front()
            .expect("ScriptedDice ran out of scripted rolls")
    }

    fn next_u64(&mut self) -> u64 {
        (u64::from(self.next_u32()) << 32) | u64::from(self.next_u32())
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        for chunk in dest.chunks_mut(4) {
            let bytes = self.next_u32().to_le_bytes();
            chunk.copy_from_slice(&bytes[..chunk.len()]);
        }
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.fill_bytes(dest);
        Ok(())
    }
}

/// A fixed timestamp `seconds` after the epoch, for ordering entries.
pub fn at_second(seconds: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(seconds, 0).single().unwrap_or_default()
}

/// An initiative entry with a known total, rolled at `seconds`.
pub fn sample_entry(name: &str, total: i32, seconds: i64) -> InitiativeEntry {
    InitiativeEntry {
        participant_id: CharacterId::new(),
        name: name.to_string(),
        raw_roll: total.clamp(1, 20) as u32,
        modifier: total - total.clamp(1, 20),
        total,
        rolled_at: at_second(seconds),
    }
}

/// A sturdy front-liner: STR 16, DEX 14, CON 15.
pub fn sample_fighter_scores() -> AbilityScores {
    AbilityScores::new(16, 14, 15, 10, 12, 8)
}

/// A wizard: INT 16, DEX 14, CON 13.
pub fn sample_wizard_scores() -> AbilityScores {
    AbilityScores::new(8, 14, 13, 16, 12, 10)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dice::DieType;

    #[test]
    fn test_scripted_faces_replay() {
        let mut dice = ScriptedDice::new([20, 1, 6]);
        assert_eq!(DieType::D20.roll(&mut dice), 20);
        assert_eq!(DieType::D20.roll(&mut dice), 1);
        assert_eq!(DieType::D6.roll(&mut dice), 6);
        assert_eq!(dice.remaining(), 0);
    }

    #[test]
    #[should_panic(expected = "ran out")]
    fn test_exhausted_script_panics() {
        let mut dice = ScriptedDice::new([3]);
        DieType::D4.roll(&mut dice);
        DieType::D4.roll(&mut dice);
    }

    #[test]
    fn test_sample_entry_splits_total() {
        let entry = sample_entry("Goblin", 23, 5);
        assert_eq!(entry.raw_roll, 20);
        assert_eq!(entry.modifier, 3);
        assert_eq!(entry.total, 23);
    }
}
