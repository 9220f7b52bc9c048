//! Initiative and turn order.
//!
//! Order is highest total first. Ties go to the higher dexterity modifier,
//! then to whoever rolled first. Every operation returns a new
//! [`CombatOrder`]; the caller serializes updates per encounter.

use crate::character::{Ability, AbilityScores, CharacterId};
use crate::dice::{Advantage, DiceNotation};
use crate::error::{Result, RulesError};
use chrono::{DateTime, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use tracing::debug;

/// One participant's initiative roll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitiativeEntry {
    pub participant_id: CharacterId,
    pub name: String,
    pub raw_roll: u32,
    pub modifier: i32,
    pub total: i32,
    pub rolled_at: DateTime<Utc>,
}

/// Roll initiative with the OS random source.
pub fn roll_initiative(
    participant_id: CharacterId,
    name: &str,
    ability_scores: &AbilityScores,
    bonuses: &[i32],
) -> InitiativeEntry {
    roll_initiative_with_rng(participant_id, name, ability_scores, bonuses, &mut OsRng)
}

/// d20 + dexterity modifier + flat bonuses, stamped with the current time.
pub fn roll_initiative_with_rng<R: RngCore + ?Sized>(
    participant_id: CharacterId,
    name: &str,
    ability_scores: &AbilityScores,
    bonuses: &[i32],
    rng: &mut R,
) -> InitiativeEntry {
    roll_initiative_at(participant_id, name, ability_scores, bonuses, Utc::now(), rng)
}

/// Roll initiative with an explicit `rolled_at`, for callers that order
/// simultaneous rolls themselves.
pub fn roll_initiative_at<R: RngCore + ?Sized>(
    participant_id: CharacterId,
    name: &str,
    ability_scores: &AbilityScores,
    bonuses: &[i32],
    rolled_at: DateTime<Utc>,
    rng: &mut R,
) -> InitiativeEntry {
    let modifier = bonuses.iter().fold(
        i32::from(ability_scores.modifier(Ability::Dexterity)),
        |acc, &bonus| acc.saturating_add(bonus),
    );
    let roll = DiceNotation::d20(modifier).roll_with_rng(Advantage::Normal, rng);

    InitiativeEntry {
        participant_id,
        name: name.to_string(),
        raw_roll: roll.results.first().copied().unwrap_or_default(),
        modifier,
        total: roll.total,
        rolled_at,
    }
}

/// Turn order for one encounter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombatOrder {
    /// Participant ids in acting order.
    pub order: Vec<CharacterId>,
    pub current_index: usize,
    pub round: u32,
    /// Entries in acting order.
    pub entries: Vec<InitiativeEntry>,
    /// Tie-break data kept so late joiners can be re-sorted.
    pub dex_modifiers: HashMap<CharacterId, i8>,
}

/// Sort entries into a fresh order starting at round 1.
///
/// Highest total first, then higher dexterity modifier (missing from
/// `dex_modifiers` counts as 0), then earlier `rolled_at`. The sort is
/// stable: entries whose timestamps are identical, as rolls made within one
/// clock tick can be, keep the order they have in `entries`. Use
/// [`roll_initiative_at`] to control the timestamps.
pub fn determine_order(
    entries: &[InitiativeEntry],
    dex_modifiers: &HashMap<CharacterId, i8>,
) -> CombatOrder {
    let sorted = sort_entries(entries.to_vec(), dex_modifiers);
    CombatOrder {
        order: sorted.iter().map(|e| e.participant_id).collect(),
        current_index: 0,
        round: 1,
        entries: sorted,
        dex_modifiers: dex_modifiers.clone(),
    }
}

fn sort_entries(
    mut entries: Vec<InitiativeEntry>,
    dex_modifiers: &HashMap<CharacterId, i8>,
) -> Vec<InitiativeEntry> {
    let dex = |entry: &InitiativeEntry| {
        dex_modifiers
            .get(&entry.participant_id)
            .copied()
            .unwrap_or_default()
    };
    entries.sort_by(|a, b| {
        b.total
            .cmp(&a.total)
            .then_with(|| dex(b).cmp(&dex(a)))
            .then_with(|| a.rolled_at.cmp(&b.rolled_at))
    });
    entries
}

impl CombatOrder {
    /// Who is acting now.
    pub fn current_participant(&self) -> Option<CharacterId> {
        self.order.get(self.current_index).copied()
    }

    pub fn participants(&self) -> &[CharacterId] {
        &self.order
    }

    pub fn entry(&self, id: CharacterId) -> Option<&InitiativeEntry> {
        self.entries.iter().find(|e| e.participant_id == id)
    }

    /// Move to the next participant, starting a new round after the last.
    pub fn advance_turn(&self) -> Result<CombatOrder> {
        if self.order.is_empty() {
            return Err(RulesError::invalid_state(
                "cannot advance turn with no participants",
            ));
        }
        let mut next = self.clone();
        next.current_index += 1;
        if next.current_index >= next.order.len() {
            next.current_index = 0;
            next.round += 1;
        }
        debug!(round = next.round, index = next.current_index, "turn advanced");
        Ok(next)
    }

    /// Drop a participant (death, flight). The next participant in line
    /// inherits the vacated slot; the round number is unchanged.
    pub fn remove_participant(&self, id: CharacterId) -> Result<CombatOrder> {
        let position = self
            .order
            .iter()
            .position(|&p| p == id)
            .ok_or_else(|| RulesError::invalid_state(format!("{id} is not in combat")))?;

        let mut next = self.clone();
        next.order.remove(position);
        next.entries.retain(|e| e.participant_id != id);
        next.dex_modifiers.remove(&id);

        if position < next.current_index {
            next.current_index -= 1;
        }
        if next.current_index >= next.order.len() {
            next.current_index = 0;
        }
        debug!(participant = %id, round = next.round, "participant removed");
        Ok(next)
    }

    /// Insert a late joiner and re-sort. Whoever was acting keeps the turn.
    pub fn add_participant(
        &self,
        entry: InitiativeEntry,
        dex_modifier: i8,
    ) -> Result<CombatOrder> {
        if self.order.contains(&entry.participant_id) {
            return Err(RulesError::invalid_state(format!(
                "{} is already in combat",
                entry.participant_id
            )));
        }
        let acting = self.current_participant();

        let mut dex_modifiers = self.dex_modifiers.clone();
        dex_modifiers.insert(entry.participant_id, dex_modifier);
        let mut entries = self.entries.clone();
        entries.push(entry);

        let mut next = determine_order(&entries, &dex_modifiers);
        next.round = self.round;
        next.current_index = acting
            .and_then(|id| next.order.iter().position(|&p| p == id))
            .unwrap_or(0);
        Ok(next)
    }

    /// True once at most one side remains among participants still in the
    /// order. Participants without a listed side are ignored.
    pub fn is_combat_over<A: Eq + Hash>(&self, sides: &HashMap<CharacterId, A>) -> bool {
        let remaining: HashSet<&A> = self.order.iter().filter_map(|id| sides.get(id)).collect();
        remaining.len() <= 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{at_second, sample_entry, ScriptedDice};

    fn three_way() -> (CombatOrder, [CharacterId; 3]) {
        let a = sample_entry("A", 15, 0);
        let b = sample_entry("B", 15, 1);
        let c = sample_entry("C", 12, 2);
        let ids = [a.participant_id, b.participant_id, c.participant_id];
        let dex = HashMap::from([(ids[0], 2), (ids[1], 3), (ids[2], 5)]);
        (determine_order(&[a, b, c], &dex), ids)
    }

    #[test]
    fn test_roll_initiative_adds_dex_and_bonuses() {
        let mut rng = ScriptedDice::new([11]);
        let scores = AbilityScores::new(10, 16, 10, 10, 10, 10);
        let entry =
            roll_initiative_with_rng(CharacterId::new(), "Scout", &scores, &[5, 1], &mut rng);
        assert_eq!(entry.raw_roll, 11);
        assert_eq!(entry.modifier, 9);
        assert_eq!(entry.total, 20);
    }

    #[test]
    fn test_ties_break_on_dexterity() {
        let (order, [a, b, c]) = three_way();
        assert_eq!(order.order, vec![b, a, c]);
        assert_eq!(order.round, 1);
        assert_eq!(order.current_participant(), Some(b));
    }

    #[test]
    fn test_full_ties_keep_roll_order() {
        let first = sample_entry("First", 10, 1);
        let second = sample_entry("Second", 10, 2);
        let ids = (first.participant_id, second.participant_id);
        let order = determine_order(&[second, first], &HashMap::new());
        assert_eq!(order.order, vec![ids.0, ids.1]);
    }

    #[test]
    fn test_identical_timestamps_keep_input_order() {
        let scores = AbilityScores::new(10, 10, 10, 10, 10, 10);
        let at = at_second(0);
        let mut rng = ScriptedDice::new([12, 12, 12]);
        let early = roll_initiative_at(CharacterId::new(), "Early", &scores, &[], at, &mut rng);
        let late = roll_initiative_at(
            CharacterId::new(),
            "Late",
            &scores,
            &[],
            at_second(1),
            &mut rng,
        );
        let twin = roll_initiative_at(CharacterId::new(), "Twin", &scores, &[], at, &mut rng);
        let ids = [early.participant_id, late.participant_id, twin.participant_id];

        let order = determine_order(&[late, twin, early], &HashMap::new());
        // twin and early share a timestamp, so twin stays ahead as given
        assert_eq!(order.order, vec![ids[2], ids[0], ids[1]]);
    }

    #[test]
    fn test_advance_wraps_to_next_round() {
        let (order, [a, b, c]) = three_way();
        let order = order.advance_turn().unwrap();
        assert_eq!(order.current_participant(), Some(a));
        let order = order.advance_turn().unwrap();
        assert_eq!(order.current_participant(), Some(c));
        let order = order.advance_turn().unwrap();
        assert_eq!(order.current_participant(), Some(b));
        assert_eq!(order.round, 2);
    }

    #[test]
    fn test_advance_empty_is_invalid() {
        let order = determine_order(&[], &HashMap::new());
        assert!(matches!(order.advance_turn(), Err(RulesError::InvalidState(_))));
        assert_eq!(order.current_participant(), None);
    }

    #[test]
    fn test_removing_acting_participant_passes_turn() {
        let (order, [a, b, c]) = three_way();
        let order = order.advance_turn().unwrap(); // A acting
        let order = order.remove_participant(a).unwrap();
        assert_eq!(order.current_participant(), Some(c));
        assert_eq!(order.order, vec![b, c]);
        assert_eq!(order.round, 1);
    }

    #[test]
    fn test_removing_last_acting_participant_wraps_to_zero() {
        let (order, [_, b, c]) = three_way();
        let order = order.advance_turn().unwrap().advance_turn().unwrap(); // C acting
        let order = order.remove_participant(c).unwrap();
        assert_eq!(order.current_index, 0);
        assert_eq!(order.current_participant(), Some(b));
        assert_eq!(order.round, 1);
    }

    #[test]
    fn test_removing_earlier_participant_keeps_actor() {
        let (order, [a, b, c]) = three_way();
        let order = order.advance_turn().unwrap().advance_turn().unwrap(); // C acting
        let order = order.remove_participant(b).unwrap();
        assert_eq!(order.current_participant(), Some(c));
        assert_eq!(order.order, vec![a, c]);
    }

    #[test]
    fn test_removing_only_participant_empties_order() {
        let solo = sample_entry("Solo", 14, 0);
        let id = solo.participant_id;
        let order = determine_order(&[solo], &HashMap::from([(id, 1)]));
        let order = order.advance_turn().unwrap();
        assert_eq!(order.round, 2);

        let order = order.remove_participant(id).unwrap();
        assert!(order.order.is_empty());
        assert!(order.entries.is_empty());
        assert!(order.dex_modifiers.is_empty());
        assert_eq!(order.current_index, 0);
        assert_eq!(order.current_participant(), None);
        assert_eq!(order.round, 2);
        assert!(matches!(order.advance_turn(), Err(RulesError::InvalidState(_))));
    }

    #[test]
    fn test_remove_unknown_is_invalid() {
        let (order, _) = three_way();
        assert!(order.remove_participant(CharacterId::new()).is_err());
    }

    #[test]
    fn test_late_joiner_is_sorted_in() {
        let (order, [a, b, c]) = three_way();
        let order = order.advance_turn().unwrap(); // A acting
        let summon = sample_entry("Summon", 14, 10);
        let summon_id = summon.participant_id;
        let order = order.add_participant(summon, 0).unwrap();
        assert_eq!(order.order, vec![b, a, summon_id, c]);
        assert_eq!(order.current_participant(), Some(a));
        assert_eq!(order.round, 1);
    }

    #[test]
    fn test_join_empty_order() {
        let order = determine_order(&[], &HashMap::new());
        let joiner = sample_entry("Joiner", 9, 0);
        let id = joiner.participant_id;

        let order = order.add_participant(joiner, 2).unwrap();
        assert_eq!(order.order, vec![id]);
        assert_eq!(order.current_index, 0);
        assert_eq!(order.current_participant(), Some(id));
        assert_eq!(order.round, 1);
        assert_eq!(order.dex_modifiers.get(&id), Some(&2));
    }

    #[test]
    fn test_duplicate_join_is_invalid() {
        let (order, _) = three_way();
        let existing = order.entries[0].clone();
        assert!(order.add_participant(existing, 0).is_err());
    }

    #[test]
    fn test_combat_over_when_one_side_remains() {
        let (order, [a, b, c]) = three_way();
        let sides = HashMap::from([(a, "party"), (b, "party"), (c, "goblins")]);
        assert!(!order.is_combat_over(&sides));
        let order = order.remove_participant(c).unwrap();
        assert!(order.is_combat_over(&sides));
    }
}
