//! Spell slots and concentration.

use crate::character::{ability_modifier, CharacterClass, CharacterId};
use crate::dice::{Advantage, DiceNotation, DiceRoll};
use crate::error::{Result, RulesError};
use chrono::{DateTime, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Highest spell level.
pub const MAX_SPELL_LEVEL: u8 = 9;

// ============================================================================
// Caster Progressions
// ============================================================================

/// How a class gains spell slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CasterType {
    /// Bard, cleric, druid, sorcerer, wizard.
    Full,
    /// Paladin, ranger.
    Half,
    /// Eldritch knight, arcane trickster.
    Third,
    /// Warlock: few slots, all of one level, back on a short rest.
    Pact,
    None,
}

impl CasterType {
    /// Resolve a class or spellcasting subclass name.
    pub fn for_class_name(name: &str) -> Result<CasterType> {
        let normalized = name.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "eldritch knight" | "arcane trickster" => Ok(CasterType::Third),
            _ => Ok(name.parse::<CharacterClass>()?.caster_type()),
        }
    }

    /// Full-caster level whose slot row this progression uses.
    fn effective_level(&self, level: u8) -> u8 {
        match self {
            CasterType::Full | CasterType::Pact => level,
            CasterType::Half => level.div_ceil(2),
            CasterType::Third => level.div_ceil(3),
            CasterType::None => 0,
        }
    }
}

impl CharacterClass {
    pub fn caster_type(&self) -> CasterType {
        match self {
            CharacterClass::Bard
            | CharacterClass::Cleric
            | CharacterClass::Druid
            | CharacterClass::Sorcerer
            | CharacterClass::Wizard => CasterType::Full,
            CharacterClass::Paladin | CharacterClass::Ranger => CasterType::Half,
            CharacterClass::Warlock => CasterType::Pact,
            CharacterClass::Barbarian
            | CharacterClass::Fighter
            | CharacterClass::Monk
            | CharacterClass::Rogue => CasterType::None,
        }
    }
}

/// Slots per spell level (1st..9th) for a full caster of levels 1-20.
const FULL_CASTER_SLOTS: [[u8; 9]; 20] = [
    [2, 0, 0, 0, 0, 0, 0, 0, 0],
    [3, 0, 0, 0, 0, 0, 0, 0, 0],
    [4, 2, 0, 0, 0, 0, 0, 0, 0],
    [4, 3, 0, 0, 0, 0, 0, 0, 0],
    [4, 3, 2, 0, 0, 0, 0, 0, 0],
    [4, 3, 3, 0, 0, 0, 0, 0, 0],
    [4, 3, 3, 1, 0, 0, 0, 0, 0],
    [4, 3, 3, 2, 0, 0, 0, 0, 0],
    [4, 3, 3, 3, 1, 0, 0, 0, 0],
    [4, 3, 3, 3, 2, 0, 0, 0, 0],
    [4, 3, 3, 3, 2, 1, 0, 0, 0],
    [4, 3, 3, 3, 2, 1, 0, 0, 0],
    [4, 3, 3, 3, 2, 1, 1, 0, 0],
    [4, 3, 3, 3, 2, 1, 1, 0, 0],
    [4, 3, 3, 3, 2, 1, 1, 1, 0],
    [4, 3, 3, 3, 2, 1, 1, 1, 0],
    [4, 3, 3, 3, 2, 1, 1, 1, 1],
    [4, 3, 3, 3, 3, 1, 1, 1, 1],
    [4, 3, 3, 3, 3, 2, 1, 1, 1],
    [4, 3, 3, 3, 3, 2, 2, 1, 1],
];

/// Pact magic (slot count, slot level) for warlock levels 1-20.
const PACT_SLOTS: [(u8, u8); 20] = [
    (1, 1),
    (2, 1),
    (2, 2),
    (2, 2),
    (2, 3),
    (2, 3),
    (2, 4),
    (2, 4),
    (2, 5),
    (2, 5),
    (3, 5),
    (3, 5),
    (3, 5),
    (3, 5),
    (3, 5),
    (3, 5),
    (4, 5),
    (4, 5),
    (4, 5),
    (4, 5),
];

// ============================================================================
// Slot Table
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SlotInfo {
    pub max: u8,
    pub used: u8,
}

impl SlotInfo {
    pub fn available(&self) -> u8 {
        self.max.saturating_sub(self.used)
    }
}

/// Spell slots by level. Cantrips (level 0) are unlimited and not stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpellSlotTable {
    pub caster_type: CasterType,
    /// Index 0 holds 1st-level slots.
    pub slots: [SlotInfo; 9],
}

impl SpellSlotTable {
    /// A table with no leveled slots.
    pub fn empty(caster_type: CasterType) -> Self {
        Self {
            caster_type,
            slots: [SlotInfo::default(); 9],
        }
    }

    /// Full table for a progression at a character level.
    pub fn for_caster(caster_type: CasterType, level: u8) -> Result<Self> {
        if !(1..=20).contains(&level) {
            return Err(RulesError::out_of_range("character level", level.into(), 1, 20));
        }
        let mut table = Self::empty(caster_type);
        let row = level as usize - 1;

        match caster_type {
            CasterType::None => {}
            CasterType::Pact => {
                let (count, slot_level) = PACT_SLOTS[row];
                table.slots[slot_level as usize - 1].max = count;
            }
            _ => {
                let effective = caster_type.effective_level(level) as usize;
                for (slot, &max) in table.slots.iter_mut().zip(&FULL_CASTER_SLOTS[effective - 1]) {
                    slot.max = max;
                }
            }
        }
        Ok(table)
    }

    pub fn available(&self, level: u8) -> u8 {
        match level {
            0 => u8::MAX,
            1..=MAX_SPELL_LEVEL => self.slots[level as usize - 1].available(),
            _ => 0,
        }
    }

    pub fn has_slot(&self, level: u8) -> bool {
        self.available(level) > 0
    }

    /// Spend one slot. Spending a cantrip "slot" is a no-op.
    pub fn use_slot(&self, level: u8) -> Result<SpellSlotTable> {
        if !self.has_slot(level) {
            return Err(RulesError::NoSlotAvailable { level });
        }
        let mut next = self.clone();
        if level > 0 {
            next.slots[level as usize - 1].used += 1;
            debug!(level, remaining = next.available(level), "spell slot used");
        }
        Ok(next)
    }

    /// Lowest slot level at or above `min_level` with a slot left.
    pub fn lowest_available(&self, min_level: u8) -> Option<u8> {
        (min_level.max(1)..=MAX_SPELL_LEVEL).find(|&level| self.has_slot(level))
    }

    /// Long rest: every slot comes back.
    pub fn restore_all(&self) -> SpellSlotTable {
        let mut next = self.clone();
        for slot in &mut next.slots {
            slot.used = 0;
        }
        debug!(caster_type = ?self.caster_type, "spell slots restored");
        next
    }

    /// Short rest: only pact slots come back.
    pub fn restore_short(&self) -> SpellSlotTable {
        match self.caster_type {
            CasterType::Pact => self.restore_all(),
            _ => self.clone(),
        }
    }
}

/// Slot table for a class (or spellcasting subclass) by name.
pub fn slots_for_class(class_name: &str, level: u8) -> Result<SpellSlotTable> {
    SpellSlotTable::for_caster(CasterType::for_class_name(class_name)?, level)
}

// ============================================================================
// Spells
// ============================================================================

/// Schools of magic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SpellSchool {
    Abjuration,
    Conjuration,
    Divination,
    Enchantment,
    Evocation,
    Illusion,
    Necromancy,
    Transmutation,
}

impl SpellSchool {
    pub fn name(&self) -> &'static str {
        match self {
            SpellSchool::Abjuration => "Abjuration",
            SpellSchool::Conjuration => "Conjuration",
            SpellSchool::Divination => "Divination",
            SpellSchool::Enchantment => "Enchantment",
            SpellSchool::Evocation => "Evocation",
            SpellSchool::Illusion => "Illusion",
            SpellSchool::Necromancy => "Necromancy",
            SpellSchool::Transmutation => "Transmutation",
        }
    }
}

impl fmt::Display for SpellSchool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// The parts of a catalog spell the ledger cares about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpellInfo {
    pub name: String,
    /// 0 for cantrips.
    pub level: u8,
    pub school: SpellSchool,
    pub concentration: bool,
    pub ritual: bool,
    /// Duration in combat rounds (10 per minute).
    pub duration_rounds: u32,
}

impl SpellInfo {
    pub fn new(name: impl Into<String>, level: u8, school: SpellSchool) -> Self {
        Self {
            name: name.into(),
            level,
            school,
            concentration: false,
            ritual: false,
            duration_rounds: 0,
        }
    }

    /// Mark as a concentration spell lasting `rounds`.
    pub fn with_concentration(mut self, rounds: u32) -> Self {
        self.concentration = true;
        self.duration_rounds = rounds;
        self
    }

    pub fn with_ritual(mut self) -> Self {
        self.ritual = true;
        self
    }

    pub fn is_cantrip(&self) -> bool {
        self.level == 0
    }
}

/// 8 + proficiency + spellcasting ability modifier.
pub fn spell_save_dc(ability_modifier: i8, proficiency_bonus: i8) -> i32 {
    8 + i32::from(proficiency_bonus) + i32::from(ability_modifier)
}

pub fn spell_attack_bonus(ability_modifier: i8, proficiency_bonus: i8) -> i32 {
    i32::from(proficiency_bonus) + i32::from(ability_modifier)
}

/// Damage dice of a scaling cantrip: one more die at levels 5, 11 and 17.
pub fn cantrip_dice_count(caster_level: u8) -> u32 {
    match caster_level {
        0..=4 => 1,
        5..=10 => 2,
        11..=16 => 3,
        _ => 4,
    }
}

// ============================================================================
// Concentration
// ============================================================================

/// An active concentration spell. A caster holds at most one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Concentration {
    pub spell_name: String,
    pub spell_level: u8,
    pub rounds_remaining: u32,
    pub caster_id: CharacterId,
    pub started_at: DateTime<Utc>,
}

/// Outcome of a constitution save to keep concentrating.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConcentrationCheck {
    pub success: bool,
    pub dc: i32,
    pub roll: DiceRoll,
}

/// Fails when the caster is concentrating and `spell` needs concentration too.
pub fn can_cast(current: Option<&Concentration>, spell: &SpellInfo) -> Result<()> {
    match current {
        Some(active) if spell.concentration => Err(RulesError::invalid_state(format!(
            "already concentrating on {}",
            active.spell_name
        ))),
        _ => Ok(()),
    }
}

/// Begin concentrating on `spell`, cast at `slot_level`.
pub fn start_concentration(
    caster_id: CharacterId,
    spell: &SpellInfo,
    slot_level: u8,
) -> Concentration {
    debug!(
        caster = %caster_id,
        spell = %spell.name,
        rounds = spell.duration_rounds,
        "concentration started"
    );
    Concentration {
        spell_name: spell.name.clone(),
        spell_level: slot_level,
        rounds_remaining: spell.duration_rounds,
        caster_id,
        started_at: Utc::now(),
    }
}

/// DC to keep concentrating after taking `damage`.
pub fn concentration_dc(damage: i32) -> i32 {
    (damage / 2).max(10)
}

pub fn concentration_check(
    damage: i32,
    constitution: u8,
    proficiency_bonus: i8,
    is_proficient: bool,
) -> ConcentrationCheck {
    concentration_check_with_rng(damage, constitution, proficiency_bonus, is_proficient, &mut OsRng)
}

/// Constitution save against `max(10, damage / 2)`.
pub fn concentration_check_with_rng<R: RngCore + ?Sized>(
    damage: i32,
    constitution: u8,
    proficiency_bonus: i8,
    is_proficient: bool,
    rng: &mut R,
) -> ConcentrationCheck {
    let dc = concentration_dc(damage);
    let mut modifier = i32::from(ability_modifier(constitution));
    if is_proficient {
        modifier += i32::from(proficiency_bonus);
    }
    let roll = DiceNotation::d20(modifier).roll_with_rng(Advantage::Normal, rng);
    ConcentrationCheck {
        success: roll.meets_dc(dc),
        dc,
        roll,
    }
}

/// One round passes. `None` once the spell runs out.
pub fn decrement_concentration(concentration: &Concentration) -> Option<Concentration> {
    let rounds_remaining = concentration.rounds_remaining.saturating_sub(1);
    if rounds_remaining == 0 {
        debug!(
            caster = %concentration.caster_id,
            spell = %concentration.spell_name,
            "concentration expired"
        );
        return None;
    }
    Some(Concentration {
        rounds_remaining,
        ..concentration.clone()
    })
}

// ============================================================================
// Ledger
// ============================================================================

/// One caster's slots and concentration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpellcastingLedger {
    pub caster_id: CharacterId,
    pub slots: SpellSlotTable,
    pub concentration: Option<Concentration>,
}

/// Result of [`SpellcastingLedger::cast`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CastOutcome {
    pub ledger: SpellcastingLedger,
    /// Slot level spent, if any.
    pub slot_used: Option<u8>,
    /// Concentration dropped to make room for the new spell.
    pub ended_concentration: Option<Concentration>,
    pub description: String,
}

impl SpellcastingLedger {
    pub fn new(caster_id: CharacterId, slots: SpellSlotTable) -> Self {
        Self {
            caster_id,
            slots,
            concentration: None,
        }
    }

    pub fn for_class(caster_id: CharacterId, class_name: &str, level: u8) -> Result<Self> {
        Ok(Self::new(caster_id, slots_for_class(class_name, level)?))
    }

    pub fn is_concentrating(&self) -> bool {
        self.concentration.is_some()
    }

    pub fn can_cast(&self, spell: &SpellInfo) -> Result<()> {
        can_cast(self.concentration.as_ref(), spell)
    }

    /// Cast `spell`, spending a slot of `slot_level`.
    ///
    /// Cantrips never spend a slot. `slot_level = None` casts a ritual
    /// spell as a ritual. A new concentration spell ends the old one.
    pub fn cast(&self, spell: &SpellInfo, slot_level: Option<u8>) -> Result<CastOutcome> {
        let mut next = self.clone();

        let slot_used = if spell.is_cantrip() {
            None
        } else {
            match slot_level {
                None if spell.ritual => None,
                None => {
                    return Err(RulesError::invalid_state(format!(
                        "{} needs a spell slot",
                        spell.name
                    )))
                }
                Some(level) => {
                    if level < spell.level || level > MAX_SPELL_LEVEL {
                        return Err(RulesError::out_of_range(
                            "slot level",
                            level.into(),
                            spell.level.into(),
                            MAX_SPELL_LEVEL.into(),
                        ));
                    }
                    next.slots = next.slots.use_slot(level)?;
                    Some(level)
                }
            }
        };

        let mut ended_concentration = None;
        if spell.concentration {
            let effective_level = slot_used.unwrap_or(spell.level);
            ended_concentration = next
                .concentration
                .replace(start_concentration(self.caster_id, spell, effective_level));
        }

        let slot_text = match slot_used {
            None if spell.is_cantrip() => String::new(),
            None => " as a ritual".to_string(),
            Some(level) if level > spell.level => format!(" (upcast at level {level})"),
            Some(level) => format!(" (level {level} slot)"),
        };
        let mut description = format!("Casts {}{}", spell.name, slot_text);
        if let Some(ended) = &ended_concentration {
            description.push_str(&format!(", ending concentration on {}", ended.spell_name));
        }

        Ok(CastOutcome {
            ledger: next,
            slot_used,
            ended_concentration,
            description,
        })
    }

    pub fn end_concentration(&self) -> SpellcastingLedger {
        if let Some(active) = &self.concentration {
            debug!(caster = %self.caster_id, spell = %active.spell_name, "concentration ended");
        }
        Self {
            concentration: None,
            ..self.clone()
        }
    }

    /// Roll to keep concentrating after damage. A failed check ends the spell.
    pub fn concentration_check_with_rng<R: RngCore + ?Sized>(
        &self,
        damage: i32,
        constitution: u8,
        proficiency_bonus: i8,
        is_proficient: bool,
        rng: &mut R,
    ) -> Result<(SpellcastingLedger, ConcentrationCheck)> {
        if self.concentration.is_none() {
            return Err(RulesError::invalid_state("not concentrating on a spell"));
        }
        let check = concentration_check_with_rng(
            damage,
            constitution,
            proficiency_bonus,
            is_proficient,
            rng,
        );
        let next = if check.success {
            self.clone()
        } else {
            self.end_concentration()
        };
        Ok((next, check))
    }

    /// Advance one round of concentration.
    pub fn tick_round(&self) -> SpellcastingLedger {
        Self {
            concentration: self.concentration.as_ref().and_then(decrement_concentration),
            ..self.clone()
        }
    }

    pub fn long_rest(&self) -> SpellcastingLedger {
        Self {
            slots: self.slots.restore_all(),
            ..self.end_concentration()
        }
    }

    pub fn short_rest(&self) -> SpellcastingLedger {
        Self {
            slots: self.slots.restore_short(),
            ..self.clone()
        }
    }
}
