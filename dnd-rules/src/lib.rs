//! D&D 5e rules engine.
//!
//! This crate provides:
//! - Unbiased dice rolling and dice notation parsing
//! - Modifier stacking, attack and damage resolution
//! - Initiative order and turn tracking
//! - Death saving throws and hit points at 0
//! - Spell slots and concentration
//! - Experience thresholds and level-up validation
//!
//! Every operation is a pure function from inputs to a new snapshot. The
//! engine keeps no state between calls; callers own persistence and
//! serialize updates to a given combat or character.
//!
//! # Quick Start
//!
//! ```
//! use dnd_rules::{
//!     AbilityScores, AttackKind, AttackRequest, DamageType, Defenses, DiceNotation,
//! };
//!
//! let scores = AbilityScores::standard_array();
//! let request = AttackRequest::new(AttackKind::Melee, scores, 2, 13);
//! let longsword = DiceNotation::parse("1d8+2").unwrap();
//! let result =
//!     dnd_rules::perform_attack(&request, &longsword, DamageType::Slashing, &Defenses::new());
//! println!("{}", result.description);
//! ```

pub mod attack;
pub mod character;
pub mod config;
pub mod death_saves;
pub mod dice;
pub mod engine;
pub mod error;
pub mod initiative;
pub mod modifiers;
pub mod progression;
pub mod spellcasting;
pub mod testing;

// Primary public API
pub use attack::{
    attack, damage, perform_attack, saving_throw, AttackKind, AttackRequest, AttackResult,
    AttackRoll, DamageRoll, DamageType, Defenses, ResistanceOutcome, SavingThrow,
};
pub use character::{
    ability_modifier, proficiency_bonus, Ability, AbilityScores, CharacterClass, CharacterId,
};
pub use config::{AdvantageConflict, RulesConfig};
pub use death_saves::{DeathSaveOutcome, DeathSaveState, HitPoints};
pub use dice::{roll_die, Advantage, DiceNotation, DiceRoll, DieType};
pub use engine::RulesEngine;
pub use error::{Result, RulesError};
pub use initiative::{
    determine_order, roll_initiative, roll_initiative_at, CombatOrder, InitiativeEntry,
};
pub use modifiers::{Modifier, ModifierCategory, ModifierStack};
pub use progression::{
    apply_level_up, can_level_up, hp_increase, validate_level_up_choices, LevelProgress,
    LevelUpChoices, LevelUpResult, ProgressionCharacter,
};
pub use spellcasting::{
    slots_for_class, CasterType, Concentration, SpellInfo, SpellSchool, SpellSlotTable,
    SpellcastingLedger,
};
