//! Attack and damage resolution.
//!
//! An attack is a d20 plus the stacked attack bonus against the target's
//! defense. Natural 20 always hits and crits; natural 1 always misses, even
//! when the total would beat the defense. Critical damage doubles the dice,
//! never the flat modifier.

use crate::character::{Ability, AbilityScores};
use crate::dice::{Advantage, DiceNotation, DiceRoll};
use crate::modifiers::{calculate_attack_bonus, Modifier};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use tracing::debug;

/// Common D&D damage types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DamageType {
    Slashing,
    Piercing,
    Bludgeoning,
    Fire,
    Cold,
    Lightning,
    Thunder,
    Acid,
    Poison,
    Necrotic,
    Radiant,
    Force,
    Psychic,
}

impl DamageType {
    pub fn name(&self) -> &'static str {
        match self {
            DamageType::Slashing => "slashing",
            DamageType::Piercing => "piercing",
            DamageType::Bludgeoning => "bludgeoning",
            DamageType::Fire => "fire",
            DamageType::Cold => "cold",
            DamageType::Lightning => "lightning",
            DamageType::Thunder => "thunder",
            DamageType::Acid => "acid",
            DamageType::Poison => "poison",
            DamageType::Necrotic => "necrotic",
            DamageType::Radiant => "radiant",
            DamageType::Force => "force",
            DamageType::Psychic => "psychic",
        }
    }
}

impl fmt::Display for DamageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// How a target's defenses changed a damage roll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ResistanceOutcome {
    #[default]
    Normal,
    Resistant,
    Vulnerable,
    Immune,
}

/// Damage types a target resists, is vulnerable to, or ignores.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Defenses {
    pub resistances: HashSet<DamageType>,
    pub vulnerabilities: HashSet<DamageType>,
    pub immunities: HashSet<DamageType>,
}

impl Defenses {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resistant_to(mut self, damage_type: DamageType) -> Self {
        self.resistances.insert(damage_type);
        self
    }

    pub fn vulnerable_to(mut self, damage_type: DamageType) -> Self {
        self.vulnerabilities.insert(damage_type);
        self
    }

    pub fn immune_to(mut self, damage_type: DamageType) -> Self {
        self.immunities.insert(damage_type);
        self
    }

    /// Adjust a raw damage total for this damage type.
    ///
    /// Immunity wins outright. Resistance halves (rounding down) and
    /// vulnerability doubles; a target with both takes the raw amount.
    pub fn apply(&self, raw: i32, damage_type: DamageType) -> (i32, ResistanceOutcome) {
        if self.immunities.contains(&damage_type) {
            return (0, ResistanceOutcome::Immune);
        }
        let resistant = self.resistances.contains(&damage_type);
        let vulnerable = self.vulnerabilities.contains(&damage_type);
        match (resistant, vulnerable) {
            (true, false) => (raw.div_euclid(2), ResistanceOutcome::Resistant),
            (false, true) => (raw.saturating_mul(2), ResistanceOutcome::Vulnerable),
            _ => (raw, ResistanceOutcome::Normal),
        }
    }
}

/// Kind of attack being made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttackKind {
    Melee,
    Ranged,
    Spell,
}

impl AttackKind {
    /// Ability the attack keys off. Finesse and thrown weapons are an
    /// equipment concern and pick their kind before reaching here.
    pub fn ability(&self) -> Ability {
        match self {
            AttackKind::Melee => Ability::Strength,
            AttackKind::Ranged | AttackKind::Spell => Ability::Dexterity,
        }
    }
}

/// Inputs for a single attack roll.
#[derive(Debug, Clone)]
pub struct AttackRequest {
    pub kind: AttackKind,
    pub ability_scores: AbilityScores,
    pub proficiency_bonus: i8,
    pub is_proficient: bool,
    pub target_defense: i32,
    pub extra_modifiers: Vec<Modifier>,
    pub advantage: Advantage,
}

impl AttackRequest {
    pub fn new(
        kind: AttackKind,
        ability_scores: AbilityScores,
        proficiency_bonus: i8,
        target_defense: i32,
    ) -> Self {
        Self {
            kind,
            ability_scores,
            proficiency_bonus,
            is_proficient: true,
            target_defense,
            extra_modifiers: Vec::new(),
            advantage: Advantage::Normal,
        }
    }

    pub fn proficient(mut self, is_proficient: bool) -> Self {
        self.is_proficient = is_proficient;
        self
    }

    pub fn with_modifier(mut self, modifier: Modifier) -> Self {
        self.extra_modifiers.push(modifier);
        self
    }

    pub fn with_advantage(mut self, advantage: Advantage) -> Self {
        self.advantage = advantage;
        self
    }
}

/// Outcome of an attack roll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttackRoll {
    pub kind: AttackKind,
    pub roll: DiceRoll,
    pub bonus: i32,
    pub bonus_description: String,
    pub total: i32,
    pub target_defense: i32,
    pub hit: bool,
    pub critical_hit: bool,
    pub critical_fumble: bool,
}

/// Roll an attack with the OS random source.
pub fn attack(request: &AttackRequest) -> AttackRoll {
    attack_with_rng(request, &mut OsRng)
}

pub fn attack_with_rng<R: RngCore + ?Sized>(request: &AttackRequest, rng: &mut R) -> AttackRoll {
    let ability = request.kind.ability();
    let bonus = calculate_attack_bonus(
        ability,
        request.ability_scores.modifier(ability),
        request.proficiency_bonus,
        request.is_proficient,
        &request.extra_modifiers,
    );
    let roll = DiceNotation::d20(bonus.total).roll_with_rng(request.advantage, rng);

    let critical_hit = roll.critical;
    let critical_fumble = roll.fumble;
    let hit = !critical_fumble && (critical_hit || roll.total >= request.target_defense);

    AttackRoll {
        kind: request.kind,
        total: roll.total,
        roll,
        bonus: bonus.total,
        bonus_description: bonus.description,
        target_defense: request.target_defense,
        hit,
        critical_hit,
        critical_fumble,
    }
}

/// A damage roll after defenses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DamageRoll {
    pub roll: DiceRoll,
    pub damage_type: DamageType,
    pub critical: bool,
    pub raw_total: i32,
    pub effective_total: i32,
    pub resistance: ResistanceOutcome,
}

/// Roll damage with the OS random source.
pub fn damage(
    notation: &DiceNotation,
    damage_type: DamageType,
    is_critical: bool,
    defenses: &Defenses,
) -> DamageRoll {
    damage_with_rng(notation, damage_type, is_critical, defenses, &mut OsRng)
}

pub fn damage_with_rng<R: RngCore + ?Sized>(
    notation: &DiceNotation,
    damage_type: DamageType,
    is_critical: bool,
    defenses: &Defenses,
    rng: &mut R,
) -> DamageRoll {
    let rolled = if is_critical {
        notation.with_doubled_dice()
    } else {
        *notation
    };
    let roll = rolled.roll_with_rng(Advantage::Normal, rng);
    // a large negative modifier cannot heal the target
    let raw_total = roll.total.max(0);
    let (effective_total, resistance) = defenses.apply(raw_total, damage_type);

    DamageRoll {
        roll,
        damage_type,
        critical: is_critical,
        raw_total,
        effective_total,
        resistance,
    }
}

/// An attack roll and, on a hit, its damage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttackResult {
    pub attack: AttackRoll,
    pub damage: Option<DamageRoll>,
    pub description: String,
}

/// Roll to hit and, on a hit, roll damage.
pub fn perform_attack(
    request: &AttackRequest,
    weapon_damage: &DiceNotation,
    damage_type: DamageType,
    defenses: &Defenses,
) -> AttackResult {
    perform_attack_with_rng(request, weapon_damage, damage_type, defenses, &mut OsRng)
}

pub fn perform_attack_with_rng<R: RngCore + ?Sized>(
    request: &AttackRequest,
    weapon_damage: &DiceNotation,
    damage_type: DamageType,
    defenses: &Defenses,
    rng: &mut R,
) -> AttackResult {
    let attack = attack_with_rng(request, rng);

    if !attack.hit {
        let description = if attack.critical_fumble {
            format!(
                "Critical fumble! A natural 1 misses (total {} vs {})",
                attack.total, attack.target_defense
            )
        } else {
            format!("Miss: {} vs {}", attack.total, attack.target_defense)
        };
        debug!(
            total = attack.total,
            defense = attack.target_defense,
            fumble = attack.critical_fumble,
            "attack missed"
        );
        return AttackResult {
            attack,
            damage: None,
            description,
        };
    }

    let damage = damage_with_rng(weapon_damage, damage_type, attack.critical_hit, defenses, rng);

    let opener = if attack.critical_hit {
        format!("Critical hit! Natural 20 (total {})", attack.total)
    } else {
        format!("Hit: {} vs {}", attack.total, attack.target_defense)
    };
    let adjustment = match damage.resistance {
        ResistanceOutcome::Normal => String::new(),
        ResistanceOutcome::Resistant => format!(" (resisted, {} halved)", damage.raw_total),
        ResistanceOutcome::Vulnerable => format!(" (vulnerable, {} doubled)", damage.raw_total),
        ResistanceOutcome::Immune => " (immune)".to_string(),
    };
    let description = format!(
        "{opener}. {} {} damage{adjustment}",
        damage.effective_total, damage.damage_type
    );

    debug!(
        total = attack.total,
        critical = attack.critical_hit,
        damage = damage.effective_total,
        "attack hit"
    );

    AttackResult {
        attack,
        damage: Some(damage),
        description,
    }
}

/// A saving throw against a DC.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavingThrow {
    pub ability: Ability,
    pub roll: DiceRoll,
    pub dc: i32,
    pub success: bool,
}

/// Roll a saving throw with the OS random source.
pub fn saving_throw(
    ability: Ability,
    ability_scores: &AbilityScores,
    proficiency_bonus: i8,
    is_proficient: bool,
    dc: i32,
    advantage: Advantage,
) -> SavingThrow {
    saving_throw_with_rng(
        ability,
        ability_scores,
        proficiency_bonus,
        is_proficient,
        dc,
        advantage,
        &mut OsRng,
    )
}

/// Roll a saving throw. Natural 20s and 1s get no special treatment.
pub fn saving_throw_with_rng<R: RngCore + ?Sized>(
    ability: Ability,
    ability_scores: &AbilityScores,
    proficiency_bonus: i8,
    is_proficient: bool,
    dc: i32,
    advantage: Advantage,
    rng: &mut R,
) -> SavingThrow {
    let mut bonus = i32::from(ability_scores.modifier(ability));
    if is_proficient {
        bonus += i32::from(proficiency_bonus);
    }
    let roll = DiceNotation::d20(bonus).roll_with_rng(advantage, rng);
    let success = roll.meets_dc(dc);
    debug!(ability = %ability, total = roll.total, dc, success, "saving throw");
    SavingThrow {
        ability,
        roll,
        dc,
        success,
    }
}
