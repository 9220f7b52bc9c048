//! Experience, hit point growth and level-up gating.

use crate::character::{ability_modifier, Ability, CharacterClass};
use crate::config::RulesConfig;
use crate::dice::DieType;
use crate::error::{Result, RulesError};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const MAX_LEVEL: u8 = 20;

/// Highest value an ability score can reach through improvements.
pub const ABILITY_SCORE_CAP: u8 = 20;

/// Total experience needed to reach each level, 1 through 20.
pub const XP_THRESHOLDS: [u32; 20] = [
    0, 300, 900, 2700, 6500, 14000, 23000, 34000, 48000, 64000, 85000, 100000, 120000, 140000,
    165000, 195000, 225000, 265000, 305000, 355000,
];

/// Experience needed to reach `level`.
pub fn experience_for_level(level: u8) -> Result<u32> {
    if !(1..=MAX_LEVEL).contains(&level) {
        return Err(RulesError::out_of_range("level", level.into(), 1, MAX_LEVEL.into()));
    }
    Ok(XP_THRESHOLDS[level as usize - 1])
}

/// Highest level `experience` qualifies for.
pub fn level_for_experience(experience: u32) -> u8 {
    XP_THRESHOLDS
        .iter()
        .rposition(|&threshold| experience >= threshold)
        .map(|idx| (idx + 1) as u8)
        .unwrap_or(1)
}

/// True when `experience` reaches the next level's threshold. Never true at 20.
pub fn can_level_up(level: u8, experience: u32) -> bool {
    match next_threshold(level) {
        Some(required) => experience >= required,
        None => false,
    }
}

fn next_threshold(level: u8) -> Option<u32> {
    if level >= MAX_LEVEL {
        return None;
    }
    XP_THRESHOLDS.get(level as usize).copied()
}

/// How far a character is from their next level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelProgress {
    pub current_level: u8,
    pub experience: u32,
    /// `None` at level 20.
    pub next_threshold: Option<u32>,
    pub remaining: u32,
    pub can_level_up: bool,
}

impl LevelProgress {
    pub fn new(current_level: u8, experience: u32) -> Self {
        let next_threshold = next_threshold(current_level);
        Self {
            current_level,
            experience,
            next_threshold,
            remaining: next_threshold.map_or(0, |t| t.saturating_sub(experience)),
            can_level_up: can_level_up(current_level, experience),
        }
    }
}

// ============================================================================
// Hit Points
// ============================================================================

fn first_level_hit_points(hit_die: DieType, con_modifier: i8) -> i32 {
    (hit_die.sides() as i32 + i32::from(con_modifier)).max(1)
}

/// Hit points gained for one level.
///
/// First level takes the full hit die. Later levels take `roll` when given,
/// otherwise the average (`sides / 2 + 1`). The gain is never below 1.
pub fn hp_increase(
    hit_die: DieType,
    con_modifier: i8,
    is_first_level: bool,
    roll: Option<u32>,
) -> Result<i32> {
    if is_first_level {
        return Ok(first_level_hit_points(hit_die, con_modifier));
    }
    let sides = hit_die.sides();
    let base = match roll {
        Some(r) if (1..=sides).contains(&r) => r,
        Some(r) => {
            return Err(RulesError::out_of_range(
                "hit point roll",
                r.into(),
                1,
                sides.into(),
            ))
        }
        None => sides / 2 + 1,
    };
    Ok((base as i32 + i32::from(con_modifier)).max(1))
}

// ============================================================================
// Class Gates
// ============================================================================

const STANDARD_ASI_LEVELS: &[u8] = &[4, 8, 12, 16, 19];
const FIGHTER_ASI_LEVELS: &[u8] = &[4, 6, 8, 12, 14, 16, 19];
const ROGUE_ASI_LEVELS: &[u8] = &[4, 8, 10, 12, 16, 19];

impl CharacterClass {
    /// Levels that grant an ability score improvement.
    pub fn asi_levels(&self) -> &'static [u8] {
        match self {
            CharacterClass::Fighter => FIGHTER_ASI_LEVELS,
            CharacterClass::Rogue => ROGUE_ASI_LEVELS,
            _ => STANDARD_ASI_LEVELS,
        }
    }

    pub fn requires_asi(&self, level: u8) -> bool {
        self.asi_levels().contains(&level)
    }

    /// Level at which the class picks its subclass.
    pub fn subclass_level(&self) -> u8 {
        match self {
            CharacterClass::Cleric | CharacterClass::Sorcerer | CharacterClass::Warlock => 1,
            CharacterClass::Druid | CharacterClass::Wizard => 2,
            _ => 3,
        }
    }

    pub fn requires_subclass(&self, level: u8) -> bool {
        level == self.subclass_level()
    }
}

// ============================================================================
// Level Up
// ============================================================================

/// The slice of a character record that leveling reads and writes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressionCharacter {
    pub level: u8,
    pub experience_points: u32,
    pub class: CharacterClass,
    pub constitution: u8,
    pub current_max_hp: i32,
    pub subclass: Option<String>,
}

impl ProgressionCharacter {
    /// A fresh level 1 character with full first-level hit points.
    pub fn new(class: CharacterClass, constitution: u8) -> Self {
        Self {
            level: 1,
            experience_points: 0,
            class,
            constitution,
            current_max_hp: first_level_hit_points(class.hit_die(), ability_modifier(constitution)),
            subclass: None,
        }
    }

    pub fn with_experience(mut self, experience_points: u32) -> Self {
        self.experience_points = experience_points;
        self
    }

    pub fn progress(&self) -> LevelProgress {
        LevelProgress::new(self.level, self.experience_points)
    }
}

/// How to gain hit points this level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HpChoice {
    Roll(u32),
    Average,
}

/// What to take at an ability score improvement level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AbilityImprovement {
    /// Points per ability; must total exactly 2.
    Increases(Vec<(Ability, u8)>),
    Feat(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelUpChoices {
    pub hit_points: HpChoice,
    pub improvement: Option<AbilityImprovement>,
    pub subclass: Option<String>,
}

impl LevelUpChoices {
    pub fn new(hit_points: HpChoice) -> Self {
        Self {
            hit_points,
            improvement: None,
            subclass: None,
        }
    }

    pub fn with_increases(mut self, increases: Vec<(Ability, u8)>) -> Self {
        self.improvement = Some(AbilityImprovement::Increases(increases));
        self
    }

    pub fn with_feat(mut self, feat: impl Into<String>) -> Self {
        self.improvement = Some(AbilityImprovement::Feat(feat.into()));
        self
    }

    pub fn with_subclass(mut self, subclass: impl Into<String>) -> Self {
        self.subclass = Some(subclass.into());
        self
    }
}

/// Check `choices` for the level `character` is about to reach.
///
/// Every problem is reported at once.
pub fn validate_level_up_choices(
    character: &ProgressionCharacter,
    choices: &LevelUpChoices,
) -> Result<()> {
    let class = character.class;
    let new_level = character.level + 1;
    let mut problems = Vec::new();

    match (&choices.improvement, class.requires_asi(new_level)) {
        (None, true) => problems.push(format!(
            "level {new_level} requires ability score increases or a feat"
        )),
        (Some(_), false) => problems.push(format!(
            "{class} gains no ability score improvement at level {new_level}"
        )),
        (Some(AbilityImprovement::Increases(increases)), true) => {
            let total: u32 = increases.iter().map(|&(_, points)| u32::from(points)).sum();
            if total != 2 {
                problems.push(format!("ability score increases must total 2, got {total}"));
            }
        }
        (Some(AbilityImprovement::Feat(feat)), true) => {
            if feat.trim().is_empty() {
                problems.push("feat name is empty".to_string());
            }
        }
        (None, false) => {}
    }

    let subclass_level = class.subclass_level();
    match (&choices.subclass, &character.subclass) {
        (None, None) if new_level == subclass_level => {
            problems.push(format!("{class} must choose a subclass at level {new_level}"))
        }
        (Some(_), Some(existing)) => {
            problems.push(format!("subclass already chosen: {existing}"))
        }
        (Some(_), None) if new_level < subclass_level => problems.push(format!(
            "{class} cannot choose a subclass before level {subclass_level}"
        )),
        _ => {}
    }

    if let HpChoice::Roll(roll) = choices.hit_points {
        let sides = class.hit_die().sides();
        if !(1..=sides).contains(&roll) {
            problems.push(format!("hit point roll {roll} is outside 1..={sides}"));
        }
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(RulesError::InvalidLevelUpChoices(problems))
    }
}

/// Snapshot after a level-up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelUpResult {
    pub character: ProgressionCharacter,
    pub hp_gained: i32,
    /// Increases for the caller to apply to the full score block.
    pub ability_increases: Vec<(Ability, u8)>,
    pub feat: Option<String>,
    pub description: String,
}

/// Advance `character` one level.
pub fn apply_level_up(
    character: &ProgressionCharacter,
    choices: &LevelUpChoices,
    config: &RulesConfig,
) -> Result<LevelUpResult> {
    if character.level >= MAX_LEVEL {
        return Err(RulesError::MaxLevelReached);
    }
    if !can_level_up(character.level, character.experience_points) {
        return Err(RulesError::InsufficientExperience {
            level: character.level,
            experience: character.experience_points,
            required: next_threshold(character.level).unwrap_or_default(),
        });
    }
    validate_level_up_choices(character, choices)?;

    let roll = match choices.hit_points {
        _ if config.average_hit_points => None,
        HpChoice::Roll(r) => Some(r),
        HpChoice::Average => None,
    };
    let hit_die = character.class.hit_die();
    let hp_gained = hp_increase(hit_die, ability_modifier(character.constitution), false, roll)?;

    let (ability_increases, feat) = match &choices.improvement {
        Some(AbilityImprovement::Increases(increases)) => (increases.clone(), None),
        Some(AbilityImprovement::Feat(name)) => (Vec::new(), Some(name.clone())),
        None => (Vec::new(), None),
    };
    let con_points: u8 = ability_increases
        .iter()
        .filter(|(ability, _)| *ability == Ability::Constitution)
        .map(|&(_, points)| points)
        .sum();

    let next = ProgressionCharacter {
        level: character.level + 1,
        current_max_hp: character.current_max_hp + hp_gained,
        constitution: character
            .constitution
            .saturating_add(con_points)
            .min(ABILITY_SCORE_CAP)
            .max(character.constitution),
        subclass: character.subclass.clone().or_else(|| choices.subclass.clone()),
        ..character.clone()
    };

    let mut description = format!(
        "{} reaches level {} (+{} HP, {} max)",
        next.class, next.level, hp_gained, next.current_max_hp
    );
    if let Some(name) = &feat {
        description.push_str(&format!(", takes the {name} feat"));
    }
    if choices.subclass.is_some() {
        if let Some(subclass) = &next.subclass {
            description.push_str(&format!(", becomes {subclass}"));
        }
    }

    debug!(class = %next.class, level = next.level, hp_gained, "level up applied");
    Ok(LevelUpResult {
        character: next,
        hp_gained,
        ability_increases,
        feat,
        description,
    })
}
