//! QA tests for leveling a character from 1 to 20.
//!
//! Run with: `cargo test -p dnd-rules --test qa_progression`

use dnd_rules::character::Ability;
use dnd_rules::progression::{level_for_experience, HpChoice, MAX_LEVEL, XP_THRESHOLDS};
use dnd_rules::{
    can_level_up, CharacterClass, LevelProgress, LevelUpChoices, ProgressionCharacter,
    RulesConfig, RulesEngine, RulesError,
};

/// Choices that satisfy every gate for the level `character` is entering.
fn choices_for(character: &ProgressionCharacter) -> LevelUpChoices {
    let next = character.level + 1;
    let mut choices = LevelUpChoices::new(HpChoice::Average);
    if character.class.requires_asi(next) {
        choices = choices.with_increases(vec![(Ability::Constitution, 1), (Ability::Strength, 1)]);
    }
    if character.subclass.is_none() && character.class.requires_subclass(next) {
        choices = choices.with_subclass("Champion");
    }
    choices
}

#[test]
fn test_thresholds_are_increasing() {
    assert!(XP_THRESHOLDS.windows(2).all(|pair| pair[0] < pair[1]));
    for (idx, &threshold) in XP_THRESHOLDS.iter().enumerate() {
        assert_eq!(level_for_experience(threshold), idx as u8 + 1);
    }
}

#[test]
fn test_fighter_one_to_twenty() {
    let engine = RulesEngine::new();
    let mut fighter = ProgressionCharacter::new(CharacterClass::Fighter, 14)
        .with_experience(XP_THRESHOLDS[MAX_LEVEL as usize - 1]);
    assert_eq!(fighter.current_max_hp, 12);

    let mut asi_count = 0;
    while fighter.level < MAX_LEVEL {
        assert!(can_level_up(fighter.level, fighter.experience_points));
        let choices = choices_for(&fighter);
        if choices.improvement.is_some() {
            asi_count += 1;
        }
        let result = engine.level_up(&fighter, &choices).unwrap();
        assert!(result.hp_gained >= 1);
        fighter = result.character;
    }

    assert_eq!(asi_count, 7);
    assert_eq!(fighter.subclass.as_deref(), Some("Champion"));
    // seven ASIs of +1 CON from 14
    assert_eq!(fighter.constitution, 20);
    assert!(matches!(
        engine.level_up(&fighter, &LevelUpChoices::new(HpChoice::Average)),
        Err(RulesError::MaxLevelReached)
    ));
    assert!(!fighter.progress().can_level_up);
}

#[test]
fn test_progress_tracks_experience() {
    let wizard = ProgressionCharacter::new(CharacterClass::Wizard, 10).with_experience(250);
    assert_eq!(
        wizard.progress(),
        LevelProgress {
            current_level: 1,
            experience: 250,
            next_threshold: Some(300),
            remaining: 50,
            can_level_up: false,
        }
    );
}

#[test]
fn test_rolled_hit_points_are_range_checked() {
    let rogue = ProgressionCharacter::new(CharacterClass::Rogue, 12).with_experience(300);
    let engine = RulesEngine::with_config(RulesConfig::default());
    let err = engine
        .level_up(&rogue, &LevelUpChoices::new(HpChoice::Roll(9)))
        .unwrap_err();
    assert!(err.to_string().contains("hit point roll 9"));

    let result = engine
        .level_up(&rogue, &LevelUpChoices::new(HpChoice::Roll(8)))
        .unwrap();
    assert_eq!(result.hp_gained, 9);
}

#[test]
fn test_level_up_result_serializes() {
    let rogue = ProgressionCharacter::new(CharacterClass::Rogue, 12).with_experience(300);
    let result = RulesEngine::new()
        .level_up(&rogue, &LevelUpChoices::new(HpChoice::Average))
        .unwrap();
    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["character"]["level"], 2);
    assert_eq!(json["character"]["class"], "Rogue");
}
