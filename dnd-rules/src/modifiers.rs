//! Modifier stacking.
//!
//! Bonuses and penalties are tagged with the source that granted them. Two
//! modifiers from the same source never stack: only the one with the
//! largest magnitude counts. Modifiers from distinct sources always add.

use crate::attack::{DamageType, Defenses, ResistanceOutcome};
use crate::character::Ability;
use serde::{Deserialize, Serialize};

/// Broad kind of a modifier, for display and filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModifierCategory {
    Ability,
    Proficiency,
    Circumstance,
    Item,
    Spell,
    Feature,
    Base,
    Untyped,
}

/// A named, sourced numeric adjustment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Modifier {
    pub name: String,
    pub category: ModifierCategory,
    pub value: i32,
    pub source: String,
    /// Remaining rounds, if the modifier expires.
    pub duration: Option<u32>,
}

impl Modifier {
    pub fn new(
        name: impl Into<String>,
        category: ModifierCategory,
        value: i32,
        source: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            category,
            value,
            source: source.into(),
            duration: None,
        }
    }

    pub fn with_duration(mut self, rounds: u32) -> Self {
        self.duration = Some(rounds);
        self
    }
}

/// The result of stacking a set of modifiers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModifierStack {
    pub total: i32,
    /// Modifiers that survived stacking, in first-seen source order.
    pub modifiers: Vec<Modifier>,
    pub description: String,
}

impl ModifierStack {
    /// Combine modifiers, keeping one per source.
    ///
    /// Ties in magnitude keep the modifier seen first. The total saturates
    /// at the `i32` bounds.
    pub fn stack(modifiers: &[Modifier]) -> Self {
        let mut kept: Vec<Modifier> = Vec::new();

        for modifier in modifiers {
            match kept.iter_mut().find(|m| m.source == modifier.source) {
                Some(existing) => {
                    if modifier.value.unsigned_abs() > existing.value.unsigned_abs() {
                        *existing = modifier.clone();
                    }
                }
                None => kept.push(modifier.clone()),
            }
        }

        let total = saturating_sum(kept.iter().map(|m| m.value));
        let description = describe(&kept);
        Self {
            total,
            modifiers: kept,
            description,
        }
    }

    pub fn empty() -> Self {
        Self::stack(&[])
    }

    /// Sum of the retained modifiers in one category.
    pub fn total_for(&self, category: ModifierCategory) -> i32 {
        saturating_sum(
            self.modifiers
                .iter()
                .filter(|m| m.category == category)
                .map(|m| m.value),
        )
    }
}

fn saturating_sum(values: impl Iterator<Item = i32>) -> i32 {
    values.fold(0, i32::saturating_add)
}

fn describe(modifiers: &[Modifier]) -> String {
    if modifiers.is_empty() {
        return "+0".to_string();
    }
    modifiers
        .iter()
        .map(|m| format!("{:+} ({})", m.value, m.name))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Attack bonus: ability modifier, proficiency when trained, plus extras.
pub fn calculate_attack_bonus(
    ability: Ability,
    ability_modifier: i8,
    proficiency_bonus: i8,
    is_proficient: bool,
    extras: &[Modifier],
) -> ModifierStack {
    let mut all = vec![Modifier::new(
        ability.name(),
        ModifierCategory::Ability,
        ability_modifier.into(),
        ability.name(),
    )];
    if is_proficient {
        all.push(Modifier::new(
            "Proficiency",
            ModifierCategory::Proficiency,
            proficiency_bonus.into(),
            "Proficiency",
        ));
    }
    all.extend_from_slice(extras);
    ModifierStack::stack(&all)
}

/// Armor class from a base value, the dexterity modifier and extras.
///
/// `max_dex_bonus` caps a positive dexterity contribution (medium and
/// heavy armor); penalties always apply in full.
pub fn calculate_armor_class(
    base: i32,
    dex_modifier: i8,
    max_dex_bonus: Option<i8>,
    extras: &[Modifier],
) -> ModifierStack {
    let dex = match max_dex_bonus {
        Some(cap) => dex_modifier.min(cap),
        None => dex_modifier,
    };
    let mut all = vec![
        Modifier::new("Base AC", ModifierCategory::Base, base, "Armor"),
        Modifier::new(
            "Dexterity",
            ModifierCategory::Ability,
            dex.into(),
            "Dexterity",
        ),
    ];
    all.extend_from_slice(extras);
    ModifierStack::stack(&all)
}

/// Stack flat damage modifiers onto a raw roll, then apply the target's
/// damage defenses. Never returns less than zero.
pub fn calculate_damage_with_resistances(
    raw_damage: i32,
    extras: &[Modifier],
    damage_type: DamageType,
    defenses: &Defenses,
) -> (i32, ResistanceOutcome) {
    let stacked = raw_damage
        .saturating_add(ModifierStack::stack(extras).total)
        .max(0);
    defenses.apply(stacked, damage_type)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;

    fn bless() -> Modifier {
        Modifier::new("Bless", ModifierCategory::Spell, 2, "Bless").with_duration(10)
    }

    #[test]
    fn test_same_source_keeps_largest_magnitude() {
        let stack = ModifierStack::stack(&[
            Modifier::new("Bardic Inspiration", ModifierCategory::Feature, 3, "Bard"),
            Modifier::new("Cutting Words", ModifierCategory::Feature, -5, "Bard"),
            Modifier::new("Song", ModifierCategory::Feature, 4, "Bard"),
        ]);
        assert_eq!(stack.modifiers.len(), 1);
        assert_eq!(stack.total, -5);
    }

    #[test]
    fn test_distinct_sources_add() {
        let stack = ModifierStack::stack(&[
            bless(),
            Modifier::new("+1 Sword", ModifierCategory::Item, 1, "Longsword +1"),
            Modifier::new("Prone target", ModifierCategory::Circumstance, -2, "Cover"),
        ]);
        assert_eq!(stack.total, 1);
        assert_eq!(stack.modifiers.len(), 3);
    }

    #[test]
    fn test_repeated_buff_does_not_double_stack() {
        let stack = ModifierStack::stack(&[bless(), bless()]);
        assert_eq!(stack.total, 2);
    }

    #[test]
    fn test_tie_keeps_first_seen() {
        let stack = ModifierStack::stack(&[
            Modifier::new("First", ModifierCategory::Untyped, 2, "Same"),
            Modifier::new("Second", ModifierCategory::Untyped, -2, "Same"),
        ]);
        assert_eq!(stack.modifiers[0].name, "First");
        assert_eq!(stack.total, 2);
    }

    #[test]
    fn test_attack_bonus_description() {
        let stack = calculate_attack_bonus(Ability::Strength, 3, 2, true, &[bless()]);
        assert_eq!(stack.total, 7);
        assert_eq!(stack.description, "+3 (Strength) +2 (Proficiency) +2 (Bless)");
        assert_eq!(stack.total_for(ModifierCategory::Proficiency), 2);
    }

    #[test]
    fn test_attack_bonus_without_proficiency() {
        let stack = calculate_attack_bonus(Ability::Dexterity, 2, 3, false, &[]);
        assert_eq!(stack.total, 2);
    }

    #[test]
    fn test_armor_class_caps_dexterity() {
        // Half plate: 15 + DEX (max 2)
        let ac = calculate_armor_class(15, 4, Some(2), &[]);
        assert_eq!(ac.total, 17);

        // Penalties are not capped
        let ac = calculate_armor_class(15, -1, Some(2), &[]);
        assert_eq!(ac.total, 14);

        let shield = Modifier::new("Shield", ModifierCategory::Item, 2, "Shield");
        let ac = calculate_armor_class(10, 3, None, &[shield]);
        assert_eq!(ac.total, 15);
    }

    #[test]
    fn test_damage_with_resistances() {
        let defenses = Defenses::new().resistant_to(DamageType::Fire);
        let rage = Modifier::new("Rage", ModifierCategory::Feature, 2, "Rage");
        let (total, outcome) =
            calculate_damage_with_resistances(9, &[rage], DamageType::Fire, &defenses);
        assert_eq!(total, 5);
        assert_eq!(outcome, ResistanceOutcome::Resistant);
    }

    #[test]
    fn test_extreme_totals_saturate() {
        let stack = ModifierStack::stack(&[
            Modifier::new("Wish", ModifierCategory::Spell, i32::MAX, "Wish"),
            Modifier::new("Bless", ModifierCategory::Spell, 2, "Bless"),
        ]);
        assert_eq!(stack.total, i32::MAX);
        assert_eq!(stack.total_for(ModifierCategory::Spell), i32::MAX);

        let (total, _) = calculate_damage_with_resistances(
            i32::MAX,
            &[bless()],
            DamageType::Fire,
            &Defenses::new(),
        );
        assert_eq!(total, i32::MAX);
    }

    #[test]
    fn test_empty_stack() {
        let stack = ModifierStack::empty();
        assert_eq!(stack.total, 0);
        assert_eq!(stack.description, "+0");
    }

    fn arb_modifier() -> impl Strategy<Value = Modifier> {
        (0usize..4, -10i32..=10).prop_map(|(source, value)| {
            Modifier::new(
                format!("mod {value}"),
                ModifierCategory::Untyped,
                value,
                format!("source {source}"),
            )
        })
    }

    proptest! {
        #[test]
        fn prop_one_modifier_per_source(
            modifiers in prop::collection::vec(arb_modifier(), 0..12),
        ) {
            let stack = ModifierStack::stack(&modifiers);

            let sources: HashSet<&str> = modifiers.iter().map(|m| m.source.as_str()).collect();
            prop_assert_eq!(stack.modifiers.len(), sources.len());

            for kept in &stack.modifiers {
                let largest = modifiers
                    .iter()
                    .filter(|m| m.source == kept.source)
                    .map(|m| m.value.unsigned_abs())
                    .max();
                prop_assert_eq!(Some(kept.value.unsigned_abs()), largest);
            }
            prop_assert_eq!(stack.total, stack.modifiers.iter().map(|m| m.value).sum::<i32>());
        }
    }
}
