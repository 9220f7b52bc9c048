//! D&D dice rolling system.
//!
//! Supports the `[count]d<sides>[+|-modifier]` notation and
//! advantage/disadvantage on single d20 rolls. Every die is drawn from a
//! caller-supplied [`RngCore`] through rejection sampling, so results are
//! uniform for every allowed die size. The convenience functions use
//! [`OsRng`], which is cryptographically secure and holds no shared cursor.

use crate::config::AdvantageConflict;
use crate::error::{Result, RulesError};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::trace;

/// Largest number of dice a single notation may roll.
pub const MAX_DICE: u32 = 100;

/// Largest flat modifier, positive or negative, a notation may carry.
pub const MAX_MODIFIER: i32 = 10_000;

/// Advantage state for d20 rolls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Advantage {
    #[default]
    Normal,
    Advantage,
    Disadvantage,
}

impl Advantage {
    /// Build from independent advantage/disadvantage flags.
    ///
    /// Both flags at once follow `policy`: rejected, or cancelled to a
    /// plain roll.
    pub fn from_flags(
        advantage: bool,
        disadvantage: bool,
        policy: AdvantageConflict,
    ) -> Result<Advantage> {
        match (advantage, disadvantage) {
            (false, false) => Ok(Advantage::Normal),
            (true, false) => Ok(Advantage::Advantage),
            (false, true) => Ok(Advantage::Disadvantage),
            (true, true) => match policy {
                AdvantageConflict::Reject => Err(RulesError::ConflictingAdvantage),
                AdvantageConflict::Cancel => Ok(Advantage::Normal),
            },
        }
    }
}

/// The die sizes the engine accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DieType {
    D2,
    D3,
    D4,
    D6,
    D8,
    D10,
    D12,
    D20,
    D100,
}

impl DieType {
    pub fn sides(&self) -> u32 {
        match self {
            DieType::D2 => 2,
            DieType::D3 => 3,
            DieType::D4 => 4,
            DieType::D6 => 6,
            DieType::D8 => 8,
            DieType::D10 => 10,
            DieType::D12 => 12,
            DieType::D20 => 20,
            DieType::D100 => 100,
        }
    }

    pub fn from_sides(sides: u32) -> Option<DieType> {
        match sides {
            2 => Some(DieType::D2),
            3 => Some(DieType::D3),
            4 => Some(DieType::D4),
            6 => Some(DieType::D6),
            8 => Some(DieType::D8),
            10 => Some(DieType::D10),
            12 => Some(DieType::D12),
            20 => Some(DieType::D20),
            100 => Some(DieType::D100),
            _ => None,
        }
    }

    /// The allowed sizes, for error messages: `d2, d3, ..., d100`.
    pub fn allowed_list() -> String {
        Self::all()
            .iter()
            .map(|die| die.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn all() -> [DieType; 9] {
        [
            DieType::D2,
            DieType::D3,
            DieType::D4,
            DieType::D6,
            DieType::D8,
            DieType::D10,
            DieType::D12,
            DieType::D20,
            DieType::D100,
        ]
    }

    /// Roll one die of this size.
    pub fn roll<R: RngCore + ?Sized>(&self, rng: &mut R) -> u32 {
        uniform_face(rng, self.sides())
    }
}

impl fmt::Display for DieType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "d{}", self.sides())
    }
}

/// Draw a face in `1..=sides`, discarding draws at or above the largest
/// multiple of `sides` that fits in 32 bits.
fn uniform_face<R: RngCore + ?Sized>(rng: &mut R, sides: u32) -> u32 {
    const RANGE: u64 = 1 << 32;
    let sides = u64::from(sides);
    let limit = RANGE - RANGE % sides;
    loop {
        let draw = u64::from(rng.next_u32());
        if draw < limit {
            return (draw % sides) as u32 + 1;
        }
    }
}

/// Roll a single die with the given number of sides.
pub fn roll_die<R: RngCore + ?Sized>(rng: &mut R, sides: u32) -> Result<u32> {
    let die = DieType::from_sides(sides).ok_or(RulesError::DieSidesOutOfRange { sides })?;
    Ok(die.roll(rng))
}

/// A parsed dice expression such as `2d6+3`.
///
/// The fields are private so every value, deserialized ones included, has
/// been range checked. Deserialization admits up to `2 * MAX_DICE` dice so
/// doubled critical damage reads back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawNotation")]
pub struct DiceNotation {
    count: u32,
    die: DieType,
    modifier: i32,
}

/// Wire shape of [`DiceNotation`] before validation.
#[derive(Deserialize)]
struct RawNotation {
    count: u32,
    die: DieType,
    modifier: i32,
}

impl TryFrom<RawNotation> for DiceNotation {
    type Error = RulesError;

    fn try_from(raw: RawNotation) -> Result<Self> {
        DiceNotation::checked(raw.count, raw.die, raw.modifier, MAX_DICE * 2)
    }
}

impl DiceNotation {
    /// Build a notation, validating the count and the modifier.
    pub fn new(count: u32, die: DieType, modifier: i32) -> Result<Self> {
        Self::checked(count, die, modifier, MAX_DICE)
    }

    fn checked(count: u32, die: DieType, modifier: i32, max_count: u32) -> Result<Self> {
        if !(1..=max_count).contains(&count) {
            return Err(RulesError::out_of_range(
                "dice count",
                count.into(),
                1,
                max_count.into(),
            ));
        }
        if !(-MAX_MODIFIER..=MAX_MODIFIER).contains(&modifier) {
            return Err(RulesError::out_of_range(
                "dice modifier",
                modifier.into(),
                (-MAX_MODIFIER).into(),
                MAX_MODIFIER.into(),
            ));
        }
        Ok(Self {
            count,
            die,
            modifier,
        })
    }

    /// Shorthand for a plain `1d20` with a modifier, clamped to
    /// `±MAX_MODIFIER`.
    pub fn d20(modifier: i32) -> Self {
        Self {
            count: 1,
            die: DieType::D20,
            modifier: modifier.clamp(-MAX_MODIFIER, MAX_MODIFIER),
        }
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn die(&self) -> DieType {
        self.die
    }

    pub fn modifier(&self) -> i32 {
        self.modifier
    }

    /// Parse a dice notation string.
    pub fn parse(notation: &str) -> Result<Self> {
        let text = notation.trim().to_ascii_lowercase();
        let invalid = || RulesError::InvalidNotation(notation.to_string());

        let d_pos = text.find('d').ok_or_else(invalid)?;
        let count_str = &text[..d_pos];
        let rest = &text[d_pos + 1..];

        let count: u32 = if count_str.is_empty() {
            1
        } else {
            parse_digits(count_str).ok_or_else(invalid)?
        };

        let (sides_str, modifier) = match rest.find(['+', '-']) {
            Some(sign_pos) => {
                let magnitude: i32 = parse_digits(&rest[sign_pos + 1..]).ok_or_else(invalid)?;
                let signed = if rest[sign_pos..].starts_with('-') {
                    -magnitude
                } else {
                    magnitude
                };
                (&rest[..sign_pos], signed)
            }
            None => (rest, 0),
        };

        let sides: u32 = parse_digits(sides_str).ok_or_else(invalid)?;
        let die = DieType::from_sides(sides).ok_or(RulesError::DieSidesOutOfRange { sides })?;

        Self::new(count, die, modifier)
    }

    /// The same expression with the dice count doubled and the flat
    /// modifier untouched, as rolled on a critical hit. The doubled count
    /// may reach `2 * MAX_DICE`.
    pub fn with_doubled_dice(&self) -> Self {
        Self {
            count: self.count.saturating_mul(2),
            ..*self
        }
    }

    /// True for a lone d20, the only shape advantage applies to.
    pub fn is_single_d20(&self) -> bool {
        self.count == 1 && self.die == DieType::D20
    }

    /// Roll with the OS random source.
    pub fn roll(&self, advantage: Advantage) -> DiceRoll {
        self.roll_with_rng(advantage, &mut OsRng)
    }

    /// Roll with a specific RNG (useful for testing).
    pub fn roll_with_rng<R: RngCore + ?Sized>(
        &self,
        advantage: Advantage,
        rng: &mut R,
    ) -> DiceRoll {
        if advantage != Advantage::Normal && self.is_single_d20() {
            let first = DieType::D20.roll(rng);
            let second = DieType::D20.roll(rng);
            let (kept, dropped) = match advantage {
                Advantage::Advantage => (first.max(second), first.min(second)),
                _ => (first.min(second), first.max(second)),
            };
            return DiceRoll::build(*self, vec![kept], vec![dropped], advantage);
        }

        let results: Vec<u32> = (0..self.count).map(|_| self.die.roll(rng)).collect();
        DiceRoll::build(*self, results, Vec::new(), Advantage::Normal)
    }
}

fn parse_digits<T: FromStr>(s: &str) -> Option<T> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

impl FromStr for DiceNotation {
    type Err = RulesError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        DiceNotation::parse(s)
    }
}

impl fmt::Display for DiceNotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.count, self.die)?;
        match self.modifier {
            0 => Ok(()),
            m if m > 0 => write!(f, "+{m}"),
            m => write!(f, "-{}", m.unsigned_abs()),
        }
    }
}

/// Complete result of a dice roll. Built once and never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiceRoll {
    pub notation: DiceNotation,
    /// Dice that count toward the total.
    pub results: Vec<u32>,
    /// The d20 set aside by advantage or disadvantage.
    pub discarded: Vec<u32>,
    pub modifier: i32,
    pub total: i32,
    pub advantage: Advantage,
    pub critical: bool,
    pub fumble: bool,
    pub description: String,
}

impl DiceRoll {
    fn build(
        notation: DiceNotation,
        results: Vec<u32>,
        discarded: Vec<u32>,
        advantage: Advantage,
    ) -> Self {
        let total = results
            .iter()
            .fold(notation.modifier, |acc, &r| acc.saturating_add_unsigned(r));
        let natural = if notation.is_single_d20() {
            results.first().copied()
        } else {
            None
        };

        let mut roll = DiceRoll {
            notation,
            results,
            discarded,
            modifier: notation.modifier,
            total,
            advantage,
            critical: natural == Some(20),
            fumble: natural == Some(1),
            description: String::new(),
        };
        roll.description = roll.describe();
        trace!(
            notation = %notation,
            total,
            critical = roll.critical,
            fumble = roll.fumble,
            "dice rolled"
        );
        roll
    }

    /// The kept face of a single d20 roll.
    pub fn natural(&self) -> Option<u32> {
        if self.notation.is_single_d20() {
            self.results.first().copied()
        } else {
            None
        }
    }

    /// Format the individual dice results for display.
    pub fn dice_display(&self) -> String {
        let mut shown: Vec<String> = self.results.iter().map(|r| r.to_string()).collect();
        shown.extend(self.discarded.iter().map(|r| format!("({r})")));
        let dice_str = format!("[{}]", shown.join(", "));

        match self.modifier {
            0 => dice_str,
            m if m > 0 => format!("{dice_str} + {m}"),
            m => format!("{dice_str} - {}", m.unsigned_abs()),
        }
    }

    /// Check if the roll meets or exceeds a DC.
    pub fn meets_dc(&self, dc: i32) -> bool {
        self.total >= dc
    }

    fn describe(&self) -> String {
        let mode = match self.advantage {
            Advantage::Normal => "",
            Advantage::Advantage => " with advantage",
            Advantage::Disadvantage => " with disadvantage",
        };
        let flag = if self.critical {
            " (natural 20!)"
        } else if self.fumble {
            " (natural 1!)"
        } else {
            ""
        };
        format!(
            "{}{}: {} = {}{}",
            self.notation,
            mode,
            self.dice_display(),
            self.total,
            flag
        )
    }
}

impl fmt::Display for DiceRoll {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description)
    }
}

/// Convenience function to roll dice from a notation string.
pub fn roll(notation: &str) -> Result<DiceRoll> {
    Ok(DiceNotation::parse(notation)?.roll(Advantage::Normal))
}

/// Roll with advantage/disadvantage.
pub fn roll_with_advantage(notation: &str, advantage: Advantage) -> Result<DiceRoll> {
    Ok(DiceNotation::parse(notation)?.roll(advantage))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedDice;
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_parse_simple() {
        let notation = DiceNotation::parse("1d20").unwrap();
        assert_eq!(notation.count(), 1);
        assert_eq!(notation.die(), DieType::D20);
        assert_eq!(notation.modifier(), 0);
    }

    #[test]
    fn test_parse_with_modifier() {
        assert_eq!(DiceNotation::parse("1d20+5").unwrap().modifier(), 5);
        assert_eq!(DiceNotation::parse("2d6-2").unwrap().modifier(), -2);
        assert_eq!(DiceNotation::parse(" 1D8+0 ").unwrap().die(), DieType::D8);
    }

    #[test]
    fn test_count_defaults_to_one() {
        let notation = DiceNotation::parse("d20").unwrap();
        assert_eq!(notation.count(), 1);
        assert!(notation.is_single_d20());
    }

    #[test]
    fn test_malformed_notation() {
        for bad in ["", "20", "d", "2d", "xd6", "2d6+", "2d6+x", "2d6kh1", "1d20+5+2", "-1d6"] {
            assert!(
                matches!(DiceNotation::parse(bad), Err(RulesError::InvalidNotation(_))),
                "{bad:?} should be invalid"
            );
        }
    }

    #[test]
    fn test_out_of_range_notation() {
        for bad in ["0d6", "101d6", "1d6+10001", "1d6-10001"] {
            assert!(
                matches!(DiceNotation::parse(bad), Err(RulesError::OutOfRange { .. })),
                "{bad:?} should be out of range"
            );
        }
        for bad in ["1d7", "1d1", "3d0"] {
            assert!(
                matches!(DiceNotation::parse(bad), Err(RulesError::DieSidesOutOfRange { .. })),
                "{bad:?} should be an unsupported die"
            );
        }
        assert!(DiceNotation::parse("100d100").is_ok());
        assert!(DiceNotation::parse("1d6-10000").is_ok());
    }

    #[test]
    fn test_unsupported_die_lists_allowed_sizes() {
        let message = DiceNotation::parse("1d7").unwrap_err().to_string();
        assert_eq!(
            message,
            "die sides out of range: 7 (allowed d2, d3, d4, d6, d8, d10, d12, d20, d100)"
        );
    }

    #[test]
    fn test_huge_modifier_is_out_of_range() {
        // fits in i32, so only the modifier bound stops it
        assert!(matches!(
            DiceNotation::parse("1d6+2147483647"),
            Err(RulesError::OutOfRange {
                what: "dice modifier",
                ..
            })
        ));
        // beyond i32 the grammar itself fails
        assert!(matches!(
            DiceNotation::parse("1d6+2147483648"),
            Err(RulesError::InvalidNotation(_))
        ));

        let clamped = DiceNotation::d20(i32::MAX);
        assert_eq!(clamped.modifier(), MAX_MODIFIER);
        let roll = clamped.roll_with_rng(Advantage::Normal, &mut ScriptedDice::new([20]));
        assert_eq!(roll.total, MAX_MODIFIER + 20);
    }

    #[test]
    fn test_deserialize_validates_notation() {
        let ok: DiceNotation =
            serde_json::from_str(r#"{"count":2,"die":"D6","modifier":4}"#).unwrap();
        assert_eq!(ok, DiceNotation::new(2, DieType::D6, 4).unwrap());

        let crit = DiceNotation::parse("100d6").unwrap().with_doubled_dice();
        let json = serde_json::to_string(&crit).unwrap();
        assert_eq!(serde_json::from_str::<DiceNotation>(&json).unwrap(), crit);

        for bad in [
            r#"{"count":0,"die":"D6","modifier":4}"#,
            r#"{"count":4000000000,"die":"D6","modifier":0}"#,
            r#"{"count":1,"die":"D6","modifier":2147483647}"#,
        ] {
            assert!(serde_json::from_str::<DiceNotation>(bad).is_err(), "{bad} accepted");
        }
    }

    #[test]
    fn test_display_round_trip() {
        let notation = DiceNotation::parse("2d6+3").unwrap();
        assert_eq!(notation.to_string(), "2d6+3");
        let again: DiceNotation = notation.to_string().parse().unwrap();
        assert_eq!(again, notation);
        assert_eq!(DiceNotation::parse("d8-1").unwrap().to_string(), "1d8-1");
    }

    #[test]
    fn test_doubled_dice_keeps_modifier() {
        let doubled = DiceNotation::parse("2d6+3").unwrap().with_doubled_dice();
        assert_eq!(doubled.count(), 4);
        assert_eq!(doubled.modifier(), 3);
    }

    #[test]
    fn test_rejection_sampling_discards_biased_draws() {
        // 2^32 mod 6 == 4, so the top four draws are rejected
        let mut rng = ScriptedDice::from_raw([u32::MAX, u32::MAX - 3, 0]);
        assert_eq!(roll_die(&mut rng, 6).unwrap(), 1);
        assert_eq!(rng.remaining(), 0);

        let mut rng = ScriptedDice::from_raw([u32::MAX - 4]);
        // 4294967291 is below the limit: 4294967291 % 6 == 5
        assert_eq!(roll_die(&mut rng, 6).unwrap(), 6);
    }

    #[test]
    fn test_roll_die_rejects_unknown_sides() {
        let mut rng = StdRng::seed_from_u64(1);
        assert!(matches!(
            roll_die(&mut rng, 7),
            Err(RulesError::DieSidesOutOfRange { sides: 7 })
        ));
    }

    #[test]
    fn test_d6_is_uniform() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut counts = [0u32; 6];
        for _ in 0..60_000 {
            counts[DieType::D6.roll(&mut rng) as usize - 1] += 1;
        }
        for count in counts {
            assert!((9_400..=10_600).contains(&count), "skewed face count {count}");
        }
    }

    #[test]
    fn test_advantage_keeps_higher() {
        let mut rng = ScriptedDice::new([5, 17]);
        let roll = DiceNotation::d20(2).roll_with_rng(Advantage::Advantage, &mut rng);
        assert_eq!(roll.results, vec![17]);
        assert_eq!(roll.discarded, vec![5]);
        assert_eq!(roll.total, 19);
    }

    #[test]
    fn test_disadvantage_keeps_lower() {
        let mut rng = ScriptedDice::new([20, 3]);
        let roll = DiceNotation::d20(0).roll_with_rng(Advantage::Disadvantage, &mut rng);
        assert_eq!(roll.results, vec![3]);
        assert!(!roll.critical);
        assert!(!roll.fumble);
    }

    #[test]
    fn test_critical_and_fumble_on_kept_die() {
        let mut rng = ScriptedDice::new([20, 1]);
        let roll = DiceNotation::d20(0).roll_with_rng(Advantage::Advantage, &mut rng);
        assert!(roll.critical);
        assert!(!roll.fumble);

        let mut rng = ScriptedDice::new([20, 1]);
        let roll = DiceNotation::d20(0).roll_with_rng(Advantage::Disadvantage, &mut rng);
        assert!(roll.fumble);
        assert!(!roll.critical);
    }

    #[test]
    fn test_advantage_ignored_for_other_dice() {
        let mut rng = ScriptedDice::new([20, 20]);
        let roll = DiceNotation::parse("2d20")
            .unwrap()
            .roll_with_rng(Advantage::Advantage, &mut rng);
        assert_eq!(roll.results, vec![20, 20]);
        assert_eq!(roll.advantage, Advantage::Normal);
        assert!(!roll.critical);
        assert_eq!(rng.remaining(), 0);
    }

    #[test]
    fn test_from_flags_policies() {
        assert_eq!(
            Advantage::from_flags(true, false, AdvantageConflict::Reject).unwrap(),
            Advantage::Advantage
        );
        assert!(matches!(
            Advantage::from_flags(true, true, AdvantageConflict::Reject),
            Err(RulesError::ConflictingAdvantage)
        ));
        assert_eq!(
            Advantage::from_flags(true, true, AdvantageConflict::Cancel).unwrap(),
            Advantage::Normal
        );
    }

    #[test]
    fn test_description_mentions_dice() {
        let mut rng = ScriptedDice::new([4, 2]);
        let roll = DiceNotation::parse("2d6-1")
            .unwrap()
            .roll_with_rng(Advantage::Normal, &mut rng);
        assert_eq!(roll.total, 5);
        assert_eq!(roll.description, "2d6-1: [4, 2] - 1 = 5");
    }

    #[test]
    fn test_os_rng_roll_in_range() {
        for _ in 0..100 {
            let result = roll("1d20+5").unwrap();
            assert!(result.total >= 6 && result.total <= 25);
        }
    }

    fn arb_die() -> impl Strategy<Value = DieType> {
        prop::sample::select(DieType::all().to_vec())
    }

    proptest! {
        #[test]
        fn prop_results_in_range_and_total_adds_up(
            count in 1u32..=MAX_DICE,
            die in arb_die(),
            modifier in -50i32..=50,
            seed in any::<u64>(),
        ) {
            let notation = DiceNotation::new(count, die, modifier).unwrap();
            let mut rng = StdRng::seed_from_u64(seed);
            let roll = notation.roll_with_rng(Advantage::Normal, &mut rng);

            prop_assert_eq!(roll.results.len(), count as usize);
            prop_assert!(roll.results.iter().all(|&r| (1..=die.sides()).contains(&r)));
            let sum: i32 = roll.results.iter().map(|&r| r as i32).sum();
            prop_assert_eq!(roll.total, sum + modifier);
        }

        #[test]
        fn prop_notation_round_trips(
            count in 1u32..=MAX_DICE,
            die in arb_die(),
            modifier in -MAX_MODIFIER..=MAX_MODIFIER,
        ) {
            let notation = DiceNotation::new(count, die, modifier).unwrap();
            let parsed = DiceNotation::parse(&notation.to_string()).unwrap();
            prop_assert_eq!(parsed, notation);
        }

        #[test]
        fn prop_advantage_keeps_max_and_min(seed in any::<u64>()) {
            let mut rng = StdRng::seed_from_u64(seed);
            let adv = DiceNotation::d20(0).roll_with_rng(Advantage::Advantage, &mut rng);
            prop_assert!(adv.results[0] >= adv.discarded[0]);
            prop_assert_eq!(adv.critical, adv.results[0] == 20);

            let dis = DiceNotation::d20(0).roll_with_rng(Advantage::Disadvantage, &mut rng);
            prop_assert!(dis.results[0] <= dis.discarded[0]);
            prop_assert_eq!(dis.fumble, dis.results[0] == 1);
        }
    }
}
