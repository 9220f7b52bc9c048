//! Error type shared by every rules component.

use thiserror::Error;

/// Errors surfaced by the rules engine.
///
/// Every error is local and final: the engine performs no I/O, so there is
/// nothing to retry.
#[derive(Debug, Error)]
pub enum RulesError {
    #[error("Invalid dice notation: {0}")]
    InvalidNotation(String),

    #[error("{what} out of range: {value} (allowed {min}..={max})")]
    OutOfRange {
        what: &'static str,
        value: i64,
        min: i64,
        max: i64,
    },

    #[error(
        "die sides out of range: {sides} (allowed {})",
        crate::dice::DieType::allowed_list()
    )]
    DieSidesOutOfRange { sides: u32 },

    #[error("No level {level} spell slot available")]
    NoSlotAvailable { level: u8 },

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Already at maximum level (20)")]
    MaxLevelReached,

    #[error("Level {level} needs {required} XP to advance, have {experience}")]
    InsufficientExperience {
        level: u8,
        experience: u32,
        required: u32,
    },

    #[error("Cannot roll with both advantage and disadvantage")]
    ConflictingAdvantage,

    #[error("Invalid level-up choices: {}", .0.join("; "))]
    InvalidLevelUpChoices(Vec<String>),

    #[error("Unknown class: {0}")]
    UnknownClass(String),

    #[error("Configuration error: {0}")]
    Config(#[from] serde_json::Error),
}

impl RulesError {
    pub(crate) fn out_of_range(what: &'static str, value: i64, min: i64, max: i64) -> Self {
        Self::OutOfRange {
            what,
            value,
            min,
            max,
        }
    }

    pub(crate) fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, RulesError>;
