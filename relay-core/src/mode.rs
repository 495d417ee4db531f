use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Difficulty policy selected by the operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DifficultyMode {
    Low,
    #[default]
    Normal,
    Medium,
    High,
    #[serde(alias = "agresif")]
    Aggressive,
    #[serde(alias = "agresif_pool")]
    AggressivePool,
}

impl DifficultyMode {
    pub const ALL: [DifficultyMode; 6] = [
        DifficultyMode::Low,
        DifficultyMode::Normal,
        DifficultyMode::Medium,
        DifficultyMode::High,
        DifficultyMode::Aggressive,
        DifficultyMode::AggressivePool,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DifficultyMode::Low => "low",
            DifficultyMode::Normal => "normal",
            DifficultyMode::Medium => "medium",
            DifficultyMode::High => "high",
            DifficultyMode::Aggressive => "aggressive",
            DifficultyMode::AggressivePool => "aggressive_pool",
        }
    }

    /// Fixed difficulty for the constant modes, `None` for the adaptive ones
    pub fn fixed_difficulty(&self) -> Option<u64> {
        match self {
            DifficultyMode::Low => Some(1),
            DifficultyMode::Normal => Some(16),
            DifficultyMode::Medium => Some(256),
            DifficultyMode::High => Some(4096),
            DifficultyMode::Aggressive | DifficultyMode::AggressivePool => None,
        }
    }
}

impl std::fmt::Display for DifficultyMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for DifficultyMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "low" => Ok(DifficultyMode::Low),
            "normal" => Ok(DifficultyMode::Normal),
            "medium" => Ok(DifficultyMode::Medium),
            "high" => Ok(DifficultyMode::High),
            "aggressive" | "agresif" => Ok(DifficultyMode::Aggressive),
            "aggressive_pool" | "agresif_pool" => Ok(DifficultyMode::AggressivePool),
            _ => Err(Error::Config(format!("Invalid difficulty mode: {}", s))),
        }
    }
}
