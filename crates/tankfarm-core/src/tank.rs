//! Tank identifiers, categories and the per-tank record.

#![allow(missing_docs)]

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use crate::error::CoreError;
use crate::lenient;

/// Sequential, 1-based tank identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TankId(u32);

impl TankId {
    #[must_use]
    pub fn new(raw: u32) -> Option<Self> {
        (raw > 0).then_some(Self(raw))
    }

    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }

    /// Name shown when the user has not entered one.
    #[must_use]
    pub fn default_name(self) -> String {
        format!("Tank {}", self.0)
    }
}

impl fmt::Display for TankId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TankId {
    type Err = CoreError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        text.trim()
            .parse::<u32>()
            .ok()
            .and_then(Self::new)
            .ok_or_else(|| CoreError::InvalidTankId(SmolStr::new(text.trim())))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TankCategory {
    Filled,
    Empty,
    Idle,
    Unassigned,
}

impl TankCategory {
    pub const RENDERED: [TankCategory; 3] = [Self::Filled, Self::Empty, Self::Idle];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Filled => "FILLED",
            Self::Empty => "EMPTY",
            Self::Idle => "IDLE",
            Self::Unassigned => "UNASSIGNED",
        }
    }

    #[must_use]
    pub const fn heading(self) -> &'static str {
        match self {
            Self::Filled => "Filled tanks",
            Self::Empty => "Empty tanks",
            Self::Idle => "Idle tanks",
            Self::Unassigned => "Unassigned",
        }
    }
}

impl fmt::Display for TankCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One initial crude charge held by an idle tank.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrudeLine {
    #[serde(default, deserialize_with = "lenient::string_or_empty")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient::f64_or_zero")]
    pub volume: f64,
}

impl CrudeLine {
    #[must_use]
    pub fn new(name: impl Into<String>, volume: f64) -> Self {
        Self {
            name: name.into(),
            volume: volume.max(0.0),
        }
    }
}

/// Minimum sustainable level: dead bottom plus half the buffer.
#[must_use]
pub fn operational_floor(dead_bottom: f64, buffer: f64) -> f64 {
    dead_bottom + buffer / 2.0
}

/// A rendered tank. Records are rebuilt on every render; the id and the
/// reconciliation overrides are the only identity that survives.
#[derive(Debug, Clone, PartialEq)]
pub struct TankRecord {
    pub id: TankId,
    pub name: String,
    pub category: TankCategory,
    pub level: f64,
    pub dead_bottom: f64,
    pub buffer: f64,
    pub idle_crude_lines: Vec<CrudeLine>,
}

impl TankRecord {
    #[must_use]
    pub fn operational_floor(&self) -> f64 {
        operational_floor(self.dead_bottom, self.buffer)
    }

    #[must_use]
    pub fn idle_volume(&self) -> f64 {
        self.idle_crude_lines.iter().map(|line| line.volume).sum()
    }

    /// Idle level is always floor + charged crude; other categories keep
    /// their level.
    pub fn recompute_idle_level(&mut self) {
        if self.category == TankCategory::Idle {
            self.level = self.operational_floor() + self.idle_volume();
        }
    }

    /// Trimmed name, or `Tank {id}` when blank.
    #[must_use]
    pub fn display_name(&self) -> String {
        let trimmed = self.name.trim();
        if trimmed.is_empty() {
            self.id.default_name()
        } else {
            trimmed.to_string()
        }
    }
}
