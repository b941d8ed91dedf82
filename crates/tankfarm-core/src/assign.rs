//! Deterministic partition of tank ids into FILLED / EMPTY / IDLE.
//!
//! The lowest ids are filled, the next ones empty, and the remainder forms
//! the default idle list. Pinned idle ids override the default list
//! positionally: the pinned ids come first and the default list contributes
//! its tail starting at `pinned.len()`. A pinned id may lie beyond
//! `num_tanks`; rendering then extends up to that id.

#![allow(missing_docs)]

use std::collections::BTreeMap;

use crate::error::CoreError;
use crate::tank::{operational_floor, TankCategory, TankId};

/// Tank-shaping inputs read from the global form fields.
#[derive(Debug, Clone, PartialEq)]
pub struct TankConfiguration {
    pub num_tanks: u32,
    pub num_filled: u32,
    pub num_empty: u32,
    /// Pinned idle ids in entry order, deduplicated.
    pub specific_idle_ids: Vec<TankId>,
    pub tank_capacity: f64,
    pub default_dead_bottom: f64,
    pub default_buffer: f64,
}

impl TankConfiguration {
    /// Raw idle slot count; negative when over-allocated.
    #[must_use]
    pub fn idle_slots(&self) -> i64 {
        i64::from(self.num_tanks) - i64::from(self.num_filled) - i64::from(self.num_empty)
    }

    #[must_use]
    pub fn calculated_idle_count(&self) -> u32 {
        self.idle_slots().max(0) as u32
    }

    /// The idle-id input is read-only when no idle slot exists.
    #[must_use]
    pub fn idle_input_locked(&self) -> bool {
        self.idle_slots() <= 0
    }

    #[must_use]
    pub fn default_floor(&self) -> f64 {
        operational_floor(self.default_dead_bottom, self.default_buffer)
    }
}

/// Parse the free-text pinned idle list. Accepts commas, semicolons and
/// whitespace as separators; drops zero, non-numeric and repeated entries.
#[must_use]
pub fn parse_idle_ids(text: &str) -> Vec<TankId> {
    let mut ids: Vec<TankId> = Vec::new();
    for token in text.split(|c: char| c == ',' || c == ';' || c.is_whitespace()) {
        let Ok(id) = token.parse::<TankId>() else {
            continue;
        };
        if !ids.contains(&id) {
            ids.push(id);
        }
    }
    ids
}

/// Outcome of the idle-allocation check run alongside every assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdleValidation {
    Valid,
    OverAllocated { total: u32, filled: u32, empty: u32 },
    NoIdleSlots { pinned: usize },
    TooManyPinned { pinned: usize, slots: u32 },
}

impl IdleValidation {
    #[must_use]
    pub fn check(config: &TankConfiguration) -> Self {
        let slots = config.idle_slots();
        let pinned = config.specific_idle_ids.len();
        if slots < 0 {
            return Self::OverAllocated {
                total: config.num_tanks,
                filled: config.num_filled,
                empty: config.num_empty,
            };
        }
        if slots == 0 && pinned > 0 {
            return Self::NoIdleSlots { pinned };
        }
        if pinned as i64 > slots {
            return Self::TooManyPinned {
                pinned,
                slots: slots as u32,
            };
        }
        Self::Valid
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }

    /// User-facing message; `None` when valid.
    #[must_use]
    pub fn message(&self) -> Option<String> {
        match self {
            Self::Valid => None,
            Self::OverAllocated {
                total,
                filled,
                empty,
            } => Some(format!(
                "Filled ({filled}) + empty ({empty}) tanks exceed the total of {total} tanks."
            )),
            Self::NoIdleSlots { pinned } => Some(format!(
                "No idle slots are available, but {pinned} idle tank id(s) were specified."
            )),
            Self::TooManyPinned { pinned, slots } => Some(format!(
                "{pinned} idle tank id(s) specified, but only {slots} idle slot(s) are available."
            )),
        }
    }
}

/// Category per tank id for one render pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TankAssignment {
    categories: BTreeMap<TankId, TankCategory>,
    default_idle: Vec<TankId>,
    final_idle: Vec<TankId>,
    max_tank_id: u32,
}

impl TankAssignment {
    pub fn compute(config: &TankConfiguration) -> Result<Self, CoreError> {
        assign(
            config.num_tanks,
            config.num_filled,
            config.num_empty,
            &config.specific_idle_ids,
        )
    }

    #[must_use]
    pub fn category(&self, id: TankId) -> TankCategory {
        self.categories
            .get(&id)
            .copied()
            .unwrap_or(TankCategory::Unassigned)
    }

    /// Ids in `category`, ascending.
    #[must_use]
    pub fn ids_in(&self, category: TankCategory) -> Vec<TankId> {
        self.categories
            .iter()
            .filter(|(_, cat)| **cat == category)
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (TankId, TankCategory)> + '_ {
        self.categories.iter().map(|(id, cat)| (*id, *cat))
    }

    /// Highest id that gets a tank block: `max(num_tanks, max(final idle))`.
    #[must_use]
    pub fn max_tank_id(&self) -> u32 {
        self.max_tank_id
    }

    #[must_use]
    pub fn default_idle(&self) -> &[TankId] {
        &self.default_idle
    }

    /// Pinned ids followed by the retained default tail, in order.
    #[must_use]
    pub fn final_idle(&self) -> &[TankId] {
        &self.final_idle
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.categories.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }
}

pub fn assign(
    num_tanks: u32,
    num_filled: u32,
    num_empty: u32,
    specific_idle_ids: &[TankId],
) -> Result<TankAssignment, CoreError> {
    if u64::from(num_filled) + u64::from(num_empty) > u64::from(num_tanks) {
        return Err(CoreError::OverAllocated {
            total: num_tanks,
            filled: num_filled,
            empty: num_empty,
        });
    }

    let candidates: Vec<TankId> = (1..=num_tanks).filter_map(TankId::new).collect();
    let filled_end = num_filled as usize;
    let empty_end = filled_end + num_empty as usize;

    let mut categories = BTreeMap::new();
    for id in &candidates[..filled_end] {
        categories.insert(*id, TankCategory::Filled);
    }
    for id in &candidates[filled_end..empty_end] {
        categories.insert(*id, TankCategory::Empty);
    }
    let default_idle = candidates[empty_end..].to_vec();

    let mut pinned: Vec<TankId> = Vec::with_capacity(specific_idle_ids.len());
    for id in specific_idle_ids {
        if !pinned.contains(id) {
            pinned.push(*id);
        }
    }
    let mut final_idle = pinned.clone();
    final_idle.extend(default_idle.iter().skip(pinned.len()).copied());

    for id in &final_idle {
        categories.insert(*id, TankCategory::Idle);
    }

    let max_tank_id = final_idle
        .iter()
        .map(|id| id.get())
        .max()
        .unwrap_or(0)
        .max(num_tanks);

    tracing::debug!(
        num_tanks,
        num_filled,
        num_empty,
        pinned = pinned.len(),
        idle = final_idle.len(),
        max_tank_id,
        "tank assignment computed"
    );

    Ok(TankAssignment {
        categories,
        default_idle,
        final_idle,
        max_tank_id,
    })
}
