//! Builds one `TankRecord` per assigned tank, threading caller overrides.

#![allow(missing_docs)]

use std::collections::BTreeMap;

use crate::assign::{TankAssignment, TankConfiguration};
use crate::tank::{operational_floor, CrudeLine, TankCategory, TankId, TankRecord};

/// User-entered data for one tank id that must survive a re-render.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TankOverride {
    pub name: Option<String>,
    pub level: Option<f64>,
    /// Category the level was entered under; `None` applies to any category.
    pub level_category: Option<TankCategory>,
    pub dead_bottom: Option<f64>,
    pub buffer: Option<f64>,
    pub idle_lines: Option<Vec<CrudeLine>>,
}

impl TankOverride {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.level.is_none()
            && self.dead_bottom.is_none()
            && self.buffer.is_none()
            && self.idle_lines.is_none()
    }

    fn level_for(&self, category: TankCategory) -> Option<f64> {
        match self.level_category {
            Some(captured) if captured != category => None,
            _ => self.level,
        }
    }
}

/// Custom per-tank data keyed by id. Entries outlive the tanks they belong
/// to, so shrinking and regrowing the tank count restores earlier input.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CustomTankData {
    entries: BTreeMap<TankId, TankOverride>,
}

impl CustomTankData {
    #[must_use]
    pub fn get(&self, id: TankId) -> Option<&TankOverride> {
        self.entries.get(&id)
    }

    pub fn entry(&mut self, id: TankId) -> &mut TankOverride {
        self.entries.entry(id).or_default()
    }

    pub fn insert(&mut self, id: TankId, value: TankOverride) {
        if value.is_empty() {
            self.entries.remove(&id);
        } else {
            self.entries.insert(id, value);
        }
    }

    pub fn remove(&mut self, id: TankId) -> Option<TankOverride> {
        self.entries.remove(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (TankId, &TankOverride)> + '_ {
        self.entries.iter().map(|(id, value)| (*id, value))
    }

    /// Drop levels captured for `category`; those tanks fall back to their
    /// derived default on the next render.
    pub fn clear_levels_for(&mut self, category: TankCategory) {
        for value in self.entries.values_mut() {
            if value.level_category == Some(category) {
                value.level = None;
                value.level_category = None;
            }
        }
        self.entries.retain(|_, value| !value.is_empty());
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Derived level for a category, before any override.
#[must_use]
pub fn default_level(
    category: TankCategory,
    capacity: f64,
    dead_bottom: f64,
    buffer: f64,
    idle_lines: &[CrudeLine],
) -> f64 {
    let floor = operational_floor(dead_bottom, buffer);
    match category {
        TankCategory::Filled => capacity,
        TankCategory::Empty => floor,
        TankCategory::Idle => floor + idle_lines.iter().map(|line| line.volume).sum::<f64>(),
        TankCategory::Unassigned => 0.0,
    }
}

/// Render every assigned tank in ascending id order.
#[must_use]
pub fn render_tanks(
    config: &TankConfiguration,
    assignment: &TankAssignment,
    custom: &CustomTankData,
) -> BTreeMap<TankId, TankRecord> {
    let mut tanks = BTreeMap::new();
    for (id, category) in assignment.iter() {
        let record = render_tank(config, id, category, custom.get(id));
        tanks.insert(id, record);
    }
    tanks
}

fn render_tank(
    config: &TankConfiguration,
    id: TankId,
    category: TankCategory,
    custom: Option<&TankOverride>,
) -> TankRecord {
    let name = custom
        .and_then(|value| value.name.clone())
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| id.default_name());
    let dead_bottom = custom
        .and_then(|value| value.dead_bottom)
        .unwrap_or(config.default_dead_bottom)
        .max(0.0);
    let buffer = custom
        .and_then(|value| value.buffer)
        .unwrap_or(config.default_buffer)
        .max(0.0);
    let idle_crude_lines = if category == TankCategory::Idle {
        custom
            .and_then(|value| value.idle_lines.clone())
            .unwrap_or_default()
    } else {
        Vec::new()
    };
    let derived = default_level(
        category,
        config.tank_capacity,
        dead_bottom,
        buffer,
        &idle_crude_lines,
    );
    let level = match category {
        TankCategory::Idle => derived,
        _ => custom
            .and_then(|value| value.level_for(category))
            .unwrap_or(derived)
            .max(0.0),
    };
    TankRecord {
        id,
        name,
        category,
        level,
        dead_bottom,
        buffer,
        idle_crude_lines,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assign::assign;

    fn config() -> TankConfiguration {
        TankConfiguration {
            num_tanks: 5,
            num_filled: 2,
            num_empty: 1,
            specific_idle_ids: Vec::new(),
            tank_capacity: 500_000.0,
            default_dead_bottom: 10_000.0,
            default_buffer: 5_000.0,
        }
    }

    fn id(raw: u32) -> TankId {
        TankId::new(raw).expect("id")
    }

    #[test]
    fn renders_category_defaults() {
        let config = config();
        let assignment = assign(5, 2, 1, &[]).expect("assign");
        let tanks = render_tanks(&config, &assignment, &CustomTankData::default());
        assert_eq!(tanks.len(), 5);
        assert_eq!(tanks[&id(1)].level, 500_000.0);
        assert_eq!(tanks[&id(3)].level, 12_500.0);
        assert_eq!(tanks[&id(4)].category, TankCategory::Idle);
        assert_eq!(tanks[&id(4)].level, 12_500.0);
        assert_eq!(tanks[&id(5)].name, "Tank 5");
    }

    #[test]
    fn overrides_survive_and_respect_category() {
        let config = config();
        let assignment = assign(5, 2, 1, &[]).expect("assign");
        let mut custom = CustomTankData::default();
        custom.insert(
            id(2),
            TankOverride {
                name: Some("North 2".into()),
                level: Some(480_000.0),
                level_category: Some(TankCategory::Filled),
                ..TankOverride::default()
            },
        );
        custom.insert(
            id(3),
            TankOverride {
                level: Some(300_000.0),
                level_category: Some(TankCategory::Filled),
                ..TankOverride::default()
            },
        );
        custom.insert(
            id(4),
            TankOverride {
                idle_lines: Some(vec![CrudeLine::new("Erha", 40_000.0)]),
                ..TankOverride::default()
            },
        );
        let tanks = render_tanks(&config, &assignment, &custom);
        assert_eq!(tanks[&id(2)].name, "North 2");
        assert_eq!(tanks[&id(2)].level, 480_000.0);
        // captured while FILLED, tank 3 is EMPTY now
        assert_eq!(tanks[&id(3)].level, 12_500.0);
        assert_eq!(tanks[&id(4)].level, 52_500.0);
    }

    #[test]
    fn clearing_category_levels_drops_empty_entries() {
        let mut custom = CustomTankData::default();
        custom.insert(
            id(3),
            TankOverride {
                level: Some(20_000.0),
                level_category: Some(TankCategory::Empty),
                ..TankOverride::default()
            },
        );
        custom.clear_levels_for(TankCategory::Empty);
        assert!(custom.is_empty());
    }
}
