//! Snapshot of user-entered tank data taken before a re-render.
//!
//! Every rendered tank contributes its current name, its level when it was
//! moved off the derived default, per-tank dead bottom and buffer, and the
//! crude lines of idle tanks. Entries of tanks that are not rendered right
//! now are carried over untouched.

use std::collections::BTreeMap;

use crate::assign::TankConfiguration;
use crate::render::{default_level, CustomTankData, TankOverride};
use crate::tank::{TankCategory, TankId, TankRecord};

/// Merge live tank values over `previous`, measured against the defaults of
/// `before` (the configuration the live tanks were rendered with).
pub fn snapshot_overrides(
    live: &BTreeMap<TankId, TankRecord>,
    previous: &CustomTankData,
    before: &TankConfiguration,
) -> CustomTankData {
    let mut next = previous.clone();
    for (id, tank) in live {
        let mut entry = previous.get(*id).cloned().unwrap_or_default();
        capture_tank(&mut entry, tank, before);
        next.insert(*id, entry);
    }
    next
}

fn capture_tank(entry: &mut TankOverride, tank: &TankRecord, before: &TankConfiguration) {
    let name = tank.name.trim();
    if !name.is_empty() {
        entry.name = Some(name.to_string());
    }

    entry.dead_bottom = differs(tank.dead_bottom, before.default_dead_bottom);
    entry.buffer = differs(tank.buffer, before.default_buffer);

    match tank.category {
        TankCategory::Filled | TankCategory::Empty => {
            let derived = default_level(
                tank.category,
                before.tank_capacity,
                tank.dead_bottom,
                tank.buffer,
                &[],
            );
            match differs(tank.level, derived) {
                Some(level) => {
                    entry.level = Some(level);
                    entry.level_category = Some(tank.category);
                }
                None => {
                    entry.level = None;
                    entry.level_category = None;
                }
            }
        }
        TankCategory::Idle => {
            entry.idle_lines = if tank.idle_crude_lines.is_empty() {
                None
            } else {
                Some(tank.idle_crude_lines.clone())
            };
        }
        TankCategory::Unassigned => {}
    }
}

fn differs(value: f64, default: f64) -> Option<f64> {
    ((value - default).abs() > f64::EPSILON).then_some(value)
}
