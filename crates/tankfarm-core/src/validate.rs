//! Shared validation gate for save, simulation and crude-mix optimization.

#![allow(missing_docs)]

use std::collections::{BTreeMap, BTreeSet};

use crate::assign::IdleValidation;
use crate::tank::{TankId, TankRecord};

/// Ids whose name, as sent to the backend, is shared with another tank.
/// A blank name is sent as `Tank {id}`; comparison is case-sensitive.
pub fn validate_tank_names<'a>(tanks: impl IntoIterator<Item = &'a TankRecord>) -> BTreeSet<TankId> {
    let mut by_name: BTreeMap<String, Vec<TankId>> = BTreeMap::new();
    for tank in tanks {
        by_name.entry(tank.display_name()).or_default().push(tank.id);
    }
    by_name
        .into_values()
        .filter(|ids| ids.len() > 1)
        .flatten()
        .collect()
}

/// Result of running both checks. The gate is open only when neither fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateReport {
    pub duplicate_names: BTreeSet<TankId>,
    pub idle: IdleValidation,
}

impl GateReport {
    pub fn is_open(&self) -> bool {
        self.duplicate_names.is_empty() && self.idle.is_valid()
    }

    /// User-facing rejection text, `None` when the gate is open.
    pub fn rejection_message(&self) -> Option<String> {
        if !self.duplicate_names.is_empty() {
            let ids: Vec<String> = self.duplicate_names.iter().map(ToString::to_string).collect();
            return Some(format!(
                "Duplicate tank names found (tanks {}). Each tank must have a unique name.",
                ids.join(", ")
            ));
        }
        self.idle.message()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tank::TankCategory;

    fn tank(id: u32, name: &str) -> TankRecord {
        TankRecord {
            id: TankId::new(id).expect("id"),
            name: name.to_string(),
            category: TankCategory::Filled,
            level: 0.0,
            dead_bottom: 0.0,
            buffer: 0.0,
            idle_crude_lines: Vec::new(),
        }
    }

    #[test]
    fn flags_trimmed_duplicates_only() {
        let tanks = vec![
            tank(1, "Alpha"),
            tank(2, " Alpha "),
            tank(3, "alpha"),
            tank(4, ""),
            tank(5, "   "),
        ];
        let dupes: Vec<u32> = validate_tank_names(&tanks).into_iter().map(TankId::get).collect();
        assert_eq!(dupes, vec![1, 2]);
    }

    #[test]
    fn blank_name_clashes_with_its_default() {
        let tanks = vec![tank(1, "Tank 3"), tank(2, "Beta"), tank(3, " ")];
        let dupes: Vec<u32> = validate_tank_names(&tanks).into_iter().map(TankId::get).collect();
        assert_eq!(dupes, vec![1, 3]);
    }

    #[test]
    fn duplicate_names_take_precedence_in_message() {
        let report = GateReport {
            duplicate_names: [TankId::new(2).expect("id")].into_iter().collect(),
            idle: IdleValidation::NoIdleSlots { pinned: 1 },
        };
        assert!(!report.is_open());
        assert!(report
            .rejection_message()
            .is_some_and(|m| m.starts_with("Duplicate tank names")));

        let open = GateReport {
            duplicate_names: BTreeSet::new(),
            idle: IdleValidation::Valid,
        };
        assert!(open.is_open());
        assert_eq!(open.rejection_message(), None);
    }
}
