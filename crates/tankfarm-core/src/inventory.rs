//! Local check of current tank inventory against a min/max range.

#![allow(missing_docs)]

use serde::{Deserialize, Serialize};

use crate::lenient::format_thousands;
use crate::tank::TankRecord;

/// Display class of a user-facing message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageClass {
    Success,
    Warning,
    Error,
}

impl MessageClass {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InventoryCheck {
    pub ok: bool,
    pub class: MessageClass,
    pub message: String,
    pub total: f64,
}

/// An inverted or empty range is an error whatever the tank levels are.
pub fn validate_inventory_range<'a>(
    min: f64,
    max: f64,
    tanks: impl IntoIterator<Item = &'a TankRecord>,
) -> InventoryCheck {
    let total: f64 = tanks.into_iter().map(|tank| tank.level).sum();
    if min >= max {
        return InventoryCheck {
            ok: false,
            class: MessageClass::Error,
            message: format!(
                "Minimum inventory ({}) must be less than maximum inventory ({}).",
                format_thousands(min),
                format_thousands(max)
            ),
            total,
        };
    }
    if (min..=max).contains(&total) {
        InventoryCheck {
            ok: true,
            class: MessageClass::Success,
            message: format!(
                "Current inventory {} bbl is within range {} - {} bbl.",
                format_thousands(total),
                format_thousands(min),
                format_thousands(max)
            ),
            total,
        }
    } else {
        InventoryCheck {
            ok: false,
            class: MessageClass::Warning,
            message: format!(
                "Current inventory {} bbl is outside range {} - {} bbl.",
                format_thousands(total),
                format_thousands(min),
                format_thousands(max)
            ),
            total,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tank::{TankCategory, TankId};

    fn tank(id: u32, level: f64) -> TankRecord {
        TankRecord {
            id: TankId::new(id).expect("id"),
            name: String::new(),
            category: TankCategory::Filled,
            level,
            dead_bottom: 0.0,
            buffer: 0.0,
            idle_crude_lines: Vec::new(),
        }
    }

    #[test]
    fn inverted_range_is_an_error_regardless_of_levels() {
        let tanks = [tank(1, 450_000.0)];
        let check = validate_inventory_range(500_000.0, 400_000.0, &tanks);
        assert!(!check.ok);
        assert_eq!(check.class, MessageClass::Error);
        assert_eq!(
            check.message,
            "Minimum inventory (500,000) must be less than maximum inventory (400,000)."
        );
    }

    #[test]
    fn classifies_total_against_range() {
        let tanks = [tank(1, 300_000.0), tank(2, 200_000.0)];
        let inside = validate_inventory_range(100_000.0, 600_000.0, &tanks);
        assert!(inside.ok);
        assert_eq!(inside.class, MessageClass::Success);
        assert_eq!(inside.total, 500_000.0);

        let outside = validate_inventory_range(600_000.0, 900_000.0, &tanks);
        assert!(!outside.ok);
        assert_eq!(outside.class, MessageClass::Warning);
    }
}
