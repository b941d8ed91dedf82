//! Crude-mix rows and their daily volume breakdown.

#![allow(missing_docs)]

use serde::{Deserialize, Serialize};

use crate::lenient;

/// Allowed deviation of the percentage total from 100 before warning.
pub const MIX_TOLERANCE: f64 = 0.01;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CrudeMixRow {
    #[serde(default, deserialize_with = "lenient::string_or_empty")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient::f64_or_zero")]
    pub percentage: f64,
}

impl CrudeMixRow {
    #[must_use]
    pub fn new(name: impl Into<String>, percentage: f64) -> Self {
        Self {
            name: name.into(),
            percentage,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MixLine {
    pub name: String,
    pub percentage: f64,
    pub daily_volume: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MixSummary {
    pub lines: Vec<MixLine>,
    pub total_percentage: f64,
    /// Set when the total is off 100 by more than [`MIX_TOLERANCE`].
    /// Never blocks anything.
    pub warning: Option<String>,
}

#[must_use]
pub fn summarize(rows: &[CrudeMixRow], processing_rate: f64) -> MixSummary {
    let lines: Vec<MixLine> = rows
        .iter()
        .map(|row| MixLine {
            name: row.name.clone(),
            percentage: row.percentage,
            daily_volume: processing_rate * row.percentage / 100.0,
        })
        .collect();
    let total_percentage: f64 = rows.iter().map(|row| row.percentage).sum();
    let warning = ((total_percentage - 100.0).abs() > MIX_TOLERANCE).then(|| {
        format!("Total percentage is {total_percentage:.1}%, expected 100%.")
    });
    MixSummary {
        lines,
        total_percentage,
        warning,
    }
}

/// Parallel name/percentage arrays the optimizer endpoint expects.
/// Rows without a name are skipped.
#[must_use]
pub fn optimizer_inputs(rows: &[CrudeMixRow]) -> (Vec<String>, Vec<f64>) {
    rows.iter()
        .filter(|row| !row.name.trim().is_empty())
        .map(|row| (row.name.trim().to_string(), row.percentage))
        .unzip()
}
