//! Backend response shapes.
//!
//! Every section is optional on the wire; missing or `null` sections decode
//! to empty values and the presenter shows a placeholder for them.

#![allow(missing_docs)]

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::crude_mix::CrudeMixRow;
use crate::lenient;

/// One table row, columns in response order.
pub type Row = IndexMap<String, Value>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimulationResponse {
    #[serde(default, deserialize_with = "lenient::null_as_default")]
    pub simulation_data: Vec<Row>,
    #[serde(default, deserialize_with = "lenient::null_as_default")]
    pub simulation_log: Vec<Row>,
    #[serde(default, deserialize_with = "lenient::null_as_default")]
    pub metrics: IndexMap<String, Value>,
    #[serde(default, deserialize_with = "lenient::null_as_default")]
    pub cargo_report: Vec<Row>,
    #[serde(default)]
    pub csv_files: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SimulationResponse {
    /// CSV download paths. The backend sends either a list of paths, a list
    /// of `{url}`/`{path}` objects, or a map of name to path.
    #[must_use]
    pub fn csv_urls(&self) -> Vec<String> {
        fn url_of(value: &Value) -> Option<String> {
            match value {
                Value::String(url) => Some(url.clone()),
                Value::Object(map) => map
                    .get("url")
                    .or_else(|| map.get("path"))
                    .and_then(Value::as_str)
                    .map(str::to_string),
                _ => None,
            }
        }
        match &self.csv_files {
            Value::Array(items) => items.iter().filter_map(url_of).collect(),
            Value::Object(map) => map.values().filter_map(url_of).collect(),
            _ => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BufferScenario {
    #[serde(default, deserialize_with = "lenient::string_or_empty")]
    pub description: String,
    #[serde(default, deserialize_with = "lenient::f64_or_zero")]
    pub lead_time: f64,
    #[serde(default, deserialize_with = "lenient::f64_or_zero")]
    pub buffer_needed: f64,
    #[serde(default, deserialize_with = "lenient::f64_or_zero")]
    pub tanks_needed: f64,
    #[serde(default, deserialize_with = "lenient::bool_or_false")]
    pub adequate_current: bool,
    #[serde(default, deserialize_with = "lenient::f64_or_zero")]
    pub additional_tanks: f64,
}

/// Scenario key to scenario.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BufferAnalysis {
    pub scenarios: IndexMap<String, BufferScenario>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OptimizationResults {
    #[serde(default, deserialize_with = "lenient::null_as_default")]
    pub cargo_schedule: Vec<Row>,
    #[serde(default, deserialize_with = "lenient::f64_or_zero")]
    pub total_charter_cost: f64,
    #[serde(default, deserialize_with = "lenient::f64_or_zero")]
    pub total_cargoes: f64,
    #[serde(default, deserialize_with = "lenient::f64_or_zero")]
    pub total_to_load_bbl: f64,
    #[serde(default, deserialize_with = "lenient::string_or_empty")]
    pub solver_status: String,
    /// Solver report, one line per entry.
    #[serde(default, deserialize_with = "lenient::null_as_default")]
    pub console_output: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OptimizationResponse {
    #[serde(default, deserialize_with = "lenient::bool_or_false")]
    pub success: bool,
    #[serde(default)]
    pub optimization_results: Option<OptimizationResults>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InventoryRangeResponse {
    #[serde(default, deserialize_with = "lenient::bool_or_false")]
    pub success: bool,
    #[serde(default, deserialize_with = "lenient::string_or_empty")]
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CrudeMixResponse {
    #[serde(default, deserialize_with = "lenient::null_as_default")]
    pub crude_mix_data: Vec<CrudeMixRow>,
}

/// JSON answer of the export endpoints when they do not stream a file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExportResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simulation_sections_tolerate_nulls() {
        let response: SimulationResponse = serde_json::from_str(
            r#"{"simulation_data":[{"Date":"2025-08-10","Closing Stock (bbl)":"1,000"}],
                "simulation_log":null,"metrics":{"Total processed":"1,200,000"},
                "csv_files":["/download/daily_summary.csv",{"url":"/download/cargo_report.csv"}]}"#,
        )
        .expect("decode");
        assert_eq!(response.simulation_data.len(), 1);
        assert!(response.simulation_log.is_empty());
        assert!(response.cargo_report.is_empty());
        assert_eq!(
            response.csv_urls(),
            vec!["/download/daily_summary.csv", "/download/cargo_report.csv"]
        );
    }

    #[test]
    fn buffer_analysis_keeps_scenarios() {
        let analysis: BufferAnalysis = serde_json::from_str(
            r#"{"b_slow":{"description":"Slow","lead_time":"12","buffer_needed":600000,
                 "tanks_needed":2,"adequate_current":false,"additional_tanks":1},
                "a_fast":{"description":"Fast","lead_time":5,"buffer_needed":250000,
                 "tanks_needed":1,"adequate_current":true,"additional_tanks":0}}"#,
        )
        .expect("decode");
        assert_eq!(analysis.scenarios.len(), 2);
        assert_eq!(analysis.scenarios["b_slow"].lead_time, 12.0);
        assert!(analysis.scenarios["a_fast"].adequate_current);
    }

    #[test]
    fn optimization_failure_carries_error() {
        let response: OptimizationResponse =
            serde_json::from_str(r#"{"success":false,"error":"Solver failed"}"#).expect("decode");
        assert!(!response.success);
        assert!(response.optimization_results.is_none());
        assert_eq!(response.error.as_deref(), Some("Solver failed"));
    }
}
