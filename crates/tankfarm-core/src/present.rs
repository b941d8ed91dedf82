//! Turns backend responses into display blocks: tables, metric cards,
//! chart series and tank-state summaries.
//!
//! Nothing here draws; the web UI renders blocks as HTML and the CLI as
//! aligned text.

#![allow(missing_docs)]

use serde_json::Value;
use time::macros::format_description;
use time::Date;

use crate::crude_mix::MixSummary;
use crate::lenient::{format_plain, format_thousands, value_as_f64};
use crate::response::{BufferAnalysis, OptimizationResponse, Row, SimulationResponse};

/// Tank states with their display colors, in summary order.
pub const STATE_COLORS: [(&str, &str); 13] = [
    ("READY", "#10b981"),
    ("FEEDING", "#3b82f6"),
    ("EMPTY", "#ef4444"),
    ("FILLING", "#f59e0b"),
    ("FILLED", "#8b5cf6"),
    ("SETTLING", "#eab308"),
    ("LAB", "#06b6d4"),
    ("SUSPENDED", "#6b7280"),
    ("IDLE", "#0d47a1"),
    ("MAINTENANCE", "#ec4899"),
    ("CLEANING", "#14b8a6"),
    ("RESERVED", "#a855f7"),
    (UNMATCHED_STATE, "#94a3b8"),
];

/// Bucket for state strings outside the palette.
pub const UNMATCHED_STATE: &str = "N/A - NO MATCH";
const FALLBACK_COLOR: &str = "#6b7280";

/// Simulation log entries shown, newest last.
pub const LOG_TAIL: usize = 100;
const LOG_COLUMNS: [&str; 5] = ["Timestamp", "Level", "Event", "Tank", "Message"];
const DATE_COLUMN: &str = "Date";
const CERTIFIED_COLUMN: &str = "cert stk";

#[must_use]
pub fn state_color(state: &str) -> &'static str {
    STATE_COLORS
        .iter()
        .find(|(name, _)| *name == state)
        .map_or(FALLBACK_COLOR, |(_, color)| *color)
}

/// Tanks per grid row for `tank_count` tanks.
#[must_use]
pub fn grid_columns(tank_count: usize) -> usize {
    match tank_count {
        0..=4 => tank_count.max(1),
        5..=9 => 3,
        10..=16 => 4,
        17..=25 => 5,
        _ => 6,
    }
}

/// Split items into grid rows sized by [`grid_columns`].
#[must_use]
pub fn grid_rows<T: Clone>(items: &[T]) -> Vec<Vec<T>> {
    items
        .chunks(grid_columns(items.len()))
        .map(<[T]>::to_vec)
        .collect()
}

/// Display text of a JSON cell.
#[must_use]
pub fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        Value::Number(number) => number.as_f64().map_or_else(|| number.to_string(), format_plain),
        other => other.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub title: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    /// Columns follow the first row's key order, then keys first seen in
    /// later rows.
    #[must_use]
    pub fn from_rows(title: impl Into<String>, rows: &[Row]) -> Self {
        let mut columns: Vec<String> = Vec::new();
        for row in rows {
            for key in row.keys() {
                if !columns.iter().any(|column| column == key) {
                    columns.push(key.clone());
                }
            }
        }
        Self::with_columns(title, columns, rows)
    }

    #[must_use]
    pub fn with_columns(title: impl Into<String>, columns: Vec<String>, rows: &[Row]) -> Self {
        let rows = rows
            .iter()
            .map(|row| {
                columns
                    .iter()
                    .map(|column| row.get(column).map(cell_text).unwrap_or_default())
                    .collect()
            })
            .collect();
        Self {
            title: title.into(),
            columns,
            rows,
        }
    }

    /// Left-aligned columns separated by two spaces, with a dash rule under
    /// the header.
    #[must_use]
    pub fn to_text(&self) -> String {
        let mut widths: Vec<usize> = self.columns.iter().map(|c| c.chars().count()).collect();
        for row in &self.rows {
            for (idx, cell) in row.iter().enumerate() {
                if let Some(width) = widths.get_mut(idx) {
                    *width = (*width).max(cell.chars().count());
                }
            }
        }
        let line = |cells: &[String]| -> String {
            let padded: Vec<String> = cells
                .iter()
                .zip(&widths)
                .map(|(cell, width)| format!("{cell:<width$}"))
                .collect();
            padded.join("  ").trim_end().to_string()
        };
        let rule: Vec<String> = widths.iter().map(|width| "-".repeat(*width)).collect();
        let mut out = vec![line(&self.columns), rule.join("  ")];
        out.extend(self.rows.iter().map(|row| line(row)));
        out.join("\n")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetricCard {
    pub label: String,
    pub value: String,
    /// Background color for state cards.
    pub color: Option<&'static str>,
}

impl MetricCard {
    fn plain(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            value: value.into(),
            color: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    Table(Table),
    Cards { title: String, cards: Vec<MetricCard> },
    Report { title: String, lines: Vec<String> },
    Warning(String),
    Placeholder(String),
}

impl Block {
    fn placeholder(what: &str) -> Self {
        Self::Placeholder(format!("No {what} data available."))
    }

    #[must_use]
    pub fn to_text(&self) -> String {
        match self {
            Self::Table(table) => format!("{}\n{}", table.title, table.to_text()),
            Self::Cards { title, cards } => {
                let mut out = vec![title.clone()];
                out.extend(cards.iter().map(|card| format!("  {}: {}", card.label, card.value)));
                out.join("\n")
            }
            Self::Report { title, lines } => {
                let mut out = vec![title.clone()];
                out.extend(lines.iter().cloned());
                out.join("\n")
            }
            Self::Warning(message) => format!("warning: {message}"),
            Self::Placeholder(message) => message.clone(),
        }
    }
}

/// One numeric column of the daily table, keyed by date.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartSeries {
    pub column: String,
    pub points: Vec<(String, f64)>,
}

/// Series for every column whose non-blank cells all parse as numbers.
#[must_use]
pub fn chart_series(rows: &[Row]) -> Vec<ChartSeries> {
    let Some(first) = rows.first() else {
        return Vec::new();
    };
    let x_of = |idx: usize, row: &Row| {
        row.get(DATE_COLUMN)
            .map(cell_text)
            .unwrap_or_else(|| (idx + 1).to_string())
    };
    first
        .keys()
        .filter(|column| column.as_str() != DATE_COLUMN)
        .filter_map(|column| {
            let mut points = Vec::with_capacity(rows.len());
            for (idx, row) in rows.iter().enumerate() {
                let cell = row.get(column).unwrap_or(&Value::Null);
                if cell_text(cell).trim().is_empty() {
                    continue;
                }
                points.push((x_of(idx, row), value_as_f64(cell)?));
            }
            (!points.is_empty()).then(|| ChartSeries {
                column: column.clone(),
                points,
            })
        })
        .collect()
}

/// State counts and certified stock at the last simulated day.
#[derive(Debug, Clone, PartialEq)]
pub struct StateSummary {
    /// `(state, count, color)` in palette order; zero counts omitted.
    pub counts: Vec<(String, usize, &'static str)>,
    /// `(tank column, state)` in column order, for the grid.
    pub tanks: Vec<(String, String)>,
    pub certified_stock: f64,
    pub ready_feeding: usize,
    /// `None` when the processing rate is not positive or there is no stock.
    pub days_remaining: Option<f64>,
}

impl StateSummary {
    #[must_use]
    pub fn certified_mmbbl(&self) -> f64 {
        self.certified_stock / 1_000_000.0
    }

    #[must_use]
    pub fn cards(&self) -> Vec<MetricCard> {
        let mut cards: Vec<MetricCard> = self
            .counts
            .iter()
            .map(|(state, count, color)| MetricCard {
                label: state.clone(),
                value: count.to_string(),
                color: Some(*color),
            })
            .collect();
        cards.push(MetricCard::plain(
            "Certified Stock (MMbbl)",
            format!("{:.3}", self.certified_mmbbl()),
        ));
        cards.push(MetricCard::plain(
            "Days Remaining",
            self.days_remaining
                .map_or_else(|| "N/A".to_string(), |days| format!("{days:.2}")),
        ));
        cards.push(MetricCard::plain(
            "Ready + Feeding Tanks",
            self.ready_feeding.to_string(),
        ));
        cards
    }
}

fn is_tank_column(column: &str) -> bool {
    column
        .strip_prefix("Tank")
        .is_some_and(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
}

/// Summarize the last daily row. `None` without rows.
#[must_use]
pub fn state_summary(rows: &[Row], processing_rate: f64) -> Option<StateSummary> {
    state_summary_at(rows, None, processing_rate)
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
enum DayKey {
    Date(Date),
    Text(String),
}

fn day_key(text: &str) -> DayKey {
    let text = text.trim();
    let head = text.get(..10).unwrap_or(text);
    Date::parse(head, format_description!("[year]-[month]-[day]"))
        .or_else(|_| Date::parse(head, format_description!("[day]/[month]/[year]")))
        .map_or_else(|_| DayKey::Text(text.to_string()), DayKey::Date)
}

fn row_day(row: &Row) -> Option<String> {
    row.get(DATE_COLUMN)
        .map(cell_text)
        .filter(|day| !day.trim().is_empty())
}

/// Dates of the daily rows, in row order.
#[must_use]
pub fn simulation_days(rows: &[Row]) -> Vec<String> {
    rows.iter().filter_map(row_day).collect()
}

/// Summarize the latest row dated at or before `day`, or the first row when
/// every row is later. Without `day` the last row is used. Tanks with a
/// blank or missing state count as READY.
#[must_use]
pub fn state_summary_at(
    rows: &[Row],
    day: Option<&str>,
    processing_rate: f64,
) -> Option<StateSummary> {
    let row = match day {
        None => rows.last()?,
        Some(day) => {
            let wanted = day_key(day);
            rows.iter()
                .rev()
                .find(|row| row_day(row).is_some_and(|date| day_key(&date) <= wanted))
                .or_else(|| rows.first())?
        }
    };

    let mut columns: Vec<&String> = Vec::new();
    for column in rows.iter().flat_map(|row| row.keys()) {
        if is_tank_column(column) && !columns.contains(&column) {
            columns.push(column);
        }
    }
    let tanks: Vec<(String, String)> = columns
        .into_iter()
        .map(|column| {
            let state = row
                .get(column)
                .map(|value| cell_text(value).trim().to_uppercase())
                .filter(|state| !state.is_empty())
                .unwrap_or_else(|| "READY".to_string());
            (column.clone(), state)
        })
        .collect();

    let counts = STATE_COLORS
        .iter()
        .filter_map(|(state, color)| {
            let count = tanks
                .iter()
                .filter(|(_, tank_state)| {
                    if *state == UNMATCHED_STATE {
                        STATE_COLORS.iter().all(|(known, _)| *known != tank_state.as_str())
                    } else {
                        tank_state.as_str() == *state
                    }
                })
                .count();
            (count > 0).then(|| (state.to_string(), count, *color))
        })
        .collect();
    let ready_feeding = tanks
        .iter()
        .filter(|(_, state)| state == "READY" || state == "FEEDING")
        .count();
    let certified_stock = row
        .get(CERTIFIED_COLUMN)
        .and_then(value_as_f64)
        .unwrap_or(0.0);
    let days_remaining = (processing_rate > 0.0 && certified_stock > 0.0)
        .then(|| certified_stock / processing_rate);

    Some(StateSummary {
        counts,
        tanks,
        certified_stock,
        ready_feeding,
        days_remaining,
    })
}

/// Everything shown after a simulation run.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationView {
    pub daily: Block,
    pub charts: Vec<ChartSeries>,
    pub states: Option<StateSummary>,
    /// Dates a state summary can be shown for.
    pub days: Vec<String>,
    /// Day the summary was taken at; `None` is the end of the horizon.
    pub selected_day: Option<String>,
    pub metrics: Block,
    pub log: Block,
    pub cargo: Block,
}

impl SimulationView {
    /// Blocks in display order.
    #[must_use]
    pub fn blocks(&self) -> Vec<Block> {
        let mut blocks = vec![self.metrics.clone()];
        if let Some(states) = &self.states {
            let title = match &self.selected_day {
                Some(day) => format!("Tank states at {day}"),
                None => "Tank states at end of horizon".to_string(),
            };
            blocks.push(Block::Cards {
                title,
                cards: states.cards(),
            });
        }
        blocks.extend([self.daily.clone(), self.cargo.clone(), self.log.clone()]);
        blocks
    }

    /// Re-take the state summary at `day`; `None` goes back to the last row.
    pub fn show_day(&mut self, rows: &[Row], day: Option<&str>, processing_rate: f64) {
        self.states = state_summary_at(rows, day, processing_rate);
        self.selected_day = day.map(str::to_string);
    }
}

#[must_use]
pub fn present_simulation(response: &SimulationResponse, processing_rate: f64) -> SimulationView {
    let daily = if response.simulation_data.is_empty() {
        Block::placeholder("daily simulation")
    } else {
        Block::Table(Table::from_rows("Daily summary", &response.simulation_data))
    };
    let metrics = if response.metrics.is_empty() {
        Block::placeholder("metrics")
    } else {
        Block::Cards {
            title: "Metrics".to_string(),
            cards: response
                .metrics
                .iter()
                .map(|(label, value)| MetricCard::plain(label.clone(), cell_text(value)))
                .collect(),
        }
    };
    SimulationView {
        daily,
        charts: chart_series(&response.simulation_data),
        states: state_summary(&response.simulation_data, processing_rate),
        days: simulation_days(&response.simulation_data),
        selected_day: None,
        metrics,
        log: present_log(&response.simulation_log),
        cargo: if response.cargo_report.is_empty() {
            Block::placeholder("cargo report")
        } else {
            Block::Table(Table::from_rows("Cargo report", &response.cargo_report))
        },
    }
}

/// Last [`LOG_TAIL`] log entries with the standard log columns that are
/// present; all columns when none of them is.
#[must_use]
pub fn present_log(entries: &[Row]) -> Block {
    if entries.is_empty() {
        return Block::placeholder("simulation log");
    }
    let tail = &entries[entries.len().saturating_sub(LOG_TAIL)..];
    let columns: Vec<String> = LOG_COLUMNS
        .iter()
        .filter(|column| tail.iter().any(|row| row.contains_key(**column)))
        .map(|column| (*column).to_string())
        .collect();
    let title = format!("Simulation log (last {} entries)", tail.len());
    if columns.is_empty() {
        Block::Table(Table::from_rows(title, tail))
    } else {
        Block::Table(Table::with_columns(title, columns, tail))
    }
}

/// Scenarios sorted by key.
#[must_use]
pub fn present_buffer_analysis(analysis: &BufferAnalysis) -> Block {
    if analysis.scenarios.is_empty() {
        return Block::placeholder("buffer analysis");
    }
    let mut keys: Vec<&String> = analysis.scenarios.keys().collect();
    keys.sort();
    let rows = keys
        .into_iter()
        .map(|key| {
            let scenario = &analysis.scenarios[key];
            vec![
                key.clone(),
                scenario.description.clone(),
                format_plain(scenario.lead_time),
                format_thousands(scenario.buffer_needed),
                format_plain(scenario.tanks_needed),
                if scenario.adequate_current { "Yes" } else { "No" }.to_string(),
                format_plain(scenario.additional_tanks),
            ]
        })
        .collect();
    Block::Table(Table {
        title: "Buffer analysis".to_string(),
        columns: [
            "Scenario",
            "Description",
            "Lead time (days)",
            "Buffer needed (bbl)",
            "Tanks needed",
            "Adequate",
            "Additional tanks",
        ]
        .map(str::to_string)
        .to_vec(),
        rows,
    })
}

/// Cargo optimization answers are shown verbatim, pretty-printed.
#[must_use]
pub fn present_cargo_optimization(value: &Value) -> Block {
    if value.is_null() {
        return Block::placeholder("cargo optimization");
    }
    let text = serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string());
    Block::Report {
        title: "Cargo optimization".to_string(),
        lines: text.lines().map(str::to_string).collect(),
    }
}

#[must_use]
pub fn present_optimization(response: &OptimizationResponse) -> Vec<Block> {
    let results = match (&response.optimization_results, response.success) {
        (Some(results), true) => results,
        _ => {
            let mut message = response
                .error
                .clone()
                .unwrap_or_else(|| "Optimization failed.".to_string());
            if let Some(details) = &response.details {
                message.push_str(&format!(" ({})", cell_text(details)));
            }
            return vec![Block::Warning(message)];
        }
    };
    let mut blocks = vec![Block::Cards {
        title: "Optimization summary".to_string(),
        cards: vec![
            MetricCard::plain(
                "Total Charter Cost",
                format!("${}", format_thousands(results.total_charter_cost)),
            ),
            MetricCard::plain("Total Cargoes", format_plain(results.total_cargoes)),
            MetricCard::plain(
                "Total To Load (bbl)",
                format_thousands(results.total_to_load_bbl),
            ),
            MetricCard::plain("Solver Status", results.solver_status.clone()),
        ],
    }];
    blocks.push(if results.cargo_schedule.is_empty() {
        Block::placeholder("cargo schedule")
    } else {
        Block::Table(Table::from_rows("Cargo schedule", &results.cargo_schedule))
    });
    if !results.console_output.is_empty() {
        blocks.push(Block::Report {
            title: "Solver report".to_string(),
            lines: results.console_output.clone(),
        });
    }
    blocks
}

/// Crude-mix breakdown with its total and the soft warning.
#[must_use]
pub fn present_mix(summary: &MixSummary) -> Vec<Block> {
    if summary.lines.is_empty() {
        return vec![Block::placeholder("crude mix")];
    }
    let mut rows: Vec<Vec<String>> = summary
        .lines
        .iter()
        .map(|line| {
            vec![
                line.name.clone(),
                format!("{:.1}%", line.percentage),
                format_thousands(line.daily_volume),
            ]
        })
        .collect();
    rows.push(vec![
        "Total".to_string(),
        format!("{:.1}%", summary.total_percentage),
        format_thousands(summary.lines.iter().map(|line| line.daily_volume).sum()),
    ]);
    let mut blocks = vec![Block::Table(Table {
        title: "Crude mix".to_string(),
        columns: ["Crude", "Percentage", "Daily volume (bbl)"]
            .map(str::to_string)
            .to_vec(),
        rows,
    })];
    if let Some(warning) = &summary.warning {
        blocks.push(Block::Warning(warning.clone()));
    }
    blocks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crude_mix::{summarize, CrudeMixRow};
    use expect_test::expect;
    use serde_json::json;

    fn rows(value: Value) -> Vec<Row> {
        serde_json::from_value(value).expect("rows")
    }

    #[test]
    fn grid_column_rule() {
        let cols: Vec<usize> = [1, 4, 5, 9, 10, 16, 17, 25, 26, 40]
            .into_iter()
            .map(grid_columns)
            .collect();
        assert_eq!(cols, vec![1, 4, 3, 3, 4, 4, 5, 5, 6, 6]);
        let grid = grid_rows(&(1..=7).collect::<Vec<_>>());
        assert_eq!(grid, vec![vec![1, 2, 3], vec![4, 5, 6], vec![7]]);
    }

    #[test]
    fn daily_table_and_summary() {
        let data = rows(json!([
            {"Date": "2025-08-10", "Opening Stock (bbl)": "1,000,000", "cert stk": "600,000",
             "Processing (bbl)": 50000, "Tank1": "READY", "Tank2": "FEEDING", "Tank3": "EMPTY"},
            {"Date": "2025-08-11", "Opening Stock (bbl)": "950,000", "cert stk": "550,000",
             "Processing (bbl)": 50000, "Tank1": "READY", "Tank2": "FEEDING", "Tank3": "odd"}
        ]));
        let table = Table::from_rows("Daily summary", &data);
        expect![[r#"
            Date        Opening Stock (bbl)  cert stk  Processing (bbl)  Tank1  Tank2    Tank3
            ----------  -------------------  --------  ----------------  -----  -------  -----
            2025-08-10  1,000,000            600,000   50000             READY  FEEDING  EMPTY
            2025-08-11  950,000              550,000   50000             READY  FEEDING  odd"#]]
        .assert_eq(&table.to_text());

        let summary = state_summary(&data, 50_000.0).expect("summary");
        let counts: Vec<(&str, usize)> = summary
            .counts
            .iter()
            .map(|(state, count, _)| (state.as_str(), *count))
            .collect();
        assert_eq!(counts, vec![("READY", 1), ("FEEDING", 1), (UNMATCHED_STATE, 1)]);
        assert_eq!(summary.ready_feeding, 2);
        assert_eq!(summary.certified_stock, 550_000.0);
        assert_eq!(summary.days_remaining, Some(11.0));
        assert_eq!(state_summary(&data, 0.0).and_then(|s| s.days_remaining), None);

        let series = chart_series(&data);
        let names: Vec<&str> = series.iter().map(|s| s.column.as_str()).collect();
        assert_eq!(names, vec!["Opening Stock (bbl)", "cert stk", "Processing (bbl)"]);
        assert_eq!(series[0].points[1], ("2025-08-11".to_string(), 950_000.0));
    }

    #[test]
    fn summary_at_a_day_uses_the_latest_row_not_after_it() {
        let data = rows(json!([
            {"Date": "2025-08-10", "cert stk": "100,000", "Tank1": "READY", "Tank2": "FILLING"},
            {"Date": "2025-08-12", "cert stk": "200,000", "Tank1": "FEEDING", "Tank2": "SETTLING"},
            {"Date": "2025-08-14", "cert stk": "300,000", "Tank1": "EMPTY", "Tank2": "LAB"}
        ]));
        let at = |day| state_summary_at(&data, Some(day), 50_000.0).expect("summary");

        let summary = at("2025-08-13");
        assert_eq!(summary.certified_stock, 200_000.0);
        assert_eq!(summary.tanks[1], ("Tank2".to_string(), "SETTLING".to_string()));

        assert_eq!(at("2025-08-12").certified_stock, 200_000.0);
        assert_eq!(at("14/08/2025").certified_stock, 300_000.0);
        // Earlier than every row: the first row.
        assert_eq!(at("2025-08-01").certified_stock, 100_000.0);
        assert_eq!(simulation_days(&data), vec!["2025-08-10", "2025-08-12", "2025-08-14"]);
    }

    #[test]
    fn blank_or_missing_states_count_as_ready() {
        let data = rows(json!([
            {"Date": "2025-08-10", "Tank1": "FEEDING", "Tank2": "", "Tank3": "EMPTY"},
            {"Date": "2025-08-11", "Tank1": "FEEDING", "Tank2": "  "}
        ]));
        let summary = state_summary(&data, 0.0).expect("summary");
        let counts: Vec<(&str, usize)> = summary
            .counts
            .iter()
            .map(|(state, count, _)| (state.as_str(), *count))
            .collect();
        assert_eq!(counts, vec![("READY", 2), ("FEEDING", 1)]);
        assert_eq!(summary.ready_feeding, 3);
    }

    #[test]
    fn view_switches_day() {
        let response = SimulationResponse {
            simulation_data: rows(json!([
                {"Date": "2025-08-10", "Tank1": "READY"},
                {"Date": "2025-08-11", "Tank1": "EMPTY"}
            ])),
            ..SimulationResponse::default()
        };
        let mut view = present_simulation(&response, 50_000.0);
        assert!(matches!(&view.blocks()[1], Block::Cards { title, .. } if title == "Tank states at end of horizon"));

        view.show_day(&response.simulation_data, Some("2025-08-10"), 50_000.0);
        assert_eq!(view.selected_day.as_deref(), Some("2025-08-10"));
        assert_eq!(view.states.as_ref().map(|s| s.ready_feeding), Some(1));
        assert!(matches!(&view.blocks()[1], Block::Cards { title, .. } if title == "Tank states at 2025-08-10"));
    }

    #[test]
    fn log_keeps_last_hundred_and_known_columns() {
        let entries: Vec<Row> = (0..130)
            .map(|i| {
                rows(json!([{"Timestamp": format!("t{i}"), "Level": "INFO", "Cargo": "C1",
                             "Message": "m"}]))
                .remove(0)
            })
            .collect();
        let Block::Table(table) = present_log(&entries) else {
            panic!("expected a table");
        };
        assert_eq!(table.rows.len(), LOG_TAIL);
        assert_eq!(table.rows[0][0], "t30");
        assert_eq!(table.columns, vec!["Timestamp", "Level", "Message"]);
    }

    #[test]
    fn missing_sections_render_placeholders() {
        let view = present_simulation(&SimulationResponse::default(), 50_000.0);
        assert_eq!(
            view.daily,
            Block::Placeholder("No daily simulation data available.".into())
        );
        assert_eq!(
            view.log.to_text(),
            "No simulation log data available."
        );
        assert!(view.states.is_none());
        assert!(view.charts.is_empty());
    }

    #[test]
    fn buffer_scenarios_sorted_by_key() {
        let analysis: BufferAnalysis = serde_json::from_value(json!({
            "zeta": {"description": "Late", "lead_time": 9, "buffer_needed": 450000,
                     "tanks_needed": 1, "adequate_current": true, "additional_tanks": 0},
            "alpha": {"description": "Early", "lead_time": 3, "buffer_needed": 150000,
                      "tanks_needed": 1, "adequate_current": false, "additional_tanks": 1}
        }))
        .expect("analysis");
        expect![[r#"
            Buffer analysis
            Scenario  Description  Lead time (days)  Buffer needed (bbl)  Tanks needed  Adequate  Additional tanks
            --------  -----------  ----------------  -------------------  ------------  --------  ----------------
            alpha     Early        3                 150,000              1             No        1
            zeta      Late         9                 450,000              1             Yes       0"#]]
        .assert_eq(&present_buffer_analysis(&analysis).to_text());
    }

    #[test]
    fn mix_block_with_total() {
        let summary = summarize(
            &[
                CrudeMixRow::new("Bonny Light", 50.0),
                CrudeMixRow::new("Forcados", 30.0),
                CrudeMixRow::new("Quaiboe", 10.0),
                CrudeMixRow::new("Erha", 10.0),
            ],
            40_000.0,
        );
        let blocks = present_mix(&summary);
        assert_eq!(blocks.len(), 1);
        expect![[r#"
            Crude mix
            Crude        Percentage  Daily volume (bbl)
            -----------  ----------  ------------------
            Bonny Light  50.0%       20,000
            Forcados     30.0%       12,000
            Quaiboe      10.0%       4,000
            Erha         10.0%       4,000
            Total        100.0%      40,000"#]]
        .assert_eq(&blocks[0].to_text());
    }

    #[test]
    fn optimization_failure_is_a_warning() {
        let response = OptimizationResponse {
            success: false,
            error: Some("Solver failed".into()),
            ..OptimizationResponse::default()
        };
        assert_eq!(
            present_optimization(&response),
            vec![Block::Warning("Solver failed".into())]
        );
    }

    #[test]
    fn state_palette_lookup() {
        assert_eq!(state_color("READY"), "#10b981");
        assert_eq!(state_color("IDLE"), "#0d47a1");
        assert_eq!(state_color("whatever"), "#6b7280");
    }
}
