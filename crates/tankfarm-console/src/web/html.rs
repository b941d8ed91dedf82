//! Server-rendered HTML fragments for the embedded UI.

#![allow(missing_docs)]

use std::fmt::Write as _;

use tankfarm_core::form::keys::{tank_key, TankKey};
use tankfarm_core::form::{FieldKind, FieldSpec, FieldGroup, FIELD_CATALOG};
use tankfarm_core::lenient::{format_plain, format_thousands};
use tankfarm_core::present::{
    grid_rows, state_color, Block, ChartSeries, SimulationView, StateSummary, Table,
};
use tankfarm_core::{FormState, TankCategory, TankRecord};

use crate::app::{Console, CurrentResults, StatusLine};

const CHART_WIDTH: f64 = 320.0;
const CHART_HEIGHT: f64 = 90.0;

#[must_use]
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

#[must_use]
pub fn page(console: &Console) -> String {
    let form = console.form();
    let mut out = String::from(
        "<!doctype html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
         <title>Tank farm scheduler</title>\n\
         <link rel=\"stylesheet\" href=\"/styles.css\">\n\
         <script src=\"/app.js\" defer></script>\n</head>\n<body>\n\
         <header><h1>Tank farm scheduler</h1></header>\n<main>\n",
    );
    out.push_str("<section id=\"fields\">");
    out.push_str(&fields_fragment(form));
    out.push_str("</section>\n<section id=\"tanks\">");
    out.push_str(&tanks_fragment(form));
    out.push_str("</section>\n<section id=\"mix\">");
    out.push_str(&mix_fragment(form));
    out.push_str("</section>\n");
    out.push_str(ACTIONS);
    out.push_str("<div id=\"status\">");
    out.push_str(&status_fragment(console.status()));
    out.push_str("</div>\n<section id=\"results\">");
    out.push_str(&results_fragment(console.results()));
    out.push_str("</section>\n</main>\n</body>\n</html>\n");
    out
}

const ACTIONS: &str = "<nav id=\"actions\">\
<button data-action=\"simulate\">Run simulation</button>\
<button data-action=\"buffer\">Buffer analysis</button>\
<button data-action=\"cargo\">Cargo optimization</button>\
<button data-action=\"optimize\">Optimize crude mix</button>\
<button data-action=\"inventory\">Check inventory range</button>\
<button data-action=\"export-tank-status\">Export tank status</button>\
<button data-action=\"export-charts\">Export charts</button>\
<button data-action=\"export-solver-report\">Export solver report</button>\
<button data-action=\"csv\">Download CSV files</button>\
<button data-action=\"save\">Save now</button>\
<span id=\"busy\" hidden>Working...</span>\
</nav>\n";

#[must_use]
pub fn fields_fragment(form: &FormState) -> String {
    let locked = form.tank_configuration().idle_input_locked();
    let mut out = String::new();
    for group in FieldGroup::ALL {
        let _ = write!(out, "<fieldset><legend>{}</legend>", escape(group.title()));
        for spec in FIELD_CATALOG.iter().filter(|spec| spec.group == group) {
            out.push_str(&field_input(
                spec,
                form,
                locked && spec.key == "specificIdleTanks",
            ));
        }
        out.push_str("</fieldset>");
    }
    out
}

fn field_input(spec: &FieldSpec, form: &FormState, read_only: bool) -> String {
    let key = escape(spec.key);
    let label = escape(spec.label);
    let ro = if read_only { " readonly" } else { "" };
    match spec.kind {
        FieldKind::Checkbox => {
            let checked = if form.checked(spec.key) { " checked" } else { "" };
            format!(
                "<label><input type=\"checkbox\" data-field=\"{key}\"{checked}{ro}> {label}</label>"
            )
        }
        kind => {
            let input_type = match kind {
                FieldKind::Number => "number\" step=\"any",
                FieldKind::DateTime => "datetime-local",
                _ => "text",
            };
            format!(
                "<label>{label}<input type=\"{input_type}\" data-field=\"{key}\" value=\"{}\"{ro}></label>",
                escape(&form.text(spec.key))
            )
        }
    }
}

#[must_use]
pub fn tanks_fragment(form: &FormState) -> String {
    let mut out = String::new();
    if let Some(err) = form.assignment_error() {
        let _ = write!(out, "<div class=\"error\">{}</div>", escape(&err.to_string()));
        return out;
    }
    out.push_str(&gate_fragment(form));
    let duplicates = form.gate().duplicate_names;
    for category in TankCategory::RENDERED {
        let tanks: Vec<&TankRecord> = form
            .tanks()
            .values()
            .filter(|tank| tank.category == category)
            .collect();
        if tanks.is_empty() {
            continue;
        }
        let _ = write!(
            out,
            "<h2>{} ({})</h2><div class=\"tank-grid {}\">",
            escape(category.heading()),
            tanks.len(),
            category.as_str().to_ascii_lowercase()
        );
        for tank in tanks {
            out.push_str(&tank_block(tank, duplicates.contains(&tank.id)));
        }
        out.push_str("</div>");
    }
    out
}

/// Rejection shown above the tanks while the gate is closed.
#[must_use]
pub fn gate_fragment(form: &FormState) -> String {
    match form.gate().rejection_message() {
        Some(message) => format!("<div class=\"warning\" id=\"gate\">{}</div>", escape(&message)),
        None => String::new(),
    }
}

fn tank_block(tank: &TankRecord, duplicate: bool) -> String {
    let id = tank.id;
    let class = if duplicate { "tank duplicate" } else { "tank" };
    let number = |kind: TankKey, value: f64, read_only: bool| {
        format!(
            "<input type=\"number\" step=\"any\" data-field=\"{}\" value=\"{}\"{}>",
            tank_key(kind, id),
            format_plain(value),
            if read_only { " readonly" } else { "" }
        )
    };
    let mut out = format!(
        "<div class=\"{class}\" data-tank=\"{id}\"><h3>Tank {id}</h3>\
         <label>Name<input type=\"text\" data-field=\"{}\" value=\"{}\"></label>",
        tank_key(TankKey::Name, id),
        escape(&tank.name)
    );
    let idle = tank.category == TankCategory::Idle;
    let _ = write!(
        out,
        "<label>Level (bbl){}</label><label>Dead bottom{}</label><label>Buffer{}</label>",
        number(TankKey::Level, tank.level, idle),
        number(TankKey::DeadBottom, tank.dead_bottom, false),
        number(TankKey::Buffer, tank.buffer, false)
    );
    if idle {
        out.push_str("<table class=\"idle-lines\"><tr><th>Crude</th><th>Volume</th><th></th></tr>");
        for (index, line) in tank.idle_crude_lines.iter().enumerate() {
            let _ = write!(
                out,
                "<tr data-line=\"{index}\"><td><input type=\"text\" data-line-name value=\"{}\"></td>\
                 <td><input type=\"number\" step=\"any\" data-line-volume value=\"{}\"></td>\
                 <td><button data-line-remove>Remove</button></td></tr>",
                escape(&line.name),
                format_plain(line.volume)
            );
        }
        let _ = write!(
            out,
            "</table><button data-line-add>Add crude</button>\
             <p class=\"floor\">Floor {} bbl + crudes {} bbl</p>",
            format_thousands(tank.operational_floor()),
            format_thousands(tank.idle_volume())
        );
    }
    out.push_str("</div>");
    out
}

#[must_use]
pub fn mix_fragment(form: &FormState) -> String {
    let summary = form.mix_summary();
    let mut out = String::from(
        "<h2>Crude mix</h2><table class=\"mix\"><tr><th>Crude</th><th>%</th><th>bbl/day</th><th></th></tr>",
    );
    for (index, line) in summary.lines.iter().enumerate() {
        let _ = write!(
            out,
            "<tr data-mix=\"{index}\"><td><input type=\"text\" data-mix-name value=\"{}\"></td>\
             <td><input type=\"number\" step=\"any\" data-mix-percentage value=\"{}\"></td>\
             <td>{}</td><td><button data-mix-remove>Remove</button></td></tr>",
            escape(&line.name),
            format_plain(line.percentage),
            format_thousands(line.daily_volume)
        );
    }
    let _ = write!(
        out,
        "<tr class=\"total\"><td>Total</td><td>{:.1}%</td><td></td><td></td></tr></table>\
         <button data-mix-add>Add crude</button>",
        summary.total_percentage
    );
    if let Some(warning) = &summary.warning {
        let _ = write!(out, "<div class=\"warning\">{}</div>", escape(warning));
    }
    out
}

#[must_use]
pub fn status_fragment(status: Option<&StatusLine>) -> String {
    match status {
        Some(line) => format!(
            "<div class=\"message {}\">{}</div>",
            line.class.as_str(),
            escape(&line.message)
        ),
        None => String::new(),
    }
}

#[must_use]
pub fn results_fragment(results: &CurrentResults) -> String {
    let mut out = String::new();
    if let CurrentResults::Simulation { view, .. } = results {
        if !view.days.is_empty() {
            out.push_str(&day_select(view));
        }
        if let Some(states) = &view.states {
            out.push_str(&state_grid(states));
        }
        if !view.charts.is_empty() {
            out.push_str("<div class=\"charts\">");
            for series in &view.charts {
                out.push_str(&chart_svg(series));
            }
            out.push_str("</div>");
        }
    }
    for block in results.blocks() {
        out.push_str(&block_html(&block));
    }
    out
}

#[must_use]
pub fn block_html(block: &Block) -> String {
    match block {
        Block::Table(table) => table_html(table),
        Block::Cards { title, cards } => {
            let mut out = format!("<h2>{}</h2><div class=\"cards\">", escape(title));
            for card in cards {
                let style = card
                    .color
                    .map(|color| format!(" style=\"background:{color}\""))
                    .unwrap_or_default();
                let _ = write!(
                    out,
                    "<div class=\"card\"{style}><span>{}</span><strong>{}</strong></div>",
                    escape(&card.label),
                    escape(&card.value)
                );
            }
            out.push_str("</div>");
            out
        }
        Block::Report { title, lines } => format!(
            "<h2>{}</h2><pre class=\"report\">{}</pre>",
            escape(title),
            escape(&lines.join("\n"))
        ),
        Block::Warning(message) => format!("<div class=\"warning\">{}</div>", escape(message)),
        Block::Placeholder(message) => format!("<p class=\"placeholder\">{}</p>", escape(message)),
    }
}

fn table_html(table: &Table) -> String {
    let mut out = format!("<h2>{}</h2><table><tr>", escape(&table.title));
    for column in &table.columns {
        let _ = write!(out, "<th>{}</th>", escape(column));
    }
    out.push_str("</tr>");
    for row in &table.rows {
        out.push_str("<tr>");
        for cell in row {
            let _ = write!(out, "<td>{}</td>", escape(cell));
        }
        out.push_str("</tr>");
    }
    out.push_str("</table>");
    out
}

fn day_select(view: &SimulationView) -> String {
    let selected = view.selected_day.as_deref();
    let mut out = format!(
        "<label class=\"day-select\">Tank states on <select data-day>\
         <option value=\"\"{}>End of horizon</option>",
        if selected.is_none() { " selected" } else { "" }
    );
    for day in &view.days {
        let _ = write!(
            out,
            "<option value=\"{0}\"{1}>{0}</option>",
            escape(day),
            if selected == Some(day.as_str()) { " selected" } else { "" }
        );
    }
    out.push_str("</select></label>");
    out
}

fn state_grid(summary: &StateSummary) -> String {
    let mut out = String::from("<h2>Tank states</h2><div class=\"state-grid\">");
    for row in grid_rows(&summary.tanks) {
        out.push_str("<div class=\"state-row\">");
        for (tank, state) in row {
            let _ = write!(
                out,
                "<div class=\"state\" style=\"background:{}\"><span>{}</span><strong>{}</strong></div>",
                state_color(&state),
                escape(&tank),
                escape(&state)
            );
        }
        out.push_str("</div>");
    }
    out.push_str("</div>");
    out
}

/// Polyline scaled into a fixed box; x is the point index.
fn chart_svg(series: &ChartSeries) -> String {
    let (min, max) = series
        .points
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), (_, y)| {
            (lo.min(*y), hi.max(*y))
        });
    let span = if max > min { max - min } else { 1.0 };
    let step = if series.points.len() > 1 {
        CHART_WIDTH / (series.points.len() - 1) as f64
    } else {
        0.0
    };
    let points: Vec<String> = series
        .points
        .iter()
        .enumerate()
        .map(|(idx, (_, y))| {
            let x = step * idx as f64;
            let y = CHART_HEIGHT - (y - min) / span * CHART_HEIGHT;
            format!("{x:.1},{y:.1}")
        })
        .collect();
    format!(
        "<figure class=\"chart\"><figcaption>{}</figcaption>\
         <svg viewBox=\"0 0 {CHART_WIDTH} {CHART_HEIGHT}\" preserveAspectRatio=\"none\">\
         <polyline fill=\"none\" stroke=\"currentColor\" points=\"{}\"/></svg></figure>",
        escape(&series.column),
        points.join(" ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tankfarm_core::TankId;

    #[test]
    fn escapes_markup() {
        assert_eq!(escape("<a href=\"x\">&'"), "&lt;a href=&quot;x&quot;&gt;&amp;&#39;");
    }

    #[test]
    fn tanks_render_by_category() {
        let mut form = FormState::new();
        form.set_field("numTanks", "4").expect("tanks");
        form.set_field("numFilled", "1").expect("filled");
        form.set_field("numEmpty", "1").expect("empty");
        form.set_field("specificIdleTanks", "4").expect("idle");
        let html = tanks_fragment(&form);
        assert!(html.contains("data-tank=\"1\""));
        assert!(html.contains("data-tank=\"2\""));
        assert!(!html.contains("data-tank=\"3\""));
        assert!(html.contains("data-tank=\"4\""));
        assert!(html.contains("data-line-add"));
        assert!(!html.contains("id=\"gate\""));
    }

    #[test]
    fn duplicate_names_are_flagged() {
        let mut form = FormState::new();
        let id = |raw| TankId::new(raw).expect("id");
        form.edit_tank(id(1), tankfarm_core::form::TankEdit::Name("T-1".into()))
            .expect("name");
        form.edit_tank(id(3), tankfarm_core::form::TankEdit::Name("T-1".into()))
            .expect("name");
        let html = tanks_fragment(&form);
        assert_eq!(html.matches("tank duplicate").count(), 2);
        assert!(html.contains("Duplicate tank names found (tanks 1, 3)"));
    }

    #[test]
    fn over_allocation_shows_only_the_error() {
        let mut form = FormState::new();
        form.set_field("numFilled", "13").expect("filled");
        let html = tanks_fragment(&form);
        assert!(html.starts_with("<div class=\"error\">"));
        assert!(!html.contains("data-tank"));
    }

    #[test]
    fn idle_input_locks_without_slots() {
        let form = FormState::new();
        let html = fields_fragment(&form);
        assert!(html.contains("data-field=\"specificIdleTanks\" value=\"\" readonly"));
    }

    #[test]
    fn simulation_results_offer_each_day() {
        let response: tankfarm_core::response::SimulationResponse =
            serde_json::from_value(serde_json::json!({
                "simulation_data": [
                    {"Date": "2025-08-10", "Tank1": "READY"},
                    {"Date": "2025-08-11", "Tank1": ""}
                ]
            }))
            .expect("response");
        let mut view = tankfarm_core::present::present_simulation(&response, 50_000.0);
        view.show_day(&response.simulation_data, Some("2025-08-10"), 50_000.0);
        let html = results_fragment(&CurrentResults::Simulation { response, view });
        assert!(html.contains("<option value=\"\">End of horizon</option>"));
        assert!(html.contains("<option value=\"2025-08-10\" selected>2025-08-10</option>"));
        assert!(html.contains("<option value=\"2025-08-11\">2025-08-11</option>"));
        assert!(html.contains("Tank states at 2025-08-10"));
    }

    #[test]
    fn placeholder_and_cards() {
        assert_eq!(
            block_html(&Block::Placeholder("No metrics data available.".into())),
            "<p class=\"placeholder\">No metrics data available.</p>"
        );
        let cards = Block::Cards {
            title: "Tank states".into(),
            cards: vec![tankfarm_core::present::MetricCard {
                label: "READY".into(),
                value: "3".into(),
                color: Some("#10b981"),
            }],
        };
        expect_test::expect![[r##"<h2>Tank states</h2><div class="cards"><div class="card" style="background:#10b981"><span>READY</span><strong>3</strong></div></div>"##]]
            .assert_eq(&block_html(&cards));
    }

    #[test]
    fn tables_escape_cells() {
        let table = Table {
            title: "Cargo report".into(),
            columns: vec!["Vessel".into(), "Crude".into()],
            rows: vec![vec!["VLCC-1".into(), "Bonny <Light>".into()]],
        };
        expect_test::expect![[r#"<h2>Cargo report</h2><table><tr><th>Vessel</th><th>Crude</th></tr><tr><td>VLCC-1</td><td>Bonny &lt;Light&gt;</td></tr></table>"#]]
            .assert_eq(&block_html(&Block::Table(table)));
    }
}
