//! The form model: global fields, rendered tanks and crude-mix rows.
//!
//! [`FormState`] is the single source of truth read before every request.
//! [`FormState::collect`] is the only producer of [`PersistedFormState`] and
//! [`FormState::apply`] its only consumer. Per-tank wire keys
//! (`tank{N}Name`, `tank{N}Level`, `deadBottom{N}`, `buffer{N}`) exist only
//! at that boundary; see [`keys`].

#![allow(missing_docs)]

use std::collections::BTreeMap;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use smol_str::SmolStr;
use time::macros::{format_description, time};
use time::{Date, PrimitiveDateTime};

use crate::assign::{parse_idle_ids, IdleValidation, TankAssignment, TankConfiguration};
use crate::crude_mix::{summarize, CrudeMixRow, MixSummary};
use crate::error::CoreError;
use crate::lenient::{self, format_plain, parse_number, value_as_f64};
use crate::reconcile::snapshot_overrides;
use crate::render::{default_level, render_tanks, CustomTankData, TankOverride};
use crate::tank::{CrudeLine, TankCategory, TankId, TankRecord};
use crate::validate::{validate_tank_names, GateReport};

/// Upper bound on tank counts and pinned idle ids.
pub const MAX_TANK_ID: u32 = 999;

/// Keys whose change reassigns tank categories.
const TANK_SHAPE_KEYS: [&str; 4] = ["numTanks", "numFilled", "numEmpty", "specificIdleTanks"];
/// Keys whose change re-derives category default levels.
const DEFAULT_LEVEL_KEYS: [&str; 3] = ["tankCapacity", "defaultDeadBottom", "defaultBuffer"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Number,
    Text,
    DateTime,
    Checkbox,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldGroup {
    Tanks,
    Processing,
    Inventory,
    Schedule,
    Vessels,
    Mode,
}

impl FieldGroup {
    pub const ALL: [FieldGroup; 6] = [
        Self::Tanks,
        Self::Processing,
        Self::Inventory,
        Self::Schedule,
        Self::Vessels,
        Self::Mode,
    ];

    #[must_use]
    pub const fn title(self) -> &'static str {
        match self {
            Self::Tanks => "Tank configuration",
            Self::Processing => "Processing",
            Self::Inventory => "Inventory range",
            Self::Schedule => "Scheduling parameters",
            Self::Vessels => "Vessel fleet",
            Self::Mode => "Scheduling mode",
        }
    }
}

/// One recognized global input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub key: &'static str,
    pub label: &'static str,
    pub kind: FieldKind,
    pub group: FieldGroup,
    /// Default as the input would hold it; checkboxes use `true`/`false`.
    pub default: &'static str,
}

impl FieldSpec {
    #[must_use]
    pub fn default_value(&self) -> FieldValue {
        match self.kind {
            FieldKind::Checkbox => FieldValue::Checked(self.default == "true"),
            _ => FieldValue::Text(self.default.to_string()),
        }
    }

    /// Wire encoding: numeric inputs go out as JSON numbers when they parse.
    fn encode(&self, value: FieldValue) -> FieldValue {
        match (self.kind, value) {
            (FieldKind::Number, FieldValue::Text(text)) => match parse_number(&text) {
                Some(number) => FieldValue::Number(number),
                None => FieldValue::Text(text),
            },
            (FieldKind::Checkbox, value) => FieldValue::Checked(value.is_checked()),
            (_, value) => value,
        }
    }

    /// Form encoding of a value read from a snapshot.
    fn decode(&self, value: &FieldValue) -> FieldValue {
        match self.kind {
            FieldKind::Checkbox => FieldValue::Checked(value.is_checked()),
            _ => FieldValue::Text(value.as_text()),
        }
    }
}

const fn field(
    key: &'static str,
    label: &'static str,
    kind: FieldKind,
    group: FieldGroup,
    default: &'static str,
) -> FieldSpec {
    FieldSpec {
        key,
        label,
        kind,
        group,
        default,
    }
}

use FieldGroup as G;
use FieldKind as K;

/// Every recognized global field, in collect order.
pub const FIELD_CATALOG: &[FieldSpec] = &[
    field("numTanks", "Number of tanks", K::Number, G::Tanks, "12"),
    field("numFilled", "Filled tanks", K::Number, G::Tanks, "8"),
    field("numEmpty", "Empty tanks", K::Number, G::Tanks, "4"),
    field("specificIdleTanks", "Specific idle tank ids", K::Text, G::Tanks, ""),
    field("tankCapacity", "Tank capacity (bbl)", K::Number, G::Tanks, "500000"),
    field("defaultDeadBottom", "Default dead bottom (bbl)", K::Number, G::Tanks, "10000"),
    field("defaultBuffer", "Default buffer (bbl)", K::Number, G::Tanks, "5000"),
    field("processingRate", "Processing rate (bbl/day)", K::Number, G::Processing, "50000"),
    field("schedulingWindow", "Scheduling window (days)", K::Number, G::Processing, "30"),
    field("crudeProcessingDate", "Crude processing start", K::DateTime, G::Processing, "2025-08-10T08:00"),
    field("minInventory", "Minimum inventory (bbl)", K::Number, G::Inventory, "0"),
    field("maxInventory", "Maximum inventory (bbl)", K::Number, G::Inventory, "0"),
    field("settlingDays", "Settling time (days)", K::Number, G::Schedule, "2"),
    field("labHours", "Lab testing (hours)", K::Number, G::Schedule, "12"),
    field("dischargeRate", "Discharge rate (bbl/day)", K::Number, G::Schedule, "30000"),
    field("horizonDays", "Horizon (days)", K::Number, G::Schedule, "30"),
    field("minReadyTanks", "Minimum ready tanks", K::Number, G::Schedule, "8"),
    field("journeyDays", "Journey (days)", K::Number, G::Schedule, "10"),
    field("preJourneyDays", "Pre-journey (days)", K::Number, G::Schedule, "1"),
    field("preDischargeDays", "Pre-discharge (days)", K::Number, G::Schedule, "1"),
    field("pumpingRate", "Pumping rate (bbl/day)", K::Number, G::Schedule, "30000"),
    field("ulccCapacity", "ULCC capacity (bbl)", K::Number, G::Vessels, "0"),
    field("ulccRateDay", "ULCC charter rate (per day)", K::Number, G::Vessels, "50000"),
    field("ulccIncludeReturn", "ULCC includes return leg", K::Checkbox, G::Vessels, "true"),
    field("vlccCapacity", "VLCC capacity (bbl)", K::Number, G::Vessels, "2000000"),
    field("vlccRateDay", "VLCC charter rate (per day)", K::Number, G::Vessels, "50000"),
    field("vlccIncludeReturn", "VLCC includes return leg", K::Checkbox, G::Vessels, "true"),
    field("suezmaxCapacity", "Suezmax capacity (bbl)", K::Number, G::Vessels, "1000000"),
    field("suezmaxRateDay", "Suezmax charter rate (per day)", K::Number, G::Vessels, "50000"),
    field("suezmaxIncludeReturn", "Suezmax includes return leg", K::Checkbox, G::Vessels, "true"),
    field("aframaxCapacity", "Aframax capacity (bbl)", K::Number, G::Vessels, "750000"),
    field("aframaxRateDay", "Aframax charter rate (per day)", K::Number, G::Vessels, "50000"),
    field("aframaxIncludeReturn", "Aframax includes return leg", K::Checkbox, G::Vessels, "true"),
    field("panamaxCapacity", "Panamax capacity (bbl)", K::Number, G::Vessels, "500000"),
    field("panamaxRateDay", "Panamax charter rate (per day)", K::Number, G::Vessels, "50000"),
    field("panamaxIncludeReturn", "Panamax includes return leg", K::Checkbox, G::Vessels, "true"),
    field("handymaxCapacity", "Handymax capacity (bbl)", K::Number, G::Vessels, "0"),
    field("handymaxRateDay", "Handymax charter rate (per day)", K::Number, G::Vessels, "50000"),
    field("handymaxIncludeReturn", "Handymax includes return leg", K::Checkbox, G::Vessels, "true"),
    field("handySizeCapacity", "Handysize capacity (bbl)", K::Number, G::Vessels, "0"),
    field("handySizeRateDay", "Handysize charter rate (per day)", K::Number, G::Vessels, "50000"),
    field("handySizeIncludeReturn", "Handysize includes return leg", K::Checkbox, G::Vessels, "true"),
    field("schedulingMode", "Scheduling mode", K::Text, G::Mode, "solver"),
    field("useOptimizedSchedule", "Use optimized schedule", K::Checkbox, G::Mode, "false"),
    field("manualArrivalB1", "Manual arrival, berth 1", K::DateTime, G::Mode, ""),
    field("manualArrivalB2", "Manual arrival, berth 2", K::DateTime, G::Mode, ""),
];

#[must_use]
pub fn field_spec(key: &str) -> Option<&'static FieldSpec> {
    FIELD_CATALOG.iter().find(|spec| spec.key == key)
}

/// Per-tank wire keys.
pub mod keys {
    use crate::tank::TankId;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum TankKey {
        Name,
        Level,
        DeadBottom,
        Buffer,
    }

    #[must_use]
    pub fn tank_key(kind: TankKey, id: TankId) -> String {
        match kind {
            TankKey::Name => format!("tank{id}Name"),
            TankKey::Level => format!("tank{id}Level"),
            TankKey::DeadBottom => format!("deadBottom{id}"),
            TankKey::Buffer => format!("buffer{id}"),
        }
    }

    #[must_use]
    pub fn parse_tank_key(key: &str) -> Option<(TankKey, TankId)> {
        if let Some(rest) = key.strip_prefix("tank") {
            if let Some(digits) = rest.strip_suffix("Name") {
                return parse_id(digits).map(|id| (TankKey::Name, id));
            }
            if let Some(digits) = rest.strip_suffix("Level") {
                return parse_id(digits).map(|id| (TankKey::Level, id));
            }
            return None;
        }
        if let Some(digits) = key.strip_prefix("deadBottom") {
            return parse_id(digits).map(|id| (TankKey::DeadBottom, id));
        }
        if let Some(digits) = key.strip_prefix("buffer") {
            return parse_id(digits).map(|id| (TankKey::Buffer, id));
        }
        None
    }

    fn parse_id(digits: &str) -> Option<TankId> {
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        digits.parse().ok().and_then(TankId::new)
    }
}

use keys::TankKey;

/// A form value as the input holds it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Checked(bool),
    Number(f64),
    Text(String),
    Other(Value),
}

impl FieldValue {
    #[must_use]
    pub fn as_text(&self) -> String {
        match self {
            Self::Checked(flag) => flag.to_string(),
            Self::Number(number) => format_plain(*number),
            Self::Text(text) => text.clone(),
            Self::Other(Value::Null) => String::new(),
            Self::Other(value) => value.to_string(),
        }
    }

    #[must_use]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Checked(_) => None,
            Self::Number(number) => Some(*number),
            Self::Text(text) => parse_number(text),
            Self::Other(value) => value_as_f64(value),
        }
    }

    #[must_use]
    pub fn is_checked(&self) -> bool {
        match self {
            Self::Checked(flag) => *flag,
            Self::Number(number) => *number != 0.0,
            Self::Text(text) => is_truthy(text),
            Self::Other(Value::Bool(flag)) => *flag,
            Self::Other(_) => false,
        }
    }
}

fn is_truthy(text: &str) -> bool {
    matches!(text.trim(), "true" | "True" | "1" | "yes" | "on")
}

/// An idle tank's initial charge as sent to the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdleTankEntry {
    #[serde(rename = "sequentialId", deserialize_with = "lenient::u32_or_zero")]
    pub sequential_id: u32,
    #[serde(
        rename = "initialCrudes",
        default,
        deserialize_with = "lenient::null_as_default"
    )]
    pub initial_crudes: Vec<CrudeLine>,
}

/// Full snapshot of the form; the request body for every backend call and
/// the persisted document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistedFormState {
    #[serde(flatten)]
    pub fields: IndexMap<String, FieldValue>,
    #[serde(
        rename = "crudeMixData",
        default,
        deserialize_with = "lenient::null_as_default"
    )]
    pub crude_mix_data: Vec<CrudeMixRow>,
    #[serde(
        rename = "idleTankData",
        default,
        deserialize_with = "lenient::null_as_default"
    )]
    pub idle_tank_data: Vec<IdleTankEntry>,
    /// Unix milliseconds of the save that produced this snapshot.
    #[serde(rename = "savedAt", default, skip_serializing_if = "Option::is_none")]
    pub saved_at: Option<i64>,
}

impl PersistedFormState {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.crude_mix_data.is_empty() && self.idle_tank_data.is_empty()
    }

    #[must_use]
    pub fn stamped(mut self, saved_at: i64) -> Self {
        self.saved_at = Some(saved_at);
        self
    }

    #[must_use]
    pub fn field(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(key)
    }
}

/// Stages of [`FormState::apply`], run in declaration order.
///
/// * `Fields` sets every global key; per-tank keys are skipped.
/// * `CrudeMix` replaces the mix rows unless the snapshot has none.
/// * `Tanks` needs the tank-shaping fields from `Fields`. It loads per-tank
///   names and levels for ids up to `max(numTanks, highest suffix)` and
///   re-renders.
/// * `IdleLines` needs the rendered tanks from `Tanks`; entries for tanks
///   that are not IDLE are skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyStage {
    Fields,
    CrudeMix,
    Tanks,
    IdleLines,
}

impl ApplyStage {
    pub const ORDER: [ApplyStage; 4] = [Self::Fields, Self::CrudeMix, Self::Tanks, Self::IdleLines];
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApplyReport {
    pub stages: Vec<ApplyStage>,
    pub fields: usize,
    /// `None` when the snapshot carried no mix rows and the existing ones
    /// were kept.
    pub crude_rows: Option<usize>,
    pub tanks: usize,
    pub idle_tanks: usize,
    pub skipped_idle: Vec<u32>,
}

/// What a field edit did to the tank list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldEffect {
    Updated,
    Regenerated,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TankEdit {
    Name(String),
    Level(f64),
    DeadBottom(f64),
    Buffer(f64),
}

#[derive(Debug, Clone)]
pub struct FormState {
    fields: IndexMap<String, FieldValue>,
    tanks: BTreeMap<TankId, TankRecord>,
    custom: CustomTankData,
    crude_mix: Vec<CrudeMixRow>,
    assignment: Option<TankAssignment>,
    assignment_error: Option<CoreError>,
    idle_validation: IdleValidation,
}

impl Default for FormState {
    fn default() -> Self {
        Self::new()
    }
}

impl FormState {
    #[must_use]
    pub fn new() -> Self {
        let fields = FIELD_CATALOG
            .iter()
            .map(|spec| (spec.key.to_string(), spec.default_value()))
            .collect();
        let mut state = Self {
            fields,
            tanks: BTreeMap::new(),
            custom: CustomTankData::default(),
            crude_mix: Vec::new(),
            assignment: None,
            assignment_error: None,
            idle_validation: IdleValidation::Valid,
        };
        state.render();
        state
    }

    #[must_use]
    pub fn field(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(key)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldValue)> + '_ {
        self.fields.iter().map(|(key, value)| (key.as_str(), value))
    }

    #[must_use]
    pub fn text(&self, key: &str) -> String {
        self.fields
            .get(key)
            .map(FieldValue::as_text)
            .unwrap_or_default()
    }

    /// Numeric value of a field; unparseable input falls back to the
    /// catalog default, then to zero.
    #[must_use]
    pub fn number(&self, key: &str) -> f64 {
        self.fields
            .get(key)
            .and_then(FieldValue::as_number)
            .or_else(|| field_spec(key).and_then(|spec| parse_number(spec.default)))
            .unwrap_or(0.0)
    }

    #[must_use]
    pub fn checked(&self, key: &str) -> bool {
        self.fields.get(key).is_some_and(FieldValue::is_checked)
    }

    fn count(&self, key: &str) -> u32 {
        self.number(key).round().clamp(0.0, f64::from(MAX_TANK_ID)) as u32
    }

    #[must_use]
    pub fn tank_configuration(&self) -> TankConfiguration {
        let mut specific_idle_ids = parse_idle_ids(&self.text("specificIdleTanks"));
        specific_idle_ids.retain(|id| id.get() <= MAX_TANK_ID);
        TankConfiguration {
            num_tanks: self.count("numTanks"),
            num_filled: self.count("numFilled"),
            num_empty: self.count("numEmpty"),
            specific_idle_ids,
            tank_capacity: self.number("tankCapacity").max(0.0),
            default_dead_bottom: self.number("defaultDeadBottom").max(0.0),
            default_buffer: self.number("defaultBuffer").max(0.0),
        }
    }

    #[must_use]
    pub fn tanks(&self) -> &BTreeMap<TankId, TankRecord> {
        &self.tanks
    }

    #[must_use]
    pub fn tank(&self, id: TankId) -> Option<&TankRecord> {
        self.tanks.get(&id)
    }

    #[must_use]
    pub fn assignment(&self) -> Option<&TankAssignment> {
        self.assignment.as_ref()
    }

    /// Set when the last render was refused (over-allocation).
    #[must_use]
    pub fn assignment_error(&self) -> Option<&CoreError> {
        self.assignment_error.as_ref()
    }

    #[must_use]
    pub fn idle_validation(&self) -> &IdleValidation {
        &self.idle_validation
    }

    #[must_use]
    pub fn crude_mix(&self) -> &[CrudeMixRow] {
        &self.crude_mix
    }

    pub fn crude_mix_mut(&mut self) -> &mut Vec<CrudeMixRow> {
        &mut self.crude_mix
    }

    #[must_use]
    pub fn mix_summary(&self) -> MixSummary {
        summarize(&self.crude_mix, self.number("processingRate"))
    }

    pub fn processing_start(&self) -> Result<PrimitiveDateTime, CoreError> {
        parse_form_datetime(&self.text("crudeProcessingDate"))
    }

    /// Duplicate-name and idle-allocation checks shared by save, simulate
    /// and optimize.
    #[must_use]
    pub fn gate(&self) -> GateReport {
        GateReport {
            duplicate_names: validate_tank_names(self.tanks.values()),
            idle: self.idle_validation.clone(),
        }
    }

    /// Store a raw input value. Per-tank keys are routed to
    /// [`FormState::edit_tank`].
    pub fn set_field(&mut self, key: &str, value: &str) -> Result<FieldEffect, CoreError> {
        if let Some((kind, id)) = keys::parse_tank_key(key) {
            let edit = match kind {
                TankKey::Name => TankEdit::Name(value.to_string()),
                TankKey::Level => TankEdit::Level(parse_field_number(key, value)?),
                TankKey::DeadBottom => TankEdit::DeadBottom(parse_field_number(key, value)?),
                TankKey::Buffer => TankEdit::Buffer(parse_field_number(key, value)?),
            };
            self.edit_tank(id, edit)?;
            return Ok(FieldEffect::Updated);
        }

        let stored = match field_spec(key).map(|spec| spec.kind) {
            Some(FieldKind::Checkbox) => FieldValue::Checked(is_truthy(value)),
            Some(FieldKind::Number) => {
                let trimmed = value.trim();
                if !trimmed.is_empty() && parse_number(trimmed).is_none() {
                    return Err(CoreError::InvalidNumber {
                        field: SmolStr::new(key),
                        value: SmolStr::new(value),
                    });
                }
                FieldValue::Text(trimmed.to_string())
            }
            Some(FieldKind::DateTime) => {
                let trimmed = value.trim();
                if !trimmed.is_empty() {
                    parse_form_datetime(trimmed)?;
                }
                FieldValue::Text(trimmed.to_string())
            }
            Some(FieldKind::Text) | None => FieldValue::Text(value.to_string()),
        };

        let before = self.tank_configuration();
        self.fields.insert(key.to_string(), stored);
        if TANK_SHAPE_KEYS.contains(&key) {
            self.regenerate(&before, false);
            Ok(FieldEffect::Regenerated)
        } else if DEFAULT_LEVEL_KEYS.contains(&key) {
            self.regenerate(&before, true);
            Ok(FieldEffect::Regenerated)
        } else {
            Ok(FieldEffect::Updated)
        }
    }

    pub fn edit_tank(&mut self, id: TankId, edit: TankEdit) -> Result<(), CoreError> {
        let tank = self
            .tanks
            .get_mut(&id)
            .ok_or(CoreError::UnknownTank(id.get()))?;
        let entry = self.custom.entry(id);
        match edit {
            TankEdit::Name(name) => {
                let trimmed = name.trim();
                entry.name = (!trimmed.is_empty()).then(|| trimmed.to_string());
                tank.name = name;
            }
            TankEdit::Level(level) => {
                if tank.category == TankCategory::Idle {
                    tank.recompute_idle_level();
                } else {
                    tank.level = level.max(0.0);
                    entry.level = Some(tank.level);
                    entry.level_category = Some(tank.category);
                }
            }
            TankEdit::DeadBottom(value) => {
                let follows_floor = level_follows_floor(tank);
                tank.dead_bottom = value.max(0.0);
                entry.dead_bottom = Some(tank.dead_bottom);
                settle_level(tank, follows_floor);
            }
            TankEdit::Buffer(value) => {
                let follows_floor = level_follows_floor(tank);
                tank.buffer = value.max(0.0);
                entry.buffer = Some(tank.buffer);
                settle_level(tank, follows_floor);
            }
        }
        Ok(())
    }

    pub fn add_idle_line(&mut self, id: TankId, line: CrudeLine) -> Result<usize, CoreError> {
        let tank = self.idle_tank_mut(id)?;
        tank.idle_crude_lines.push(CrudeLine::new(line.name, line.volume));
        let index = tank.idle_crude_lines.len() - 1;
        self.sync_idle_lines(id);
        Ok(index)
    }

    pub fn update_idle_line(
        &mut self,
        id: TankId,
        index: usize,
        line: CrudeLine,
    ) -> Result<(), CoreError> {
        let tank = self.idle_tank_mut(id)?;
        let slot = tank
            .idle_crude_lines
            .get_mut(index)
            .ok_or(CoreError::UnknownCrudeLine {
                tank: id.get(),
                index,
            })?;
        *slot = CrudeLine::new(line.name, line.volume);
        self.sync_idle_lines(id);
        Ok(())
    }

    pub fn remove_idle_line(&mut self, id: TankId, index: usize) -> Result<CrudeLine, CoreError> {
        let tank = self.idle_tank_mut(id)?;
        if index >= tank.idle_crude_lines.len() {
            return Err(CoreError::UnknownCrudeLine {
                tank: id.get(),
                index,
            });
        }
        let removed = tank.idle_crude_lines.remove(index);
        self.sync_idle_lines(id);
        Ok(removed)
    }

    fn idle_tank_mut(&mut self, id: TankId) -> Result<&mut TankRecord, CoreError> {
        let tank = self
            .tanks
            .get_mut(&id)
            .ok_or(CoreError::UnknownTank(id.get()))?;
        if tank.category != TankCategory::Idle {
            return Err(CoreError::NotIdle(id.get()));
        }
        Ok(tank)
    }

    fn sync_idle_lines(&mut self, id: TankId) {
        let Some(tank) = self.tanks.get_mut(&id) else {
            return;
        };
        tank.recompute_idle_level();
        let lines = tank.idle_crude_lines.clone();
        self.custom.entry(id).idle_lines = (!lines.is_empty()).then_some(lines);
    }

    /// Snapshot live tank data against `before`, then re-render.
    fn regenerate(&mut self, before: &TankConfiguration, reset_empty_levels: bool) {
        self.custom = snapshot_overrides(&self.tanks, &self.custom, before);
        if reset_empty_levels {
            self.custom.clear_levels_for(TankCategory::Empty);
        }
        self.render();
    }

    fn render(&mut self) {
        let config = self.tank_configuration();
        self.idle_validation = IdleValidation::check(&config);
        match TankAssignment::compute(&config) {
            Ok(assignment) => {
                self.tanks = render_tanks(&config, &assignment, &self.custom);
                self.assignment = Some(assignment);
                self.assignment_error = None;
            }
            Err(err) => {
                tracing::warn!(error = %err, "tank assignment refused; no tanks rendered");
                self.tanks.clear();
                self.assignment = None;
                self.assignment_error = Some(err);
            }
        }
    }

    /// Snapshot every recognized field, the per-tank keys of rendered
    /// tanks, the crude mix and the idle compositions.
    #[must_use]
    pub fn collect(&self) -> PersistedFormState {
        let mut fields = IndexMap::with_capacity(self.fields.len() + self.tanks.len() * 4);
        for spec in FIELD_CATALOG {
            let value = self
                .fields
                .get(spec.key)
                .cloned()
                .unwrap_or_else(|| spec.default_value());
            fields.insert(spec.key.to_string(), spec.encode(value));
        }
        for (key, value) in &self.fields {
            if field_spec(key).is_none() {
                fields.insert(key.clone(), value.clone());
            }
        }
        for tank in self.tanks.values() {
            fields.insert(
                keys::tank_key(TankKey::Name, tank.id),
                FieldValue::Text(tank.display_name()),
            );
            fields.insert(
                keys::tank_key(TankKey::Level, tank.id),
                FieldValue::Number(tank.level),
            );
            fields.insert(
                keys::tank_key(TankKey::DeadBottom, tank.id),
                FieldValue::Number(tank.dead_bottom),
            );
            fields.insert(
                keys::tank_key(TankKey::Buffer, tank.id),
                FieldValue::Number(tank.buffer),
            );
        }
        let idle_tank_data = self
            .tanks
            .values()
            .filter(|tank| tank.category == TankCategory::Idle)
            .map(|tank| IdleTankEntry {
                sequential_id: tank.id.get(),
                initial_crudes: tank.idle_crude_lines.clone(),
            })
            .collect();
        PersistedFormState {
            fields,
            crude_mix_data: self.crude_mix.clone(),
            idle_tank_data,
            saved_at: None,
        }
    }

    /// Restore a snapshot. See [`ApplyStage`] for the ordering.
    pub fn apply(&mut self, snapshot: &PersistedFormState) -> ApplyReport {
        let mut report = ApplyReport::default();
        for stage in ApplyStage::ORDER {
            match stage {
                ApplyStage::Fields => self.apply_fields(snapshot, &mut report),
                ApplyStage::CrudeMix => self.apply_crude_mix(snapshot, &mut report),
                ApplyStage::Tanks => self.apply_tanks(snapshot, &mut report),
                ApplyStage::IdleLines => self.apply_idle_lines(snapshot, &mut report),
            }
            report.stages.push(stage);
        }
        tracing::debug!(
            fields = report.fields,
            tanks = report.tanks,
            idle_tanks = report.idle_tanks,
            skipped_idle = report.skipped_idle.len(),
            "form snapshot applied"
        );
        report
    }

    fn apply_fields(&mut self, snapshot: &PersistedFormState, report: &mut ApplyReport) {
        for (key, value) in &snapshot.fields {
            if keys::parse_tank_key(key).is_some() {
                continue;
            }
            let stored = match field_spec(key) {
                Some(spec) => spec.decode(value),
                None => value.clone(),
            };
            self.fields.insert(key.clone(), stored);
            report.fields += 1;
        }
    }

    fn apply_crude_mix(&mut self, snapshot: &PersistedFormState, report: &mut ApplyReport) {
        if snapshot.crude_mix_data.is_empty() {
            return;
        }
        self.crude_mix = snapshot.crude_mix_data.clone();
        report.crude_rows = Some(self.crude_mix.len());
    }

    fn apply_tanks(&mut self, snapshot: &PersistedFormState, report: &mut ApplyReport) {
        let config = self.tank_configuration();
        let highest_suffix = snapshot
            .fields
            .keys()
            .filter_map(|key| keys::parse_tank_key(key))
            .filter(|(kind, _)| matches!(kind, TankKey::Name | TankKey::Level))
            .map(|(_, id)| id.get())
            .filter(|id| *id <= MAX_TANK_ID)
            .max()
            .unwrap_or(0);
        let max_id = config.num_tanks.max(highest_suffix);
        let assignment = TankAssignment::compute(&config).ok();

        let mut custom = CustomTankData::default();
        for id in (1..=max_id).filter_map(TankId::new) {
            let category = assignment
                .as_ref()
                .map_or(TankCategory::Unassigned, |a| a.category(id));
            let entry = override_from_snapshot(snapshot, id, category, &config);
            custom.insert(id, entry);
        }
        self.custom = custom;
        self.render();
        report.tanks = self.tanks.len();
    }

    fn apply_idle_lines(&mut self, snapshot: &PersistedFormState, report: &mut ApplyReport) {
        for entry in &snapshot.idle_tank_data {
            let Some(id) = TankId::new(entry.sequential_id) else {
                report.skipped_idle.push(entry.sequential_id);
                continue;
            };
            match self.tanks.get_mut(&id) {
                Some(tank) if tank.category == TankCategory::Idle => {
                    tank.idle_crude_lines = entry
                        .initial_crudes
                        .iter()
                        .map(|line| CrudeLine::new(line.name.clone(), line.volume))
                        .collect();
                    self.sync_idle_lines(id);
                    report.idle_tanks += 1;
                }
                _ => report.skipped_idle.push(entry.sequential_id),
            }
        }
    }
}

fn override_from_snapshot(
    snapshot: &PersistedFormState,
    id: TankId,
    category: TankCategory,
    config: &TankConfiguration,
) -> TankOverride {
    let number_at = |kind| {
        snapshot
            .field(&keys::tank_key(kind, id))
            .and_then(FieldValue::as_number)
            .map(|value| value.max(0.0))
    };
    let mut entry = TankOverride::default();
    if let Some(value) = snapshot.field(&keys::tank_key(TankKey::Name, id)) {
        let name = value.as_text();
        let trimmed = name.trim();
        if !trimmed.is_empty() {
            entry.name = Some(trimmed.to_string());
        }
    }
    let dead_bottom = number_at(TankKey::DeadBottom);
    let buffer = number_at(TankKey::Buffer);
    entry.dead_bottom = dead_bottom.filter(|v| (v - config.default_dead_bottom).abs() > f64::EPSILON);
    entry.buffer = buffer.filter(|v| (v - config.default_buffer).abs() > f64::EPSILON);

    if let Some(level) = number_at(TankKey::Level) {
        match category {
            TankCategory::Filled | TankCategory::Empty => {
                let derived = default_level(
                    category,
                    config.tank_capacity,
                    dead_bottom.unwrap_or(config.default_dead_bottom),
                    buffer.unwrap_or(config.default_buffer),
                    &[],
                );
                if (level - derived).abs() > f64::EPSILON {
                    entry.level = Some(level);
                    entry.level_category = Some(category);
                }
            }
            // derived from the crude lines restored in the next stage
            TankCategory::Idle => {}
            TankCategory::Unassigned => entry.level = Some(level),
        }
    }
    entry
}

/// An EMPTY tank still sitting on its floor moves with it.
fn level_follows_floor(tank: &TankRecord) -> bool {
    tank.category == TankCategory::Empty
        && (tank.level - tank.operational_floor()).abs() <= f64::EPSILON
}

fn settle_level(tank: &mut TankRecord, follows_floor: bool) {
    if follows_floor {
        tank.level = tank.operational_floor();
    }
    tank.recompute_idle_level();
}

fn parse_field_number(key: &str, value: &str) -> Result<f64, CoreError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Ok(0.0);
    }
    parse_number(trimmed).ok_or_else(|| CoreError::InvalidNumber {
        field: SmolStr::new(key),
        value: SmolStr::new(value),
    })
}

/// Accepts `YYYY-MM-DDTHH:MM[:SS]`, `YYYY-MM-DD HH:MM` or a bare date
/// (taken as 08:00).
pub fn parse_form_datetime(text: &str) -> Result<PrimitiveDateTime, CoreError> {
    let text = text.trim();
    let with_t = format_description!("[year]-[month]-[day]T[hour]:[minute]");
    let with_t_seconds = format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]");
    let with_space = format_description!("[year]-[month]-[day] [hour]:[minute]");
    let date_only = format_description!("[year]-[month]-[day]");
    PrimitiveDateTime::parse(text, with_t)
        .or_else(|_| PrimitiveDateTime::parse(text, with_t_seconds))
        .or_else(|_| PrimitiveDateTime::parse(text, with_space))
        .or_else(|_| Date::parse(text, date_only).map(|date| date.with_time(time!(8:00))))
        .map_err(|_| CoreError::InvalidDateTime(SmolStr::new(text)))
}
