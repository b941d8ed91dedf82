//! Application state and the actions both front ends run.

#![allow(missing_docs)]

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;

use tankfarm_core::crude_mix::{optimizer_inputs, CrudeMixRow};
use tankfarm_core::form::{FieldEffect, TankEdit};
use tankfarm_core::inventory::{validate_inventory_range, InventoryCheck, MessageClass};
use tankfarm_core::present::{
    present_buffer_analysis, present_cargo_optimization, present_mix, present_optimization,
    present_simulation, Block, SimulationView,
};
use tankfarm_core::response::{
    BufferAnalysis, InventoryRangeResponse, OptimizationResponse, SimulationResponse,
};
use tankfarm_core::{CrudeLine, FormState, PersistedFormState, TankId};

use crate::api::{ApiClient, ExportKind};
use crate::config::ConsoleConfig;
use crate::error::ConsoleError;
use crate::export::{store_export, CsvDownloader, ExportOutcome};
use crate::persist::{
    FileLocalStore, LoadOutcome, PersistenceCoordinator, RemoteStore, SaveOutcome,
};

/// The one results slot. Every successful action replaces it.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum CurrentResults {
    #[default]
    Empty,
    Simulation {
        response: SimulationResponse,
        view: SimulationView,
    },
    BufferAnalysis(BufferAnalysis),
    CargoOptimization(Value),
    CrudeMix(OptimizationResponse),
    Failed {
        action: &'static str,
        message: String,
    },
}

impl CurrentResults {
    #[must_use]
    pub fn blocks(&self) -> Vec<Block> {
        match self {
            Self::Empty => Vec::new(),
            Self::Simulation { view, .. } => view.blocks(),
            Self::BufferAnalysis(analysis) => vec![present_buffer_analysis(analysis)],
            Self::CargoOptimization(value) => vec![present_cargo_optimization(value)],
            Self::CrudeMix(response) => present_optimization(response),
            Self::Failed { action, message } => {
                vec![Block::Warning(format!("{action} failed: {message}"))]
            }
        }
    }
}

/// Marks one backend call as in flight; dropping it, on any path, marks it
/// done. Calls may overlap and the last one to finish owns the results.
#[derive(Debug)]
pub struct BusyGuard {
    in_flight: Arc<AtomicUsize>,
}

impl BusyGuard {
    #[must_use]
    pub fn enter(in_flight: &Arc<AtomicUsize>) -> Self {
        in_flight.fetch_add(1, Ordering::AcqRel);
        Self {
            in_flight: Arc::clone(in_flight),
        }
    }
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Backend actions the console can start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Simulate,
    BufferAnalysis,
    CargoOptimization,
    OptimizeCrudeMix,
    CheckInventory,
    Export(ExportKind),
    DownloadCsvs,
}

/// Everything a backend call needs once the console is unlocked: a client,
/// the form snapshot taken at prepare time and the busy marker.
#[derive(Debug)]
pub struct PreparedCall {
    action: Action,
    api: ApiClient,
    snapshot: PersistedFormState,
    download_dir: PathBuf,
    csv_delay: Duration,
    csv_urls: Vec<String>,
    _busy: BusyGuard,
}

impl PreparedCall {
    #[must_use]
    pub fn action(&self) -> Action {
        self.action
    }

    #[must_use]
    pub fn snapshot(&self) -> &PersistedFormState {
        &self.snapshot
    }

    /// A 200 answer that carries an `error` message still fails.
    pub fn simulate(&self) -> Result<SimulationResponse, ConsoleError> {
        let response = self.api.simulate(&self.snapshot)?;
        match response.error.as_deref().filter(|message| !message.trim().is_empty()) {
            Some(message) => Err(ConsoleError::Api {
                status: 200,
                message: message.into(),
            }),
            None => Ok(response),
        }
    }

    pub fn buffer_analysis(&self) -> Result<BufferAnalysis, ConsoleError> {
        self.api.buffer_analysis(&self.snapshot)
    }

    pub fn cargo_optimization(&self) -> Result<Value, ConsoleError> {
        self.api.cargo_optimization(&self.snapshot)
    }

    pub fn optimize_crude_mix(&self) -> Result<OptimizationResponse, ConsoleError> {
        self.api.optimize_crude_mix(&self.snapshot)
    }

    pub fn validate_inventory_range(&self) -> Result<InventoryRangeResponse, ConsoleError> {
        self.api.validate_inventory_range(&self.snapshot)
    }

    /// Fetch the export and write streamed files into the download dir.
    pub fn export(&self, kind: ExportKind) -> Result<ExportOutcome, ConsoleError> {
        let payload = self.api.export(kind, &self.snapshot)?;
        store_export(&self.download_dir, payload)
    }

    /// CSV artifacts in order, paced by `export.csv_delay_ms`.
    #[must_use]
    pub fn download_csvs(&self) -> Vec<Result<PathBuf, ConsoleError>> {
        CsvDownloader::new(&self.api, &self.download_dir, self.csv_delay).download_all(&self.csv_urls)
    }
}

/// Short status line shown next to the actions.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusLine {
    pub class: MessageClass,
    pub message: String,
}

#[derive(Debug)]
pub struct Console {
    config: ConsoleConfig,
    api: ApiClient,
    form: FormState,
    persistence: PersistenceCoordinator,
    results: CurrentResults,
    busy: Arc<AtomicUsize>,
    status: Option<StatusLine>,
}

impl Console {
    pub fn new(config: ConsoleConfig, api: ApiClient, persistence: PersistenceCoordinator) -> Self {
        Self {
            config,
            api,
            form: FormState::new(),
            persistence,
            results: CurrentResults::Empty,
            busy: Arc::new(AtomicUsize::new(0)),
            status: None,
        }
    }

    /// File store at `storage.path`, backend store when `remote_sync` is on.
    #[must_use]
    pub fn from_config(config: ConsoleConfig) -> Self {
        let api = ApiClient::new(config.backend_url.clone());
        let remote = config
            .remote_sync
            .then(|| Arc::new(api.clone()) as Arc<dyn RemoteStore>);
        let persistence = PersistenceCoordinator::new(
            Box::new(FileLocalStore::new(config.state_path.clone())),
            remote,
            config.debounce,
        );
        Self::new(config, api, persistence)
    }

    #[must_use]
    pub fn config(&self) -> &ConsoleConfig {
        &self.config
    }

    #[must_use]
    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    #[must_use]
    pub fn form(&self) -> &FormState {
        &self.form
    }

    #[must_use]
    pub fn persistence(&self) -> &PersistenceCoordinator {
        &self.persistence
    }

    #[must_use]
    pub fn results(&self) -> &CurrentResults {
        &self.results
    }

    #[must_use]
    pub fn status(&self) -> Option<&StatusLine> {
        self.status.as_ref()
    }

    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.in_flight() > 0
    }

    /// Backend calls prepared and not yet dropped.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.busy.load(Ordering::Acquire)
    }

    pub fn load(&mut self) -> LoadOutcome {
        self.persistence.load(&mut self.form)
    }

    pub fn edit_field(
        &mut self,
        key: &str,
        value: &str,
        now: Instant,
    ) -> Result<FieldEffect, ConsoleError> {
        let effect = self.form.set_field(key, value)?;
        self.persistence.schedule_save(now);
        Ok(effect)
    }

    pub fn edit_tank(&mut self, id: TankId, edit: TankEdit, now: Instant) -> Result<(), ConsoleError> {
        self.form.edit_tank(id, edit)?;
        self.persistence.schedule_save(now);
        Ok(())
    }

    pub fn add_idle_line(
        &mut self,
        id: TankId,
        line: CrudeLine,
        now: Instant,
    ) -> Result<usize, ConsoleError> {
        let index = self.form.add_idle_line(id, line)?;
        self.persistence.schedule_save(now);
        Ok(index)
    }

    pub fn update_idle_line(
        &mut self,
        id: TankId,
        index: usize,
        line: CrudeLine,
        now: Instant,
    ) -> Result<(), ConsoleError> {
        self.form.update_idle_line(id, index, line)?;
        self.persistence.schedule_save(now);
        Ok(())
    }

    pub fn remove_idle_line(
        &mut self,
        id: TankId,
        index: usize,
        now: Instant,
    ) -> Result<CrudeLine, ConsoleError> {
        let removed = self.form.remove_idle_line(id, index)?;
        self.persistence.schedule_save(now);
        Ok(removed)
    }

    pub fn set_crude_mix(&mut self, rows: Vec<CrudeMixRow>, now: Instant) {
        *self.form.crude_mix_mut() = rows;
        self.persistence.schedule_save(now);
    }

    /// Called by the ticker; runs the debounced save when due.
    pub fn poll_save(&mut self, now: Instant) -> Option<SaveOutcome> {
        self.persistence.poll(now, &self.form)
    }

    /// Save immediately, bypassing the debounce.
    pub fn save_now(&self) -> SaveOutcome {
        self.persistence.save(&self.form)
    }

    fn gate(&self) -> Result<(), ConsoleError> {
        match self.form.gate().rejection_message() {
            Some(message) => {
                tracing::info!(%message, "action rejected by validation");
                Err(ConsoleError::Validation(message.into()))
            }
            None => Ok(()),
        }
    }

    /// Check preconditions and capture what the call needs. Cheap; run it
    /// under the console lock, then run the call without it.
    pub fn prepare(&self, action: Action) -> Result<PreparedCall, ConsoleError> {
        let mut csv_urls = Vec::new();
        match action {
            Action::Simulate => self.gate()?,
            Action::OptimizeCrudeMix => {
                self.gate()?;
                let (names, _) = optimizer_inputs(self.form.crude_mix());
                if names.is_empty() {
                    return Err(ConsoleError::Validation(
                        "Add at least one crude to the mix before optimizing.".into(),
                    ));
                }
            }
            Action::DownloadCsvs => {
                if let CurrentResults::Simulation { response, .. } = &self.results {
                    csv_urls = response.csv_urls();
                }
                if csv_urls.is_empty() {
                    return Err(ConsoleError::Export(
                        "No CSV files available. Run a simulation first.".into(),
                    ));
                }
            }
            Action::BufferAnalysis
            | Action::CargoOptimization
            | Action::CheckInventory
            | Action::Export(_) => {}
        }
        tracing::debug!(?action, "backend call prepared");
        Ok(PreparedCall {
            action,
            api: self.api.clone(),
            snapshot: self.form.collect(),
            download_dir: self.config.download_dir.clone(),
            csv_delay: self.config.csv_delay,
            csv_urls,
            _busy: BusyGuard::enter(&self.busy),
        })
    }

    fn record<T>(
        &mut self,
        action: &'static str,
        result: Result<T, ConsoleError>,
    ) -> Result<T, ConsoleError> {
        match &result {
            Ok(_) => {
                self.status = Some(StatusLine {
                    class: MessageClass::Success,
                    message: format!("{action} complete."),
                });
            }
            Err(err) => {
                tracing::warn!(action, error = %err, "action failed");
                let message = err.user_message();
                self.status = Some(StatusLine {
                    class: MessageClass::Error,
                    message: message.clone(),
                });
                self.results = CurrentResults::Failed { action, message };
            }
        }
        result
    }

    pub fn finish_simulation(
        &mut self,
        result: Result<SimulationResponse, ConsoleError>,
    ) -> Result<Vec<Block>, ConsoleError> {
        let response = self.record("Simulation", result)?;
        let view = present_simulation(&response, self.form.number("processingRate"));
        let blocks = view.blocks();
        self.results = CurrentResults::Simulation { response, view };
        Ok(blocks)
    }

    pub fn finish_buffer_analysis(
        &mut self,
        result: Result<BufferAnalysis, ConsoleError>,
    ) -> Result<Vec<Block>, ConsoleError> {
        let analysis = self.record("Buffer analysis", result)?;
        self.results = CurrentResults::BufferAnalysis(analysis);
        Ok(self.results.blocks())
    }

    pub fn finish_cargo_optimization(
        &mut self,
        result: Result<Value, ConsoleError>,
    ) -> Result<Vec<Block>, ConsoleError> {
        let value = self.record("Cargo optimization", result)?;
        self.results = CurrentResults::CargoOptimization(value);
        Ok(self.results.blocks())
    }

    pub fn finish_crude_mix(
        &mut self,
        result: Result<OptimizationResponse, ConsoleError>,
    ) -> Result<Vec<Block>, ConsoleError> {
        let response = self.record("Crude mix optimization", result)?;
        self.results = CurrentResults::CrudeMix(response);
        Ok(self.results.blocks())
    }

    pub fn run_simulation(&mut self) -> Result<Vec<Block>, ConsoleError> {
        let call = self.prepare(Action::Simulate)?;
        self.finish_simulation(call.simulate())
    }

    pub fn buffer_analysis(&mut self) -> Result<Vec<Block>, ConsoleError> {
        let call = self.prepare(Action::BufferAnalysis)?;
        self.finish_buffer_analysis(call.buffer_analysis())
    }

    pub fn cargo_optimization(&mut self) -> Result<Vec<Block>, ConsoleError> {
        let call = self.prepare(Action::CargoOptimization)?;
        self.finish_cargo_optimization(call.cargo_optimization())
    }

    pub fn optimize_crude_mix(&mut self) -> Result<Vec<Block>, ConsoleError> {
        let call = self.prepare(Action::OptimizeCrudeMix)?;
        self.finish_crude_mix(call.optimize_crude_mix())
    }

    /// Show the tank-state summary at `day`, or at the end of the horizon.
    pub fn select_day(&mut self, day: Option<&str>) -> Result<(), ConsoleError> {
        let rate = self.form.number("processingRate");
        match &mut self.results {
            CurrentResults::Simulation { response, view } => {
                let day = day.map(str::trim).filter(|day| !day.is_empty());
                view.show_day(&response.simulation_data, day, rate);
                Ok(())
            }
            _ => Err(ConsoleError::Validation(
                "Run a simulation before picking a day.".into(),
            )),
        }
    }

    /// Daily volumes of the current mix; local only.
    #[must_use]
    pub fn mix_blocks(&self) -> Vec<Block> {
        present_mix(&self.form.mix_summary())
    }

    /// Range check against the entered tank levels. Sets the status line.
    pub fn local_inventory_check(&mut self) -> InventoryCheck {
        let local = validate_inventory_range(
            self.form.number("minInventory"),
            self.form.number("maxInventory"),
            self.form.tanks().values(),
        );
        self.status = Some(StatusLine {
            class: local.class,
            message: local.message.clone(),
        });
        local
    }

    pub fn finish_inventory(
        &mut self,
        local: InventoryCheck,
        result: Result<InventoryRangeResponse, ConsoleError>,
    ) -> Result<InventoryCheck, ConsoleError> {
        let answer = self.record("Inventory check", result)?;
        let class = if answer.success {
            MessageClass::Success
        } else {
            MessageClass::Warning
        };
        let message = if answer.message.trim().is_empty() {
            local.message
        } else {
            answer.message
        };
        self.status = Some(StatusLine {
            class,
            message: message.clone(),
        });
        Ok(InventoryCheck {
            ok: answer.success,
            class,
            message,
            total: local.total,
        })
    }

    /// Local range check; with `remote` set and a sane range the backend
    /// gets the final word.
    pub fn check_inventory(&mut self, remote: bool) -> Result<InventoryCheck, ConsoleError> {
        let local = self.local_inventory_check();
        if !remote || local.class == MessageClass::Error {
            return Ok(local);
        }
        let call = self.prepare(Action::CheckInventory)?;
        self.finish_inventory(local, call.validate_inventory_range())
    }

    pub fn finish_export(
        &mut self,
        kind: ExportKind,
        result: Result<ExportOutcome, ConsoleError>,
    ) -> Result<ExportOutcome, ConsoleError> {
        match result {
            Ok(outcome) => {
                self.status = Some(StatusLine {
                    class: MessageClass::Success,
                    message: outcome.message(),
                });
                Ok(outcome)
            }
            Err(err) => {
                tracing::warn!(export = kind.label(), error = %err, "export failed");
                self.status = Some(StatusLine {
                    class: MessageClass::Error,
                    message: err.user_message(),
                });
                Err(err)
            }
        }
    }

    pub fn export(&mut self, kind: ExportKind) -> Result<ExportOutcome, ConsoleError> {
        let call = self.prepare(Action::Export(kind))?;
        self.finish_export(kind, call.export(kind))
    }

    pub fn finish_csv_download(
        &mut self,
        results: Vec<Result<PathBuf, ConsoleError>>,
    ) -> Vec<Result<PathBuf, ConsoleError>> {
        let saved = results.iter().filter(|result| result.is_ok()).count();
        self.status = Some(StatusLine {
            class: if saved == results.len() {
                MessageClass::Success
            } else {
                MessageClass::Warning
            },
            message: format!("Downloaded {saved} of {} CSV files.", results.len()),
        });
        results
    }

    /// CSV artifacts of the last simulation.
    pub fn download_csvs(&mut self) -> Result<Vec<Result<PathBuf, ConsoleError>>, ConsoleError> {
        let call = self.prepare(Action::DownloadCsvs)?;
        Ok(self.finish_csv_download(call.download_csvs()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::persist::MemoryLocalStore;

    fn offline_console() -> Console {
        let config = ConsoleConfig {
            backend_url: "http://127.0.0.1:9".into(),
            ..ConsoleConfig::default()
        };
        let api = ApiClient::new(config.backend_url.clone());
        let persistence = PersistenceCoordinator::new(
            Box::new(MemoryLocalStore::new()),
            None,
            Duration::from_millis(500),
        );
        Console::new(config, api, persistence)
    }

    #[test]
    fn busy_guard_counts_overlapping_calls() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        {
            let _first = BusyGuard::enter(&in_flight);
            let _second = BusyGuard::enter(&in_flight);
            assert_eq!(in_flight.load(Ordering::Acquire), 2);
        }
        assert_eq!(in_flight.load(Ordering::Acquire), 0);
    }

    #[test]
    fn prepared_call_holds_the_busy_marker() {
        let mut console = offline_console();
        let call = console.prepare(Action::BufferAnalysis).expect("prepare");
        assert_eq!(console.in_flight(), 1);
        assert_eq!(call.action(), Action::BufferAnalysis);
        console
            .edit_field("schedulingWindow", "60", Instant::now())
            .expect("edit while the call is out");
        let live = console.form().collect();
        assert_ne!(
            call.snapshot().field("schedulingWindow"),
            live.field("schedulingWindow")
        );
        drop(call);
        assert!(!console.is_busy());
    }

    #[test]
    fn gate_blocks_simulation_before_any_request() {
        let mut console = offline_console();
        console
            .edit_field("tank1Name", "Alpha", Instant::now())
            .expect("name");
        console
            .edit_field("tank2Name", " Alpha ", Instant::now())
            .expect("name");
        let err = console.run_simulation().expect_err("duplicate names");
        assert_eq!(
            err,
            ConsoleError::Validation(
                "Duplicate tank names found (tanks 1, 2). Each tank must have a unique name."
                    .into()
            )
        );
        assert_eq!(console.results(), &CurrentResults::Empty);
        assert!(!console.is_busy());
    }

    #[test]
    fn transport_failure_lands_in_results_and_clears_busy() {
        let mut console = offline_console();
        let err = console.buffer_analysis().expect_err("offline");
        assert!(matches!(err, ConsoleError::Transport(_)));
        assert!(!console.is_busy());
        assert!(matches!(
            console.results(),
            CurrentResults::Failed {
                action: "Buffer analysis",
                ..
            }
        ));
        assert_eq!(console.status().map(|s| s.class), Some(MessageClass::Error));
    }

    #[test]
    fn inverted_inventory_range_is_rejected_without_backend() {
        let mut console = offline_console();
        let now = Instant::now();
        console.edit_field("minInventory", "500000", now).expect("min");
        console.edit_field("maxInventory", "400000", now).expect("max");
        let check = console.check_inventory(true).expect("local check");
        assert_eq!(check.class, MessageClass::Error);
        assert!(!check.ok);
    }

    #[test]
    fn empty_mix_cannot_be_optimized() {
        let mut console = offline_console();
        console.set_crude_mix(vec![CrudeMixRow::new("  ", 100.0)], Instant::now());
        assert!(matches!(
            console.optimize_crude_mix(),
            Err(ConsoleError::Validation(_))
        ));
    }

    #[test]
    fn csv_download_needs_a_simulation() {
        let mut console = offline_console();
        assert!(matches!(console.download_csvs(), Err(ConsoleError::Export(_))));
    }

    #[test]
    fn edits_arm_the_debounced_save() {
        let mut console = offline_console();
        let start = Instant::now();
        console.edit_field("schedulingWindow", "45", start).expect("edit");
        assert!(console.persistence().save_pending());
        assert!(console.poll_save(start).is_none());
        let outcome = console.poll_save(start + Duration::from_millis(500));
        assert!(matches!(outcome, Some(SaveOutcome::Persisted(_))));
    }

    #[test]
    fn over_allocated_edit_blocks_the_debounced_save() {
        let mut console = offline_console();
        let start = Instant::now();
        // Defaults fill 8 and empty 4 tanks.
        console.edit_field("numTanks", "6", start).expect("edit");
        let outcome = console.poll_save(start + Duration::from_millis(500));
        assert!(matches!(outcome, Some(SaveOutcome::Blocked(message)) if message.contains("exceed")));
    }

    #[test]
    fn day_selection_needs_a_simulation() {
        let mut console = offline_console();
        assert!(matches!(
            console.select_day(Some("2025-08-10")),
            Err(ConsoleError::Validation(_))
        ));
    }
}
