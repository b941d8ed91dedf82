//! Embedded web UI.
//!
//! Edits post JSON and get back the fragments to swap in. Each request runs
//! on its own thread and the console lock is never held across a backend
//! call. A ticker thread drives the debounced auto-save.

#![allow(missing_docs)]

use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tiny_http::{Header, Method, Request, Response, Server, StatusCode};

use tankfarm_core::crude_mix::CrudeMixRow;
use tankfarm_core::form::FieldEffect;
use tankfarm_core::inventory::MessageClass;
use tankfarm_core::{CrudeLine, TankId};

use crate::api::ExportKind;
use crate::app::{Action, Console};
use crate::error::ConsoleError;
use crate::persist::SaveOutcome;

pub mod html;

const APP_JS: &str = include_str!("web/ui/app.js");
const APP_CSS: &str = include_str!("web/ui/styles.css");
const TICK: Duration = Duration::from_millis(50);

pub type SharedConsole = Arc<Mutex<Console>>;

pub struct WebServer {
    server: Arc<Server>,
    handle: Option<thread::JoinHandle<()>>,
    ticker: Option<thread::JoinHandle<()>>,
    stop: Arc<AtomicBool>,
    pub listen: String,
}

impl WebServer {
    /// Block until the server thread exits.
    pub fn join(mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }

    pub fn shutdown(mut self) {
        self.stop.store(true, Ordering::Release);
        self.server.unblock();
        for handle in [self.handle.take(), self.ticker.take()].into_iter().flatten() {
            let _ = handle.join();
        }
    }
}

pub fn start_web_server(listen: &str, console: SharedConsole) -> Result<WebServer, ConsoleError> {
    let server = Server::http(listen)
        .map_err(|err| ConsoleError::Web(format!("web bind {listen}: {err}").into()))?;
    let server = Arc::new(server);
    let listen = server
        .server_addr()
        .to_ip()
        .map_or_else(|| listen.to_string(), |addr| addr.to_string());
    let stop = Arc::new(AtomicBool::new(false));

    let ticker = {
        let console = Arc::clone(&console);
        let stop = Arc::clone(&stop);
        thread::spawn(move || {
            while !stop.load(Ordering::Acquire) {
                thread::sleep(TICK);
                let outcome = console.lock().poll_save(Instant::now());
                match outcome {
                    Some(SaveOutcome::Blocked(message)) => {
                        tracing::debug!(%message, "auto-save skipped");
                    }
                    Some(SaveOutcome::Persisted(receipt)) => {
                        tracing::debug!(saved_at = receipt.saved_at, "auto-save");
                    }
                    None => {}
                }
            }
        })
    };

    let handle = {
        let server = Arc::clone(&server);
        thread::spawn(move || {
            for request in server.incoming_requests() {
                let method = request.method().clone();
                let url = request.url().to_string();
                let path = url.split('?').next().unwrap_or_default().to_string();
                if method == Method::Get && path == "/" {
                    let body = html::page(&console.lock());
                    let response = typed(Response::from_string(body), "text/html; charset=utf-8");
                    let _ = request.respond(response);
                    continue;
                }
                if method == Method::Get && path == "/styles.css" {
                    let response = typed(Response::from_string(APP_CSS), "text/css");
                    let _ = request.respond(response);
                    continue;
                }
                if method == Method::Get && path == "/app.js" {
                    let response = typed(Response::from_string(APP_JS), "application/javascript");
                    let _ = request.respond(response);
                    continue;
                }
                if method == Method::Get && path == "/ui/state" {
                    let snapshot = console.lock().form().collect();
                    let body = serde_json::to_string(&snapshot).unwrap_or_else(|_| "{}".to_string());
                    let response = typed(Response::from_string(body), "application/json");
                    let _ = request.respond(response);
                    continue;
                }
                if method == Method::Get && path == "/ui/results" {
                    let body = html::results_fragment(console.lock().results());
                    let response = typed(Response::from_string(body), "text/html; charset=utf-8");
                    let _ = request.respond(response);
                    continue;
                }
                if method == Method::Post && path.starts_with("/ui/") {
                    let console = Arc::clone(&console);
                    thread::spawn(move || serve_ui_post(request, &path, &console));
                    continue;
                }
                let response = Response::from_string("not found").with_status_code(404);
                let _ = request.respond(response);
            }
        })
    };

    tracing::info!(%listen, "web ui listening");
    Ok(WebServer {
        server,
        handle: Some(handle),
        ticker: Some(ticker),
        stop,
        listen,
    })
}

fn serve_ui_post(mut request: Request, path: &str, console: &SharedConsole) {
    let mut body = String::new();
    if request.as_reader().read_to_string(&mut body).is_err() {
        let response = Response::from_string("invalid body").with_status_code(400);
        let _ = request.respond(response);
        return;
    }
    let payload: Value = match serde_json::from_str(&body) {
        Ok(value) => value,
        Err(_) => {
            let response = Response::from_string("invalid json").with_status_code(400);
            let _ = request.respond(response);
            return;
        }
    };
    let (status, answer) = handle_ui_post(console, path, payload, Instant::now());
    let response = typed(Response::from_string(answer.to_string()), "application/json")
        .with_status_code(StatusCode(status));
    let _ = request.respond(response);
}

fn typed<R: Read>(response: Response<R>, value: &str) -> Response<R> {
    match Header::from_bytes("Content-Type", value) {
        Ok(header) => response.with_header(header),
        Err(()) => response,
    }
}

#[derive(Debug, Deserialize)]
struct FieldEdit {
    key: String,
    #[serde(default)]
    value: Value,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
enum LineEdit {
    Add {
        tank: u32,
        #[serde(default)]
        name: String,
        #[serde(default)]
        volume: Value,
    },
    Update {
        tank: u32,
        index: usize,
        #[serde(default)]
        name: String,
        #[serde(default)]
        volume: Value,
    },
    Remove {
        tank: u32,
        index: usize,
    },
}

#[derive(Debug, Deserialize)]
struct MixEdit {
    rows: Vec<CrudeMixRow>,
}

#[derive(Debug, Deserialize)]
struct DaySelect {
    #[serde(default)]
    day: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ActionRequest {
    action: String,
}

fn input_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn tank_id(raw: u32) -> Result<TankId, ConsoleError> {
    TankId::new(raw).ok_or_else(|| ConsoleError::Validation(format!("invalid tank id {raw}").into()))
}

fn line_from(name: String, volume: &Value) -> CrudeLine {
    let volume = tankfarm_core::lenient::value_as_f64(volume).unwrap_or(0.0);
    CrudeLine::new(name, volume)
}

fn decode<T: serde::de::DeserializeOwned>(payload: Value) -> Result<T, ConsoleError> {
    serde_json::from_value(payload).map_err(|err| ConsoleError::Decode(err.to_string().into()))
}

/// Route a UI post. Returns the HTTP status and the JSON answer with the
/// fragments the page should replace. Backend calls run with the console
/// unlocked.
pub fn handle_ui_post(shared: &SharedConsole, path: &str, payload: Value, now: Instant) -> (u16, Value) {
    let mut fragments = Map::new();
    let result = match path {
        "/ui/field" => decode::<FieldEdit>(payload).and_then(|edit| {
            let mut console = shared.lock();
            let effect = console.edit_field(&edit.key, &input_text(&edit.value), now)?;
            let form = console.form();
            fragments.insert("gate".into(), json!(html::gate_fragment(form)));
            fragments.insert("mix".into(), json!(html::mix_fragment(form)));
            if effect == FieldEffect::Regenerated {
                fragments.insert("tanks".into(), json!(html::tanks_fragment(form)));
                fragments.insert("fields".into(), json!(html::fields_fragment(form)));
            }
            let effect = match effect {
                FieldEffect::Updated => "updated",
                FieldEffect::Regenerated => "regenerated",
            };
            Ok(json!({ "effect": effect }))
        }),
        "/ui/idle-line" => decode::<LineEdit>(payload).and_then(|edit| {
            let mut console = shared.lock();
            match edit {
                LineEdit::Add { tank, name, volume } => {
                    console.add_idle_line(tank_id(tank)?, line_from(name, &volume), now)?;
                }
                LineEdit::Update {
                    tank,
                    index,
                    name,
                    volume,
                } => console.update_idle_line(tank_id(tank)?, index, line_from(name, &volume), now)?,
                LineEdit::Remove { tank, index } => {
                    console.remove_idle_line(tank_id(tank)?, index, now)?;
                }
            }
            fragments.insert("tanks".into(), json!(html::tanks_fragment(console.form())));
            Ok(json!({}))
        }),
        "/ui/crude-mix" => decode::<MixEdit>(payload).map(|edit| {
            let mut console = shared.lock();
            console.set_crude_mix(edit.rows, now);
            fragments.insert("mix".into(), json!(html::mix_fragment(console.form())));
            json!({})
        }),
        "/ui/day" => decode::<DaySelect>(payload).and_then(|select| {
            let mut console = shared.lock();
            console.select_day(select.day.as_deref())?;
            fragments.insert("results".into(), json!(html::results_fragment(console.results())));
            Ok(json!({}))
        }),
        "/ui/action" => decode::<ActionRequest>(payload).and_then(|request| {
            let outcome = run_action(shared, &request.action);
            let console = shared.lock();
            fragments.insert("results".into(), json!(html::results_fragment(console.results())));
            outcome
        }),
        _ => {
            return (404, json!({ "ok": false, "error": "not found" }));
        }
    };
    let busy = {
        let console = shared.lock();
        fragments.insert("status".into(), json!(html::status_fragment(console.status())));
        console.in_flight()
    };
    match result {
        Ok(Value::Object(mut extra)) => {
            extra.insert("ok".into(), json!(true));
            extra.insert("busy".into(), json!(busy));
            extra.insert("fragments".into(), Value::Object(fragments));
            (200, Value::Object(extra))
        }
        Ok(other) => (
            200,
            json!({ "ok": true, "busy": busy, "data": other, "fragments": fragments }),
        ),
        Err(err) => {
            let status = match err {
                ConsoleError::Validation(_) | ConsoleError::Core(_) | ConsoleError::Decode(_) => 400,
                _ => 502,
            };
            (
                status,
                json!({ "ok": false, "busy": busy, "error": err.user_message(), "fragments": fragments }),
            )
        }
    }
}

fn run_action(shared: &SharedConsole, action: &str) -> Result<Value, ConsoleError> {
    // Each arm prepares under the lock, calls the backend unlocked, then
    // stores the outcome under the lock again.
    match action {
        "simulate" => {
            let call = shared.lock().prepare(Action::Simulate)?;
            let result = call.simulate();
            shared.lock().finish_simulation(result).map(|_| json!({}))
        }
        "buffer" => {
            let call = shared.lock().prepare(Action::BufferAnalysis)?;
            let result = call.buffer_analysis();
            shared.lock().finish_buffer_analysis(result).map(|_| json!({}))
        }
        "cargo" => {
            let call = shared.lock().prepare(Action::CargoOptimization)?;
            let result = call.cargo_optimization();
            shared.lock().finish_cargo_optimization(result).map(|_| json!({}))
        }
        "optimize" => {
            let call = shared.lock().prepare(Action::OptimizeCrudeMix)?;
            let result = call.optimize_crude_mix();
            shared.lock().finish_crude_mix(result).map(|_| json!({}))
        }
        "inventory" => {
            let (local, call) = {
                let mut console = shared.lock();
                let local = console.local_inventory_check();
                if local.class == MessageClass::Error {
                    return Ok(json!({ "class": local.class.as_str(), "message": local.message }));
                }
                let call = console.prepare(Action::CheckInventory)?;
                (local, call)
            };
            let result = call.validate_inventory_range();
            shared
                .lock()
                .finish_inventory(local, result)
                .map(|check| json!({ "class": check.class.as_str(), "message": check.message }))
        }
        "csv" => {
            let call = shared.lock().prepare(Action::DownloadCsvs)?;
            let results = call.download_csvs();
            let results = shared.lock().finish_csv_download(results);
            let saved: Vec<String> = results
                .iter()
                .filter_map(|result| result.as_ref().ok())
                .map(|path| path.display().to_string())
                .collect();
            Ok(json!({ "saved": saved }))
        }
        "save" => match shared.lock().save_now() {
            SaveOutcome::Blocked(message) => Err(ConsoleError::Validation(message.into())),
            SaveOutcome::Persisted(receipt) => Ok(json!({ "savedAt": receipt.saved_at })),
        },
        other => match other.strip_prefix("export-") {
            Some(kind) => {
                let kind = ExportKind::parse(kind)?;
                let call = shared.lock().prepare(Action::Export(kind))?;
                let result = call.export(kind);
                shared
                    .lock()
                    .finish_export(kind, result)
                    .map(|outcome| json!({ "message": outcome.message() }))
            }
            None => Err(ConsoleError::Validation(format!("unknown action '{other}'").into())),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ApiClient;
    use crate::config::ConsoleConfig;
    use crate::persist::{MemoryLocalStore, PersistenceCoordinator};

    fn console() -> SharedConsole {
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
        Arc::new(Mutex::new(Console::new(config, api, persistence)))
    }

    #[test]
    fn field_edit_returns_regenerated_fragments() {
        let console = console();
        let (status, answer) = handle_ui_post(
            &console,
            "/ui/field",
            json!({ "key": "numTanks", "value": "14" }),
            Instant::now(),
        );
        assert_eq!(status, 200);
        assert_eq!(answer["ok"], json!(true));
        assert_eq!(answer["effect"], json!("regenerated"));
        let tanks = answer["fragments"]["tanks"].as_str().expect("tanks");
        assert!(tanks.contains("data-tank=\"14\""));
    }

    #[test]
    fn bad_number_is_a_client_error() {
        let console = console();
        let (status, answer) = handle_ui_post(
            &console,
            "/ui/field",
            json!({ "key": "tankCapacity", "value": "lots" }),
            Instant::now(),
        );
        assert_eq!(status, 400);
        assert_eq!(answer["ok"], json!(false));
    }

    #[test]
    fn idle_line_ops_need_an_idle_tank() {
        let console = console();
        let now = Instant::now();
        handle_ui_post(&console, "/ui/field", json!({"key": "numFilled", "value": "6"}), now);
        let (status, _) = handle_ui_post(
            &console,
            "/ui/idle-line",
            json!({ "op": "add", "tank": 11, "name": "Bonny Light", "volume": "25,000" }),
            now,
        );
        assert_eq!(status, 200);
        {
            let console = console.lock();
            let tank = console.form().tank(TankId::new(11).expect("id")).expect("tank 11");
            assert_eq!(tank.idle_crude_lines.len(), 1);
            assert_eq!(tank.idle_crude_lines[0].volume, 25_000.0);
        }

        let (status, _) = handle_ui_post(
            &console,
            "/ui/idle-line",
            json!({ "op": "add", "tank": 1, "name": "Erha", "volume": 10 }),
            now,
        );
        assert_eq!(status, 400);
    }

    #[test]
    fn unknown_action_is_rejected() {
        let console = console();
        let (status, answer) =
            handle_ui_post(&console, "/ui/action", json!({ "action": "launch" }), Instant::now());
        assert_eq!(status, 400);
        assert!(answer["error"].as_str().expect("error").contains("launch"));
        assert_eq!(answer["busy"], json!(0));
    }

    #[test]
    fn day_pick_without_results_is_a_client_error() {
        let console = console();
        let (status, answer) =
            handle_ui_post(&console, "/ui/day", json!({ "day": "2025-08-10" }), Instant::now());
        assert_eq!(status, 400);
        assert_eq!(answer["ok"], json!(false));
    }

    #[test]
    fn failed_action_releases_the_lock_and_busy_marker() {
        let console = console();
        let (status, answer) =
            handle_ui_post(&console, "/ui/action", json!({ "action": "buffer" }), Instant::now());
        assert_eq!(status, 502);
        assert_eq!(answer["busy"], json!(0));
        assert!(answer["fragments"]["results"]
            .as_str()
            .expect("results")
            .contains("Buffer analysis failed"));
        assert!(console.try_lock().is_some());
    }
}
