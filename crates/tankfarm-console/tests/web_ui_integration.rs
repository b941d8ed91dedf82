mod common;

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde_json::{json, Value};

use common::{reserve_loopback_port, simulation_reply, temp_dir, wait_for_server, FakeBackend, Reply};
use tankfarm_console::persist::{FileLocalStore, PersistenceCoordinator, RemoteStore};
use tankfarm_console::web::{start_web_server, SharedConsole, WebServer};
use tankfarm_console::{ApiClient, Console, ConsoleConfig};

fn post(base: &str, path: &str, body: Value) -> (u16, Value) {
    let result = ureq::post(&format!("{base}{path}"))
        .set("Content-Type", "application/json")
        .send_string(&body.to_string());
    let response = match result {
        Ok(response) => response,
        Err(ureq::Error::Status(_, response)) => response,
        Err(err) => panic!("post {path}: {err}"),
    };
    let status = response.status();
    let text = response.into_string().expect("body");
    (status, serde_json::from_str(&text).expect("json answer"))
}

fn wait_for_file(path: &std::path::Path) -> Value {
    for _ in 0..100 {
        if let Ok(text) = std::fs::read_to_string(path) {
            if let Ok(value) = serde_json::from_str::<Value>(&text) {
                return value;
            }
        }
        thread::sleep(Duration::from_millis(20));
    }
    panic!("state file {} was never written", path.display());
}

struct RunningUi {
    server: WebServer,
    console: SharedConsole,
    base: String,
    state_path: PathBuf,
    dir: PathBuf,
}

fn start_ui(backend: &FakeBackend, name: &str) -> RunningUi {
    let dir = temp_dir(name);
    let state_path = dir.join("inputs.json");
    let listen = format!("127.0.0.1:{}", reserve_loopback_port());

    let config = ConsoleConfig {
        backend_url: backend.base.clone().into(),
        state_path: state_path.clone(),
        download_dir: dir.join("downloads"),
        debounce: Duration::from_millis(100),
        ..ConsoleConfig::default()
    };
    let api = ApiClient::new(config.backend_url.clone());
    let persistence = PersistenceCoordinator::new(
        Box::new(FileLocalStore::new(&state_path)),
        Some(Arc::new(api.clone()) as Arc<dyn RemoteStore>),
        config.debounce,
    );
    let console = Arc::new(Mutex::new(Console::new(config, api, persistence)));
    let server = start_web_server(&listen, Arc::clone(&console)).expect("start web ui");
    let base = format!("http://{listen}");
    wait_for_server(&base);
    RunningUi {
        server,
        console,
        base,
        state_path,
        dir,
    }
}

#[test]
fn web_ui_edits_autosave_and_runs_actions() {
    let backend = FakeBackend::start(|method, path, _| match (method, path) {
        ("POST", "/api/simulate") => Reply::json(simulation_reply()),
        _ => Reply::json(json!({"success": true})),
    });
    let ui = start_ui(&backend, "web");
    let base = ui.base.clone();
    let state_path = ui.state_path.clone();

    let page = ureq::get(&format!("{base}/"))
        .call()
        .expect("page")
        .into_string()
        .expect("html");
    assert!(page.contains("data-tank=\"1\""));
    assert!(page.contains("<section id=\"results\">"));

    let (status, answer) = post(
        &base,
        "/ui/field",
        json!({"key": "schedulingWindow", "value": "45"}),
    );
    assert_eq!(status, 200);
    assert_eq!(answer["ok"], json!(true));
    assert!(answer["fragments"]["status"].is_string());

    let saved = wait_for_file(&state_path);
    assert_eq!(saved["schedulingWindow"], json!(45.0));
    assert!(saved["savedAt"].is_i64());
    let remote = backend.wait_for("/api/save_inputs").body;
    assert_eq!(remote["schedulingWindow"], json!(45.0));

    let (status, answer) = post(&base, "/ui/action", json!({"action": "simulate"}));
    assert_eq!(status, 200);
    let results = answer["fragments"]["results"].as_str().expect("results");
    assert!(results.contains("Tank states"));
    assert!(results.contains("Metrics"));

    let (status, answer) = post(&base, "/ui/field", json!({"key": "numTanks", "value": "14"}));
    assert_eq!(status, 200);
    assert_eq!(answer["effect"], json!("regenerated"));
    let tanks = answer["fragments"]["tanks"].as_str().expect("tanks");
    assert!(tanks.contains("data-tank=\"14\""));

    let (status, _) = post(&base, "/ui/nowhere", json!({}));
    assert_eq!(status, 404);

    let state = ureq::get(&format!("{base}/ui/state"))
        .call()
        .expect("state")
        .into_string()
        .expect("body");
    let state: Value = serde_json::from_str(&state).expect("json");
    assert_eq!(state["numTanks"], json!(14.0));

    ui.server.shutdown();
    let _ = std::fs::remove_dir_all(ui.dir);
}

#[test]
fn edits_and_auto_save_proceed_while_a_simulation_is_in_flight() {
    let backend = FakeBackend::start(|method, path, _| match (method, path) {
        ("POST", "/api/simulate") => {
            thread::sleep(Duration::from_millis(1500));
            Reply::json(simulation_reply())
        }
        _ => Reply::json(json!({"success": true})),
    });
    let ui = start_ui(&backend, "web-slow");

    let simulate = {
        let base = ui.base.clone();
        thread::spawn(move || post(&base, "/ui/action", json!({"action": "simulate"})))
    };
    let deadline = Instant::now() + Duration::from_secs(1);
    while !ui.console.lock().is_busy() {
        assert!(Instant::now() < deadline, "simulation never started");
        thread::sleep(Duration::from_millis(5));
    }

    let started = Instant::now();
    let (status, answer) = post(
        &ui.base,
        "/ui/field",
        json!({"key": "schedulingWindow", "value": "45"}),
    );
    let latency = started.elapsed();
    assert_eq!(status, 200);
    assert_eq!(answer["busy"], json!(1));
    assert!(latency < Duration::from_millis(500), "edit took {latency:?}");

    let saved = wait_for_file(&ui.state_path);
    assert_eq!(saved["schedulingWindow"], json!(45.0));
    assert!(ui.console.lock().is_busy());

    let (status, answer) = simulate.join().expect("simulate thread");
    assert_eq!(status, 200);
    let results = answer["fragments"]["results"].as_str().expect("results");
    assert!(results.contains("Metrics"));
    assert!(!ui.console.lock().is_busy());
    // The request carried the form as it was when the action started.
    let sent = backend.wait_for("/api/simulate").body;
    assert_eq!(sent["schedulingWindow"], json!(30.0));

    ui.server.shutdown();
    let _ = std::fs::remove_dir_all(ui.dir);
}
