#![allow(dead_code)]

use std::net::TcpListener;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tiny_http::{Header, Response, Server, StatusCode};

#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: String,
    pub path: String,
    pub body: Value,
}

pub struct Reply {
    status: u16,
    body: Vec<u8>,
    headers: Vec<(String, String)>,
}

impl Reply {
    pub fn json(value: Value) -> Self {
        Self {
            status: 200,
            body: value.to_string().into_bytes(),
            headers: vec![("Content-Type".into(), "application/json".into())],
        }
    }

    pub fn file(bytes: &[u8], content_type: &str, disposition: &str) -> Self {
        Self {
            status: 200,
            body: bytes.to_vec(),
            headers: vec![
                ("Content-Type".into(), content_type.into()),
                ("Content-Disposition".into(), disposition.into()),
            ],
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }
}

type Route = dyn Fn(&str, &str, &Value) -> Reply + Send + Sync;

/// Scheduling backend stand-in; records every request it answers.
pub struct FakeBackend {
    pub base: String,
    pub requests: Arc<Mutex<Vec<Recorded>>>,
    server: Arc<Server>,
}

impl FakeBackend {
    pub fn start(route: impl Fn(&str, &str, &Value) -> Reply + Send + Sync + 'static) -> Self {
        let server = Arc::new(Server::http("127.0.0.1:0").expect("bind fake backend"));
        let addr = server.server_addr().to_ip().expect("ip listener");
        let requests = Arc::new(Mutex::new(Vec::new()));
        let route: Arc<Route> = Arc::new(route);
        {
            let server = Arc::clone(&server);
            let requests = Arc::clone(&requests);
            thread::spawn(move || {
                for mut request in server.incoming_requests() {
                    let method = request.method().to_string();
                    let path = request.url().to_string();
                    let mut text = String::new();
                    let _ = request.as_reader().read_to_string(&mut text);
                    let body = serde_json::from_str(&text).unwrap_or(Value::Null);
                    let reply = route(&method, &path, &body);
                    requests.lock().push(Recorded { method, path, body });
                    let mut response =
                        Response::from_data(reply.body).with_status_code(StatusCode(reply.status));
                    for (name, value) in reply.headers {
                        response = response.with_header(
                            Header::from_bytes(name.as_bytes(), value.as_bytes()).expect("header"),
                        );
                    }
                    let _ = request.respond(response);
                }
            });
        }
        Self {
            base: format!("http://{addr}"),
            requests,
            server,
        }
    }

    pub fn requests_to(&self, path: &str) -> Vec<Recorded> {
        self.requests
            .lock()
            .iter()
            .filter(|recorded| recorded.path == path)
            .cloned()
            .collect()
    }

    /// Wait for a request that may arrive from a background thread.
    pub fn wait_for(&self, path: &str) -> Recorded {
        for _ in 0..200 {
            if let Some(found) = self.requests_to(path).pop() {
                return found;
            }
            thread::sleep(Duration::from_millis(10));
        }
        panic!("no request to {path} reached the fake backend");
    }
}

impl Drop for FakeBackend {
    fn drop(&mut self) {
        self.server.unblock();
    }
}

pub fn reserve_loopback_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind local port");
    let port = listener.local_addr().expect("read local addr").port();
    drop(listener);
    port
}

pub fn wait_for_server(base: &str) {
    for _ in 0..80 {
        if ureq::get(&format!("{base}/app.js")).call().is_ok() {
            return;
        }
        thread::sleep(Duration::from_millis(25));
    }
    panic!("web server did not become reachable at {base}");
}

pub fn temp_dir(name: &str) -> PathBuf {
    let stamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("clock")
        .as_nanos();
    let root = std::env::temp_dir().join(format!("tankfarm-{name}-{stamp}"));
    std::fs::create_dir_all(&root).expect("create temp dir");
    root
}

pub fn simulation_reply() -> Value {
    serde_json::json!({
        "simulation_data": [
            {"Date": "2025-08-10", "Closing Stock (bbl)": "4,200,000", "Tank1": "READY", "Tank2": "FEEDING", "Tank3": "EMPTY"},
            {"Date": "2025-08-11", "Closing Stock (bbl)": "4,150,000", "Tank1": "FEEDING", "Tank2": "EMPTY", "Tank3": "FILLING"}
        ],
        "simulation_log": [
            {"Timestamp": "2025-08-10 08:00", "Level": "INFO", "Event": "START", "Tank": "", "Message": "Simulation started"}
        ],
        "metrics": {"Total processed (bbl)": "1,200,000", "Cargoes": 3},
        "cargo_report": [],
        "csv_files": ["/download/daily_summary.csv", "/download/simulation_log.csv"]
    })
}
