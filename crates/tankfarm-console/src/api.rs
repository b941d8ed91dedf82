//! HTTP client for the scheduling backend.
//!
//! One request per call. There are no retries and no timeouts. Failures come
//! back as [`ConsoleError`] and the caller decides how to surface them.

#![allow(missing_docs)]

use std::io::Read;

use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use smol_str::SmolStr;

use tankfarm_core::crude_mix::optimizer_inputs;
use tankfarm_core::response::{
    BufferAnalysis, CrudeMixResponse, ExportResponse, InventoryRangeResponse, OptimizationResponse,
    SimulationResponse,
};
use tankfarm_core::PersistedFormState;

use crate::error::ConsoleError;
use crate::persist::RemoteStore;

/// Files bigger than this are refused.
const MAX_DOWNLOAD_BYTES: u64 = 64 * 1024 * 1024;

/// Export endpoints that answer with JSON or a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportKind {
    TankStatus,
    Charts,
    SolverReport,
}

impl ExportKind {
    pub const ALL: [ExportKind; 3] = [Self::TankStatus, Self::Charts, Self::SolverReport];

    #[must_use]
    pub const fn endpoint(self) -> &'static str {
        match self {
            Self::TankStatus => "/api/export_tank_status",
            Self::Charts => "/api/export_charts",
            Self::SolverReport => "/api/export_solver_report",
        }
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::TankStatus => "tank status",
            Self::Charts => "charts",
            Self::SolverReport => "solver report",
        }
    }

    pub fn parse(text: &str) -> Result<Self, ConsoleError> {
        match text.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "tank-status" => Ok(Self::TankStatus),
            "charts" => Ok(Self::Charts),
            "solver-report" => Ok(Self::SolverReport),
            other => Err(ConsoleError::Export(
                format!("unknown export '{other}' (expected tank-status, charts, solver-report)")
                    .into(),
            )),
        }
    }
}

/// Export answer: the backend either names a file it wrote, or streams one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportPayload {
    Named { filename: String },
    File { filename: String, bytes: Vec<u8> },
}

#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: SmolStr,
    agent: ureq::Agent,
}

impl ApiClient {
    #[must_use]
    pub fn new(base_url: impl Into<SmolStr>) -> Self {
        let base_url: SmolStr = base_url.into();
        Self {
            base_url: SmolStr::new(base_url.trim_end_matches('/')),
            agent: ureq::AgentBuilder::new().build(),
        }
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else if path.starts_with('/') {
            format!("{}{path}", self.base_url)
        } else {
            format!("{}/{path}", self.base_url)
        }
    }

    pub fn simulate(&self, form: &PersistedFormState) -> Result<SimulationResponse, ConsoleError> {
        self.post_json("/api/simulate", &to_body(form)?)
    }

    pub fn buffer_analysis(&self, form: &PersistedFormState) -> Result<BufferAnalysis, ConsoleError> {
        self.post_json("/api/buffer_analysis", &to_body(form)?)
    }

    /// Arbitrary JSON, shown verbatim.
    pub fn cargo_optimization(&self, form: &PersistedFormState) -> Result<Value, ConsoleError> {
        self.post_json("/api/cargo_optimization", &to_body(form)?)
    }

    /// Same body as a simulation plus `crude_names` and `crude_percentages`
    /// taken from the mix rows.
    pub fn optimize_crude_mix(
        &self,
        form: &PersistedFormState,
    ) -> Result<OptimizationResponse, ConsoleError> {
        let mut body = to_body(form)?;
        let (names, percentages) = optimizer_inputs(&form.crude_mix_data);
        if let Value::Object(map) = &mut body {
            map.insert("crude_names".to_string(), json!(names));
            map.insert("crude_percentages".to_string(), json!(percentages));
        }
        let response: OptimizationResponse = self.post_json("/api/optimize_crude_mix", &body)?;
        if !response.success {
            let mut message = response
                .error
                .clone()
                .unwrap_or_else(|| "Optimization failed".to_string());
            if let Some(details) = &response.details {
                message.push_str(&format!(" ({})", compact(details)));
            }
            return Err(ConsoleError::Api {
                status: 200,
                message: message.into(),
            });
        }
        Ok(response)
    }

    pub fn save_inputs(&self, form: &PersistedFormState) -> Result<(), ConsoleError> {
        let _: Value = self.post_json("/api/save_inputs", &to_body(form)?)?;
        Ok(())
    }

    /// `None` when the backend has nothing saved.
    pub fn load_inputs(&self) -> Result<Option<PersistedFormState>, ConsoleError> {
        let value: Value = self.get_json("/api/load_inputs")?;
        if value.is_null() {
            return Ok(None);
        }
        let snapshot: PersistedFormState = serde_json::from_value(value)
            .map_err(|err| ConsoleError::Decode(format!("load_inputs: {err}").into()))?;
        Ok((!snapshot.is_empty()).then_some(snapshot))
    }

    pub fn get_crude_mix(&self) -> Result<CrudeMixResponse, ConsoleError> {
        self.get_json("/api/get_crude_mix")
    }

    pub fn validate_inventory_range(
        &self,
        form: &PersistedFormState,
    ) -> Result<InventoryRangeResponse, ConsoleError> {
        self.post_json("/api/validate_inventory_range", &to_body(form)?)
    }

    pub fn export(
        &self,
        kind: ExportKind,
        form: &PersistedFormState,
    ) -> Result<ExportPayload, ConsoleError> {
        let body = to_body(form)?.to_string();
        tracing::info!(endpoint = kind.endpoint(), "export request");
        let response = self
            .agent
            .post(&self.url(kind.endpoint()))
            .set("Content-Type", "application/json")
            .send_string(&body)
            .map_err(map_error)?;

        if response.content_type().contains("json") {
            let text = response
                .into_string()
                .map_err(|err| ConsoleError::Transport(err.to_string().into()))?;
            let answer: ExportResponse = serde_json::from_str(&text)
                .map_err(|err| ConsoleError::Decode(format!("{}: {err}", kind.endpoint()).into()))?;
            if let Some(error) = answer.error {
                return Err(ConsoleError::Export(error.into()));
            }
            let filename = answer.filename.unwrap_or_default();
            return Ok(ExportPayload::Named { filename });
        }

        let disposition = response.header("Content-Disposition").map(str::to_string);
        let bytes = read_limited(response)?;
        let filename = disposition
            .as_deref()
            .and_then(disposition_filename)
            .unwrap_or_else(|| format!("{}.bin", kind.endpoint().trim_start_matches("/api/")));
        Ok(ExportPayload::File { filename, bytes })
    }

    /// Fetch one CSV artifact; `path` may be absolute or relative to the
    /// backend.
    pub fn download(&self, path: &str) -> Result<Vec<u8>, ConsoleError> {
        tracing::debug!(path, "download");
        let response = self.agent.get(&self.url(path)).call().map_err(map_error)?;
        read_limited(response)
    }

    fn post_json<T: DeserializeOwned>(&self, path: &str, body: &Value) -> Result<T, ConsoleError> {
        tracing::info!(endpoint = path, "backend request");
        let response = self
            .agent
            .post(&self.url(path))
            .set("Content-Type", "application/json")
            .send_string(&body.to_string());
        decode(path, response)
    }

    fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ConsoleError> {
        tracing::info!(endpoint = path, "backend request");
        decode(path, self.agent.get(&self.url(path)).call())
    }
}

impl RemoteStore for ApiClient {
    fn save(&self, snapshot: &PersistedFormState) -> Result<(), ConsoleError> {
        self.save_inputs(snapshot)
    }

    fn load(&self) -> Result<Option<PersistedFormState>, ConsoleError> {
        self.load_inputs()
    }
}

fn to_body(form: &PersistedFormState) -> Result<Value, ConsoleError> {
    serde_json::to_value(form).map_err(|err| ConsoleError::Decode(err.to_string().into()))
}

fn decode<T: DeserializeOwned>(
    path: &str,
    response: Result<ureq::Response, ureq::Error>,
) -> Result<T, ConsoleError> {
    let text = response
        .map_err(map_error)?
        .into_string()
        .map_err(|err| ConsoleError::Transport(err.to_string().into()))?;
    let value: Value = if text.trim().is_empty() {
        Value::Null
    } else {
        serde_json::from_str(&text)
            .map_err(|err| ConsoleError::Decode(format!("{path}: {err}").into()))?
    };
    if let Some(message) = error_field(&value) {
        // `{success: false, error}` from the optimizer is handled by the caller.
        if value.get("success").is_none() {
            return Err(ConsoleError::Api {
                status: 200,
                message: message.into(),
            });
        }
    }
    serde_json::from_value(value).map_err(|err| ConsoleError::Decode(format!("{path}: {err}").into()))
}

fn error_field(value: &Value) -> Option<String> {
    value
        .get("error")
        .and_then(Value::as_str)
        .filter(|message| !message.trim().is_empty())
        .map(str::to_string)
}

fn map_error(err: ureq::Error) -> ConsoleError {
    match err {
        ureq::Error::Status(status, response) => {
            let text = response.into_string().unwrap_or_default();
            let message = serde_json::from_str::<Value>(&text)
                .ok()
                .and_then(|value| error_field(&value))
                .unwrap_or_else(|| {
                    let trimmed = text.trim();
                    if trimmed.is_empty() {
                        format!("HTTP {status}")
                    } else {
                        trimmed.to_string()
                    }
                });
            ConsoleError::Api {
                status,
                message: message.into(),
            }
        }
        ureq::Error::Transport(transport) => ConsoleError::Transport(transport.to_string().into()),
    }
}

fn read_limited(response: ureq::Response) -> Result<Vec<u8>, ConsoleError> {
    let mut bytes = Vec::new();
    response
        .into_reader()
        .take(MAX_DOWNLOAD_BYTES + 1)
        .read_to_end(&mut bytes)
        .map_err(|err| ConsoleError::Transport(err.to_string().into()))?;
    if bytes.len() as u64 > MAX_DOWNLOAD_BYTES {
        return Err(ConsoleError::Export("download exceeds 64 MiB".into()));
    }
    Ok(bytes)
}

fn compact(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Filename from `attachment; filename="x.xlsx"` or the RFC 5987
/// `filename*=UTF-8''x%20y.xlsx` form.
#[must_use]
pub fn disposition_filename(header: &str) -> Option<String> {
    let mut plain = None;
    for part in header.split(';').map(str::trim) {
        if let Some(encoded) = part.strip_prefix("filename*=") {
            let encoded = encoded.split_once("''").map_or(encoded, |(_, rest)| rest);
            if let Ok(decoded) = urlencoding::decode(encoded.trim_matches('"')) {
                return Some(decoded.into_owned());
            }
        } else if let Some(name) = part.strip_prefix("filename=") {
            plain = Some(name.trim_matches('"').to_string());
        }
    }
    plain.filter(|name| !name.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_join_base_and_path() {
        let client = ApiClient::new("http://127.0.0.1:5000/");
        assert_eq!(client.url("/api/simulate"), "http://127.0.0.1:5000/api/simulate");
        assert_eq!(client.url("download/a.csv"), "http://127.0.0.1:5000/download/a.csv");
        assert_eq!(client.url("https://cdn.example.net/a.csv"), "https://cdn.example.net/a.csv");
    }

    #[test]
    fn disposition_forms() {
        assert_eq!(
            disposition_filename("attachment; filename=\"tank_status.xlsx\"").as_deref(),
            Some("tank_status.xlsx")
        );
        assert_eq!(
            disposition_filename("attachment; filename=a.pdf; filename*=UTF-8''solver%20report.pdf")
                .as_deref(),
            Some("solver report.pdf")
        );
        assert_eq!(disposition_filename("inline"), None);
    }

    #[test]
    fn export_kind_parsing() {
        assert_eq!(ExportKind::parse("tank_status").ok(), Some(ExportKind::TankStatus));
        assert_eq!(ExportKind::parse("Solver-Report").ok(), Some(ExportKind::SolverReport));
        assert!(ExportKind::parse("pdf").is_err());
    }

    #[test]
    fn error_field_ignores_blank() {
        assert_eq!(error_field(&json!({"error": "boom"})).as_deref(), Some("boom"));
        assert_eq!(error_field(&json!({"error": " "})), None);
        assert_eq!(error_field(&json!({"data": 1})), None);
    }
}
