//! Saving export files and sequenced CSV downloads.

#![allow(missing_docs)]

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::api::{ApiClient, ExportPayload};
use crate::error::ConsoleError;

/// What an export produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportOutcome {
    /// The backend wrote the file on its side.
    Generated { filename: String },
    Saved { path: PathBuf },
}

impl ExportOutcome {
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Self::Generated { filename } if filename.is_empty() => "Export generated.".to_string(),
            Self::Generated { filename } => format!("Export generated: {filename}"),
            Self::Saved { path } => format!("Saved {}", path.display()),
        }
    }
}

/// Last path segment, percent-decoded, with anything that could leave the
/// download directory rejected.
pub fn safe_file_name(raw: &str) -> Result<String, ConsoleError> {
    let without_query = raw.split(['?', '#']).next().unwrap_or_default();
    let segment = without_query
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default();
    let decoded = urlencoding::decode(segment)
        .map_err(|err| ConsoleError::Export(format!("bad file name '{raw}': {err}").into()))?;
    let name = decoded.trim();
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
        return Err(ConsoleError::Export(format!("bad file name '{raw}'").into()));
    }
    Ok(name.to_string())
}

pub fn save_file(dir: &Path, filename: &str, bytes: &[u8]) -> Result<PathBuf, ConsoleError> {
    let name = safe_file_name(filename)?;
    fs::create_dir_all(dir)
        .map_err(|err| ConsoleError::Export(format!("{}: {err}", dir.display()).into()))?;
    let path = dir.join(name);
    fs::write(&path, bytes)
        .map_err(|err| ConsoleError::Export(format!("{}: {err}", path.display()).into()))?;
    tracing::info!(path = %path.display(), bytes = bytes.len(), "file saved");
    Ok(path)
}

pub fn store_export(dir: &Path, payload: ExportPayload) -> Result<ExportOutcome, ConsoleError> {
    match payload {
        ExportPayload::Named { filename } => Ok(ExportOutcome::Generated { filename }),
        ExportPayload::File { filename, bytes } => {
            let path = save_file(dir, &filename, &bytes)?;
            Ok(ExportOutcome::Saved { path })
        }
    }
}

/// Downloads CSV artifacts one after another with `delay` between
/// triggers. A failed file does not stop the rest.
pub struct CsvDownloader<'a> {
    api: &'a ApiClient,
    dir: &'a Path,
    delay: Duration,
    sleep: Box<dyn FnMut(Duration) + 'a>,
}

impl<'a> CsvDownloader<'a> {
    pub fn new(api: &'a ApiClient, dir: &'a Path, delay: Duration) -> Self {
        Self {
            api,
            dir,
            delay,
            sleep: Box::new(std::thread::sleep),
        }
    }

    #[must_use]
    pub fn with_sleep(mut self, sleep: impl FnMut(Duration) + 'a) -> Self {
        self.sleep = Box::new(sleep);
        self
    }

    pub fn download_all(&mut self, urls: &[String]) -> Vec<Result<PathBuf, ConsoleError>> {
        let mut results = Vec::with_capacity(urls.len());
        for (idx, url) in urls.iter().enumerate() {
            if idx > 0 && !self.delay.is_zero() {
                (self.sleep)(self.delay);
            }
            let result = safe_file_name(url).and_then(|name| {
                let bytes = self.api.download(url)?;
                save_file(self.dir, &name, &bytes)
            });
            if let Err(err) = &result {
                tracing::warn!(url = %url, error = %err, "csv download failed");
            }
            results.push(result);
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_names_come_from_the_last_segment() {
        assert_eq!(
            safe_file_name("/download/daily_summary.csv").ok().as_deref(),
            Some("daily_summary.csv")
        );
        assert_eq!(
            safe_file_name("http://h:5000/download/cargo%20report.csv?x=1").ok().as_deref(),
            Some("cargo report.csv")
        );
        assert!(safe_file_name("/download/..").is_err());
        assert!(safe_file_name("/download/").is_err());
        assert!(safe_file_name("/download/a%2F..%2Fb.csv").is_err());
    }

    #[test]
    fn named_exports_write_nothing() {
        let dir = std::env::temp_dir().join(format!("tankfarm-export-named-{}", std::process::id()));
        let outcome = store_export(
            &dir,
            ExportPayload::Named {
                filename: "tank_status.xlsx".into(),
            },
        )
        .expect("named");
        assert_eq!(outcome.message(), "Export generated: tank_status.xlsx");
        assert!(!dir.join("tank_status.xlsx").exists());
    }

    #[test]
    fn sleeps_between_downloads_only() {
        // Unreachable port: every download fails, but the pacing still runs.
        let api = ApiClient::new("http://127.0.0.1:9");
        let dir = std::env::temp_dir();
        let mut sleeps = Vec::new();
        let results = CsvDownloader::new(&api, &dir, Duration::from_millis(400))
            .with_sleep(|delay| sleeps.push(delay))
            .download_all(&[
                "/download/a.csv".to_string(),
                "/download/b.csv".to_string(),
                "/download/c.csv".to_string(),
            ]);
        assert_eq!(results.len(), 3);
        assert!(results.iter().all(Result::is_err));
        assert_eq!(sleeps, vec![Duration::from_millis(400); 2]);
    }
}
