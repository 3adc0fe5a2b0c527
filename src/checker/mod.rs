pub mod document;
pub mod tag;

use crate::cache::atomic_write;
use crate::config::AppConfig;
use crate::probe::dispatcher::Dispatcher;
use crate::probe::ippure::IpPureProvider;
use crate::probe::ping0::Ping0Provider;
use crate::probe::ProbeProvider;
use crate::router_driver::RouterDriver;
use document::ConfigDocument;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Per-run overrides layered on top of a clone of the process config.
/// Unspecified fields fall through to `AppConfig` (see `effective`).
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub source: Option<String>,
    pub fallback: Option<bool>,
    pub request_timeout_secs: Option<u64>,
    pub skip_keywords: Option<Vec<String>>,
    pub max_queue_size: Option<usize>,
    pub max_age_secs: Option<u64>,
}

struct Effective {
    source: String,
    fallback: bool,
    request_timeout: Duration,
    skip_keywords: Vec<String>,
}

fn effective(config: &AppConfig, options: &RunOptions) -> Effective {
    Effective {
        source: options.source.clone().unwrap_or_else(|| config.source.clone()),
        fallback: options.fallback.unwrap_or(config.fallback),
        request_timeout: Duration::from_secs(
            options.request_timeout_secs.unwrap_or(config.request_timeout_secs),
        ),
        skip_keywords: options
            .skip_keywords
            .clone()
            .unwrap_or_else(|| config.skip_keywords.clone()),
    }
}

/// One-shot cancellation flag shared between a job record and the worker
/// currently executing `run_check` for it.
#[derive(Clone, Default)]
pub struct CancelSignal(Arc<AtomicBool>);

impl CancelSignal {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Observable transitions emitted during a run, invoked on every skip,
/// switch failure, probe result, intermediate save, completion, or
/// cancellation.
pub trait ProgressSink: Send + Sync {
    fn progress(&self, current: usize, total: usize, message: String);
}

fn default_providers(config: &AppConfig) -> Vec<Box<dyn ProbeProvider>> {
    vec![
        Box::new(Ping0Provider::new(config.user_agent.clone())),
        Box::new(IpPureProvider::new(
            config.check_url.clone(),
            config.user_agent.clone(),
        )),
    ]
}

/// Drive one node-iteration run over the configuration document at
/// `file_path`. Never returns an `Err` that should abort the
/// job — upstream-unreachable and parse failures are reported through
/// `progress` and the function simply returns; only genuinely unexpected
/// I/O failures during save surface as `Err` so the caller can mark the
/// job `error`.
pub async fn run_check(
    driver: &dyn RouterDriver,
    config: &AppConfig,
    file_path: &Path,
    options: &RunOptions,
    progress: &dyn ProgressSink,
    cancel: &CancelSignal,
) -> Result<(), crate::error::AppError> {
    let eff = effective(config, options);
    let run_start = Instant::now();

    // 1. Verify router alive.
    if !driver.alive().await {
        tracing::warn!("checker: router API not reachable, abandoning run");
        progress.progress(0, 0, "Router unreachable".to_string());
        metrics::histogram!("auditor_run_duration_seconds").record(run_start.elapsed().as_secs_f64());
        return Ok(());
    }

    // 2. Load the configuration at the absolute path.
    let abs_path = std::fs::canonicalize(file_path)
        .unwrap_or_else(|_| file_path.to_path_buf())
        .to_string_lossy()
        .to_string();
    if !driver.load_config(&abs_path).await {
        tracing::warn!("checker: router rejected load_config for {}", abs_path);
        progress.progress(0, 0, "Failed to load configuration into router".to_string());
        metrics::histogram!("auditor_run_duration_seconds").record(run_start.elapsed().as_secs_f64());
        return Ok(());
    }

    // 3. Grace interval for the router to stabilize.
    tokio::time::sleep(Duration::from_millis(config.load_grace_ms)).await;

    // 4. Enforce mixed port, set global mode, resolve live port.
    driver.enforce_mixed_port(config.mixed_port).await;
    if driver.set_global_mode().await {
        tracing::info!("checker: switched router to global mode");
    } else {
        tracing::warn!("checker: failed to switch router to global mode");
    }
    let port = driver.get_mixed_port().await.unwrap_or(config.mixed_port);
    let local_proxy_url = format!("http://127.0.0.1:{port}");

    // 5. Parse the document.
    let bytes = std::fs::read(file_path)?;
    let mut document = match ConfigDocument::parse(&bytes) {
        Ok(d) => d,
        Err(e) => {
            tracing::warn!("checker: failed to parse configuration document: {}", e);
            progress.progress(0, 0, format!("Parse failure: {e}"));
            metrics::histogram!("auditor_run_duration_seconds").record(run_start.elapsed().as_secs_f64());
            return Ok(());
        }
    };

    let dispatcher = Dispatcher::new(default_providers(config), &eff.source, eff.fallback);

    let total = document.proxy_count();
    let mut done = 0usize;
    progress.progress(0, total, "Starting...".to_string());

    for index in 0..total {
        if cancel.is_set() {
            progress.progress(done, total, "Cancelled by user.".to_string());
            save(&document, file_path);
            metrics::histogram!("auditor_run_duration_seconds").record(run_start.elapsed().as_secs_f64());
            return Ok(());
        }

        let Some(name) = document.proxy_name(index) else {
            continue;
        };

        if eff.skip_keywords.iter().any(|kw| name.contains(kw.as_str())) {
            done += 1;
            metrics::counter!("auditor_nodes_processed_total", "outcome" => "skipped").increment(1);
            progress.progress(done, total, format!("Skipped: {name}"));
            continue;
        }

        let display_name = tag::strip_tag(&name);
        progress.progress(done, total, format!("Checking: {display_name}"));

        if !driver.switch_global(&name).await {
            done += 1;
            metrics::counter!("auditor_nodes_processed_total", "outcome" => "switch_failed").increment(1);
            progress.progress(done, total, format!("Error: Could not switch to {display_name}"));
            continue;
        }

        tokio::time::sleep(Duration::from_millis(config.switch_settle_ms)).await;

        let probe_start = Instant::now();
        let result = dispatcher.dispatch(&local_proxy_url, eff.request_timeout).await;
        metrics::counter!(
            "auditor_probe_total",
            "provider" => result.provider,
            "result" => if result.error.is_some() { "error" } else { "ok" }
        )
        .increment(1);
        metrics::histogram!("auditor_probe_call_duration_seconds", "provider" => result.provider)
            .record(probe_start.elapsed().as_secs_f64());

        let new_name = tag::rename_for(&name, &result);
        document.rename_proxy(index, &new_name);

        done += 1;
        metrics::counter!(
            "auditor_nodes_processed_total",
            "outcome" => if result.error.is_some() { "probe_failed" } else { "ok" }
        )
        .increment(1);
        if done % config.save_every.max(1) == 0 {
            save(&document, file_path);
            tracing::info!("checker: intermediate save at {}/{}", done, total);
        }

        let shared = result
            .shared_users
            .as_deref()
            .filter(|s| *s != "N/A")
            .map(|s| format!("  共享: {s}"))
            .unwrap_or_default();
        let log_msg = match &result.error {
            Some(e) => format!("Result: error: {e}"),
            None => format!(
                "Result: IP: {}  污染度: {}{}",
                result.ip,
                result.score_pct.map(|v| format!("{v}%")).unwrap_or_else(|| "?".to_string()),
                shared
            ),
        };
        progress.progress(done, total, log_msg);
    }

    // 7. Unconditional final save.
    save(&document, file_path);
    progress.progress(done, total, "Done".to_string());
    metrics::histogram!("auditor_run_duration_seconds").record(run_start.elapsed().as_secs_f64());

    Ok(())
}

fn save(document: &ConfigDocument, file_path: &Path) {
    match document.to_bytes() {
        Ok(bytes) => {
            if let Err(e) = atomic_write(file_path, &bytes) {
                tracing::error!("checker: atomic save failed: {}", e);
                metrics::counter!("auditor_atomic_saves_total", "result" => "error").increment(1);
            } else {
                metrics::counter!("auditor_atomic_saves_total", "result" => "ok").increment(1);
            }
        }
        Err(e) => {
            tracing::error!("checker: failed to serialize document for save: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router_driver::ProxyEntry;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct FakeDriver {
        alive: bool,
        switch_fails_for: Vec<String>,
    }

    #[async_trait]
    impl RouterDriver for FakeDriver {
        async fn alive(&self) -> bool {
            self.alive
        }
        async fn load_config(&self, _absolute_path: &str) -> bool {
            true
        }
        async fn set_global_mode(&self) -> bool {
            true
        }
        async fn set_log_level(&self, _level: &str) -> bool {
            true
        }
        async fn enforce_mixed_port(&self, _port: u16) -> bool {
            true
        }
        async fn get_mixed_port(&self) -> Option<u16> {
            Some(7890)
        }
        async fn list_proxies(&self) -> Option<HashMap<String, ProxyEntry>> {
            None
        }
        async fn switch_global(&self, name: &str) -> bool {
            !self.switch_fails_for.contains(&name.to_string())
        }
    }

    struct RecordingSink {
        messages: Mutex<Vec<String>>,
    }

    impl ProgressSink for RecordingSink {
        fn progress(&self, _current: usize, _total: usize, message: String) {
            self.messages.lock().unwrap().push(message);
        }
    }

    #[tokio::test]
    async fn abandons_run_when_router_unreachable() {
        let driver = FakeDriver { alive: false, switch_fails_for: vec![] };
        let config = AppConfig::default();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.yaml");
        std::fs::write(&path, b"proxies: []\n").unwrap();
        let sink = RecordingSink { messages: Mutex::new(vec![]) };
        let cancel = CancelSignal::new();

        run_check(&driver, &config, &path, &RunOptions::default(), &sink, &cancel)
            .await
            .unwrap();

        assert!(sink.messages.lock().unwrap().iter().any(|m| m.contains("unreachable")));
        // File must be untouched.
        assert_eq!(std::fs::read(&path).unwrap(), b"proxies: []\n");
    }

    #[tokio::test]
    async fn parse_failure_is_reported_without_mutation() {
        let driver = FakeDriver { alive: true, switch_fails_for: vec![] };
        let config = AppConfig::default();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.yaml");
        std::fs::write(&path, b"not_proxies: []\n").unwrap();
        let sink = RecordingSink { messages: Mutex::new(vec![]) };
        let cancel = CancelSignal::new();

        run_check(&driver, &config, &path, &RunOptions::default(), &sink, &cancel)
            .await
            .unwrap();

        assert!(sink.messages.lock().unwrap().iter().any(|m| m.contains("Parse failure")));
    }

    #[tokio::test]
    async fn cancellation_before_first_node_stops_without_mutating_names() {
        let driver = FakeDriver { alive: true, switch_fails_for: vec![] };
        let config = AppConfig::default();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.yaml");
        std::fs::write(&path, b"proxies:\n  - name: A\n  - name: B\n").unwrap();
        let sink = RecordingSink { messages: Mutex::new(vec![]) };
        let cancel = CancelSignal::new();
        cancel.set();

        run_check(&driver, &config, &path, &RunOptions::default(), &sink, &cancel)
            .await
            .unwrap();

        let saved = String::from_utf8(std::fs::read(&path).unwrap()).unwrap();
        assert!(saved.contains("name: A"));
        assert!(!saved.contains('【'));
    }
}
