pub mod worker;

#[cfg(test)]
mod tests;

use crate::checker::{CancelSignal, RunOptions};
use dashmap::DashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Queued,
    Running,
    Completed,
    Cancelled,
    Error,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Queued => "queued",
            JobState::Running => "running",
            JobState::Completed => "completed",
            JobState::Cancelled => "cancelled",
            JobState::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Cancelled | JobState::Error)
    }
}

/// A job's externally observable record.
pub struct JobRecord {
    pub url: String,
    pub request_id: Option<String>,
    pub state: std::sync::Mutex<JobState>,
    pub current: AtomicUsize,
    pub total: AtomicUsize,
    pub last_message: std::sync::Mutex<String>,
    pub pending_logs: std::sync::Mutex<Vec<String>>,
    pub submit_time: SystemTime,
    pub finish_time: std::sync::Mutex<Option<SystemTime>>,
    pub error_text: std::sync::Mutex<Option<String>>,
    pub cancel_signal: CancelSignal,
}

impl JobRecord {
    fn new(url: String, request_id: Option<String>) -> Self {
        Self {
            url,
            request_id,
            state: std::sync::Mutex::new(JobState::Queued),
            current: AtomicUsize::new(0),
            total: AtomicUsize::new(0),
            last_message: std::sync::Mutex::new("Waiting...".to_string()),
            pending_logs: std::sync::Mutex::new(Vec::new()),
            submit_time: SystemTime::now(),
            finish_time: std::sync::Mutex::new(None),
            error_text: std::sync::Mutex::new(None),
            cancel_signal: CancelSignal::new(),
        }
    }

    pub fn state(&self) -> JobState {
        *self.state.lock().unwrap()
    }

    fn set_state(&self, state: JobState) {
        *self.state.lock().unwrap() = state;
    }

    /// Update progress counters and append the message to the log buffer,
    /// in the same call — a `progress_cb` happens-before the router driver
    /// calls that follow it for the same job.
    pub fn update_progress(&self, current: usize, total: usize, message: String) {
        self.set_state(JobState::Running);
        self.current.store(current, Ordering::SeqCst);
        self.total.store(total, Ordering::SeqCst);
        *self.last_message.lock().unwrap() = message.clone();
        self.pending_logs.lock().unwrap().push(message);
    }

    pub fn complete(&self) {
        self.set_state(JobState::Completed);
        *self.finish_time.lock().unwrap() = Some(SystemTime::now());
        *self.last_message.lock().unwrap() = "Done".to_string();
        self.pending_logs.lock().unwrap().push("Done".to_string());
    }

    pub fn cancel(&self) {
        self.set_state(JobState::Cancelled);
        *self.finish_time.lock().unwrap() = Some(SystemTime::now());
        *self.last_message.lock().unwrap() = "Cancelled by user".to_string();
        self.pending_logs.lock().unwrap().push("Cancelled by user".to_string());
        self.cancel_signal.set();
    }

    pub fn fail(&self, error: String) {
        self.set_state(JobState::Error);
        *self.finish_time.lock().unwrap() = Some(SystemTime::now());
        *self.last_message.lock().unwrap() = format!("Error: {error}");
        *self.error_text.lock().unwrap() = Some(error);
    }

    /// Drain `pending_logs` atomically. No log message is ever silently
    /// dropped between SSE polls.
    pub fn drain_logs(&self) -> Vec<String> {
        std::mem::take(&mut self.pending_logs.lock().unwrap())
    }

    pub fn snapshot(&self) -> JobSnapshot {
        JobSnapshot {
            status: self.state().as_str().to_string(),
            current: self.current.load(Ordering::SeqCst),
            total: self.total.load(Ordering::SeqCst),
            message: self.last_message.lock().unwrap().clone(),
            error: self.error_text.lock().unwrap().clone(),
            submit_time: self.submit_time,
            finish_time: *self.finish_time.lock().unwrap(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct JobSnapshot {
    pub status: String,
    pub current: usize,
    pub total: usize,
    pub message: String,
    pub error: Option<String>,
    pub submit_time: SystemTime,
    pub finish_time: Option<SystemTime>,
}

#[derive(Debug, Clone)]
pub struct QueueInfo {
    pub depth: usize,
    pub running_url: Option<String>,
}

pub struct JobDescriptor {
    pub url: String,
    pub file_path: PathBuf,
    pub options: RunOptions,
    /// The exact record created for this submission. The worker must operate
    /// on this record, never re-resolve one by URL — a later resubmission for
    /// the same URL installs a different record in the map, and re-resolving
    /// would run this descriptor's stale options against that other job.
    pub record: Arc<JobRecord>,
}

#[derive(Debug)]
pub enum AdmissionError {
    ClientBusy,
}

impl std::fmt::Display for AdmissionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AdmissionError::ClientBusy => {
                write!(f, "you already have a pending task")
            }
        }
    }
}

/// Job records keyed by subscription URL, per-client concurrency guard, and
/// the FIFO channel feeding the single worker.
pub struct JobStore {
    jobs: DashMap<String, Arc<JobRecord>>,
    client_claims: DashMap<String, String>,
    queue_tx: mpsc::UnboundedSender<JobDescriptor>,
    queue_depth: Arc<AtomicUsize>,
    running_url: Arc<std::sync::Mutex<Option<String>>>,
}

pub struct JobStoreHandle {
    pub store: Arc<JobStore>,
    pub queue_rx: mpsc::UnboundedReceiver<JobDescriptor>,
}

impl JobStore {
    pub fn new() -> JobStoreHandle {
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        let store = Arc::new(Self {
            jobs: DashMap::new(),
            client_claims: DashMap::new(),
            queue_tx,
            queue_depth: Arc::new(AtomicUsize::new(0)),
            running_url: Arc::new(std::sync::Mutex::new(None)),
        });
        JobStoreHandle { store, queue_rx }
    }

    /// Register a cache hit as an already-completed job, so `/api/status`
    /// and the SSE stream have something sensible to report.
    pub fn register_completed(&self, url: &str) {
        let record = Arc::new(JobRecord::new(url.to_string(), None));
        record.complete();
        *record.last_message.lock().unwrap() = "Result Load from Cache".to_string();
        self.jobs.insert(url.to_string(), record);
    }

    /// Admission algorithm for `submit`.
    pub fn submit(
        &self,
        url: String,
        file_path: PathBuf,
        client_id: Option<String>,
        options: RunOptions,
        request_id: Option<String>,
    ) -> Result<(), AdmissionError> {
        if let Some(existing) = self.jobs.get(&url) {
            let state = existing.state();
            if matches!(state, JobState::Queued | JobState::Running) {
                if request_id.is_some() && existing.request_id == request_id {
                    if let Some(client_id) = &client_id {
                        self.client_claims.insert(client_id.clone(), url.clone());
                    }
                    return Ok(());
                }
                tracing::info!(
                    "jobs: cancelling superseded job for {} (old request_id={:?})",
                    url,
                    existing.request_id
                );
                existing.cancel();
            }
        }

        if let Some(client_id) = &client_id {
            if let Some(active_url) = self.client_claims.get(client_id).map(|v| v.clone()) {
                if active_url != url {
                    if let Some(active_job) = self.jobs.get(&active_url) {
                        if matches!(active_job.state(), JobState::Queued | JobState::Running) {
                            return Err(AdmissionError::ClientBusy);
                        }
                    }
                }
            }
            self.client_claims.insert(client_id.clone(), url.clone());
        }

        let record = Arc::new(JobRecord::new(url.clone(), request_id));
        self.jobs.insert(url.clone(), record.clone());
        self.queue_depth.fetch_add(1, Ordering::SeqCst);
        metrics::gauge!("auditor_queue_depth").set(self.queue_depth.load(Ordering::SeqCst) as f64);
        metrics::counter!("auditor_jobs_submitted_total").increment(1);

        let _ = self.queue_tx.send(JobDescriptor { url, file_path, options, record });
        Ok(())
    }

    /// Cancellation algorithm.
    pub fn cancel(&self, url: &str, request_id: Option<&str>) -> bool {
        let Some(record) = self.jobs.get(url) else {
            return false;
        };

        match request_id {
            Some(rid) => {
                if record.request_id.as_deref() == Some(rid) {
                    record.cancel();
                    true
                } else {
                    false
                }
            }
            None => {
                record.cancel();
                true
            }
        }
    }

    pub fn status(&self, url: &str) -> Option<JobSnapshot> {
        self.jobs.get(url).map(|r| r.snapshot())
    }

    pub fn record(&self, url: &str) -> Option<Arc<JobRecord>> {
        self.jobs.get(url).map(|r| r.clone())
    }

    pub fn is_active(&self, url: &str) -> bool {
        self.jobs
            .get(url)
            .map(|r| matches!(r.state(), JobState::Queued | JobState::Running))
            .unwrap_or(false)
    }

    pub fn queue_info(&self) -> QueueInfo {
        QueueInfo {
            depth: self.queue_depth.load(Ordering::SeqCst),
            running_url: self.running_url.lock().unwrap().clone(),
        }
    }

    fn begin_run(&self, url: &str) {
        self.queue_depth.fetch_sub(1, Ordering::SeqCst);
        *self.running_url.lock().unwrap() = Some(url.to_string());
        metrics::gauge!("auditor_queue_depth").set(self.queue_depth.load(Ordering::SeqCst) as f64);
        metrics::gauge!("auditor_queue_running").set(1.0);
    }

    fn end_run(&self, url: &str, client_ids_to_release: &[String]) {
        *self.running_url.lock().unwrap() = None;
        metrics::gauge!("auditor_queue_running").set(0.0);
        for client_id in client_ids_to_release {
            self.client_claims.remove(client_id);
        }
        let _ = url;
    }

    fn clients_claiming(&self, url: &str) -> Vec<String> {
        self.client_claims
            .iter()
            .filter(|entry| entry.value() == url)
            .map(|entry| entry.key().clone())
            .collect()
    }
}
