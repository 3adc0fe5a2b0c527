use super::{JobState, JobStore};
use crate::checker::{self, ProgressSink};
use crate::config::AppConfig;
use crate::router_driver::RouterDriver;
use std::sync::Arc;
use tokio::sync::mpsc;

struct CallbackSink<'a> {
    record: &'a super::JobRecord,
}

impl ProgressSink for CallbackSink<'_> {
    fn progress(&self, current: usize, total: usize, message: String) {
        self.record.update_progress(current, total, message);
    }
}

/// The single worker loop: dequeue, run, record outcome, release claims.
/// Only one node is being switched/probed at a time globally — this loop
/// is the sole place `run_check` is ever invoked from.
pub async fn run(
    store: Arc<JobStore>,
    mut queue_rx: mpsc::UnboundedReceiver<super::JobDescriptor>,
    driver: Arc<dyn RouterDriver>,
    config: Arc<AppConfig>,
) {
    tracing::info!("jobs: worker started");

    while let Some(descriptor) = queue_rx.recv().await {
        let record = &descriptor.record;

        if record.state() == JobState::Cancelled {
            tracing::info!("jobs: job {} cancelled before run", descriptor.url);
            store.end_run(&descriptor.url, &store.clients_claiming(&descriptor.url));
            continue;
        }

        store.begin_run(&descriptor.url);
        tracing::info!("jobs: worker starting job: {}", descriptor.url);

        let sink = CallbackSink { record: record.as_ref() };
        let outcome = checker::run_check(
            driver.as_ref(),
            &config,
            &descriptor.file_path,
            &descriptor.options,
            &sink,
            &record.cancel_signal,
        )
        .await;

        match outcome {
            Ok(()) => {
                if record.cancel_signal.is_set() {
                    tracing::info!("jobs: job {} finished (cancelled)", descriptor.url);
                    metrics::counter!("auditor_jobs_finished_total", "state" => "cancelled").increment(1);
                } else {
                    record.complete();
                    metrics::counter!("auditor_jobs_finished_total", "state" => "completed").increment(1);
                }
            }
            Err(e) => {
                tracing::error!("jobs: job {} failed: {}", descriptor.url, e);
                record.fail(e.to_string());
                metrics::counter!("auditor_jobs_finished_total", "state" => "error").increment(1);
            }
        }

        let claimants = store.clients_claiming(&descriptor.url);
        store.end_run(&descriptor.url, &claimants);
    }

    tracing::warn!("jobs: worker loop ended, queue channel closed");
}
