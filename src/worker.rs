//! The per-job worker task: decode, resolve, invoke, report, terminate.

use std::panic::AssertUnwindSafe;

use chrono::Local;
use futures::FutureExt;
use tokio::sync::mpsc;

use crate::handler::HandlerRegistry;
use crate::job::{Job, ProcessEntry};
use crate::queue::decode_job;
use crate::stats::StatsEngine;

/// The outcome a worker reports back to the manager once it terminates.
///
/// `Success`/`Failure` carry the `(host, worker_id)` pair that identifies
/// this worker's process-table entry. The manager removes that entry itself,
/// after recording the outcome in Stats (see [`crate::manager`]), so that an
/// outside observer can never see a worker vanish from `processes` before its
/// `stat:processed`/`stat:failed`/`failed`-list update is visible (§5).
#[derive(Debug)]
pub enum Outcome {
    /// The handler ran to completion without error.
    Success {
        /// The job that completed.
        job: Job,
        /// Host this worker ran on.
        host: String,
        /// This worker's process-table `pid`.
        worker_id: String,
    },
    /// The handler returned an error, or no handler was registered for the
    /// job's class (`ClassNotFound`).
    Failure {
        /// Human-readable error, verbatim for handler errors or the
        /// synthetic `"ClassNotFound: <class>"` message otherwise.
        error: String,
        /// The job that failed.
        job: Job,
        /// Host this worker ran on.
        host: String,
        /// This worker's process-table `pid`.
        worker_id: String,
    },
    /// The raw queue entry could not be decoded as a [`Job`] at all. No
    /// process-table entry was ever created and no stats are recorded;
    /// this is logged and the job is otherwise dropped, since there is no
    /// well-formed job to report against.
    Undecodable(String),
}

/// Spawn a worker task that runs exactly one job and reports its outcome on
/// `outcome_tx`, tagged with `worker_id` so the manager can find the right
/// entry in its `busy_workers` set.
///
/// Implements the `Starting -> Running -> Reporting` state machine of §4.5;
/// the final `Reporting -> Terminated` transition (removing this worker's
/// process-table entry) happens in the manager's `handle_outcome`, after it
/// has recorded the outcome in Stats, to preserve the ordering §5 requires.
/// A panic inside the handler is caught here (mirroring the reference
/// stack's `CatchPanicLayer`) and converted into a [`Outcome::Failure`]
/// rather than propagating and taking the whole worker task down
/// ungracefully.
pub fn spawn(
    raw_job: String,
    worker_id: String,
    host: String,
    registry: HandlerRegistry,
    stats: StatsEngine,
    outcome_tx: mpsc::UnboundedSender<(String, Outcome)>,
) {
    tokio::spawn(async move {
        let job = match decode_job(&raw_job) {
            Ok(job) => job,
            Err(e) => {
                tracing::warn!("dropping undecodable job: {e}");
                let _ = outcome_tx.send((worker_id, Outcome::Undecodable(raw_job)));
                return;
            }
        };

        let entry = ProcessEntry {
            pid: worker_id.clone(),
            host: host.clone(),
            job: job.clone(),
            started_at: Local::now().to_rfc3339(),
        };
        if let Err(e) = stats.add_process(&entry).await {
            tracing::warn!(jid = %job.jid, "failed to register process table entry: {e}");
        }

        let outcome = match registry.resolve(&job.class) {
            Some(handler) => {
                let args = job.args.clone();
                match AssertUnwindSafe(handler.invoke(args)).catch_unwind().await {
                    Ok(Ok(())) => Outcome::Success {
                        job: job.clone(),
                        host: host.clone(),
                        worker_id: worker_id.clone(),
                    },
                    Ok(Err(error)) => Outcome::Failure {
                        error,
                        job: job.clone(),
                        host: host.clone(),
                        worker_id: worker_id.clone(),
                    },
                    Err(panic) => Outcome::Failure {
                        error: panic_message(panic),
                        job: job.clone(),
                        host: host.clone(),
                        worker_id: worker_id.clone(),
                    },
                }
            }
            None => Outcome::Failure {
                error: format!("ClassNotFound: {}", job.class),
                job: job.clone(),
                host: host.clone(),
                worker_id: worker_id.clone(),
            },
        };

        let _ = outcome_tx.send((worker_id, outcome));
    });
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}
