//! The persisted job record and its wire-compatible JSON shape.

use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A scheduled job, as stored verbatim in a Redis list.
///
/// Field names and casing are fixed by the Sidekiq-compatible wire format
/// (§3/§4.1 of the design): external tooling that reads this namespace's
/// keys depends on exactly these names existing, so renaming any of them
/// is a breaking change to the data layout, not just this crate's API.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Job {
    /// 24-hex-character unique job identifier.
    pub jid: String,
    /// Name of the handler to invoke.
    pub class: String,
    /// Ordered argument values passed to the handler.
    pub args: Vec<Value>,
    /// Name of the queue this job was enqueued to.
    pub queue: String,
    /// Seconds since the Unix epoch, as a float, at enqueue time.
    pub enqueued_at: f64,

    /// ISO 8601 local time the failure was recorded, if this job has failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_at: Option<String>,
    /// Error class/kind recorded on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_class: Option<String>,
    /// Error message recorded on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Number of retry attempts already made, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_count: Option<u32>,
}

impl Job {
    /// Construct a new job ready to enqueue. `enqueued_at` is stamped by the
    /// caller so that it can be driven by a fake clock in tests.
    pub fn new(queue: impl Into<String>, class: impl Into<String>, args: Vec<Value>, enqueued_at: f64) -> Self {
        Job {
            jid: new_jid(),
            class: class.into(),
            args,
            queue: queue.into(),
            enqueued_at,
            failed_at: None,
            error_class: None,
            error_message: None,
            retry_count: None,
        }
    }
}

/// Generate a new jid: 12 random bytes, hex-encoded to 24 characters, drawn
/// from a cryptographically-strong thread-local RNG so that jids minted
/// concurrently by unrelated processes cannot collide (§4.1).
pub fn new_jid() -> String {
    let mut bytes = [0u8; 12];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// One entry in the live process table (`<ns>:processes`): a worker that
/// has registered but not yet reported its outcome.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProcessEntry {
    /// Opaque, stable, unique-per-worker identifier (`"<host>:<uuid>"`-style).
    pub pid: String,
    /// Hostname of the process running this worker.
    pub host: String,
    /// The job currently being executed.
    pub job: Job,
    /// ISO 8601 local time the worker started this job.
    pub started_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jid_is_24_hex_chars() {
        let jid = new_jid();
        assert_eq!(jid.len(), 24);
        assert!(jid.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn jids_are_unique() {
        let a = new_jid();
        let b = new_jid();
        assert_ne!(a, b);
    }

    #[test]
    fn job_round_trips_through_json() {
        let job = Job::new("default", "SendWorker", vec![Value::from(1)], 1000.5);
        let raw = serde_json::to_string(&job).unwrap();
        assert!(!raw.contains("failed_at"));
        let back: Job = serde_json::from_str(&raw).unwrap();
        assert_eq!(back.jid, job.jid);
        assert_eq!(back.class, "SendWorker");
        assert_eq!(back.queue, "default");
    }
}
