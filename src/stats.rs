//! Counters, realtime histograms, the failed-job list and the live
//! process table.

use std::sync::Arc;

use chrono::{Local, Utc};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::Error;
use crate::gateway::Gateway;
use crate::job::{Job, ProcessEntry};

const REALTIME_TTL_SECONDS: i64 = 120;
const RT_FORMAT: &str = "%Y-%m-%d %H:%M:%S %z";
const DAILY_FORMAT: &str = "%Y-%m-%d";

/// One entry appended to the `<ns>:failed` list.
#[derive(Clone, Debug, Serialize, Deserialize)]
struct FailedEntry {
    jid: String,
    class: String,
    args: Vec<serde_json::Value>,
    queue: String,
    enqueued_at: f64,
    failed_at: String,
    error_class: String,
    error_message: String,
}

/// Counters, realtime histograms, the failed-job list and the live process
/// table (§4.4). All operations are idempotent at the Redis level, but the
/// counters are not: callers must invoke each of [`StatsEngine::record_processed`]
/// and [`StatsEngine::record_failure`] at most once per job outcome.
#[derive(Clone)]
pub struct StatsEngine {
    gateway: Gateway,
    config: Arc<Config>,
}

impl StatsEngine {
    /// Build a stats engine over the given gateway and config.
    pub fn new(gateway: Gateway, config: Arc<Config>) -> Self {
        StatsEngine { gateway, config }
    }

    /// Add a worker to the live process table, `SADD`-ing its JSON entry.
    pub async fn add_process(&self, entry: &ProcessEntry) -> Result<(), Error> {
        let raw = serde_json::to_string(entry).expect("ProcessEntry serializes infallibly");
        self.gateway.sadd(&self.config.processes_key(), &raw).await
    }

    /// Remove the process-table entry whose decoded `(pid, host)` matches.
    /// Returns [`Error::NotFound`] if no such entry exists.
    pub async fn remove_process(&self, host: &str, worker_id: &str) -> Result<(), Error> {
        let members = self.gateway.smembers(&self.config.processes_key()).await?;
        for raw in members {
            if let Ok(entry) = serde_json::from_str::<ProcessEntry>(&raw) {
                if entry.pid == worker_id && entry.host == host {
                    self.gateway.srem(&self.config.processes_key(), &raw).await?;
                    return Ok(());
                }
            }
        }
        Err(Error::NotFound)
    }

    /// Record a successful job completion: increments `stat:processed`, its
    /// realtime bucket (with a 120s TTL) and its daily bucket.
    pub async fn record_processed(&self, _job: &Job) -> Result<(), Error> {
        self.gateway.incr(&self.config.stat_key("processed")).await?;
        let rt_key = self.config.stat_rt_key("processed", &rt_bucket());
        self.gateway.incr(&rt_key).await?;
        self.gateway.expire(&rt_key, REALTIME_TTL_SECONDS).await?;
        self.gateway
            .incr(&self.config.stat_daily_key("processed", &daily_bucket()))
            .await?;
        Ok(())
    }

    /// Record a failed job: increments `stat:failed` (symmetric with
    /// [`StatsEngine::record_processed`]) and appends a failure record to
    /// `<ns>:failed` carrying `failed_at`, `error_class="GenericError"` and
    /// `error_message` alongside the original job's identifying fields.
    pub async fn record_failure(&self, error: &str, job: &Job) -> Result<(), Error> {
        self.gateway.incr(&self.config.stat_key("failed")).await?;
        let rt_key = self.config.stat_rt_key("failed", &rt_bucket());
        self.gateway.incr(&rt_key).await?;
        self.gateway.expire(&rt_key, REALTIME_TTL_SECONDS).await?;
        self.gateway
            .incr(&self.config.stat_daily_key("failed", &daily_bucket()))
            .await?;

        let entry = FailedEntry {
            jid: job.jid.clone(),
            class: job.class.clone(),
            args: job.args.clone(),
            queue: job.queue.clone(),
            enqueued_at: job.enqueued_at,
            failed_at: Local::now().to_rfc3339(),
            error_class: "GenericError".to_string(),
            error_message: error.to_string(),
        };
        let raw = serde_json::to_string(&entry).expect("FailedEntry serializes infallibly");
        self.gateway.rpush(&self.config.failed_key(), &raw).await
    }

    /// Scan `<ns>:failed` for the first entry whose `jid` matches.
    pub async fn find_failed(&self, jid: &str) -> Result<Option<(Job, usize)>, Error> {
        let entries = self.gateway.lrange(&self.config.failed_key(), 0, -1).await?;
        for (idx, raw) in entries.iter().enumerate() {
            match serde_json::from_str::<FailedEntry>(raw) {
                Ok(entry) if entry.jid == jid => return Ok(Some((entry.into_job(), idx))),
                Ok(_) => continue,
                Err(e) => tracing::warn!("skipping undecodable failed entry: {e}"),
            }
        }
        Ok(None)
    }

    /// Decrement `stat:failed`, then remove the matching entry from
    /// `<ns>:failed`. The counter is decremented unconditionally, before
    /// the list is searched, matching the wire-compatible reference
    /// behavior acknowledged in §9: under concurrent removals the counter
    /// can go negative, and that is accepted rather than "fixed".
    pub async fn remove_failed(&self, jid: &str) -> Result<bool, Error> {
        self.gateway.decr(&self.config.stat_key("failed")).await?;
        let entries = self.gateway.lrange(&self.config.failed_key(), 0, -1).await?;
        for raw in entries {
            if let Ok(entry) = serde_json::from_str::<FailedEntry>(&raw) {
                if entry.jid == jid {
                    let removed = self.gateway.lrem(&self.config.failed_key(), 1, &raw).await?;
                    return Ok(removed > 0);
                }
            }
        }
        Ok(false)
    }

    /// Reset the failed list and its counter.
    pub async fn clear_failed(&self) -> Result<(), Error> {
        self.gateway.set(&self.config.stat_key("failed"), "0").await?;
        self.gateway.del(&self.config.failed_key()).await
    }

    /// Clear the live process table.
    pub async fn clear_processes(&self) -> Result<(), Error> {
        self.gateway.del(&self.config.processes_key()).await
    }

    /// Fetch the live realtime buckets, returning `(processed, failed)`
    /// sequences of `(bucket_label, count)`. `KEYS` is acceptable here
    /// because the 120s TTL bounds cardinality to at most 120 entries per
    /// side.
    pub async fn realtime_stats(&self) -> Result<(Vec<(String, i64)>, Vec<(String, i64)>), Error> {
        let processed_prefix = format!("{}:stat:processed_rt:", self.config.namespace());
        let failed_prefix = format!("{}:stat:failed_rt:", self.config.namespace());
        let processed = self
            .collect_rt_buckets(&format!("{processed_prefix}*"), &processed_prefix)
            .await?;
        let failed = self
            .collect_rt_buckets(&format!("{failed_prefix}*"), &failed_prefix)
            .await?;
        Ok((processed, failed))
    }

    /// Strips the known `"{namespace}:stat:{kind}_rt:"` prefix to recover the
    /// bucket label, rather than splitting on `:`: the label itself
    /// (`"%Y-%m-%d %H:%M:%S %z"`) contains colons, so a colon-split would
    /// truncate it.
    async fn collect_rt_buckets(&self, pattern: &str, prefix: &str) -> Result<Vec<(String, i64)>, Error> {
        let keys = self.gateway.keys(pattern).await?;
        let mut out = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(value) = self.gateway.get(&key).await? {
                if let Ok(count) = value.parse::<i64>() {
                    let label = key.strip_prefix(prefix).unwrap_or(&key).to_string();
                    out.push((label, count));
                }
            }
        }
        Ok(out)
    }

    /// Number of currently executing workers across the fleet.
    pub async fn busy(&self) -> Result<i64, Error> {
        self.gateway.scard(&self.config.processes_key()).await
    }

    /// All live process-table entries, skipping any that fail to decode.
    pub async fn processes(&self) -> Result<Vec<ProcessEntry>, Error> {
        let members = self.gateway.smembers(&self.config.processes_key()).await?;
        Ok(members
            .iter()
            .filter_map(|raw| match serde_json::from_str::<ProcessEntry>(raw) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    tracing::warn!("skipping undecodable process entry: {e}");
                    None
                }
            })
            .collect())
    }
}

impl FailedEntry {
    fn into_job(self) -> Job {
        Job {
            jid: self.jid,
            class: self.class,
            args: self.args,
            queue: self.queue,
            enqueued_at: self.enqueued_at,
            failed_at: Some(self.failed_at),
            error_class: Some(self.error_class),
            error_message: Some(self.error_message),
            retry_count: None,
        }
    }
}

fn rt_bucket() -> String {
    Utc::now().format(RT_FORMAT).to_string()
}

fn daily_bucket() -> String {
    Utc::now().format(DAILY_FORMAT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rt_bucket_matches_expected_format() {
        let bucket = rt_bucket();
        // "YYYY-MM-DD HH:MM:SS +ZZZZ"
        assert_eq!(bucket.len(), 25);
        assert!(bucket.contains(' '));
    }

    #[test]
    fn daily_bucket_matches_expected_format() {
        let bucket = daily_bucket();
        assert_eq!(bucket.len(), 10);
        assert_eq!(bucket.matches('-').count(), 2);
    }
}
