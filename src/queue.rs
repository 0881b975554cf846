//! Enqueue, dequeue, peek and removal on one or many named queues.

use std::sync::Arc;

use crate::config::Config;
use crate::error::Error;
use crate::gateway::Gateway;
use crate::job::Job;
use serde_json::Value;

/// Enqueue, dequeue, peek and removal on one or many named queues.
///
/// Owns the job-id generator (via [`Job::new`]) and registration of queue
/// names into the `<ns>:queues` set. `QueueEngine` is cheap to clone: it
/// holds only a [`Gateway`] handle and a shared [`Config`].
#[derive(Clone)]
pub struct QueueEngine {
    gateway: Gateway,
    config: Arc<Config>,
}

impl QueueEngine {
    /// Build a queue engine over the given gateway and config.
    pub fn new(gateway: Gateway, config: Arc<Config>) -> Self {
        QueueEngine { gateway, config }
    }

    /// Register `queue` in the `<ns>:queues` set and push a freshly-minted
    /// job onto `<ns>:queue:<queue>`. Returns the new jid.
    pub async fn enqueue(
        &self,
        queue: &str,
        class: &str,
        args: Vec<Value>,
    ) -> Result<String, Error> {
        let enqueued_at = now_epoch_seconds();
        let job = Job::new(queue, class, args, enqueued_at);
        let jid = job.jid.clone();
        let raw = serde_json::to_string(&job).expect("Job serializes infallibly");

        self.gateway.sadd(&self.config.queues_key(), queue).await?;
        self.gateway.rpush(&self.config.queue_key(queue), &raw).await?;
        Ok(jid)
    }

    /// Push an already-serialized job verbatim onto `<ns>:queue:<queue>`,
    /// used by retry/requeue paths that already hold a `Job` with its
    /// original jid. Does not touch the `<ns>:queues` registry.
    pub async fn enqueue_raw(&self, queue: &str, job: &Job) -> Result<String, Error> {
        let raw = serde_json::to_string(job).expect("Job serializes infallibly");
        self.gateway.rpush(&self.config.queue_key(queue), &raw).await?;
        Ok(job.jid.clone())
    }

    /// Attempt an `LPOP` on each queue in the given priority order, in
    /// turn, returning the first non-empty result's raw JSON. Decoding is
    /// left to the caller (the worker decodes it itself, per §4.5) so that
    /// a malformed record still gets popped off the list rather than
    /// wedging the queue. Not atomic across queues: a concurrent consumer
    /// may drain a later queue between two of this call's `LPOP`s, which is
    /// acceptable because cross-consumer fairness is only advisory (§4.3).
    pub async fn dequeue(&self, queues: &[String]) -> Result<Option<String>, Error> {
        for queue in queues {
            if let Some(raw) = self.gateway.lpop(&self.config.queue_key(queue)).await? {
                return Ok(Some(raw));
            }
        }
        Ok(None)
    }

    /// Scan `<ns>:queue:<queue>` for the first element whose decoded `jid`
    /// matches, returning the job and its index. Skips (rather than
    /// failing on) individual entries that fail to decode, logging each.
    pub async fn find_job(&self, queue: &str, jid: &str) -> Result<Option<(Job, usize)>, Error> {
        let entries = self.gateway.lrange(&self.config.queue_key(queue), 0, -1).await?;
        for (idx, raw) in entries.iter().enumerate() {
            match serde_json::from_str::<Job>(raw) {
                Ok(job) if job.jid == jid => return Ok(Some((job, idx))),
                Ok(_) => continue,
                Err(e) => {
                    tracing::warn!(queue, "skipping undecodable queue entry: {e}");
                }
            }
        }
        Ok(None)
    }

    /// Remove the first queue entry with the given jid. Returns `true` if
    /// an entry was found and removed.
    pub async fn remove_job(&self, queue: &str, jid: &str) -> Result<bool, Error> {
        let entries = self.gateway.lrange(&self.config.queue_key(queue), 0, -1).await?;
        for raw in entries {
            match serde_json::from_str::<Job>(&raw) {
                Ok(job) if job.jid == jid => {
                    let removed = self
                        .gateway
                        .lrem(&self.config.queue_key(queue), 1, &raw)
                        .await?;
                    return Ok(removed > 0);
                }
                Ok(_) => continue,
                Err(e) => {
                    tracing::warn!(queue, "skipping undecodable queue entry: {e}");
                }
            }
        }
        Ok(false)
    }
}

pub(crate) fn decode_job(raw: &str) -> Result<Job, Error> {
    serde_json::from_str(raw).map_err(|e| Error::decode(e, raw.as_bytes()))
}

pub(crate) fn now_epoch_seconds() -> f64 {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    now.as_secs_f64()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_job_reports_preview_on_bad_json() {
        let err = decode_job("not json").unwrap_err();
        match err {
            Error::Decode { preview, .. } => assert_eq!(preview, "not json"),
            _ => panic!("expected decode error"),
        }
    }
}
