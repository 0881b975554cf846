//! The manager/dispatcher: the long-lived supervisor that polls queues and
//! spawns workers bounded by a concurrency budget.

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

use crate::config::Config;
use crate::error::Error;
use crate::gateway::Gateway;
use crate::handler::HandlerRegistry;
use crate::job::Job;
use crate::queue::QueueEngine;
use crate::stats::StatsEngine;
use crate::worker::{self, Outcome};

type Reply<T> = oneshot::Sender<Result<T, Error>>;

enum Command {
    Enqueue {
        queue: String,
        class: String,
        args: Vec<Value>,
        reply: Reply<String>,
    },
    FindFailed {
        jid: String,
        reply: Reply<Option<(Job, usize)>>,
    },
    FindJob {
        queue: String,
        jid: String,
        reply: Reply<Option<(Job, usize)>>,
    },
    Stop,
}

/// A handle to a running manager. Cheap to clone; every clone shares the
/// same actor task. Calls against a handle are request/reply and serialize
/// with the manager's poll tick, so the dispatcher and external callers
/// never race on shared state (§4.7).
#[derive(Clone)]
pub struct Manager {
    tx: mpsc::UnboundedSender<Command>,
}

impl std::fmt::Debug for Manager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Manager").finish_non_exhaustive()
    }
}

impl Manager {
    /// Start the manager's actor task and return a handle to it.
    pub fn spawn(config: Config, gateway: Gateway, registry: HandlerRegistry) -> Self {
        let config = Arc::new(config);
        let queue_engine = QueueEngine::new(gateway.clone(), config.clone());
        let stats = StatsEngine::new(gateway, config.clone());

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (outcome_tx, outcome_rx) = mpsc::unbounded_channel();

        let actor = Actor {
            config,
            queue_engine,
            stats,
            registry,
            host: local_hostname(),
            cmd_rx,
            outcome_rx,
            outcome_tx,
            busy: HashSet::new(),
            next_worker_seq: 0,
            stopped: false,
        };
        tokio::spawn(actor.run());
        Manager { tx: cmd_tx }
    }

    /// Register `queue` and enqueue a new job, returning its jid.
    pub async fn enqueue(
        &self,
        queue: impl Into<String>,
        class: impl Into<String>,
        args: Vec<Value>,
    ) -> Result<String, Error> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Enqueue {
            queue: queue.into(),
            class: class.into(),
            args,
            reply,
        })?;
        rx.await.map_err(|_| Error::ManagerStopped)?
    }

    /// Look up a failed-job entry by jid.
    pub async fn find_failed(&self, jid: impl Into<String>) -> Result<Option<(Job, usize)>, Error> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::FindFailed { jid: jid.into(), reply })?;
        rx.await.map_err(|_| Error::ManagerStopped)?
    }

    /// Look up a still-pending job by queue and jid.
    pub async fn find_job(
        &self,
        queue: impl Into<String>,
        jid: impl Into<String>,
    ) -> Result<Option<(Job, usize)>, Error> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::FindJob {
            queue: queue.into(),
            jid: jid.into(),
            reply,
        })?;
        rx.await.map_err(|_| Error::ManagerStopped)?
    }

    /// Stop the manager. It stops accepting new poll ticks, forwards `stop`
    /// and returns; in-flight workers are not awaited (§4.6).
    pub fn stop(&self) {
        let _ = self.tx.send(Command::Stop);
    }

    fn send(&self, command: Command) -> Result<(), Error> {
        self.tx.send(command).map_err(|_| Error::ManagerStopped)
    }
}

struct Actor {
    config: Arc<Config>,
    queue_engine: QueueEngine,
    stats: StatsEngine,
    registry: HandlerRegistry,
    host: String,
    cmd_rx: mpsc::UnboundedReceiver<Command>,
    outcome_rx: mpsc::UnboundedReceiver<(String, Outcome)>,
    outcome_tx: mpsc::UnboundedSender<(String, Outcome)>,
    busy: HashSet<String>,
    next_worker_seq: u64,
    stopped: bool,
}

impl Actor {
    async fn run(mut self) {
        loop {
            self.drain_pending().await;
            if self.stopped {
                break;
            }

            if self.busy.len() < self.config.concurrency() {
                match self.queue_engine.dequeue(self.config.queues()).await {
                    Ok(Some(raw)) => {
                        self.spawn_worker(raw);
                        continue;
                    }
                    Ok(None) => {}
                    Err(e) => {
                        tracing::error!("redis unavailable during dequeue, retrying next tick: {e}");
                    }
                }
            }

            tokio::select! {
                biased;
                Some(cmd) = self.cmd_rx.recv() => self.handle_command(cmd).await,
                Some((worker_id, outcome)) = self.outcome_rx.recv() => self.handle_outcome(worker_id, outcome).await,
                _ = tokio::time::sleep(self.config.poll_timeout()) => {}
            }
        }
    }

    /// Drain any commands/outcomes already queued up without waiting for
    /// new ones to arrive. Keeps the manager responsive to `stop`/enqueue/
    /// outcome traffic that piled up while a hot queue kept the loop busy
    /// spawning workers.
    async fn drain_pending(&mut self) {
        loop {
            if self.stopped {
                return;
            }
            match self.cmd_rx.try_recv() {
                Ok(cmd) => {
                    self.handle_command(cmd).await;
                    continue;
                }
                Err(mpsc::error::TryRecvError::Empty) => {}
                Err(mpsc::error::TryRecvError::Disconnected) => {
                    self.stopped = true;
                    return;
                }
            }
            match self.outcome_rx.try_recv() {
                Ok((worker_id, outcome)) => {
                    self.handle_outcome(worker_id, outcome).await;
                    continue;
                }
                Err(mpsc::error::TryRecvError::Empty) => break,
                Err(mpsc::error::TryRecvError::Disconnected) => break,
            }
        }
    }

    fn spawn_worker(&mut self, raw_job: String) {
        let worker_id = format!("{}:{}", self.host, self.next_worker_seq);
        self.next_worker_seq += 1;
        self.busy.insert(worker_id.clone());
        worker::spawn(
            raw_job,
            worker_id,
            self.host.clone(),
            self.registry.clone(),
            self.stats.clone(),
            self.outcome_tx.clone(),
        );
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Enqueue { queue, class, args, reply } => {
                let result = self.queue_engine.enqueue(&queue, &class, args).await;
                let _ = reply.send(result);
            }
            Command::FindFailed { jid, reply } => {
                let result = self.stats.find_failed(&jid).await;
                let _ = reply.send(result);
            }
            Command::FindJob { queue, jid, reply } => {
                let result = self.queue_engine.find_job(&queue, &jid).await;
                let _ = reply.send(result);
            }
            Command::Stop => {
                tracing::info!("manager stopping");
                self.stopped = true;
            }
        }
    }

    async fn handle_outcome(&mut self, worker_id: String, outcome: Outcome) {
        self.busy.remove(&worker_id);
        match outcome {
            Outcome::Success { job, host, worker_id } => {
                if let Err(e) = self.stats.record_processed(&job).await {
                    tracing::warn!(jid = %job.jid, "failed to record processed stat: {e}");
                }
                if let Err(e) = self.stats.remove_process(&host, &worker_id).await {
                    tracing::warn!(jid = %job.jid, "failed to clear process table entry: {e}");
                }
            }
            Outcome::Failure { error, job, host, worker_id } => {
                if let Err(e) = self.stats.record_failure(&error, &job).await {
                    tracing::warn!(jid = %job.jid, "failed to record failure stat: {e}");
                }
                if let Err(e) = self.stats.remove_process(&host, &worker_id).await {
                    tracing::warn!(jid = %job.jid, "failed to clear process table entry: {e}");
                }
            }
            Outcome::Undecodable(raw) => {
                tracing::warn!("worker {worker_id} reported an undecodable job: {raw}");
            }
        }
    }
}

fn local_hostname() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string())
}
