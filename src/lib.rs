//! redq: a Sidekiq-compatible distributed background job processor backed
//! by Redis.
//!
//! Clients enqueue named jobs with argument payloads onto named queues; one
//! or more [`Manager`]s, possibly on different hosts, dequeue those jobs and
//! run them through a registered [`Handler`], recording processed/failed
//! counters, realtime histograms, the failed-job list and the live
//! "busy processes" set in Redis under a configurable key namespace.
//!
//! The Redis key layout ([`Config`]'s `*_key` builders) and job JSON shape
//! ([`Job`]) are fixed by the Sidekiq-compatible wire format so that
//! external tooling reading the same namespace keeps working.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use redq::{Config, Gateway, HandlerRegistry, Manager, handler::from_fn};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), redq::Error> {
//!     let config = Config::from_env();
//!     let gateway = Gateway::connect(config.redis_url()).await?;
//!
//!     let registry = HandlerRegistry::new().register(
//!         "SendWorker",
//!         from_fn(|_args| async move { Ok(()) }),
//!     );
//!
//!     let manager = Manager::spawn(config, gateway, registry);
//!     let jid = manager.enqueue("default", "SendWorker", vec![]).await?;
//!     println!("enqueued {jid}");
//!
//!     manager.stop();
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod gateway;
pub mod handler;
pub mod job;
pub mod manager;
pub mod queue;
pub mod stats;
pub mod worker;

pub use config::Config;
pub use error::Error;
pub use gateway::Gateway;
pub use handler::{Handler, HandlerRegistry};
pub use job::{Job, ProcessEntry};
pub use manager::Manager;
pub use queue::QueueEngine;
pub use stats::StatsEngine;
pub use worker::Outcome;
