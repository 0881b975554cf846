//! Connection and runtime configuration, plus the Redis key layout.
//!
//! A [`Config`] is a plain struct with private fields, a [`Default`] impl
//! carrying every documented default, and `get_*`/`set_*` accessors that
//! consume and return `Self` so calls chain, mirroring the reference
//! storage-`Config` convention this crate is grown from.

use std::time::Duration;

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 6379;
const DEFAULT_NAMESPACE: &str = "exq";
const DEFAULT_POLL_TIMEOUT_MS: u64 = 50;
const DEFAULT_RECONNECT_ON_SLEEP_MS: u64 = 100;
const DEFAULT_CONCURRENCY: usize = 25;

/// Connection and dispatch configuration for a [`crate::manager::Manager`].
#[derive(Clone, Debug)]
pub struct Config {
    host: String,
    port: u16,
    database: u8,
    password: String,
    namespace: String,
    queues: Vec<String>,
    poll_timeout: Duration,
    reconnect_on_sleep: Duration,
    concurrency: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            database: 0,
            password: String::new(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            queues: vec!["default".to_string()],
            poll_timeout: Duration::from_millis(DEFAULT_POLL_TIMEOUT_MS),
            reconnect_on_sleep: Duration::from_millis(DEFAULT_RECONNECT_ON_SLEEP_MS),
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

impl Config {
    /// Build a default config, then apply any `REDIS_URL`/`EXQ_*`
    /// environment overrides found in the process environment. See
    /// [`Config::with_env`].
    pub fn from_env() -> Self {
        Self::default().with_env()
    }

    /// Apply recognized environment variables on top of the current config.
    ///
    /// `REDIS_URL` (a standard `redis://[:password@]host[:port][/db]` URL)
    /// overrides `host`/`port`/`database`/`password` in one shot when
    /// present and parses. `EXQ_NAMESPACE`, `EXQ_CONCURRENCY` and
    /// `EXQ_POLL_INTERVAL_MS` override the corresponding single field when
    /// set; a value that fails to parse is ignored for that field rather
    /// than panicking, since the process should still be able to start with
    /// its compiled-in defaults.
    pub fn with_env(mut self) -> Self {
        use redis::IntoConnectionInfo;
        if let Ok(url) = std::env::var("REDIS_URL") {
            if let Ok(info) = url.as_str().into_connection_info() {
                if let redis::ConnectionAddr::Tcp(ref host, port) = info.addr {
                    self.host = host.clone();
                    self.port = port;
                }
                if let Some(password) = info.redis.password {
                    self.password = password;
                }
                self.database = info.redis.db as u8;
            }
        }
        if let Ok(ns) = std::env::var("EXQ_NAMESPACE") {
            self.namespace = ns;
        }
        if let Ok(c) = std::env::var("EXQ_CONCURRENCY") {
            if let Ok(c) = c.parse() {
                self.concurrency = c;
            }
        }
        if let Ok(ms) = std::env::var("EXQ_POLL_INTERVAL_MS") {
            if let Ok(ms) = ms.parse() {
                self.poll_timeout = Duration::from_millis(ms);
            }
        }
        self
    }

    /// Redis host.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Redis port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Redis logical database index.
    pub fn database(&self) -> u8 {
        self.database
    }

    /// Redis `AUTH` password, empty if unset.
    pub fn password(&self) -> &str {
        &self.password
    }

    /// Key prefix isolating this deployment's data from others sharing the
    /// same Redis instance.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Queues polled by the manager, in priority order.
    pub fn queues(&self) -> &[String] {
        &self.queues
    }

    /// How long the manager sleeps between poll ticks when idle or at its
    /// concurrency cap.
    pub fn poll_timeout(&self) -> Duration {
        self.poll_timeout
    }

    /// How long to wait before retrying after a Redis connection failure.
    pub fn reconnect_on_sleep(&self) -> Duration {
        self.reconnect_on_sleep
    }

    /// Maximum number of workers the manager will run at once.
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Build the `redis://` connection URL for this config.
    pub fn redis_url(&self) -> String {
        if self.password.is_empty() {
            format!("redis://{}:{}/{}", self.host, self.port, self.database)
        } else {
            format!(
                "redis://:{}@{}:{}/{}",
                self.password, self.host, self.port, self.database
            )
        }
    }

    /// Set the Redis host.
    pub fn set_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Set the Redis port.
    pub fn set_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the Redis logical database index.
    pub fn set_database(mut self, database: u8) -> Self {
        self.database = database;
        self
    }

    /// Set the Redis `AUTH` password.
    pub fn set_password(mut self, password: impl Into<String>) -> Self {
        self.password = password.into();
        self
    }

    /// Set the key-prefix namespace.
    pub fn set_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Set the queues polled by the manager, in priority order.
    pub fn set_queues<I, S>(mut self, queues: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.queues = queues.into_iter().map(Into::into).collect();
        self
    }

    /// Set the poll timeout.
    pub fn set_poll_timeout(mut self, poll_timeout: Duration) -> Self {
        self.poll_timeout = poll_timeout;
        self
    }

    /// Set the reconnect backoff.
    pub fn set_reconnect_on_sleep(mut self, reconnect_on_sleep: Duration) -> Self {
        self.reconnect_on_sleep = reconnect_on_sleep;
        self
    }

    /// Set the worker concurrency cap.
    pub fn set_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// The `<ns>:queues` registry set key.
    pub fn queues_key(&self) -> String {
        format!("{}:queues", self.namespace)
    }

    /// The `<ns>:queue:<name>` list key for one queue.
    pub fn queue_key(&self, name: &str) -> String {
        format!("{}:queue:{}", self.namespace, name)
    }

    /// The `<ns>:failed` list key.
    pub fn failed_key(&self) -> String {
        format!("{}:failed", self.namespace)
    }

    /// The `<ns>:processes` set key.
    pub fn processes_key(&self) -> String {
        format!("{}:processes", self.namespace)
    }

    /// The `<ns>:stat:<kind>` monotonic counter key (`kind` is `processed`
    /// or `failed`).
    pub fn stat_key(&self, kind: &str) -> String {
        format!("{}:stat:{}", self.namespace, kind)
    }

    /// The `<ns>:stat:<kind>:<YYYY-MM-DD>` persistent daily bucket key.
    pub fn stat_daily_key(&self, kind: &str, date: &str) -> String {
        format!("{}:stat:{}:{}", self.namespace, kind, date)
    }

    /// The `<ns>:stat:<kind>_rt:<YYYY-MM-DD HH:MM:SS +zzzz>` realtime bucket
    /// key, which carries a 120s TTL once written.
    pub fn stat_rt_key(&self, kind: &str, timestamp: &str) -> String {
        format!("{}:stat:{}_rt:{}", self.namespace, kind, timestamp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let c = Config::default();
        assert_eq!(c.host(), "127.0.0.1");
        assert_eq!(c.port(), 6379);
        assert_eq!(c.database(), 0);
        assert_eq!(c.password(), "");
        assert_eq!(c.namespace(), "exq");
        assert_eq!(c.queues(), &["default".to_string()]);
        assert_eq!(c.poll_timeout(), Duration::from_millis(50));
        assert_eq!(c.reconnect_on_sleep(), Duration::from_millis(100));
        assert_eq!(c.concurrency(), 25);
    }

    #[test]
    fn key_layout() {
        let c = Config::default();
        assert_eq!(c.queues_key(), "exq:queues");
        assert_eq!(c.queue_key("default"), "exq:queue:default");
        assert_eq!(c.failed_key(), "exq:failed");
        assert_eq!(c.processes_key(), "exq:processes");
        assert_eq!(c.stat_key("processed"), "exq:stat:processed");
        assert_eq!(
            c.stat_daily_key("processed", "2026-07-28"),
            "exq:stat:processed:2026-07-28"
        );
        assert_eq!(
            c.stat_rt_key("processed", "2026-07-28 12:00:00 +0000"),
            "exq:stat:processed_rt:2026-07-28 12:00:00 +0000"
        );
    }

    #[test]
    fn builder_chains() {
        let c = Config::default()
            .set_namespace("custom")
            .set_concurrency(5)
            .set_queues(["hi", "lo"]);
        assert_eq!(c.namespace(), "custom");
        assert_eq!(c.concurrency(), 5);
        assert_eq!(c.queues(), &["hi".to_string(), "lo".to_string()]);
    }
}
