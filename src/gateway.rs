//! The Redis gateway: the sole mutator of Redis state.
//!
//! Every other component speaks to Redis only through a [`Gateway`]. It is a
//! thin wrapper over `redis`'s async, auto-reconnecting [`ConnectionManager`]
//! exposing exactly the verbs the engine needs; nothing here encodes
//! business logic about queues, jobs or stats.

use redis::aio::ConnectionManager;
use redis::{AsyncCommands, IntoConnectionInfo};

use crate::error::Error;

/// A thin command layer over a single Redis connection.
///
/// Cloning a [`Gateway`] clones the underlying [`ConnectionManager`] handle,
/// which is itself cheaply cloneable and shares one multiplexed connection;
/// callers may therefore hold many `Gateway` values without opening many
/// sockets, while Redis command ordering on a given key stays deterministic
/// because the manager serializes writes over that one connection.
#[derive(Clone)]
pub struct Gateway {
    conn: ConnectionManager,
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway").field("conn", &"ConnectionManager").finish()
    }
}

impl Gateway {
    /// Open a connection-managed client for the given connection string.
    pub async fn connect<S: IntoConnectionInfo>(redis: S) -> Result<Self, Error> {
        let client = redis::Client::open(redis.into_connection_info()?)?;
        let conn = client.get_connection_manager().await?;
        Ok(Gateway { conn })
    }

    /// Wrap an already-established connection manager.
    pub fn from_connection_manager(conn: ConnectionManager) -> Self {
        Gateway { conn }
    }

    pub(crate) async fn get(&self, key: &str) -> Result<Option<String>, Error> {
        Ok(self.conn.clone().get(key).await?)
    }

    pub(crate) async fn set(&self, key: &str, value: &str) -> Result<(), Error> {
        let _: () = self.conn.clone().set(key, value).await?;
        Ok(())
    }

    pub(crate) async fn incr(&self, key: &str) -> Result<i64, Error> {
        Ok(self.conn.clone().incr(key, 1).await?)
    }

    pub(crate) async fn decr(&self, key: &str) -> Result<i64, Error> {
        Ok(self.conn.clone().decr(key, 1).await?)
    }

    pub(crate) async fn expire(&self, key: &str, seconds: i64) -> Result<(), Error> {
        let _: () = self.conn.clone().expire(key, seconds).await?;
        Ok(())
    }

    pub(crate) async fn del(&self, key: &str) -> Result<(), Error> {
        let _: () = self.conn.clone().del(key).await?;
        Ok(())
    }

    pub(crate) async fn keys(&self, pattern: &str) -> Result<Vec<String>, Error> {
        Ok(self.conn.clone().keys(pattern).await?)
    }

    pub(crate) async fn lpush(&self, key: &str, value: &str) -> Result<(), Error> {
        let _: () = self.conn.clone().lpush(key, value).await?;
        Ok(())
    }

    pub(crate) async fn rpush(&self, key: &str, value: &str) -> Result<(), Error> {
        let _: () = self.conn.clone().rpush(key, value).await?;
        Ok(())
    }

    pub(crate) async fn lpop(&self, key: &str) -> Result<Option<String>, Error> {
        Ok(self.conn.clone().lpop(key, None).await?)
    }

    #[allow(dead_code)]
    pub(crate) async fn rpoplpush(&self, src: &str, dst: &str) -> Result<Option<String>, Error> {
        Ok(self.conn.clone().rpoplpush(src, dst).await?)
    }

    pub(crate) async fn lrange(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>, Error> {
        Ok(self.conn.clone().lrange(key, start, stop).await?)
    }

    pub(crate) async fn lrem(&self, key: &str, count: isize, value: &str) -> Result<i64, Error> {
        Ok(self.conn.clone().lrem(key, count, value).await?)
    }

    pub(crate) async fn sadd(&self, key: &str, value: &str) -> Result<(), Error> {
        let _: () = self.conn.clone().sadd(key, value).await?;
        Ok(())
    }

    pub(crate) async fn srem(&self, key: &str, value: &str) -> Result<(), Error> {
        let _: () = self.conn.clone().srem(key, value).await?;
        Ok(())
    }

    pub(crate) async fn scard(&self, key: &str) -> Result<i64, Error> {
        Ok(self.conn.clone().scard(key).await?)
    }

    pub(crate) async fn smembers(&self, key: &str) -> Result<Vec<String>, Error> {
        Ok(self.conn.clone().smembers(key).await?)
    }

    #[allow(dead_code)]
    pub(crate) async fn smove(&self, src: &str, dst: &str, value: &str) -> Result<bool, Error> {
        Ok(self.conn.clone().smove(src, dst, value).await?)
    }
}
