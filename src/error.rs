//! Crate-wide error type.

/// Errors produced by the job engine.
///
/// Every public async function in this crate returns `Result<T, Error>`. The
/// variants mirror the error kinds the engine must distinguish: a failed
/// Redis round-trip is always [`Error::RedisUnavailable`], a malformed
/// record read back from Redis is always [`Error::Decode`], and so on.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The connection to Redis could not be used to complete a command.
    #[error("redis unavailable: {0}")]
    RedisUnavailable(#[from] redis::RedisError),

    /// A record read back from Redis did not deserialize as expected.
    #[error("failed to decode redis record: {source} (raw: {preview})")]
    Decode {
        /// Underlying JSON error.
        source: serde_json::Error,
        /// Bounded preview of the bytes that failed to parse, for logging.
        preview: String,
    },

    /// A job's `class` did not resolve to any registered handler.
    #[error("ClassNotFound: {0}")]
    ClassNotFound(String),

    /// The user-supplied handler returned an error while running a job.
    #[error("{0}")]
    Handler(String),

    /// A lookup (`find_job`, `find_failed`, `remove_process`, ...) found no
    /// matching entry. No state was mutated.
    #[error("not found")]
    NotFound,

    /// A request/reply call was made against a [`crate::manager::Manager`]
    /// handle whose actor task has already stopped.
    #[error("manager is no longer running")]
    ManagerStopped,
}

const DECODE_PREVIEW_LEN: usize = 200;

impl Error {
    /// Build a [`Error::Decode`] from raw bytes, truncating the preview so a
    /// log line can show what failed to parse without flooding the log.
    pub fn decode(source: serde_json::Error, raw: &[u8]) -> Self {
        let text = String::from_utf8_lossy(raw);
        let preview = if text.len() > DECODE_PREVIEW_LEN {
            let mut cut = DECODE_PREVIEW_LEN;
            while !text.is_char_boundary(cut) {
                cut -= 1;
            }
            format!("{}...", &text[..cut])
        } else {
            text.into_owned()
        };
        Error::Decode { source, preview }
    }
}
