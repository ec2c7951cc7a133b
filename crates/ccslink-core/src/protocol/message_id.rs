//! Client-side message ids.
//!
//! Ids are `prefix` + a pseudo-random signed 64-bit integer in decimal. They
//! correlate a send with its ack/nack within one session and are not
//! guaranteed unique (collisions are possible, just improbable).

use rand::Rng;

/// Default id prefix.
pub const DEFAULT_PREFIX: &str = "m-";

#[derive(Debug, Clone)]
pub struct MessageIdGenerator {
    prefix: String,
}

impl Default for MessageIdGenerator {
    fn default() -> Self {
        Self::new(DEFAULT_PREFIX)
    }
}

impl MessageIdGenerator {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn next(&self) -> String {
        let n: i64 = rand::thread_rng().gen();
        format!("{}{}", self.prefix, n)
    }
}
