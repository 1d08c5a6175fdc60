use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

const PREFIX: &str = "session_";
const SUFFIX_LEN: usize = 9;
const BASE36: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Client-minted identifier correlating one widget's chat turns on the backend.
///
/// Shaped as `session_<unix millis>_<9 base36 chars>`. Unique enough per tab,
/// not meant to be unguessable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn mint() -> Self {
        Self::mint_at(Utc::now(), Uuid::new_v4())
    }

    pub fn mint_at(now: DateTime<Utc>, entropy: Uuid) -> Self {
        let mut n = entropy.as_u128();
        let mut suffix = String::with_capacity(SUFFIX_LEN);
        for _ in 0..SUFFIX_LEN {
            suffix.push(BASE36[(n % 36) as usize] as char);
            n /= 36;
        }
        Self(format!("{PREFIX}{}_{suffix}", now.timestamp_millis()))
    }

    /// Wraps an identifier obtained elsewhere, e.g. from the command line.
    pub fn from_existing(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
