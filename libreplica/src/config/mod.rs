//! Process-wide transfer tunables.
//!
//! Three knobs are read from the environment once, at first use, and stay fixed
//! for the life of the process:
//!
//! | Variable | Meaning | Default |
//! |----------|---------|---------|
//! | `COPY_BLOB_RETRY_COUNT` | attempts for a monolithic blob copy | 5 |
//! | `COPY_CHUNK_RETRY_COUNT` | attempts for a chunked blob copy | 5 |
//! | `REPLICATION_CHUNK_SIZE` | chunk size in bytes | 10 MiB |
//!
//! Values that are missing, unparsable or below one fall back to the default.

use crate::error::Result;
use config::{Config as ConfigRs, Environment};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::OnceLock;


pub const DEFAULT_BLOB_RETRY_COUNT: u32 = 5;
pub const DEFAULT_CHUNK_RETRY_COUNT: u32 = 5;
pub const DEFAULT_CHUNK_SIZE: u64 = 10 * 1024 * 1024;

static GLOBAL: OnceLock<Tunables> = OnceLock::new();

/// Retry counts and chunk size used by the blob copiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tunables {
    pub blob_retry_count: u32,
    pub chunk_retry_count: u32,
    pub chunk_size: u64,
}

impl Default for Tunables {
    fn default() -> Self {
        Self {
            blob_retry_count: DEFAULT_BLOB_RETRY_COUNT,
            chunk_retry_count: DEFAULT_CHUNK_RETRY_COUNT,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

/// Raw view of the environment. Values stay strings so one bad variable
/// cannot poison the other two.
#[derive(Debug, Default, Deserialize)]
struct RawTunables {
    copy_blob_retry_count: Option<String>,
    copy_chunk_retry_count: Option<String>,
    replication_chunk_size: Option<String>,
}

impl Tunables {
    /// Returns the process-wide snapshot, reading the environment on first call.
    pub fn global() -> Tunables {
        *GLOBAL.get_or_init(|| {
            Self::from_env().unwrap_or_else(|e| {
                tracing::warn!(error = %e, "failed to read transfer tunables, using defaults");
                Self::default()
            })
        })
    }

    /// Reads the tunables from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_source(None)
    }

    /// Reads the tunables from an explicit variable map instead of the
    /// process environment.
    ///
    /// # Examples
    ///
    /// ```
    /// use libreplica::config::Tunables;
    /// use std::collections::HashMap;
    ///
    /// let vars = HashMap::from([("REPLICATION_CHUNK_SIZE".to_string(), "1024".to_string())]);
    /// let tunables = Tunables::from_map(vars).unwrap();
    /// assert_eq!(tunables.chunk_size, 1024);
    /// assert_eq!(tunables.blob_retry_count, 5);
    /// ```
    pub fn from_map(vars: HashMap<String, String>) -> Result<Self> {
        Self::from_source(Some(vars))
    }

    fn from_source(vars: Option<HashMap<String, String>>) -> Result<Self> {
        let raw: RawTunables = ConfigRs::builder()
            .add_source(Environment::default().source(vars))
            .build()?
            .try_deserialize()?;

        Ok(Self {
            blob_retry_count: at_least_one(raw.copy_blob_retry_count, DEFAULT_BLOB_RETRY_COUNT),
            chunk_retry_count: at_least_one(
                raw.copy_chunk_retry_count,
                DEFAULT_CHUNK_RETRY_COUNT,
            ),
            chunk_size: at_least_one(raw.replication_chunk_size, DEFAULT_CHUNK_SIZE),
        })
    }
}

fn at_least_one<T>(value: Option<String>, default: T) -> T
where
    T: std::str::FromStr + PartialOrd + From<u8>,
{
    value
        .and_then(|v| v.trim().parse::<T>().ok())
        .filter(|v| *v >= T::from(1))
        .unwrap_or(default)
}
