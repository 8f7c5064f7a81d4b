//! Per-call options with shared defaults.
//!
//! One primitive operation per behavior plus an options value with a
//! `DEFAULT` constant replaces the pile of near-duplicate convenience
//! overloads found in comparable cache APIs.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Bitset of per-call behavior modifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheFlags(u32);

impl CacheFlags {
    pub const NONE: CacheFlags = CacheFlags(0);
    /// Suppress event emission for this call.
    pub const SKIP_LISTENER_NOTIFICATION: CacheFlags = CacheFlags(1);

    pub const fn contains(self, other: CacheFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn with(self, other: CacheFlags) -> CacheFlags {
        CacheFlags(self.0 | other.0)
    }
}

/// Options for read-side and unconditional operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheOptions {
    pub flags: CacheFlags,
}

impl CacheOptions {
    pub const DEFAULT: CacheOptions = CacheOptions { flags: CacheFlags::NONE };

    pub const fn with_flags(flags: CacheFlags) -> Self {
        CacheOptions { flags }
    }

    pub fn skip_notifications(&self) -> bool {
        self.flags.contains(CacheFlags::SKIP_LISTENER_NOTIFICATION)
    }
}

/// Options for write operations: flags plus an optional expiry override.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheWriteOptions {
    pub flags: CacheFlags,
    /// Lifespan override for the written entry; `None` uses the cache default.
    pub time_to_live: Option<Duration>,
    /// Max-idle override for the written entry.
    pub max_idle: Option<Duration>,
}

impl CacheWriteOptions {
    pub const DEFAULT: CacheWriteOptions = CacheWriteOptions { flags: CacheFlags::NONE, time_to_live: None, max_idle: None };

    pub const fn with_ttl(time_to_live: Duration) -> Self {
        CacheWriteOptions { flags: CacheFlags::NONE, time_to_live: Some(time_to_live), max_idle: None }
    }

    pub fn skip_notifications(&self) -> bool {
        self.flags.contains(CacheFlags::SKIP_LISTENER_NOTIFICATION)
    }

    /// The read-side view of these options.
    pub fn read_options(&self) -> CacheOptions {
        CacheOptions { flags: self.flags }
    }
}

/// Options for server-side entry processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheProcessorOptions {
    pub write: CacheWriteOptions,
}

impl CacheProcessorOptions {
    pub const DEFAULT: CacheProcessorOptions = CacheProcessorOptions { write: CacheWriteOptions::DEFAULT };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_combine() {
        let flags = CacheFlags::NONE.with(CacheFlags::SKIP_LISTENER_NOTIFICATION);
        assert!(flags.contains(CacheFlags::SKIP_LISTENER_NOTIFICATION));
        assert!(!CacheFlags::NONE.contains(CacheFlags::SKIP_LISTENER_NOTIFICATION));
    }

    #[test]
    fn test_default_options_quiet() {
        assert!(!CacheOptions::DEFAULT.skip_notifications());
        assert!(!CacheWriteOptions::DEFAULT.skip_notifications());
    }

    #[test]
    fn test_write_options_ttl() {
        let opts = CacheWriteOptions::with_ttl(Duration::from_secs(30));
        assert_eq!(opts.time_to_live, Some(Duration::from_secs(30)));
        assert_eq!(opts.read_options(), CacheOptions::DEFAULT);
    }
}
