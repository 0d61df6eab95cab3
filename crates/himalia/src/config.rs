/*
 * config.rs
 *
 * Copyright (C) 2024 Posit Software, PBC. All rights reserved.
 *
 */

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use crate::error::Error;

/// Tunables of the protocol core. Every field has a default, so a config file
/// only needs to name what it changes.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct KernelConfig {
    /// How long an interrupted backend call may keep running before its
    /// result is abandoned and the request is answered as aborted
    pub interrupt_grace_ms: u64,

    /// What to do when a message can't be published on IOPub
    pub iopub_retry: RetryPolicy,

    /// How often idle receive loops wake up to check for shutdown
    pub poll_interval_ms: u64,

    /// Period at which buffered stream output is flushed to IOPub
    pub stream_flush_interval_ms: u64,

    /// How long startup waits for a first IOPub subscriber; 0 to not wait
    pub subscription_timeout_ms: u64,

    /// Accept an empty signing key and run unsigned
    pub allow_unsigned: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct RetryPolicy {
    /// Retries after the first failed attempt
    pub attempts: u32,

    /// Pause between attempts
    pub delay_ms: u64,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            interrupt_grace_ms: 5000,
            iopub_retry: RetryPolicy::default(),
            poll_interval_ms: 50,
            stream_flush_interval_ms: 80,
            subscription_timeout_ms: 10_000,
            allow_unsigned: false,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay_ms: 10,
        }
    }
}

impl KernelConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let desc = path.as_ref().display().to_string();
        let file = File::open(&path).map_err(|err| Error::ReadFileFailed(desc.clone(), err))?;
        serde_json::from_reader(BufReader::new(file)).map_err(|err| Error::ParseFileFailed(desc, err))
    }

    pub fn interrupt_grace(&self) -> Duration {
        Duration::from_millis(self.interrupt_grace_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn stream_flush_interval(&self) -> Duration {
        Duration::from_millis(self.stream_flush_interval_ms)
    }

    pub fn subscription_timeout(&self) -> Option<Duration> {
        match self.subscription_timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }
}

impl RetryPolicy {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_keeps_defaults() {
        let config: KernelConfig =
            serde_json::from_str(r#"{ "interrupt_grace_ms": 250, "iopub_retry": { "attempts": 0 } }"#)
                .unwrap();
        assert_eq!(config.interrupt_grace(), Duration::from_millis(250));
        assert_eq!(config.iopub_retry.attempts, 0);
        assert_eq!(config.iopub_retry.delay_ms, 10);
        assert_eq!(config.stream_flush_interval_ms, 80);
        assert!(!config.allow_unsigned);
    }

    #[test]
    fn test_zero_subscription_timeout_disables_waiting() {
        let config = KernelConfig {
            subscription_timeout_ms: 0,
            ..Default::default()
        };
        assert_eq!(config.subscription_timeout(), None);
    }
}
