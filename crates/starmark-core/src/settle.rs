//! Waiting for the host to finish propagating a state change.
//!
//! The host gives no completion signal for chat creation, switching or
//! clearing, so the preview flow waits a fixed time after each of them.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::trace;

/// Host calls that are followed by a settle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostOp {
    CreateChat,
    SwitchChat,
    ClearChat,
    AppendMessage,
}

/// Waits until the host has caught up with the last call.
#[async_trait]
pub trait Settle: Send + Sync {
    async fn settle(&self, after: HostOp);
}

/// Settle delays in milliseconds, per operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct SettleConfig {
    #[serde(default = "default_after_create_ms")]
    pub after_create_ms: u64,
    #[serde(default = "default_after_switch_ms")]
    pub after_switch_ms: u64,
    #[serde(default = "default_after_clear_ms")]
    pub after_clear_ms: u64,
    #[serde(default = "default_between_appends_ms")]
    pub between_appends_ms: u64,
}

fn default_after_create_ms() -> u64 {
    500
}

fn default_after_switch_ms() -> u64 {
    500
}

fn default_after_clear_ms() -> u64 {
    300
}

fn default_between_appends_ms() -> u64 {
    100
}

impl Default for SettleConfig {
    fn default() -> Self {
        Self {
            after_create_ms: default_after_create_ms(),
            after_switch_ms: default_after_switch_ms(),
            after_clear_ms: default_after_clear_ms(),
            between_appends_ms: default_between_appends_ms(),
        }
    }
}

/// Sleeps a configured time after each operation.
#[derive(Debug, Clone, Default)]
pub struct FixedDelaySettle {
    config: SettleConfig,
}

impl FixedDelaySettle {
    pub fn new(config: SettleConfig) -> Self {
        Self { config }
    }

    /// Delay applied after `op`.
    pub fn delay_for(&self, op: HostOp) -> Duration {
        let ms = match op {
            HostOp::CreateChat => self.config.after_create_ms,
            HostOp::SwitchChat => self.config.after_switch_ms,
            HostOp::ClearChat => self.config.after_clear_ms,
            HostOp::AppendMessage => self.config.between_appends_ms,
        };
        Duration::from_millis(ms)
    }
}

#[async_trait]
impl Settle for FixedDelaySettle {
    async fn settle(&self, after: HostOp) {
        let delay = self.delay_for(after);
        if !delay.is_zero() {
            trace!(target: "starmark::preview", "Settling {:?} for {:?}", after, delay);
            tokio::time::sleep(delay).await;
        }
    }
}

/// Returns immediately. For hosts whose calls complete synchronously.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSettle;

#[async_trait]
impl Settle for NoSettle {
    async fn settle(&self, _after: HostOp) {}
}
