//! The approval channel guardrail.
//!
//! Deny-by-default: an approval is accepted only if it arrived through a
//! channel the gate lists. The gate runs at the service boundary, before the
//! engine is asked to approve anything.

use tracing::warn;

use caravel_contracts::{
    error::{CaravelError, CaravelResult},
    records::Channel,
};

use crate::config::ApprovalConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovalGate {
    trusted: Vec<Channel>,
}

impl ApprovalGate {
    pub fn new(trusted: impl IntoIterator<Item = Channel>) -> Self {
        let mut unique = Vec::new();
        for channel in trusted {
            if !unique.contains(&channel) {
                unique.push(channel);
            }
        }
        Self { trusted: unique }
    }

    pub fn from_config(config: &ApprovalConfig) -> Self {
        Self::new(config.trusted_channels.iter().copied())
    }

    /// A gate that refuses every channel.
    pub fn deny_all() -> Self {
        Self::new([])
    }

    pub fn trusted_channels(&self) -> &[Channel] {
        &self.trusted
    }

    pub fn allows(&self, channel: Channel) -> bool {
        self.trusted.contains(&channel)
    }

    /// `ChannelNotAllowed` unless `channel` is trusted.
    pub fn check(&self, channel: Channel) -> CaravelResult<()> {
        if self.allows(channel) {
            return Ok(());
        }
        warn!(channel = %channel, "approval refused from untrusted channel");
        Err(CaravelError::ChannelNotAllowed { channel })
    }
}

/// Only `web` may approve.
impl Default for ApprovalGate {
    fn default() -> Self {
        Self::from_config(&ApprovalConfig::default())
    }
}
