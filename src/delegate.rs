//! Delegating a resource to a remote agent
//!
//! The transport is pluggable: it hands the descriptor to the named agent
//! and returns a channel on which exactly one outcome will arrive. The
//! delegator waits for it with a bound and never retries.

use crate::config::AgentConfig;
use crate::error::{ConvergeError, Result};
use crate::resource::{Outcome, ResourceDescriptor};
use crossbeam::channel::{Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Carries descriptors to remote agents
pub trait RemoteTransport: Send + Sync {
    /// Submit a descriptor; the outcome arrives on the returned channel
    fn submit(
        &self,
        agent: &str,
        desc: &ResourceDescriptor,
        dry_run: bool,
    ) -> Result<Receiver<Outcome>>;
}

pub struct Delegator {
    transport: Arc<dyn RemoteTransport>,
    timeout: Duration,
}

impl Delegator {
    pub fn new(transport: Arc<dyn RemoteTransport>, timeout: Duration) -> Self {
        Delegator { transport, timeout }
    }

    /// Delegator using the configured delegation timeout
    pub fn from_config(transport: Arc<dyn RemoteTransport>, config: &AgentConfig) -> Self {
        Self::new(transport, config.delegation_timeout())
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Apply a resource on a remote agent and wait for its outcome
    ///
    /// # Errors
    ///
    /// `DelegationTimeout` if no outcome arrives in time, `DelegationClosed`
    /// if the transport drops the channel without answering.
    pub fn apply_remote(&self, agent: &str, desc: &ResourceDescriptor, dry_run: bool) -> Outcome {
        debug!("Delegating '{}' to agent '{}'", desc.id, agent);
        let reply = self.transport.submit(agent, desc, dry_run)?;

        match reply.recv_timeout(self.timeout) {
            Ok(outcome) => outcome,
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    "Agent '{}' did not answer for '{}' within {:?}",
                    agent, desc.id, self.timeout
                );
                Err(ConvergeError::DelegationTimeout {
                    agent: agent.to_string(),
                    secs: self.timeout.as_secs(),
                }
                .into())
            }
            Err(RecvTimeoutError::Disconnected) => {
                Err(ConvergeError::DelegationClosed(agent.to_string()).into())
            }
        }
    }
}
