use std::fmt;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info, warn};

use clientele_core::{DiscoveryError, ServiceRegistration};

use crate::registry::ServiceRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Stopped,
    Starting,
    Registering,
    Running,
    Stopping,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LifecycleState::Stopped => "stopped",
            LifecycleState::Starting => "starting",
            LifecycleState::Registering => "registering",
            LifecycleState::Running => "running",
            LifecycleState::Stopping => "stopping",
        };
        f.write_str(s)
    }
}

/// Fixed-delay, fixed-count registration retry.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Wait before the first attempt so the registry can finish booting.
    pub grace: Duration,
    pub attempts: u32,
    /// Pause after every failed attempt, the last one included.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            grace: Duration::from_secs(5),
            attempts: 5,
            delay: Duration::from_secs(5),
        }
    }
}

/// Owns this process's registry identity and drives it through
/// `Stopped -> Starting -> Registering -> Running -> Stopping -> Stopped`.
pub struct LifecycleCoordinator {
    registry: Arc<dyn ServiceRegistry>,
    policy: RetryPolicy,
    identity: OnceLock<ServiceRegistration>,
    state: watch::Sender<LifecycleState>,
}

impl LifecycleCoordinator {
    pub fn new(registry: Arc<dyn ServiceRegistry>, policy: RetryPolicy) -> Self {
        let (state, _) = watch::channel(LifecycleState::Stopped);
        Self {
            registry,
            policy,
            identity: OnceLock::new(),
            state,
        }
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.state.subscribe()
    }

    pub fn registration(&self) -> Option<&ServiceRegistration> {
        self.identity.get()
    }

    /// Registers with the registry, retrying per the policy.
    ///
    /// Returns only once registration succeeded (`Running`) or every attempt
    /// failed (`RegistrationExhausted`, back to `Stopped`). The caller must
    /// not serve traffic on error.
    pub async fn start(&self, registration: ServiceRegistration) -> Result<(), DiscoveryError> {
        self.transition(LifecycleState::Stopped, LifecycleState::Starting)?;

        let identity = self.identity.get_or_init(|| registration);
        info!(instance_id = %identity.instance_id, "starting registry lifecycle");

        self.state.send_replace(LifecycleState::Registering);
        tokio::time::sleep(self.policy.grace).await;

        for attempt in 1..=self.policy.attempts {
            if self.registry.register(identity).await {
                info!(instance_id = %identity.instance_id, attempt, "registered with registry");
                self.state.send_replace(LifecycleState::Running);
                return Ok(());
            }
            warn!(
                attempt,
                max = self.policy.attempts,
                "registration attempt failed, retrying"
            );
            tokio::time::sleep(self.policy.delay).await;
        }

        error!(
            attempts = self.policy.attempts,
            "failed to register after all retries"
        );
        self.state.send_replace(LifecycleState::Stopped);
        Err(DiscoveryError::RegistrationExhausted {
            attempts: self.policy.attempts,
        })
    }

    /// Deregisters if running. Never fails: the registry reaps entries whose
    /// health check stays critical, so a failed deregister only delays cleanup.
    pub async fn stop(&self) {
        if self
            .transition(LifecycleState::Running, LifecycleState::Stopping)
            .is_err()
        {
            info!(state = %self.state(), "lifecycle not running, nothing to deregister");
            return;
        }

        if let Some(identity) = self.identity.get() {
            if self.registry.deregister(&identity.instance_id).await {
                info!(instance_id = %identity.instance_id, "deregistered from registry");
            } else {
                warn!(instance_id = %identity.instance_id, "deregistration failed, registry will reap the entry");
            }
        }
        self.state.send_replace(LifecycleState::Stopped);
    }

    fn transition(&self, from: LifecycleState, to: LifecycleState) -> Result<(), DiscoveryError> {
        let mut current = from;
        let moved = self.state.send_if_modified(|state| {
            current = *state;
            if *state == from {
                *state = to;
                true
            } else {
                false
            }
        });
        if moved {
            Ok(())
        } else {
            Err(DiscoveryError::InvalidTransition {
                from: current.to_string(),
                to: to.to_string(),
            })
        }
    }
}
