//! Step primitives
//!
//! Each primitive takes the still-pending part of a batch and returns one
//! result per node. Nodes are handled concurrently, at most `parallelism`
//! at a time, in no particular order. `wait_reboot` is the exception: every
//! pending node waits at once against one deadline, and only the prober's
//! own cap limits the sockets in flight.

use crate::network::{CommandNetwork, KeyDistributor, VlanSwitcher};
use crate::step::{KeyDistribution, ProbeStyle, PxeSwitchKind, Step, TargetState};
use crate::wait::{wait_reboot, WaitOutcome, WaitPolicy};
use fleetboot_bmc::{EscalationLevel, PowerMode, PowerState};
use fleetboot_common::{FleetConfig, Node};
use fleetboot_ipxe::PxeSwitcher;
use fleetboot_probe::{Reachability, TcpProber};
use futures::stream::{self, StreamExt};
use std::future::Future;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Default number of nodes one step handles at once
pub const DEFAULT_PARALLELISM: usize = 64;

/// Result of one primitive on one node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepResult {
    Done,
    /// Status query answered; never a failure
    Observed(PowerState),
    Failed(String),
    TimedOut,
}

impl StepResult {
    fn from_outcome<E: std::fmt::Display>(node: &str, step: &str, result: Result<(), E>) -> Self {
        match result {
            Ok(()) => StepResult::Done,
            Err(e) => {
                warn!(node, step, error = %e, "Primitive failed");
                StepResult::Failed(e.to_string())
            }
        }
    }
}

/// The primitive set, bound to its external collaborators
pub struct StepPrimitives {
    pxe: Arc<dyn PxeSwitcher>,
    vlan: Arc<dyn VlanSwitcher>,
    keys: Arc<dyn KeyDistributor>,
    prober: Arc<dyn Reachability>,
    wait: WaitPolicy,
    parallelism: usize,
}

impl StepPrimitives {
    pub fn new(
        pxe: Arc<dyn PxeSwitcher>,
        vlan: Arc<dyn VlanSwitcher>,
        keys: Arc<dyn KeyDistributor>,
        prober: Arc<dyn Reachability>,
    ) -> Self {
        Self {
            pxe,
            vlan,
            keys,
            prober,
            wait: WaitPolicy::default(),
            parallelism: DEFAULT_PARALLELISM,
        }
    }

    /// Wire the primitives to the collaborators described by a configuration
    pub fn from_config(config: &FleetConfig) -> Self {
        let network = Arc::new(
            CommandNetwork::new(&config.network).with_timeout(config.reboot.command_timeout()),
        );
        let prober = Arc::new(TcpProber::with_max_outstanding(
            config.probe.connect_timeout(),
            config.probe.max_outstanding,
        ));

        Self::new(
            Arc::new(config.pxe.switcher()),
            network.clone(),
            network,
            prober,
        )
        .with_wait_policy(WaitPolicy::from(&config.reboot))
        .with_parallelism(config.reboot.parallelism)
    }

    pub fn with_wait_policy(mut self, wait: WaitPolicy) -> Self {
        self.wait = wait;
        self
    }

    /// Bound the number of nodes handled at once by one step
    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism.max(1);
        self
    }

    pub fn wait_policy(&self) -> &WaitPolicy {
        &self.wait
    }

    /// Apply one step to a batch
    pub async fn apply(
        &self,
        step: &Step,
        batch: &[Node],
        level: EscalationLevel,
        pinned_profile: Option<&str>,
    ) -> Vec<(String, StepResult)> {
        debug!(%step, nodes = batch.len(), %level, "Applying step");
        match *step {
            Step::Power { mode } => self.power(batch, mode, level).await,
            Step::Reboot => self.reboot(batch, level).await,
            Step::SetVlan => self.set_vlan(batch).await,
            Step::SwitchPxe { profile } => self.switch_pxe(batch, profile, pinned_profile).await,
            Step::WaitReboot { style, target } => self.wait_reboot(batch, style, target).await,
            Step::SendKey { distribution } => self.send_key(batch, distribution).await,
        }
    }

    pub async fn power(
        &self,
        batch: &[Node],
        mode: PowerMode,
        level: EscalationLevel,
    ) -> Vec<(String, StepResult)> {
        self.fan_out(batch, |node| async move {
            let bindings = &node.bindings;
            match mode {
                PowerMode::On => {
                    StepResult::from_outcome(&node.hostname, "power", bindings.power_on(level).await)
                }
                PowerMode::Off => {
                    StepResult::from_outcome(&node.hostname, "power", bindings.power_off(level).await)
                }
                PowerMode::Status => match bindings.power_status().await {
                    Ok(state) => StepResult::Observed(state),
                    Err(e) => {
                        debug!(node = %node.hostname, error = %e, "Power status unavailable");
                        StepResult::Observed(PowerState::Unknown)
                    }
                },
            }
        })
        .await
    }

    pub async fn reboot(&self, batch: &[Node], level: EscalationLevel) -> Vec<(String, StepResult)> {
        self.fan_out(batch, |node| async move {
            StepResult::from_outcome(&node.hostname, "reboot", node.bindings.reboot(level).await)
        })
        .await
    }

    pub async fn set_vlan(&self, batch: &[Node]) -> Vec<(String, StepResult)> {
        self.fan_out(batch, |node| async move {
            StepResult::from_outcome(&node.hostname, "set_vlan", self.vlan.set_vlan(node).await)
        })
        .await
    }

    pub async fn switch_pxe(
        &self,
        batch: &[Node],
        kind: PxeSwitchKind,
        pinned_profile: Option<&str>,
    ) -> Vec<(String, StepResult)> {
        let Some(profile) = kind.profile(pinned_profile) else {
            return batch
                .iter()
                .map(|node| {
                    (
                        node.hostname.clone(),
                        StepResult::Failed("no pinned profile given".to_string()),
                    )
                })
                .collect();
        };
        let profile = &profile;

        self.fan_out(batch, |node| async move {
            StepResult::from_outcome(
                &node.hostname,
                "switch_pxe",
                self.pxe.switch(&node.hostname, profile).await,
            )
        })
        .await
    }

    pub async fn wait_reboot(
        &self,
        batch: &[Node],
        style: ProbeStyle,
        target: TargetState,
    ) -> Vec<(String, StepResult)> {
        let deadline = Instant::now() + self.wait.timeout;
        self.fan_out_bounded(batch, batch.len(), |node| async move {
            match wait_reboot(
                self.prober.as_ref(),
                node.probe_target(),
                style,
                target,
                &self.wait,
                deadline,
            )
            .await
            {
                WaitOutcome::Ready => StepResult::Done,
                WaitOutcome::TimedOut => {
                    warn!(node = %node.hostname, timeout = ?self.wait.timeout, "Node did not come back");
                    StepResult::TimedOut
                }
            }
        })
        .await
    }

    pub async fn send_key(
        &self,
        batch: &[Node],
        distribution: KeyDistribution,
    ) -> Vec<(String, StepResult)> {
        match distribution {
            KeyDistribution::Tree if self.keys.has_tree() => {
                let result = match self.keys.deliver_tree(batch).await {
                    Ok(()) => StepResult::Done,
                    Err(e) => {
                        warn!(nodes = batch.len(), error = %e, "Tree key delivery failed");
                        StepResult::Failed(e.to_string())
                    }
                };
                batch
                    .iter()
                    .map(|node| (node.hostname.clone(), result.clone()))
                    .collect()
            }
            _ => {
                if distribution == KeyDistribution::Tree {
                    debug!(nodes = batch.len(), "No delivery tree, sending keys one node at a time");
                }
                self.fan_out(batch, |node| async move {
                    StepResult::from_outcome(
                        &node.hostname,
                        "send_key",
                        self.keys.deliver_direct(node).await,
                    )
                })
                .await
            }
        }
    }

    async fn fan_out<'a, F, Fut>(&self, batch: &'a [Node], op: F) -> Vec<(String, StepResult)>
    where
        F: Fn(&'a Node) -> Fut,
        Fut: Future<Output = StepResult>,
    {
        self.fan_out_bounded(batch, self.parallelism, op).await
    }

    async fn fan_out_bounded<'a, F, Fut>(
        &self,
        batch: &'a [Node],
        limit: usize,
        op: F,
    ) -> Vec<(String, StepResult)>
    where
        F: Fn(&'a Node) -> Fut,
        Fut: Future<Output = StepResult>,
    {
        let pending: Vec<_> = batch
            .iter()
            .map(|node| {
                let result = op(node);
                async move { (node.hostname.clone(), result.await) }
            })
            .collect();
        stream::iter(pending)
            .buffer_unordered(limit.max(1))
            .collect()
            .await
    }
}

impl std::fmt::Debug for StepPrimitives {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepPrimitives")
            .field("wait", &self.wait)
            .field("parallelism", &self.parallelism)
            .finish_non_exhaustive()
    }
}
