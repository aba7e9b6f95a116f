//! Macrostep executor
//!
//! Walks a macrostep's step list over a node batch. Steps run strictly in
//! order; each one sees only the nodes still pending. A node that fails or
//! times out is dropped for the rest of the run while the others carry on,
//! and every node of the batch gets a verdict at the end.
//!
//! The fleet view is written only at step boundaries, one node at a time:
//! nodes dropped after their reboot signal went out are set to `unknown`,
//! and nodes finishing a macrostep with a target state are set to it.

use crate::context::ExecutionContext;
use crate::definitions::Macrostep;
use crate::error::{MacrostepError, Result};
use crate::primitives::{StepPrimitives, StepResult};
use crate::step::{ProbeStyle, Step};
use crate::verdict::{MacrostepReport, NodeOutcome, NodeVerdict};
use chrono::Utc;
use fleetboot_bmc::EscalationLevel;
use fleetboot_common::{FleetView, Node, NodeState};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Run arguments beyond the node batch and level
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MacrostepArgs {
    /// Profile pinned by `reboot_set_pxe`
    pub profile: Option<String>,
    /// Nodes reboot through kexec: wait for the boot port to drop first
    pub kexec: bool,
}

impl MacrostepArgs {
    pub fn with_profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = Some(profile.into());
        self
    }

    pub fn with_kexec(mut self, kexec: bool) -> Self {
        self.kexec = kexec;
        self
    }
}

/// Event emitted during a run
#[derive(Debug, Clone)]
pub enum MacrostepEvent {
    Started {
        macrostep: Macrostep,
        level: u8,
        nodes: usize,
    },
    StepStarted {
        macrostep: Macrostep,
        index: usize,
        step: Step,
        pending: usize,
    },
    NodeFailed {
        macrostep: Macrostep,
        node: String,
        outcome: NodeOutcome,
    },
    StepCompleted {
        macrostep: Macrostep,
        index: usize,
        dropped: usize,
    },
    Completed {
        macrostep: Macrostep,
        succeeded: usize,
        failed: usize,
    },
}

/// Macrostep engine
pub struct MacrostepExecutor {
    primitives: StepPrimitives,
    event_sender: broadcast::Sender<MacrostepEvent>,
}

impl MacrostepExecutor {
    pub fn new(primitives: StepPrimitives) -> Self {
        let (event_sender, _) = broadcast::channel(1024);
        Self {
            primitives,
            event_sender,
        }
    }

    /// Subscribe to run events
    pub fn subscribe(&self) -> broadcast::Receiver<MacrostepEvent> {
        self.event_sender.subscribe()
    }

    pub fn primitives(&self) -> &StepPrimitives {
        &self.primitives
    }

    /// Run a macrostep looked up by name
    pub async fn run_named(
        &self,
        ctx: &ExecutionContext,
        name: &str,
        level: i64,
        args: &MacrostepArgs,
    ) -> Result<MacrostepReport> {
        let macrostep: Macrostep = name.parse()?;
        self.run(ctx, macrostep, level, args).await
    }

    /// Run a macrostep over the context's node batch
    ///
    /// Fails only before any primitive runs: bad level, empty batch,
    /// missing argument or denied rights. Everything that goes wrong for a
    /// single node afterwards ends up in that node's verdict.
    pub async fn run(
        &self,
        ctx: &ExecutionContext,
        macrostep: Macrostep,
        level: i64,
        args: &MacrostepArgs,
    ) -> Result<MacrostepReport> {
        let escalation = u8::try_from(level)
            .ok()
            .and_then(EscalationLevel::from_level)
            .ok_or(MacrostepError::InvalidLevel(level))?;
        if ctx.nodes.is_empty() {
            return Err(MacrostepError::EmptyBatch);
        }
        if macrostep.needs_profile() && args.profile.is_none() {
            return Err(MacrostepError::MissingArgument {
                macrostep: macrostep.to_string(),
                argument: "profile",
            });
        }
        ctx.authorize(macrostep.operation()).await?;

        let started_at = Utc::now();
        info!(
            %macrostep,
            user = %ctx.user,
            level = escalation.level(),
            nodes = ctx.nodes.len(),
            "Starting macrostep"
        );
        let _ = self.event_sender.send(MacrostepEvent::Started {
            macrostep,
            level: escalation.level(),
            nodes: ctx.nodes.len(),
        });

        let mut verdicts: BTreeMap<String, NodeVerdict> = ctx
            .nodes
            .iter()
            .map(|node| (node.clone(), NodeVerdict::pending()))
            .collect();
        let mut batch = self.resolve_batch(ctx, macrostep, &mut verdicts);
        let mut signalled: HashSet<String> = HashSet::new();
        // Status queries and other non-rebooting steps leave node state alone.
        let tracks_state = macrostep.mutates_state();

        for (index, step) in macrostep.steps().iter().enumerate() {
            if batch.is_empty() {
                debug!(%macrostep, index, "No pending nodes left");
                break;
            }
            let step = effective_step(step, args);

            let _ = self.event_sender.send(MacrostepEvent::StepStarted {
                macrostep,
                index,
                step,
                pending: batch.len(),
            });

            let results = self
                .primitives
                .apply(&step, &batch, escalation, args.profile.as_deref())
                .await;

            let mut dropped = HashSet::new();
            for (node, result) in results {
                let Some(verdict) = verdicts.get_mut(&node) else {
                    continue;
                };
                match result {
                    StepResult::Done => {}
                    StepResult::Observed(power) => verdict.power = Some(power),
                    StepResult::Failed(reason) => {
                        verdict.outcome = NodeOutcome::Failed {
                            step: Some(index),
                            kind: Some(step.kind().to_string()),
                            reason,
                        };
                    }
                    StepResult::TimedOut => {
                        verdict.outcome = NodeOutcome::TimedOut { step: index };
                    }
                }
                if !verdict.outcome.is_pending() {
                    let _ = self.event_sender.send(MacrostepEvent::NodeFailed {
                        macrostep,
                        node: node.clone(),
                        outcome: verdict.outcome.clone(),
                    });
                    dropped.insert(node);
                }
            }

            if tracks_state && step.is_reboot() {
                signalled.extend(
                    batch
                        .iter()
                        .filter(|n| !dropped.contains(&n.hostname))
                        .map(|n| n.hostname.clone()),
                );
            }
            for node in dropped.iter().filter(|n| signalled.contains(*n)) {
                record_state(ctx.fleet.as_ref(), node, NodeState::Unknown).await;
            }
            batch.retain(|n| !dropped.contains(&n.hostname));

            info!(
                %macrostep,
                index,
                step = %step,
                dropped = dropped.len(),
                pending = batch.len(),
                "Step completed"
            );
            let _ = self.event_sender.send(MacrostepEvent::StepCompleted {
                macrostep,
                index,
                dropped: dropped.len(),
            });
        }

        for node in &batch {
            if let Some(verdict) = verdicts.get_mut(&node.hostname) {
                verdict.outcome = NodeOutcome::Success;
            }
            if let Some(state) = macrostep.reached_state().filter(|_| tracks_state) {
                record_state(ctx.fleet.as_ref(), &node.hostname, state).await;
            }
        }

        match ctx.fleet.get_states(&ctx.nodes).await {
            Ok(states) => {
                for (node, verdict) in verdicts.iter_mut() {
                    verdict.state = states.get(node).copied().flatten();
                }
            }
            Err(e) => warn!(%macrostep, error = %e, "Could not read back node states"),
        }

        let report = MacrostepReport {
            macrostep,
            level: escalation.level(),
            verdicts,
            started_at,
            finished_at: Utc::now(),
        };
        let succeeded = report.succeeded().len();
        let failed = report.failed().len();
        info!(%macrostep, succeeded, failed, "Macrostep finished");
        let _ = self.event_sender.send(MacrostepEvent::Completed {
            macrostep,
            succeeded,
            failed,
        });

        Ok(report)
    }

    /// Look every requested node up; absent ones fail before step 0
    fn resolve_batch(
        &self,
        ctx: &ExecutionContext,
        macrostep: Macrostep,
        verdicts: &mut BTreeMap<String, NodeVerdict>,
    ) -> Vec<Node> {
        let mut batch = Vec::with_capacity(ctx.nodes.len());
        for name in &ctx.nodes {
            match ctx.fleet.node(name) {
                Some(node) => batch.push(node),
                None => {
                    warn!(%macrostep, node = %name, "Node not in inventory, skipped");
                    let outcome = NodeOutcome::Failed {
                        step: None,
                        kind: None,
                        reason: format!("unknown node: {}", name),
                    };
                    if let Some(verdict) = verdicts.get_mut(name) {
                        verdict.outcome = outcome.clone();
                    }
                    let _ = self.event_sender.send(MacrostepEvent::NodeFailed {
                        macrostep,
                        node: name.clone(),
                        outcome,
                    });
                }
            }
        }
        batch
    }
}

fn effective_step(step: &Step, args: &MacrostepArgs) -> Step {
    match *step {
        Step::WaitReboot { target, .. } if args.kexec => Step::WaitReboot {
            style: ProbeStyle::Kexec,
            target,
        },
        other => other,
    }
}

async fn record_state(fleet: &dyn FleetView, node: &str, state: NodeState) {
    match fleet.set_state(node, state).await {
        Ok(()) => debug!(node, %state, "Node state recorded"),
        Err(e) => error!(node, %state, error = %e, "Failed to record node state"),
    }
}

impl std::fmt::Debug for MacrostepExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MacrostepExecutor")
            .field("primitives", &self.primitives)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{KeyDistributor, VlanSwitcher};
    use crate::wait::WaitPolicy;
    use async_trait::async_trait;
    use fleetboot_bmc::{BmcError, NodeController, NodeOperation, PowerState};
    use fleetboot_common::{MemoryFleet, MemoryRights, NodePattern, Operation, RightsStore};
    use fleetboot_ipxe::{BootProfile, IpxeError, PxeSwitcher};
    use fleetboot_probe::{ProbeOutcome, Reachability};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    type Journal = Arc<Mutex<Vec<String>>>;

    fn entries(journal: &Journal) -> Vec<String> {
        journal.lock().unwrap().clone()
    }

    struct MockController {
        name: String,
        journal: Journal,
    }

    #[async_trait]
    impl NodeController for MockController {
        fn node(&self) -> &str {
            &self.name
        }

        async fn power_on(&self, level: EscalationLevel) -> fleetboot_bmc::Result<()> {
            self.journal
                .lock()
                .unwrap()
                .push(format!("power_on:{}:{}", self.name, level));
            Ok(())
        }

        async fn power_off(&self, _level: EscalationLevel) -> fleetboot_bmc::Result<()> {
            Err(BmcError::Unsupported("power off".to_string()))
        }

        async fn power_status(&self) -> fleetboot_bmc::Result<PowerState> {
            Ok(PowerState::On)
        }

        async fn reboot(&self, level: EscalationLevel) -> fleetboot_bmc::Result<()> {
            self.journal
                .lock()
                .unwrap()
                .push(format!("reboot:{}:{}", self.name, level));
            Ok(())
        }

        fn console_command(&self) -> Option<String> {
            None
        }

        fn supports_operation(&self, _op: NodeOperation) -> bool {
            true
        }
    }

    /// Network side: PXE, VLAN and keys, with optional per-node PXE failures
    struct MockNetwork {
        journal: Journal,
        pxe_failures: HashSet<String>,
    }

    #[async_trait]
    impl PxeSwitcher for MockNetwork {
        async fn switch(&self, node: &str, profile: &BootProfile) -> fleetboot_ipxe::Result<()> {
            if self.pxe_failures.contains(node) {
                return Err(IpxeError::InvalidNode(node.to_string()));
            }
            self.journal
                .lock()
                .unwrap()
                .push(format!("pxe:{}:{}", node, profile));
            Ok(())
        }
    }

    #[async_trait]
    impl VlanSwitcher for MockNetwork {
        async fn set_vlan(&self, node: &Node) -> Result<()> {
            self.journal
                .lock()
                .unwrap()
                .push(format!("vlan:{}", node.hostname));
            Ok(())
        }
    }

    #[async_trait]
    impl KeyDistributor for MockNetwork {
        async fn deliver_direct(&self, node: &Node) -> Result<()> {
            self.journal
                .lock()
                .unwrap()
                .push(format!("key:{}", node.hostname));
            Ok(())
        }

        async fn deliver_tree(&self, nodes: &[Node]) -> Result<()> {
            let mut names: Vec<&str> = nodes.iter().map(|n| n.hostname.as_str()).collect();
            names.sort();
            self.journal
                .lock()
                .unwrap()
                .push(format!("key_tree:{}", names.join(",")));
            Ok(())
        }
    }

    /// Hosts in `up` accept on every port; everything else is unreachable
    struct MockProber {
        up: HashSet<String>,
    }

    #[async_trait]
    impl Reachability for MockProber {
        async fn probe(&self, host: &str, _port: u16, _timeout: Duration) -> ProbeOutcome {
            if self.up.contains(host) {
                ProbeOutcome::Open
            } else {
                ProbeOutcome::Unreachable
            }
        }

        fn connect_timeout(&self) -> Duration {
            Duration::from_millis(100)
        }
    }

    struct Setup {
        journal: Journal,
        fleet: Arc<MemoryFleet>,
        rights: Arc<dyn RightsStore>,
        executor: MacrostepExecutor,
    }

    impl Setup {
        fn new(nodes: &[&str], pxe_failures: &[&str], up: &[&str]) -> Self {
            let journal: Journal = Arc::default();
            let fleet = Arc::new(MemoryFleet::new(nodes.iter().map(|name| {
                Node::new(
                    *name,
                    Arc::new(MockController {
                        name: name.to_string(),
                        journal: journal.clone(),
                    }),
                )
            })));
            let network = Arc::new(MockNetwork {
                journal: journal.clone(),
                pxe_failures: pxe_failures.iter().map(|s| s.to_string()).collect(),
            });
            let prober = Arc::new(MockProber {
                up: up.iter().map(|s| s.to_string()).collect(),
            });
            let primitives = StepPrimitives::new(network.clone(), network.clone(), network, prober)
                .with_wait_policy(
                    WaitPolicy::default()
                        .with_timeout(Duration::from_secs(5))
                        .with_poll_interval(Duration::from_secs(1)),
                );
            let rights: Arc<dyn RightsStore> = Arc::new(
                MemoryRights::new()
                    .grant("alice", Operation::Any, NodePattern::all())
                    .grant("bob", Operation::Power, NodePattern::all()),
            );

            Self {
                journal,
                fleet,
                rights,
                executor: MacrostepExecutor::new(primitives),
            }
        }

        fn context(&self, user: &str, nodes: &[&str]) -> ExecutionContext {
            ExecutionContext::new(
                user,
                self.rights.clone(),
                self.fleet.clone(),
                nodes.iter().copied(),
            )
        }

        async fn state(&self, node: &str) -> Option<NodeState> {
            self.fleet.get_states(&[node.to_string()]).await.unwrap()[node]
        }
    }

    #[tokio::test]
    async fn test_deploy_env_with_one_pxe_failure() {
        let setup = Setup::new(&["a", "b", "c"], &["b"], &["a", "b", "c"]);
        let ctx = setup.context("alice", &["a", "b", "c"]);

        let report = setup
            .executor
            .run(&ctx, Macrostep::RebootDeployEnv, 0, &MacrostepArgs::default())
            .await
            .unwrap();

        assert_eq!(report.verdicts.len(), 3);
        assert_eq!(report.succeeded(), vec!["a", "c"]);
        assert!(matches!(
            &report.verdicts["b"].outcome,
            NodeOutcome::Failed { step: Some(0), kind: Some(kind), .. } if kind == "switch_pxe"
        ));

        // b saw no side effect after its failed step
        let journal = entries(&setup.journal);
        assert!(journal.iter().all(|e| !e.contains(":b")));
        assert!(journal.contains(&"reboot:a:soft".to_string()));
        assert!(journal.contains(&"key_tree:a,c".to_string()));

        assert_eq!(report.verdicts["a"].state, Some(NodeState::DeployEnv));
        assert_eq!(report.verdicts["b"].state, None);
        assert_eq!(setup.state("c").await, Some(NodeState::DeployEnv));
    }

    #[tokio::test]
    async fn test_steps_run_in_order() {
        let setup = Setup::new(&["a"], &[], &["a"]);
        let ctx = setup.context("alice", &["a"]);

        setup
            .executor
            .run(&ctx, Macrostep::RebootRecordedEnv, 1, &MacrostepArgs::default())
            .await
            .unwrap();

        assert_eq!(
            entries(&setup.journal),
            vec!["pxe:a:deployed", "reboot:a:hard", "vlan:a"]
        );
        assert_eq!(setup.state("a").await, Some(NodeState::DeployedEnv));
    }

    #[tokio::test]
    async fn test_set_pxe_needs_profile() {
        let setup = Setup::new(&["a"], &[], &["a"]);
        let ctx = setup.context("alice", &["a"]);

        let err = setup
            .executor
            .run(&ctx, Macrostep::RebootSetPxe, 0, &MacrostepArgs::default())
            .await
            .unwrap_err();
        assert!(matches!(err, MacrostepError::MissingArgument { argument: "profile", .. }));
        assert!(entries(&setup.journal).is_empty());

        let report = setup
            .executor
            .run(
                &ctx,
                Macrostep::RebootSetPxe,
                0,
                &MacrostepArgs::default().with_profile("rescue"),
            )
            .await
            .unwrap();
        assert!(report.all_succeeded());
        assert_eq!(entries(&setup.journal)[0], "pxe:a:pinned:rescue");
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_after_reboot_sets_unknown() {
        let setup = Setup::new(&["up", "down"], &[], &["up"]);
        setup
            .fleet
            .set_state("down", NodeState::Production)
            .await
            .unwrap();
        let ctx = setup.context("alice", &["up", "down"]);

        let report = setup
            .executor
            .run(&ctx, Macrostep::RebootSimple, 0, &MacrostepArgs::default())
            .await
            .unwrap();

        assert_eq!(report.verdicts["up"].outcome, NodeOutcome::Success);
        assert_eq!(
            report.verdicts["down"].outcome,
            NodeOutcome::TimedOut { step: 2 }
        );
        assert_eq!(report.verdicts["down"].state, Some(NodeState::Unknown));
        // RebootSimple has no target state
        assert_eq!(report.verdicts["up"].state, None);
    }

    #[tokio::test]
    async fn test_unknown_node_gets_verdict() {
        let setup = Setup::new(&["a"], &[], &["a"]);
        let ctx = setup.context("alice", &["a", "ghost"]);

        let report = setup
            .executor
            .run(&ctx, Macrostep::PowerOn, 2, &MacrostepArgs::default())
            .await
            .unwrap();

        assert_eq!(report.verdicts.len(), ctx.nodes.len());
        assert!(report.verdicts["a"].outcome.is_success());
        assert!(matches!(
            &report.verdicts["ghost"].outcome,
            NodeOutcome::Failed { step: None, reason, .. } if reason == "unknown node: ghost"
        ));
        assert_eq!(entries(&setup.journal), vec!["power_on:a:very_hard"]);
    }

    #[tokio::test]
    async fn test_power_status_does_not_touch_state() {
        let setup = Setup::new(&["a", "b"], &[], &[]);
        setup.fleet.set_state("a", NodeState::DeployEnv).await.unwrap();
        let ctx = setup.context("bob", &["a", "b"]);

        for _ in 0..2 {
            let report = setup
                .executor
                .run(&ctx, Macrostep::PowerStatus, 0, &MacrostepArgs::default())
                .await
                .unwrap();
            assert!(report.all_succeeded());
            assert_eq!(report.verdicts["a"].power, Some(PowerState::On));
            assert_eq!(report.verdicts["a"].state, Some(NodeState::DeployEnv));
            assert_eq!(report.verdicts["b"].state, None);
        }
    }

    #[tokio::test]
    async fn test_power_failure_is_per_node() {
        let setup = Setup::new(&["a"], &[], &[]);
        let ctx = setup.context("bob", &["a"]);

        let report = setup
            .executor
            .run(&ctx, Macrostep::PowerOff, 0, &MacrostepArgs::default())
            .await
            .unwrap();
        assert_eq!(report.failed(), vec!["a"]);
        // no reboot was signalled, so state is left alone
        assert_eq!(report.verdicts["a"].state, None);
    }

    #[tokio::test]
    async fn test_denied_rights_run_nothing() {
        let setup = Setup::new(&["a"], &[], &["a"]);
        setup.fleet.set_state("a", NodeState::Production).await.unwrap();
        let ctx = setup.context("bob", &["a"]);
        let mut events = setup.executor.subscribe();

        let err = setup
            .executor
            .run(&ctx, Macrostep::RebootDeployEnv, 0, &MacrostepArgs::default())
            .await
            .unwrap_err();

        assert!(matches!(err, MacrostepError::AuthorizationDenied { .. }));
        assert!(entries(&setup.journal).is_empty());
        assert_eq!(setup.state("a").await, Some(NodeState::Production));
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_rejected_before_running() {
        let setup = Setup::new(&["a"], &[], &["a"]);
        let args = MacrostepArgs::default();

        for level in [-1, 3, 256] {
            let err = setup
                .executor
                .run(&setup.context("alice", &["a"]), Macrostep::RebootSimple, level, &args)
                .await
                .unwrap_err();
            assert!(matches!(err, MacrostepError::InvalidLevel(l) if l == level));
        }

        let err = setup
            .executor
            .run(&setup.context("alice", &[]), Macrostep::RebootSimple, 0, &args)
            .await
            .unwrap_err();
        assert!(matches!(err, MacrostepError::EmptyBatch));

        let err = setup
            .executor
            .run_named(&setup.context("alice", &["a"]), "reboot_twice", 0, &args)
            .await
            .unwrap_err();
        assert!(matches!(err, MacrostepError::UnknownMacrostep(_)));
        assert!(entries(&setup.journal).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_events() {
        let setup = Setup::new(&["a", "b"], &["b"], &["a"]);
        let ctx = setup.context("alice", &["a", "b"]);
        let mut receiver = setup.executor.subscribe();

        let report = setup
            .executor
            .run(&ctx, Macrostep::RebootDeployEnv, 0, &MacrostepArgs::default())
            .await
            .unwrap();
        assert_eq!(report.succeeded(), vec!["a"]);

        let mut events = Vec::new();
        while let Ok(event) = receiver.try_recv() {
            events.push(event);
        }

        assert!(matches!(events.first(), Some(MacrostepEvent::Started { nodes: 2, .. })));
        assert!(events.iter().any(|e| matches!(
            e,
            MacrostepEvent::NodeFailed { node, .. } if node == "b"
        )));
        let started = events
            .iter()
            .filter(|e| matches!(e, MacrostepEvent::StepStarted { .. }))
            .count();
        assert_eq!(started, Macrostep::RebootDeployEnv.steps().len());
        assert!(matches!(
            events.last(),
            Some(MacrostepEvent::Completed { succeeded: 1, failed: 1, .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_kexec_argument_changes_wait_style() {
        // "a" accepts from the start, so kexec never sees its boot port drop.
        let setup = Setup::new(&["a"], &[], &["a"]);
        let ctx = setup.context("alice", &["a"]);

        let report = setup
            .executor
            .run(
                &ctx,
                Macrostep::RebootSimple,
                0,
                &MacrostepArgs::default().with_kexec(true),
            )
            .await
            .unwrap();
        assert_eq!(report.verdicts["a"].outcome, NodeOutcome::TimedOut { step: 2 });
    }
}
