//! Wait-for-reboot
//!
//! The only primitive that loops. Each node is polled with the prober
//! until it shows the reachability pattern of its target environment or
//! its wait window closes. The window is one deadline shared by the whole
//! batch, fixed when the step starts.

use crate::step::{ProbeStyle, TargetState};
use fleetboot_common::RebootSettings;
use fleetboot_probe::Reachability;
use std::time::Duration;
use tokio::time::{sleep_until, timeout_at, Instant};
use tracing::{debug, trace};

/// Timing and port expectations for `wait_reboot`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitPolicy {
    pub timeout: Duration,
    pub poll_interval: Duration,
    /// Port answering in the user environment, also the kexec boot port
    pub ssh_port: u16,
    pub deploy_agent_port: u16,
    pub user_ports_up: Vec<u16>,
    pub user_ports_down: Vec<u16>,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self::from(&RebootSettings::default())
    }
}

impl From<&RebootSettings> for WaitPolicy {
    fn from(settings: &RebootSettings) -> Self {
        Self {
            timeout: settings.timeout(),
            poll_interval: settings.poll_interval(),
            ssh_port: settings.ssh_port,
            deploy_agent_port: settings.deploy_agent_port,
            user_ports_up: settings.user_ports_up.clone(),
            user_ports_down: settings.user_ports_down.clone(),
        }
    }
}

impl WaitPolicy {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Ports that must accept, and ports that must refuse, in `target`
    pub fn required_ports(&self, target: TargetState) -> (Vec<u16>, Vec<u16>) {
        match target {
            TargetState::User => {
                let mut up = vec![self.ssh_port];
                up.extend(self.user_ports_up.iter().copied());
                (up, self.user_ports_down.clone())
            }
            TargetState::Deploy => (vec![self.deploy_agent_port], Vec::new()),
        }
    }
}

/// How a node's wait ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Ready,
    TimedOut,
}

/// Poll one host until it is ready in `target` or `deadline` passes
pub async fn wait_reboot(
    prober: &dyn Reachability,
    host: &str,
    style: ProbeStyle,
    target: TargetState,
    policy: &WaitPolicy,
    deadline: Instant,
) -> WaitOutcome {
    let (up, down) = policy.required_ports(target);
    let (up, down) = (up.as_slice(), down.as_slice());

    if style == ProbeStyle::Kexec {
        let went_down = poll_until(deadline, policy.poll_interval, move || async move {
            let outcome = prober
                .probe(host, policy.ssh_port, prober.connect_timeout())
                .await;
            trace!(host, %outcome, "Waiting for boot port to close");
            !outcome.is_open()
        })
        .await;
        if !went_down {
            debug!(host, "Boot port never closed");
            return WaitOutcome::TimedOut;
        }
    }

    let ready = poll_until(deadline, policy.poll_interval, move || async move {
        prober.all_ports_accept(host, up, true).await
            && prober.all_ports_accept(host, down, false).await
    })
    .await;

    if ready {
        debug!(host, ?target, "Node ready");
        WaitOutcome::Ready
    } else {
        debug!(host, ?target, timeout = ?policy.timeout, "Node did not come back in time");
        WaitOutcome::TimedOut
    }
}

/// Run `check` every `interval` until it holds or `deadline` passes
///
/// A check still in flight at the deadline is dropped.
async fn poll_until<F, Fut>(deadline: Instant, interval: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    loop {
        match timeout_at(deadline, check()).await {
            Ok(true) => return true,
            Ok(false) => {}
            Err(_) => return false,
        }

        let now = Instant::now();
        if now >= deadline {
            return false;
        }
        sleep_until((now + interval).min(deadline)).await;
    }
}
