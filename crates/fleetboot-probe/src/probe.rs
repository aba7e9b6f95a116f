//! TCP reachability probes
//!
//! A probe races a TCP connect against a timer. The connect future is owned
//! by the race, so when the timer wins the attempt is dropped (which closes
//! the socket) instead of being awaited.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tracing::{debug, trace};

/// Cap on connection attempts in flight at once for a single prober
pub const DEFAULT_MAX_OUTSTANDING: usize = 512;

/// Outcome of a single probe against one `(host, port)` pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeOutcome {
    /// TCP handshake completed
    Open,
    /// Host answered with a reset: it is up but nothing listens on the port
    Refused,
    /// Host or network did not answer at the network layer
    Unreachable,
    /// Deadline expired before the connect attempt resolved
    TimedOut,
}

impl ProbeOutcome {
    /// Whether the port accepted the connection
    pub fn is_open(&self) -> bool {
        matches!(self, ProbeOutcome::Open)
    }
}

impl std::fmt::Display for ProbeOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProbeOutcome::Open => write!(f, "open"),
            ProbeOutcome::Refused => write!(f, "refused"),
            ProbeOutcome::Unreachable => write!(f, "unreachable"),
            ProbeOutcome::TimedOut => write!(f, "timed_out"),
        }
    }
}

/// Anything that can tell whether a node's port accepts connections
///
/// The wait-for-reboot primitive only talks to this trait, so tests can
/// drive it with a scripted fake instead of real sockets.
#[async_trait]
pub trait Reachability: Send + Sync {
    /// Probe one port, returning within `timeout` (plus scheduling jitter)
    async fn probe(&self, host: &str, port: u16, timeout: Duration) -> ProbeOutcome;

    /// Per-probe deadline used by [`Reachability::all_ports_accept`]
    fn connect_timeout(&self) -> Duration;

    /// Check that every port matches the expected polarity
    ///
    /// With `expect_accept` every port must be open; without it no port may
    /// accept. Stops at the first mismatch. `Unreachable` is a failure
    /// for either polarity, since a silent host proves nothing about its ports.
    async fn all_ports_accept(&self, host: &str, ports: &[u16], expect_accept: bool) -> bool {
        let deadline = self.connect_timeout();
        for &port in ports {
            let outcome = self.probe(host, port, deadline).await;
            let matched = match outcome {
                ProbeOutcome::Unreachable => false,
                ProbeOutcome::Open => expect_accept,
                ProbeOutcome::Refused | ProbeOutcome::TimedOut => !expect_accept,
            };
            if !matched {
                trace!(host, port, %outcome, expect_accept, "Port polarity mismatch");
                return false;
            }
        }
        true
    }
}

/// Prober backed by real TCP connects
#[derive(Debug, Clone)]
pub struct TcpProber {
    connect_timeout: Duration,
    permits: Arc<Semaphore>,
}

impl TcpProber {
    /// Create a prober with the default outstanding-probe cap
    pub fn new(connect_timeout: Duration) -> Self {
        Self::with_max_outstanding(connect_timeout, DEFAULT_MAX_OUTSTANDING)
    }

    /// Create a prober allowing at most `max_outstanding` connects in flight
    pub fn with_max_outstanding(connect_timeout: Duration, max_outstanding: usize) -> Self {
        Self {
            connect_timeout,
            permits: Arc::new(Semaphore::new(max_outstanding.max(1))),
        }
    }

    /// Number of probe slots currently free
    pub fn available_slots(&self) -> usize {
        self.permits.available_permits()
    }

    async fn connect(&self, host: &str, port: u16) -> ProbeOutcome {
        // Waiting for a slot counts against the caller's deadline.
        if self.available_slots() == 0 {
            trace!(host, port, "All probe slots busy, queueing");
        }
        let Ok(_permit) = self.permits.acquire().await else {
            return ProbeOutcome::Unreachable;
        };

        match TcpStream::connect((host, port)).await {
            Ok(stream) => {
                drop(stream);
                ProbeOutcome::Open
            }
            Err(e) => match e.kind() {
                ErrorKind::ConnectionRefused => ProbeOutcome::Refused,
                ErrorKind::TimedOut => ProbeOutcome::TimedOut,
                _ => {
                    debug!(host, port, error = %e, "Connect failed");
                    ProbeOutcome::Unreachable
                }
            },
        }
    }
}

#[async_trait]
impl Reachability for TcpProber {
    async fn probe(&self, host: &str, port: u16, deadline: Duration) -> ProbeOutcome {
        match timeout(deadline, self.connect(host, port)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                trace!(host, port, ?deadline, "Probe deadline expired");
                ProbeOutcome::TimedOut
            }
        }
    }

    fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }
}
