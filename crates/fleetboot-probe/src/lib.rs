//! Fleetboot Reachability Prober
//!
//! This crate answers one question about a node: does a TCP connection to
//! `(host, port)` succeed right now? Every probe is bounded by a deadline.
//! When the deadline fires first, the in-flight connect is dropped and its
//! eventual outcome is never observed.
//!
//! # Example
//!
//! ```no_run
//! use fleetboot_probe::{ProbeOutcome, Reachability, TcpProber};
//! use std::time::Duration;
//!
//! # async fn example() {
//! let prober = TcpProber::new(Duration::from_secs(2));
//!
//! match prober.probe("node-1.cluster", 22, Duration::from_secs(2)).await {
//!     ProbeOutcome::Open => println!("sshd is up"),
//!     ProbeOutcome::Refused => println!("host up, nothing listening"),
//!     other => println!("not there yet: {other}"),
//! }
//!
//! // Every port must accept
//! let ready = prober.all_ports_accept("node-1.cluster", &[22, 25300], true).await;
//! # let _ = ready;
//! # }
//! ```

pub mod probe;

pub use probe::{ProbeOutcome, Reachability, TcpProber, DEFAULT_MAX_OUTSTANDING};
