//! Fleetboot iPXE Profiles
//!
//! This crate decides which boot artifact a node fetches at its next
//! network boot. A node's profile is an iPXE script kept under the profile
//! directory, one file per node; switching a node's profile rewrites that
//! file before the node is rebooted.
//!
//! # Boot Profiles
//!
//! - **Production**: boot the node's production environment from local disk
//! - **DeployEnv**: boot the network-loaded deployment environment
//! - **Deployed**: boot the freshly recorded environment from local disk
//! - **Pinned**: chain to a named profile served by the boot server
//!
//! # Example
//!
//! ```
//! use fleetboot_ipxe::{BootProfile, IpxeConfig, IpxeScriptGenerator};
//!
//! let config = IpxeConfig::new("http://10.0.0.1:8080")
//!     .with_console("ttyS0,115200")
//!     .with_verbose(true);
//!
//! let generator = IpxeScriptGenerator::new(config);
//! let script = generator.generate(&BootProfile::DeployEnv, "node-1").unwrap();
//!
//! assert!(script.contains("#!ipxe"));
//! ```

pub mod error;
pub mod script;
pub mod switcher;

pub use error::*;
pub use script::*;
pub use switcher::*;
