//! Per-node profile switching
//!
//! The boot server serves `<profile_dir>/<node>.ipxe` to a node when it
//! network boots. Switching a profile replaces that file atomically, so a
//! node rebooting mid-switch sees either the old script or the new one.

use crate::error::{IpxeError, Result};
use crate::script::{is_safe_name, BootProfile, IpxeScriptGenerator};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Selects the boot artifact of a node for its next network boot
#[async_trait]
pub trait PxeSwitcher: Send + Sync {
    /// Point `node` at `profile`
    async fn switch(&self, node: &str, profile: &BootProfile) -> Result<()>;
}

/// Profile switcher writing one iPXE script per node into a directory
#[derive(Debug, Clone)]
pub struct FilePxeSwitcher {
    profile_dir: PathBuf,
    generator: IpxeScriptGenerator,
}

impl FilePxeSwitcher {
    /// Create a switcher writing into `profile_dir`
    pub fn new(profile_dir: impl Into<PathBuf>, generator: IpxeScriptGenerator) -> Self {
        Self {
            profile_dir: profile_dir.into(),
            generator,
        }
    }

    /// Directory holding the per-node scripts
    pub fn profile_dir(&self) -> &Path {
        &self.profile_dir
    }

    /// Path of a node's script
    pub fn profile_path(&self, node: &str) -> Result<PathBuf> {
        if !is_safe_name(node) {
            return Err(IpxeError::InvalidNode(node.to_string()));
        }
        Ok(self.profile_dir.join(format!("{}.ipxe", node)))
    }

    /// Read back a node's current script, if one was written
    pub async fn current_script(&self, node: &str) -> Result<Option<String>> {
        let path = self.profile_path(node)?;
        match tokio::fs::read_to_string(&path).await {
            Ok(script) => Ok(Some(script)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl PxeSwitcher for FilePxeSwitcher {
    async fn switch(&self, node: &str, profile: &BootProfile) -> Result<()> {
        let path = self.profile_path(node)?;
        let script = self.generator.generate(profile, node)?;

        tokio::fs::create_dir_all(&self.profile_dir).await?;
        let staging = path.with_extension("ipxe.tmp");
        tokio::fs::write(&staging, script).await?;
        tokio::fs::rename(&staging, &path).await?;

        debug!(node, %profile, path = %path.display(), "PXE profile switched");
        Ok(())
    }
}
