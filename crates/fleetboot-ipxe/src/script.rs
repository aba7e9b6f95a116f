//! iPXE script generation
//!
//! This module renders the iPXE script for each boot profile.

use crate::error::{IpxeError, Result};
use serde::{Deserialize, Serialize};

/// Boot artifact a node fetches at its next network boot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BootProfile {
    /// Production environment on local disk
    Production,
    /// Network-booted deployment environment
    DeployEnv,
    /// Freshly recorded environment on local disk
    Deployed,
    /// Named profile chained from the boot server
    Pinned(String),
}

impl std::fmt::Display for BootProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BootProfile::Production => write!(f, "production"),
            BootProfile::DeployEnv => write!(f, "deploy_env"),
            BootProfile::Deployed => write!(f, "deployed"),
            BootProfile::Pinned(name) => write!(f, "pinned:{}", name),
        }
    }
}

/// Configuration for iPXE script generation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IpxeConfig {
    /// Base URL for fetching resources (e.g., http://10.0.0.1:8080)
    pub base_url: String,

    /// Default kernel parameters
    pub kernel_params: Vec<String>,

    /// Console configuration (e.g., "ttyS0,115200")
    pub console: Option<String>,

    /// Enable verbose boot
    pub verbose: bool,

    /// Deployment environment kernel URL
    pub deploy_kernel_url: Option<String>,

    /// Deployment environment initrd URL
    pub deploy_initrd_url: Option<String>,
}

impl IpxeConfig {
    /// Create a new config with base URL
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    /// Set console configuration
    pub fn with_console(mut self, console: impl Into<String>) -> Self {
        self.console = Some(console.into());
        self
    }

    /// Add kernel parameter
    pub fn with_kernel_param(mut self, param: impl Into<String>) -> Self {
        self.kernel_params.push(param.into());
        self
    }

    /// Enable verbose boot
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Set deployment environment kernel URL
    pub fn with_deploy_kernel(mut self, url: impl Into<String>) -> Self {
        self.deploy_kernel_url = Some(url.into());
        self
    }

    /// Set deployment environment initrd URL
    pub fn with_deploy_initrd(mut self, url: impl Into<String>) -> Self {
        self.deploy_initrd_url = Some(url.into());
        self
    }
}

/// iPXE script generator
#[derive(Debug, Clone)]
pub struct IpxeScriptGenerator {
    config: IpxeConfig,
}

impl IpxeScriptGenerator {
    /// Create a new script generator
    pub fn new(config: IpxeConfig) -> Self {
        Self { config }
    }

    /// Generate the script a node boots with under a profile
    pub fn generate(&self, profile: &BootProfile, node: &str) -> Result<String> {
        match profile {
            BootProfile::Production => Ok(self.local_boot_script("Production", node)),
            BootProfile::Deployed => Ok(self.local_boot_script("Deployed", node)),
            BootProfile::DeployEnv => self.deploy_env_script(node),
            BootProfile::Pinned(name) => self.pinned_script(name, node),
        }
    }

    fn deploy_env_script(&self, node: &str) -> Result<String> {
        let kernel_url = self
            .config
            .deploy_kernel_url
            .clone()
            .or_else(|| self.from_base("deploy/vmlinuz"))
            .ok_or_else(|| IpxeError::MissingConfig("deploy_kernel_url".to_string()))?;

        let initrd_url = self
            .config
            .deploy_initrd_url
            .clone()
            .or_else(|| self.from_base("deploy/initrd"))
            .ok_or_else(|| IpxeError::MissingConfig("deploy_initrd_url".to_string()))?;

        let mut script = self.script_header(node);
        script.push_str(&format!(
            r#"
echo Fleetboot Deployment Environment
echo Node: {node}

kernel {kernel_url} {params}
initrd {initrd_url}
boot
"#,
            params = self.kernel_params_string(node),
        ));

        Ok(script)
    }

    fn local_boot_script(&self, label: &str, node: &str) -> String {
        let mut script = self.script_header(node);
        script.push_str(&format!(
            r#"
echo Fleetboot {label} Boot
echo Node: {node}

iseq ${{platform}} efi && goto uefi_boot || goto bios_boot

:uefi_boot
sanboot --no-describe --drive 0x80 || goto boot_failed
exit

:bios_boot
sanboot --drive 0x80 || goto boot_failed
exit

:boot_failed
echo Local boot failed
shell
"#
        ));
        script
    }

    fn pinned_script(&self, name: &str, node: &str) -> Result<String> {
        if !is_safe_name(name) {
            return Err(IpxeError::InvalidProfile(name.to_string()));
        }
        let url = self
            .from_base(&format!("profiles/{}", name))
            .ok_or_else(|| IpxeError::MissingConfig("base_url".to_string()))?;

        let mut script = self.script_header(node);
        script.push_str(&format!(
            r#"
echo Fleetboot Pinned Profile {name}
chain {url}
"#
        ));
        Ok(script)
    }

    fn from_base(&self, path: &str) -> Option<String> {
        if self.config.base_url.is_empty() {
            None
        } else {
            Some(format!(
                "{}/{}",
                self.config.base_url.trim_end_matches('/'),
                path
            ))
        }
    }

    /// Build the kernel parameters string
    fn kernel_params_string(&self, node: &str) -> String {
        let mut params = self.config.kernel_params.clone();

        if let Some(ref console) = self.config.console {
            params.push(format!("console={}", console));
        }

        if self.config.verbose {
            params.push("loglevel=7".to_string());
        }

        params.push(format!("fleetboot.node={}", node));

        params.join(" ")
    }

    fn script_header(&self, node: &str) -> String {
        format!("#!ipxe\n\n# Generated by fleetboot for {}\n", node)
    }
}

/// Whether a name is usable as a single path component
pub(crate) fn is_safe_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}
