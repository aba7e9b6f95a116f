//! `fleetboot reboot` and `fleetboot power`
//!
//! Both run the macrostep in-process, print the report as JSON on stdout
//! and exit non-zero when any node did not make it.

use clap::Args;
use color_eyre::eyre::Result;
use fleetboot_bmc::PowerMode;
use fleetboot_macrostep::{Macrostep, MacrostepArgs, MacrostepEvent, MacrostepReport, RebootKind};
use std::path::Path;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

#[derive(Args, Debug)]
pub struct RebootArgs {
    /// simple, set-pxe, deploy-env or recorded-env
    #[arg(long, default_value = "simple")]
    pub kind: RebootKind,

    /// Execution level: 0 soft, 1 hard, 2 very hard
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    pub level: i64,

    /// Acting user (defaults to $USER)
    #[arg(long)]
    pub user: Option<String>,

    /// Profile to pin (set-pxe)
    #[arg(long)]
    pub profile: Option<String>,

    /// Nodes reboot through kexec
    #[arg(long, default_value_t = false)]
    pub kexec: bool,

    #[arg(required = true)]
    pub nodes: Vec<String>,
}

#[derive(Args, Debug)]
pub struct PowerArgs {
    /// on, off or status
    #[arg(long)]
    pub mode: PowerMode,

    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    pub level: i64,

    /// Acting user (defaults to $USER)
    #[arg(long)]
    pub user: Option<String>,

    #[arg(required = true)]
    pub nodes: Vec<String>,
}

pub async fn reboot(config_path: &Path, args: RebootArgs) -> Result<()> {
    let user = super::resolve_user(args.user)?;
    let macrostep_args = MacrostepArgs {
        profile: args.profile,
        kexec: args.kexec,
    };
    run(
        config_path,
        &user,
        args.kind.macrostep(),
        args.level,
        args.nodes,
        &macrostep_args,
    )
    .await
}

pub async fn power(config_path: &Path, args: PowerArgs) -> Result<()> {
    let user = super::resolve_user(args.user)?;
    run(
        config_path,
        &user,
        Macrostep::power(args.mode),
        args.level,
        args.nodes,
        &MacrostepArgs::default(),
    )
    .await
}

async fn run(
    config_path: &Path,
    user: &str,
    macrostep: Macrostep,
    level: i64,
    nodes: Vec<String>,
    args: &MacrostepArgs,
) -> Result<()> {
    let state = super::load_state(config_path).await?;
    let progress = tokio::spawn(report_progress(state.executor.subscribe()));

    let ctx = state.context(user, nodes);
    let result = state.executor.run(&ctx, macrostep, level, args).await;
    if result.is_ok() {
        // The executor sent `Completed`; let the log catch up before printing.
        let _ = progress.await;
    } else {
        progress.abort();
    }
    let report = result?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    exit_on_failure(&report);
    Ok(())
}

fn exit_on_failure(report: &MacrostepReport) {
    if !report.all_succeeded() {
        warn!(failed = ?report.failed(), "Macrostep did not complete on every node");
        std::process::exit(1);
    }
}

async fn report_progress(mut events: broadcast::Receiver<MacrostepEvent>) {
    loop {
        match events.recv().await {
            Ok(MacrostepEvent::StepStarted {
                index,
                step,
                pending,
                ..
            }) => info!(index, step = %step, pending, "Step started"),
            Ok(MacrostepEvent::NodeFailed { node, outcome, .. }) => {
                warn!(node = %node, ?outcome, "Node dropped")
            }
            Ok(MacrostepEvent::Completed {
                succeeded, failed, ..
            }) => {
                info!(succeeded, failed, "Progress complete");
                break;
            }
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "Progress log fell behind, events skipped");
            }
            Err(RecvError::Closed) => break,
        }
    }
}
