use super::Context;
use anyhow::Context as _;
use std::process::{ExitCode, Stdio};
use testrig_core::{check_ssh_args, ssh_target};
use tokio::process::Command;

pub async fn handle(ctx: &Context, name: &str, extra: &[String]) -> anyhow::Result<ExitCode> {
    check_ssh_args(extra)?;
    let target = ssh_target(&ctx.store(), name).await?;
    let args = target.ssh_args(extra)?;

    tracing::debug!("Running: ssh {}", args.join(" "));
    let status = Command::new("ssh")
        .args(&args)
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status()
        .await
        .context("error running ssh client")?;

    // ssh's own exit status is passed through
    Ok(match status.code() {
        Some(0) => ExitCode::SUCCESS,
        Some(code) => ExitCode::from(u8::try_from(code).unwrap_or(1)),
        None => ExitCode::FAILURE,
    })
}
