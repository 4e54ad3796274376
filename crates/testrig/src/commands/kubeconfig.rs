use super::Context;
use std::process::ExitCode;
use testrig_core::kubeconfig_path;

pub async fn handle(ctx: &Context, name: &str) -> anyhow::Result<ExitCode> {
    let path = kubeconfig_path(&ctx.store(), name).await?;
    println!("{}", path.display());
    Ok(ExitCode::SUCCESS)
}
