use super::Context;
use colored::Colorize;
use std::process::ExitCode;
use testrig_core::inspect_cluster;

pub async fn handle(ctx: &Context, name: &str) -> anyhow::Result<ExitCode> {
    let report = inspect_cluster(&ctx.store(), name).await?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    for error in &report.errors {
        eprintln!("{}", error.to_string().red());
    }

    Ok(if report.errors.is_empty() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
