use super::Context;
use colored::Colorize;
use std::process::ExitCode;
use testrig_core::{ClusterStatus, list_clusters};

pub async fn handle(ctx: &Context) -> anyhow::Result<ExitCode> {
    let listing = list_clusters(&ctx.store()).await?;

    println!("{:<20} {:<12} {}", "NAME", "STATUS", "FQDN");
    for cluster in &listing.clusters {
        let status = match cluster.status {
            Some(status) => paint(status),
            None => format!("{:<12}", "?").dimmed().to_string(),
        };
        println!(
            "{:<20} {} {}",
            cluster.name,
            status,
            cluster.fqdn.as_deref().unwrap_or("")
        );
    }

    for error in &listing.errors {
        eprintln!("{}", error.to_string().red());
    }

    Ok(if listing.errors.is_empty() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn paint(status: ClusterStatus) -> String {
    // pad before coloring; escape codes count toward the width
    let title = format!("{:<12}", status.title());
    match status {
        ClusterStatus::Ready => title.green().to_string(),
        ClusterStatus::Failed | ClusterStatus::Dead => title.red().to_string(),
        _ => title.yellow().to_string(),
    }
}
