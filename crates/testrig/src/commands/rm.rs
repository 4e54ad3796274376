use super::Context;
use clap::Args;
use colored::Colorize;
use std::process::ExitCode;
use std::sync::Arc;
use testrig_cloud::CloudProvider;
use testrig_core::remove_clusters;

#[derive(Args, Debug)]
pub struct RmArgs {
    /// Clusters to remove
    #[arg(required = true)]
    pub names: Vec<String>,

    /// Remove local state even if cloud resources could not be deleted
    #[arg(short, long)]
    pub force: bool,

    /// Azure subscription the clusters were deployed to
    #[arg(short, long)]
    pub subscription: Option<String>,

    /// Maximum number of clusters removed at once
    #[arg(long)]
    pub parallel: Option<usize>,
}

pub async fn handle(ctx: &Context, args: RmArgs) -> anyhow::Result<ExitCode> {
    let provider: Arc<dyn CloudProvider> = Arc::new(ctx.azure(args.subscription.clone()).await?);

    let mut workflow = ctx.workflow.clone();
    if let Some(parallel) = args.parallel {
        workflow = workflow.with_max_concurrent_removals(parallel);
    }

    let report = remove_clusters(&args.names, args.force, provider, &workflow, &ctx.cancel).await;

    for name in report.removed() {
        println!("{}", name);
    }
    for (name, error) in report.failures() {
        eprintln!("{}: {}", name.red(), error);
    }

    if report.is_success() {
        return Ok(ExitCode::SUCCESS);
    }
    if !args.force && report.has_recoverable_failure() {
        eprintln!(
            "{}",
            "Error while attempting remove.\n\
             You can verify the state details and try again, or use `--force` to remove all local state"
                .yellow()
        );
    }
    Ok(ExitCode::FAILURE)
}
