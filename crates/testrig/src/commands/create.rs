use super::Context;
use anyhow::Context as _;
use clap::Args;
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use testrig_config::Profile;
use testrig_core::engine::DEFAULT_ENGINE;
use testrig_core::{AcsEngine, ApiModel, CreateRequest, create_cluster, fqdn};

#[derive(Args, Debug, Default)]
pub struct CreateArgs {
    /// Cluster name
    pub name: String,

    /// Location of acs-engine binary
    #[arg(long)]
    pub acs_engine_path: Option<String>,

    /// Azure location to deploy to, e.g. `centralus`
    #[arg(short, long)]
    pub location: Option<String>,

    /// Azure subscription to deploy the cluster with
    #[arg(short, long)]
    pub subscription: Option<String>,

    /// Number of nodes for the Kubernetes leader pool
    #[arg(long)]
    pub linux_leader_count: Option<u32>,

    /// VM SKU for leader nodes
    #[arg(long)]
    pub linux_leader_node_sku: Option<String>,

    /// Number of Linux nodes for the Kubernetes agent pool
    #[arg(long)]
    pub linux_agent_count: Option<u32>,

    /// VM SKU for Linux agent nodes
    #[arg(long)]
    pub linux_agent_node_sku: Option<String>,

    /// Availability profile for Linux agent nodes
    #[arg(long)]
    pub linux_agent_availability_profile: Option<String>,

    /// Number of Windows nodes for the Kubernetes agent pool
    #[arg(long)]
    pub windows_agent_count: Option<u32>,

    /// VM SKU for Windows agent nodes
    #[arg(long)]
    pub windows_agent_node_sku: Option<String>,

    /// Availability profile for Windows agent nodes
    #[arg(long)]
    pub windows_agent_availability_profile: Option<String>,

    /// Container runtime to use
    #[arg(long)]
    pub runtime: Option<String>,

    /// Network plugin to use for the cluster
    #[arg(long)]
    pub network_plugin: Option<String>,

    /// Network policy to use for the cluster
    #[arg(long)]
    pub network_policy: Option<String>,

    /// Kubernetes version
    #[arg(long)]
    pub kubernetes_version: Option<String>,

    /// Username for SSH access to nodes
    #[arg(short, long)]
    pub user: Option<String>,

    /// Public SSH key file to install as an authorized key on cluster nodes
    #[arg(long)]
    pub ssh_key: Option<PathBuf>,
}

pub async fn handle(ctx: &Context, args: CreateArgs) -> anyhow::Result<ExitCode> {
    let model = build_model(&ctx.user_config.profile, &args)?;
    let location = args
        .location
        .clone()
        .or_else(|| ctx.user_config.location.clone())
        .unwrap_or_default();

    let engine_path = args
        .acs_engine_path
        .clone()
        .or_else(|| ctx.user_config.acs_engine_path.clone())
        .unwrap_or_else(|| DEFAULT_ENGINE.to_string());
    let engine = AcsEngine::locate(&engine_path)?;
    tracing::debug!("Using acs-engine at {}", engine.path().display());

    let provider = ctx.azure(args.subscription.clone()).await?;

    println!(
        "{} {} in {} (subscription {})",
        "Creating cluster".blue(),
        args.name.cyan(),
        location.cyan(),
        provider.subscription_id()
    );

    let record = create_cluster(
        CreateRequest::new(&args.name, model, location),
        &provider,
        &engine,
        &ctx.workflow,
        &ctx.cancel,
    )
    .await?;

    println!("{} {}", "✓".green(), format!("Cluster {} is ready", args.name).green());
    if let Some(host) = fqdn(&record) {
        println!("  FQDN: {}", host.cyan());
    }
    println!(
        "  kubeconfig: {}",
        format!("testrig kubeconfig {}", args.name).dimmed()
    );
    Ok(ExitCode::SUCCESS)
}

/// Default model, then the user profile, then flags
fn build_model(profile: &Profile, args: &CreateArgs) -> anyhow::Result<ApiModel> {
    let mut model = ApiModel::default();
    let props = &mut model.properties;

    set(
        &mut props.orchestrator_profile.orchestrator_release,
        args.kubernetes_version
            .as_ref()
            .or(profile.kubernetes_version.as_ref()),
    );

    let leader = &mut props.master_profile;
    set(
        &mut leader.vm_size,
        args.linux_leader_node_sku
            .as_ref()
            .or(profile.leader.linux.sku.as_ref()),
    );
    if let Some(count) = args.linux_leader_count.or(profile.leader.linux.count) {
        leader.count = count;
    }

    let k8s = &mut props.orchestrator_profile.kubernetes_config;
    set(&mut k8s.container_runtime, args.runtime.as_ref());
    set(&mut k8s.network_plugin, args.network_plugin.as_ref());
    set(&mut k8s.network_policy, args.network_policy.as_ref());

    set(
        &mut props.linux_profile.admin_username,
        args.user.as_ref().or(profile.auth.linux.user.as_ref()),
    );

    if let Some(pool) = model.linux_agent_pool_mut() {
        set(
            &mut pool.vm_size,
            args.linux_agent_node_sku
                .as_ref()
                .or(profile.agent.linux.sku.as_ref()),
        );
        set(
            &mut pool.availability_profile,
            args.linux_agent_availability_profile.as_ref(),
        );
        if let Some(count) = args.linux_agent_count.or(profile.agent.linux.count) {
            pool.count = count;
        }
    }

    if let Some(pool) = model.windows_agent_pool_mut() {
        set(
            &mut pool.vm_size,
            args.windows_agent_node_sku
                .as_ref()
                .or(profile.agent.windows.sku.as_ref()),
        );
        set(
            &mut pool.availability_profile,
            args.windows_agent_availability_profile.as_ref(),
        );
        if let Some(count) = args.windows_agent_count.or(profile.agent.windows.count) {
            pool.count = count;
        }
    }

    for key_file in [profile.auth.linux.public_key_file.as_ref(), args.ssh_key.as_ref()]
        .into_iter()
        .flatten()
    {
        model.add_ssh_public_key(read_public_key(key_file)?)?;
    }

    Ok(model)
}

fn set(field: &mut String, value: Option<&String>) {
    if let Some(value) = value.filter(|v| !v.is_empty()) {
        field.clone_from(value);
    }
}

fn read_public_key(path: &Path) -> anyhow::Result<String> {
    std::fs::read_to_string(path)
        .with_context(|| format!("error reading ssh key data from {}", path.display()))
}
