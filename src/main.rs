use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use cwagent_operator::config::OperatorConfig;
use cwagent_operator::controller::{self, ControllerState};
use cwagent_operator::crd::AmazonCloudWatchAgent;
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the operator
    Run(RunArgs),
    /// Show version information
    Version,
    /// Show cluster information
    Info(InfoArgs),
}

#[derive(Parser, Debug)]
struct RunArgs {
    /// Agent image used when a resource does not pin one
    #[arg(long, env = "AGENT_IMAGE")]
    agent_image: Option<String>,

    /// Label keys (globs) never copied from the resource to its children
    #[arg(long, env = "LABELS_FILTER", value_delimiter = ',')]
    labels_filter: Vec<String>,

    /// Annotation keys (globs) never copied from the resource to its children
    #[arg(long, env = "ANNOTATIONS_FILTER", value_delimiter = ',')]
    annotations_filter: Vec<String>,

    /// Seconds between resyncs of a healthy resource
    #[arg(long, env = "RESYNC_INTERVAL_SECS", default_value_t = 300)]
    resync_interval_secs: u64,

    /// Emit logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

#[derive(Parser, Debug)]
struct InfoArgs {
    /// Namespace to inspect
    #[arg(long, env = "OPERATOR_NAMESPACE", default_value = "default")]
    namespace: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    match args.command {
        Commands::Version => {
            println!("cwagent-operator v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Commands::Info(info_args) => run_info(info_args).await,
        Commands::Run(run_args) => run_operator(run_args).await,
    }
}

fn init_tracing(json: bool) {
    let env_filter = EnvFilter::builder()
        .with_default_directive(Level::INFO.into())
        .from_env_lossy();

    let registry = tracing_subscriber::registry().with(env_filter);
    if json {
        registry.with(fmt::layer().json().with_target(true)).init();
    } else {
        registry.with(fmt::layer().with_target(true)).init();
    }
}

async fn run_info(args: InfoArgs) -> anyhow::Result<()> {
    let client = kube::Client::try_default()
        .await
        .context("failed to create Kubernetes client")?;

    let api: kube::Api<AmazonCloudWatchAgent> = kube::Api::namespaced(client, &args.namespace);
    let agents = api
        .list(&Default::default())
        .await
        .context("failed to list AmazonCloudWatchAgent resources")?;

    println!("Managed CloudWatch agents: {}", agents.items.len());
    Ok(())
}

async fn run_operator(args: RunArgs) -> anyhow::Result<()> {
    init_tracing(args.log_json);

    info!(
        "Starting cwagent-operator v{}",
        env!("CARGO_PKG_VERSION")
    );

    let config = OperatorConfig::new(
        args.agent_image,
        &args.labels_filter,
        &args.annotations_filter,
    )
    .context("invalid operator configuration")?;
    info!(image = %config.default_agent_image, "Default agent image");

    let client = kube::Client::try_default()
        .await
        .context("failed to create Kubernetes client")?;
    info!("Connected to Kubernetes cluster");

    let mut state = ControllerState::new(client, config);
    state.resync_interval = Duration::from_secs(args.resync_interval_secs);

    controller::run_controller(Arc::new(state)).await?;

    info!("Operator shut down");
    Ok(())
}
