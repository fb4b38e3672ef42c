use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::info;

use edge_operator::{controller::EdgeOperator, crd, init_kube_client, Settings};

#[derive(Parser, Debug)]
#[command(name = "edge-operator")]
#[command(about = "Kubernetes operator for IoT Edge module deployments")]
struct Args {
    #[arg(long, help = "Print CRD definitions and exit")]
    crd: bool,

    #[arg(long, default_value = "info", help = "Log level (trace, debug, info, warn, error)")]
    log_level: String,

    #[arg(long, help = "Path to a settings file")]
    config: Option<PathBuf>,

    #[arg(long, help = "Path to a kubeconfig file (default: in-cluster or local config)")]
    kubeconfig: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if args.crd {
        crd::print_crds();
        return Ok(());
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&args.log_level)),
        )
        .init();

    let settings = Arc::new(Settings::load(args.config.as_deref())?);
    info!(
        hub = %settings.hub_hostname,
        device = %settings.device_id,
        "starting edge operator"
    );

    let client = init_kube_client(args.kubeconfig).await?;
    info!("connected to Kubernetes API");

    let mut operator = EdgeOperator::start(client, settings);
    tokio::select! {
        result = operator.run() => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown requested");
        }
    }
    operator.close().await;

    Ok(())
}
