use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use taker_config::ConfigLoader;
use taker_core::TakerBuilder;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "taker-service")]
#[command(about = "Cross-chain order-fulfillment taker", long_about = None)]
struct Cli {
	#[command(subcommand)]
	command: Option<Commands>,

	#[arg(short, long, value_name = "FILE", default_value = "config/taker.toml")]
	config: PathBuf,

	#[arg(long, env = "TAKER_LOG_LEVEL", default_value = "info")]
	log_level: String,
}

#[derive(Subcommand)]
enum Commands {
	/// Start the taker service
	Start,
	/// Validate the configuration file
	Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
	let cli = Cli::parse();

	setup_tracing(&cli.log_level)?;

	match cli.command {
		Some(Commands::Start) | None => start_service(cli).await,
		Some(Commands::Validate) => validate_config(cli).await,
	}
}

async fn start_service(cli: Cli) -> Result<()> {
	info!("Starting taker service");
	info!("Loading configuration from: {:?}", cli.config);

	let config = ConfigLoader::from_file(&cli.config).context("Failed to load configuration")?;

	info!("Configuration loaded successfully");
	info!("Order feed: {}", config.order_feed);
	info!("Configured chains: {}", config.chains.len());
	info!("Batch unlock size: {}", config.batch_unlock_size);

	// RPC clients and transaction builders are contributed by the
	// embedding integration through TakerBuilder::with_connector.
	let taker = TakerBuilder::new()
		.with_config(config)
		.build()
		.await
		.context("Failed to build taker")?;
	let taker = Arc::new(taker);

	taker.start().await.context("Failed to start taker")?;
	info!("Taker service started");

	shutdown_signal().await;
	info!("Shutdown signal received, stopping");

	taker.shutdown().await;
	info!("Taker service stopped");
	Ok(())
}

async fn validate_config(cli: Cli) -> Result<()> {
	info!("Validating configuration file: {:?}", cli.config);

	let config = ConfigLoader::from_file(&cli.config).context("Configuration is invalid")?;

	info!("Configuration is valid");
	info!("Order feed: {}", config.order_feed);
	for chain in &config.chains {
		info!(
			"  Chain {}: rpc {}{}",
			chain.chain,
			chain.chain_rpc,
			if chain.disabled { " (disabled)" } else { "" }
		);
	}
	info!("Buckets: {}", config.buckets.len());
	info!("Minimum profitability: {} bps", config.min_profitability_bps);

	Ok(())
}

fn setup_tracing(log_level: &str) -> Result<()> {
	let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

	tracing_subscriber::registry()
		.with(env_filter)
		.with(tracing_subscriber::fmt::layer())
		.init();

	Ok(())
}

async fn shutdown_signal() {
	let ctrl_c = async {
		signal::ctrl_c()
			.await
			.expect("failed to install Ctrl+C handler");
	};

	#[cfg(unix)]
	let terminate = async {
		signal::unix::signal(signal::unix::SignalKind::terminate())
			.expect("failed to install signal handler")
			.recv()
			.await;
	};

	#[cfg(not(unix))]
	let terminate = std::future::pending::<()>();

	tokio::select! {
		_ = ctrl_c => {},
		_ = terminate => {},
	}
}
