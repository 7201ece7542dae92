use std::{path::PathBuf, sync::Arc};

use {
    anyhow::Context,
    clap::{Parser, Subcommand},
    kraken_config::KrakenConfig,
    kraken_gateway::LoopbackRouter,
    tracing::info,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(name = "kraken", about = "Kraken: JSON-RPC signaling gateway", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the RPC gateway with the in-memory loopback router.
    Gateway {
        /// Interface to bind, overriding `rpc.bind`.
        #[arg(long)]
        bind: Option<String>,
        /// Port to listen on, overriding `rpc.port`.
        #[arg(long)]
        port: Option<u16>,
        /// Config file; skips discovery.
        #[arg(long, env = "KRAKEN_CONFIG")]
        config: Option<PathBuf>,
    },
    /// Print the effective configuration as TOML.
    Config {
        #[arg(long, env = "KRAKEN_CONFIG")]
        config: Option<PathBuf>,
    },
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    if cli.json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

/// Command-line flags win over file values.
fn apply_overrides(mut config: KrakenConfig, bind: Option<String>, port: Option<u16>) -> KrakenConfig {
    if let Some(bind) = bind {
        config.rpc.bind = bind;
    }
    if let Some(port) = port {
        config.rpc.port = port;
    }
    config
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    match cli.command {
        Commands::Gateway { bind, port, config } => {
            info!(version = env!("CARGO_PKG_VERSION"), "kraken starting");
            let config = kraken_config::load_or_discover(config.as_deref())?;
            let config = apply_overrides(config, bind, port);
            kraken_gateway::start_gateway(&config.rpc, Arc::new(LoopbackRouter::new()))
                .await
                .context("rpc gateway failed")
        },
        Commands::Config { config } => {
            let config = kraken_config::load_or_discover(config.as_deref())?;
            print!("{}", kraken_config::to_toml(&config)?);
            Ok(())
        },
    }
}
