mod config_commands;
mod settings_commands;

use std::{path::PathBuf, sync::Arc};

use {
    clap::{Parser, Subcommand},
    tracing::{info, warn},
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

use tether_gateway::{
    methods::MethodRegistry, server::start_gateway, services::GatewayServices,
    state::GatewayState, store::Store,
};

#[derive(Parser)]
#[command(name = "tether", about = "tether: on-device JSON-RPC gateway")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Address to bind to (overrides config value).
    #[arg(long, global = true)]
    bind: Option<String>,
    /// Port to listen on (overrides config value).
    #[arg(long, global = true)]
    port: Option<u16>,
    /// Custom config directory (overrides default ~/.config/tether/).
    #[arg(long, global = true, env = "TETHER_CONFIG_DIR")]
    config_dir: Option<PathBuf>,
    /// Custom data directory holding the settings store.
    #[arg(long, global = true, env = "TETHER_DATA_DIR")]
    data_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gateway server (default when no subcommand is provided).
    Gateway,
    /// Configuration management.
    Config {
        #[command(subcommand)]
        action: config_commands::ConfigAction,
    },
    /// Stored proxy settings.
    Settings {
        #[command(subcommand)]
        action: settings_commands::SettingsAction,
    },
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

impl Cli {
    fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(tether_config::data_dir)
    }
}

async fn run_gateway(cli: Cli) -> anyhow::Result<()> {
    let mut config = tether_config::discover_and_load(cli.config_dir.as_deref());

    // CLI args override config values
    if let Some(bind) = cli.bind {
        config.server.bind = bind;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }

    let store = Store::open(&cli.data_dir.unwrap_or_else(tether_config::data_dir));
    let state = GatewayState::new(config, GatewayServices::noop(), store)?;
    let methods = Arc::new(MethodRegistry::new());
    start_gateway(state, methods, shutdown_signal()).await?;
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown requested"),
        Err(e) => {
            warn!(error = %e, "cannot listen for ctrl-c, running until killed");
            std::future::pending::<()>().await;
        },
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let mut cli = Cli::parse();

    init_telemetry(&cli);

    info!(version = env!("CARGO_PKG_VERSION"), "tether starting");

    match cli.command.take() {
        // Default: start gateway when no subcommand is provided
        None | Some(Commands::Gateway) => run_gateway(cli).await,
        Some(Commands::Config { action }) => {
            config_commands::handle_config(&action, cli.config_dir.as_deref())
        },
        Some(Commands::Settings { action }) => {
            settings_commands::handle_settings(&action, &cli.data_dir())
        },
    }
}
