use std::{net::SocketAddr, path::Path, sync::Arc};

use clap::Parser;
use color_eyre::{
    Result,
    eyre::{Context, eyre},
};
use edge_gateway::{
    adapters,
    config::{ServerConfigValidator, loader::load_config, models::ServerConfig},
    metrics, tracing_setup,
    utils::graceful_shutdown::GracefulShutdown,
};

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    #[clap(subcommand)]
    command: Option<Commands>,

    #[clap(short, long, default_value = "config.toml")]
    config: String,
}

#[derive(Parser, Debug)]
enum Commands {
    /// Validate configuration file
    Validate {
        /// Configuration file to validate
        #[clap(short, long, default_value = "config.toml")]
        config: String,
    },
    /// Initialize a new configuration file
    Init {
        /// Output path for the new config file
        #[clap(short, long, default_value = "config.toml")]
        config: String,
    },
    /// Start the gateway server (default)
    Serve {
        /// Configuration file to use
        #[clap(short, long, default_value = "config.toml")]
        config: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::parse();

    match args.command {
        Some(Commands::Validate { config }) => validate_config_command(&config).await,
        Some(Commands::Init { config }) => init_config_command(&config).await,
        Some(Commands::Serve { config }) => serve_command(&config).await,
        None => serve_command(&args.config).await,
    }
}

async fn serve_command(config_path: &str) -> Result<()> {
    let config: ServerConfig = load_config(config_path)
        .await
        .with_context(|| format!("Failed to load config from {config_path}"))?;
    ServerConfigValidator::validate(&config)
        .map_err(|e| eyre!("Invalid configuration in {config_path}:\n{e}"))?;

    tracing_setup::init_tracing(&config.logging)
        .map_err(|e| eyre!("Failed to initialize tracing: {}", e))?;
    let metrics_handle = metrics::init_metrics(&config.telemetry, &config.service_name)
        .context("Failed to initialize metrics")?;

    let provider = rustls::crypto::aws_lc_rs::default_provider();
    if let Err(e) = rustls::crypto::CryptoProvider::install_default(provider) {
        tracing::warn!(
            "CryptoProvider::install_default for aws-lc-rs reported an error: {:?}. \
            A provider was probably installed already.",
            e
        );
    }

    let addr: SocketAddr = config
        .listen_addr
        .parse()
        .context("Failed to parse listen address")?;

    tracing::info!(
        service = %config.service_name,
        environment = %config.environment,
        routes = config.routes.len(),
        token_limit = config.rate_limit.token_limit,
        replenishment_period = %config.rate_limit.replenishment_period,
        queue_limit = config.rate_limit.queue_limit,
        "Starting edge gateway on {}",
        addr
    );

    let pipeline = adapters::build_pipeline(&config)?;
    let app = adapters::build_router(pipeline);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;
    println!("Edge gateway listening on {addr}");

    let shutdown = Arc::new(GracefulShutdown::new());
    let signal_handler = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move { shutdown.run_signal_handler().await })
    };

    let server_result = adapters::serve(listener, app, shutdown).await;
    signal_handler.abort();

    metrics_handle.shutdown();
    tracing::info!("Graceful shutdown completed");
    server_result
}

/// Validate configuration file and exit
async fn validate_config_command(config_path: &str) -> Result<()> {
    println!("🔍 Validating configuration file: {config_path}");

    if !Path::new(config_path).exists() {
        eprintln!("❌ Error: Configuration file '{config_path}' not found");
        std::process::exit(1);
    }

    let config = match load_config(config_path).await {
        Ok(config) => {
            println!("✅ Configuration parsing: OK");
            config
        }
        Err(e) => {
            eprintln!("❌ Configuration parsing failed:");
            eprintln!("   {e:#}");
            std::process::exit(1);
        }
    };

    match ServerConfigValidator::validate(&config) {
        Ok(()) => {
            println!("✅ Configuration validation: OK");
            println!();
            println!("📋 Configuration Summary:");
            println!("   • Listen Address: {}", config.listen_addr);
            println!("   • Environment: {}", config.environment);
            println!("   • Upstream Routes: {}", config.routes.len());
            println!(
                "   • Rate Limit: {} tokens, {} per {}, queue {}",
                config.rate_limit.token_limit,
                config.rate_limit.tokens_per_period,
                config.rate_limit.replenishment_period,
                config.rate_limit.queue_limit
            );
            println!(
                "   • OTLP Metrics: {}",
                config.telemetry.otlp_endpoint.as_deref().unwrap_or("disabled")
            );
            println!();
            println!("🎉 Configuration is valid and ready to use!");
            Ok(())
        }
        Err(e) => {
            eprintln!("❌ Configuration validation failed:");
            eprintln!("{e}");
            println!();
            println!("💡 Common fixes:");
            println!("   • Ensure all upstream targets start with http:// or https://");
            println!("   • Route and classification prefixes must start with '/'");
            println!("   • Verify listen address format (e.g., '0.0.0.0:8080')");
            println!("   • Ensure rate limit periods use valid units (s, m, h)");
            std::process::exit(1);
        }
    }
}

/// Initialize a new configuration file
async fn init_config_command(config_path: &str) -> Result<()> {
    let path = Path::new(config_path);
    if path.exists() {
        eprintln!("❌ Error: Configuration file '{config_path}' already exists");
        std::process::exit(1);
    }

    let default_config = r#"# Edge Gateway Configuration

listen_addr = "0.0.0.0:8080"
service_name = "edge-gateway"
environment = "Development"

# Global admission control shared by every non-public request
[rate_limit]
token_limit = 100
tokens_per_period = 100
replenishment_period = "1m"
queue_limit = 10

[auth]
# issuer = "https://auth.example.com"
# audience = "edge-gateway"
detailed_errors = true

[dispatch]
timeout_secs = 30

[logging]
level = "info"
json = true

# [telemetry]
# otlp_endpoint = "http://localhost:4317"

# Upstream routes. `target_env` names an environment variable that, when set,
# overrides `target`.
[routes."/api/auth"]
target = "http://localhost:5001"
target_env = "USERS_API_URL"

[routes."/api/users"]
target = "http://localhost:5001"
target_env = "USERS_API_URL"

[routes."/api/games"]
target = "http://localhost:5002"
target_env = "GAMES_API_URL"

[routes."/api/payments"]
target = "http://localhost:5003"
target_env = "PAYMENTS_API_URL"
"#;

    tokio::fs::write(path, default_config)
        .await
        .context("Failed to write config file")?;
    println!("✅ Created default configuration at: {config_path}");
    println!("   Run 'edge-gateway serve --config {config_path}' to start the server");
    Ok(())
}
