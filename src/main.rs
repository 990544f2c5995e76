//! License Gateway - CLI Application
//!
//! Runs the license validation gateway with:
//! - Configuration via TOML and `LICENSE_GATEWAY_*` environment variables
//! - Prometheus metrics
//! - Health checks

use clap::{Parser, Subcommand};
use license_gateway::config::GatewayConfig;
use license_gateway::server;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// License Gateway - validate license queries against an upstream endpoint
#[derive(Parser)]
#[command(name = "license-gateway")]
#[command(version, about = "A license validation gateway", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gateway server
    Start {
        /// Configuration file path (defaults and environment only when omitted)
        #[arg(short, long)]
        config: Option<String>,
    },
    /// Validate the configuration file
    Validate {
        /// Configuration file path
        #[arg(short, long, default_value = "config.toml")]
        config: String,
    },
    /// Generate a sample configuration file
    Init {
        /// Output file path
        #[arg(short, long, default_value = "config.toml")]
        output: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Start { config } => start_server(config.as_deref()).await?,
        Commands::Validate { config } => validate_config(&config)?,
        Commands::Init { output } => generate_sample_config(&output)?,
    }

    Ok(())
}

/// Start the gateway server
async fn start_server(config_path: Option<&str>) -> anyhow::Result<()> {
    // Setup logging
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = GatewayConfig::load(config_path)?;
    match config_path {
        Some(path) => info!("Loaded configuration from {}", path),
        None => info!("No configuration file given, using defaults and environment"),
    }

    server::serve(config).await
}

/// Validate configuration file
fn validate_config(config_path: &str) -> anyhow::Result<()> {
    match GatewayConfig::load(Some(config_path)) {
        Ok(config) => {
            println!("✓ Configuration is valid!");
            println!();
            println!("Server: {}", config.server_addr());
            println!("Upstream: {}", config.upstream.base_url);
            println!("Timeout: {}ms", config.upstream.timeout_ms);
            println!("Error status policy: {:?}", config.upstream.error_status_policy);
            println!(
                "Minimum license length: {}",
                config.validation.min_license_length
            );
            println!("CORS origins: {}", config.cors.allowed_origins.join(", "));
            Ok(())
        }
        Err(e) => {
            eprintln!("✗ Configuration is invalid:");
            eprintln!("  {}", e);
            std::process::exit(1);
        }
    }
}

/// Generate sample configuration file
fn generate_sample_config(output_path: &str) -> anyhow::Result<()> {
    let sample_config = r#"# License Gateway Configuration
#
# Every value can be overridden with LICENSE_GATEWAY_HOST, LICENSE_GATEWAY_PORT,
# LICENSE_GATEWAY_UPSTREAM_URL, LICENSE_GATEWAY_TIMEOUT_MS,
# LICENSE_GATEWAY_ALLOWED_ORIGINS and LICENSE_GATEWAY_MIN_LICENSE_LENGTH.

[server]
host = "0.0.0.0"
port = 8080

[upstream]
base_url = "https://bmsutilities.com/Registrations2/ValidateLicense"
timeout_ms = 15000
max_body_bytes = 65536  # Larger upstream bodies are an internal error
user_agent = "license-gateway"
error_status_policy = "passthrough"  # Options: passthrough, fixed500

[validation]
min_license_length = 5  # 0 disables the length check

[cors]
allowed_origins = ["*"]  # In production, list your own origins
allowed_methods = ["GET", "OPTIONS"]
allowed_headers = ["Content-Type"]
max_age_secs = 86400

[metrics]
enabled = true
path = "/metrics"

[health]
enabled = true
path = "/health"
"#;

    std::fs::write(output_path, sample_config)?;
    println!("Sample configuration written to {}", output_path);
    Ok(())
}
