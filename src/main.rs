use std::path::Path;

use clap::Parser;
use color_eyre::{
    Result,
    eyre::{Context, eyre},
};
use tether::{
    adapters::{http_handler, pipeline::Pipeline},
    config::{ServerConfig, ServerConfigValidator, load_config},
    tracing_setup,
    utils::lifecycle::{Server, shutdown_signal},
};

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    #[clap(subcommand)]
    command: Option<Commands>,

    /// Optional configuration file (TOML, YAML, JSON or INI)
    #[clap(short, long, global = true)]
    config: Option<String>,
}

#[derive(Parser, Debug)]
enum Commands {
    /// Validate the effective configuration and exit
    Validate,
    /// Write a default configuration file
    Init {
        /// Output path for the new config file
        #[clap(short, long, default_value = "tether.toml")]
        output: String,
    },
    /// Start the server (default)
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::parse();
    let config_path = args.config.as_deref();

    match args.command.unwrap_or(Commands::Serve) {
        Commands::Validate => validate_config_command(config_path),
        Commands::Init { output } => init_config_command(&output).await,
        Commands::Serve => serve_command(config_path).await,
    }
}

fn load_valid_config(config_path: Option<&str>) -> Result<ServerConfig> {
    let config = load_config(config_path).context("Failed to load configuration")?;
    ServerConfigValidator::validate(&config).context("Invalid configuration")?;
    Ok(config)
}

async fn serve_command(config_path: Option<&str>) -> Result<()> {
    // Configuration problems are fatal before anything is bound.
    let config = load_valid_config(config_path)?;

    tracing_setup::init_tracing_with_config(&config.log.level, config.log.format)
        .map_err(|e| eyre!("Failed to initialize tracing: {}", e))?;

    if let Some(path) = config_path {
        tracing::info!("Loaded configuration from {path}");
    }

    let pipeline = Pipeline::standard(config.pipeline_settings());
    tracing::info!(
        stages = ?pipeline.stages(),
        "request pipeline assembled"
    );
    let app = http_handler::router(&pipeline);

    let server = Server::new(config.listen_addr(), config.drain_timeout());
    server
        .listen(app, shutdown_signal())
        .await
        .context("Server terminated with an error")?;

    Ok(())
}

/// Validate configuration and exit
fn validate_config_command(config_path: Option<&str>) -> Result<()> {
    match config_path {
        Some(path) => println!("🔍 Validating configuration file: {path}"),
        None => println!("🔍 Validating configuration from defaults and environment"),
    }

    if let Some(path) = config_path.filter(|path| !Path::new(path).exists()) {
        eprintln!("❌ Error: Configuration file '{path}' not found");
        std::process::exit(1);
    }

    let config = match load_config(config_path) {
        Ok(config) => {
            println!("✅ Configuration parsing: OK");
            config
        }
        Err(e) => {
            eprintln!("❌ Configuration parsing failed:");
            eprintln!("   {e}");
            std::process::exit(1);
        }
    };

    match ServerConfigValidator::validate(&config) {
        Ok(()) => {
            println!("✅ Configuration validation: OK");
            println!();
            println!("📋 Configuration Summary:");
            println!("   • Listen Address: {}", config.listen_addr());
            println!("   • Drain Timeout: {}s", config.drain_timeout_secs);
            println!("   • Compression Level: {}", config.compression_level);
            println!("   • Token TTL: {}s", config.token.ttl_secs);
            println!("   • Token Scopes: {:?}", config.token.scopes);
            println!("   • Log: {} ({:?})", config.log.level, config.log.format);
            println!();
            println!("🎉 Configuration is valid and ready to use!");
            Ok(())
        }
        Err(e) => {
            eprintln!("❌ Configuration validation failed:");
            eprintln!("{e}");
            println!();
            println!("💡 Common fixes:");
            println!("   • Leave PORT unset to use 8080, or give it a non-empty value");
            println!("   • Verify host and port form a valid address (e.g., '127.0.0.1:3000')");
            println!("   • Keep compression_level between 0 and 9");
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

    let default_config = r#"# tether configuration
#
# Every key is optional. Environment variables override this file:
# PORT for the port, TETHER_<KEY> for top-level keys and
# TETHER_<SECTION>__<KEY> for nested ones (e.g. TETHER_LOG__FORMAT=pretty).

host = "0.0.0.0"
port = "8080"

# Seconds to wait for in-flight requests after an interrupt
drain_timeout_secs = 5

# Gzip quality, 0 (fastest) to 9 (best)
compression_level = 5

[log]
# Ignored when RUST_LOG is set
level = "info"
# "json" or "pretty"
format = "json"

[token]
ttl_secs = 900
scopes = []
"#;

    tokio::fs::write(path, default_config)
        .await
        .context("Failed to write config file")?;
    println!("✅ Created default configuration at: {config_path}");
    println!("   Run 'tether --config {config_path} serve' to start the server");
    Ok(())
}
