use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "slipway")]
#[command(version, about = "Developer portal backend - automated CI/CD onboarding")]
struct Cli {
    /// Override the HTTP port from the environment
    #[arg(short, long)]
    port: Option<u16>,

    /// Log at debug level regardless of LOGLEVEL
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = slipway::config::Config::from_env();
    if let Some(port) = cli.port {
        config.http.port = port;
    }

    let level = if cli.verbose {
        "debug".to_string()
    } else {
        config.log_level.clone()
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&level).unwrap_or_else(|_| EnvFilter::new("error")))
        .init();

    slipway::server::start_server(config).await
}
