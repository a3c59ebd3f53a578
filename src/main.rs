mod config;
mod csp;
mod error;
mod message;
mod server;
mod user_agent;

use clap::Parser;
use config::Config;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "csp-report-sink",
    about = "Receives CSP and Reporting-API violation reports and logs them"
)]
struct Cli {
    /// TOML file with `bind`, `port` and `body_limit`.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Listening port, overrides `PORT` and the config file.
    #[arg(long)]
    port: Option<u16>,

    /// Listening address.
    #[arg(long)]
    bind: Option<String>,

    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(long)]
    verbose: bool,
}

impl Cli {
    fn resolve_config(&self) -> anyhow::Result<Config> {
        let config = match &self.config {
            Some(path) => config::load(path)?,
            None => Config::default(),
        };
        let mut config = config.with_env_port(std::env::var("PORT").ok())?;

        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(bind) = &self.bind {
            config.bind = bind.clone();
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine.
    let _ = dotenv::dotenv();
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("RUST_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .init();

    let config = cli.resolve_config()?;
    tracing::debug!(?config, "resolved configuration");

    server::serve(config).await
}

#[cfg(test)]
mod tests {
    use crate::Cli;
    use clap::Parser;

    #[test]
    fn test_cli_overrides() {
        let cli = Cli::parse_from([
            "csp-report-sink",
            "--config",
            "test_config.toml",
            "--port",
            "9000",
        ]);
        let config = cli.resolve_config().unwrap();
        assert_eq!("127.0.0.1", config.bind);
        assert_eq!(9000, config.port);
    }
}
