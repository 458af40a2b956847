mod cli;

use clap::Parser;
use cli::{Cli, Commands};
use quarry_server::config::QuarryConfig;
use quarry_server::serve;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Library crates log through `log`; the subscriber's log bridge
    // forwards those records.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = QuarryConfig::load_or_default(&cli.config);
    if let Some(dir) = cli.data_dir {
        config.server.data_dir = dir;
    }

    match cli.command {
        Commands::Serve => serve::run(config).await,
        Commands::Ask(args) => cli::ask::run(args, config).await,
        Commands::Screen(args) => cli::screen::run(args, &config).await,
        Commands::Index(cmd) => cli::index::run(cmd, config).await,
        Commands::Config(cmd) => cli::config_cmd::run(cmd, &cli.config).await,
    }
}
