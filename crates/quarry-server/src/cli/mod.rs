pub mod ask;
pub mod config_cmd;
pub mod index;
pub mod screen;

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "quarry")]
#[command(version, about = "Screened multi-source research assistant")]
pub struct Cli {
    /// Path to quarry.toml
    #[arg(
        long,
        global = true,
        env = "QUARRY_CONFIG",
        default_value = "quarry.toml"
    )]
    pub config: PathBuf,

    /// Path to data directory (overrides config file)
    #[arg(long, global = true, env = "QUARRY_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the HTTP server
    Serve,
    /// Run one research query through the pipeline
    Ask(AskArgs),
    /// Classify text with the threat screen only
    Screen(ScreenArgs),
    /// Similarity index maintenance
    #[command(subcommand)]
    Index(IndexCommands),
    /// Configuration commands
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Args, Debug)]
pub struct AskArgs {
    pub query: String,
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(Args, Debug)]
pub struct ScreenArgs {
    pub text: String,
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(Subcommand, Debug)]
pub enum IndexCommands {
    /// Document count, dimension and model
    Stats,
    /// Nearest stored documents to a query
    Search(IndexSearchArgs),
    /// Re-embed every stored document
    Rebuild,
    /// Remove every document and the persisted artifacts
    Clear(ClearArgs),
}

#[derive(Args, Debug)]
pub struct IndexSearchArgs {
    pub query: String,
    #[arg(long, short = 'k', default_value = "5")]
    pub k: usize,
    /// Minimum cosine similarity
    #[arg(long, default_value = "0.0")]
    pub threshold: f32,
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(Args, Debug)]
pub struct ClearArgs {
    #[arg(long, short = 'y')]
    pub yes: bool,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    Validate,
    Show,
}
