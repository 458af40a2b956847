use crate::cli::{AskArgs, OutputFormat};
use anyhow::Result;
use quarry_server::components::{self, Capabilities};
use quarry_server::config::QuarryConfig;
use quarry_server::render;

pub async fn run(args: AskArgs, config: QuarryConfig) -> Result<()> {
    std::fs::create_dir_all(&config.server.data_dir)?;
    let caps = Capabilities::from_config(&config)?;
    let components = components::build(&config, caps)?;

    let result = components.pipeline.run(&args.query, &[]).await;

    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
        OutputFormat::Text => {
            println!();
            println!("Query: {}", result.query);
            println!("{}", "─".repeat(60));
            println!("{}", render::chat_reply(&result));
            println!("{}", "─".repeat(60));
            println!("{} documents in {:.1}s", result.total_found, result.elapsed_secs);
            if let Some(error) = &result.error {
                println!("⚠ {}", error);
            }
            println!();
        }
    }

    Ok(())
}
