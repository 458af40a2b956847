use crate::cli::{OutputFormat, ScreenArgs};
use anyhow::Result;
use quarry_core::ThreatScreen;
use quarry_server::config::QuarryConfig;

pub async fn run(args: ScreenArgs, config: &QuarryConfig) -> Result<()> {
    let screen = ThreatScreen::with_config(config.screen.clone())?;
    let verdict = screen.classify(&args.text);

    if args.format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&verdict)?);
        return Ok(());
    }

    let mark = if verdict.safe { "✅ safe" } else { "⛔ blocked" };
    println!("{}  severity={}  confidence={:.2}", mark, verdict.severity, verdict.confidence);
    if !verdict.threats.is_empty() {
        println!("Threats:");
        for t in &verdict.threats {
            println!("  - {}", t);
        }
    }
    println!("Sanitized: {}", verdict.sanitized);
    if let Some(error) = &verdict.error {
        println!("Analysis error: {}", error);
    }
    Ok(())
}
