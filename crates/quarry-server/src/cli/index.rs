use crate::cli::{ClearArgs, IndexCommands, IndexSearchArgs, OutputFormat};
use anyhow::Result;
use quarry_core::SimilarityIndex;
use quarry_server::components::{self, Capabilities};
use quarry_server::config::QuarryConfig;
use quarry_server::render::truncate;
use std::sync::Arc;

pub async fn run(cmd: IndexCommands, config: QuarryConfig) -> Result<()> {
    let embedder = Capabilities::embedder_from_config(&config)?;
    let index = components::open_index(&config, embedder)?;

    match cmd {
        IndexCommands::Stats => stats(&index),
        IndexCommands::Search(args) => search(&index, args),
        IndexCommands::Rebuild => rebuild(&index),
        IndexCommands::Clear(args) => clear(&index, args),
    }
}

fn stats(index: &Arc<SimilarityIndex>) -> Result<()> {
    let stats = index.stats()?;

    println!();
    println!("Similarity Index");
    println!("{}", "─".repeat(50));
    println!("Documents: {:>8}", stats.count);
    println!("Graph:     {:>8}", stats.graph_size);
    println!("Dimension: {:>8}", stats.dimension);
    println!("Model:     {}", stats.model);
    if let Some(dir) = &stats.store_dir {
        println!("Store:     {}", dir.display());
    }
    println!("{}", "─".repeat(50));
    println!();
    Ok(())
}

fn search(index: &Arc<SimilarityIndex>, args: IndexSearchArgs) -> Result<()> {
    let hits = index.search(&args.query, args.k, args.threshold)?;

    if args.format == OutputFormat::Json {
        let results: Vec<_> = hits
            .iter()
            .map(|(doc, score)| serde_json::json!({"document": doc, "score": score}))
            .collect();
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }

    println!("{:>4}  {:<6}  {:<10}  {}", "RANK", "SCORE", "SOURCE", "TITLE");
    println!("{}", "─".repeat(80));
    for (i, (doc, score)) in hits.iter().enumerate() {
        println!(
            "{:>4}  {:.4}  {:<10}  {}",
            i + 1,
            score,
            truncate(&doc.provenance().source, 10),
            truncate(doc.title(), 55)
        );
    }
    Ok(())
}

fn rebuild(index: &Arc<SimilarityIndex>) -> Result<()> {
    let count = index.rebuild()?;
    index.persist()?;
    println!("Rebuilt similarity index: {} documents re-embedded.", count);
    Ok(())
}

fn clear(index: &Arc<SimilarityIndex>, args: ClearArgs) -> Result<()> {
    if !args.yes {
        anyhow::bail!(
            "Refusing to clear {} documents without --yes",
            index.count()
        );
    }
    let removed = index.count();
    index.clear()?;
    println!("Cleared similarity index ({} documents removed).", removed);
    Ok(())
}
