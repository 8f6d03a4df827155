use std::fs;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use slidewise::core::config::{AppConfig, AppPaths};
use slidewise::llm::GeminiBackend;
use slidewise::pipeline::Pipeline;
use slidewise::store::{CollectionStore, HttpCollectionStore};

#[derive(Parser)]
#[command(name = "slidewise")]
#[command(about = "Rewrites a PowerPoint deck with generated alt text and speaker notes")]
struct Cli {
    /// Presentation to process
    input: PathBuf,

    /// Where to write the rebuilt deck (defaults to the output directory)
    output: Option<PathBuf>,

    /// Configuration file
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load(cli.config.as_deref())?;
    let paths = AppPaths::new(&config);
    slidewise::logging::init(&paths.log_dir);

    if let Err(err) = run(cli, config, paths).await {
        tracing::error!("{err:#}");
        return Err(err);
    }
    Ok(())
}

async fn run(args: Cli, config: AppConfig, paths: AppPaths) -> anyhow::Result<()> {
    config.ensure_api_key()?;

    let file_name = args
        .input
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .with_context(|| format!("input path has no file name: {}", args.input.display()))?;
    let source = fs::read(&args.input)
        .with_context(|| format!("failed to read {}", args.input.display()))?;

    let store = HttpCollectionStore::new(&config.store);
    store
        .health()
        .await
        .context("collection store is not reachable")?;
    let backend = GeminiBackend::new(&config.backend, &config.retry);

    let pipeline = Pipeline::new(&store, &backend);
    let output = pipeline.run(&source, &file_name).await?;

    let output_path = args
        .output
        .unwrap_or_else(|| paths.output_dir.join(format!("accessible_{file_name}")));
    fs::write(&output_path, &output.document)
        .with_context(|| format!("failed to write {}", output_path.display()))?;

    let report = &output.report;
    tracing::info!(
        collection = %report.collection_id,
        slides = report.slides,
        described = report.described,
        failures = report.description_failures,
        skipped = report.skipped_shapes.len(),
        "wrote {}",
        output_path.display()
    );
    if !report.skipped_shapes.is_empty() {
        tracing::debug!(
            "skipped shapes: {}",
            serde_json::to_string(&report.skipped_shapes).unwrap_or_default()
        );
    }
    println!("{}", output_path.display());
    Ok(())
}
