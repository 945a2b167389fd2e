use anyhow::Context;
use clap::Parser;
use geo_insight::config::toml_config::TomlConfig;
use geo_insight::core::{ingest, mapping, schema, ConfigProvider, Storage};
use geo_insight::utils::error::ErrorSeverity;
use geo_insight::utils::{logger, validation::Validate};
use geo_insight::{InsightEngine, InsightPipeline, LocalStorage};

#[derive(Parser)]
#[command(name = "toml-insight")]
#[command(about = "geo-insight driven by a TOML project file")]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = "geo-insight.toml")]
    config: String,

    #[arg(short, long)]
    verbose: bool,

    /// Override monitoring setting from config
    #[arg(long)]
    monitor: Option<bool>,

    /// Force built-in heuristics even when an API key is configured
    #[arg(long)]
    no_ai: bool,

    /// Dry run - show what would be processed without executing
    #[arg(long)]
    dry_run: bool,

    /// Emit JSON logs
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if args.json_logs {
        logger::init_json_logger();
    } else {
        logger::init_cli_logger(args.verbose);
    }

    tracing::info!("🚀 Starting TOML-based geo-insight");
    tracing::info!("📁 Loading configuration from: {}", args.config);

    let mut config = match TomlConfig::from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ Failed to load config file '{}': {}", args.config, e);
            eprintln!("💡 Make sure the file exists and is valid TOML format");
            std::process::exit(1);
        }
    };

    if args.no_ai {
        config.ai.enabled = false;
        tracing::info!("🔧 AI disabled from command line");
    }

    if let Err(e) = config.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
        eprintln!("❌ {}", e.user_friendly_message());
        std::process::exit(1);
    }

    tracing::info!("✅ Configuration loaded and validated successfully");
    display_config_summary(&config, &args);

    if args.dry_run {
        tracing::info!("🔍 DRY RUN MODE - No output will be written");
        return perform_dry_run(&config).await;
    }

    let monitor_enabled = args.monitor.unwrap_or_else(|| config.monitoring_enabled());
    if monitor_enabled {
        tracing::info!("🔍 System monitoring enabled");
    }

    let source = LocalStorage::new(".");
    let sink = LocalStorage::new(config.output_path());
    let pipeline = InsightPipeline::new(source, sink, config).context("pipeline setup")?;
    let engine = InsightEngine::new_with_monitoring(pipeline, monitor_enabled);

    match engine.run().await {
        Ok(output_path) => {
            tracing::info!("✅ geo-insight run completed successfully!");
            println!("✅ geo-insight run completed successfully!");
            println!("📁 Output saved to: {}", output_path);
        }
        Err(e) => {
            tracing::error!(
                "❌ geo-insight run failed: {} (Category: {:?}, Severity: {:?})",
                e,
                e.category(),
                e.severity()
            );
            eprintln!("❌ {}", e.user_friendly_message());
            eprintln!("💡 建議: {}", e.recovery_suggestion());

            let exit_code = match e.severity() {
                ErrorSeverity::Low => 0,
                ErrorSeverity::Medium => 2,
                ErrorSeverity::High => 1,
                ErrorSeverity::Critical => 3,
            };
            if exit_code > 0 {
                std::process::exit(exit_code);
            }
        }
    }

    Ok(())
}

fn display_config_summary(config: &TomlConfig, args: &Args) {
    println!("📋 Configuration Summary:");
    println!("  Project: {}", config.project_name().unwrap_or("(suggested)"));
    println!("  Input: {}", config.input_path().unwrap_or(ingest::SAMPLE_DATA_NAME));
    println!("  Output: {}/{}", config.output_path(), config.archive_name());
    match config.ai_settings() {
        Some(ai) => println!("  AI: {} @ {}", ai.model, ai.endpoint),
        None => println!("  AI: disabled (heuristics)"),
    }
    if !config.layers.is_empty() {
        let names: Vec<&str> = config.layers.iter().map(|l| l.r#type.as_str()).collect();
        println!("  Layers: {}", names.join(", "));
    }
    if let Some(chart) = &config.chart {
        println!("  Chart: {}", chart.r#type);
    }
    if args.dry_run {
        println!("  🔍 DRY RUN MODE ENABLED");
    }
    println!();
}

/// 只讀取並分析資料，不呼叫 AI 也不寫檔
async fn perform_dry_run(config: &TomlConfig) -> anyhow::Result<()> {
    let dataset = match config.input_path() {
        Some(path) => {
            let bytes = LocalStorage::new(".")
                .read_file(path)
                .await
                .with_context(|| format!("reading {}", path))?;
            ingest::parse_dataset(path, &bytes)?
        }
        None => ingest::sample_dataset()?,
    };

    println!("🔍 Dry Run Analysis:");
    println!("  Rows: {}", dataset.len());
    println!("  Format: {:?}", dataset.format);

    let types = schema::infer_column_types(&dataset);
    println!();
    println!("📊 Columns:");
    for column in &dataset.columns {
        let column_type = types.get(column).map(|t| t.to_string()).unwrap_or_default();
        println!("  {} ({})", column, column_type);
    }

    let suggested = mapping::heuristic_mapping(&dataset.columns, &types);
    let column_mapping = suggested.merge_overrides(&config.mapping_overrides());
    println!();
    println!("🗺️ Column Mapping:");
    for role in geo_insight::core::MappingRole::ALL {
        println!("  {} -> {}", role.as_str(), column_mapping.get(role).unwrap_or("-"));
    }

    if column_mapping.has_lat_lng() {
        let extraction = mapping::extract_points(&dataset, &column_mapping)?;
        println!();
        println!(
            "📍 {} plottable points, {} rows skipped",
            extraction.points.len(),
            extraction.skipped
        );
    }

    println!();
    println!("✅ Dry run analysis complete.");
    Ok(())
}
