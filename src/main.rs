//! RFM Segmenter: scores transaction logs against a pre-trained customer segmentation model
//!
//! Loads the scaler and K-Means artifacts once, then segments every input file
//! as an independent batch and writes the report, summary and chart.

use anyhow::{Context, Result};
use clap::Parser;
use rfm_segmenter::cli::batch_output_path;
use rfm_segmenter::config::{AppConfig, LoggingConfig};
use rfm_segmenter::{
    viz, Args, ModelArtifacts, SegmentError, SegmentLabeler, SegmentReport, SegmentationPipeline,
};
use std::path::Path;
use std::process::ExitCode;
use std::time::Instant;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn main() -> Result<ExitCode> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    };
    args.apply_overrides(&mut config);

    init_logging(&config.logging)?;

    // Artifact or label configuration problems abort before any batch
    let labeler = SegmentLabeler::from_bindings(&config.segments)
        .context("Invalid segment configuration")?;
    let artifacts = ModelArtifacts::load(
        &config.artifacts.scaler_path,
        &config.artifacts.cluster_model_path,
    )
    .context("Failed to load model artifacts")?;
    let pipeline = SegmentationPipeline::new(artifacts, labeler)
        .context("Model artifacts do not match the RFM pipeline configuration")?;

    let multiple_inputs = args.input.len() > 1;
    let mut failed = 0usize;

    for input in &args.input {
        if let Err(e) = run_batch(&pipeline, &config, input, multiple_inputs) {
            failed += 1;
            error!(input = %input.display(), error = %format!("{e:#}"), "Batch failed");
            eprintln!("✗ {}: {e:#}", input.display());

            // Model or labeling problems would fail every remaining batch too
            if e
                .downcast_ref::<SegmentError>()
                .is_some_and(SegmentError::is_startup_fatal)
            {
                return Err(e.context("Model configuration is unusable; remaining batches skipped"));
            }
        }
    }

    if failed > 0 {
        warn!(failed, total = args.input.len(), "Some batches failed");
        return Ok(ExitCode::FAILURE);
    }

    Ok(ExitCode::SUCCESS)
}

/// Initialize the tracing subscriber; `RUST_LOG` wins over the configured level
fn init_logging(logging: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .context("Invalid log level")?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if logging.format.eq_ignore_ascii_case("json") {
        builder.json().init();
    } else {
        builder.init();
    }

    Ok(())
}

/// Segment one input file and write its outputs
fn run_batch(
    pipeline: &SegmentationPipeline,
    config: &AppConfig,
    input: &Path,
    multiple_inputs: bool,
) -> Result<()> {
    let start_time = Instant::now();
    info!(input = %input.display(), "Processing batch");

    let report = pipeline
        .run_file(input)
        .with_context(|| format!("Failed to segment {}", input.display()))?;

    let report_path = batch_output_path(&config.output.report_path, input, multiple_inputs);
    report.write_csv(&report_path)?;

    if let Some(summary_path) = &config.output.summary_path {
        report.write_summary_csv(&batch_output_path(summary_path, input, multiple_inputs))?;
    }

    println!("\n=== {} ===", input.display());
    if report.is_empty() {
        println!("Zero customers found: no row has a customer, a positive quantity and a positive price.");
        println!("Empty report saved to: {}", report_path.display());
        return Ok(());
    }

    print_report(&report, config.output.preview_rows);

    if let Some(chart_path) = &config.output.chart_path {
        let chart_path = batch_output_path(chart_path, input, multiple_inputs);
        viz::create_segment_chart(report.summary(), &chart_path)?;
        println!("Segment chart saved to: {}", chart_path.display());
    }

    println!("Report saved to: {}", report_path.display());
    println!(
        "Processing time: {:.2}s",
        start_time.elapsed().as_secs_f64()
    );

    Ok(())
}

/// Print segment counts and the top spenders
fn print_report(report: &SegmentReport, preview_rows: usize) {
    println!("Unique customers: {}", report.len());
    println!("Total revenue: {}", report.total_monetary().round_dp(2));

    println!("\nCustomers per segment:");
    for count in report.summary() {
        let percentage = (count.customers as f64 / report.len() as f64) * 100.0;
        println!(
            "  {:<18} {:>6} ({:.1}%)",
            count.segment.name(),
            count.customers,
            percentage
        );
    }

    if preview_rows == 0 {
        return;
    }

    println!("\nTop {} customers by monetary value:", preview_rows);
    println!("  Customer | Recency | Frequency |   Monetary | Segment");
    println!("  ---------|---------|-----------|------------|----------------");
    for row in report.top_by_monetary(preview_rows) {
        println!(
            "  {:8} | {:7} | {:9} | {:>10} | {}",
            row.profile.customer_id,
            row.profile.recency,
            row.profile.frequency,
            row.profile.monetary.round_dp(2),
            row.segment.name()
        );
    }
}
