//! ChurnForge: churn prediction from client and energy price data
//!
//! This is the main entrypoint that orchestrates data loading, feature
//! engineering, encoding, model fitting and reporting.

use anyhow::Result;
use churnforge::data::write_csv;
use churnforge::{
    load_client_data, load_modelling_data, load_price_data, synthesize_features, tenure_churn_rates,
    train_and_evaluate, viz, Args, Encoder, FeatureMatrix, PipelineConfig,
};
use clap::Parser;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

/// Rows shown in table previews
const PREVIEW_ROWS: usize = 5;

fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse();
    init_logging(args.verbose);

    let config = args.to_config()?;

    if args.verbose {
        println!("ChurnForge - Churn Prediction with a Decision Forest");
        println!("====================================================\n");
    }

    run_full_pipeline(&args, &config)
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Run load, feature engineering, encoding, training and reporting
fn run_full_pipeline(args: &Args, config: &PipelineConfig) -> Result<()> {
    println!("=== Churn Prediction Pipeline ===\n");

    let start_time = Instant::now();

    // Step 1: Load both stores
    if args.verbose {
        println!("Step 1: Loading data");
        println!("  Client file: {}", args.client_data);
        println!("  Price file: {}", args.price_data);
    }

    let client_df = load_client_data(&args.client_data)?;
    let price_df = load_price_data(&args.price_data)?;

    println!("✓ Data loaded: {} clients, {} price quotes", client_df.height(), price_df.height());
    println!("{}", client_df.head(Some(PREVIEW_ROWS)));
    println!("{}", price_df.head(Some(PREVIEW_ROWS)));

    // Step 2: Price and tenure features
    if args.verbose {
        println!("\nStep 2: Engineering price and tenure features");
    }

    let feature_start = Instant::now();
    let enriched = synthesize_features(&client_df, &price_df)?;
    let feature_time = feature_start.elapsed();

    println!("\n✓ Features engineered: {} clients, {} columns", enriched.height(), enriched.width());
    if args.verbose {
        println!("  Processing time: {:.2}s", feature_time.as_secs_f64());
    }
    println!("{}", enriched.head(Some(PREVIEW_ROWS)));

    let tenure_rates = tenure_churn_rates(&enriched)?;
    println!("\n=== Churn Rate by Tenure ===");
    println!("{}", tenure_rates);

    // Step 3: Encode and normalize
    if args.verbose {
        println!("\nStep 3: Encoding categorical, date and skewed columns");
        println!("  Reference date: {}", config.encoder.reference_date);
    }

    let encoder = Encoder::new(config.encoder.clone());
    let mut encoded = encoder.transform(&enriched)?;

    println!("\n✓ Encoded table: {} columns", encoded.width());
    println!("{}", encoded.head(Some(PREVIEW_ROWS)));

    if let Some(export_path) = &args.export {
        write_csv(&mut encoded, export_path)?;
        println!("Encoded table saved to: {}", export_path);
    }

    // Step 4: Train and evaluate
    let modelling = match &args.modelling_data {
        Some(path) => {
            if args.verbose {
                println!("\nStep 4: Training on prepared table {}", path);
            }
            load_modelling_data(path, &config.label_column)?
        }
        None => {
            if args.verbose {
                println!("\nStep 4: Training on the encoded table");
            }
            encoded
        }
    };

    let matrix = FeatureMatrix::from_frame(&modelling, &config.label_column)?;
    println!("\nX shape: {:?}", matrix.features.shape());
    println!("y shape: {:?}", matrix.labels.shape());

    if args.verbose {
        println!("  Trees: {}", config.forest.n_trees);
        println!("  Test size: {}", config.test_size);
        println!(
            "  Class weights: {{0: {}, 1: {}}}",
            config.forest.class_weights.negative, config.forest.class_weights.positive
        );
    }

    let model_start = Instant::now();
    let outcome = train_and_evaluate(&matrix, config)?;
    let model_time = model_start.elapsed();

    println!("✓ Model fitted on {} rows, evaluated on {} rows", outcome.train_rows, outcome.test_rows);
    if args.verbose {
        println!("  Fitting time: {:.2}s", model_time.as_secs_f64());
    }

    println!("\n=== Held-out Evaluation ===");
    println!("{}", outcome.report);

    println!("\nTop 10 Feature Importances:");
    for (name, importance) in outcome.forest.feature_importance_ranking().iter().take(10) {
        println!("  {}: {:.4}", name, importance);
    }

    // Step 5: Charts
    if let Some(plot_path) = &args.plot {
        let tenure_path = match plot_path.strip_suffix(".png") {
            Some(stem) => format!("{}_tenure.png", stem),
            None => format!("{}_tenure.png", plot_path),
        };
        viz::create_feature_importance_chart(&outcome.forest, plot_path)?;
        viz::create_tenure_churn_chart(&tenure_rates, &tenure_path)?;
        println!("\nImportance chart saved to: {}", plot_path);
        println!("Tenure chart saved to: {}", tenure_path);
    }

    let total_time = start_time.elapsed();
    println!("\n=== Pipeline Complete ===");
    println!("Total processing time: {:.2}s", total_time.as_secs_f64());

    Ok(())
}
