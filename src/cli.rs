//! Command-line interface definitions and argument parsing

use crate::config::{ClassWeights, EncoderConfig, ForestConfig, PipelineConfig};
use crate::error::PipelineError;
use chrono::NaiveDate;
use clap::Parser;
use std::collections::BTreeMap;

/// Churn prediction CLI: price-volatility features and a class-weighted decision forest
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the client CSV file
    #[arg(long, default_value = "data/client_data.csv")]
    pub client_data: String,

    /// Path to the price series CSV file
    #[arg(long, default_value = "data/price_data.csv")]
    pub price_data: String,

    /// Train on this prepared feature table instead of the freshly engineered one
    #[arg(short, long)]
    pub modelling_data: Option<String>,

    /// Write the encoded feature table to this CSV path
    #[arg(short, long)]
    pub export: Option<String>,

    /// Output path for the feature importance chart (a tenure chart is written next to it)
    #[arg(short, long)]
    pub plot: Option<String>,

    /// Random seed for the train/test split and the forest
    #[arg(long, default_value = "42")]
    pub seed: u64,

    /// Fraction of rows held out for evaluation
    #[arg(long, default_value = "0.25")]
    pub test_size: f64,

    /// Class weights as "negative,positive"
    /// Example: --class-weights "1,10" makes churners count ten times as much
    #[arg(long, default_value = "1,10")]
    pub class_weights: String,

    /// Number of trees in the forest
    #[arg(long, default_value = "100")]
    pub n_trees: usize,

    /// Maximum depth of each tree (unbounded when omitted)
    #[arg(long)]
    pub max_depth: Option<usize>,

    /// Reference date the lifecycle month deltas are measured from
    #[arg(long, default_value = "2016-01-01")]
    pub reference_date: String,

    /// Replace the reference categories of a field, as "field=value" (repeatable)
    /// Example: --drop-category origin_up=MISSING
    #[arg(long = "drop-category")]
    pub drop_categories: Vec<String>,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    /// Parse class weights from the "negative,positive" string
    pub fn parse_class_weights(&self) -> crate::Result<ClassWeights> {
        let parts: Vec<&str> = self.class_weights.split(',').collect();
        if parts.len() != 2 {
            anyhow::bail!("Class weights must be in format 'negative,positive'");
        }

        let negative: f32 = parts[0]
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("Invalid negative class weight: {}", parts[0]))?;
        let positive: f32 = parts[1]
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("Invalid positive class weight: {}", parts[1]))?;

        if !(negative > 0.0 && positive > 0.0) {
            anyhow::bail!("Class weights must be positive");
        }

        Ok(ClassWeights { negative, positive })
    }

    /// Group "field=value" overrides by field
    pub fn parse_drop_categories(&self) -> crate::Result<BTreeMap<String, Vec<String>>> {
        let mut overrides: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for entry in &self.drop_categories {
            let (field, value) = entry
                .split_once('=')
                .ok_or_else(|| anyhow::anyhow!("Drop category must be in format 'field=value': {}", entry))?;
            overrides
                .entry(field.trim().to_string())
                .or_default()
                .push(value.trim().to_string());
        }
        Ok(overrides)
    }

    /// Build the pipeline configuration from the arguments
    pub fn to_config(&self) -> crate::Result<PipelineConfig> {
        if !(self.test_size > 0.0 && self.test_size < 1.0) {
            return Err(PipelineError::InvalidConfig(format!(
                "test size must be in (0, 1), got {}",
                self.test_size
            ))
            .into());
        }
        if self.n_trees == 0 {
            return Err(PipelineError::InvalidConfig("n-trees must be at least 1".to_string()).into());
        }

        let reference_date = NaiveDate::parse_from_str(&self.reference_date, "%Y-%m-%d")
            .map_err(|_| anyhow::anyhow!("Invalid reference date: {}", self.reference_date))?;

        let encoder = EncoderConfig {
            reference_date,
            ..EncoderConfig::default()
        }
        .with_reference_overrides(&self.parse_drop_categories()?);

        let forest = ForestConfig {
            n_trees: self.n_trees,
            max_depth: self.max_depth,
            seed: self.seed,
            class_weights: self.parse_class_weights()?,
            ..ForestConfig::default()
        };

        Ok(PipelineConfig {
            encoder,
            forest,
            test_size: self.test_size,
            split_seed: self.seed,
            ..PipelineConfig::default()
        })
    }
}
