//! Pipeline configuration with defaults matching the reference dataset

use chrono::NaiveDate;
use std::collections::BTreeMap;

/// Columns whose distribution is heavily right-skewed and gets a `log10(x + 1)` transform
pub const DEFAULT_SKEWED_COLUMNS: [&str; 10] = [
    "cons_12m",
    "cons_gas_12m",
    "cons_last_month",
    "forecast_cons_12m",
    "forecast_cons_year",
    "forecast_discount_energy",
    "forecast_meter_rent_12m",
    "forecast_price_energy_off_peak",
    "forecast_price_energy_peak",
    "forecast_price_pow_off_peak",
];

/// Sample weights per class, applied while growing each tree
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassWeights {
    pub negative: f32,
    pub positive: f32,
}

impl Default for ClassWeights {
    fn default() -> Self {
        // Churners influence training 10x more than retained customers
        Self {
            negative: 1.0,
            positive: 10.0,
        }
    }
}

impl ClassWeights {
    pub fn weight_for(&self, label: usize) -> f32 {
        if label == 1 {
            self.positive
        } else {
            self.negative
        }
    }
}

/// One categorical column to one-hot encode
#[derive(Debug, Clone, PartialEq)]
pub struct CategoricalField {
    /// Source column name
    pub column: String,
    /// Prefix for the indicator columns (`{prefix}_{value}`)
    pub prefix: String,
    /// Category values whose indicator column is dropped after encoding
    pub reference_categories: Vec<String>,
}

impl CategoricalField {
    pub fn new(column: &str, prefix: &str, reference_categories: &[&str]) -> Self {
        Self {
            column: column.to_string(),
            prefix: prefix.to_string(),
            reference_categories: reference_categories.iter().map(|c| c.to_string()).collect(),
        }
    }
}

/// Settings for the encoder and normalizer stage
#[derive(Debug, Clone, PartialEq)]
pub struct EncoderConfig {
    /// Instant the month deltas of the lifecycle dates are measured from
    pub reference_date: NaiveDate,
    pub categorical_fields: Vec<CategoricalField>,
    pub skewed_columns: Vec<String>,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            reference_date: NaiveDate::from_ymd_opt(2016, 1, 1).unwrap_or_default(),
            categorical_fields: vec![
                CategoricalField::new(
                    "channel_sales",
                    "channel",
                    &[
                        "sddiedcslfslkckwlfkdpoeeailfpeds",
                        "epumfxlbckeskwekxbiuasklxalciiuu",
                    ],
                ),
                CategoricalField::new(
                    "origin_up",
                    "origin_up",
                    &[
                        "MISSING",
                        "usapbepcfoloekilkwsdiboslwaxobdp",
                        "ewxeelcelemmiwuafmddpobolfuxioce",
                    ],
                ),
            ],
            skewed_columns: DEFAULT_SKEWED_COLUMNS.iter().map(|c| c.to_string()).collect(),
        }
    }
}

impl EncoderConfig {
    /// Replace the reference categories of the named fields
    ///
    /// Overrides are keyed by source column; fields not mentioned keep their defaults.
    pub fn with_reference_overrides(mut self, overrides: &BTreeMap<String, Vec<String>>) -> Self {
        for field in &mut self.categorical_fields {
            if let Some(categories) = overrides.get(&field.column) {
                field.reference_categories = categories.clone();
            }
        }
        self
    }
}

/// Forest hyperparameters
#[derive(Debug, Clone, PartialEq)]
pub struct ForestConfig {
    pub n_trees: usize,
    /// Maximum depth of each tree, unbounded if None
    pub max_depth: Option<usize>,
    /// Columns sampled once per tree (random subspace); all columns if None
    pub max_features: Option<usize>,
    pub min_weight_split: f32,
    pub min_weight_leaf: f32,
    pub bootstrap: bool,
    pub seed: u64,
    pub class_weights: ClassWeights,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            n_trees: 100,
            max_depth: None,
            max_features: None,
            min_weight_split: 2.0,
            min_weight_leaf: 1.0,
            bootstrap: true,
            seed: 42,
            class_weights: ClassWeights::default(),
        }
    }
}

/// Full pipeline configuration
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub encoder: EncoderConfig,
    pub forest: ForestConfig,
    /// Fraction of rows held out for evaluation
    pub test_size: f64,
    /// Seed for the train/test shuffle
    pub split_seed: u64,
    /// Label column of the modelling table
    pub label_column: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            encoder: EncoderConfig::default(),
            forest: ForestConfig::default(),
            test_size: 0.25,
            split_seed: 42,
            label_column: "churn".to_string(),
        }
    }
}
