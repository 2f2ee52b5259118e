//! ChurnForge: a Rust CLI application for energy customer churn prediction
//!
//! This library derives price-volatility and tenure features from client and
//! price series tables, encodes them into a numeric modelling table and fits a
//! class-weighted decision forest to predict churn.

pub mod cli;
pub mod config;
pub mod data;
pub mod encode;
pub mod error;
pub mod features;
pub mod metrics;
pub mod model;
pub mod viz;

// Re-export public items for easier access
pub use cli::Args;
pub use config::{ClassWeights, EncoderConfig, ForestConfig, PipelineConfig};
pub use data::{load_client_data, load_modelling_data, load_price_data};
pub use encode::Encoder;
pub use error::PipelineError;
pub use features::{synthesize_features, tenure_churn_rates};
pub use metrics::ClassificationReport;
pub use model::{train_and_evaluate, train_test_split, ChurnForest, FeatureMatrix, TrainingOutcome};

/// Common result type used throughout the application
pub type Result<T> = anyhow::Result<T>;
