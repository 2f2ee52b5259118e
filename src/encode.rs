//! Encoding of dates, flags and categories plus log scaling of skewed columns

use crate::config::{CategoricalField, EncoderConfig};
use crate::data::parse_date;
use crate::error::PipelineError;
use chrono::Datelike;
use polars::prelude::*;
use std::collections::BTreeSet;
use tracing::{debug, info};

/// Days from 0001-01-01 (CE) to 1970-01-01, the epoch of polars `Date`
const EPOCH_DAYS_FROM_CE: i32 = 719_163;

/// Month length used for date deltas; an approximation, not calendar months
const DAYS_PER_MONTH: f64 = 30.0;

const FLAG_COLUMN: &str = "has_gas";

/// Output column for each lifecycle date, and whether the delta is negated
const MONTH_COLUMNS: [(&str, &str, bool); 4] = [
    ("date_activ", "months_activ", false),
    ("date_end", "months_to_end", true),
    ("date_modif_prod", "months_modif_prod", false),
    ("date_renewal", "months_renewal", false),
];

/// Turns the enriched client table into a fully numeric modelling table
#[derive(Debug, Clone)]
pub struct Encoder {
    config: EncoderConfig,
}

impl Encoder {
    pub fn new(config: EncoderConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EncoderConfig {
        &self.config
    }

    /// Encode then log scale
    pub fn transform(&self, df: &DataFrame) -> crate::Result<DataFrame> {
        let encoded = self.encode(df)?;
        self.normalize(&encoded)
    }

    /// Replace lifecycle dates by month deltas, the gas flag by 0/1 and
    /// categorical columns by indicator columns
    ///
    /// Each step only touches columns still in their raw form, so encoding an
    /// already encoded table returns it unchanged.
    pub fn encode(&self, df: &DataFrame) -> crate::Result<DataFrame> {
        let mut encoded = self.encode_dates(df.clone())?;
        encoded = encode_flag(encoded)?;
        for field in &self.config.categorical_fields {
            encoded = one_hot(encoded, field)?;
        }

        info!(columns = encoded.width(), "encoded client table");
        Ok(encoded)
    }

    /// Replace every configured skewed column by `log10(x + 1)`
    pub fn normalize(&self, df: &DataFrame) -> crate::Result<DataFrame> {
        let mut exprs = Vec::with_capacity(self.config.skewed_columns.len());
        for name in &self.config.skewed_columns {
            if df.column(name).is_err() {
                return Err(PipelineError::schema(
                    "encoded table",
                    format!("skewed column '{}' is missing", name),
                )
                .into());
            }
            exprs.push(
                (col(name).cast(DataType::Float64) + lit(1.0))
                    .log(10.0)
                    .alias(name),
            );
        }

        let normalized = df.clone().lazy().with_columns(exprs).collect()?;
        debug!(columns = self.config.skewed_columns.len(), "log scaled skewed columns");
        Ok(normalized)
    }

    fn encode_dates(&self, df: DataFrame) -> crate::Result<DataFrame> {
        let reference_days = self.config.reference_date.num_days_from_ce() - EPOCH_DAYS_FROM_CE;

        let mut exprs = Vec::new();
        let mut present = Vec::new();
        for (source, target, negate) in MONTH_COLUMNS {
            let Ok(column) = df.column(source) else {
                continue;
            };
            let date = if column.dtype() == &DataType::String {
                parse_date(source)
            } else {
                col(source)
            };
            let days = lit(reference_days) - date.cast(DataType::Int32);
            let months = (days.cast(DataType::Float64) / lit(DAYS_PER_MONTH)).cast(DataType::Int64);
            let months = if negate { lit(0i64) - months } else { months };
            exprs.push(months.alias(target));
            present.push(source);
        }

        if exprs.is_empty() {
            return Ok(df);
        }

        let mut encoded = df.lazy().with_columns(exprs).collect()?;
        for source in present {
            encoded = encoded.drop(source)?;
        }
        Ok(encoded)
    }
}

impl Default for Encoder {
    fn default() -> Self {
        Self::new(EncoderConfig::default())
    }
}

/// `t` becomes 1 and anything else 0; already numeric flags are left alone
fn encode_flag(df: DataFrame) -> crate::Result<DataFrame> {
    let expr = match df.column(FLAG_COLUMN).map(|c| c.dtype().clone()) {
        Ok(DataType::String) => when(col(FLAG_COLUMN).eq(lit("t")))
            .then(lit(1i32))
            .otherwise(lit(0i32))
            .alias(FLAG_COLUMN),
        Ok(DataType::Boolean) => col(FLAG_COLUMN).cast(DataType::Int32),
        _ => return Ok(df),
    };
    Ok(df.lazy().with_column(expr).collect()?)
}

/// Expand one categorical column into `{prefix}_{value}` indicator columns
///
/// The vocabulary is whatever values the table holds. Reference categories
/// missing from it are skipped.
fn one_hot(df: DataFrame, field: &CategoricalField) -> crate::Result<DataFrame> {
    let Ok(column) = df.column(&field.column) else {
        return Ok(df);
    };

    let values = column.cast(&DataType::String)?;
    let vocabulary: BTreeSet<String> = values
        .str()?
        .into_iter()
        .flatten()
        .map(|v| v.to_string())
        .collect();

    let indicators: Vec<Expr> = vocabulary
        .iter()
        .map(|value| {
            when(col(&field.column).cast(DataType::String).eq(lit(value.as_str())))
                .then(lit(1i32))
                .otherwise(lit(0i32))
                .alias(&indicator_name(field, value))
        })
        .collect();

    let mut encoded = df.lazy().with_columns(indicators).collect()?;
    encoded = encoded.drop(&field.column)?;

    for category in &field.reference_categories {
        if vocabulary.contains(category) {
            encoded = encoded.drop(&indicator_name(field, category))?;
        } else {
            debug!(field = %field.column, category = %category, "reference category not observed");
        }
    }

    debug!(field = %field.column, categories = vocabulary.len(), "one-hot encoded");
    Ok(encoded)
}

fn indicator_name(field: &CategoricalField, value: &str) -> String {
    format!("{}_{}", field.prefix, value)
}
