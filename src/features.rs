//! Price volatility and tenure features joined onto the client table
//!
//! Every feature is keyed by client `id`. The price series is first collapsed
//! to one row per (`id`, `price_date`) so that duplicate quotes for the same
//! period count once, then aggregated per client in three independent ways:
//! the off-peak change between the earliest and latest period, the tier
//! spreads of the whole-series means, and the largest tier spread observed in
//! any single period. Tenure comes from the client table alone.

use crate::data::{CHURN_COLUMN, ID_COLUMN, PRICE_COLUMNS, PRICE_DATE_COLUMN};
use crate::error::PipelineError;
use polars::prelude::*;
use tracing::{debug, info, warn};

pub const ENERGY_DIFF_COLUMN: &str = "offpeak_diff_dec_january_energy";
pub const POWER_DIFF_COLUMN: &str = "offpeak_diff_dec_january_power";
pub const TENURE_COLUMN: &str = "tenure";

const DAYS_PER_YEAR: f64 = 365.0;

/// A difference between two pricing tiers of the same component
struct TierSpread {
    name: &'static str,
    minuend: &'static str,
    subtrahend: &'static str,
}

const TIER_SPREADS: [TierSpread; 6] = [
    TierSpread { name: "off_peak_peak_var", minuend: "price_off_peak_var", subtrahend: "price_peak_var" },
    TierSpread { name: "peak_mid_peak_var", minuend: "price_peak_var", subtrahend: "price_mid_peak_var" },
    TierSpread { name: "off_peak_mid_peak_var", minuend: "price_off_peak_var", subtrahend: "price_mid_peak_var" },
    TierSpread { name: "off_peak_peak_fix", minuend: "price_off_peak_fix", subtrahend: "price_peak_fix" },
    TierSpread { name: "peak_mid_peak_fix", minuend: "price_peak_fix", subtrahend: "price_mid_peak_fix" },
    TierSpread { name: "off_peak_mid_peak_fix", minuend: "price_off_peak_fix", subtrahend: "price_mid_peak_fix" },
];

/// Names of the six whole-series mean spread columns
pub fn mean_diff_columns() -> Vec<String> {
    TIER_SPREADS.iter().map(|s| format!("{}_mean_diff", s.name)).collect()
}

/// Names of the six per-period maximum spread columns
pub fn max_monthly_diff_columns() -> Vec<String> {
    TIER_SPREADS.iter().map(|s| format!("{}_max_monthly_diff", s.name)).collect()
}

/// Derive every price and tenure feature and inner-join them onto the clients
///
/// # Arguments
/// * `client_df` - Typed client table (see [`crate::data::prepare_client_frame`])
/// * `price_df` - Typed price table (see [`crate::data::prepare_price_frame`])
///
/// # Returns
/// * A new table with one row per client that has at least one price quote
pub fn synthesize_features(client_df: &DataFrame, price_df: &DataFrame) -> crate::Result<DataFrame> {
    let monthly = monthly_prices(price_df);

    let offpeak_diff = offpeak_period_diff(monthly.clone());
    let mean_diffs = mean_tier_diffs(price_df);
    let max_diffs = max_monthly_tier_diffs(monthly);

    let enriched = client_df
        .clone()
        .lazy()
        .with_column(tenure_expr())
        .inner_join(offpeak_diff, col(ID_COLUMN), col(ID_COLUMN))
        .inner_join(mean_diffs, col(ID_COLUMN), col(ID_COLUMN))
        .inner_join(max_diffs, col(ID_COLUMN), col(ID_COLUMN))
        .collect()?;

    let dropped = client_df.height().saturating_sub(enriched.height());
    if dropped > 0 {
        warn!(dropped, "clients without a price series were dropped");
    }

    if enriched.height() == 0 {
        return Err(PipelineError::EmptyJoinResult {
            key: ID_COLUMN.to_string(),
            context: format!(
                "none of {} clients matched the {} price quotes",
                client_df.height(),
                price_df.height()
            ),
        }
        .into());
    }

    info!(rows = enriched.height(), columns = enriched.width(), "synthesized features");
    Ok(enriched)
}

/// Mean churn rate per tenure year, highest rate first
pub fn tenure_churn_rates(enriched: &DataFrame) -> crate::Result<DataFrame> {
    let rates = enriched
        .clone()
        .lazy()
        .group_by([col(TENURE_COLUMN)])
        .agg([
            col(CHURN_COLUMN).cast(DataType::Float64).mean().alias("churn_rate"),
            col(CHURN_COLUMN).count().alias("clients"),
        ])
        .sort_by_exprs(
            [col("churn_rate"), col(TENURE_COLUMN)],
            SortMultipleOptions::default().with_order_descending_multi([true, false]),
        )
        .collect()?;
    Ok(rates)
}

/// Integer years between activation and contract end, truncated toward zero
fn tenure_expr() -> Expr {
    let days = col("date_end").cast(DataType::Int32) - col("date_activ").cast(DataType::Int32);
    (days.cast(DataType::Float64) / lit(DAYS_PER_YEAR))
        .cast(DataType::Int64)
        .alias(TENURE_COLUMN)
}

/// Collapse duplicate quotes to one row per (id, period) by averaging
fn monthly_prices(price_df: &DataFrame) -> LazyFrame {
    let aggs: Vec<Expr> = PRICE_COLUMNS.iter().map(|name| col(name).mean()).collect();
    price_df
        .clone()
        .lazy()
        .group_by([col(ID_COLUMN), col(PRICE_DATE_COLUMN)])
        .agg(aggs)
}

/// Latest minus earliest off-peak price per client
///
/// Periods are sorted explicitly inside each group; input row order is not trusted.
/// Periods without a quote for a component are skipped for that component.
fn offpeak_period_diff(monthly: LazyFrame) -> LazyFrame {
    monthly
        .group_by([col(ID_COLUMN)])
        .agg([
            by_period("price_off_peak_var").first().alias("first_off_peak_var"),
            by_period("price_off_peak_var").last().alias("last_off_peak_var"),
            by_period("price_off_peak_fix").first().alias("first_off_peak_fix"),
            by_period("price_off_peak_fix").last().alias("last_off_peak_fix"),
        ])
        .select([
            col(ID_COLUMN),
            (col("last_off_peak_var") - col("first_off_peak_var")).alias(ENERGY_DIFF_COLUMN),
            (col("last_off_peak_fix") - col("first_off_peak_fix")).alias(POWER_DIFF_COLUMN),
        ])
}

fn by_period(name: &str) -> Expr {
    col(name)
        .sort_by([col(PRICE_DATE_COLUMN)], SortMultipleOptions::default())
        .drop_nulls()
}

/// Tier spreads of the whole-series mean prices per client
fn mean_tier_diffs(price_df: &DataFrame) -> LazyFrame {
    let means: Vec<Expr> = PRICE_COLUMNS.iter().map(|name| col(name).mean()).collect();

    let mut spreads = vec![col(ID_COLUMN)];
    spreads.extend(
        TIER_SPREADS
            .iter()
            .map(|s| (col(s.minuend) - col(s.subtrahend)).alias(&format!("{}_mean_diff", s.name))),
    );

    debug!("computing whole-series mean tier spreads");
    price_df
        .clone()
        .lazy()
        .group_by([col(ID_COLUMN)])
        .agg(means)
        .select(spreads)
}

/// Largest tier spread seen in any single period per client
fn max_monthly_tier_diffs(monthly: LazyFrame) -> LazyFrame {
    let spreads: Vec<Expr> = TIER_SPREADS
        .iter()
        .map(|s| (col(s.minuend) - col(s.subtrahend)).alias(&format!("{}_max_monthly_diff", s.name)))
        .collect();
    let maxima: Vec<Expr> = TIER_SPREADS
        .iter()
        .map(|s| col(&format!("{}_max_monthly_diff", s.name)).max())
        .collect();

    monthly
        .with_columns(spreads)
        .group_by([col(ID_COLUMN)])
        .agg(maxima)
}
