//! Charts of the fitted forest and the engineered features using Plotters

use crate::features::TENURE_COLUMN;
use crate::model::ChurnForest;
use plotters::prelude::*;
use polars::prelude::{DataFrame, DataType};
use tracing::info;

/// Bars shown in the importance chart
const TOP_FEATURES: usize = 15;

const BAR_COLOR: RGBColor = RGBColor(31, 119, 180);
const CHURN_COLOR: RGBColor = RGBColor(214, 39, 40);

/// Horizontal bar chart of the most important features
///
/// # Arguments
/// * `forest` - Fitted forest
/// * `output_path` - Path to save the PNG plot
pub fn create_feature_importance_chart(forest: &ChurnForest, output_path: &str) -> crate::Result<()> {
    let ranking = top_features(&forest.feature_importance_ranking(), TOP_FEATURES);
    if ranking.is_empty() {
        anyhow::bail!("Forest has no feature importances to plot");
    }
    let max_importance = ranking.iter().map(|(_, v)| *v).fold(0.0, f64::max).max(1e-9);
    let n_bars = ranking.len();

    let root = BitMapBackend::new(output_path, (900, 600)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption("Feature Importances", ("sans-serif", 30))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(280)
        .build_cartesian_2d(0f64..(max_importance * 1.1), 0f64..(n_bars as f64))?;

    // Highest importance at the top
    let labels: Vec<String> = ranking.iter().rev().map(|(name, _)| name.to_string()).collect();
    chart
        .configure_mesh()
        .disable_y_mesh()
        .y_labels(n_bars)
        .y_label_formatter(&|y| {
            let idx = y.floor() as usize;
            labels.get(idx).cloned().unwrap_or_default()
        })
        .x_desc("Relative impurity decrease")
        .axis_desc_style(("sans-serif", 15))
        .draw()?;

    for (i, (_, importance)) in ranking.iter().rev().enumerate() {
        chart.draw_series(std::iter::once(Rectangle::new(
            [(0.0, i as f64 + 0.1), (*importance, i as f64 + 0.9)],
            BAR_COLOR.filled(),
        )))?;
    }

    root.present()?;
    info!(path = output_path, "feature importance chart saved");
    Ok(())
}

/// Bar chart of churn rate per tenure year
pub fn create_tenure_churn_chart(tenure_rates: &DataFrame, output_path: &str) -> crate::Result<()> {
    let mut points = tenure_points(tenure_rates)?;
    points.sort_by_key(|(tenure, _)| *tenure);
    let (min_tenure, max_tenure) = tenure_range(&points);
    let max_rate = points.iter().map(|(_, r)| *r).fold(0.0, f64::max).max(1e-9);

    let root = BitMapBackend::new(output_path, (800, 500)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption("Churn Rate by Tenure", ("sans-serif", 30))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d((min_tenure - 0.5)..(max_tenure + 0.5), 0f64..(max_rate * 1.1))?;

    chart
        .configure_mesh()
        .x_desc("Tenure (years)")
        .y_desc("Churn rate")
        .axis_desc_style(("sans-serif", 15))
        .draw()?;

    chart.draw_series(points.iter().map(|&(tenure, rate)| {
        Rectangle::new(
            [(tenure as f64 - 0.4, 0.0), (tenure as f64 + 0.4, rate)],
            CHURN_COLOR.filled(),
        )
    }))?;

    root.present()?;
    info!(path = output_path, "tenure churn chart saved");
    Ok(())
}

/// First `n` entries of an importance ranking
fn top_features<'a>(ranking: &[(&'a str, f64)], n: usize) -> Vec<(&'a str, f64)> {
    ranking.iter().take(n).copied().collect()
}

/// Observed tenure span, always including zero
fn tenure_range(points: &[(i64, f64)]) -> (f64, f64) {
    let min = points.iter().map(|(t, _)| *t).min().unwrap_or(0).min(0);
    let max = points.iter().map(|(t, _)| *t).max().unwrap_or(0).max(0);
    (min as f64, max as f64)
}

/// (tenure, churn rate) pairs from [`crate::features::tenure_churn_rates`] output
fn tenure_points(tenure_rates: &DataFrame) -> crate::Result<Vec<(i64, f64)>> {
    let tenure = tenure_rates.column(TENURE_COLUMN)?.cast(&DataType::Int64)?;
    let rate = tenure_rates.column("churn_rate")?.cast(&DataType::Float64)?;

    let points = tenure
        .i64()?
        .into_iter()
        .zip(rate.f64()?.into_iter())
        .filter_map(|(t, r)| Some((t?, r?)))
        .collect();
    Ok(points)
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::prelude::df;

    #[test]
    fn test_top_features_keeps_ranking_order() {
        let ranking = vec![("margin", 0.5), ("tenure", 0.3), ("cons_12m", 0.2)];
        let top = top_features(&ranking, 2);
        assert_eq!(top, vec![("margin", 0.5), ("tenure", 0.3)]);
    }

    #[test]
    fn test_tenure_range_covers_negative_tenure() {
        assert_eq!(tenure_range(&[(-2, 0.5), (3, 0.1)]), (-2.0, 3.0));
        assert_eq!(tenure_range(&[(4, 0.2), (7, 0.1)]), (0.0, 7.0));
        assert_eq!(tenure_range(&[]), (0.0, 0.0));
    }

    #[test]
    fn test_tenure_points_skip_nulls() {
        let rates = df!(
            "tenure" => [Some(3i64), None, Some(6)],
            "churn_rate" => [0.2, 0.5, 0.1]
        )
        .unwrap();

        let points = tenure_points(&rates).unwrap();
        assert_eq!(points, vec![(3, 0.2), (6, 0.1)]);
    }
}
