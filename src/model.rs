//! Class-weighted decision forest for churn classification

use crate::config::{ForestConfig, PipelineConfig};
use crate::data::ID_COLUMN;
use crate::error::PipelineError;
use crate::metrics::ClassificationReport;
use linfa::prelude::*;
use linfa_trees::{DecisionTree, SplitQuality};
use ndarray::{Array1, Array2, Axis};
use polars::prelude::{DataFrame, DataType};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info};

/// Columns that never enter the feature matrix: the client key and stray index columns
pub const EXCLUDED_COLUMNS: [&str; 3] = [ID_COLUMN, "", "Unnamed: 0"];

/// Numeric features and binary labels ready for training
#[derive(Debug, Clone)]
pub struct FeatureMatrix {
    /// Feature values (n_samples, n_features)
    pub features: Array2<f64>,
    /// Churn labels, 0 or 1
    pub labels: Array1<usize>,
    /// Column name of each feature
    pub feature_names: Vec<String>,
}

impl FeatureMatrix {
    /// Build the matrix from a fully numeric table
    ///
    /// Every column except the label and [`EXCLUDED_COLUMNS`] becomes a
    /// feature. Textual columns and missing values are rejected.
    pub fn from_frame(df: &DataFrame, label_column: &str) -> crate::Result<Self> {
        let label_series = df
            .column(label_column)
            .map_err(|_| PipelineError::schema("modelling data", format!("missing label column '{}'", label_column)))?
            .cast(&DataType::Int64)?;

        let mut labels = Vec::with_capacity(df.height());
        for value in label_series.i64()?.into_iter() {
            match value {
                Some(0) => labels.push(0),
                Some(1) => labels.push(1),
                other => {
                    return Err(PipelineError::schema(
                        "modelling data",
                        format!("label '{}' must be 0 or 1, found {:?}", label_column, other),
                    )
                    .into())
                }
            }
        }

        let mut feature_names = Vec::new();
        let mut values: Vec<f64> = Vec::new();
        for series in df.get_columns() {
            let name = series.name().to_string();
            if name == label_column || EXCLUDED_COLUMNS.contains(&name.as_str()) {
                continue;
            }
            if !(series.dtype().is_numeric() || series.dtype() == &DataType::Boolean) {
                return Err(PipelineError::schema(
                    "modelling data",
                    format!("column '{}' is not numeric ({})", name, series.dtype()),
                )
                .into());
            }
            if series.null_count() > 0 {
                return Err(PipelineError::schema(
                    "modelling data",
                    format!("column '{}' has {} missing values", name, series.null_count()),
                )
                .into());
            }

            let as_float = series.cast(&DataType::Float64)?;
            let column = as_float.f64()?;
            if column.into_no_null_iter().any(|v| !v.is_finite()) {
                return Err(PipelineError::schema(
                    "modelling data",
                    format!("column '{}' has NaN or infinite values", name),
                )
                .into());
            }
            values.extend(column.into_no_null_iter());
            feature_names.push(name);
        }

        if feature_names.is_empty() {
            return Err(PipelineError::schema("modelling data", "no feature columns").into());
        }

        // Values were gathered column by column
        let features = Array2::from_shape_vec((feature_names.len(), labels.len()), values)
            .map_err(PipelineError::from)?
            .reversed_axes()
            .as_standard_layout()
            .to_owned();

        Ok(Self {
            features,
            labels: Array1::from_vec(labels),
            feature_names,
        })
    }

    pub fn n_samples(&self) -> usize {
        self.features.nrows()
    }

    pub fn n_features(&self) -> usize {
        self.features.ncols()
    }

    /// Rows at the given indices, in that order
    pub fn select_rows(&self, indices: &[usize]) -> Self {
        Self {
            features: self.features.select(Axis(0), indices),
            labels: self.labels.select(Axis(0), indices),
            feature_names: self.feature_names.clone(),
        }
    }
}

/// Train/test split result
#[derive(Debug, Clone)]
pub struct TrainTestSplit {
    pub train: FeatureMatrix,
    pub test: FeatureMatrix,
}

/// Seeded random split, no stratification
///
/// `ceil(n * test_size)` rows are held out, as scikit-learn does.
pub fn train_test_split(data: &FeatureMatrix, test_size: f64, seed: u64) -> crate::Result<TrainTestSplit> {
    if !(test_size > 0.0 && test_size < 1.0) {
        return Err(PipelineError::InvalidConfig(format!("test size must be in (0, 1), got {}", test_size)).into());
    }

    let n = data.n_samples();
    let n_test = (n as f64 * test_size).ceil() as usize;
    if n_test == 0 || n_test >= n {
        return Err(PipelineError::InvalidConfig(format!(
            "cannot hold out {} of {} rows for testing",
            n_test, n
        ))
        .into());
    }

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut indices: Vec<usize> = (0..n).collect();
    indices.shuffle(&mut rng);

    let (test_idx, train_idx) = indices.split_at(n_test);
    debug!(train = train_idx.len(), test = test_idx.len(), "split rows");

    Ok(TrainTestSplit {
        train: data.select_rows(train_idx),
        test: data.select_rows(test_idx),
    })
}

/// One tree of the forest with the feature columns it was grown on
#[derive(Debug, Clone)]
struct ForestMember {
    tree: DecisionTree<f64, usize>,
    features: Vec<usize>,
}

/// Bagged ensemble of Gini decision trees with class-weighted samples
#[derive(Debug, Clone)]
pub struct ChurnForest {
    config: ForestConfig,
    members: Vec<ForestMember>,
    feature_names: Vec<String>,
    feature_importances: Vec<f64>,
}

impl ChurnForest {
    pub fn new(config: ForestConfig) -> Self {
        Self {
            config,
            members: Vec::new(),
            feature_names: Vec::new(),
            feature_importances: Vec::new(),
        }
    }

    /// Grow every tree on its own bootstrap sample
    ///
    /// With `max_features` set, each tree also sees only a random subset of
    /// the columns for its whole structure (random subspace). Unset, every
    /// tree sees all columns.
    ///
    /// Tree `i` draws from a generator seeded with `seed + i`, so a fixed
    /// seed reproduces the same forest.
    pub fn fit(&mut self, data: &FeatureMatrix) -> crate::Result<()> {
        let n_samples = data.n_samples();
        let n_features = data.n_features();
        if n_samples == 0 || n_features == 0 {
            return Err(PipelineError::InvalidConfig("cannot fit a forest on an empty matrix".to_string()).into());
        }
        if self.config.n_trees == 0 {
            return Err(PipelineError::InvalidConfig("forest needs at least one tree".to_string()).into());
        }

        let max_features = self
            .config
            .max_features
            .unwrap_or(n_features)
            .clamp(1, n_features);

        let params = DecisionTree::<f64, usize>::params()
            .split_quality(SplitQuality::Gini)
            .max_depth(self.config.max_depth)
            .min_weight_split(self.config.min_weight_split)
            .min_weight_leaf(self.config.min_weight_leaf);

        let mut members = Vec::with_capacity(self.config.n_trees);
        for i in 0..self.config.n_trees {
            let mut rng = ChaCha8Rng::seed_from_u64(self.config.seed.wrapping_add(i as u64));

            let rows: Vec<usize> = if self.config.bootstrap {
                (0..n_samples).map(|_| rng.gen_range(0..n_samples)).collect()
            } else {
                (0..n_samples).collect()
            };
            let mut features = rand::seq::index::sample(&mut rng, n_features, max_features).into_vec();
            features.sort_unstable();

            let records = data.features.select(Axis(0), &rows).select(Axis(1), &features);
            let targets = data.labels.select(Axis(0), &rows);
            let weights = targets.mapv(|label| self.config.class_weights.weight_for(label));

            let dataset = Dataset::new(records, targets).with_weights(weights);
            let tree = params.fit(&dataset).map_err(PipelineError::from)?;
            members.push(ForestMember { tree, features });
        }

        self.members = members;
        self.feature_names = data.feature_names.clone();
        self.feature_importances = self.aggregate_importances(n_features);

        info!(
            trees = self.members.len(),
            max_features,
            samples = n_samples,
            "fitted decision forest"
        );
        Ok(())
    }

    /// Impurity importances averaged over trees, normalized to sum to one
    fn aggregate_importances(&self, n_features: usize) -> Vec<f64> {
        let mut importances = vec![0.0; n_features];
        for member in &self.members {
            for (&global, importance) in member.features.iter().zip(member.tree.feature_importance()) {
                importances[global] += importance;
            }
        }

        let sum: f64 = importances.iter().sum();
        if sum > 0.0 {
            for importance in &mut importances {
                *importance /= sum;
            }
        }
        importances
    }

    /// Share of trees voting for churn, per row
    pub fn predict_proba(&self, features: &Array2<f64>) -> Array1<f64> {
        let mut positive = Array1::<f64>::zeros(features.nrows());
        if self.members.is_empty() {
            return positive;
        }

        for member in &self.members {
            let records = features.select(Axis(1), &member.features);
            let votes: Array1<usize> = member.tree.predict(&records);
            positive += &votes.mapv(|v| if v == 1 { 1.0 } else { 0.0 });
        }
        positive / self.members.len() as f64
    }

    /// Majority vote; ties go to the retained class
    pub fn predict(&self, features: &Array2<f64>) -> Array1<usize> {
        self.predict_proba(features).mapv(|p| if p > 0.5 { 1 } else { 0 })
    }

    pub fn n_trees(&self) -> usize {
        self.members.len()
    }

    pub fn config(&self) -> &ForestConfig {
        &self.config
    }

    pub fn feature_importances(&self) -> &[f64] {
        &self.feature_importances
    }

    /// Feature names with importances, most important first
    pub fn feature_importance_ranking(&self) -> Vec<(&str, f64)> {
        let mut ranking: Vec<(&str, f64)> = self
            .feature_names
            .iter()
            .zip(self.feature_importances.iter())
            .map(|(name, &importance)| (name.as_str(), importance))
            .collect();

        ranking.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranking
    }
}

/// Fitted forest together with its held-out evaluation
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub forest: ChurnForest,
    pub report: ClassificationReport,
    pub train_rows: usize,
    pub test_rows: usize,
}

/// Split, fit on the training rows and score the held-out rows
pub fn train_and_evaluate(data: &FeatureMatrix, config: &PipelineConfig) -> crate::Result<TrainingOutcome> {
    let split = train_test_split(data, config.test_size, config.split_seed)?;

    let mut forest = ChurnForest::new(config.forest.clone());
    forest.fit(&split.train)?;

    let predictions = forest.predict(&split.test.features);
    let report = ClassificationReport::evaluate(&split.test.labels.to_vec(), &predictions.to_vec());

    Ok(TrainingOutcome {
        forest,
        report,
        train_rows: split.train.n_samples(),
        test_rows: split.test.n_samples(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::prelude::df;

    /// Two informative features and one noise feature, 1 in 5 rows churn
    fn create_test_matrix(n: usize) -> FeatureMatrix {
        let mut values = Vec::with_capacity(n * 3);
        let mut labels = Vec::with_capacity(n);
        for i in 0..n {
            let churn = i % 5 == 0;
            let signal = if churn { 2.0 } else { -2.0 } + (i % 7) as f64 * 0.1;
            values.extend_from_slice(&[signal, signal * 0.5, (i % 11) as f64]);
            labels.push(usize::from(churn));
        }

        FeatureMatrix {
            features: Array2::from_shape_vec((n, 3), values).unwrap(),
            labels: Array1::from_vec(labels),
            feature_names: vec!["margin".to_string(), "tenure".to_string(), "noise".to_string()],
        }
    }

    fn small_forest(seed: u64) -> ForestConfig {
        ForestConfig {
            n_trees: 15,
            max_depth: Some(4),
            seed,
            ..Default::default()
        }
    }

    #[test]
    fn test_from_frame_excludes_id_and_label() {
        let df = df!(
            "id" => ["A1", "B2"],
            "cons_12m" => [1.5, 2.5],
            "has_gas" => [1i32, 0],
            "churn" => [0i64, 1]
        )
        .unwrap();

        let matrix = FeatureMatrix::from_frame(&df, "churn").unwrap();
        assert_eq!(matrix.feature_names, vec!["cons_12m", "has_gas"]);
        assert_eq!(matrix.features.shape(), &[2, 2]);
        assert_eq!(matrix.labels.to_vec(), vec![0, 1]);
    }

    #[test]
    fn test_from_frame_rejects_text_columns() {
        let df = df!(
            "channel_sales" => ["foo", "bar"],
            "churn" => [0i64, 1]
        )
        .unwrap();

        let err = FeatureMatrix::from_frame(&df, "churn").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::SchemaMismatch { .. })
        ));
    }

    #[test]
    fn test_from_frame_rejects_non_finite_values() {
        for bad in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let df = df!("x" => [1.0, bad], "churn" => [0i64, 1]).unwrap();
            let err = FeatureMatrix::from_frame(&df, "churn").unwrap_err();
            assert!(matches!(
                err.downcast_ref::<PipelineError>(),
                Some(PipelineError::SchemaMismatch { .. })
            ));
        }
    }

    #[test]
    fn test_from_frame_rejects_non_binary_labels() {
        let df = df!("x" => [1.0, 2.0], "churn" => [0i64, 2]).unwrap();
        assert!(FeatureMatrix::from_frame(&df, "churn").is_err());
    }

    #[test]
    fn test_split_sizes() {
        let data = create_test_matrix(10);
        let split = train_test_split(&data, 0.25, 42).unwrap();

        // ceil(10 * 0.25) = 3
        assert_eq!(split.test.n_samples(), 3);
        assert_eq!(split.train.n_samples(), 7);
    }

    #[test]
    fn test_split_is_reproducible() {
        let data = create_test_matrix(40);
        let a = train_test_split(&data, 0.25, 7).unwrap();
        let b = train_test_split(&data, 0.25, 7).unwrap();

        assert_eq!(a.test.features, b.test.features);
        assert_eq!(a.train.labels, b.train.labels);
    }

    #[test]
    fn test_split_rejects_bad_ratio() {
        let data = create_test_matrix(10);
        assert!(train_test_split(&data, 0.0, 42).is_err());
        assert!(train_test_split(&data, 1.0, 42).is_err());
    }

    #[test]
    fn test_forest_learns_separable_data() {
        let data = create_test_matrix(100);
        let mut forest = ChurnForest::new(small_forest(42));
        forest.fit(&data).unwrap();

        assert_eq!(forest.n_trees(), 15);
        let predictions = forest.predict(&data.features);
        let correct = predictions.iter().zip(data.labels.iter()).filter(|(p, l)| p == l).count();
        assert!(correct as f64 / data.n_samples() as f64 > 0.9);
    }

    #[test]
    fn test_forest_is_reproducible() {
        let data = create_test_matrix(60);

        let mut a = ChurnForest::new(small_forest(3));
        a.fit(&data).unwrap();
        let mut b = ChurnForest::new(small_forest(3));
        b.fit(&data).unwrap();

        assert_eq!(a.predict_proba(&data.features), b.predict_proba(&data.features));
        assert_eq!(a.feature_importances(), b.feature_importances());
    }

    #[test]
    fn test_random_subspace_forest_is_reproducible() {
        let data = create_test_matrix(60);
        let config = ForestConfig {
            max_features: Some(2),
            ..small_forest(9)
        };

        let mut a = ChurnForest::new(config.clone());
        a.fit(&data).unwrap();
        let mut b = ChurnForest::new(config);
        b.fit(&data).unwrap();

        assert!(a.members.iter().all(|m| m.features.len() == 2));
        assert_eq!(a.predict_proba(&data.features), b.predict_proba(&data.features));
    }

    #[test]
    fn test_feature_importances_normalized() {
        let data = create_test_matrix(80);
        let mut forest = ChurnForest::new(small_forest(42));
        forest.fit(&data).unwrap();

        let sum: f64 = forest.feature_importances().iter().sum();
        assert!((sum - 1.0).abs() < 1e-9);
        assert_eq!(forest.feature_importance_ranking().len(), 3);
        assert_ne!(forest.feature_importance_ranking()[0].0, "noise");
    }

    #[test]
    fn test_train_and_evaluate() {
        let data = create_test_matrix(80);
        let config = PipelineConfig {
            forest: small_forest(42),
            ..Default::default()
        };

        let outcome = train_and_evaluate(&data, &config).unwrap();
        assert_eq!(outcome.test_rows, 20);
        assert_eq!(outcome.train_rows, 60);
        let total: usize = outcome.report.confusion.iter().flatten().sum();
        assert_eq!(total, 20);
    }
}
