//! Binary classification metrics for the held-out split

use std::fmt;

/// Held-out scores of a binary classifier
///
/// Precision, recall and F1 are support-weighted averages over both classes.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationReport {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    /// Area under the ROC curve, undefined when only one class is present
    pub auc: Option<f64>,
    /// `[[tn, fp], [fn, tp]]`, rows are true labels
    pub confusion: [[usize; 2]; 2],
}

impl ClassificationReport {
    /// Score hard predictions against the true labels
    pub fn evaluate(y_true: &[usize], y_pred: &[usize]) -> Self {
        let confusion = confusion_matrix(y_true, y_pred);
        let total: usize = confusion.iter().flatten().sum();
        let correct = confusion[0][0] + confusion[1][1];

        let mut precision = 0.0;
        let mut recall = 0.0;
        let mut f1 = 0.0;
        for class in 0..2 {
            let other = 1 - class;
            let tp = confusion[class][class] as f64;
            let fp = confusion[other][class] as f64;
            let fn_ = confusion[class][other] as f64;
            let support = tp + fn_;

            let p = ratio(tp, tp + fp);
            let r = ratio(tp, support);
            let f = ratio(2.0 * p * r, p + r);

            precision += support * p;
            recall += support * r;
            f1 += support * f;
        }

        let scores: Vec<f64> = y_pred.iter().map(|&p| p as f64).collect();

        Self {
            accuracy: ratio(correct as f64, total as f64),
            precision: ratio(precision, total as f64),
            recall: ratio(recall, total as f64),
            f1: ratio(f1, total as f64),
            auc: roc_auc(y_true, &scores),
            confusion,
        }
    }
}

impl fmt::Display for ClassificationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Accuracy: {:.4}", self.accuracy)?;
        writeln!(f, "Precision: {:.4}", self.precision)?;
        writeln!(f, "Recall: {:.4}", self.recall)?;
        writeln!(f, "F1 score: {:.4}", self.f1)?;
        match self.auc {
            Some(auc) => writeln!(f, "AUC: {:.3}", auc)?,
            None => writeln!(f, "AUC: undefined (single class in test split)")?,
        }
        writeln!(f, "Confusion matrix:")?;
        writeln!(f, "[[{} {}]", self.confusion[0][0], self.confusion[0][1])?;
        write!(f, " [{} {}]]", self.confusion[1][0], self.confusion[1][1])
    }
}

/// Count `[[tn, fp], [fn, tp]]`; labels other than 0/1 count as 1
pub fn confusion_matrix(y_true: &[usize], y_pred: &[usize]) -> [[usize; 2]; 2] {
    let mut matrix = [[0usize; 2]; 2];
    for (&t, &p) in y_true.iter().zip(y_pred.iter()) {
        matrix[t.min(1)][p.min(1)] += 1;
    }
    matrix
}

/// ROC AUC from the rank sum of the positive scores (Mann-Whitney U)
///
/// Tied scores share their average rank.
pub fn roc_auc(y_true: &[usize], scores: &[f64]) -> Option<f64> {
    let n = y_true.len().min(scores.len());
    let n_pos = y_true[..n].iter().filter(|&&y| y == 1).count();
    let n_neg = n - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return None;
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    let mut positive_rank_sum = 0.0;
    let mut start = 0;
    while start < order.len() {
        let mut end = start;
        while end + 1 < order.len() && scores[order[end + 1]] == scores[order[start]] {
            end += 1;
        }
        // Ranks are 1-based; a tie group spanning [start, end] shares the mean rank
        let rank = (start + end) as f64 / 2.0 + 1.0;
        for &idx in &order[start..=end] {
            if y_true[idx] == 1 {
                positive_rank_sum += rank;
            }
        }
        start = end + 1;
    }

    let n_pos = n_pos as f64;
    let u = positive_rank_sum - n_pos * (n_pos + 1.0) / 2.0;
    Some(u / (n_pos * n_neg as f64))
}

fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        0.0
    } else {
        numerator / denominator
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const Y_TRUE: [usize; 6] = [0, 0, 0, 0, 1, 1];
    const Y_PRED: [usize; 6] = [0, 0, 0, 1, 1, 0];

    #[test]
    fn test_confusion_matrix() {
        assert_eq!(confusion_matrix(&Y_TRUE, &Y_PRED), [[3, 1], [1, 1]]);
    }

    #[test]
    fn test_weighted_scores() {
        let report = ClassificationReport::evaluate(&Y_TRUE, &Y_PRED);

        assert!((report.accuracy - 4.0 / 6.0).abs() < 1e-12);
        // class 0: p = r = 0.75 (support 4); class 1: p = r = 0.5 (support 2)
        assert!((report.precision - 4.0 / 6.0).abs() < 1e-12);
        assert!((report.recall - 4.0 / 6.0).abs() < 1e-12);
        assert!((report.f1 - 4.0 / 6.0).abs() < 1e-12);
    }

    #[test]
    fn test_auc_from_hard_predictions() {
        // (1 + TPR - FPR) / 2 = (1 + 0.5 - 0.25) / 2
        let report = ClassificationReport::evaluate(&Y_TRUE, &Y_PRED);
        assert!((report.auc.unwrap() - 0.625).abs() < 1e-12);
    }

    #[test]
    fn test_auc_from_scores() {
        let y = [0, 0, 1, 1];
        assert_eq!(roc_auc(&y, &[0.1, 0.4, 0.35, 0.8]), Some(0.75));
        assert_eq!(roc_auc(&y, &[0.1, 0.2, 0.8, 0.9]), Some(1.0));
    }

    #[test]
    fn test_auc_undefined_for_single_class() {
        assert_eq!(roc_auc(&[0, 0, 0], &[0.1, 0.2, 0.3]), None);
    }

    #[test]
    fn test_zero_division_is_zero() {
        let report = ClassificationReport::evaluate(&[0, 0, 1], &[0, 0, 0]);
        assert_eq!(report.confusion, [[2, 0], [1, 0]]);
        // class 1 is never predicted: its precision counts as 0
        assert!((report.precision - (2.0 / 3.0) * (2.0 / 3.0)).abs() < 1e-12);
    }

    #[test]
    fn test_display() {
        let report = ClassificationReport::evaluate(&Y_TRUE, &Y_PRED);
        let text = report.to_string();
        assert!(text.contains("Accuracy: 0.6667"));
        assert!(text.contains("AUC: 0.625"));
        assert!(text.ends_with("[[3 1]\n [1 1]]"));
    }
}
