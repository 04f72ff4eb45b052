//! One-vs-rest logistic regression trained by plain SGD.
//!
//! Each row updates every binary model once per epoch, in canonical row
//! order:
//! ```text
//! g  = (sigmoid(w . x + b) - y) * sample_weight
//! w <- w - eta0 * (g * x + alpha * w)
//! b <- b - eta0 * g
//! ```
//! Two classes share a single model whose positive class is the second one.

use batchfit_core::{Batch, Column, Error, RecordBatch, Result, Scalar, Table};
use serde::Serialize;

use super::ensure_columns;
use crate::accumulator::ensure_numeric;
use crate::config::{validate_classes, SgdClassifierConfig};

/// Name of the single output column of `predict`
pub const PREDICTION_COLUMN: &str = "prediction";

/// Trained parameters of the SGD classifier
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SgdParams {
    /// Feature columns
    pub columns: Vec<String>,
    /// Class labels, in model order
    pub classes: Vec<Scalar>,
    /// Weights per binary model
    pub coef: Vec<Vec<f64>>,
    /// Intercept per binary model
    pub intercept: Vec<f64>,
    /// Rows trained on
    pub n_samples_seen: u64,
}

impl SgdParams {
    fn decision(&self, x: &[f64]) -> Vec<f64> {
        self.coef
            .iter()
            .zip(&self.intercept)
            .map(|(w, b)| w.iter().zip(x).map(|(w, x)| w * x).sum::<f64>() + b)
            .collect()
    }

    fn label(&self, scores: &[f64]) -> Scalar {
        if self.classes.len() == 2 {
            let positive = scores.first().is_some_and(|&s| s > 0.0);
            return self.classes[usize::from(positive)].clone();
        }
        let mut best = 0;
        for (i, score) in scores.iter().enumerate() {
            if *score > scores[best] {
                best = i;
            }
        }
        self.classes[best].clone()
    }
}

fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

/// Rows of a numeric table in canonical order; missing cells are rejected
fn feature_rows(table: &Table) -> Result<Vec<Vec<f64>>> {
    ensure_numeric(table)?;
    let canonical = table.to_canonical()?;
    let columns = canonical
        .columns()
        .iter()
        .map(|c| {
            c.f64_values()?
                .into_iter()
                .map(|v| {
                    v.filter(|x| !x.is_nan()).ok_or_else(|| {
                        Error::InvalidArgument(format!("feature '{}' contains missing values", c.name()))
                    })
                })
                .collect::<Result<Vec<f64>>>()
        })
        .collect::<Result<Vec<_>>>()?;
    Ok((0..canonical.row_count())
        .map(|row| columns.iter().map(|c| c[row]).collect())
        .collect())
}

/// Logistic-regression classifier trained incrementally by SGD
#[derive(Debug, Clone, PartialEq)]
pub struct SgdClassifier {
    config: SgdClassifierConfig,
    classes: Option<Vec<Scalar>>,
    params: Option<SgdParams>,
}

impl SgdClassifier {
    /// Create an untrained classifier
    pub fn new(config: SgdClassifierConfig) -> Result<Self> {
        config.validate()?;
        let classes = config.classes.clone().map(|mut classes| {
            classes.sort();
            classes
        });
        Ok(Self {
            config,
            classes,
            params: None,
        })
    }

    /// Configuration
    pub fn config(&self) -> &SgdClassifierConfig {
        &self.config
    }

    /// Trained parameters, if trained
    pub fn params(&self) -> Option<&SgdParams> {
        self.params.as_ref()
    }

    /// Known class labels
    pub fn classes(&self) -> Option<&[Scalar]> {
        self.classes.as_deref()
    }

    /// Declare the full set of class labels ahead of incremental training
    pub fn set_classes(&mut self, classes: Vec<Scalar>) -> Result<()> {
        validate_classes(&classes)?;
        let mut sorted = classes;
        sorted.sort();
        if let Some(params) = &self.params {
            if params.classes != sorted {
                return Err(Error::Configuration(
                    "class labels cannot change after training started".into(),
                ));
            }
        }
        self.classes = Some(sorted);
        Ok(())
    }

    /// Drop the trained weights; declared classes are kept
    pub fn reset(&mut self) {
        self.params = None;
    }

    /// Train from scratch, inferring the classes from the target when none are declared
    pub fn fit(&mut self, batch: &Batch) -> Result<()> {
        self.params = None;
        if self.classes.is_none() {
            let target = require_target(batch)?;
            let column = target.column_names().into_iter().next().ok_or_else(|| {
                Error::InvalidArgument("target has no columns".into())
            })?;
            let classes: Vec<Scalar> = target
                .distinct(&column)?
                .into_iter()
                .filter(|c| !c.is_null() && !c.is_nan())
                .collect();
            self.set_classes(classes)?;
        }
        self.partial_fit(batch)
    }

    /// Run one pass of SGD over a batch; the classes must be known
    pub fn partial_fit(&mut self, batch: &Batch) -> Result<()> {
        let classes = match (&self.params, &self.classes) {
            (Some(params), _) => params.classes.clone(),
            (None, Some(classes)) => classes.clone(),
            (None, None) => {
                return Err(Error::Configuration(
                    "sgd_classifier needs the class labels before incremental training".into(),
                ))
            }
        };
        let target = require_target(batch)?;
        if target.column_count() != 1 {
            return Err(Error::InvalidArgument(format!(
                "expected a single target column, got {}",
                target.column_count()
            )));
        }

        let features = batch.features();
        let columns = features.column_names();
        if let Some(params) = &self.params {
            ensure_columns(features, &params.columns)?;
        }
        let rows = feature_rows(features)?;
        if rows.is_empty() && self.params.is_none() {
            return Err(Error::EmptyBatch(
                "sgd_classifier cannot start training on a batch with no rows".into(),
            ));
        }
        let labels = target
            .to_canonical()?
            .column(0)?
            .iter()
            .map(|label| {
                classes.iter().position(|c| *c == label).ok_or_else(|| {
                    Error::InvalidArgument(format!("label '{}' is not a declared class", label))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let weights = batch.weights();

        let n_models = if classes.len() == 2 { 1 } else { classes.len() };
        let mut params = self.params.clone().unwrap_or_else(|| SgdParams {
            columns,
            classes: classes.clone(),
            coef: vec![vec![0.0; features.column_count()]; n_models],
            intercept: vec![0.0; n_models],
            n_samples_seen: 0,
        });

        let SgdClassifierConfig { alpha, eta0, epochs, .. } = self.config;
        for _ in 0..epochs {
            for (row, (x, &label)) in rows.iter().zip(&labels).enumerate() {
                let sample_weight = weights.map_or(1.0, |w| w[row]);
                for model in 0..n_models {
                    let positive = if n_models == 1 { 1 } else { model };
                    let y = if label == positive { 1.0 } else { 0.0 };
                    let w = &mut params.coef[model];
                    let z = w.iter().zip(x).map(|(w, x)| w * x).sum::<f64>()
                        + params.intercept[model];
                    let g = (sigmoid(z) - y) * sample_weight;
                    for (wj, xj) in w.iter_mut().zip(x) {
                        *wj -= eta0 * (g * xj + alpha * *wj);
                    }
                    params.intercept[model] -= eta0 * g;
                }
            }
        }
        params.n_samples_seen += rows.len() as u64;

        self.params = Some(params);
        Ok(())
    }

    /// Predicted class per row, as a single `prediction` column
    pub fn predict(&self, table: &Table) -> Result<Table> {
        let params = super::trained(self.params.as_ref(), "sgd_classifier")?.clone();
        ensure_columns(table, &params.columns)?;
        ensure_numeric(table)?;
        table.map_batches(move |batch| {
            let rows = feature_rows(&Table::in_memory(batch.clone()))?;
            let labels: Vec<Scalar> = rows
                .iter()
                .map(|x| params.label(&params.decision(x)))
                .collect();
            RecordBatch::from_columns(vec![Column::infer_from_scalars(
                PREDICTION_COLUMN,
                &labels,
            )?])
        })
    }
}

fn require_target(batch: &Batch) -> Result<&Table> {
    batch
        .target_table()
        .ok_or_else(|| Error::InvalidArgument("sgd_classifier requires a target".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labelled(x: Vec<f64>, y: &[&str]) -> Batch {
        let features = RecordBatch::from_columns(vec![Column::from_f64("x", x)]).unwrap();
        let target = RecordBatch::from_columns(vec![Column::from_strs("y", y)]).unwrap();
        Batch::with_target(Table::in_memory(features), Table::in_memory(target)).unwrap()
    }

    fn separable() -> Batch {
        labelled(
            vec![-3.0, -2.0, -1.5, 1.5, 2.0, 3.0],
            &["neg", "neg", "neg", "pos", "pos", "pos"],
        )
    }

    #[test]
    fn test_partial_fit_needs_classes() {
        let mut sgd = SgdClassifier::new(SgdClassifierConfig::default()).unwrap();
        assert!(matches!(sgd.partial_fit(&separable()), Err(Error::Configuration(_))));
        sgd.set_classes(vec![Scalar::from("pos"), Scalar::from("neg")]).unwrap();
        sgd.partial_fit(&separable()).unwrap();
        assert_eq!(
            sgd.params().unwrap().classes,
            vec![Scalar::from("neg"), Scalar::from("pos")]
        );
    }

    #[test]
    fn test_fit_learns_separable_data() {
        let mut sgd = SgdClassifier::new(SgdClassifierConfig {
            eta0: 0.5,
            epochs: 20,
            ..SgdClassifierConfig::default()
        })
        .unwrap();
        sgd.fit(&separable()).unwrap();
        let params = sgd.params().unwrap();
        assert_eq!(params.coef.len(), 1);
        assert!(params.coef[0][0] > 0.0);
        assert_eq!(params.n_samples_seen, 6);

        let out = sgd.predict(separable().features()).unwrap();
        let predictions: Vec<Scalar> = out.column(PREDICTION_COLUMN).unwrap().iter().collect();
        assert_eq!(predictions[0], Scalar::from("neg"));
        assert_eq!(predictions[5], Scalar::from("pos"));
    }

    #[test]
    fn test_empty_batches() {
        let mut sgd = SgdClassifier::new(SgdClassifierConfig {
            classes: Some(vec![Scalar::from("neg"), Scalar::from("pos")]),
            ..SgdClassifierConfig::default()
        })
        .unwrap();
        let empty = separable().slice(0, 0).unwrap();
        assert!(matches!(sgd.partial_fit(&empty), Err(Error::EmptyBatch(_))));

        sgd.partial_fit(&separable()).unwrap();
        let trained = sgd.clone();
        sgd.partial_fit(&empty).unwrap();
        assert_eq!(sgd, trained);
    }

    #[test]
    fn test_unknown_label_is_rejected() {
        let mut sgd = SgdClassifier::new(SgdClassifierConfig {
            classes: Some(vec![Scalar::from("neg"), Scalar::from("pos")]),
            ..SgdClassifierConfig::default()
        })
        .unwrap();
        let batch = labelled(vec![1.0], &["other"]);
        assert!(matches!(sgd.partial_fit(&batch), Err(Error::InvalidArgument(_))));
        assert!(sgd.params().is_none());
    }

    #[test]
    fn test_multiclass_has_one_model_per_class() {
        let mut sgd = SgdClassifier::new(SgdClassifierConfig::default()).unwrap();
        sgd.fit(&labelled(vec![0.0, 1.0, 2.0], &["a", "b", "c"])).unwrap();
        let params = sgd.params().unwrap();
        assert_eq!(params.coef.len(), 3);
        assert_eq!(params.intercept.len(), 3);
    }

    #[test]
    fn test_zero_weight_rows_do_not_move_the_model() {
        let mut sgd = SgdClassifier::new(SgdClassifierConfig {
            alpha: 0.0,
            classes: Some(vec![Scalar::from("neg"), Scalar::from("pos")]),
            ..SgdClassifierConfig::default()
        })
        .unwrap();
        let batch = separable().sample_weight(vec![0.0; 6]).unwrap();
        sgd.partial_fit(&batch).unwrap();
        assert_eq!(sgd.params().unwrap().coef, vec![vec![0.0]]);
        assert_eq!(sgd.params().unwrap().intercept, vec![0.0]);
    }
}
