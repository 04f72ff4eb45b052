//! Per-class feature sums for univariate ANOVA F scores

use std::collections::BTreeMap;

use batchfit_core::{Aggregation, Column, ColumnData, Error, RecordBatch, Result, Scalar, Table};
use statrs::distribution::{ContinuousCDF, FisherSnedecor};

use super::{aggregate_count, aggregate_f64, ensure_numeric, ensure_rows, ensure_same_columns};

/// Rows and feature sums of one class
#[derive(Debug, Clone, PartialEq)]
pub struct ClassStats {
    /// Rows labelled with this class
    pub count: u64,

    /// Per-feature sums over those rows
    pub sums: Vec<f64>,
}

/// Sufficient statistics for the one-way ANOVA F test of every feature
#[derive(Debug, Clone, PartialEq)]
pub struct UnivariateState {
    /// Accumulated feature columns, in order
    pub columns: Vec<String>,

    /// Rows seen so far
    pub n_samples: u64,

    /// Per-feature sums of squares over all rows
    pub sum_sq: Vec<f64>,

    /// Statistics per class label, ordered by label
    pub classes: BTreeMap<Scalar, ClassStats>,
}

impl UnivariateState {
    /// State of a single batch with a one-column target.
    ///
    /// Features and target must be free of missing values.
    pub fn update(features: &Table, target: &Table) -> Result<Self> {
        ensure_rows(features, "class statistics")?;
        ensure_numeric(features)?;
        if target.column_count() != 1 {
            return Err(Error::InvalidArgument(format!(
                "expected a single target column, got {}",
                target.column_count()
            )));
        }

        let columns = features.column_names();
        let n_features = columns.len();
        let rows = features.row_count() as u64;

        let mut aggs: Vec<Aggregation> = columns
            .iter()
            .enumerate()
            .map(|(i, name)| Aggregation::sum(name).alias(&format!("sum_{}", i)))
            .collect();
        if let Some(first) = columns.first() {
            aggs.push(Aggregation::count(first).alias("rows"));
        }
        let grouped = features.group_by_target(target, &aggs)?;

        let counts: Vec<Aggregation> = columns
            .iter()
            .enumerate()
            .map(|(i, name)| Aggregation::count(name).alias(&format!("count_{}", i)))
            .collect();
        let out = features.aggregate(&counts)?;
        for (i, name) in columns.iter().enumerate() {
            if aggregate_count(&out, &format!("count_{}", i))? != rows {
                return Err(Error::InvalidArgument(format!(
                    "feature '{}' contains missing values",
                    name
                )));
            }
        }

        let labels = grouped.column(0)?;
        let mut classes = BTreeMap::new();
        let mut labelled = 0;
        for row in 0..grouped.row_count() {
            let sums = (0..n_features)
                .map(|i| {
                    grouped
                        .column_by_name(&format!("sum_{}", i))
                        .map(|c| c.value(row).as_f64().unwrap_or(f64::NAN))
                })
                .collect::<Result<Vec<_>>>()?;
            let count = match grouped.column_by_name("rows")?.value(row) {
                Scalar::Int64(n) => u64::try_from(n).unwrap_or(0),
                _ => 0,
            };
            labelled += count;
            classes.insert(labels.value(row), ClassStats { count, sums });
        }
        if labelled != rows {
            return Err(Error::InvalidArgument(
                "target contains missing values".into(),
            ));
        }

        let squared = features.map_batches(square_all)?;
        let squares: Vec<Aggregation> = columns
            .iter()
            .enumerate()
            .map(|(i, name)| Aggregation::sum(name).alias(&format!("sq_{}", i)))
            .collect();
        let out = squared.aggregate(&squares)?;
        let sum_sq = (0..n_features)
            .map(|i| aggregate_f64(&out, &format!("sq_{}", i)))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            columns,
            n_samples: rows,
            sum_sq,
            classes,
        })
    }

    /// Merge with the state of a later batch
    pub fn combine(&self, other: &UnivariateState) -> Result<Self> {
        ensure_same_columns(&self.columns, &other.columns)?;
        let mut classes = self.classes.clone();
        for (label, stats) in &other.classes {
            match classes.get_mut(label) {
                Some(existing) => {
                    existing.count += stats.count;
                    for (a, b) in existing.sums.iter_mut().zip(&stats.sums) {
                        *a += b;
                    }
                }
                None => {
                    classes.insert(label.clone(), stats.clone());
                }
            }
        }
        Ok(Self {
            columns: self.columns.clone(),
            n_samples: self.n_samples + other.n_samples,
            sum_sq: self
                .sum_sq
                .iter()
                .zip(&other.sum_sq)
                .map(|(a, b)| a + b)
                .collect(),
            classes,
        })
    }

    /// ANOVA F statistic and p-value per feature.
    ///
    /// Both are NaN when the degrees of freedom vanish or a feature is
    /// constant within every class and overall.
    pub fn f_scores(&self) -> (Vec<f64>, Vec<f64>) {
        let n = self.n_samples as f64;
        let k = self.classes.len() as f64;
        let df_between = k - 1.0;
        let df_within = n - k;
        let distribution = if df_between > 0.0 && df_within > 0.0 {
            FisherSnedecor::new(df_between, df_within).ok()
        } else {
            None
        };

        let mut scores = Vec::with_capacity(self.columns.len());
        let mut pvalues = Vec::with_capacity(self.columns.len());
        for j in 0..self.columns.len() {
            let total: f64 = self.classes.values().map(|c| c.sums[j]).sum();
            let correction = total * total / n;
            let ss_total = self.sum_sq[j] - correction;
            let ss_between = self
                .classes
                .values()
                .map(|c| c.sums[j] * c.sums[j] / c.count as f64)
                .sum::<f64>()
                - correction;
            let ss_within = ss_total - ss_between;

            let f = (ss_between / df_between) / (ss_within / df_within);
            let p = match &distribution {
                Some(dist) if f.is_finite() => dist.sf(f),
                Some(_) if f.is_infinite() && f > 0.0 => 0.0,
                _ => f64::NAN,
            };
            scores.push(f);
            pvalues.push(p);
        }
        (scores, pvalues)
    }
}

fn square_all(batch: &RecordBatch) -> Result<RecordBatch> {
    let columns = batch
        .columns()
        .iter()
        .map(|column| {
            let data = column
                .f64_values()?
                .into_iter()
                .map(|v| v.map(|x| x * x))
                .collect();
            Ok(Column::new(column.name(), ColumnData::Float64(data)))
        })
        .collect::<Result<Vec<_>>>()?;
    RecordBatch::from_columns(columns)
}
