//! Operator configuration.
//!
//! Every operator is constructed from an [`OperatorConfig`], which can be
//! built in code or parsed from JSON:
//!
//! ```text
//! {"op": "min_max_scaler", "feature_range": [0.0, 1.0]}
//! {"op": "simple_imputer", "strategy": "most_frequent", "missing_values": "missing"}
//! {"op": "ordinal_encoder", "handle_unknown": "use_encoded_value", "unknown_value": -1}
//! ```
//!
//! A `null` (or absent) `missing_values` selects the default sentinel, under
//! which nulls and float NaN are missing.

use batchfit_core::{Error, MissingValue, Result, Scalar};
use serde::{Deserialize, Serialize};

/// Configuration of the min-max scaler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MinMaxScalerConfig {
    /// Output range `(low, high)`, `low < high`
    pub feature_range: (f64, f64),
}

impl Default for MinMaxScalerConfig {
    fn default() -> Self {
        Self {
            feature_range: (0.0, 1.0),
        }
    }
}

impl MinMaxScalerConfig {
    /// Reject malformed hyperparameter combinations
    pub fn validate(&self) -> Result<()> {
        let (low, high) = self.feature_range;
        if !low.is_finite() || !high.is_finite() || low >= high {
            return Err(Error::Configuration(format!(
                "feature_range must be finite with low < high, got ({}, {})",
                low, high
            )));
        }
        Ok(())
    }
}

/// Configuration of the standard scaler
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StandardScalerConfig {
    /// Center the data before scaling
    pub with_mean: bool,

    /// Scale the data to unit variance
    #[serde(alias = "with_variance")]
    pub with_std: bool,
}

impl Default for StandardScalerConfig {
    fn default() -> Self {
        Self {
            with_mean: true,
            with_std: true,
        }
    }
}

/// Imputation strategy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImputeStrategy {
    /// Column mean
    #[default]
    Mean,
    /// Exact column median (in-memory backend, no incremental training)
    Median,
    /// Most frequent column value, largest on ties (no incremental training)
    MostFrequent,
    /// Fixed fill value
    Constant,
}

impl ImputeStrategy {
    /// Whether the fill value can be refined batch by batch
    pub fn is_incremental(&self) -> bool {
        matches!(self, ImputeStrategy::Mean | ImputeStrategy::Constant)
    }
}

/// Configuration of the simple imputer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimpleImputerConfig {
    /// How to compute the fill value
    pub strategy: ImputeStrategy,

    /// Which cells count as missing
    pub missing_values: MissingValue,

    /// Fill value of the `constant` strategy; defaults to 0 for numeric and
    /// `"missing_value"` for string columns
    pub fill_value: Option<Scalar>,
}

impl SimpleImputerConfig {
    /// Reject malformed hyperparameter combinations
    pub fn validate(&self) -> Result<()> {
        if self.fill_value.is_some() && self.strategy != ImputeStrategy::Constant {
            return Err(Error::Configuration(format!(
                "fill_value is only used by the constant strategy, not {:?}",
                self.strategy
            )));
        }
        if matches!(self.fill_value, Some(Scalar::Null)) {
            return Err(Error::Configuration("fill_value cannot be null".into()));
        }
        Ok(())
    }
}

/// Handling of categories not seen during fitting
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandleUnknown {
    /// Fail with `UnknownCategory`
    #[default]
    Error,
    /// Encode as `unknown_value` (ordinal encoder)
    UseEncodedValue,
    /// Encode as an all-zero row (one-hot encoder)
    Ignore,
}

/// Configuration of the ordinal encoder
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OrdinalEncoderConfig {
    /// Unknown category policy: `error` or `use_encoded_value`
    pub handle_unknown: HandleUnknown,

    /// Code of unknown categories, required by `use_encoded_value`; may be NaN
    pub unknown_value: Option<f64>,
}

impl OrdinalEncoderConfig {
    /// Reject malformed hyperparameter combinations
    pub fn validate(&self) -> Result<()> {
        match (self.handle_unknown, self.unknown_value) {
            (HandleUnknown::Error, None) | (HandleUnknown::UseEncodedValue, Some(_)) => Ok(()),
            (HandleUnknown::UseEncodedValue, None) => Err(Error::Configuration(
                "handle_unknown = use_encoded_value requires unknown_value".into(),
            )),
            (HandleUnknown::Error, Some(_)) => Err(Error::Configuration(
                "unknown_value requires handle_unknown = use_encoded_value".into(),
            )),
            (HandleUnknown::Ignore, _) => Err(Error::Configuration(
                "the ordinal encoder does not support handle_unknown = ignore".into(),
            )),
        }
    }
}

/// Configuration of the one-hot encoder
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OneHotEncoderConfig {
    /// Unknown category policy: `error` or `ignore`
    pub handle_unknown: HandleUnknown,
}

impl OneHotEncoderConfig {
    /// Reject malformed hyperparameter combinations
    pub fn validate(&self) -> Result<()> {
        if self.handle_unknown == HandleUnknown::UseEncodedValue {
            return Err(Error::Configuration(
                "the one-hot encoder does not support handle_unknown = use_encoded_value".into(),
            ));
        }
        Ok(())
    }
}

/// Configuration of univariate feature selection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SelectKBestConfig {
    /// Number of features to keep
    pub k: usize,
}

impl Default for SelectKBestConfig {
    fn default() -> Self {
        Self { k: 10 }
    }
}

impl SelectKBestConfig {
    /// Reject malformed hyperparameter combinations
    pub fn validate(&self) -> Result<()> {
        if self.k == 0 {
            return Err(Error::Configuration("k must be at least 1".into()));
        }
        Ok(())
    }
}

/// Configuration of the SGD logistic-regression classifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SgdClassifierConfig {
    /// L2 regularization strength
    pub alpha: f64,

    /// Constant learning rate
    pub eta0: f64,

    /// Passes over each batch per training call
    pub epochs: usize,

    /// Full set of class labels, required for incremental training
    pub classes: Option<Vec<Scalar>>,
}

impl Default for SgdClassifierConfig {
    fn default() -> Self {
        Self {
            alpha: 1e-4,
            eta0: 0.01,
            epochs: 1,
            classes: None,
        }
    }
}

impl SgdClassifierConfig {
    /// Reject malformed hyperparameter combinations
    pub fn validate(&self) -> Result<()> {
        if !self.alpha.is_finite() || self.alpha < 0.0 {
            return Err(Error::Configuration(format!(
                "alpha must be finite and non-negative, got {}",
                self.alpha
            )));
        }
        if !self.eta0.is_finite() || self.eta0 <= 0.0 {
            return Err(Error::Configuration(format!(
                "eta0 must be finite and positive, got {}",
                self.eta0
            )));
        }
        if self.epochs == 0 {
            return Err(Error::Configuration("epochs must be at least 1".into()));
        }
        if let Some(classes) = &self.classes {
            validate_classes(classes)?;
        }
        Ok(())
    }
}

/// Fail with `Configuration` unless `classes` holds at least two distinct, non-null labels
pub fn validate_classes(classes: &[Scalar]) -> Result<()> {
    let mut sorted = classes.to_vec();
    sorted.sort();
    sorted.dedup();
    if sorted.len() != classes.len() {
        return Err(Error::Configuration("class labels must be distinct".into()));
    }
    if classes.len() < 2 || classes.iter().any(|c| c.is_null() || c.is_nan()) {
        return Err(Error::Configuration(
            "at least two non-missing class labels are required".into(),
        ));
    }
    Ok(())
}

/// Configuration of any operator, tagged by `"op"`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum OperatorConfig {
    /// Min-max scaler
    MinMaxScaler(MinMaxScalerConfig),
    /// Standard scaler
    StandardScaler(StandardScalerConfig),
    /// Simple imputer
    SimpleImputer(SimpleImputerConfig),
    /// Ordinal encoder
    OrdinalEncoder(OrdinalEncoderConfig),
    /// One-hot encoder
    OneHotEncoder(OneHotEncoderConfig),
    /// Select-k-best by ANOVA F score
    SelectKBest(SelectKBestConfig),
    /// SGD logistic-regression classifier
    SgdClassifier(SgdClassifierConfig),
}

impl OperatorConfig {
    /// Parse and validate a JSON operator configuration
    pub fn from_json(json: &str) -> Result<Self> {
        let config: OperatorConfig = serde_json::from_str(json)
            .map_err(|e| Error::Configuration(format!("invalid operator config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to JSON
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| Error::Configuration(format!("cannot serialize operator config: {}", e)))
    }

    /// Reject malformed hyperparameter combinations
    pub fn validate(&self) -> Result<()> {
        match self {
            OperatorConfig::MinMaxScaler(c) => c.validate(),
            OperatorConfig::StandardScaler(_) => Ok(()),
            OperatorConfig::SimpleImputer(c) => c.validate(),
            OperatorConfig::OrdinalEncoder(c) => c.validate(),
            OperatorConfig::OneHotEncoder(c) => c.validate(),
            OperatorConfig::SelectKBest(c) => c.validate(),
            OperatorConfig::SgdClassifier(c) => c.validate(),
        }
    }

    /// Operator name, as used in the `"op"` tag
    pub fn name(&self) -> &'static str {
        match self {
            OperatorConfig::MinMaxScaler(_) => "min_max_scaler",
            OperatorConfig::StandardScaler(_) => "standard_scaler",
            OperatorConfig::SimpleImputer(_) => "simple_imputer",
            OperatorConfig::OrdinalEncoder(_) => "ordinal_encoder",
            OperatorConfig::OneHotEncoder(_) => "one_hot_encoder",
            OperatorConfig::SelectKBest(_) => "select_k_best",
            OperatorConfig::SgdClassifier(_) => "sgd_classifier",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_defaults_from_json() {
        let config = OperatorConfig::from_json(r#"{"op": "min_max_scaler"}"#).unwrap();
        assert_eq!(config, OperatorConfig::MinMaxScaler(MinMaxScalerConfig::default()));

        let config = OperatorConfig::from_json(r#"{"op": "select_k_best"}"#).unwrap();
        assert_eq!(config, OperatorConfig::SelectKBest(SelectKBestConfig { k: 10 }));
    }

    #[test]
    fn test_with_variance_alias() {
        let config =
            OperatorConfig::from_json(r#"{"op": "standard_scaler", "with_variance": false}"#).unwrap();
        assert_eq!(
            config,
            OperatorConfig::StandardScaler(StandardScalerConfig {
                with_mean: true,
                with_std: false,
            })
        );
    }

    #[test]
    fn test_missing_values_sentinel() {
        let config = OperatorConfig::from_json(
            r#"{"op": "simple_imputer", "strategy": "most_frequent", "missing_values": "missing"}"#,
        )
        .unwrap();
        let OperatorConfig::SimpleImputer(imputer) = config else {
            panic!("expected an imputer config");
        };
        assert_eq!(imputer.missing_values, MissingValue::Value(Scalar::from("missing")));

        let config =
            OperatorConfig::from_json(r#"{"op": "simple_imputer", "missing_values": null}"#).unwrap();
        let OperatorConfig::SimpleImputer(imputer) = config else {
            panic!("expected an imputer config");
        };
        assert_eq!(imputer.missing_values, MissingValue::NaN);
    }

    #[test_case(r#"{"op": "min_max_scaler", "feature_range": [1.0, 0.0]}"# ; "inverted range")]
    #[test_case(r#"{"op": "min_max_scaler", "clip": true}"# ; "unknown field")]
    #[test_case(r#"{"op": "simple_imputer", "strategy": "mean", "fill_value": 3}"# ; "fill value without constant")]
    #[test_case(r#"{"op": "ordinal_encoder", "handle_unknown": "use_encoded_value"}"# ; "missing unknown value")]
    #[test_case(r#"{"op": "one_hot_encoder", "handle_unknown": "use_encoded_value"}"# ; "one hot encoded value")]
    #[test_case(r#"{"op": "select_k_best", "k": 0}"# ; "zero k")]
    #[test_case(r#"{"op": "sgd_classifier", "classes": [1, 1]}"# ; "duplicate classes")]
    #[test_case(r#"{"op": "robust_scaler"}"# ; "unknown operator")]
    fn test_rejected_configs(json: &str) {
        assert!(matches!(OperatorConfig::from_json(json), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_json_round_trip_keeps_tag() {
        let config = OperatorConfig::OrdinalEncoder(OrdinalEncoderConfig {
            handle_unknown: HandleUnknown::UseEncodedValue,
            unknown_value: Some(-1.0),
        });
        let json = config.to_json().unwrap();
        assert!(json.contains(r#""op":"ordinal_encoder""#));
        assert_eq!(OperatorConfig::from_json(&json).unwrap(), config);
    }
}
