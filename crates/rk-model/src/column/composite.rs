//! Columns combining child columns

use std::cmp::Ordering;
use std::sync::Arc;

use rk_data::mapping::Expr;
use rk_data::value::DataRow;
use rk_data::DataError;

use super::{Column, EvalContext};
use crate::ModelError;

/// Variables a composite script sees besides `v0`, `v1`, ...
pub const SCRIPT_COMPOSITE_VARIABLES: &[&str] = &["n", "mean", "min", "max", "sum"];

const DEFAULT_SCRIPT: &str = "return mean";

/// Normalized child numbers of a row, missing ones as NaN
fn child_numbers(children: &[Column], row: DataRow<'_>, ctx: &EvalContext<'_>) -> Vec<f64> {
    children.iter().map(|c| c.number(row, ctx)).collect()
}

/// Weighted sum of normalized child values
///
/// Weights always sum to 1. A missing child contributes 0; a row where
/// every child is missing is missing.
#[derive(Debug, Clone, Default)]
pub struct StackColumn {
    pub(crate) children: Vec<Column>,
    pub(crate) weights: Vec<f64>,
}

impl StackColumn {
    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn number(&self, row: DataRow<'_>, ctx: &EvalContext<'_>) -> f64 {
        let mut present = false;
        let mut sum = 0.0;
        for (child, weight) in self.children.iter().zip(&self.weights) {
            let v = child.number(row, ctx);
            if !v.is_nan() {
                present = true;
                sum += weight * v;
            }
        }
        if present {
            sum
        } else {
            f64::NAN
        }
    }

    /// Scale weights to sum 1; already normalized input is kept as is
    pub(crate) fn normalize(weights: &[f64]) -> Result<Vec<f64>, ModelError> {
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(ModelError::InvalidWeights(format!("{:?}", weights)));
        }
        let sum: f64 = weights.iter().sum();
        if sum <= 0.0 {
            return Err(ModelError::InvalidWeights("weights sum to zero".to_string()));
        }
        if (sum - 1.0).abs() < 1e-12 {
            return Ok(weights.to_vec());
        }
        Ok(weights.iter().map(|w| w / sum).collect())
    }

    pub(crate) fn set_weights(&mut self, weights: &[f64]) -> Result<bool, ModelError> {
        if weights.len() != self.children.len() {
            return Err(ModelError::InvalidWeights(format!(
                "expected {} weights, got {}",
                self.children.len(),
                weights.len()
            )));
        }
        let normalized = Self::normalize(weights)?;
        if normalized == self.weights {
            return Ok(false);
        }
        self.weights = normalized;
        Ok(true)
    }

    /// Insert a child with weight `1 / (n + 1)`, scaling the others down
    pub(crate) fn insert(&mut self, index: usize, child: Column) {
        let n = self.children.len();
        let weight = 1.0 / (n + 1) as f64;
        for w in &mut self.weights {
            *w *= 1.0 - weight;
        }
        let index = index.min(n);
        self.weights.insert(index, weight);
        self.children.insert(index, child);
    }

    pub(crate) fn remove(&mut self, index: usize) -> Column {
        self.weights.remove(index);
        let sum: f64 = self.weights.iter().sum();
        if sum > 0.0 {
            self.weights.iter_mut().for_each(|w| *w /= sum);
        } else if !self.weights.is_empty() {
            let even = 1.0 / self.weights.len() as f64;
            self.weights.iter_mut().for_each(|w| *w = even);
        }
        self.children.remove(index)
    }
}

/// Lexicographic sort over its children
#[derive(Debug, Clone, Default)]
pub struct NestedColumn {
    pub(crate) children: Vec<Column>,
}

impl NestedColumn {
    pub fn compare(&self, a: DataRow<'_>, b: DataRow<'_>, ctx: &EvalContext<'_>) -> Ordering {
        self.children
            .iter()
            .map(|c| c.compare(a, b, ctx))
            .find(|o| *o != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    }
}

/// A numeric child colored by a second child
///
/// The first child supplies the value, the second the color and group.
#[derive(Debug, Clone, Default)]
pub struct ImposeColumn {
    pub(crate) children: Vec<Column>,
}

impl ImposeColumn {
    pub fn numeric(&self) -> Option<&Column> {
        self.children.first()
    }

    pub fn color_source(&self) -> Option<&Column> {
        self.children.get(1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReduceOp {
    Min,
    Max,
    #[default]
    Mean,
    Median,
}

impl ReduceOp {
    pub fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "min" => ReduceOp::Min,
            "max" => ReduceOp::Max,
            "mean" => ReduceOp::Mean,
            "median" => ReduceOp::Median,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReduceOp::Min => "min",
            ReduceOp::Max => "max",
            ReduceOp::Mean => "mean",
            ReduceOp::Median => "median",
        }
    }

    /// Reduce the present values; NaN when there are none
    pub fn apply(&self, values: &[f64]) -> f64 {
        let mut present: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
        if present.is_empty() {
            return f64::NAN;
        }
        match self {
            ReduceOp::Min => present.iter().copied().fold(f64::INFINITY, f64::min),
            ReduceOp::Max => present.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            ReduceOp::Mean => present.iter().sum::<f64>() / present.len() as f64,
            ReduceOp::Median => {
                present.sort_by(|a, b| a.total_cmp(b));
                rk_data::stats::quantile(&present, 0.5)
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReduceColumn {
    pub(crate) children: Vec<Column>,
    pub(crate) op: ReduceOp,
}

impl ReduceColumn {
    pub fn op(&self) -> ReduceOp {
        self.op
    }

    pub fn number(&self, row: DataRow<'_>, ctx: &EvalContext<'_>) -> f64 {
        self.op.apply(&child_numbers(&self.children, row, ctx))
    }
}

/// Combines normalized child values with a script
///
/// Children are visible as `v0`, `v1`, ...; the aggregates `n`, `mean`,
/// `min`, `max` and `sum` cover the present values only. The result is
/// clamped to [0, 1].
#[derive(Debug, Clone)]
pub struct ScriptColumn {
    pub(crate) children: Vec<Column>,
    pub(crate) code: String,
    pub(crate) expr: Arc<Expr>,
}

impl Default for ScriptColumn {
    fn default() -> Self {
        Self {
            children: Vec::new(),
            code: DEFAULT_SCRIPT.to_string(),
            expr: Arc::new(Expr::Variable("mean".to_string())),
        }
    }
}

impl ScriptColumn {
    pub fn with_code(code: &str) -> Result<Self, ModelError> {
        Ok(Self {
            children: Vec::new(),
            code: code.to_string(),
            expr: Arc::new(Self::compile(code)?),
        })
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub(crate) fn compile(code: &str) -> Result<Expr, ModelError> {
        let parsed = Expr::parse(code).map_err(DataError::from)?;
        let children: Vec<String> = parsed
            .variables()
            .into_iter()
            .filter(|name| {
                name.strip_prefix('v')
                    .map_or(false, |digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
            })
            .collect();
        let mut allowed: Vec<&str> = SCRIPT_COMPOSITE_VARIABLES.to_vec();
        allowed.extend(children.iter().map(String::as_str));
        Ok(Expr::compile(code, &allowed).map_err(DataError::from)?)
    }

    pub(crate) fn set_code(&mut self, code: &str) -> Result<bool, ModelError> {
        if code == self.code {
            return Ok(false);
        }
        self.expr = Arc::new(Self::compile(code)?);
        self.code = code.to_string();
        Ok(true)
    }

    pub fn number(&self, row: DataRow<'_>, ctx: &EvalContext<'_>) -> f64 {
        let values = child_numbers(&self.children, row, ctx);
        let present: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
        let sum: f64 = present.iter().sum();
        let n = present.len() as f64;
        let resolve = |name: &str| -> Option<f64> {
            match name {
                "n" => Some(n),
                "sum" => Some(sum),
                "mean" => Some(if present.is_empty() { f64::NAN } else { sum / n }),
                "min" => Some(ReduceOp::Min.apply(&present)),
                "max" => Some(ReduceOp::Max.apply(&present)),
                _ => {
                    let index: usize = name.strip_prefix('v')?.parse().ok()?;
                    values.get(index).copied()
                }
            }
        };
        let result = self.expr.eval(&resolve);
        if result.is_nan() {
            f64::NAN
        } else {
            result.clamp(0.0, 1.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_weights() {
        assert_eq!(StackColumn::normalize(&[1.0, 3.0]).unwrap(), vec![0.25, 0.75]);
        assert_eq!(StackColumn::normalize(&[0.3, 0.7]).unwrap(), vec![0.3, 0.7]);
        assert!(StackColumn::normalize(&[0.0, 0.0]).is_err());
        assert!(StackColumn::normalize(&[-1.0, 2.0]).is_err());
        assert!(StackColumn::normalize(&[f64::NAN]).is_err());
    }

    #[test]
    fn test_reduce_ops_skip_missing() {
        let values = [0.2, f64::NAN, 0.8, 0.5];
        assert_eq!(ReduceOp::Min.apply(&values), 0.2);
        assert_eq!(ReduceOp::Max.apply(&values), 0.8);
        assert_eq!(ReduceOp::Mean.apply(&values), 0.5);
        assert_eq!(ReduceOp::Median.apply(&values), 0.5);
        assert!(ReduceOp::Mean.apply(&[f64::NAN]).is_nan());
        assert_eq!(ReduceOp::parse("median"), Some(ReduceOp::Median));
    }

    #[test]
    fn test_script_variables_are_checked() {
        assert!(ScriptColumn::with_code("return v0 * 0.5 + max").is_ok());
        assert!(ScriptColumn::with_code("return weight").is_err());
        assert!(ScriptColumn::with_code("return (v0").is_err());
        assert_eq!(ScriptColumn::default().code(), "return mean");
    }
}
