//! Mapping functions normalizing a raw numeric domain to [0, 1]

mod script;

use std::sync::Arc;

pub use script::{Expr, ScriptError};

use crate::schema::MappingDesc;
use crate::DataError;

/// Variables available to a script mapping
pub const SCRIPT_MAPPING_VARIABLES: &[&str] = &["value", "value_min", "value_max", "value_range"];

/// Numeric normalization function
///
/// `apply` always lands in [0, 1] (or NaN for missing input); `invert` is
/// the left inverse for linear and power mappings.
#[derive(Debug, Clone)]
pub enum MappingFunction {
    Linear {
        domain: [f64; 2],
        range: [f64; 2],
    },
    Power {
        exponent: f64,
        domain: [f64; 2],
        range: [f64; 2],
    },
    Script {
        code: String,
        domain: [f64; 2],
        expr: Arc<Expr>,
    },
}

impl PartialEq for MappingFunction {
    fn eq(&self, other: &Self) -> bool {
        self.to_desc() == other.to_desc()
    }
}

fn check_domain(domain: [f64; 2]) -> Result<(), DataError> {
    let [min, max] = domain;
    if !min.is_finite() || !max.is_finite() || min > max {
        return Err(DataError::InvalidDomain { min, max });
    }
    Ok(())
}

fn check_range(range: [f64; 2]) -> Result<(), DataError> {
    let [min, max] = range;
    let valid = |v: f64| (0.0..=1.0).contains(&v);
    if !valid(min) || !valid(max) {
        return Err(DataError::InvalidRange { min, max });
    }
    Ok(())
}

/// Position of `value` within `domain`, clamped to [0, 1]
fn unit(value: f64, [min, max]: [f64; 2]) -> f64 {
    let span = max - min;
    if span == 0.0 {
        return if value > min { 1.0 } else { 0.0 };
    }
    ((value - min) / span).clamp(0.0, 1.0)
}

impl MappingFunction {
    pub fn linear(min: f64, max: f64) -> Result<Self, DataError> {
        let domain = [min, max];
        check_domain(domain)?;
        Ok(MappingFunction::Linear {
            domain,
            range: [0.0, 1.0],
        })
    }

    pub fn power(exponent: f64, min: f64, max: f64) -> Result<Self, DataError> {
        if !exponent.is_finite() || exponent <= 0.0 {
            return Err(DataError::InvalidExponent(exponent));
        }
        let domain = [min, max];
        check_domain(domain)?;
        Ok(MappingFunction::Power {
            exponent,
            domain,
            range: [0.0, 1.0],
        })
    }

    pub fn script(code: &str, min: f64, max: f64) -> Result<Self, DataError> {
        let domain = [min, max];
        check_domain(domain)?;
        let expr = Expr::compile(code, SCRIPT_MAPPING_VARIABLES)?;
        Ok(MappingFunction::Script {
            code: code.to_string(),
            domain,
            expr: Arc::new(expr),
        })
    }

    /// Build from its serialized form
    pub fn from_desc(desc: &MappingDesc) -> Result<Self, DataError> {
        let [min, max] = desc.domain;
        let mapping = match desc.kind.as_str() {
            "linear" => Self::linear(min, max)?,
            "sqrt" => Self::power(0.5, min, max)?,
            "pow" | "power" => Self::power(desc.exponent.unwrap_or(1.0), min, max)?,
            "script" => Self::script(desc.code.as_deref().unwrap_or("return value"), min, max)?,
            other => return Err(DataError::UnknownMapping(other.to_string())),
        };
        mapping.with_range(desc.range)
    }

    /// Serialized form
    pub fn to_desc(&self) -> MappingDesc {
        match self {
            MappingFunction::Linear { domain, range } => MappingDesc {
                kind: "linear".to_string(),
                domain: *domain,
                range: *range,
                exponent: None,
                code: None,
            },
            MappingFunction::Power { exponent, domain, range } => MappingDesc {
                kind: "pow".to_string(),
                domain: *domain,
                range: *range,
                exponent: Some(*exponent),
                code: None,
            },
            MappingFunction::Script { code, domain, .. } => MappingDesc {
                kind: "script".to_string(),
                domain: *domain,
                range: [0.0, 1.0],
                exponent: None,
                code: Some(code.clone()),
            },
        }
    }

    /// Replace the output range; scripts ignore it
    pub fn with_range(self, range: [f64; 2]) -> Result<Self, DataError> {
        check_range(range)?;
        Ok(match self {
            MappingFunction::Linear { domain, .. } => MappingFunction::Linear { domain, range },
            MappingFunction::Power { exponent, domain, .. } => MappingFunction::Power { exponent, domain, range },
            script => script,
        })
    }

    pub fn domain(&self) -> [f64; 2] {
        match self {
            MappingFunction::Linear { domain, .. }
            | MappingFunction::Power { domain, .. }
            | MappingFunction::Script { domain, .. } => *domain,
        }
    }

    /// Copy with a new domain; an invalid domain is rejected
    pub fn with_domain(&self, min: f64, max: f64) -> Result<Self, DataError> {
        let domain = [min, max];
        check_domain(domain)?;
        let mut next = self.clone();
        match &mut next {
            MappingFunction::Linear { domain: d, .. }
            | MappingFunction::Power { domain: d, .. }
            | MappingFunction::Script { domain: d, .. } => *d = domain,
        }
        Ok(next)
    }

    /// Normalize a raw value; NaN stays NaN
    pub fn apply(&self, value: f64) -> f64 {
        if value.is_nan() {
            return f64::NAN;
        }
        match self {
            MappingFunction::Linear { domain, range } => {
                let t = unit(value, *domain);
                (range[0] + t * (range[1] - range[0])).clamp(0.0, 1.0)
            }
            MappingFunction::Power { exponent, domain, range } => {
                let t = unit(value, *domain).powf(*exponent);
                (range[0] + t * (range[1] - range[0])).clamp(0.0, 1.0)
            }
            MappingFunction::Script { domain, expr, .. } => {
                let [min, max] = *domain;
                let result = expr.eval(&|name| match name {
                    "value" => Some(value),
                    "value_min" => Some(min),
                    "value_max" => Some(max),
                    "value_range" => Some(max - min),
                    _ => None,
                });
                if result.is_nan() {
                    f64::NAN
                } else {
                    result.clamp(0.0, 1.0)
                }
            }
        }
    }

    /// Raw value for a normalized one; `None` for script mappings
    pub fn invert(&self, normalized: f64) -> Option<f64> {
        let invert_range = |range: [f64; 2]| {
            let span = range[1] - range[0];
            if span == 0.0 {
                0.0
            } else {
                ((normalized - range[0]) / span).clamp(0.0, 1.0)
            }
        };
        match self {
            MappingFunction::Linear { domain, range } => {
                let t = invert_range(*range);
                Some(domain[0] + t * (domain[1] - domain[0]))
            }
            MappingFunction::Power { exponent, domain, range } => {
                let t = invert_range(*range).powf(1.0 / exponent);
                Some(domain[0] + t * (domain[1] - domain[0]))
            }
            MappingFunction::Script { .. } => None,
        }
    }
}

impl Default for MappingFunction {
    fn default() -> Self {
        MappingFunction::Linear {
            domain: [0.0, 1.0],
            range: [0.0, 1.0],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    #[test]
    fn test_linear_round_trip() {
        let m = MappingFunction::linear(10.0, 110.0).unwrap();
        for raw in [10.0, 35.5, 60.0, 110.0] {
            let n = m.apply(raw);
            assert!((0.0..=1.0).contains(&n));
            assert!((m.invert(n).unwrap() - raw).abs() < EPS);
        }
        assert_eq!(m.apply(60.0), 0.5);
    }

    #[test]
    fn test_clamping_outside_domain() {
        let m = MappingFunction::linear(0.0, 10.0).unwrap();
        assert_eq!(m.apply(-5.0), 0.0);
        assert_eq!(m.apply(50.0), 1.0);
        assert!(m.apply(f64::NAN).is_nan());
    }

    #[test]
    fn test_power_round_trip() {
        let m = MappingFunction::power(2.0, 0.0, 10.0).unwrap();
        assert!((m.apply(5.0) - 0.25).abs() < EPS);
        for raw in [0.0, 1.0, 3.3, 9.9] {
            assert!((m.invert(m.apply(raw)).unwrap() - raw).abs() < 1e-6);
        }
    }

    #[test]
    fn test_inverted_range() {
        let m = MappingFunction::linear(0.0, 10.0).unwrap().with_range([1.0, 0.0]).unwrap();
        assert_eq!(m.apply(0.0), 1.0);
        assert_eq!(m.apply(10.0), 0.0);
        assert!((m.invert(0.25).unwrap() - 7.5).abs() < EPS);
    }

    #[test]
    fn test_script_mapping() {
        let m = MappingFunction::script("return linear(value, value_min, value_max) ^ 2", 0.0, 4.0).unwrap();
        assert_eq!(m.apply(2.0), 0.25);
        assert_eq!(m.apply(8.0), 1.0);
        assert_eq!(m.invert(0.5), None);
    }

    #[test]
    fn test_invalid_domain_rejected() {
        assert_eq!(
            MappingFunction::linear(5.0, 1.0),
            Err(DataError::InvalidDomain { min: 5.0, max: 1.0 })
        );
        let m = MappingFunction::linear(0.0, 1.0).unwrap();
        assert!(m.with_domain(f64::NAN, 1.0).is_err());
        assert_eq!(m.with_domain(2.0, 3.0).unwrap().domain(), [2.0, 3.0]);
        assert!(MappingFunction::power(0.0, 0.0, 1.0).is_err());
        assert!(MappingFunction::script("value +", 0.0, 1.0).is_err());
    }

    #[test]
    fn test_desc_round_trip() {
        let m = MappingFunction::power(3.0, -1.0, 1.0).unwrap();
        let back = MappingFunction::from_desc(&m.to_desc()).unwrap();
        assert_eq!(m, back);
        let s = MappingFunction::script("abs(value)", 0.0, 1.0).unwrap();
        assert_eq!(MappingFunction::from_desc(&s.to_desc()).unwrap(), s);
    }
}
