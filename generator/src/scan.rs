use indexmap::IndexMap;
use serde_yaml::Value;
use studygen::ParamValue;

use crate::documents::{ScanSpec, to_param_value};
use crate::error::{EngineError, EngineResult};

/// Decimal places kept for linspace samples, so directory names are stable.
const LINSPACE_DECIMALS: i32 = 5;

const DEFAULT_TWINS: [&str; 2] = ["lhcb1", "lhcb2"];

/// One dimension of a sweep.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanAxis {
    pub parameter: String,
    pub values: Vec<ParamValue>,
    /// When set, each value is bound to both identifiers at substitution.
    pub twins: Option<(String, String)>,
}

impl ScanAxis {
    pub fn from_spec(parameter: &str, spec: &ScanSpec) -> EngineResult<Self> {
        let invalid = |reason: String| EngineError::InvalidScan {
            parameter: parameter.to_string(),
            reason,
        };

        let values: Vec<ParamValue> = match (&spec.list, &spec.linspace) {
            (Some(list), None) => {
                if list.is_empty() {
                    return Err(invalid("the value list is empty".into()));
                }
                list.iter().map(to_param_value).collect()
            }
            (None, Some(range)) => {
                let [min, max, count] = range.as_slice() else {
                    return Err(invalid(format!(
                        "linspace takes [min, max, count], got {} value(s)",
                        range.len()
                    )));
                };
                let (Some(min), Some(max)) = (number(min), number(max)) else {
                    return Err(invalid("linspace bounds must be numbers".into()));
                };
                let count = match count.as_u64() {
                    Some(count) if count > 0 => count as usize,
                    _ => return Err(invalid("linspace count must be a positive integer".into())),
                };
                linspace(min, max, count)
                    .into_iter()
                    .map(ParamValue::Float)
                    .collect()
            }
            (Some(_), Some(_)) => {
                return Err(invalid("give either 'list' or 'linspace', not both".into()));
            }
            (None, None) => return Err(invalid("expected a 'list' or a 'linspace'".into())),
        };

        let mut segments: Vec<String> = Vec::with_capacity(values.len());
        for value in &values {
            let segment = value.path_segment();
            if segments.contains(&segment) {
                return Err(invalid(format!(
                    "value {} appears twice, combinations would share a directory",
                    segment
                )));
            }
            segments.push(segment);
        }

        let twins = match (&spec.twins, spec.for_each_beam) {
            (None, false) => None,
            (None, true) => Some((DEFAULT_TWINS[0].to_string(), DEFAULT_TWINS[1].to_string())),
            (Some(names), true) => match names.as_slice() {
                [left, right] if left != right => Some((left.clone(), right.clone())),
                _ => return Err(invalid("'twins' takes two distinct names".into())),
            },
            (Some(_), false) => {
                return Err(invalid("'twins' requires 'for_each_beam: true'".into()));
            }
        };

        Ok(ScanAxis {
            parameter: parameter.to_string(),
            values,
            twins,
        })
    }

    /// The value bound to the parameter: the sample itself, or one entry
    /// per twin holding the same sample.
    pub fn substitute(&self, value: &ParamValue) -> ParamValue {
        match &self.twins {
            None => value.clone(),
            Some((left, right)) => {
                let mut pair = IndexMap::new();
                pair.insert(left.clone(), value.clone());
                pair.insert(right.clone(), value.clone());
                ParamValue::Map(pair)
            }
        }
    }
}

/// Build the axes of a `scans` mapping, in declaration order.
pub fn scan_axes(scans: &IndexMap<String, ScanSpec>) -> EngineResult<Vec<ScanAxis>> {
    scans
        .iter()
        .map(|(parameter, spec)| ScanAxis::from_spec(parameter, spec))
        .collect()
}

/// `count` evenly spaced samples from `min` to `max`, both ends included.
pub fn linspace(min: f64, max: f64, count: usize) -> Vec<f64> {
    if count == 1 {
        return vec![round(min)];
    }
    let step = (max - min) / (count - 1) as f64;
    (0..count)
        .map(|i| if i == count - 1 { max } else { min + i as f64 * step })
        .map(round)
        .collect()
}

fn round(x: f64) -> f64 {
    let factor = 10f64.powi(LINSPACE_DECIMALS);
    let rounded = (x * factor).round() / factor;
    // Avoid `-0.0` in directory names.
    if rounded == 0.0 { 0.0 } else { rounded }
}

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        _ => None,
    }
}

/// One point of a sweep.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Combination {
    /// Sampled value per axis, in axis order.
    pub values: Vec<(String, ParamValue)>,
    /// Values to substitute, twins expanded.
    pub overrides: IndexMap<String, ParamValue>,
}

impl Combination {
    /// Directory name: `<axis>_<value>` segments joined with `_`. Empty for
    /// the single combination of a sweep without axes.
    pub fn subpath(&self) -> String {
        self.values
            .iter()
            .map(|(name, value)| format!("{}_{}", name, value.path_segment()))
            .collect::<Vec<_>>()
            .join("_")
    }
}

/// Cartesian product of the axes. The first axis varies slowest. No axes
/// yields one empty combination.
pub fn expand(axes: &[ScanAxis]) -> Vec<Combination> {
    if axes.iter().any(|axis| axis.values.is_empty()) {
        return Vec::new();
    }

    let mut combinations = Vec::new();
    let mut indices = vec![0usize; axes.len()];
    loop {
        let mut combination = Combination::default();
        for (axis, &idx) in axes.iter().zip(&indices) {
            let value = &axis.values[idx];
            combination
                .values
                .push((axis.parameter.clone(), value.clone()));
            combination
                .overrides
                .insert(axis.parameter.clone(), axis.substitute(value));
        }
        combinations.push(combination);

        // Odometer step, last axis fastest.
        let mut pos = axes.len();
        loop {
            if pos == 0 {
                return combinations;
            }
            pos -= 1;
            indices[pos] += 1;
            if indices[pos] < axes[pos].values.len() {
                break;
            }
            indices[pos] = 0;
        }
    }
}
