// encode_utils.rs
use crate::flatten_utils::{FlatRecord, CATEGORICAL_FIELDS, FLAG_FIELDS, NUMERIC_FIELDS};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Per-field scaling statistics, computed once over the reference population.
/// Standard deviation is the population deviation (divide by n), matching the
/// convention of the scaler the classifier was trained with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericStat {
    pub field: String,
    pub mean: f64,
    pub std: f64,
}

/// Everything needed to turn a [`FlatRecord`] into a fixed-width numeric vector:
/// categorical level sets with their integer codes, numeric scaling statistics, and
/// the failure-department column list. Derived once per population snapshot by
/// [`build_context`], never mutated in place, and always passed explicitly. There is
/// no global context and no per-request re-derivation.
///
/// Column layout of every vector produced under this context, in order:
/// 1. one code per categorical field ([`CATEGORICAL_FIELDS`] order; per-field levels
///    sorted lexicographically, codes `0..k-1`, out-of-vocabulary sentinel `k`);
/// 2. one z-scaled value per numeric field ([`NUMERIC_FIELDS`] order; `std == 0`
///    scales to `0.0`);
/// 3. one unscaled `0/1` per flag ([`FLAG_FIELDS`] order);
/// 4. one raw failure count per department known at build time, in the order the
///    departments were first encountered across the population.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodingContext {
    categorical_levels: Vec<(String, Vec<String>)>,
    numeric_stats: Vec<NumericStat>,
    failure_departments: Vec<String>,
}

impl EncodingContext {
    /// The exact number of columns every vector encoded under this context carries.
    pub fn expected_width(&self) -> usize {
        CATEGORICAL_FIELDS.len()
            + NUMERIC_FIELDS.len()
            + FLAG_FIELDS.len()
            + self.failure_departments.len()
    }

    /// Column names in vector order. This is the list the classifier's metadata is
    /// checked against before any prediction.
    pub fn feature_names(&self) -> Vec<String> {
        let mut names: Vec<String> = CATEGORICAL_FIELDS
            .iter()
            .chain(NUMERIC_FIELDS.iter())
            .chain(FLAG_FIELDS.iter())
            .map(|f| f.to_string())
            .collect();
        for dept in &self.failure_departments {
            names.push(format!("perdidas_dpto_{}", dept));
        }
        names
    }

    /// Distinct levels seen at build time for a categorical field, in code order.
    pub fn levels(&self, field: &str) -> Option<&[String]> {
        self.categorical_levels
            .iter()
            .find(|(f, _)| f == field)
            .map(|(_, levels)| levels.as_slice())
    }

    /// Integer code for a categorical value, or `None` when the value was never seen
    /// at build time.
    pub fn code_for(&self, field: &str, value: &str) -> Option<usize> {
        self.levels(field)?
            .iter()
            .position(|level| level == value)
    }

    /// The reserved out-of-vocabulary code for a field: one past the last assigned
    /// code, never 0.
    pub fn unseen_code(&self, field: &str) -> Option<usize> {
        self.levels(field).map(<[String]>::len)
    }

    /// Recovers the categorical string for a code. The out-of-vocabulary sentinel
    /// decodes to `None`, distinguishing it from every real level.
    pub fn decode(&self, field: &str, code: usize) -> Option<&str> {
        self.levels(field)?.get(code).map(String::as_str)
    }

    /// Failure-department columns in vector order.
    pub fn failure_departments(&self) -> &[String] {
        &self.failure_departments
    }

    pub fn numeric_stats(&self) -> &[NumericStat] {
        &self.numeric_stats
    }
}

/// One encoded record. `values` always has exactly `expected_width` entries;
/// recoverable irregularities (unseen categorical values, departments unknown to the
/// context) are absorbed into the vector and reported in `warnings`.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    pub values: Vec<f64>,
    pub warnings: EncodeWarnings,
}

/// Non-fatal irregularities observed while encoding one record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EncodeWarnings {
    /// `(field, value)` pairs mapped to the out-of-vocabulary sentinel.
    pub unseen_values: Vec<(String, String)>,
    /// Failure departments present on the record but unknown to the context; their
    /// counts were dropped to preserve the fixed width.
    pub dropped_departments: Vec<String>,
}

impl EncodeWarnings {
    pub fn is_clean(&self) -> bool {
        self.unseen_values.is_empty() && self.dropped_departments.is_empty()
    }
}

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("field '{field}' is not part of the flat record schema")]
    UnknownField { field: String },
    #[error("feature vector width mismatch: context expects {expected}, produced {actual}")]
    WidthMismatch { expected: usize, actual: usize },
}

/// Derives an [`EncodingContext`] from a reference population. Deterministic: the
/// same records in the same order always yield a bitwise-identical context.
///
/// ```
/// use attriml::encode_utils::build_context;
///
/// // let records: Vec<FlatRecord> = ...;
/// // let a = build_context(&records);
/// // let b = build_context(&records);
/// // assert_eq!(a, b);
/// ```
pub fn build_context(records: &[FlatRecord]) -> EncodingContext {
    let mut categorical_levels = Vec::with_capacity(CATEGORICAL_FIELDS.len());
    for field in CATEGORICAL_FIELDS {
        let mut levels: Vec<String> = Vec::new();
        for record in records {
            // The field list is a compile-time constant, so the lookup cannot miss.
            if let Some(value) = record.categorical_value(field) {
                if !levels.iter().any(|l| l == value) {
                    levels.push(value.to_string());
                }
            }
        }
        levels.sort();
        categorical_levels.push((field.to_string(), levels));
    }

    let n = records.len() as f64;
    let mut numeric_stats = Vec::with_capacity(NUMERIC_FIELDS.len());
    for field in NUMERIC_FIELDS {
        let (mean, std) = if records.is_empty() {
            (0.0, 0.0)
        } else {
            let sum: f64 = records
                .iter()
                .filter_map(|r| r.numeric_value(field))
                .sum();
            let mean = sum / n;
            let variance: f64 = records
                .iter()
                .filter_map(|r| r.numeric_value(field))
                .map(|v| (v - mean).powi(2))
                .sum::<f64>()
                / n;
            (mean, variance.sqrt())
        };
        numeric_stats.push(NumericStat {
            field: field.to_string(),
            mean,
            std,
        });
    }

    // Department columns in first-encountered order across the population.
    let mut failure_departments: Vec<String> = Vec::new();
    for record in records {
        for dept in record.perdidas_por_departamento.keys() {
            if !failure_departments.iter().any(|d| d == dept) {
                failure_departments.push(dept.clone());
            }
        }
    }

    EncodingContext {
        categorical_levels,
        numeric_stats,
        failure_departments,
    }
}

/// Encodes one record under an explicit context. The produced vector always has
/// exactly `context.expected_width()` entries in the documented column order; any
/// other outcome is a structural error, never a silently padded or truncated vector.
pub fn encode(record: &FlatRecord, context: &EncodingContext) -> Result<FeatureVector, EncodeError> {
    let mut values = Vec::with_capacity(context.expected_width());
    let mut warnings = EncodeWarnings::default();

    for (field, levels) in &context.categorical_levels {
        let value = record
            .categorical_value(field)
            .ok_or_else(|| EncodeError::UnknownField {
                field: field.clone(),
            })?;
        let code = match levels.iter().position(|level| level == value) {
            Some(code) => code,
            None => {
                warnings
                    .unseen_values
                    .push((field.clone(), value.to_string()));
                levels.len()
            }
        };
        values.push(code as f64);
    }

    for stat in &context.numeric_stats {
        let value =
            record
                .numeric_value(&stat.field)
                .ok_or_else(|| EncodeError::UnknownField {
                    field: stat.field.clone(),
                })?;
        let scaled = if stat.std == 0.0 {
            0.0
        } else {
            (value - stat.mean) / stat.std
        };
        values.push(scaled);
    }

    for field in FLAG_FIELDS {
        let value = record
            .flag_value(field)
            .ok_or_else(|| EncodeError::UnknownField {
                field: field.to_string(),
            })?;
        values.push(value as f64);
    }

    for dept in &context.failure_departments {
        let count = record
            .perdidas_por_departamento
            .get(dept)
            .copied()
            .unwrap_or(0.0);
        values.push(count);
    }
    for dept in record.perdidas_por_departamento.keys() {
        if !context.failure_departments.iter().any(|d| d == dept) {
            eprintln!(
                "Dropping failure count for department '{}' unknown to the encoding context",
                dept
            );
            warnings.dropped_departments.push(dept.clone());
        }
    }

    let expected = context.expected_width();
    if values.len() != expected {
        return Err(EncodeError::WidthMismatch {
            expected,
            actual: values.len(),
        });
    }

    Ok(FeatureVector { values, warnings })
}
