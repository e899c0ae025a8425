//! Scaling bounds and capacity hints parsed from group annotations.
//!
//! Every function here is pure: it reads an annotation map and returns a
//! value or an [`AnnotationError`] naming the offending key.

use std::collections::HashMap;

use crate::config::AnnotationKeys;
use crate::error::AnnotationError;
use crate::quantity::Quantity;

/// Optional per-instance capacity advertised by a group.
///
/// `None` means "no hint", which is distinct from a zero quantity.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CapacityHints {
    pub cpu: Option<Quantity>,
    pub memory: Option<Quantity>,
    pub pods: Option<Quantity>,
}

impl CapacityHints {
    pub fn is_empty(&self) -> bool {
        self.cpu.is_none() && self.memory.is_none() && self.pods.is_none()
    }
}

/// Minimum group size. Fails with `MissingBound` when the key is absent.
pub fn min_size(keys: &AnnotationKeys, annotations: &HashMap<String, String>) -> Result<i32, AnnotationError> {
    parse_bound(&keys.min_size, annotations)
}

/// Maximum group size. Fails with `MissingBound` when the key is absent.
pub fn max_size(keys: &AnnotationKeys, annotations: &HashMap<String, String>) -> Result<i32, AnnotationError> {
    parse_bound(&keys.max_size, annotations)
}

fn parse_bound(key: &str, annotations: &HashMap<String, String>) -> Result<i32, AnnotationError> {
    let value = annotations.get(key).ok_or_else(|| AnnotationError::MissingBound {
        key: key.to_string(),
    })?;
    let invalid = |reason: String| AnnotationError::InvalidBoundValue {
        key: key.to_string(),
        value: value.clone(),
        reason,
    };
    let parsed: i32 = value.parse().map_err(|e| invalid(format!("not an integer: {e}")))?;
    if parsed < 0 {
        return Err(invalid("must not be negative".to_string()));
    }
    Ok(parsed)
}

/// The `(min, max)` scaling range.
///
/// A missing minimum is read as zero; a missing maximum is an error.
/// `max < min` is rejected rather than clamped.
pub fn scaling_bounds(
    keys: &AnnotationKeys,
    annotations: &HashMap<String, String>,
) -> Result<(i32, i32), AnnotationError> {
    let min = match min_size(keys, annotations) {
        Ok(min) => min,
        Err(AnnotationError::MissingBound { .. }) => 0,
        Err(e) => return Err(e),
    };
    let max = max_size(keys, annotations)?;

    if max < min {
        return Err(AnnotationError::InvalidBoundValue {
            key: keys.max_size.clone(),
            value: max.to_string(),
            reason: format!("max size {max} is less than min size {min}"),
        });
    }
    Ok((min, max))
}

/// CPU, memory, and pod capacity hints. Absent or empty keys yield `None`.
pub fn capacity_hints(
    keys: &AnnotationKeys,
    annotations: &HashMap<String, String>,
) -> Result<CapacityHints, AnnotationError> {
    Ok(CapacityHints {
        cpu: parse_capacity(&keys.cpu_capacity, annotations)?,
        memory: parse_capacity(&keys.memory_capacity, annotations)?,
        pods: parse_capacity(&keys.pod_capacity, annotations)?,
    })
}

fn parse_capacity(key: &str, annotations: &HashMap<String, String>) -> Result<Option<Quantity>, AnnotationError> {
    match annotations.get(key) {
        Some(value) if !value.is_empty() => Quantity::parse(value)
            .map(Some)
            .map_err(|source| AnnotationError::InvalidCapacityValue {
                key: key.to_string(),
                value: value.clone(),
                source,
            }),
        _ => Ok(None),
    }
}

/// True only for the exact value `"true"`.
pub fn scale_from_zero_enabled(keys: &AnnotationKeys, annotations: &HashMap<String, String>) -> bool {
    annotations.get(&keys.scale_from_zero).is_some_and(|v| v == "true")
}
