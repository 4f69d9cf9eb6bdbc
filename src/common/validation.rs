//! Validation utilities for filter constructors and deserialization

use crate::common::{Result, SketchError};

/// Maximum serialized filter size (256MB) to prevent resource exhaustion
pub const MAX_BYTE_SIZE: usize = 256 * 1024 * 1024;

/// Validate that capacity is a positive count of expected elements
pub fn validate_capacity(capacity: u64) -> Result<()> {
    if capacity == 0 {
        return Err(SketchError::InvalidConfiguration {
            param: "capacity".to_string(),
            value: capacity.to_string(),
            constraint: "must be greater than 0".to_string(),
        });
    }
    Ok(())
}

/// Validate that a value is a valid probability (0.0 < p < 1.0)
pub fn validate_probability(value: f64, param_name: &str) -> Result<()> {
    if !(value > 0.0 && value < 1.0) {
        return Err(SketchError::InvalidConfiguration {
            param: param_name.to_string(),
            value: value.to_string(),
            constraint: "must be in range (0.0, 1.0) exclusive".to_string(),
        });
    }
    Ok(())
}

/// Validate that a decay time is strictly positive
pub fn validate_decay_time(decay_time: f64) -> Result<()> {
    if !(decay_time > 0.0) {
        return Err(SketchError::InvalidConfiguration {
            param: "decay_time".to_string(),
            value: decay_time.to_string(),
            constraint: "must be greater than 0".to_string(),
        });
    }
    Ok(())
}

/// Validate that growth_factor is usable (>= 1.0, finite)
pub fn validate_growth_factor(growth_factor: f64) -> Result<()> {
    if !(growth_factor.is_finite() && growth_factor >= 1.0) {
        return Err(SketchError::InvalidConfiguration {
            param: "growth_factor".to_string(),
            value: growth_factor.to_string(),
            constraint: "must be finite and >= 1.0".to_string(),
        });
    }
    Ok(())
}

/// Validate minimum required bytes are present before reading a header
pub fn validate_min_size(actual: usize, required: usize) -> Result<()> {
    if actual < required {
        return Err(SketchError::DeserializationError(format!(
            "insufficient data: need at least {} bytes, got {}",
            required, actual
        )));
    }
    Ok(())
}

/// Validate that a deserialized filter size doesn't exceed safety limits
pub fn validate_byte_size(size: usize) -> Result<()> {
    if size > MAX_BYTE_SIZE {
        return Err(SketchError::DeserializationError(format!(
            "deserialized filter size {} exceeds maximum allowed size {}",
            size, MAX_BYTE_SIZE
        )));
    }
    Ok(())
}

/// Validate that a cell-dtype tag is the one rigorously supported width (`B`, one octet)
pub fn validate_cell_dtype(tag: u8) -> Result<()> {
    const OCTET_TAG: u8 = b'B';
    if tag != OCTET_TAG {
        return Err(SketchError::DeserializationError(format!(
            "unsupported cell dtype tag {:#04x}; only 'B' (one-octet cells) is supported",
            tag
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_bounds() {
        assert!(validate_capacity(1).is_ok());
        assert!(validate_capacity(0).is_err());
    }

    #[test]
    fn probability_bounds() {
        assert!(validate_probability(0.005, "error").is_ok());
        assert!(validate_probability(0.0, "error").is_err());
        assert!(validate_probability(1.0, "error").is_err());
        assert!(validate_probability(-0.1, "error").is_err());
    }

    #[test]
    fn decay_time_bounds() {
        assert!(validate_decay_time(4.0).is_ok());
        assert!(validate_decay_time(0.0).is_err());
        assert!(validate_decay_time(-1.0).is_err());
    }

    #[test]
    fn growth_factor_bounds() {
        assert!(validate_growth_factor(1.0).is_ok());
        assert!(validate_growth_factor(2.0).is_ok());
        assert!(validate_growth_factor(0.5).is_err());
    }

    #[test]
    fn cell_dtype_only_accepts_octet() {
        assert!(validate_cell_dtype(b'B').is_ok());
        assert!(validate_cell_dtype(b'I').is_err());
    }
}
