//! Error types for the experimentation pipeline.
//!
//! The error surface is deliberately small: configuration defects are
//! absorbed by defaults at load time, and numerical degeneracy during
//! significance testing degrades in place (see `metrics`). Only
//! malformed input data fails a run.

use thiserror::Error;

/// Errors from experimentation operations
#[derive(Debug, Clone, Error)]
pub enum ExperimentError {
    /// A customer or variant record violated its input contract
    #[error("invalid input for field '{field}': {reason}")]
    InvalidInput { field: String, reason: String },

    /// A customer id appeared more than once in a single run
    #[error("duplicate customer_id: {0}")]
    DuplicateCustomer(String),

    /// An arm name that is not part of the canonical arm set
    #[error("unknown experiment arm: {0}")]
    UnknownArm(String),
}

/// Type alias for Results using ExperimentError
pub type Result<T> = std::result::Result<T, ExperimentError>;

/// Helper trait to convert validation errors at the API boundary
pub trait ValidationErrorExt<T> {
    fn map_validation_err(self, field: &str) -> Result<T>;
}

impl<T> ValidationErrorExt<T> for anyhow::Result<T> {
    fn map_validation_err(self, field: &str) -> Result<T> {
        self.map_err(|e| ExperimentError::InvalidInput {
            field: field.to_string(),
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn test_error_messages() {
        let err = ExperimentError::InvalidInput {
            field: "customer_id".to_string(),
            reason: "cannot be empty".to_string(),
        };
        assert!(err.to_string().contains("customer_id"));
        assert!(err.to_string().contains("cannot be empty"));

        let err = ExperimentError::DuplicateCustomer("CUST_001".to_string());
        assert!(err.to_string().contains("CUST_001"));
    }

    #[test]
    fn test_validation_err_mapping() {
        let result: anyhow::Result<()> = Err(anyhow!("too long"));
        let mapped = result.map_validation_err("segment");

        match mapped {
            Err(ExperimentError::InvalidInput { field, reason }) => {
                assert_eq!(field, "segment");
                assert_eq!(reason, "too long");
            }
            other => panic!("Expected InvalidInput, got {other:?}"),
        }
    }
}
