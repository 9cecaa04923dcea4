//! Input validation for upstream data.
//!
//! Customers arrive from the segmentation stage and variants from the
//! generation/safety stages; both are external collaborators, so their
//! records are checked at the boundary before assignment.

use anyhow::{anyhow, Result};

/// Maximum lengths for identifiers
pub const MAX_CUSTOMER_ID_LENGTH: usize = 128;
pub const MAX_SEGMENT_LENGTH: usize = 128;
pub const MAX_VARIANT_ID_LENGTH: usize = 128;

/// Validate customer_id
pub fn validate_customer_id(customer_id: &str) -> Result<()> {
    if customer_id.trim().is_empty() {
        return Err(anyhow!("customer_id cannot be empty"));
    }

    if customer_id.len() > MAX_CUSTOMER_ID_LENGTH {
        return Err(anyhow!(
            "customer_id too long: {} chars (max: {})",
            customer_id.len(),
            MAX_CUSTOMER_ID_LENGTH
        ));
    }

    if customer_id.chars().any(|c| c.is_control()) {
        return Err(anyhow!("customer_id contains control characters"));
    }

    Ok(())
}

/// Validate a segment name
pub fn validate_segment_name(segment: &str) -> Result<()> {
    if segment.trim().is_empty() {
        return Err(anyhow!("segment cannot be empty"));
    }

    if segment.len() > MAX_SEGMENT_LENGTH {
        return Err(anyhow!(
            "segment too long: {} chars (max: {})",
            segment.len(),
            MAX_SEGMENT_LENGTH
        ));
    }

    if segment.chars().any(|c| c.is_control()) {
        return Err(anyhow!("segment contains control characters"));
    }

    Ok(())
}

/// Validate variant_id
pub fn validate_variant_id(variant_id: &str) -> Result<()> {
    if variant_id.trim().is_empty() {
        return Err(anyhow!("variant_id cannot be empty"));
    }

    if variant_id.len() > MAX_VARIANT_ID_LENGTH {
        return Err(anyhow!(
            "variant_id too long: {} chars (max: {})",
            variant_id.len(),
            MAX_VARIANT_ID_LENGTH
        ));
    }

    Ok(())
}
