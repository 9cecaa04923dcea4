//! Stratified random assignment of customers to experiment arms.
//!
//! Assignment is computed independently per segment so every segment
//! gets proportional representation across arms. A customer is never
//! dropped: when the block targets cannot be met (small segments) or
//! leave a remainder, the leftover customers are spread round-robin
//! across the arms in canonical order.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::{NUM_TREATMENT_ARMS, TARGET_ARM_PERCENT};
use crate::design::{ArmKind, Customer, ExperimentDesign, Tone};
use crate::errors::{ExperimentError, Result, ValidationErrorExt};
use crate::validation;

/// One customer's arm assignment, immutable once produced
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assignment {
    pub customer_id: String,
    pub segment: String,
    pub experiment_arm: ArmKind,
    pub variant_id: String,
    pub assigned_at: DateTime<Utc>,
    pub assignment_method: String,
}

/// Assign customers to arms with per-segment stratification.
///
/// Guarantees: output length equals input length, every `customer_id`
/// appears exactly once, and `experiment_arm` is always drawn from the
/// canonical arm set. The only failing path is an input-contract
/// violation (empty ids/segments, duplicates).
pub fn assign_customers_to_arms<R: Rng>(
    customers: &[Customer],
    design: &ExperimentDesign,
    balance_tolerance: f64,
    rng: &mut R,
) -> Result<Vec<Assignment>> {
    info!(customer_count = customers.len(), "Assigning customers to experiment arms");

    validate_customers(customers)?;

    // Group customers by segment; BTreeMap keeps segment iteration
    // deterministic across runs.
    let mut by_segment: BTreeMap<&str, Vec<&Customer>> = BTreeMap::new();
    for customer in customers {
        by_segment.entry(&customer.segment).or_default().push(customer);
    }

    let mut assignments = Vec::with_capacity(customers.len());

    for (segment, mut group) in by_segment {
        info!(segment, count = group.len(), "Assigning customers in segment");
        group.shuffle(rng);

        let arm_sequence = arm_sequence_for_segment(group.len(), design);
        debug_assert_eq!(arm_sequence.len(), group.len());

        for (customer, arm) in group.iter().zip(arm_sequence) {
            assignments.push(Assignment {
                customer_id: customer.customer_id.clone(),
                segment: segment.to_string(),
                experiment_arm: arm,
                variant_id: resolve_variant_id(arm, segment, design),
                assigned_at: Utc::now(),
                assignment_method: design.assignment_strategy.clone(),
            });
        }
    }

    log_assignment_stats(&assignments);
    validate_assignment_balance(&assignments, balance_tolerance);

    info!(assigned = assignments.len(), "Successfully assigned customers");
    Ok(assignments)
}

/// Check input contracts before assignment
fn validate_customers(customers: &[Customer]) -> Result<()> {
    let mut seen = HashSet::with_capacity(customers.len());
    for customer in customers {
        validation::validate_customer_id(&customer.customer_id)
            .map_validation_err("customer_id")?;
        validation::validate_segment_name(&customer.segment).map_validation_err("segment")?;

        if !seen.insert(customer.customer_id.as_str()) {
            return Err(ExperimentError::DuplicateCustomer(
                customer.customer_id.clone(),
            ));
        }
    }
    Ok(())
}

/// Build the per-customer arm order for one segment of size `n`.
///
/// Contiguous blocks (control first, then treatments in tone order)
/// sized from the sample allocation, with round-robin fallback when the
/// targets overshoot `n` and round-robin spill for any remainder.
fn arm_sequence_for_segment(n: usize, design: &ExperimentDesign) -> Vec<ArmKind> {
    if n == 0 {
        return Vec::new();
    }

    let alloc = &design.sample_allocation;
    let control_target = ((n as f64 * alloc.control_percent / 100.0).round() as usize).max(1);
    let treatment_target =
        ((n as f64 * alloc.treatment_percent / 100.0 / NUM_TREATMENT_ARMS as f64).round()
            as usize)
            .max(1);
    let planned = control_target + treatment_target * NUM_TREATMENT_ARMS;

    let mut sequence = Vec::with_capacity(n);

    if planned > n {
        // Segment too small for the block targets: even round-robin so
        // every customer is still assigned.
        for i in 0..n {
            sequence.push(ArmKind::ALL[i % ArmKind::ALL.len()]);
        }
        return sequence;
    }

    for _ in 0..control_target {
        sequence.push(ArmKind::Control);
    }
    for tone in Tone::ALL {
        for _ in 0..treatment_target {
            sequence.push(ArmKind::Treatment(tone));
        }
    }

    // Rounding can leave a remainder; spill it round-robin.
    let mut i = 0;
    while sequence.len() < n {
        sequence.push(ArmKind::ALL[i % ArmKind::ALL.len()]);
        i += 1;
    }

    sequence
}

/// Resolve the variant served to a customer in a given arm/segment
fn resolve_variant_id(arm: ArmKind, segment: &str, design: &ExperimentDesign) -> String {
    match arm {
        ArmKind::Control => "control".to_string(),
        ArmKind::Treatment(_) => design
            .arm(arm)
            .and_then(|spec| spec.variant_for_segment(segment))
            .map(|variant| variant.variant_id.clone())
            .unwrap_or_else(|| format!("{arm}_{segment}_fallback")),
    }
}

fn log_assignment_stats(assignments: &[Assignment]) {
    let mut stats: BTreeMap<&str, BTreeMap<&'static str, usize>> = BTreeMap::new();
    for assignment in assignments {
        *stats
            .entry(assignment.segment.as_str())
            .or_default()
            .entry(assignment.experiment_arm.as_str())
            .or_default() += 1;
    }

    info!("Assignment statistics by segment:");
    for (segment, arm_counts) in &stats {
        let total: usize = arm_counts.values().sum();
        info!(segment, ?arm_counts, total, "segment assignment counts");
    }
}

/// Advisory balance check: warn when any arm's global share deviates
/// from the 25% target by more than the tolerance (in fractional form,
/// 0.05 = 5 percentage points). Never fails the run.
fn validate_assignment_balance(assignments: &[Assignment], tolerance: f64) {
    let total = assignments.len();
    if total == 0 {
        return;
    }

    let mut arm_counts: BTreeMap<&'static str, usize> = BTreeMap::new();
    for assignment in assignments {
        *arm_counts.entry(assignment.experiment_arm.as_str()).or_default() += 1;
    }

    for (arm, count) in arm_counts {
        let actual_pct = (count as f64 / total as f64) * 100.0;
        let deviation = (actual_pct - TARGET_ARM_PERCENT).abs();

        if deviation > tolerance * 100.0 {
            warn!(
                arm,
                actual_pct,
                target_pct = TARGET_ARM_PERCENT,
                "Assignment imbalance detected"
            );
        } else {
            debug!(arm, actual_pct, "Assignment balance OK");
        }
    }
}
