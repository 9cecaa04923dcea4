//! Engagement simulation with funnel-consistent outcomes.
//!
//! Each assignment gets a synthetic open/click/convert outcome drawn
//! from segment-specific baselines; treatment arms receive a clamped
//! Gaussian uplift. Click is only drawn when the message was opened and
//! conversion only when it was clicked, so the funnel invariant
//! (clicked implies opened, converted implies clicked) holds by
//! construction, noise included.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::assignment::Assignment;
use crate::config::ExperimentConfig;
use crate::design::ArmKind;

/// Where an engagement record came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngagementSource {
    Simulated,
    Historical,
}

/// Outcome of one customer's exposure to their assigned message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngagementRecord {
    pub customer_id: String,
    pub segment: String,
    pub experiment_arm: ArmKind,
    pub variant_id: String,
    pub opened: bool,
    pub clicked: bool,
    pub converted: bool,
    pub engagement_at: DateTime<Utc>,
    pub engagement_source: EngagementSource,
}

impl EngagementRecord {
    /// Funnel monotonicity: clicked implies opened, converted implies clicked
    pub fn funnel_consistent(&self) -> bool {
        (!self.clicked || self.opened) && (!self.converted || self.clicked)
    }
}

/// Simulate engagement for every assignment.
///
/// Output length equals input length and every record satisfies the
/// funnel invariant. Given the same RNG state and assignments, the
/// opened/clicked/converted sequence is identical across runs.
pub fn simulate_engagement<R: Rng>(
    assignments: &[Assignment],
    config: &ExperimentConfig,
    rng: &mut R,
) -> Vec<EngagementRecord> {
    info!(assignment_count = assignments.len(), "Simulating engagement");

    let sim = &config.simulation;
    let baselines = &sim.baseline_rates;
    let uplift_cfg = &sim.expected_uplift;

    let mut records = Vec::with_capacity(assignments.len());

    for assignment in assignments {
        let segment_profile = config.segments.get(&assignment.segment);
        let open_baseline = segment_profile
            .map(|p| p.expected_baseline_open)
            .unwrap_or(baselines.open_rate);
        let click_baseline = segment_profile
            .map(|p| p.expected_baseline_click)
            .unwrap_or(baselines.click_rate);
        // Conversion baseline always comes from the global config
        let conversion_baseline = baselines.conversion_rate;

        let (mut open_prob, mut click_prob, conversion_prob) = match assignment.experiment_arm {
            ArmKind::Control => (open_baseline, click_baseline, conversion_baseline),
            ArmKind::Treatment(_) => {
                let segment_uplift = segment_profile
                    .map(|p| p.expected_uplift)
                    .unwrap_or(uplift_cfg.mean);
                let uplift = (segment_uplift + gaussian(rng, uplift_cfg.std_dev))
                    .clamp(uplift_cfg.min_uplift, uplift_cfg.max_uplift);

                (
                    (open_baseline * (1.0 + uplift)).min(1.0),
                    (click_baseline * (1.0 + uplift)).min(1.0),
                    (conversion_baseline * (1.0 + uplift)).min(1.0),
                )
            }
        };

        open_prob = (open_prob + gaussian(rng, sim.noise_factor)).clamp(0.0, 1.0);
        click_prob = (click_prob + gaussian(rng, sim.noise_factor)).clamp(0.0, 1.0);

        // Gated draws: no RNG is consumed for a stage the funnel
        // already ruled out.
        let opened = rng.gen::<f64>() < open_prob;
        let clicked = opened && rng.gen::<f64>() < click_prob;
        let converted = clicked && rng.gen::<f64>() < conversion_prob;

        records.push(EngagementRecord {
            customer_id: assignment.customer_id.clone(),
            segment: assignment.segment.clone(),
            experiment_arm: assignment.experiment_arm,
            variant_id: assignment.variant_id.clone(),
            opened,
            clicked,
            converted,
            engagement_at: Utc::now(),
            engagement_source: EngagementSource::Simulated,
        });
    }

    log_engagement_stats(&records);
    records
}

/// Draw from N(0, std_dev); a non-positive or non-finite std_dev
/// contributes no noise.
fn gaussian<R: Rng>(rng: &mut R, std_dev: f64) -> f64 {
    match Normal::new(0.0, std_dev) {
        Ok(dist) => dist.sample(rng),
        Err(_) => 0.0,
    }
}

fn log_engagement_stats(records: &[EngagementRecord]) {
    #[derive(Default)]
    struct Counts {
        total: usize,
        opened: usize,
        clicked: usize,
        converted: usize,
    }

    let mut by_arm: BTreeMap<&'static str, Counts> = BTreeMap::new();
    for record in records {
        let counts = by_arm.entry(record.experiment_arm.as_str()).or_default();
        counts.total += 1;
        if record.opened {
            counts.opened += 1;
        }
        if record.clicked {
            counts.clicked += 1;
        }
        if record.converted {
            counts.converted += 1;
        }
    }

    info!("Engagement simulation results:");
    for (arm, counts) in &by_arm {
        let pct = |n: usize| {
            if counts.total > 0 {
                (n as f64 / counts.total as f64) * 100.0
            } else {
                0.0
            }
        };
        info!(
            arm,
            open_pct = pct(counts.opened),
            click_pct = pct(counts.clicked),
            convert_pct = pct(counts.converted),
            n = counts.total,
            "arm engagement"
        );
    }
}
