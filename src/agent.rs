//! Experiment agent: the stateful facade over the four pipeline stages.
//!
//! Owns the configuration and the seeded random number generator, so a
//! full run (design, assignment, simulation, metrics) is reproducible
//! from a single seed. Each stage consumes the previous stage's output:
//!
//! 1. `design_experiment` - build the control + 3 treatment arm layout
//! 2. `assign_customers_to_arms` - stratified random assignment
//! 3. `simulate_engagement` - probabilistic funnel outcomes per customer
//! 4. `calculate_metrics` - per-arm metrics, lift, and significance

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{info, warn};

use crate::assignment::{self, Assignment};
use crate::config::ExperimentConfig;
use crate::design::{Customer, ExperimentDesign, Variant};
use crate::errors::Result;
use crate::metrics::{self, ExperimentMetrics};
use crate::simulation::{self, EngagementRecord};

/// Stateful driver for one experiment lifecycle.
///
/// Two agents constructed from configurations with the same seed produce
/// identical assignments and engagement records for the same input.
pub struct ExperimentAgent {
    config: ExperimentConfig,
    rng: StdRng,
    experiment_id: Option<String>,
}

impl ExperimentAgent {
    pub fn new(config: ExperimentConfig) -> Self {
        let rng = StdRng::seed_from_u64(config.random_seed);
        info!(seed = config.random_seed, "Experiment agent initialized");
        Self {
            config,
            rng,
            experiment_id: None,
        }
    }

    pub fn config(&self) -> &ExperimentConfig {
        &self.config
    }

    /// Experiment id from the last `design_experiment` call, if any
    pub fn experiment_id(&self) -> Option<&str> {
        self.experiment_id.as_deref()
    }

    /// Build the experiment design from generated message variants.
    ///
    /// Stores the experiment id so later stages report against it.
    pub fn design_experiment(&mut self, variants: &[Variant]) -> Result<ExperimentDesign> {
        let design = ExperimentDesign::build(variants, &self.config)?;
        self.experiment_id = Some(design.experiment_id.clone());
        Ok(design)
    }

    /// Assign customers to arms with stratified randomization per segment
    pub fn assign_customers_to_arms(
        &mut self,
        customers: &[Customer],
        design: &ExperimentDesign,
    ) -> Result<Vec<Assignment>> {
        assignment::assign_customers_to_arms(
            customers,
            design,
            self.config.quality_checks.assignment_balance.tolerance,
            &mut self.rng,
        )
    }

    /// Produce engagement outcomes for the assigned customers.
    ///
    /// When the configuration opts into historical data and records are
    /// supplied, they are passed through unmodified instead of simulating.
    pub fn simulate_engagement(
        &mut self,
        assignments: &[Assignment],
        historical: Option<Vec<EngagementRecord>>,
    ) -> Vec<EngagementRecord> {
        if self.config.simulation.use_historical {
            match historical {
                Some(records) => {
                    info!(
                        record_count = records.len(),
                        "Using historical engagement data"
                    );
                    return records;
                }
                None => {
                    warn!("Historical engagement requested but none provided, simulating");
                }
            }
        }
        simulation::simulate_engagement(assignments, &self.config, &mut self.rng)
    }

    /// Aggregate engagement records into the final metrics report
    pub fn calculate_metrics(&self, engagement: &[EngagementRecord]) -> ExperimentMetrics {
        metrics::calculate_metrics(
            engagement,
            self.experiment_id.clone(),
            &self.config.experiment.name,
            self.config.statistical_testing.alpha,
        )
    }
}
