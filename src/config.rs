//! Experiment configuration with defaults applied at load time.
//!
//! All configurable parameters in one place. Every field is defaulted,
//! so a partial JSON value deserializes into a fully populated config
//! and downstream code never has to guard against missing keys.
//! Reading config files is the caller's responsibility; this crate
//! only defines the typed structure.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Default random seed used when the caller does not supply one
pub const DEFAULT_RANDOM_SEED: u64 = 42;

/// Target share of customers per arm (4 arms at 25% each)
pub const TARGET_ARM_PERCENT: f64 = 25.0;

/// Number of treatment arms (one per message tone)
pub const NUM_TREATMENT_ARMS: usize = 3;

/// Experiment name and description
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentInfo {
    pub name: String,
    pub description: String,
}

impl Default for ExperimentInfo {
    fn default() -> Self {
        Self {
            name: "personalization_poc".to_string(),
            description: "A/B/n experiment".to_string(),
        }
    }
}

/// Human-readable description of a single arm
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ArmDescription {
    pub description: String,
}

/// Fixed message used by the control arm (no personalization)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlMessage {
    pub subject: String,
    pub body: String,
}

impl Default for ControlMessage {
    fn default() -> Self {
        Self {
            subject: "Control".to_string(),
            body: "Control message".to_string(),
        }
    }
}

/// Assignment strategy settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssignmentConfig {
    pub method: String,
}

impl Default for AssignmentConfig {
    fn default() -> Self {
        Self {
            method: "stratified_random".to_string(),
        }
    }
}

/// Percentage split between control and combined treatment
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SampleAllocation {
    pub control_percent: f64,
    pub treatment_percent: f64,
}

impl Default for SampleAllocation {
    fn default() -> Self {
        Self {
            control_percent: 25.0,
            treatment_percent: 75.0,
        }
    }
}

/// Which metrics the experiment reports on
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub primary: String,
    pub secondary: Vec<String>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            primary: "click_rate".to_string(),
            secondary: vec!["open_rate".to_string(), "conversion_rate".to_string()],
        }
    }
}

/// Significance testing settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StatisticalTesting {
    /// Significance level for the chi-square test (p < alpha)
    pub alpha: f64,
}

impl Default for StatisticalTesting {
    fn default() -> Self {
        Self { alpha: 0.05 }
    }
}

/// Baseline engagement rates used when a segment has no profile
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BaselineRates {
    pub open_rate: f64,
    pub click_rate: f64,
    pub conversion_rate: f64,
}

impl Default for BaselineRates {
    fn default() -> Self {
        Self {
            open_rate: 0.25,
            click_rate: 0.05,
            conversion_rate: 0.01,
        }
    }
}

/// Uplift distribution applied to treatment arms
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpliftConfig {
    pub mean: f64,
    pub std_dev: f64,
    pub min_uplift: f64,
    pub max_uplift: f64,
}

impl Default for UpliftConfig {
    fn default() -> Self {
        Self {
            mean: 0.15,
            std_dev: 0.05,
            min_uplift: 0.05,
            max_uplift: 0.30,
        }
    }
}

/// Engagement simulation parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub baseline_rates: BaselineRates,
    pub expected_uplift: UpliftConfig,
    /// Gaussian noise added to open/click probabilities
    pub noise_factor: f64,
    /// Pass through externally supplied engagement data instead of simulating
    pub use_historical: bool,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            baseline_rates: BaselineRates::default(),
            expected_uplift: UpliftConfig::default(),
            noise_factor: 0.02,
            use_historical: false,
        }
    }
}

/// Per-segment engagement expectations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentProfile {
    pub expected_baseline_open: f64,
    pub expected_baseline_click: f64,
    pub expected_uplift: f64,
}

impl Default for SegmentProfile {
    fn default() -> Self {
        let baselines = BaselineRates::default();
        Self {
            expected_baseline_open: baselines.open_rate,
            expected_baseline_click: baselines.click_rate,
            expected_uplift: UpliftConfig::default().mean,
        }
    }
}

/// Advisory balance check applied after assignment
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BalanceCheck {
    /// Allowed deviation from the per-arm target share (0.05 = 5 points)
    pub tolerance: f64,
}

impl Default for BalanceCheck {
    fn default() -> Self {
        Self { tolerance: 0.05 }
    }
}

/// Post-run quality checks
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityChecks {
    pub assignment_balance: BalanceCheck,
}

/// Full experiment configuration.
///
/// Every section is optional in the serialized form; missing keys fall
/// back to the documented defaults rather than failing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    pub experiment: ExperimentInfo,
    /// Caller-supplied experiment id; generated when absent
    pub experiment_id: Option<String>,
    /// Arm descriptions keyed by arm name (control, treatment_1..3)
    pub arms: BTreeMap<String, ArmDescription>,
    pub control_message: ControlMessage,
    pub assignment: AssignmentConfig,
    pub sample_allocation: SampleAllocation,
    pub metrics: MetricsConfig,
    pub statistical_testing: StatisticalTesting,
    pub simulation: SimulationConfig,
    /// Segment profiles keyed by segment name
    pub segments: BTreeMap<String, SegmentProfile>,
    pub quality_checks: QualityChecks,
    pub random_seed: u64,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            experiment: ExperimentInfo::default(),
            experiment_id: None,
            arms: BTreeMap::new(),
            control_message: ControlMessage::default(),
            assignment: AssignmentConfig::default(),
            sample_allocation: SampleAllocation::default(),
            metrics: MetricsConfig::default(),
            statistical_testing: StatisticalTesting::default(),
            simulation: SimulationConfig::default(),
            segments: BTreeMap::new(),
            quality_checks: QualityChecks::default(),
            random_seed: DEFAULT_RANDOM_SEED,
        }
    }
}

impl ExperimentConfig {
    /// Install the proof-of-concept segment profiles for any segment
    /// not already configured.
    pub fn with_default_segments(mut self) -> Self {
        let defaults = [
            (
                "High-Value Recent",
                SegmentProfile {
                    expected_baseline_open: 0.30,
                    expected_baseline_click: 0.08,
                    expected_uplift: 0.20,
                },
            ),
            (
                "Standard",
                SegmentProfile {
                    expected_baseline_open: 0.25,
                    expected_baseline_click: 0.05,
                    expected_uplift: 0.15,
                },
            ),
            (
                "New Customer",
                SegmentProfile {
                    expected_baseline_open: 0.20,
                    expected_baseline_click: 0.03,
                    expected_uplift: 0.10,
                },
            ),
        ];

        for (name, profile) in defaults {
            self.segments.entry(name.to_string()).or_insert(profile);
        }
        self
    }
}
