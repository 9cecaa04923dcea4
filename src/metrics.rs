//! Metrics aggregation, lift analysis, and segment breakdown.
//!
//! Aggregates engagement records into per-arm funnel metrics, computes
//! lift of each treatment arm against control for every metric, attaches
//! a chi-square significance test with confidence interval, and breaks
//! results down per segment with a best-arm pick.
//!
//! Significance-test failures never abort the calculation: degenerate
//! contingency tables degrade to `test_type: failed` with p=1.0 so the
//! remaining arms and metrics still get results.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::design::ArmKind;
use crate::simulation::EngagementRecord;
use crate::stats;

// =============================================================================
// RESULT TYPES
// =============================================================================

/// Funnel rates for one arm, all in [0, 1]
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct RateMetrics {
    pub open_rate: f64,
    pub click_rate: f64,
    pub conversion_rate: f64,
}

/// Raw funnel counts for one arm
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct FunnelCounts {
    pub sent: u64,
    pub opened: u64,
    pub clicked: u64,
    pub converted: u64,
}

/// Aggregated metrics for a single experiment arm
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArmMetrics {
    pub arm_name: String,
    pub sample_size: u64,
    pub metrics: RateMetrics,
    pub counts: FunnelCounts,
}

/// Which funnel metric a lift record refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    OpenRate,
    ClickRate,
    ConversionRate,
}

impl MetricKind {
    pub const ALL: [MetricKind; 3] = [
        MetricKind::OpenRate,
        MetricKind::ClickRate,
        MetricKind::ConversionRate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::OpenRate => "open_rate",
            MetricKind::ClickRate => "click_rate",
            MetricKind::ConversionRate => "conversion_rate",
        }
    }

    fn rate(&self, metrics: &RateMetrics) -> f64 {
        match self {
            MetricKind::OpenRate => metrics.open_rate,
            MetricKind::ClickRate => metrics.click_rate,
            MetricKind::ConversionRate => metrics.conversion_rate,
        }
    }

    fn successes(&self, counts: &FunnelCounts) -> u64 {
        match self {
            MetricKind::OpenRate => counts.opened,
            MetricKind::ClickRate => counts.clicked,
            MetricKind::ConversionRate => counts.converted,
        }
    }
}

/// Which test produced a significance result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestType {
    ChiSquare,
    Failed,
}

/// Confidence interval for the difference in proportions
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ConfidenceInterval {
    pub lower: f64,
    pub upper: f64,
}

/// Significance test outcome for one treatment/metric pair
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Significance {
    pub p_value: f64,
    pub significant: bool,
    pub test_type: TestType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chi2_statistic: Option<f64>,
    pub confidence_interval: ConfidenceInterval,
}

impl Significance {
    /// Safe default used when the test is undefined for the data
    fn failed(ci: ConfidenceInterval) -> Self {
        Self {
            p_value: 1.0,
            significant: false,
            test_type: TestType::Failed,
            chi2_statistic: None,
            confidence_interval: ci,
        }
    }
}

/// Lift of one treatment arm vs. control for one metric
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiftRecord {
    pub treatment_arm: String,
    pub metric: MetricKind,
    pub control_value: f64,
    pub treatment_value: f64,
    pub lift_percent: f64,
    pub lift_absolute: f64,
    pub statistical_significance: Significance,
}

/// Per-segment results with the best-performing arm
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentBreakdown {
    pub segment: String,
    pub sample_size: u64,
    pub best_performing_arm: String,
    pub lift_percent: f64,
    pub metrics_by_arm: BTreeMap<String, ArmMetrics>,
}

/// Full metrics output for an experiment run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentMetrics {
    pub experiment_id: Option<String>,
    pub experiment_name: String,
    pub total_customers: u64,
    /// Per-arm metrics keyed by arm name; always the full canonical set
    pub arms: BTreeMap<String, ArmMetrics>,
    pub lift_analysis: Vec<LiftRecord>,
    pub segment_breakdown: Vec<SegmentBreakdown>,
    pub computed_at: DateTime<Utc>,
}

// =============================================================================
// CALCULATION
// =============================================================================

/// Aggregate engagement records into the full metrics output.
///
/// Tolerates arms with zero records (metrics report 0, not NaN) and
/// never fails for well-formed input.
pub fn calculate_metrics(
    engagement: &[EngagementRecord],
    experiment_id: Option<String>,
    experiment_name: &str,
    alpha: f64,
) -> ExperimentMetrics {
    info!(record_count = engagement.len(), "Calculating metrics");

    let arms = arm_metrics_for(engagement);
    let lift_analysis = lift_analysis(&arms, alpha);
    let segment_breakdown = segment_breakdown(engagement);

    info!("Metrics calculation completed");
    ExperimentMetrics {
        experiment_id,
        experiment_name: experiment_name.to_string(),
        total_customers: engagement.len() as u64,
        arms,
        lift_analysis,
        segment_breakdown,
        computed_at: Utc::now(),
    }
}

/// Per-arm metrics over a record set, with every canonical arm present
fn arm_metrics_for(records: &[EngagementRecord]) -> BTreeMap<String, ArmMetrics> {
    let mut counts: BTreeMap<&'static str, FunnelCounts> = ArmKind::ALL
        .iter()
        .map(|kind| (kind.as_str(), FunnelCounts::default()))
        .collect();

    for record in records {
        let entry = counts
            .entry(record.experiment_arm.as_str())
            .or_default();
        entry.sent += 1;
        if record.opened {
            entry.opened += 1;
        }
        if record.clicked {
            entry.clicked += 1;
        }
        if record.converted {
            entry.converted += 1;
        }
    }

    counts
        .into_iter()
        .map(|(name, counts)| (name.to_string(), build_arm_metrics(name, counts)))
        .collect()
}

fn build_arm_metrics(arm_name: &str, counts: FunnelCounts) -> ArmMetrics {
    let rate = |n: u64| {
        if counts.sent > 0 {
            n as f64 / counts.sent as f64
        } else {
            0.0
        }
    };

    ArmMetrics {
        arm_name: arm_name.to_string(),
        sample_size: counts.sent,
        metrics: RateMetrics {
            open_rate: rate(counts.opened),
            click_rate: rate(counts.clicked),
            conversion_rate: rate(counts.converted),
        },
        counts,
    }
}

/// Lift of every treatment arm vs. control, per metric, with
/// significance attached
fn lift_analysis(arms: &BTreeMap<String, ArmMetrics>, alpha: f64) -> Vec<LiftRecord> {
    let control = match arms.get(ArmKind::Control.as_str()) {
        Some(control) => control,
        None => {
            warn!("No control arm found for lift calculation");
            return Vec::new();
        }
    };

    let mut analysis = Vec::new();

    for kind in ArmKind::ALL {
        if kind.is_control() {
            continue;
        }
        let treatment = match arms.get(kind.as_str()) {
            Some(treatment) => treatment,
            None => continue,
        };

        for metric in MetricKind::ALL {
            let control_value = metric.rate(&control.metrics);
            let treatment_value = metric.rate(&treatment.metrics);

            let (lift_percent, lift_absolute) = if control_value > 0.0 {
                (
                    (treatment_value - control_value) / control_value * 100.0,
                    treatment_value - control_value,
                )
            } else {
                (0.0, treatment_value)
            };

            analysis.push(LiftRecord {
                treatment_arm: treatment.arm_name.clone(),
                metric,
                control_value,
                treatment_value,
                lift_percent,
                lift_absolute,
                statistical_significance: significance(control, treatment, metric, alpha),
            });
        }
    }

    analysis
}

/// Chi-square significance for one treatment/metric pair.
///
/// Degenerate tables degrade to the failed result instead of erroring,
/// so one undefined test never aborts the rest of the analysis.
fn significance(
    control: &ArmMetrics,
    treatment: &ArmMetrics,
    metric: MetricKind,
    alpha: f64,
) -> Significance {
    let n1 = control.sample_size;
    let x1 = metric.successes(&control.counts);
    let n2 = treatment.sample_size;
    let x2 = metric.successes(&treatment.counts);

    let (ci_lower, ci_upper) = stats::diff_confidence_interval(n1, x1, n2, x2);
    let ci = ConfidenceInterval {
        lower: ci_lower,
        upper: ci_upper,
    };

    match stats::chi_square_2x2(n1, x1, n2, x2) {
        Some(result) => Significance {
            p_value: result.p_value,
            significant: result.p_value < alpha,
            test_type: TestType::ChiSquare,
            chi2_statistic: Some(result.statistic),
            confidence_interval: ci,
        },
        None => {
            warn!(
                treatment_arm = treatment.arm_name.as_str(),
                metric = metric.as_str(),
                "Statistical significance calculation failed: degenerate contingency table"
            );
            Significance::failed(ci)
        }
    }
}

/// Per-segment metrics with the best arm by click rate.
///
/// The scan follows canonical arm order with a strict comparison, so a
/// tie keeps the earlier arm: control first, then lower treatment
/// indices.
fn segment_breakdown(records: &[EngagementRecord]) -> Vec<SegmentBreakdown> {
    let mut by_segment: BTreeMap<&str, Vec<&EngagementRecord>> = BTreeMap::new();
    for record in records {
        by_segment.entry(record.segment.as_str()).or_default().push(record);
    }

    let mut breakdown = Vec::new();

    for (segment, segment_records) in by_segment {
        let owned: Vec<EngagementRecord> =
            segment_records.iter().map(|r| (*r).clone()).collect();
        let metrics_by_arm = arm_metrics_for(&owned);

        let mut best_arm = ArmKind::Control.as_str();
        let mut best_click_rate = 0.0;
        for kind in ArmKind::ALL {
            if let Some(arm) = metrics_by_arm.get(kind.as_str()) {
                if arm.metrics.click_rate > best_click_rate {
                    best_click_rate = arm.metrics.click_rate;
                    best_arm = kind.as_str();
                }
            }
        }

        let control_click_rate = metrics_by_arm
            .get(ArmKind::Control.as_str())
            .map(|arm| arm.metrics.click_rate)
            .unwrap_or(0.0);
        let lift_percent = if control_click_rate > 0.0 {
            (best_click_rate - control_click_rate) / control_click_rate * 100.0
        } else {
            0.0
        };

        breakdown.push(SegmentBreakdown {
            segment: segment.to_string(),
            sample_size: owned.len() as u64,
            best_performing_arm: best_arm.to_string(),
            lift_percent,
            metrics_by_arm,
        });
    }

    breakdown
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::design::Tone;
    use crate::simulation::EngagementSource;
    use chrono::Utc;

    /// Build `total` records for an arm with the given funnel counts
    fn records(
        arm: ArmKind,
        segment: &str,
        total: u64,
        opened: u64,
        clicked: u64,
        converted: u64,
    ) -> Vec<EngagementRecord> {
        assert!(converted <= clicked && clicked <= opened && opened <= total);
        (0..total)
            .map(|i| EngagementRecord {
                customer_id: format!("{arm}_{segment}_{i}"),
                segment: segment.to_string(),
                experiment_arm: arm,
                variant_id: "VAR".to_string(),
                opened: i < opened,
                clicked: i < clicked,
                converted: i < converted,
                engagement_at: Utc::now(),
                engagement_source: EngagementSource::Simulated,
            })
            .collect()
    }

    fn treatment(i: usize) -> ArmKind {
        ArmKind::Treatment(Tone::ALL[i - 1])
    }

    #[test]
    fn test_arm_aggregation() {
        let data = records(ArmKind::Control, "Standard", 100, 30, 10, 2);
        let metrics = calculate_metrics(&data, None, "test", 0.05);

        let control = &metrics.arms["control"];
        assert_eq!(control.sample_size, 100);
        assert!((control.metrics.open_rate - 0.30).abs() < 1e-12);
        assert!((control.metrics.click_rate - 0.10).abs() < 1e-12);
        assert!((control.metrics.conversion_rate - 0.02).abs() < 1e-12);
        assert_eq!(control.counts.sent, 100);
        assert_eq!(control.counts.opened, 30);
    }

    #[test]
    fn test_all_canonical_arms_present_even_when_empty() {
        let data = records(ArmKind::Control, "Standard", 10, 5, 1, 0);
        let metrics = calculate_metrics(&data, None, "test", 0.05);

        assert_eq!(metrics.arms.len(), 4);
        for kind in ArmKind::ALL {
            assert!(metrics.arms.contains_key(kind.as_str()));
        }
        let t3 = &metrics.arms["treatment_3"];
        assert_eq!(t3.sample_size, 0);
        assert_eq!(t3.metrics.open_rate, 0.0);
    }

    #[test]
    fn test_lift_fifty_percent() {
        // control click_rate 0.05, treatment_1 click_rate 0.075 -> +50%
        let mut data = records(ArmKind::Control, "Standard", 200, 60, 10, 1);
        data.extend(records(treatment(1), "Standard", 200, 70, 15, 2));

        let metrics = calculate_metrics(&data, None, "test", 0.05);
        let lift = metrics
            .lift_analysis
            .iter()
            .find(|l| l.treatment_arm == "treatment_1" && l.metric == MetricKind::ClickRate)
            .unwrap();

        assert!((lift.control_value - 0.05).abs() < 1e-12);
        assert!((lift.treatment_value - 0.075).abs() < 1e-12);
        assert!((lift.lift_percent - 50.0).abs() < 1e-9);
        assert!((lift.lift_absolute - 0.025).abs() < 1e-12);
    }

    #[test]
    fn test_zero_control_lift_is_zero() {
        let mut data = records(ArmKind::Control, "Standard", 50, 10, 0, 0);
        data.extend(records(treatment(1), "Standard", 50, 20, 5, 0));

        let metrics = calculate_metrics(&data, None, "test", 0.05);
        let lift = metrics
            .lift_analysis
            .iter()
            .find(|l| l.treatment_arm == "treatment_1" && l.metric == MetricKind::ClickRate)
            .unwrap();

        assert_eq!(lift.control_value, 0.0);
        assert_eq!(lift.lift_percent, 0.0);
        assert!((lift.lift_absolute - 0.1).abs() < 1e-12);
        assert!(lift.lift_percent.is_finite());
    }

    #[test]
    fn test_lift_analysis_covers_all_treatments_and_metrics() {
        let mut data = records(ArmKind::Control, "Standard", 40, 10, 2, 0);
        for i in 1..=3 {
            data.extend(records(treatment(i), "Standard", 40, 12, 3, 1));
        }

        let metrics = calculate_metrics(&data, None, "test", 0.05);
        assert_eq!(metrics.lift_analysis.len(), 9); // 3 arms x 3 metrics
    }

    #[test]
    fn test_significant_difference_detected() {
        let mut data = records(ArmKind::Control, "Standard", 1000, 100, 100, 0);
        data.extend(records(treatment(1), "Standard", 1000, 200, 200, 0));

        let metrics = calculate_metrics(&data, None, "test", 0.05);
        let lift = metrics
            .lift_analysis
            .iter()
            .find(|l| l.treatment_arm == "treatment_1" && l.metric == MetricKind::ClickRate)
            .unwrap();

        let sig = &lift.statistical_significance;
        assert_eq!(sig.test_type, TestType::ChiSquare);
        assert!(sig.significant);
        assert!(sig.p_value < 0.05);
        assert!(sig.chi2_statistic.unwrap() > 3.841);
        // CI for the 10-point difference excludes zero
        assert!(sig.confidence_interval.lower > 0.0);
    }

    #[test]
    fn test_degenerate_table_degrades_to_failed() {
        // No conversions anywhere: the conversion-rate table is degenerate
        let mut data = records(ArmKind::Control, "Standard", 100, 30, 10, 0);
        data.extend(records(treatment(1), "Standard", 100, 40, 15, 0));

        let metrics = calculate_metrics(&data, None, "test", 0.05);
        let lift = metrics
            .lift_analysis
            .iter()
            .find(|l| {
                l.treatment_arm == "treatment_1" && l.metric == MetricKind::ConversionRate
            })
            .unwrap();

        let sig = &lift.statistical_significance;
        assert_eq!(sig.test_type, TestType::Failed);
        assert_eq!(sig.p_value, 1.0);
        assert!(!sig.significant);
        assert!(sig.chi2_statistic.is_none());

        // The click-rate test for the same arm still ran
        let click = metrics
            .lift_analysis
            .iter()
            .find(|l| l.treatment_arm == "treatment_1" && l.metric == MetricKind::ClickRate)
            .unwrap();
        assert_eq!(click.statistical_significance.test_type, TestType::ChiSquare);
    }

    #[test]
    fn test_empty_input() {
        let metrics = calculate_metrics(&[], None, "test", 0.05);
        assert_eq!(metrics.total_customers, 0);
        assert_eq!(metrics.arms.len(), 4);
        assert!(metrics.arms.values().all(|a| a.sample_size == 0));
        assert!(metrics.segment_breakdown.is_empty());
        // Lift records exist, all zeroed, with the failed test type
        for lift in &metrics.lift_analysis {
            assert_eq!(lift.lift_percent, 0.0);
            assert_eq!(lift.statistical_significance.test_type, TestType::Failed);
        }
    }

    #[test]
    fn test_segment_breakdown_best_arm() {
        // treatment_2 clearly wins on click rate in this segment
        let mut data = records(ArmKind::Control, "Standard", 100, 40, 5, 0);
        data.extend(records(treatment(1), "Standard", 100, 45, 8, 0));
        data.extend(records(treatment(2), "Standard", 100, 50, 20, 0));

        let metrics = calculate_metrics(&data, None, "test", 0.05);
        assert_eq!(metrics.segment_breakdown.len(), 1);

        let segment = &metrics.segment_breakdown[0];
        assert_eq!(segment.segment, "Standard");
        assert_eq!(segment.sample_size, 300);
        assert_eq!(segment.best_performing_arm, "treatment_2");
        // (0.20 - 0.05) / 0.05 * 100 = 300%
        assert!((segment.lift_percent - 300.0).abs() < 1e-9);
    }

    #[test]
    fn test_segment_breakdown_tie_keeps_earlier_arm() {
        // Identical click rates: control wins the tie by canonical order
        let mut data = records(ArmKind::Control, "Standard", 100, 40, 10, 0);
        data.extend(records(treatment(1), "Standard", 100, 40, 10, 0));

        let metrics = calculate_metrics(&data, None, "test", 0.05);
        let segment = &metrics.segment_breakdown[0];
        assert_eq!(segment.best_performing_arm, "control");
        assert_eq!(segment.lift_percent, 0.0);
    }

    #[test]
    fn test_segment_breakdown_groups_segments() {
        let mut data = records(ArmKind::Control, "Standard", 50, 10, 2, 0);
        data.extend(records(ArmKind::Control, "New Customer", 30, 5, 1, 0));

        let metrics = calculate_metrics(&data, None, "test", 0.05);
        assert_eq!(metrics.segment_breakdown.len(), 2);

        let segments: Vec<&str> = metrics
            .segment_breakdown
            .iter()
            .map(|s| s.segment.as_str())
            .collect();
        assert_eq!(segments, vec!["New Customer", "Standard"]);
    }

    #[test]
    fn test_json_boundary_shape() {
        let data = records(ArmKind::Control, "Standard", 10, 5, 2, 1);
        let metrics = calculate_metrics(&data, Some("EXP_TEST01".to_string()), "poc", 0.05);

        let json = serde_json::to_value(&metrics).unwrap();
        assert_eq!(json["experiment_id"], "EXP_TEST01");
        assert_eq!(json["experiment_name"], "poc");
        assert!(json["arms"]["control"]["metrics"]["open_rate"].is_number());
        assert!(json["arms"]["treatment_1"].is_object());
    }
}
