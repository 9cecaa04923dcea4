//! Experiment design: arms, tones, and the structure built from
//! approved message variants.
//!
//! An experiment always has exactly four arms: one `control` carrying a
//! fixed generic message, and one treatment arm per message tone.
//! Treatment arms hold, per discovered segment, the variant matching
//! that segment+tone pairing (or nothing, when generation produced no
//! match).

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use crate::config::{
    ControlMessage, ExperimentConfig, MetricsConfig, SampleAllocation, StatisticalTesting,
};
use crate::errors::{ExperimentError, ValidationErrorExt};
use crate::validation;

// =============================================================================
// ARM MODEL
// =============================================================================

/// Message tone of a treatment arm
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tone {
    Urgent,
    Informational,
    Friendly,
}

impl Tone {
    /// All tones in treatment-arm order (treatment_1..3)
    pub const ALL: [Tone; 3] = [Tone::Urgent, Tone::Informational, Tone::Friendly];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tone::Urgent => "urgent",
            Tone::Informational => "informational",
            Tone::Friendly => "friendly",
        }
    }

    /// 1-based treatment arm index for this tone
    pub fn treatment_index(&self) -> usize {
        match self {
            Tone::Urgent => 1,
            Tone::Informational => 2,
            Tone::Friendly => 3,
        }
    }
}

impl fmt::Display for Tone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One experiment arm: the generic control or a tone-specific treatment
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ArmKind {
    Control,
    Treatment(Tone),
}

impl ArmKind {
    /// Canonical arm order: control first, then treatments by tone index.
    /// Iteration over arms always follows this order, which also serves
    /// as the documented tie-break for best-arm selection.
    pub const ALL: [ArmKind; 4] = [
        ArmKind::Control,
        ArmKind::Treatment(Tone::Urgent),
        ArmKind::Treatment(Tone::Informational),
        ArmKind::Treatment(Tone::Friendly),
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ArmKind::Control => "control",
            ArmKind::Treatment(Tone::Urgent) => "treatment_1",
            ArmKind::Treatment(Tone::Informational) => "treatment_2",
            ArmKind::Treatment(Tone::Friendly) => "treatment_3",
        }
    }

    pub fn is_control(&self) -> bool {
        matches!(self, ArmKind::Control)
    }

    pub fn tone(&self) -> Option<Tone> {
        match self {
            ArmKind::Control => None,
            ArmKind::Treatment(tone) => Some(*tone),
        }
    }
}

impl fmt::Display for ArmKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ArmKind {
    type Err = ExperimentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "control" => Ok(ArmKind::Control),
            "treatment_1" => Ok(ArmKind::Treatment(Tone::Urgent)),
            "treatment_2" => Ok(ArmKind::Treatment(Tone::Informational)),
            "treatment_3" => Ok(ArmKind::Treatment(Tone::Friendly)),
            other => Err(ExperimentError::UnknownArm(other.to_string())),
        }
    }
}

// Arms cross the JSON boundary as their canonical name strings.
impl Serialize for ArmKind {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ArmKind {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// INPUT RECORDS
// =============================================================================

/// Approved message variant from the generation/safety stages
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Variant {
    pub variant_id: String,
    pub segment: String,
    pub tone: Tone,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub citations: Vec<String>,
}

/// Customer record from the segmentation stage.
///
/// Upstream attaches arbitrary attributes (recency, spend, ...); they
/// are carried through untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
    pub customer_id: String,
    pub segment: String,
    #[serde(flatten)]
    pub attributes: serde_json::Map<String, Value>,
}

impl Customer {
    pub fn new(customer_id: impl Into<String>, segment: impl Into<String>) -> Self {
        Self {
            customer_id: customer_id.into(),
            segment: segment.into(),
            attributes: serde_json::Map::new(),
        }
    }
}

// =============================================================================
// DESIGN STRUCTURE
// =============================================================================

/// Whether an arm serves a generic or personalized message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariantType {
    Generic,
    Personalized,
}

/// Full description of one arm within a design
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArmSpec {
    pub kind: ArmKind,
    pub name: String,
    pub description: String,
    pub variant_type: VariantType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tone: Option<Tone>,
    /// Fixed message, control arm only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<ControlMessage>,
    /// Segment -> matching variant (None when no variant covers the pairing)
    pub variants_by_segment: BTreeMap<String, Option<Variant>>,
}

impl ArmSpec {
    /// Variant serving a given segment in this arm, if any
    pub fn variant_for_segment(&self, segment: &str) -> Option<&Variant> {
        self.variants_by_segment
            .get(segment)
            .and_then(|v| v.as_ref())
    }
}

/// Structured A/B/n experiment design
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentDesign {
    pub experiment_id: String,
    pub name: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    /// Arms keyed by canonical name; always the full 4-arm set
    pub arms: BTreeMap<String, ArmSpec>,
    /// Sorted, deduplicated segment names discovered from the variants
    pub segments: Vec<String>,
    pub assignment_strategy: String,
    pub sample_allocation: SampleAllocation,
    pub metrics: MetricsConfig,
    pub statistical_testing: StatisticalTesting,
}

impl ExperimentDesign {
    /// Build a design from approved variants plus configuration.
    ///
    /// Pure over its inputs aside from id generation; an empty variant
    /// list yields a valid design with no segments. Fails only when a
    /// variant violates its input contract.
    pub fn build(
        variants: &[Variant],
        config: &ExperimentConfig,
    ) -> Result<Self, ExperimentError> {
        info!(variant_count = variants.len(), "Designing experiment");

        let experiment_id = config
            .experiment_id
            .clone()
            .unwrap_or_else(generate_experiment_id);

        // Discover segments and index variants by (segment, tone)
        let mut segments: Vec<String> = Vec::new();
        let mut by_segment_tone: BTreeMap<(String, Tone), Variant> = BTreeMap::new();
        for variant in variants {
            validation::validate_variant_id(&variant.variant_id)
                .map_validation_err("variant_id")?;
            validation::validate_segment_name(&variant.segment).map_validation_err("segment")?;

            if !segments.contains(&variant.segment) {
                segments.push(variant.segment.clone());
            }
            by_segment_tone.insert(
                (variant.segment.clone(), variant.tone),
                variant.clone(),
            );
        }
        segments.sort();
        info!(?segments, "Discovered segments");

        let mut arms = BTreeMap::new();

        let control_description = config
            .arms
            .get("control")
            .map(|a| a.description.clone())
            .unwrap_or_else(|| "Generic control message".to_string());
        arms.insert(
            ArmKind::Control.as_str().to_string(),
            ArmSpec {
                kind: ArmKind::Control,
                name: ArmKind::Control.as_str().to_string(),
                description: control_description,
                variant_type: VariantType::Generic,
                tone: None,
                message: Some(config.control_message.clone()),
                variants_by_segment: BTreeMap::new(),
            },
        );

        for tone in Tone::ALL {
            let kind = ArmKind::Treatment(tone);
            let name = kind.as_str().to_string();
            let description = config
                .arms
                .get(&name)
                .map(|a| a.description.clone())
                .unwrap_or_else(|| format!("Treatment {}", tone.treatment_index()));

            let variants_by_segment = segments
                .iter()
                .map(|segment| {
                    let variant = by_segment_tone.get(&(segment.clone(), tone)).cloned();
                    (segment.clone(), variant)
                })
                .collect();

            arms.insert(
                name.clone(),
                ArmSpec {
                    kind,
                    name,
                    description,
                    variant_type: VariantType::Personalized,
                    tone: Some(tone),
                    message: None,
                    variants_by_segment,
                },
            );
        }

        let design = Self {
            experiment_id: experiment_id.clone(),
            name: config.experiment.name.clone(),
            description: config.experiment.description.clone(),
            created_at: Utc::now(),
            arms,
            segments,
            assignment_strategy: config.assignment.method.clone(),
            sample_allocation: config.sample_allocation.clone(),
            metrics: config.metrics.clone(),
            statistical_testing: config.statistical_testing.clone(),
        };

        info!(
            experiment_id = %experiment_id,
            arm_count = design.arms.len(),
            "Experiment designed"
        );
        Ok(design)
    }

    /// Arm spec for a given arm kind
    pub fn arm(&self, kind: ArmKind) -> Option<&ArmSpec> {
        self.arms.get(kind.as_str())
    }
}

/// Generate a traceable experiment id: `EXP_` + 8 uppercase hex chars
fn generate_experiment_id() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("EXP_{}", hex[..8].to_uppercase())
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn variant(id: &str, segment: &str, tone: Tone) -> Variant {
        Variant {
            variant_id: id.to_string(),
            segment: segment.to_string(),
            tone,
            subject: format!("{tone} subject"),
            body: "body".to_string(),
            citations: vec![],
        }
    }

    #[test]
    fn test_arm_names_round_trip() {
        for kind in ArmKind::ALL {
            let parsed: ArmKind = kind.as_str().parse().unwrap();
            assert_eq!(parsed, kind);
        }
        assert!("treatment_4".parse::<ArmKind>().is_err());
        assert!("".parse::<ArmKind>().is_err());
    }

    #[test]
    fn test_arm_serializes_as_name() {
        let json = serde_json::to_string(&ArmKind::Treatment(Tone::Informational)).unwrap();
        assert_eq!(json, "\"treatment_2\"");

        let parsed: ArmKind = serde_json::from_str("\"control\"").unwrap();
        assert_eq!(parsed, ArmKind::Control);
    }

    #[test]
    fn test_design_has_four_arms() {
        let variants = vec![
            variant("VAR_001", "Standard", Tone::Urgent),
            variant("VAR_002", "Standard", Tone::Friendly),
        ];
        let design = ExperimentDesign::build(&variants, &ExperimentConfig::default()).unwrap();

        assert_eq!(design.arms.len(), 4);
        for kind in ArmKind::ALL {
            assert!(design.arms.contains_key(kind.as_str()));
        }
        assert_eq!(design.segments, vec!["Standard".to_string()]);
    }

    #[test]
    fn test_treatment_arms_map_segment_tone_pairs() {
        let variants = vec![
            variant("VAR_001", "Standard", Tone::Urgent),
            variant("VAR_002", "High-Value Recent", Tone::Urgent),
            variant("VAR_003", "Standard", Tone::Friendly),
        ];
        let design = ExperimentDesign::build(&variants, &ExperimentConfig::default()).unwrap();

        let t1 = design.arm(ArmKind::Treatment(Tone::Urgent)).unwrap();
        assert_eq!(
            t1.variant_for_segment("Standard").unwrap().variant_id,
            "VAR_001"
        );
        assert_eq!(
            t1.variant_for_segment("High-Value Recent").unwrap().variant_id,
            "VAR_002"
        );

        // Friendly tone only covers Standard; the other segment key is
        // present but empty
        let t3 = design.arm(ArmKind::Treatment(Tone::Friendly)).unwrap();
        assert!(t3.variant_for_segment("Standard").is_some());
        assert!(t3.variant_for_segment("High-Value Recent").is_none());
        assert!(t3.variants_by_segment.contains_key("High-Value Recent"));
    }

    #[test]
    fn test_empty_variants_yield_valid_design() {
        let design = ExperimentDesign::build(&[], &ExperimentConfig::default()).unwrap();
        assert!(design.segments.is_empty());
        assert_eq!(design.arms.len(), 4);
        let t1 = design.arm(ArmKind::Treatment(Tone::Urgent)).unwrap();
        assert!(t1.variants_by_segment.is_empty());
    }

    #[test]
    fn test_experiment_id_generated_or_supplied() {
        let design = ExperimentDesign::build(&[], &ExperimentConfig::default()).unwrap();
        assert!(design.experiment_id.starts_with("EXP_"));
        assert_eq!(design.experiment_id.len(), 12);

        let config = ExperimentConfig {
            experiment_id: Some("TEST_EXP_001".to_string()),
            ..Default::default()
        };
        let design = ExperimentDesign::build(&[], &config).unwrap();
        assert_eq!(design.experiment_id, "TEST_EXP_001");
    }

    #[test]
    fn test_control_arm_carries_config_message() {
        let config = ExperimentConfig::default();
        let design = ExperimentDesign::build(&[], &config).unwrap();

        let control = design.arm(ArmKind::Control).unwrap();
        assert_eq!(control.variant_type, VariantType::Generic);
        assert_eq!(control.message.as_ref().unwrap().subject, "Control");
        assert!(control.tone.is_none());
    }

    #[test]
    fn test_malformed_variant_rejected() {
        let variants = vec![variant("", "Standard", Tone::Urgent)];
        let err = ExperimentDesign::build(&variants, &ExperimentConfig::default()).unwrap_err();
        assert!(
            matches!(err, ExperimentError::InvalidInput { field, .. } if field == "variant_id")
        );

        let variants = vec![variant("VAR_001", "", Tone::Urgent)];
        let err = ExperimentDesign::build(&variants, &ExperimentConfig::default()).unwrap_err();
        assert!(matches!(err, ExperimentError::InvalidInput { field, .. } if field == "segment"));
    }

    #[test]
    fn test_later_variant_wins_duplicate_pairing() {
        let variants = vec![
            variant("VAR_001", "Standard", Tone::Urgent),
            variant("VAR_009", "Standard", Tone::Urgent),
        ];
        let design = ExperimentDesign::build(&variants, &ExperimentConfig::default()).unwrap();
        let t1 = design.arm(ArmKind::Treatment(Tone::Urgent)).unwrap();
        assert_eq!(t1.variant_for_segment("Standard").unwrap().variant_id, "VAR_009");
    }
}
