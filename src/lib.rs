//! # Personalization Experiment
//!
//! A/B/n experimentation engine for customer personalization campaigns.
//!
//! ## Features
//!
//! - **Experiment Design**: Control + 3 treatment arms, one per message
//!   tone, with per-segment variant mapping
//! - **Stratified Assignment**: Seeded random assignment per customer
//!   segment with target arm sizes and balance checking
//! - **Engagement Simulation**: Probabilistic open/click/convert funnel
//!   with per-segment baselines, sampled treatment uplift, and noise
//! - **Metrics & Significance**: Per-arm funnel metrics, lift vs.
//!   control, chi-square tests with confidence intervals, and segment
//!   breakdown
//!
//! ## Quick Start
//!
//! ```rust
//! use personalization_experiment::{ExperimentAgent, ExperimentConfig};
//! use personalization_experiment::design::{Customer, Tone, Variant};
//!
//! let config = ExperimentConfig::default().with_default_segments();
//! let mut agent = ExperimentAgent::new(config);
//!
//! let variants = vec![Variant {
//!     variant_id: "VAR_001".to_string(),
//!     segment: "Standard".to_string(),
//!     tone: Tone::Urgent,
//!     subject: "Last chance!".to_string(),
//!     body: "Offer ends tonight.".to_string(),
//!     citations: vec![],
//! }];
//! let customers = vec![Customer::new("CUST_0001", "Standard")];
//!
//! let design = agent.design_experiment(&variants)?;
//! let assignments = agent.assign_customers_to_arms(&customers, &design)?;
//! let engagement = agent.simulate_engagement(&assignments, None);
//! let metrics = agent.calculate_metrics(&engagement);
//! assert_eq!(metrics.arms.len(), 4);
//! # Ok::<(), personalization_experiment::ExperimentError>(())
//! ```

pub mod agent;
pub mod assignment;
pub mod config;
pub mod design;
pub mod errors;
pub mod metrics;
pub mod simulation;
pub mod stats;
pub mod validation;

pub use agent::ExperimentAgent;
pub use assignment::Assignment;
pub use config::ExperimentConfig;
pub use design::{ArmKind, Customer, ExperimentDesign, Tone, Variant};
pub use errors::{ExperimentError, Result};
pub use metrics::ExperimentMetrics;
pub use simulation::{EngagementRecord, EngagementSource};

// Re-export common dependencies for downstream convenience
pub use chrono;
pub use uuid;
