//! Core data types shared across the engine
//!
//! Identifiers, capability and region vocabularies, priority tiers, lifecycle
//! states, and the typed recommendation snapshot that a validation request
//! carries. Workflow records live next to the workflow that owns them.

use crate::error::{AgroError, Result};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Create a new random identifier
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Parse an identifier from a string
            pub fn from_string(s: &str) -> std::result::Result<Self, uuid::Error> {
                Ok(Self(Uuid::parse_str(s)?))
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                Self::from_string(s)
            }
        }
    };
}

uuid_id!(
    /// Unique identifier for a reviewer profile
    ReviewerId
);
uuid_id!(
    /// Unique identifier for a validation request
    ValidationId
);
uuid_id!(
    /// Unique identifier for a submitted expert review
    ReviewId
);
uuid_id!(
    /// Unique identifier for a field trial
    FieldTestId
);

/// Area of expertise a reviewer can be matched on
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Capability {
    DroughtSpecialist,
    IrrigationSpecialist,
    SoilScientist,
    CropAgronomist,
    AgriculturalEconomist,
    ExtensionAgent,
}

impl Capability {
    pub const ALL: [Capability; 6] = [
        Capability::DroughtSpecialist,
        Capability::IrrigationSpecialist,
        Capability::SoilScientist,
        Capability::CropAgronomist,
        Capability::AgriculturalEconomist,
        Capability::ExtensionAgent,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::DroughtSpecialist => "drought-specialist",
            Capability::IrrigationSpecialist => "irrigation-specialist",
            Capability::SoilScientist => "soil-scientist",
            Capability::CropAgronomist => "crop-agronomist",
            Capability::AgriculturalEconomist => "agricultural-economist",
            Capability::ExtensionAgent => "extension-agent",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Capability {
    type Err = AgroError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_lowercase().replace('_', "-");
        Capability::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == normalized)
            .ok_or_else(|| {
                AgroError::invalid_input("capability", format!("unknown capability '{}'", s))
            })
    }
}

/// Region code a reviewer covers or a recommendation targets
///
/// Codes are trimmed and lower-cased on construction so that `"TX-Central"`
/// and `"tx-central "` refer to the same region.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct RegionCode(String);

impl RegionCode {
    pub fn new(code: impl AsRef<str>) -> Self {
        Self(code.as_ref().trim().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<String> for RegionCode {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for RegionCode {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<RegionCode> for String {
    fn from(r: RegionCode) -> Self {
        r.0
    }
}

impl fmt::Display for RegionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Service tier of a validation request
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Normal,
    High,
    Critical,
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Normal
    }
}

impl Priority {
    /// Default review window for this tier
    pub fn default_deadline(&self) -> Duration {
        match self {
            Priority::Low => Duration::hours(168),
            Priority::Normal => Duration::hours(72),
            Priority::High => Duration::hours(24),
            Priority::Critical => Duration::hours(8),
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Priority::Low => "low",
            Priority::Normal => "normal",
            Priority::High => "high",
            Priority::Critical => "critical",
        };
        f.write_str(s)
    }
}

impl FromStr for Priority {
    type Err = AgroError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "normal" => Ok(Priority::Normal),
            "high" => Ok(Priority::High),
            "critical" => Ok(Priority::Critical),
            other => Err(AgroError::invalid_input(
                "priority",
                format!("unknown priority '{}'", other),
            )),
        }
    }
}

/// Lifecycle state of a validation request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    /// Created, no reviewer assigned yet
    Pending,

    /// At least one reviewer assigned, reviews outstanding
    InReview,

    /// Every assigned reviewer approved
    Approved,

    /// Every assigned reviewer rejected
    Rejected,

    /// Reviewers disagreed
    RequiresRevision,
}

impl ValidationStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ValidationStatus::Approved
                | ValidationStatus::Rejected
                | ValidationStatus::RequiresRevision
        )
    }

    /// Terminal disposition for a complete set of approval votes
    ///
    /// Returns `None` for an empty set; a validation with no reviews can never
    /// be terminal.
    pub fn from_approvals(approvals: &[bool]) -> Option<Self> {
        if approvals.is_empty() {
            return None;
        }
        if approvals.iter().all(|a| *a) {
            Some(ValidationStatus::Approved)
        } else if approvals.iter().all(|a| !*a) {
            Some(ValidationStatus::Rejected)
        } else {
            Some(ValidationStatus::RequiresRevision)
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationStatus::Pending => "pending",
            ValidationStatus::InReview => "in_review",
            ValidationStatus::Approved => "approved",
            ValidationStatus::Rejected => "rejected",
            ValidationStatus::RequiresRevision => "requires_revision",
        }
    }
}

impl fmt::Display for ValidationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ValidationStatus {
    type Err = AgroError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(ValidationStatus::Pending),
            "in_review" => Ok(ValidationStatus::InReview),
            "approved" => Ok(ValidationStatus::Approved),
            "rejected" => Ok(ValidationStatus::Rejected),
            "requires_revision" => Ok(ValidationStatus::RequiresRevision),
            other => Err(AgroError::invalid_input(
                "status",
                format!("unknown validation status '{}'", other),
            )),
        }
    }
}

/// Dimension a reviewer scores a recommendation on
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ValidationCriterion {
    ScientificSoundness,
    PracticalFeasibility,
    EconomicViability,
    EnvironmentalSafety,
    RegionalSuitability,
    FarmerAdoptability,
}

impl fmt::Display for ValidationCriterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ValidationCriterion::ScientificSoundness => "scientific-soundness",
            ValidationCriterion::PracticalFeasibility => "practical-feasibility",
            ValidationCriterion::EconomicViability => "economic-viability",
            ValidationCriterion::EnvironmentalSafety => "environmental-safety",
            ValidationCriterion::RegionalSuitability => "regional-suitability",
            ValidationCriterion::FarmerAdoptability => "farmer-adoptability",
        };
        f.write_str(s)
    }
}

/// Single value in a monitoring, outcome, or feedback map
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Number(f64),
    Flag(bool),
    Text(String),
}

impl MetricValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            MetricValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_flag(&self) -> Option<bool> {
        match self {
            MetricValue::Flag(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            MetricValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<f64> for MetricValue {
    fn from(n: f64) -> Self {
        MetricValue::Number(n)
    }
}

impl From<bool> for MetricValue {
    fn from(b: bool) -> Self {
        MetricValue::Flag(b)
    }
}

impl From<&str> for MetricValue {
    fn from(s: &str) -> Self {
        MetricValue::Text(s.to_string())
    }
}

impl From<String> for MetricValue {
    fn from(s: String) -> Self {
        MetricValue::Text(s)
    }
}

/// Keyed bag of metric values
pub type MetricMap = BTreeMap<String, MetricValue>;

/// Practice family of a proposed practice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PracticeCategory {
    Irrigation,
    WaterConservation,
    SoilManagement,
    Tillage,
    CoverCrop,
    CropSelection,
}

impl PracticeCategory {
    /// Capability needed to judge practices of this family
    pub fn capability(&self) -> Capability {
        match self {
            PracticeCategory::Irrigation | PracticeCategory::WaterConservation => {
                Capability::IrrigationSpecialist
            }
            PracticeCategory::SoilManagement
            | PracticeCategory::Tillage
            | PracticeCategory::CoverCrop => Capability::SoilScientist,
            PracticeCategory::CropSelection => Capability::CropAgronomist,
        }
    }
}

/// Geographic position of the recommendation target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    pub region: RegionCode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub county: Option<String>,
}

/// Field conditions the recommendation was computed from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldConditions {
    pub crop_type: String,
    pub soil_type: String,
    pub field_size_acres: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub irrigation_method: Option<String>,
    #[serde(default)]
    pub extra: MetricMap,
}

/// Severity band of the computed assessment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Moderate,
    High,
    Severe,
}

/// Output of the upstream scoring calculators
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assessment {
    pub overall_score: f64,
    pub risk_level: RiskLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drought_risk_score: Option<f64>,
    #[serde(default)]
    pub factors: MetricMap,
}

/// One practice proposed by the recommendation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposedPractice {
    pub name: String,
    pub category: PracticeCategory,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Projected savings attached to the recommendation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SavingsEstimate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub water_savings_percent: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_savings_per_acre: Option<f64>,
    #[serde(default)]
    pub extra: MetricMap,
}

/// Immutable copy of the data a recommendation was produced from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationSnapshot {
    pub recommendation_id: String,
    pub location: Location,
    pub field_conditions: FieldConditions,
    pub assessment: Assessment,
    #[serde(default)]
    pub proposed_practices: Vec<ProposedPractice>,
    #[serde(default)]
    pub savings_estimates: SavingsEstimate,
}

impl RecommendationSnapshot {
    /// Check the snapshot is usable as validation input
    pub fn validate(&self) -> Result<()> {
        if self.recommendation_id.trim().is_empty() {
            return Err(AgroError::invalid_input(
                "recommendation_id",
                "must not be empty",
            ));
        }
        if self.location.region.is_empty() {
            return Err(AgroError::invalid_input("location.region", "must not be empty"));
        }
        if !(-90.0..=90.0).contains(&self.location.latitude) {
            return Err(AgroError::invalid_input(
                "location.latitude",
                "must be within [-90, 90]",
            ));
        }
        if !(-180.0..=180.0).contains(&self.location.longitude) {
            return Err(AgroError::invalid_input(
                "location.longitude",
                "must be within [-180, 180]",
            ));
        }
        Ok(())
    }

    /// Capability types needed to review this recommendation
    ///
    /// Falls back to a crop agronomist when nothing in the snapshot maps to a
    /// specialist.
    pub fn required_capabilities(&self) -> Vec<Capability> {
        let mut required: BTreeSet<Capability> = self
            .proposed_practices
            .iter()
            .map(|p| p.category.capability())
            .collect();

        if self.assessment.drought_risk_score.is_some() {
            required.insert(Capability::DroughtSpecialist);
        }
        if self.savings_estimates.cost_savings_per_acre.is_some() {
            required.insert(Capability::AgriculturalEconomist);
        }
        if required.is_empty() {
            required.insert(Capability::CropAgronomist);
        }

        required.into_iter().collect()
    }
}
