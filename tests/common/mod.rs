//! Common test utilities and helpers

#![allow(dead_code)]

use agrovalidate_core::types::{
    Assessment, FieldConditions, Location, PracticeCategory, ProposedPractice, RiskLevel,
    SavingsEstimate,
};
use agrovalidate_core::storage::{FieldTestQuery, ValidationQuery};
use agrovalidate_core::{
    metric_map, AgroError, BaselineConditions, Capability, CompletionReport, Engine,
    EngineConfig, ExpertReview, FieldTest, FieldTestId, FieldTestPlan, MemoryStore, MetricMap,
    MetricValue, Priority, RecommendationSnapshot, RecordStore, RegionCode, ReviewSubmission,
    ReviewerId, ReviewerProfile, ReviewerRegistration, ValidationCriterion, ValidationId,
    ValidationRequest, ValidationSubmission,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

pub const REGION: &str = "ca-central";

/// Engine over a shared in-memory store; the store is returned for direct edits
pub async fn create_test_engine() -> (Engine, Arc<dyn RecordStore>) {
    let store: Arc<dyn RecordStore> = Arc::new(MemoryStore::new());
    let engine = Engine::new(EngineConfig::default(), store.clone())
        .await
        .expect("Failed to create test engine");
    (engine, store)
}

/// In-memory store whose validation writes can be made to fail
pub struct FlakyStore {
    inner: MemoryStore,

    /// Validation writes still allowed to succeed; negative means unlimited
    validation_writes_left: AtomicI64,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self {
            inner: MemoryStore::new(),
            validation_writes_left: AtomicI64::new(-1),
        }
    }

    /// Let `n` more validation writes through, then fail every one after
    pub fn fail_validation_writes_after(&self, n: i64) {
        self.validation_writes_left.store(n, Ordering::SeqCst);
    }

    pub fn heal(&self) {
        self.validation_writes_left.store(-1, Ordering::SeqCst);
    }
}

#[async_trait]
impl RecordStore for FlakyStore {
    async fn put_reviewer(&self, profile: &ReviewerProfile) -> agrovalidate_core::Result<()> {
        self.inner.put_reviewer(profile).await
    }

    async fn list_reviewers(&self) -> agrovalidate_core::Result<Vec<ReviewerProfile>> {
        self.inner.list_reviewers().await
    }

    async fn put_validation(&self, request: &ValidationRequest) -> agrovalidate_core::Result<()> {
        let left = self.validation_writes_left.load(Ordering::SeqCst);
        if left == 0 {
            return Err(AgroError::Database("disk full".to_string()));
        }
        if left > 0 {
            self.validation_writes_left.fetch_sub(1, Ordering::SeqCst);
        }
        self.inner.put_validation(request).await
    }

    async fn get_validation(
        &self,
        id: ValidationId,
    ) -> agrovalidate_core::Result<Option<ValidationRequest>> {
        self.inner.get_validation(id).await
    }

    async fn list_validations(
        &self,
        query: &ValidationQuery,
    ) -> agrovalidate_core::Result<Vec<ValidationRequest>> {
        self.inner.list_validations(query).await
    }

    async fn insert_review(&self, review: &ExpertReview) -> agrovalidate_core::Result<()> {
        self.inner.insert_review(review).await
    }

    async fn list_reviews(
        &self,
        validation_id: ValidationId,
    ) -> agrovalidate_core::Result<Vec<ExpertReview>> {
        self.inner.list_reviews(validation_id).await
    }

    async fn list_reviews_since(
        &self,
        since: DateTime<Utc>,
    ) -> agrovalidate_core::Result<Vec<ExpertReview>> {
        self.inner.list_reviews_since(since).await
    }

    async fn put_field_test(&self, test: &FieldTest) -> agrovalidate_core::Result<()> {
        self.inner.put_field_test(test).await
    }

    async fn get_field_test(
        &self,
        id: FieldTestId,
    ) -> agrovalidate_core::Result<Option<FieldTest>> {
        self.inner.get_field_test(id).await
    }

    async fn list_field_tests(
        &self,
        query: &FieldTestQuery,
    ) -> agrovalidate_core::Result<Vec<FieldTest>> {
        self.inner.list_field_tests(query).await
    }
}

/// Engine over a [`FlakyStore`]; the store handle is returned for fault control
pub async fn create_flaky_engine() -> (Engine, Arc<FlakyStore>) {
    let flaky = Arc::new(FlakyStore::new());
    let store: Arc<dyn RecordStore> = flaky.clone();
    let engine = Engine::new(EngineConfig::default(), store)
        .await
        .expect("Failed to create test engine");
    (engine, flaky)
}

/// Engine backed by a SQLite file inside a temporary directory
pub async fn create_sqlite_engine(dir: &TempDir) -> Engine {
    let mut config = EngineConfig::default();
    config.storage.db_path = Some(dir.path().join("agrovalidate.db"));
    Engine::open_sqlite(config)
        .await
        .expect("Failed to open SQLite engine")
}

pub async fn register(
    engine: &Engine,
    name: &str,
    capabilities: &[Capability],
    approval_rate: f64,
    review_count: u64,
) -> ReviewerProfile {
    engine
        .register_reviewer(ReviewerRegistration {
            name: name.to_string(),
            credentials: "PhD Agronomy".to_string(),
            capabilities: capabilities.to_vec(),
            regions: vec![RegionCode::new(REGION)],
            years_experience: 8,
            approval_rate: Some(approval_rate),
            review_count: Some(review_count),
            mean_review_hours: Some(4.0),
        })
        .await
        .expect("Failed to register reviewer")
}

pub fn snapshot() -> RecommendationSnapshot {
    RecommendationSnapshot {
        recommendation_id: "rec-42".to_string(),
        location: Location {
            latitude: 36.7,
            longitude: -119.8,
            region: RegionCode::new(REGION),
            county: Some("Fresno".to_string()),
        },
        field_conditions: FieldConditions {
            crop_type: "almonds".to_string(),
            soil_type: "sandy loam".to_string(),
            field_size_acres: 80.0,
            irrigation_method: Some("micro-sprinkler".to_string()),
            extra: MetricMap::new(),
        },
        assessment: Assessment {
            overall_score: 0.58,
            risk_level: RiskLevel::High,
            drought_risk_score: Some(0.81),
            factors: MetricMap::new(),
        },
        proposed_practices: vec![
            ProposedPractice {
                name: "Regulated deficit irrigation".to_string(),
                category: PracticeCategory::Irrigation,
                description: None,
            },
            ProposedPractice {
                name: "Winter cover crop".to_string(),
                category: PracticeCategory::CoverCrop,
                description: None,
            },
        ],
        savings_estimates: SavingsEstimate {
            water_savings_percent: Some(22.0),
            cost_savings_per_acre: None,
            extra: MetricMap::new(),
        },
    }
}

pub fn submission(capabilities: Option<Vec<Capability>>) -> ValidationSubmission {
    ValidationSubmission {
        snapshot: snapshot(),
        criteria: vec![
            ValidationCriterion::ScientificSoundness,
            ValidationCriterion::PracticalFeasibility,
            ValidationCriterion::RegionalSuitability,
        ],
        priority: Priority::High,
        required_capabilities: capabilities,
    }
}

pub fn review(reviewer_id: ReviewerId, approved: bool, hours: f64) -> ReviewSubmission {
    ReviewSubmission {
        reviewer_id,
        criterion_scores: BTreeMap::from([
            (ValidationCriterion::ScientificSoundness, 0.9),
            (ValidationCriterion::PracticalFeasibility, 0.7),
            (ValidationCriterion::RegionalSuitability, 0.8),
        ]),
        overall_score: None,
        comments: "Reviewed against local extension trial data.".to_string(),
        approved,
        review_time_hours: hours,
    }
}

pub fn field_plan(farm_id: &str) -> FieldTestPlan {
    FieldTestPlan {
        farm_id: farm_id.to_string(),
        field_id: "block-3".to_string(),
        practice: "regulated deficit irrigation".to_string(),
        baseline: BaselineConditions {
            measured_at: None,
            values: metric_map([
                ("applied_water_in", MetricValue::from(42.0)),
                ("yield_lb_per_acre", MetricValue::from(2400.0)),
            ]),
        },
        duration_days: 120,
    }
}

pub fn completion(effectiveness: f64) -> CompletionReport {
    CompletionReport {
        outcome_metrics: metric_map([
            ("water_savings_percent", MetricValue::from(19.5)),
            ("yield_impact_percent", MetricValue::from(-1.0)),
            ("cost_benefit_ratio", MetricValue::from(2.1)),
        ]),
        farmer_feedback: metric_map([
            ("ease_of_implementation", MetricValue::from(0.7)),
            ("would_continue", MetricValue::from(true)),
            ("comments", MetricValue::from("Needed a second soil probe")),
        ]),
        effectiveness_score: effectiveness,
        farmer_satisfaction: 0.8,
    }
}
