//! Engine facade
//!
//! Wires the directory, matcher, workflows and metrics around one record
//! store and exposes the public operation set. Every operation is an
//! independent async call; the engine can be shared behind an `Arc`.

use crate::config::EngineConfig;
use crate::directory::{Directory, ReviewerFilter, ReviewerProfile, ReviewerRegistration};
use crate::error::Result;
use crate::field_test::{
    CompletionReport, FieldTest, FieldTestPlan, FieldTestWorkflow, MonitoringAck,
    MonitoringUpdate,
};
use crate::metrics::{ExpertPanelStatus, MetricsAggregator, ValidationMetrics};
use crate::storage::{MemoryStore, RecordStore, SqliteStore};
use crate::types::{FieldTestId, ReviewerId, ValidationId};
use crate::validation::{
    ExpertReview, ReviewSubmission, ValidationReport, ValidationRequest, ValidationStatusReport,
    ValidationSubmission, ValidationWorkflow,
};
use std::sync::Arc;
use tracing::info;

/// Expert validation and field-test engine
pub struct Engine {
    config: EngineConfig,
    directory: Directory,
    validations: ValidationWorkflow,
    field_tests: FieldTestWorkflow,
    metrics: MetricsAggregator,
}

impl Engine {
    /// Build an engine over `store`, loading the reviewer panel from it
    pub async fn new(config: EngineConfig, store: Arc<dyn RecordStore>) -> Result<Self> {
        config.validate()?;

        let directory = Directory::load(store.clone()).await?;
        let validations = ValidationWorkflow::new(
            store.clone(),
            directory.clone(),
            config.review.clone(),
            config.deadlines.clone(),
        );
        let field_tests = FieldTestWorkflow::new(store.clone(), config.field_tests.clone());
        let metrics = MetricsAggregator::new(store, directory.clone(), config.metrics.clone());

        Ok(Self {
            config,
            directory,
            validations,
            field_tests,
            metrics,
        })
    }

    /// Engine with nothing persisted beyond the process
    pub async fn in_memory(config: EngineConfig) -> Result<Self> {
        Self::new(config, Arc::new(MemoryStore::new())).await
    }

    /// Engine persisted to the configured SQLite database
    pub async fn open_sqlite(config: EngineConfig) -> Result<Self> {
        let path = config.storage.resolved_db_path();
        let store = SqliteStore::with_pool_size(&path, config.storage.pool_size).await?;
        info!("Engine using database {}", path.display());
        Self::new(config, Arc::new(store)).await
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn directory(&self) -> &Directory {
        &self.directory
    }

    // Validation workflow

    pub async fn submit_validation(
        &self,
        submission: ValidationSubmission,
    ) -> Result<ValidationRequest> {
        self.validations.submit(submission).await
    }

    pub async fn submit_review(
        &self,
        validation_id: ValidationId,
        review: ReviewSubmission,
    ) -> Result<ExpertReview> {
        self.validations.submit_review(validation_id, review).await
    }

    pub async fn get_validation(&self, validation_id: ValidationId) -> Result<ValidationRequest> {
        self.validations.get(validation_id).await
    }

    pub async fn get_validation_status(
        &self,
        validation_id: ValidationId,
    ) -> Result<ValidationStatusReport> {
        self.validations.status(validation_id).await
    }

    pub async fn generate_validation_report(
        &self,
        validation_id: ValidationId,
    ) -> Result<ValidationReport> {
        self.validations.report(validation_id).await
    }

    pub async fn reassign_unmet(&self, validation_id: ValidationId) -> Result<ValidationRequest> {
        self.validations.reassign_unmet(validation_id).await
    }

    pub async fn list_overdue_validations(&self) -> Result<Vec<ValidationStatusReport>> {
        self.validations.list_overdue().await
    }

    // Field tests

    pub async fn start_field_test(&self, plan: FieldTestPlan) -> Result<FieldTest> {
        self.field_tests.start(plan).await
    }

    pub async fn update_field_test_monitoring(
        &self,
        test_id: FieldTestId,
        update: MonitoringUpdate,
    ) -> Result<MonitoringAck> {
        self.field_tests.update_monitoring(test_id, update).await
    }

    pub async fn complete_field_test(
        &self,
        test_id: FieldTestId,
        report: CompletionReport,
    ) -> Result<FieldTest> {
        self.field_tests.complete(test_id, report).await
    }

    pub async fn get_field_test(&self, test_id: FieldTestId) -> Result<FieldTest> {
        self.field_tests.get(test_id).await
    }

    pub async fn list_field_tests_for_farm(&self, farm_id: &str) -> Result<Vec<FieldTest>> {
        self.field_tests.list_for_farm(farm_id).await
    }

    pub async fn list_active_field_tests(&self) -> Result<Vec<FieldTest>> {
        self.field_tests.list_active().await
    }

    // Metrics

    /// Rolling metrics; `None` uses the configured default window
    pub async fn get_validation_metrics(
        &self,
        window_days: Option<u32>,
    ) -> Result<ValidationMetrics> {
        self.metrics.compute(window_days).await
    }

    pub async fn get_expert_panel_status(&self) -> ExpertPanelStatus {
        self.metrics.panel_status().await
    }

    // Panel management

    pub async fn register_reviewer(
        &self,
        registration: ReviewerRegistration,
    ) -> Result<ReviewerProfile> {
        self.directory.register(registration.into_profile()).await
    }

    pub async fn retire_reviewer(&self, reviewer_id: ReviewerId) -> Result<ReviewerProfile> {
        self.directory.retire(reviewer_id).await
    }

    pub async fn get_reviewer(&self, reviewer_id: ReviewerId) -> Result<ReviewerProfile> {
        self.directory.get(reviewer_id).await
    }

    pub async fn list_reviewers(&self, filter: &ReviewerFilter) -> Vec<ReviewerProfile> {
        self.directory.list(filter).await
    }
}
