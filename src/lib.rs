//! Agrovalidate - Expert Validation & Field-Test Workflow Engine
//!
//! Routes AI-generated agronomic recommendations to a panel of human experts
//! and tracks the practices they approve through on-farm trials:
//! - Reviewer directory with capability and region matching
//! - Validation workflow with deterministic consensus
//! - Field-test lifecycle with typed outcome contracts
//! - Pull-based rolling metrics over the whole pipeline
//!
//! # Architecture
//!
//! - **Types**: identifiers, enums and the recommendation snapshot
//! - **Directory / Matcher**: reviewer panel and assignment
//! - **Workflows**: validation and field-test state machines
//! - **Storage**: in-memory and SQLite record stores
//! - **Engine**: facade over all of the above
//!
//! # Example
//!
//! ```ignore
//! use agrovalidate_core::{Engine, EngineConfig, ValidationSubmission};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let engine = Engine::open_sqlite(EngineConfig::load(None)?).await?;
//!     let request = engine.submit_validation(submission).await?;
//!     println!("{}", engine.get_validation_status(request.id).await?.progress_percent);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod directory;
pub mod engine;
pub mod error;
pub mod locks;
pub mod matcher;
pub mod metrics;
pub mod storage;
pub mod types;
pub mod validation;

// Re-export commonly used types
pub use config::EngineConfig;
pub use directory::{Availability, Directory, ReviewerFilter, ReviewerProfile, ReviewerRegistration};
pub use engine::Engine;
pub use error::{AgroError, Result};
pub use field_test::{
    metric_map, BaselineConditions, CompletionReport, FarmerFeedback, FieldTest, FieldTestPlan,
    FieldTestStatus, MonitoringAck, MonitoringUpdate, OutcomeMetrics,
};
pub use matcher::{Assignment, MatchOutcome, Matcher};
pub use metrics::{ExpertPanelStatus, ValidationMetrics};
pub use storage::{MemoryStore, RecordStore, SqliteStore};
pub use types::{
    Capability, FieldTestId, MetricMap, MetricValue, Priority, RecommendationSnapshot,
    RegionCode, ReviewId, ReviewerId, ValidationCriterion, ValidationId, ValidationStatus,
};
pub use validation::{
    ConsensusKind, ConsensusSummary, ExpertReview, ReviewSubmission, ValidationReport,
    ValidationRequest, ValidationStatusReport, ValidationSubmission,
};
