//! Storage layer for the workflow engine
//!
//! Four append-mostly record tables (reviewers, validations, reviews, field
//! tests) keyed by identity. The trait is the only suspension point of the
//! engine; business logic never blocks anywhere else.

pub mod memory;
pub mod sqlite;

use crate::directory::ReviewerProfile;
use crate::error::Result;
use crate::field_test::{FieldTest, FieldTestStatus};
use crate::types::{FieldTestId, ValidationId, ValidationStatus};
use crate::validation::{ExpertReview, ValidationRequest};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Storage backend trait defining all required operations
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert or replace a reviewer profile
    async fn put_reviewer(&self, profile: &ReviewerProfile) -> Result<()>;

    /// All reviewer profiles, retired ones included
    async fn list_reviewers(&self) -> Result<Vec<ReviewerProfile>>;

    /// Insert or replace a validation request
    async fn put_validation(&self, request: &ValidationRequest) -> Result<()>;

    /// Retrieve a validation request by ID
    async fn get_validation(&self, id: ValidationId) -> Result<Option<ValidationRequest>>;

    /// Validation requests matching a query, oldest first
    async fn list_validations(&self, query: &ValidationQuery) -> Result<Vec<ValidationRequest>>;

    /// Insert a review; reviews are immutable, so an existing ID is an error
    async fn insert_review(&self, review: &ExpertReview) -> Result<()>;

    /// Reviews for one validation, in submission order
    async fn list_reviews(&self, validation_id: ValidationId) -> Result<Vec<ExpertReview>>;

    /// Reviews submitted at or after `since`, in submission order
    async fn list_reviews_since(&self, since: DateTime<Utc>) -> Result<Vec<ExpertReview>>;

    /// Insert or replace a field test
    async fn put_field_test(&self, test: &FieldTest) -> Result<()>;

    /// Retrieve a field test by ID
    async fn get_field_test(&self, id: FieldTestId) -> Result<Option<FieldTest>>;

    /// Field tests matching a query, oldest first
    async fn list_field_tests(&self, query: &FieldTestQuery) -> Result<Vec<FieldTest>>;
}

/// Filter for validation scans
#[derive(Debug, Clone, Default)]
pub struct ValidationQuery {
    pub status: Option<ValidationStatus>,
    pub created_since: Option<DateTime<Utc>>,
    pub completed_since: Option<DateTime<Utc>>,
    pub deadline_before: Option<DateTime<Utc>>,
}

impl ValidationQuery {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn with_status(mut self, status: ValidationStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn created_since(mut self, since: DateTime<Utc>) -> Self {
        self.created_since = Some(since);
        self
    }

    pub fn completed_since(mut self, since: DateTime<Utc>) -> Self {
        self.completed_since = Some(since);
        self
    }

    pub fn deadline_before(mut self, before: DateTime<Utc>) -> Self {
        self.deadline_before = Some(before);
        self
    }

    pub fn matches(&self, request: &ValidationRequest) -> bool {
        if let Some(status) = self.status {
            if request.status != status {
                return false;
            }
        }
        if let Some(since) = self.created_since {
            if request.created_at < since {
                return false;
            }
        }
        if let Some(since) = self.completed_since {
            match request.completed_at {
                Some(done) if done >= since => {}
                _ => return false,
            }
        }
        if let Some(before) = self.deadline_before {
            if request.deadline >= before {
                return false;
            }
        }
        true
    }
}

/// Filter for field test scans
#[derive(Debug, Clone, Default)]
pub struct FieldTestQuery {
    pub status: Option<FieldTestStatus>,
    pub farm_id: Option<String>,
    pub completed_since: Option<DateTime<Utc>>,
}

impl FieldTestQuery {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn with_status(mut self, status: FieldTestStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn for_farm(mut self, farm_id: impl Into<String>) -> Self {
        self.farm_id = Some(farm_id.into());
        self
    }

    pub fn completed_since(mut self, since: DateTime<Utc>) -> Self {
        self.completed_since = Some(since);
        self
    }

    pub fn matches(&self, test: &FieldTest) -> bool {
        if let Some(status) = self.status {
            if test.status != status {
                return false;
            }
        }
        if let Some(farm_id) = &self.farm_id {
            if &test.farm_id != farm_id {
                return false;
            }
        }
        if let Some(since) = self.completed_since {
            match test.completed_at {
                Some(done) if done >= since => {}
                _ => return false,
            }
        }
        true
    }
}
