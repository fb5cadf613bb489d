//! In-memory storage backend
//!
//! Keeps every table in a `tokio::sync::RwLock`-guarded map. Used by tests and
//! by ephemeral engine instances; nothing survives a restart.

use crate::directory::ReviewerProfile;
use crate::error::{AgroError, Result};
use crate::field_test::FieldTest;
use crate::storage::{FieldTestQuery, RecordStore, ValidationQuery};
use crate::types::{FieldTestId, ReviewerId, ValidationId};
use crate::validation::{ExpertReview, ValidationRequest};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// In-memory record store
#[derive(Debug, Default)]
pub struct MemoryStore {
    reviewers: RwLock<HashMap<ReviewerId, ReviewerProfile>>,
    validations: RwLock<HashMap<ValidationId, ValidationRequest>>,
    reviews: RwLock<Vec<ExpertReview>>,
    field_tests: RwLock<HashMap<FieldTestId, FieldTest>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn put_reviewer(&self, profile: &ReviewerProfile) -> Result<()> {
        self.reviewers
            .write()
            .await
            .insert(profile.id, profile.clone());
        Ok(())
    }

    async fn list_reviewers(&self) -> Result<Vec<ReviewerProfile>> {
        let reviewers = self.reviewers.read().await;
        let mut profiles: Vec<ReviewerProfile> = reviewers.values().cloned().collect();
        profiles.sort_by(|a, b| a.onboarded_at.cmp(&b.onboarded_at).then(a.id.cmp(&b.id)));
        Ok(profiles)
    }

    async fn put_validation(&self, request: &ValidationRequest) -> Result<()> {
        self.validations
            .write()
            .await
            .insert(request.id, request.clone());
        Ok(())
    }

    async fn get_validation(&self, id: ValidationId) -> Result<Option<ValidationRequest>> {
        Ok(self.validations.read().await.get(&id).cloned())
    }

    async fn list_validations(&self, query: &ValidationQuery) -> Result<Vec<ValidationRequest>> {
        let validations = self.validations.read().await;
        let mut matched: Vec<ValidationRequest> = validations
            .values()
            .filter(|request| query.matches(request))
            .cloned()
            .collect();
        matched.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(matched)
    }

    async fn insert_review(&self, review: &ExpertReview) -> Result<()> {
        let mut reviews = self.reviews.write().await;
        if reviews.iter().any(|r| r.id == review.id) {
            return Err(AgroError::AlreadyExists(format!("review {}", review.id)));
        }
        reviews.push(review.clone());
        Ok(())
    }

    async fn list_reviews(&self, validation_id: ValidationId) -> Result<Vec<ExpertReview>> {
        let reviews = self.reviews.read().await;
        Ok(reviews
            .iter()
            .filter(|r| r.validation_id == validation_id)
            .cloned()
            .collect())
    }

    async fn list_reviews_since(&self, since: DateTime<Utc>) -> Result<Vec<ExpertReview>> {
        let reviews = self.reviews.read().await;
        Ok(reviews
            .iter()
            .filter(|r| r.submitted_at >= since)
            .cloned()
            .collect())
    }

    async fn put_field_test(&self, test: &FieldTest) -> Result<()> {
        self.field_tests.write().await.insert(test.id, test.clone());
        Ok(())
    }

    async fn get_field_test(&self, id: FieldTestId) -> Result<Option<FieldTest>> {
        Ok(self.field_tests.read().await.get(&id).cloned())
    }

    async fn list_field_tests(&self, query: &FieldTestQuery) -> Result<Vec<FieldTest>> {
        let tests = self.field_tests.read().await;
        let mut matched: Vec<FieldTest> = tests
            .values()
            .filter(|test| query.matches(test))
            .cloned()
            .collect();
        matched.sort_by(|a, b| {
            a.implemented_at
                .cmp(&b.implemented_at)
                .then(a.id.cmp(&b.id))
        });
        Ok(matched)
    }
}

