//! Validation Workflow
//!
//! Owns the life of a validation request:
//! - **pending**: created, no reviewer assigned yet
//! - **in_review**: at least one reviewer assigned through the matcher
//! - **approved / rejected / requires_revision**: every assigned reviewer has
//!   submitted; the disposition is a pure function of their approval votes
//!
//! Deadlines are informational. Progress and the overdue flag are computed
//! lazily whenever status is queried; nothing transitions on a timer.

use crate::config::{DeadlinePolicy, ReviewPolicy};
use crate::directory::Directory;
use crate::error::{AgroError, Result};
use crate::locks::KeyedLocks;
use crate::matcher::{Assignment, Matcher};
use crate::storage::{RecordStore, ValidationQuery};
use crate::types::{
    Capability, Priority, RecommendationSnapshot, ReviewId, ReviewerId, ValidationCriterion,
    ValidationId, ValidationStatus,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A recommendation under expert validation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationRequest {
    pub id: ValidationId,
    pub recommendation_id: String,

    /// Immutable copy of the data the recommendation was produced from
    pub snapshot: RecommendationSnapshot,

    pub criteria: Vec<ValidationCriterion>,
    pub priority: Priority,
    pub required_capabilities: Vec<Capability>,
    pub assignments: Vec<Assignment>,

    /// Capability types the matcher could not fill
    pub unmet_capabilities: Vec<Capability>,

    pub status: ValidationStatus,
    pub created_at: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ValidationRequest {
    pub fn assignment_for(&self, reviewer_id: ReviewerId) -> Option<&Assignment> {
        self.assignments
            .iter()
            .find(|a| a.reviewer_id == reviewer_id)
    }

    /// Share of assigned reviewers that have reported, capped at 100
    pub fn progress_percent(&self, reviews_received: usize) -> f64 {
        if self.assignments.is_empty() {
            return 0.0;
        }
        let pct = reviews_received as f64 / self.assignments.len() as f64 * 100.0;
        pct.min(100.0)
    }

    /// Deadline passed while reviews are still outstanding
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        !self.status.is_terminal() && now > self.deadline
    }

    fn add_assignments(&mut self, assignments: Vec<Assignment>) {
        if assignments.is_empty() {
            return;
        }
        self.assignments.extend(assignments);
        if self.status == ValidationStatus::Pending {
            self.status = ValidationStatus::InReview;
        }
    }
}

/// An expert's immutable verdict on a validation request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpertReview {
    pub id: ReviewId,
    pub validation_id: ValidationId,
    pub reviewer_id: ReviewerId,

    /// Capability slot the reviewer was assigned for
    pub capability: Capability,

    pub criterion_scores: BTreeMap<ValidationCriterion, f64>,
    pub overall_score: f64,
    pub comments: String,
    pub approved: bool,
    pub review_time_hours: f64,
    pub submitted_at: DateTime<Utc>,
}

/// Input for creating a validation request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationSubmission {
    pub snapshot: RecommendationSnapshot,
    pub criteria: Vec<ValidationCriterion>,
    #[serde(default)]
    pub priority: Priority,

    /// Explicit capability types; derived from the snapshot when absent
    #[serde(default)]
    pub required_capabilities: Option<Vec<Capability>>,
}

/// Input for submitting a review
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewSubmission {
    pub reviewer_id: ReviewerId,
    pub criterion_scores: BTreeMap<ValidationCriterion, f64>,

    /// Overall score; the mean of the criterion scores when absent
    #[serde(default)]
    pub overall_score: Option<f64>,

    pub comments: String,
    pub approved: bool,
    pub review_time_hours: f64,
}

impl ReviewSubmission {
    /// Check the submission against the request's criteria and the review policy
    pub fn validate(&self, request: &ValidationRequest, policy: &ReviewPolicy) -> Result<()> {
        for criterion in &request.criteria {
            if !self.criterion_scores.contains_key(criterion) {
                return Err(AgroError::invalid_input(
                    format!("criterion_scores.{}", criterion),
                    "missing score",
                ));
            }
        }

        for (criterion, score) in &self.criterion_scores {
            if !request.criteria.contains(criterion) {
                return Err(AgroError::invalid_input(
                    format!("criterion_scores.{}", criterion),
                    "criterion not requested by this validation",
                ));
            }
            if !(0.0..=1.0).contains(score) {
                return Err(AgroError::invalid_input(
                    format!("criterion_scores.{}", criterion),
                    format!("score {} outside [0, 1]", score),
                ));
            }
        }

        if let Some(overall) = self.overall_score {
            if !(0.0..=1.0).contains(&overall) {
                return Err(AgroError::invalid_input(
                    "overall_score",
                    format!("score {} outside [0, 1]", overall),
                ));
            }
        }

        let comment_len = self.comments.trim().chars().count();
        if comment_len < policy.min_comment_length {
            return Err(AgroError::invalid_input(
                "comments",
                format!(
                    "shorter than minimum of {} characters",
                    policy.min_comment_length
                ),
            ));
        }

        if !self.review_time_hours.is_finite() || self.review_time_hours <= 0.0 {
            return Err(AgroError::invalid_input(
                "review_time_hours",
                "must be greater than zero",
            ));
        }
        if self.review_time_hours > policy.max_review_hours {
            return Err(AgroError::invalid_input(
                "review_time_hours",
                format!("exceeds maximum of {} hours", policy.max_review_hours),
            ));
        }

        Ok(())
    }

    fn resolved_overall_score(&self) -> f64 {
        self.overall_score.unwrap_or_else(|| {
            if self.criterion_scores.is_empty() {
                0.0
            } else {
                self.criterion_scores.values().sum::<f64>() / self.criterion_scores.len() as f64
            }
        })
    }
}

/// Caller-visible progress of a validation request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationStatusReport {
    pub validation_id: ValidationId,
    pub status: ValidationStatus,
    pub priority: Priority,
    pub progress_percent: f64,
    pub reviews_received: usize,
    pub reviewers_assigned: usize,
    pub unmet_capabilities: Vec<Capability>,

    /// Fewer reviewers assigned than capability types required
    pub partial_match: bool,

    pub deadline: DateTime<Utc>,
    pub overdue: bool,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ValidationStatusReport {
    fn build(request: &ValidationRequest, reviews_received: usize, now: DateTime<Utc>) -> Self {
        Self {
            validation_id: request.id,
            status: request.status,
            priority: request.priority,
            progress_percent: request.progress_percent(reviews_received),
            reviews_received,
            reviewers_assigned: request.assignments.len(),
            unmet_capabilities: request.unmet_capabilities.clone(),
            partial_match: !request.unmet_capabilities.is_empty(),
            deadline: request.deadline,
            overdue: request.is_overdue(now),
            completed_at: request.completed_at,
        }
    }
}

/// How far the reviewers agree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsensusKind {
    /// No review submitted yet
    Pending,
    UnanimousApproval,
    UnanimousRejection,
    Split,
}

/// Aggregate view over the submitted reviews
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusSummary {
    pub kind: ConsensusKind,
    pub approvals: usize,
    pub rejections: usize,
    pub outstanding_reviews: usize,
    pub approval_ratio: f64,
    pub mean_overall_score: f64,
    pub criterion_means: BTreeMap<ValidationCriterion, f64>,
    pub total_review_hours: f64,
}

impl ConsensusSummary {
    pub fn from_reviews(reviews: &[ExpertReview], assigned: usize) -> Self {
        let approvals = reviews.iter().filter(|r| r.approved).count();
        let rejections = reviews.len() - approvals;

        let kind = match (approvals, rejections) {
            (0, 0) => ConsensusKind::Pending,
            (_, 0) => ConsensusKind::UnanimousApproval,
            (0, _) => ConsensusKind::UnanimousRejection,
            _ => ConsensusKind::Split,
        };

        let mut sums: BTreeMap<ValidationCriterion, (f64, usize)> = BTreeMap::new();
        for review in reviews {
            for (criterion, score) in &review.criterion_scores {
                let entry = sums.entry(*criterion).or_insert((0.0, 0));
                entry.0 += score;
                entry.1 += 1;
            }
        }

        let n = reviews.len() as f64;
        Self {
            kind,
            approvals,
            rejections,
            outstanding_reviews: assigned.saturating_sub(reviews.len()),
            approval_ratio: if reviews.is_empty() { 0.0 } else { approvals as f64 / n },
            mean_overall_score: if reviews.is_empty() {
                0.0
            } else {
                reviews.iter().map(|r| r.overall_score).sum::<f64>() / n
            },
            criterion_means: sums
                .into_iter()
                .map(|(c, (sum, count))| (c, sum / count as f64))
                .collect(),
            total_review_hours: reviews.iter().map(|r| r.review_time_hours).sum(),
        }
    }
}

/// Full review set plus consensus summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub request: ValidationRequest,
    pub reviews: Vec<ExpertReview>,
    pub consensus: ConsensusSummary,
    pub overdue: bool,
    pub generated_at: DateTime<Utc>,
}

/// Validation workflow over a shared directory and record store
pub struct ValidationWorkflow {
    store: Arc<dyn RecordStore>,
    directory: Directory,
    matcher: Matcher,
    review_policy: ReviewPolicy,
    deadlines: DeadlinePolicy,
    locks: KeyedLocks<ValidationId>,
}

impl ValidationWorkflow {
    pub fn new(
        store: Arc<dyn RecordStore>,
        directory: Directory,
        review_policy: ReviewPolicy,
        deadlines: DeadlinePolicy,
    ) -> Self {
        let matcher = Matcher::new(directory.clone());
        Self {
            store,
            directory,
            matcher,
            review_policy,
            deadlines,
            locks: KeyedLocks::new(),
        }
    }

    /// Create a validation request and assign reviewers
    pub async fn submit(&self, submission: ValidationSubmission) -> Result<ValidationRequest> {
        submission.snapshot.validate()?;

        let mut criteria: Vec<ValidationCriterion> = Vec::new();
        for criterion in submission.criteria {
            if !criteria.contains(&criterion) {
                criteria.push(criterion);
            }
        }
        if criteria.is_empty() {
            return Err(AgroError::invalid_input(
                "criteria",
                "at least one validation criterion is required",
            ));
        }

        let required = match submission.required_capabilities {
            Some(explicit) if explicit.is_empty() => {
                return Err(AgroError::invalid_input(
                    "required_capabilities",
                    "must not be empty when given",
                ));
            }
            Some(explicit) => {
                let mut unique = Vec::new();
                for capability in explicit {
                    if !unique.contains(&capability) {
                        unique.push(capability);
                    }
                }
                unique
            }
            None => submission.snapshot.required_capabilities(),
        };

        let created_at = Utc::now();
        let deadline = created_at
            .checked_add_signed(self.deadlines.offset(submission.priority)?)
            .ok_or_else(|| {
                AgroError::Config(format!(
                    "deadline for {} priority is out of range",
                    submission.priority
                ))
            })?;
        let mut request = ValidationRequest {
            id: ValidationId::new(),
            recommendation_id: submission.snapshot.recommendation_id.clone(),
            snapshot: submission.snapshot,
            criteria,
            priority: submission.priority,
            required_capabilities: required.clone(),
            assignments: Vec::new(),
            unmet_capabilities: required.clone(),
            status: ValidationStatus::Pending,
            created_at,
            deadline,
            completed_at: None,
        };

        let _guard = self.locks.lock(&request.id).await;
        self.store.put_validation(&request).await?;

        let region = request.snapshot.location.region.clone();
        let outcome = self.matcher.assign(&required, &region).await?;
        request.unmet_capabilities = outcome.unmet.clone();
        request.add_assignments(outcome.assignments.clone());
        if let Err(e) = self.store.put_validation(&request).await {
            self.matcher.release(&outcome.assignments).await;
            return Err(e);
        }

        if !request.unmet_capabilities.is_empty() {
            warn!(
                "Validation {} partially matched: {} of {} capability types unfilled ({:?})",
                request.id,
                request.unmet_capabilities.len(),
                required.len(),
                request.unmet_capabilities
            );
        }
        info!(
            "Created validation {} for recommendation {} ({} priority, {} reviewer(s), status {})",
            request.id,
            request.recommendation_id,
            request.priority,
            request.assignments.len(),
            request.status
        );

        Ok(request)
    }

    /// Record one reviewer's verdict and re-evaluate the terminal condition
    pub async fn submit_review(
        &self,
        validation_id: ValidationId,
        submission: ReviewSubmission,
    ) -> Result<ExpertReview> {
        let _guard = self.locks.lock(&validation_id).await;

        let mut request = self.load(validation_id).await?;
        if request.status.is_terminal() {
            return Err(AgroError::InvalidState(format!(
                "validation {} is already {}",
                validation_id, request.status
            )));
        }

        let capability = request
            .assignment_for(submission.reviewer_id)
            .map(|a| a.capability)
            .ok_or_else(|| AgroError::NotAssigned {
                reviewer: submission.reviewer_id.to_string(),
                validation: validation_id.to_string(),
            })?;

        let mut reviews = self.store.list_reviews(validation_id).await?;
        if reviews.iter().any(|r| r.reviewer_id == submission.reviewer_id) {
            return Err(AgroError::InvalidState(format!(
                "reviewer {} already reviewed validation {}",
                submission.reviewer_id, validation_id
            )));
        }

        if let Err(e) = submission.validate(&request, &self.review_policy) {
            warn!("Rejected review for validation {}: {}", validation_id, e);
            return Err(e);
        }

        let review = ExpertReview {
            id: ReviewId::new(),
            validation_id,
            reviewer_id: submission.reviewer_id,
            capability,
            overall_score: submission.resolved_overall_score(),
            criterion_scores: submission.criterion_scores,
            comments: submission.comments.trim().to_string(),
            approved: submission.approved,
            review_time_hours: submission.review_time_hours,
            submitted_at: Utc::now(),
        };
        self.store.insert_review(&review).await?;
        reviews.push(review.clone());

        // The reviewer is freed before the terminal status is written, and
        // regardless of whether that write succeeds
        let released = self
            .directory
            .complete_review(review.reviewer_id, review.approved, review.review_time_hours)
            .await;
        let settled = self.settle(&mut request, &reviews, review.submitted_at).await;
        released?;
        settled?;

        Ok(review)
    }

    /// Close the request once every assigned reviewer has answered
    async fn settle(
        &self,
        request: &mut ValidationRequest,
        reviews: &[ExpertReview],
        last_submitted_at: DateTime<Utc>,
    ) -> Result<()> {
        if reviews.len() < request.assignments.len() {
            debug!(
                "Validation {} has {}/{} reviews",
                request.id,
                reviews.len(),
                request.assignments.len()
            );
            return Ok(());
        }

        let approvals: Vec<bool> = reviews.iter().map(|r| r.approved).collect();
        if let Some(terminal) = ValidationStatus::from_approvals(&approvals) {
            request.status = terminal;
            request.completed_at = Some(last_submitted_at);
            self.store.put_validation(request).await?;
            info!(
                "Validation {} completed as {} after {} review(s)",
                request.id,
                terminal,
                reviews.len()
            );
        }
        Ok(())
    }

    /// Fetch a validation request
    pub async fn get(&self, validation_id: ValidationId) -> Result<ValidationRequest> {
        self.load(validation_id).await
    }

    /// Status, progress and overdue flag
    pub async fn status(&self, validation_id: ValidationId) -> Result<ValidationStatusReport> {
        let request = self.load(validation_id).await?;
        let reviews = self.store.list_reviews(validation_id).await?;
        Ok(ValidationStatusReport::build(
            &request,
            reviews.len(),
            Utc::now(),
        ))
    }

    /// Full review set and consensus summary
    pub async fn report(&self, validation_id: ValidationId) -> Result<ValidationReport> {
        let request = self.load(validation_id).await?;
        let reviews = self.store.list_reviews(validation_id).await?;
        let consensus = ConsensusSummary::from_reviews(&reviews, request.assignments.len());
        let now = Utc::now();

        Ok(ValidationReport {
            overdue: request.is_overdue(now),
            request,
            reviews,
            consensus,
            generated_at: now,
        })
    }

    /// Retry matching for capability types that had no candidate
    pub async fn reassign_unmet(&self, validation_id: ValidationId) -> Result<ValidationRequest> {
        let _guard = self.locks.lock(&validation_id).await;

        let mut request = self.load(validation_id).await?;
        if request.status.is_terminal() {
            return Err(AgroError::InvalidState(format!(
                "validation {} is already {}",
                validation_id, request.status
            )));
        }
        if request.unmet_capabilities.is_empty() {
            debug!("Validation {} has no unmet capability types", validation_id);
            return Ok(request);
        }

        let region = request.snapshot.location.region.clone();
        let outcome = self
            .matcher
            .assign(&request.unmet_capabilities, &region)
            .await?;

        let filled = outcome.assignments.len();
        request.unmet_capabilities = outcome.unmet.clone();
        request.add_assignments(outcome.assignments.clone());
        if let Err(e) = self.store.put_validation(&request).await {
            self.matcher.release(&outcome.assignments).await;
            return Err(e);
        }

        info!(
            "Reassignment for validation {} filled {} slot(s), {} still unmet",
            validation_id,
            filled,
            request.unmet_capabilities.len()
        );
        Ok(request)
    }

    /// Non-terminal requests past their deadline, oldest first
    pub async fn list_overdue(&self) -> Result<Vec<ValidationStatusReport>> {
        let now = Utc::now();
        let candidates = self
            .store
            .list_validations(&ValidationQuery::all().deadline_before(now))
            .await?;

        let mut overdue = Vec::new();
        for request in candidates.iter().filter(|r| r.is_overdue(now)) {
            let reviews = self.store.list_reviews(request.id).await?;
            overdue.push(ValidationStatusReport::build(request, reviews.len(), now));
        }
        Ok(overdue)
    }

    async fn load(&self, validation_id: ValidationId) -> Result<ValidationRequest> {
        self.store
            .get_validation(validation_id)
            .await?
            .ok_or_else(|| AgroError::not_found("validation", validation_id))
    }
}
