//! Metrics Aggregator
//!
//! Pull-based: every call rescans the store over the trailing window, so the
//! numbers can never drift from the records. A quiet window yields zeroed
//! metrics rather than an error.

use crate::config::MetricsPolicy;
use crate::directory::{Availability, Directory};
use crate::error::{AgroError, Result};
use crate::field_test::FieldTestStatus;
use crate::storage::{FieldTestQuery, RecordStore, ValidationQuery};
use crate::types::{Capability, RegionCode, ValidationStatus};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Workflow health over a trailing window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationMetrics {
    pub window_days: u32,
    pub window_start: DateTime<Utc>,
    pub computed_at: DateTime<Utc>,

    /// Validations created inside the window
    pub total_validations: usize,

    pub approved: usize,
    pub rejected: usize,
    pub requires_revision: usize,

    /// approved / (approved + rejected), 0 when neither occurred
    pub expert_approval_rate: f64,

    pub average_review_time_hours: f64,
    pub reviews_in_window: usize,
    pub completed_field_tests: usize,
    pub field_test_success_rate: f64,
    pub active_panel_size: usize,
    pub active_trials: usize,
}

/// Composition of the reviewer panel
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExpertPanelStatus {
    pub total: usize,
    pub active: usize,
    pub available: usize,
    pub assigned: usize,
    pub retired: usize,
    pub by_capability: BTreeMap<Capability, usize>,
    pub by_region: BTreeMap<RegionCode, usize>,

    /// Mean approval rate of active reviewers with at least one review
    pub average_approval_rate: f64,
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

/// Computes metrics from the record store and directory
pub struct MetricsAggregator {
    store: Arc<dyn RecordStore>,
    directory: Directory,
    policy: MetricsPolicy,
}

impl MetricsAggregator {
    pub fn new(store: Arc<dyn RecordStore>, directory: Directory, policy: MetricsPolicy) -> Self {
        Self {
            store,
            directory,
            policy,
        }
    }

    /// Metrics over the trailing window; `None` uses the configured default
    pub async fn compute(&self, window_days: Option<u32>) -> Result<ValidationMetrics> {
        let days = window_days.unwrap_or(self.policy.default_window_days);
        self.compute_at(Utc::now(), days).await
    }

    /// Metrics over the `window_days` ending at `now`
    pub async fn compute_at(
        &self,
        now: DateTime<Utc>,
        window_days: u32,
    ) -> Result<ValidationMetrics> {
        if window_days == 0 {
            return Err(AgroError::invalid_input(
                "window_days",
                "must be at least 1",
            ));
        }
        let since = now
            .checked_sub_signed(Duration::days(i64::from(window_days)))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);

        let created = self
            .store
            .list_validations(&ValidationQuery::all().created_since(since))
            .await?;
        let completed = self
            .store
            .list_validations(&ValidationQuery::all().completed_since(since))
            .await?;

        let count = |status: ValidationStatus| {
            completed.iter().filter(|r| r.status == status).count()
        };
        let approved = count(ValidationStatus::Approved);
        let rejected = count(ValidationStatus::Rejected);
        let requires_revision = count(ValidationStatus::RequiresRevision);

        let reviews = self.store.list_reviews_since(since).await?;
        let average_review_time_hours = if reviews.is_empty() {
            0.0
        } else {
            reviews.iter().map(|r| r.review_time_hours).sum::<f64>() / reviews.len() as f64
        };

        let finished = self
            .store
            .list_field_tests(
                &FieldTestQuery::all()
                    .with_status(FieldTestStatus::Completed)
                    .completed_since(since),
            )
            .await?;
        let successes = finished
            .iter()
            .filter(|t| {
                t.effectiveness()
                    .is_some_and(|score| score > self.policy.success_threshold)
            })
            .count();

        let active_trials = self
            .store
            .list_field_tests(&FieldTestQuery::all().with_status(FieldTestStatus::Active))
            .await?
            .len();

        let active_panel_size = self
            .directory
            .snapshot()
            .await
            .iter()
            .filter(|p| p.active)
            .count();

        debug!(
            "Metrics over {} days: {} created, {} completed, {} reviews, {} finished trials",
            window_days,
            created.len(),
            completed.len(),
            reviews.len(),
            finished.len()
        );

        Ok(ValidationMetrics {
            window_days,
            window_start: since,
            computed_at: now,
            total_validations: created.len(),
            approved,
            rejected,
            requires_revision,
            expert_approval_rate: ratio(approved, approved + rejected),
            average_review_time_hours,
            reviews_in_window: reviews.len(),
            completed_field_tests: finished.len(),
            field_test_success_rate: ratio(successes, finished.len()),
            active_panel_size,
            active_trials,
        })
    }

    /// Panel composition from the directory
    pub async fn panel_status(&self) -> ExpertPanelStatus {
        let profiles = self.directory.snapshot().await;
        let mut status = ExpertPanelStatus {
            total: profiles.len(),
            ..Default::default()
        };

        let mut rate_sum = 0.0;
        let mut rated = 0usize;
        for profile in &profiles {
            if !profile.active {
                status.retired += 1;
                continue;
            }
            status.active += 1;
            match profile.availability {
                Availability::Available => status.available += 1,
                Availability::Assigned => status.assigned += 1,
            }
            for capability in &profile.capabilities {
                *status.by_capability.entry(*capability).or_default() += 1;
            }
            for region in &profile.regions {
                *status.by_region.entry(region.clone()).or_default() += 1;
            }
            if profile.review_count > 0 {
                rate_sum += profile.approval_rate;
                rated += 1;
            }
        }
        status.average_approval_rate = if rated == 0 { 0.0 } else { rate_sum / rated as f64 };

        status
    }
}
