//! Reviewer matching
//!
//! For each required capability type the matcher picks the eligible reviewer
//! with the highest historical approval rate, breaking ties by the lowest
//! review count so equally qualified reviewers share the load. Booking
//! re-checks eligibility under the reviewer's own lock, so two concurrent
//! matches can never book the same reviewer; the pass that loses the race
//! moves on to its next-ranked candidate.

use crate::directory::{Availability, Directory, ReviewerFilter, ReviewerProfile};
use crate::error::{AgroError, Result};
use crate::types::{Capability, RegionCode, ReviewerId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::{debug, warn};

/// One reviewer booked for one capability slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub reviewer_id: ReviewerId,
    pub capability: Capability,
    pub assigned_at: DateTime<Utc>,
}

/// Result of a matching pass
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchOutcome {
    pub assignments: Vec<Assignment>,

    /// Capability types no eligible reviewer could fill
    pub unmet: Vec<Capability>,
}

impl MatchOutcome {
    pub fn is_complete(&self) -> bool {
        self.unmet.is_empty()
    }

    pub fn is_partial(&self) -> bool {
        !self.assignments.is_empty() && !self.unmet.is_empty()
    }

    pub fn reviewer_ids(&self) -> Vec<ReviewerId> {
        self.assignments.iter().map(|a| a.reviewer_id).collect()
    }

    /// Treat any unmet capability as an error
    pub fn require_complete(self) -> Result<Self> {
        if self.unmet.is_empty() {
            Ok(self)
        } else {
            Err(AgroError::NoCandidate {
                capabilities: self.unmet,
            })
        }
    }
}

/// Ranking of two eligible candidates; `Greater` means `a` is preferred
fn rank(a: &ReviewerProfile, b: &ReviewerProfile) -> Ordering {
    a.approval_rate
        .total_cmp(&b.approval_rate)
        .then_with(|| b.review_count.cmp(&a.review_count))
        .then_with(|| b.id.cmp(&a.id))
}

/// Pick the best eligible candidate for one capability slot
pub fn select_candidate<'a, I>(
    profiles: I,
    capability: Capability,
    region: &RegionCode,
) -> Option<&'a ReviewerProfile>
where
    I: IntoIterator<Item = &'a ReviewerProfile>,
{
    profiles
        .into_iter()
        .filter(|p| p.is_eligible(capability, region))
        .max_by(|a, b| rank(a, b))
}

/// Every eligible candidate for one slot, best first
pub fn rank_candidates<'a, I>(
    profiles: I,
    capability: Capability,
    region: &RegionCode,
) -> Vec<&'a ReviewerProfile>
where
    I: IntoIterator<Item = &'a ReviewerProfile>,
{
    let mut ranked: Vec<&ReviewerProfile> = profiles
        .into_iter()
        .filter(|p| p.is_eligible(capability, region))
        .collect();
    ranked.sort_by(|a, b| rank(b, a));
    ranked
}

/// Assigns reviewers from a shared directory
#[derive(Clone)]
pub struct Matcher {
    directory: Directory,
}

impl Matcher {
    pub fn new(directory: Directory) -> Self {
        Self { directory }
    }

    /// Fill each required capability slot independently
    ///
    /// Duplicate capability types are collapsed. A slot without candidates is
    /// reported in [`MatchOutcome::unmet`] and does not stop the pass. If the
    /// store fails mid-pass, reviewers booked earlier in the same pass are
    /// released before the error is returned.
    pub async fn assign(
        &self,
        required: &[Capability],
        region: &RegionCode,
    ) -> Result<MatchOutcome> {
        let mut slots: Vec<Capability> = Vec::with_capacity(required.len());
        for capability in required {
            if !slots.contains(capability) {
                slots.push(*capability);
            }
        }

        let mut outcome = MatchOutcome::default();
        for capability in slots {
            match self.book_slot(capability, region).await {
                Ok(Some(assignment)) => outcome.assignments.push(assignment),
                Ok(None) => {
                    debug!("No eligible reviewer for {} in {}", capability, region);
                    outcome.unmet.push(capability);
                }
                Err(e) => {
                    self.release(&outcome.assignments).await;
                    return Err(e);
                }
            }
        }

        Ok(outcome)
    }

    /// Undo bookings whose request could not be recorded; failures are logged
    pub async fn release(&self, assignments: &[Assignment]) {
        for assignment in assignments {
            if let Err(e) = self.directory.mark_available(assignment.reviewer_id).await {
                warn!(
                    "Failed to release reviewer {} after aborted match: {}",
                    assignment.reviewer_id, e
                );
            }
        }
    }

    async fn book_slot(
        &self,
        capability: Capability,
        region: &RegionCode,
    ) -> Result<Option<Assignment>> {
        let panel = self
            .directory
            .list(&ReviewerFilter {
                capability: Some(capability),
                region: Some(region.clone()),
                availability: Some(Availability::Available),
                include_retired: false,
            })
            .await;

        for candidate in rank_candidates(&panel, capability, region) {
            let now = Utc::now();
            let Some(booked) = self
                .directory
                .try_book(candidate.id, capability, region, now)
                .await?
            else {
                continue;
            };

            debug!(
                "Assigned reviewer {} for {} (approval rate {:.3}, {} reviews)",
                booked.id, capability, booked.approval_rate, booked.review_count
            );
            return Ok(Some(Assignment {
                reviewer_id: booked.id,
                capability,
                assigned_at: now,
            }));
        }
        Ok(None)
    }
}
