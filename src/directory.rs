//! Reviewer Directory
//!
//! Holds the expert panel: capabilities, region coverage, current load and
//! historical performance of every reviewer. One `Directory` instance is
//! shared (by cloning the handle) between the matcher, the workflows and the
//! metrics aggregator. Every mutation is written through to the record store
//! before it becomes visible in memory.

use crate::error::{AgroError, Result};
use crate::locks::KeyedLocks;
use crate::storage::RecordStore;
use crate::types::{Capability, RegionCode, ReviewerId};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info};

/// Whether a reviewer can take a new assignment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Availability {
    Available,
    Assigned,
}

/// Reviewer profile with rolling performance statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewerProfile {
    pub id: ReviewerId,
    pub name: String,

    /// Free-text credentials (degrees, certifications, affiliations)
    pub credentials: String,

    pub capabilities: BTreeSet<Capability>,
    pub regions: BTreeSet<RegionCode>,
    pub years_experience: u32,
    pub availability: Availability,

    /// Cleared on retirement; retired reviewers are never matched
    pub active: bool,

    /// Open assignments that have not been reviewed yet
    pub pending_reviews: u32,

    /// Completed reviews folded into the rolling averages
    pub review_count: u64,

    /// Rolling share of reviews that approved (0.0 - 1.0)
    pub approval_rate: f64,

    /// Rolling mean of declared review time
    pub mean_review_hours: f64,

    pub onboarded_at: DateTime<Utc>,
    pub last_assigned_at: Option<DateTime<Utc>>,
}

impl ReviewerProfile {
    /// Create a profile for a newly onboarded reviewer
    pub fn new(
        name: impl Into<String>,
        credentials: impl Into<String>,
        capabilities: impl IntoIterator<Item = Capability>,
        regions: impl IntoIterator<Item = RegionCode>,
        years_experience: u32,
    ) -> Self {
        Self {
            id: ReviewerId::new(),
            name: name.into(),
            credentials: credentials.into(),
            capabilities: capabilities.into_iter().collect(),
            regions: regions.into_iter().collect(),
            years_experience,
            availability: Availability::Available,
            active: true,
            pending_reviews: 0,
            review_count: 0,
            approval_rate: 0.0,
            mean_review_hours: 0.0,
            onboarded_at: Utc::now(),
            last_assigned_at: None,
        }
    }

    /// Seed rolling statistics carried over from a previous system
    pub fn with_history(mut self, approval_rate: f64, review_count: u64, mean_hours: f64) -> Self {
        self.approval_rate = approval_rate;
        self.review_count = review_count;
        self.mean_review_hours = mean_hours;
        self
    }

    /// Check the profile is acceptable for onboarding
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(AgroError::invalid_input("name", "must not be empty"));
        }
        if self.capabilities.is_empty() {
            return Err(AgroError::invalid_input(
                "capabilities",
                "at least one capability is required",
            ));
        }
        if self.regions.is_empty() || self.regions.iter().any(|r| r.is_empty()) {
            return Err(AgroError::invalid_input(
                "regions",
                "at least one non-empty region code is required",
            ));
        }
        if !(0.0..=1.0).contains(&self.approval_rate) {
            return Err(AgroError::invalid_input(
                "approval_rate",
                "must be within [0, 1]",
            ));
        }
        if !self.mean_review_hours.is_finite() || self.mean_review_hours < 0.0 {
            return Err(AgroError::invalid_input(
                "mean_review_hours",
                "must be a non-negative number",
            ));
        }
        Ok(())
    }

    /// Whether this reviewer may be matched for `capability` in `region`
    pub fn is_eligible(&self, capability: Capability, region: &RegionCode) -> bool {
        self.active
            && self.availability == Availability::Available
            && self.capabilities.contains(&capability)
            && self.regions.contains(region)
    }

    /// Take an assignment
    pub fn assign(&mut self, now: DateTime<Utc>) -> Result<()> {
        if !self.active {
            return Err(AgroError::InvalidState(format!(
                "reviewer {} is retired",
                self.id
            )));
        }
        if self.availability == Availability::Assigned {
            return Err(AgroError::InvalidState(format!(
                "reviewer {} is already assigned",
                self.id
            )));
        }
        self.availability = Availability::Assigned;
        self.pending_reviews += 1;
        self.last_assigned_at = Some(now);
        Ok(())
    }

    /// Release the current assignment
    pub fn release(&mut self) {
        self.pending_reviews = self.pending_reviews.saturating_sub(1);
        self.availability = Availability::Available;
    }

    /// Fold one review outcome into the rolling averages in O(1)
    pub fn apply_outcome(&mut self, approved: bool, duration_hours: f64) {
        let n = (self.review_count + 1) as f64;
        let value = if approved { 1.0 } else { 0.0 };
        self.approval_rate += (value - self.approval_rate) / n;
        self.mean_review_hours += (duration_hours - self.mean_review_hours) / n;
        self.review_count += 1;
    }
}

/// Onboarding input for a reviewer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewerRegistration {
    pub name: String,
    #[serde(default)]
    pub credentials: String,
    pub capabilities: Vec<Capability>,
    pub regions: Vec<RegionCode>,
    #[serde(default)]
    pub years_experience: u32,
    #[serde(default)]
    pub approval_rate: Option<f64>,
    #[serde(default)]
    pub review_count: Option<u64>,
    #[serde(default)]
    pub mean_review_hours: Option<f64>,
}

impl ReviewerRegistration {
    pub fn into_profile(self) -> ReviewerProfile {
        let profile = ReviewerProfile::new(
            self.name,
            self.credentials,
            self.capabilities,
            self.regions,
            self.years_experience,
        );
        profile.with_history(
            self.approval_rate.unwrap_or(0.0),
            self.review_count.unwrap_or(0),
            self.mean_review_hours.unwrap_or(0.0),
        )
    }
}

/// Filter for directory listings
#[derive(Debug, Clone, Default)]
pub struct ReviewerFilter {
    pub capability: Option<Capability>,
    pub region: Option<RegionCode>,
    pub availability: Option<Availability>,
    pub include_retired: bool,
}

impl ReviewerFilter {
    pub fn matches(&self, profile: &ReviewerProfile) -> bool {
        if !self.include_retired && !profile.active {
            return false;
        }
        if let Some(capability) = self.capability {
            if !profile.capabilities.contains(&capability) {
                return false;
            }
        }
        if let Some(region) = &self.region {
            if !profile.regions.contains(region) {
                return false;
            }
        }
        if let Some(availability) = self.availability {
            if profile.availability != availability {
                return false;
            }
        }
        true
    }
}

/// Thread-safe reviewer directory
///
/// Each reviewer is mutated under its own lock, so a slow store write for one
/// reviewer never holds up reads or writes for the rest of the panel.
#[derive(Clone)]
pub struct Directory {
    profiles: Arc<DashMap<ReviewerId, ReviewerProfile>>,
    locks: Arc<KeyedLocks<ReviewerId>>,
    store: Arc<dyn RecordStore>,
}

impl Directory {
    /// Create an empty directory backed by `store`
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self {
            profiles: Arc::new(DashMap::new()),
            locks: Arc::new(KeyedLocks::new()),
            store,
        }
    }

    /// Rebuild the directory from persisted profiles
    pub async fn load(store: Arc<dyn RecordStore>) -> Result<Self> {
        let profiles = store.list_reviewers().await?;
        info!("Loaded {} reviewer profiles", profiles.len());

        let directory = Self::new(store);
        for profile in profiles {
            directory.profiles.insert(profile.id, profile);
        }
        Ok(directory)
    }

    /// Onboard a reviewer
    pub async fn register(&self, profile: ReviewerProfile) -> Result<ReviewerProfile> {
        profile.validate()?;

        let _guard = self.locks.lock(&profile.id).await;
        if self.profiles.contains_key(&profile.id) {
            return Err(AgroError::AlreadyExists(format!("reviewer {}", profile.id)));
        }

        self.store.put_reviewer(&profile).await?;
        info!(
            "Registered reviewer {} ({}) covering {} region(s)",
            profile.name,
            profile.id,
            profile.regions.len()
        );
        self.profiles.insert(profile.id, profile.clone());
        Ok(profile)
    }

    /// Get reviewer by ID
    pub async fn get(&self, id: ReviewerId) -> Result<ReviewerProfile> {
        self.profiles
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AgroError::not_found("reviewer", id))
    }

    /// List reviewers matching a filter, ordered by name
    pub async fn list(&self, filter: &ReviewerFilter) -> Vec<ReviewerProfile> {
        let mut matched: Vec<ReviewerProfile> = self
            .profiles
            .iter()
            .filter(|entry| filter.matches(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        matched.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        matched
    }

    /// Mark a reviewer as assigned
    pub async fn mark_assigned(&self, id: ReviewerId) -> Result<ReviewerProfile> {
        self.update(id, |profile| profile.assign(Utc::now())).await
    }

    /// Mark a reviewer as available again
    pub async fn mark_available(&self, id: ReviewerId) -> Result<ReviewerProfile> {
        self.update(id, |profile| {
            profile.release();
            Ok(())
        })
        .await
    }

    /// Fold a review outcome into the reviewer's rolling statistics
    pub async fn record_outcome(
        &self,
        id: ReviewerId,
        approved: bool,
        duration_hours: f64,
    ) -> Result<ReviewerProfile> {
        check_duration(duration_hours)?;
        let profile = self
            .update(id, |profile| {
                profile.apply_outcome(approved, duration_hours);
                Ok(())
            })
            .await?;
        debug!(
            "Reviewer {} now at approval rate {:.3} over {} reviews",
            id, profile.approval_rate, profile.review_count
        );
        Ok(profile)
    }

    /// Release a reviewer and fold their verdict in with a single store write
    pub async fn complete_review(
        &self,
        id: ReviewerId,
        approved: bool,
        duration_hours: f64,
    ) -> Result<ReviewerProfile> {
        check_duration(duration_hours)?;
        self.update(id, |profile| {
            profile.release();
            profile.apply_outcome(approved, duration_hours);
            Ok(())
        })
        .await
    }

    /// Book `id` for `capability` if it is still eligible
    ///
    /// Returns `None` when another booking or a retirement got there first.
    pub async fn try_book(
        &self,
        id: ReviewerId,
        capability: Capability,
        region: &RegionCode,
        now: DateTime<Utc>,
    ) -> Result<Option<ReviewerProfile>> {
        let _guard = self.locks.lock(&id).await;
        let Some(mut booked) = self.profiles.get(&id).map(|entry| entry.value().clone()) else {
            return Ok(None);
        };
        if !booked.is_eligible(capability, region) {
            return Ok(None);
        }

        booked.assign(now)?;
        self.store.put_reviewer(&booked).await?;
        self.profiles.insert(id, booked.clone());
        Ok(Some(booked))
    }

    /// Soft-retire a reviewer; the profile is kept for history
    pub async fn retire(&self, id: ReviewerId) -> Result<ReviewerProfile> {
        let profile = self
            .update(id, |profile| {
                profile.active = false;
                Ok(())
            })
            .await?;
        info!("Retired reviewer {} ({})", profile.name, id);
        Ok(profile)
    }

    /// Snapshot of every profile, retired ones included
    pub async fn snapshot(&self) -> Vec<ReviewerProfile> {
        self.list(&ReviewerFilter {
            include_retired: true,
            ..Default::default()
        })
        .await
    }

    /// Apply `mutate` to a copy, persist it, then publish it
    async fn update<F>(&self, id: ReviewerId, mutate: F) -> Result<ReviewerProfile>
    where
        F: FnOnce(&mut ReviewerProfile) -> Result<()>,
    {
        let _guard = self.locks.lock(&id).await;
        let mut updated = self
            .profiles
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AgroError::not_found("reviewer", id))?;

        mutate(&mut updated)?;
        self.store.put_reviewer(&updated).await?;
        self.profiles.insert(id, updated.clone());
        Ok(updated)
    }
}

fn check_duration(duration_hours: f64) -> Result<()> {
    if !duration_hours.is_finite() || duration_hours < 0.0 {
        return Err(AgroError::invalid_input(
            "duration_hours",
            "must be a non-negative number",
        ));
    }
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::test_fixtures::reviewer;
    use super::*;
    use crate::storage::MemoryStore;

    fn directory() -> Directory {
        Directory::new(Arc::new(MemoryStore::new()))
    }

    #[test]
    fn test_incremental_average_matches_formula() {
        let mut profile = reviewer("Ana", &[Capability::SoilScientist], &["ca-central"]);

        profile.apply_outcome(true, 4.0);
        assert_eq!(profile.review_count, 1);
        assert!((profile.approval_rate - 1.0).abs() < 1e-12);
        assert!((profile.mean_review_hours - 4.0).abs() < 1e-12);

        profile.apply_outcome(false, 8.0);
        assert!((profile.approval_rate - 0.5).abs() < 1e-12);
        assert!((profile.mean_review_hours - 6.0).abs() < 1e-12);

        profile.apply_outcome(true, 3.0);
        assert!((profile.approval_rate - 2.0 / 3.0).abs() < 1e-12);
        assert!((profile.mean_review_hours - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_incremental_average_from_seeded_history() {
        let mut profile = reviewer("Ben", &[Capability::SoilScientist], &["ca-central"])
            .with_history(0.8, 4, 10.0);

        profile.apply_outcome(false, 5.0);
        // 0.8 + (0 - 0.8) / 5
        assert!((profile.approval_rate - 0.64).abs() < 1e-12);
        assert!((profile.mean_review_hours - 9.0).abs() < 1e-12);
        assert_eq!(profile.review_count, 5);
    }

    #[test]
    fn test_validate_profile() {
        let profile = reviewer("", &[Capability::SoilScientist], &["ca"]);
        assert!(profile.validate().is_err());

        let profile = reviewer("Cy", &[], &["ca"]);
        assert!(profile
            .validate()
            .unwrap_err()
            .to_string()
            .contains("capabilities"));

        let profile =
            reviewer("Cy", &[Capability::SoilScientist], &["ca"]).with_history(1.2, 0, 0.0);
        assert!(profile.validate().is_err());
    }

    #[tokio::test]
    async fn test_register_and_get() {
        let dir = directory();
        let profile = dir
            .register(reviewer("Dee", &[Capability::DroughtSpecialist], &["tx-north"]))
            .await
            .unwrap();

        let fetched = dir.get(profile.id).await.unwrap();
        assert_eq!(fetched, profile);

        let dup = dir.register(profile.clone()).await;
        assert!(matches!(dup, Err(AgroError::AlreadyExists(_))));
    }

    #[tokio::test]
    async fn test_unknown_reviewer_is_not_found() {
        let dir = directory();
        let err = dir.record_outcome(ReviewerId::new(), true, 1.0).await.unwrap_err();
        assert!(matches!(err, AgroError::NotFound { kind: "reviewer", .. }));
    }

    #[tokio::test]
    async fn test_assign_and_release() {
        let dir = directory();
        let p = dir
            .register(reviewer("Eve", &[Capability::SoilScientist], &["ca"]))
            .await
            .unwrap();

        let assigned = dir.mark_assigned(p.id).await.unwrap();
        assert_eq!(assigned.availability, Availability::Assigned);
        assert_eq!(assigned.pending_reviews, 1);

        let again = dir.mark_assigned(p.id).await;
        assert!(matches!(again, Err(AgroError::InvalidState(_))));

        let released = dir.mark_available(p.id).await.unwrap();
        assert_eq!(released.availability, Availability::Available);
        assert_eq!(released.pending_reviews, 0);
    }

    #[tokio::test]
    async fn test_complete_review_releases_and_scores() {
        let dir = directory();
        let p = dir
            .register(
                reviewer("Gil", &[Capability::SoilScientist], &["ca"]).with_history(0.5, 1, 2.0),
            )
            .await
            .unwrap();
        dir.mark_assigned(p.id).await.unwrap();

        let done = dir.complete_review(p.id, true, 4.0).await.unwrap();
        assert_eq!(done.availability, Availability::Available);
        assert_eq!(done.pending_reviews, 0);
        assert_eq!(done.review_count, 2);
        assert!((done.approval_rate - 0.75).abs() < 1e-12);
        assert!((done.mean_review_hours - 3.0).abs() < 1e-12);

        let err = dir.complete_review(p.id, true, -1.0).await.unwrap_err();
        assert!(matches!(err, AgroError::InvalidInput { .. }));
    }

    #[tokio::test]
    async fn test_try_book_skips_taken_and_retired() {
        let dir = directory();
        let ca = RegionCode::new("ca");
        let p = dir
            .register(reviewer("Hal", &[Capability::SoilScientist], &["ca"]))
            .await
            .unwrap();

        let booked = dir
            .try_book(p.id, Capability::SoilScientist, &ca, Utc::now())
            .await
            .unwrap();
        assert_eq!(booked.map(|b| b.availability), Some(Availability::Assigned));

        let again = dir
            .try_book(p.id, Capability::SoilScientist, &ca, Utc::now())
            .await
            .unwrap();
        assert!(again.is_none());

        dir.mark_available(p.id).await.unwrap();
        dir.retire(p.id).await.unwrap();
        let retired = dir
            .try_book(p.id, Capability::SoilScientist, &ca, Utc::now())
            .await
            .unwrap();
        assert!(retired.is_none());

        let unknown = dir
            .try_book(ReviewerId::new(), Capability::SoilScientist, &ca, Utc::now())
            .await
            .unwrap();
        assert!(unknown.is_none());
    }

    #[tokio::test]
    async fn test_list_filters() {
        let dir = directory();
        let a = dir
            .register(reviewer("A", &[Capability::SoilScientist], &["ca"]))
            .await
            .unwrap();
        dir.register(reviewer("B", &[Capability::IrrigationSpecialist], &["ca", "or"]))
            .await
            .unwrap();
        let c = dir
            .register(reviewer("C", &[Capability::SoilScientist], &["or"]))
            .await
            .unwrap();

        let soil = dir
            .list(&ReviewerFilter {
                capability: Some(Capability::SoilScientist),
                ..Default::default()
            })
            .await;
        assert_eq!(soil.len(), 2);

        let oregon = dir
            .list(&ReviewerFilter {
                region: Some(RegionCode::new("OR")),
                ..Default::default()
            })
            .await;
        assert_eq!(oregon.len(), 2);

        dir.mark_assigned(a.id).await.unwrap();
        let available = dir
            .list(&ReviewerFilter {
                availability: Some(Availability::Available),
                ..Default::default()
            })
            .await;
        assert_eq!(available.len(), 2);

        dir.retire(c.id).await.unwrap();
        assert_eq!(dir.list(&ReviewerFilter::default()).await.len(), 2);
        assert_eq!(dir.snapshot().await.len(), 3);
    }

    #[tokio::test]
    async fn test_load_rebuilds_from_store() {
        let store: Arc<dyn RecordStore> = Arc::new(MemoryStore::new());
        let dir = Directory::new(store.clone());
        let p = dir
            .register(reviewer("Fay", &[Capability::CropAgronomist], &["ia"]))
            .await
            .unwrap();
        dir.record_outcome(p.id, true, 2.0).await.unwrap();

        let reloaded = Directory::load(store).await.unwrap();
        let fetched = reloaded.get(p.id).await.unwrap();
        assert_eq!(fetched.review_count, 1);
    }
}
