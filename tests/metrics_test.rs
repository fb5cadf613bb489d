//! Rolling metrics tests

mod common;

use agrovalidate_core::{AgroError, Capability};
use chrono::{Duration, Utc};
use common::*;

#[tokio::test]
async fn test_empty_window_returns_zeroes() {
    let (engine, _store) = create_test_engine().await;

    let metrics = engine.get_validation_metrics(Some(7)).await.unwrap();
    assert_eq!(metrics.window_days, 7);
    assert_eq!(metrics.total_validations, 0);
    assert_eq!(metrics.expert_approval_rate, 0.0);
    assert_eq!(metrics.average_review_time_hours, 0.0);
    assert_eq!(metrics.completed_field_tests, 0);
    assert_eq!(metrics.field_test_success_rate, 0.0);
    assert_eq!(metrics.active_panel_size, 0);

    let err = engine.get_validation_metrics(Some(0)).await.unwrap_err();
    assert!(matches!(err, AgroError::InvalidInput { .. }));
}

#[tokio::test]
async fn test_metrics_over_mixed_outcomes() {
    let (engine, store) = create_test_engine().await;
    let a = register(&engine, "A", &[Capability::SoilScientist], 0.9, 3).await;
    let b = register(&engine, "B", &[Capability::SoilScientist], 0.8, 3).await;
    let c = register(&engine, "C", &[Capability::SoilScientist], 0.7, 3).await;

    let soil_only = || submission(Some(vec![Capability::SoilScientist]));
    let approved = engine.submit_validation(soil_only()).await.unwrap();
    let rejected = engine.submit_validation(soil_only()).await.unwrap();
    let open = engine.submit_validation(soil_only()).await.unwrap();
    assert_eq!(approved.assignments[0].reviewer_id, a.id);
    assert_eq!(rejected.assignments[0].reviewer_id, b.id);
    assert_eq!(open.assignments[0].reviewer_id, c.id);

    engine
        .submit_review(approved.id, review(a.id, true, 2.0))
        .await
        .unwrap();
    engine
        .submit_review(rejected.id, review(b.id, false, 6.0))
        .await
        .unwrap();

    // Completed long before the window opens
    let mut ancient = engine.get_validation(open.id).await.unwrap();
    ancient.created_at = Utc::now() - Duration::days(90);
    store.put_validation(&ancient).await.unwrap();

    let good = engine.start_field_test(field_plan("farm-1")).await.unwrap();
    let weak = engine.start_field_test(field_plan("farm-1")).await.unwrap();
    engine.start_field_test(field_plan("farm-2")).await.unwrap();
    engine.complete_field_test(good.id, completion(0.85)).await.unwrap();
    engine.complete_field_test(weak.id, completion(0.7)).await.unwrap();

    let metrics = engine.get_validation_metrics(None).await.unwrap();
    assert_eq!(metrics.window_days, 30);
    assert_eq!(metrics.total_validations, 2);
    assert_eq!(metrics.approved, 1);
    assert_eq!(metrics.rejected, 1);
    assert_eq!(metrics.requires_revision, 0);
    assert!((metrics.expert_approval_rate - 0.5).abs() < 1e-9);
    assert!((metrics.average_review_time_hours - 4.0).abs() < 1e-9);
    assert_eq!(metrics.reviews_in_window, 2);
    assert_eq!(metrics.completed_field_tests, 2);
    // 0.7 is not strictly above the threshold
    assert!((metrics.field_test_success_rate - 0.5).abs() < 1e-9);
    assert_eq!(metrics.active_trials, 1);
    assert_eq!(metrics.active_panel_size, 3);

    let panel = engine.get_expert_panel_status().await;
    assert_eq!(panel.active, 3);
    assert_eq!(panel.assigned, 1);
    assert_eq!(panel.available, 2);
}
