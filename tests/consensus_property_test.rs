//! Property tests for the terminal disposition of a validation

mod common;

use agrovalidate_core::{Capability, ValidationStatus};
use common::*;
use proptest::prelude::*;

fn expected(votes: &[bool]) -> ValidationStatus {
    if votes.iter().all(|v| *v) {
        ValidationStatus::Approved
    } else if votes.iter().all(|v| !*v) {
        ValidationStatus::Rejected
    } else {
        ValidationStatus::RequiresRevision
    }
}

proptest! {
    #[test]
    fn prop_disposition_depends_only_on_votes(
        votes in prop::collection::vec(any::<bool>(), 1..12),
    ) {
        let status = ValidationStatus::from_approvals(&votes).unwrap();
        prop_assert_eq!(status, expected(&votes));
        prop_assert!(status.is_terminal());

        let mut reversed = votes.clone();
        reversed.reverse();
        prop_assert_eq!(ValidationStatus::from_approvals(&reversed), Some(status));
    }

    #[test]
    fn prop_no_votes_is_not_terminal(_seed in 0u8..4) {
        prop_assert_eq!(ValidationStatus::from_approvals(&[]), None);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_engine_reaches_vote_determined_status(
        votes in prop::collection::vec(any::<bool>(), 1..=5),
        submit_in_reverse in any::<bool>(),
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        let status = runtime.block_on(async {
            let (engine, _store) = create_test_engine().await;
            let caps = [
                Capability::SoilScientist,
                Capability::IrrigationSpecialist,
                Capability::DroughtSpecialist,
                Capability::CropAgronomist,
                Capability::AgriculturalEconomist,
            ];
            let mut reviewers = Vec::new();
            for cap in caps.iter().take(votes.len()) {
                reviewers.push(register(&engine, cap.as_str(), &[*cap], 0.8, 1).await);
            }

            let request = engine
                .submit_validation(submission(Some(caps[..votes.len()].to_vec())))
                .await
                .unwrap();

            let mut order: Vec<usize> = (0..votes.len()).collect();
            if submit_in_reverse {
                order.reverse();
            }
            for i in order {
                let status = engine.get_validation(request.id).await.unwrap().status;
                assert!(!status.is_terminal());
                engine
                    .submit_review(request.id, review(reviewers[i].id, votes[i], 1.5))
                    .await
                    .unwrap();
            }

            engine.get_validation(request.id).await.unwrap().status
        });

        prop_assert_eq!(status, expected(&votes));
    }
}
