//! Integration tests for the consultation workflow, driven through
//! `ConsultationService` over the in-memory store and local file storage.

mod common;

use chrono::Utc;
use common::{
    answered_session, contended_harness, harness, harness_with, photo, valid_answers, ALL_SLOTS,
};
use hvac_consult_core::catalog::default_categories;
use hvac_consult_core::discount::DiscountPolicy;
use hvac_consult_core::domain::{ConsultationImage, HvacInfo};
use hvac_consult_core::{
    ConsultError, ConsultationStatus, ConsultationStore, ValidationError, WorkflowSettings,
};
use std::collections::HashSet;
use std::path::Path;
use uuid::Uuid;

fn count_files(dir: &Path) -> usize {
    std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| {
            let path = entry.unwrap().path();
            if path.is_dir() {
                count_files(&path)
            } else {
                1
            }
        })
        .sum()
}

//=========================================================================================
// Answers and Estimate
//=========================================================================================

#[tokio::test]
async fn estimate_from_answers_end_to_end() {
    let h = harness().await;
    let session_id = answered_session(&h.service).await;

    let estimate = h.service.generate_estimate(session_id).await.unwrap();
    assert_eq!(estimate.tonnage, 3.5);
    assert_eq!(estimate.system_count, 1);
    assert_eq!(estimate.estimates.good.min_price, 9500);
    assert_eq!(estimate.estimates.good.max_price, 11500);
    assert_eq!(estimate.estimates.best.label, "Ultimate Comfort");

    let details = h.service.get_details(session_id).await.unwrap();
    assert_eq!(details.consultation.status, ConsultationStatus::EstimateReady);
    assert_eq!(details.consultation.pricing_estimate, Some(estimate));
    assert!(details.progress.answers_submitted);
    assert!(details.progress.estimate_generated);
    assert!(!details.progress.images_uploaded);
}

#[tokio::test]
async fn missing_required_answer_names_the_question() {
    let h = harness().await;
    let session_id = h.service.create_session().await.unwrap().session_id;
    let questions = h.service.list_questions().await.unwrap();
    let name_question = questions.iter().find(|q| q.order == 1).unwrap();

    let mut answers = valid_answers(&h.service).await;
    answers.remove(&name_question.id.to_string());

    let err = h.service.submit_answers(session_id, &answers).await.unwrap_err();
    match err {
        ConsultError::Validation(ValidationError::MissingAnswer(text)) => {
            assert_eq!(text, "What is your full name?")
        }
        other => panic!("unexpected error: {:?}", other),
    }
    // Nothing was stored.
    let details = h.service.get_details(session_id).await.unwrap();
    assert_eq!(details.consultation.status, ConsultationStatus::Pending);
    assert!(details.consultation.quiz_answers.is_empty());
}

#[tokio::test]
async fn resubmission_replaces_answers() {
    let h = harness().await;
    let session_id = answered_session(&h.service).await;
    let questions = h.service.list_questions().await.unwrap();
    let optional = questions.iter().find(|q| !q.is_required).unwrap();

    let mut answers = valid_answers(&h.service).await;
    answers.remove(&optional.id.to_string());
    let consultation = h.service.submit_answers(session_id, &answers).await.unwrap();

    assert_eq!(consultation.quiz_answers.len(), questions.len() - 1);
    assert!(!consultation.quiz_answers.contains_key(&optional.id));
}

#[tokio::test]
async fn unknown_session_is_not_found() {
    let h = harness().await;
    let answers = valid_answers(&h.service).await;
    assert!(matches!(
        h.service.submit_answers(Uuid::new_v4(), &answers).await,
        Err(ConsultError::NotFound(_))
    ));
    assert!(matches!(
        h.service.get_details(Uuid::new_v4()).await,
        Err(ConsultError::NotFound(_))
    ));
}

#[tokio::test]
async fn estimate_requires_answers() {
    let h = harness().await;
    let session_id = h.service.create_session().await.unwrap().session_id;
    assert!(matches!(
        h.service.generate_estimate(session_id).await,
        Err(ConsultError::Validation(ValidationError::MissingAnswers))
    ));
}

#[tokio::test]
async fn completed_consultations_cannot_be_re_estimated() {
    let h = harness().await;
    let session_id = answered_session(&h.service).await;
    h.service.generate_estimate(session_id).await.unwrap();

    let mut consultation = h.store.get_consultation(session_id).await.unwrap();
    let expected = consultation.version;
    consultation.status = ConsultationStatus::Completed;
    consultation.version += 1;
    assert!(h
        .store
        .replace_consultation(&consultation, expected)
        .await
        .unwrap());

    match h.service.generate_estimate(session_id).await {
        Err(ConsultError::Validation(ValidationError::EstimateClosed(status))) => {
            assert_eq!(status, "completed")
        }
        other => panic!("unexpected result: {:?}", other),
    }
    let details = h.service.get_details(session_id).await.unwrap();
    assert_eq!(details.consultation.status, ConsultationStatus::Completed);
}

#[tokio::test]
async fn seeding_questions_twice_is_skipped() {
    let h = harness().await;
    let report = h.service.seed_questions().await.unwrap();
    assert!(report.skipped);
    assert_eq!(report.inserted, 0);
    assert_eq!(h.service.list_questions().await.unwrap().len(), 11);
}

#[tokio::test]
async fn startup_seeding_fills_an_empty_catalog_once() {
    // The harness starts from empty stores and seeds through `seed_defaults`.
    let h = harness().await;
    assert_eq!(h.service.list_questions().await.unwrap().len(), 11);
    assert_eq!(h.service.list_categories().await.unwrap().len(), 5);

    let mut outdoor = default_categories().remove(0);
    outdoor.discount_amount = 175;
    h.service.upsert_category("outdoor_unit", outdoor).await.unwrap();

    h.service.seed_defaults().await.unwrap();
    let categories = h.service.list_categories().await.unwrap();
    assert_eq!(categories.len(), 5);
    assert_eq!(categories[0].discount_amount, 175);
    assert_eq!(h.service.list_questions().await.unwrap().len(), 11);
}

#[tokio::test]
async fn negative_discount_weights_are_rejected() {
    let h = harness().await;
    let mut command_center = default_categories().remove(2);
    command_center.discount_amount = -5000;

    match h
        .service
        .upsert_category("command_center", command_center)
        .await
    {
        Err(ConsultError::Validation(ValidationError::NegativeDiscount { category, amount })) => {
            assert_eq!(category, "command_center");
            assert_eq!(amount, -5000);
        }
        other => panic!("unexpected result: {:?}", other),
    }

    // The stored weight still applies as a reduction.
    let session_id = answered_session(&h.service).await;
    h.service.generate_estimate(session_id).await.unwrap();
    h.service
        .upload_image(session_id, photo("command_center", "main_thermostat", b"jpeg"))
        .await
        .unwrap();
    let outcome = h.service.apply_discount_once(session_id).await.unwrap();
    assert_eq!(outcome.discount, 25);
    assert_eq!(outcome.estimate.estimates.good.min_price, 9475);
}

//=========================================================================================
// Admin
//=========================================================================================

#[tokio::test]
async fn consultations_are_listed_in_pages() {
    let h = harness().await;
    for _ in 0..3 {
        h.service.create_session().await.unwrap();
    }

    assert_eq!(h.service.list_consultations(0, 100).await.unwrap().len(), 3);
    assert_eq!(h.service.list_consultations(1, 100).await.unwrap().len(), 2);
    assert_eq!(h.service.list_consultations(0, 1).await.unwrap().len(), 1);
    assert!(h.service.list_consultations(3, 100).await.unwrap().is_empty());
}

#[tokio::test]
async fn deleting_a_consultation_removes_its_photos() {
    let h = harness().await;
    let session_id = answered_session(&h.service).await;
    let kept = answered_session(&h.service).await;
    for sub_category in ["big_picture", "data_plate"] {
        h.service
            .upload_image(session_id, photo("outdoor_unit", sub_category, b"jpeg"))
            .await
            .unwrap();
    }
    h.service
        .upload_image(kept, photo("energy_bill", "recent_bill", b"jpeg"))
        .await
        .unwrap();
    assert_eq!(count_files(h.upload_dir.path()), 3);

    assert_eq!(h.service.delete_consultation(session_id).await.unwrap(), 2);
    assert_eq!(count_files(h.upload_dir.path()), 1);
    assert!(matches!(
        h.service.get_consultation(session_id).await,
        Err(ConsultError::NotFound(_))
    ));
    assert!(matches!(
        h.service.delete_consultation(session_id).await,
        Err(ConsultError::NotFound(_))
    ));
    assert_eq!(
        h.service.get_consultation(kept).await.unwrap().images.len(),
        1
    );
}

//=========================================================================================
// Images and Discounts
//=========================================================================================

#[tokio::test]
async fn upload_before_answers_is_rejected() {
    let h = harness().await;
    let session_id = h.service.create_session().await.unwrap().session_id;
    let err = h
        .service
        .upload_image(session_id, photo("outdoor_unit", "big_picture", b"jpeg"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ConsultError::Validation(ValidationError::PrematureUpload(_))
    ));
}

#[tokio::test]
async fn completing_a_category_earns_its_discount() {
    let h = harness().await;
    let session_id = answered_session(&h.service).await;

    let first = h
        .service
        .upload_image(session_id, photo("outdoor_unit", "big_picture", b"jpeg"))
        .await
        .unwrap();
    assert_eq!(first.image_number, 1);
    assert_eq!(first.total_discount, 0);
    assert!(first.completed_categories.is_empty());
    assert_eq!(first.remaining_images, 6);
    assert!(first.image_url.starts_with("http://localhost:3000/uploads/"));

    let second = h
        .service
        .upload_image(session_id, photo("outdoor_unit", "data_plate", b"jpeg"))
        .await
        .unwrap();
    assert_eq!(second.image_number, 2);
    assert_eq!(second.total_discount, 150);
    assert_eq!(second.completed_categories, vec!["outdoor_unit".to_string()]);

    let details = h.service.get_details(session_id).await.unwrap();
    assert_eq!(details.consultation.status, ConsultationStatus::ImagesUploaded);
    assert_eq!(details.discount.total_discount, 150);
    let outdoor = details
        .discount
        .categories
        .iter()
        .find(|c| c.category == "outdoor_unit")
        .unwrap();
    assert!(outdoor.completed);
    assert_eq!((outdoor.uploaded, outdoor.required), (2, 2));
}

#[tokio::test]
async fn seven_photos_then_the_cap() {
    let h = harness().await;
    let session_id = answered_session(&h.service).await;

    let mut last = None;
    for (category, sub_category) in ALL_SLOTS {
        last = Some(
            h.service
                .upload_image(session_id, photo(category, sub_category, b"jpeg"))
                .await
                .unwrap(),
        );
    }
    let last = last.unwrap();
    assert_eq!(last.image_number, 7);
    assert_eq!(last.remaining_images, 0);
    assert_eq!(last.total_discount, 150 + 50 + 25 + 500 + 200);
    assert_eq!(last.completed_categories.len(), 5);

    let err = h
        .service
        .upload_image(session_id, photo("outdoor_unit", "big_picture", b"jpeg"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ConsultError::Validation(ValidationError::ImageLimit(7))
    ));
    assert_eq!(count_files(h.upload_dir.path()), 7);
}

#[tokio::test]
async fn rejected_uploads_leave_the_record_untouched() {
    let h = harness().await;
    let session_id = answered_session(&h.service).await;
    h.service
        .upload_image(session_id, photo("command_center", "main_thermostat", b"jpeg"))
        .await
        .unwrap();

    let duplicate = h
        .service
        .upload_image(session_id, photo("command_center", "main_thermostat", b"jpeg"))
        .await
        .unwrap_err();
    assert!(matches!(
        duplicate,
        ConsultError::Validation(ValidationError::DuplicateCategory { .. })
    ));

    let unknown = h
        .service
        .upload_image(session_id, photo("attic", "insulation", b"jpeg"))
        .await
        .unwrap_err();
    assert!(matches!(
        unknown,
        ConsultError::Validation(ValidationError::InvalidCategory { .. })
    ));

    let mut pdf = photo("energy_bill", "recent_bill", b"%PDF");
    pdf.content_type = "application/pdf".to_string();
    let wrong_type = h.service.upload_image(session_id, pdf).await.unwrap_err();
    assert!(matches!(
        wrong_type,
        ConsultError::Validation(ValidationError::InvalidFileType(_))
    ));

    let details = h.service.get_details(session_id).await.unwrap();
    assert_eq!(details.consultation.images.len(), 1);
    assert_eq!(details.consultation.total_discount, 25);
}

#[tokio::test]
async fn discount_applies_exactly_once() {
    let h = harness().await;
    let session_id = answered_session(&h.service).await;
    h.service.generate_estimate(session_id).await.unwrap();
    for sub_category in ["big_picture", "data_plate"] {
        h.service
            .upload_image(session_id, photo("outdoor_unit", sub_category, b"jpeg"))
            .await
            .unwrap();
    }

    let outcome = h.service.apply_discount_once(session_id).await.unwrap();
    assert!(outcome.applied);
    assert_eq!(outcome.discount, 150);
    assert_eq!(outcome.estimate.estimates.good.min_price, 9350);
    assert_eq!(outcome.estimate.estimates.good.max_price, 11350);
    let original = outcome.original_estimate.unwrap();
    assert_eq!(original.estimates.good.min_price, 9500);

    assert!(matches!(
        h.service.apply_discount_once(session_id).await,
        Err(ConsultError::Conflict(_))
    ));
    // The discounted estimate cannot be regenerated away.
    assert!(matches!(
        h.service.generate_estimate(session_id).await,
        Err(ConsultError::Conflict(_))
    ));

    let details = h.service.get_details(session_id).await.unwrap();
    assert!(details.progress.discount_applied);
    assert_eq!(
        details
            .consultation
            .pricing_estimate
            .unwrap()
            .estimates
            .good
            .min_price,
        9350
    );
}

#[tokio::test]
async fn discount_requires_an_estimate() {
    let h = harness().await;
    let session_id = answered_session(&h.service).await;
    assert!(matches!(
        h.service.apply_discount_once(session_id).await,
        Err(ConsultError::Validation(ValidationError::NoEstimate))
    ));
}

#[tokio::test]
async fn zero_discount_does_not_consume_the_application() {
    let h = harness().await;
    let session_id = answered_session(&h.service).await;
    h.service.generate_estimate(session_id).await.unwrap();

    let early = h.service.apply_discount_once(session_id).await.unwrap();
    assert!(!early.applied);
    assert!(early.original_estimate.is_none());

    h.service
        .upload_image(session_id, photo("indoor_system", "indoor_unit", b"jpeg"))
        .await
        .unwrap();
    let later = h.service.apply_discount_once(session_id).await.unwrap();
    assert!(later.applied);
    assert_eq!(later.discount, 500);
}

#[tokio::test]
async fn zero_discount_locks_when_configured() {
    let h = harness_with(WorkflowSettings {
        discount_policy: DiscountPolicy { lock_on_zero: true },
        ..WorkflowSettings::default()
    })
    .await;
    let session_id = answered_session(&h.service).await;
    h.service.generate_estimate(session_id).await.unwrap();

    let early = h.service.apply_discount_once(session_id).await.unwrap();
    assert!(!early.applied);
    assert!(early.original_estimate.is_some());
    assert!(matches!(
        h.service.apply_discount_once(session_id).await,
        Err(ConsultError::Conflict(_))
    ));
}

#[tokio::test]
async fn upload_after_estimate_keeps_estimate_ready() {
    let h = harness().await;
    let session_id = answered_session(&h.service).await;
    h.service.generate_estimate(session_id).await.unwrap();
    h.service
        .upload_image(session_id, photo("energy_bill", "recent_bill", b"jpeg"))
        .await
        .unwrap();

    let details = h.service.get_details(session_id).await.unwrap();
    assert_eq!(details.consultation.status, ConsultationStatus::EstimateReady);
    assert!(details.progress.images_uploaded);
}

//=========================================================================================
// Analysis
//=========================================================================================

#[tokio::test]
async fn analysis_survives_individual_failures() {
    let h = harness().await;
    let session_id = answered_session(&h.service).await;
    h.service
        .upload_image(
            session_id,
            photo("outdoor_unit", "data_plate", b"GOODMAN MANUFACTURING CO\nMODEL CKJ60-1"),
        )
        .await
        .unwrap();
    h.service
        .upload_image(session_id, photo("outdoor_unit", "big_picture", b"FAIL"))
        .await
        .unwrap();
    h.service
        .upload_image(session_id, photo("power_hub", "panel_cover", b"BLANK"))
        .await
        .unwrap();

    let analysis = h.service.analyze_images(session_id).await.unwrap();
    assert_eq!(analysis.total_images_analyzed, 3);
    let successes: Vec<bool> = analysis.individual_results.iter().map(|r| r.success).collect();
    assert_eq!(successes, vec![true, false, false]);
    assert_eq!(
        analysis.individual_results[2].error.as_deref(),
        Some("No text found in image")
    );
    assert_eq!(analysis.combined_text, "GOODMAN MANUFACTURING CO\nMODEL CKJ60-1");
    assert_eq!(analysis.hvac_info.brand.as_deref(), Some("GOODMAN"));
    assert_eq!(analysis.hvac_info.model_number.as_deref(), Some("CKJ60-1"));
    assert_eq!(h.extractor.calls(), 1);

    let details = h.service.get_details(session_id).await.unwrap();
    assert_eq!(details.consultation.image_analysis, Some(analysis));
}

#[tokio::test]
async fn analysis_without_text_skips_extraction() {
    let h = harness().await;
    let session_id = answered_session(&h.service).await;
    h.service
        .upload_image(session_id, photo("energy_bill", "recent_bill", b"BLANK"))
        .await
        .unwrap();

    let analysis = h.service.analyze_images(session_id).await.unwrap();
    assert!(analysis.combined_text.is_empty());
    assert_eq!(analysis.hvac_info, HvacInfo::default());
    assert_eq!(h.extractor.calls(), 0);
}

#[tokio::test]
async fn analysis_needs_uploaded_images() {
    let h = harness().await;
    let session_id = answered_session(&h.service).await;
    assert!(matches!(
        h.service.analyze_images(session_id).await,
        Err(ConsultError::Validation(ValidationError::PrematureAnalysis(_)))
    ));
}

//=========================================================================================
// Concurrency
//=========================================================================================

#[tokio::test]
async fn upload_retries_after_lost_version_races() {
    let (h, contended) = contended_harness(WorkflowSettings::default()).await;
    let session_id = answered_session(&h.service).await;
    let calls_before = contended.replace_calls();

    // As many lost races as a full burst of competing uploads can cause.
    contended.lose_next(7);
    let receipt = h
        .service
        .upload_image(session_id, photo("indoor_system", "indoor_unit", b"jpeg"))
        .await
        .unwrap();
    assert_eq!(receipt.image_number, 1);
    assert_eq!(receipt.total_discount, 500);
    assert_eq!(contended.replace_calls() - calls_before, 8);

    let consultation = h.service.get_consultation(session_id).await.unwrap();
    assert_eq!(consultation.images.len(), 1);
    assert_eq!(count_files(h.upload_dir.path()), 1);
}

#[tokio::test]
async fn upload_gives_up_after_the_last_attempt() {
    let (h, contended) = contended_harness(WorkflowSettings {
        max_write_attempts: 5,
        ..WorkflowSettings::default()
    })
    .await;
    let session_id = answered_session(&h.service).await;

    contended.lose_next(5);
    let err = h
        .service
        .upload_image(session_id, photo("indoor_system", "indoor_unit", b"jpeg"))
        .await
        .unwrap_err();
    assert!(matches!(err, ConsultError::Conflict(_)));

    // The stored blob was removed and the record never gained the image.
    assert_eq!(count_files(h.upload_dir.path()), 0);
    let consultation = h.service.get_consultation(session_id).await.unwrap();
    assert!(consultation.images.is_empty());
    assert_eq!(consultation.total_discount, 0);
}

#[tokio::test]
async fn retried_upload_is_validated_against_the_fresh_record() {
    let (h, contended) = contended_harness(WorkflowSettings::default()).await;
    let session_id = answered_session(&h.service).await;

    // A competing writer takes the same slot while this upload is in flight.
    contended.interfere_with(Box::new(|c| {
        c.images.push(ConsultationImage {
            image_number: c.images.len() as u32 + 1,
            image_url: "http://localhost:3000/uploads/other.jpg".to_string(),
            original_filename: None,
            category: "outdoor_unit".to_string(),
            sub_category: "data_plate".to_string(),
            content_type: "image/jpeg".to_string(),
            created_at: Utc::now(),
            storage_key: "other.jpg".to_string(),
        });
    }));
    contended.lose_next(1);

    let err = h
        .service
        .upload_image(session_id, photo("outdoor_unit", "data_plate", b"jpeg"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ConsultError::Validation(ValidationError::DuplicateCategory { .. })
    ));
    assert_eq!(count_files(h.upload_dir.path()), 0);
    let consultation = h.service.get_consultation(session_id).await.unwrap();
    assert_eq!(consultation.images.len(), 1);
    assert_eq!(consultation.images[0].storage_key, "other.jpg");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_uploads_never_duplicate_a_slot() {
    let h = harness().await;
    let session_id = answered_session(&h.service).await;

    // Every slot once, plus a second contender for three of them.
    let mut slots: Vec<(&str, &str)> = ALL_SLOTS.to_vec();
    slots.extend_from_slice(&ALL_SLOTS[..3]);

    let tasks: Vec<_> = slots
        .into_iter()
        .map(|(category, sub_category)| {
            let service = h.service.clone();
            tokio::spawn(async move {
                service
                    .upload_image(session_id, photo(category, sub_category, b"jpeg"))
                    .await
            })
        })
        .collect();

    let mut accepted = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => accepted += 1,
            // A late contender can also find the record already full.
            Err(ConsultError::Validation(
                ValidationError::DuplicateCategory { .. } | ValidationError::ImageLimit(7),
            )) => {}
            Err(other) => panic!("unexpected error: {:?}", other),
        }
    }

    let consultation = h.service.get_details(session_id).await.unwrap().consultation;
    assert_eq!(accepted, 7);
    assert_eq!(consultation.images.len(), 7);
    let distinct: HashSet<_> = consultation
        .images
        .iter()
        .map(|img| (img.category.clone(), img.sub_category.clone()))
        .collect();
    assert_eq!(distinct.len(), 7);
    let numbers: Vec<u32> = consultation.images.iter().map(|img| img.image_number).collect();
    assert_eq!(numbers, (1..=7).collect::<Vec<_>>());
    assert_eq!(consultation.total_discount, 925);
    // Losing contenders cleaned up their files.
    assert_eq!(count_files(h.upload_dir.path()), 7);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_uploads_respect_the_cap() {
    let h = harness_with(WorkflowSettings {
        max_images: 3,
        ..WorkflowSettings::default()
    })
    .await;
    let session_id = answered_session(&h.service).await;

    let tasks: Vec<_> = ALL_SLOTS
        .into_iter()
        .map(|(category, sub_category)| {
            let service = h.service.clone();
            tokio::spawn(async move {
                service
                    .upload_image(session_id, photo(category, sub_category, b"jpeg"))
                    .await
            })
        })
        .collect();

    let mut accepted = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => accepted += 1,
            Err(ConsultError::Validation(ValidationError::ImageLimit(3))) => {}
            Err(other) => panic!("unexpected error: {:?}", other),
        }
    }

    let consultation = h.service.get_details(session_id).await.unwrap().consultation;
    assert_eq!(accepted, 3);
    assert_eq!(consultation.images.len(), 3);
    assert_eq!(count_files(h.upload_dir.path()), 3);
}
