// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use fitfeed::error::AppError;
use fitfeed::models::{PostDraft, PostId, ProfileUpdate};
use validator::Validate;

#[test]
fn test_notice_for_user_facing_errors() {
    let err = AppError::Forbidden("Only the author can delete this post".to_string());
    assert_eq!(err.notice(), "Only the author can delete this post");

    let err = AppError::NotInFeed(PostId::new("p1"));
    assert_eq!(err.notice(), "This post is no longer available.");

    let err = AppError::Busy;
    assert_eq!(err.notice(), "Please wait for the previous action to finish.");
}

#[test]
fn test_notice_hides_backend_details() {
    let err = AppError::Remote("deadline exceeded on projects/x/documents".to_string());
    assert!(!err.notice().contains("deadline"));

    let err = AppError::Internal(anyhow::anyhow!("boom"));
    assert!(!err.notice().contains("boom"));

    let err = AppError::Mapping {
        id: "p1".to_string(),
        reason: "missing createdAt".to_string(),
    };
    assert!(!err.is_validation());
}

#[test]
fn test_validation_errors_carry_field_messages() {
    let draft = PostDraft {
        description: " ".to_string(),
        photo_ref: String::new(),
        location_label: None,
    };
    let err: AppError = draft.validate().unwrap_err().into();

    assert!(err.is_validation());
    let notice = err.notice();
    assert!(notice.contains("A description is required"));
    assert!(notice.contains("A photo is required to publish"));
}

#[test]
fn test_profile_update_name_required() {
    let err: AppError = ProfileUpdate::default().validate().unwrap_err().into();
    assert_eq!(err.notice(), "Name must not be empty");
}
