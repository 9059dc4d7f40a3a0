// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application error types.
//!
//! Every error here is recoverable: the caller reports it and the user can
//! act again. Nothing is fatal to the process.

use crate::models::PostId;

/// Application error type shared by the feed, services and gateways.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Empty or malformed user input; shown inline next to the field.
    #[error("Invalid input: {0}")]
    Validation(String),

    /// The requester may not perform this action (e.g. deleting someone
    /// else's post). No mutation was issued.
    #[error("Not allowed: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// A mutation of the same kind is already in flight for this post.
    #[error("Another update to this post is still in progress")]
    Busy,

    /// Optimistic operation on a post that is not in the local feed.
    #[error("Post {0} is not in the feed")]
    NotInFeed(PostId),

    /// Remote insert/update/delete failed. Optimistic state was rolled back.
    #[error("Remote update failed: {0}")]
    Remote(String),

    /// Credential issuer rejected or failed a request.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// A remote document could not be mapped into a typed record.
    #[error("Malformed document {id}: {reason}")]
    Mapping { id: String, reason: String },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Message suitable for a dismissible notice or inline field error.
    pub fn notice(&self) -> String {
        match self {
            AppError::Validation(msg) | AppError::Forbidden(msg) | AppError::NotFound(msg) => {
                msg.clone()
            }
            AppError::Busy => "Please wait for the previous action to finish.".to_string(),
            AppError::NotInFeed(_) => "This post is no longer available.".to_string(),
            AppError::Remote(_) | AppError::Database(_) => {
                "Could not reach the server. Please try again.".to_string()
            }
            AppError::Auth(msg) => msg.clone(),
            AppError::Mapping { .. } | AppError::Internal(_) => {
                "Something went wrong. Please try again.".to_string()
            }
        }
    }

    /// Whether the error came from user input rather than the backend.
    pub fn is_validation(&self) -> bool {
        matches!(self, AppError::Validation(_) | AppError::NotFound(_))
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let message = errors
            .field_errors()
            .into_iter()
            .flat_map(|(field, errs)| {
                errs.iter().map(move |e| match &e.message {
                    Some(msg) => msg.to_string(),
                    None => format!("{field}: {}", e.code),
                })
            })
            .collect::<Vec<_>>()
            .join("; ");
        AppError::Validation(message)
    }
}

/// Result type alias for fallible operations in this crate.
pub type Result<T> = std::result::Result<T, AppError>;
