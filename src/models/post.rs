// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Workout post model and the document mapper.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use validator::{Validate, ValidationError};

use crate::error::AppError;

/// Stable document identifier assigned by the remote collection.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PostId(String);

impl PostId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity key of a user (their email, lowercased).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    /// Normalize an email into an identity key.
    pub fn new(email: impl AsRef<str>) -> Self {
        Self(email.as_ref().trim().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A published workout entry, as rendered in the feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Post {
    pub id: PostId,
    /// Identity of the creator
    pub author: Identity,
    /// Author's profile name at creation time (may be stale)
    pub author_display_name: Option<String>,
    /// Author's profile photo at creation time (may be stale)
    pub author_photo_ref: Option<String>,
    pub description: String,
    pub photo_ref: String,
    pub location_label: Option<String>,
    /// Identities that liked this post
    pub likes: BTreeSet<Identity>,
    /// Server-assigned creation time, the feed sort key
    pub created_at: DateTime<Utc>,
}

impl Post {
    /// Whether `viewer` has liked this post.
    pub fn is_liked_by(&self, viewer: &Identity) -> bool {
        self.likes.contains(viewer)
    }

    pub fn like_count(&self) -> usize {
        self.likes.len()
    }

    /// Name shown in the post header, falling back to the author's email.
    pub fn display_name(&self) -> &str {
        self.author_display_name
            .as_deref()
            .unwrap_or(self.author.as_str())
    }
}

/// Feed order: newest first, ties broken by ascending id.
pub fn feed_order(a: &Post, b: &Post) -> Ordering {
    b.created_at
        .cmp(&a.created_at)
        .then_with(|| a.id.cmp(&b.id))
}

/// Post document as stored in the `posts` collection.
///
/// Every field is optional so that partially written or legacy documents
/// still deserialize; [`Post::try_from`] decides what is required.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostDocument {
    #[serde(alias = "_firestore_id", default, skip_serializing)]
    pub id: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub author_display_name: Option<String>,
    #[serde(default)]
    pub author_photo_ref: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub photo_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_label: Option<String>,
    #[serde(default)]
    pub likes: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl TryFrom<PostDocument> for Post {
    type Error = AppError;

    fn try_from(doc: PostDocument) -> Result<Self, Self::Error> {
        let id = non_empty(doc.id).ok_or_else(|| AppError::Mapping {
            id: "<unknown>".to_string(),
            reason: "missing document id".to_string(),
        })?;
        let missing = |field: &str| AppError::Mapping {
            id: id.clone(),
            reason: format!("missing {field}"),
        };

        let author = non_empty(doc.author).ok_or_else(|| missing("author"))?;
        let description = non_empty(doc.description).ok_or_else(|| missing("description"))?;
        let photo_ref = non_empty(doc.photo_ref).ok_or_else(|| missing("photoRef"))?;
        // Server timestamp not yet resolved; not renderable in order
        let created_at = doc.created_at.ok_or_else(|| missing("createdAt"))?;

        let likes = doc
            .likes
            .unwrap_or_default()
            .iter()
            .filter(|l| !l.trim().is_empty())
            .map(Identity::new)
            .collect();

        Ok(Post {
            id: PostId::new(id),
            author: Identity::new(author),
            author_display_name: non_empty(doc.author_display_name),
            author_photo_ref: non_empty(doc.author_photo_ref),
            description,
            photo_ref,
            location_label: non_empty(doc.location_label),
            likes,
            created_at,
        })
    }
}

/// Map a batch of documents, skipping (and logging) malformed ones.
pub fn map_documents(docs: Vec<PostDocument>) -> Vec<Post> {
    docs.into_iter()
        .filter_map(|doc| match Post::try_from(doc) {
            Ok(post) => Some(post),
            Err(e) => {
                tracing::warn!(error = %e, "Skipping malformed post document");
                None
            }
        })
        .collect()
}

/// User input for a new post.
#[derive(Debug, Clone, Default, Validate)]
pub struct PostDraft {
    #[validate(custom(function = not_blank))]
    pub description: String,
    #[validate(length(min = 1, message = "A photo is required to publish"))]
    pub photo_ref: String,
    pub location_label: Option<String>,
}

fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("blank")
            .with_message(Cow::Borrowed("A description is required")));
    }
    Ok(())
}
