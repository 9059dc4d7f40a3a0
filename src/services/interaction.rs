// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Like-toggle and delete coordination.
//!
//! Each action is applied to the feed optimistically, sent to the remote
//! collection, then either confirmed (`clear_pending`) or undone
//! (`rollback`). At most one mutation per `(post, action)` is in flight;
//! a second request while one is outstanding is rejected as busy. Failed
//! mutations are never retried automatically.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use crate::db::{collections, fields, CollectionGateway, CollectionRef, Patch};
use crate::error::{AppError, Result};
use crate::feed::{FeedEngine, FeedStore, PendingMutation};
use crate::models::{Identity, Post, PostId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    Like,
    Delete,
}

/// Outcome of a delete request that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    /// The user declined the confirmation prompt.
    Cancelled,
}

/// Marks a `(post, action)` pair in flight until dropped.
struct InFlightGuard<'a> {
    in_flight: &'a DashMap<(PostId, ActionKind), Instant>,
    key: (PostId, ActionKind),
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if let Some((_, started)) = self.in_flight.remove(&self.key) {
            tracing::trace!(
                post_id = %self.key.0,
                action = ?self.key.1,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Mutation settled"
            );
        }
    }
}

/// Serializes one session's interactions with the posts collection.
pub struct InteractionCoordinator<G> {
    gateway: Arc<G>,
    feed: Arc<FeedStore>,
    in_flight: DashMap<(PostId, ActionKind), Instant>,
}

impl<G: CollectionGateway> InteractionCoordinator<G> {
    pub fn new(gateway: Arc<G>, feed: Arc<FeedStore>) -> Self {
        Self {
            gateway,
            feed,
            in_flight: DashMap::new(),
        }
    }

    pub fn feed(&self) -> &Arc<FeedStore> {
        &self.feed
    }

    /// Whether a mutation of `kind` is outstanding for `post_id`.
    pub fn is_in_flight(&self, post_id: &PostId, kind: ActionKind) -> bool {
        self.in_flight.contains_key(&(post_id.clone(), kind))
    }

    fn begin(&self, post_id: &PostId, kind: ActionKind) -> Result<InFlightGuard<'_>> {
        let key = (post_id.clone(), kind);
        match self.in_flight.entry(key.clone()) {
            Entry::Occupied(_) => {
                tracing::debug!(post_id = %post_id, action = ?kind, "Rejected: mutation in flight");
                Err(AppError::Busy)
            }
            Entry::Vacant(slot) => {
                slot.insert(Instant::now());
                Ok(InFlightGuard {
                    in_flight: &self.in_flight,
                    key,
                })
            }
        }
    }

    /// Toggle `identity`'s like on a post. Returns the new membership.
    pub async fn toggle_like(&self, post_id: &PostId, identity: &Identity) -> Result<bool> {
        let _guard = self.begin(post_id, ActionKind::Like)?;

        let (prior, liked) = self
            .feed
            .update(|engine| {
                let prior = engine
                    .post(post_id)
                    .cloned()
                    .ok_or_else(|| AppError::NotInFeed(post_id.clone()))?;
                let liked = engine.apply_optimistic_like(post_id, identity)?;
                Ok::<_, AppError>((prior, liked))
            })
            .unwrap_or_else(|| Err(AppError::NotInFeed(post_id.clone())))?;

        let patch = if liked {
            Patch::ArrayUnion {
                field: fields::LIKES,
                value: identity.to_string(),
            }
        } else {
            Patch::ArrayRemove {
                field: fields::LIKES,
                value: identity.to_string(),
            }
        };

        let posts = CollectionRef::root(collections::POSTS);
        match self.gateway.update(&posts, post_id.as_str(), patch).await {
            Ok(()) => {
                let settled = self.feed.update(|engine| {
                    is_like_pending(engine, post_id) && engine.clear_pending(post_id)
                });
                if settled.is_none() {
                    tracing::debug!(post_id = %post_id, "Like confirmed after session ended");
                }
                tracing::info!(post_id = %post_id, liked, "Like updated");
                Ok(liked)
            }
            Err(e) => {
                tracing::warn!(post_id = %post_id, error = %e, "Like update failed, rolling back");
                // A delete issued meanwhile owns the overlay now
                self.feed.update(|engine| {
                    is_like_pending(engine, post_id) && engine.rollback(post_id, &prior)
                });
                Err(remote_failure(e))
            }
        }
    }

    /// Delete a post on behalf of its author.
    ///
    /// `confirm` is the yes/no decision point shown to the user; it is only
    /// asked once the requester is known to be the author.
    pub async fn delete_post<F, Fut>(
        &self,
        post_id: &PostId,
        requester: &Identity,
        confirm: F,
    ) -> Result<DeleteOutcome>
    where
        F: FnOnce(Post) -> Fut,
        Fut: Future<Output = bool>,
    {
        let post = self
            .feed
            .read(|engine| engine.post(post_id).cloned())
            .ok_or_else(|| AppError::NotInFeed(post_id.clone()))?;

        if &post.author != requester {
            tracing::warn!(
                post_id = %post_id,
                requester = %requester,
                "Delete rejected: requester is not the author"
            );
            return Err(AppError::Forbidden(
                "Only the author can delete this post".to_string(),
            ));
        }

        if !confirm(post).await {
            tracing::debug!(post_id = %post_id, "Delete cancelled by user");
            return Ok(DeleteOutcome::Cancelled);
        }

        let _guard = self.begin(post_id, ActionKind::Delete)?;

        let removed = self
            .feed
            .update(|engine| engine.apply_optimistic_delete(post_id))
            .unwrap_or_else(|| Err(AppError::NotInFeed(post_id.clone())))?;

        let posts = CollectionRef::root(collections::POSTS);
        match self.gateway.delete(&posts, post_id.as_str()).await {
            Ok(()) => {
                self.feed.update(|engine| engine.clear_pending(post_id));
                tracing::info!(post_id = %post_id, "Post deleted");
                Ok(DeleteOutcome::Deleted)
            }
            Err(e) => {
                tracing::warn!(post_id = %post_id, error = %e, "Delete failed, restoring post");
                self.feed.update(|engine| engine.rollback(post_id, &removed));
                Err(remote_failure(e))
            }
        }
    }
}

fn is_like_pending(engine: &FeedEngine, post_id: &PostId) -> bool {
    matches!(engine.pending(post_id), Some(PendingMutation::Like { .. }))
}

fn remote_failure(error: AppError) -> AppError {
    match error {
        AppError::Remote(_) => error,
        other => AppError::Remote(other.to_string()),
    }
}
