// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Feed reconciliation: authoritative snapshots merged with local
//! optimistic mutations.
//!
//! The engine keeps three things:
//! - `base`: the last snapshot delivered by the subscription
//! - `pending`: one overlay per post with an unconfirmed local mutation
//! - `visible`: what observers see, always sorted by [`feed_order`]
//!
//! A snapshot rebuilds `visible` as `reconcile(base, pending)`. Overlays win
//! over the snapshot unless the snapshot no longer contains the post, in
//! which case the overlay is dropped along with the post.

use std::collections::{HashMap, HashSet};

use crate::error::{AppError, Result};
use crate::models::{feed_order, Identity, Post, PostId};

/// Local mutation applied ahead of remote confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingMutation {
    /// `identity`'s membership in `likes` is forced to `liked`.
    Like { identity: Identity, liked: bool },
    /// The post is hidden.
    Delete,
}

impl PendingMutation {
    /// Apply this overlay to an authoritative record.
    fn overlay(&self, mut post: Post) -> Option<Post> {
        match self {
            PendingMutation::Like { identity, liked } => {
                if *liked {
                    post.likes.insert(identity.clone());
                } else {
                    post.likes.remove(identity);
                }
                Some(post)
            }
            PendingMutation::Delete => None,
        }
    }
}

/// Result of merging a snapshot with the pending overlays.
#[derive(Debug, Default)]
pub struct Reconciled {
    pub visible: Vec<Post>,
    /// Pending ids absent from the snapshot (deleted remotely).
    pub vanished: Vec<PostId>,
}

/// Merge an authoritative snapshot with pending overlays.
pub fn reconcile(base: &[Post], pending: &HashMap<PostId, PendingMutation>) -> Reconciled {
    let mut visible: Vec<Post> = base
        .iter()
        .filter_map(|post| match pending.get(&post.id) {
            Some(mutation) => mutation.overlay(post.clone()),
            None => Some(post.clone()),
        })
        .collect();
    visible.sort_by(feed_order);

    let mut vanished: Vec<PostId> = pending
        .keys()
        .filter(|id| !base.iter().any(|post| &post.id == *id))
        .cloned()
        .collect();
    vanished.sort();

    Reconciled { visible, vanished }
}

/// Client-side view of the global feed.
#[derive(Debug, Default)]
pub struct FeedEngine {
    base: Vec<Post>,
    visible: Vec<Post>,
    pending: HashMap<PostId, PendingMutation>,
}

impl FeedEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adopt a new authoritative snapshot.
    pub fn apply_snapshot(&mut self, posts: Vec<Post>) {
        let mut seen = HashSet::with_capacity(posts.len());
        let mut base = Vec::with_capacity(posts.len());
        for post in posts {
            if !seen.insert(post.id.clone()) {
                tracing::warn!(post_id = %post.id, "Duplicate post in snapshot ignored");
                continue;
            }
            base.push(post);
        }
        base.sort_by(feed_order);
        self.base = base;

        let Reconciled { visible, vanished } = reconcile(&self.base, &self.pending);
        for id in vanished {
            tracing::debug!(post_id = %id, "Pending post deleted remotely");
            self.pending.remove(&id);
        }
        self.visible = visible;
    }

    /// Toggle `identity`'s like on a visible post. Returns the new membership.
    pub fn apply_optimistic_like(&mut self, post_id: &PostId, identity: &Identity) -> Result<bool> {
        let post = self
            .visible
            .iter_mut()
            .find(|p| &p.id == post_id)
            .ok_or_else(|| AppError::NotInFeed(post_id.clone()))?;

        let liked = if post.likes.remove(identity) {
            false
        } else {
            post.likes.insert(identity.clone());
            true
        };

        self.pending.insert(
            post_id.clone(),
            PendingMutation::Like {
                identity: identity.clone(),
                liked,
            },
        );
        Ok(liked)
    }

    /// Hide a visible post. Returns the removed record.
    pub fn apply_optimistic_delete(&mut self, post_id: &PostId) -> Result<Post> {
        let index = self
            .visible
            .iter()
            .position(|p| &p.id == post_id)
            .ok_or_else(|| AppError::NotInFeed(post_id.clone()))?;

        let removed = self.visible.remove(index);
        self.pending
            .insert(post_id.clone(), PendingMutation::Delete);
        Ok(removed)
    }

    /// The remote mutation was confirmed; the next snapshot is taken as is.
    ///
    /// Visible state is left alone so a snapshot that predates the write
    /// cannot be shown in between.
    pub fn clear_pending(&mut self, post_id: &PostId) -> bool {
        self.pending.remove(post_id).is_some()
    }

    /// The remote mutation failed: drop the overlay and restore the
    /// pre-mutation record at its sorted position.
    ///
    /// Returns `false` if nothing was pending (e.g. the post was deleted
    /// remotely meanwhile), in which case nothing is restored.
    pub fn rollback(&mut self, post_id: &PostId, prior: &Post) -> bool {
        if self.pending.remove(post_id).is_none() {
            return false;
        }

        // The authoritative record never contains the failed mutation
        let restored = self
            .base
            .iter()
            .find(|p| &p.id == post_id)
            .cloned()
            .unwrap_or_else(|| prior.clone());

        self.visible.retain(|p| &p.id != post_id);
        let index = self
            .visible
            .binary_search_by(|p| feed_order(p, &restored))
            .unwrap_or_else(|i| i);
        self.visible.insert(index, restored);
        true
    }

    /// Discard all state.
    pub fn clear(&mut self) {
        self.base.clear();
        self.visible.clear();
        self.pending.clear();
    }

    /// Visible posts, newest first.
    pub fn posts(&self) -> &[Post] {
        &self.visible
    }

    pub fn post(&self, post_id: &PostId) -> Option<&Post> {
        self.visible.iter().find(|p| &p.id == post_id)
    }

    pub fn is_pending(&self, post_id: &PostId) -> bool {
        self.pending.contains_key(post_id)
    }

    pub fn pending(&self, post_id: &PostId) -> Option<&PendingMutation> {
        self.pending.get(post_id)
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn pending_ids(&self) -> impl Iterator<Item = &PostId> {
        self.pending.keys()
    }
}
