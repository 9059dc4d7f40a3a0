// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Per-session owner of the feed engine.
//!
//! All feed mutations go through [`FeedStore::update`], which runs them one
//! at a time and publishes the resulting [`FeedView`] to observers. Once the
//! session is closed every update is refused, so a remote mutation that
//! settles after sign-out cannot touch state belonging to a new session.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;

use crate::feed::FeedEngine;
use crate::models::{Post, PostId};

/// Immutable view of the feed published after every change.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedView {
    /// Visible posts, newest first
    pub posts: Vec<Post>,
    /// Posts with an unconfirmed local mutation
    pub pending: BTreeSet<PostId>,
}

impl FeedView {
    fn of(engine: &FeedEngine) -> Self {
        Self {
            posts: engine.posts().to_vec(),
            pending: engine.pending_ids().cloned().collect(),
        }
    }
}

struct Guarded {
    engine: FeedEngine,
    live: bool,
}

/// Single writer of one session's feed state.
pub struct FeedStore {
    session: u64,
    inner: Mutex<Guarded>,
    view: watch::Sender<Arc<FeedView>>,
}

impl FeedStore {
    /// `session` identifies the owning session in logs.
    pub fn new(session: u64) -> Self {
        let (view, _) = watch::channel(Arc::new(FeedView::default()));
        Self {
            session,
            inner: Mutex::new(Guarded {
                engine: FeedEngine::new(),
                live: true,
            }),
            view,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Guarded> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn session(&self) -> u64 {
        self.session
    }

    pub fn is_live(&self) -> bool {
        self.lock().live
    }

    /// Run a mutation against the engine and publish the new view.
    ///
    /// Returns `None` without running `f` if the store has been closed.
    pub fn update<R>(&self, f: impl FnOnce(&mut FeedEngine) -> R) -> Option<R> {
        let mut guard = self.lock();
        if !guard.live {
            tracing::debug!(session = self.session, "Ignoring update to closed feed");
            return None;
        }

        let result = f(&mut guard.engine);
        self.view
            .send_replace(Arc::new(FeedView::of(&guard.engine)));
        Some(result)
    }

    /// Read the engine state.
    pub fn read<R>(&self, f: impl FnOnce(&FeedEngine) -> R) -> R {
        f(&self.lock().engine)
    }

    /// Adopt a subscription snapshot. Returns `false` if the store is closed.
    pub fn apply_snapshot(&self, posts: Vec<Post>) -> bool {
        let count = posts.len();
        let applied = self
            .update(|engine| engine.apply_snapshot(posts))
            .is_some();
        if applied {
            tracing::debug!(session = self.session, count, "Feed snapshot applied");
        }
        applied
    }

    /// Current view.
    pub fn view(&self) -> Arc<FeedView> {
        self.view.borrow().clone()
    }

    /// Observe view changes.
    pub fn watch(&self) -> watch::Receiver<Arc<FeedView>> {
        self.view.subscribe()
    }

    /// Refuse further updates and discard all feed and pending state.
    pub fn close(&self) {
        let mut guard = self.lock();
        if !guard.live {
            return;
        }
        guard.live = false;
        guard.engine.clear();
        self.view.send_replace(Arc::new(FeedView::default()));
        tracing::debug!(session = self.session, "Feed closed");
    }
}
