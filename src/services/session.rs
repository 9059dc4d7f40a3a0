// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Session boundary: ties the feed's lifetime to the signed-in identity.
//!
//! Signing in opens a fresh [`FeedStore`], subscribes it to the global feed
//! and builds the session's [`InteractionCoordinator`]. Signing out (or
//! switching identity) closes the store before dropping the subscription,
//! so neither a late snapshot nor a late mutation settlement can reach the
//! next session's state.

use std::sync::Arc;
use tokio::sync::watch;

use crate::db::{
    collections, fields, CollectionGateway, CollectionRef, Direction, Query, SnapshotHandler,
    Subscription,
};
use crate::error::Result;
use crate::feed::FeedStore;
use crate::models::post::map_documents;
use crate::models::{Identity, PostDocument};
use crate::services::InteractionCoordinator;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    Authenticated(Identity),
}

struct ActiveSession<G> {
    identity: Identity,
    feed: Arc<FeedStore>,
    coordinator: Arc<InteractionCoordinator<G>>,
    subscription: Subscription,
}

/// Owns the per-session feed, subscription and coordinator.
pub struct SessionBoundary<G> {
    gateway: Arc<G>,
    feed_limit: u32,
    active: Option<ActiveSession<G>>,
    sessions_opened: u64,
}

/// The global feed: newest posts first, bounded.
pub fn feed_query(limit: u32) -> Query {
    Query::all()
        .order_by(fields::CREATED_AT, Direction::Descending)
        .limit(limit)
}

impl<G: CollectionGateway> SessionBoundary<G> {
    pub fn new(gateway: Arc<G>, feed_limit: u32) -> Self {
        Self {
            gateway,
            feed_limit,
            active: None,
            sessions_opened: 0,
        }
    }

    pub fn state(&self) -> SessionState {
        match &self.active {
            Some(session) => SessionState::Authenticated(session.identity.clone()),
            None => SessionState::Unauthenticated,
        }
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.active.as_ref().map(|s| &s.identity)
    }

    /// Feed of the current session, if authenticated.
    pub fn feed(&self) -> Option<Arc<FeedStore>> {
        self.active.as_ref().map(|s| s.feed.clone())
    }

    pub fn coordinator(&self) -> Option<Arc<InteractionCoordinator<G>>> {
        self.active.as_ref().map(|s| s.coordinator.clone())
    }

    /// Number of sessions opened so far; also the id of the latest one.
    pub fn sessions_opened(&self) -> u64 {
        self.sessions_opened
    }

    /// React to an identity signal from the credential issuer.
    ///
    /// Re-signalling the current identity is a no-op. A different identity
    /// tears the current session down before the new one is opened.
    pub fn on_identity_changed(&mut self, identity: Option<Identity>) -> Result<()> {
        if self.identity() == identity.as_ref() {
            return Ok(());
        }

        self.teardown();

        match identity {
            Some(identity) => self.open(identity),
            None => Ok(()),
        }
    }

    fn open(&mut self, identity: Identity) -> Result<()> {
        let session = self.sessions_opened + 1;
        let feed = Arc::new(FeedStore::new(session));

        // The subscription must not keep the store alive after teardown
        let weak_feed = Arc::downgrade(&feed);
        let on_snapshot: SnapshotHandler<PostDocument> = Arc::new(move |docs| {
            if let Some(feed) = weak_feed.upgrade() {
                feed.apply_snapshot(map_documents(docs));
            }
        });

        let subscription = match self.gateway.subscribe(
            CollectionRef::root(collections::POSTS),
            feed_query(self.feed_limit),
            on_snapshot,
        ) {
            Ok(subscription) => subscription,
            Err(e) => {
                feed.close();
                tracing::error!(identity = %identity, error = %e, "Failed to subscribe to feed");
                return Err(e);
            }
        };

        let coordinator = Arc::new(InteractionCoordinator::new(
            self.gateway.clone(),
            feed.clone(),
        ));

        self.sessions_opened = session;
        tracing::info!(identity = %identity, session, "Session opened");

        self.active = Some(ActiveSession {
            identity,
            feed,
            coordinator,
            subscription,
        });
        Ok(())
    }

    /// Close the current session, if any.
    pub fn teardown(&mut self) {
        let Some(session) = self.active.take() else {
            return;
        };

        session.feed.close();
        session.subscription.cancel();
        tracing::info!(
            identity = %session.identity,
            session = session.feed.session(),
            "Session closed"
        );
    }

    /// Follow identity changes until the channel closes, then tear down.
    pub async fn follow(&mut self, mut identities: watch::Receiver<Option<Identity>>) {
        loop {
            let identity = identities.borrow_and_update().clone();
            if let Err(e) = self.on_identity_changed(identity) {
                tracing::warn!(error = %e, "Session transition failed");
            }

            if identities.changed().await.is_err() {
                break;
            }
        }

        self.teardown();
    }
}

impl<G> Drop for SessionBoundary<G> {
    fn drop(&mut self) {
        if let Some(session) = self.active.take() {
            session.feed.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{FirestoreDb, InMemoryDb};
    use crate::error::AppError;
    use chrono::{TimeZone, Utc};

    fn seed(db: &InMemoryDb, id: &str, created: i64) {
        let doc = PostDocument {
            author: Some("a@x.com".to_string()),
            description: Some("Run".to_string()),
            photo_ref: Some("file:///run.jpg".to_string()),
            created_at: Some(Utc.timestamp_opt(1_700_000_000 + created, 0).unwrap()),
            ..Default::default()
        };
        db.put_document(&CollectionRef::root(collections::POSTS), id, &doc)
            .unwrap();
    }

    #[test]
    fn test_sign_in_opens_feed() {
        let db = Arc::new(InMemoryDb::new());
        seed(&db, "p1", 1);
        seed(&db, "p2", 2);
        let mut session = SessionBoundary::new(db.clone(), 50);

        session
            .on_identity_changed(Some(Identity::new("a@x.com")))
            .unwrap();

        assert_eq!(
            session.state(),
            SessionState::Authenticated(Identity::new("a@x.com"))
        );
        let ids: Vec<String> = session
            .feed()
            .unwrap()
            .view()
            .posts
            .iter()
            .map(|p| p.id.to_string())
            .collect();
        assert_eq!(ids, vec!["p2", "p1"]);
        assert_eq!(db.listener_count(), 1);
    }

    #[test]
    fn test_same_identity_is_noop() {
        let db = Arc::new(InMemoryDb::new());
        let mut session = SessionBoundary::new(db.clone(), 50);

        session
            .on_identity_changed(Some(Identity::new("a@x.com")))
            .unwrap();
        session
            .on_identity_changed(Some(Identity::new("A@x.com")))
            .unwrap();

        assert_eq!(session.sessions_opened(), 1);
        assert_eq!(db.listener_count(), 1);
    }

    #[test]
    fn test_switch_identity_replaces_session() {
        let db = Arc::new(InMemoryDb::new());
        let mut session = SessionBoundary::new(db.clone(), 50);

        session
            .on_identity_changed(Some(Identity::new("a@x.com")))
            .unwrap();
        let first = session.feed().unwrap();
        session
            .on_identity_changed(Some(Identity::new("b@x.com")))
            .unwrap();

        assert!(!first.is_live());
        assert!(session.feed().unwrap().is_live());
        assert_eq!(session.sessions_opened(), 2);
        assert_eq!(db.listener_count(), 1);
    }

    #[test]
    fn test_sign_out_discards_state() {
        let db = Arc::new(InMemoryDb::new());
        seed(&db, "p1", 1);
        let mut session = SessionBoundary::new(db.clone(), 50);
        session
            .on_identity_changed(Some(Identity::new("a@x.com")))
            .unwrap();
        let feed = session.feed().unwrap();

        session.on_identity_changed(None).unwrap();

        assert_eq!(session.state(), SessionState::Unauthenticated);
        assert!(session.coordinator().is_none());
        assert!(!feed.is_live());
        assert!(feed.view().posts.is_empty());
        assert_eq!(db.listener_count(), 0);

        // Later writes do not reach the closed store
        seed(&db, "p2", 2);
        assert!(feed.view().posts.is_empty());
    }

    #[tokio::test]
    async fn test_subscribe_failure_stays_unauthenticated() {
        let db = Arc::new(FirestoreDb::new_mock());
        let mut session = SessionBoundary::new(db, 50);

        let result = session.on_identity_changed(Some(Identity::new("a@x.com")));

        assert!(matches!(result, Err(AppError::Database(_))));
        assert_eq!(session.state(), SessionState::Unauthenticated);
        assert_eq!(session.sessions_opened(), 0);
    }

    #[tokio::test]
    async fn test_follow_tracks_identity_channel() {
        let db = Arc::new(InMemoryDb::new());
        let (tx, rx) = watch::channel(None);
        let mut session = SessionBoundary::new(db.clone(), 50);

        let follower = tokio::spawn(async move {
            session.follow(rx).await;
            session
        });

        tx.send(Some(Identity::new("a@x.com"))).unwrap();
        tokio::task::yield_now().await;
        drop(tx);

        let session = follower.await.unwrap();
        assert_eq!(session.state(), SessionState::Unauthenticated);
        assert_eq!(db.listener_count(), 0);
    }
}
