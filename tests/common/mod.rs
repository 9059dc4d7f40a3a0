// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use chrono::{TimeZone, Utc};
use fitfeed::db::{collections, CollectionRef, FirestoreDb, InMemoryDb};
use fitfeed::error::{AppError, Result};
use fitfeed::feed::FeedView;
use fitfeed::models::{Identity, PostDocument};
use fitfeed::services::{CredentialIssuer, Credentials};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;

/// Check if emulator is available via environment variable.
#[allow(dead_code)]
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("⚠️  Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// Create a test database connection.
#[allow(dead_code)]
pub async fn test_db() -> FirestoreDb {
    FirestoreDb::new("test-project", Duration::from_millis(50))
        .await
        .expect("Failed to connect to Firestore emulator")
}

/// Create a mock database connection (offline).
#[allow(dead_code)]
pub fn test_db_offline() -> FirestoreDb {
    FirestoreDb::new_mock()
}

/// Write a post straight into the store, as another client would.
#[allow(dead_code)]
pub fn seed_post(db: &InMemoryDb, id: &str, author: &str, created_secs: i64, likes: &[&str]) {
    let doc = PostDocument {
        id: None,
        author: Some(author.to_string()),
        author_display_name: Some("Tester".to_string()),
        author_photo_ref: None,
        description: Some(format!("Workout {id}")),
        photo_ref: Some(format!("file:///{id}.jpg")),
        location_label: None,
        likes: Some(likes.iter().map(|l| l.to_string()).collect()),
        created_at: Some(Utc.timestamp_opt(1_700_000_000 + created_secs, 0).unwrap()),
    };
    db.put_document(&CollectionRef::root(collections::POSTS), id, &doc)
        .expect("Failed to seed post");
}

/// Ids of the visible posts, in order.
#[allow(dead_code)]
pub fn ids(view: &FeedView) -> Vec<String> {
    view.posts.iter().map(|p| p.id.to_string()).collect()
}

/// Yield until `condition` holds (bounded).
#[allow(dead_code)]
pub async fn settle_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..1000 {
        if condition() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition not reached");
}

/// In-process credential issuer with a fixed account table.
#[allow(dead_code)]
pub struct FakeIssuer {
    accounts: Mutex<HashMap<Identity, String>>,
    identity: watch::Sender<Option<Identity>>,
}

#[allow(dead_code)]
impl FakeIssuer {
    pub fn new() -> Arc<Self> {
        let (identity, _) = watch::channel(None);
        Arc::new(Self {
            accounts: Mutex::new(HashMap::new()),
            identity,
        })
    }

    pub fn with_account(self: Arc<Self>, email: &str, password: &str) -> Arc<Self> {
        self.accounts
            .lock()
            .unwrap()
            .insert(Identity::new(email), password.to_string());
        self
    }

    pub fn account_count(&self) -> usize {
        self.accounts.lock().unwrap().len()
    }
}

impl CredentialIssuer for FakeIssuer {
    async fn sign_in(&self, credentials: &Credentials) -> Result<Identity> {
        credentials.check()?;
        let identity = Identity::new(&credentials.email);
        let known = self.accounts.lock().unwrap().get(&identity).cloned();
        if known.as_deref() != Some(credentials.password.as_str()) {
            return Err(AppError::Auth("Incorrect email or password.".to_string()));
        }
        self.identity.send_replace(Some(identity.clone()));
        Ok(identity)
    }

    async fn sign_up(&self, credentials: &Credentials) -> Result<Identity> {
        credentials.check()?;
        let identity = Identity::new(&credentials.email);
        {
            let mut accounts = self.accounts.lock().unwrap();
            if accounts.contains_key(&identity) {
                return Err(AppError::Auth(
                    "An account with this email already exists.".to_string(),
                ));
            }
            accounts.insert(identity.clone(), credentials.password.clone());
        }
        self.identity.send_replace(Some(identity.clone()));
        Ok(identity)
    }

    async fn send_password_reset(&self, _email: &str) -> Result<()> {
        Ok(())
    }

    fn sign_out(&self) {
        self.identity.send_replace(None);
    }

    fn identity(&self) -> watch::Receiver<Option<Identity>> {
        self.identity.subscribe()
    }
}
