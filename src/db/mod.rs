//! Remote document collection layer (Firestore, plus an in-process store).
//!
//! Everything above this module talks to a [`CollectionGateway`]: point and
//! ordered queries, inserts with a server-assigned timestamp, patches,
//! deletes, and subscriptions that deliver the full result set on change.

pub mod firestore;
pub mod memory;

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{AppError, Result};

pub use self::firestore::FirestoreDb;
pub use memory::InMemoryDb;

/// Collection names as constants.
pub mod collections {
    pub const POSTS: &str = "posts";
    pub const USERS: &str = "users";
    pub const CHATS: &str = "chats";
    /// Subcollection of each chat document
    pub const MESSAGES: &str = "messages";
}

/// Document field names used in queries and patches.
pub mod fields {
    pub const AUTHOR: &str = "author";
    pub const LIKES: &str = "likes";
    pub const CREATED_AT: &str = "createdAt";
    pub const EMAIL: &str = "email";
    pub const MEMBERS: &str = "members";
    pub const CHAT_KEY: &str = "chatKey";
    pub const TIMESTAMP: &str = "timestamp";
}

/// A top-level collection or a subcollection of one document.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CollectionRef {
    pub name: &'static str,
    /// `(parent collection, parent document id)`
    pub parent: Option<(&'static str, String)>,
}

impl CollectionRef {
    pub fn root(name: &'static str) -> Self {
        Self { name, parent: None }
    }

    pub fn child(parent: &'static str, parent_id: impl Into<String>, name: &'static str) -> Self {
        Self {
            name,
            parent: Some((parent, parent_id.into())),
        }
    }

    /// Slash-separated path relative to the database root.
    pub fn path(&self) -> String {
        match &self.parent {
            Some((parent, id)) => format!("{parent}/{id}/{}", self.name),
            None => self.name.to_string(),
        }
    }
}

impl From<&'static str> for CollectionRef {
    fn from(name: &'static str) -> Self {
        Self::root(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    Eq(&'static str, String),
    ArrayContains(&'static str, String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

/// Equality filters, an optional ordering and an optional limit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    pub filters: Vec<Filter>,
    pub order: Option<(&'static str, Direction)>,
    pub limit: Option<u32>,
}

impl Query {
    /// Unfiltered query over the whole collection.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn eq(mut self, field: &'static str, value: impl Into<String>) -> Self {
        self.filters.push(Filter::Eq(field, value.into()));
        self
    }

    pub fn array_contains(mut self, field: &'static str, value: impl Into<String>) -> Self {
        self.filters.push(Filter::ArrayContains(field, value.into()));
        self
    }

    pub fn order_by(mut self, field: &'static str, direction: Direction) -> Self {
        self.order = Some((field, direction));
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Partial document update.
#[derive(Debug, Clone, PartialEq)]
pub enum Patch {
    /// Overwrite the given top-level fields.
    Set(serde_json::Map<String, serde_json::Value>),
    /// Add `value` to an array field unless already present.
    ArrayUnion { field: &'static str, value: String },
    /// Remove every occurrence of `value` from an array field.
    ArrayRemove { field: &'static str, value: String },
}

impl Patch {
    /// Build a `Set` patch from every field of a serializable struct.
    pub fn set_from<T: Serialize>(value: &T) -> Result<Self> {
        match serde_json::to_value(value).map_err(|e| AppError::Internal(e.into()))? {
            serde_json::Value::Object(map) => Ok(Patch::Set(map)),
            other => Err(AppError::Internal(anyhow::anyhow!(
                "patch must serialize to an object, got {other}"
            ))),
        }
    }
}

/// Callback receiving the full result set of a subscribed query.
pub type SnapshotHandler<T> = Arc<dyn Fn(Vec<T>) + Send + Sync>;

/// Owned handle to an open subscription.
///
/// Dropping (or cancelling) it stops delivery before returning; no snapshot
/// is handed to the callback afterwards.
pub struct Subscription {
    active: Arc<AtomicBool>,
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    /// `active` must be checked by the delivering side before each callback.
    pub fn new(active: Arc<AtomicBool>, release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            active,
            release: Some(Box::new(release)),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn cancel(self) {
        drop(self)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.active.store(false, Ordering::Release);
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}

/// Opaque access to a remote, multi-writer document collection.
pub trait CollectionGateway: Send + Sync + 'static {
    /// Run a one-shot query.
    fn query<T>(
        &self,
        collection: &CollectionRef,
        query: &Query,
    ) -> impl Future<Output = Result<Vec<T>>> + Send
    where
        T: DeserializeOwned + Send + 'static;

    /// Deliver the query's full result set now and after every change.
    fn subscribe<T>(
        &self,
        collection: CollectionRef,
        query: Query,
        on_snapshot: SnapshotHandler<T>,
    ) -> Result<Subscription>
    where
        T: DeserializeOwned + PartialEq + Clone + Send + Sync + 'static;

    /// Insert a new document; `stamp_field` is set to the server time.
    /// Returns the generated document id.
    fn insert<T>(
        &self,
        collection: &CollectionRef,
        document: &T,
        stamp_field: &'static str,
    ) -> impl Future<Output = Result<String>> + Send
    where
        T: Serialize + Sync;

    fn update(
        &self,
        collection: &CollectionRef,
        id: &str,
        patch: Patch,
    ) -> impl Future<Output = Result<()>> + Send;

    fn delete(&self, collection: &CollectionRef, id: &str)
        -> impl Future<Output = Result<()>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_collection_paths() {
        assert_eq!(CollectionRef::root(collections::POSTS).path(), "posts");
        assert_eq!(
            CollectionRef::child(collections::CHATS, "c1", collections::MESSAGES).path(),
            "chats/c1/messages"
        );
    }

    #[test]
    fn test_subscription_drop_releases_once() {
        let active = Arc::new(AtomicBool::new(true));
        let released = Arc::new(AtomicUsize::new(0));
        let counter = released.clone();

        let sub = Subscription::new(active.clone(), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert!(sub.is_active());
        sub.cancel();

        assert!(!active.load(Ordering::SeqCst));
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_patch_set_from_struct() {
        #[derive(Serialize)]
        struct Fields {
            name: &'static str,
        }

        let patch = Patch::set_from(&Fields { name: "Ana" }).unwrap();
        let Patch::Set(map) = patch else {
            panic!("expected Set patch");
        };
        assert_eq!(map["name"], "Ana");
    }
}
