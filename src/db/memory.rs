// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-process collection store.
//!
//! Behaves like the remote collection for the client code: documents get
//! generated ids and a monotonic server timestamp, and subscribers receive
//! the full result set immediately and after every write to the collection.
//! Writes can be paused or made to fail, which is how tests hold a mutation
//! in flight or simulate a backend outage.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::cmp::Ordering as CmpOrdering;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::watch;

use crate::db::{
    CollectionGateway, CollectionRef, Direction, Filter, Patch, Query, SnapshotHandler,
    Subscription,
};
use crate::error::{AppError, Result};
use crate::time_utils::format_server_timestamp;

/// Field carrying the document id into deserialized records.
const DOCUMENT_ID_FIELD: &str = "_firestore_id";

type Document = Map<String, Value>;
type RawListener = Arc<dyn Fn(Vec<Value>) + Send + Sync>;

struct Listener {
    id: u64,
    path: String,
    query: Query,
    deliver: RawListener,
    /// Revision of the last snapshot handed to `deliver`.
    delivered: Arc<Mutex<u64>>,
}

/// One snapshot bound for one listener.
struct Delivery {
    revision: u64,
    snapshot: Vec<Value>,
    deliver: RawListener,
    delivered: Arc<Mutex<u64>>,
}

impl Delivery {
    /// Hand the snapshot over unless a newer one already went out.
    ///
    /// The listener's lock is held while its callback runs, so a callback
    /// must not write to the collection it is subscribed to.
    fn send(self) {
        let mut delivered = lock(&self.delivered);
        if self.revision <= *delivered {
            return;
        }
        *delivered = self.revision;
        (self.deliver)(self.snapshot);
    }
}

#[derive(Default)]
struct State {
    /// collection path -> document id -> fields
    collections: HashMap<String, BTreeMap<String, Document>>,
    listeners: Vec<Listener>,
    next_document: u64,
    next_listener: u64,
    /// Bumped each time snapshots are taken.
    revision: u64,
    last_stamp: Option<DateTime<Utc>>,
}

struct Inner {
    state: Mutex<State>,
    fail_writes: AtomicBool,
    writes_paused: watch::Sender<bool>,
    writes: AtomicUsize,
}

/// Thread-safe in-memory document collections.
#[derive(Clone)]
pub struct InMemoryDb {
    inner: Arc<Inner>,
}

impl Default for InMemoryDb {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryDb {
    pub fn new() -> Self {
        let (writes_paused, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::default()),
                fail_writes: AtomicBool::new(false),
                writes_paused,
                writes: AtomicUsize::new(0),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        lock(&self.inner.state)
    }

    /// Make every subsequent client write fail until reset.
    pub fn fail_writes(&self, fail: bool) {
        self.inner.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Hold client writes in flight until [`resume_writes`](Self::resume_writes).
    pub fn pause_writes(&self) {
        self.inner.writes_paused.send_replace(true);
    }

    pub fn resume_writes(&self) {
        self.inner.writes_paused.send_replace(false);
    }

    /// Number of client writes that reached the store (including failed ones).
    pub fn write_count(&self) -> usize {
        self.inner.writes.load(Ordering::SeqCst)
    }

    /// Number of open subscriptions.
    pub fn listener_count(&self) -> usize {
        self.state().listeners.len()
    }

    /// Write a document directly, as another client would. Not subject to
    /// pausing or failure injection.
    pub fn put_document<T: Serialize>(
        &self,
        collection: &CollectionRef,
        id: &str,
        document: &T,
    ) -> Result<()> {
        let fields = to_document(document)?;
        let path = collection.path();
        self.state()
            .collections
            .entry(path.clone())
            .or_default()
            .insert(id.to_string(), fields);
        self.notify(&path);
        Ok(())
    }

    /// Delete a document directly, as another client would.
    pub fn remove_document(&self, collection: &CollectionRef, id: &str) -> bool {
        let path = collection.path();
        let removed = self
            .state()
            .collections
            .get_mut(&path)
            .and_then(|docs| docs.remove(id))
            .is_some();
        if removed {
            self.notify(&path);
        }
        removed
    }

    /// Raw fields of a stored document.
    pub fn document(&self, collection: &CollectionRef, id: &str) -> Option<Value> {
        self.state()
            .collections
            .get(&collection.path())
            .and_then(|docs| docs.get(id))
            .map(|fields| Value::Object(fields.clone()))
    }

    /// Gate shared by all client writes.
    async fn begin_write(&self) -> Result<()> {
        let mut paused = self.inner.writes_paused.subscribe();
        if paused.wait_for(|paused| !*paused).await.is_err() {
            return Err(AppError::Remote("store shut down".to_string()));
        }

        self.inner.writes.fetch_add(1, Ordering::SeqCst);
        if self.inner.fail_writes.load(Ordering::SeqCst) {
            return Err(AppError::Remote("injected write failure".to_string()));
        }
        Ok(())
    }

    /// Push the current result set to every listener on `path`.
    ///
    /// Snapshots are numbered under the store lock; a listener never
    /// receives one older than what it has already seen.
    fn notify(&self, path: &str) {
        let deliveries: Vec<Delivery> = {
            let mut state = self.state();
            state.revision += 1;
            let revision = state.revision;
            let docs = state.collections.get(path);
            let deliveries = state
                .listeners
                .iter()
                .filter(|l| l.path == path)
                .map(|l| Delivery {
                    revision,
                    snapshot: evaluate(docs, &l.query),
                    deliver: l.deliver.clone(),
                    delivered: l.delivered.clone(),
                })
                .collect();
            deliveries
        };

        // Callbacks run without the store lock so they may read from it
        for delivery in deliveries {
            delivery.send();
        }
    }

    fn next_stamp(state: &mut State) -> DateTime<Utc> {
        let now = Utc::now();
        let stamp = match state.last_stamp {
            Some(last) if now <= last => last + chrono::Duration::microseconds(1),
            _ => now,
        };
        state.last_stamp = Some(stamp);
        stamp
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn to_document<T: Serialize>(value: &T) -> Result<Document> {
    match serde_json::to_value(value).map_err(|e| AppError::Internal(e.into()))? {
        Value::Object(map) => Ok(map),
        other => Err(AppError::Internal(anyhow::anyhow!(
            "document must serialize to an object, got {other}"
        ))),
    }
}

fn matches(document: &Document, filter: &Filter) -> bool {
    match filter {
        Filter::Eq(field, expected) => {
            document.get(*field).and_then(Value::as_str) == Some(expected.as_str())
        }
        Filter::ArrayContains(field, expected) => document
            .get(*field)
            .and_then(Value::as_array)
            .is_some_and(|items| items.iter().any(|v| v.as_str() == Some(expected.as_str()))),
    }
}

/// Order values the way the remote store does for the types we write:
/// missing < numbers < strings (timestamps compared as instants).
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> CmpOrdering {
    match (a, b) {
        (None, None) => CmpOrdering::Equal,
        (None, Some(_)) => CmpOrdering::Less,
        (Some(_), None) => CmpOrdering::Greater,
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(CmpOrdering::Equal)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => {
            match (
                DateTime::parse_from_rfc3339(x),
                DateTime::parse_from_rfc3339(y),
            ) {
                (Ok(x), Ok(y)) => x.cmp(&y),
                _ => x.cmp(y),
            }
        }
        (Some(Value::Number(_)), Some(_)) => CmpOrdering::Less,
        (Some(_), Some(Value::Number(_))) => CmpOrdering::Greater,
        (Some(x), Some(y)) => x.to_string().cmp(&y.to_string()),
    }
}

/// Apply a query to one collection, returning documents tagged with their id.
fn evaluate(docs: Option<&BTreeMap<String, Document>>, query: &Query) -> Vec<Value> {
    let Some(docs) = docs else {
        return Vec::new();
    };

    let mut selected: Vec<(&String, &Document)> = docs
        .iter()
        .filter(|(_, doc)| query.filters.iter().all(|f| matches(doc, f)))
        .collect();

    if let Some((field, direction)) = query.order {
        // Ordered queries exclude documents lacking the order field
        selected.retain(|(_, doc)| doc.get(field).is_some_and(|v| !v.is_null()));
        selected.sort_by(|(a_id, a), (b_id, b)| {
            let ordering = compare_values(a.get(field), b.get(field)).then_with(|| a_id.cmp(b_id));
            match direction {
                Direction::Ascending => ordering,
                Direction::Descending => ordering.reverse(),
            }
        });
    }

    if let Some(limit) = query.limit {
        selected.truncate(limit as usize);
    }

    selected
        .into_iter()
        .map(|(id, doc)| {
            let mut fields = doc.clone();
            fields.insert(DOCUMENT_ID_FIELD.to_string(), Value::String(id.clone()));
            Value::Object(fields)
        })
        .collect()
}

fn decode<T: DeserializeOwned>(raw: Vec<Value>) -> Vec<T> {
    raw.into_iter()
        .filter_map(|value| match serde_json::from_value(value) {
            Ok(doc) => Some(doc),
            Err(e) => {
                tracing::warn!(error = %e, "Skipping undecodable document");
                None
            }
        })
        .collect()
}

impl CollectionGateway for InMemoryDb {
    async fn query<T>(&self, collection: &CollectionRef, query: &Query) -> Result<Vec<T>>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let raw = {
            let state = self.state();
            let raw = evaluate(state.collections.get(&collection.path()), query);
            raw
        };
        Ok(decode(raw))
    }

    fn subscribe<T>(
        &self,
        collection: CollectionRef,
        query: Query,
        on_snapshot: SnapshotHandler<T>,
    ) -> Result<Subscription>
    where
        T: DeserializeOwned + PartialEq + Clone + Send + Sync + 'static,
    {
        let active = Arc::new(AtomicBool::new(true));
        let listener_active = active.clone();
        let deliver: RawListener = Arc::new(move |raw: Vec<Value>| {
            if listener_active.load(Ordering::Acquire) {
                on_snapshot(decode(raw));
            }
        });

        let path = collection.path();
        let delivered = Arc::new(Mutex::new(0));
        let (id, initial) = {
            let mut state = self.state();
            let id = state.next_listener;
            state.next_listener += 1;
            state.revision += 1;
            let initial = Delivery {
                revision: state.revision,
                snapshot: evaluate(state.collections.get(&path), &query),
                deliver: deliver.clone(),
                delivered: delivered.clone(),
            };
            state.listeners.push(Listener {
                id,
                path: path.clone(),
                query,
                deliver,
                delivered,
            });
            (id, initial)
        };

        tracing::debug!(collection = %path, listener = id, "Subscription opened");
        initial.send();

        let store: Weak<Inner> = Arc::downgrade(&self.inner);
        Ok(Subscription::new(active, move || {
            if let Some(inner) = store.upgrade() {
                lock(&inner.state).listeners.retain(|l| l.id != id);
                tracing::debug!(listener = id, "Subscription closed");
            }
        }))
    }

    async fn insert<T>(
        &self,
        collection: &CollectionRef,
        document: &T,
        stamp_field: &'static str,
    ) -> Result<String>
    where
        T: Serialize + Sync,
    {
        let mut fields = to_document(document)?;
        self.begin_write().await?;

        let path = collection.path();
        let id = {
            let mut state = self.state();
            let stamp = Self::next_stamp(&mut state);
            fields.insert(
                stamp_field.to_string(),
                Value::String(format_server_timestamp(stamp)),
            );
            state.next_document += 1;
            let id = format!("doc{:06}", state.next_document);
            state
                .collections
                .entry(path.clone())
                .or_default()
                .insert(id.clone(), fields);
            id
        };

        self.notify(&path);
        Ok(id)
    }

    async fn update(&self, collection: &CollectionRef, id: &str, patch: Patch) -> Result<()> {
        self.begin_write().await?;

        let path = collection.path();
        {
            let mut state = self.state();
            let document = state
                .collections
                .get_mut(&path)
                .and_then(|docs| docs.get_mut(id))
                .ok_or_else(|| AppError::Remote(format!("No document to update: {path}/{id}")))?;

            match patch {
                Patch::Set(values) => document.extend(values),
                Patch::ArrayUnion { field, value } => {
                    let items = array_field(document, field);
                    if !items.iter().any(|v| v.as_str() == Some(value.as_str())) {
                        items.push(Value::String(value));
                    }
                }
                Patch::ArrayRemove { field, value } => {
                    array_field(document, field).retain(|v| v.as_str() != Some(value.as_str()));
                }
            }
        }

        self.notify(&path);
        Ok(())
    }

    async fn delete(&self, collection: &CollectionRef, id: &str) -> Result<()> {
        self.begin_write().await?;

        let path = collection.path();
        let removed = self
            .state()
            .collections
            .get_mut(&path)
            .and_then(|docs| docs.remove(id))
            .is_some();

        // Deleting a missing document succeeds, as it does remotely
        if removed {
            self.notify(&path);
        }
        Ok(())
    }
}

/// The array stored at `field`, created (or replaced if not an array).
fn array_field<'a>(document: &'a mut Document, field: &str) -> &'a mut Vec<Value> {
    let slot = document
        .entry(field.to_string())
        .or_insert_with(|| Value::Array(Vec::new()));
    if !slot.is_array() {
        *slot = Value::Array(Vec::new());
    }
    match slot {
        Value::Array(items) => items,
        _ => unreachable!("slot was just set to an array"),
    }
}
