// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore implementation of the collection gateway.
//!
//! Subscriptions are implemented by re-running the query on an interval and
//! delivering the result set whenever it differs from the last delivery.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::db::{
    CollectionGateway, CollectionRef, Direction, Filter, Patch, Query, SnapshotHandler,
    Subscription,
};
use crate::error::{AppError, Result};

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreDb {
    client: Option<firestore::FirestoreDb>,
    poll_interval: Duration,
}

impl FirestoreDb {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str, poll_interval: Duration) -> Result<Self> {
        // If the emulator environment variable is set, use unauthenticated connection
        // to avoid local credential warnings and leakage.
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id, poll_interval).await;
        }

        let client = firestore::FirestoreDb::new(project_id)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self {
            client: Some(client),
            poll_interval,
        })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str, poll_interval: Duration) -> Result<Self> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            AppError::Database(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(Self {
            client: Some(client),
            poll_interval,
        })
    }

    /// Create a mock Firestore client for testing (offline mode).
    ///
    /// All database operations will return an error if called.
    pub fn new_mock() -> Self {
        Self {
            client: None,
            poll_interval: Duration::from_secs(1),
        }
    }

    /// Helper to get the client or return an error if offline.
    fn get_client(&self) -> Result<&firestore::FirestoreDb> {
        self.client
            .as_ref()
            .ok_or_else(|| AppError::Database("Database not connected (offline mode)".to_string()))
    }

    /// Atomically add or remove one array element without reading the document.
    async fn transform_array(
        &self,
        collection: &CollectionRef,
        id: &str,
        field: &'static str,
        value: String,
        add: bool,
    ) -> Result<()> {
        let client = self.get_client()?;
        let parent = parent_path(client, collection);

        let mut transaction = client
            .begin_transaction()
            .await
            .map_err(|e| AppError::Remote(format!("Failed to begin transaction: {}", e)))?;

        client
            .fluent()
            .update()
            .in_col(collection.name)
            .precondition(firestore::FirestoreWritePrecondition::Exists(true))
            .document_id(id)
            .parent(&parent)
            .transforms(|t| {
                let element = t.field(field);
                t.fields([if add {
                    element.append_missing_elements([value.clone()])
                } else {
                    element.remove_all_from_array([value.clone()])
                }])
            })
            .only_transform()
            .add_to_transaction(&mut transaction)
            .map_err(|e| AppError::Remote(format!("Failed to add transform: {}", e)))?;

        transaction
            .commit()
            .await
            .map_err(|e| AppError::Remote(format!("Transaction commit failed: {}", e)))?;

        Ok(())
    }
}

/// Full parent path of a collection (the documents root for top-level ones).
fn parent_path(client: &firestore::FirestoreDb, collection: &CollectionRef) -> String {
    match &collection.parent {
        Some((parent, id)) => format!("{}/{}/{}", client.get_documents_path(), parent, id),
        None => client.get_documents_path().clone(),
    }
}

async fn run_query<T>(
    client: &firestore::FirestoreDb,
    collection: &CollectionRef,
    query: &Query,
) -> Result<Vec<T>>
where
    T: DeserializeOwned + Send + 'static,
{
    let mut select = client
        .fluent()
        .select()
        .from(collection.name)
        .parent(parent_path(client, collection));

    if !query.filters.is_empty() {
        let filters = query.filters.clone();
        select = select.filter(move |q| {
            q.for_all(filters.iter().map(|filter| match filter {
                Filter::Eq(field, value) => q.field(*field).eq(value.clone()),
                Filter::ArrayContains(field, value) => {
                    q.field(*field).array_contains(value.clone())
                }
            }))
        });
    }

    if let Some((field, direction)) = query.order {
        let direction = match direction {
            Direction::Ascending => firestore::FirestoreQueryDirection::Ascending,
            Direction::Descending => firestore::FirestoreQueryDirection::Descending,
        };
        select = select.order_by([(field, direction)]);
    }

    if let Some(limit) = query.limit {
        select = select.limit(limit);
    }

    select
        .obj::<T>()
        .query()
        .await
        .map_err(|e| AppError::Database(e.to_string()))
}

impl CollectionGateway for FirestoreDb {
    async fn query<T>(&self, collection: &CollectionRef, query: &Query) -> Result<Vec<T>>
    where
        T: DeserializeOwned + Send + 'static,
    {
        run_query(self.get_client()?, collection, query).await
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
        let client = self.get_client()?.clone();
        let active = Arc::new(AtomicBool::new(true));
        let poll_interval = self.poll_interval;

        let task_active = active.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(poll_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            let mut last: Option<Vec<T>> = None;

            loop {
                ticker.tick().await;
                if !task_active.load(Ordering::Acquire) {
                    break;
                }

                match run_query::<T>(&client, &collection, &query).await {
                    Ok(docs) => {
                        if last.as_ref() == Some(&docs) {
                            continue;
                        }
                        if !task_active.load(Ordering::Acquire) {
                            break;
                        }
                        tracing::debug!(
                            collection = %collection.path(),
                            count = docs.len(),
                            "Delivering snapshot"
                        );
                        on_snapshot(docs.clone());
                        last = Some(docs);
                    }
                    Err(e) => {
                        // Keep the last delivered state; the next tick retries
                        tracing::warn!(
                            collection = %collection.path(),
                            error = %e,
                            "Snapshot query failed"
                        );
                    }
                }
            }
        });

        Ok(Subscription::new(active, move || handle.abort()))
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
        let client = self.get_client()?;
        let parent = parent_path(client, collection);
        let fields = serde_json::to_value(document)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to encode document: {}", e)))?;
        let id = uuid::Uuid::new_v4().simple().to_string();

        // Fields and server stamp land in one write, or not at all
        let _: () = client
            .fluent()
            .update()
            .in_col(collection.name)
            .precondition(firestore::FirestoreWritePrecondition::Exists(false))
            .document_id(&id)
            .parent(&parent)
            .object(&fields)
            .transforms(|t| {
                t.fields([t
                    .field(stamp_field)
                    .server_value(firestore::FirestoreTransformServerValue::RequestTime)])
            })
            .execute()
            .await
            .map_err(|e| AppError::Remote(e.to_string()))?;

        tracing::debug!(collection = %collection.path(), id = %id, "Document inserted");
        Ok(id)
    }

    async fn update(&self, collection: &CollectionRef, id: &str, patch: Patch) -> Result<()> {
        let client = self.get_client()?;
        let parent = parent_path(client, collection);

        match patch {
            Patch::Set(values) => {
                let field_names: Vec<String> = values.keys().cloned().collect();
                let _: () = client
                    .fluent()
                    .update()
                    .fields(field_names)
                    .in_col(collection.name)
                    .document_id(id)
                    .parent(&parent)
                    .object(&values)
                    .execute()
                    .await
                    .map_err(|e| AppError::Remote(e.to_string()))?;
            }
            Patch::ArrayUnion { field, value } => {
                self.transform_array(collection, id, field, value, true)
                    .await?;
            }
            Patch::ArrayRemove { field, value } => {
                self.transform_array(collection, id, field, value, false)
                    .await?;
            }
        }

        tracing::debug!(collection = %collection.path(), id, "Document updated");
        Ok(())
    }

    async fn delete(&self, collection: &CollectionRef, id: &str) -> Result<()> {
        let client = self.get_client()?;
        let parent = parent_path(client, collection);

        client
            .fluent()
            .delete()
            .from(collection.name)
            .document_id(id)
            .parent(&parent)
            .execute()
            .await
            .map_err(|e| AppError::Remote(e.to_string()))?;

        tracing::debug!(collection = %collection.path(), id, "Document deleted");
        Ok(())
    }
}
