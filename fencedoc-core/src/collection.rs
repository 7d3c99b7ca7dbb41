//! Typed CRUD operations with optimistic concurrency control.
//!
//! A [`Collection`] binds a document type to a [`DocumentBackend`], which is
//! either a whole store or an open transaction.
//!
//! # Calling conventions
//!
//! Every operation comes in two forms built on the same logic:
//!
//! - `try_*` returns `DocumentStoreResult<Outcome<T>>`. Expected failures
//!   (not found, race condition, duplication, store errors) arrive as an
//!   [`ErrorInfo`](crate::error::ErrorInfo) in the inner [`Outcome`]. Only
//!   failures to (de)serialize the document itself use the outer error.
//! - the plain name returns `DocumentStoreResult<T>` and raises the classified
//!   failure as [`DocumentStoreError::Operation`].
//!
//! # Writes
//!
//! | operation                 | predicate                        | written document |
//! |---------------------------|----------------------------------|------------------|
//! | `update_where`            | caller's                         | as given         |
//! | `update_by_key`           | identity                         | as given         |
//! | `update_versioned`        | identity and `current` version   | advanced         |
//! | `update_entity`           | identity and entity's version    | advanced         |
//!
//! The `upsert_*` forms share these rules and insert when nothing matches.
//! Nothing is retried: a race condition is final for that call.
//!
//! ```ignore
//! let customers = store.collection::<Customer>();
//!
//! let jane = customers.get_by_id(&jane_id).await?;
//! let moved = Customer { zip: "22222".into(), ..jane.clone() };
//!
//! match customers.try_update_versioned(&jane_id, moved, jane.version).await? {
//!     Ok(stored) => println!("now at version {}", stored.version),
//!     Err(info) if info.code == ErrorCode::RaceCondition => println!("reload and retry"),
//!     Err(info) => return Err(info.into()),
//! }
//! ```

use std::{future::Future, marker::PhantomData, sync::Arc, time::Duration};

use tracing::{debug, warn};

use crate::{
    backend::DocumentBackend,
    document::{Clock, Document, DocumentExt, SystemClock, Version, VersionAdvance, Versioned, advance_from},
    error::{DocumentStoreError, DocumentStoreResult, ErrorCode, ErrorInfo, Outcome, OutcomeExt},
    filter::{by_id, by_id_and_version},
    interpret::{interpret_delete, interpret_first, interpret_insert, interpret_replace},
    query::{Predicate, Query},
};

/// Typed access to one collection through a store or a transaction.
#[derive(Debug)]
pub struct Collection<'a, B: DocumentBackend, D: Document> {
    name: String,
    backend: &'a B,
    clock: Arc<dyn Clock>,
    timeout: Option<Duration>,
    _marker: PhantomData<D>,
}

impl<'a, B: DocumentBackend, D: Document> Clone for Collection<'a, B, D> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            backend: self.backend,
            clock: self.clock.clone(),
            timeout: self.timeout,
            _marker: PhantomData,
        }
    }
}

impl<'a, B: DocumentBackend, D: Document> Collection<'a, B, D> {
    pub fn new(backend: &'a B) -> Self {
        Self {
            name: D::collection_name().to_string(),
            backend,
            clock: Arc::new(SystemClock),
            timeout: None,
            _marker: PhantomData,
        }
    }

    /// Uses `clock` to stamp advanced versions.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Abandons the wait on any store call that takes longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Returns the name of this collection.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Awaits a store call, bounded by the collection's timeout.
    async fn call<T, F>(&self, operation: &'static str, call: F) -> DocumentStoreResult<T>
    where
        F: Future<Output = DocumentStoreResult<T>>,
    {
        debug!(target: "fencedoc::collection", collection = %self.name, operation, "store call");

        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .map_err(|_| DocumentStoreError::Backend(format!("{operation} timed out after {limit:?}")))?,
            None => call.await,
        }
    }

    fn report<T>(&self, operation: &'static str, outcome: Outcome<T>) -> Outcome<T> {
        if let Err(info) = &outcome {
            warn!(
                target: "fencedoc::collection",
                collection = %self.name,
                operation,
                code = %info.code,
                detail = info.debug_info.as_deref().unwrap_or(""),
                "{}",
                info.message,
            );
        }

        outcome
    }

    async fn replace(
        &self,
        operation: &'static str,
        document: D,
        filter: Predicate,
        upsert: bool,
    ) -> DocumentStoreResult<Outcome<D>> {
        let body = document.to_body()?;
        let result = self
            .call(operation, self.backend.replace_one(&self.name, &filter, document.key_bson(), body, upsert))
            .await;

        Ok(self.report(operation, interpret_replace(document, result)))
    }

    async fn delete(&self, operation: &'static str, filter: Predicate, many: bool) -> DocumentStoreResult<Outcome<u64>> {
        let result = if many {
            self.call(operation, self.backend.delete_many(&self.name, &filter)).await
        } else {
            self.call(operation, self.backend.delete_one(&self.name, &filter)).await
        };

        Ok(self.report(operation, interpret_delete(result).map(|deleted| deleted.deleted_count)))
    }

    // Retrieval

    /// The first document matching `filter` in store order, or [`ErrorCode::NotFound`].
    pub async fn try_get(&self, filter: &Predicate) -> DocumentStoreResult<Outcome<D>> {
        let found = self.call("get", self.backend.find_first(&self.name, filter)).await;

        match interpret_first(found) {
            Ok(body) => Ok(Ok(D::from_body(body)?)),
            Err(info) => Ok(Err(info)),
        }
    }

    pub async fn get(&self, filter: &Predicate) -> DocumentStoreResult<D> {
        self.try_get(filter).await?.unwrap_or_raise()
    }

    pub async fn try_get_by_id(&self, key: &D::Key) -> DocumentStoreResult<Outcome<D>> {
        self.try_get(&by_id(key.clone())).await
    }

    pub async fn get_by_id(&self, key: &D::Key) -> DocumentStoreResult<D> {
        self.try_get_by_id(key).await?.unwrap_or_raise()
    }

    /// Every document the query selects. An empty result is not an error.
    pub async fn try_find(&self, query: impl Into<Query>) -> DocumentStoreResult<Outcome<Vec<D>>> {
        let query = query.into();
        let found = self.call("find", self.backend.find(&self.name, &query)).await;

        match found {
            Ok(bodies) => Ok(Ok(bodies
                .into_iter()
                .map(D::from_body)
                .collect::<DocumentStoreResult<Vec<D>>>()?)),
            Err(err) => Ok(self.report("find", Err(err.classify()))),
        }
    }

    pub async fn find(&self, query: impl Into<Query>) -> DocumentStoreResult<Vec<D>> {
        self.try_find(query).await?.unwrap_or_raise()
    }

    pub async fn try_count(&self, filter: &Predicate) -> DocumentStoreResult<Outcome<u64>> {
        let counted = self.call("count", self.backend.count(&self.name, filter)).await;

        Ok(self.report("count", counted.map_err(DocumentStoreError::classify)))
    }

    pub async fn count(&self, filter: &Predicate) -> DocumentStoreResult<u64> {
        self.try_count(filter).await?.unwrap_or_raise()
    }

    // Insertion

    /// Inserts `document` and returns it unchanged.
    ///
    /// Fails with [`ErrorCode::Duplication`] when the identity or a unique-indexed
    /// value already exists; the stored document is left as it was.
    pub async fn try_add(&self, document: D) -> DocumentStoreResult<Outcome<D>> {
        let body = document.to_body()?;
        let result = self
            .call("add", self.backend.insert_one(&self.name, document.key_bson(), body))
            .await;

        Ok(self.report("add", interpret_insert(document, result)))
    }

    pub async fn add(&self, document: D) -> DocumentStoreResult<D> {
        self.try_add(document).await?.unwrap_or_raise()
    }

    // Predicate writes

    /// Replaces the first document matching `filter` with `document`.
    ///
    /// Matching nothing is a [`ErrorCode::RaceCondition`]. When several documents
    /// match, an arbitrary one is replaced; if its identity differs from
    /// `document`'s the store refuses and the result is a
    /// [`ErrorCode::DatabaseTransactionError`].
    pub async fn try_update_where(&self, document: D, filter: &Predicate) -> DocumentStoreResult<Outcome<D>> {
        self.replace("update_where", document, filter.clone(), false).await
    }

    pub async fn update_where(&self, document: D, filter: &Predicate) -> DocumentStoreResult<D> {
        self.try_update_where(document, filter).await?.unwrap_or_raise()
    }

    /// Like [`try_update_where`](Self::try_update_where), but inserts `document` when nothing matches.
    pub async fn try_upsert_where(&self, document: D, filter: &Predicate) -> DocumentStoreResult<Outcome<D>> {
        self.replace("upsert_where", document, filter.clone(), true).await
    }

    pub async fn upsert_where(&self, document: D, filter: &Predicate) -> DocumentStoreResult<D> {
        self.try_upsert_where(document, filter).await?.unwrap_or_raise()
    }

    // Keyed writes

    /// Replaces the document stored under `key` without any version check.
    pub async fn try_update_by_key(&self, key: &D::Key, document: D) -> DocumentStoreResult<Outcome<D>> {
        self.replace("update_by_key", document, by_id(key.clone()), false).await
    }

    pub async fn update_by_key(&self, key: &D::Key, document: D) -> DocumentStoreResult<D> {
        self.try_update_by_key(key, document).await?.unwrap_or_raise()
    }

    pub async fn try_upsert_by_key(&self, key: &D::Key, document: D) -> DocumentStoreResult<Outcome<D>> {
        self.replace("upsert_by_key", document, by_id(key.clone()), true).await
    }

    pub async fn upsert_by_key(&self, key: &D::Key, document: D) -> DocumentStoreResult<D> {
        self.try_upsert_by_key(key, document).await?.unwrap_or_raise()
    }

    // Deletion

    /// Deletes the first document matching `filter`. Returns how many were deleted.
    pub async fn try_delete_where(&self, filter: &Predicate) -> DocumentStoreResult<Outcome<u64>> {
        self.delete("delete_where", filter.clone(), false).await
    }

    pub async fn delete_where(&self, filter: &Predicate) -> DocumentStoreResult<u64> {
        self.try_delete_where(filter).await?.unwrap_or_raise()
    }

    /// Deletes every document matching `filter`.
    pub async fn try_delete_all(&self, filter: &Predicate) -> DocumentStoreResult<Outcome<u64>> {
        self.delete("delete_all", filter.clone(), true).await
    }

    pub async fn delete_all(&self, filter: &Predicate) -> DocumentStoreResult<u64> {
        self.try_delete_all(filter).await?.unwrap_or_raise()
    }

    pub async fn try_delete_by_key(&self, key: &D::Key) -> DocumentStoreResult<Outcome<u64>> {
        self.delete("delete_by_key", by_id(key.clone()), false).await
    }

    pub async fn delete_by_key(&self, key: &D::Key) -> DocumentStoreResult<u64> {
        self.try_delete_by_key(key).await?.unwrap_or_raise()
    }
}

impl<'a, B: DocumentBackend, D: Versioned> Collection<'a, B, D> {
    /// Deletes the document stored under `key` only while it is at `expected`.
    ///
    /// A stale version deletes nothing and still succeeds.
    pub async fn try_delete_versioned(&self, key: &D::Key, expected: Version) -> DocumentStoreResult<Outcome<u64>> {
        self.delete("delete_versioned", by_id_and_version::<D>(key.clone(), expected), false)
            .await
    }

    pub async fn delete_versioned(&self, key: &D::Key, expected: Version) -> DocumentStoreResult<u64> {
        self.try_delete_versioned(key, expected).await?.unwrap_or_raise()
    }

    /// Deletes `document` at its own identity and version.
    pub async fn try_delete_entity(&self, document: &D) -> DocumentStoreResult<Outcome<u64>> {
        self.try_delete_versioned(document.id(), document.version()).await
    }

    pub async fn delete_entity(&self, document: &D) -> DocumentStoreResult<u64> {
        self.try_delete_entity(document).await?.unwrap_or_raise()
    }
}

impl<'a, B: DocumentBackend, D: VersionAdvance> Collection<'a, B, D> {
    async fn fenced(
        &self,
        operation: &'static str,
        key: &D::Key,
        document: D,
        current: Version,
        upsert: bool,
    ) -> DocumentStoreResult<Outcome<D>> {
        let Some(advanced) = advance_from(document, current, self.clock.as_ref()) else {
            return Ok(self.report(
                operation,
                Err(ErrorInfo::new(ErrorCode::InvalidRequest, format!("Version {current} cannot be advanced"))),
            ));
        };

        self.replace(operation, advanced, by_id_and_version::<D>(key.clone(), current), upsert)
            .await
    }

    /// Replaces the document stored under `key` only while it is at version `current`.
    ///
    /// The written document is `document` with version `current + 1` and the
    /// clock's current time. Any other stored version is a
    /// [`ErrorCode::RaceCondition`] and leaves the stored document unchanged.
    pub async fn try_update_versioned(&self, key: &D::Key, document: D, current: Version) -> DocumentStoreResult<Outcome<D>> {
        self.fenced("update_versioned", key, document, current, false).await
    }

    pub async fn update_versioned(&self, key: &D::Key, document: D, current: Version) -> DocumentStoreResult<D> {
        self.try_update_versioned(key, document, current).await?.unwrap_or_raise()
    }

    /// Fenced upsert.
    ///
    /// When `(key, current)` matches nothing the advanced document is inserted.
    /// That succeeds if `key` is unused and is a [`ErrorCode::Duplication`] if a
    /// document with `key` exists at another version.
    pub async fn try_upsert_versioned(&self, key: &D::Key, document: D, current: Version) -> DocumentStoreResult<Outcome<D>> {
        self.fenced("upsert_versioned", key, document, current, true).await
    }

    pub async fn upsert_versioned(&self, key: &D::Key, document: D, current: Version) -> DocumentStoreResult<D> {
        self.try_upsert_versioned(key, document, current).await?.unwrap_or_raise()
    }

    /// Fenced update taking identity and current version from `document`.
    pub async fn try_update_entity(&self, document: D) -> DocumentStoreResult<Outcome<D>> {
        let (key, current) = (document.id().clone(), document.version());
        self.fenced("update_entity", &key, document, current, false).await
    }

    pub async fn update_entity(&self, document: D) -> DocumentStoreResult<D> {
        self.try_update_entity(document).await?.unwrap_or_raise()
    }

    pub async fn try_upsert_entity(&self, document: D) -> DocumentStoreResult<Outcome<D>> {
        let (key, current) = (document.id().clone(), document.version());
        self.fenced("upsert_entity", &key, document, current, true).await
    }

    pub async fn upsert_entity(&self, document: D) -> DocumentStoreResult<D> {
        self.try_upsert_entity(document).await?.unwrap_or_raise()
    }
}
