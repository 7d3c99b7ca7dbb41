//! Main document store interface.
//!
//! - [`DocumentStore`] - owns a backend and hands out typed collections
//! - [`DocumentTransaction`] - an open transaction with its own collections
//!
//! # Example
//!
//! ```ignore
//! use fencedoc::store::DocumentStore;
//!
//! let store = DocumentStore::new(backend);
//! let customers = store.collection::<Customer>();
//!
//! let tx = store.transaction().await?;
//! tx.collection::<Customer>().add(customer).await?;
//! tx.commit().await?;
//! ```

use std::{sync::Arc, time::Duration};

use tracing::{debug, info};

use crate::{
    backend::{StoreBackend, TransactionBackend},
    collection::Collection,
    document::{Clock, Document, SystemClock},
    error::DocumentStoreResult,
};

/// A document store bound to a specific backend implementation.
#[derive(Debug)]
pub struct DocumentStore<B: StoreBackend> {
    backend: B,
    clock: Arc<dyn Clock>,
    timeout: Option<Duration>,
}

impl<B: StoreBackend> DocumentStore<B> {
    /// Creates a new document store with the given backend.
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            clock: Arc::new(SystemClock),
            timeout: None,
        }
    }

    /// Replaces the clock used to stamp advanced versions.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Bounds every collection call made through this store.
    ///
    /// A call that exceeds the limit fails as a
    /// [`DatabaseTransactionError`](crate::error::ErrorCode::DatabaseTransactionError);
    /// the store may or may not have applied it.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Gets a typed collection for `D`, named by [`Document::collection_name`].
    pub fn collection<D: Document>(&self) -> Collection<'_, B, D> {
        Collection::new(&self.backend)
            .with_clock(self.clock.clone())
            .with_timeout(self.timeout)
    }

    /// Begins a transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot start a session.
    pub async fn transaction(&self) -> DocumentStoreResult<DocumentTransaction<B::Transaction>> {
        debug!(target: "fencedoc::store", database = self.backend.database_name(), "beginning transaction");

        Ok(DocumentTransaction {
            backend: self.backend.begin_transaction().await?,
            clock: self.clock.clone(),
            timeout: self.timeout,
        })
    }

    /// Creates a collection with the given name. Creating an existing collection is a no-op.
    pub async fn create_collection(&self, name: &str) -> DocumentStoreResult<()> {
        self.backend.create_collection(name).await
    }

    /// Drops a collection and every document in it.
    pub async fn drop_collection(&self, name: &str) -> DocumentStoreResult<()> {
        self.backend.drop_collection(name).await
    }

    pub async fn list_collections(&self) -> DocumentStoreResult<Vec<String>> {
        self.backend.list_collections().await
    }

    /// Adds an index to a field in a collection.
    ///
    /// A unique index makes writes that would repeat an indexed value fail with
    /// [`Duplication`](crate::error::ErrorCode::Duplication).
    pub async fn add_index(&self, collection: &str, field: &str, unique: bool) -> DocumentStoreResult<()> {
        self.backend.add_index(collection, field, unique).await
    }

    pub async fn drop_index(&self, collection: &str, field: &str) -> DocumentStoreResult<()> {
        self.backend.drop_index(collection, field).await
    }

    /// Shuts down the store and releases backend resources.
    pub async fn shutdown(self) -> DocumentStoreResult<()> {
        self.backend.shutdown().await
    }
}

/// An open transaction.
///
/// Collections taken from it read the transaction's own writes. Dropping the
/// handle without [`commit`](Self::commit) discards every write.
#[derive(Debug)]
pub struct DocumentTransaction<T: TransactionBackend> {
    backend: T,
    clock: Arc<dyn Clock>,
    timeout: Option<Duration>,
}

impl<T: TransactionBackend> DocumentTransaction<T> {
    pub fn collection<D: Document>(&self) -> Collection<'_, T, D> {
        Collection::new(&self.backend)
            .with_clock(self.clock.clone())
            .with_timeout(self.timeout)
    }

    pub fn backend(&self) -> &T {
        &self.backend
    }

    /// Makes every write of this transaction visible at once.
    ///
    /// # Errors
    ///
    /// [`DocumentStoreError::Transaction`](crate::error::DocumentStoreError::Transaction)
    /// when the store refuses the commit; nothing is applied in that case.
    pub async fn commit(self) -> DocumentStoreResult<()> {
        info!(target: "fencedoc::store", "committing transaction");
        self.backend.commit().await
    }

    pub async fn abort(self) -> DocumentStoreResult<()> {
        info!(target: "fencedoc::store", "aborting transaction");
        self.backend.abort().await
    }
}
