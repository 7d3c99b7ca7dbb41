//! Storage backend abstraction for the document store.
//!
//! Backends expose the primitives the collection layer is built from:
//!
//! - [`DocumentBackend`]: insert-one with duplicate signaling, atomic replace-one
//!   conditioned on a predicate, delete-one/delete-many and predicate reads.
//!   Implemented by backends and by their transactions alike.
//! - [`StoreBackend`]: a whole store. Adds schema administration and transactions.
//! - [`TransactionBackend`]: a transaction handle. Dropping it without
//!   [`commit`](TransactionBackend::commit) discards its writes.
//! - [`StoreBackendBuilder`]: factory for backend instances.
//!
//! Documents cross this boundary as an identity key plus a BSON body. The key
//! is stored under [`ID_FIELD`](crate::document::ID_FIELD) and predicates may
//! refer to it through that name.

use async_trait::async_trait;
use bson::{Bson, Document as BsonDocument};
use std::fmt::Debug;

use crate::{
    error::DocumentStoreResult,
    query::{Predicate, Query},
};

/// Acknowledgment of a replace-one call.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReplaceResult {
    /// Whether the store confirmed the write.
    pub acknowledged: bool,
    pub matched_count: u64,
    pub modified_count: u64,
    /// Identity of the inserted document when an upsert created one.
    pub upserted_id: Option<Bson>,
}

/// Acknowledgment of a delete call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeleteResult {
    pub deleted_count: u64,
}

/// Per-document primitives shared by stores and transactions.
///
/// Every call is a single suspension point; implementations must not retry.
#[async_trait]
pub trait DocumentBackend: Send + Sync + Debug {
    /// Inserts one document.
    ///
    /// # Errors
    ///
    /// [`DocumentStoreError::DuplicateKey`](crate::error::DocumentStoreError::DuplicateKey)
    /// when the key or a unique-indexed value already exists.
    async fn insert_one(&self, collection: &str, key: Bson, document: BsonDocument) -> DocumentStoreResult<()>;

    /// Atomically replaces the first document matching `filter`.
    ///
    /// The replacement keeps `key` as its identity. When `upsert` is set and
    /// nothing matches, the replacement is inserted instead.
    ///
    /// # Errors
    ///
    /// - [`DocumentStoreError::ImmutableId`](crate::error::DocumentStoreError::ImmutableId)
    ///   when the matched document's identity differs from `key`.
    /// - [`DocumentStoreError::DuplicateKey`](crate::error::DocumentStoreError::DuplicateKey)
    ///   when the write collides with an existing identity or unique-indexed value.
    async fn replace_one(
        &self,
        collection: &str,
        filter: &Predicate,
        key: Bson,
        replacement: BsonDocument,
        upsert: bool,
    ) -> DocumentStoreResult<ReplaceResult>;

    /// Deletes the first document matching `filter`. Matching nothing is not an error.
    async fn delete_one(&self, collection: &str, filter: &Predicate) -> DocumentStoreResult<DeleteResult>;

    /// Deletes every document matching `filter`.
    async fn delete_many(&self, collection: &str, filter: &Predicate) -> DocumentStoreResult<DeleteResult>;

    /// Returns the bodies of matching documents, in store order unless the query sorts.
    async fn find(&self, collection: &str, query: &Query) -> DocumentStoreResult<Vec<BsonDocument>>;

    /// Returns the first matching body in store order.
    async fn find_first(&self, collection: &str, filter: &Predicate) -> DocumentStoreResult<Option<BsonDocument>> {
        let query = Query::builder().filter(filter.clone()).limit(1).build();

        Ok(self.find(collection, &query).await?.into_iter().next())
    }

    async fn count(&self, collection: &str, filter: &Predicate) -> DocumentStoreResult<u64>;
}

/// A complete store: documents, schema administration and transactions.
#[async_trait]
pub trait StoreBackend: DocumentBackend {
    type Transaction: TransactionBackend;

    /// Starts a session with an open transaction.
    async fn begin_transaction(&self) -> DocumentStoreResult<Self::Transaction>;

    async fn create_collection(&self, name: &str) -> DocumentStoreResult<()>;

    /// Drops a collection and all its documents.
    async fn drop_collection(&self, name: &str) -> DocumentStoreResult<()>;

    async fn list_collections(&self) -> DocumentStoreResult<Vec<String>>;

    /// Creates an index on `field`; a unique index makes colliding writes fail as duplicates.
    async fn add_index(&self, collection: &str, field: &str, unique: bool) -> DocumentStoreResult<()>;

    async fn drop_index(&self, collection: &str, field: &str) -> DocumentStoreResult<()>;

    /// Name of the database this backend is bound to, for diagnostics.
    fn database_name(&self) -> &str;

    /// Releases backend resources.
    async fn shutdown(self) -> DocumentStoreResult<()>
    where
        Self: Sized,
    {
        Ok(())
    }
}

/// Document operations scoped to one transaction.
#[async_trait]
pub trait TransactionBackend: DocumentBackend + Sized {
    /// Makes the transaction's writes visible outside it.
    async fn commit(self) -> DocumentStoreResult<()>;

    /// Discards the transaction's writes. Dropping the handle has the same effect.
    async fn abort(self) -> DocumentStoreResult<()>;
}

#[async_trait]
pub trait StoreBackendBuilder {
    type Backend: StoreBackend;

    async fn build(self) -> DocumentStoreResult<Self::Backend>;
}
