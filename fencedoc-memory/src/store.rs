//! In-memory storage implementation for document stores.
//!
//! Collections keep documents in insertion order, which is the "store order"
//! reads and single-document writes follow. Unique indexes are enforced on
//! insert, replace and upsert.
//!
//! Transactions work on a snapshot of the store taken when they begin. Their
//! writes are logged and replayed against the live store at commit time; if any
//! replayed write no longer produces the result it had inside the transaction,
//! the commit fails and nothing is applied.

use std::{cmp::Ordering, collections::HashMap, fmt, sync::Arc};

use async_trait::async_trait;
use bson::{Bson, Document as BsonDocument};
use mea::{mutex::Mutex, rwlock::RwLock};
use tracing::debug;

use fencedoc_core::{
    backend::{DeleteResult, DocumentBackend, ReplaceResult, StoreBackend, StoreBackendBuilder, TransactionBackend},
    error::{DocumentStoreError, DocumentStoreResult},
    migrate::SCHEMA_VERSION_COLLECTION,
    query::{Predicate, Query, SortDirection},
};

use crate::evaluator::{Comparable, DocumentEvaluator, lookup, same_value};

const DEFAULT_DATABASE: &str = "memory";

#[derive(Debug, Clone)]
struct Stored {
    key: Bson,
    body: BsonDocument,
}

impl Stored {
    fn matches(&self, filter: &Predicate) -> bool {
        DocumentEvaluator::new(&self.key, &self.body).evaluate(filter)
    }

    fn field(&self, path: &str) -> Option<&Bson> {
        lookup(&self.key, &self.body, path)
    }
}

#[derive(Debug, Clone)]
struct Index {
    field: String,
    unique: bool,
}

#[derive(Debug, Clone, Default)]
struct StoredCollection {
    documents: Vec<Stored>,
    indexes: Vec<Index>,
}

impl StoredCollection {
    /// Fails when `candidate` would repeat the key or a unique-indexed value of
    /// any document other than the one at `skip`.
    fn check_unique(&self, collection: &str, candidate: &Stored, skip: Option<usize>) -> DocumentStoreResult<()> {
        let others = self
            .documents
            .iter()
            .enumerate()
            .filter(|(position, _)| Some(*position) != skip)
            .map(|(_, stored)| stored);

        for other in others {
            if same_value(&other.key, &candidate.key) {
                return Err(DocumentStoreError::DuplicateKey {
                    collection: collection.to_string(),
                    detail: format!("_id: {}", candidate.key),
                });
            }

            for index in self.indexes.iter().filter(|index| index.unique) {
                if let (Some(mine), Some(theirs)) = (candidate.field(&index.field), other.field(&index.field))
                    && same_value(mine, theirs)
                {
                    return Err(DocumentStoreError::DuplicateKey {
                        collection: collection.to_string(),
                        detail: format!("{}: {mine}", index.field),
                    });
                }
            }
        }

        Ok(())
    }
}

/// The complete contents of a store.
#[derive(Debug, Clone, Default)]
pub(crate) struct State {
    collections: HashMap<String, StoredCollection>,
}

impl State {
    fn insert_one(&mut self, collection: &str, key: Bson, body: BsonDocument) -> DocumentStoreResult<()> {
        let stored_collection = self.collections.entry(collection.to_string()).or_default();
        let candidate = Stored { key, body };

        stored_collection.check_unique(collection, &candidate, None)?;
        stored_collection.documents.push(candidate);

        Ok(())
    }

    fn replace_one(
        &mut self,
        collection: &str,
        filter: &Predicate,
        key: Bson,
        body: BsonDocument,
        upsert: bool,
    ) -> DocumentStoreResult<ReplaceResult> {
        let position = self
            .collections
            .get(collection)
            .and_then(|stored| stored.documents.iter().position(|doc| doc.matches(filter)));

        let Some(position) = position else {
            if !upsert {
                return Ok(ReplaceResult { acknowledged: true, ..ReplaceResult::default() });
            }

            self.insert_one(collection, key.clone(), body)?;

            return Ok(ReplaceResult {
                acknowledged: true,
                upserted_id: Some(key),
                ..ReplaceResult::default()
            });
        };

        let stored_collection = self.collections.entry(collection.to_string()).or_default();
        let current = &stored_collection.documents[position];

        if !same_value(&current.key, &key) {
            return Err(DocumentStoreError::ImmutableId(collection.to_string()));
        }

        let candidate = Stored { key: current.key.clone(), body };
        stored_collection.check_unique(collection, &candidate, Some(position))?;

        let modified = stored_collection.documents[position].body != candidate.body;
        stored_collection.documents[position] = candidate;

        Ok(ReplaceResult {
            acknowledged: true,
            matched_count: 1,
            modified_count: u64::from(modified),
            upserted_id: None,
        })
    }

    fn delete(&mut self, collection: &str, filter: &Predicate, many: bool) -> DeleteResult {
        let Some(stored_collection) = self.collections.get_mut(collection) else {
            return DeleteResult::default();
        };

        let before = stored_collection.documents.len();

        if many {
            stored_collection.documents.retain(|doc| !doc.matches(filter));
        } else if let Some(position) = stored_collection.documents.iter().position(|doc| doc.matches(filter)) {
            stored_collection.documents.remove(position);
        }

        DeleteResult { deleted_count: (before - stored_collection.documents.len()) as u64 }
    }

    fn find(&self, collection: &str, query: &Query) -> Vec<BsonDocument> {
        let Some(stored_collection) = self.collections.get(collection) else {
            return vec![];
        };

        let mut matched = stored_collection
            .documents
            .iter()
            .filter(|doc| doc.matches(&query.filter))
            .collect::<Vec<_>>();

        if let Some(sort) = &query.sort {
            matched.sort_by(|a, b| {
                let left = a.field(&sort.field).map(Comparable::from).unwrap_or(Comparable::Null);
                let right = b.field(&sort.field).map(Comparable::from).unwrap_or(Comparable::Null);

                match sort.direction {
                    SortDirection::Asc => left.partial_cmp(&right).unwrap_or(Ordering::Equal),
                    SortDirection::Desc => right.partial_cmp(&left).unwrap_or(Ordering::Equal),
                }
            });
        }

        matched
            .into_iter()
            .skip(query.offset.unwrap_or(0))
            .take(query.limit.unwrap_or(usize::MAX))
            .map(|doc| doc.body.clone())
            .collect()
    }

    fn count(&self, collection: &str, filter: &Predicate) -> u64 {
        self.collections
            .get(collection)
            .map(|stored| stored.documents.iter().filter(|doc| doc.matches(filter)).count() as u64)
            .unwrap_or(0)
    }

    fn add_index(&mut self, collection: &str, field: &str, unique: bool) -> DocumentStoreResult<()> {
        let stored_collection = self.collections.entry(collection.to_string()).or_default();

        if unique {
            let mut seen: Vec<&Bson> = Vec::new();

            for value in stored_collection.documents.iter().filter_map(|doc| doc.field(field)) {
                if seen.iter().any(|existing| same_value(existing, value)) {
                    return Err(DocumentStoreError::DuplicateKey {
                        collection: collection.to_string(),
                        detail: format!("{field}: {value}"),
                    });
                }
                seen.push(value);
            }
        }

        stored_collection.indexes.retain(|index| index.field != field);
        stored_collection.indexes.push(Index { field: field.to_string(), unique });

        Ok(())
    }

    fn drop_index(&mut self, collection: &str, field: &str) -> DocumentStoreResult<()> {
        let stored_collection = self
            .collections
            .get_mut(collection)
            .ok_or_else(|| DocumentStoreError::CollectionNotFound(collection.to_string()))?;

        let before = stored_collection.indexes.len();
        stored_collection.indexes.retain(|index| index.field != field);

        if stored_collection.indexes.len() == before {
            return Err(DocumentStoreError::Backend(format!("No index on {collection}.{field}")));
        }

        Ok(())
    }

    fn apply(&mut self, write: &WriteOp) -> DocumentStoreResult<()> {
        match write {
            WriteOp::Insert { collection, key, body } => self.insert_one(collection, key.clone(), body.clone()),
            WriteOp::Replace { collection, filter, key, body, upsert, expected } => {
                let result = self.replace_one(collection, filter, key.clone(), body.clone(), *upsert)?;

                if result.matched_count != expected.matched_count
                    || result.upserted_id.is_some() != expected.upserted_id.is_some()
                {
                    return Err(DocumentStoreError::Transaction(format!(
                        "Write conflict replacing {key} in {collection}"
                    )));
                }

                Ok(())
            }
            WriteOp::Delete { collection, filter, many, expected } => {
                let result = self.delete(collection, filter, *many);

                if result.deleted_count != *expected {
                    return Err(DocumentStoreError::Transaction(format!(
                        "Write conflict deleting from {collection}"
                    )));
                }

                Ok(())
            }
        }
    }
}

/// A write made inside a transaction, with the result it produced there.
#[derive(Debug, Clone)]
enum WriteOp {
    Insert {
        collection: String,
        key: Bson,
        body: BsonDocument,
    },
    Replace {
        collection: String,
        filter: Predicate,
        key: Bson,
        body: BsonDocument,
        upsert: bool,
        expected: ReplaceResult,
    },
    Delete {
        collection: String,
        filter: Predicate,
        many: bool,
        expected: u64,
    },
}

/// Thread-safe in-memory document storage backend.
///
/// `InMemoryStore` is cloneable; clones share the same underlying data.
///
/// # Example
///
/// ```ignore
/// use fencedoc_memory::InMemoryStore;
/// use fencedoc::store::DocumentStore;
///
/// let store = DocumentStore::new(InMemoryStore::new());
/// let customers = store.collection::<Customer>();
/// ```
#[derive(Clone, Debug)]
pub struct InMemoryStore {
    state: Arc<RwLock<State>>,
    database: String,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    /// Creates a new empty in-memory document store.
    pub fn new() -> Self {
        Self::named(DEFAULT_DATABASE)
    }

    pub fn named(database: impl Into<String>) -> Self {
        Self {
            state: Arc::new(RwLock::new(State::default())),
            database: database.into(),
        }
    }

    pub fn builder() -> InMemoryStoreBuilder {
        InMemoryStoreBuilder::default()
    }
}

#[async_trait]
impl DocumentBackend for InMemoryStore {
    async fn insert_one(&self, collection: &str, key: Bson, document: BsonDocument) -> DocumentStoreResult<()> {
        self.state.write().await.insert_one(collection, key, document)
    }

    async fn replace_one(
        &self,
        collection: &str,
        filter: &Predicate,
        key: Bson,
        replacement: BsonDocument,
        upsert: bool,
    ) -> DocumentStoreResult<ReplaceResult> {
        self.state
            .write()
            .await
            .replace_one(collection, filter, key, replacement, upsert)
    }

    async fn delete_one(&self, collection: &str, filter: &Predicate) -> DocumentStoreResult<DeleteResult> {
        Ok(self.state.write().await.delete(collection, filter, false))
    }

    async fn delete_many(&self, collection: &str, filter: &Predicate) -> DocumentStoreResult<DeleteResult> {
        Ok(self.state.write().await.delete(collection, filter, true))
    }

    async fn find(&self, collection: &str, query: &Query) -> DocumentStoreResult<Vec<BsonDocument>> {
        Ok(self.state.read().await.find(collection, query))
    }

    async fn count(&self, collection: &str, filter: &Predicate) -> DocumentStoreResult<u64> {
        Ok(self.state.read().await.count(collection, filter))
    }
}

#[async_trait]
impl StoreBackend for InMemoryStore {
    type Transaction = InMemoryTransaction;

    async fn begin_transaction(&self) -> DocumentStoreResult<InMemoryTransaction> {
        let snapshot = self.state.read().await.clone();

        Ok(InMemoryTransaction {
            shared: self.state.clone(),
            workspace: Mutex::new(Workspace { state: snapshot, log: Vec::new() }),
        })
    }

    async fn create_collection(&self, name: &str) -> DocumentStoreResult<()> {
        self.state
            .write()
            .await
            .collections
            .entry(name.to_string())
            .or_default();

        Ok(())
    }

    async fn drop_collection(&self, name: &str) -> DocumentStoreResult<()> {
        if self.state.write().await.collections.remove(name).is_none() {
            return Err(DocumentStoreError::CollectionNotFound(name.to_string()));
        }

        Ok(())
    }

    async fn list_collections(&self) -> DocumentStoreResult<Vec<String>> {
        let mut names = self
            .state
            .read()
            .await
            .collections
            .keys()
            .filter(|name| name.as_str() != SCHEMA_VERSION_COLLECTION)
            .cloned()
            .collect::<Vec<_>>();
        names.sort();

        Ok(names)
    }

    async fn add_index(&self, collection: &str, field: &str, unique: bool) -> DocumentStoreResult<()> {
        self.state.write().await.add_index(collection, field, unique)
    }

    async fn drop_index(&self, collection: &str, field: &str) -> DocumentStoreResult<()> {
        self.state.write().await.drop_index(collection, field)
    }

    fn database_name(&self) -> &str {
        &self.database
    }
}

struct Workspace {
    state: State,
    log: Vec<WriteOp>,
}

/// A snapshot transaction over an [`InMemoryStore`].
pub struct InMemoryTransaction {
    shared: Arc<RwLock<State>>,
    workspace: Mutex<Workspace>,
}

impl fmt::Debug for InMemoryTransaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryTransaction").finish_non_exhaustive()
    }
}

#[async_trait]
impl DocumentBackend for InMemoryTransaction {
    async fn insert_one(&self, collection: &str, key: Bson, document: BsonDocument) -> DocumentStoreResult<()> {
        let mut workspace = self.workspace.lock().await;
        workspace.state.insert_one(collection, key.clone(), document.clone())?;
        workspace.log.push(WriteOp::Insert { collection: collection.to_string(), key, body: document });

        Ok(())
    }

    async fn replace_one(
        &self,
        collection: &str,
        filter: &Predicate,
        key: Bson,
        replacement: BsonDocument,
        upsert: bool,
    ) -> DocumentStoreResult<ReplaceResult> {
        let mut workspace = self.workspace.lock().await;
        let result = workspace
            .state
            .replace_one(collection, filter, key.clone(), replacement.clone(), upsert)?;

        if result.matched_count > 0 || result.upserted_id.is_some() {
            workspace.log.push(WriteOp::Replace {
                collection: collection.to_string(),
                filter: filter.clone(),
                key,
                body: replacement,
                upsert,
                expected: result.clone(),
            });
        }

        Ok(result)
    }

    async fn delete_one(&self, collection: &str, filter: &Predicate) -> DocumentStoreResult<DeleteResult> {
        self.delete(collection, filter, false).await
    }

    async fn delete_many(&self, collection: &str, filter: &Predicate) -> DocumentStoreResult<DeleteResult> {
        self.delete(collection, filter, true).await
    }

    async fn find(&self, collection: &str, query: &Query) -> DocumentStoreResult<Vec<BsonDocument>> {
        Ok(self.workspace.lock().await.state.find(collection, query))
    }

    async fn count(&self, collection: &str, filter: &Predicate) -> DocumentStoreResult<u64> {
        Ok(self.workspace.lock().await.state.count(collection, filter))
    }
}

impl InMemoryTransaction {
    async fn delete(&self, collection: &str, filter: &Predicate, many: bool) -> DocumentStoreResult<DeleteResult> {
        let mut workspace = self.workspace.lock().await;
        let result = workspace.state.delete(collection, filter, many);

        if result.deleted_count > 0 {
            workspace.log.push(WriteOp::Delete {
                collection: collection.to_string(),
                filter: filter.clone(),
                many,
                expected: result.deleted_count,
            });
        }

        Ok(result)
    }
}

#[async_trait]
impl TransactionBackend for InMemoryTransaction {
    async fn commit(self) -> DocumentStoreResult<()> {
        let workspace = self.workspace.lock().await;
        let mut shared = self.shared.write().await;
        let mut next = shared.clone();

        for write in &workspace.log {
            next.apply(write).map_err(|err| match err {
                DocumentStoreError::Transaction(_) => err,
                other => DocumentStoreError::Transaction(format!("Write conflict: {other}")),
            })?;
        }

        debug!(target: "fencedoc::memory", writes = workspace.log.len(), "transaction committed");
        *shared = next;

        Ok(())
    }

    async fn abort(self) -> DocumentStoreResult<()> {
        debug!(target: "fencedoc::memory", "transaction aborted");
        Ok(())
    }
}

/// Builder for [`InMemoryStore`] instances.
#[derive(Default)]
pub struct InMemoryStoreBuilder {
    database: Option<String>,
}

impl InMemoryStoreBuilder {
    /// Names the store; only used in diagnostics.
    pub fn database(mut self, name: impl Into<String>) -> Self {
        self.database = Some(name.into());
        self
    }
}

#[async_trait]
impl StoreBackendBuilder for InMemoryStoreBuilder {
    type Backend = InMemoryStore;

    async fn build(self) -> DocumentStoreResult<Self::Backend> {
        Ok(match self.database {
            Some(name) => InMemoryStore::named(name),
            None => InMemoryStore::new(),
        })
    }
}
