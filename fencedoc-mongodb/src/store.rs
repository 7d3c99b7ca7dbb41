use std::fmt;

use async_trait::async_trait;
use bson::{Bson, Document, doc};
use futures::TryStreamExt;
use mea::mutex::Mutex;
use mongodb::{
    Client, ClientSession, Collection as MongoCollection, Database, IndexModel,
    error::{Error as MongoError, ErrorKind, TRANSIENT_TRANSACTION_ERROR, WriteFailure},
    options::{ClientOptions, FindOptions, IndexOptions},
};
use tracing::{debug, info};

use fencedoc_core::{
    backend::{DeleteResult, DocumentBackend, ReplaceResult, StoreBackend, StoreBackendBuilder, TransactionBackend},
    config::ConnectionSettings,
    document::ID_FIELD,
    error::{DocumentStoreError, DocumentStoreResult},
    migrate::SCHEMA_VERSION_COLLECTION,
    query::{Predicate, Query},
};

use crate::query::MongoQueryTranslator;

const NAMESPACE_EXISTS: i32 = 48;
const IMMUTABLE_FIELD: i32 = 66;
const DUPLICATE_KEY: i32 = 11000;

fn server_code(err: &MongoError) -> Option<i32> {
    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(write)) => Some(write.code),
        ErrorKind::Command(command) => Some(command.code),
        _ => None,
    }
}

/// Maps a driver failure onto the store's error taxonomy.
fn store_error(collection: &str, err: MongoError) -> DocumentStoreError {
    match server_code(&err) {
        Some(DUPLICATE_KEY) => DocumentStoreError::DuplicateKey {
            collection: collection.to_string(),
            detail: err.to_string(),
        },
        Some(IMMUTABLE_FIELD) => DocumentStoreError::ImmutableId(collection.to_string()),
        _ if err.contains_label(TRANSIENT_TRANSACTION_ERROR) => DocumentStoreError::Transaction(err.to_string()),
        _ => DocumentStoreError::Backend(err.to_string()),
    }
}

fn prepare_document(key: Bson, mut body: Document) -> Document {
    body.insert(ID_FIELD, key);
    body
}

fn restore_document(mut document: Document) -> Document {
    document.remove(ID_FIELD);
    document
}

fn find_options(query: &Query) -> FindOptions {
    let mut options = FindOptions::default();

    options.sort = MongoQueryTranslator::sort(query);
    options.limit = query.limit.map(|limit| limit as i64);
    options.skip = query.offset.map(|skip| skip as u64);

    options
}

/// One document call against a database, inside a session when one is given.
struct Scope<'a> {
    database: &'a Database,
    session: Option<&'a mut ClientSession>,
}

impl<'a> Scope<'a> {
    fn new(database: &'a Database, session: Option<&'a mut ClientSession>) -> Self {
        Self { database, session }
    }

    fn collection(&self, name: &str) -> MongoCollection<Document> {
        self.database.collection(name)
    }

    async fn insert_one(self, collection: &str, key: Bson, body: Document) -> DocumentStoreResult<()> {
        let target = self.collection(collection);
        let action = target.insert_one(prepare_document(key, body));

        match self.session {
            Some(session) => action.session(session).await,
            None => action.await,
        }
        .map_err(|err| store_error(collection, err))?;

        Ok(())
    }

    async fn replace_one(
        self,
        collection: &str,
        filter: &Predicate,
        key: Bson,
        replacement: Document,
        upsert: bool,
    ) -> DocumentStoreResult<ReplaceResult> {
        let target = self.collection(collection);
        let action = target
            .replace_one(MongoQueryTranslator::filter(filter)?, prepare_document(key, replacement))
            .upsert(upsert);

        let result = match self.session {
            Some(session) => action.session(session).await,
            None => action.await,
        }
        .map_err(|err| store_error(collection, err))?;

        // Unacknowledged writes surface as driver errors, so a result here was acknowledged.
        Ok(ReplaceResult {
            acknowledged: true,
            matched_count: result.matched_count,
            modified_count: result.modified_count,
            upserted_id: result.upserted_id,
        })
    }

    async fn delete(self, collection: &str, filter: &Predicate, many: bool) -> DocumentStoreResult<DeleteResult> {
        let target = self.collection(collection);
        let filter = MongoQueryTranslator::filter(filter)?;

        let result = match (many, self.session) {
            (true, Some(session)) => target.delete_many(filter).session(session).await,
            (true, None) => target.delete_many(filter).await,
            (false, Some(session)) => target.delete_one(filter).session(session).await,
            (false, None) => target.delete_one(filter).await,
        }
        .map_err(|err| store_error(collection, err))?;

        Ok(DeleteResult { deleted_count: result.deleted_count })
    }

    async fn find(self, collection: &str, query: &Query) -> DocumentStoreResult<Vec<Document>> {
        // The server reads a zero limit as no limit at all.
        if query.limit == Some(0) {
            return Ok(vec![]);
        }

        let target = self.collection(collection);
        let action = target
            .find(MongoQueryTranslator::filter(&query.filter)?)
            .with_options(find_options(query));

        let documents: Vec<Document> = match self.session {
            Some(session) => {
                let mut cursor = action
                    .session(&mut *session)
                    .await
                    .map_err(|err| store_error(collection, err))?;

                cursor.stream(session).try_collect().await
            }
            None => action
                .await
                .map_err(|err| store_error(collection, err))?
                .try_collect()
                .await,
        }
        .map_err(|err| store_error(collection, err))?;

        Ok(documents.into_iter().map(restore_document).collect())
    }

    async fn count(self, collection: &str, filter: &Predicate) -> DocumentStoreResult<u64> {
        let target = self.collection(collection);
        let action = target.count_documents(MongoQueryTranslator::filter(filter)?);

        match self.session {
            Some(session) => action.session(session).await,
            None => action.await,
        }
        .map_err(|err| store_error(collection, err))
    }
}

#[derive(Debug)]
pub struct MongoDbStore {
    client: Client,
    database: String,
}

impl MongoDbStore {
    pub fn new(client: Client, database: String) -> Self {
        Self { client, database }
    }

    pub fn builder(dsn: &str, database: &str) -> MongoDbStoreBuilder {
        MongoDbStoreBuilder::new(dsn, database)
    }

    /// Connects with settings resolved from `connection` and, when it names no
    /// database, from the environment.
    pub async fn connect(connection: &str) -> DocumentStoreResult<Self> {
        MongoDbStoreBuilder::from_settings(ConnectionSettings::resolve(connection)?)
            .build()
            .await
    }

    fn database(&self) -> Database {
        self.client.database(&self.database)
    }
}

#[async_trait]
impl DocumentBackend for MongoDbStore {
    async fn insert_one(&self, collection: &str, key: Bson, document: Document) -> DocumentStoreResult<()> {
        Scope::new(&self.database(), None).insert_one(collection, key, document).await
    }

    async fn replace_one(
        &self,
        collection: &str,
        filter: &Predicate,
        key: Bson,
        replacement: Document,
        upsert: bool,
    ) -> DocumentStoreResult<ReplaceResult> {
        Scope::new(&self.database(), None)
            .replace_one(collection, filter, key, replacement, upsert)
            .await
    }

    async fn delete_one(&self, collection: &str, filter: &Predicate) -> DocumentStoreResult<DeleteResult> {
        Scope::new(&self.database(), None).delete(collection, filter, false).await
    }

    async fn delete_many(&self, collection: &str, filter: &Predicate) -> DocumentStoreResult<DeleteResult> {
        Scope::new(&self.database(), None).delete(collection, filter, true).await
    }

    async fn find(&self, collection: &str, query: &Query) -> DocumentStoreResult<Vec<Document>> {
        Scope::new(&self.database(), None).find(collection, query).await
    }

    async fn count(&self, collection: &str, filter: &Predicate) -> DocumentStoreResult<u64> {
        Scope::new(&self.database(), None).count(collection, filter).await
    }
}

#[async_trait]
impl StoreBackend for MongoDbStore {
    type Transaction = MongoTransaction;

    async fn begin_transaction(&self) -> DocumentStoreResult<MongoTransaction> {
        let mut session = self
            .client
            .start_session()
            .await
            .map_err(|e| DocumentStoreError::Transaction(e.to_string()))?;

        session
            .start_transaction()
            .await
            .map_err(|e| DocumentStoreError::Transaction(e.to_string()))?;

        Ok(MongoTransaction {
            database: self.database(),
            session: Mutex::new(session),
        })
    }

    async fn create_collection(&self, name: &str) -> DocumentStoreResult<()> {
        match self.database().create_collection(name).await {
            Err(err) if server_code(&err) == Some(NAMESPACE_EXISTS) => {
                debug!(target: "fencedoc::store", collection = name, "collection already exists");
                Ok(())
            }
            result => result.map_err(|err| store_error(name, err)),
        }
    }

    async fn drop_collection(&self, name: &str) -> DocumentStoreResult<()> {
        self.database()
            .collection::<Document>(name)
            .drop()
            .await
            .map_err(|err| store_error(name, err))
    }

    async fn list_collections(&self) -> DocumentStoreResult<Vec<String>> {
        let mut names = self
            .database()
            .list_collection_names()
            .await
            .map_err(|e| DocumentStoreError::Backend(e.to_string()))?
            .into_iter()
            .filter(|name| name != SCHEMA_VERSION_COLLECTION)
            .collect::<Vec<_>>();

        names.sort();

        Ok(names)
    }

    async fn add_index(&self, collection: &str, field: &str, unique: bool) -> DocumentStoreResult<()> {
        // Indexes are named after their field so they can be dropped by field.
        self.database()
            .collection::<Document>(collection)
            .create_index(
                IndexModel::builder()
                    .keys(doc! { field: 1 })
                    .options(IndexOptions::builder().unique(unique).name(field.to_string()).build())
                    .build(),
            )
            .await
            .map_err(|err| store_error(collection, err))?;

        Ok(())
    }

    async fn drop_index(&self, collection: &str, field: &str) -> DocumentStoreResult<()> {
        self.database()
            .collection::<Document>(collection)
            .drop_index(field)
            .await
            .map_err(|err| store_error(collection, err))
    }

    fn database_name(&self) -> &str {
        &self.database
    }

    async fn shutdown(self) -> DocumentStoreResult<()> {
        self.client.shutdown().await;

        Ok(())
    }
}

/// A MongoDB session with an open multi-document transaction.
///
/// Requires a replica set or sharded cluster. Dropping the handle without
/// committing lets the driver abort the transaction.
pub struct MongoTransaction {
    database: Database,
    session: Mutex<ClientSession>,
}

impl fmt::Debug for MongoTransaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MongoTransaction")
            .field("database", &self.database.name())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl DocumentBackend for MongoTransaction {
    async fn insert_one(&self, collection: &str, key: Bson, document: Document) -> DocumentStoreResult<()> {
        let mut session = self.session.lock().await;
        Scope::new(&self.database, Some(&mut *session))
            .insert_one(collection, key, document)
            .await
    }

    async fn replace_one(
        &self,
        collection: &str,
        filter: &Predicate,
        key: Bson,
        replacement: Document,
        upsert: bool,
    ) -> DocumentStoreResult<ReplaceResult> {
        let mut session = self.session.lock().await;
        Scope::new(&self.database, Some(&mut *session))
            .replace_one(collection, filter, key, replacement, upsert)
            .await
    }

    async fn delete_one(&self, collection: &str, filter: &Predicate) -> DocumentStoreResult<DeleteResult> {
        let mut session = self.session.lock().await;
        Scope::new(&self.database, Some(&mut *session)).delete(collection, filter, false).await
    }

    async fn delete_many(&self, collection: &str, filter: &Predicate) -> DocumentStoreResult<DeleteResult> {
        let mut session = self.session.lock().await;
        Scope::new(&self.database, Some(&mut *session)).delete(collection, filter, true).await
    }

    async fn find(&self, collection: &str, query: &Query) -> DocumentStoreResult<Vec<Document>> {
        let mut session = self.session.lock().await;
        Scope::new(&self.database, Some(&mut *session)).find(collection, query).await
    }

    async fn count(&self, collection: &str, filter: &Predicate) -> DocumentStoreResult<u64> {
        let mut session = self.session.lock().await;
        Scope::new(&self.database, Some(&mut *session)).count(collection, filter).await
    }
}

#[async_trait]
impl TransactionBackend for MongoTransaction {
    async fn commit(self) -> DocumentStoreResult<()> {
        self.session
            .lock()
            .await
            .commit_transaction()
            .await
            .map_err(|e| DocumentStoreError::Transaction(e.to_string()))
    }

    async fn abort(self) -> DocumentStoreResult<()> {
        self.session
            .lock()
            .await
            .abort_transaction()
            .await
            .map_err(|e| DocumentStoreError::Transaction(e.to_string()))
    }
}

pub struct MongoDbStoreBuilder {
    settings: ConnectionSettings,
}

impl MongoDbStoreBuilder {
    pub fn new(dsn: &str, database: &str) -> Self {
        Self::from_settings(ConnectionSettings::new(dsn, database))
    }

    pub fn from_settings(settings: ConnectionSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl StoreBackendBuilder for MongoDbStoreBuilder {
    type Backend = MongoDbStore;

    async fn build(self) -> DocumentStoreResult<Self::Backend> {
        let options = ClientOptions::parse(&self.settings.connection_string)
            .await
            .map_err(|e| DocumentStoreError::Initialization(e.to_string()))?;

        info!(
            target: "fencedoc::store",
            hosts = ?options.hosts,
            database = %self.settings.database_name,
            "connecting to MongoDB",
        );

        let client = Client::with_options(options).map_err(|e| DocumentStoreError::Initialization(e.to_string()))?;

        Ok(MongoDbStore::new(client, self.settings.database_name))
    }
}
