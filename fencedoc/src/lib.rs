//! Optimistic-concurrency CRUD for JSON document databases.
//!
//! This crate is the primary entry point of the fencedoc project. It re-exports
//! the core types from the sub-crates and gives access to the storage backends.
//!
//! # Features
//!
//! - **Version fencing** - writes carry the version they were read at; a stale
//!   writer gets a race condition instead of silently overwriting
//! - **Two calling conventions** - `try_*` operations return an [`error::Outcome`],
//!   the plain ones return the value or raise
//! - **Multiple backends** - in-memory and MongoDB
//! - **Schema migrations** - versioned steps, each in its own transaction
//!
//! # Quick Start
//!
//! ```ignore
//! use fencedoc::{prelude::*, memory::InMemoryStore};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! pub struct Customer {
//!     pub id: String,
//!     pub name: String,
//!     pub version: Version,
//!     pub updated: DateTime<Utc>,
//! }
//!
//! impl Document for Customer {
//!     type Key = String;
//!
//!     fn id(&self) -> &String { &self.id }
//!     fn collection_name() -> &'static str { "customers" }
//! }
//!
//! impl Versioned for Customer {
//!     fn version(&self) -> Version { self.version }
//!     fn updated(&self) -> DateTime<Utc> { self.updated }
//! }
//!
//! impl VersionAdvance for Customer {
//!     fn with_version(self, updated: DateTime<Utc>, version: Version) -> Self {
//!         Self { updated, version, ..self }
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> DocumentStoreResult<()> {
//!     let store = DocumentStore::new(InMemoryStore::builder().build().await?);
//!     let customers = store.collection::<Customer>();
//!
//!     let stored = customers.add(customer).await?;
//!
//!     // Succeeds once; a second writer holding the same version gets a race condition.
//!     let updated = customers.update_entity(stored.clone()).await?;
//!     let stale = customers.try_update_entity(stored).await?;
//!     assert_eq!(stale.unwrap_err().code, ErrorCode::RaceCondition);
//!
//!     store.shutdown().await
//! }
//! ```
//!
//! # Migrations
//!
//! ```ignore
//! use fencedoc::{prelude::*, migrate_host};
//!
//! struct CreateCustomers;
//!
//! #[async_trait]
//! impl<B: StoreBackend> Migration<B> for CreateCustomers {
//!     fn version(&self) -> SchemaVersion { SchemaVersion::new(1, 0, 0) }
//!     fn name(&self) -> &'static str { "create customers" }
//!
//!     async fn up(&self, op: &MigrateOp<'_, B>) -> DocumentStoreResult<()> {
//!         op.create_collection("customers").await?;
//!         op.add_index("customers", "name", true).await
//!     }
//!
//!     async fn down(&self, op: &MigrateOp<'_, B>) -> DocumentStoreResult<()> {
//!         op.drop_collection("customers").await
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> std::process::ExitCode {
//!     migrate_host::init_logging();
//!
//!     let result = migrate_host::run(std::env::args().skip(1), None, vec![Box::new(CreateCustomers)]).await;
//!
//!     migrate_host::main_exit_code(result)
//! }
//! ```
//!
//! # Backends
//!
//! - [`memory`] - in-memory storage for development and testing
//! - `mongodb` - MongoDB backend (requires the `mongodb` feature)

pub mod migrate_host;
pub mod prelude;

pub use fencedoc_core::{backend, collection, config, document, error, filter, interpret, migrate, query, store};

// Re-export BSON types for convenience
pub use bson;

/// In-memory storage backend implementations.
pub mod memory {
    pub use fencedoc_memory::{InMemoryStore, InMemoryStoreBuilder, InMemoryTransaction};
}

/// MongoDB storage backend implementations.
///
/// This module is only available when the `mongodb` feature is enabled.
#[cfg(feature = "mongodb")]
pub mod mongodb {
    pub use fencedoc_mongodb::{MongoDbStore, MongoDbStoreBuilder, MongoTransaction};
}
