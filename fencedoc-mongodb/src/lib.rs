//! MongoDB backend implementation for fencedoc.
//!
//! This crate provides a MongoDB-based implementation of the `StoreBackend` trait.
//! Predicates are translated into native filter documents, so conditional
//! replaces are atomic on the server and the version fence costs one round trip.
//!
//! To use this backend, include the `mongodb` feature in your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! fencedoc = { version = "x.y.z", features = ["mongodb"] }
//! ```
//!
//! # Features
//!
//! - **Atomic fencing** - replace-one with a `{_id, version}` filter
//! - **Unique indexes** - server duplicate-key errors classify as duplication
//! - **Transactions** - multi-document transactions over a client session
//!   (replica set or sharded cluster only)
//!
//! # Connection
//!
//! A connection string plus a database name, given directly or resolved from
//! the environment through [`ConnectionSettings`](fencedoc_core::config::ConnectionSettings).
//!
//! # Example
//!
//! ```ignore
//! use fencedoc::{backend::StoreBackendBuilder, mongodb::MongoDbStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = MongoDbStore::builder("mongodb://localhost:27017", "my_database")
//!         .build()
//!         .await?;
//!
//!     Ok(())
//! }
//! ```

mod query;
pub mod store;

pub use store::{MongoDbStore, MongoDbStoreBuilder, MongoTransaction};
