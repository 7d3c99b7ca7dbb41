//! In-memory document storage backend for fencedoc.
//!
//! This crate provides a thread-safe, in-memory implementation of the
//! `StoreBackend` trait, suitable for tests and small deployments.
//!
//! # Features
//!
//! - **Store order** - documents are kept in insertion order
//! - **Unique indexes** - colliding writes fail as duplicates, like a real store
//! - **Dotted paths** - predicates reach into nested documents
//! - **Transactions** - snapshot isolation with all-or-nothing commit
//!
//! # Quick Start
//!
//! ```ignore
//! use fencedoc::{memory::InMemoryStore, prelude::*};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = DocumentStore::new(InMemoryStore::builder().build().await?);
//!     let customers = store.collection::<Customer>();
//!
//!     customers.add(customer).await?;
//!
//!     Ok(())
//! }
//! ```

pub mod evaluator;
pub mod store;

pub use store::{InMemoryStore, InMemoryStoreBuilder, InMemoryTransaction};
