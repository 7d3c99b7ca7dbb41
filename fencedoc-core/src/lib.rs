//! Optimistic-concurrency CRUD over JSON document databases.
//!
//! This crate is the core of the fencedoc project and provides:
//!
//! - **Document traits** ([`document`]) - identity, versions and version advancement
//! - **Predicates** ([`query`], [`filter`]) - backend-neutral filters with dotted paths
//! - **Backend abstraction** ([`backend`]) - the primitives a store must offer
//! - **Collections** ([`collection`]) - typed CRUD with version fencing, in safe and strict forms
//! - **Result interpretation** ([`interpret`]) - classification of raw write acknowledgments
//! - **Document store** ([`store`]) - collections, transactions and schema administration
//! - **Error handling** ([`error`]) - error codes, [`error::ErrorInfo`] and [`error::Outcome`]
//! - **Connection settings** ([`config`]) - connection string parsing and environment lookup
//! - **Schema migrations** ([`migrate`]) - versioned, transactional migration steps
//!
//! # Example
//!
//! ```ignore
//! use fencedoc::prelude::*;
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! pub struct Customer {
//!     pub id: String,
//!     pub name: String,
//!     pub version: u32,
//!     pub updated: DateTime<Utc>,
//! }
//!
//! impl Document for Customer {
//!     type Key = String;
//!
//!     fn id(&self) -> &String {
//!         &self.id
//!     }
//!
//!     fn collection_name() -> &'static str {
//!         "customers"
//!     }
//! }
//! ```

pub mod backend;
pub mod collection;
pub mod config;
pub mod document;
pub mod error;
pub mod filter;
pub mod interpret;
pub mod migrate;
pub mod query;
pub mod store;
