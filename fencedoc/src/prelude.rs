//! Convenient re-exports of commonly used types from fencedoc.
//!
//! ```ignore
//! use fencedoc::prelude::*;
//! ```
//!
//! This provides access to:
//! - Document traits and the clocks used for version advancement
//! - Collections, stores and transactions
//! - Predicates, queries and the key filters
//! - Error codes and both calling conventions
//! - Migration tools

pub use async_trait::async_trait;
pub use chrono::{DateTime, Utc};
pub use serde::{Deserialize, Serialize};

pub use fencedoc_core::{
    backend::{DocumentBackend, StoreBackend, StoreBackendBuilder, TransactionBackend},
    collection::Collection,
    config::{ConnectionSettings, ConnectionString},
    document::{Clock, Document, DocumentExt, FixedClock, SystemClock, Version, VersionAdvance, Versioned},
    error::{DocumentStoreError, DocumentStoreResult, ErrorCode, ErrorInfo, Outcome, OutcomeExt},
    filter::{by_id, by_id_and_version},
    migrate::{MigrateOp, Migration, MigrationRef, MigrationRunner, SchemaVersion, TargetVersion},
    query::{FieldOp, Filter, Predicate, Query, QueryBuilder, Sort, SortDirection},
    store::{DocumentStore, DocumentTransaction},
};
