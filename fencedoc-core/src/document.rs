//! Core traits for document representation, versioning and serialization.
//!
//! A persisted record implements [`Document`]. Records that take part in
//! optimistic concurrency additionally implement [`Versioned`], and
//! [`VersionAdvance`] when they can produce their own next version.
//!
//! The capability set decides at compile time which collection operations are
//! available: fenced writes (`update_versioned`, `update_entity`, ...) only exist
//! for [`VersionAdvance`] documents.

use std::{fmt::Debug, sync::Mutex};

use bson::{Bson, Document as BsonDocument, de::deserialize_from_document, ser::serialize_to_document};
use chrono::{DateTime, Utc};
use serde::{Serialize, de::DeserializeOwned};

use crate::error::DocumentStoreResult;

/// Version number used as a fencing token.
pub type Version = u32;

/// Reserved field holding a document's identity in every backend.
pub const ID_FIELD: &str = "_id";

/// Core trait that all documents stored in a document store must implement.
///
/// # Example
///
/// ```ignore
/// use fencedoc::document::Document;
/// use bson::Uuid;
/// use serde::{Serialize, Deserialize};
///
/// #[derive(Debug, Clone, Serialize, Deserialize)]
/// pub struct User {
///     pub id: Uuid,
///     pub name: String,
/// }
///
/// impl Document for User {
///     type Key = Uuid;
///
///     fn id(&self) -> &Uuid {
///         &self.id
///     }
///
///     fn collection_name() -> &'static str {
///         "users"
///     }
/// }
/// ```
pub trait Document: Serialize + DeserializeOwned + Send + Sync + Clone + 'static {
    /// Identity type. Stable and unique within the collection.
    type Key: Into<Bson> + Clone + Debug + Send + Sync + 'static;

    /// Returns a reference to this document's identity.
    fn id(&self) -> &Self::Key;

    /// Returns the name of the collection this document belongs to.
    fn collection_name() -> &'static str;
}

/// A document carrying a version and the time of its last update.
pub trait Versioned: Document {
    /// Name of the serialized field holding [`Versioned::version`].
    const VERSION_FIELD: &'static str = "version";

    fn version(&self) -> Version;

    fn updated(&self) -> DateTime<Utc>;
}

/// A versioned document able to produce the same document with a new version
/// and update time. Implementations must be pure.
pub trait VersionAdvance: Versioned {
    fn with_version(self, updated: DateTime<Utc>, next: Version) -> Self;
}

/// Returns `document` with its version incremented and its update time taken from `clock`.
///
/// `None` when the version space is exhausted.
pub fn advance_version<D: VersionAdvance>(document: D, clock: &dyn Clock) -> Option<D> {
    let current = document.version();
    advance_from(document, current, clock)
}

/// Like [`advance_version`], but counts from `current`, the version the write is fenced on.
pub fn advance_from<D: VersionAdvance>(document: D, current: Version, clock: &dyn Clock) -> Option<D> {
    let next = current.checked_add(1)?;
    Some(document.with_version(clock.now(), next))
}

/// Source of the current time for version advancement.
pub trait Clock: Send + Sync + Debug {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that always reports the same instant until told otherwise.
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self { now: Mutex::new(now) }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = now;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Serialization helpers, implemented for every [`Document`].
pub trait DocumentExt: Document {
    /// Serializes this document into a BSON document body.
    ///
    /// # Errors
    ///
    /// Returns an error if the document does not serialize to a BSON document.
    fn to_body(&self) -> DocumentStoreResult<BsonDocument>;

    /// Reads a document back from a stored body.
    fn from_body(body: BsonDocument) -> DocumentStoreResult<Self>;

    /// The identity as a BSON value.
    fn key_bson(&self) -> Bson;
}

impl<D: Document> DocumentExt for D {
    fn to_body(&self) -> DocumentStoreResult<BsonDocument> {
        Ok(serialize_to_document(self)?)
    }

    fn from_body(body: BsonDocument) -> DocumentStoreResult<Self> {
        Ok(deserialize_from_document(body)?)
    }

    fn key_bson(&self) -> Bson {
        self.id().clone().into()
    }
}
