//! Schema migration framework for document stores.
//!
//! Migrations are identified by a [`SchemaVersion`] and registered explicitly,
//! in any order, with a [`MigrationRunner`]. The store records the version it
//! is at in the `_schema_version` collection.
//!
//! Each step runs in its own transaction together with the write that records
//! its version, so a failing step leaves both the data and the recorded version
//! as they were before it.
//!
//! # Example
//!
//! ```ignore
//! use fencedoc::migrate::{MigrateOp, Migration, MigrationRunner, SchemaVersion, TargetVersion};
//!
//! struct CreateCustomers;
//!
//! #[async_trait::async_trait]
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
//! let runner = MigrationRunner::new(vec![Box::new(CreateCustomers)]);
//! runner.run(&store, TargetVersion::Latest).await?;
//! ```

use std::{fmt, str::FromStr};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
    backend::StoreBackend,
    collection::Collection,
    document::Document,
    error::{DocumentStoreError, DocumentStoreResult, ErrorCode, ErrorInfo, OutcomeExt},
    store::{DocumentStore, DocumentTransaction},
};

/// Collection holding the recorded schema version.
pub const SCHEMA_VERSION_COLLECTION: &str = "_schema_version";

const SCHEMA_RECORD_ID: &str = "current";

/// A `major.minor.patch` schema version. `0.0.0` means no migration applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SchemaVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl SchemaVersion {
    pub const ZERO: SchemaVersion = SchemaVersion::new(0, 0, 0);

    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self { major, minor, patch }
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for SchemaVersion {
    type Err = DocumentStoreError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let invalid = || ErrorInfo::new(ErrorCode::InvalidRequest, format!("Invalid schema version '{value}'"));

        let parts = value
            .trim()
            .split('.')
            .map(|part| part.parse::<u32>().map_err(|_| invalid()))
            .collect::<Result<Vec<_>, _>>()?;

        match parts.as_slice() {
            [major, minor, patch] => Ok(Self::new(*major, *minor, *patch)),
            _ => Err(invalid().into()),
        }
    }
}

/// The version a migration run should end at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetVersion {
    /// The highest registered version above the current one.
    Latest,
    /// The highest registered version below the current one.
    Downgrade,
    Exact(SchemaVersion),
}

impl FromStr for TargetVersion {
    type Err = DocumentStoreError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "latest" => Ok(TargetVersion::Latest),
            "downgrade" => Ok(TargetVersion::Downgrade),
            other => other.parse().map(TargetVersion::Exact).map_err(|_| {
                ErrorInfo::new(
                    ErrorCode::InvalidRequest,
                    format!("Invalid version '{other}'. Only 'latest', 'downgrade', or a x.y.z version is accepted."),
                )
                .into()
            }),
        }
    }
}

/// A single migration step.
#[async_trait]
pub trait Migration<B: StoreBackend>: Send + Sync {
    /// The schema version the store is at once [`up`](Self::up) has run.
    fn version(&self) -> SchemaVersion;

    fn name(&self) -> &'static str;

    async fn up(&self, op: &MigrateOp<'_, B>) -> DocumentStoreResult<()>;

    /// Reverses [`up`](Self::up).
    async fn down(&self, op: &MigrateOp<'_, B>) -> DocumentStoreResult<()>;
}

pub type MigrationRef<B> = Box<dyn Migration<B>>;

/// What a migration step may do: schema administration on the store, and
/// document writes inside the step's transaction.
pub struct MigrateOp<'a, B: StoreBackend> {
    store: &'a DocumentStore<B>,
    transaction: &'a DocumentTransaction<B::Transaction>,
}

impl<'a, B: StoreBackend> MigrateOp<'a, B> {
    pub fn new(store: &'a DocumentStore<B>, transaction: &'a DocumentTransaction<B::Transaction>) -> Self {
        Self { store, transaction }
    }

    pub async fn create_collection(&self, name: &str) -> DocumentStoreResult<()> {
        self.store.create_collection(name).await
    }

    pub async fn drop_collection(&self, name: &str) -> DocumentStoreResult<()> {
        self.store.drop_collection(name).await
    }

    pub async fn list_collections(&self) -> DocumentStoreResult<Vec<String>> {
        self.store.list_collections().await
    }

    pub async fn add_index(&self, collection: &str, field: &str, unique: bool) -> DocumentStoreResult<()> {
        self.store.add_index(collection, field, unique).await
    }

    pub async fn drop_index(&self, collection: &str, field: &str) -> DocumentStoreResult<()> {
        self.store.drop_index(collection, field).await
    }

    /// A collection bound to the step's transaction.
    pub fn collection<D: Document>(&self) -> Collection<'a, B::Transaction, D> {
        self.transaction.collection::<D>()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SchemaRecord {
    id: String,
    version: String,
    name: String,
    applied: DateTime<Utc>,
}

impl Document for SchemaRecord {
    type Key = String;

    fn id(&self) -> &String {
        &self.id
    }

    fn collection_name() -> &'static str {
        SCHEMA_VERSION_COLLECTION
    }
}

/// Applies registered migrations to a store.
pub struct MigrationRunner<B: StoreBackend> {
    migrations: Vec<MigrationRef<B>>,
}

impl<B: StoreBackend> MigrationRunner<B> {
    pub fn new(mut migrations: Vec<MigrationRef<B>>) -> Self {
        migrations.sort_by_key(|migration| migration.version());
        Self { migrations }
    }

    pub fn versions(&self) -> Vec<SchemaVersion> {
        self.migrations
            .iter()
            .map(|migration| migration.version())
            .collect()
    }

    fn validate(&self) -> DocumentStoreResult<()> {
        if let Some(pair) = self
            .migrations
            .windows(2)
            .find(|pair| pair[0].version() == pair[1].version())
        {
            return Err(DocumentStoreError::Migration(format!(
                "Migrations '{}' and '{}' share version {}",
                pair[0].name(),
                pair[1].name(),
                pair[0].version()
            )));
        }

        if self
            .migrations
            .first()
            .is_some_and(|migration| migration.version() == SchemaVersion::ZERO)
        {
            return Err(DocumentStoreError::Migration(format!(
                "Version {} is reserved for an unmigrated store",
                SchemaVersion::ZERO
            )));
        }

        Ok(())
    }

    /// The version recorded in `store`, or [`SchemaVersion::ZERO`] when none is.
    pub async fn current_version(&self, store: &DocumentStore<B>) -> DocumentStoreResult<SchemaVersion> {
        let records = store.collection::<SchemaRecord>();

        match records.try_get_by_id(&SCHEMA_RECORD_ID.to_string()).await? {
            Ok(record) => record.version.parse(),
            Err(info) if info.code == ErrorCode::NotFound => Ok(SchemaVersion::ZERO),
            Err(info) => Err(info.into()),
        }
    }

    /// Turns `target` into a concrete version relative to `current`.
    ///
    /// `None` means there is nothing to do.
    pub fn resolve_target(&self, current: SchemaVersion, target: TargetVersion) -> Option<SchemaVersion> {
        let versions = self.versions();

        let resolved = match target {
            TargetVersion::Latest => versions.into_iter().rev().find(|version| *version > current),
            TargetVersion::Downgrade => versions.into_iter().rev().find(|version| *version < current),
            TargetVersion::Exact(version) => Some(version),
        };

        resolved.filter(|version| *version != current)
    }

    /// Migrates `store` to `target`. Returns the version reached, or `None`
    /// when the store was already there.
    ///
    /// # Errors
    ///
    /// [`DocumentStoreError::Migration`] when the registry is inconsistent, the
    /// target is not a registered version, or a step fails. Steps completed
    /// before the failure stay applied.
    pub async fn run(&self, store: &DocumentStore<B>, target: TargetVersion) -> DocumentStoreResult<Option<SchemaVersion>> {
        self.validate()?;

        let current = self.current_version(store).await?;
        let Some(target) = self.resolve_target(current, target) else {
            info!(target: "fencedoc::migrate", version = %current, "schema is up to date");
            return Ok(None);
        };

        if target != SchemaVersion::ZERO && !self.versions().contains(&target) {
            return Err(DocumentStoreError::Migration(format!("No migration has version {target}")));
        }

        info!(target: "fencedoc::migrate", from = %current, to = %target, "migrating schema");

        if target > current {
            for migration in self
                .migrations
                .iter()
                .filter(|migration| migration.version() > current && migration.version() <= target)
            {
                self.step(store, migration.as_ref(), true, migration.version()).await?;
            }
        } else {
            for (index, migration) in self.migrations.iter().enumerate().rev() {
                let version = migration.version();
                if version <= target || version > current {
                    continue;
                }

                let below = index
                    .checked_sub(1)
                    .map(|previous| self.migrations[previous].version())
                    .unwrap_or(SchemaVersion::ZERO);

                self.step(store, migration.as_ref(), false, below).await?;
            }
        }

        Ok(Some(target))
    }

    async fn step(
        &self,
        store: &DocumentStore<B>,
        migration: &dyn Migration<B>,
        up: bool,
        reached: SchemaVersion,
    ) -> DocumentStoreResult<()> {
        let direction = if up { "up" } else { "down" };
        info!(
            target: "fencedoc::migrate",
            migration = migration.name(),
            version = %migration.version(),
            direction,
            "applying migration step"
        );

        let transaction = store.transaction().await?;

        let applied = async {
            let op = MigrateOp::new(store, &transaction);
            if up {
                migration.up(&op).await?;
            } else {
                migration.down(&op).await?;
            }

            let record = SchemaRecord {
                id: SCHEMA_RECORD_ID.to_string(),
                version: reached.to_string(),
                name: migration.name().to_string(),
                applied: Utc::now(),
            };
            op.collection::<SchemaRecord>()
                .try_upsert_by_key(&record.id.clone(), record)
                .await?
                .unwrap_or_raise()
                .map(|_| ())
        }
        .await;

        match applied {
            Ok(()) => transaction.commit().await,
            Err(err) => {
                if let Err(abort) = transaction.abort().await {
                    warn!(target: "fencedoc::migrate", error = %abort, "failed to abort migration transaction");
                }

                Err(DocumentStoreError::Migration(format!(
                    "Migration '{}' ({}) failed {direction}: {err}",
                    migration.name(),
                    migration.version()
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn versions_parse_and_order() {
        let low: SchemaVersion = "1.2.3".parse().unwrap();
        let high: SchemaVersion = "1.10.0".parse().unwrap();

        assert_eq!(low, SchemaVersion::new(1, 2, 3));
        assert!(low < high);
        assert_eq!(high.to_string(), "1.10.0");
    }

    #[test]
    fn malformed_versions_are_invalid_requests() {
        for text in ["1.2", "1.2.3.4", "a.b.c", ""] {
            let error = text.parse::<SchemaVersion>().unwrap_err();
            assert_eq!(error.code(), Some(ErrorCode::InvalidRequest), "{text}");
        }
    }

    #[test]
    fn target_keywords_parse() {
        assert_eq!("latest".parse::<TargetVersion>().unwrap(), TargetVersion::Latest);
        assert_eq!("downgrade".parse::<TargetVersion>().unwrap(), TargetVersion::Downgrade);
        assert_eq!(
            "2.0.1".parse::<TargetVersion>().unwrap(),
            TargetVersion::Exact(SchemaVersion::new(2, 0, 1))
        );
        assert_eq!(
            "newest".parse::<TargetVersion>().unwrap_err().code(),
            Some(ErrorCode::InvalidRequest)
        );
    }
}
