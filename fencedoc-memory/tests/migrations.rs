mod common;

use async_trait::async_trait;

use fencedoc_core::{
    backend::StoreBackend,
    error::{DocumentStoreError, DocumentStoreResult},
    migrate::{MigrateOp, Migration, MigrationRef, MigrationRunner, SchemaVersion, TargetVersion},
};
use fencedoc_memory::InMemoryStore;

use common::*;

struct CreateCustomers;

#[async_trait]
impl<B: StoreBackend> Migration<B> for CreateCustomers {
    fn version(&self) -> SchemaVersion {
        SchemaVersion::new(1, 0, 0)
    }

    fn name(&self) -> &'static str {
        "create customers"
    }

    async fn up(&self, op: &MigrateOp<'_, B>) -> DocumentStoreResult<()> {
        op.create_collection("customers").await?;
        op.add_index("customers", "name", true).await
    }

    async fn down(&self, op: &MigrateOp<'_, B>) -> DocumentStoreResult<()> {
        op.drop_collection("customers").await
    }
}

struct SeedJohn;

#[async_trait]
impl<B: StoreBackend> Migration<B> for SeedJohn {
    fn version(&self) -> SchemaVersion {
        SchemaVersion::new(1, 1, 0)
    }

    fn name(&self) -> &'static str {
        "seed john"
    }

    async fn up(&self, op: &MigrateOp<'_, B>) -> DocumentStoreResult<()> {
        op.collection::<Customer>().add(john_doe()).await.map(|_| ())
    }

    async fn down(&self, op: &MigrateOp<'_, B>) -> DocumentStoreResult<()> {
        op.collection::<Customer>().delete_by_key(&john_doe().id).await.map(|_| ())
    }
}

struct BrokenStep;

#[async_trait]
impl<B: StoreBackend> Migration<B> for BrokenStep {
    fn version(&self) -> SchemaVersion {
        SchemaVersion::new(2, 0, 0)
    }

    fn name(&self) -> &'static str {
        "broken"
    }

    async fn up(&self, op: &MigrateOp<'_, B>) -> DocumentStoreResult<()> {
        op.collection::<Customer>().add(new_kid()).await?;
        Err(DocumentStoreError::Backend("disk on fire".into()))
    }

    async fn down(&self, _op: &MigrateOp<'_, B>) -> DocumentStoreResult<()> {
        Ok(())
    }
}

// Registered out of order on purpose; the runner orders by version.
fn registry() -> Vec<MigrationRef<InMemoryStore>> {
    vec![Box::new(SeedJohn), Box::new(CreateCustomers)]
}

#[tokio::test]
async fn latest_applies_every_step_in_order() {
    let store = start_db();
    let runner = MigrationRunner::new(registry());

    let reached = runner.run(&store, TargetVersion::Latest).await.unwrap();

    assert_eq!(reached, Some(SchemaVersion::new(1, 1, 0)));
    assert_eq!(runner.current_version(&store).await.unwrap(), SchemaVersion::new(1, 1, 0));
    assert_eq!(store.list_collections().await.unwrap(), vec!["customers".to_string()]);
    assert_eq!(store.collection::<Customer>().get_by_id(&john_doe().id).await.unwrap(), john_doe());
}

#[tokio::test]
async fn latest_twice_is_up_to_date() {
    let store = start_db();
    let runner = MigrationRunner::new(registry());

    runner.run(&store, TargetVersion::Latest).await.unwrap();

    assert_eq!(runner.run(&store, TargetVersion::Latest).await.unwrap(), None);
}

#[tokio::test]
async fn downgrade_steps_back_one_version() {
    let store = start_db();
    let runner = MigrationRunner::new(registry());
    runner.run(&store, TargetVersion::Latest).await.unwrap();

    let reached = runner.run(&store, TargetVersion::Downgrade).await.unwrap();

    assert_eq!(reached, Some(SchemaVersion::new(1, 0, 0)));
    assert!(store.collection::<Customer>().try_get_by_id(&john_doe().id).await.unwrap().is_err());

    // Nothing is registered below the first migration.
    assert_eq!(runner.run(&store, TargetVersion::Downgrade).await.unwrap(), None);
}

#[tokio::test]
async fn exact_zero_reverts_everything() {
    let store = start_db();
    let runner = MigrationRunner::new(registry());
    runner.run(&store, TargetVersion::Latest).await.unwrap();

    let reached = runner.run(&store, TargetVersion::Exact(SchemaVersion::ZERO)).await.unwrap();

    assert_eq!(reached, Some(SchemaVersion::ZERO));
    assert_eq!(runner.current_version(&store).await.unwrap(), SchemaVersion::ZERO);
    assert!(store.list_collections().await.unwrap().is_empty());
}

#[tokio::test]
async fn failing_step_keeps_the_recorded_version_and_its_writes_are_rolled_back() {
    let store = start_db();
    let mut migrations = registry();
    migrations.push(Box::new(BrokenStep));
    let runner = MigrationRunner::new(migrations);

    let error = runner.run(&store, TargetVersion::Latest).await.unwrap_err();

    assert!(matches!(error, DocumentStoreError::Migration(_)));
    assert_eq!(runner.current_version(&store).await.unwrap(), SchemaVersion::new(1, 1, 0));
    assert!(store.collection::<Customer>().try_get_by_id(&new_kid().id).await.unwrap().is_err());
}

#[tokio::test]
async fn unregistered_exact_version_is_rejected() {
    let store = start_db();
    let runner = MigrationRunner::new(registry());

    let error = runner
        .run(&store, TargetVersion::Exact(SchemaVersion::new(9, 9, 9)))
        .await
        .unwrap_err();

    assert!(matches!(error, DocumentStoreError::Migration(_)));
    assert_eq!(runner.current_version(&store).await.unwrap(), SchemaVersion::ZERO);
}

#[test]
fn keywords_resolve_against_registered_versions() {
    let runner = MigrationRunner::new(registry());
    let v100 = SchemaVersion::new(1, 0, 0);
    let v110 = SchemaVersion::new(1, 1, 0);

    assert_eq!(runner.resolve_target(SchemaVersion::ZERO, TargetVersion::Latest), Some(v110));
    assert_eq!(runner.resolve_target(v110, TargetVersion::Latest), None);
    assert_eq!(runner.resolve_target(v110, TargetVersion::Downgrade), Some(v100));
    assert_eq!(runner.resolve_target(SchemaVersion::ZERO, TargetVersion::Downgrade), None);
}
