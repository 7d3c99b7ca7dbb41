use std::time::{Duration, Instant};

use fencedoc::{
    memory::InMemoryStore,
    migrate_host::{self, HostOptions},
    prelude::*,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Ticket {
    id: String,
    title: String,
    version: Version,
    updated: DateTime<Utc>,
}

impl Document for Ticket {
    type Key = String;

    fn id(&self) -> &String {
        &self.id
    }

    fn collection_name() -> &'static str {
        "tickets"
    }
}

struct CreateTickets;

#[async_trait]
impl<B: StoreBackend> Migration<B> for CreateTickets {
    fn version(&self) -> SchemaVersion {
        SchemaVersion::new(0, 0, 1)
    }

    fn name(&self) -> &'static str {
        "create tickets"
    }

    async fn up(&self, op: &MigrateOp<'_, B>) -> DocumentStoreResult<()> {
        op.create_collection(Ticket::collection_name()).await?;
        op.add_index(Ticket::collection_name(), "title", true).await
    }

    async fn down(&self, op: &MigrateOp<'_, B>) -> DocumentStoreResult<()> {
        op.drop_collection(Ticket::collection_name()).await
    }
}

struct DropTitleIndex;

#[async_trait]
impl<B: StoreBackend> Migration<B> for DropTitleIndex {
    fn version(&self) -> SchemaVersion {
        SchemaVersion::new(0, 0, 2)
    }

    fn name(&self) -> &'static str {
        "drop title index"
    }

    async fn up(&self, op: &MigrateOp<'_, B>) -> DocumentStoreResult<()> {
        op.drop_index(Ticket::collection_name(), "title").await
    }

    async fn down(&self, op: &MigrateOp<'_, B>) -> DocumentStoreResult<()> {
        op.add_index(Ticket::collection_name(), "title", true).await
    }
}

fn runner() -> MigrationRunner<InMemoryStore> {
    MigrationRunner::new(vec![Box::new(CreateTickets), Box::new(DropTitleIndex)])
}

fn ticket(id: &str) -> Ticket {
    Ticket {
        id: id.to_string(),
        title: "Printer on fire".to_string(),
        version: 1,
        updated: DateTime::<Utc>::UNIX_EPOCH,
    }
}

fn options(version: &str) -> HostOptions {
    HostOptions { version: version.to_string(), delay_exit: None }
}

#[tokio::test]
async fn host_migrates_to_latest_then_reports_up_to_date() {
    let store = DocumentStore::new(InMemoryStore::named("tickets_db"));
    let runner = runner();

    let reached = migrate_host::migrate(&store, &runner, &options("latest")).await.unwrap();
    assert_eq!(reached, Some(SchemaVersion::new(0, 0, 2)));

    // The unique index is gone, so repeated titles are accepted.
    let tickets = store.collection::<Ticket>();
    tickets.add(ticket("t1")).await.unwrap();
    tickets.add(ticket("t2")).await.unwrap();

    assert_eq!(migrate_host::migrate(&store, &runner, &options("latest")).await.unwrap(), None);
}

#[tokio::test]
async fn host_downgrade_restores_the_previous_step() {
    let store = DocumentStore::new(InMemoryStore::new());
    let runner = runner();
    migrate_host::migrate(&store, &runner, &options("latest")).await.unwrap();

    let reached = migrate_host::migrate(&store, &runner, &options("downgrade")).await.unwrap();
    assert_eq!(reached, Some(SchemaVersion::new(0, 0, 1)));

    let tickets = store.collection::<Ticket>();
    tickets.add(ticket("t1")).await.unwrap();
    let repeated = tickets.try_add(ticket("t2")).await.unwrap();
    assert_eq!(repeated.unwrap_err().code, ErrorCode::Duplication);
}

#[tokio::test]
async fn host_rejects_a_malformed_version_before_touching_the_store() {
    let store = DocumentStore::new(InMemoryStore::new());

    let result = migrate_host::migrate(&store, &runner(), &options("1.2")).await;

    assert_eq!(result.unwrap_err().code(), Some(ErrorCode::InvalidRequest));
    assert!(store.list_collections().await.unwrap().is_empty());
}

#[tokio::test]
async fn host_waits_before_exiting_when_asked() {
    let store = DocumentStore::new(InMemoryStore::new());
    let delayed = HostOptions { version: "latest".to_string(), delay_exit: Some(Duration::from_secs(1)) };

    let started = Instant::now();
    migrate_host::migrate(&store, &runner(), &delayed).await.unwrap();

    assert!(started.elapsed() >= Duration::from_secs(1));
}
