//! Runs against a live MongoDB replica set named by `FENCEDOC_MONGODB_URL`.
//!
//! ```sh
//! FENCEDOC_MONGODB_URL=mongodb://localhost:27017/?replicaSet=rs0 cargo test -p fencedoc-mongodb -- --ignored
//! ```

use std::sync::atomic::{AtomicU32, Ordering};

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use fencedoc_core::{
    backend::{StoreBackend, StoreBackendBuilder},
    document::{Document, Version, VersionAdvance, Versioned},
    error::ErrorCode,
    query::{Filter, Predicate, Query, SortDirection},
    store::DocumentStore,
};
use fencedoc_mongodb::{MongoDbStore, MongoDbStoreBuilder};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Account {
    id: String,
    owner: String,
    zip: String,
    version: Version,
    updated: DateTime<Utc>,
}

impl Document for Account {
    type Key = String;

    fn id(&self) -> &String {
        &self.id
    }

    fn collection_name() -> &'static str {
        "accounts"
    }
}

impl Versioned for Account {
    fn version(&self) -> Version {
        self.version
    }

    fn updated(&self) -> DateTime<Utc> {
        self.updated
    }
}

impl VersionAdvance for Account {
    fn with_version(self, updated: DateTime<Utc>, next: Version) -> Self {
        Self { updated, version: next, ..self }
    }
}

fn account(id: &str, owner: &str, zip: &str, version: Version) -> Account {
    Account {
        id: id.to_string(),
        owner: owner.to_string(),
        zip: zip.to_string(),
        version,
        updated: Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap(),
    }
}

static DATABASES: AtomicU32 = AtomicU32::new(0);

async fn start_db() -> DocumentStore<MongoDbStore> {
    let url = std::env::var("FENCEDOC_MONGODB_URL").expect("FENCEDOC_MONGODB_URL is not set");
    let database = format!(
        "fencedoc_test_{}_{}",
        std::process::id(),
        DATABASES.fetch_add(1, Ordering::SeqCst)
    );

    let store = DocumentStore::new(MongoDbStoreBuilder::new(&url, &database).build().await.unwrap());

    store.create_collection("accounts").await.unwrap();
    store.add_index("accounts", "owner", true).await.unwrap();

    store
}

#[tokio::test]
#[ignore = "requires FENCEDOC_MONGODB_URL"]
async fn version_fence_detects_stale_writers() {
    let store = start_db().await;
    let accounts = store.collection::<Account>();
    accounts.add(account("a1", "John", "10000", 1)).await.unwrap();

    let updated = accounts.update_entity(account("a1", "John", "20000", 1)).await.unwrap();
    assert_eq!(updated.version, 2);

    let stale = accounts
        .try_update_entity(account("a1", "John", "30000", 1))
        .await
        .unwrap();
    assert_eq!(stale.unwrap_err().code, ErrorCode::RaceCondition);

    assert_eq!(accounts.get_by_id(&"a1".to_string()).await.unwrap().zip, "20000");
}

#[tokio::test]
#[ignore = "requires FENCEDOC_MONGODB_URL"]
async fn duplicates_are_classified() {
    let store = start_db().await;
    let accounts = store.collection::<Account>();
    accounts.add(account("a1", "John", "10000", 1)).await.unwrap();

    let same_key = accounts.try_add(account("a1", "Jane", "10000", 1)).await.unwrap();
    assert_eq!(same_key.unwrap_err().code, ErrorCode::Duplication);

    let same_owner = accounts.try_add(account("a2", "John", "10000", 1)).await.unwrap();
    assert_eq!(same_owner.unwrap_err().code, ErrorCode::Duplication);

    let other_identity = accounts
        .try_update_where(account("a2", "Jane", "10000", 1), &Filter::eq("owner", "John"))
        .await
        .unwrap();
    assert_eq!(other_identity.unwrap_err().code, ErrorCode::DatabaseTransactionError);
}

#[tokio::test]
#[ignore = "requires FENCEDOC_MONGODB_URL"]
async fn queries_sort_and_page_on_the_server() {
    let store = start_db().await;
    let accounts = store.collection::<Account>();
    for (id, owner) in [("a1", "Carol"), ("a2", "Alice"), ("a3", "Bob")] {
        accounts.add(account(id, owner, "10000", 1)).await.unwrap();
    }

    let page = accounts
        .find(Query::builder().sort("owner", SortDirection::Asc).offset(1).limit(1).build())
        .await
        .unwrap();

    assert_eq!(page, vec![account("a3", "Bob", "10000", 1)]);
    assert_eq!(accounts.count(&Filter::any_of("_id", ["a1", "a2"])).await.unwrap(), 2);
    assert!(accounts.find(Query::builder().limit(0).build()).await.unwrap().is_empty());
    assert_eq!(accounts.count(&Filter::and(Vec::<Predicate>::new())).await.unwrap(), 3);
    assert_eq!(accounts.count(&Filter::or(Vec::<Predicate>::new())).await.unwrap(), 0);
    assert_eq!(accounts.delete_all(&Filter::all()).await.unwrap(), 3);
    assert_eq!(store.list_collections().await.unwrap(), vec!["accounts".to_string()]);
}

#[tokio::test]
#[ignore = "requires FENCEDOC_MONGODB_URL"]
async fn transactions_commit_or_discard_together() {
    let store = start_db().await;

    let tx = store.transaction().await.unwrap();
    tx.collection::<Account>().add(account("a1", "John", "10000", 1)).await.unwrap();
    tx.abort().await.unwrap();
    assert_eq!(store.collection::<Account>().count(&Filter::all()).await.unwrap(), 0);

    let tx = store.transaction().await.unwrap();
    tx.collection::<Account>().add(account("a1", "John", "10000", 1)).await.unwrap();
    tx.collection::<Account>().add(account("a2", "Jane", "10000", 1)).await.unwrap();
    tx.commit().await.unwrap();
    assert_eq!(store.collection::<Account>().count(&Filter::all()).await.unwrap(), 2);

    store.drop_collection("accounts").await.unwrap();
    assert!(store.backend().list_collections().await.unwrap().is_empty());
}
