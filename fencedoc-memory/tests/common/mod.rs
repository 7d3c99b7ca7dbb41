//! Shared customer fixtures for the in-memory integration suites.
//!
//! Import via `mod common;` from any test file.

#![allow(dead_code)]

use std::sync::Arc;

use bson::Uuid;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use fencedoc_core::{
    document::{Document, FixedClock, Version, VersionAdvance, Versioned},
    store::DocumentStore,
};
use fencedoc_memory::InMemoryStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub country: String,
    pub zip: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub id: Uuid,
    pub name: String,
    pub address: Address,
    pub version: Version,
    pub updated: DateTime<Utc>,
}

impl Document for Customer {
    type Key = Uuid;

    fn id(&self) -> &Uuid {
        &self.id
    }

    fn collection_name() -> &'static str {
        "customers"
    }
}

impl Versioned for Customer {
    fn version(&self) -> Version {
        self.version
    }

    fn updated(&self) -> DateTime<Utc> {
        self.updated
    }
}

impl VersionAdvance for Customer {
    fn with_version(self, updated: DateTime<Utc>, next: Version) -> Self {
        Self { updated, version: next, ..self }
    }
}

impl Customer {
    pub fn new(id: &str, name: &str, country: &str, zip: &str, version: Version, updated: DateTime<Utc>) -> Self {
        Self {
            id: uuid(id),
            name: name.to_string(),
            address: Address { country: country.to_string(), zip: zip.to_string() },
            version,
            updated,
        }
    }

    pub fn with_zip(self, zip: &str) -> Self {
        Self {
            address: Address { zip: zip.to_string(), ..self.address },
            ..self
        }
    }
}

pub const UNIQUE_ZIP: &str = "11111";

pub fn uuid(text: &str) -> Uuid {
    Uuid::parse_str(text).unwrap()
}

pub fn unused_id_1() -> Uuid {
    uuid("503461E9-969B-4847-8CC7-F920370C39AB")
}

pub fn unused_id_2() -> Uuid {
    uuid("1F9E1596-3484-44C2-B0C3-B55CF69CAAD1")
}

pub fn utc(year: i32, month: u32, day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, hour, 0, 0).unwrap()
}

pub fn new_year_2024() -> DateTime<Utc> {
    utc(2024, 1, 1, 0)
}

pub fn john_doe() -> Customer {
    Customer::new("0B8D9631-720A-46B7-8C95-F55B4EC520A4", "John Doe", "TH", UNIQUE_ZIP, 1, utc(2020, 1, 1, 17))
}

pub fn jane_doe() -> Customer {
    Customer::new("B823FD8C-C995-4B64-96FB-D83BEBAAD21D", "Jane Doe", "TH", "10000", 2, utc(2020, 1, 31, 17))
}

pub fn hello_world() -> Customer {
    Customer::new("711ca94d-239c-4e67-81c9-1f2f155b3f43", "Hello World", "US", "10000", 1, utc(2020, 2, 13, 17))
}

/// Never stored by [`start_with_samples`].
pub fn new_kid() -> Customer {
    Customer::new("BADA86E1-5EAD-4FAE-BDA6-D2C108A7BD9B", "New Kid", "US", "10000", 1, utc(2020, 2, 13, 17))
}

/// An empty store whose clock is fixed at [`new_year_2024`].
pub fn start_db() -> DocumentStore<InMemoryStore> {
    DocumentStore::new(InMemoryStore::new()).with_clock(Arc::new(FixedClock::new(new_year_2024())))
}

pub async fn start_with_samples() -> DocumentStore<InMemoryStore> {
    let store = start_db();
    let customers = store.collection::<Customer>();

    for customer in [john_doe(), jane_doe(), hello_world()] {
        customers.add(customer).await.unwrap();
    }

    store
}
