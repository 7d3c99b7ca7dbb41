//! Entry point for a standalone migration executable.
//!
//! The target version is the first command-line argument, else the
//! `UpgradeVersion` variable, else `latest`. When `DelayExit` holds a number of
//! seconds the host waits that long after migrating, so a container
//! orchestrator sees the job finish cleanly.

use std::{process::ExitCode, time::Duration};

use tracing::{error, info};

use fencedoc_core::{
    backend::StoreBackend,
    error::DocumentStoreResult,
    migrate::{MigrationRunner, SchemaVersion, TargetVersion},
    store::DocumentStore,
};

pub const UPGRADE_VERSION_ENV: &str = "UpgradeVersion";
pub const DELAY_EXIT_ENV: &str = "DelayExit";

const LATEST: &str = "latest";

/// What a host invocation asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostOptions {
    pub version: String,
    pub delay_exit: Option<Duration>,
}

impl HostOptions {
    /// Options from `args` (program name already skipped) and the process environment.
    pub fn from_args<I>(args: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        Self::from_args_with(args, |key| std::env::var(key).ok())
    }

    pub fn from_args_with<I, F>(args: I, lookup: F) -> Self
    where
        I: IntoIterator<Item = String>,
        F: Fn(&str) -> Option<String>,
    {
        let version = args
            .into_iter()
            .next()
            .or_else(|| lookup(UPGRADE_VERSION_ENV))
            .unwrap_or_else(|| LATEST.to_string());

        // An unreadable delay is ignored.
        let delay_exit = lookup(DELAY_EXIT_ENV)
            .and_then(|seconds| seconds.trim().parse::<u64>().ok())
            .map(Duration::from_secs);

        Self { version, delay_exit }
    }

    /// # Errors
    ///
    /// [`InvalidRequest`](fencedoc_core::error::ErrorCode::InvalidRequest) when
    /// the version is neither a keyword nor `x.y.z`.
    pub fn target(&self) -> DocumentStoreResult<TargetVersion> {
        self.version.parse()
    }
}

/// Installs a `tracing` fmt subscriber writing to stdout. Does nothing when a
/// global subscriber is already set.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt().with_target(false).try_init();
}

/// Migrates an open store as `options` ask.
///
/// Returns the version reached, or `None` when the store was up to date.
pub async fn migrate<B: StoreBackend>(
    store: &DocumentStore<B>,
    runner: &MigrationRunner<B>,
    options: &HostOptions,
) -> DocumentStoreResult<Option<SchemaVersion>> {
    let target = options.target()?;

    info!(database = store.backend().database_name(), target = %options.version, "starting migration");

    let reached = runner.run(store, target).await?;

    match reached {
        Some(version) => info!(%version, "migrated"),
        None => info!("up to date"),
    }

    if let Some(delay) = options.delay_exit {
        info!(seconds = delay.as_secs(), "delaying exit");
        tokio::time::sleep(delay).await;
    }

    info!("end migration");

    Ok(reached)
}

/// Resolves connection settings, connects to MongoDB and migrates.
///
/// `connection` takes the place of `CS_CONNECTION`; see
/// [`ConnectionSettings::resolve`](fencedoc_core::config::ConnectionSettings::resolve).
#[cfg(feature = "mongodb")]
pub async fn run<I>(
    args: I,
    connection: Option<&str>,
    migrations: Vec<fencedoc_core::migrate::MigrationRef<fencedoc_mongodb::MongoDbStore>>,
) -> DocumentStoreResult<Option<SchemaVersion>>
where
    I: IntoIterator<Item = String>,
{
    use fencedoc_core::{backend::StoreBackendBuilder, config::ConnectionSettings};
    use fencedoc_mongodb::MongoDbStoreBuilder;

    let options = HostOptions::from_args(args);
    let settings = match connection {
        Some(connection) => ConnectionSettings::resolve(connection)?,
        None => ConnectionSettings::from_environment(None)?,
    };

    let store = DocumentStore::new(MongoDbStoreBuilder::from_settings(settings).build().await?);
    let reached = migrate(&store, &MigrationRunner::new(migrations), &options).await;

    store.shutdown().await?;

    reached
}

/// Maps the outcome of a host run to a process exit code, logging any failure.
pub fn main_exit_code<T>(result: DocumentStoreResult<T>) -> ExitCode {
    match result {
        Ok(_) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "migration failed");
            ExitCode::FAILURE
        }
    }
}
