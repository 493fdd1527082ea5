//! Process wiring shared by the binaries.

use std::path::Path;

use snafu::ResultExt as _;
use tokio::net::TcpListener;

use crate::api::{create_app, create_router};
use crate::catalog::Catalog;
use crate::config::{Config, DatabaseConfig};
use crate::dataset::{self, LoadSummary};
use crate::error::*;
use crate::llm::Ollama;
use crate::store::Connection as _;
use crate::translator::Translator;

/// Dataset read by `seed` when no path is given.
pub const DEFAULT_DATASET: &str = "videos.json";

/// Serve chat messages until the process is interrupted.
pub async fn serve(config: &Config) -> Result<(), ApplicationError> {
    let store = config.database.connect().await.context(ConnectDatabaseSnafu)?;
    let model = Ollama::from_config(&config.model).context(ModelClientSnafu)?;

    let translator = Translator::new(Catalog::default(), model, store.clone());
    let router = create_router(create_app(translator, &config.transport.token));

    let address = config.transport.address;
    let listener = TcpListener::bind(address)
        .await
        .context(BindAddressSnafu { address })?;

    tracing::info!(%address, model = %config.model.model, "listening for messages");

    let served = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context(WebServerSnafu);

    store.close().await;
    served
}

/// Create the schema if needed and upsert the dataset at `path`.
pub async fn seed(config: &DatabaseConfig, path: &Path) -> Result<LoadSummary, ApplicationError> {
    let store = config.connect().await.context(ConnectDatabaseSnafu)?;
    store.migrate().await.context(MigrateSnafu)?;

    let dataset = dataset::read(path).await.context(LoadDatasetSnafu)?;
    tracing::info!(
        path = %path.display(),
        videos = dataset.videos.len(),
        snapshots = dataset.snapshot_count(),
        "read the dataset"
    );

    let summary = dataset::load(store.pool(), &dataset).await;
    store.close().await;

    summary.context(LoadDatasetSnafu)
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(%error, "cannot listen for the shutdown signal");
        return std::future::pending().await;
    }

    tracing::info!("shutting down");
}
