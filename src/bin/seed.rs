use std::path::PathBuf;

use dotenvy::dotenv;
use snafu::ResultExt as _;
use video_analyst::bootstrap::{self, DEFAULT_DATASET};
use video_analyst::config::{DatabaseConfig, LogConfig};
use video_analyst::error::{ApplicationError, ConfigLoadSnafu};
use video_analyst::logger;

/// Usage: `seed [path/to/videos.json]`
#[tokio::main]
async fn main() -> Result<(), ApplicationError> {
    dotenv().ok();

    let database = DatabaseConfig::from_env().context(ConfigLoadSnafu)?;
    let log = LogConfig::from_env().context(ConfigLoadSnafu)?;

    let _guard = logger::init(&log, "seed.log")?;

    let path = std::env::args()
        .nth(1)
        .map_or_else(|| PathBuf::from(DEFAULT_DATASET), PathBuf::from);

    bootstrap::seed(&database, &path).await?;

    Ok(())
}
