use dotenvy::dotenv;
use snafu::ResultExt as _;
use video_analyst::config::Config;
use video_analyst::error::{ApplicationError, ConfigLoadSnafu};
use video_analyst::{bootstrap, logger};

#[tokio::main]
async fn main() -> Result<(), ApplicationError> {
    dotenv().ok();

    let config = Config::from_env().context(ConfigLoadSnafu)?;

    let _guard = logger::init(&config.log, "video-analyst.log")?;

    bootstrap::serve(&config).await
}
