//! One-time bulk load of the JSON export into the analytics tables.

use std::path::{Path, PathBuf};

use snafu::{Location, ResultExt as _, Snafu};
use sqlx::{PgConnection, PgPool};
use tracing::instrument;

use crate::model::{Dataset, Video, VideoId, VideoSnapshot};
use crate::Located;

pub type Result<T, E = DatasetError> = std::result::Result<T, E>;

/// Videos written per transaction.
pub const BATCH_SIZE: usize = 100;

const UPSERT_VIDEO: &str = r#"
INSERT INTO videos (
    id, creator_id, video_created_at, views_count, likes_count, comments_count, reports_count, created_at, updated_at
) VALUES ($1, $2, $3, $4, $5, $6, $7, COALESCE($8, CURRENT_TIMESTAMP), COALESCE($9, CURRENT_TIMESTAMP))
ON CONFLICT (id) DO UPDATE SET
    views_count = EXCLUDED.views_count,
    likes_count = EXCLUDED.likes_count,
    comments_count = EXCLUDED.comments_count,
    reports_count = EXCLUDED.reports_count,
    updated_at = EXCLUDED.updated_at
"#;

const UPSERT_SNAPSHOT: &str = r#"
INSERT INTO video_snapshots (
    id, video_id, views_count, likes_count, comments_count, reports_count,
    delta_views_count, delta_likes_count, delta_comments_count, delta_reports_count,
    created_at, updated_at
) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, COALESCE($12, CURRENT_TIMESTAMP))
ON CONFLICT (id) DO UPDATE SET
    views_count = EXCLUDED.views_count,
    likes_count = EXCLUDED.likes_count,
    comments_count = EXCLUDED.comments_count,
    reports_count = EXCLUDED.reports_count,
    delta_views_count = EXCLUDED.delta_views_count,
    delta_likes_count = EXCLUDED.delta_likes_count,
    delta_comments_count = EXCLUDED.delta_comments_count,
    delta_reports_count = EXCLUDED.delta_reports_count,
    updated_at = EXCLUDED.updated_at
"#;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum DatasetError {
    #[snafu(display("cannot read `{}` at {location}: {source}", path.display()))]
    ReadDataset {
        path: PathBuf,
        source: std::io::Error,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("`{}` is not a valid dataset at {location}: {source}", path.display()))]
    ParseDataset {
        path: PathBuf,
        source: serde_json::Error,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("batch {batch} failed at {location}: {source}"))]
    Transaction {
        batch: usize,
        source: sqlx::Error,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("cannot insert video {id} at {location}: {source}"))]
    InsertVideo {
        id: VideoId,
        source: sqlx::Error,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("cannot insert snapshot {id} at {location}: {source}"))]
    InsertSnapshot {
        id: String,
        source: sqlx::Error,
        #[snafu(implicit)]
        location: Location,
    },
}

impl Located for DatasetError {
    fn location(&self) -> Location {
        match self {
            DatasetError::ReadDataset { location, .. }
            | DatasetError::ParseDataset { location, .. }
            | DatasetError::Transaction { location, .. }
            | DatasetError::InsertVideo { location, .. }
            | DatasetError::InsertSnapshot { location, .. } => *location,
        }
    }
}

/// Totals of a finished load.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LoadSummary {
    pub batches: usize,
    pub videos: usize,
    pub snapshots: usize,
}

pub async fn read(path: &Path) -> Result<Dataset> {
    let bytes = tokio::fs::read(path).await.context(ReadDatasetSnafu { path })?;
    parse(&bytes, path)
}

fn parse(bytes: &[u8], path: &Path) -> Result<Dataset> {
    serde_json::from_slice(bytes).context(ParseDatasetSnafu { path })
}

/// Upsert every video and its snapshots, one transaction per [BATCH_SIZE] videos.
///
/// A failing row rolls back its whole batch and stops the load; earlier batches stay committed.
#[instrument(skip_all, fields(videos = dataset.videos.len(), snapshots = dataset.snapshot_count()))]
pub async fn load(pool: &PgPool, dataset: &Dataset) -> Result<LoadSummary> {
    let total = dataset.videos.len();
    let mut summary = LoadSummary::default();

    for (index, records) in dataset.videos.chunks(BATCH_SIZE).enumerate() {
        let batch = index + 1;
        let mut tx = pool.begin().await.context(TransactionSnafu { batch })?;

        for record in records {
            upsert_video(&mut *tx, &record.video).await?;
            for snapshot in &record.snapshots {
                upsert_snapshot(&mut *tx, snapshot).await?;
            }

            summary.snapshots += record.snapshots.len();
        }

        tx.commit().await.context(TransactionSnafu { batch })?;

        summary.batches = batch;
        summary.videos += records.len();
        tracing::info!(batch, loaded = summary.videos, total, "committed a batch");
    }

    tracing::info!(
        batches = summary.batches,
        videos = summary.videos,
        snapshots = summary.snapshots,
        "dataset loaded"
    );

    Ok(summary)
}

async fn upsert_video(conn: &mut PgConnection, video: &Video) -> Result<()> {
    sqlx::query(UPSERT_VIDEO)
        .bind(*video.id.inner())
        .bind(&video.creator_id)
        .bind(video.video_created_at)
        .bind(video.views_count)
        .bind(video.likes_count)
        .bind(video.comments_count)
        .bind(video.reports_count)
        .bind(video.created_at)
        .bind(video.updated_at)
        .execute(conn)
        .await
        .context(InsertVideoSnafu { id: video.id })?;

    Ok(())
}

async fn upsert_snapshot(conn: &mut PgConnection, snapshot: &VideoSnapshot) -> Result<()> {
    sqlx::query(UPSERT_SNAPSHOT)
        .bind(&snapshot.id)
        .bind(*snapshot.video_id.inner())
        .bind(snapshot.views_count)
        .bind(snapshot.likes_count)
        .bind(snapshot.comments_count)
        .bind(snapshot.reports_count)
        .bind(snapshot.delta_views_count)
        .bind(snapshot.delta_likes_count)
        .bind(snapshot.delta_comments_count)
        .bind(snapshot.delta_reports_count)
        .bind(snapshot.created_at)
        .bind(snapshot.updated_at)
        .execute(conn)
        .await
        .context(InsertSnapshotSnafu { id: &snapshot.id })?;

    Ok(())
}
