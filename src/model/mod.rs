use chrono::{DateTime, Utc};
use derive_new::new;
use serde::{Deserialize, Serialize};

pub use snapshot::*;
pub use video::*;

mod snapshot;
mod video;

pub type Timestamp = DateTime<Utc>;

/// A bulk export of the analytics store: every video together with its hourly snapshots.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, new)]
pub struct Dataset {
    #[serde(default)]
    pub videos: Vec<VideoRecord>,
}

impl Dataset {
    pub fn snapshot_count(&self) -> usize {
        self.videos.iter().map(|video| video.snapshots.len()).sum()
    }
}

/// A video as it appears in a [Dataset], with its snapshots nested inside.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, new)]
pub struct VideoRecord {
    #[serde(flatten)]
    pub video: Video,
    #[new(default)]
    #[serde(default)]
    pub snapshots: Vec<VideoSnapshot>,
}
