use snafu::Snafu;
use uuid::Uuid;

use super::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, new)]
#[serde(transparent)]
pub struct VideoId(Uuid);

impl VideoId {
    pub fn inner(&self) -> &Uuid {
        &self.0
    }
}

impl std::str::FromStr for VideoId {
    type Err = ParseVideoId;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        input
            .parse()
            .map(VideoId)
            .map_err(|_| ParseVideoId::new(input.to_string()))
    }
}

impl std::fmt::Display for VideoId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Snafu, new)]
#[snafu(display("Failed to parse video id: {}", text))]
pub struct ParseVideoId {
    pub text: String,
}

/// Final statistics of a single video, one row of the `videos` table.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, new)]
pub struct Video {
    pub id: VideoId,
    pub creator_id: String,
    pub video_created_at: Timestamp,

    #[serde(default)]
    pub views_count: i32,
    #[serde(default)]
    pub likes_count: i32,
    #[serde(default)]
    pub comments_count: i32,
    #[serde(default)]
    pub reports_count: i32,

    /// Missing or `null` in some exports, the database then fills in the load time.
    #[serde(default)]
    pub created_at: Option<Timestamp>,
    #[serde(default)]
    pub updated_at: Option<Timestamp>,
}
