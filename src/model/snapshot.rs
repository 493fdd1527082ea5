use super::*;

/// An hourly sample of a video's counters. The `delta_*` fields hold the growth since the previous snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, new)]
pub struct VideoSnapshot {
    pub id: String,
    pub video_id: VideoId,

    #[serde(default)]
    pub views_count: i32,
    #[serde(default)]
    pub likes_count: i32,
    #[serde(default)]
    pub comments_count: i32,
    #[serde(default)]
    pub reports_count: i32,

    #[serde(default)]
    pub delta_views_count: i32,
    #[serde(default)]
    pub delta_likes_count: i32,
    #[serde(default)]
    pub delta_comments_count: i32,
    #[serde(default)]
    pub delta_reports_count: i32,

    /// When the sample was taken.
    pub created_at: Timestamp,
    #[serde(default)]
    pub updated_at: Option<Timestamp>,
}
