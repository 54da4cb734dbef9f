use chrono::Utc;
use serde::{Deserialize, Serialize};

/// One playback-progress record.
///
/// Offsets are milliseconds, timestamps are epoch milliseconds. Both are
/// supplied by the caller; the store never derives them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    /// Surrogate identity. 0 means "not yet assigned".
    pub row_id: i64,

    /// Title (movie or series) identifier
    pub media_id: String,

    /// Episode identifier, absent for movies and show-level entries
    pub episode_id: Option<String>,

    pub title: String,

    /// "movie" or "tv" in practice; stored verbatim
    #[serde(rename = "type")]
    pub media_type: String,

    pub url: String,
    pub poster_image: Option<String>,

    pub episode_title: Option<String>,
    pub season_number: Option<i32>,
    pub episode_number: Option<i32>,

    pub position: i64,
    pub duration: i64,

    /// 0-100, informational only
    pub percent_watched: f64,

    /// Set by the caller, never derived by the store
    pub completed: bool,

    pub last_watched: i64,
    pub first_watched: i64,
}

/// The `(media_id, episode_id)` pair identifying a logical viewing entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NaturalKey {
    pub media_id: String,
    pub episode_id: Option<String>,
}

impl NaturalKey {
    pub fn new(media_id: impl Into<String>, episode_id: Option<String>) -> Self {
        Self {
            media_id: media_id.into(),
            episode_id,
        }
    }
}

impl std::fmt::Display for NaturalKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.episode_id {
            Some(episode_id) => write!(f, "{}/{}", self.media_id, episode_id),
            None => write!(f, "{}", self.media_id),
        }
    }
}

impl HistoryEntry {
    /// Create an unassigned entry with zero progress, stamped now.
    pub fn new(
        media_id: impl Into<String>,
        title: impl Into<String>,
        media_type: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        let now = now_millis();
        Self {
            row_id: 0,
            media_id: media_id.into(),
            episode_id: None,
            title: title.into(),
            media_type: media_type.into(),
            url: url.into(),
            poster_image: None,
            episode_title: None,
            season_number: None,
            episode_number: None,
            position: 0,
            duration: 0,
            percent_watched: 0.0,
            completed: false,
            last_watched: now,
            first_watched: now,
        }
    }

    /// Attach episode context
    pub fn with_episode(
        mut self,
        episode_id: impl Into<String>,
        episode_title: Option<String>,
        season_number: Option<i32>,
        episode_number: Option<i32>,
    ) -> Self {
        self.episode_id = Some(episode_id.into());
        self.episode_title = episode_title;
        self.season_number = season_number;
        self.episode_number = episode_number;
        self
    }

    pub fn with_poster(mut self, poster_image: impl Into<String>) -> Self {
        self.poster_image = Some(poster_image.into());
        self
    }

    pub fn natural_key(&self) -> NaturalKey {
        NaturalKey::new(self.media_id.clone(), self.episode_id.clone())
    }

    pub fn is_unassigned(&self) -> bool {
        self.row_id == 0
    }

    /// Apply a progress report.
    ///
    /// `percent_watched` is `position / duration * 100` (0 when the duration
    /// is unknown) and `completed` flips on at `completion_threshold` percent.
    pub fn apply_progress(
        &mut self,
        position: i64,
        duration: i64,
        completion_threshold: f64,
        watched_at: i64,
    ) {
        let percent_watched = if duration > 0 {
            position as f64 / duration as f64 * 100.0
        } else {
            0.0
        };

        self.position = position;
        self.duration = duration;
        self.percent_watched = percent_watched;
        self.completed = percent_watched >= completion_threshold;
        self.last_watched = watched_at;
    }
}

/// Current wall-clock time in epoch milliseconds
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}
