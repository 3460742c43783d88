//! Database models

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

/// Authorization tier of a user
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "i64", try_from = "i64")]
pub enum UserLevel {
    Member = 1,
    Editor = 2,
    Admin = 3,
}

impl From<UserLevel> for i64 {
    fn from(level: UserLevel) -> Self {
        level as i64
    }
}

impl TryFrom<i64> for UserLevel {
    type Error = Error;

    fn try_from(value: i64) -> Result<Self> {
        match value {
            1 => Ok(UserLevel::Member),
            2 => Ok(UserLevel::Editor),
            3 => Ok(UserLevel::Admin),
            other => Err(Error::InvalidInput(format!(
                "user_level must be 1 (member), 2 (editor) or 3 (admin), got {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    /// Free-text instrument or role in the band
    pub role: Option<String>,
    pub user_level: UserLevel,
    pub created_at: String,
    pub updated_at: String,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.user_level == UserLevel::Admin
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Song {
    pub id: Uuid,
    pub original_artist: String,
    pub title: String,
    pub key_signature: Option<String>,
    /// Rich HTML
    pub lyrics: Option<String>,
    pub performance_note: Option<String>,
    /// Beats per minute
    pub tempo: Option<i64>,
    pub created_at: String,
    pub updated_at: String,
}

/// Payload for creating or replacing a song
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SongInput {
    pub original_artist: String,
    pub title: String,
    #[serde(default)]
    pub key_signature: Option<String>,
    #[serde(default)]
    pub lyrics: Option<String>,
    #[serde(default)]
    pub performance_note: Option<String>,
    #[serde(default)]
    pub tempo: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Setlist {
    pub id: Uuid,
    pub name: String,
    pub is_public: bool,
    pub user_id: Uuid,
    pub created_at: String,
    pub updated_at: String,
}

/// Setlist row as returned by list queries
#[derive(Debug, Clone, Serialize)]
pub struct SetlistSummary {
    #[serde(flatten)]
    pub setlist: Setlist,
    pub set_count: i64,
    pub song_count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Set {
    pub id: Uuid,
    pub name: String,
    pub setlist_id: Uuid,
    pub set_order: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SetWithSongs {
    #[serde(flatten)]
    pub set: Set,
    pub songs: Vec<Song>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SetlistDetail {
    #[serde(flatten)]
    pub setlist: Setlist,
    pub sets: Vec<SetWithSongs>,
}

/// Kind of reusable song list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SongListKind {
    Template,
    Collection,
}

impl SongListKind {
    pub fn table(self) -> &'static str {
        match self {
            SongListKind::Template => "set_templates",
            SongListKind::Collection => "song_collections",
        }
    }

    pub fn junction(self) -> &'static str {
        match self {
            SongListKind::Template => "set_template_songs",
            SongListKind::Collection => "song_collection_songs",
        }
    }

    pub fn owner_column(self) -> &'static str {
        match self {
            SongListKind::Template => "template_id",
            SongListKind::Collection => "collection_id",
        }
    }

    /// Noun used in user-facing messages
    pub fn noun(self) -> &'static str {
        match self {
            SongListKind::Template => "template",
            SongListKind::Collection => "collection",
        }
    }
}

/// Set template or song collection
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SongList {
    pub id: Uuid,
    pub kind: SongListKind,
    pub name: String,
    pub description: Option<String>,
    pub is_public: bool,
    pub user_id: Uuid,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SongListDetail {
    #[serde(flatten)]
    pub list: SongList,
    pub songs: Vec<Song>,
}

/// How a performance session is driven
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionMode {
    /// One leader drives, followers watch
    #[default]
    Led,
    /// Single user, nobody can join
    Standalone,
}

impl SessionMode {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionMode::Led => "led",
            SessionMode::Standalone => "standalone",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "led" => Ok(SessionMode::Led),
            "standalone" => Ok(SessionMode::Standalone),
            other => Err(Error::Internal(format!("Unknown session mode '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSession {
    pub id: Uuid,
    pub setlist_id: Uuid,
    pub leader_id: Uuid,
    pub current_set_id: Option<Uuid>,
    pub current_song_id: Option<Uuid>,
    pub mode: SessionMode,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
    pub ended_at: Option<String>,
}

/// Follower presence marker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    pub session_id: Uuid,
    pub user_id: Uuid,
    pub user_name: String,
    pub role: Option<String>,
    pub joined_at: String,
    pub last_seen_at: String,
    pub is_active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
    Cancelled,
}

impl RequestStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Approved => "approved",
            RequestStatus::Rejected => "rejected",
            RequestStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(RequestStatus::Pending),
            "approved" => Ok(RequestStatus::Approved),
            "rejected" => Ok(RequestStatus::Rejected),
            "cancelled" => Ok(RequestStatus::Cancelled),
            other => Err(Error::Internal(format!("Unknown request status '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeadershipRequest {
    pub id: Uuid,
    pub session_id: Uuid,
    pub requester_id: Uuid,
    pub status: RequestStatus,
    pub created_at: String,
    pub auto_approve_at: String,
    pub resolved_at: Option<String>,
}
