//! Realtime event types for performance sessions
//!
//! Events are published per setlist and serialized for SSE transmission.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::models::{LeadershipRequest, PerformanceSession, RequestStatus};

/// Performance session event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SessionEvent {
    /// Current state sent when a subscriber connects (or reconnects)
    Snapshot {
        session: Option<PerformanceSession>,
    },

    /// A new session became the active one for the setlist
    SessionStarted { session: PerformanceSession },

    /// Leader moved to another set or song
    PositionChanged {
        session_id: Uuid,
        current_set_id: Option<Uuid>,
        current_song_id: Option<Uuid>,
    },

    /// Leadership moved to another user
    LeaderChanged {
        session_id: Uuid,
        previous_leader_id: Uuid,
        leader_id: Uuid,
        /// True for an admin override
        forced: bool,
    },

    /// A follower asked to become leader
    LeadershipRequested { request: LeadershipRequest },

    /// A leadership request left the pending state
    LeadershipResolved {
        request_id: Uuid,
        session_id: Uuid,
        status: RequestStatus,
        /// True when the server approved on the leader's behalf
        auto: bool,
    },

    ParticipantJoined { session_id: Uuid, user_id: Uuid },

    ParticipantLeft { session_id: Uuid, user_id: Uuid },

    /// Session reached its terminal state
    SessionEnded { session_id: Uuid },
}

impl SessionEvent {
    /// Name used for the SSE `event:` field
    pub fn event_type(&self) -> &'static str {
        match self {
            SessionEvent::Snapshot { .. } => "Snapshot",
            SessionEvent::SessionStarted { .. } => "SessionStarted",
            SessionEvent::PositionChanged { .. } => "PositionChanged",
            SessionEvent::LeaderChanged { .. } => "LeaderChanged",
            SessionEvent::LeadershipRequested { .. } => "LeadershipRequested",
            SessionEvent::LeadershipResolved { .. } => "LeadershipResolved",
            SessionEvent::ParticipantJoined { .. } => "ParticipantJoined",
            SessionEvent::ParticipantLeft { .. } => "ParticipantLeft",
            SessionEvent::SessionEnded { .. } => "SessionEnded",
        }
    }
}
