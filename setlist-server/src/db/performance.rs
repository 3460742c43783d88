//! Performance sessions
//!
//! A setlist has at most one active session. The leader drives the shared
//! position; followers join as participants and may ask to take over. A
//! pending request is approved by the server when the leader has not answered
//! by `auto_approve_at`, so an absent leader cannot strand the band.
//!
//! Every state change is published on the setlist's hub channel after the
//! transaction commits.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use setlist_common::db::models::{
    LeadershipRequest, Participant, PerformanceSession, RequestStatus, SessionMode, User, UserLevel,
};
use setlist_common::db::retry_on_lock;
use setlist_common::events::SessionEvent;
use setlist_common::uuid_utils::{generate, parse_column, parse_optional};
use setlist_common::{time, Error, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::access::require_level;
use super::{begin_write, load_junction_song_ids};
use super::sets::load_sets;
use super::setlists::load_visible_setlist;
use crate::realtime::SessionHub;

const SESSION_COLUMNS: &str = "id, setlist_id, leader_id, current_set_id, current_song_id, mode, is_active, created_at, updated_at, ended_at";

const REQUEST_COLUMNS: &str = "id, session_id, requester_id, status, created_at, auto_approve_at, resolved_at";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Next,
    Previous,
}

/// New position chosen by the leader
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PositionUpdate {
    pub set_id: Option<Uuid>,
    pub song_id: Option<Uuid>,
}

fn session_from_row(row: &SqliteRow) -> Result<PerformanceSession> {
    Ok(PerformanceSession {
        id: parse_column(&row.try_get::<String, _>("id")?)?,
        setlist_id: parse_column(&row.try_get::<String, _>("setlist_id")?)?,
        leader_id: parse_column(&row.try_get::<String, _>("leader_id")?)?,
        current_set_id: parse_optional(row.try_get("current_set_id")?)?,
        current_song_id: parse_optional(row.try_get("current_song_id")?)?,
        mode: SessionMode::parse(&row.try_get::<String, _>("mode")?)?,
        is_active: row.try_get("is_active")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        ended_at: row.try_get("ended_at")?,
    })
}

fn request_from_row(row: &SqliteRow) -> Result<LeadershipRequest> {
    Ok(LeadershipRequest {
        id: parse_column(&row.try_get::<String, _>("id")?)?,
        session_id: parse_column(&row.try_get::<String, _>("session_id")?)?,
        requester_id: parse_column(&row.try_get::<String, _>("requester_id")?)?,
        status: RequestStatus::parse(&row.try_get::<String, _>("status")?)?,
        created_at: row.try_get("created_at")?,
        auto_approve_at: row.try_get("auto_approve_at")?,
        resolved_at: row.try_get("resolved_at")?,
    })
}

fn participant_from_row(row: &SqliteRow) -> Result<Participant> {
    Ok(Participant {
        session_id: parse_column(&row.try_get::<String, _>("session_id")?)?,
        user_id: parse_column(&row.try_get::<String, _>("user_id")?)?,
        user_name: row.try_get("user_name")?,
        role: row.try_get("role")?,
        joined_at: row.try_get("joined_at")?,
        last_seen_at: row.try_get("last_seen_at")?,
        is_active: row.try_get("is_active")?,
    })
}

async fn load_session(conn: &mut SqliteConnection, id: Uuid) -> Result<PerformanceSession> {
    let row = sqlx::query(&format!("SELECT {SESSION_COLUMNS} FROM performance_sessions WHERE id = ?"))
        .bind(id.to_string())
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Session {}", id)))?;
    session_from_row(&row)
}

async fn load_active_session(conn: &mut SqliteConnection, id: Uuid) -> Result<PerformanceSession> {
    let session = load_session(conn, id).await?;
    if !session.is_active {
        return Err(Error::InvalidInput("This session has ended".to_string()));
    }
    Ok(session)
}

async fn load_request(conn: &mut SqliteConnection, id: Uuid) -> Result<LeadershipRequest> {
    let row = sqlx::query(&format!("SELECT {REQUEST_COLUMNS} FROM leadership_requests WHERE id = ?"))
        .bind(id.to_string())
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Leadership request {}", id)))?;
    request_from_row(&row)
}

fn require_led(session: &PerformanceSession, action: &str) -> Result<()> {
    match session.mode {
        SessionMode::Led => Ok(()),
        SessionMode::Standalone => Err(Error::InvalidInput(format!(
            "{} is not possible in a standalone session",
            action
        ))),
    }
}

fn require_leader(user: &User, session: &PerformanceSession) -> Result<()> {
    if session.leader_id == user.id {
        Ok(())
    } else {
        Err(Error::Forbidden("Only the session leader can do this".to_string()))
    }
}

async fn publish_all(hub: &SessionHub, setlist_id: Uuid, events: Vec<SessionEvent>) {
    for event in events {
        hub.publish(setlist_id, event).await;
    }
}

/// Insert or reactivate a follower marker
async fn activate_participant(conn: &mut SqliteConnection, session_id: Uuid, user_id: Uuid) -> Result<()> {
    let now = time::now_string();
    sqlx::query(
        r#"
        INSERT INTO session_participants (session_id, user_id, joined_at, last_seen_at, is_active)
        VALUES (?, ?, ?, ?, 1)
        ON CONFLICT(session_id, user_id) DO UPDATE
            SET is_active = 1, joined_at = excluded.joined_at, last_seen_at = excluded.last_seen_at
        "#,
    )
    .bind(session_id.to_string())
    .bind(user_id.to_string())
    .bind(&now)
    .bind(&now)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn deactivate_participant(conn: &mut SqliteConnection, session_id: Uuid, user_id: Uuid) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE session_participants SET is_active = 0 WHERE session_id = ? AND user_id = ? AND is_active = 1",
    )
    .bind(session_id.to_string())
    .bind(user_id.to_string())
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected())
}

/// Move every pending request of a session to `status`; returns the affected ids
async fn resolve_pending(
    conn: &mut SqliteConnection,
    session_id: Uuid,
    status: RequestStatus,
    requester: Option<Uuid>,
) -> Result<Vec<Uuid>> {
    let requester = requester.map(|id| id.to_string());
    let ids: Vec<String> = sqlx::query_scalar(
        "SELECT id FROM leadership_requests WHERE session_id = ? AND status = 'pending' AND (? IS NULL OR requester_id = ?)",
    )
    .bind(session_id.to_string())
    .bind(&requester)
    .bind(&requester)
    .fetch_all(&mut *conn)
    .await?;

    let now = time::now_string();
    for id in &ids {
        sqlx::query("UPDATE leadership_requests SET status = ?, resolved_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(&now)
            .bind(id)
            .execute(&mut *conn)
            .await?;
    }

    ids.iter().map(|id| parse_column(id)).collect()
}

fn resolved_events(session_id: Uuid, ids: &[Uuid], status: RequestStatus) -> Vec<SessionEvent> {
    ids.iter()
        .map(|&request_id| SessionEvent::LeadershipResolved {
            request_id,
            session_id,
            status,
            auto: false,
        })
        .collect()
}

/// Close a session: inactive, participants gone, pending requests cancelled
async fn close_session(conn: &mut SqliteConnection, session_id: Uuid) -> Result<Vec<Uuid>> {
    let now = time::now_string();
    sqlx::query("UPDATE performance_sessions SET is_active = 0, ended_at = ?, updated_at = ? WHERE id = ?")
        .bind(&now)
        .bind(&now)
        .bind(session_id.to_string())
        .execute(&mut *conn)
        .await?;
    sqlx::query("UPDATE session_participants SET is_active = 0 WHERE session_id = ?")
        .bind(session_id.to_string())
        .execute(&mut *conn)
        .await?;
    resolve_pending(conn, session_id, RequestStatus::Cancelled, None).await
}

/// Make `new_leader` lead; the previous leader stays on as a follower
async fn hand_over(conn: &mut SqliteConnection, session: &PerformanceSession, new_leader: Uuid) -> Result<()> {
    sqlx::query("UPDATE performance_sessions SET leader_id = ?, updated_at = ? WHERE id = ?")
        .bind(new_leader.to_string())
        .bind(time::now_string())
        .bind(session.id.to_string())
        .execute(&mut *conn)
        .await?;
    deactivate_participant(conn, session.id, new_leader).await?;
    activate_participant(conn, session.id, session.leader_id).await?;
    Ok(())
}

/// First set of the setlist and its first song
async fn starting_position(conn: &mut SqliteConnection, setlist_id: Uuid) -> Result<(Option<Uuid>, Option<Uuid>)> {
    let Some(first_set) = load_sets(conn, setlist_id).await?.into_iter().next() else {
        return Ok((None, None));
    };
    let first_song = load_junction_song_ids(conn, "set_songs", "set_id", first_set.id)
        .await?
        .into_iter()
        .next();
    Ok((Some(first_set.id), first_song))
}

/// Start a session for a setlist, replacing any active one
pub async fn create_session(
    pool: &SqlitePool,
    hub: &SessionHub,
    user: &User,
    setlist_id: Uuid,
    mode: SessionMode,
) -> Result<PerformanceSession> {
    let mut tx = begin_write(pool).await?;
    load_visible_setlist(&mut tx, user, setlist_id).await?;

    let previous: Vec<String> = sqlx::query_scalar(
        "SELECT id FROM performance_sessions WHERE setlist_id = ? AND is_active = 1",
    )
    .bind(setlist_id.to_string())
    .fetch_all(&mut *tx)
    .await?;

    let mut events = Vec::new();
    for id in &previous {
        let session_id = parse_column(id)?;
        let cancelled = close_session(&mut tx, session_id).await?;
        events.extend(resolved_events(session_id, &cancelled, RequestStatus::Cancelled));
        events.push(SessionEvent::SessionEnded { session_id });
    }

    let (current_set_id, current_song_id) = starting_position(&mut tx, setlist_id).await?;
    let id = generate();
    let now = time::now_string();
    sqlx::query(
        r#"
        INSERT INTO performance_sessions
            (id, setlist_id, leader_id, current_set_id, current_song_id, mode, is_active, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, 1, ?, ?)
        "#,
    )
    .bind(id.to_string())
    .bind(setlist_id.to_string())
    .bind(user.id.to_string())
    .bind(current_set_id.map(|id| id.to_string()))
    .bind(current_song_id.map(|id| id.to_string()))
    .bind(mode.as_str())
    .bind(&now)
    .bind(&now)
    .execute(&mut *tx)
    .await?;

    let session = load_session(&mut tx, id).await?;
    tx.commit().await?;

    events.push(SessionEvent::SessionStarted {
        session: session.clone(),
    });
    publish_all(hub, setlist_id, events).await;

    info!(
        session_id = %id,
        setlist_id = %setlist_id,
        leader_id = %user.id,
        mode = mode.as_str(),
        replaced = previous.len(),
        "Performance session started"
    );
    Ok(session)
}

async fn fetch_active_session(pool: &SqlitePool, setlist_id: Uuid) -> Result<Option<PerformanceSession>> {
    let row = sqlx::query(&format!(
        "SELECT {SESSION_COLUMNS} FROM performance_sessions WHERE setlist_id = ? AND is_active = 1 ORDER BY created_at DESC LIMIT 1"
    ))
    .bind(setlist_id.to_string())
    .fetch_optional(pool)
    .await?;
    row.as_ref().map(session_from_row).transpose()
}

/// The running session of a setlist, if any
pub async fn get_active_session(
    pool: &SqlitePool,
    setlist_id: Uuid,
    max_wait_ms: u64,
) -> Result<Option<PerformanceSession>> {
    retry_on_lock("get active session", max_wait_ms, || fetch_active_session(pool, setlist_id)).await
}

/// Session of a setlist the user can see; NotFound otherwise
async fn load_visible_session(conn: &mut SqliteConnection, user: &User, id: Uuid) -> Result<PerformanceSession> {
    let session = load_session(conn, id).await?;
    load_visible_setlist(conn, user, session.setlist_id).await?;
    Ok(session)
}

pub async fn get_session(pool: &SqlitePool, user: &User, id: Uuid) -> Result<PerformanceSession> {
    let mut conn = pool.acquire().await?;
    load_visible_session(&mut conn, user, id).await
}

/// Follow a led session
pub async fn join_session(pool: &SqlitePool, hub: &SessionHub, user: &User, session_id: Uuid) -> Result<Participant> {
    let mut tx = begin_write(pool).await?;
    let session = load_active_session(&mut tx, session_id).await?;
    load_visible_setlist(&mut tx, user, session.setlist_id).await?;
    require_led(&session, "Joining")?;
    if session.leader_id == user.id {
        return Err(Error::InvalidInput("The leader cannot join as a follower".to_string()));
    }

    activate_participant(&mut tx, session_id, user.id).await?;
    let participant = load_participant(&mut tx, session_id, user.id).await?;
    tx.commit().await?;

    hub.publish(
        session.setlist_id,
        SessionEvent::ParticipantJoined {
            session_id,
            user_id: user.id,
        },
    )
    .await;

    info!(session_id = %session_id, user_id = %user.id, "Participant joined");
    Ok(participant)
}

/// Stop following; any pending request of the user is cancelled
pub async fn leave_session(pool: &SqlitePool, hub: &SessionHub, user: &User, session_id: Uuid) -> Result<()> {
    let mut tx = begin_write(pool).await?;
    let session = load_session(&mut tx, session_id).await?;

    if deactivate_participant(&mut tx, session_id, user.id).await? == 0 {
        return Err(Error::NotFound(format!("Participant {} in session {}", user.id, session_id)));
    }
    let cancelled = resolve_pending(&mut tx, session_id, RequestStatus::Cancelled, Some(user.id)).await?;
    tx.commit().await?;

    let mut events = resolved_events(session_id, &cancelled, RequestStatus::Cancelled);
    events.push(SessionEvent::ParticipantLeft {
        session_id,
        user_id: user.id,
    });
    publish_all(hub, session.setlist_id, events).await;

    info!(session_id = %session_id, user_id = %user.id, "Participant left");
    Ok(())
}

/// Refresh the caller's presence; a no-op for the leader
pub async fn heartbeat(pool: &SqlitePool, user: &User, session_id: Uuid) -> Result<()> {
    let mut tx = begin_write(pool).await?;
    let session = load_active_session(&mut tx, session_id).await?;
    if session.leader_id == user.id {
        return Ok(());
    }

    let result = sqlx::query(
        "UPDATE session_participants SET last_seen_at = ? WHERE session_id = ? AND user_id = ? AND is_active = 1",
    )
    .bind(time::now_string())
    .bind(session_id.to_string())
    .bind(user.id.to_string())
    .execute(&mut *tx)
    .await?;
    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("Participant {} in session {}", user.id, session_id)));
    }
    tx.commit().await?;

    debug!(session_id = %session_id, user_id = %user.id, "Heartbeat");
    Ok(())
}

const PARTICIPANT_QUERY: &str = r#"
    SELECT p.session_id, p.user_id, u.name AS user_name, u.role,
           p.joined_at, p.last_seen_at, p.is_active
    FROM session_participants p
    JOIN users u ON u.id = p.user_id
"#;

async fn load_participant(conn: &mut SqliteConnection, session_id: Uuid, user_id: Uuid) -> Result<Participant> {
    let row = sqlx::query(&format!("{PARTICIPANT_QUERY} WHERE p.session_id = ? AND p.user_id = ?"))
        .bind(session_id.to_string())
        .bind(user_id.to_string())
        .fetch_one(&mut *conn)
        .await?;
    participant_from_row(&row)
}

/// Active followers, earliest first
pub async fn list_participants(pool: &SqlitePool, user: &User, session_id: Uuid) -> Result<Vec<Participant>> {
    let mut conn = pool.acquire().await?;
    load_visible_session(&mut conn, user, session_id).await?;

    let rows = sqlx::query(&format!(
        "{PARTICIPANT_QUERY} WHERE p.session_id = ? AND p.is_active = 1 ORDER BY p.joined_at"
    ))
    .bind(session_id.to_string())
    .fetch_all(&mut *conn)
    .await?;
    rows.iter().map(participant_from_row).collect()
}

/// Ask to take over leading
///
/// The request approves itself after `auto_approve` unless the leader
/// answers first or leadership changes in the meantime.
pub async fn request_leadership(
    pool: &SqlitePool,
    hub: &Arc<SessionHub>,
    user: &User,
    session_id: Uuid,
    auto_approve: Duration,
) -> Result<LeadershipRequest> {
    let mut tx = begin_write(pool).await?;
    let session = load_active_session(&mut tx, session_id).await?;
    require_led(&session, "Requesting leadership")?;
    if session.leader_id == user.id {
        return Err(Error::InvalidInput("You are already leading this session".to_string()));
    }

    let participating: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM session_participants WHERE session_id = ? AND user_id = ? AND is_active = 1)",
    )
    .bind(session_id.to_string())
    .bind(user.id.to_string())
    .fetch_one(&mut *tx)
    .await?;
    if !participating {
        return Err(Error::Forbidden("Join the session before requesting leadership".to_string()));
    }

    let pending: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM leadership_requests WHERE session_id = ? AND requester_id = ? AND status = 'pending')",
    )
    .bind(session_id.to_string())
    .bind(user.id.to_string())
    .fetch_one(&mut *tx)
    .await?;
    if pending {
        return Err(Error::Conflict("You already have a pending leadership request.".to_string()));
    }

    let id = generate();
    let now = time::now();
    let approve_at = now + chrono::Duration::from_std(auto_approve).unwrap_or(chrono::Duration::zero());
    sqlx::query(
        r#"
        INSERT INTO leadership_requests (id, session_id, requester_id, status, created_at, auto_approve_at)
        VALUES (?, ?, ?, 'pending', ?, ?)
        "#,
    )
    .bind(id.to_string())
    .bind(session_id.to_string())
    .bind(user.id.to_string())
    .bind(time::to_db_string(now))
    .bind(time::to_db_string(approve_at))
    .execute(&mut *tx)
    .await?;

    let request = load_request(&mut tx, id).await?;
    tx.commit().await?;

    hub.publish(
        session.setlist_id,
        SessionEvent::LeadershipRequested {
            request: request.clone(),
        },
    )
    .await;

    let pool = pool.clone();
    let hub = Arc::clone(hub);
    let leader_id = session.leader_id;
    tokio::spawn(async move {
        tokio::time::sleep(auto_approve).await;
        if let Err(e) = auto_approve_request(&pool, &hub, id, leader_id).await {
            warn!(request_id = %id, error = %e, "Auto-approve failed");
        }
    });

    info!(
        request_id = %id,
        session_id = %session_id,
        requester_id = %user.id,
        auto_approve_secs = auto_approve.as_secs(),
        "Leadership requested"
    );
    Ok(request)
}

/// Approve a request the leader left unanswered
///
/// Returns false when the request was already resolved or leadership moved on.
pub async fn auto_approve_request(
    pool: &SqlitePool,
    hub: &SessionHub,
    request_id: Uuid,
    expected_leader: Uuid,
) -> Result<bool> {
    let mut tx = begin_write(pool).await?;
    let request = load_request(&mut tx, request_id).await?;
    if request.status != RequestStatus::Pending {
        return Ok(false);
    }
    let session = load_session(&mut tx, request.session_id).await?;
    if !session.is_active || session.leader_id != expected_leader {
        return Ok(false);
    }

    let events = approve(&mut tx, &session, &request, true).await?;
    tx.commit().await?;
    publish_all(hub, session.setlist_id, events).await;

    info!(
        request_id = %request_id,
        session_id = %session.id,
        leader_id = %request.requester_id,
        "Leadership request auto-approved"
    );
    Ok(true)
}

/// Approve a request inside an open transaction; returns the events to publish
async fn approve(
    conn: &mut SqliteConnection,
    session: &PerformanceSession,
    request: &LeadershipRequest,
    auto: bool,
) -> Result<Vec<SessionEvent>> {
    sqlx::query("UPDATE leadership_requests SET status = 'approved', resolved_at = ? WHERE id = ?")
        .bind(time::now_string())
        .bind(request.id.to_string())
        .execute(&mut *conn)
        .await?;
    hand_over(conn, session, request.requester_id).await?;
    let rejected = resolve_pending(conn, session.id, RequestStatus::Rejected, None).await?;

    let mut events = vec![SessionEvent::LeadershipResolved {
        request_id: request.id,
        session_id: session.id,
        status: RequestStatus::Approved,
        auto,
    }];
    events.extend(resolved_events(session.id, &rejected, RequestStatus::Rejected));
    events.push(SessionEvent::LeaderChanged {
        session_id: session.id,
        previous_leader_id: session.leader_id,
        leader_id: request.requester_id,
        forced: false,
    });
    Ok(events)
}

/// Leader approves or rejects a pending request
pub async fn respond_to_request(
    pool: &SqlitePool,
    hub: &SessionHub,
    user: &User,
    request_id: Uuid,
    approve_request: bool,
) -> Result<LeadershipRequest> {
    let mut tx = begin_write(pool).await?;
    let request = load_request(&mut tx, request_id).await?;
    let session = load_active_session(&mut tx, request.session_id).await?;
    require_leader(user, &session)?;
    if request.status != RequestStatus::Pending {
        return Err(Error::Conflict("This request has already been resolved.".to_string()));
    }

    let events = if approve_request {
        approve(&mut tx, &session, &request, false).await?
    } else {
        sqlx::query("UPDATE leadership_requests SET status = 'rejected', resolved_at = ? WHERE id = ?")
            .bind(time::now_string())
            .bind(request_id.to_string())
            .execute(&mut *tx)
            .await?;
        resolved_events(session.id, &[request_id], RequestStatus::Rejected)
    };

    let resolved = load_request(&mut tx, request_id).await?;
    tx.commit().await?;
    publish_all(hub, session.setlist_id, events).await;

    info!(
        request_id = %request_id,
        session_id = %session.id,
        status = resolved.status.as_str(),
        "Leadership request answered"
    );
    Ok(resolved)
}

/// Requester withdraws a pending request
pub async fn cancel_request(pool: &SqlitePool, hub: &SessionHub, user: &User, request_id: Uuid) -> Result<LeadershipRequest> {
    let mut tx = begin_write(pool).await?;
    let request = load_request(&mut tx, request_id).await?;
    if request.requester_id != user.id {
        return Err(Error::Forbidden("Only the requester can cancel this request".to_string()));
    }
    if request.status != RequestStatus::Pending {
        return Err(Error::Conflict("This request has already been resolved.".to_string()));
    }
    let session = load_session(&mut tx, request.session_id).await?;

    sqlx::query("UPDATE leadership_requests SET status = 'cancelled', resolved_at = ? WHERE id = ?")
        .bind(time::now_string())
        .bind(request_id.to_string())
        .execute(&mut *tx)
        .await?;
    let cancelled = load_request(&mut tx, request_id).await?;
    tx.commit().await?;

    publish_all(
        hub,
        session.setlist_id,
        resolved_events(session.id, &[request_id], RequestStatus::Cancelled),
    )
    .await;

    info!(request_id = %request_id, "Leadership request cancelled");
    Ok(cancelled)
}

/// Pending requests of a session, oldest first
pub async fn list_pending_requests(
    pool: &SqlitePool,
    user: &User,
    session_id: Uuid,
) -> Result<Vec<LeadershipRequest>> {
    let mut conn = pool.acquire().await?;
    load_visible_session(&mut conn, user, session_id).await?;

    let rows = sqlx::query(&format!(
        "SELECT {REQUEST_COLUMNS} FROM leadership_requests WHERE session_id = ? AND status = 'pending' ORDER BY created_at"
    ))
    .bind(session_id.to_string())
    .fetch_all(&mut *conn)
    .await?;
    rows.iter().map(request_from_row).collect()
}

/// Admin override: take the lead immediately
///
/// Pending requests are cancelled. Two concurrent takeovers both succeed and
/// the later commit wins.
pub async fn force_takeover(pool: &SqlitePool, hub: &SessionHub, user: &User, session_id: Uuid) -> Result<PerformanceSession> {
    require_level(user, UserLevel::Admin, "Forcing a leadership takeover")?;

    let mut tx = begin_write(pool).await?;
    let session = load_active_session(&mut tx, session_id).await?;
    if session.leader_id == user.id {
        return Ok(session);
    }

    let cancelled = resolve_pending(&mut tx, session_id, RequestStatus::Cancelled, None).await?;
    hand_over(&mut tx, &session, user.id).await?;
    let updated = load_session(&mut tx, session_id).await?;
    tx.commit().await?;

    let mut events = resolved_events(session_id, &cancelled, RequestStatus::Cancelled);
    events.push(SessionEvent::LeaderChanged {
        session_id,
        previous_leader_id: session.leader_id,
        leader_id: user.id,
        forced: true,
    });
    publish_all(hub, session.setlist_id, events).await;

    warn!(session_id = %session_id, admin_id = %user.id, previous_leader_id = %session.leader_id, "Leadership taken over by admin");
    Ok(updated)
}

async fn write_position(
    conn: &mut SqliteConnection,
    session_id: Uuid,
    set_id: Option<Uuid>,
    song_id: Option<Uuid>,
) -> Result<PerformanceSession> {
    sqlx::query("UPDATE performance_sessions SET current_set_id = ?, current_song_id = ?, updated_at = ? WHERE id = ?")
        .bind(set_id.map(|id| id.to_string()))
        .bind(song_id.map(|id| id.to_string()))
        .bind(time::now_string())
        .bind(session_id.to_string())
        .execute(&mut *conn)
        .await?;
    load_session(conn, session_id).await
}

fn position_event(session: &PerformanceSession) -> SessionEvent {
    SessionEvent::PositionChanged {
        session_id: session.id,
        current_set_id: session.current_set_id,
        current_song_id: session.current_song_id,
    }
}

/// Leader jumps to a set and song
pub async fn update_position(
    pool: &SqlitePool,
    hub: &SessionHub,
    user: &User,
    session_id: Uuid,
    position: PositionUpdate,
) -> Result<PerformanceSession> {
    let mut tx = begin_write(pool).await?;
    let session = load_active_session(&mut tx, session_id).await?;
    require_leader(user, &session)?;

    match (position.set_id, position.song_id) {
        (None, Some(_)) => {
            return Err(Error::InvalidInput("A song position needs its set".to_string()));
        }
        (Some(set_id), song_id) => {
            let sets = load_sets(&mut tx, session.setlist_id).await?;
            if !sets.iter().any(|s| s.id == set_id) {
                return Err(Error::InvalidInput(format!("Set {} is not part of this setlist", set_id)));
            }
            if let Some(song_id) = song_id {
                let songs = load_junction_song_ids(&mut tx, "set_songs", "set_id", set_id).await?;
                if !songs.contains(&song_id) {
                    return Err(Error::InvalidInput(format!("Song {} is not in set {}", song_id, set_id)));
                }
            }
        }
        (None, None) => {}
    }

    let updated = write_position(&mut tx, session_id, position.set_id, position.song_id).await?;
    tx.commit().await?;
    hub.publish(updated.setlist_id, position_event(&updated)).await;

    debug!(session_id = %session_id, set_id = ?updated.current_set_id, song_id = ?updated.current_song_id, "Position changed");
    Ok(updated)
}

/// Next or previous stop in a setlist laid out as (set, songs) in order
///
/// Empty sets are a stop of their own. Stepping past either end stays put;
/// an unknown current position lands on the first stop.
pub(crate) fn step_position(
    layout: &[(Uuid, Vec<Uuid>)],
    current_set: Option<Uuid>,
    current_song: Option<Uuid>,
    direction: Direction,
) -> Option<(Uuid, Option<Uuid>)> {
    let stops: Vec<(Uuid, Option<Uuid>)> = layout
        .iter()
        .flat_map(|(set_id, songs)| {
            if songs.is_empty() {
                vec![(*set_id, None)]
            } else {
                songs.iter().map(|song| (*set_id, Some(*song))).collect()
            }
        })
        .collect();

    let current = current_set.and_then(|set| stops.iter().position(|stop| *stop == (set, current_song)));
    let index = match (current, direction) {
        (None, _) => 0,
        (Some(i), Direction::Next) => (i + 1).min(stops.len().saturating_sub(1)),
        (Some(i), Direction::Previous) => i.saturating_sub(1),
    };
    stops.get(index).copied()
}

/// Leader steps forward or back through the setlist
pub async fn navigate(
    pool: &SqlitePool,
    hub: &SessionHub,
    user: &User,
    session_id: Uuid,
    direction: Direction,
) -> Result<PerformanceSession> {
    let mut tx = begin_write(pool).await?;
    let session = load_active_session(&mut tx, session_id).await?;
    require_leader(user, &session)?;

    let mut layout = Vec::new();
    for set in load_sets(&mut tx, session.setlist_id).await? {
        let songs = load_junction_song_ids(&mut tx, "set_songs", "set_id", set.id).await?;
        layout.push((set.id, songs));
    }

    let Some((set_id, song_id)) = step_position(&layout, session.current_set_id, session.current_song_id, direction)
    else {
        return Ok(session);
    };
    if session.current_set_id == Some(set_id) && session.current_song_id == song_id {
        return Ok(session);
    }

    let updated = write_position(&mut tx, session_id, Some(set_id), song_id).await?;
    tx.commit().await?;
    hub.publish(updated.setlist_id, position_event(&updated)).await;

    debug!(session_id = %session_id, ?direction, "Navigated");
    Ok(updated)
}

/// Leader or admin ends the session; ending twice is a no-op
pub async fn end_session(pool: &SqlitePool, hub: &SessionHub, user: &User, session_id: Uuid) -> Result<PerformanceSession> {
    let mut tx = begin_write(pool).await?;
    let session = load_session(&mut tx, session_id).await?;
    if session.leader_id != user.id && !user.is_admin() {
        return Err(Error::Forbidden("Only the leader or an admin can end the session".to_string()));
    }
    if !session.is_active {
        return Ok(session);
    }

    let cancelled = close_session(&mut tx, session_id).await?;
    let ended = load_session(&mut tx, session_id).await?;
    tx.commit().await?;

    let mut events = resolved_events(session_id, &cancelled, RequestStatus::Cancelled);
    events.push(SessionEvent::SessionEnded { session_id });
    publish_all(hub, session.setlist_id, events).await;

    info!(session_id = %session_id, ended_by = %user.id, "Performance session ended");
    Ok(ended)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::setlists::{create_setlist, NewSetlist};
    use crate::db::sets::{create_set, NewSet};
    use crate::db::test_support;
    use setlist_common::db::models::{Setlist, Song};

    struct Band {
        pool: SqlitePool,
        hub: Arc<SessionHub>,
        admin: User,
        leader: User,
        follower: User,
        setlist: Setlist,
        sets: Vec<Uuid>,
        songs: Vec<Song>,
    }

    /// Public setlist with two sets: [a, b] and [c]
    async fn band() -> Band {
        let pool = test_support::pool().await;
        let admin = test_support::user(&pool, "Admin", UserLevel::Admin).await;
        let leader = test_support::user(&pool, "Freddie", UserLevel::Editor).await;
        let follower = test_support::user(&pool, "Brian", UserLevel::Member).await;

        let mut songs = Vec::new();
        for title in ["Tie Your Mother Down", "Seven Seas of Rhye", "We Will Rock You"] {
            songs.push(test_support::song(&pool, &leader, "Queen", title).await);
        }

        let setlist = create_setlist(
            &pool,
            &leader,
            NewSetlist {
                name: "Live Aid".into(),
                is_public: true,
            },
        )
        .await
        .unwrap();

        let mut sets = Vec::new();
        for (name, ids) in [("Set 1", vec![songs[0].id, songs[1].id]), ("Set 2", vec![songs[2].id])] {
            let set = create_set(
                &pool,
                &leader,
                setlist.id,
                NewSet {
                    name: name.into(),
                    song_ids: ids,
                    force: false,
                },
            )
            .await
            .unwrap();
            sets.push(set.set.id);
        }

        Band {
            pool,
            hub: Arc::new(SessionHub::new()),
            admin,
            leader,
            follower,
            setlist,
            sets,
            songs,
        }
    }

    async fn start(b: &Band) -> PerformanceSession {
        create_session(&b.pool, &b.hub, &b.leader, b.setlist.id, SessionMode::Led)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_session_starts_at_first_song() {
        let b = band().await;
        let session = start(&b).await;

        assert!(session.is_active);
        assert_eq!(session.leader_id, b.leader.id);
        assert_eq!(session.current_set_id, Some(b.sets[0]));
        assert_eq!(session.current_song_id, Some(b.songs[0].id));
    }

    #[tokio::test]
    async fn test_end_session_clears_active() {
        let b = band().await;
        let session = start(&b).await;

        let ended = end_session(&b.pool, &b.hub, &b.leader, session.id).await.unwrap();
        assert!(!ended.is_active);
        assert!(ended.ended_at.is_some());
        assert!(get_active_session(&b.pool, b.setlist.id, 1000).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_second_session_replaces_first() {
        let b = band().await;
        let first = start(&b).await;
        let mut rx = b.hub.subscribe(b.setlist.id).await;

        let second = create_session(&b.pool, &b.hub, &b.follower, b.setlist.id, SessionMode::Led)
            .await
            .unwrap();

        let active = get_active_session(&b.pool, b.setlist.id, 1000).await.unwrap().unwrap();
        assert_eq!(active.id, second.id);
        assert_eq!(active.leader_id, b.follower.id);
        assert!(!get_session(&b.pool, &b.leader, first.id).await.unwrap().is_active);

        assert_eq!(
            rx.recv().await.unwrap(),
            SessionEvent::SessionEnded { session_id: first.id }
        );
        assert!(matches!(rx.recv().await.unwrap(), SessionEvent::SessionStarted { .. }));
    }

    #[tokio::test]
    async fn test_private_session_hidden_from_others() {
        let b = band().await;
        let private = create_setlist(
            &b.pool,
            &b.leader,
            NewSetlist {
                name: "Rehearsal".into(),
                is_public: false,
            },
        )
        .await
        .unwrap();
        let session = create_session(&b.pool, &b.hub, &b.leader, private.id, SessionMode::Led)
            .await
            .unwrap();

        assert!(matches!(
            get_session(&b.pool, &b.follower, session.id).await,
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            list_participants(&b.pool, &b.follower, session.id).await,
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            list_pending_requests(&b.pool, &b.follower, session.id).await,
            Err(Error::NotFound(_))
        ));

        // Owner and admins still see it
        assert!(get_session(&b.pool, &b.leader, session.id).await.is_ok());
        assert!(list_participants(&b.pool, &b.admin, session.id).await.is_ok());
    }

    #[tokio::test]
    async fn test_join_rules() {
        let b = band().await;
        let session = start(&b).await;

        assert!(matches!(
            join_session(&b.pool, &b.hub, &b.leader, session.id).await,
            Err(Error::InvalidInput(_))
        ));

        let participant = join_session(&b.pool, &b.hub, &b.follower, session.id).await.unwrap();
        assert_eq!(participant.user_name, "Brian");
        assert_eq!(list_participants(&b.pool, &b.leader, session.id).await.unwrap().len(), 1);

        // Leader unaffected by followers
        assert_eq!(get_session(&b.pool, &b.leader, session.id).await.unwrap().leader_id, b.leader.id);

        leave_session(&b.pool, &b.hub, &b.follower, session.id).await.unwrap();
        assert!(list_participants(&b.pool, &b.leader, session.id).await.unwrap().is_empty());

        let solo = create_session(&b.pool, &b.hub, &b.leader, b.setlist.id, SessionMode::Standalone)
            .await
            .unwrap();
        assert!(matches!(
            join_session(&b.pool, &b.hub, &b.follower, solo.id).await,
            Err(Error::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_leader_approves_request() {
        let b = band().await;
        let session = start(&b).await;
        join_session(&b.pool, &b.hub, &b.follower, session.id).await.unwrap();

        let request = request_leadership(&b.pool, &b.hub, &b.follower, session.id, Duration::from_secs(3600))
            .await
            .unwrap();
        assert_eq!(request.status, RequestStatus::Pending);

        // Only the leader answers
        assert!(matches!(
            respond_to_request(&b.pool, &b.hub, &b.follower, request.id, true).await,
            Err(Error::Forbidden(_))
        ));

        let resolved = respond_to_request(&b.pool, &b.hub, &b.leader, request.id, true)
            .await
            .unwrap();
        assert_eq!(resolved.status, RequestStatus::Approved);

        let session = get_session(&b.pool, &b.leader, session.id).await.unwrap();
        assert_eq!(session.leader_id, b.follower.id);

        // Old leader now follows
        let participants = list_participants(&b.pool, &b.leader, session.id).await.unwrap();
        assert_eq!(participants.len(), 1);
        assert_eq!(participants[0].user_id, b.leader.id);
    }

    #[tokio::test]
    async fn test_request_rules() {
        let b = band().await;
        let session = start(&b).await;

        assert!(matches!(
            request_leadership(&b.pool, &b.hub, &b.follower, session.id, Duration::from_secs(3600)).await,
            Err(Error::Forbidden(_))
        ));

        join_session(&b.pool, &b.hub, &b.follower, session.id).await.unwrap();
        let request = request_leadership(&b.pool, &b.hub, &b.follower, session.id, Duration::from_secs(3600))
            .await
            .unwrap();
        assert!(matches!(
            request_leadership(&b.pool, &b.hub, &b.follower, session.id, Duration::from_secs(3600)).await,
            Err(Error::Conflict(_))
        ));

        let cancelled = cancel_request(&b.pool, &b.hub, &b.follower, request.id).await.unwrap();
        assert_eq!(cancelled.status, RequestStatus::Cancelled);
        assert!(list_pending_requests(&b.pool, &b.leader, session.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unanswered_request_is_auto_approved() {
        let b = band().await;
        let session = start(&b).await;
        join_session(&b.pool, &b.hub, &b.follower, session.id).await.unwrap();

        let request = request_leadership(&b.pool, &b.hub, &b.follower, session.id, Duration::from_millis(50))
            .await
            .unwrap();

        let mut leader = b.leader.id;
        for _ in 0..40 {
            tokio::time::sleep(Duration::from_millis(25)).await;
            leader = get_session(&b.pool, &b.leader, session.id).await.unwrap().leader_id;
            if leader == b.follower.id {
                break;
            }
        }
        assert_eq!(leader, b.follower.id);

        let request = {
            let mut conn = b.pool.acquire().await.unwrap();
            load_request(&mut conn, request.id).await.unwrap()
        };
        assert_eq!(request.status, RequestStatus::Approved);
    }

    #[tokio::test]
    async fn test_auto_approve_skips_resolved_request() {
        let b = band().await;
        let session = start(&b).await;
        join_session(&b.pool, &b.hub, &b.follower, session.id).await.unwrap();

        let request = request_leadership(&b.pool, &b.hub, &b.follower, session.id, Duration::from_secs(3600))
            .await
            .unwrap();
        respond_to_request(&b.pool, &b.hub, &b.leader, request.id, false)
            .await
            .unwrap();

        let approved = auto_approve_request(&b.pool, &b.hub, request.id, b.leader.id)
            .await
            .unwrap();
        assert!(!approved);
        assert_eq!(get_session(&b.pool, &b.leader, session.id).await.unwrap().leader_id, b.leader.id);
    }

    #[tokio::test]
    async fn test_admin_force_takeover() {
        let b = band().await;
        let session = start(&b).await;
        join_session(&b.pool, &b.hub, &b.follower, session.id).await.unwrap();
        request_leadership(&b.pool, &b.hub, &b.follower, session.id, Duration::from_secs(3600))
            .await
            .unwrap();

        assert!(matches!(
            force_takeover(&b.pool, &b.hub, &b.follower, session.id).await,
            Err(Error::Forbidden(_))
        ));

        let session = force_takeover(&b.pool, &b.hub, &b.admin, session.id).await.unwrap();
        assert_eq!(session.leader_id, b.admin.id);
        assert!(list_pending_requests(&b.pool, &b.leader, session.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_navigation_crosses_sets() {
        let b = band().await;
        let session = start(&b).await;

        let s = navigate(&b.pool, &b.hub, &b.leader, session.id, Direction::Next).await.unwrap();
        assert_eq!(s.current_song_id, Some(b.songs[1].id));
        let s = navigate(&b.pool, &b.hub, &b.leader, session.id, Direction::Next).await.unwrap();
        assert_eq!((s.current_set_id, s.current_song_id), (Some(b.sets[1]), Some(b.songs[2].id)));
        let s = navigate(&b.pool, &b.hub, &b.leader, session.id, Direction::Next).await.unwrap();
        assert_eq!(s.current_song_id, Some(b.songs[2].id));
        let s = navigate(&b.pool, &b.hub, &b.leader, session.id, Direction::Previous).await.unwrap();
        assert_eq!((s.current_set_id, s.current_song_id), (Some(b.sets[0]), Some(b.songs[1].id)));

        assert!(matches!(
            navigate(&b.pool, &b.hub, &b.follower, session.id, Direction::Next).await,
            Err(Error::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn test_update_position_validates_membership() {
        let b = band().await;
        let session = start(&b).await;

        let result = update_position(
            &b.pool,
            &b.hub,
            &b.leader,
            session.id,
            PositionUpdate {
                set_id: Some(b.sets[0]),
                song_id: Some(b.songs[2].id),
            },
        )
        .await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));

        let mut rx = b.hub.subscribe(b.setlist.id).await;
        let updated = update_position(
            &b.pool,
            &b.hub,
            &b.leader,
            session.id,
            PositionUpdate {
                set_id: Some(b.sets[1]),
                song_id: Some(b.songs[2].id),
            },
        )
        .await
        .unwrap();
        assert_eq!(updated.current_set_id, Some(b.sets[1]));
        assert!(matches!(rx.recv().await.unwrap(), SessionEvent::PositionChanged { .. }));
    }

    #[test]
    fn test_step_position_handles_empty_sets() {
        let (s1, s2, s3) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let song = Uuid::new_v4();
        let layout = vec![(s1, vec![song]), (s2, vec![]), (s3, vec![])];

        assert_eq!(step_position(&layout, Some(s1), Some(song), Direction::Next), Some((s2, None)));
        assert_eq!(step_position(&layout, Some(s2), None, Direction::Next), Some((s3, None)));
        assert_eq!(step_position(&layout, Some(s3), None, Direction::Next), Some((s3, None)));
        assert_eq!(step_position(&layout, Some(s1), Some(song), Direction::Previous), Some((s1, Some(song))));
        assert_eq!(step_position(&layout, None, None, Direction::Previous), Some((s1, Some(song))));
        assert_eq!(step_position(&[], None, None, Direction::Next), None);
    }
}
