//! Set database operations
//!
//! A song appears at most once per set, and by default at most once per
//! setlist. The cross-set check can be bypassed with `force`, which the client
//! sends after the user confirms the duplicates dialog.
//!
//! `set_order` within a setlist and `song_order` within a set are always the
//! contiguous range 0..n.

use serde::Deserialize;
use setlist_common::db::models::{Set, SetWithSongs, SongListKind, User};
use setlist_common::uuid_utils::{generate, parse_column};
use setlist_common::{time, DuplicateSong, Error, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

use super::setlists::load_owned_setlist;
use super::song_lists::load_visible_song_ids;
use super::songs::song_from_row;
use super::{
    begin_write, ensure_songs_exist, is_permutation, load_junction_song_ids, reject_repeated, required_text,
    write_junction_songs,
};

#[derive(Debug, Clone, Deserialize)]
pub struct NewSet {
    pub name: String,
    #[serde(default)]
    pub song_ids: Vec<Uuid>,
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SetUpdate {
    pub name: Option<String>,
    pub song_ids: Option<Vec<Uuid>>,
    #[serde(default)]
    pub force: bool,
}

/// Template or collection to pull songs from
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct SongSource {
    pub kind: SongListKind,
    pub id: Uuid,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AddSong {
    pub song_id: Uuid,
    /// Insert position; appended when absent or past the end
    pub position: Option<usize>,
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MoveSong {
    pub to_set_id: Uuid,
    pub position: Option<usize>,
}

fn set_from_row(row: &SqliteRow) -> Result<Set> {
    Ok(Set {
        id: parse_column(&row.try_get::<String, _>("id")?)?,
        name: row.try_get("name")?,
        setlist_id: parse_column(&row.try_get::<String, _>("setlist_id")?)?,
        set_order: row.try_get("set_order")?,
    })
}

pub(crate) async fn load_set(conn: &mut SqliteConnection, id: Uuid) -> Result<Set> {
    let row = sqlx::query("SELECT id, name, setlist_id, set_order FROM sets WHERE id = ?")
        .bind(id.to_string())
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Set {}", id)))?;
    set_from_row(&row)
}

/// Sets of a setlist in `set_order`
pub(crate) async fn load_sets(conn: &mut SqliteConnection, setlist_id: Uuid) -> Result<Vec<Set>> {
    let rows = sqlx::query("SELECT id, name, setlist_id, set_order FROM sets WHERE setlist_id = ? ORDER BY set_order")
        .bind(setlist_id.to_string())
        .fetch_all(&mut *conn)
        .await?;
    rows.iter().map(set_from_row).collect()
}

/// Attach the set's songs in `song_order`
pub(crate) async fn load_set_songs(conn: &mut SqliteConnection, set: Set) -> Result<SetWithSongs> {
    let rows = sqlx::query(
        "SELECT s.* FROM set_songs ss JOIN songs s ON s.id = ss.song_id WHERE ss.set_id = ? ORDER BY ss.song_order",
    )
    .bind(set.id.to_string())
    .fetch_all(&mut *conn)
    .await?;

    let songs = rows.iter().map(song_from_row).collect::<Result<Vec<_>>>()?;
    Ok(SetWithSongs { set, songs })
}

/// Load a set whose setlist the caller may modify
async fn load_owned_set(conn: &mut SqliteConnection, user: &User, id: Uuid) -> Result<Set> {
    let set = load_set(conn, id).await?;
    load_owned_setlist(conn, user, set.setlist_id).await?;
    Ok(set)
}

/// Songs from `song_ids` already placed in another set of the setlist
///
/// Each conflict names the earliest set (by `set_order`) holding the song.
pub(crate) async fn find_duplicates(
    conn: &mut SqliteConnection,
    setlist_id: Uuid,
    song_ids: &[Uuid],
    exclude_set: Option<Uuid>,
) -> Result<Vec<DuplicateSong>> {
    let exclude = exclude_set.map(|id| id.to_string());
    let mut duplicates = Vec::new();

    for song_id in song_ids {
        let row = sqlx::query(
            r#"
            SELECT songs.id AS song_id, songs.title, songs.original_artist,
                   sets.id AS set_id, sets.name AS set_name
            FROM set_songs
            JOIN sets ON sets.id = set_songs.set_id
            JOIN songs ON songs.id = set_songs.song_id
            WHERE sets.setlist_id = ? AND set_songs.song_id = ? AND (? IS NULL OR sets.id <> ?)
            ORDER BY sets.set_order
            LIMIT 1
            "#,
        )
        .bind(setlist_id.to_string())
        .bind(song_id.to_string())
        .bind(&exclude)
        .bind(&exclude)
        .fetch_optional(&mut *conn)
        .await?;

        if let Some(row) = row {
            duplicates.push(DuplicateSong {
                song_id: parse_column(&row.try_get::<String, _>("song_id")?)?,
                title: row.try_get("title")?,
                original_artist: row.try_get("original_artist")?,
                set_id: parse_column(&row.try_get::<String, _>("set_id")?)?,
                set_name: row.try_get("set_name")?,
            });
        }
    }

    Ok(duplicates)
}

/// Validate a song list for a set and run the cross-set duplicate check
async fn check_songs(
    conn: &mut SqliteConnection,
    setlist_id: Uuid,
    song_ids: &[Uuid],
    exclude_set: Option<Uuid>,
    force: bool,
) -> Result<()> {
    reject_repeated(song_ids)?;
    ensure_songs_exist(conn, song_ids).await?;
    if force {
        return Ok(());
    }

    let duplicates = find_duplicates(conn, setlist_id, song_ids, exclude_set).await?;
    if duplicates.is_empty() {
        Ok(())
    } else {
        debug!(setlist_id = %setlist_id, count = duplicates.len(), "Duplicate songs rejected");
        Err(Error::DuplicatesFound(duplicates))
    }
}

async fn touch_setlist(conn: &mut SqliteConnection, setlist_id: Uuid) -> Result<()> {
    sqlx::query("UPDATE setlists SET updated_at = ? WHERE id = ?")
        .bind(time::now_string())
        .bind(setlist_id.to_string())
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Rewrite `set_order` to follow `ordered` exactly
async fn write_set_order(conn: &mut SqliteConnection, ordered: &[Uuid]) -> Result<()> {
    for (order, id) in ordered.iter().enumerate() {
        sqlx::query("UPDATE sets SET set_order = ? WHERE id = ?")
            .bind(order as i64)
            .bind(id.to_string())
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

async fn insert_set(
    conn: &mut SqliteConnection,
    setlist_id: Uuid,
    name: &str,
    song_ids: &[Uuid],
    force: bool,
) -> Result<Set> {
    check_songs(conn, setlist_id, song_ids, None, force).await?;

    let set_order: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sets WHERE setlist_id = ?")
        .bind(setlist_id.to_string())
        .fetch_one(&mut *conn)
        .await?;

    let id = generate();
    sqlx::query("INSERT INTO sets (id, name, setlist_id, set_order) VALUES (?, ?, ?, ?)")
        .bind(id.to_string())
        .bind(name)
        .bind(setlist_id.to_string())
        .bind(set_order)
        .execute(&mut *conn)
        .await?;

    write_junction_songs(conn, "set_songs", "set_id", id, song_ids).await?;
    touch_setlist(conn, setlist_id).await?;
    load_set(conn, id).await
}

/// Append a new set to the end of a setlist
pub async fn create_set(pool: &SqlitePool, user: &User, setlist_id: Uuid, new_set: NewSet) -> Result<SetWithSongs> {
    let name = required_text("name", &new_set.name)?;

    let mut tx = begin_write(pool).await?;
    load_owned_setlist(&mut tx, user, setlist_id).await?;

    let set = insert_set(&mut tx, setlist_id, &name, &new_set.song_ids, new_set.force).await?;
    let set = load_set_songs(&mut tx, set).await?;
    tx.commit().await?;

    info!(set_id = %set.set.id, setlist_id = %setlist_id, songs = set.songs.len(), "Set created");
    Ok(set)
}

/// Append a new set populated from a template or collection
pub async fn create_set_from_source(
    pool: &SqlitePool,
    user: &User,
    setlist_id: Uuid,
    name: &str,
    source: SongSource,
    force: bool,
) -> Result<SetWithSongs> {
    let name = required_text("name", name)?;

    let mut tx = begin_write(pool).await?;
    load_owned_setlist(&mut tx, user, setlist_id).await?;
    let song_ids = load_visible_song_ids(&mut tx, user, source.kind, source.id).await?;

    let set = insert_set(&mut tx, setlist_id, &name, &song_ids, force).await?;
    let set = load_set_songs(&mut tx, set).await?;
    tx.commit().await?;

    info!(
        set_id = %set.set.id,
        source = source.kind.noun(),
        source_id = %source.id,
        "Set created from {}",
        source.kind.noun()
    );
    Ok(set)
}

/// Rename a set and/or replace its songs
pub async fn update_set(pool: &SqlitePool, user: &User, set_id: Uuid, update: SetUpdate) -> Result<SetWithSongs> {
    let mut tx = begin_write(pool).await?;
    let set = load_owned_set(&mut tx, user, set_id).await?;

    if let Some(name) = update.name {
        let name = required_text("name", &name)?;
        sqlx::query("UPDATE sets SET name = ? WHERE id = ?")
            .bind(&name)
            .bind(set_id.to_string())
            .execute(&mut *tx)
            .await?;
    }

    if let Some(song_ids) = update.song_ids {
        check_songs(&mut tx, set.setlist_id, &song_ids, Some(set_id), update.force).await?;
        write_junction_songs(&mut tx, "set_songs", "set_id", set_id, &song_ids).await?;
    }

    touch_setlist(&mut tx, set.setlist_id).await?;
    let set = load_set(&mut tx, set_id).await?;
    let set = load_set_songs(&mut tx, set).await?;
    tx.commit().await?;

    info!(set_id = %set_id, "Set updated");
    Ok(set)
}

/// Delete a set and close the gap in `set_order`
///
/// Sessions positioned in the deleted set lose their position.
pub async fn delete_set(pool: &SqlitePool, user: &User, set_id: Uuid) -> Result<()> {
    let mut tx = begin_write(pool).await?;
    let set = load_owned_set(&mut tx, user, set_id).await?;

    sqlx::query(
        "UPDATE performance_sessions SET current_set_id = NULL, current_song_id = NULL WHERE current_set_id = ?",
    )
    .bind(set_id.to_string())
    .execute(&mut *tx)
    .await?;
    sqlx::query("DELETE FROM set_songs WHERE set_id = ?")
        .bind(set_id.to_string())
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM sets WHERE id = ?")
        .bind(set_id.to_string())
        .execute(&mut *tx)
        .await?;

    let remaining: Vec<Uuid> = load_sets(&mut tx, set.setlist_id)
        .await?
        .into_iter()
        .map(|s| s.id)
        .collect();
    write_set_order(&mut tx, &remaining).await?;
    touch_setlist(&mut tx, set.setlist_id).await?;

    tx.commit().await?;

    info!(set_id = %set_id, setlist_id = %set.setlist_id, "Set deleted");
    Ok(())
}

/// Reorder the sets of a setlist; `ordered_ids` must name every set exactly once
pub async fn reorder_sets(pool: &SqlitePool, user: &User, setlist_id: Uuid, ordered_ids: &[Uuid]) -> Result<Vec<Set>> {
    let mut tx = begin_write(pool).await?;
    load_owned_setlist(&mut tx, user, setlist_id).await?;

    let existing: Vec<Uuid> = load_sets(&mut tx, setlist_id)
        .await?
        .into_iter()
        .map(|s| s.id)
        .collect();
    if !is_permutation(&existing, ordered_ids) {
        return Err(Error::InvalidInput(
            "Set order must list every set of the setlist exactly once".to_string(),
        ));
    }

    write_set_order(&mut tx, ordered_ids).await?;
    touch_setlist(&mut tx, setlist_id).await?;
    let sets = load_sets(&mut tx, setlist_id).await?;
    tx.commit().await?;

    info!(setlist_id = %setlist_id, "Sets reordered");
    Ok(sets)
}

fn insert_at(ids: &mut Vec<Uuid>, position: Option<usize>, id: Uuid) {
    let index = position.unwrap_or(ids.len()).min(ids.len());
    ids.insert(index, id);
}

/// Insert one song into a set
pub async fn add_song_to_set(pool: &SqlitePool, user: &User, set_id: Uuid, add: AddSong) -> Result<SetWithSongs> {
    let mut tx = begin_write(pool).await?;
    let set = load_owned_set(&mut tx, user, set_id).await?;

    let mut ids = load_junction_song_ids(&mut tx, "set_songs", "set_id", set_id).await?;
    if ids.contains(&add.song_id) {
        return Err(Error::Conflict("This song is already in the set.".to_string()));
    }
    check_songs(&mut tx, set.setlist_id, &[add.song_id], Some(set_id), add.force).await?;

    insert_at(&mut ids, add.position, add.song_id);
    write_junction_songs(&mut tx, "set_songs", "set_id", set_id, &ids).await?;
    touch_setlist(&mut tx, set.setlist_id).await?;

    let set = load_set_songs(&mut tx, set).await?;
    tx.commit().await?;

    info!(set_id = %set_id, song_id = %add.song_id, "Song added to set");
    Ok(set)
}

async fn take_song(conn: &mut SqliteConnection, set_id: Uuid, song_id: Uuid) -> Result<()> {
    let mut ids = load_junction_song_ids(conn, "set_songs", "set_id", set_id).await?;
    let before = ids.len();
    ids.retain(|id| *id != song_id);
    if ids.len() == before {
        return Err(Error::NotFound(format!("Song {} in set {}", song_id, set_id)));
    }
    write_junction_songs(conn, "set_songs", "set_id", set_id, &ids).await
}

/// Remove one song from a set
pub async fn remove_song_from_set(pool: &SqlitePool, user: &User, set_id: Uuid, song_id: Uuid) -> Result<SetWithSongs> {
    let mut tx = begin_write(pool).await?;
    let set = load_owned_set(&mut tx, user, set_id).await?;

    take_song(&mut tx, set_id, song_id).await?;
    sqlx::query(
        "UPDATE performance_sessions SET current_song_id = NULL WHERE current_set_id = ? AND current_song_id = ?",
    )
    .bind(set_id.to_string())
    .bind(song_id.to_string())
    .execute(&mut *tx)
    .await?;
    touch_setlist(&mut tx, set.setlist_id).await?;

    let set = load_set_songs(&mut tx, set).await?;
    tx.commit().await?;

    info!(set_id = %set_id, song_id = %song_id, "Song removed from set");
    Ok(set)
}

/// Reorder a set's songs; the list must name every song exactly once
pub async fn reorder_set_songs(
    pool: &SqlitePool,
    user: &User,
    set_id: Uuid,
    ordered_song_ids: &[Uuid],
) -> Result<SetWithSongs> {
    let mut tx = begin_write(pool).await?;
    let set = load_owned_set(&mut tx, user, set_id).await?;

    let existing = load_junction_song_ids(&mut tx, "set_songs", "set_id", set_id).await?;
    if !is_permutation(&existing, ordered_song_ids) {
        return Err(Error::InvalidInput(
            "Song order must list every song of the set exactly once".to_string(),
        ));
    }

    write_junction_songs(&mut tx, "set_songs", "set_id", set_id, ordered_song_ids).await?;
    touch_setlist(&mut tx, set.setlist_id).await?;

    let set = load_set_songs(&mut tx, set).await?;
    tx.commit().await?;

    debug!(set_id = %set_id, "Set songs reordered");
    Ok(set)
}

/// Drag a song from one set to another set of the same setlist
///
/// Returns the source and destination sets after the move.
pub async fn move_song(
    pool: &SqlitePool,
    user: &User,
    from_set_id: Uuid,
    song_id: Uuid,
    target: MoveSong,
) -> Result<(SetWithSongs, SetWithSongs)> {
    let mut tx = begin_write(pool).await?;
    let from = load_owned_set(&mut tx, user, from_set_id).await?;
    let to = load_set(&mut tx, target.to_set_id).await?;
    if to.setlist_id != from.setlist_id {
        return Err(Error::InvalidInput(
            "Songs can only be moved between sets of the same setlist".to_string(),
        ));
    }

    take_song(&mut tx, from.id, song_id).await?;

    let mut ids = load_junction_song_ids(&mut tx, "set_songs", "set_id", to.id).await?;
    if ids.contains(&song_id) {
        return Err(Error::Conflict("This song is already in the set.".to_string()));
    }
    insert_at(&mut ids, target.position, song_id);
    write_junction_songs(&mut tx, "set_songs", "set_id", to.id, &ids).await?;

    sqlx::query(
        "UPDATE performance_sessions SET current_set_id = ? WHERE current_set_id = ? AND current_song_id = ?",
    )
    .bind(to.id.to_string())
    .bind(from.id.to_string())
    .bind(song_id.to_string())
    .execute(&mut *tx)
    .await?;
    touch_setlist(&mut tx, from.setlist_id).await?;

    let from = load_set_songs(&mut tx, from).await?;
    let to = load_set_songs(&mut tx, to).await?;
    tx.commit().await?;

    info!(song_id = %song_id, from = %from.set.id, to = %to.set.id, "Song moved between sets");
    Ok((from, to))
}

/// Append the songs of a template or collection to an existing set
///
/// Songs already in the set are skipped.
pub async fn apply_source_to_set(
    pool: &SqlitePool,
    user: &User,
    set_id: Uuid,
    source: SongSource,
    force: bool,
) -> Result<SetWithSongs> {
    let mut tx = begin_write(pool).await?;
    let set = load_owned_set(&mut tx, user, set_id).await?;

    let mut ids = load_junction_song_ids(&mut tx, "set_songs", "set_id", set_id).await?;
    let incoming: Vec<Uuid> = load_visible_song_ids(&mut tx, user, source.kind, source.id)
        .await?
        .into_iter()
        .filter(|id| !ids.contains(id))
        .collect();

    check_songs(&mut tx, set.setlist_id, &incoming, Some(set_id), force).await?;
    ids.extend(incoming.iter().copied());
    write_junction_songs(&mut tx, "set_songs", "set_id", set_id, &ids).await?;
    touch_setlist(&mut tx, set.setlist_id).await?;

    let set = load_set_songs(&mut tx, set).await?;
    tx.commit().await?;

    info!(set_id = %set_id, added = incoming.len(), "Applied {} to set", source.kind.noun());
    Ok(set)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::setlists::{create_setlist, get_setlist, NewSetlist};
    use crate::db::song_lists::{create_song_list, NewSongList};
    use crate::db::test_support;
    use setlist_common::db::models::{Setlist, Song, UserLevel};

    struct Fixture {
        pool: SqlitePool,
        user: User,
        setlist: Setlist,
        songs: Vec<Song>,
    }

    async fn fixture() -> Fixture {
        let pool = test_support::pool().await;
        let user = test_support::user(&pool, "Freddie", UserLevel::Editor).await;
        let mut songs = Vec::new();
        for title in ["Yesterday", "Help!", "Let It Be", "Something"] {
            songs.push(test_support::song(&pool, &user, "The Beatles", title).await);
        }
        let setlist = create_setlist(
            &pool,
            &user,
            NewSetlist {
                name: "Cavern Club".into(),
                is_public: false,
            },
        )
        .await
        .unwrap();

        Fixture {
            pool,
            user,
            setlist,
            songs,
        }
    }

    fn new_set(name: &str, song_ids: Vec<Uuid>) -> NewSet {
        NewSet {
            name: name.to_string(),
            song_ids,
            force: false,
        }
    }

    fn ids(set: &SetWithSongs) -> Vec<Uuid> {
        set.songs.iter().map(|s| s.id).collect()
    }

    #[tokio::test]
    async fn test_duplicate_song_across_sets_reports_first_set() {
        let f = fixture().await;
        let yesterday = f.songs[0].id;

        let first = create_set(&f.pool, &f.user, f.setlist.id, new_set("Set 1", vec![yesterday]))
            .await
            .unwrap();

        let err = create_set(
            &f.pool,
            &f.user,
            f.setlist.id,
            new_set("Set 2", vec![f.songs[1].id, yesterday]),
        )
        .await
        .unwrap_err();

        match err {
            Error::DuplicatesFound(dups) => {
                assert_eq!(dups.len(), 1);
                assert_eq!(dups[0].song_id, yesterday);
                assert_eq!(dups[0].title, "Yesterday");
                assert_eq!(dups[0].set_id, first.set.id);
                assert_eq!(dups[0].set_name, "Set 1");
            }
            other => panic!("expected duplicates, got {:?}", other),
        }

        // Nothing was written
        let detail = get_setlist(&f.pool, &f.user, f.setlist.id).await.unwrap();
        assert_eq!(detail.sets.len(), 1);
    }

    #[tokio::test]
    async fn test_force_allows_duplicates() {
        let f = fixture().await;
        let yesterday = f.songs[0].id;

        create_set(&f.pool, &f.user, f.setlist.id, new_set("Set 1", vec![yesterday]))
            .await
            .unwrap();
        let mut forced = new_set("Encore", vec![yesterday]);
        forced.force = true;
        let encore = create_set(&f.pool, &f.user, f.setlist.id, forced).await.unwrap();

        assert_eq!(encore.set.set_order, 1);
        assert_eq!(ids(&encore), vec![yesterday]);
    }

    #[tokio::test]
    async fn test_repeated_song_in_request_rejected() {
        let f = fixture().await;
        let result = create_set(
            &f.pool,
            &f.user,
            f.setlist.id,
            new_set("Set 1", vec![f.songs[0].id, f.songs[0].id]),
        )
        .await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_update_ignores_own_songs_in_duplicate_check() {
        let f = fixture().await;
        let set = create_set(&f.pool, &f.user, f.setlist.id, new_set("Set 1", vec![f.songs[0].id]))
            .await
            .unwrap();

        let updated = update_set(
            &f.pool,
            &f.user,
            set.set.id,
            SetUpdate {
                name: Some("Opening".into()),
                song_ids: Some(vec![f.songs[1].id, f.songs[0].id]),
                force: false,
            },
        )
        .await
        .unwrap();

        assert_eq!(updated.set.name, "Opening");
        assert_eq!(ids(&updated), vec![f.songs[1].id, f.songs[0].id]);
    }

    #[tokio::test]
    async fn test_delete_set_compacts_order() {
        let f = fixture().await;
        let mut created = Vec::new();
        for (i, name) in ["One", "Two", "Three"].iter().enumerate() {
            created.push(
                create_set(&f.pool, &f.user, f.setlist.id, new_set(name, vec![f.songs[i].id]))
                    .await
                    .unwrap(),
            );
        }

        delete_set(&f.pool, &f.user, created[1].set.id).await.unwrap();

        let detail = get_setlist(&f.pool, &f.user, f.setlist.id).await.unwrap();
        let orders: Vec<(String, i64)> = detail
            .sets
            .iter()
            .map(|s| (s.set.name.clone(), s.set.set_order))
            .collect();
        assert_eq!(orders, vec![("One".to_string(), 0), ("Three".to_string(), 1)]);
    }

    #[tokio::test]
    async fn test_reorder_sets_requires_permutation() {
        let f = fixture().await;
        let a = create_set(&f.pool, &f.user, f.setlist.id, new_set("A", vec![])).await.unwrap();
        let b = create_set(&f.pool, &f.user, f.setlist.id, new_set("B", vec![])).await.unwrap();

        assert!(matches!(
            reorder_sets(&f.pool, &f.user, f.setlist.id, &[a.set.id]).await,
            Err(Error::InvalidInput(_))
        ));

        let sets = reorder_sets(&f.pool, &f.user, f.setlist.id, &[b.set.id, a.set.id])
            .await
            .unwrap();
        assert_eq!(sets[0].id, b.set.id);
        assert_eq!(sets[1].set_order, 1);
    }

    #[tokio::test]
    async fn test_add_remove_and_reorder_songs() {
        let f = fixture().await;
        let set = create_set(
            &f.pool,
            &f.user,
            f.setlist.id,
            new_set("Set 1", vec![f.songs[0].id, f.songs[1].id]),
        )
        .await
        .unwrap();

        let set = add_song_to_set(
            &f.pool,
            &f.user,
            set.set.id,
            AddSong {
                song_id: f.songs[2].id,
                position: Some(0),
                force: false,
            },
        )
        .await
        .unwrap();
        assert_eq!(ids(&set), vec![f.songs[2].id, f.songs[0].id, f.songs[1].id]);

        let set = remove_song_from_set(&f.pool, &f.user, set.set.id, f.songs[0].id)
            .await
            .unwrap();
        assert_eq!(ids(&set), vec![f.songs[2].id, f.songs[1].id]);

        let set = reorder_set_songs(&f.pool, &f.user, set.set.id, &[f.songs[1].id, f.songs[2].id])
            .await
            .unwrap();
        assert_eq!(ids(&set), vec![f.songs[1].id, f.songs[2].id]);

        assert!(matches!(
            remove_song_from_set(&f.pool, &f.user, set.set.id, f.songs[3].id).await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_move_song_between_sets() {
        let f = fixture().await;
        let one = create_set(
            &f.pool,
            &f.user,
            f.setlist.id,
            new_set("One", vec![f.songs[0].id, f.songs[1].id]),
        )
        .await
        .unwrap();
        let two = create_set(&f.pool, &f.user, f.setlist.id, new_set("Two", vec![f.songs[2].id]))
            .await
            .unwrap();

        let (from, to) = move_song(
            &f.pool,
            &f.user,
            one.set.id,
            f.songs[0].id,
            MoveSong {
                to_set_id: two.set.id,
                position: None,
            },
        )
        .await
        .unwrap();

        assert_eq!(ids(&from), vec![f.songs[1].id]);
        assert_eq!(ids(&to), vec![f.songs[2].id, f.songs[0].id]);
    }

    #[tokio::test]
    async fn test_create_set_from_template() {
        let f = fixture().await;
        let template = create_song_list(
            &f.pool,
            &f.user,
            SongListKind::Template,
            NewSongList {
                name: "Acoustic".into(),
                description: None,
                is_public: false,
                song_ids: vec![f.songs[3].id, f.songs[2].id],
            },
        )
        .await
        .unwrap();

        let set = create_set_from_source(
            &f.pool,
            &f.user,
            f.setlist.id,
            "Unplugged",
            SongSource {
                kind: SongListKind::Template,
                id: template.list.id,
            },
            false,
        )
        .await
        .unwrap();
        assert_eq!(ids(&set), vec![f.songs[3].id, f.songs[2].id]);

        // Applying the same template to a second set collides with the first
        let other = create_set(&f.pool, &f.user, f.setlist.id, new_set("Other", vec![f.songs[0].id]))
            .await
            .unwrap();
        let result = apply_source_to_set(
            &f.pool,
            &f.user,
            other.set.id,
            SongSource {
                kind: SongListKind::Template,
                id: template.list.id,
            },
            false,
        )
        .await;
        assert!(matches!(result, Err(Error::DuplicatesFound(d)) if d.len() == 2));
    }

    #[tokio::test]
    async fn test_other_users_cannot_edit_sets() {
        let f = fixture().await;
        let stranger = test_support::user(&f.pool, "Brian", UserLevel::Editor).await;

        let result = create_set(&f.pool, &stranger, f.setlist.id, new_set("Mine", vec![])).await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }
}
