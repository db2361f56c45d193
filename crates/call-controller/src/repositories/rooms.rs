//! Rooms repository.
//!
//! The room row doubles as the lock line: any transaction that mutates
//! multiple rows of one room calls [`RoomsRepository::get_for_update`]
//! first, so concurrent transactions on the same room serialise while
//! different rooms stay fully concurrent.

use crate::models::{Room, RoomStatus};
use crate::observability::metrics;
use sqlx::PgExecutor;
use std::time::Instant;

/// Columns selected for every room query.
const ROOM_SELECT: &str = r#"
    SELECT
        id, source_channel_id, source_channel_type, creator, room_id,
        rtc_type, invite_on, status, max_participants, created_at, updated_at
    FROM call_room
"#;

/// Rooms repository for database operations.
pub struct RoomsRepository;

impl RoomsRepository {
    /// Fetch a room by its public id.
    pub async fn get<'e, E>(ex: E, room_id: &str) -> Result<Option<Room>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let query = format!("{ROOM_SELECT} WHERE room_id = $1");
        sqlx::query_as::<_, Room>(&query)
            .bind(room_id)
            .fetch_optional(ex)
            .await
    }

    /// Fetch a room by its public id and lock the row for the remainder of
    /// the enclosing transaction.
    pub async fn get_for_update<'e, E>(
        ex: E,
        room_id: &str,
    ) -> Result<Option<Room>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let query = format!("{ROOM_SELECT} WHERE room_id = $1 FOR UPDATE");
        sqlx::query_as::<_, Room>(&query)
            .bind(room_id)
            .fetch_optional(ex)
            .await
    }

    /// Find the room currently occupying a `(channel_id, channel_type)`
    /// pair, i.e. one whose status is NotStarted or InProgress.
    pub async fn find_active_by_channel<'e, E>(
        ex: E,
        channel_id: &str,
        channel_type: i16,
    ) -> Result<Option<Room>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let query = format!(
            "{ROOM_SELECT} WHERE source_channel_id = $1 AND source_channel_type = $2 \
             AND status IN ($3, $4) LIMIT 1"
        );
        sqlx::query_as::<_, Room>(&query)
            .bind(channel_id)
            .bind(channel_type)
            .bind(RoomStatus::NotStarted)
            .bind(RoomStatus::InProgress)
            .fetch_optional(ex)
            .await
    }

    /// Insert a new room and return the stored row.
    #[allow(clippy::too_many_arguments)]
    pub async fn insert<'e, E>(
        ex: E,
        room_id: &str,
        creator: &str,
        source_channel_id: &str,
        source_channel_type: i16,
        rtc_type: i16,
        invite_on: bool,
        max_participants: i32,
    ) -> Result<Room, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let start = Instant::now();

        let result = sqlx::query_as::<_, Room>(
            r#"
            INSERT INTO call_room (
                room_id, creator, source_channel_id, source_channel_type,
                rtc_type, invite_on, status, max_participants
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING
                id, source_channel_id, source_channel_type, creator, room_id,
                rtc_type, invite_on, status, max_participants, created_at, updated_at
            "#,
        )
        .bind(room_id)
        .bind(creator)
        .bind(source_channel_id)
        .bind(source_channel_type)
        .bind(rtc_type)
        .bind(invite_on)
        .bind(RoomStatus::NotStarted)
        .bind(max_participants)
        .fetch_one(ex)
        .await;

        let outcome = if result.is_ok() { "success" } else { "error" };
        metrics::record_db_query("insert_room", outcome, start.elapsed());
        result
    }

    /// Set the room status.
    pub async fn update_status<'e, E>(
        ex: E,
        room_id: &str,
        status: RoomStatus,
    ) -> Result<(), sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query("UPDATE call_room SET status = $2, updated_at = NOW() WHERE room_id = $1")
            .bind(room_id)
            .bind(status)
            .execute(ex)
            .await?;
        Ok(())
    }
}
