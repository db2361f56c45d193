//! Participants repository.
//!
//! Participant rows are never deleted. A renewed invitation reuses the row
//! by resetting it to `Inviting` with a fresh `created_at` (the timestamp
//! the timeout sweep measures against).

use crate::models::{Participant, ParticipantStatus};
use chrono::{DateTime, Utc};
use sqlx::PgExecutor;

/// Columns selected for every participant query.
const PARTICIPANT_SELECT: &str = r#"
    SELECT
        id, room_id, uid, device_type, status, join_time, leave_time,
        created_at, updated_at
    FROM call_participant
"#;

/// Row filter for bulk status updates within one room.
#[derive(Debug, Clone, Copy)]
pub enum UidFilter<'a> {
    /// A single participant.
    One(&'a str),
    /// Everyone in the room except the named uid.
    AllExcept(&'a str),
    /// Everyone in the room.
    All,
}

/// Participants repository for database operations.
pub struct ParticipantsRepository;

impl ParticipantsRepository {
    /// Fetch one participant row by its `(room_id, uid)` key.
    pub async fn get<'e, E>(
        ex: E,
        room_id: &str,
        uid: &str,
    ) -> Result<Option<Participant>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let query = format!("{PARTICIPANT_SELECT} WHERE room_id = $1 AND uid = $2");
        sqlx::query_as::<_, Participant>(&query)
            .bind(room_id)
            .bind(uid)
            .fetch_optional(ex)
            .await
    }

    /// Find a uid's active participation (Inviting or Joined) across all
    /// rooms. At most one row can match while invariants hold.
    pub async fn find_active_by_uid<'e, E>(
        ex: E,
        uid: &str,
    ) -> Result<Option<Participant>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let query = format!("{PARTICIPANT_SELECT} WHERE uid = $1 AND status IN ($2, $3) LIMIT 1");
        sqlx::query_as::<_, Participant>(&query)
            .bind(uid)
            .bind(ParticipantStatus::Inviting)
            .bind(ParticipantStatus::Joined)
            .fetch_optional(ex)
            .await
    }

    /// List all active participations for a set of uids.
    pub async fn list_active_by_uids<'e, E>(
        ex: E,
        uids: &[String],
    ) -> Result<Vec<Participant>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let query =
            format!("{PARTICIPANT_SELECT} WHERE uid = ANY($1) AND status IN ($2, $3)");
        sqlx::query_as::<_, Participant>(&query)
            .bind(uids)
            .bind(ParticipantStatus::Inviting)
            .bind(ParticipantStatus::Joined)
            .fetch_all(ex)
            .await
    }

    /// List the full roster of a room, oldest row first.
    pub async fn list_by_room<'e, E>(
        ex: E,
        room_id: &str,
    ) -> Result<Vec<Participant>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let query = format!("{PARTICIPANT_SELECT} WHERE room_id = $1 ORDER BY id");
        sqlx::query_as::<_, Participant>(&query)
            .bind(room_id)
            .fetch_all(ex)
            .await
    }

    /// Rooms the uid can still connect to: the uid's active rows.
    pub async fn list_active_rows_for_uid<'e, E>(
        ex: E,
        uid: &str,
    ) -> Result<Vec<Participant>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let query = format!("{PARTICIPANT_SELECT} WHERE uid = $1 AND status IN ($2, $3)");
        sqlx::query_as::<_, Participant>(&query)
            .bind(uid)
            .bind(ParticipantStatus::Inviting)
            .bind(ParticipantStatus::Joined)
            .fetch_all(ex)
            .await
    }

    /// Count a room's active (Inviting or Joined) participants.
    pub async fn count_active<'e, E>(ex: E, room_id: &str) -> Result<i64, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let row: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM call_participant WHERE room_id = $1 AND status IN ($2, $3)",
        )
        .bind(room_id)
        .bind(ParticipantStatus::Inviting)
        .bind(ParticipantStatus::Joined)
        .fetch_one(ex)
        .await?;
        Ok(row.0)
    }

    /// Insert a participant row.
    pub async fn insert<'e, E>(
        ex: E,
        room_id: &str,
        uid: &str,
        device_type: &str,
        status: ParticipantStatus,
        join_time: i64,
    ) -> Result<(), sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query(
            r#"
            INSERT INTO call_participant (room_id, uid, device_type, status, join_time)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(room_id)
        .bind(uid)
        .bind(device_type)
        .bind(status)
        .bind(join_time)
        .execute(ex)
        .await?;
        Ok(())
    }

    /// Insert or reset a row to `Inviting` with a fresh `created_at`.
    pub async fn upsert_inviting<'e, E>(
        ex: E,
        room_id: &str,
        uid: &str,
    ) -> Result<(), sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query(
            r#"
            INSERT INTO call_participant (room_id, uid, status)
            VALUES ($1, $2, $3)
            ON CONFLICT (room_id, uid) DO UPDATE
            SET status = $3, created_at = NOW(), updated_at = NOW()
            "#,
        )
        .bind(room_id)
        .bind(uid)
        .bind(ParticipantStatus::Inviting)
        .execute(ex)
        .await?;
        Ok(())
    }

    /// Insert or move a row to `Joined`, recording the join time and the
    /// device that owns the session.
    pub async fn upsert_joined<'e, E>(
        ex: E,
        room_id: &str,
        uid: &str,
        device_type: &str,
        join_time: i64,
    ) -> Result<(), sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query(
            r#"
            INSERT INTO call_participant (room_id, uid, device_type, status, join_time)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (room_id, uid) DO UPDATE
            SET status = $4, join_time = $5, device_type = $3, updated_at = NOW()
            "#,
        )
        .bind(room_id)
        .bind(uid)
        .bind(device_type)
        .bind(ParticipantStatus::Joined)
        .bind(join_time)
        .execute(ex)
        .await?;
        Ok(())
    }

    /// Bulk status update within one room.
    ///
    /// `from_statuses` restricts which current statuses are touched (e.g.
    /// only `Inviting`, or only the active set); `None` touches every row
    /// the uid filter selects. Returns the number of affected rows.
    pub async fn update_status<'e, E>(
        ex: E,
        room_id: &str,
        filter: UidFilter<'_>,
        from_statuses: Option<&[ParticipantStatus]>,
        new_status: ParticipantStatus,
        leave_time: Option<i64>,
    ) -> Result<u64, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let query =
            build_update_status_sql(leave_time.is_some(), filter, from_statuses.is_some());

        let mut q = sqlx::query(&query).bind(room_id).bind(new_status);
        if let Some(leave_time) = leave_time {
            q = q.bind(leave_time);
        }
        match filter {
            UidFilter::One(uid) | UidFilter::AllExcept(uid) => {
                q = q.bind(uid);
            }
            UidFilter::All => {}
        }
        if let Some(statuses) = from_statuses {
            let codes: Vec<i16> = statuses.iter().map(|s| s.as_i16()).collect();
            q = q.bind(codes);
        }

        let result = q.execute(ex).await?;
        Ok(result.rows_affected())
    }

    /// Participants still `Inviting` whose invitation is older than the
    /// cutoff. Feeds the periodic timeout sweep.
    pub async fn list_expired_inviting<'e, E>(
        ex: E,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Participant>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let query = format!("{PARTICIPANT_SELECT} WHERE status = $1 AND created_at < $2");
        sqlx::query_as::<_, Participant>(&query)
            .bind(ParticipantStatus::Inviting)
            .bind(cutoff)
            .fetch_all(ex)
            .await
    }
}

/// SQL for [`ParticipantsRepository::update_status`]. Bind order after the
/// fixed `$1` room id and `$2` status: leave time, uid filter, status set.
fn build_update_status_sql(has_leave_time: bool, filter: UidFilter<'_>, has_statuses: bool) -> String {
    let mut query = String::from("UPDATE call_participant SET status = $2, updated_at = NOW()");
    if has_leave_time {
        query.push_str(", leave_time = $3");
    }
    query.push_str(" WHERE room_id = $1");

    let mut next = if has_leave_time { 4 } else { 3 };
    match filter {
        UidFilter::One(_) => {
            query.push_str(&format!(" AND uid = ${next}"));
            next += 1;
        }
        UidFilter::AllExcept(_) => {
            query.push_str(&format!(" AND uid <> ${next}"));
            next += 1;
        }
        UidFilter::All => {}
    }
    if has_statuses {
        query.push_str(&format!(" AND status = ANY(${next})"));
    }
    query
}
