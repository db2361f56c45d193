//! Data model: persisted rows, status enums, and wire DTOs.
//!
//! Status values are stored as `SMALLINT` and ordered so that "terminal"
//! is a simple comparison: room statuses at or past [`RoomStatus::Finished`]
//! and participant statuses at or past [`ParticipantStatus::Rejected`] never
//! regress.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Lifecycle status of a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, sqlx::Type)]
#[repr(i16)]
pub enum RoomStatus {
    NotStarted = 0,
    InProgress = 1,
    Finished = 2,
    Cancelled = 3,
    Rejected = 4,
    Busy = 5,
    Missed = 6,
}

impl RoomStatus {
    /// Terminal rooms accept no further lifecycle transitions.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        self >= RoomStatus::Finished
    }

    #[must_use]
    pub fn as_i16(self) -> i16 {
        self as i16
    }
}

/// Lifecycle status of a participant row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, sqlx::Type)]
#[repr(i16)]
pub enum ParticipantStatus {
    Inviting = 0,
    Joined = 1,
    Rejected = 2,
    Hangup = 3,
    Missed = 4,
    Busy = 5,
    Cancelled = 6,
}

impl ParticipantStatus {
    /// The explicit active set; all correctness decisions use this, never
    /// a numeric comparison.
    #[must_use]
    pub fn is_active(self) -> bool {
        matches!(
            self,
            ParticipantStatus::Inviting | ParticipantStatus::Joined
        )
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        self >= ParticipantStatus::Rejected
    }

    #[must_use]
    pub fn as_i16(self) -> i16 {
        self as i16
    }
}

/// A conference room row.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Room {
    pub id: i64,
    pub source_channel_id: String,
    pub source_channel_type: i16,
    pub creator: String,
    pub room_id: String,
    pub rtc_type: i16,
    pub invite_on: bool,
    pub status: RoomStatus,
    pub max_participants: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A (room, user) pairing. Never deleted; terminal statuses are reached in
/// place, and a renewed invitation resets the row to `Inviting`.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Participant {
    pub id: i64,
    pub room_id: String,
    pub uid: String,
    pub device_type: String,
    pub status: ParticipantStatus,
    pub join_time: i64,
    pub leave_time: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Participant {
    /// A participant counts as having joined once it is currently `Joined`
    /// or has a recorded leave time.
    #[must_use]
    pub fn has_joined(&self) -> bool {
        self.status == ParticipantStatus::Joined || self.leave_time > 0
    }
}

// ============================================================================
// Client API DTOs
// ============================================================================

/// Body of `POST /api/v1/rooms`.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateRoomRequest {
    pub source_channel_id: String,
    #[serde(default)]
    pub source_channel_type: i16,
    pub creator: String,
    /// Optional; a fresh UUID is generated when absent.
    #[serde(default)]
    pub room_id: Option<String>,
    #[serde(default)]
    pub rtc_type: i16,
    #[serde(default, deserialize_with = "bool_or_int")]
    pub invite_on: bool,
    #[serde(default)]
    pub max_participants: Option<i32>,
    #[serde(default)]
    pub uids: Vec<String>,
}

/// Body of `POST /api/v1/rooms/{room_id}/join`.
#[derive(Debug, Clone, Deserialize)]
pub struct JoinRoomRequest {
    pub uid: String,
    #[serde(default)]
    pub device_type: String,
}

/// Body of `POST /api/v1/rooms/{room_id}/leave`.
#[derive(Debug, Clone, Deserialize)]
pub struct LeaveRoomRequest {
    pub uid: String,
}

/// Body of `POST /api/v1/rooms/{room_id}/invite`.
#[derive(Debug, Clone, Deserialize)]
pub struct InviteRequest {
    #[serde(default)]
    pub uids: Vec<String>,
}

/// Room envelope returned by create/join/sync, including the caller's
/// freshly minted access credentials.
#[derive(Debug, Clone, Serialize)]
pub struct RoomEnvelope {
    pub room_id: String,
    pub creator: String,
    pub token: String,
    pub url: String,
    pub status: i16,
    pub created_at: i64,
    pub max_participants: i32,
    /// Access-token validity in seconds.
    pub timeout: u64,
    pub uids: Vec<String>,
}

/// `GET /api/v1/rooms/{room_id}` response.
#[derive(Debug, Clone, Serialize)]
pub struct RoomDetail {
    pub id: i64,
    pub source_channel_id: String,
    pub source_channel_type: i16,
    pub creator: String,
    pub room_id: String,
    pub rtc_type: i16,
    pub invite_on: bool,
    pub status: i16,
    pub max_participants: i32,
    pub created_at: i64,
    pub updated_at: i64,
}

impl From<&Room> for RoomDetail {
    fn from(room: &Room) -> Self {
        RoomDetail {
            id: room.id,
            source_channel_id: room.source_channel_id.clone(),
            source_channel_type: room.source_channel_type,
            creator: room.creator.clone(),
            room_id: room.room_id.clone(),
            rtc_type: room.rtc_type,
            invite_on: room.invite_on,
            status: room.status.as_i16(),
            max_participants: room.max_participants,
            created_at: room.created_at.timestamp(),
            updated_at: room.updated_at.timestamp(),
        }
    }
}

/// Entry of `GET /api/v1/rooms/{room_id}/participants`.
#[derive(Debug, Clone, Serialize)]
pub struct ParticipantDetail {
    pub room_id: String,
    pub uid: String,
    pub device_type: String,
    pub status: i16,
    pub join_time: i64,
    pub leave_time: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

impl From<&Participant> for ParticipantDetail {
    fn from(p: &Participant) -> Self {
        ParticipantDetail {
            room_id: p.room_id.clone(),
            uid: p.uid.clone(),
            device_type: p.device_type.clone(),
            status: p.status.as_i16(),
            join_time: p.join_time,
            leave_time: p.leave_time,
            created_at: p.created_at.timestamp(),
            updated_at: p.updated_at.timestamp(),
        }
    }
}

// ============================================================================
// SFU webhook DTOs
// ============================================================================

/// SFU callback kinds the controller reacts to.
pub mod sfu_events {
    pub const ROOM_STARTED: &str = "room_started";
    pub const ROOM_FINISHED: &str = "room_finished";
    pub const PARTICIPANT_JOINED: &str = "participant_joined";
    pub const PARTICIPANT_LEFT: &str = "participant_left";
}

/// Envelope of an inbound SFU callback.
///
/// SFU deployments disagree on whether numeric timestamps arrive as JSON
/// numbers or strings, so all of them are parsed leniently.
#[derive(Debug, Clone, Deserialize)]
pub struct SfuWebhookEvent {
    pub event: String,
    pub id: String,
    #[serde(default, rename = "createdAt", deserialize_with = "i64_or_string")]
    pub created_at: i64,
    #[serde(default)]
    pub room: Option<SfuRoomInfo>,
    #[serde(default)]
    pub participant: Option<SfuParticipantInfo>,
}

/// `room` block of an SFU callback. `name` is our `room_id`.
#[derive(Debug, Clone, Deserialize)]
pub struct SfuRoomInfo {
    #[serde(default)]
    pub sid: String,
    pub name: String,
    #[serde(default, rename = "creationTime", deserialize_with = "i64_or_string")]
    pub creation_time: i64,
    #[serde(default, rename = "numParticipants")]
    pub num_participants: u32,
    #[serde(default)]
    pub metadata: String,
}

/// `participant` block of an SFU callback. `identity` is our `uid`.
#[derive(Debug, Clone, Deserialize)]
pub struct SfuParticipantInfo {
    #[serde(default)]
    pub sid: String,
    pub identity: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "joinedAt", deserialize_with = "i64_or_string")]
    pub joined_at: i64,
    #[serde(default)]
    pub metadata: String,
}

impl SfuParticipantInfo {
    /// Device type carried as opaque JSON metadata on the access token.
    #[must_use]
    pub fn device_type(&self) -> Option<String> {
        #[derive(Deserialize)]
        struct Meta {
            device_type: String,
        }
        serde_json::from_str::<Meta>(&self.metadata)
            .ok()
            .map(|m| m.device_type)
    }
}

fn i64_or_string<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Lenient {
        Num(i64),
        Text(String),
    }

    match Lenient::deserialize(deserializer)? {
        Lenient::Num(v) => Ok(v),
        Lenient::Text(s) => s.parse::<i64>().map_err(serde::de::Error::custom),
    }
}

fn bool_or_int<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Lenient {
        Flag(bool),
        Num(i64),
    }

    match Lenient::deserialize(deserializer)? {
        Lenient::Flag(b) => Ok(b),
        Lenient::Num(n) => Ok(n != 0),
    }
}
