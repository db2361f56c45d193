//! Business event construction.
//!
//! Builds the typed payloads the fan-out publisher sends downstream. Every
//! payload embeds the room envelope with the full uid roster at build time;
//! participant events add the operator uid and, where relevant, the subset
//! of uids the event is about.

use crate::models::{Participant, ParticipantStatus, Room, RoomStatus};
use chrono::Utc;
use serde::Serialize;

/// Outbound business event kinds.
pub mod event_types {
    pub const ROOM_STARTED: &str = "room.started";
    pub const ROOM_FINISHED: &str = "room.finished";
    pub const PARTICIPANT_INVITED: &str = "participant.invited";
    pub const PARTICIPANT_JOINED: &str = "participant.joined";
    pub const PARTICIPANT_LEFT: &str = "participant.left";
    pub const PARTICIPANT_REJECTED: &str = "participant.rejected";
    pub const PARTICIPANT_MISSED: &str = "participant.missed";
    pub const PARTICIPANT_CANCELLED: &str = "participant.cancelled";
}

/// Room envelope shared by every business event.
#[derive(Debug, Clone, Serialize)]
pub struct RoomEventData {
    pub source_channel_id: String,
    pub source_channel_type: i16,
    pub room_id: String,
    pub creator: String,
    pub rtc_type: i16,
    pub invite_on: bool,
    pub status: i16,
    pub max_participants: i32,
    /// Full uid roster of the room, regardless of status.
    pub uids: Vec<String>,
    pub created_at: i64,
    pub updated_at: i64,
    /// Call duration in seconds; only on `room.finished`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<i64>,
}

/// Payload of participant lifecycle events.
#[derive(Debug, Clone, Serialize)]
pub struct ParticipantEventData {
    #[serde(flatten)]
    pub room: RoomEventData,
    /// Operator uid: who joined, left, rejected, or cancelled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub device_type: String,
    /// Newly invited uids; only on `participant.invited`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invited_uids: Option<Vec<String>>,
    /// Timed-out uids; only on `participant.missed`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub missed_uids: Option<Vec<String>>,
}

/// Base envelope for a room and its current roster.
#[must_use]
pub fn room_envelope(room: &Room, uids: Vec<String>) -> RoomEventData {
    RoomEventData {
        source_channel_id: room.source_channel_id.clone(),
        source_channel_type: room.source_channel_type,
        room_id: room.room_id.clone(),
        creator: room.creator.clone(),
        rtc_type: room.rtc_type,
        invite_on: room.invite_on,
        status: room.status.as_i16(),
        max_participants: room.max_participants,
        uids,
        created_at: room.created_at.timestamp(),
        updated_at: room.updated_at.timestamp(),
        duration: None,
    }
}

/// `room.started` payload.
#[must_use]
pub fn room_started(room: &Room, uids: Vec<String>) -> RoomEventData {
    let mut data = room_envelope(room, uids);
    data.status = RoomStatus::InProgress.as_i16();
    data
}

/// `room.finished` payload with the computed call duration.
#[must_use]
pub fn room_finished(room: &Room, participants: &[Participant]) -> RoomEventData {
    let uids = roster_uids(participants);
    let mut data = room_envelope(room, uids);
    data.duration = Some(call_duration(participants));
    data
}

/// `participant.joined` payload.
#[must_use]
pub fn participant_joined(
    room: &Room,
    uids: Vec<String>,
    uid: &str,
    device_type: &str,
) -> ParticipantEventData {
    ParticipantEventData {
        room: room_envelope(room, uids),
        uid: Some(uid.to_string()),
        device_type: device_type.to_string(),
        invited_uids: None,
        missed_uids: None,
    }
}

/// `participant.left` payload.
#[must_use]
pub fn participant_left(room: &Room, uids: Vec<String>, uid: &str) -> ParticipantEventData {
    ParticipantEventData {
        room: room_envelope(room, uids),
        uid: Some(uid.to_string()),
        device_type: String::new(),
        invited_uids: None,
        missed_uids: None,
    }
}

/// `participant.rejected` payload.
#[must_use]
pub fn participant_rejected(
    room: &Room,
    uids: Vec<String>,
    uid: &str,
) -> ParticipantEventData {
    ParticipantEventData {
        room: room_envelope(room, uids),
        uid: Some(uid.to_string()),
        device_type: String::new(),
        invited_uids: None,
        missed_uids: None,
    }
}

/// `participant.cancelled` payload. The operator is always the creator and
/// the reported room status is Cancelled.
#[must_use]
pub fn participant_cancelled(room: &Room, uids: Vec<String>) -> ParticipantEventData {
    let mut envelope = room_envelope(room, uids);
    envelope.status = RoomStatus::Cancelled.as_i16();
    envelope.updated_at = Utc::now().timestamp();
    ParticipantEventData {
        uid: Some(room.creator.clone()),
        room: envelope,
        device_type: String::new(),
        invited_uids: None,
        missed_uids: None,
    }
}

/// `participant.missed` payload for the uids whose invitation timed out.
#[must_use]
pub fn participant_missed(
    room: &Room,
    uids: Vec<String>,
    missed_uids: Vec<String>,
) -> ParticipantEventData {
    ParticipantEventData {
        room: room_envelope(room, uids),
        uid: None,
        device_type: String::new(),
        invited_uids: None,
        missed_uids: Some(missed_uids),
    }
}

/// `participant.invited` payload for newly invited uids.
#[must_use]
pub fn participant_invited(
    room: &Room,
    uids: Vec<String>,
    invited_uids: Vec<String>,
) -> ParticipantEventData {
    ParticipantEventData {
        room: room_envelope(room, uids),
        uid: None,
        device_type: String::new(),
        invited_uids: Some(invited_uids),
        missed_uids: None,
    }
}

/// Every uid associated with the room, regardless of status.
#[must_use]
pub fn roster_uids(participants: &[Participant]) -> Vec<String> {
    participants.iter().map(|p| p.uid.clone()).collect()
}

/// Call duration: `max(leave_time) - max(join_time)` across participants
/// whose terminal status is Hangup, or 0 when either bound is unset.
#[must_use]
pub fn call_duration(participants: &[Participant]) -> i64 {
    let mut start: i64 = 0;
    let mut end: i64 = 0;

    for p in participants {
        if p.status != ParticipantStatus::Hangup {
            continue;
        }
        start = start.max(p.join_time);
        end = end.max(p.leave_time);
    }

    if start == 0 || end == 0 {
        return 0;
    }
    end - start
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn room() -> Room {
        Room {
            id: 1,
            source_channel_id: "c1".into(),
            source_channel_type: 1,
            creator: "alice".into(),
            room_id: "r-1".into(),
            rtc_type: 1,
            invite_on: true,
            status: RoomStatus::InProgress,
            max_participants: 2,
            created_at: Utc.timestamp_opt(1_714_000_000, 0).unwrap(),
            updated_at: Utc.timestamp_opt(1_714_000_100, 0).unwrap(),
        }
    }

    fn participant(uid: &str, status: ParticipantStatus, join: i64, leave: i64) -> Participant {
        Participant {
            id: 0,
            room_id: "r-1".into(),
            uid: uid.into(),
            device_type: String::new(),
            status,
            join_time: join,
            leave_time: leave,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_call_duration_uses_latest_join_and_leave() {
        let participants = vec![
            participant("a", ParticipantStatus::Hangup, 100, 160),
            participant("b", ParticipantStatus::Hangup, 130, 160),
        ];
        // max(join) = 130, max(leave) = 160
        assert_eq!(call_duration(&participants), 30);
    }

    #[test]
    fn test_call_duration_ignores_non_hangup_rows() {
        let participants = vec![
            participant("a", ParticipantStatus::Hangup, 100, 150),
            participant("b", ParticipantStatus::Missed, 0, 999),
        ];
        assert_eq!(call_duration(&participants), 50);
    }

    #[test]
    fn test_call_duration_zero_when_nobody_hung_up() {
        let participants = vec![
            participant("a", ParticipantStatus::Missed, 0, 0),
            participant("b", ParticipantStatus::Missed, 0, 0),
        ];
        assert_eq!(call_duration(&participants), 0);
    }

    #[test]
    fn test_call_duration_zero_when_join_time_unset() {
        let participants = vec![participant("a", ParticipantStatus::Hangup, 0, 150)];
        assert_eq!(call_duration(&participants), 0);
    }

    #[test]
    fn test_room_finished_carries_duration_and_roster() {
        let participants = vec![
            participant("alice", ParticipantStatus::Hangup, 100, 130),
            participant("bob", ParticipantStatus::Hangup, 105, 130),
        ];
        let data = room_finished(&room(), &participants);

        assert_eq!(data.duration, Some(25));
        assert_eq!(data.uids, vec!["alice", "bob"]);
        assert_eq!(data.room_id, "r-1");
        assert_eq!(data.created_at, 1_714_000_000);
    }

    #[test]
    fn test_room_started_reports_in_progress() {
        let mut r = room();
        r.status = RoomStatus::NotStarted;
        let data = room_started(&r, vec!["alice".into()]);
        assert_eq!(data.status, RoomStatus::InProgress.as_i16());
        assert_eq!(data.duration, None);
    }

    #[test]
    fn test_participant_cancelled_operator_is_creator() {
        let data = participant_cancelled(&room(), vec!["alice".into(), "bob".into()]);
        assert_eq!(data.uid.as_deref(), Some("alice"));
        assert_eq!(data.room.status, RoomStatus::Cancelled.as_i16());
    }

    #[test]
    fn test_participant_missed_serialises_missed_uids_field() {
        let data = participant_missed(
            &room(),
            vec!["alice".into(), "bob".into()],
            vec!["bob".into()],
        );
        let json = serde_json::to_value(&data).expect("serialize");

        assert_eq!(json["missed_uids"], serde_json::json!(["bob"]));
        // The envelope is flattened into the payload
        assert_eq!(json["room_id"], "r-1");
        assert!(json.get("uid").is_none());
        assert!(json.get("invited_uids").is_none());
    }

    #[test]
    fn test_participant_joined_serialises_operator_and_device() {
        let data = participant_joined(&room(), vec!["alice".into()], "alice", "ios");
        let json = serde_json::to_value(&data).expect("serialize");

        assert_eq!(json["uid"], "alice");
        assert_eq!(json["device_type"], "ios");
        assert_eq!(json["invite_on"], true);
    }

    #[test]
    fn test_participant_invited_carries_subset() {
        let data = participant_invited(
            &room(),
            vec!["alice".into(), "bob".into(), "carol".into()],
            vec!["carol".into()],
        );
        let json = serde_json::to_value(&data).expect("serialize");

        assert_eq!(json["invited_uids"], serde_json::json!(["carol"]));
        assert_eq!(json["uids"], serde_json::json!(["alice", "bob", "carol"]));
    }
}
