//! Room/participant state machine.
//!
//! All write authority over rooms and participants lives here. The three
//! sources of mutation - client API calls, SFU callbacks, and timeout
//! firings - funnel into the same transition logic, and every multi-row
//! mutation runs in a transaction that first locks the room row, so
//! operations within one room serialise while distinct rooms proceed
//! concurrently.
//!
//! Leave handling is one decision function, [`classify_leave`],
//! parameterised by the source; the transaction code only applies the
//! outcome it returns.

use crate::errors::CallError;
use crate::models::{
    sfu_events, CreateRoomRequest, JoinRoomRequest, Participant, ParticipantStatus, Room,
    RoomEnvelope, RoomStatus, SfuWebhookEvent,
};
use crate::observability::metrics;
use crate::redis::{Coordinator, WEBHOOK_DEDUP_TTL};
use crate::repositories::{ParticipantsRepository, RoomsRepository, UidFilter};
use crate::services::event_publisher::EventPublisher;
use crate::services::events::{self, event_types};
use crate::services::invite_timers::InviteTimers;
use crate::sfu::TokenMinter;
use chrono::Utc;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};
use uuid::Uuid;

const ACTIVE: &[ParticipantStatus] = &[ParticipantStatus::Inviting, ParticipantStatus::Joined];
const INVITING_ONLY: &[ParticipantStatus] = &[ParticipantStatus::Inviting];

/// Which side reported a leave.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaveSource {
    Client,
    Sfu,
}

/// The room/participant service.
pub struct RoomService {
    pool: PgPool,
    minter: TokenMinter,
    publisher: EventPublisher,
    coordinator: Option<Coordinator>,
    timers: Arc<InviteTimers>,
    invite_timeout: Duration,
    default_max_participants: i32,
}

impl RoomService {
    #[must_use]
    pub fn new(
        pool: PgPool,
        minter: TokenMinter,
        publisher: EventPublisher,
        coordinator: Option<Coordinator>,
        invite_timeout: Duration,
        default_max_participants: i32,
    ) -> Self {
        Self {
            pool,
            minter,
            publisher,
            coordinator,
            timers: Arc::new(InviteTimers::new()),
            invite_timeout,
            default_max_participants,
        }
    }

    /// Invite timeout, exposed for response envelopes and the sweeper.
    #[must_use]
    pub fn invite_timeout(&self) -> Duration {
        self.invite_timeout
    }

    /// Pending precise timers, exposed for shutdown logging.
    #[must_use]
    pub fn pending_timers(&self) -> usize {
        self.timers.len()
    }

    // ========================================================================
    // Client operations
    // ========================================================================

    /// Create a room with its creator and invited participants.
    ///
    /// No business event is emitted here; `room.started` fires when the SFU
    /// confirms the room actually started.
    #[instrument(skip_all, name = "cc.service.create_room", fields(creator = %req.creator))]
    pub async fn create_room(
        self: &Arc<Self>,
        req: CreateRoomRequest,
    ) -> Result<RoomEnvelope, CallError> {
        let room_id = match &req.room_id {
            Some(id) if !id.is_empty() => id.clone(),
            _ => Uuid::new_v4().to_string(),
        };

        let max_participants = req
            .max_participants
            .filter(|&m| m > 0)
            .unwrap_or(self.default_max_participants);

        let invited = dedupe_uids(&req.uids, &req.creator);

        let mut tx = self.pool.begin().await?;

        if req.room_id.as_deref().is_some_and(|id| !id.is_empty())
            && RoomsRepository::get(&mut *tx, &room_id).await?.is_some()
        {
            return Err(CallError::RoomAlreadyExists(room_id));
        }

        if RoomsRepository::find_active_by_channel(
            &mut *tx,
            &req.source_channel_id,
            req.source_channel_type,
        )
        .await?
        .is_some()
        {
            return Err(CallError::ChannelHasActiveRoom);
        }

        if ParticipantsRepository::find_active_by_uid(&mut *tx, &req.creator)
            .await?
            .is_some()
        {
            return Err(CallError::CreatorInAnotherCall);
        }

        if !invited.is_empty() {
            let busy =
                ParticipantsRepository::list_active_by_uids(&mut *tx, &invited).await?;
            if let Some(p) = busy.first() {
                return Err(CallError::ParticipantInCall(p.uid.clone()));
            }
        }

        let room = RoomsRepository::insert(
            &mut *tx,
            &room_id,
            &req.creator,
            &req.source_channel_id,
            req.source_channel_type,
            req.rtc_type,
            req.invite_on,
            max_participants,
        )
        .await
        .map_err(|e| {
            // A unique violation means a concurrent create won the race:
            // either on the room id or on the active-channel index.
            let constraint = e
                .as_database_error()
                .filter(|db| db.is_unique_violation())
                .and_then(|db| db.constraint().map(str::to_string));
            match constraint.as_deref() {
                Some("uq_call_room_active_channel") => CallError::ChannelHasActiveRoom,
                Some(_) => CallError::RoomAlreadyExists(room_id.clone()),
                None => CallError::from(e),
            }
        })?;

        ParticipantsRepository::insert(
            &mut *tx,
            &room_id,
            &req.creator,
            "",
            ParticipantStatus::Inviting,
            0,
        )
        .await?;
        for uid in &invited {
            ParticipantsRepository::insert(
                &mut *tx,
                &room_id,
                uid,
                "",
                ParticipantStatus::Inviting,
                0,
            )
            .await?;
        }

        tx.commit().await?;

        self.schedule_invite_timer(&room_id, &req.creator);
        for uid in &invited {
            self.schedule_invite_timer(&room_id, uid);
        }

        let minted = self.minter.mint(&room_id, &req.creator, "")?;
        let mut uids = vec![req.creator.clone()];
        uids.extend(invited);

        info!(
            target: "cc.service",
            room_id = %room_id,
            creator = %req.creator,
            invited = uids.len() - 1,
            max_participants,
            "Room created"
        );

        Ok(RoomEnvelope {
            room_id: room.room_id,
            creator: room.creator,
            token: minted.token,
            url: minted.client_url,
            status: room.status.as_i16(),
            created_at: room.created_at.timestamp(),
            max_participants: room.max_participants,
            timeout: minted.ttl_seconds,
            uids,
        })
    }

    /// Join a room, minting credentials for the caller.
    #[instrument(skip_all, name = "cc.service.join_room", fields(room_id = %room_id, uid = %req.uid))]
    pub async fn join_room(
        &self,
        room_id: &str,
        req: &JoinRoomRequest,
    ) -> Result<RoomEnvelope, CallError> {
        let now = Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        let room = RoomsRepository::get_for_update(&mut *tx, room_id)
            .await?
            .ok_or_else(|| CallError::RoomNotFound(room_id.to_string()))?;
        if room.status.is_terminal() {
            return Err(CallError::RoomNotActive);
        }

        let existing = ParticipantsRepository::get(&mut *tx, room_id, &req.uid).await?;

        // The joiner's own active row does not occupy a new slot.
        let mut active = ParticipantsRepository::count_active(&mut *tx, room_id).await?;
        if existing.as_ref().is_some_and(|p| p.status.is_active()) {
            active -= 1;
        }
        if active >= i64::from(room.max_participants) {
            return Err(CallError::RoomFull);
        }

        if room.invite_on
            && !existing
                .as_ref()
                .is_some_and(|p| p.status == ParticipantStatus::Inviting)
        {
            return Err(CallError::NotInvited);
        }

        ParticipantsRepository::upsert_joined(&mut *tx, room_id, &req.uid, &req.device_type, now)
            .await?;
        tx.commit().await?;

        self.timers.cancel(room_id, &req.uid);

        let minted = self.minter.mint(room_id, &req.uid, &req.device_type)?;
        let roster = ParticipantsRepository::list_by_room(&self.pool, room_id).await?;

        Ok(RoomEnvelope {
            room_id: room.room_id.clone(),
            creator: room.creator.clone(),
            token: minted.token,
            url: minted.client_url,
            status: room.status.as_i16(),
            created_at: room.created_at.timestamp(),
            max_participants: room.max_participants,
            timeout: minted.ttl_seconds,
            uids: events::roster_uids(&roster),
        })
    }

    /// Leave a room on client request.
    ///
    /// No `participant.left` is emitted on this path; the SFU callback is
    /// the source of truth for physical leaves.
    #[instrument(skip_all, name = "cc.service.leave_room", fields(room_id = %room_id, uid = %uid))]
    pub async fn leave_room(&self, room_id: &str, uid: &str) -> Result<(), CallError> {
        self.apply_leave(room_id, uid, LeaveSource::Client).await
    }

    /// Invite additional uids into an existing room.
    #[instrument(skip_all, name = "cc.service.invite", fields(room_id = %room_id))]
    pub async fn invite(self: &Arc<Self>, room_id: &str, uids: &[String]) -> Result<(), CallError> {
        let invited: Vec<String> = dedupe_uids(uids, "");
        if invited.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;

        let room = RoomsRepository::get_for_update(&mut *tx, room_id)
            .await?
            .ok_or_else(|| CallError::RoomNotFound(room_id.to_string()))?;
        if room.status.is_terminal() {
            return Err(CallError::RoomNotActive);
        }

        let active = ParticipantsRepository::count_active(&mut *tx, room_id).await?;
        if active + invited.len() as i64 > i64::from(room.max_participants) {
            return Err(CallError::RoomFull);
        }

        for uid in &invited {
            ParticipantsRepository::upsert_inviting(&mut *tx, room_id, uid).await?;
        }
        tx.commit().await?;

        for uid in &invited {
            self.schedule_invite_timer(room_id, uid);
        }

        if let Some((room, roster)) = self.fresh_room_and_roster(room_id).await? {
            let data =
                events::participant_invited(&room, events::roster_uids(&roster), invited);
            self.publisher.publish(event_types::PARTICIPANT_INVITED, &data);
        }

        Ok(())
    }

    /// Rooms the uid may currently (re)connect to, each with a fresh token.
    #[instrument(skip_all, name = "cc.service.sync", fields(uid = %uid))]
    pub async fn user_available_rooms(
        &self,
        uid: &str,
        device_type: &str,
    ) -> Result<Vec<RoomEnvelope>, CallError> {
        let rows =
            ParticipantsRepository::list_active_rows_for_uid(&self.pool, uid).await?;

        let mut envelopes = Vec::new();
        for row in rows {
            // Another device already owns a joined session.
            if row.status == ParticipantStatus::Joined && row.device_type != device_type {
                continue;
            }

            let Some(room) = RoomsRepository::get(&self.pool, &row.room_id).await? else {
                continue;
            };
            if room.status.is_terminal() {
                continue;
            }

            let minted = self.minter.mint(&room.room_id, uid, device_type)?;
            let roster =
                ParticipantsRepository::list_by_room(&self.pool, &room.room_id).await?;
            envelopes.push(RoomEnvelope {
                room_id: room.room_id.clone(),
                creator: room.creator.clone(),
                token: minted.token,
                url: minted.client_url,
                status: room.status.as_i16(),
                created_at: room.created_at.timestamp(),
                max_participants: room.max_participants,
                timeout: minted.ttl_seconds,
                uids: events::roster_uids(&roster),
            });
        }

        Ok(envelopes)
    }

    /// Room detail lookup.
    pub async fn get_room(&self, room_id: &str) -> Result<Room, CallError> {
        RoomsRepository::get(&self.pool, room_id)
            .await?
            .ok_or_else(|| CallError::RoomNotFound(room_id.to_string()))
    }

    /// Full roster of a room.
    pub async fn list_participants(&self, room_id: &str) -> Result<Vec<Participant>, CallError> {
        if RoomsRepository::get(&self.pool, room_id).await?.is_none() {
            return Err(CallError::RoomNotFound(room_id.to_string()));
        }
        Ok(ParticipantsRepository::list_by_room(&self.pool, room_id).await?)
    }

    // ========================================================================
    // Timeout handling
    // ========================================================================

    /// Move a participant whose invitation expired to `Missed`.
    ///
    /// Idempotent: the status re-check inside the transaction absorbs races
    /// with joins, leaves, a concurrent sweep, or a late cancel.
    #[instrument(skip_all, name = "cc.service.invite_timeout", fields(room_id = %room_id, uid = %uid))]
    pub async fn handle_invite_timeout(
        &self,
        room_id: &str,
        uid: &str,
        source: &'static str,
    ) -> Result<(), CallError> {
        let mut tx = self.pool.begin().await?;

        let Some(room) = RoomsRepository::get_for_update(&mut *tx, room_id).await? else {
            return Ok(());
        };
        let Some(participant) = ParticipantsRepository::get(&mut *tx, room_id, uid).await? else {
            return Ok(());
        };
        if participant.status != ParticipantStatus::Inviting {
            // Raced with a join or leave; nothing to do.
            return Ok(());
        }

        ParticipantsRepository::update_status(
            &mut *tx,
            room_id,
            UidFilter::One(uid),
            Some(INVITING_ONLY),
            ParticipantStatus::Missed,
            None,
        )
        .await?;

        let roster = ParticipantsRepository::list_by_room(&mut *tx, room_id).await?;
        let nobody_joined = roster
            .iter()
            .all(|p| p.status != ParticipantStatus::Joined);
        if !room.status.is_terminal() && nobody_joined {
            RoomsRepository::update_status(&mut *tx, room_id, RoomStatus::Missed).await?;
        }

        tx.commit().await?;
        metrics::record_invite_timeout(source);

        info!(
            target: "cc.service",
            room_id,
            uid,
            source,
            "Participant invitation timed out"
        );

        if let Some((room, roster)) = self.fresh_room_and_roster(room_id).await? {
            let data = events::participant_missed(
                &room,
                events::roster_uids(&roster),
                vec![uid.to_string()],
            );
            self.publisher.publish(event_types::PARTICIPANT_MISSED, &data);
        }

        self.reconcile_room_terminal(room_id).await
    }

    /// One pass of the periodic safety sweep: expire every `Inviting` row
    /// older than the invite timeout.
    ///
    /// Precise timers normally fire first; the sweep only catches what a
    /// restart (or a failed timer transition) left behind. Each row goes
    /// through the same idempotent timeout transition.
    pub async fn sweep_expired_invitations(&self) -> Result<usize, CallError> {
        let cutoff = Utc::now()
            - chrono::Duration::seconds(self.invite_timeout.as_secs() as i64);
        let expired =
            ParticipantsRepository::list_expired_inviting(&self.pool, cutoff).await?;

        let mut reaped = 0;
        for row in &expired {
            match self
                .handle_invite_timeout(&row.room_id, &row.uid, "sweep")
                .await
            {
                Ok(()) => reaped += 1,
                Err(e) => {
                    warn!(
                        target: "cc.service",
                        room_id = %row.room_id,
                        uid = %row.uid,
                        error = %e,
                        "Sweep failed to expire invitation"
                    );
                }
            }
        }
        Ok(reaped)
    }

    // ========================================================================
    // SFU callbacks
    // ========================================================================

    /// Process a verified SFU callback, deduplicated across replicas.
    #[instrument(skip_all, name = "cc.service.sfu_event", fields(event = %event.event, event_id = %event.id))]
    pub async fn handle_sfu_event(&self, event: &SfuWebhookEvent) -> Result<(), CallError> {
        let dedup_key = Coordinator::webhook_key(&event.event, &event.id);
        if let Some(coordinator) = &self.coordinator {
            if coordinator.seen(&dedup_key).await {
                info!(
                    target: "cc.service",
                    event = %event.event,
                    event_id = %event.id,
                    "SFU event already processed, skipping"
                );
                metrics::record_sfu_event(&event.event, "duplicate");
                return Ok(());
            }
        }

        let result = match event.event.as_str() {
            sfu_events::ROOM_STARTED => self.sfu_room_started(event).await,
            sfu_events::ROOM_FINISHED => self.sfu_room_finished(event).await,
            sfu_events::PARTICIPANT_JOINED => self.sfu_participant_joined(event).await,
            sfu_events::PARTICIPANT_LEFT => self.sfu_participant_left(event).await,
            other => {
                warn!(target: "cc.service", event = %other, "Unknown SFU event, acknowledging");
                metrics::record_sfu_event(other, "unknown");
                return Ok(());
            }
        };

        match &result {
            Ok(()) => {
                metrics::record_sfu_event(&event.event, "processed");
                if let Some(coordinator) = &self.coordinator {
                    coordinator.mark(&dedup_key, WEBHOOK_DEDUP_TTL).await;
                }
            }
            Err(_) => metrics::record_sfu_event(&event.event, "error"),
        }
        result
    }

    async fn sfu_room_started(&self, event: &SfuWebhookEvent) -> Result<(), CallError> {
        let Some(room_info) = &event.room else {
            return Ok(());
        };
        let room_id = &room_info.name;

        {
            let mut tx = self.pool.begin().await?;
            let Some(room) = RoomsRepository::get_for_update(&mut *tx, room_id).await? else {
                warn!(target: "cc.service", room_id = %room_id, "room_started for unknown room");
                return Ok(());
            };
            if room.status.is_terminal() {
                return Ok(());
            }
            if room.status == RoomStatus::NotStarted {
                RoomsRepository::update_status(&mut *tx, room_id, RoomStatus::InProgress)
                    .await?;
            }
            tx.commit().await?;
        }

        if let Some((room, roster)) = self.fresh_room_and_roster(room_id).await? {
            let data = events::room_started(&room, events::roster_uids(&roster));
            self.publisher.publish(event_types::ROOM_STARTED, &data);
        }
        Ok(())
    }

    async fn sfu_room_finished(&self, event: &SfuWebhookEvent) -> Result<(), CallError> {
        let Some(room_info) = &event.room else {
            return Ok(());
        };
        let room_id = &room_info.name;

        {
            let mut tx = self.pool.begin().await?;
            if RoomsRepository::get_for_update(&mut *tx, room_id).await?.is_none() {
                warn!(target: "cc.service", room_id = %room_id, "room_finished for unknown room");
                return Ok(());
            }
            ParticipantsRepository::update_status(
                &mut *tx,
                room_id,
                UidFilter::All,
                Some(ACTIVE),
                ParticipantStatus::Hangup,
                None,
            )
            .await?;
            tx.commit().await?;
        }

        self.reconcile_room_terminal(room_id).await
    }

    async fn sfu_participant_joined(&self, event: &SfuWebhookEvent) -> Result<(), CallError> {
        let (Some(room_info), Some(participant)) = (&event.room, &event.participant) else {
            return Ok(());
        };
        let room_id = &room_info.name;
        let uid = &participant.identity;
        let now = Utc::now().timestamp();

        let device_type = participant.device_type().unwrap_or_default();

        {
            let mut tx = self.pool.begin().await?;
            let Some(room) = RoomsRepository::get_for_update(&mut *tx, room_id).await? else {
                warn!(target: "cc.service", room_id = %room_id, "participant_joined for unknown room");
                return Ok(());
            };
            if room.status.is_terminal() {
                return Ok(());
            }
            ParticipantsRepository::upsert_joined(&mut *tx, room_id, uid, &device_type, now)
                .await?;
            tx.commit().await?;
        }

        self.timers.cancel(room_id, uid);

        if let Some((room, roster)) = self.fresh_room_and_roster(room_id).await? {
            let data =
                events::participant_joined(&room, events::roster_uids(&roster), uid, &device_type);
            self.publisher.publish(event_types::PARTICIPANT_JOINED, &data);
        }
        Ok(())
    }

    async fn sfu_participant_left(&self, event: &SfuWebhookEvent) -> Result<(), CallError> {
        let (Some(room_info), Some(participant)) = (&event.room, &event.participant) else {
            return Ok(());
        };
        self.apply_leave(&room_info.name, &participant.identity, LeaveSource::Sfu)
            .await
    }

    // ========================================================================
    // Shared transition logic
    // ========================================================================

    async fn apply_leave(
        &self,
        room_id: &str,
        uid: &str,
        source: LeaveSource,
    ) -> Result<(), CallError> {
        let now = Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        let Some(room) = RoomsRepository::get_for_update(&mut *tx, room_id).await? else {
            return match source {
                LeaveSource::Client => Err(CallError::RoomNotFound(room_id.to_string())),
                LeaveSource::Sfu => {
                    warn!(target: "cc.service", room_id = %room_id, "participant_left for unknown room");
                    Ok(())
                }
            };
        };
        if room.status.is_terminal() {
            return Ok(());
        }

        let roster = ParticipantsRepository::list_by_room(&mut *tx, room_id).await?;
        let Some(leaver) = roster.iter().find(|p| p.uid == uid) else {
            return match source {
                LeaveSource::Client => Err(CallError::ParticipantNotFound(uid.to_string())),
                LeaveSource::Sfu => Ok(()),
            };
        };

        let outcome = classify_leave(
            &room,
            &roster,
            leaver,
            source,
            now,
            self.invite_timeout.as_secs() as i64,
        );

        match outcome.peers {
            PeerUpdate::None => {}
            PeerUpdate::CancelAll => {
                ParticipantsRepository::update_status(
                    &mut *tx,
                    room_id,
                    UidFilter::All,
                    Some(ACTIVE),
                    ParticipantStatus::Cancelled,
                    None,
                )
                .await?;
            }
            PeerUpdate::ActivePeers { status, leave_time } => {
                ParticipantsRepository::update_status(
                    &mut *tx,
                    room_id,
                    UidFilter::AllExcept(uid),
                    Some(ACTIVE),
                    status,
                    leave_time,
                )
                .await?;
            }
            PeerUpdate::InvitingPeers { status } => {
                ParticipantsRepository::update_status(
                    &mut *tx,
                    room_id,
                    UidFilter::AllExcept(uid),
                    Some(INVITING_ONLY),
                    status,
                    None,
                )
                .await?;
            }
        }

        if let Some((status, leave_time)) = outcome.leaver {
            ParticipantsRepository::update_status(
                &mut *tx,
                room_id,
                UidFilter::One(uid),
                None,
                status,
                leave_time,
            )
            .await?;
        }

        if let Some(status) = outcome.room_status {
            RoomsRepository::update_status(&mut *tx, room_id, status).await?;
        }

        tx.commit().await?;

        // Timers for everyone the transition touched are moot now; firing
        // ones re-check status and turn into no-ops anyway.
        self.timers.cancel(room_id, uid);
        if !matches!(outcome.peers, PeerUpdate::None) {
            for p in &roster {
                self.timers.cancel(room_id, &p.uid);
            }
        }

        if !outcome.events.is_empty() {
            if let Some((room, roster)) = self.fresh_room_and_roster(room_id).await? {
                let uids = events::roster_uids(&roster);
                for event in &outcome.events {
                    match event {
                        LeaveEvent::Cancelled => {
                            let data = events::participant_cancelled(&room, uids.clone());
                            self.publisher
                                .publish(event_types::PARTICIPANT_CANCELLED, &data);
                        }
                        LeaveEvent::Rejected => {
                            let data =
                                events::participant_rejected(&room, uids.clone(), uid);
                            self.publisher
                                .publish(event_types::PARTICIPANT_REJECTED, &data);
                        }
                        LeaveEvent::Left => {
                            let data = events::participant_left(&room, uids.clone(), uid);
                            self.publisher.publish(event_types::PARTICIPANT_LEFT, &data);
                        }
                    }
                }
            }
        }

        self.reconcile_room_terminal(room_id).await
    }

    /// If every participant reached a terminal status, derive and persist
    /// the room's terminal status, then emit `room.finished` exactly once.
    #[instrument(skip_all, name = "cc.service.reconcile", fields(room_id = %room_id))]
    pub async fn reconcile_room_terminal(&self, room_id: &str) -> Result<(), CallError> {
        let mut tx = self.pool.begin().await?;

        let Some(room) = RoomsRepository::get_for_update(&mut *tx, room_id).await? else {
            return Ok(());
        };
        let participants = ParticipantsRepository::list_by_room(&mut *tx, room_id).await?;

        let mut final_room = room.clone();
        if room.status.is_terminal() {
            // Already terminal; release the row lock before emitting.
            drop(tx);
        } else {
            let all_terminal = !participants.is_empty()
                && participants.iter().all(|p| p.status.is_terminal());
            if !all_terminal {
                return Ok(());
            }

            let status = derive_terminal_status(&room, &participants);
            RoomsRepository::update_status(&mut *tx, room_id, status).await?;
            tx.commit().await?;

            final_room.status = status;
            final_room.updated_at = Utc::now();

            info!(
                target: "cc.service",
                room_id,
                status = status.as_i16(),
                "Room reached terminal status"
            );
        }

        let data = events::room_finished(&final_room, &participants);
        self.publisher
            .publish_room_finished_once(room_id, &data)
            .await;

        Ok(())
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn schedule_invite_timer(self: &Arc<Self>, room_id: &str, uid: &str) {
        let weak = Arc::downgrade(self);
        let room_id_owned = room_id.to_string();
        let uid_owned = uid.to_string();

        self.timers
            .schedule(room_id, uid, self.invite_timeout, move || async move {
                let Some(service) = weak.upgrade() else {
                    return;
                };
                if let Err(e) = service
                    .handle_invite_timeout(&room_id_owned, &uid_owned, "timer")
                    .await
                {
                    warn!(
                        target: "cc.service",
                        room_id = %room_id_owned,
                        uid = %uid_owned,
                        error = %e,
                        "Invite timeout transition failed; the sweep will retry"
                    );
                }
            });
    }

    async fn fresh_room_and_roster(
        &self,
        room_id: &str,
    ) -> Result<Option<(Room, Vec<Participant>)>, CallError> {
        let Some(room) = RoomsRepository::get(&self.pool, room_id).await? else {
            return Ok(None);
        };
        let roster = ParticipantsRepository::list_by_room(&self.pool, room_id).await?;
        Ok(Some((room, roster)))
    }
}

/// Deduplicate uids, preserving order, dropping empties and `exclude`.
fn dedupe_uids(uids: &[String], exclude: &str) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    uids.iter()
        .filter(|uid| !uid.is_empty() && uid.as_str() != exclude)
        .filter(|uid| seen.insert(uid.as_str()))
        .cloned()
        .collect()
}

// ============================================================================
// Leave classification
// ============================================================================

/// What happens to the non-leaving participants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerUpdate {
    None,
    /// Every still-active row, the leaver included, becomes Cancelled.
    CancelAll,
    /// Active peers move to `status` (optionally stamping a leave time).
    ActivePeers {
        status: ParticipantStatus,
        leave_time: Option<i64>,
    },
    /// Only peers still `Inviting` move to `status`.
    InvitingPeers { status: ParticipantStatus },
}

/// Events the transition emits, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaveEvent {
    Cancelled,
    Rejected,
    Left,
}

/// Decision of [`classify_leave`]: row updates plus events to emit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaveOutcome {
    /// New status and leave time for the leaver; `None` when the peer
    /// update already covers it.
    pub leaver: Option<(ParticipantStatus, Option<i64>)>,
    pub peers: PeerUpdate,
    pub room_status: Option<RoomStatus>,
    pub events: Vec<LeaveEvent>,
}

/// Classify a leave into row updates and events.
///
/// This is the single transition rule shared by the client leave endpoint
/// and the SFU `participant_left` callback. The SFU variant treats the SFU
/// as the source of truth: the leaver had a live media session, and a
/// two-party room whose peer never answered resolves to Missed or
/// Cancelled depending on how long the call rang.
#[must_use]
pub fn classify_leave(
    room: &Room,
    roster: &[Participant],
    leaver: &Participant,
    source: LeaveSource,
    now: i64,
    invite_timeout: i64,
) -> LeaveOutcome {
    let two_party = room.max_participants == 2;
    let is_creator = leaver.uid == room.creator;

    match source {
        LeaveSource::Client => {
            let joined_count = roster
                .iter()
                .filter(|p| {
                    matches!(
                        p.status,
                        ParticipantStatus::Joined | ParticipantStatus::Hangup
                    )
                })
                .count();

            if two_party && is_creator && joined_count < 2 {
                return LeaveOutcome {
                    leaver: None,
                    peers: PeerUpdate::CancelAll,
                    room_status: Some(RoomStatus::Cancelled),
                    events: vec![LeaveEvent::Cancelled],
                };
            }

            if two_party && !is_creator && !leaver.has_joined() {
                return LeaveOutcome {
                    leaver: Some((ParticipantStatus::Rejected, None)),
                    peers: PeerUpdate::ActivePeers {
                        status: ParticipantStatus::Rejected,
                        leave_time: None,
                    },
                    room_status: Some(RoomStatus::Rejected),
                    events: vec![LeaveEvent::Rejected],
                };
            }

            if !two_party && !leaver.has_joined() {
                return LeaveOutcome {
                    leaver: Some((ParticipantStatus::Rejected, None)),
                    peers: PeerUpdate::None,
                    room_status: None,
                    events: vec![LeaveEvent::Rejected],
                };
            }

            hangup_outcome(two_party, now, Vec::new())
        }
        LeaveSource::Sfu => {
            let peer_ever_joined = roster.iter().any(|p| {
                p.uid != leaver.uid
                    && (matches!(
                        p.status,
                        ParticipantStatus::Joined | ParticipantStatus::Hangup
                    ) || p.leave_time > 0)
            });

            if two_party && !peer_ever_joined {
                // The call never connected; decide missed vs cancelled by
                // how long it rang.
                let timed_out = now - leaver.join_time > invite_timeout;
                let (peer_status, room_status) = if timed_out {
                    (ParticipantStatus::Missed, RoomStatus::Missed)
                } else {
                    (ParticipantStatus::Cancelled, RoomStatus::Cancelled)
                };
                return LeaveOutcome {
                    leaver: Some((ParticipantStatus::Hangup, Some(now))),
                    peers: PeerUpdate::InvitingPeers {
                        status: peer_status,
                    },
                    room_status: Some(room_status),
                    events: vec![LeaveEvent::Left],
                };
            }

            if !two_party && is_creator && !peer_ever_joined {
                return LeaveOutcome {
                    leaver: None,
                    peers: PeerUpdate::CancelAll,
                    room_status: Some(RoomStatus::Cancelled),
                    events: vec![LeaveEvent::Cancelled, LeaveEvent::Left],
                };
            }

            hangup_outcome(two_party, now, vec![LeaveEvent::Left])
        }
    }
}

fn hangup_outcome(two_party: bool, now: i64, events: Vec<LeaveEvent>) -> LeaveOutcome {
    if two_party {
        LeaveOutcome {
            leaver: Some((ParticipantStatus::Hangup, Some(now))),
            peers: PeerUpdate::ActivePeers {
                status: ParticipantStatus::Hangup,
                leave_time: Some(now),
            },
            room_status: Some(RoomStatus::Finished),
            events,
        }
    } else {
        LeaveOutcome {
            leaver: Some((ParticipantStatus::Hangup, Some(now))),
            peers: PeerUpdate::None,
            room_status: None,
            events,
        }
    }
}

/// Room terminal status once every participant is terminal: for two-party
/// rooms the participant statuses decide, in priority order Missed, Busy,
/// Cancelled, Rejected; multi-party rooms and plain hangups finish as
/// Finished.
#[must_use]
pub fn derive_terminal_status(room: &Room, participants: &[Participant]) -> RoomStatus {
    if room.max_participants != 2 {
        return RoomStatus::Finished;
    }

    const PRIORITY: &[(ParticipantStatus, RoomStatus)] = &[
        (ParticipantStatus::Missed, RoomStatus::Missed),
        (ParticipantStatus::Busy, RoomStatus::Busy),
        (ParticipantStatus::Cancelled, RoomStatus::Cancelled),
        (ParticipantStatus::Rejected, RoomStatus::Rejected),
    ];

    for (participant_status, room_status) in PRIORITY {
        if participants.iter().any(|p| p.status == *participant_status) {
            return *room_status;
        }
    }
    RoomStatus::Finished
}
