//! Session lifecycle and video room joins
//!
//! Room provisioning is external I/O and never happens inside a database
//! transaction. A join validates in one transaction, talks to the provider,
//! then records the room in a second short transaction. When two joins race
//! on a fresh room the first recorded room wins and the loser's room is
//! deleted.

use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use tutora_core::models::{Caller, NotificationKind, Session, SessionStatus, SessionType, UserRole};
use tutora_core::traits::{
    Clock, IdentityDirectory, NotificationSink, SeriesRepository, SessionRepository, Store,
    StoreTx, VideoRoomProvider,
};
use tutora_core::{AppError, AppResult};
use uuid::Uuid;

use crate::outbox::Outbox;

const FALLBACK_DISPLAY_NAME: &str = "Participant";

/// A session with its participant list
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    #[serde(flatten)]
    pub session: Session,
    pub participants: Vec<Uuid>,
}

/// Everything a client needs to enter the video room
#[derive(Debug, Clone, Serialize)]
pub struct JoinTicket {
    pub session_id: Uuid,
    pub room_id: String,
    pub token: String,
    pub is_host: bool,
}

fn provisioning(e: AppError) -> AppError {
    match e {
        AppError::RoomProvisioning(_) => e,
        other => AppError::RoomProvisioning(other.to_string()),
    }
}

pub struct SessionService<S: Store> {
    store: Arc<S>,
    directory: Arc<dyn IdentityDirectory>,
    notifier: Arc<dyn NotificationSink>,
    rooms: Arc<dyn VideoRoomProvider>,
    clock: Arc<dyn Clock>,
}

impl<S: Store> SessionService<S> {
    pub fn new(
        store: Arc<S>,
        directory: Arc<dyn IdentityDirectory>,
        notifier: Arc<dyn NotificationSink>,
        rooms: Arc<dyn VideoRoomProvider>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            directory,
            notifier,
            rooms,
            clock,
        }
    }

    /// Lock a session for a lifecycle change, series row first
    ///
    /// Refunds hold the series row while they check that nothing started,
    /// so a session of a series only changes state under that lock.
    async fn owned_session(&self, tx: &mut S::Tx, caller: &Caller, session_id: Uuid) -> AppResult<Session> {
        let current = tx
            .find_session(session_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("session {}", session_id)))?;
        caller.require_owner(current.teacher_id, "session")?;

        if let Some(series_id) = current.series_id {
            tx.series_for_update(series_id).await?;
        }
        let session = tx
            .session_for_update(session_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("session {}", session_id)))?;
        Ok(session)
    }

    pub async fn get_session(&self, caller: &Caller, session_id: Uuid) -> AppResult<SessionView> {
        let mut tx = self.store.begin().await?;
        let session = tx
            .find_session(session_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("session {}", session_id)))?;
        let participants = tx.participants(session_id).await?;

        let visible = caller.user_id == session.teacher_id
            || participants.contains(&caller.user_id)
            || caller.role == UserRole::Admin;
        if !visible {
            return Err(AppError::Unauthorized(
                "caller is not part of this session".to_string(),
            ));
        }
        Ok(SessionView {
            session,
            participants,
        })
    }

    /// `scheduled -> live`; from here on the series' stars are not refundable
    #[instrument(skip(self))]
    pub async fn start_session(&self, caller: &Caller, session_id: Uuid) -> AppResult<Session> {
        let mut tx = self.store.begin().await?;
        let mut session = self.owned_session(&mut tx, caller, session_id).await?;
        session.start(self.clock.now())?;
        tx.update_session(&session).await?;
        let participants = tx.participants(session_id).await?;
        tx.commit().await?;

        info!("Session {} is live", session_id);

        let mut outbox = Outbox::new();
        for student_id in participants {
            outbox.push(
                student_id,
                NotificationKind::SessionStarted,
                "Session started",
                "Your session is live, join now",
                json!({ "session_id": session_id }),
            );
        }
        outbox.dispatch(self.notifier.as_ref()).await;

        Ok(session)
    }

    /// `live -> completed`; the room is torn down best-effort afterwards
    #[instrument(skip(self))]
    pub async fn complete_session(&self, caller: &Caller, session_id: Uuid) -> AppResult<Session> {
        let mut tx = self.store.begin().await?;
        let mut session = self.owned_session(&mut tx, caller, session_id).await?;
        session.complete(self.clock.now())?;
        tx.update_session(&session).await?;
        tx.commit().await?;

        info!("Session {} completed", session_id);

        if let Some(room_id) = &session.room_id {
            if let Err(e) = self.rooms.delete_room(room_id).await {
                warn!("Failed to delete room {} of session {}: {}", room_id, session_id, e);
            }
        }
        Ok(session)
    }

    /// `scheduled -> cancelled`
    #[instrument(skip(self))]
    pub async fn cancel_session(&self, caller: &Caller, session_id: Uuid) -> AppResult<Session> {
        let mut tx = self.store.begin().await?;
        let mut session = self.owned_session(&mut tx, caller, session_id).await?;
        session.cancel(self.clock.now())?;
        tx.update_session(&session).await?;
        tx.commit().await?;

        info!("Session {} cancelled", session_id);
        Ok(session)
    }

    /// Enter a live session as its teacher (host) or a participant
    #[instrument(skip(self))]
    pub async fn join_session(&self, caller: &Caller, session_id: Uuid) -> AppResult<JoinTicket> {
        let (session, kind) = {
            let mut tx = self.store.begin().await?;
            let session = tx
                .find_session(session_id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("session {}", session_id)))?;

            let is_host = caller.user_id == session.teacher_id;
            if !is_host && !tx.participants(session_id).await?.contains(&caller.user_id) {
                return Err(AppError::Unauthorized(
                    "caller is not a participant of this session".to_string(),
                ));
            }
            if session.status != SessionStatus::Live {
                return Err(AppError::InvalidStatus(format!(
                    "session {} is {}, rooms open once it is live",
                    session_id, session.status
                )));
            }

            let kind = match session.series_id {
                Some(series_id) => tx
                    .find_series(series_id)
                    .await?
                    .map(|s| s.session_type)
                    .unwrap_or_default(),
                None => SessionType::Individual,
            };
            (session, kind)
        };
        let is_host = caller.user_id == session.teacher_id;

        let room_id = match session.room_id.clone() {
            Some(room_id) => room_id,
            None => self.provision_room(&session, kind).await?,
        };

        let display_name = match self.directory.display_name(caller.user_id).await {
            Ok(Some(name)) => name,
            Ok(None) => FALLBACK_DISPLAY_NAME.to_string(),
            Err(e) => {
                debug!("Display name lookup failed for {}: {}", caller.user_id, e);
                FALLBACK_DISPLAY_NAME.to_string()
            }
        };

        let token = self
            .rooms
            .generate_token(&room_id, caller.user_id, &display_name, is_host)
            .await
            .map_err(|e| {
                warn!("Token generation failed for session {}: {}", session_id, e);
                provisioning(e)
            })?;

        Ok(JoinTicket {
            session_id,
            room_id,
            token,
            is_host,
        })
    }

    /// Create a room and record it unless a concurrent join got there first
    async fn provision_room(&self, session: &Session, kind: SessionType) -> AppResult<String> {
        let created = self
            .rooms
            .create_room(&format!("session-{}", session.id), kind, session.max_participants)
            .await
            .map_err(|e| {
                warn!("Room creation failed for session {}: {}", session.id, e);
                provisioning(e)
            })?;

        let mut tx = self.store.begin().await?;
        let mut current = tx
            .session_for_update(session.id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("session {}", session.id)))?;

        if let Some(existing) = current.room_id.clone() {
            drop(tx);
            debug!("Session {} already has room {}, discarding {}", session.id, existing, created);
            if let Err(e) = self.rooms.delete_room(&created).await {
                warn!("Failed to delete duplicate room {}: {}", created, e);
            }
            return Ok(existing);
        }

        current.room_id = Some(created.clone());
        current.updated_at = self.clock.now();
        tx.update_session(&current).await?;
        tx.commit().await?;

        info!("Room {} provisioned for session {}", created, session.id);
        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::video::LocalRoomProvider;
    use chrono::{Duration, Utc};
    use tutora_core::traits::SystemClock;
    use tutora_db::{MemoryDirectory, MemoryNotificationSink, MemoryStore};

    struct Fixture {
        service: SessionService<MemoryStore>,
        rooms: Arc<LocalRoomProvider>,
        notifier: Arc<MemoryNotificationSink>,
        teacher: Caller,
        student: Caller,
        session_id: Uuid,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let rooms = Arc::new(LocalRoomProvider::new());
        let notifier = Arc::new(MemoryNotificationSink::new());
        let teacher = Caller::teacher(Uuid::new_v4());
        let student = Caller::student(Uuid::new_v4());

        let start = Utc::now() + Duration::hours(2);
        let session = Session::scheduled(None, teacher.user_id, 1, start, start + Duration::hours(1), 1, Utc::now());
        let mut tx = store.begin().await.unwrap();
        tx.insert_session(&session).await.unwrap();
        tx.add_participant(session.id, student.user_id).await.unwrap();
        tx.commit().await.unwrap();

        let service = SessionService::new(
            store,
            Arc::new(MemoryDirectory::new()),
            notifier.clone(),
            rooms.clone(),
            Arc::new(SystemClock),
        );
        Fixture {
            service,
            rooms,
            notifier,
            teacher,
            student,
            session_id: session.id,
        }
    }

    #[tokio::test]
    async fn test_join_requires_live_session() {
        let f = fixture().await;
        let result = f.service.join_session(&f.student, f.session_id).await;
        assert!(matches!(result, Err(AppError::InvalidStatus(_))));
        assert_eq!(f.rooms.room_count(), 0);
    }

    #[tokio::test]
    async fn test_start_then_join_reuses_room() {
        let f = fixture().await;
        f.service.start_session(&f.teacher, f.session_id).await.unwrap();
        assert_eq!(f.notifier.sent().len(), 1);

        let host = f.service.join_session(&f.teacher, f.session_id).await.unwrap();
        let guest = f.service.join_session(&f.student, f.session_id).await.unwrap();

        assert!(host.is_host);
        assert!(!guest.is_host);
        assert_eq!(host.room_id, guest.room_id);
        assert_eq!(f.rooms.room_count(), 1);
    }

    #[tokio::test]
    async fn test_outsider_cannot_join() {
        let f = fixture().await;
        f.service.start_session(&f.teacher, f.session_id).await.unwrap();

        let outsider = Caller::student(Uuid::new_v4());
        let result = f.service.join_session(&outsider, f.session_id).await;
        assert!(matches!(result, Err(AppError::Unauthorized(_))));
    }

    #[tokio::test]
    async fn test_provider_failure_is_retryable() {
        let f = fixture().await;
        f.service.start_session(&f.teacher, f.session_id).await.unwrap();

        f.rooms.set_failing(true);
        let result = f.service.join_session(&f.student, f.session_id).await;
        assert!(matches!(result, Err(AppError::RoomProvisioning(_))));

        f.rooms.set_failing(false);
        assert!(f.service.join_session(&f.student, f.session_id).await.is_ok());
    }

    #[tokio::test]
    async fn test_complete_tears_down_room() {
        let f = fixture().await;
        f.service.start_session(&f.teacher, f.session_id).await.unwrap();
        f.service.join_session(&f.teacher, f.session_id).await.unwrap();

        let done = f.service.complete_session(&f.teacher, f.session_id).await.unwrap();
        assert_eq!(done.status, SessionStatus::Completed);
        assert_eq!(f.rooms.room_count(), 0);
    }

    #[tokio::test]
    async fn test_only_owner_changes_status() {
        let f = fixture().await;
        let result = f.service.cancel_session(&f.student, f.session_id).await;
        assert!(matches!(result, Err(AppError::Unauthorized(_))));

        let cancelled = f.service.cancel_session(&f.teacher, f.session_id).await.unwrap();
        assert_eq!(cancelled.status, SessionStatus::Cancelled);
        assert!(f.service.start_session(&f.teacher, f.session_id).await.is_err());
    }
}
