//! Gate-and-create as one unit per user.

use crate::directory::{EventStore, StoreError};
use crate::gate::{GateDecision, GatePolicy, PresenceState};
use crate::types::{AttendanceLog, UserId};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    /// A new log was created.
    Recorded(AttendanceLog),
    /// In cooldown; the client should be warned.
    Duplicate,
    /// In cooldown and inside the quiet window; say nothing.
    Suppressed,
}

type PresenceSlot = Arc<tokio::sync::Mutex<Option<PresenceState>>>;

/// Applies the gate and persists the resulting log.
///
/// The read-last / decide / create sequence runs inside a per-user critical
/// section, so two near-simultaneous matches for one user produce at most
/// one log. The same section owns the user's [`PresenceState`], seeded from
/// the store on first sight and advanced only after a log is created.
pub struct AttendanceRecorder {
    store: Arc<dyn EventStore>,
    policy: GatePolicy,
    /// One slot per user ever matched, so bounded by the directory size.
    presence: Mutex<HashMap<UserId, PresenceSlot>>,
}

impl AttendanceRecorder {
    pub fn new(store: Arc<dyn EventStore>, policy: GatePolicy) -> Self {
        Self {
            store,
            policy,
            presence: Mutex::new(HashMap::new()),
        }
    }

    fn presence_slot(&self, user_id: UserId) -> PresenceSlot {
        let mut presence = match self.presence.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        presence.entry(user_id).or_default().clone()
    }

    pub async fn record(&self, user_id: UserId, now: DateTime<Utc>) -> Result<RecordOutcome, StoreError> {
        let slot = self.presence_slot(user_id);
        let mut presence = slot.lock().await;

        let last = self.store.last_attendance_log(user_id).await?;
        let state = *presence.get_or_insert_with(|| PresenceState::from_last(last.as_ref()));

        match self.policy.decide(state, now, last.as_ref()) {
            GateDecision::Allow(kind) => {
                let log = self.store.create_attendance_log(user_id, kind, now).await?;
                *presence = Some(state.advance());
                tracing::info!(user_id, kind = %log.kind, log_id = log.id, "attendance recorded");
                Ok(RecordOutcome::Recorded(log))
            }
            GateDecision::Deny { notify: true } => {
                tracing::debug!(user_id, "attendance denied: cooldown");
                Ok(RecordOutcome::Duplicate)
            }
            GateDecision::Deny { notify: false } => {
                tracing::trace!(user_id, "attendance denied: quiet window");
                Ok(RecordOutcome::Suppressed)
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::types::AttendanceType;
    use async_trait::async_trait;
    use chrono::TimeDelta;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// In-memory event store; `fail` makes every call error.
    #[derive(Default)]
    pub(crate) struct MemoryEvents {
        pub logs: Mutex<Vec<AttendanceLog>>,
        pub fail: AtomicBool,
    }

    impl MemoryEvents {
        pub fn logs_for(&self, user_id: UserId) -> Vec<AttendanceLog> {
            self.logs
                .lock()
                .unwrap()
                .iter()
                .filter(|l| l.user_id == user_id)
                .cloned()
                .collect()
        }

        fn check(&self) -> Result<(), StoreError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(StoreError::database(std::io::Error::other("disk I/O error")));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl EventStore for MemoryEvents {
        async fn last_attendance_log(&self, user_id: UserId) -> Result<Option<AttendanceLog>, StoreError> {
            self.check()?;
            Ok(self.logs_for(user_id).pop())
        }

        async fn create_attendance_log(
            &self,
            user_id: UserId,
            kind: AttendanceType,
            at: DateTime<Utc>,
        ) -> Result<AttendanceLog, StoreError> {
            self.check()?;
            // Widen the race window between read and insert.
            tokio::task::yield_now().await;
            let mut logs = self.logs.lock().unwrap();
            let log = AttendanceLog {
                id: logs.len() as i64 + 1,
                user_id,
                kind,
                created_at: at,
            };
            logs.push(log.clone());
            Ok(log)
        }
    }

    fn t(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap() + TimeDelta::seconds(secs)
    }

    #[tokio::test]
    async fn test_dwell_scenario() {
        let store = Arc::new(MemoryEvents::default());
        let recorder = AttendanceRecorder::new(store.clone(), GatePolicy::default());

        let first = recorder.record(1, t(0)).await.unwrap();
        assert!(matches!(first, RecordOutcome::Recorded(ref l) if l.kind == AttendanceType::Entered));

        assert_eq!(recorder.record(1, t(3)).await.unwrap(), RecordOutcome::Suppressed);
        assert_eq!(recorder.record(1, t(10)).await.unwrap(), RecordOutcome::Duplicate);

        let exit = recorder.record(1, t(20)).await.unwrap();
        assert!(matches!(exit, RecordOutcome::Recorded(ref l) if l.kind == AttendanceType::Exited));

        assert_eq!(store.logs_for(1).len(), 2);
    }

    #[tokio::test]
    async fn test_types_strictly_alternate() {
        let store = Arc::new(MemoryEvents::default());
        let recorder = AttendanceRecorder::new(store.clone(), GatePolicy::default());

        for i in 0..6 {
            recorder.record(42, t(i * 16)).await.unwrap();
        }

        let kinds: Vec<_> = store.logs_for(42).into_iter().map(|l| l.kind).collect();
        assert_eq!(
            kinds,
            vec![
                AttendanceType::Entered,
                AttendanceType::Exited,
                AttendanceType::Entered,
                AttendanceType::Exited,
                AttendanceType::Entered,
                AttendanceType::Exited,
            ]
        );
    }

    #[tokio::test]
    async fn test_users_are_independent() {
        let store = Arc::new(MemoryEvents::default());
        let recorder = AttendanceRecorder::new(store.clone(), GatePolicy::default());

        recorder.record(1, t(0)).await.unwrap();
        let other = recorder.record(2, t(1)).await.unwrap();
        assert!(matches!(other, RecordOutcome::Recorded(ref l) if l.kind == AttendanceType::Entered));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_matches_create_one_log() {
        let store = Arc::new(MemoryEvents::default());
        let recorder = Arc::new(AttendanceRecorder::new(store.clone(), GatePolicy::default()));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let recorder = recorder.clone();
            handles.push(tokio::spawn(async move { recorder.record(7, t(0)).await }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(store.logs_for(7).len(), 1);
    }

    #[tokio::test]
    async fn test_presence_seeded_from_history() {
        let store = Arc::new(MemoryEvents::default());
        store.logs.lock().unwrap().push(AttendanceLog {
            id: 1,
            user_id: 5,
            kind: AttendanceType::Entered,
            created_at: t(0),
        });
        let recorder = AttendanceRecorder::new(store.clone(), GatePolicy::default());

        let next = recorder.record(5, t(30)).await.unwrap();
        assert!(matches!(next, RecordOutcome::Recorded(ref l) if l.kind == AttendanceType::Exited));
        let after = recorder.record(5, t(60)).await.unwrap();
        assert!(matches!(after, RecordOutcome::Recorded(ref l) if l.kind == AttendanceType::Entered));
    }

    #[tokio::test]
    async fn test_store_failure_leaves_presence_unchanged() {
        let store = Arc::new(MemoryEvents::default());
        let recorder = AttendanceRecorder::new(store.clone(), GatePolicy::default());
        recorder.record(3, t(0)).await.unwrap();

        store.fail.store(true, Ordering::SeqCst);
        assert!(recorder.record(3, t(20)).await.is_err());
        store.fail.store(false, Ordering::SeqCst);

        let retry = recorder.record(3, t(21)).await.unwrap();
        assert!(matches!(retry, RecordOutcome::Recorded(ref l) if l.kind == AttendanceType::Exited));
    }

    #[tokio::test]
    async fn test_store_errors_propagate() {
        let store = Arc::new(MemoryEvents::default());
        store.fail.store(true, Ordering::SeqCst);
        let recorder = AttendanceRecorder::new(store.clone(), GatePolicy::default());

        let err = recorder.record(1, t(0)).await.unwrap_err();
        assert!(matches!(err, StoreError::Database(_)));
        assert!(store.logs_for(1).is_empty());
    }
}
