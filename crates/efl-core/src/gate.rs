//! Attendance gate: decides whether a recognition may produce a new event.
//!
//! Each user is a two-state machine (`AwaitingEntry` / `AwaitingExit`)
//! that only advances when a log is created, and a log may only be created
//! once the cooldown since the previous one has elapsed. Alternation is by
//! time since the last log; there is no daily reset.

use crate::types::{AttendanceLog, AttendanceType};
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Minimum time between two logs for the same user.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(15);
/// Denials younger than this are not reported to the client.
pub const DEFAULT_QUIET_WINDOW: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceState {
    AwaitingEntry,
    AwaitingExit,
}

impl PresenceState {
    /// State implied by the user's most recent log.
    pub fn from_last(last: Option<&AttendanceLog>) -> Self {
        match last.map(|log| log.kind) {
            None | Some(AttendanceType::Exited) => PresenceState::AwaitingEntry,
            Some(AttendanceType::Entered) => PresenceState::AwaitingExit,
        }
    }

    /// Event type the next log must carry.
    pub fn next_event(self) -> AttendanceType {
        match self {
            PresenceState::AwaitingEntry => AttendanceType::Entered,
            PresenceState::AwaitingExit => AttendanceType::Exited,
        }
    }

    pub fn advance(self) -> Self {
        match self {
            PresenceState::AwaitingEntry => PresenceState::AwaitingExit,
            PresenceState::AwaitingExit => PresenceState::AwaitingEntry,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// Create a log of this type.
    Allow(AttendanceType),
    /// Still in cooldown. `notify` tells whether the client gets a warning.
    Deny { notify: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GatePolicy {
    pub cooldown: Duration,
    /// `None` reports every denial.
    pub quiet_window: Option<Duration>,
}

impl Default for GatePolicy {
    fn default() -> Self {
        Self {
            cooldown: DEFAULT_COOLDOWN,
            quiet_window: Some(DEFAULT_QUIET_WINDOW),
        }
    }
}

impl GatePolicy {
    /// Decide for a user currently in `state` whose latest log is `last`.
    pub fn decide(
        &self,
        state: PresenceState,
        now: DateTime<Utc>,
        last: Option<&AttendanceLog>,
    ) -> GateDecision {
        let Some(last_log) = last else {
            return GateDecision::Allow(state.next_event());
        };

        // A log stamped in the future (clock step) counts as just now.
        let elapsed = (now - last_log.created_at)
            .to_std()
            .unwrap_or(Duration::ZERO);

        if elapsed > self.cooldown {
            return GateDecision::Allow(state.next_event());
        }

        let notify = match self.quiet_window {
            Some(window) => elapsed > window,
            None => true,
        };
        GateDecision::Deny { notify }
    }
}
