//! Session state history rows

use super::session::SessionStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One entry in a session's append-only status history
///
/// The entry with no `end_time` is the session's current status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    pub session_id: String,
    pub status: SessionStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
}

impl SessionState {
    /// Whether this is the current (open-ended) entry
    pub fn is_current(&self) -> bool {
        self.end_time.is_none()
    }
}

/// The current status of a newest-first history, if any
pub fn current_status(states: &[SessionState]) -> Option<SessionStatus> {
    states.iter().find(|s| s.is_current()).map(|s| s.status)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_status() {
        let now = Utc::now();
        let states = vec![
            SessionState {
                session_id: "s_1".to_string(),
                status: SessionStatus::Active,
                start_time: now,
                end_time: None,
            },
            SessionState {
                session_id: "s_1".to_string(),
                status: SessionStatus::Pending,
                start_time: now,
                end_time: Some(now),
            },
        ];
        assert!(states[0].is_current());
        assert!(!states[1].is_current());
        assert_eq!(current_status(&states), Some(SessionStatus::Active));
        assert_eq!(current_status(&[]), None);
    }
}
