use std::fmt;

use serde::{Deserialize, Serialize};

/// States of the progress tracker.
///
/// Connecting → Streaming → (Succeeded | Failed | ChannelLost)
/// ChannelLost → Polling → (Succeeded | Failed | TimedOut)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrackerState {
    Connecting,
    Streaming,
    ChannelLost,
    Polling,
    Succeeded,
    Failed,
    TimedOut,
}

impl fmt::Display for TrackerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackerState::Connecting => write!(f, "CONNECTING"),
            TrackerState::Streaming => write!(f, "STREAMING"),
            TrackerState::ChannelLost => write!(f, "CHANNEL_LOST"),
            TrackerState::Polling => write!(f, "POLLING"),
            TrackerState::Succeeded => write!(f, "SUCCEEDED"),
            TrackerState::Failed => write!(f, "FAILED"),
            TrackerState::TimedOut => write!(f, "TIMED_OUT"),
        }
    }
}

impl TrackerState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TrackerState::Succeeded | TrackerState::Failed | TrackerState::TimedOut
        )
    }

    /// Whether the machine may move from `self` to `next`.
    ///
    /// `Streaming → Polling` covers a completion event whose history entry is
    /// not recorded yet and the single poll made when the deadline expires
    /// mid-stream.
    pub fn can_transition_to(&self, next: TrackerState) -> bool {
        use TrackerState::*;
        matches!(
            (self, next),
            (Connecting, Streaming)
                | (Connecting, ChannelLost)
                | (Streaming, Succeeded)
                | (Streaming, Failed)
                | (Streaming, ChannelLost)
                | (Streaming, Polling)
                | (ChannelLost, Polling)
                | (Polling, Succeeded)
                | (Polling, Failed)
                | (Polling, TimedOut)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [TrackerState; 7] = [
        TrackerState::Connecting,
        TrackerState::Streaming,
        TrackerState::ChannelLost,
        TrackerState::Polling,
        TrackerState::Succeeded,
        TrackerState::Failed,
        TrackerState::TimedOut,
    ];

    #[test]
    fn terminal_states_have_no_exits() {
        for from in ALL.iter().filter(|s| s.is_terminal()) {
            for to in ALL {
                assert!(!from.can_transition_to(to), "{from} -> {to}");
            }
        }
    }

    #[test]
    fn timeout_only_reached_from_polling() {
        for from in ALL {
            assert_eq!(
                from.can_transition_to(TrackerState::TimedOut),
                from == TrackerState::Polling,
                "{from}"
            );
        }
    }

    #[test]
    fn channel_loss_never_fails_the_job() {
        assert!(!TrackerState::ChannelLost.can_transition_to(TrackerState::Failed));
        assert!(TrackerState::ChannelLost.can_transition_to(TrackerState::Polling));
    }

    #[test]
    fn state_display() {
        assert_eq!(TrackerState::ChannelLost.to_string(), "CHANNEL_LOST");
        assert_eq!(TrackerState::TimedOut.to_string(), "TIMED_OUT");
        assert_eq!(
            serde_json::to_string(&TrackerState::Streaming).unwrap(),
            r#""STREAMING""#
        );
    }
}
