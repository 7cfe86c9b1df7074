use crate::error::{Result, VotingError};

/// A configured vote-rollover window.
///
/// Within the window, repeated votes from the same actor (or the same
/// anonymous source) are collapsed into a single vote rather than counted
/// as independent casts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteWindow {
    /// Every vote is unique the instant it is cast.
    Immediate,
    /// Votes inside the trailing window replace the actor's prior vote.
    Seconds(i64),
    /// No rollover; every vote is always a new record.
    Never,
}

impl VoteWindow {
    pub fn from_seconds(raw: i64) -> Result<Self> {
        match raw {
            -1 => Ok(Self::Never),
            0 => Ok(Self::Immediate),
            seconds if seconds > 0 => Ok(Self::Seconds(seconds)),
            other => Err(VotingError::Configuration(format!(
                "vote window must be -1, 0 or a positive duration in seconds, got {other}"
            ))),
        }
    }
}

/// The effective timestamp computed for a new vote, plus the lower bound of
/// the replacement scope when rollover applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowOutcome {
    /// Stored cast time; backdated by the window for positive windows.
    pub timestamp: i64,
    /// When set, prior votes in the same actor+target+tag scope with
    /// timestamps at or after this bound are replaced by the new vote.
    pub replace_since: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowPolicy {
    pub anonymous_window: VoteWindow,
    pub user_window: VoteWindow,
}

impl WindowPolicy {
    /// Computes the dedup timestamp for a vote cast at `now`.
    ///
    /// Anonymous votes are only windowed when a source token identifies the
    /// client; an anonymous vote with no source cannot be deduplicated and
    /// always records the current time.
    pub fn effective_timestamp(&self, actor_id: i64, source: &str, now: i64) -> WindowOutcome {
        assert!(now >= 0, "Wall clock predates Unix epoch");

        let window = if actor_id == 0 {
            if source.is_empty() {
                VoteWindow::Never
            } else {
                self.anonymous_window
            }
        } else {
            self.user_window
        };

        match window {
            VoteWindow::Never | VoteWindow::Immediate => WindowOutcome {
                timestamp: now,
                replace_since: None,
            },
            VoteWindow::Seconds(seconds) => {
                assert!(seconds > 0, "Positive window invariant broken");
                let backdated = now - seconds;
                WindowOutcome {
                    timestamp: backdated,
                    replace_since: Some(backdated),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_700_000_000;

    fn policy(anonymous: VoteWindow, user: VoteWindow) -> WindowPolicy {
        WindowPolicy {
            anonymous_window: anonymous,
            user_window: user,
        }
    }

    #[test]
    fn window_domain() {
        assert_eq!(VoteWindow::from_seconds(-1).unwrap(), VoteWindow::Never);
        assert_eq!(VoteWindow::from_seconds(0).unwrap(), VoteWindow::Immediate);
        assert_eq!(
            VoteWindow::from_seconds(3600).unwrap(),
            VoteWindow::Seconds(3600)
        );
        assert!(matches!(
            VoteWindow::from_seconds(-7),
            Err(VotingError::Configuration(_))
        ));
    }

    #[test]
    fn immediate_user_window_keeps_current_time() {
        let outcome = policy(VoteWindow::Never, VoteWindow::Immediate)
            .effective_timestamp(42, "", NOW);
        assert_eq!(outcome.timestamp, NOW);
        assert_eq!(outcome.replace_since, None);
    }

    #[test]
    fn never_window_keeps_current_time() {
        let outcome =
            policy(VoteWindow::Never, VoteWindow::Never).effective_timestamp(42, "", NOW);
        assert_eq!(outcome.timestamp, NOW);
        assert_eq!(outcome.replace_since, None);
    }

    #[test]
    fn positive_user_window_backdates() {
        let outcome = policy(VoteWindow::Never, VoteWindow::Seconds(3600))
            .effective_timestamp(42, "", NOW);
        assert_eq!(outcome.timestamp, NOW - 3600);
        assert_eq!(outcome.replace_since, Some(NOW - 3600));
    }

    #[test]
    fn anonymous_with_source_uses_anonymous_window() {
        let outcome = policy(VoteWindow::Seconds(86_400), VoteWindow::Never)
            .effective_timestamp(0, "198.51.100.7", NOW);
        assert_eq!(outcome.timestamp, NOW - 86_400);
        assert_eq!(outcome.replace_since, Some(NOW - 86_400));
    }

    #[test]
    fn anonymous_without_source_is_never_windowed() {
        let outcome = policy(VoteWindow::Seconds(86_400), VoteWindow::Never)
            .effective_timestamp(0, "", NOW);
        assert_eq!(outcome.timestamp, NOW);
        assert_eq!(outcome.replace_since, None);
    }
}
