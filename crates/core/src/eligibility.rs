//! Eligibility of a queue entry to be performed right now.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::presence::PresenceLookup;
use crate::queue::{HoldReason, QueueEntry};
use crate::singer::named_singers;

pub const MODE_STRICT: &str = "strict";
pub const MODE_SIMPLIFIED: &str = "simplified";

/// How strictly singer presence is enforced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EligibilityMode {
    /// Every named singer must be logged in, joined and not on break.
    #[default]
    Strict,
    /// Only breaks block; singers without a status row count as available.
    Simplified,
}

impl EligibilityMode {
    pub fn from_str_value(s: &str) -> Result<Self, CoreError> {
        match s.trim().to_ascii_lowercase().as_str() {
            MODE_STRICT => Ok(Self::Strict),
            MODE_SIMPLIFIED => Ok(Self::Simplified),
            other => Err(CoreError::Validation(format!(
                "Invalid eligibility mode '{other}'. Must be one of: {MODE_STRICT}, {MODE_SIMPLIFIED}"
            ))),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Strict => MODE_STRICT,
            Self::Simplified => MODE_SIMPLIFIED,
        }
    }
}

/// Result of an eligibility check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Eligibility {
    pub eligible: bool,
    pub hold_reason: Option<HoldReason>,
}

impl Eligibility {
    const ELIGIBLE: Self = Self {
        eligible: true,
        hold_reason: None,
    };

    fn blocked(reason: HoldReason) -> Self {
        Self {
            eligible: false,
            hold_reason: Some(reason),
        }
    }
}

/// Decide whether every named singer of `entry` can perform now.
///
/// Singers are checked in list order and the first failure wins; later
/// singers are never looked up. Group tokens are skipped. An attendance
/// break blocks in both modes, whatever the singer's own status says.
pub fn is_eligible<P: PresenceLookup + ?Sized>(
    entry: &QueueEntry,
    presence: &P,
    mode: EligibilityMode,
) -> Eligibility {
    for name in named_singers(&entry.singers) {
        if let Some(reason) = singer_hold_reason(name, presence, mode) {
            return Eligibility::blocked(reason);
        }
    }
    Eligibility::ELIGIBLE
}

fn singer_hold_reason<P: PresenceLookup + ?Sized>(
    name: &str,
    presence: &P,
    mode: EligibilityMode,
) -> Option<HoldReason> {
    if presence.is_on_break_by_attendance(name) {
        return Some(HoldReason::OnBreak);
    }
    let status = presence.singer_status(name);
    match mode {
        EligibilityMode::Strict => match status {
            None => Some(HoldReason::NotJoined),
            Some(s) if !s.is_logged_in => Some(HoldReason::NotLoggedIn),
            Some(s) if !s.is_joined => Some(HoldReason::NotJoined),
            Some(s) if s.is_on_break => Some(HoldReason::OnBreak),
            Some(_) => None,
        },
        EligibilityMode::Simplified => match status {
            Some(s) if s.is_on_break => Some(HoldReason::OnBreak),
            _ => None,
        },
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::presence::{EventAttendance, PresenceFacts, SingerStatus};
    use crate::singer::{GroupToken, Singer};
    use chrono::Utc;

    fn status(user: &str, logged_in: bool, joined: bool, on_break: bool) -> SingerStatus {
        SingerStatus {
            event_id: 42,
            user_name: user.into(),
            is_logged_in: logged_in,
            is_joined: joined,
            is_on_break: on_break,
            updated_at: Utc::now(),
        }
    }

    fn entry(singers: Vec<Singer>) -> QueueEntry {
        QueueEntry {
            id: 1,
            event_id: 42,
            song_id: "song".into(),
            requestor: "alice".into(),
            singers,
            position: 1,
            is_active: true,
            is_currently_playing: false,
            was_skipped: false,
            sung_at: None,
            is_on_break: false,
            updated_at: Utc::now(),
        }
    }

    fn named(names: &[&str]) -> Vec<Singer> {
        names.iter().map(|n| Singer::Named(n.to_string())).collect()
    }

    /// Records every singer-status lookup.
    struct CountingLookup {
        inner: PresenceFacts,
        calls: RefCell<Vec<String>>,
    }

    impl PresenceLookup for CountingLookup {
        fn singer_status(&self, user_name: &str) -> Option<&SingerStatus> {
            self.calls.borrow_mut().push(user_name.to_string());
            self.inner.singer_status(user_name)
        }

        fn attendance(&self, user_name: &str) -> Option<&EventAttendance> {
            self.inner.attendance(user_name)
        }
    }

    // -----------------------------------------------------------------------
    // Strict mode
    // -----------------------------------------------------------------------

    #[test]
    fn strict_all_ready_is_eligible() {
        let facts = PresenceFacts::new(
            vec![status("alice", true, true, false), status("bob", true, true, false)],
            vec![],
        );
        let e = is_eligible(&entry(named(&["alice", "bob"])), &facts, EligibilityMode::Strict);
        assert_eq!(e, Eligibility::ELIGIBLE);
    }

    #[test]
    fn strict_missing_status_is_not_joined() {
        let e = is_eligible(
            &entry(named(&["alice"])),
            &PresenceFacts::default(),
            EligibilityMode::Strict,
        );
        assert_eq!(e, Eligibility::blocked(HoldReason::NotJoined));
    }

    #[test]
    fn strict_reasons_per_flag() {
        let cases = [
            (status("alice", false, true, false), HoldReason::NotLoggedIn),
            (status("alice", true, false, false), HoldReason::NotJoined),
            (status("alice", true, true, true), HoldReason::OnBreak),
        ];
        for (row, expected) in cases {
            let facts = PresenceFacts::new(vec![row], vec![]);
            let e = is_eligible(&entry(named(&["alice"])), &facts, EligibilityMode::Strict);
            assert_eq!(e.hold_reason, Some(expected));
            assert!(!e.eligible);
        }
    }

    #[test]
    fn strict_short_circuits_on_first_failure() {
        let lookup = CountingLookup {
            inner: PresenceFacts::new(
                vec![
                    status("a", true, true, false),
                    status("b", false, true, false),
                    status("c", false, false, true),
                ],
                vec![],
            ),
            calls: RefCell::new(Vec::new()),
        };

        let e = is_eligible(&entry(named(&["a", "b", "c"])), &lookup, EligibilityMode::Strict);

        assert_eq!(e, Eligibility::blocked(HoldReason::NotLoggedIn));
        assert_eq!(*lookup.calls.borrow(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn group_tokens_never_block_or_get_looked_up() {
        let lookup = CountingLookup {
            inner: PresenceFacts::new(vec![status("alice", true, true, false)], vec![]),
            calls: RefCell::new(Vec::new()),
        };
        let singers = vec![
            Singer::Group(GroupToken::AllSing),
            Singer::Named("alice".into()),
            Singer::Group(GroupToken::TheGirls),
        ];
        let e = is_eligible(&entry(singers), &lookup, EligibilityMode::Strict);
        assert!(e.eligible);
        assert_eq!(*lookup.calls.borrow(), vec!["alice".to_string()]);
    }

    // -----------------------------------------------------------------------
    // Simplified mode
    // -----------------------------------------------------------------------

    #[test]
    fn simplified_treats_missing_status_as_available() {
        let e = is_eligible(
            &entry(named(&["newcomer"])),
            &PresenceFacts::default(),
            EligibilityMode::Simplified,
        );
        assert!(e.eligible);
    }

    #[test]
    fn simplified_ignores_login_but_blocks_breaks() {
        let facts = PresenceFacts::new(
            vec![status("alice", false, false, false), status("bob", true, true, true)],
            vec![],
        );
        assert!(is_eligible(&entry(named(&["alice"])), &facts, EligibilityMode::Simplified).eligible);
        let e = is_eligible(&entry(named(&["alice", "bob"])), &facts, EligibilityMode::Simplified);
        assert_eq!(e, Eligibility::blocked(HoldReason::OnBreak));
    }

    // -----------------------------------------------------------------------
    // Attendance breaks
    // -----------------------------------------------------------------------

    fn attendance_break(user: &str) -> EventAttendance {
        EventAttendance {
            event_id: 42,
            user_name: user.into(),
            is_checked_in: true,
            is_on_break: true,
            break_start_at: Some(Utc::now()),
            break_end_at: None,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn attendance_break_blocks_a_ready_singer_in_both_modes() {
        let facts = PresenceFacts::new(
            vec![status("alice", true, true, false), status("bob", true, true, false)],
            vec![attendance_break("alice")],
        );
        let singers = named(&["bob", "alice"]);

        for mode in [EligibilityMode::Strict, EligibilityMode::Simplified] {
            let e = is_eligible(&entry(singers.clone()), &facts, mode);
            assert_eq!(e, Eligibility::blocked(HoldReason::OnBreak), "mode {}", mode.as_str());
        }
    }

    #[test]
    fn attendance_break_wins_over_missing_login() {
        let facts = PresenceFacts::new(
            vec![status("alice", false, true, false)],
            vec![attendance_break("alice")],
        );
        let e = is_eligible(&entry(named(&["alice"])), &facts, EligibilityMode::Strict);
        assert_eq!(e.hold_reason, Some(HoldReason::OnBreak));
    }

    #[test]
    fn mode_parses_case_insensitively() {
        assert_eq!(
            EligibilityMode::from_str_value(" Simplified ").unwrap(),
            EligibilityMode::Simplified
        );
        assert!(EligibilityMode::from_str_value("lenient").is_err());
    }
}
