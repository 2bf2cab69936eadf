//! Loop guard for inbound webhook events
//!
//! A change written by the sync on one side fires a webhook on that side,
//! which would mirror the change straight back. Every inbound handler passes
//! through [`LoopGuard::check`] before it emits an outbound mutation.
//!
//! The audit strings produced here are part of the log format and must not
//! change wording.

use std::fmt::Display;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Footer appended to every body the sync writes
pub const SYNC_FOOTER: &str = "\n\n> From [SyncLinear.com](https://synclinear.com)";

/// Footer written by releases before the rename
pub const LEGACY_SYNC_FOOTER: &str = "From [Linear-GitHub Sync](https://synclinear.com)";

/// Kinds of inbound events the guard audits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncEventKind {
    Issue,
    Edit,
    Comment,
    StateChange,
    Label,
    Assignee,
}

impl SyncEventKind {
    pub const ALL: [SyncEventKind; 6] = [
        SyncEventKind::Issue,
        SyncEventKind::Edit,
        SyncEventKind::Comment,
        SyncEventKind::StateChange,
        SyncEventKind::Label,
        SyncEventKind::Assignee,
    ];

    /// Name used in audit strings
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncEventKind::Issue => "issue",
            SyncEventKind::Edit => "edit",
            SyncEventKind::Comment => "comment",
            SyncEventKind::StateChange => "state change",
            SyncEventKind::Label => "label",
            SyncEventKind::Assignee => "assignee",
        }
    }
}

impl Display for SyncEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncEventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace(['-', '_'], " ").as_str() {
            "issue" => Ok(SyncEventKind::Issue),
            "edit" => Ok(SyncEventKind::Edit),
            "comment" => Ok(SyncEventKind::Comment),
            "state change" => Ok(SyncEventKind::StateChange),
            "label" => Ok(SyncEventKind::Label),
            "assignee" => Ok(SyncEventKind::Assignee),
            other => Err(format!("unknown event kind: {other}")),
        }
    }
}

/// One inbound webhook event, built per call and discarded after the check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncEvent {
    pub kind: SyncEventKind,
    /// GitHub issue number, or a Linear identifier such as `ENG-12`
    pub issue_number: String,
    pub caused_by_sync: bool,
}

impl SyncEvent {
    pub fn new(kind: SyncEventKind, issue_number: impl Display, caused_by_sync: bool) -> Self {
        Self {
            kind,
            issue_number: issue_number.to_string(),
            caused_by_sync,
        }
    }

    /// Derive `caused_by_sync` from the footer in the event body
    pub fn from_body(kind: SyncEventKind, issue_number: impl Display, body: &str) -> Self {
        Self::new(kind, issue_number, is_caused_by_sync(body))
    }
}

/// Outcome of a guard check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    /// Mirror the change to the other side
    Process,
    /// Drop the event; carries the audit string
    Skip(String),
}

impl GuardDecision {
    pub fn is_skip(&self) -> bool {
        matches!(self, GuardDecision::Skip(_))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LoopGuard;

impl LoopGuard {
    /// Skip iff the change was produced by the sync itself
    pub fn should_skip(caused_by_sync: bool) -> bool {
        caused_by_sync
    }

    /// Render the audit string for an event
    pub fn describe(
        kind: SyncEventKind,
        issue_number: impl Display,
        caused_by_sync: bool,
    ) -> String {
        format!(
            "Skipping over {kind} for issue #{issue_number} as it is {}.",
            if caused_by_sync {
                "caused by sync"
            } else {
                "not synced"
            }
        )
    }

    /// Decide for one event and emit the audit line when skipping
    pub fn check(&self, event: &SyncEvent) -> GuardDecision {
        if Self::should_skip(event.caused_by_sync) {
            let reason = Self::describe(event.kind, &event.issue_number, true);
            info!(target: "synclinear::guard", kind = %event.kind, issue = %event.issue_number, "{}", reason);
            return GuardDecision::Skip(reason);
        }

        debug!(kind = %event.kind, issue = %event.issue_number, "Processing inbound event");
        GuardDecision::Process
    }
}

/// Body with the sync footer appended
pub fn append_sync_footer(body: &str) -> String {
    format!("{body}{SYNC_FOOTER}")
}

/// Whether a body was written by the sync (current or legacy footer)
pub fn is_caused_by_sync(body: &str) -> bool {
    body.trim_end().ends_with(SYNC_FOOTER.trim()) || body.contains(LEGACY_SYNC_FOOTER)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_caused_by_sync() {
        assert_eq!(
            LoopGuard::describe(SyncEventKind::Comment, 42, true),
            "Skipping over comment for issue #42 as it is caused by sync."
        );
    }

    #[test]
    fn test_describe_not_synced() {
        assert_eq!(
            LoopGuard::describe(SyncEventKind::Label, "7", false),
            "Skipping over label for issue #7 as it is not synced."
        );
    }

    #[test]
    fn test_state_change_wording() {
        assert_eq!(
            LoopGuard::describe(SyncEventKind::StateChange, "ENG-12", true),
            "Skipping over state change for issue #ENG-12 as it is caused by sync."
        );
    }

    #[test]
    fn test_should_skip() {
        assert!(LoopGuard::should_skip(true));
        assert!(!LoopGuard::should_skip(false));
    }

    #[test]
    fn test_check_skips_sync_events() {
        let guard = LoopGuard;
        let decision = guard.check(&SyncEvent::new(SyncEventKind::Edit, 3, true));
        assert_eq!(
            decision,
            GuardDecision::Skip(
                "Skipping over edit for issue #3 as it is caused by sync.".to_string()
            )
        );
        assert_eq!(
            guard.check(&SyncEvent::new(SyncEventKind::Edit, 3, false)),
            GuardDecision::Process
        );
    }

    #[test]
    fn test_footer_detection() {
        let mirrored = append_sync_footer("Fix the login flow");
        assert!(is_caused_by_sync(&mirrored));
        assert!(is_caused_by_sync(&format!("{mirrored}\n")));
        assert!(is_caused_by_sync(
            "Old body\n\nFrom [Linear-GitHub Sync](https://synclinear.com)"
        ));
        assert!(!is_caused_by_sync("Fix the login flow"));
        assert!(!is_caused_by_sync(""));

        let event = SyncEvent::from_body(SyncEventKind::Comment, 9, &mirrored);
        assert!(event.caused_by_sync);
    }

    #[test]
    fn test_kind_parsing() {
        for kind in SyncEventKind::ALL {
            assert_eq!(kind.as_str().parse::<SyncEventKind>().unwrap(), kind);
        }
        assert_eq!(
            "state-change".parse::<SyncEventKind>().unwrap(),
            SyncEventKind::StateChange
        );
        assert!("milestone".parse::<SyncEventKind>().is_err());
    }
}
