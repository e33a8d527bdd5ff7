use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Last-seen information reported by the platform for a member.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", content = "at", rename_all = "snake_case")]
pub enum Presence {
    Online,
    Recently,
    LastSeen(DateTime<Utc>),
    Unknown,
}

/// A member discovered in a source community.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Recipient {
    pub id: i64,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub mutual_contact: bool,
    #[serde(default)]
    pub presence: Option<Presence>,
}

impl Recipient {
    pub fn new(id: i64) -> Self {
        Self {
            id,
            display_name: None,
            phone: None,
            username: None,
            mutual_contact: false,
            presence: None,
        }
    }

    /// Best human-readable label for log lines.
    pub fn label(&self) -> String {
        if let Some(name) = self.display_name.as_deref().filter(|n| !n.trim().is_empty()) {
            return name.to_string();
        }
        if let Some(user) = self.username.as_deref() {
            return format!("@{}", user);
        }
        format!("#{}", self.id)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    AlreadyMember,
    AlreadyInvited,
    OverCap,
    Inactive,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::AlreadyMember => "already_member",
            SkipReason::AlreadyInvited => "already_invited",
            SkipReason::OverCap => "over_cap",
            SkipReason::Inactive => "inactive",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum RecipientStatus {
    Pending,
    Invited,
    Skipped(SkipReason),
    Failed(String),
}

impl RecipientStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecipientStatus::Pending => "pending",
            RecipientStatus::Invited => "invited",
            RecipientStatus::Skipped(_) => "skipped",
            RecipientStatus::Failed(_) => "failed",
        }
    }
}

/// Result of the relationship step that precedes enrollment.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BridgeOutcome {
    AlreadyLinked,
    Linked,
    Unavailable,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum RunState {
    Idle,
    Collecting,
    Filtering,
    Dispatching,
    Completed,
    Cancelled,
    Errored(String),
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::Idle => "idle",
            RunState::Collecting => "collecting",
            RunState::Filtering => "filtering",
            RunState::Dispatching => "dispatching",
            RunState::Completed => "completed",
            RunState::Cancelled => "cancelled",
            RunState::Errored(_) => "errored",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunState::Completed | RunState::Cancelled | RunState::Errored(_)
        )
    }
}

/// Per-recipient row of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipientProgress {
    pub recipient: Recipient,
    pub status: RecipientStatus,
    pub bridge: Option<BridgeOutcome>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCounts {
    pub total: usize,
    pub pending: usize,
    pub invited: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Point-in-time view of a run. Counts are always derived from `recipients`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSnapshot {
    pub run_id: Uuid,
    pub destination: String,
    pub state: RunState,
    pub recipients: Vec<RecipientProgress>,
}

impl RunSnapshot {
    pub fn new(run_id: Uuid, destination: String) -> Self {
        Self {
            run_id,
            destination,
            state: RunState::Idle,
            recipients: Vec::new(),
        }
    }

    pub fn counts(&self) -> RunCounts {
        let mut counts = RunCounts {
            total: self.recipients.len(),
            ..Default::default()
        };
        for row in &self.recipients {
            match row.status {
                RecipientStatus::Pending => counts.pending += 1,
                RecipientStatus::Invited => counts.invited += 1,
                RecipientStatus::Skipped(_) => counts.skipped += 1,
                RecipientStatus::Failed(_) => counts.failed += 1,
            }
        }
        counts
    }

    pub fn status_of(&self, recipient_id: i64) -> Option<&RecipientStatus> {
        self.recipients
            .iter()
            .find(|r| r.recipient.id == recipient_id)
            .map(|r| &r.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_follow_rows() {
        let mut snap = RunSnapshot::new(Uuid::nil(), "@dest".into());
        for (id, status) in [
            (1, RecipientStatus::Invited),
            (2, RecipientStatus::Skipped(SkipReason::AlreadyMember)),
            (3, RecipientStatus::Failed("privacy".into())),
            (4, RecipientStatus::Pending),
        ] {
            snap.recipients.push(RecipientProgress {
                recipient: Recipient::new(id),
                status,
                bridge: None,
            });
        }
        let c = snap.counts();
        assert_eq!(c.total, 4);
        assert_eq!(c.total, c.pending + c.invited + c.skipped + c.failed);
        assert_eq!(snap.status_of(3).map(|s| s.as_str()), Some("failed"));
    }

    #[test]
    fn label_prefers_name_then_handle() {
        let mut r = Recipient::new(7);
        assert_eq!(r.label(), "#7");
        r.username = Some("alice".into());
        assert_eq!(r.label(), "@alice");
        r.display_name = Some("Alice".into());
        assert_eq!(r.label(), "Alice");
    }
}
