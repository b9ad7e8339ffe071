use std::fmt;
use serde::{Serialize, Deserialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AcceptanceStatus {
    PendingApproval,
    Approved,
    Rejected,
    Withdrawn,
}

impl fmt::Display for AcceptanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AcceptanceStatus::PendingApproval => write!(f, "PENDING_APPROVAL"),
            AcceptanceStatus::Approved => write!(f, "APPROVED"),
            AcceptanceStatus::Rejected => write!(f, "REJECTED"),
            AcceptanceStatus::Withdrawn => write!(f, "WITHDRAWN"),
        }
    }
}

/// A team's bid to become the opponent on an open challenge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptanceRequest {
    pub id: Uuid,
    pub challenge_id: Uuid,
    pub accepting_team_id: Uuid,
    pub requesting_user_id: Uuid,
    pub status: AcceptanceStatus,
    pub created_at: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<u64>,
}

impl AcceptanceRequest {
    pub fn new(challenge_id: Uuid, accepting_team_id: Uuid, requesting_user_id: Uuid, now: u64) -> Self {
        AcceptanceRequest {
            id: Uuid::new_v4(),
            challenge_id,
            accepting_team_id,
            requesting_user_id,
            status: AcceptanceStatus::PendingApproval,
            created_at: now,
            resolved_at: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == AcceptanceStatus::PendingApproval
    }

    /// Move a pending request to its final status. Resolved requests are left alone.
    pub(crate) fn resolve(&mut self, status: AcceptanceStatus, now: u64) -> bool {
        if !self.is_pending() {
            return false;
        }
        self.status = status;
        self.resolved_at = Some(now);
        true
    }
}
