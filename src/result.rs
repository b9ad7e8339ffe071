use serde::{Serialize, Deserialize};
use uuid::Uuid;
use crate::challenge::ChallengeStatus;

/// What a successful [`Challenge::play`](crate::Challenge::play) did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransitionSuccess {
    Accepted { match_id: Uuid },
    Declined,
    Withdrawn { rejected_requests: Vec<Uuid> },
    Expired { rejected_requests: Vec<Uuid> },
    RequestCreated { request_id: Uuid },
    RequestApproved { match_id: Uuid, rejected_requests: Vec<Uuid> },
    RequestWithdrawn { request_id: Uuid },
    Completed,
}

/// Coarse error taxonomy shown to users. Every error the crate produces maps onto one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Authorization,
    Conflict,
    NotFound,
    Unauthenticated,
    Internal,
}

/// JSON error body sent by the service: `{ "error": <message>, "kind": <kind> }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: ErrorKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
pub enum TransitionError {
    #[error("Error: Challenge is already {0} and cannot change.")]
    Terminal(ChallengeStatus),
    #[error("Error: Cannot {action} a challenge that is {status}.")]
    InvalidState { action: String, status: ChallengeStatus },
    #[error("Error: A team cannot challenge itself.")]
    SameTeam,
    #[error("Error: Expiry must be strictly before the scheduled match time.")]
    ExpiryNotBeforeSchedule,
    #[error("Error: Only members of the sending team can do this.")]
    NotSenderMember,
    #[error("Error: Only members of the receiving team can do this.")]
    NotReceiverMember,
    #[error("Error: You are not a member of team {0}.")]
    NotTeamMember(Uuid),
    #[error("Error: Only members of the two playing teams can do this.")]
    NotParticipant,
    #[error("Error: Team {0} is not the receiver of this challenge.")]
    WrongReceiver(Uuid),
    #[error("Error: The sending team cannot request to accept its own challenge.")]
    SenderCannotRequest,
    #[error("Error: Team {0} already has a pending request on this challenge.")]
    DuplicateRequest(Uuid),
    #[error("Error: Acceptance request {0} not found.")]
    RequestNotFound(Uuid),
    #[error("Error: Acceptance request {0} is no longer pending.")]
    RequestNotPending(Uuid),
    #[error("Error: Challenge has not reached its expiry time.")]
    NotYetExpired,
}

impl TransitionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TransitionError::Terminal(_)
            | TransitionError::InvalidState { .. }
            | TransitionError::DuplicateRequest(_)
            | TransitionError::RequestNotPending(_)
            | TransitionError::NotYetExpired => ErrorKind::Conflict,
            TransitionError::SameTeam
            | TransitionError::ExpiryNotBeforeSchedule
            | TransitionError::WrongReceiver(_)
            | TransitionError::SenderCannotRequest => ErrorKind::Validation,
            TransitionError::NotSenderMember
            | TransitionError::NotReceiverMember
            | TransitionError::NotTeamMember(_)
            | TransitionError::NotParticipant => ErrorKind::Authorization,
            TransitionError::RequestNotFound(_) => ErrorKind::NotFound,
        }
    }

    pub(crate) fn invalid_state(action: &str, status: ChallengeStatus) -> Self {
        TransitionError::InvalidState { action: action.to_string(), status }
    }
}
