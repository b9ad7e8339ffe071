//! Transition-triggering operations as explicit values.
//!
//! A command knows its HTTP endpoint and which cached data it touches; executing it
//! yields a [`CommandOutcome`] that the caller feeds to
//! [`ChallengeCache::apply`](crate::cache::ChallengeCache::apply).

use serde::{Serialize, Deserialize};
use uuid::Uuid;
use crate::acceptance::AcceptanceRequest;
use crate::challenge::ChallengeView;
use crate::result::ErrorKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Post,
    Delete,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Endpoint {
    pub method: HttpMethod,
    pub path: String,
    pub body: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChallengeCommand {
    Accept { challenge_id: Uuid, team_id: Uuid },
    Decline { challenge_id: Uuid },
    Withdraw { challenge_id: Uuid },
    Expire { challenge_id: Uuid },
    RequestAcceptance { challenge_id: Uuid, accepting_team_id: Uuid },
    ApproveRequest { challenge_id: Uuid, request_id: Uuid },
    WithdrawRequest { challenge_id: Uuid, request_id: Uuid },
}

impl ChallengeCommand {
    pub fn challenge_id(&self) -> Uuid {
        match self {
            ChallengeCommand::Accept { challenge_id, .. }
            | ChallengeCommand::Decline { challenge_id }
            | ChallengeCommand::Withdraw { challenge_id }
            | ChallengeCommand::Expire { challenge_id }
            | ChallengeCommand::RequestAcceptance { challenge_id, .. }
            | ChallengeCommand::ApproveRequest { challenge_id, .. }
            | ChallengeCommand::WithdrawRequest { challenge_id, .. } => *challenge_id,
        }
    }

    pub fn endpoint(&self) -> Endpoint {
        let (method, path, body) = match self {
            ChallengeCommand::Accept { challenge_id, team_id } => (
                HttpMethod::Post,
                format!("/challenges/{}/accept", challenge_id),
                Some(serde_json::json!({ "team_id": team_id })),
            ),
            ChallengeCommand::Decline { challenge_id } => {
                (HttpMethod::Post, format!("/challenges/{}/decline", challenge_id), None)
            }
            ChallengeCommand::Withdraw { challenge_id } => {
                (HttpMethod::Post, format!("/challenges/{}/withdraw", challenge_id), None)
            }
            ChallengeCommand::Expire { challenge_id } => {
                (HttpMethod::Post, format!("/challenges/{}/expire", challenge_id), None)
            }
            ChallengeCommand::RequestAcceptance { challenge_id, accepting_team_id } => (
                HttpMethod::Post,
                format!("/challenges/{}/acceptance-requests", challenge_id),
                Some(serde_json::json!({ "accepting_team_id": accepting_team_id })),
            ),
            ChallengeCommand::ApproveRequest { challenge_id, request_id } => (
                HttpMethod::Post,
                format!("/challenges/{}/acceptance-requests/{}/approve", challenge_id, request_id),
                None,
            ),
            ChallengeCommand::WithdrawRequest { request_id, .. } => {
                (HttpMethod::Delete, format!("/acceptance-requests/{}", request_id), None)
            }
        };
        Endpoint { method, path, body }
    }

    /// Commands the UI must confirm before sending.
    pub fn requires_confirmation(&self) -> bool {
        matches!(
            self,
            ChallengeCommand::Decline { .. }
                | ChallengeCommand::Withdraw { .. }
                | ChallengeCommand::Expire { .. }
                | ChallengeCommand::ApproveRequest { .. }
        )
    }

    /// Whether the server may mutate the challenge's acceptance requests.
    pub fn touches_requests(&self) -> bool {
        matches!(
            self,
            ChallengeCommand::Withdraw { .. }
                | ChallengeCommand::Expire { .. }
                | ChallengeCommand::RequestAcceptance { .. }
                | ChallengeCommand::ApproveRequest { .. }
                | ChallengeCommand::WithdrawRequest { .. }
        )
    }

    /// Route the command through a confirmation step when it needs one.
    pub fn gate(self) -> Gate {
        if self.requires_confirmation() {
            Gate::NeedsConfirmation(PendingConfirmation { command: self })
        } else {
            Gate::Ready(self)
        }
    }
}

#[derive(Debug)]
pub enum Gate {
    Ready(ChallengeCommand),
    NeedsConfirmation(PendingConfirmation),
}

/// A command held back until the user confirms. Cancelling consumes it, so nothing is sent.
#[derive(Debug)]
pub struct PendingConfirmation {
    command: ChallengeCommand,
}

impl PendingConfirmation {
    pub fn command(&self) -> &ChallengeCommand {
        &self.command
    }

    pub fn confirm(self) -> ChallengeCommand {
        self.command
    }

    pub fn cancel(self) {
        tracing::debug!(challenge_id = %self.command.challenge_id(), "confirmation cancelled, command dropped");
    }
}

/// Payload returned by a successful command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CommandResult {
    Challenge(ChallengeView),
    Request(AcceptanceRequest),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{message}")]
pub struct CommandFailure {
    pub kind: ErrorKind,
    /// Server-provided reason, shown to the user verbatim.
    pub message: String,
}

/// Success-with-data or failure-with-reason. Failures are final for the attempt; nothing retries.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutcome<T> {
    Success(T),
    Failure(CommandFailure),
}

impl<T> CommandOutcome<T> {
    pub fn failure(kind: ErrorKind, message: impl Into<String>) -> Self {
        CommandOutcome::Failure(CommandFailure { kind, message: message.into() })
    }

    pub fn is_success(&self) -> bool {
        matches!(self, CommandOutcome::Success(_))
    }

    pub fn into_result(self) -> Result<T, CommandFailure> {
        match self {
            CommandOutcome::Success(value) => Ok(value),
            CommandOutcome::Failure(failure) => Err(failure),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accept_endpoint_carries_team() {
        let challenge_id = Uuid::new_v4();
        let team_id = Uuid::new_v4();
        let endpoint = ChallengeCommand::Accept { challenge_id, team_id }.endpoint();
        assert_eq!(endpoint.method, HttpMethod::Post);
        assert_eq!(endpoint.path, format!("/challenges/{}/accept", challenge_id));
        assert_eq!(endpoint.body, Some(serde_json::json!({ "team_id": team_id })));
    }

    #[test]
    fn test_withdraw_request_uses_delete() {
        let request_id = Uuid::new_v4();
        let endpoint = ChallengeCommand::WithdrawRequest { challenge_id: Uuid::new_v4(), request_id }.endpoint();
        assert_eq!(endpoint.method, HttpMethod::Delete);
        assert_eq!(endpoint.path, format!("/acceptance-requests/{}", request_id));
        assert!(endpoint.body.is_none());
    }

    #[test]
    fn test_approve_endpoint_path() {
        let challenge_id = Uuid::new_v4();
        let request_id = Uuid::new_v4();
        let endpoint = ChallengeCommand::ApproveRequest { challenge_id, request_id }.endpoint();
        assert_eq!(endpoint.path, format!("/challenges/{}/acceptance-requests/{}/approve", challenge_id, request_id));
    }

    #[test]
    fn test_gate_routes_destructive_commands_through_confirmation() {
        let challenge_id = Uuid::new_v4();
        assert!(matches!(ChallengeCommand::Withdraw { challenge_id }.gate(), Gate::NeedsConfirmation(_)));
        assert!(matches!(
            ChallengeCommand::RequestAcceptance { challenge_id, accepting_team_id: Uuid::new_v4() }.gate(),
            Gate::Ready(_)
        ));
    }

    #[test]
    fn test_confirmation_returns_original_command() {
        let command = ChallengeCommand::Decline { challenge_id: Uuid::new_v4() };
        let Gate::NeedsConfirmation(pending) = command.clone().gate() else {
            panic!("decline should need confirmation");
        };
        assert_eq!(pending.command(), &command);
        assert_eq!(pending.confirm(), command);
    }

    #[test]
    fn test_outcome_into_result() {
        let ok: CommandOutcome<u8> = CommandOutcome::Success(1);
        assert!(ok.is_success());
        assert_eq!(ok.into_result(), Ok(1));

        let failed: CommandOutcome<u8> = CommandOutcome::failure(ErrorKind::Conflict, "taken");
        assert!(!failed.is_success());
        let err = failed.into_result().unwrap_err();
        assert_eq!(err.kind, ErrorKind::Conflict);
        assert_eq!(err.to_string(), "taken");
    }

    #[test]
    fn test_command_serde_tagged() {
        let command = ChallengeCommand::Expire { challenge_id: Uuid::nil() };
        let json = serde_json::to_value(&command).unwrap();
        assert_eq!(json["type"], "expire");
    }
}
