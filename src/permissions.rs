//! What the current user may do with a challenge, computed in one place so every screen agrees.
//!
//! These flags gate the UI only. The authority re-checks every guard when a transition is
//! submitted, so a stale or forged permission set can never commit a change.

use serde::{Serialize, Deserialize};
use uuid::Uuid;
use crate::acceptance::AcceptanceRequest;
use crate::challenge::{ChallengeStatus, ChallengeView};
use crate::teams::Actor;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionSet {
    pub can_accept_directly: bool,
    pub can_decline: bool,
    pub can_request_accept: bool,
    pub can_withdraw_request: bool,
    pub can_manage_requests: bool,
    pub can_approve_request: bool,
    pub can_withdraw_challenge: bool,
    pub can_mark_expired: bool,
    /// Actor's teams that may still file an acceptance request.
    pub requestable_team_ids: Vec<Uuid>,
    /// The actor's own pending request, if any.
    pub own_pending_request_id: Option<Uuid>,
}

/// Derive the permission set for `actor` on `challenge`.
///
/// `request` is the acceptance request currently in focus (for example the row a sender is
/// looking at); it only affects `can_approve_request`. `acceptance_requests` is the full list
/// of requests known for the challenge.
pub fn derive_permissions(
    challenge: &ChallengeView,
    request: Option<&AcceptanceRequest>,
    actor: &Actor,
    acceptance_requests: &[AcceptanceRequest],
) -> PermissionSet {
    let is_sender_member = actor.is_member(challenge.sender_team_id);
    let is_receiver_member = challenge.receiver_team_id.is_some_and(|r| actor.is_member(r));

    let own_pending = acceptance_requests
        .iter()
        .filter(|r| r.challenge_id == challenge.id)
        .find(|r| r.is_pending() && actor.is_member(r.accepting_team_id));

    let requestable_team_ids: Vec<Uuid> = if challenge.status == ChallengeStatus::Open {
        actor
            .team_ids
            .iter()
            .copied()
            .filter(|team_id| *team_id != challenge.sender_team_id)
            .filter(|team_id| {
                !acceptance_requests
                    .iter()
                    .any(|r| r.challenge_id == challenge.id && r.accepting_team_id == *team_id && r.is_pending())
            })
            .collect()
    } else {
        Vec::new()
    };

    let can_accept_directly = challenge.status == ChallengeStatus::Pending && is_receiver_member;
    let can_manage_requests = is_sender_member && challenge.status == ChallengeStatus::Open;
    let can_approve_request = can_manage_requests
        && request.is_some_and(|r| r.challenge_id == challenge.id && r.is_pending());

    PermissionSet {
        can_accept_directly,
        can_decline: can_accept_directly,
        can_request_accept: !requestable_team_ids.is_empty(),
        can_withdraw_request: own_pending.is_some(),
        can_manage_requests,
        can_approve_request,
        can_withdraw_challenge: is_sender_member && challenge.status.is_awaiting_decision(),
        can_mark_expired: is_sender_member && challenge.status == ChallengeStatus::Accepted,
        requestable_team_ids,
        own_pending_request_id: own_pending.map(|r| r.id),
    }
}
