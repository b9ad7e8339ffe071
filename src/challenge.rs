use std::fmt;
use std::str::FromStr;
use serde::{Serialize, Deserialize};
use sqids::Sqids;
use uuid::Uuid;
use crate::acceptance::{AcceptanceRequest, AcceptanceStatus};
use crate::result::{TransitionError, TransitionSuccess};
use crate::teams::Actor;

/// Lifecycle status of a challenge. `Declined`, `Expired` and `Completed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChallengeStatus {
    Open,
    Pending,
    Accepted,
    Declined,
    Expired,
    Completed,
}

impl ChallengeStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, ChallengeStatus::Declined | ChallengeStatus::Expired | ChallengeStatus::Completed)
    }

    /// Still waiting for an opponent.
    pub fn is_awaiting_decision(self) -> bool {
        matches!(self, ChallengeStatus::Open | ChallengeStatus::Pending)
    }

    pub const ALL: [ChallengeStatus; 6] = [
        ChallengeStatus::Open,
        ChallengeStatus::Pending,
        ChallengeStatus::Accepted,
        ChallengeStatus::Declined,
        ChallengeStatus::Expired,
        ChallengeStatus::Completed,
    ];
}

impl fmt::Display for ChallengeStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ChallengeStatus::Open => write!(f, "OPEN"),
            ChallengeStatus::Pending => write!(f, "PENDING"),
            ChallengeStatus::Accepted => write!(f, "ACCEPTED"),
            ChallengeStatus::Declined => write!(f, "DECLINED"),
            ChallengeStatus::Expired => write!(f, "EXPIRED"),
            ChallengeStatus::Completed => write!(f, "COMPLETED"),
        }
    }
}

impl FromStr for ChallengeStatus {
    type Err = ();
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "OPEN" => Ok(ChallengeStatus::Open),
            "PENDING" => Ok(ChallengeStatus::Pending),
            "ACCEPTED" => Ok(ChallengeStatus::Accepted),
            "DECLINED" => Ok(ChallengeStatus::Declined),
            "EXPIRED" => Ok(ChallengeStatus::Expired),
            "COMPLETED" => Ok(ChallengeStatus::Completed),
            _ => Err(()),
        }
    }
}

fn sqids_instance() -> Sqids {
    Sqids::builder()
        .min_length(6)
        .build()
        .unwrap_or_default()
}

pub fn uuid_to_short_id(uuid: Uuid) -> String {
    let (high, low) = uuid.as_u64_pair();
    sqids_instance()
        .encode(&[high, low])
        .unwrap_or_else(|_| uuid.simple().to_string())
}

pub fn short_id_to_uuid(short_id: &str) -> Option<Uuid> {
    let nums = sqids_instance().decode(short_id);
    if nums.len() != 2 {
        return None;
    }
    Some(Uuid::from_u64_pair(nums[0], nums[1]))
}

/// Input for creating a challenge. Leaving `receiver_team_id` empty makes an open challenge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewChallenge {
    pub sender_team_id: Uuid,
    #[serde(default)]
    pub receiver_team_id: Option<Uuid>,
    pub sport: String,
    #[serde(default)]
    pub message: Option<String>,
    pub scheduled_at: u64,
    #[serde(default)]
    pub expires_at: Option<u64>,
}

/// The primary way to progress a challenge. Used as an argument to [Challenge::play](struct.Challenge.html#method.play).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChallengeTransition {
    /// Receiver accepts a direct challenge on behalf of `team_id`.
    Accept { team_id: Uuid },
    Decline,
    /// Sender pulls the challenge back before anyone is locked in.
    Withdraw,
    /// Elapsed expiry for open/pending challenges, forfeit for accepted ones.
    Expire,
    RequestAcceptance { team_id: Uuid },
    ApproveRequest { request_id: Uuid },
    WithdrawRequest { request_id: Uuid },
    /// The match result was recorded.
    Complete,
}

/// Primary challenge state, including the acceptance requests it owns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Challenge {
    id: Uuid,
    sender_team_id: Uuid,
    receiver_team_id: Option<Uuid>,
    first_acceptor_team_id: Option<Uuid>,
    status: ChallengeStatus,
    sport: String,
    message: Option<String>,
    created_by: Uuid,
    created_at: u64,
    updated_at: u64,
    expires_at: Option<u64>,
    scheduled_at: u64,
    match_id: Option<Uuid>,
    acceptance_requests: Vec<AcceptanceRequest>,
}

/// Snapshot of a challenge as sent over the wire and kept in client caches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChallengeView {
    pub id: Uuid,
    pub short_id: String,
    pub sender_team_id: Uuid,
    pub receiver_team_id: Option<Uuid>,
    pub first_acceptor_team_id: Option<Uuid>,
    pub status: ChallengeStatus,
    pub sport: String,
    pub message: Option<String>,
    pub created_by: Uuid,
    pub created_at: u64,
    pub updated_at: u64,
    pub expires_at: Option<u64>,
    pub scheduled_at: u64,
    pub match_id: Option<Uuid>,
    pub pending_request_count: usize,
}

/// Advisory time left before a challenge expires. Display only; it never changes status.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Countdown {
    pub remaining_secs: u64,
    pub elapsed_fraction: f64,
    pub elapsed: bool,
}

impl ChallengeView {
    /// The team that plays against the sender, once one is known.
    pub fn opponent_team_id(&self) -> Option<Uuid> {
        self.receiver_team_id.or(self.first_acceptor_team_id)
    }

    /// Recomputed from `created_at`/`expires_at` on every call. `None` when there is no
    /// expiry or the challenge is no longer waiting for a decision.
    pub fn countdown(&self, now: u64) -> Option<Countdown> {
        let expires_at = self.expires_at?;
        if !self.status.is_awaiting_decision() {
            return None;
        }
        let total = expires_at.saturating_sub(self.created_at);
        let remaining_secs = expires_at.saturating_sub(now);
        let elapsed_fraction = if total == 0 {
            1.0
        } else {
            (now.saturating_sub(self.created_at) as f64 / total as f64).min(1.0)
        };
        Some(Countdown {
            remaining_secs,
            elapsed_fraction,
            elapsed: remaining_secs == 0,
        })
    }
}

impl Challenge {
    /// Create a direct challenge (PENDING) when `receiver_team_id` is set, otherwise an open one (OPEN).
    pub fn create(actor: &Actor, draft: NewChallenge, now: u64) -> Result<Challenge, TransitionError> {
        if !actor.is_member(draft.sender_team_id) {
            return Err(TransitionError::NotSenderMember);
        }
        if draft.receiver_team_id == Some(draft.sender_team_id) {
            return Err(TransitionError::SameTeam);
        }
        if let Some(expires_at) = draft.expires_at {
            if expires_at >= draft.scheduled_at {
                return Err(TransitionError::ExpiryNotBeforeSchedule);
            }
        }

        let status = match draft.receiver_team_id {
            Some(_) => ChallengeStatus::Pending,
            None => ChallengeStatus::Open,
        };

        Ok(Challenge {
            id: Uuid::new_v4(),
            sender_team_id: draft.sender_team_id,
            receiver_team_id: draft.receiver_team_id,
            first_acceptor_team_id: None,
            status,
            sport: draft.sport,
            message: draft.message,
            created_by: actor.user_id,
            created_at: now,
            updated_at: now,
            expires_at: draft.expires_at,
            scheduled_at: draft.scheduled_at,
            match_id: None,
            acceptance_requests: Vec::new(),
        })
    }

    pub fn get_id(&self) -> &Uuid {
        &self.id
    }

    pub fn get_status(&self) -> ChallengeStatus {
        self.status
    }

    pub fn get_sender_team_id(&self) -> Uuid {
        self.sender_team_id
    }

    pub fn get_receiver_team_id(&self) -> Option<Uuid> {
        self.receiver_team_id
    }

    pub fn get_first_acceptor_team_id(&self) -> Option<Uuid> {
        self.first_acceptor_team_id
    }

    pub fn get_match_id(&self) -> Option<Uuid> {
        self.match_id
    }

    pub fn get_scheduled_at(&self) -> u64 {
        self.scheduled_at
    }

    pub fn get_expires_at(&self) -> Option<u64> {
        self.expires_at
    }

    pub fn get_sport(&self) -> &str {
        &self.sport
    }

    pub fn get_message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn get_acceptance_requests(&self) -> &[AcceptanceRequest] {
        &self.acceptance_requests
    }

    pub fn get_acceptance_request(&self, request_id: Uuid) -> Option<&AcceptanceRequest> {
        self.acceptance_requests.iter().find(|r| r.id == request_id)
    }

    pub fn opponent_team_id(&self) -> Option<Uuid> {
        self.receiver_team_id.or(self.first_acceptor_team_id)
    }

    pub fn pending_request_count(&self) -> usize {
        self.acceptance_requests.iter().filter(|r| r.is_pending()).count()
    }

    pub fn view(&self) -> ChallengeView {
        ChallengeView {
            id: self.id,
            short_id: uuid_to_short_id(self.id),
            sender_team_id: self.sender_team_id,
            receiver_team_id: self.receiver_team_id,
            first_acceptor_team_id: self.first_acceptor_team_id,
            status: self.status,
            sport: self.sport.clone(),
            message: self.message.clone(),
            created_by: self.created_by,
            created_at: self.created_at,
            updated_at: self.updated_at,
            expires_at: self.expires_at,
            scheduled_at: self.scheduled_at,
            match_id: self.match_id,
            pending_request_count: self.pending_request_count(),
        }
    }

    /// Expire an open or pending challenge whose `expires_at` has passed.
    /// Returns the ids of acceptance requests rejected as a consequence, or `None` if nothing changed.
    pub fn expire_if_due(&mut self, now: u64) -> Option<Vec<Uuid>> {
        if !self.status.is_awaiting_decision() {
            return None;
        }
        match self.expires_at {
            Some(expires_at) if expires_at <= now => {
                self.status = ChallengeStatus::Expired;
                self.updated_at = now;
                Some(self.reject_pending(now, None))
            }
            _ => None,
        }
    }

    /// The primary function used to progress a challenge. On error the challenge is left untouched.
    ///
    /// Direct challenges go `PENDING -> ACCEPTED | DECLINED`, open challenges collect acceptance
    /// requests while `OPEN` and move to `ACCEPTED` when the sender approves one. Accepted challenges
    /// end as `COMPLETED` (result recorded) or `EXPIRED` (forfeit).
    pub fn play(&mut self, actor: &Actor, transition: ChallengeTransition, now: u64) -> Result<TransitionSuccess, TransitionError> {
        if self.status.is_terminal() {
            return Err(TransitionError::Terminal(self.status));
        }

        match transition {
            ChallengeTransition::Accept { team_id } => {
                let receiver = match (self.status, self.receiver_team_id) {
                    (ChallengeStatus::Pending, Some(receiver)) => receiver,
                    _ => return Err(TransitionError::invalid_state("accept", self.status)),
                };
                if team_id != receiver {
                    return Err(TransitionError::WrongReceiver(team_id));
                }
                if !actor.is_member(receiver) {
                    return Err(TransitionError::NotReceiverMember);
                }
                let match_id = Uuid::new_v4();
                self.status = ChallengeStatus::Accepted;
                self.match_id = Some(match_id);
                self.updated_at = now;
                Ok(TransitionSuccess::Accepted { match_id })
            },
            ChallengeTransition::Decline => {
                let receiver = match (self.status, self.receiver_team_id) {
                    (ChallengeStatus::Pending, Some(receiver)) => receiver,
                    _ => return Err(TransitionError::invalid_state("decline", self.status)),
                };
                if !actor.is_member(receiver) {
                    return Err(TransitionError::NotReceiverMember);
                }
                self.status = ChallengeStatus::Declined;
                self.updated_at = now;
                Ok(TransitionSuccess::Declined)
            },
            ChallengeTransition::Withdraw => {
                if !self.status.is_awaiting_decision() {
                    return Err(TransitionError::invalid_state("withdraw", self.status));
                }
                if !actor.is_member(self.sender_team_id) {
                    return Err(TransitionError::NotSenderMember);
                }
                self.status = ChallengeStatus::Declined;
                self.updated_at = now;
                let rejected_requests = self.reject_pending(now, None);
                Ok(TransitionSuccess::Withdrawn { rejected_requests })
            },
            ChallengeTransition::Expire => {
                match self.status {
                    ChallengeStatus::Open | ChallengeStatus::Pending => {
                        match self.expire_if_due(now) {
                            Some(rejected_requests) => Ok(TransitionSuccess::Expired { rejected_requests }),
                            None => Err(TransitionError::NotYetExpired),
                        }
                    },
                    ChallengeStatus::Accepted => {
                        if !actor.is_member(self.sender_team_id) {
                            return Err(TransitionError::NotSenderMember);
                        }
                        self.status = ChallengeStatus::Expired;
                        self.updated_at = now;
                        Ok(TransitionSuccess::Expired { rejected_requests: Vec::new() })
                    },
                    status => Err(TransitionError::invalid_state("expire", status)),
                }
            },
            ChallengeTransition::RequestAcceptance { team_id } => {
                if self.status != ChallengeStatus::Open {
                    return Err(TransitionError::invalid_state("request to accept", self.status));
                }
                if team_id == self.sender_team_id {
                    return Err(TransitionError::SenderCannotRequest);
                }
                if !actor.is_member(team_id) {
                    return Err(TransitionError::NotTeamMember(team_id));
                }
                if self.acceptance_requests.iter().any(|r| r.accepting_team_id == team_id && r.is_pending()) {
                    return Err(TransitionError::DuplicateRequest(team_id));
                }
                let request = AcceptanceRequest::new(self.id, team_id, actor.user_id, now);
                let request_id = request.id;
                self.acceptance_requests.push(request);
                self.updated_at = now;
                Ok(TransitionSuccess::RequestCreated { request_id })
            },
            ChallengeTransition::ApproveRequest { request_id } => {
                if self.status != ChallengeStatus::Open {
                    return Err(TransitionError::invalid_state("approve a request on", self.status));
                }
                if !actor.is_member(self.sender_team_id) {
                    return Err(TransitionError::NotSenderMember);
                }
                let index = self
                    .acceptance_requests
                    .iter()
                    .position(|r| r.id == request_id)
                    .ok_or(TransitionError::RequestNotFound(request_id))?;
                if !self.acceptance_requests[index].is_pending() {
                    return Err(TransitionError::RequestNotPending(request_id));
                }

                let request = &mut self.acceptance_requests[index];
                request.resolve(AcceptanceStatus::Approved, now);
                let accepting_team_id = request.accepting_team_id;

                let match_id = Uuid::new_v4();
                self.first_acceptor_team_id = Some(accepting_team_id);
                self.status = ChallengeStatus::Accepted;
                self.match_id = Some(match_id);
                self.updated_at = now;
                let rejected_requests = self.reject_pending(now, Some(request_id));
                Ok(TransitionSuccess::RequestApproved { match_id, rejected_requests })
            },
            ChallengeTransition::WithdrawRequest { request_id } => {
                let request = self
                    .acceptance_requests
                    .iter_mut()
                    .find(|r| r.id == request_id)
                    .ok_or(TransitionError::RequestNotFound(request_id))?;
                if !request.is_pending() {
                    return Err(TransitionError::RequestNotPending(request_id));
                }
                if !actor.is_member(request.accepting_team_id) {
                    return Err(TransitionError::NotTeamMember(request.accepting_team_id));
                }
                request.resolve(AcceptanceStatus::Withdrawn, now);
                self.updated_at = now;
                Ok(TransitionSuccess::RequestWithdrawn { request_id })
            },
            ChallengeTransition::Complete => {
                if self.status != ChallengeStatus::Accepted {
                    return Err(TransitionError::invalid_state("complete", self.status));
                }
                let is_participant = actor.is_member(self.sender_team_id)
                    || self.opponent_team_id().is_some_and(|t| actor.is_member(t));
                if !is_participant {
                    return Err(TransitionError::NotParticipant);
                }
                self.status = ChallengeStatus::Completed;
                self.updated_at = now;
                Ok(TransitionSuccess::Completed)
            },
        }
    }

    /// Reject every pending request except `keep`. Returns the ids that changed.
    fn reject_pending(&mut self, now: u64, keep: Option<Uuid>) -> Vec<Uuid> {
        self.acceptance_requests
            .iter_mut()
            .filter(|r| Some(r.id) != keep)
            .filter_map(|r| r.resolve(AcceptanceStatus::Rejected, now).then_some(r.id))
            .collect()
    }
}
