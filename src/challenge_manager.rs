use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use serde::{Serialize, Deserialize};
use tokio::sync::broadcast;
use uuid::Uuid;
use crate::acceptance::AcceptanceRequest;
use crate::challenge::{Challenge, ChallengeTransition, ChallengeView, NewChallenge};
use crate::listing::{ChallengeQuery, Paginated};
use crate::matches::{Match, MatchScore};
use crate::permissions::{derive_permissions, PermissionSet};
use crate::result::{ErrorKind, TransitionError, TransitionSuccess};
use crate::sqlite_store::{SqliteStore, StorageError};
use crate::teams::{Actor, DirectoryError, Team, TeamDirectory, UserRecord};
use crate::validation;

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Event broadcast to SSE subscribers when a challenge changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ChallengeEvent {
    Created(ChallengeView),
    Updated(ChallengeView),
    RequestsChanged { challenge_id: Uuid, requests: Vec<AcceptanceRequest> },
}

impl ChallengeEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ChallengeEvent::Created(_) => "created",
            ChallengeEvent::Updated(_) => "updated",
            ChallengeEvent::RequestsChanged { .. } => "requests_changed",
        }
    }
}

/// Everything the challenge detail screen needs in one response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChallengeDetail {
    pub challenge: ChallengeView,
    pub sender_team: Option<Team>,
    pub opponent_team: Option<Team>,
    pub acceptance_requests: Vec<AcceptanceRequest>,
    #[serde(rename = "match")]
    pub game: Option<Match>,
}

/// A committed transition together with the challenge it left behind.
#[derive(Debug, Clone)]
pub struct Applied {
    pub outcome: TransitionSuccess,
    pub challenge: ChallengeView,
    pub requests: Vec<AcceptanceRequest>,
}

#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error("Error: {0}")]
    Directory(#[from] DirectoryError),
    #[error("Error: {0}")]
    Storage(#[from] StorageError),
    #[error("Error: {0}")]
    Validation(String),
    #[error("Error: Challenge not found.")]
    ChallengeNotFound,
    #[error("Error: Acceptance request not found.")]
    RequestNotFound,
    #[error("Error: Match not found.")]
    MatchNotFound,
    #[error("Error: A result was already recorded for this match.")]
    ResultAlreadyRecorded,
    #[error("Error: Missing or invalid bearer token.")]
    Unauthenticated,
    #[error("Error: Internal lock poisoned.")]
    LockError,
}

impl ManagerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ManagerError::Transition(e) => e.kind(),
            ManagerError::Directory(e) => match e {
                DirectoryError::UserNotFound | DirectoryError::TeamNotFound => ErrorKind::NotFound,
                DirectoryError::NotTeamMember => ErrorKind::Authorization,
                DirectoryError::AlreadyMember => ErrorKind::Conflict,
            },
            ManagerError::Validation(_) => ErrorKind::Validation,
            ManagerError::ChallengeNotFound
            | ManagerError::RequestNotFound
            | ManagerError::MatchNotFound => ErrorKind::NotFound,
            ManagerError::ResultAlreadyRecorded => ErrorKind::Conflict,
            ManagerError::Unauthenticated => ErrorKind::Unauthenticated,
            ManagerError::Storage(_) | ManagerError::LockError => ErrorKind::Internal,
        }
    }
}

pub fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

fn touches_requests(outcome: &TransitionSuccess) -> bool {
    match outcome {
        TransitionSuccess::RequestCreated { .. }
        | TransitionSuccess::RequestApproved { .. }
        | TransitionSuccess::RequestWithdrawn { .. } => true,
        TransitionSuccess::Withdrawn { rejected_requests }
        | TransitionSuccess::Expired { rejected_requests } => !rejected_requests.is_empty(),
        TransitionSuccess::Accepted { .. }
        | TransitionSuccess::Declined
        | TransitionSuccess::Completed => false,
    }
}

/// Owns every challenge, team and match, and is the single place transitions are committed.
#[derive(Clone)]
pub struct ChallengeManager {
    directory: Arc<RwLock<TeamDirectory>>,
    challenges: Arc<RwLock<HashMap<Uuid, Arc<RwLock<Challenge>>>>>,
    matches: Arc<RwLock<HashMap<Uuid, Match>>>,
    /// acceptance request id -> challenge id
    request_index: Arc<RwLock<HashMap<Uuid, Uuid>>>,
    broadcasters: Arc<RwLock<HashMap<Uuid, broadcast::Sender<ChallengeEvent>>>>,
    db: Option<Arc<SqliteStore>>,
}

impl ChallengeManager {
    /// Create a new challenge manager (in-memory only)
    pub fn new() -> Self {
        ChallengeManager {
            directory: Arc::new(RwLock::new(TeamDirectory::new())),
            challenges: Arc::new(RwLock::new(HashMap::new())),
            matches: Arc::new(RwLock::new(HashMap::new())),
            request_index: Arc::new(RwLock::new(HashMap::new())),
            broadcasters: Arc::new(RwLock::new(HashMap::new())),
            db: None,
        }
    }

    /// Create a manager backed by SQLite, loading everything already stored there.
    pub fn with_db(path: &str) -> Result<Self, ManagerError> {
        let store = SqliteStore::open(path)?;
        let directory = TeamDirectory::from_records(store.load_users()?, store.load_teams()?);

        let mut challenges = HashMap::new();
        let mut broadcasters = HashMap::new();
        let mut request_index = HashMap::new();
        for challenge in store.load_challenges()? {
            let id = *challenge.get_id();
            for request in challenge.get_acceptance_requests() {
                request_index.insert(request.id, id);
            }
            challenges.insert(id, Arc::new(RwLock::new(challenge)));
            let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
            broadcasters.insert(id, tx);
        }
        let matches: HashMap<Uuid, Match> = store
            .load_matches()?
            .into_iter()
            .map(|m| (m.id, m))
            .collect();

        tracing::info!(
            challenges = challenges.len(),
            matches = matches.len(),
            "loaded state from database"
        );

        Ok(ChallengeManager {
            directory: Arc::new(RwLock::new(directory)),
            challenges: Arc::new(RwLock::new(challenges)),
            matches: Arc::new(RwLock::new(matches)),
            request_index: Arc::new(RwLock::new(request_index)),
            broadcasters: Arc::new(RwLock::new(broadcasters)),
            db: Some(Arc::new(store)),
        })
    }

    fn persist_challenge(&self, challenge: &Challenge) {
        if let Some(db) = &self.db {
            if let Err(e) = db.save_challenge(challenge) {
                tracing::error!(challenge_id = %challenge.get_id(), error = %e, "failed to persist challenge");
            }
        }
    }

    fn persist_team(&self, team: &Team) {
        if let Some(db) = &self.db {
            if let Err(e) = db.save_team(team) {
                tracing::error!(team_id = %team.id, error = %e, "failed to persist team");
            }
        }
    }

    fn persist_user(&self, record: &UserRecord) {
        if let Some(db) = &self.db {
            if let Err(e) = db.save_user(record) {
                tracing::error!(user_id = %record.user.id, error = %e, "failed to persist user");
            }
        }
    }

    fn persist_match(&self, game: &Match) {
        if let Some(db) = &self.db {
            if let Err(e) = db.save_match(game) {
                tracing::error!(match_id = %game.id, error = %e, "failed to persist match");
            }
        }
    }

    fn publish(&self, challenge_id: Uuid, event: ChallengeEvent) {
        if let Ok(broadcasters) = self.broadcasters.read() {
            if let Some(tx) = broadcasters.get(&challenge_id) {
                // no subscribers is fine
                let _ = tx.send(event);
            }
        }
    }

    fn challenge_lock(&self, challenge_id: Uuid) -> Result<Arc<RwLock<Challenge>>, ManagerError> {
        let challenges = self.challenges.read().map_err(|_| ManagerError::LockError)?;
        challenges
            .get(&challenge_id)
            .cloned()
            .ok_or(ManagerError::ChallengeNotFound)
    }

    /// Commit a lazy expiry discovered while handling some other call.
    fn commit_expiry(&self, challenge: &mut Challenge, now: u64) {
        if let Some(rejected) = challenge.expire_if_due(now) {
            tracing::info!(challenge_id = %challenge.get_id(), rejected = rejected.len(), "challenge expired");
            self.persist_challenge(challenge);
            let challenge_id = *challenge.get_id();
            self.publish(challenge_id, ChallengeEvent::Updated(challenge.view()));
            if !rejected.is_empty() {
                self.publish(challenge_id, ChallengeEvent::RequestsChanged {
                    challenge_id,
                    requests: challenge.get_acceptance_requests().to_vec(),
                });
            }
        }
    }

    // ---- users & teams ----

    pub fn register_user(&self, name: &str) -> Result<UserRecord, ManagerError> {
        let name = validation::validate_display_name(name).map_err(ManagerError::Validation)?;
        let record = {
            let mut directory = self.directory.write().map_err(|_| ManagerError::LockError)?;
            directory.register_user(name)
        };
        self.persist_user(&record);
        tracing::info!(user_id = %record.user.id, "user registered");
        Ok(record)
    }

    /// Resolve a bearer token to a user id.
    pub fn authenticate(&self, token: &str) -> Result<Uuid, ManagerError> {
        let directory = self.directory.read().map_err(|_| ManagerError::LockError)?;
        directory.authenticate(token).ok_or(ManagerError::Unauthenticated)
    }

    pub fn actor(&self, user_id: Uuid) -> Result<Actor, ManagerError> {
        let directory = self.directory.read().map_err(|_| ManagerError::LockError)?;
        if directory.user(user_id).is_none() {
            return Err(DirectoryError::UserNotFound.into());
        }
        Ok(directory.actor(user_id))
    }

    pub fn create_team(&self, owner: Uuid, name: &str, sport: &str) -> Result<Team, ManagerError> {
        let name = validation::validate_display_name(name).map_err(ManagerError::Validation)?;
        let sport = validation::validate_sport(sport).map_err(ManagerError::Validation)?;
        let team = {
            let mut directory = self.directory.write().map_err(|_| ManagerError::LockError)?;
            directory.create_team(owner, name, sport)?
        };
        self.persist_team(&team);
        tracing::info!(team_id = %team.id, owner = %owner, "team created");
        Ok(team)
    }

    pub fn get_team(&self, team_id: Uuid) -> Result<Team, ManagerError> {
        let directory = self.directory.read().map_err(|_| ManagerError::LockError)?;
        directory
            .team(team_id)
            .cloned()
            .ok_or(DirectoryError::TeamNotFound.into())
    }

    pub fn add_member(&self, team_id: Uuid, actor: Uuid, user_id: Uuid) -> Result<Team, ManagerError> {
        let team = {
            let mut directory = self.directory.write().map_err(|_| ManagerError::LockError)?;
            directory.add_member(team_id, actor, user_id)?
        };
        self.persist_team(&team);
        tracing::debug!(team_id = %team_id, user_id = %user_id, "member added");
        Ok(team)
    }

    // ---- challenges ----

    pub fn create_challenge(&self, user_id: Uuid, draft: NewChallenge) -> Result<ChallengeView, ManagerError> {
        let now = now_secs();
        let draft = validation::validate_new_challenge(draft, now).map_err(ManagerError::Validation)?;
        {
            let directory = self.directory.read().map_err(|_| ManagerError::LockError)?;
            directory.team(draft.sender_team_id).ok_or(DirectoryError::TeamNotFound)?;
            if let Some(receiver) = draft.receiver_team_id {
                directory.team(receiver).ok_or(DirectoryError::TeamNotFound)?;
            }
        }
        let actor = self.actor(user_id)?;
        let challenge = Challenge::create(&actor, draft, now)?;
        let challenge_id = *challenge.get_id();
        let view = challenge.view();
        self.persist_challenge(&challenge);

        let mut challenges = self.challenges.write().map_err(|_| ManagerError::LockError)?;
        challenges.insert(challenge_id, Arc::new(RwLock::new(challenge)));
        drop(challenges);

        let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let mut broadcasters = self.broadcasters.write().map_err(|_| ManagerError::LockError)?;
        broadcasters.insert(challenge_id, tx);
        drop(broadcasters);

        tracing::info!(
            challenge_id = %challenge_id,
            sender = %view.sender_team_id,
            status = %view.status,
            "challenge created"
        );
        self.publish(challenge_id, ChallengeEvent::Created(view.clone()));
        Ok(view)
    }

    /// Current view of a challenge. Expires it first if its deadline has passed.
    pub fn get_challenge(&self, challenge_id: Uuid) -> Result<ChallengeView, ManagerError> {
        let lock = self.challenge_lock(challenge_id)?;
        let mut challenge = lock.write().map_err(|_| ManagerError::LockError)?;
        self.commit_expiry(&mut challenge, now_secs());
        Ok(challenge.view())
    }

    pub fn challenge_detail(&self, challenge_id: Uuid) -> Result<ChallengeDetail, ManagerError> {
        let (view, acceptance_requests) = {
            let lock = self.challenge_lock(challenge_id)?;
            let mut challenge = lock.write().map_err(|_| ManagerError::LockError)?;
            self.commit_expiry(&mut challenge, now_secs());
            (challenge.view(), challenge.get_acceptance_requests().to_vec())
        };
        let game = match view.match_id {
            Some(match_id) => {
                let matches = self.matches.read().map_err(|_| ManagerError::LockError)?;
                matches.get(&match_id).cloned()
            }
            None => None,
        };
        let directory = self.directory.read().map_err(|_| ManagerError::LockError)?;
        Ok(ChallengeDetail {
            sender_team: directory.team(view.sender_team_id).cloned(),
            opponent_team: view.opponent_team_id().and_then(|t| directory.team(t).cloned()),
            challenge: view,
            acceptance_requests,
            game,
        })
    }

    /// Every challenge, with elapsed deadlines committed before the views are taken.
    fn all_views(&self) -> Result<Vec<ChallengeView>, ManagerError> {
        let locks: Vec<Arc<RwLock<Challenge>>> = {
            let challenges = self.challenges.read().map_err(|_| ManagerError::LockError)?;
            challenges.values().cloned().collect()
        };
        let now = now_secs();
        let mut views = Vec::with_capacity(locks.len());
        for lock in locks {
            let mut challenge = lock.write().map_err(|_| ManagerError::LockError)?;
            self.commit_expiry(&mut challenge, now);
            views.push(challenge.view());
        }
        // newest first
        views.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(views)
    }

    pub fn list_challenges(&self, query: &ChallengeQuery) -> Result<Paginated<ChallengeView>, ManagerError> {
        let views = self.all_views()?;
        let directory = self.directory.read().map_err(|_| ManagerError::LockError)?;
        let team_name = |id: Uuid| directory.team(id).map(|t| t.name.as_str());
        let matching: Vec<ChallengeView> = views
            .into_iter()
            .filter(|view| {
                let names: Vec<&str> = [Some(view.sender_team_id), view.opponent_team_id()]
                    .into_iter()
                    .flatten()
                    .filter_map(team_name)
                    .collect();
                query.matches(view, &names)
            })
            .collect();
        Ok(Paginated::from_items(matching, query))
    }

    pub fn sent_by(&self, team_id: Uuid) -> Result<Vec<ChallengeView>, ManagerError> {
        self.get_team(team_id)?;
        let views = self.all_views()?;
        Ok(views.into_iter().filter(|v| v.sender_team_id == team_id).collect())
    }

    /// Challenges addressed to the team, or open ones it won through approval.
    pub fn received_by(&self, team_id: Uuid) -> Result<Vec<ChallengeView>, ManagerError> {
        self.get_team(team_id)?;
        let views = self.all_views()?;
        Ok(views
            .into_iter()
            .filter(|v| v.opponent_team_id() == Some(team_id))
            .collect())
    }

    pub fn permissions(&self, challenge_id: Uuid, user_id: Uuid, request_id: Option<Uuid>) -> Result<PermissionSet, ManagerError> {
        let actor = self.actor(user_id)?;
        let lock = self.challenge_lock(challenge_id)?;
        let mut challenge = lock.write().map_err(|_| ManagerError::LockError)?;
        self.commit_expiry(&mut challenge, now_secs());
        let focused = request_id.and_then(|id| challenge.get_acceptance_request(id));
        Ok(derive_permissions(&challenge.view(), focused, &actor, challenge.get_acceptance_requests()))
    }

    /// Apply one transition on behalf of `user_id`.
    ///
    /// The challenge stays write-locked from the expiry check until the new state is stored, so
    /// concurrent commands on one challenge are serialized and only the first of two competing
    /// approvals can win.
    pub fn transition(&self, challenge_id: Uuid, user_id: Uuid, transition: ChallengeTransition) -> Result<Applied, ManagerError> {
        let actor = self.actor(user_id)?;
        let now = now_secs();
        let lock = self.challenge_lock(challenge_id)?;
        let mut challenge = lock.write().map_err(|_| ManagerError::LockError)?;

        if transition != ChallengeTransition::Expire {
            self.commit_expiry(&mut challenge, now);
        }

        let outcome = match challenge.play(&actor, transition.clone(), now) {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::debug!(challenge_id = %challenge_id, user_id = %user_id, ?transition, error = %e, "transition rejected");
                return Err(e.into());
            }
        };
        self.persist_challenge(&challenge);

        match &outcome {
            TransitionSuccess::Accepted { match_id } | TransitionSuccess::RequestApproved { match_id, .. } => {
                if let Some(away_team_id) = challenge.opponent_team_id() {
                    let game = Match {
                        id: *match_id,
                        challenge_id,
                        home_team_id: challenge.get_sender_team_id(),
                        away_team_id,
                        scheduled_at: challenge.get_scheduled_at(),
                        result: None,
                    };
                    self.persist_match(&game);
                    let mut matches = self.matches.write().map_err(|_| ManagerError::LockError)?;
                    matches.insert(game.id, game);
                }
            }
            TransitionSuccess::RequestCreated { request_id } => {
                let mut index = self.request_index.write().map_err(|_| ManagerError::LockError)?;
                index.insert(*request_id, challenge_id);
            }
            _ => {}
        }

        let view = challenge.view();
        let requests = challenge.get_acceptance_requests().to_vec();
        drop(challenge);

        tracing::info!(challenge_id = %challenge_id, user_id = %user_id, ?outcome, status = %view.status, "transition applied");

        self.publish(challenge_id, ChallengeEvent::Updated(view.clone()));
        if touches_requests(&outcome) {
            self.publish(challenge_id, ChallengeEvent::RequestsChanged {
                challenge_id,
                requests: requests.clone(),
            });
        }

        Ok(Applied { outcome, challenge: view, requests })
    }

    pub fn request_acceptance(&self, challenge_id: Uuid, user_id: Uuid, team_id: Uuid) -> Result<AcceptanceRequest, ManagerError> {
        let applied = self.transition(challenge_id, user_id, ChallengeTransition::RequestAcceptance { team_id })?;
        let TransitionSuccess::RequestCreated { request_id } = applied.outcome else {
            return Err(ManagerError::RequestNotFound);
        };
        applied
            .requests
            .into_iter()
            .find(|r| r.id == request_id)
            .ok_or(ManagerError::RequestNotFound)
    }

    /// Withdraw a request by its own id; the owning challenge is looked up.
    pub fn withdraw_request(&self, request_id: Uuid, user_id: Uuid) -> Result<AcceptanceRequest, ManagerError> {
        let challenge_id = {
            let index = self.request_index.read().map_err(|_| ManagerError::LockError)?;
            *index.get(&request_id).ok_or(ManagerError::RequestNotFound)?
        };
        let applied = self.transition(challenge_id, user_id, ChallengeTransition::WithdrawRequest { request_id })?;
        applied
            .requests
            .into_iter()
            .find(|r| r.id == request_id)
            .ok_or(ManagerError::RequestNotFound)
    }

    pub fn list_requests(&self, challenge_id: Uuid) -> Result<Vec<AcceptanceRequest>, ManagerError> {
        let lock = self.challenge_lock(challenge_id)?;
        let mut challenge = lock.write().map_err(|_| ManagerError::LockError)?;
        self.commit_expiry(&mut challenge, now_secs());
        Ok(challenge.get_acceptance_requests().to_vec())
    }

    // ---- matches ----

    pub fn get_match(&self, match_id: Uuid) -> Result<Match, ManagerError> {
        let matches = self.matches.read().map_err(|_| ManagerError::LockError)?;
        matches.get(&match_id).cloned().ok_or(ManagerError::MatchNotFound)
    }

    /// Record the final score and complete the challenge in one step.
    pub fn record_result(&self, match_id: Uuid, user_id: Uuid, home_score: u32, away_score: u32) -> Result<Match, ManagerError> {
        let actor = self.actor(user_id)?;
        let challenge_id = self.get_match(match_id)?.challenge_id;
        let now = now_secs();

        let lock = self.challenge_lock(challenge_id)?;
        let mut challenge = lock.write().map_err(|_| ManagerError::LockError)?;
        let mut matches = self.matches.write().map_err(|_| ManagerError::LockError)?;
        let game = matches.get_mut(&match_id).ok_or(ManagerError::MatchNotFound)?;
        if game.is_finalized() {
            return Err(ManagerError::ResultAlreadyRecorded);
        }
        challenge.play(&actor, ChallengeTransition::Complete, now)?;
        game.result = Some(MatchScore {
            home_score,
            away_score,
            recorded_by: user_id,
            recorded_at: now,
        });
        let game = game.clone();
        drop(matches);

        self.persist_match(&game);
        self.persist_challenge(&challenge);
        let view = challenge.view();
        drop(challenge);

        tracing::info!(match_id = %match_id, challenge_id = %challenge_id, home_score, away_score, "match result recorded");
        self.publish(challenge_id, ChallengeEvent::Updated(view));
        Ok(game)
    }

    // ---- events & expiry ----

    pub fn subscribe(&self, challenge_id: Uuid) -> Result<broadcast::Receiver<ChallengeEvent>, ManagerError> {
        let broadcasters = self.broadcasters.read().map_err(|_| ManagerError::LockError)?;
        let tx = broadcasters.get(&challenge_id).ok_or(ManagerError::ChallengeNotFound)?;
        Ok(tx.subscribe())
    }

    /// Expire every open or pending challenge whose deadline is at or before `now`.
    /// Returns the ids that changed.
    pub fn expire_due(&self, now: u64) -> Result<Vec<Uuid>, ManagerError> {
        let locks: Vec<Arc<RwLock<Challenge>>> = {
            let challenges = self.challenges.read().map_err(|_| ManagerError::LockError)?;
            challenges.values().cloned().collect()
        };
        let mut expired = Vec::new();
        for lock in locks {
            let mut challenge = lock.write().map_err(|_| ManagerError::LockError)?;
            let was_awaiting = challenge.get_status().is_awaiting_decision();
            self.commit_expiry(&mut challenge, now);
            if was_awaiting && !challenge.get_status().is_awaiting_decision() {
                expired.push(*challenge.get_id());
            }
        }
        Ok(expired)
    }

    /// Spawn a background task that runs [`expire_due`](Self::expire_due) every `every`.
    pub fn spawn_expiry_sweeper(&self, every: Duration) -> tokio::task::JoinHandle<()> {
        let mgr = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;
                match mgr.expire_due(now_secs()) {
                    Ok(expired) if !expired.is_empty() => {
                        tracing::info!(count = expired.len(), "expiry sweep");
                    }
                    Ok(_) => {}
                    Err(e) => tracing::error!(error = %e, "expiry sweep failed"),
                }
            }
        })
    }
}

impl Default for ChallengeManager {
    fn default() -> Self {
        Self::new()
    }
}
