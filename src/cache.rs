use std::collections::HashMap;
use serde::{Serialize, Deserialize};
use uuid::Uuid;
use crate::acceptance::AcceptanceRequest;
use crate::challenge::ChallengeView;
use crate::command::{ChallengeCommand, CommandOutcome, CommandResult};
use crate::listing::ChallengeQuery;
use crate::result::ErrorKind;

/// Identifies a cached collection of challenges.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ListKey {
    Query(ChallengeQuery),
    SentBy(Uuid),
    ReceivedBy(Uuid),
}

/// Identifies anything the cache can hold.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CacheKey {
    Challenge(Uuid),
    List(ListKey),
    Requests(Uuid),
}

/// What [`ChallengeCache::apply`] did. `invalidated` entries should be re-fetched before they are
/// shown again; `refetch_hint` names entries a failure suggests are stale, left untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheUpdate {
    pub patched: Option<Uuid>,
    pub invalidated: Vec<CacheKey>,
    pub refetch_hint: Vec<CacheKey>,
}

/// Local copy of server responses. It is only ever changed by explicit stores and by
/// [`apply`](ChallengeCache::apply) after a command returns.
#[derive(Debug, Default)]
pub struct ChallengeCache {
    challenges: HashMap<Uuid, ChallengeView>,
    lists: HashMap<ListKey, Vec<Uuid>>,
    requests: HashMap<Uuid, Vec<AcceptanceRequest>>,
}

impl ChallengeCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store_challenge(&mut self, view: ChallengeView) {
        self.challenges.insert(view.id, view);
    }

    pub fn store_list(&mut self, key: ListKey, views: Vec<ChallengeView>) {
        let ids = views.iter().map(|v| v.id).collect();
        for view in views {
            self.store_challenge(view);
        }
        self.lists.insert(key, ids);
    }

    pub fn store_requests(&mut self, challenge_id: Uuid, requests: Vec<AcceptanceRequest>) {
        self.requests.insert(challenge_id, requests);
    }

    pub fn challenge(&self, challenge_id: Uuid) -> Option<&ChallengeView> {
        self.challenges.get(&challenge_id)
    }

    /// A cached list, or `None` when the list or any of its members was invalidated.
    pub fn list(&self, key: &ListKey) -> Option<Vec<&ChallengeView>> {
        let ids = self.lists.get(key)?;
        ids.iter().map(|id| self.challenges.get(id)).collect()
    }

    pub fn requests(&self, challenge_id: Uuid) -> Option<&[AcceptanceRequest]> {
        self.requests.get(&challenge_id).map(Vec::as_slice)
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        match key {
            CacheKey::Challenge(id) => self.challenges.contains_key(id),
            CacheKey::List(list) => self.lists.contains_key(list),
            CacheKey::Requests(id) => self.requests.contains_key(id),
        }
    }

    pub fn invalidate(&mut self, key: &CacheKey) -> bool {
        match key {
            CacheKey::Challenge(id) => self.challenges.remove(id).is_some(),
            CacheKey::List(list) => self.lists.remove(list).is_some(),
            CacheKey::Requests(id) => self.requests.remove(id).is_some(),
        }
    }

    pub fn clear(&mut self) {
        self.challenges.clear();
        self.lists.clear();
        self.requests.clear();
    }

    /// Reflect the outcome of `command` in the cache.
    ///
    /// On success the challenge entry is patched with the returned view (or dropped when the
    /// server answered with an acceptance request instead), every list that holds or may now hold
    /// the challenge is invalidated, and so is the request list when the command can change it.
    /// On failure nothing changes.
    pub fn apply(&mut self, command: &ChallengeCommand, outcome: &CommandOutcome<CommandResult>) -> CacheUpdate {
        let challenge_id = command.challenge_id();
        let mut update = CacheUpdate::default();

        let result = match outcome {
            CommandOutcome::Success(result) => result,
            CommandOutcome::Failure(failure) => {
                if matches!(failure.kind, ErrorKind::Conflict | ErrorKind::NotFound) {
                    update.refetch_hint.push(CacheKey::Challenge(challenge_id));
                    if command.touches_requests() {
                        update.refetch_hint.push(CacheKey::Requests(challenge_id));
                    }
                }
                return update;
            }
        };

        let mut stale_lists: Vec<ListKey> = self
            .lists
            .iter()
            .filter(|(key, ids)| matches!(key, ListKey::Query(_)) || ids.contains(&challenge_id))
            .map(|(key, _)| key.clone())
            .collect();

        match result {
            CommandResult::Challenge(view) => {
                stale_lists.push(ListKey::SentBy(view.sender_team_id));
                if let Some(opponent) = view.opponent_team_id() {
                    stale_lists.push(ListKey::ReceivedBy(opponent));
                }
                self.challenges.insert(view.id, view.clone());
                update.patched = Some(view.id);
            }
            CommandResult::Request(_) => {
                if self.challenges.remove(&challenge_id).is_some() {
                    update.invalidated.push(CacheKey::Challenge(challenge_id));
                }
            }
        }

        for key in stale_lists {
            if self.lists.remove(&key).is_some() {
                update.invalidated.push(CacheKey::List(key));
            }
        }

        if command.touches_requests() && self.requests.remove(&challenge_id).is_some() {
            update.invalidated.push(CacheKey::Requests(challenge_id));
        }

        tracing::debug!(
            challenge_id = %challenge_id,
            invalidated = update.invalidated.len(),
            "cache updated after command"
        );
        update
    }
}
