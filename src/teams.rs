use std::collections::HashMap;
use serde::{Serialize, Deserialize};
use uuid::Uuid;

/// The user performing an action, along with the teams they belong to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: Uuid,
    pub team_ids: Vec<Uuid>,
}

impl Actor {
    pub fn new(user_id: Uuid, team_ids: Vec<Uuid>) -> Self {
        Actor { user_id, team_ids }
    }

    pub fn is_member(&self, team_id: Uuid) -> bool {
        self.team_ids.contains(&team_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub id: Uuid,
    pub name: String,
    pub sport: String,
    pub members: Vec<Uuid>,
}

impl Team {
    pub fn has_member(&self, user_id: Uuid) -> bool {
        self.members.contains(&user_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DirectoryError {
    #[error("User not found")]
    UserNotFound,
    #[error("Team not found")]
    TeamNotFound,
    #[error("Only team members can add members")]
    NotTeamMember,
    #[error("User is already a member of this team")]
    AlreadyMember,
}

/// A user's bearer token as persisted next to the user record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub user: User,
    pub token: String,
}

/// Users, their tokens and the teams they belong to.
#[derive(Debug, Default)]
pub struct TeamDirectory {
    users: HashMap<Uuid, UserRecord>,
    tokens: HashMap<String, Uuid>,
    teams: HashMap<Uuid, Team>,
}

impl TeamDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a directory from persisted records.
    pub fn from_records(users: Vec<UserRecord>, teams: Vec<Team>) -> Self {
        let mut directory = TeamDirectory::new();
        for record in users {
            directory.tokens.insert(record.token.clone(), record.user.id);
            directory.users.insert(record.user.id, record);
        }
        for team in teams {
            directory.teams.insert(team.id, team);
        }
        directory
    }

    /// Register a user and issue their bearer token.
    pub fn register_user(&mut self, name: String) -> UserRecord {
        let user = User { id: Uuid::new_v4(), name };
        let token = Uuid::new_v4().simple().to_string();
        let record = UserRecord { user, token: token.clone() };
        self.tokens.insert(token, record.user.id);
        self.users.insert(record.user.id, record.clone());
        record
    }

    pub fn authenticate(&self, token: &str) -> Option<Uuid> {
        self.tokens.get(token).copied()
    }

    pub fn user(&self, user_id: Uuid) -> Option<&User> {
        self.users.get(&user_id).map(|r| &r.user)
    }

    pub fn team(&self, team_id: Uuid) -> Option<&Team> {
        self.teams.get(&team_id)
    }

    pub fn create_team(&mut self, owner: Uuid, name: String, sport: String) -> Result<Team, DirectoryError> {
        if !self.users.contains_key(&owner) {
            return Err(DirectoryError::UserNotFound);
        }
        let team = Team {
            id: Uuid::new_v4(),
            name,
            sport,
            members: vec![owner],
        };
        self.teams.insert(team.id, team.clone());
        Ok(team)
    }

    /// Add `user_id` to a team. Only existing members may add someone.
    pub fn add_member(&mut self, team_id: Uuid, actor: Uuid, user_id: Uuid) -> Result<Team, DirectoryError> {
        if !self.users.contains_key(&user_id) {
            return Err(DirectoryError::UserNotFound);
        }
        let team = self.teams.get_mut(&team_id).ok_or(DirectoryError::TeamNotFound)?;
        if !team.has_member(actor) {
            return Err(DirectoryError::NotTeamMember);
        }
        if team.has_member(user_id) {
            return Err(DirectoryError::AlreadyMember);
        }
        team.members.push(user_id);
        Ok(team.clone())
    }

    /// Build the actor view of a user: their id plus every team they belong to.
    pub fn actor(&self, user_id: Uuid) -> Actor {
        let mut team_ids: Vec<Uuid> = self
            .teams
            .values()
            .filter(|t| t.has_member(user_id))
            .map(|t| t.id)
            .collect();
        team_ids.sort();
        Actor { user_id, team_ids }
    }
}
