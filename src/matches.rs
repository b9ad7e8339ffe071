use serde::{Serialize, Deserialize};
use uuid::Uuid;

/// Final score of a match, home side being the challenge sender.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchScore {
    pub home_score: u32,
    pub away_score: u32,
    pub recorded_by: Uuid,
    pub recorded_at: u64,
}

/// A match created when a challenge is accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Match {
    pub id: Uuid,
    pub challenge_id: Uuid,
    pub home_team_id: Uuid,
    pub away_team_id: Uuid,
    pub scheduled_at: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<MatchScore>,
}

impl Match {
    pub fn is_finalized(&self) -> bool {
        self.result.is_some()
    }

    pub fn involves_team(&self, team_id: Uuid) -> bool {
        self.home_team_id == team_id || self.away_team_id == team_id
    }

    /// Winning team id, `None` for a draw or an unplayed match.
    pub fn winner(&self) -> Option<Uuid> {
        let result = self.result.as_ref()?;
        if result.home_score > result.away_score {
            Some(self.home_team_id)
        } else if result.away_score > result.home_score {
            Some(self.away_team_id)
        } else {
            None
        }
    }
}
